//! JavaScript evaluated inside report pages
//!
//! Static probes are plain constants; scripts that take a selector or a
//! value are built with the argument JSON-encoded into the source.

/// Masks the most common automation fingerprints
pub const STEALTH_SCRIPT: &str = r#"
    (() => {
        Object.defineProperty(navigator, 'webdriver', { get: () => false });
        Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
        if (!window.chrome) { window.chrome = {}; }
        if (!window.chrome.runtime) { window.chrome.runtime = {}; }
        return true;
    })()
"#;

/// Title and the start of the body text, for rate-limit detection
pub const PAGE_PROBE_SCRIPT: &str = r#"
    (() => ({
        title: document.title || '',
        text: (document.body ? document.body.innerText : '').slice(0, 1000)
    }))()
"#;

/// Commodity label printed above the results table
pub const PRODUCT_LABEL_SCRIPT: &str = r#"
    (() => {
        const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
        while (walker.nextNode()) {
            const text = walker.currentNode.textContent || '';
            const idx = text.indexOf('Commodity:');
            if (idx >= 0) {
                return text.slice(idx + 'Commodity:'.length).trim() || null;
            }
        }
        return null;
    })()
"#;

/// Cell texts of every body row currently rendered in the results table
pub const TABLE_ROWS_SCRIPT: &str = r#"
    (() => Array.from(document.querySelectorAll('#example1 tbody tr')).map(tr =>
        Array.from(tr.querySelectorAll('td')).map(td => (td.innerText || '').trim())
    ))()
"#;

/// Clicks the enabled "next" pager button; false on the last page
pub const NEXT_PAGE_SCRIPT: &str = r#"
    (() => {
        const item = document.querySelector('li.page-item.next:not(.disabled)');
        if (!item) { return false; }
        const target = item.querySelector('a, button') || item;
        target.click();
        return true;
    })()
"#;

/// Year headers and the three footer lines of the results table
pub const SUMMARY_SCRIPT: &str = r#"
    (() => {
        const years = Array.from(document.querySelectorAll('#example1 thead tr:nth-child(2) th'))
            .map(th => (th.innerText || '').replace(/\s+/g, ''))
            .filter(t => t.includes('-'));
        const rows = Array.from(document.querySelectorAll('#example1 tfoot tr')).map(tr =>
            Array.from(tr.querySelectorAll('td, th')).map(td => (td.innerText || '').trim())
        );
        return { years, rows };
    })()
"#;

/// Submits the report form
pub const SUBMIT_SCRIPT: &str = r#"
    (() => {
        const btn = document.querySelector('button[type=submit]');
        if (!btn) { return false; }
        btn.click();
        return true;
    })()
"#;

fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Whether `selector` currently matches an element
#[must_use]
pub fn exists_script(selector: &str) -> String {
    format!("(() => document.querySelector({}) !== null)()", js_str(selector))
}

/// Clear an input, type `value` and fire input/change events
#[must_use]
pub fn fill_input_script(selector: &str, value: &str) -> String {
    format!(
        r#"
    (() => {{
        const el = document.querySelector({sel});
        if (!el) {{ return false; }}
        el.focus();
        el.value = '';
        el.value = {val};
        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;
    }})()
"#,
        sel = js_str(selector),
        val = js_str(value)
    )
}

/// Labels of a dropdown's options
#[must_use]
pub fn option_labels_script(selector: &str) -> String {
    format!(
        r#"
    (() => {{
        const el = document.querySelector({sel});
        if (!el) {{ return []; }}
        return Array.from(el.querySelectorAll('option')).map(o => (o.innerText || o.textContent || '').trim());
    }})()
"#,
        sel = js_str(selector)
    )
}

/// Select the option whose label is `label`
#[must_use]
pub fn select_option_script(selector: &str, label: &str) -> String {
    format!(
        r#"
    (() => {{
        const el = document.querySelector({sel});
        if (!el) {{ return false; }}
        const opt = Array.from(el.options).find(o => (o.innerText || o.textContent || '').trim() === {label});
        if (!opt) {{ return false; }}
        el.value = opt.value;
        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;
    }})()
"#,
        sel = js_str(selector),
        label = js_str(label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_escaped() {
        let script = fill_input_script("#Eidbhscode_cmace", "61'09\"1000");
        assert!(script.contains(r##""#Eidbhscode_cmace""##));
        assert!(script.contains(r#""61'09\"1000""#));
    }
}
