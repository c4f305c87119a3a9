//! The two independent report directions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::{EXPORT_REPORT_URL, IMPORT_REPORT_URL};

/// Report mode fetched per WorkItem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Export,
    Import,
}

impl TradeMode {
    pub const ALL: [TradeMode; 2] = [TradeMode::Export, TradeMode::Import];

    /// Lowercase wire and path form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
        }
    }

    /// Commodity-wise report page for this mode
    #[must_use]
    pub fn report_url(self) -> &'static str {
        match self {
            Self::Export => EXPORT_REPORT_URL,
            Self::Import => IMPORT_REPORT_URL,
        }
    }

    /// HS code input on the report form
    #[must_use]
    pub fn code_selector(self) -> &'static str {
        match self {
            Self::Export => "#Eidbhscode_cmace",
            Self::Import => "#Eidbhscode_cmaci",
        }
    }

    /// Financial-year dropdown on the report form
    #[must_use]
    pub fn year_selector(self) -> &'static str {
        match self {
            Self::Export => "#EidbYear_cmace",
            Self::Import => "#EidbYear_cmaci",
        }
    }

    /// Ledger column holding this mode's status
    pub(crate) fn status_column(self) -> &'static str {
        match self {
            Self::Export => "export_status",
            Self::Import => "import_status",
        }
    }

    /// Ledger column holding this mode's capture time
    pub(crate) fn scraped_at_column(self) -> &'static str {
        match self {
            Self::Export => "export_scraped_at",
            Self::Import => "import_scraped_at",
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "export" => Ok(Self::Export),
            "import" => Ok(Self::Import),
            other => Err(format!("invalid trade mode '{other}', expected export or import")),
        }
    }
}
