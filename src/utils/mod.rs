pub mod constants;

pub use constants::*;

use chrono::FixedOffset;

/// UTC offset of India Standard Time in seconds
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// India Standard Time, the offset the portal reports in
#[must_use]
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within bounds")
}
