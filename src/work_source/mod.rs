//! Work source
//!
//! Loads the deduplicated list of HS codes and partitions it into chunks
//! for dispatch.

pub mod chunker;
pub mod hs_code;
pub mod loader;

pub use chunker::{chunk_items, chunk_items_checked};
pub use hs_code::{HS_CODE_LEN, HsCode, HsCodeError};
pub use loader::{LoadReport, load_codes_from_path, parse_codes};
