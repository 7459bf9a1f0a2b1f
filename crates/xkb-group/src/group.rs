//! Per-group view combining server names with decoded symbols

use serde::Serialize;

/// Everything known about one keyboard group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupRecord {
    /// Position in the server's group order
    pub num: u8,
    /// Human-readable name, e.g. `English (US)`; empty if the server has none
    pub name: String,
    /// Layout symbol, e.g. `us`
    pub symbol: String,
    /// Layout variant, e.g. `dvorak`; empty if none
    pub variant: String,
}
