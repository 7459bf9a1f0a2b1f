//! Decoding of the packed XKB symbols name
//!
//! The server describes the configured layouts as a single string such as
//! `pc+us+ru(phonetic):2+inet(evdev)+group(alt_shift_toggle)`. Each
//! `+`-separated token has the shape `symbol[(variant)][:index]`, where the
//! optional index is 1-based. Tokens without an index all map to the
//! default index 0; in a well-formed string only the first layout omits it.
//!
//! Structural tokens that share the encoding but are not layouts (`pc`,
//! `inet`, `group`) are filtered out by the caller-supplied ignore list.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ParseError;

/// Separator between tokens of the symbols string
pub const SYMBOL_DELIMITER: char = '+';

/// Index given to tokens without an explicit `:index` suffix
pub const DEFAULT_INDEX: u32 = 0;

/// Symbols that describe the keyboard model or options rather than layouts
pub const DEFAULT_IGNORED_SYMBOLS: &[&str] = &["pc", "inet", "group"];

static SYMBOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<symbol>\w+)(?:\((?P<variant>\w+)\))?(?::(?P<index>\d+))?$").unwrap()
});

/// One layout entry of the symbols string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRecord {
    /// Layout family, e.g. `us`
    pub symbol: String,
    /// Layout variant, e.g. `dvorak`
    pub variant: Option<String>,
    /// 0-based group index
    pub index: u32,
}

/// Ordered layout records decoded from a symbols string
///
/// Indices are guaranteed to be pairwise distinct.
///
/// # Example
///
/// ```
/// use xkb_group::SymbolTable;
///
/// let table = SymbolTable::parse("pc+us+ru(phonetic):2+inet(evdev)", &["pc", "inet"]).unwrap();
/// assert_eq!(table.symbol_at(1), Some("ru"));
/// assert_eq!(table.variant_at(1), Some("phonetic"));
/// assert_eq!(table.index_of_symbol("us"), Some(0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SymbolTable {
    records: Vec<SymbolRecord>,
}

impl SymbolTable {
    /// Decode `raw`, dropping tokens whose symbol is listed in `ignored`
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedToken` if any token (ignored or not)
    /// does not match `symbol[(variant)][:index]` exactly.
    /// Returns `ParseError::InvalidIndex` for a `:0` suffix or one that
    /// overflows.
    /// Returns `ParseError::DuplicateIndex` if two retained tokens land on
    /// the same index.
    pub fn parse<S: AsRef<str>>(raw: &str, ignored: &[S]) -> Result<Self, ParseError> {
        let mut records = Vec::new();

        for token in raw.split(SYMBOL_DELIMITER) {
            let record = parse_token(token)?;
            if ignored.iter().any(|s| s.as_ref() == record.symbol) {
                continue;
            }
            records.push(record);
        }

        let mut seen: HashMap<u32, &str> = HashMap::new();
        for record in &records {
            if let Some(first) = seen.insert(record.index, &record.symbol) {
                return Err(ParseError::DuplicateIndex {
                    index: record.index,
                    first: first.to_string(),
                    second: record.symbol.clone(),
                });
            }
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[SymbolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_at(&self, index: u32) -> Option<&SymbolRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    /// Symbol of the layout at group `index`
    pub fn symbol_at(&self, index: u32) -> Option<&str> {
        self.record_at(index).map(|r| r.symbol.as_str())
    }

    /// Variant of the layout at group `index`
    ///
    /// `None` both when no layout has that index and when the layout has no
    /// variant; use [`SymbolTable::symbol_at`] to tell them apart.
    pub fn variant_at(&self, index: u32) -> Option<&str> {
        self.record_at(index).and_then(|r| r.variant.as_deref())
    }

    /// Group index of the first layout with the given symbol
    pub fn index_of_symbol(&self, symbol: &str) -> Option<u32> {
        self.records
            .iter()
            .find(|r| r.symbol == symbol)
            .map(|r| r.index)
    }

    /// Symbols in the order they appear in the string
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.symbol.as_str())
    }

    /// Variants in string order, empty where a layout has none
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .map(|r| r.variant.as_deref().unwrap_or(""))
    }
}

fn parse_token(token: &str) -> Result<SymbolRecord, ParseError> {
    let caps = SYMBOL_PATTERN
        .captures(token)
        .ok_or_else(|| ParseError::MalformedToken {
            token: token.to_string(),
        })?;

    let index = match caps.name("index") {
        Some(m) => m
            .as_str()
            .parse::<u32>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| ParseError::InvalidIndex {
                token: token.to_string(),
            })?,
        None => DEFAULT_INDEX,
    };

    Ok(SymbolRecord {
        symbol: caps["symbol"].to_string(),
        variant: caps.name("variant").map(|m| m.as_str().to_string()),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, variant: Option<&str>, index: u32) -> SymbolRecord {
        SymbolRecord {
            symbol: symbol.to_string(),
            variant: variant.map(str::to_string),
            index,
        }
    }

    const NO_IGNORES: &[&str] = &[];

    #[test]
    fn test_ignored_tokens_are_filtered() {
        let table = SymbolTable::parse("pc+inet+us+ru(phonetic):2", &["pc", "inet"]).unwrap();

        assert_eq!(
            table.records(),
            &[record("us", None, 0), record("ru", Some("phonetic"), 1)]
        );
    }

    #[test]
    fn test_explicit_indices_are_one_based() {
        let table = SymbolTable::parse("us+ru(phonetic):2+fr:3", NO_IGNORES).unwrap();

        let indices: Vec<u32> = table.records().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(table.symbol_at(2), Some("fr"));
    }

    #[test]
    fn test_unindexed_tokens_share_default_index() {
        // Both tokens fall back to index 0, which is a duplicate
        let result = SymbolTable::parse("us+fr", NO_IGNORES);
        assert!(matches!(
            result,
            Err(ParseError::DuplicateIndex { index: 0, .. })
        ));
    }

    #[test]
    fn test_duplicate_explicit_index_rejected() {
        let err = SymbolTable::parse("pc+us:1+ru:1", DEFAULT_IGNORED_SYMBOLS).unwrap_err();
        match err {
            ParseError::DuplicateIndex {
                index,
                first,
                second,
            } => {
                assert_eq!(index, 0);
                assert_eq!(first, "us");
                assert_eq!(second, "ru");
            }
            other => panic!("Expected DuplicateIndex, got: {:?}", other),
        }
    }

    #[test]
    fn test_distinct_explicit_indices_accepted() {
        let table = SymbolTable::parse("pc+us:1+ru:2", DEFAULT_IGNORED_SYMBOLS).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.index_of_symbol("ru"), Some(1));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let err = SymbolTable::parse("us)(bad", NO_IGNORES).unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedToken {
                token: "us)(bad".to_string()
            }
        );
        assert!(err.to_string().contains("us)(bad"));
    }

    #[test]
    fn test_partial_matches_rejected() {
        for raw in ["us(", "us:", "us:x", "(dvorak)", "us(dvorak", "us:2(dvorak)", " us"] {
            assert!(
                matches!(
                    SymbolTable::parse(raw, NO_IGNORES),
                    Err(ParseError::MalformedToken { .. })
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_string_rejected() {
        assert!(matches!(
            SymbolTable::parse("", NO_IGNORES),
            Err(ParseError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_malformed_ignored_token_still_rejected() {
        let result = SymbolTable::parse("pc(+us", DEFAULT_IGNORED_SYMBOLS);
        assert!(matches!(result, Err(ParseError::MalformedToken { .. })));
    }

    #[test]
    fn test_zero_index_rejected() {
        let result = SymbolTable::parse("us:0", NO_IGNORES);
        assert_eq!(
            result,
            Err(ParseError::InvalidIndex {
                token: "us:0".to_string()
            })
        );
    }

    #[test]
    fn test_overflowing_index_rejected() {
        let result = SymbolTable::parse("us:99999999999", NO_IGNORES);
        assert!(matches!(result, Err(ParseError::InvalidIndex { .. })));
    }

    #[test]
    fn test_typical_server_string() {
        let table = SymbolTable::parse(
            "pc+us+ru:2+ua:3+fr(azerty):4+inet(evdev)+group(alt_shift_toggle)",
            DEFAULT_IGNORED_SYMBOLS,
        )
        .unwrap();

        assert_eq!(table.symbols().collect::<Vec<_>>(), vec!["us", "ru", "ua", "fr"]);
        assert_eq!(table.variants().collect::<Vec<_>>(), vec!["", "", "", "azerty"]);
        assert_eq!(table.variant_at(3), Some("azerty"));
        assert_eq!(table.variant_at(0), None);
    }

    #[test]
    fn test_lookups_report_absence() {
        let table = SymbolTable::parse("us+ru:2", NO_IGNORES).unwrap();

        assert_eq!(table.symbol_at(5), None);
        assert_eq!(table.variant_at(5), None);
        assert_eq!(table.index_of_symbol("de"), None);
    }

    #[test]
    fn test_order_follows_string_not_index() {
        let table = SymbolTable::parse("ru:2+us", NO_IGNORES).unwrap();

        assert_eq!(table.symbols().collect::<Vec<_>>(), vec!["ru", "us"]);
        assert_eq!(table.symbol_at(0), Some("us"));
        assert_eq!(table.symbol_at(1), Some("ru"));
    }

    #[test]
    fn test_everything_ignored_gives_empty_table() {
        let table = SymbolTable::parse("pc+inet(evdev)", DEFAULT_IGNORED_SYMBOLS).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_records_serialize() {
        let table = SymbolTable::parse("us+ru(phonetic):2", NO_IGNORES).unwrap();
        let json = serde_json::to_value(table.records()).unwrap();

        assert_eq!(json[1]["symbol"], "ru");
        assert_eq!(json[1]["variant"], "phonetic");
        assert_eq!(json[1]["index"], 1);
        assert!(json[0]["variant"].is_null());
    }
}
