//! Text and JSON rendering of keyboard group state

use serde::Serialize;
use xkb_group::{GroupRecord, Session, SymbolTable, XkbBackend, XkbError};

/// All groups plus the active one, captured in one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub groups: Vec<GroupRecord>,
    pub current: GroupRecord,
}

impl Snapshot {
    pub fn capture<B: XkbBackend>(session: &mut Session<B>) -> Result<Self, XkbError> {
        Ok(Self {
            groups: session.groups_data()?,
            current: session.group_data()?,
        })
    }
}

/// The `xkb { ... }` block printed by `show` and `demo`
pub fn render_block(snapshot: &Snapshot) -> String {
    let names: Vec<&str> = snapshot.groups.iter().map(|g| g.name.as_str()).collect();
    let symbols: Vec<&str> = snapshot.groups.iter().map(|g| g.symbol.as_str()).collect();
    let variants: Vec<String> = snapshot
        .groups
        .iter()
        .map(|g| format!("\"{}\"", g.variant))
        .collect();
    let current = &snapshot.current;

    let contents = [
        format!("{} groups {{{}}},", snapshot.groups.len(), names.join(", ")),
        format!("symbols {{{}}}", symbols.join(", ")),
        format!("variants {{{}}}", variants.join(", ")),
        format!(
            "current group: {} ({}) - {} - \"{}\"",
            current.symbol, current.num, current.name, current.variant
        ),
    ];

    let mut out = String::from("xkb {\n");
    for line in contents {
        out.push('\t');
        out.push_str(&line);
        out.push('\n');
    }
    out.push('}');
    out
}

/// One line per group, the active one marked with `*`
pub fn render_list(groups: &[GroupRecord], current: u8) -> String {
    groups
        .iter()
        .map(|g| {
            let marker = if g.num == current { '*' } else { ' ' };
            format!("{} {}  {:<12} {}", marker, g.num, layout_label(g), g.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Short description used after switching groups
pub fn describe(group: &GroupRecord) -> String {
    format!("{} ({}) - {}", layout_label(group), group.num, group.name)
}

/// Decoded records of a symbols string, one per line
pub fn render_symbols(table: &SymbolTable) -> String {
    table
        .records()
        .iter()
        .map(|r| match &r.variant {
            Some(variant) => format!("{}  {}({})", r.index, r.symbol, variant),
            None => format!("{}  {}", r.index, r.symbol),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn layout_label(group: &GroupRecord) -> String {
    if group.variant.is_empty() {
        group.symbol.clone()
    } else {
        format!("{}({})", group.symbol, group.variant)
    }
}
