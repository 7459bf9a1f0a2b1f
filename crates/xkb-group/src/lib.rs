//! Keyboard group access for X11 through the XKB extension
//!
//! This crate reads and switches the active keyboard group (layout) of a
//! running X session and decodes the server's packed symbols string into
//! per-layout records.
//!
//! - [`Session`] owns the connection and keyboard snapshot
//! - [`SymbolTable`] decodes `pc+us+ru(phonetic):2+...` strings
//! - [`XkbBackend`] is the seam to the server; [`X11Backend`] is the real one

pub mod backend;
mod error;
mod group;
mod session;
mod symbols;
pub mod x11;

pub use backend::XkbBackend;
pub use error::{ConnectError, LookupTarget, ParseError, ProtocolStatus, ServerStep, XkbError};
pub use group::GroupRecord;
pub use session::{Session, SessionOptions};
pub use symbols::{
    SymbolRecord, SymbolTable, DEFAULT_IGNORED_SYMBOLS, DEFAULT_INDEX, SYMBOL_DELIMITER,
};
pub use x11::X11Backend;
