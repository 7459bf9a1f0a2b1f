//! X11 backend built on `x11rb`
//!
//! Talks to the X server over the pure-Rust `x11rb` connection and the
//! XKEYBOARD extension. This is the [`XkbBackend`](crate::backend::XkbBackend)
//! used outside of tests.
//!
//! ## Mapping
//!
//! | capability | request |
//! |---|---|
//! | `connect` | `RustConnection::connect` + `XkbUseExtension` |
//! | `fetch_map` | `XkbGetMap` (header only) |
//! | `fetch_controls` | `XkbGetControls` |
//! | `fetch_names` | `XkbGetNames` |
//! | `query_group` | `XkbGetState` |
//! | `lock_group` | `XkbLatchLockState` |
//! | `resolve_atom` | `GetAtomName` |

mod backend;

pub use backend::{X11Backend, X11Handle};
