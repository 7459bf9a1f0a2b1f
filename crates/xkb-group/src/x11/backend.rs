//! [`XkbBackend`] implementation over an `x11rb` connection

use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::xkb::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{self, ConnectionExt as _};
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::RustConnection;

use crate::backend::{
    Atom, Controls, KeyboardDescription, Names, NamesMask, XkbBackend, XkbVersion, NONE,
    USE_CORE_KBD, XKB_NUM_GROUPS,
};
use crate::error::{ConnectError, ProtocolStatus};

/// Highest XKB protocol version the bundled bindings implement
const LIBRARY_VERSION: XkbVersion = XkbVersion { major: 1, minor: 0 };

/// An open X11 connection with XKB enabled
pub struct X11Handle {
    conn: RustConnection,
    screen: usize,
}

/// Production backend talking to a real X server
#[derive(Debug, Clone, Copy, Default)]
pub struct X11Backend;

impl X11Backend {
    pub fn new() -> Self {
        Self
    }
}

/// Translate an X error into the status vocabulary of the names/controls fetches
fn status_for_error_kind(kind: ErrorKind) -> ProtocolStatus {
    match kind {
        ErrorKind::Alloc => ProtocolStatus::BadAlloc,
        ErrorKind::Length => ProtocolStatus::BadLength,
        ErrorKind::Match => ProtocolStatus::BadMatch,
        _ => ProtocolStatus::BadImplementation,
    }
}

fn status_for_reply_error(err: &ReplyError) -> ProtocolStatus {
    match err {
        ReplyError::X11Error(e) => status_for_error_kind(e.error_kind),
        // A broken transport means we never got a valid reply
        ReplyError::ConnectionError(_) => ProtocolStatus::BadImplementation,
    }
}

fn use_extension(
    conn: &RustConnection,
    version: XkbVersion,
) -> Result<xkb::UseExtensionReply, ReplyError> {
    Ok(conn
        .xkb_use_extension(version.major, version.minor)?
        .reply()?)
}

/// `XkbGetMap` with no components requested: just the keyboard header
fn get_map_header(conn: &RustConnection) -> Result<xkb::GetMapReply, ReplyError> {
    let nothing = xkb::MapPart::from(0u16);
    Ok(conn
        .xkb_get_map(
            USE_CORE_KBD,
            nothing,
            nothing,
            0, // first_type
            0, // n_types
            0, // first_key_sym
            0, // n_key_syms
            0, // first_key_action
            0, // n_key_actions
            0, // first_key_behavior
            0, // n_key_behaviors
            xkb::VMod::from(0u16),
            0, // first_key_explicit
            0, // n_key_explicit
            0, // first_mod_map_key
            0, // n_mod_map_keys
            0, // first_v_mod_map_key
            0, // n_v_mod_map_keys
        )?
        .reply()?)
}

fn get_controls(
    conn: &RustConnection,
    device_spec: u16,
) -> Result<xkb::GetControlsReply, ReplyError> {
    Ok(conn.xkb_get_controls(device_spec)?.reply()?)
}

fn get_names(
    conn: &RustConnection,
    device_spec: u16,
    mask: NamesMask,
) -> Result<xkb::GetNamesReply, ReplyError> {
    Ok(conn
        .xkb_get_names(device_spec, xkb::NameDetail::from(mask.bits()))?
        .reply()?)
}

/// Place the packed group-name atoms into their group slots
///
/// The reply carries one atom per bit set in `present`, lowest group
/// first. Slots whose bit is clear stay `NONE`.
fn spread_group_names(present: u8, packed: &[Atom]) -> Vec<Atom> {
    let mut slots = vec![NONE; XKB_NUM_GROUPS];
    let mut atoms = packed.iter().copied();

    for (group, slot) in slots.iter_mut().enumerate() {
        if present & (1 << group) == 0 {
            continue;
        }
        match atoms.next() {
            Some(atom) => *slot = atom,
            None => break,
        }
    }
    slots
}

fn get_state(conn: &RustConnection) -> Result<xkb::GetStateReply, ReplyError> {
    Ok(conn.xkb_get_state(USE_CORE_KBD)?.reply()?)
}

fn get_atom_name(conn: &RustConnection, atom: Atom) -> Result<xproto::GetAtomNameReply, ReplyError> {
    Ok(conn.get_atom_name(atom)?.reply()?)
}

impl XkbBackend for X11Backend {
    type Handle = X11Handle;

    fn connect(
        &mut self,
        display: Option<&str>,
        version: XkbVersion,
    ) -> Result<X11Handle, ConnectError> {
        if version > LIBRARY_VERSION {
            return Err(ConnectError::BadLibraryVersion);
        }

        let requested = display;
        let (conn, screen) = RustConnection::connect(requested).map_err(|e| {
            debug!(error = %e, requested_display = ?requested, "X11 connection failed");
            ConnectError::ConnectionRefused
        })?;

        match conn.extension_information(xkb::X11_EXTENSION_NAME) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(ConnectError::NonXkbServer),
            Err(e) => {
                debug!(error = %e, "Extension query failed");
                return Err(ConnectError::ConnectionRefused);
            }
        }

        let reply = use_extension(&conn, version).map_err(|e| {
            debug!(error = %e, "XkbUseExtension failed");
            ConnectError::BadServerVersion
        })?;

        if !reply.supported {
            debug!(
                server_major = reply.server_major,
                server_minor = reply.server_minor,
                requested = %version,
                "Server refused XKB version"
            );
            return Err(ConnectError::BadServerVersion);
        }

        debug!(
            screen,
            server_major = reply.server_major,
            server_minor = reply.server_minor,
            "XKB extension enabled"
        );
        Ok(X11Handle { conn, screen })
    }

    fn fetch_map(&mut self, handle: &mut X11Handle) -> Option<KeyboardDescription> {
        match get_map_header(&handle.conn) {
            Ok(reply) => Some(KeyboardDescription::new(
                u16::from(reply.device_id),
                reply.min_key_code,
                reply.max_key_code,
            )),
            Err(e) => {
                warn!(error = %e, "XkbGetMap failed");
                None
            }
        }
    }

    fn fetch_controls(
        &mut self,
        handle: &mut X11Handle,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus> {
        let reply = get_controls(&handle.conn, keyboard.device_spec)
            .map_err(|e| status_for_reply_error(&e))?;

        keyboard.controls = Some(Controls {
            num_groups: reply.num_groups,
        });
        Ok(())
    }

    fn fetch_names(
        &mut self,
        handle: &mut X11Handle,
        mask: NamesMask,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus> {
        let reply = get_names(&handle.conn, keyboard.device_spec, mask)
            .map_err(|e| status_for_reply_error(&e))?;

        let present = u8::from(reply.group_names);
        let values = reply.value_list;
        let packed = values.groups.unwrap_or_default();
        keyboard.names = Some(Names {
            symbols: values.symbols_name.unwrap_or(NONE),
            groups: spread_group_names(present, &packed),
        });
        Ok(())
    }

    fn disconnect(&mut self, handle: X11Handle) {
        debug!(screen = handle.screen, "Closing X11 connection");
        drop(handle);
    }

    fn query_group(&mut self, handle: &mut X11Handle) -> Result<u8, ProtocolStatus> {
        let reply = get_state(&handle.conn).map_err(|e| status_for_reply_error(&e))?;
        Ok(u8::from(reply.group))
    }

    fn lock_group(&mut self, handle: &mut X11Handle, group: u8) -> bool {
        let no_mods = xproto::ModMask::from(0u16);
        let sent = handle.conn.xkb_latch_lock_state(
            USE_CORE_KBD,
            no_mods, // affect_mod_locks
            no_mods, // mod_locks
            true,    // lock_group
            xkb::Group::from(group),
            no_mods, // affect_mod_latches
            false,   // latch_group
            0,       // group_latch
        );

        match sent {
            Ok(_cookie) => true,
            Err(e) => {
                warn!(error = %e, group, "XkbLatchLockState could not be sent");
                false
            }
        }
    }

    fn flush(&mut self, handle: &mut X11Handle) -> bool {
        match handle.conn.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to flush X11 connection");
                false
            }
        }
    }

    fn resolve_atom(&mut self, handle: &mut X11Handle, atom: Atom) -> Option<String> {
        match get_atom_name(&handle.conn, atom) {
            Ok(reply) => Some(String::from_utf8_lossy(&reply.name).into_owned()),
            Err(e) => {
                debug!(error = %e, atom, "GetAtomName failed");
                None
            }
        }
    }
}
