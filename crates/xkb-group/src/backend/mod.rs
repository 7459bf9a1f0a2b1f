//! Capability interface to the X server
//!
//! [`Session`](crate::Session) never talks to X11 directly. Everything it
//! needs from the server (opening the display, fetching the keyboard
//! description blocks, reading and locking the group, resolving atoms) goes
//! through the [`XkbBackend`] trait defined here. The production
//! implementation lives in [`crate::x11`].
//!
//! ## Snapshot
//!
//! The handshake builds a [`KeyboardDescription`] in three layers:
//!
//! 1. `fetch_map` creates it (keyboard header)
//! 2. `fetch_controls` fills [`Controls`] (group count)
//! 3. `fetch_names` fills [`Names`] (symbols atom and group name atoms)
//!
//! Teardown runs the other way round: `release_names`, `release_controls`,
//! `release_map`, then `disconnect`.

#[cfg(test)]
pub(crate) mod fake;

use std::ops::BitOr;

use crate::error::{ConnectError, ProtocolStatus};

/// Server-side atom identifier
pub type Atom = u32;

/// The null atom, used by the server for "no name"
pub const NONE: Atom = 0;

/// Maximum number of keyboard groups XKB supports
pub const XKB_NUM_GROUPS: usize = 4;

/// Device spec selecting the core keyboard
pub const USE_CORE_KBD: u16 = 0x0100;

/// XKB protocol version requested during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct XkbVersion {
    pub major: u16,
    pub minor: u16,
}

impl XkbVersion {
    /// The version this crate speaks
    pub const REQUIRED: Self = Self { major: 1, minor: 0 };
}

impl std::fmt::Display for XkbVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which name components `fetch_names` should retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamesMask(u32);

impl NamesMask {
    /// The packed symbols name (`pc+us+ru:2+...`)
    pub const SYMBOLS: Self = Self(1 << 2);
    /// Per-group names (`English (US)`, ...)
    pub const GROUP_NAMES: Self = Self(1 << 12);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for NamesMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Controls block of the keyboard description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    /// Number of configured groups
    pub num_groups: u8,
}

/// Names block of the keyboard description
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Names {
    /// Atom holding the packed symbols string
    pub symbols: Atom,
    /// One atom per group slot; [`NONE`] marks an unnamed slot
    pub groups: Vec<Atom>,
}

/// Snapshot of the keyboard as seen at `open()` time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardDescription {
    /// Device the description was fetched for
    pub device_spec: u16,
    pub min_key_code: u8,
    pub max_key_code: u8,
    /// Filled by `fetch_controls`
    pub controls: Option<Controls>,
    /// Filled by `fetch_names`
    pub names: Option<Names>,
}

impl KeyboardDescription {
    /// A description holding only the map header
    pub fn new(device_spec: u16, min_key_code: u8, max_key_code: u8) -> Self {
        Self {
            device_spec,
            min_key_code,
            max_key_code,
            controls: None,
            names: None,
        }
    }

    /// Number of configured groups
    ///
    /// Taken from the controls block when present. Otherwise the group name
    /// slots are counted up to the first unnamed slot, capped at
    /// [`XKB_NUM_GROUPS`].
    pub fn group_count(&self) -> u8 {
        if let Some(controls) = self.controls {
            return controls.num_groups;
        }

        self.names.as_ref().map_or(0, |names| {
            names
                .groups
                .iter()
                .take(XKB_NUM_GROUPS)
                .take_while(|atom| **atom != NONE)
                .count() as u8
        })
    }
}

/// Operations the session needs from the X server
///
/// All calls block until the server answers or the transport fails.
/// Implementations hold whatever per-backend state they need (display
/// defaults, test fault injection); the per-connection state lives in
/// [`XkbBackend::Handle`].
pub trait XkbBackend {
    /// A live connection to the server
    type Handle;

    /// Open the display and negotiate the XKB extension
    ///
    /// `display` of `None` means the environment default (`$DISPLAY`).
    fn connect(
        &mut self,
        display: Option<&str>,
        version: XkbVersion,
    ) -> Result<Self::Handle, ConnectError>;

    /// Fetch the keyboard map header, creating a fresh description
    ///
    /// Returns `None` when the server does not hand out a description.
    fn fetch_map(&mut self, handle: &mut Self::Handle) -> Option<KeyboardDescription>;

    /// Fill in the controls block
    fn fetch_controls(
        &mut self,
        handle: &mut Self::Handle,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus>;

    /// Fill in the requested parts of the names block
    fn fetch_names(
        &mut self,
        handle: &mut Self::Handle,
        mask: NamesMask,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus>;

    fn release_names(&mut self, keyboard: &mut KeyboardDescription) {
        keyboard.names = None;
    }

    fn release_controls(&mut self, keyboard: &mut KeyboardDescription) {
        keyboard.controls = None;
    }

    fn release_map(&mut self, keyboard: KeyboardDescription) {
        drop(keyboard);
    }

    fn disconnect(&mut self, handle: Self::Handle) {
        drop(handle);
    }

    /// Read the currently locked group from the live keyboard state
    fn query_group(&mut self, handle: &mut Self::Handle) -> Result<u8, ProtocolStatus>;

    /// Ask the server to lock the given group
    ///
    /// Returns `false` if the request could not be issued.
    fn lock_group(&mut self, handle: &mut Self::Handle, group: u8) -> bool;

    /// Push buffered requests out to the server
    ///
    /// Returns `false` if the output could not be written.
    fn flush(&mut self, handle: &mut Self::Handle) -> bool;

    /// Resolve an atom to its text
    fn resolve_atom(&mut self, handle: &mut Self::Handle, atom: Atom) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_mask_combines_bits() {
        let mask = NamesMask::SYMBOLS | NamesMask::GROUP_NAMES;
        assert!(mask.contains(NamesMask::SYMBOLS));
        assert!(mask.contains(NamesMask::GROUP_NAMES));
        assert_eq!(mask.bits(), (1 << 2) | (1 << 12));
        assert!(!NamesMask::SYMBOLS.contains(NamesMask::GROUP_NAMES));
    }

    fn keyboard_with_slots(groups: &[Atom]) -> KeyboardDescription {
        let mut keyboard = KeyboardDescription::new(USE_CORE_KBD, 8, 255);
        keyboard.names = Some(Names {
            symbols: 99,
            groups: groups.to_vec(),
        });
        keyboard
    }

    #[test]
    fn test_group_count_prefers_controls() {
        let mut keyboard = keyboard_with_slots(&[1, 2, 3, 4]);
        keyboard.controls = Some(Controls { num_groups: 2 });
        assert_eq!(keyboard.group_count(), 2);
    }

    #[test]
    fn test_group_count_fallback_single_slot() {
        assert_eq!(keyboard_with_slots(&[7]).group_count(), 1);
    }

    #[test]
    fn test_group_count_fallback_all_slots() {
        assert_eq!(keyboard_with_slots(&[1, 2, 3, 4]).group_count(), 4);
    }

    #[test]
    fn test_group_count_fallback_stops_at_sentinel() {
        assert_eq!(keyboard_with_slots(&[1, 2, NONE, 4]).group_count(), 2);
    }

    #[test]
    fn test_group_count_fallback_capped_at_max_slots() {
        assert_eq!(keyboard_with_slots(&[1, 2, 3, 4, 5, 6]).group_count(), 4);
    }

    #[test]
    fn test_group_count_without_any_blocks() {
        let keyboard = KeyboardDescription::new(USE_CORE_KBD, 8, 255);
        assert_eq!(keyboard.group_count(), 0);
    }

    #[test]
    fn test_version_ordering() {
        assert!(XkbVersion { major: 1, minor: 1 } > XkbVersion::REQUIRED);
        assert!(XkbVersion { major: 0, minor: 9 } < XkbVersion::REQUIRED);
        assert_eq!(XkbVersion::REQUIRED.to_string(), "1.0");
    }
}
