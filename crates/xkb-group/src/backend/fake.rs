//! In-memory backend for unit tests
//!
//! Simulates an X server with a fixed set of groups, records every call
//! made through [`XkbBackend`], and can be told to fail at any handshake
//! step. Live handle and description counts let tests check that nothing
//! leaks on rollback.

use std::collections::HashMap;

use super::{Atom, Controls, KeyboardDescription, Names, NamesMask, XkbBackend, XkbVersion, NONE};
use crate::error::{ConnectError, ProtocolStatus};

/// A recorded backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Connect,
    FetchMap,
    FetchControls,
    FetchNames,
    ReleaseNames,
    ReleaseControls,
    ReleaseMap,
    Disconnect,
    QueryGroup,
    LockGroup(u8),
    Flush,
    ResolveAtom(Atom),
}

#[derive(Debug)]
pub(crate) struct FakeHandle {
    #[allow(dead_code)]
    pub id: u32,
}

#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    pub connect_error: Option<ConnectError>,
    pub map_unavailable: bool,
    pub controls_status: Option<ProtocolStatus>,
    pub names_status: Option<ProtocolStatus>,
    pub reject_lock: bool,
    pub fail_flush: bool,
    /// `None` leaves the controls block empty after a successful fetch
    pub num_groups: Option<u8>,
    pub group_atoms: Vec<Atom>,
    pub symbols_atom: Atom,
    pub atoms: HashMap<Atom, String>,
    pub current_group: u8,

    pub calls: Vec<Call>,
    pub live_handles: usize,
    pub live_descriptions: usize,
    pub total_connects: u32,
}

impl FakeBackend {
    /// A server with one group per name and the given symbols string
    pub fn with_layouts(names: &[&str], symbols: &str) -> Self {
        let mut backend = Self::default();
        let mut next_atom: Atom = 1;

        for name in names {
            backend.atoms.insert(next_atom, (*name).to_string());
            backend.group_atoms.push(next_atom);
            next_atom += 1;
        }

        backend.atoms.insert(next_atom, symbols.to_string());
        backend.symbols_atom = next_atom;
        backend.num_groups = Some(names.len() as u8);
        backend
    }

    /// The usual four-layout setup: `setxkbmap -layout us,ru,ua,fr`
    pub fn four_layouts() -> Self {
        Self::with_layouts(
            &["English (US)", "Russian", "Ukrainian", "French"],
            "pc+us+ru:2+ua:3+fr:4+inet(evdev)+group(alt_shift_toggle)",
        )
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl XkbBackend for FakeBackend {
    type Handle = FakeHandle;

    fn connect(
        &mut self,
        _display: Option<&str>,
        _version: XkbVersion,
    ) -> Result<FakeHandle, ConnectError> {
        self.calls.push(Call::Connect);
        if let Some(err) = self.connect_error {
            return Err(err);
        }
        self.total_connects += 1;
        self.live_handles += 1;
        Ok(FakeHandle {
            id: self.total_connects,
        })
    }

    fn fetch_map(&mut self, _handle: &mut FakeHandle) -> Option<KeyboardDescription> {
        self.calls.push(Call::FetchMap);
        if self.map_unavailable {
            return None;
        }
        self.live_descriptions += 1;
        Some(KeyboardDescription::new(super::USE_CORE_KBD, 8, 255))
    }

    fn fetch_controls(
        &mut self,
        _handle: &mut FakeHandle,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus> {
        self.calls.push(Call::FetchControls);
        if let Some(status) = self.controls_status {
            return Err(status);
        }
        keyboard.controls = self.num_groups.map(|num_groups| Controls { num_groups });
        Ok(())
    }

    fn fetch_names(
        &mut self,
        _handle: &mut FakeHandle,
        mask: NamesMask,
        keyboard: &mut KeyboardDescription,
    ) -> Result<(), ProtocolStatus> {
        self.calls.push(Call::FetchNames);
        if let Some(status) = self.names_status {
            return Err(status);
        }
        let mut names = Names::default();
        if mask.contains(NamesMask::SYMBOLS) {
            names.symbols = self.symbols_atom;
        }
        if mask.contains(NamesMask::GROUP_NAMES) {
            names.groups = self.group_atoms.clone();
        }
        keyboard.names = Some(names);
        Ok(())
    }

    fn release_names(&mut self, keyboard: &mut KeyboardDescription) {
        self.calls.push(Call::ReleaseNames);
        keyboard.names = None;
    }

    fn release_controls(&mut self, keyboard: &mut KeyboardDescription) {
        self.calls.push(Call::ReleaseControls);
        keyboard.controls = None;
    }

    fn release_map(&mut self, _keyboard: KeyboardDescription) {
        self.calls.push(Call::ReleaseMap);
        self.live_descriptions -= 1;
    }

    fn disconnect(&mut self, _handle: FakeHandle) {
        self.calls.push(Call::Disconnect);
        self.live_handles -= 1;
    }

    fn query_group(&mut self, _handle: &mut FakeHandle) -> Result<u8, ProtocolStatus> {
        self.calls.push(Call::QueryGroup);
        Ok(self.current_group)
    }

    fn lock_group(&mut self, _handle: &mut FakeHandle, group: u8) -> bool {
        self.calls.push(Call::LockGroup(group));
        if self.reject_lock {
            return false;
        }
        self.current_group = group;
        true
    }

    fn flush(&mut self, _handle: &mut FakeHandle) -> bool {
        self.calls.push(Call::Flush);
        !self.fail_flush
    }

    fn resolve_atom(&mut self, _handle: &mut FakeHandle, atom: Atom) -> Option<String> {
        self.calls.push(Call::ResolveAtom(atom));
        if atom == NONE {
            return None;
        }
        self.atoms.get(&atom).cloned()
    }
}
