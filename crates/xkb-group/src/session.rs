//! XKB session: connection lifecycle and group access
//!
//! A [`Session`] owns the connection to the X server together with the
//! keyboard description fetched during the handshake. Both live in a single
//! `Option<Live>`, so the session is either fully open or fully closed.
//!
//! ## Handshake
//!
//! `open()` runs four steps in order:
//!
//! 1. connect and negotiate XKB 1.0
//! 2. fetch the keyboard map header
//! 3. fetch the controls block (group count)
//! 4. fetch the names block (symbols and group names)
//!
//! Every acquisition is pushed onto an unwind list owned by a drop guard.
//! If a step fails, the guard releases what was acquired in reverse order
//! before the error reaches the caller.

use tracing::{debug, info, warn};

use crate::backend::{KeyboardDescription, NamesMask, XkbBackend, XkbVersion, NONE};
use crate::error::{LookupTarget, ServerStep, XkbError};
use crate::group::GroupRecord;
use crate::symbols::{SymbolTable, DEFAULT_IGNORED_SYMBOLS};

/// Settings used when opening a [`Session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// X display to connect to; `None` uses `$DISPLAY`
    pub display: Option<String>,
    /// Symbols in the symbols string that are not layouts
    pub ignored_symbols: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            display: None,
            ignored_symbols: DEFAULT_IGNORED_SYMBOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Connection and snapshot, always acquired and released together
struct Live<H> {
    handle: H,
    keyboard: KeyboardDescription,
}

/// Handshake steps that leave something to release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquired {
    Connection,
    Map,
    Controls,
    Names,
}

/// Drop guard for an in-progress `open()`
///
/// Holds the partially built connection and unwinds it on drop unless
/// [`Handshake::commit`] handed it over to the session.
struct Handshake<'a, B: XkbBackend> {
    backend: &'a mut B,
    handle: Option<B::Handle>,
    keyboard: Option<KeyboardDescription>,
    unwind: Vec<Acquired>,
}

impl<'a, B: XkbBackend> Handshake<'a, B> {
    fn new(backend: &'a mut B, handle: B::Handle) -> Self {
        Self {
            backend,
            handle: Some(handle),
            keyboard: None,
            unwind: vec![Acquired::Connection],
        }
    }

    fn fetch_map(&mut self) -> Result<(), XkbError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(XkbError::StateUnavailable);
        };

        debug!("Fetching keyboard description");
        let keyboard = self
            .backend
            .fetch_map(handle)
            .ok_or(XkbError::StateUnavailable)?;

        self.keyboard = Some(keyboard);
        self.unwind.push(Acquired::Map);
        Ok(())
    }

    fn fetch_controls(&mut self) -> Result<(), XkbError> {
        let (Some(handle), Some(keyboard)) = (self.handle.as_mut(), self.keyboard.as_mut()) else {
            return Err(XkbError::StateUnavailable);
        };

        debug!("Fetching keyboard controls");
        self.backend
            .fetch_controls(handle, keyboard)
            .map_err(|status| XkbError::Protocol {
                step: ServerStep::FetchControls,
                status,
            })?;

        self.unwind.push(Acquired::Controls);
        Ok(())
    }

    fn fetch_names(&mut self, mask: NamesMask) -> Result<(), XkbError> {
        let (Some(handle), Some(keyboard)) = (self.handle.as_mut(), self.keyboard.as_mut()) else {
            return Err(XkbError::StateUnavailable);
        };

        debug!(mask = mask.bits(), "Fetching keyboard names");
        self.backend
            .fetch_names(handle, mask, keyboard)
            .map_err(|status| XkbError::Protocol {
                step: ServerStep::FetchNames,
                status,
            })?;

        self.unwind.push(Acquired::Names);
        Ok(())
    }

    /// Hand the acquired pair over, disarming the unwind list
    fn commit(mut self) -> Result<Live<B::Handle>, XkbError> {
        match (self.handle.take(), self.keyboard.take()) {
            (Some(handle), Some(keyboard)) => {
                self.unwind.clear();
                Ok(Live { handle, keyboard })
            }
            (handle, keyboard) => {
                self.handle = handle;
                self.keyboard = keyboard;
                Err(XkbError::StateUnavailable)
            }
        }
    }
}

impl<B: XkbBackend> Drop for Handshake<'_, B> {
    fn drop(&mut self) {
        if self.unwind.is_empty() {
            return;
        }

        warn!(
            acquired = self.unwind.len(),
            "XKB handshake failed, releasing acquired resources"
        );

        while let Some(step) = self.unwind.pop() {
            debug!(?step, "Rolling back");
            match step {
                Acquired::Names => {
                    if let Some(keyboard) = self.keyboard.as_mut() {
                        self.backend.release_names(keyboard);
                    }
                }
                Acquired::Controls => {
                    if let Some(keyboard) = self.keyboard.as_mut() {
                        self.backend.release_controls(keyboard);
                    }
                }
                Acquired::Map => {
                    if let Some(keyboard) = self.keyboard.take() {
                        self.backend.release_map(keyboard);
                    }
                }
                Acquired::Connection => {
                    if let Some(handle) = self.handle.take() {
                        self.backend.disconnect(handle);
                    }
                }
            }
        }
    }
}

/// A connection to the X server's keyboard extension
///
/// Every operation that touches the server blocks until it replies. The
/// session is not meant to be shared between threads; all server
/// operations take `&mut self`.
///
/// Dropping the session closes it.
///
/// # Example
///
/// ```ignore
/// use xkb_group::{Session, SessionOptions, X11Backend};
///
/// let mut session = Session::open_with(X11Backend::new(), SessionOptions::default())?;
/// let current = session.group_num()?;
/// session.set_group_num((current + 1) % session.group_count()?)?;
/// println!("Now on {}", session.group_name()?);
/// ```
pub struct Session<B: XkbBackend> {
    backend: B,
    options: SessionOptions,
    live: Option<Live<B::Handle>>,
}

impl<B: XkbBackend> Session<B> {
    /// Create a closed session
    pub fn new(backend: B, options: SessionOptions) -> Self {
        Self {
            backend,
            options,
            live: None,
        }
    }

    /// Create a session and open it immediately
    ///
    /// # Errors
    ///
    /// Returns any error from [`Session::open`].
    pub fn open_with(backend: B, options: SessionOptions) -> Result<Self, XkbError> {
        let mut session = Self::new(backend, options);
        session.open()?;
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.live.is_some()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The keyboard snapshot taken by the last successful `open()`
    pub fn keyboard(&self) -> Option<&KeyboardDescription> {
        self.live.as_ref().map(|live| &live.keyboard)
    }

    /// Connect to the server and fetch the keyboard description
    ///
    /// An already open session is closed first. On failure the session is
    /// left closed with nothing acquired.
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Connection` if the display cannot be opened with XKB.
    /// Returns `XkbError::StateUnavailable` if no keyboard description is available.
    /// Returns `XkbError::Protocol` if the controls or names fetch fails.
    pub fn open(&mut self) -> Result<(), XkbError> {
        // Properly finish a previous open()
        self.close();

        debug!(display = ?self.options.display, "Connecting to X server");
        let handle = self
            .backend
            .connect(self.options.display.as_deref(), XkbVersion::REQUIRED)
            .map_err(|e| {
                warn!(error = %e, "Failed to open display with XKB");
                XkbError::from(e)
            })?;

        let mut handshake = Handshake::new(&mut self.backend, handle);
        handshake.fetch_map()?;
        handshake.fetch_controls()?;
        handshake.fetch_names(NamesMask::SYMBOLS | NamesMask::GROUP_NAMES)?;
        let live = handshake.commit()?;

        info!(
            groups = live.keyboard.group_count(),
            "Opened XKB session"
        );
        self.live = Some(live);
        Ok(())
    }

    /// Release the keyboard description, then the connection
    ///
    /// Does nothing if the session is already closed.
    pub fn close(&mut self) {
        let Some(Live {
            handle,
            mut keyboard,
        }) = self.live.take()
        else {
            return;
        };

        self.backend.release_names(&mut keyboard);
        self.backend.release_controls(&mut keyboard);
        self.backend.release_map(keyboard);
        self.backend.disconnect(handle);

        info!("Closed XKB session");
    }

    fn live(&mut self) -> Result<(&mut B, &mut Live<B::Handle>), XkbError> {
        let live = self.live.as_mut().ok_or(XkbError::NotOpen)?;
        Ok((&mut self.backend, live))
    }

    // ------------------------------------------------------------------
    // Raw server access
    // ------------------------------------------------------------------

    /// Number of configured groups, from the snapshot
    pub fn group_count(&self) -> Result<u8, XkbError> {
        self.keyboard()
            .map(KeyboardDescription::group_count)
            .ok_or(XkbError::NotOpen)
    }

    /// Currently active group, read live from the server
    pub fn group_num(&mut self) -> Result<u8, XkbError> {
        let (backend, live) = self.live()?;
        backend
            .query_group(&mut live.handle)
            .map_err(|status| XkbError::Protocol {
                step: ServerStep::QueryState,
                status,
            })
    }

    /// Lock the active group to `group`
    ///
    /// The request is flushed to the server before this returns.
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Validation` if `group` is not below
    /// [`Session::group_count`]; nothing is sent in that case.
    /// Returns `XkbError::GroupSet` if the server did not take the request
    /// or the request could not be flushed.
    /// The session is closed before this error is returned.
    pub fn set_group_num(&mut self, group: u8) -> Result<(), XkbError> {
        let count = self.group_count()?;
        if group >= count {
            return Err(XkbError::Validation(format!(
                "Group number {group} is out of range ({count} group(s) configured)"
            )));
        }

        let (backend, live) = self.live()?;
        if !backend.lock_group(&mut live.handle, group) {
            warn!(group, "Server rejected group lock, closing session");
        } else if !backend.flush(&mut live.handle) {
            warn!(group, "Group lock did not reach the server, closing session");
        } else {
            info!(group, "Locked keyboard group");
            return Ok(());
        }

        self.close();
        Err(XkbError::GroupSet { group })
    }

    /// Name of group `num`, e.g. `English (US)`
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Lookup` if the slot holds no name atom.
    pub fn group_name_at(&mut self, num: u8) -> Result<String, XkbError> {
        let (backend, live) = self.live()?;
        let atom = live
            .keyboard
            .names
            .as_ref()
            .and_then(|names| names.groups.get(usize::from(num)))
            .copied()
            .unwrap_or(NONE);

        if atom == NONE {
            return Err(XkbError::Lookup(LookupTarget::GroupName(num)));
        }

        Ok(backend
            .resolve_atom(&mut live.handle, atom)
            .unwrap_or_default())
    }

    /// The packed symbols string, e.g. `pc+us+ru:2+inet(evdev)`
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Lookup` if the symbols atom is missing or does
    /// not resolve to text.
    pub fn raw_symbol_string(&mut self) -> Result<String, XkbError> {
        let (backend, live) = self.live()?;
        let atom = live
            .keyboard
            .names
            .as_ref()
            .map_or(NONE, |names| names.symbols);

        if atom == NONE {
            return Err(XkbError::Lookup(LookupTarget::Symbols));
        }

        backend
            .resolve_atom(&mut live.handle, atom)
            .ok_or(XkbError::Lookup(LookupTarget::Symbols))
    }

    /// Fetch and decode the symbols string
    pub fn symbol_table(&mut self) -> Result<SymbolTable, XkbError> {
        let raw = self.raw_symbol_string()?;
        debug!(symbols = %raw, "Decoding symbols string");
        Ok(SymbolTable::parse(
            &raw,
            self.options.ignored_symbols.as_slice(),
        )?)
    }

    // ------------------------------------------------------------------
    // All groups
    // ------------------------------------------------------------------

    pub fn groups_names(&mut self) -> Result<Vec<String>, XkbError> {
        let count = self.group_count()?;
        (0..count).map(|num| self.group_name_at(num)).collect()
    }

    /// Symbol of every group, by group number; empty where none is known
    pub fn groups_symbols(&mut self) -> Result<Vec<String>, XkbError> {
        let count = self.group_count()?;
        let table = self.symbol_table()?;
        Ok((0..count)
            .map(|num| table.symbol_at(u32::from(num)).unwrap_or("").to_string())
            .collect())
    }

    /// Variant of every group, by group number; empty where none is set
    pub fn groups_variants(&mut self) -> Result<Vec<String>, XkbError> {
        let count = self.group_count()?;
        let table = self.symbol_table()?;
        Ok((0..count)
            .map(|num| table.variant_at(u32::from(num)).unwrap_or("").to_string())
            .collect())
    }

    pub fn groups_data(&mut self) -> Result<Vec<GroupRecord>, XkbError> {
        let count = self.group_count()?;
        let table = self.symbol_table()?;

        (0..count)
            .map(|num| {
                let index = u32::from(num);
                Ok(GroupRecord {
                    num,
                    name: self.group_name_at(num)?,
                    symbol: table.symbol_at(index).unwrap_or("").to_string(),
                    variant: table.variant_at(index).unwrap_or("").to_string(),
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Current group
    // ------------------------------------------------------------------

    pub fn group_data(&mut self) -> Result<GroupRecord, XkbError> {
        let num = self.group_num()?;
        let table = self.symbol_table()?;
        let symbol = table
            .symbol_at(u32::from(num))
            .ok_or(XkbError::Lookup(LookupTarget::Symbols))?;

        Ok(GroupRecord {
            num,
            name: self.group_name_at(num)?,
            symbol: symbol.to_string(),
            variant: table.variant_at(u32::from(num)).unwrap_or("").to_string(),
        })
    }

    pub fn group_name(&mut self) -> Result<String, XkbError> {
        let num = self.group_num()?;
        self.group_name_at(num)
    }

    /// Switch to the group with the given name
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Validation` if no group has that name.
    pub fn set_group_name(&mut self, name: &str) -> Result<(), XkbError> {
        let names = self.groups_names()?;
        let num = names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| XkbError::Validation(format!("Wrong group name: {name}")))?;

        self.set_group_num(num as u8)
    }

    pub fn group_symbol(&mut self) -> Result<String, XkbError> {
        let num = self.group_num()?;
        let table = self.symbol_table()?;
        table
            .symbol_at(u32::from(num))
            .map(str::to_string)
            .ok_or(XkbError::Lookup(LookupTarget::Symbols))
    }

    /// Switch to the group with the given layout symbol
    ///
    /// # Errors
    ///
    /// Returns `XkbError::Validation` if no configured layout has that symbol.
    pub fn set_group_symbol(&mut self, symbol: &str) -> Result<(), XkbError> {
        let table = self.symbol_table()?;
        let num = table
            .index_of_symbol(symbol)
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| XkbError::Validation(format!("Wrong group symbol: {symbol}")))?;

        self.set_group_num(num)
    }

    /// Variant of the current group, empty if it has none
    ///
    /// Read-only: variants are fixed when the layouts are configured.
    pub fn group_variant(&mut self) -> Result<String, XkbError> {
        let num = self.group_num()?;
        let table = self.symbol_table()?;
        let index = u32::from(num);

        if table.symbol_at(index).is_none() {
            return Err(XkbError::Lookup(LookupTarget::Symbols));
        }
        Ok(table.variant_at(index).unwrap_or("").to_string())
    }

    /// Move the active group by `delta`, wrapping around the group count
    ///
    /// Returns the group that was locked.
    pub fn rotate_group(&mut self, delta: i32) -> Result<u8, XkbError> {
        let count = self.group_count()?;
        if count == 0 {
            return Err(XkbError::Validation("No keyboard groups configured".to_string()));
        }

        let current = self.group_num()?;
        let target = (i64::from(current) + i64::from(delta)).rem_euclid(i64::from(count)) as u8;
        self.set_group_num(target)?;
        Ok(target)
    }
}

impl<B: XkbBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.close();
    }
}
