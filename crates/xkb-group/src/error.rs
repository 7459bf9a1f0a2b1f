//! Error types for XKB session and symbol parsing operations

use thiserror::Error;

/// Reasons the initial connection to the X server can fail
///
/// These mirror the four outcomes XKB reports when opening a display
/// with the extension enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// The client library cannot speak the requested XKB version
    #[error("Compile-time and runtime XKB libraries not compatible")]
    BadLibraryVersion,

    /// The display could not be opened at all
    #[error("Display could not be opened")]
    ConnectionRefused,

    /// The server's XKB version is incompatible with the library's
    #[error("Library and server have incompatible XKB versions")]
    BadServerVersion,

    /// The server does not carry the XKB extension
    #[error("XKB not present in the X server")]
    NonXkbServer,
}

/// Status codes returned by the controls and names fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolStatus {
    #[error("Unable to allocate storage")]
    BadAlloc,

    #[error("Invalid reply from server")]
    BadImplementation,

    #[error(
        "A compatible version of Xkb was not available in the server or \
         an argument has correct type and range, but is otherwise invalid"
    )]
    BadMatch,

    #[error(
        "The length of a request is shorter or longer than that \
         required to minimally contain the arguments"
    )]
    BadLength,
}

/// Server round trips that can report a [`ProtocolStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStep {
    /// Step 3 of the handshake
    FetchControls,
    /// Step 4 of the handshake
    FetchNames,
    /// Live query of the keyboard state
    QueryState,
}

impl std::fmt::Display for ServerStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FetchControls => "fetch controls",
            Self::FetchNames => "fetch names",
            Self::QueryState => "query keyboard state",
        };
        f.write_str(name)
    }
}

/// What an atom lookup was trying to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTarget {
    /// The name of the group at the given slot
    GroupName(u8),
    /// The packed symbols string
    Symbols,
}

impl std::fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GroupName(num) => write!(f, "group name for group {num}"),
            Self::Symbols => f.write_str("symbol names"),
        }
    }
}

/// Errors produced while decoding the packed symbols string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A token does not match `symbol[(variant)][:index]`
    #[error("Malformed symbol string: \"{token}\"")]
    MalformedToken { token: String },

    /// The explicit index is zero or does not fit the index type
    #[error("Invalid group index in symbol token \"{token}\"")]
    InvalidIndex { token: String },

    /// Two retained tokens resolved to the same group index
    #[error("Symbols \"{first}\" and \"{second}\" both claim group index {index}")]
    DuplicateIndex {
        index: u32,
        first: String,
        second: String,
    },
}

/// Errors that can occur while talking to the X server through a
/// [`Session`](crate::Session)
#[derive(Debug, Error)]
pub enum XkbError {
    /// Opening the display with XKB failed
    #[error("Failed to connect to X server: {0}")]
    Connection(#[source] ConnectError),

    /// The server rejected a controls, names or state request
    #[error("Failed to {step}: {status}")]
    Protocol {
        step: ServerStep,
        #[source]
        status: ProtocolStatus,
    },

    /// No keyboard description could be obtained
    #[error("Failed to get keyboard description")]
    StateUnavailable,

    /// The server did not accept a group lock request
    ///
    /// The session has been closed when this is returned.
    #[error("Failed to set group number {group}")]
    GroupSet { group: u8 },

    /// An atom was `None` where text was expected
    #[error("Failed to get {0}")]
    Lookup(LookupTarget),

    /// The symbols string could not be decoded
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The caller passed a value that does not name a configured group
    #[error("{0}")]
    Validation(String),

    /// A server operation was attempted on a closed session
    #[error("XKB session is not open")]
    NotOpen,
}

impl From<ConnectError> for XkbError {
    fn from(err: ConnectError) -> Self {
        Self::Connection(err)
    }
}
