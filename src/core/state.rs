//! Connection state values and "peer gone" error classification.

use std::fmt;
use std::io;

/// Message carried by errors raised when using an already closed socket.
pub const CLOSED_CONNECTION_MESSAGE: &str = "use of closed network connection";

/// Lifecycle transition reported to info callbacks.
///
/// Values are created at each transition point and never mutated.
/// [`ConnState::Unknown`] carries a raw value that did not map to a known
/// transition; it still renders to a stable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Client is dialing.
    Dial,
    /// Connection accepted or established.
    New,
    /// Reading incoming data.
    Read,
    /// Incoming side closed.
    CloseRead,
    /// User handler is running.
    Handler,
    /// Writing outgoing data.
    Write,
    /// Outgoing side closed.
    CloseWrite,
    /// Connection closed.
    Close,
    /// Connection failed.
    Error,
    /// Server is shutting down.
    Shutdown,
    /// Unrecognized raw value.
    Unknown(u8),
}

impl ConnState {
    /// Raw wire value.
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Dial => 0,
            Self::New => 1,
            Self::Read => 2,
            Self::CloseRead => 3,
            Self::Handler => 4,
            Self::Write => 5,
            Self::CloseWrite => 6,
            Self::Close => 7,
            Self::Error => 8,
            Self::Shutdown => 9,
            Self::Unknown(v) => *v,
        }
    }

    /// Map a raw value back to a state; unmapped values become `Unknown`.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Dial,
            1 => Self::New,
            2 => Self::Read,
            3 => Self::CloseRead,
            4 => Self::Handler,
            5 => Self::Write,
            6 => Self::CloseWrite,
            7 => Self::Close,
            8 => Self::Error,
            9 => Self::Shutdown,
            other => Self::Unknown(other),
        }
    }

    /// Human-readable label. Total over every value.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Dial => "Dial Connection",
            Self::New => "New Connection",
            Self::Read => "Read Incoming Stream",
            Self::CloseRead => "Close Incoming Stream",
            Self::Handler => "Run Handler",
            Self::Write => "Write Outgoing Stream",
            Self::CloseWrite => "Close Outgoing Stream",
            Self::Close => "Close Connection",
            Self::Error => "Connection Error",
            Self::Shutdown => "Server Shutdown",
            Self::Unknown(_) => "unknown connection state",
        }
    }
}

impl From<u8> for ConnState {
    fn from(v: u8) -> Self {
        Self::from_u8(v)
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies errors meaning the peer or the socket is already gone.
///
/// Those errors are expected during shutdown and peer-initiated closes and
/// should not be surfaced as failures.
pub trait PeerGone {
    /// Whether this error only says the connection no longer exists.
    fn is_peer_gone(&self) -> bool;
}

impl PeerGone for io::Error {
    fn is_peer_gone(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::UnexpectedEof
        ) || self.to_string().contains(CLOSED_CONNECTION_MESSAGE)
    }
}

/// Drop "peer gone" errors, pass every other error through unchanged.
///
/// ```
/// use std::io;
/// use sockcore::core::error_filter;
///
/// let gone = io::Error::new(io::ErrorKind::Other, "use of closed network connection");
/// assert!(error_filter(Some(gone)).is_none());
///
/// let denied = io::Error::from(io::ErrorKind::PermissionDenied);
/// assert!(error_filter(Some(denied)).is_some());
/// ```
pub fn error_filter<E: PeerGone>(err: Option<E>) -> Option<E> {
    err.filter(|e| !e.is_peer_gone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_never_empty() {
        for v in 0..=u8::MAX {
            let state = ConnState::from(v);
            assert!(!state.to_string().is_empty());
        }
    }

    #[test]
    fn test_unknown_label_is_stable() {
        assert_eq!(ConnState::from(200).to_string(), "unknown connection state");
        assert_eq!(
            ConnState::Unknown(42).to_string(),
            ConnState::Unknown(250).to_string()
        );
    }

    #[test]
    fn test_known_values_map_back() {
        for v in 0..=9u8 {
            let state = ConnState::from_u8(v);
            assert!(!matches!(state, ConnState::Unknown(_)));
            assert_eq!(state.as_u8(), v);
        }
        assert_eq!(ConnState::New.to_string(), "New Connection");
        assert_eq!(ConnState::Close.to_string(), "Close Connection");
    }

    #[test]
    fn test_filter_none() {
        assert!(error_filter::<io::Error>(None).is_none());
    }

    #[test]
    fn test_filter_closed_connection_message() {
        let err = io::Error::other(CLOSED_CONNECTION_MESSAGE);
        assert!(error_filter(Some(err)).is_none());
    }

    #[test]
    fn test_filter_peer_gone_kinds() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
        ] {
            assert!(error_filter(Some(io::Error::from(kind))).is_none());
        }
    }

    #[test]
    fn test_filter_keeps_unrelated_error() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let kept = error_filter(Some(err)).expect("error must be kept");
        assert_eq!(kept.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(kept.to_string(), "denied");
    }
}
