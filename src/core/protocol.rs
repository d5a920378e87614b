//! Network kinds understood by servers and clients.

use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

/// Closed set of socket network kinds.
///
/// Each kind renders to its canonical lowercase code (`"tcp"`, `"unixgram"`, ...),
/// which is also what [`FromStr`] accepts (case-insensitively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkProtocol {
    /// TCP over IPv4 or IPv6.
    #[default]
    Tcp,
    /// TCP restricted to IPv4.
    Tcp4,
    /// TCP restricted to IPv6.
    Tcp6,
    /// UDP over IPv4 or IPv6.
    Udp,
    /// UDP restricted to IPv4.
    Udp4,
    /// UDP restricted to IPv6.
    Udp6,
    /// Unix-domain stream socket.
    Unix,
    /// Unix-domain datagram socket.
    UnixGram,
}

impl NetworkProtocol {
    /// All kinds, in declaration order.
    pub const ALL: [NetworkProtocol; 8] = [
        Self::Tcp,
        Self::Tcp4,
        Self::Tcp6,
        Self::Udp,
        Self::Udp4,
        Self::Udp6,
        Self::Unix,
        Self::UnixGram,
    ];

    /// Canonical lowercase code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Unix => "unix",
            Self::UnixGram => "unixgram",
        }
    }

    /// Connection-oriented byte stream (TCP family or unix stream).
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6 | Self::Unix)
    }

    /// Message-oriented (UDP family or unixgram).
    pub const fn is_datagram(&self) -> bool {
        !self.is_stream()
    }

    /// Addressed by filesystem path rather than host:port.
    pub const fn is_unix(&self) -> bool {
        matches!(self, Self::Unix | Self::UnixGram)
    }

    /// TCP family, the only kinds TLS can run over.
    pub const fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }

    /// Whether an IP address of the given family is acceptable for this kind.
    ///
    /// Always `false` for unix kinds.
    pub fn accepts_ip(&self, ip: &std::net::IpAddr) -> bool {
        match self {
            Self::Tcp | Self::Udp => true,
            Self::Tcp4 | Self::Udp4 => ip.is_ipv4(),
            Self::Tcp6 | Self::Udp6 => ip.is_ipv6(),
            Self::Unix | Self::UnixGram => false,
        }
    }

    /// Whether this kind can be used on the current target.
    pub const fn is_supported(&self) -> bool {
        if self.is_unix() { cfg!(unix) } else { true }
    }
}

impl fmt::Display for NetworkProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for NetworkProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::InvalidProtocol(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_parse() {
        for p in NetworkProtocol::ALL {
            assert_eq!(p.code().parse::<NetworkProtocol>().unwrap(), p);
            assert_eq!(p.to_string(), p.code());
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            " UnixGram ".parse::<NetworkProtocol>().unwrap(),
            NetworkProtocol::UnixGram
        );
        assert_eq!("TCP".parse::<NetworkProtocol>().unwrap(), NetworkProtocol::Tcp);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "sctp".parse::<NetworkProtocol>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProtocol(ref s) if s == "sctp"));
    }

    #[test]
    fn test_classification() {
        assert!(NetworkProtocol::Tcp6.is_stream());
        assert!(NetworkProtocol::Tcp6.is_tcp());
        assert!(NetworkProtocol::Unix.is_stream());
        assert!(!NetworkProtocol::Unix.is_tcp());
        assert!(NetworkProtocol::Udp4.is_datagram());
        assert!(NetworkProtocol::UnixGram.is_datagram());
        assert!(NetworkProtocol::UnixGram.is_unix());
    }

    #[test]
    fn test_address_family() {
        let v4: std::net::IpAddr = "127.0.0.1".parse().unwrap();
        let v6: std::net::IpAddr = "::1".parse().unwrap();
        assert!(NetworkProtocol::Tcp.accepts_ip(&v6));
        assert!(NetworkProtocol::Tcp4.accepts_ip(&v4));
        assert!(!NetworkProtocol::Tcp4.accepts_ip(&v6));
        assert!(!NetworkProtocol::Udp6.accepts_ip(&v4));
        assert!(!NetworkProtocol::Unix.accepts_ip(&v4));
    }
}
