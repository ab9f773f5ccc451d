//! SOCKS5 type definitions
//!
//! Value types shared by the wire codecs and the negotiator.

use super::consts::*;
use crate::error::Socks5Error;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

/// Numeric endpoint, either IPv4 or IPv6
///
/// Used both for the SOCKS5 proxy itself and for the remote server the proxy
/// is asked to CONNECT to. No name resolution ever happens on an `Endpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SocketAddr", into = "SocketAddr")]
pub enum Endpoint {
    /// IPv4 address with port
    V4(SocketAddrV4),
    /// IPv6 address with port
    V6(SocketAddrV6),
}

impl Endpoint {
    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            Endpoint::V4(addr) => addr.port(),
            Endpoint::V6(addr) => addr.port(),
        }
    }

    /// Get the IP address
    pub fn ip(&self) -> IpAddr {
        match self {
            Endpoint::V4(addr) => IpAddr::V4(*addr.ip()),
            Endpoint::V6(addr) => IpAddr::V6(*addr.ip()),
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            Endpoint::V4(_) => SOCKS5_ADDR_TYPE_IPV4,
            Endpoint::V6(_) => SOCKS5_ADDR_TYPE_IPV6,
        }
    }

    /// Convert to a standard socket address
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            Endpoint::V4(addr) => SocketAddr::V4(*addr),
            Endpoint::V6(addr) => SocketAddr::V6(*addr),
        }
    }

    /// Append `ATYP | ADDR | PORT` to a buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.addr_type());
        match self {
            Endpoint::V4(addr) => buf.put_slice(&addr.ip().octets()),
            Endpoint::V6(addr) => buf.put_slice(&addr.ip().octets()),
        }
        buf.put_u16(self.port());
    }

    /// Number of bytes written by [`Endpoint::encode`]
    pub fn encoded_len(&self) -> usize {
        match self {
            Endpoint::V4(_) => 1 + 4 + 2,
            Endpoint::V6(_) => 1 + 16 + 2,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => Endpoint::V4(addr),
            SocketAddr::V6(addr) => Endpoint::V6(addr),
        }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.socket_addr()
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Endpoint::from)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Username/password pair for RFC 1929 authentication
///
/// Both fields are guaranteed to fit a one-byte length prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create credentials, rejecting fields longer than 255 bytes
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, Socks5Error> {
        let username = username.into();
        let password = password.into();

        if username.len() > MAX_FIELD_LEN {
            return Err(Socks5Error::FieldTooLong {
                field: "username",
                len: username.len(),
            });
        }
        if password.len() > MAX_FIELD_LEN {
            return Err(Socks5Error::FieldTooLong {
                field: "password",
                len: password.len(),
            });
        }

        Ok(Credentials { username, password })
    }

    /// Get the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::None),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_endpoint_ipv4() {
        let endpoint: Endpoint = "203.0.113.1:1080".parse().unwrap();
        assert_eq!(endpoint.port(), 1080);
        assert_eq!(endpoint.ip(), IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)));
        assert_eq!(endpoint.addr_type(), SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(endpoint.to_string(), "203.0.113.1:1080");
    }

    #[test]
    fn test_endpoint_ipv6() {
        let endpoint: Endpoint = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(endpoint.port(), 443);
        assert_eq!(
            endpoint.ip(),
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))
        );
        assert_eq!(endpoint.addr_type(), SOCKS5_ADDR_TYPE_IPV6);
    }

    #[test]
    fn test_endpoint_rejects_hostnames() {
        assert!("example.com:80".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_encode_ipv4() {
        let endpoint: Endpoint = "198.51.100.7:443".parse().unwrap();
        let mut buf = Vec::new();
        endpoint.encode(&mut buf);

        assert_eq!(buf.len(), endpoint.encoded_len());
        assert_eq!(buf[0], SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(&buf[1..5], &[198, 51, 100, 7]);
        assert_eq!(&buf[5..7], &443u16.to_be_bytes());
    }

    #[test]
    fn test_endpoint_encode_ipv6() {
        let endpoint: Endpoint = "[::1]:8080".parse().unwrap();
        let mut buf = Vec::new();
        endpoint.encode(&mut buf);

        assert_eq!(buf.len(), 19);
        assert_eq!(buf[0], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(buf[16], 1);
        assert_eq!(&buf[17..19], &8080u16.to_be_bytes());
    }

    #[test]
    fn test_endpoint_from_socket_addr() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 1234);
        let endpoint: Endpoint = addr.into();
        assert_eq!(endpoint, Endpoint::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1234)));
        assert_eq!(SocketAddr::from(endpoint), addr);
    }

    #[test]
    fn test_credentials_length_limit() {
        assert!(Credentials::new("u".repeat(255), "p").is_ok());
        assert!(matches!(
            Credentials::new("u".repeat(256), "p"),
            Err(Socks5Error::FieldTooLong { field: "username", len: 256 })
        ));
        assert!(matches!(
            Credentials::new("u", "p".repeat(300)),
            Err(Socks5Error::FieldTooLong { field: "password", len: 300 })
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("alice", "hunter2").unwrap();
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_method_bytes() {
        assert_eq!(AuthMethod::None.to_byte(), SOCKS5_AUTH_METHOD_NONE);
        assert_eq!(AuthMethod::Password.to_byte(), SOCKS5_AUTH_METHOD_PASSWORD);
        assert_eq!(AuthMethod::from_byte(0), Some(AuthMethod::None));
        assert_eq!(AuthMethod::from_byte(2), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::from_byte(1), None);
        assert_eq!(AuthMethod::from_byte(255), None);
    }
}
