//! Error types for the forwarding proxy
//!
//! Errors are split by blast radius: [`ProxyError`] concerns the listener and
//! is delivered to `start` completions or the runtime error handler,
//! [`Socks5Error`] terminates a single forwarded connection, and
//! [`TransportError`] is what a caller of the request adapter sees.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Listener-level errors
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// The local listener could not be created or bound
    #[error("Failed to create local listener: {0}")]
    ListenerCreationFailed(Arc<io::Error>),

    /// `stop` was called before the listener became ready
    #[error("Proxy was stopped during startup")]
    CancelledDuringStartup,

    /// The listener failed after it had been started
    #[error("Local listener failed: {0}")]
    RuntimeListenerFailure(Arc<io::Error>),

    /// The serialized context owning the proxy state is gone
    #[error("Proxy has shut down")]
    Shutdown,
}

impl ProxyError {
    /// Wrap an I/O error raised while creating the listener
    pub fn listener_creation(err: io::Error) -> Self {
        ProxyError::ListenerCreationFailed(Arc::new(err))
    }

    /// Wrap an I/O error raised by a started listener
    pub fn runtime_failure(err: io::Error) -> Self {
        ProxyError::RuntimeListenerFailure(Arc::new(err))
    }
}

/// SOCKS5 negotiation errors, each terminal for one connection only
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Username/password selected or configured, but credentials are incomplete
    #[error("Invalid SOCKS5 credentials configuration")]
    InvalidCredentials,

    /// The stream ended before a fixed-size message was fully received
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// A fixed-size message had the wrong length
    #[error("Message size mismatch: expected {expected} bytes, got {actual}")]
    MessageSizeMismatch {
        /// Expected size in bytes
        expected: usize,
        /// Received size in bytes
        actual: usize,
    },

    /// A reply carried an unexpected version byte
    #[error("Protocol version mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ProtocolVersionMismatch {
        /// Expected version byte
        expected: u8,
        /// Received version byte
        actual: u8,
    },

    /// The proxy rejected the username/password
    #[error("Authentication rejected by proxy (status {0:#04x})")]
    AuthenticationRejected(u8),

    /// The proxy rejected the CONNECT request
    #[error("CONNECT rejected by proxy: {}", describe_reply(.0))]
    ConnectRejected(u8),

    /// The proxy accepted none of the offered methods
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// The proxy selected a method that was never offered
    #[error("Proxy selected unsupported method: {0:#04x}")]
    UnsupportedMethod(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// A message field could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(&'static str),

    /// Reserved byte was not zero
    #[error("Invalid reserved byte: {0:#04x}")]
    InvalidReserved(u8),

    /// A length-prefixed field does not fit in one byte
    #[error("{field} too long: {len} bytes (max 255)")]
    FieldTooLong {
        /// Name of the field
        field: &'static str,
        /// Actual length in bytes
        len: usize,
    },

    /// Connecting to the SOCKS5 proxy timed out
    #[error("Timed out connecting to SOCKS5 proxy")]
    ConnectTimeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Socks5Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Socks5Error::UnexpectedEndOfStream,
            _ => Socks5Error::Io(err),
        }
    }
}

/// Errors surfaced to callers of the request adapter
#[derive(Error, Debug)]
pub enum TransportError {
    /// The forwarding proxy could not be started
    #[error("Forwarding proxy unavailable: {0}")]
    Proxy(#[from] ProxyError),

    /// The request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// The underlying request sender failed
    #[error("Request failed: {0:#}")]
    Send(anyhow::Error),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl Socks5ReplyCode {
    /// Human readable description of the reply
    pub fn description(self) -> &'static str {
        match self {
            Socks5ReplyCode::Succeeded => "succeeded",
            Socks5ReplyCode::GeneralFailure => "general SOCKS server failure",
            Socks5ReplyCode::ConnectionNotAllowed => "connection not allowed by ruleset",
            Socks5ReplyCode::NetworkUnreachable => "network unreachable",
            Socks5ReplyCode::HostUnreachable => "host unreachable",
            Socks5ReplyCode::ConnectionRefused => "connection refused",
            Socks5ReplyCode::TtlExpired => "TTL expired",
            Socks5ReplyCode::CommandNotSupported => "command not supported",
            Socks5ReplyCode::AddressTypeNotSupported => "address type not supported",
        }
    }
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            other => Err(other),
        }
    }
}

fn describe_reply(code: &u8) -> String {
    match Socks5ReplyCode::try_from(*code) {
        Ok(reply) => reply.description().to_string(),
        Err(other) => format!("unknown reply code {:#04x}", other),
    }
}
