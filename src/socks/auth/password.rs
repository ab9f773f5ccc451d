//! Username/password authentication
//!
//! Client side of RFC 1929 username/password authentication for SOCKS5.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::Credentials;
use crate::socks::{check_len, read_fixed};
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Username/password authentication request
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    credentials: Credentials,
}

impl AuthRequest {
    /// Create a request; field lengths were validated by [`Credentials::new`]
    pub fn new(credentials: Credentials) -> Self {
        AuthRequest { credentials }
    }

    /// Credentials carried by this request
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Serialize to wire format
    pub fn encode(&self) -> BytesMut {
        let username = self.credentials.username().as_bytes();
        let password = self.credentials.password().as_bytes();

        let mut buf = BytesMut::with_capacity(3 + username.len() + password.len());
        buf.put_u8(SOCKS5_AUTH_VERSION);
        buf.put_u8(username.len() as u8);
        buf.put_slice(username);
        buf.put_u8(password.len() as u8);
        buf.put_slice(password);
        buf
    }

    /// Parse a complete request from wire format
    pub fn decode(mut bytes: &[u8]) -> Result<Self, Socks5Error> {
        let total = bytes.len();

        if bytes.remaining() < 2 {
            return Err(Socks5Error::UnexpectedEndOfStream);
        }
        let version = bytes.get_u8();
        if version != SOCKS5_AUTH_VERSION {
            return Err(Socks5Error::ProtocolVersionMismatch {
                expected: SOCKS5_AUTH_VERSION,
                actual: version,
            });
        }

        let username = take_field(&mut bytes, "username")?;
        let password = take_field(&mut bytes, "password")?;

        if bytes.has_remaining() {
            return Err(Socks5Error::MessageSizeMismatch {
                expected: total - bytes.remaining(),
                actual: total,
            });
        }

        Ok(AuthRequest {
            credentials: Credentials::new(username, password)?,
        })
    }
}

fn take_field(bytes: &mut &[u8], field: &'static str) -> Result<String, Socks5Error> {
    if !bytes.has_remaining() {
        return Err(Socks5Error::UnexpectedEndOfStream);
    }
    let len = bytes.get_u8() as usize;
    if bytes.remaining() < len {
        return Err(Socks5Error::UnexpectedEndOfStream);
    }

    let value = String::from_utf8(bytes[..len].to_vec())
        .map_err(|_| Socks5Error::MalformedMessage(field))?;
    bytes.advance(len);
    Ok(value)
}

/// Username/password authentication reply
///
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    /// Status byte, `0x00` on success
    pub status: u8,
}

impl AuthReply {
    /// Parse a reply; anything but exactly two bytes is malformed
    pub fn decode(bytes: &[u8]) -> Result<Self, Socks5Error> {
        check_len(bytes, AUTH_REPLY_LEN)?;

        if bytes[0] != SOCKS5_AUTH_VERSION {
            return Err(Socks5Error::ProtocolVersionMismatch {
                expected: SOCKS5_AUTH_VERSION,
                actual: bytes[0],
            });
        }

        Ok(AuthReply { status: bytes[1] })
    }

    /// Whether the proxy accepted the credentials
    pub fn is_success(&self) -> bool {
        self.status == SOCKS5_AUTH_STATUS_SUCCESS
    }
}

/// Run the username/password sub-negotiation against a proxy
pub async fn authenticate<S>(stream: &mut S, credentials: &Credentials) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = AuthRequest::new(credentials.clone());
    stream.write_all(&request.encode()).await?;
    stream.flush().await?;

    let reply = read_fixed::<_, AUTH_REPLY_LEN>(stream).await?;
    let reply = AuthReply::decode(&reply)?;

    if !reply.is_success() {
        return Err(Socks5Error::AuthenticationRejected(reply.status));
    }

    debug!("Authenticated to SOCKS5 proxy as {}", credentials.username());
    Ok(())
}
