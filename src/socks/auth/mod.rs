//! SOCKS5 method negotiation
//!
//! Client side of the greeting exchange. The greeting offers no-auth and,
//! when credentials are configured, username/password; the proxy answers with
//! the method it picked.

mod password;

pub use password::{authenticate, AuthReply, AuthRequest};

use super::consts::*;
use super::types::AuthMethod;
use super::{check_len, read_fixed};
use crate::error::Socks5Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Client greeting
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    methods: Vec<AuthMethod>,
}

impl Greeting {
    /// Build the greeting for a client that may or may not hold credentials
    pub fn new(with_credentials: bool) -> Self {
        let mut methods = vec![AuthMethod::None];
        if with_credentials {
            methods.push(AuthMethod::Password);
        }
        Greeting { methods }
    }

    /// Methods offered to the proxy
    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    /// Whether the proxy is allowed to pick `method`
    pub fn offers(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.methods.len());
        buf.push(SOCKS5_VERSION);
        buf.push(self.methods.len() as u8);
        buf.extend(self.methods.iter().map(|m| m.to_byte()));
        buf
    }
}

/// Decode the proxy's method selection reply
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
pub fn decode_method_selection(bytes: &[u8]) -> Result<AuthMethod, Socks5Error> {
    check_len(bytes, METHOD_SELECTION_LEN)?;

    if bytes[0] != SOCKS5_VERSION {
        return Err(Socks5Error::ProtocolVersionMismatch {
            expected: SOCKS5_VERSION,
            actual: bytes[0],
        });
    }

    match bytes[1] {
        SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE => Err(Socks5Error::NoAcceptableMethod),
        byte => AuthMethod::from_byte(byte).ok_or(Socks5Error::UnsupportedMethod(byte)),
    }
}

/// Send the greeting and read back the selected method
///
/// The selection is not checked against the greeting here: a proxy picking
/// username/password without it being offered is reported as such so the
/// caller can fail with [`Socks5Error::InvalidCredentials`].
pub async fn negotiate_method<S>(stream: &mut S, greeting: &Greeting) -> Result<AuthMethod, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&greeting.encode()).await?;
    stream.flush().await?;

    let reply = read_fixed::<_, METHOD_SELECTION_LEN>(stream).await?;
    decode_method_selection(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_without_credentials() {
        let greeting = Greeting::new(false);
        assert_eq!(greeting.encode(), vec![0x05, 0x01, 0x00]);
        assert!(!greeting.offers(AuthMethod::Password));
    }

    #[test]
    fn test_greeting_with_credentials() {
        let greeting = Greeting::new(true);
        assert_eq!(greeting.encode(), vec![0x05, 0x02, 0x00, 0x02]);
        assert_eq!(greeting.methods(), &[AuthMethod::None, AuthMethod::Password]);
    }

    #[test]
    fn test_decode_method_selection() {
        assert_eq!(
            decode_method_selection(&[0x05, 0x00]).unwrap(),
            AuthMethod::None
        );
        assert_eq!(
            decode_method_selection(&[0x05, 0x02]).unwrap(),
            AuthMethod::Password
        );
    }

    #[test]
    fn test_decode_method_selection_errors() {
        assert!(matches!(
            decode_method_selection(&[0x05, 0xFF]),
            Err(Socks5Error::NoAcceptableMethod)
        ));
        assert!(matches!(
            decode_method_selection(&[0x05, 0x01]),
            Err(Socks5Error::UnsupportedMethod(0x01))
        ));
        assert!(matches!(
            decode_method_selection(&[0x04, 0x00]),
            Err(Socks5Error::ProtocolVersionMismatch {
                expected: 0x05,
                actual: 0x04
            })
        ));
        assert!(matches!(
            decode_method_selection(&[0x05]),
            Err(Socks5Error::UnexpectedEndOfStream)
        ));
        assert!(matches!(
            decode_method_selection(&[0x05, 0x00, 0x00]),
            Err(Socks5Error::MessageSizeMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_negotiate_method_over_stream() {
        use tokio::io::{duplex, AsyncReadExt};

        let (mut client, mut server) = duplex(64);

        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [0x05, 0x02, 0x00, 0x02]);
            server.write_all(&[0x05, 0x02]).await.unwrap();
        });

        let method = negotiate_method(&mut client, &Greeting::new(true))
            .await
            .unwrap();
        assert_eq!(method, AuthMethod::Password);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_method_premature_eof() {
        use tokio::io::{duplex, AsyncReadExt};

        let (mut client, mut server) = duplex(64);

        tokio::spawn(async move {
            let mut buf = [0u8; 3];
            server.read_exact(&mut buf).await.unwrap();
            server.write_all(&[0x05]).await.unwrap();
            // server dropped here
        });

        let result = negotiate_method(&mut client, &Greeting::new(false)).await;
        assert!(matches!(result, Err(Socks5Error::UnexpectedEndOfStream)));
    }
}
