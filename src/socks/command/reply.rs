//! CONNECT reply parser
//!
//! The reply is read in two steps: the fixed header, then the bound address
//! whose length depends on the address type.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::read_fixed;
use bytes::Buf;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Address the proxy bound for the outgoing connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Ip(addr) => write!(f, "{}", addr),
            BoundAddress::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// Successful CONNECT reply
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    /// Bound address reported by the proxy
    pub bound: BoundAddress,
}

impl ConnectReply {
    /// Parse a complete reply from a buffer
    pub fn decode(mut bytes: &[u8]) -> Result<Self, Socks5Error> {
        if bytes.len() < CONNECT_REPLY_HEADER_LEN {
            return Err(Socks5Error::UnexpectedEndOfStream);
        }
        let addr_type = check_header(&bytes[..CONNECT_REPLY_HEADER_LEN])?;
        bytes.advance(CONNECT_REPLY_HEADER_LEN);

        let total = CONNECT_REPLY_HEADER_LEN + bytes.len();
        let bound = match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                if bytes.remaining() < 6 {
                    return Err(Socks5Error::UnexpectedEndOfStream);
                }
                let ip = Ipv4Addr::from(bytes.get_u32());
                BoundAddress::Ip(SocketAddr::V4(SocketAddrV4::new(ip, bytes.get_u16())))
            }
            SOCKS5_ADDR_TYPE_IPV6 => {
                if bytes.remaining() < 18 {
                    return Err(Socks5Error::UnexpectedEndOfStream);
                }
                let ip = Ipv6Addr::from(bytes.get_u128());
                BoundAddress::Ip(SocketAddr::V6(SocketAddrV6::new(ip, bytes.get_u16(), 0, 0)))
            }
            SOCKS5_ADDR_TYPE_DOMAIN => {
                if !bytes.has_remaining() {
                    return Err(Socks5Error::UnexpectedEndOfStream);
                }
                let len = bytes.get_u8() as usize;
                if bytes.remaining() < len + 2 {
                    return Err(Socks5Error::UnexpectedEndOfStream);
                }
                let domain = String::from_utf8(bytes[..len].to_vec())
                    .map_err(|_| Socks5Error::MalformedMessage("bound domain"))?;
                bytes.advance(len);
                BoundAddress::Domain(domain, bytes.get_u16())
            }
            other => return Err(Socks5Error::AddressTypeNotSupported(other)),
        };

        if bytes.has_remaining() {
            return Err(Socks5Error::MessageSizeMismatch {
                expected: total - bytes.remaining(),
                actual: total,
            });
        }

        Ok(ConnectReply { bound })
    }
}

/// Validate `VER | REP | RSV | ATYP` and return the address type
fn check_header(header: &[u8]) -> Result<u8, Socks5Error> {
    let (version, reply, reserved, addr_type) = (header[0], header[1], header[2], header[3]);

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::ProtocolVersionMismatch {
            expected: SOCKS5_VERSION,
            actual: version,
        });
    }
    if reply != SOCKS5_REPLY_SUCCEEDED {
        return Err(Socks5Error::ConnectRejected(reply));
    }
    if reserved != SOCKS5_RESERVED {
        return Err(Socks5Error::InvalidReserved(reserved));
    }

    Ok(addr_type)
}

/// Read exactly one CONNECT reply from the stream
///
/// Fails fast on the header: a rejected CONNECT is reported without waiting
/// for the bound address.
pub async fn read_connect_reply<S>(stream: &mut S) -> Result<ConnectReply, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let header = read_fixed::<_, CONNECT_REPLY_HEADER_LEN>(stream).await?;
    let addr_type = check_header(&header)?;

    let mut reply = header.to_vec();
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => reply.extend_from_slice(&read_fixed::<_, 6>(stream).await?),
        SOCKS5_ADDR_TYPE_IPV6 => reply.extend_from_slice(&read_fixed::<_, 18>(stream).await?),
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await?;
            let mut rest = vec![0u8; len as usize + 2];
            stream.read_exact(&mut rest).await?;
            reply.push(len);
            reply.extend_from_slice(&rest);
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    }

    ConnectReply::decode(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    const SUCCESS_IPV4: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 10, 0, 0, 1, 0x04, 0x38];

    #[test]
    fn test_decode_ipv4_reply() {
        let reply = ConnectReply::decode(&SUCCESS_IPV4).unwrap();
        assert_eq!(
            reply.bound,
            BoundAddress::Ip("10.0.0.1:1080".parse().unwrap())
        );
    }

    #[test]
    fn test_decode_ipv6_reply() {
        let mut bytes = vec![0x05, 0x00, 0x00, 0x04];
        bytes.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        bytes.extend_from_slice(&443u16.to_be_bytes());

        let reply = ConnectReply::decode(&bytes).unwrap();
        assert_eq!(reply.bound, BoundAddress::Ip("[::1]:443".parse().unwrap()));
    }

    #[test]
    fn test_decode_domain_reply() {
        let mut bytes = vec![0x05, 0x00, 0x00, 0x03, 4];
        bytes.extend_from_slice(b"host");
        bytes.extend_from_slice(&80u16.to_be_bytes());

        let reply = ConnectReply::decode(&bytes).unwrap();
        assert_eq!(reply.bound, BoundAddress::Domain("host".to_string(), 80));
        assert_eq!(reply.bound.to_string(), "host:80");
    }

    #[test]
    fn test_decode_rejected() {
        let mut bytes = SUCCESS_IPV4;
        bytes[1] = 0x05;
        assert!(matches!(
            ConnectReply::decode(&bytes),
            Err(Socks5Error::ConnectRejected(0x05))
        ));
    }

    #[test]
    fn test_decode_malformed() {
        let mut bytes = SUCCESS_IPV4;
        bytes[0] = 0x04;
        assert!(matches!(
            ConnectReply::decode(&bytes),
            Err(Socks5Error::ProtocolVersionMismatch { .. })
        ));

        let mut bytes = SUCCESS_IPV4;
        bytes[2] = 0x01;
        assert!(matches!(
            ConnectReply::decode(&bytes),
            Err(Socks5Error::InvalidReserved(0x01))
        ));

        let mut bytes = SUCCESS_IPV4;
        bytes[3] = 0x09;
        assert!(matches!(
            ConnectReply::decode(&bytes),
            Err(Socks5Error::AddressTypeNotSupported(0x09))
        ));

        assert!(matches!(
            ConnectReply::decode(&SUCCESS_IPV4[..7]),
            Err(Socks5Error::UnexpectedEndOfStream)
        ));

        let mut bytes = SUCCESS_IPV4.to_vec();
        bytes.push(0);
        assert!(matches!(
            ConnectReply::decode(&bytes),
            Err(Socks5Error::MessageSizeMismatch {
                expected: 10,
                actual: 11
            })
        ));
    }

    #[tokio::test]
    async fn test_read_connect_reply() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&SUCCESS_IPV4).await.unwrap();
        // trailing relay payload must stay unread
        server.write_all(b"payload").await.unwrap();

        let reply = read_connect_reply(&mut client).await.unwrap();
        assert_eq!(reply.bound.to_string(), "10.0.0.1:1080");

        let mut rest = [0u8; 7];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"payload");
    }

    #[tokio::test]
    async fn test_read_connect_reply_rejected_fails_fast() {
        let (mut client, mut server) = duplex(64);
        // header only, no bound address follows
        server.write_all(&[0x05, 0x02, 0x00, 0x01]).await.unwrap();

        let result = read_connect_reply(&mut client).await;
        assert!(matches!(result, Err(Socks5Error::ConnectRejected(0x02))));
    }

    #[tokio::test]
    async fn test_read_connect_reply_truncated() {
        let (mut client, mut server) = duplex(64);
        server.write_all(&SUCCESS_IPV4[..6]).await.unwrap();
        drop(server);

        let result = read_connect_reply(&mut client).await;
        assert!(matches!(result, Err(Socks5Error::UnexpectedEndOfStream)));
    }
}
