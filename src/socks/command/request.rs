//! CONNECT request builder

use crate::socks::consts::*;
use crate::socks::types::Endpoint;
use bytes::{BufMut, BytesMut};

/// CONNECT request naming the remote server
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    target: Endpoint,
}

impl ConnectRequest {
    /// Create a CONNECT request for `target`
    pub fn new(target: Endpoint) -> Self {
        ConnectRequest { target }
    }

    /// Target endpoint
    pub fn target(&self) -> Endpoint {
        self.target
    }

    /// Serialize to wire format
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(3 + self.target.encoded_len());
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(SOCKS5_CMD_TCP_CONNECT);
        buf.put_u8(SOCKS5_RESERVED);
        self.target.encode(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_ipv4() {
        let request = ConnectRequest::new("198.51.100.7:443".parse().unwrap());
        assert_eq!(
            &request.encode()[..],
            &[0x05, 0x01, 0x00, 0x01, 198, 51, 100, 7, 0x01, 0xBB]
        );
    }

    #[test]
    fn test_connect_request_ipv6() {
        let request = ConnectRequest::new("[2001:db8::7]:80".parse().unwrap());
        let bytes = request.encode();

        assert_eq!(bytes.len(), 3 + 1 + 16 + 2);
        assert_eq!(&bytes[..4], &[0x05, 0x01, 0x00, 0x04]);
        assert_eq!(&bytes[4..6], &[0x20, 0x01]);
        assert_eq!(bytes[19], 0x07);
        assert_eq!(&bytes[20..22], &80u16.to_be_bytes());
    }
}
