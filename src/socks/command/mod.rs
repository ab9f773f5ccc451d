//! SOCKS5 CONNECT command
//!
//! Encodes the CONNECT request and decodes the proxy's reply.

mod reply;
mod request;

pub use reply::{read_connect_reply, BoundAddress, ConnectReply};
pub use request::ConnectRequest;
