//! Flow identity derived from an IPv4 header.

use std::net::IpAddr;

use derive_more::Display;

use super::Ipv4Header;

/// Identity shared by every fragment of one datagram.
///
/// Addresses are stored as [`IpAddr`] and the identifier as `u32` so the
/// same key serves IPv6 fragment headers.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
///
/// use ipfrag::fragment::{FlowKey, Ipv4Header};
/// let header = Ipv4Header::new(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), 9, 17);
/// let key = FlowKey::from(&header);
/// assert_eq!(key.id, 9);
/// assert_eq!(key.to_string(), "1.1.1.1->2.2.2.2 id 9 proto 17");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("{src}->{dst} id {id} proto {protocol}")]
pub struct FlowKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub id: u32,
    pub protocol: u8,
}

impl From<&Ipv4Header> for FlowKey {
    fn from(header: &Ipv4Header) -> Self {
        Self {
            src: IpAddr::V4(header.src()),
            dst: IpAddr::V4(header.dst()),
            id: u32::from(header.id()),
            protocol: header.protocol(),
        }
    }
}
