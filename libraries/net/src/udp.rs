//! UDP datagram queueing (§4.K): wrap/unwrap the UDP header and match
//! inbound datagrams to the bound socket.

use alloc::vec::Vec;

use crate::socket::{ProtoState, Socket, SocketId, SOCKETS};
use crate::wire::{Ipv4Addr, UdpHeader, IPPROTO_UDP};

/// `udp push`: wraps `payload` in a UDP header addressed to
/// `dst_port`, deferring to IPv4 for the rest — the caller hands the
/// returned bytes to the IPv4/interface layer.
pub fn build_datagram(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let header = UdpHeader { src_port, dst_port };
    // Checksum is mandatory except when the destination is the
    // broadcast address, where it may be sent as zero per §6.2.
    let compute = dst != Ipv4Addr::BROADCAST;
    header.encode(src, dst, payload, compute)
}

/// Finds the socket bound to `(IPPROTO_UDP, dst_port, dst_addr or
/// ANY)`. The actual enqueue onto that socket's `inq` is left to the
/// caller since it already holds the table lock through
/// `with_socket`.
pub fn find_destination(dst_addr: Ipv4Addr, dst_port: u16) -> Option<SocketId> {
    find_matching(dst_addr, dst_port, |s| {
        s.protocol == IPPROTO_UDP && matches!(s.kind, ProtoState::Udp)
    })
}

fn find_matching(dst_addr: Ipv4Addr, dst_port: u16, pred: impl Fn(&Socket) -> bool) -> Option<SocketId> {
    SOCKETS.find_by_local_addr(dst_addr, dst_port, pred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_to_broadcast_has_zero_checksum() {
        let bytes = build_datagram(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            68,
            67,
            b"hi",
        );
        assert_eq!(&bytes[6..8], &[0, 0]);
    }

    #[test]
    fn datagram_to_unicast_has_nonzero_checksum() {
        let bytes = build_datagram(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            1234,
            80,
            b"hi",
        );
        assert_ne!(&bytes[6..8], &[0, 0]);
    }
}
