//! RAW sockets (§4.K): protocol fan-out after the link-layer header is
//! stripped. Every matching socket gets its own copy of the payload;
//! a socket that has shut down its read half is skipped.

use alloc::vec::Vec;

use crate::packet::Packet;
use crate::socket::{ProtoState, Socket, SocketId, SockFlags, SOCKETS};
use crate::wire::Ipv4Addr;

/// All RAW sockets whose `(proto, local_addr)` matches the inbound
/// packet, in table order. Each gets an independent `cheap_clone` of
/// the payload so one recipient's `recv` doesn't consume another's.
pub fn fanout_targets(proto: u8, dst_addr: Ipv4Addr) -> Vec<SocketId> {
    SOCKETS.collect_matching(|s: &Socket| {
        matches!(s.kind, ProtoState::Raw)
            && s.protocol == proto
            && !s.flags.contains(SockFlags::SHUT_LOCAL)
            && s.local_addr
                .map(|a| a.addr == dst_addr || a.addr.is_unspecified())
                .unwrap_or(true)
    })
}

/// Delivers `packet` to every socket in `targets`, each as an
/// independent cheap clone.
pub fn deliver(targets: &[SocketId], packet: &Packet) {
    for &id in targets {
        SOCKETS.with_socket(id, |sock| {
            if sock.inq.len() < sock.queue_depth {
                sock.inq.push_back(packet.cheap_clone());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{Family, SockType};
    use multios_scheduler::task::Credentials;

    #[test]
    fn shutdown_receive_excludes_socket_from_fanout() {
        let id = SOCKETS.new_socket(
            Family::Inet,
            SockType::Raw,
            1,
            Credentials::default(),
            ProtoState::Raw,
        );
        SOCKETS
            .with_socket(id, |s| s.flags.insert(SockFlags::SHUT_LOCAL))
            .unwrap();
        let targets = fanout_targets(1, Ipv4Addr::UNSPECIFIED);
        assert!(!targets.contains(&id));
        crate::socket::close(id).unwrap();
    }
}
