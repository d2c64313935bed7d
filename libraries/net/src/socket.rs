//! Socket table and the common socket record (§3.6, §4.I). One arena
//! guarded by a single lock stands in for the "singly linked list with
//! one global lock" the design describes; the indirection the list
//! gave the original (stable identity across moves) is what `SocketId`
//! already buys here.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::Mutex;

use crate::addr::{Family, SockType, SocketAddrV4, UnixAddr};
use crate::dhcp::DhcpError;
use crate::error::{NetError, NetResult};
use crate::packet::Packet;
use crate::tcp::TcpPcb;
use crate::wire::Ipv4Addr;
use multios_scheduler::task::Credentials;

pub type SocketId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockState {
    Unconnected,
    Listening,
    Connecting,
    Connected,
    Disconnecting,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct SockFlags: u32 {
        const NONBLOCK      = 1 << 0;
        const SHUT_LOCAL    = 1 << 1; // SHUT_RD: no more reads will be satisfied
        const SHUT_REMOTE   = 1 << 2; // SHUT_WR: no more writes accepted
        const TCPNODELAY    = 1 << 3;
        const IPHDR_INCLUDED = 1 << 4;
        const CLOEXEC       = 1 << 5;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PollEvents: u32 {
        const POLLIN  = 1 << 0;
        const POLLOUT = 1 << 1;
        const POLLERR = 1 << 2;
        const POLLHUP = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvFlags {
    Peek,
    DontWait,
    Normal,
}

#[derive(Debug)]
pub enum ProtoState {
    Tcp(TcpPcb),
    Udp,
    Raw,
    Unix(UnixState),
}

#[derive(Debug, Default)]
pub struct UnixState {
    pub path: Option<UnixAddr>,
    pub accept_queue: VecDeque<SocketId>,
    pub backlog: usize,
}

/// The fields common to every socket kind, per §3.6.
#[derive(Debug)]
pub struct Socket {
    pub id: SocketId,
    pub domain: Family,
    pub sock_type: SockType,
    pub protocol: u8,
    pub state: SockState,
    pub local_addr: Option<SocketAddrV4>,
    pub remote_addr: Option<SocketAddrV4>,
    pub flags: SockFlags,
    pub inq: VecDeque<Packet>,
    pub outq: VecDeque<Packet>,
    pub queue_depth: usize,
    pub poll_events: PollEvents,
    pub ttl: u8,
    pub parent: Option<SocketId>,
    pub paired: Option<SocketId>,
    pub creator: Credentials,
    pub err: Option<NetError>,
    pub peek_offset: usize,
    pub kind: ProtoState,
}

impl Socket {
    pub fn is_listening(&self) -> bool {
        self.state == SockState::Listening
    }

    /// Whether the in-queue can still accept data: neither locally nor
    /// remotely shut for reading.
    pub fn readable_side_open(&self) -> bool {
        !self.flags.contains(SockFlags::SHUT_LOCAL)
    }

    pub fn writable_side_open(&self) -> bool {
        !self.flags.contains(SockFlags::SHUT_REMOTE)
    }
}

pub const EPHEMERAL_PORT_LO: u16 = 0x0400;
pub const EPHEMERAL_PORT_HI: u16 = 0xffff;
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

pub struct SocketTable {
    slots: Mutex<Vec<Option<Socket>>>,
    next_id: Mutex<SocketId>,
}

impl SocketTable {
    pub const fn new() -> Self {
        SocketTable {
            slots: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    fn alloc_id(&self) -> SocketId {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        id
    }

    pub fn new_socket(
        &self,
        domain: Family,
        sock_type: SockType,
        protocol: u8,
        creator: Credentials,
        kind: ProtoState,
    ) -> SocketId {
        let id = self.alloc_id();
        let sock = Socket {
            id,
            domain,
            sock_type,
            protocol,
            state: SockState::Unconnected,
            local_addr: None,
            remote_addr: None,
            flags: SockFlags::empty(),
            inq: VecDeque::new(),
            outq: VecDeque::new(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            poll_events: PollEvents::empty(),
            ttl: 64,
            parent: None,
            paired: None,
            creator,
            err: None,
            peek_offset: 0,
            kind,
        };
        let mut slots = self.slots.lock();
        let slot = id - 1;
        if slot >= slots.len() {
            slots.resize_with(slot + 1, || None);
        }
        slots[slot] = Some(sock);
        id
    }

    pub fn with_socket<R>(&self, id: SocketId, f: impl FnOnce(&mut Socket) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots.get_mut(id.checked_sub(1)?)?.as_mut().map(f)
    }

    pub fn remove(&self, id: SocketId) -> Option<Socket> {
        let mut slots = self.slots.lock();
        slots.get_mut(id.checked_sub(1)?)?.take()
    }

    /// `bind`'s implicit port allocation: the first free port in the
    /// ephemeral range for this `(family, protocol)` tuple.
    pub fn allocate_port(&self, domain: Family, protocol: u8) -> NetResult<u16> {
        let slots = self.slots.lock();
        for candidate in EPHEMERAL_PORT_LO..=EPHEMERAL_PORT_HI {
            let in_use = slots.iter().flatten().any(|s| {
                s.domain == domain
                    && s.protocol == protocol
                    && s.local_addr.map(|a| a.port) == Some(candidate)
            });
            if !in_use {
                return Ok(candidate);
            }
        }
        Err(NetError::AddrInUse)
    }

    /// Inbound dispatch lookup: the first socket whose bound address
    /// matches `dst_addr` (or is `INADDR_ANY`) and `dst_port`, subject
    /// to `pred` (protocol/kind filter).
    pub fn find_by_local_addr(
        &self,
        dst_addr: Ipv4Addr,
        dst_port: u16,
        pred: impl Fn(&Socket) -> bool,
    ) -> Option<SocketId> {
        let slots = self.slots.lock();
        slots.iter().flatten().find_map(|s| {
            let addr = s.local_addr?;
            let matches_addr = addr.addr == dst_addr || addr.addr.is_unspecified();
            if addr.port == dst_port && matches_addr && pred(s) {
                Some(s.id)
            } else {
                None
            }
        })
    }

    /// All socket ids matching `pred`, in table order. Used by RAW
    /// fan-out delivery.
    pub fn collect_matching(&self, pred: impl Fn(&Socket) -> bool) -> Vec<SocketId> {
        let slots = self.slots.lock();
        slots
            .iter()
            .flatten()
            .filter(|s| pred(s))
            .map(|s| s.id)
            .collect()
    }

    pub fn port_in_use(&self, domain: Family, protocol: u8, addr: SocketAddrV4) -> bool {
        let slots = self.slots.lock();
        slots.iter().flatten().any(|s| {
            s.domain == domain
                && s.protocol == protocol
                && s.local_addr
                    .map(|a| a.port == addr.port && (a.addr == addr.addr || addr.addr.is_unspecified() || a.addr.is_unspecified()))
                    .unwrap_or(false)
        })
    }
}

pub static SOCKETS: SocketTable = SocketTable::new();

/// `bind`: validates the family/address and, for a zero port on a
/// non-RAW protocol, allocates one from the ephemeral range.
///
/// Takes the table lock once and does the whole read-scan-then-write
/// under it; going through `with_socket` for the mutation and
/// `allocate_port`/`port_in_use` for the scan would try to lock the
/// same non-reentrant mutex twice from the same task.
pub fn bind(id: SocketId, mut addr: SocketAddrV4) -> NetResult<()> {
    let mut slots = SOCKETS.slots.lock();
    let idx = id.checked_sub(1).ok_or(NetError::Invalid)?;
    let (domain, protocol, is_raw) = {
        let sock = slots
            .get(idx)
            .and_then(|s| s.as_ref())
            .ok_or(NetError::Invalid)?;
        if sock.domain != Family::Inet {
            return Err(NetError::FamilyNotSupported);
        }
        (sock.domain, sock.protocol, sock.sock_type == SockType::Raw)
    };

    if addr.is_wildcard_port() && !is_raw {
        let mut found = None;
        for candidate in EPHEMERAL_PORT_LO..=EPHEMERAL_PORT_HI {
            let in_use = slots.iter().flatten().any(|s| {
                s.domain == domain
                    && s.protocol == protocol
                    && s.local_addr.map(|a| a.port) == Some(candidate)
            });
            if !in_use {
                found = Some(candidate);
                break;
            }
        }
        addr.port = found.ok_or(NetError::AddrInUse)?;
    } else {
        let in_use = slots.iter().flatten().any(|s| {
            s.domain == domain
                && s.protocol == protocol
                && s.local_addr
                    .map(|a| {
                        a.port == addr.port
                            && (a.addr == addr.addr
                                || addr.addr.is_unspecified()
                                || a.addr.is_unspecified())
                    })
                    .unwrap_or(false)
        });
        if in_use {
            return Err(NetError::AddrInUse);
        }
    }

    slots[idx].as_mut().unwrap().local_addr = Some(addr);
    Ok(())
}

/// Unix-domain counterpart of [`bind`]: records the path as the
/// socket's identity. A real mount would also materialize a `SOCK`
/// inode through the filesystem's VFS facade; that wiring lives at the
/// syscall layer, outside this crate.
pub fn bind_unix(id: SocketId, path: UnixAddr) -> NetResult<()> {
    SOCKETS
        .with_socket(id, |sock| match &mut sock.kind {
            ProtoState::Unix(state) => {
                if state.path.is_some() {
                    return Err(NetError::AddrInUse);
                }
                state.path = Some(path);
                Ok(())
            }
            _ => Err(NetError::Invalid),
        })
        .ok_or(NetError::Invalid)?
}

/// `shutdown`: applies `SHUT_RD`/`SHUT_WR`/`SHUT_RDWR`. For TCP this
/// also kicks the close-initiation half of the state machine; see
/// `tcp::shutdown_write`.
pub fn shutdown(id: SocketId, read: bool, write: bool) -> NetResult<()> {
    SOCKETS
        .with_socket(id, |sock| {
            if read {
                sock.flags.insert(SockFlags::SHUT_LOCAL);
            }
            if write {
                sock.flags.insert(SockFlags::SHUT_REMOTE);
                if let ProtoState::Tcp(pcb) = &mut sock.kind {
                    crate::tcp::shutdown_write(pcb);
                }
            }
            sock.poll_events.insert(PollEvents::POLLHUP);
        })
        .ok_or(NetError::Invalid)
}

/// `close`: detaches a Unix peer (setting `POLLHUP` on it) and drops
/// the table entry. TCP's `TIME_WAIT` linger is driven by the timer
/// module and frees the socket later via the same `remove` call.
pub fn close(id: SocketId) -> NetResult<()> {
    let removed = SOCKETS.remove(id).ok_or(NetError::Invalid)?;
    if let ProtoState::Unix(state) = &removed.kind {
        if let Some(peer) = removed.paired {
            SOCKETS.with_socket(peer, |p| {
                p.paired = None;
                p.poll_events.insert(PollEvents::POLLHUP);
            });
        }
        let _ = state;
    }
    Ok(())
}

/// Scatter-gather send: pushes onto the protocol out-queue via the
/// per-protocol push function, honoring `MSG_DONTWAIT`/`NONBLOCK`
/// indirectly (this crate never blocks; the syscall layer loops on
/// `WouldBlock`).
pub fn send(id: SocketId, iov: &[&[u8]]) -> NetResult<usize> {
    let mut payload = Vec::new();
    for chunk in iov {
        payload.extend_from_slice(chunk);
    }
    let total = payload.len();
    SOCKETS
        .with_socket(id, |sock| {
            if !sock.writable_side_open() {
                return Err(NetError::BrokenPipe);
            }
            if sock.outq.len() >= sock.queue_depth {
                return Err(NetError::WouldBlock);
            }
            sock.outq.push_back(Packet::from_bytes(payload));
            Ok(total)
        })
        .ok_or(NetError::Invalid)?
}

/// Scatter-gather recv: copies from the in-queue respecting
/// `MSG_PEEK` (advances `peek_offset` instead of dequeuing).
pub fn recv(id: SocketId, buf: &mut [u8], flags: RecvFlags) -> NetResult<usize> {
    SOCKETS
        .with_socket(id, |sock| {
            if sock.inq.is_empty() {
                if !sock.readable_side_open() {
                    return Ok(0);
                }
                return Err(NetError::Again);
            }
            let packet = &sock.inq[0];
            let data = packet.data();
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            match flags {
                RecvFlags::Peek => sock.peek_offset = n,
                _ => {
                    if n >= data.len() {
                        sock.inq.pop_front();
                        sock.peek_offset = 0;
                    } else {
                        let mut remaining = packet.clone();
                        remaining.strip_header(n);
                        sock.inq[0] = remaining;
                    }
                    if sock.inq.is_empty() {
                        sock.poll_events.remove(PollEvents::POLLIN);
                    }
                }
            }
            Ok(n)
        })
        .ok_or(NetError::Invalid)?
}

/// `accept`: dequeues a pending connection from a listening socket's
/// accept queue (TCP) or paired-socket queue (Unix).
pub fn accept(id: SocketId) -> NetResult<SocketId> {
    SOCKETS
        .with_socket(id, |sock| match &mut sock.kind {
            ProtoState::Unix(state) => state
                .accept_queue
                .pop_front()
                .ok_or(NetError::Again),
            ProtoState::Tcp(pcb) => pcb.accept_queue.pop_front().ok_or(NetError::Again),
            _ => Err(NetError::Invalid),
        })
        .ok_or(NetError::Invalid)?
}

impl From<DhcpError> for NetError {
    fn from(_: DhcpError) -> Self {
        NetError::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Ipv4Addr;

    fn udp_socket() -> SocketId {
        SOCKETS.new_socket(
            Family::Inet,
            SockType::Dgram,
            crate::wire::IPPROTO_UDP,
            Credentials::default(),
            ProtoState::Udp,
        )
    }

    #[test]
    fn bind_wildcard_port_allocates_ephemeral() {
        let id = udp_socket();
        bind(id, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        SOCKETS
            .with_socket(id, |s| {
                assert!(s.local_addr.unwrap().port >= EPHEMERAL_PORT_LO)
            })
            .unwrap();
        close(id).unwrap();
    }

    #[test]
    fn bind_duplicate_exact_address_is_rejected() {
        let a = udp_socket();
        let b = udp_socket();
        bind(a, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000)).unwrap();
        let err = bind(b, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000)).unwrap_err();
        assert_eq!(err, NetError::AddrInUse);
        close(a).unwrap();
        close(b).unwrap();
    }

    #[test]
    fn send_then_recv_round_trips_payload() {
        let id = udp_socket();
        SOCKETS
            .with_socket(id, |s| {
                s.inq.push_back(Packet::from_bytes(alloc::vec![1, 2, 3]));
                s.poll_events.insert(PollEvents::POLLIN);
            })
            .unwrap();
        let mut buf = [0u8; 8];
        let n = recv(id, &mut buf, RecvFlags::Normal).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        close(id).unwrap();
    }

    #[test]
    fn recv_on_empty_queue_is_again() {
        let id = udp_socket();
        let mut buf = [0u8; 8];
        assert_eq!(recv(id, &mut buf, RecvFlags::Normal), Err(NetError::Again));
        close(id).unwrap();
    }

    #[test]
    fn shutdown_write_then_send_is_broken_pipe() {
        let id = udp_socket();
        shutdown(id, false, true).unwrap();
        assert_eq!(send(id, &[b"x"]), Err(NetError::BrokenPipe));
        close(id).unwrap();
    }
}
