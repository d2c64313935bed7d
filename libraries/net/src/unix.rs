//! Unix-domain sockets (§4.L): path-addressed, paired in-queues.
//!
//! Binding a `SOCK` inode at the given path is the VFS facade's job
//! (an external collaborator, §1); this module only tracks the path
//! as a lookup key inside the socket table.

use crate::addr::UnixAddr;
use crate::error::{NetError, NetResult};
use crate::socket::{ProtoState, SockState, SocketId, SOCKETS};

/// `listen`: marks the socket ready to accept and records the backlog
/// bound on its pending-connection queue.
pub fn listen(id: SocketId, backlog: usize) -> NetResult<()> {
    SOCKETS
        .with_socket(id, |sock| match &mut sock.kind {
            ProtoState::Unix(state) => {
                state.backlog = backlog;
                sock.state = SockState::Listening;
                Ok(())
            }
            _ => Err(NetError::Invalid),
        })
        .ok_or(NetError::Invalid)?
}

fn find_listener(path: &UnixAddr) -> Option<SocketId> {
    SOCKETS.collect_matching(|s| match &s.kind {
        ProtoState::Unix(state) => {
            s.state == SockState::Listening && state.path.as_ref() == Some(path)
        }
        _ => false,
    })
    .into_iter()
    .next()
}

/// `connect`: walks the server's accept queue. `ECONNREFUSED` if the
/// path has no listener or the listener's queue is full;
/// non-blocking callers see `EAGAIN` when a retry might succeed once
/// the server calls `accept`.
pub fn connect(id: SocketId, path: UnixAddr) -> NetResult<()> {
    let listener = find_listener(&path).ok_or(NetError::NotFound)?;
    let queued = SOCKETS
        .with_socket(listener, |server| match &mut server.kind {
            ProtoState::Unix(state) => {
                if state.accept_queue.len() >= state.backlog.max(1) {
                    Err(NetError::Again)
                } else {
                    state.accept_queue.push_back(id);
                    Ok(())
                }
            }
            _ => Err(NetError::Invalid),
        })
        .ok_or(NetError::NotFound)?;
    queued?;
    SOCKETS
        .with_socket(id, |sock| {
            sock.state = SockState::Connecting;
            sock.paired = Some(listener);
        })
        .ok_or(NetError::Invalid)
}

/// `accept` on a Unix listener completes the pairing the connecting
/// side started: both sockets end up with `paired` set to each other.
pub fn finish_accept(listener: SocketId, client: SocketId) -> NetResult<()> {
    SOCKETS
        .with_socket(client, |sock| {
            sock.state = SockState::Connected;
            sock.paired = Some(listener);
        })
        .ok_or(NetError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{Family, SockType};
    use crate::socket::UnixState;
    use multios_scheduler::task::Credentials;

    fn unix_socket() -> SocketId {
        SOCKETS.new_socket(
            Family::Inet,
            SockType::Stream,
            0,
            Credentials::default(),
            ProtoState::Unix(UnixState::default()),
        )
    }

    #[test]
    fn connect_without_listener_is_not_found() {
        let client = unix_socket();
        let err = connect(client, UnixAddr("/tmp/none".into())).unwrap_err();
        assert_eq!(err, NetError::NotFound);
        crate::socket::close(client).unwrap();
    }

    #[test]
    fn connect_queues_on_listener_accept_queue() {
        let server = unix_socket();
        SOCKETS
            .with_socket(server, |s| {
                if let ProtoState::Unix(state) = &mut s.kind {
                    state.path = Some(UnixAddr("/tmp/srv".into()));
                }
            })
            .unwrap();
        listen(server, 4).unwrap();

        let client = unix_socket();
        connect(client, UnixAddr("/tmp/srv".into())).unwrap();

        let accepted = crate::socket::accept(server).unwrap();
        assert_eq!(accepted, client);

        crate::socket::close(server).unwrap();
        crate::socket::close(client).unwrap();
    }

    #[test]
    fn connect_beyond_backlog_is_again() {
        let server = unix_socket();
        SOCKETS
            .with_socket(server, |s| {
                if let ProtoState::Unix(state) = &mut s.kind {
                    state.path = Some(UnixAddr("/tmp/busy".into()));
                }
            })
            .unwrap();
        listen(server, 1).unwrap();

        let c1 = unix_socket();
        connect(c1, UnixAddr("/tmp/busy".into())).unwrap();
        let c2 = unix_socket();
        let err = connect(c2, UnixAddr("/tmp/busy".into())).unwrap_err();
        assert_eq!(err, NetError::Again);

        crate::socket::close(server).unwrap();
        crate::socket::close(c1).unwrap();
        crate::socket::close(c2).unwrap();
    }
}
