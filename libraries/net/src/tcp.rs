//! TCP per-connection state and the input/output state machine
//! (§3.7, §4.J). RFC 793 transitions plus RFC 6298 RTT estimation,
//! SACK, out-of-order reassembly and delayed ACKs.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use crate::socket::SocketId;
use crate::wire::{pseudo_header_checksum, Ipv4Addr, SackBlock, TcpFlags, TcpHeader, TcpOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TcpConnFlags: u8 {
        const FIN_OBSERVED = 1 << 0;
        const PSH_OBSERVED = 1 << 1;
    }
}

pub const TCP_CONN_RETRIES: u32 = 5;
pub const TCP_MAX_RTO_MS: u32 = 3 * 60 * 1000;
pub const TCP_MIN_RTO_MS: u32 = 200;
pub const TCP_DELACK_MS: u32 = 200;
pub const TCP_DELACK_BYTES: u32 = 1000;
pub const TCP_MSL_MS: u32 = 2 * 60 * 1000;

/// RFC 6298 constants: α = 1/8, β = 1/4, expressed as shift amounts.
const ALPHA_SHIFT: u32 = 3;
const BETA_SHIFT: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct OutqEntry {
    pub seq: u32,
    pub end_seq: u32,
    pub retransmitted: bool,
}

#[derive(Debug)]
pub struct TcpPcb {
    pub tcp_state: TcpState,
    pub iss: u32,
    pub irs: u32,
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_wnd: u32,
    pub snd_wl1: u32,
    pub snd_up: u32,
    pub rcv_nxt: u32,
    pub rcv_wnd: u32,
    pub smss: u16,
    pub rmss: u16,
    pub sackok: bool,
    pub sack_allowed: bool,
    pub sacks: [Option<SackBlock>; 4],
    /// Out-of-order segments, keyed by starting sequence number.
    pub ofoq: BTreeMap<u32, Vec<u8>>,
    pub outq: VecDeque<OutqEntry>,
    pub inflight: bool,
    pub backoff: u32,
    pub rto_ms: u32,
    pub srtt_ms: Option<u32>,
    pub rttvar_ms: u32,
    pub tsopt: bool,
    pub tsrecent: u32,
    pub delacks: u32,
    pub bytes_since_ack: u32,
    pub linger_ticks: u32,
    pub flags: TcpConnFlags,
    pub accept_queue: VecDeque<SocketId>,
    pub backlog: usize,
}

impl TcpPcb {
    pub fn new(iss: u32) -> Self {
        TcpPcb {
            tcp_state: TcpState::Closed,
            iss,
            irs: 0,
            snd_una: iss,
            snd_nxt: iss,
            snd_wnd: 0,
            snd_wl1: 0,
            snd_up: 0,
            rcv_nxt: 0,
            rcv_wnd: 65535,
            smss: 536,
            rmss: 536,
            sackok: false,
            sack_allowed: false,
            sacks: [None; 4],
            ofoq: BTreeMap::new(),
            outq: VecDeque::new(),
            inflight: false,
            backoff: 0,
            rto_ms: TCP_MIN_RTO_MS,
            srtt_ms: None,
            rttvar_ms: 0,
            tsopt: false,
            tsrecent: 0,
            delacks: 0,
            bytes_since_ack: 0,
            linger_ticks: 0,
            flags: TcpConnFlags::empty(),
            accept_queue: VecDeque::new(),
            backlog: 0,
        }
    }

    /// Whether `seq` is data the receiver currently accepts: within
    /// `[rcv_nxt, rcv_nxt + rcv_wnd)`.
    pub fn seq_acceptable(&self, seq: u32) -> bool {
        let window_end = self.rcv_nxt.wrapping_add(self.rcv_wnd);
        if self.rcv_wnd == 0 {
            return seq == self.rcv_nxt;
        }
        seq_in_window(seq, self.rcv_nxt, window_end)
    }
}

fn seq_in_window(seq: u32, lo: u32, hi: u32) -> bool {
    seq.wrapping_sub(lo) < hi.wrapping_sub(lo)
}

fn seq_le(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) >= 0
}

/// Builds the TCP options this connection currently advertises.
fn build_options(pcb: &TcpPcb, syn: bool) -> TcpOptions {
    let mut opts = TcpOptions::default();
    if syn {
        opts.mss = Some(pcb.rmss);
        opts.sack_permitted = pcb.sack_allowed;
    } else if pcb.sackok {
        opts.sack_blocks = pcb.sacks;
    }
    if pcb.tsopt {
        opts.timestamp = Some((0, pcb.tsrecent));
    }
    opts
}

/// `tcp_transmit`: fills in the header (seq/ack/window/options),
/// computes the pseudo-header checksum, and returns the wire bytes
/// ready for IPv4. The network-interface send itself is the caller's
/// job (it owns the `NetInterface`/ARP lookup).
pub fn tcp_transmit(
    pcb: &TcpPcb,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seqno: u32,
    flags: TcpFlags,
    payload: &[u8],
) -> Vec<u8> {
    let header = TcpHeader {
        src_port,
        dst_port,
        seq: seqno,
        ack: pcb.rcv_nxt,
        flags,
        window: pcb.rcv_wnd.min(u16::MAX as u32) as u16,
        checksum: 0,
        urgent_ptr: 0,
        options: build_options(pcb, flags.contains(TcpFlags::SYN)),
    };
    header.encode(src, dst, payload)
}

/// `tcp_send_syn`: `CLOSED -> SYN_SENT`, `snd_nxt` advances past the
/// implicit SYN byte.
pub fn tcp_send_syn(pcb: &mut TcpPcb) {
    pcb.tcp_state = TcpState::SynSent;
    pcb.snd_nxt = pcb.iss.wrapping_add(1);
    pcb.outq.push_back(OutqEntry {
        seq: pcb.iss,
        end_seq: pcb.iss.wrapping_add(1),
        retransmitted: false,
    });
    pcb.inflight = true;
}

/// `shutdown(SHUT_WR)` on an established connection: send FIN and
/// move to the closing half of the state machine.
pub fn shutdown_write(pcb: &mut TcpPcb) {
    match pcb.tcp_state {
        TcpState::Established => {
            pcb.tcp_state = TcpState::FinWait1;
            pcb.outq.push_back(OutqEntry {
                seq: pcb.snd_nxt,
                end_seq: pcb.snd_nxt.wrapping_add(1),
                retransmitted: false,
            });
            pcb.snd_nxt = pcb.snd_nxt.wrapping_add(1);
        }
        TcpState::CloseWait => {
            pcb.tcp_state = TcpState::LastAck;
            pcb.outq.push_back(OutqEntry {
                seq: pcb.snd_nxt,
                end_seq: pcb.snd_nxt.wrapping_add(1),
                retransmitted: false,
            });
            pcb.snd_nxt = pcb.snd_nxt.wrapping_add(1);
        }
        _ => {}
    }
}

/// Drains `ofoq` entries that have become contiguous with `rcv_nxt`
/// after an in-order segment arrived, appending their bytes to `out`.
fn drain_ofo(pcb: &mut TcpPcb, out: &mut Vec<u8>) {
    loop {
        let Some((&seq, _)) = pcb.ofoq.iter().next() else {
            break;
        };
        if seq != pcb.rcv_nxt {
            break;
        }
        let data = pcb.ofoq.remove(&seq).unwrap();
        pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(data.len() as u32);
        out.extend_from_slice(&data);
    }
}

fn recompute_sacks(pcb: &mut TcpPcb) {
    pcb.sacks = [None; 4];
    for (i, (&seq, data)) in pcb.ofoq.iter().take(4).enumerate() {
        pcb.sacks[i] = Some(SackBlock {
            left: seq,
            right: seq.wrapping_add(data.len() as u32),
        });
    }
}

/// RFC 6298 RTT sample update. Skipped entirely for retransmitted
/// segments per Karn's algorithm (caller must not invoke this when
/// the acked entry was marked `retransmitted`).
pub fn update_rtt(pcb: &mut TcpPcb, sample_ms: u32) {
    match pcb.srtt_ms {
        None => {
            pcb.srtt_ms = Some(sample_ms);
            pcb.rttvar_ms = sample_ms / 2;
        }
        Some(srtt) => {
            let diff = srtt.abs_diff(sample_ms);
            pcb.rttvar_ms = pcb.rttvar_ms - (pcb.rttvar_ms >> BETA_SHIFT) + (diff >> BETA_SHIFT);
            let new_srtt = srtt - (srtt >> ALPHA_SHIFT) + (sample_ms >> ALPHA_SHIFT);
            pcb.srtt_ms = Some(new_srtt);
        }
    }
    let srtt = pcb.srtt_ms.unwrap();
    pcb.rto_ms = (srtt + 4 * pcb.rttvar_ms).max(TCP_MIN_RTO_MS);
}

pub enum InputOutcome {
    Ok { delivered: Vec<u8>, should_ack_now: bool },
    ChallengeAck,
    Reset,
    Dropped,
}

/// One step of input processing (§4.J, steps 1-7). The caller is
/// responsible for actually transmitting whatever `tcp_transmit`
/// calls this triggers via the returned `InputOutcome`.
pub fn tcp_input(
    pcb: &mut TcpPcb,
    header: &TcpHeader,
    payload: &[u8],
    now_ms: u32,
) -> InputOutcome {
    if header.flags.contains(TcpFlags::RST) {
        pcb.tcp_state = match pcb.tcp_state {
            TcpState::Established
            | TcpState::FinWait1
            | TcpState::FinWait2
            | TcpState::CloseWait => TcpState::TimeWait,
            _ => TcpState::Closed,
        };
        return InputOutcome::Reset;
    }

    if header.flags.contains(TcpFlags::SYN) && pcb.tcp_state != TcpState::Listen {
        return InputOutcome::ChallengeAck;
    }

    if !header.flags.contains(TcpFlags::ACK) {
        return InputOutcome::Dropped;
    }

    // step 4: advance snd_una, retire acked out-queue entries, sample RTT.
    if seq_le(pcb.snd_una, header.ack) && seq_le(header.ack, pcb.snd_nxt) {
        let acked_entry = pcb
            .outq
            .front()
            .filter(|e| seq_le(e.end_seq, header.ack))
            .copied();
        pcb.snd_una = header.ack;
        while let Some(front) = pcb.outq.front() {
            if seq_le(front.end_seq, header.ack) {
                pcb.outq.pop_front();
            } else {
                break;
            }
        }
        if pcb.outq.is_empty() {
            pcb.inflight = false;
            pcb.backoff = 0;
        }
        if let Some(entry) = acked_entry {
            if !entry.retransmitted {
                let sample = now_ms.wrapping_sub(pcb.tsrecent);
                update_rtt(pcb, sample);
            }
        }
    }

    let mut delivered = Vec::new();
    if !payload.is_empty() {
        if header.seq == pcb.rcv_nxt {
            pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(payload.len() as u32);
            delivered.extend_from_slice(payload);
            drain_ofo(pcb, &mut delivered);
        } else if pcb.seq_acceptable(header.seq) {
            pcb.ofoq.insert(header.seq, payload.to_vec());
        }
        if pcb.sackok {
            recompute_sacks(pcb);
        }
    }

    if header.flags.contains(TcpFlags::PSH) {
        pcb.flags.insert(TcpConnFlags::PSH_OBSERVED);
    }

    let mut should_ack_now = header.flags.contains(TcpFlags::PSH);

    if header.flags.contains(TcpFlags::FIN) && header.seq.wrapping_add(payload.len() as u32) == pcb.rcv_nxt
    {
        pcb.rcv_nxt = pcb.rcv_nxt.wrapping_add(1);
        pcb.flags.insert(TcpConnFlags::FIN_OBSERVED);
        should_ack_now = true;
        pcb.tcp_state = match pcb.tcp_state {
            TcpState::Established => TcpState::CloseWait,
            TcpState::FinWait1 => TcpState::Closing,
            TcpState::FinWait2 => TcpState::TimeWait,
            other => other,
        };
    }

    pcb.bytes_since_ack += payload.len() as u32;
    if pcb.bytes_since_ack > TCP_DELACK_BYTES {
        should_ack_now = true;
    }
    if should_ack_now {
        pcb.bytes_since_ack = 0;
        pcb.delacks = 0;
    } else {
        pcb.delacks += 1;
        if pcb.delacks >= 2 {
            should_ack_now = true;
            pcb.delacks = 0;
        }
    }

    InputOutcome::Ok {
        delivered,
        should_ack_now,
    }
}

/// Retransmission timer fire: doubles `rto`, retransmits the
/// out-queue head, aborts past 3 minutes of backoff.
pub fn on_retransmit_timer(pcb: &mut TcpPcb) -> Result<(), ()> {
    if pcb.outq.is_empty() {
        pcb.inflight = false;
        return Ok(());
    }
    let doubled = pcb.rto_ms * 2;
    pcb.backoff += 1;
    if let Some(front) = pcb.outq.front_mut() {
        front.retransmitted = true;
    }
    if doubled > TCP_MAX_RTO_MS {
        pcb.rto_ms = TCP_MAX_RTO_MS;
        pcb.tcp_state = TcpState::Closed;
        return Err(());
    }
    pcb.rto_ms = doubled;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::TcpFlags;

    fn established_pcb() -> TcpPcb {
        let mut pcb = TcpPcb::new(1000);
        pcb.tcp_state = TcpState::Established;
        pcb.rcv_nxt = 500;
        pcb.snd_nxt = 1001;
        pcb
    }

    #[test]
    fn send_syn_transitions_and_advances_snd_nxt() {
        let mut pcb = TcpPcb::new(1000);
        tcp_send_syn(&mut pcb);
        assert_eq!(pcb.tcp_state, TcpState::SynSent);
        assert_eq!(pcb.snd_nxt, 1001);
        assert!(pcb.inflight);
    }

    #[test]
    fn in_order_segment_advances_rcv_nxt_and_delivers() {
        let mut pcb = established_pcb();
        let header = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 500,
            ack: 1001,
            flags: TcpFlags::ACK,
            window: 1000,
            checksum: 0,
            urgent_ptr: 0,
            options: TcpOptions::default(),
        };
        let outcome = tcp_input(&mut pcb, &header, b"hello", 0);
        match outcome {
            InputOutcome::Ok { delivered, .. } => assert_eq!(delivered, b"hello"),
            _ => panic!("expected Ok"),
        }
        assert_eq!(pcb.rcv_nxt, 505);
    }

    #[test]
    fn out_of_order_segment_queues_then_drains_on_fill() {
        let mut pcb = established_pcb();
        let mut header = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 505,
            ack: 1001,
            flags: TcpFlags::ACK,
            window: 1000,
            checksum: 0,
            urgent_ptr: 0,
            options: TcpOptions::default(),
        };
        tcp_input(&mut pcb, &header, b"world", 0);
        assert_eq!(pcb.rcv_nxt, 500);
        assert_eq!(pcb.ofoq.len(), 1);

        header.seq = 500;
        let outcome = tcp_input(&mut pcb, &header, b"hello", 0);
        match outcome {
            InputOutcome::Ok { delivered, .. } => assert_eq!(delivered, b"helloworld"),
            _ => panic!("expected Ok"),
        }
        assert_eq!(pcb.rcv_nxt, 510);
        assert!(pcb.ofoq.is_empty());
    }

    #[test]
    fn rst_moves_established_to_time_wait() {
        let mut pcb = established_pcb();
        let header = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 500,
            ack: 1001,
            flags: TcpFlags::RST,
            window: 0,
            checksum: 0,
            urgent_ptr: 0,
            options: TcpOptions::default(),
        };
        let outcome = tcp_input(&mut pcb, &header, &[], 0);
        assert!(matches!(outcome, InputOutcome::Reset));
        assert_eq!(pcb.tcp_state, TcpState::TimeWait);
    }

    #[test]
    fn ack_retires_outq_and_clears_inflight() {
        let mut pcb = established_pcb();
        pcb.outq.push_back(OutqEntry {
            seq: 1000,
            end_seq: 1001,
            retransmitted: false,
        });
        pcb.inflight = true;
        let header = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 500,
            ack: 1001,
            flags: TcpFlags::ACK,
            window: 1000,
            checksum: 0,
            urgent_ptr: 0,
            options: TcpOptions::default(),
        };
        tcp_input(&mut pcb, &header, &[], 0);
        assert!(pcb.outq.is_empty());
        assert!(!pcb.inflight);
        assert_eq!(pcb.snd_una, 1001);
    }

    #[test]
    fn retransmit_timer_doubles_rto_and_aborts_past_cap() {
        let mut pcb = established_pcb();
        pcb.outq.push_back(OutqEntry {
            seq: 1000,
            end_seq: 1001,
            retransmitted: false,
        });
        pcb.rto_ms = TCP_MAX_RTO_MS / 2 + 1;
        assert!(on_retransmit_timer(&mut pcb).is_err());
        assert_eq!(pcb.tcp_state, TcpState::Closed);
    }

    #[test]
    fn retransmit_at_exactly_three_minutes_survives_one_more_step_aborts() {
        let mut pcb = established_pcb();
        pcb.outq.push_back(OutqEntry {
            seq: 1000,
            end_seq: 1001,
            retransmitted: false,
        });
        pcb.rto_ms = TCP_MAX_RTO_MS / 2;
        assert!(on_retransmit_timer(&mut pcb).is_ok());
        assert_eq!(pcb.rto_ms, TCP_MAX_RTO_MS);
        assert_ne!(pcb.tcp_state, TcpState::Closed);

        assert!(on_retransmit_timer(&mut pcb).is_err());
        assert_eq!(pcb.tcp_state, TcpState::Closed);
    }

    #[test]
    fn checksum_covers_pseudo_header() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let bytes = pseudo_header_checksum(src, dst, crate::wire::IPPROTO_TCP, b"abc");
        assert_ne!(bytes, 0);
    }
}
