//! DHCP client state machine (§3.8, §4.M): INIT -> SELECTING ->
//! REQUESTING -> (CHECKING) -> BOUND -> RENEWING -> REBINDING, with
//! option TLV parsing/emission and ARP-probe address conflict
//! detection.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::wire::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Init,
    Selecting,
    Requesting,
    Checking,
    Bound,
    Renewing,
    Rebinding,
    Declining,
    Releasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpError {
    Nak,
    Timeout,
    BadPacket,
}

pub const DHCP_MAGIC_COOKIE: u32 = 0x6382_5363;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_MIN_OPTIONS_LEN: usize = 64;
pub const DHCP_MAX_CHECKING_TRIES: u32 = 16;
pub const DHCP_DECLINE_DELAY_MS: u32 = 10_000;

pub const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS: u8 = 6;
pub const OPT_DOMAIN_NAME: u8 = 15;
pub const OPT_NTP: u8 = 42;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_RENEWAL_T1: u8 = 58;
pub const OPT_REBINDING_T2: u8 = 59;
pub const OPT_OVERLOAD: u8 = 52;
pub const OPT_END: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
}

/// Per-interface binding (§3.8). Timer handles and the task that owns
/// this binding are the syscall/scheduler layer's concern; this
/// struct is the pure state the transitions below operate on.
#[derive(Debug)]
pub struct Binding {
    pub xid: u32,
    pub state: DhcpState,
    pub ipaddr: Ipv4Addr,
    pub server_addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub dns: [Ipv4Addr; 2],
    pub ntp: [Ipv4Addr; 2],
    pub t1_s: u32,
    pub t2_s: u32,
    pub lease_s: u32,
    pub binding_time_ms: u32,
    pub tries: u32,
}

impl Binding {
    pub fn new(xid: u32) -> Self {
        Binding {
            xid,
            state: DhcpState::Init,
            ipaddr: Ipv4Addr::UNSPECIFIED,
            server_addr: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            broadcast: Ipv4Addr::BROADCAST,
            dns: [Ipv4Addr::UNSPECIFIED; 2],
            ntp: [Ipv4Addr::UNSPECIFIED; 2],
            t1_s: 0,
            t2_s: 0,
            lease_s: 0,
            binding_time_ms: 0,
            tries: 0,
        }
    }

    /// `INIT -> SELECTING`: the caller broadcasts DHCPDISCOVER.
    pub fn start(&mut self) {
        self.state = DhcpState::Selecting;
        self.tries = 0;
    }

    /// `SELECTING -> REQUESTING` on DHCPOFFER.
    pub fn on_offer(&mut self, offered: &OfferInfo) {
        if self.state != DhcpState::Selecting {
            return;
        }
        self.server_addr = offered.server_id;
        self.ipaddr = offered.yiaddr;
        self.state = DhcpState::Requesting;
        self.tries = 0;
    }

    /// `REQUESTING -> CHECKING` on DHCPACK: records lease parameters
    /// and kicks off the ARP probe; caller sends the probe itself.
    pub fn on_ack(&mut self, ack: &AckInfo, now_ms: u32) {
        match self.state {
            DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding => {
                self.netmask = ack.netmask;
                self.gateway = ack.gateway;
                self.dns = ack.dns;
                self.ntp = ack.ntp;
                self.lease_s = ack.lease_s;
                self.t1_s = ack.t1_s.unwrap_or(self.lease_s / 2);
                self.t2_s = ack.t2_s.unwrap_or(self.lease_s * 7 / 8);
                self.binding_time_ms = now_ms;
                if self.state == DhcpState::Requesting {
                    self.state = DhcpState::Checking;
                    self.tries = 0;
                } else {
                    self.state = DhcpState::Bound;
                }
            }
            _ => {}
        }
    }

    /// `REQUESTING -> SELECTING` on DHCPNAK.
    pub fn on_nak(&mut self) {
        if matches!(
            self.state,
            DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding
        ) {
            self.state = DhcpState::Selecting;
            self.tries = 0;
        }
    }

    /// ARP probe came back with a reply: someone else already holds
    /// the address. `CHECKING -> DECLINING`.
    pub fn on_arp_conflict(&mut self) {
        if self.state == DhcpState::Checking {
            self.state = DhcpState::Declining;
        }
    }

    /// ARP probe timeout with no reply, backoff capped at
    /// `DHCP_MAX_CHECKING_TRIES`: `CHECKING -> BOUND` once exhausted.
    pub fn on_arp_probe_timeout(&mut self, now_ms: u32) -> bool {
        if self.state != DhcpState::Checking {
            return false;
        }
        self.tries += 1;
        if self.tries >= DHCP_MAX_CHECKING_TRIES {
            self.state = DhcpState::Bound;
            self.binding_time_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// T1 fires: `BOUND -> RENEWING`.
    pub fn on_t1(&mut self) {
        if self.state == DhcpState::Bound {
            self.state = DhcpState::Renewing;
        }
    }

    /// T2 fires: `RENEWING -> REBINDING`.
    pub fn on_t2(&mut self) {
        if self.state == DhcpState::Renewing {
            self.state = DhcpState::Rebinding;
        }
    }

    /// Lease expiry: `REBINDING -> INIT`.
    pub fn on_lease_expiry(&mut self) {
        if self.state == DhcpState::Rebinding {
            self.state = DhcpState::Init;
            self.ipaddr = Ipv4Addr::UNSPECIFIED;
        }
    }

    /// `DECLINING -> SELECTING` after the fixed 10 s hold-off.
    pub fn on_decline_delay_elapsed(&mut self) {
        if self.state == DhcpState::Declining {
            self.state = DhcpState::Selecting;
            self.tries = 0;
        }
    }

    /// SELECTING/REQUESTING retransmission: `min(tries, 16) * 4s`.
    pub fn retransmit_delay_ms(&self) -> u32 {
        self.tries.min(16) * 4_000
    }

    /// CHECKING uses a fixed short probe interval.
    pub fn checking_delay_ms(&self) -> u32 {
        500
    }

    /// RENEWING retransmission: half the remaining time to T2, floored
    /// at 60 s.
    pub fn renew_delay_ms(&self, now_ms: u32) -> u32 {
        let deadline = self.binding_time_ms + self.t2_s * 1000;
        let remaining = deadline.saturating_sub(now_ms);
        (remaining / 2).max(60_000)
    }

    /// REBINDING retransmission: half the remaining time to lease
    /// expiry, floored at 60 s.
    pub fn rebind_delay_ms(&self, now_ms: u32) -> u32 {
        let deadline = self.binding_time_ms + self.lease_s * 1000;
        let remaining = deadline.saturating_sub(now_ms);
        (remaining / 2).max(60_000)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OfferInfo {
    pub server_id: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
}

#[derive(Debug, Clone, Copy)]
pub struct AckInfo {
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: [Ipv4Addr; 2],
    pub ntp: [Ipv4Addr; 2],
    pub lease_s: u32,
    pub t1_s: Option<u32>,
    pub t2_s: Option<u32>,
}

/// Parsed option set, keyed by option code. `OPTION_OVERLOAD` handling
/// is the caller's job: it decides whether to re-run this parser over
/// `sname`/`file` as continuation bytes before trusting the result.
#[derive(Debug, Default)]
pub struct ParsedOptions {
    pub raw: BTreeMap<u8, Vec<u8>>,
}

impl ParsedOptions {
    pub fn message_type(&self) -> Option<u8> {
        self.raw.get(&OPT_MESSAGE_TYPE).and_then(|v| v.first().copied())
    }

    pub fn ipv4(&self, code: u8) -> Option<Ipv4Addr> {
        let bytes = self.raw.get(&code)?;
        if bytes.len() >= 4 {
            Some(Ipv4Addr([bytes[0], bytes[1], bytes[2], bytes[3]]))
        } else {
            None
        }
    }

    pub fn u32_field(&self, code: u8) -> Option<u32> {
        let bytes = self.raw.get(&code)?;
        if bytes.len() >= 4 {
            Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        } else {
            None
        }
    }

    pub fn overload(&self) -> Option<u8> {
        self.raw.get(&OPT_OVERLOAD).and_then(|v| v.first().copied())
    }
}

/// Parses the options area of a DHCP packet, stopping at `OPT_END` or
/// the end of the buffer. Does not itself resolve `OPTION_OVERLOAD`;
/// call again over the `sname`/`file` fields and merge if the option
/// is present, per §4.M.
pub fn parse_options(data: &[u8]) -> ParsedOptions {
    let mut opts = ParsedOptions::default();
    let mut i = 0usize;
    while i < data.len() {
        match data[i] {
            OPT_PAD => i += 1,
            OPT_END => break,
            code => {
                if i + 1 >= data.len() {
                    break;
                }
                let len = data[i + 1] as usize;
                let start = i + 2;
                let end = (start + len).min(data.len());
                opts.raw.insert(code, data[start..end].to_vec());
                i = start + len;
            }
        }
    }
    opts
}

/// Emits a single TLV, used by the discover/request/decline/release
/// packet builders.
pub fn encode_option(buf: &mut Vec<u8>, code: u8, value: &[u8]) {
    buf.push(code);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
}

/// Pads the options area up to `DHCP_MIN_OPTIONS_LEN` with zero bytes
/// after the terminating `OPT_END`, per §6.2.
pub fn pad_options(buf: &mut Vec<u8>) {
    buf.push(OPT_END);
    while buf.len() < DHCP_MIN_OPTIONS_LEN {
        buf.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_transitions_in_order() {
        let mut b = Binding::new(42);
        b.start();
        assert_eq!(b.state, DhcpState::Selecting);

        b.on_offer(&OfferInfo {
            server_id: Ipv4Addr::new(192, 0, 2, 1),
            yiaddr: Ipv4Addr::new(192, 0, 2, 50),
        });
        assert_eq!(b.state, DhcpState::Requesting);

        b.on_ack(
            &AckInfo {
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 0, 2, 1),
                dns: [Ipv4Addr::UNSPECIFIED; 2],
                ntp: [Ipv4Addr::UNSPECIFIED; 2],
                lease_s: 3600,
                t1_s: Some(1800),
                t2_s: Some(3150),
            },
            0,
        );
        assert_eq!(b.state, DhcpState::Checking);
        assert_eq!(b.t1_s, 1800);
        assert_eq!(b.t2_s, 3150);

        let bound = b.on_arp_probe_timeout(100);
        assert!(!bound);
        for _ in 1..DHCP_MAX_CHECKING_TRIES {
            b.on_arp_probe_timeout(100);
        }
        assert_eq!(b.state, DhcpState::Bound);
    }

    #[test]
    fn arp_conflict_declines() {
        let mut b = Binding::new(1);
        b.state = DhcpState::Checking;
        b.on_arp_conflict();
        assert_eq!(b.state, DhcpState::Declining);
        b.on_decline_delay_elapsed();
        assert_eq!(b.state, DhcpState::Selecting);
    }

    #[test]
    fn nak_during_requesting_returns_to_selecting() {
        let mut b = Binding::new(1);
        b.state = DhcpState::Requesting;
        b.on_nak();
        assert_eq!(b.state, DhcpState::Selecting);
    }

    #[test]
    fn renew_rebind_and_expiry_chain() {
        let mut b = Binding::new(1);
        b.state = DhcpState::Bound;
        b.on_t1();
        assert_eq!(b.state, DhcpState::Renewing);
        b.on_t2();
        assert_eq!(b.state, DhcpState::Rebinding);
        b.on_lease_expiry();
        assert_eq!(b.state, DhcpState::Init);
    }

    #[test]
    fn retransmit_delay_caps_at_16_tries() {
        let mut b = Binding::new(1);
        b.tries = 100;
        assert_eq!(b.retransmit_delay_ms(), 16 * 4_000);
    }

    #[test]
    fn option_round_trip_through_parser() {
        let mut buf = Vec::new();
        encode_option(&mut buf, OPT_MESSAGE_TYPE, &[MessageType::Offer as u8]);
        encode_option(&mut buf, OPT_SUBNET_MASK, &[255, 255, 255, 0]);
        pad_options(&mut buf);

        let parsed = parse_options(&buf);
        assert_eq!(parsed.message_type(), Some(MessageType::Offer as u8));
        assert_eq!(
            parsed.ipv4(OPT_SUBNET_MASK),
            Some(Ipv4Addr::new(255, 255, 255, 0))
        );
    }

    #[test]
    fn renew_delay_floors_at_60_seconds() {
        let mut b = Binding::new(1);
        b.binding_time_ms = 0;
        b.t2_s = 10; // deadline already passed at now_ms=20_000
        assert_eq!(b.renew_delay_ms(20_000), 60_000);
    }
}
