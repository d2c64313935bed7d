//! Wire formats (§6.2): the IPv4 pseudo-header checksum, TCP header and
//! option parsing/emission, and the UDP header. IPv6 is out of scope —
//! [`Family::Inet6`] exists only so callers can reject it uniformly.

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr([0, 0, 0, 0]);
    pub const BROADCAST: Ipv4Addr = Ipv4Addr([255, 255, 255, 255]);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Addr([a, b, c, d])
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn from_u32(v: u32) -> Self {
        Ipv4Addr(v.to_be_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Inet,
    Inet6,
}

/// One's-complement sum-then-fold checksum shared by the IPv4
/// pseudo-header, TCP, and UDP.
pub fn checksum16(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// `{src, dst, zero, proto, length}` pseudo-header checksum input for
/// TCP and UDP over IPv4.
pub fn pseudo_header_checksum(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, segment: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(12 + segment.len() + 1);
    buf.extend_from_slice(&src.0);
    buf.extend_from_slice(&dst.0);
    buf.push(0);
    buf.push(proto);
    buf.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    buf.extend_from_slice(segment);
    checksum16(&buf)
}

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

// --- TCP -----------------------------------------------------------

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackBlock {
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TcpOptions {
    pub mss: Option<u16>,
    pub sack_permitted: bool,
    pub sack_blocks: [Option<SackBlock>; 4],
    pub timestamp: Option<(u32, u32)>, // (tsval, tsecr)
    pub window_scale: Option<u8>,
}

pub const TCPOPT_EOL: u8 = 0;
pub const TCPOPT_NOP: u8 = 1;
pub const TCPOPT_MAXSEG: u8 = 2;
pub const TCPOPT_WINDOW: u8 = 3;
pub const TCPOPT_SACK_PERMITTED: u8 = 4;
pub const TCPOPT_SACK: u8 = 5;
pub const TCPOPT_TIMESTAMP: u8 = 8;

#[derive(Debug, Clone)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
    pub options: TcpOptions,
}

/// `hlen` is in 4-byte units, matching the on-wire data-offset field.
fn header_len_words(options_len: usize) -> u8 {
    let total = 20 + options_len;
    (((total + 3) / 4) * 4 / 4) as u8
}

fn encode_options(opts: &TcpOptions) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mss) = opts.mss {
        buf.push(TCPOPT_MAXSEG);
        buf.push(4);
        buf.extend_from_slice(&mss.to_be_bytes());
    }
    if opts.sack_permitted {
        buf.push(TCPOPT_SACK_PERMITTED);
        buf.push(2);
    }
    if let Some((tsval, tsecr)) = opts.timestamp {
        buf.push(TCPOPT_TIMESTAMP);
        buf.push(10);
        buf.extend_from_slice(&tsval.to_be_bytes());
        buf.extend_from_slice(&tsecr.to_be_bytes());
    }
    let present_sacks: Vec<&SackBlock> = opts.sack_blocks.iter().flatten().collect();
    if !present_sacks.is_empty() {
        buf.push(TCPOPT_SACK);
        buf.push((2 + 8 * present_sacks.len()) as u8);
        for block in present_sacks {
            buf.extend_from_slice(&block.left.to_be_bytes());
            buf.extend_from_slice(&block.right.to_be_bytes());
        }
    }
    while buf.len() % 4 != 0 {
        buf.push(TCPOPT_NOP);
    }
    buf
}

fn parse_options(data: &[u8]) -> TcpOptions {
    let mut opts = TcpOptions::default();
    let mut i = 0usize;
    let mut sack_idx = 0usize;
    while i < data.len() {
        match data[i] {
            TCPOPT_EOL => break,
            TCPOPT_NOP => i += 1,
            TCPOPT_MAXSEG if i + 4 <= data.len() => {
                opts.mss = Some(u16::from_be_bytes([data[i + 2], data[i + 3]]));
                i += 4;
            }
            TCPOPT_WINDOW if i + 3 <= data.len() => {
                opts.window_scale = Some(data[i + 2]);
                i += 3;
            }
            TCPOPT_SACK_PERMITTED if i + 2 <= data.len() => {
                opts.sack_permitted = true;
                i += 2;
            }
            TCPOPT_TIMESTAMP if i + 10 <= data.len() => {
                let tsval = u32::from_be_bytes(data[i + 2..i + 6].try_into().unwrap());
                let tsecr = u32::from_be_bytes(data[i + 6..i + 10].try_into().unwrap());
                opts.timestamp = Some((tsval, tsecr));
                i += 10;
            }
            TCPOPT_SACK if i + 1 < data.len() => {
                let opt_len = data[i + 1] as usize;
                let mut j = i + 2;
                while j + 8 <= i + opt_len && sack_idx < opts.sack_blocks.len() {
                    let left = u32::from_be_bytes(data[j..j + 4].try_into().unwrap());
                    let right = u32::from_be_bytes(data[j + 4..j + 8].try_into().unwrap());
                    opts.sack_blocks[sack_idx] = Some(SackBlock { left, right });
                    sack_idx += 1;
                    j += 8;
                }
                i += opt_len.max(2);
            }
            _ => {
                if i + 1 < data.len() {
                    let opt_len = (data[i + 1] as usize).max(1);
                    i += opt_len;
                } else {
                    break;
                }
            }
        }
    }
    opts
}

impl TcpHeader {
    /// Serializes the header plus options (NOP-padded to a 4-byte
    /// boundary) followed by `payload`, with `checksum` computed over
    /// the IPv4 pseudo-header per `pseudo_header_checksum`.
    pub fn encode(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
        let opts = encode_options(&self.options);
        let hlen = header_len_words(opts.len());
        let mut buf = Vec::with_capacity(hlen as usize * 4 + payload.len());
        buf.extend_from_slice(&self.src_port.to_be_bytes());
        buf.extend_from_slice(&self.dst_port.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.push(hlen << 4);
        buf.push(self.flags.bits());
        buf.extend_from_slice(&self.window.to_be_bytes());
        buf.extend_from_slice(&[0, 0]); // checksum placeholder
        buf.extend_from_slice(&self.urgent_ptr.to_be_bytes());
        buf.extend_from_slice(&opts);
        buf.extend_from_slice(payload);

        let csum = pseudo_header_checksum(src_ip, dst_ip, IPPROTO_TCP, &buf);
        buf[16..18].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    pub fn parse(buf: &[u8]) -> Option<(TcpHeader, &[u8])> {
        if buf.len() < 20 {
            return None;
        }
        let hlen = ((buf[12] >> 4) as usize) * 4;
        if hlen < 20 || buf.len() < hlen {
            return None;
        }
        let header = TcpHeader {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            seq: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            ack: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            flags: TcpFlags::from_bits_truncate(buf[13]),
            window: u16::from_be_bytes([buf[14], buf[15]]),
            checksum: u16::from_be_bytes([buf[16], buf[17]]),
            urgent_ptr: u16::from_be_bytes([buf[18], buf[19]]),
            options: parse_options(&buf[20..hlen]),
        };
        Some((header, &buf[hlen..]))
    }
}

// --- UDP -------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
}

impl UdpHeader {
    /// `checksum` may be transmitted as zero for broadcast, per §6.2;
    /// `compute_checksum` lets the caller decide.
    pub fn encode(
        &self,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        payload: &[u8],
        compute_checksum: bool,
    ) -> Vec<u8> {
        let len = 8 + payload.len();
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&self.src_port.to_be_bytes());
        buf.extend_from_slice(&self.dst_port.to_be_bytes());
        buf.extend_from_slice(&(len as u16).to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(payload);
        if compute_checksum {
            let csum = pseudo_header_checksum(src_ip, dst_ip, IPPROTO_UDP, &buf);
            buf[6..8].copy_from_slice(&csum.to_be_bytes());
        }
        buf
    }

    pub fn parse(buf: &[u8]) -> Option<(UdpHeader, &[u8])> {
        if buf.len() < 8 {
            return None;
        }
        let header = UdpHeader {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
        };
        Some((header, &buf[8..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_all_zero_is_all_ones() {
        assert_eq!(checksum16(&[0, 0, 0, 0]), 0xFFFF);
    }

    #[test]
    fn tcp_header_round_trips_flags_and_ports() {
        let h = TcpHeader {
            src_port: 1234,
            dst_port: 80,
            seq: 1000,
            ack: 2000,
            flags: TcpFlags::SYN | TcpFlags::ACK,
            window: 65535,
            checksum: 0,
            urgent_ptr: 0,
            options: TcpOptions::default(),
        };
        let encoded = h.encode(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), &[]);
        let (parsed, rest) = TcpHeader::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.src_port, 1234);
        assert_eq!(parsed.seq, 1000);
        assert!(parsed.flags.contains(TcpFlags::SYN));
        assert!(parsed.flags.contains(TcpFlags::ACK));
    }

    #[test]
    fn tcp_options_round_trip_sack_and_timestamp() {
        let mut options = TcpOptions::default();
        options.sack_permitted = true;
        options.timestamp = Some((111, 222));
        options.sack_blocks[0] = Some(SackBlock {
            left: 100,
            right: 200,
        });
        let h = TcpHeader {
            src_port: 1,
            dst_port: 2,
            seq: 0,
            ack: 0,
            flags: TcpFlags::ACK,
            window: 1000,
            checksum: 0,
            urgent_ptr: 0,
            options,
        };
        let encoded = h.encode(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), b"hi");
        let (parsed, rest) = TcpHeader::parse(&encoded).unwrap();
        assert_eq!(rest, b"hi");
        assert!(parsed.options.sack_permitted);
        assert_eq!(parsed.options.timestamp, Some((111, 222)));
        assert_eq!(
            parsed.options.sack_blocks[0],
            Some(SackBlock {
                left: 100,
                right: 200
            })
        );
    }

    #[test]
    fn udp_header_round_trips() {
        let h = UdpHeader {
            src_port: 68,
            dst_port: 67,
        };
        let encoded = h.encode(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            b"payload",
            false,
        );
        let (parsed, rest) = UdpHeader::parse(&encoded).unwrap();
        assert_eq!(parsed.src_port, 68);
        assert_eq!(parsed.dst_port, 67);
        assert_eq!(rest, b"payload");
    }
}
