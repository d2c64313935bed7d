//! Network core: the socket layer over a protocol table, TCP with
//! retransmission/SACK/reassembly, UDP and RAW, Unix-domain sockets,
//! and the DHCP client (component N's sibling "network core" in the
//! system overview).
//!
//! IPv4 only; an `Inet6` family value is recognized so callers get
//! [`error::NetError::FamilyNotSupported`] rather than a panic. The
//! network interface layer and the ARP/route tables are external
//! collaborators (§1) specified only as the traits in [`iface`].

#![no_std]

extern crate alloc;

pub mod addr;
pub mod dhcp;
pub mod error;
pub mod iface;
pub mod packet;
pub mod raw;
pub mod socket;
pub mod tcp;
pub mod udp;
pub mod unix;
pub mod wire;

pub use error::{NetError, NetResult};
