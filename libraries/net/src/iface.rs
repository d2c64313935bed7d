//! External collaborator traits (§1): the network interface layer and
//! the ARP/route tables. This crate only ever calls through these
//! seams; a real link driver, ARP cache, and routing table live
//! outside it.

use crate::packet::Packet;
use crate::wire::Ipv4Addr;
use alloc::string::String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwAddr(pub [u8; 6]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    NoBuffers,
    Down,
}

/// `send(interface, packet, link_layer_dest) -> result`, plus the
/// per-interface properties a protocol layer needs to size packets
/// and address frames.
pub trait NetInterface {
    fn name(&self) -> &str;
    fn mtu(&self) -> usize;
    fn hwaddr(&self) -> HwAddr;
    fn local_addr(&self) -> Ipv4Addr;
    fn send(&mut self, packet: Packet, dest: HwAddr) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpResolution {
    Resolved(HwAddr),
    Pending,
    Unreachable,
}

/// `resolve(ipv4) -> hwaddr or pending`.
pub trait ArpTable {
    fn resolve(&mut self, addr: Ipv4Addr) -> ArpResolution;
    fn insert(&mut self, addr: Ipv4Addr, hw: HwAddr);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    Exists,
}

/// `route_add/remove/lookup`. DHCP lease acquisition and release go
/// through this trait to install and tear down the lease's route
/// all-or-nothing (a partial failure must not leave a half-installed
/// route behind).
pub trait RouteTable {
    fn lookup(&self, dest: Ipv4Addr) -> Option<Route>;
    fn add(&mut self, route: Route) -> Result<(), RouteError>;
    fn remove(&mut self, dest: Ipv4Addr, mask: Ipv4Addr) -> Result<(), RouteError>;
}

/// Interface identity as far as sockets and DHCP are concerned: a
/// name plus whatever the collaborator implementations need to find
/// the real [`NetInterface`]/[`ArpTable`]/[`RouteTable`] instances.
pub type IfaceId = String;
