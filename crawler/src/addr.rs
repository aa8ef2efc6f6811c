// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Peer addressing: the `PeerAddr` pair and multiaddr utilities.

use crate::{Error, Result};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A peer identifier together with the addresses it was observed under.
///
/// Identity is the `peer_id` alone; the address list is a bag that only
/// ever grows. Two `PeerAddr`s with the same id but different addresses
/// compare equal.
#[derive(Debug, Clone)]
pub struct PeerAddr {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerAddr {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { peer_id, addrs }
    }

    /// A copy of this peer with loopback and private addresses removed.
    ///
    /// Remotes frequently advertise their LAN addresses; dialing those is
    /// pointless from outside their network.
    pub fn strip_unroutable(&self) -> Self {
        Self {
            peer_id: self.peer_id,
            addrs: self
                .addrs
                .iter()
                .filter(|addr| !is_unroutable(addr))
                .cloned()
                .collect(),
        }
    }
}

impl PartialEq for PeerAddr {
    fn eq(&self, other: &Self) -> bool {
        self.peer_id == other.peer_id
    }
}

impl Eq for PeerAddr {}

impl std::hash::Hash for PeerAddr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.peer_id.hash(state);
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} addrs)", self.peer_id, self.addrs.len())
    }
}

/// Whether an address points at loopback or private IP space.
pub fn is_unroutable(addr: &Multiaddr) -> bool {
    addr.iter().any(|protocol| match protocol {
        Protocol::Ip4(ip) => is_private_v4(&ip) || ip.is_loopback(),
        Protocol::Ip6(ip) => is_private_v6(&ip) || ip.is_loopback(),
        _ => false,
    })
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    // Unique-local fc00::/7 and link-local fe80::/10
    let segments = ip.segments();
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80 || ip.is_unspecified()
}

/// Addresses from `incoming` not already present in `known`, by byte
/// equality. The input arrays are always small; no need to be clever.
pub fn new_addrs(known: &[Multiaddr], incoming: &[Multiaddr]) -> Vec<Multiaddr> {
    let mut fresh = Vec::new();
    for addr in incoming {
        if !known.contains(addr) && !fresh.contains(addr) {
            fresh.push(addr.clone());
        }
    }
    fresh
}

/// Parse a `/ip4/…/tcp/…/p2p/<id>` style peer string into a `PeerAddr`.
///
/// Useful for bootstrap lists and canary files.
pub fn parse_peer_string(text: &str) -> Result<PeerAddr> {
    let addr: Multiaddr = text
        .trim()
        .parse()
        .map_err(|err| Error::Config(format!("invalid multiaddr {text:?}: {err}")))?;

    let peer_id = addr
        .iter()
        .find_map(|protocol| match protocol {
            Protocol::P2p(id) => Some(id),
            _ => None,
        })
        .ok_or_else(|| Error::Config(format!("multiaddr {text:?} carries no /p2p peer id")))?;

    // The dialable part is everything before the /p2p component.
    let transport: Multiaddr = addr
        .iter()
        .take_while(|protocol| !matches!(protocol, Protocol::P2p(_)))
        .collect();

    Ok(PeerAddr::new(peer_id, vec![transport]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "12D3KooWRBhwfeP2Y4TCx1SM6s9rUoHhR5STiGwxBhgFRcw3UERE";

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn unroutable_addresses_are_detected() {
        assert!(is_unroutable(&ma("/ip4/127.0.0.1/tcp/4001")));
        assert!(is_unroutable(&ma("/ip4/192.168.1.10/tcp/4001")));
        assert!(is_unroutable(&ma("/ip4/10.0.0.1/udp/4001/quic-v1")));
        assert!(is_unroutable(&ma("/ip6/::1/tcp/4001")));
        assert!(is_unroutable(&ma("/ip6/fc00::1/tcp/4001")));
        assert!(is_unroutable(&ma("/ip6/fe80::1/tcp/4001")));

        assert!(!is_unroutable(&ma("/ip4/1.2.3.4/tcp/4001")));
        assert!(!is_unroutable(&ma("/ip6/2001:db8::1/tcp/4001")));
        assert!(!is_unroutable(&ma("/dns4/example.org/tcp/4001")));
    }

    #[test]
    fn strip_unroutable_keeps_public_addrs_only() {
        let peer = PeerAddr::new(
            PeerId::random(),
            vec![
                ma("/ip4/127.0.0.1/tcp/4001"),
                ma("/ip4/1.2.3.4/tcp/4001"),
                ma("/ip4/192.168.0.2/tcp/4001"),
            ],
        );
        let stripped = peer.strip_unroutable();
        assert_eq!(stripped.addrs, vec![ma("/ip4/1.2.3.4/tcp/4001")]);
    }

    #[test]
    fn new_addrs_diffs_by_byte_equality() {
        let known = vec![ma("/ip4/1.2.3.4/tcp/4001")];
        let incoming = vec![
            ma("/ip4/1.2.3.4/tcp/4001"),
            ma("/ip4/1.2.3.4/tcp/4002"),
            ma("/ip4/1.2.3.4/tcp/4002"),
        ];
        assert_eq!(
            new_addrs(&known, &incoming),
            vec![ma("/ip4/1.2.3.4/tcp/4002")]
        );
    }

    #[test]
    fn parse_peer_string_splits_id_and_transport() {
        let parsed = parse_peer_string(&format!("/ip4/1.2.3.4/tcp/4001/p2p/{PEER}")).unwrap();
        assert_eq!(parsed.peer_id.to_string(), PEER);
        assert_eq!(parsed.addrs, vec![ma("/ip4/1.2.3.4/tcp/4001")]);
    }

    #[test]
    fn parse_peer_string_rejects_missing_peer_id() {
        assert!(parse_peer_string("/ip4/1.2.3.4/tcp/4001").is_err());
        assert!(parse_peer_string("not a multiaddr").is_err());
    }

    #[test]
    fn peer_addr_identity_is_the_id() {
        let id = PeerId::random();
        let a = PeerAddr::new(id, vec![ma("/ip4/1.2.3.4/tcp/4001")]);
        let b = PeerAddr::new(id, vec![]);
        assert_eq!(a, b);
    }
}
