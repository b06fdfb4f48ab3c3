//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

pub trait Ipv4AddrExt {
    // Returns whether the address can identify a router or a packet source.
    fn is_usable(&self) -> bool;
}

pub trait Ipv4NetworkExt {
    // Returns the network with all host bits cleared.
    #[must_use]
    fn apply_mask(&self) -> Ipv4Network;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    fn is_usable(&self) -> bool {
        !self.is_unspecified()
            && !self.is_loopback()
            && !self.is_multicast()
            && !self.is_broadcast()
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    fn apply_mask(&self) -> Ipv4Network {
        // The prefix length comes from a valid network.
        Ipv4Network::new(self.network(), self.prefix()).unwrap_or(*self)
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_addresses() {
        assert!(Ipv4Addr::new(10, 0, 1, 1).is_usable());
        assert!(Ipv4Addr::new(1, 1, 1, 1).is_usable());
        assert!(!Ipv4Addr::LOCALHOST.is_usable());
        assert!(!Ipv4Addr::BROADCAST.is_usable());
        assert!(!Ipv4Addr::new(224, 0, 0, 5).is_usable());
        assert!(!Ipv4Addr::UNSPECIFIED.is_usable());
    }

    #[test]
    fn apply_mask() {
        let net: Ipv4Network = "10.0.1.7/24".parse().unwrap();
        assert_eq!(net.apply_mask(), "10.0.1.0/24".parse().unwrap());

        let host: Ipv4Network = "10.0.1.7/32".parse().unwrap();
        assert_eq!(host.apply_mask(), host);
    }
}
