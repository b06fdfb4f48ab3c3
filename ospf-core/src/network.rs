//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::Bytes;
use derive_new::new;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::packet::Packet;
use crate::packet::auth::AuthCtx;

// OSPF IP protocol number.
pub const OSPF_IP_PROTO: u8 = 89;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Packet transmission service provided by the host.
//
// The instance calls `send_packet` once per destination address. Packets
// carrying cryptographic authentication already have their sequence number
// set, and `auth` holds the key used to compute the message digest.
pub trait Transport {
    fn send_packet(
        &mut self,
        ifname: &str,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        packet: &Packet,
        auth: Option<&AuthCtx>,
    );
}

// Encoded packet ready to be written to a raw IP socket.
#[derive(Clone, Debug, Eq, PartialEq, new, Serialize)]
pub struct NetTxPacket {
    pub ifname: String,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub data: Bytes,
}

// Transport that encodes outgoing packets and hands them over to an async
// task through a channel.
#[derive(Debug, new)]
pub struct ChannelTransport {
    tx: UnboundedSender<NetTxPacket>,
}

// ===== impl MulticastAddr =====

impl MulticastAddr {
    pub fn addr(&self) -> Ipv4Addr {
        match self {
            MulticastAddr::AllSpfRtrs => Ipv4Addr::new(224, 0, 0, 5),
            MulticastAddr::AllDrRtrs => Ipv4Addr::new(224, 0, 0, 6),
        }
    }
}

// ===== impl ChannelTransport =====

impl Transport for ChannelTransport {
    fn send_packet(
        &mut self,
        ifname: &str,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        packet: &Packet,
        auth: Option<&AuthCtx>,
    ) {
        let data = packet.encode(auth);
        let msg = NetTxPacket::new(ifname.to_owned(), src, dst, data);

        // The receiving end is gone only when the host is shutting down.
        let _ = self.tx.send(msg);
    }
}

// Transport used by tests to capture the packets sent by an instance.
#[cfg(feature = "testing")]
pub mod capture {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub struct CapturedPacket {
        pub ifname: String,
        pub src: Ipv4Addr,
        pub dst: Ipv4Addr,
        pub packet: Packet,
        pub auth: Option<AuthCtx>,
    }

    #[derive(Clone, Debug, Default)]
    pub struct CaptureTransport {
        pub packets: Rc<RefCell<Vec<CapturedPacket>>>,
    }

    impl CaptureTransport {
        // Removes and returns all packets captured so far.
        pub fn take(&self) -> Vec<CapturedPacket> {
            std::mem::take(&mut *self.packets.borrow_mut())
        }
    }

    impl Transport for CaptureTransport {
        fn send_packet(
            &mut self,
            ifname: &str,
            src: Ipv4Addr,
            dst: Ipv4Addr,
            packet: &Packet,
            auth: Option<&AuthCtx>,
        ) {
            self.packets.borrow_mut().push(CapturedPacket {
                ifname: ifname.to_owned(),
                src,
                dst,
                packet: packet.clone(),
                auth: auth.cloned(),
            });
        }
    }
}
