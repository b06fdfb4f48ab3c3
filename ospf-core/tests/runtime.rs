//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use const_addrs::ip4;
use ipnetwork::Ipv4Network;
use ospf_core::config::{AreaCfg, InstanceCfg, InterfaceCfg};
use ospf_core::instance::Instance;
use ospf_core::interface::InterfaceSys;
use ospf_core::neighbor::nsm;
use ospf_core::network::{ChannelTransport, MulticastAddr};
use ospf_core::packet::{Options, Packet};
use ospf_core::runtime::{self, HostMsg};
use tokio::sync::mpsc;

use crate::common::{AREA_ID, Event, IFNAME, Recorder, hello};

const RTR_A: Ipv4Addr = ip4!("1.1.1.1");
const RTR_B: Ipv4Addr = ip4!("2.2.2.2");

#[tokio::test]
async fn run_until_stopped() {
    common::init_tracing();
    let (net_tx, mut net_rx) = mpsc::unbounded_channel();
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let events = Rc::new(RefCell::new(vec![]));
    let addr: Ipv4Network = "10.0.1.1/24".parse().unwrap();

    let mut instance = Instance::new(
        InstanceCfg { router_id: RTR_A },
        Box::new(ChannelTransport::new(net_tx)),
    );
    instance.add_observer(Box::new(Recorder(events.clone())));
    instance.area_add(AREA_ID, AreaCfg::default()).unwrap();
    instance
        .interface_add(AREA_ID, IFNAME, InterfaceCfg::default())
        .unwrap();
    instance
        .interface_update(
            IFNAME,
            InterfaceSys {
                operative: true,
                loopback: false,
                primary_addr: Some(addr),
                mtu: 1500,
            },
        )
        .unwrap();

    let host = async {
        // The first Hello goes out as soon as the instance starts.
        let msg = net_rx.recv().await.unwrap();
        assert_eq!(msg.ifname, IFNAME);
        assert_eq!(msg.src, addr.ip());
        assert_eq!(msg.dst, MulticastAddr::AllSpfRtrs.addr());
        let mut data = msg.data.clone();
        let packet = Packet::decode(&mut data, None).unwrap();
        let Packet::Hello(pkt) = packet else {
            panic!("expected a Hello, got {packet:?}");
        };
        assert_eq!(pkt.hdr.router_id, RTR_A);

        // A Hello from a neighbor, in its wire format.
        let data = hello(RTR_B, Options::E, &[]).encode(None);
        host_tx
            .send(HostMsg::NetRxPacket {
                ifname: IFNAME.to_owned(),
                src: ip4!("10.0.1.2"),
                dst: MulticastAddr::AllSpfRtrs.addr(),
                data,
            })
            .unwrap();
        host_tx.send(HostMsg::Stop).unwrap();
    };
    tokio::join!(runtime::run(instance, host_rx), host);

    let events = events.borrow();
    assert!(events.contains(&Event::NbrState(RTR_B, nsm::State::Init)));
}
