//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::net::Ipv4Addr;

use const_addrs::ip4;
use ipnetwork::Ipv4Network;
use ospf_core::area::AreaType;
use ospf_core::config::{AreaCfg, InterfaceCfg};
use ospf_core::debug::LsaFlushReason;
use ospf_core::instance::RedistributedRoute;
use ospf_core::interface::{InterfaceType, ism};
use ospf_core::lsdb::{
    LSA_INIT_SEQ_NO, LSA_MAX_AGE, LSA_MAX_SEQ_NO, LSA_REFRESH_TIME,
};
use ospf_core::network::MulticastAddr;
use ospf_core::packet::lsa::{
    Lsa, LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaKey, LsaRouterFlags,
    LsaSummary, LsaTypeCode,
};
use ospf_core::packet::{Options, Packet};

use crate::common::{Event, IFNAME, Network, lsupd, router_lsa_key, secs};

const RTR_A: Ipv4Addr = ip4!("1.1.1.1");
const RTR_B: Ipv4Addr = ip4!("2.2.2.2");
const RTR_C: Ipv4Addr = ip4!("3.3.3.3");
const RTR_X: Ipv4Addr = ip4!("9.9.9.9");

//
// Helper functions.
//

fn addr(last: u8) -> Ipv4Network {
    Ipv4Network::new(Ipv4Addr::new(10, 0, 1, last), 24).unwrap()
}

// Two routers connected by a point-to-point link, with a Full adjacency.
fn converged_network() -> Network {
    converged_network_in_area(AreaCfg::default())
}

fn converged_network_in_area(area_cfg: AreaCfg) -> Network {
    let cfg = InterfaceCfg {
        if_type: InterfaceType::PointToPoint,
        ..Default::default()
    };
    let mut network = Network::new();
    network.add_router_in_area(RTR_A, addr(1), area_cfg.clone(), cfg.clone());
    network.add_router_in_area(RTR_B, addr(2), area_cfg, cfg);
    network.start();
    network.advance(secs(60));
    network
}

// Three routers on a broadcast segment. C is elected DR and B Backup.
fn broadcast_network() -> Network {
    let mut network = Network::new();
    network.add_router(RTR_A, addr(1), InterfaceCfg::default());
    network.add_router(RTR_B, addr(2), InterfaceCfg::default());
    network.add_router(RTR_C, addr(3), InterfaceCfg::default());
    network.start();
    network.advance(secs(90));

    for (router_id, state) in [
        (RTR_A, ism::State::DrOther),
        (RTR_B, ism::State::Backup),
        (RTR_C, ism::State::Dr),
    ] {
        let router = network.router(router_id);
        let iface = router.instance.interface_state(IFNAME).unwrap();
        assert_eq!(iface.state, state);
    }
    network
}

fn summary_lsa(seq_no: u32) -> Lsa {
    summary_lsa_aged(0, seq_no)
}

fn summary_lsa_aged(age: u16, seq_no: u32) -> Lsa {
    Lsa::new(
        age,
        Options::E,
        ip4!("10.0.9.0"),
        RTR_C,
        seq_no,
        LsaBody::SummaryNetwork(LsaSummary::new(ip4!("255.255.255.0"), 10)),
    )
}

fn summary_lsa_key() -> LsaKey {
    LsaKey::new(LsaTypeCode::SummaryNetwork.into(), RTR_C, ip4!("10.0.9.0"))
}

// Feeds B an LS Update as if it had been sent by A.
fn inject_lsupd(network: &mut Network, lsas: Vec<Lsa>) {
    let dst = MulticastAddr::AllSpfRtrs.addr();
    network.inject(RTR_B, addr(1).ip(), dst, lsupd(RTR_A, lsas));
}

//
// Tests.
//

#[test]
fn refresh_floods_once() {
    let mut network = converged_network();
    let key = router_lsa_key(RTR_A);
    let seq_no = network.router(RTR_A).lsa(&key).unwrap().hdr.seq_no;
    assert_eq!(network.router(RTR_B).lsa(&key).unwrap().hdr.seq_no, seq_no);
    assert!(network.lsupd_tx(RTR_A, &key, seq_no + 1).is_empty());
    let stats_a = network.router(RTR_A).instance.statistics().unwrap();
    let stats_b = network.router(RTR_B).instance.statistics().unwrap();

    network.advance(secs(LSA_REFRESH_TIME as u64));

    // The refreshed instance was sent exactly once and acknowledged.
    assert_eq!(network.lsupd_tx(RTR_A, &key, seq_no + 1).len(), 1);
    let router_a = network.router(RTR_A);
    assert_eq!(router_a.lsa(&key).unwrap().hdr.seq_no, seq_no + 1);
    assert!(!router_a.instance.is_on_any_rxmt_list(&key));
    assert_eq!(router_a.neighbor(RTR_B).unwrap().ls_rxmt_count, 0);

    // The neighbor accepted it.
    let router_b = network.router(RTR_B);
    assert_eq!(router_b.lsa(&key).unwrap().hdr.seq_no, seq_no + 1);
    assert!(
        router_b
            .events()
            .contains(&Event::LsaInstall(key, seq_no + 1))
    );

    // Both ends account for the new instance.
    let stats = network.router(RTR_A).instance.statistics().unwrap();
    assert!(stats.orig_lsa_count > stats_a.orig_lsa_count);
    let stats = network.router(RTR_B).instance.statistics().unwrap();
    assert!(stats.rx_lsa_count > stats_b.rx_lsa_count);
}

#[test]
fn min_ls_arrival() {
    let mut network = converged_network();
    let key = summary_lsa_key();

    inject_lsupd(&mut network, vec![summary_lsa(0x80000001)]);
    assert_eq!(
        network.router(RTR_B).lsa(&key).unwrap().hdr.seq_no,
        0x80000001
    );

    // A newer instance arriving within MinLSArrival is discarded.
    inject_lsupd(&mut network, vec![summary_lsa(0x80000002)]);
    assert_eq!(
        network.router(RTR_B).lsa(&key).unwrap().hdr.seq_no,
        0x80000001
    );
    assert!(
        !network
            .router(RTR_B)
            .events()
            .contains(&Event::LsaInstall(key, 0x80000002))
    );

    network.advance(secs(2));
    inject_lsupd(&mut network, vec![summary_lsa(0x80000003)]);
    assert_eq!(
        network.router(RTR_B).lsa(&key).unwrap().hdr.seq_no,
        0x80000003
    );
}

#[test]
fn older_instance_is_answered_with_database_copy() {
    let mut network = converged_network();
    let key = summary_lsa_key();

    inject_lsupd(&mut network, vec![summary_lsa(0x80000003)]);
    let lsa = network.router(RTR_B).lsa(&key).unwrap();
    assert!(network.lsupd_tx(RTR_B, &key, 0x80000003).is_empty());

    // The older instance leaves the LSDB untouched, and the database copy is
    // sent back to the neighbor.
    network.advance(secs(2));
    network.router(RTR_B).clear_events();
    inject_lsupd(&mut network, vec![summary_lsa(0x80000002)]);
    let router_b = network.router(RTR_B);
    assert_eq!(router_b.lsa(&key).unwrap().hdr, lsa.hdr);
    assert!(
        !router_b
            .events()
            .iter()
            .any(|event| matches!(event, Event::LsaInstall(..)))
    );
    assert_eq!(network.lsupd_tx(RTR_B, &key, 0x80000003).len(), 1);

    // A learns the newer instance from B.
    let lsa_a = network.router(RTR_A).lsa(&key).unwrap();
    assert_eq!(lsa_a.hdr.seq_no, 0x80000003);
}

#[test]
fn duplicate_is_acknowledged() {
    let mut network = converged_network();
    let key = summary_lsa_key();

    inject_lsupd(&mut network, vec![summary_lsa(0x80000001)]);
    network.advance(secs(2));
    let acks = |network: &Network| {
        network
            .log
            .iter()
            .filter(|record| record.from == RTR_B)
            .filter(|record| match &record.packet.packet {
                Packet::LsAck(pkt) => {
                    pkt.lsa_hdrs.iter().any(|hdr| hdr.key() == key)
                }
                _ => false,
            })
            .count()
    };
    let acks_before = acks(&network);
    assert!(acks_before > 0);

    // The same instance again gets a direct acknowledgment.
    inject_lsupd(&mut network, vec![summary_lsa(0x80000001)]);
    assert_eq!(acks(&network), acks_before + 1);
}

#[test]
fn redistribution() {
    let mut network = converged_network();
    let prefix: Ipv4Network = "172.16.1.0/24".parse().unwrap();
    let key = LsaKey::new(
        LsaTypeCode::AsExternal.into(),
        RTR_A,
        ip4!("172.16.1.0"),
    );

    network
        .router_mut(RTR_A)
        .instance
        .redistribute_add(
            prefix,
            RedistributedRoute {
                metric: 20,
                metric_type_e2: true,
                tag: 0,
            },
        )
        .unwrap();
    network.deliver();
    network.advance(secs(10));

    // The AS-external-LSA reaches B, and A advertises itself as an ASBR.
    let lsa = network.router(RTR_B).lsa(&key).unwrap();
    let ext = lsa.body.as_as_external().unwrap();
    assert_eq!(ext.metric, 20);
    let rtr_lsa = network.router(RTR_B).lsa(&router_lsa_key(RTR_A)).unwrap();
    let rtr = rtr_lsa.body.as_router().unwrap();
    assert!(rtr.flags.contains(LsaRouterFlags::E));
    let count = network.router(RTR_B).instance.lsdb_as().unwrap().count();
    assert_eq!(count, 1);

    // Withdrawing the route flushes the LSA.
    network
        .router_mut(RTR_A)
        .instance
        .redistribute_del(prefix)
        .unwrap();
    network.deliver();
    network.advance(secs(10));
    let lsa = network.router(RTR_B).lsa(&key);
    assert!(lsa.is_none_or(|lsa| lsa.hdr.is_maxage()));
    let rtr_lsa = network.router(RTR_B).lsa(&router_lsa_key(RTR_A)).unwrap();
    let rtr = rtr_lsa.body.as_router().unwrap();
    assert!(!rtr.flags.contains(LsaRouterFlags::E));
}

#[test]
fn maxage_lsa_kept_until_acknowledged() {
    let mut network = broadcast_network();
    let key = summary_lsa_key();

    // The Backup doesn't flood the LSA, but keeps it for retransmission to
    // the DR.
    inject_lsupd(&mut network, vec![summary_lsa(0x80000001)]);
    assert!(network.router(RTR_B).instance.is_on_any_rxmt_list(&key));
    network.advance(secs(3));
    network.disconnect(RTR_C);

    // The flushed instance can't be removed while the DR hasn't
    // acknowledged it.
    inject_lsupd(&mut network, vec![summary_lsa_aged(LSA_MAX_AGE, 0x80000001)]);
    network.advance(secs(6));
    let router_b = network.router(RTR_B);
    let lsa = router_b.lsa(&key).unwrap();
    assert!(lsa.hdr.is_maxage());
    assert!(router_b.instance.is_on_any_rxmt_list(&key));

    // Once the DR is back, the retransmission gets acknowledged and the LSA
    // is removed.
    network.router_mut(RTR_C).connected = true;
    network.advance(secs(20));
    let router_b = network.router(RTR_B);
    assert!(!router_b.instance.is_on_any_rxmt_list(&key));
    assert!(router_b.lsa(&key).is_none());
}

#[test]
fn seqno_wrap() {
    let mut network = converged_network();
    let key = router_lsa_key(RTR_A);

    // A hears about an instance of its own Router-LSA carrying
    // MaxSequenceNumber.
    let lsa = network.router(RTR_A).lsa(&key).unwrap();
    let lsa = Lsa::new(
        0,
        lsa.hdr.options,
        lsa.hdr.lsa_id,
        lsa.hdr.adv_rtr,
        LSA_MAX_SEQ_NO,
        lsa.body.clone(),
    );
    let dst = MulticastAddr::AllSpfRtrs.addr();
    network.inject(RTR_A, addr(2).ip(), dst, lsupd(RTR_B, vec![lsa]));
    network.advance(secs(60));

    // That instance is aged out first, and the LSA starts over from
    // InitialSequenceNumber.
    let router_a = network.router(RTR_A);
    let events = router_a.events();
    let flush = events
        .iter()
        .position(|event| {
            *event == Event::LsaFlush(key, LsaFlushReason::PrematureAging)
        })
        .unwrap();
    let reorig = events
        .iter()
        .position(|event| *event == Event::LsaInstall(key, LSA_INIT_SEQ_NO))
        .unwrap();
    assert!(flush < reorig);
    let lsa = router_a.lsa(&key).unwrap();
    assert_eq!(lsa.hdr.seq_no, LSA_INIT_SEQ_NO);
    assert!(!lsa.hdr.is_maxage());
    assert!(!router_a.instance.is_on_any_rxmt_list(&key));

    let lsa = network.router(RTR_B).lsa(&key).unwrap();
    assert_eq!(lsa.hdr.seq_no, LSA_INIT_SEQ_NO);
    assert!(!lsa.hdr.is_maxage());
}

#[test]
fn stub_area_rejects_external_lsa() {
    let mut network = converged_network_in_area(AreaCfg {
        area_type: AreaType::Stub,
    });
    let ext_key = LsaKey::new(
        LsaTypeCode::AsExternal.into(),
        RTR_C,
        ip4!("172.16.1.0"),
    );
    let ext_lsa = Lsa::new(
        0,
        Options::empty(),
        ip4!("172.16.1.0"),
        RTR_C,
        0x80000001,
        LsaBody::AsExternal(LsaAsExternal::new(
            ip4!("255.255.255.0"),
            LsaAsExternalFlags::E,
            20,
            None,
            0,
        )),
    );

    // The AS-external-LSA is dropped. The rest of the update still goes
    // through.
    inject_lsupd(&mut network, vec![ext_lsa, summary_lsa(0x80000001)]);
    let router_b = network.router(RTR_B);
    assert!(router_b.lsa(&ext_key).is_none());
    assert_eq!(router_b.instance.lsdb_as().unwrap().count(), 0);
    assert!(
        !router_b
            .events()
            .iter()
            .any(|event| matches!(event, Event::LsaInstall(key, _)
                if *key == ext_key))
    );
    assert!(router_b.lsa(&summary_lsa_key()).is_some());
}

#[test]
fn all_drouters_destination() {
    let mut network = broadcast_network();
    let lsa = Lsa::new(
        0,
        Options::E,
        ip4!("10.0.8.0"),
        RTR_X,
        0x80000001,
        LsaBody::SummaryNetwork(LsaSummary::new(ip4!("255.255.255.0"), 10)),
    );
    let key = lsa.hdr.key();
    let dst = MulticastAddr::AllDrRtrs.addr();

    // Only the DR and the Backup listen to AllDRouters.
    network.inject(RTR_A, addr(2).ip(), dst, lsupd(RTR_B, vec![lsa.clone()]));
    let router_a = network.router(RTR_A);
    assert!(router_a.lsa(&key).is_none());
    assert!(router_a.events().iter().any(|event| matches!(
        event,
        Event::PacketDrop(src, _) if *src == addr(2).ip()
    )));

    network.inject(RTR_C, addr(1).ip(), dst, lsupd(RTR_A, vec![lsa]));
    assert!(
        network
            .router(RTR_C)
            .events()
            .contains(&Event::LsaInstall(key, 0x80000001))
    );

    // The DR floods it to everyone else.
    network.advance(secs(1));
    assert!(network.router(RTR_A).lsa(&key).is_some());
    assert!(network.router(RTR_B).lsa(&key).is_some());
}
