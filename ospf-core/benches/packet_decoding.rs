//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::hint::black_box;
use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use ospf_core::packet::lsa::*;
use ospf_core::packet::*;

// Hello packet with two neighbors followed by an LS Update carrying a
// Router-LSA.
static PACKETS: Lazy<Vec<Bytes>> = Lazy::new(|| {
    let hello = Packet::Hello(Hello {
        hdr: PacketHdr::new(
            PacketType::Hello,
            Ipv4Addr::new(2, 2, 2, 2),
            Ipv4Addr::new(0, 0, 0, 1),
            PacketHdrAuth::Null,
        ),
        network_mask: Ipv4Addr::new(255, 255, 255, 0),
        hello_interval: 10,
        options: Options::E,
        priority: 1,
        dead_interval: 40,
        dr: Some(Ipv4Addr::new(10, 0, 1, 2)),
        bdr: Some(Ipv4Addr::new(10, 0, 1, 1)),
        neighbors: [Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(3, 3, 3, 3)]
            .into(),
    });
    let lsupd = Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr::new(
            PacketType::LsUpdate,
            Ipv4Addr::new(2, 2, 2, 2),
            Ipv4Addr::new(0, 0, 0, 1),
            PacketHdrAuth::Null,
        ),
        lsas: vec![Lsa::new(
            49,
            Options::E,
            Ipv4Addr::new(2, 2, 2, 2),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000002,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::B,
                links: vec![LsaRouterLink {
                    link_type: LsaRouterLinkType::StubNetwork,
                    link_id: Ipv4Addr::new(10, 0, 1, 0),
                    link_data: Ipv4Addr::new(255, 255, 255, 0),
                    metric: 10,
                }],
            }),
        )],
    });
    vec![hello.encode(None), lsupd.encode(None)]
});

fn packet_decode(n: u64) {
    for _ in 0..n {
        for bytes in PACKETS.iter() {
            let mut buf = bytes.clone();
            let _ = Packet::decode(&mut buf, None);
        }
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Packet decode", |b| {
        b.iter(|| packet_decode(black_box(10000)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
