//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::hint::black_box;
use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use criterion::{Criterion, criterion_group, criterion_main};
use ospf_core::packet::lsa::*;
use ospf_core::packet::*;

static PACKET: Lazy<Packet> = Lazy::new(|| {
    Packet::LsUpdate(LsUpdate {
        hdr: PacketHdr::new(
            PacketType::LsUpdate,
            Ipv4Addr::new(2, 2, 2, 2),
            Ipv4Addr::new(0, 0, 0, 1),
            PacketHdrAuth::Null,
        ),
        lsas: vec![
            Lsa::new(
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
            ),
            Lsa::new(
                49,
                Options::E,
                Ipv4Addr::new(2, 2, 2, 2),
                Ipv4Addr::new(2, 2, 2, 2),
                0x80000001,
                LsaBody::SummaryNetwork(LsaSummary {
                    mask: Ipv4Addr::new(255, 255, 255, 255),
                    metric: 0,
                }),
            ),
            Lsa::new(
                49,
                Options::E,
                Ipv4Addr::new(10, 0, 2, 0),
                Ipv4Addr::new(2, 2, 2, 2),
                0x80000001,
                LsaBody::SummaryNetwork(LsaSummary {
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    metric: 10,
                }),
            ),
        ],
    })
});

fn packet_encode(n: u64) {
    for _ in 0..n {
        PACKET.encode(None);
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Packet encode", |b| {
        b.iter(|| packet_encode(black_box(10000)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
