//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use const_addrs::ip4;
use maplit::btreeset;
use ospf_core::packet::auth::AuthCtx;
use ospf_core::packet::error::DecodeError;
use ospf_core::packet::lsa::*;
use ospf_core::packet::*;

//
// Helper functions.
//

fn test_encode_packet(
    bytes_expected: &[u8],
    auth: &Option<AuthCtx>,
    packet: &Packet,
) {
    let bytes_actual = packet.encode(auth.as_ref());
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(
    bytes: &[u8],
    auth: &Option<AuthCtx>,
    packet_expected: &Packet,
) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf, auth.as_ref()).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

fn hdr(
    pkt_type: PacketType,
    router_id: Ipv4Addr,
    area_id: Ipv4Addr,
) -> PacketHdr {
    PacketHdr::new(pkt_type, router_id, area_id, PacketHdrAuth::Null)
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x01, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x01, 0xf6, 0x9e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00,
            0x00, 0x00, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x01, 0x01, 0x01,
        ],
        None,
        Packet::Hello(Hello {
            hdr: hdr(PacketType::Hello, ip4!("2.2.2.2"), ip4!("0.0.0.1")),
            network_mask: ip4!("255.255.255.0"),
            hello_interval: 3,
            options: Options::E,
            priority: 1,
            dead_interval: 36,
            dr: None,
            bdr: None,
            neighbors: btreeset![ip4!("1.1.1.1")],
        }),
    )
});

static HELLO1_MD5: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x01, 0x00, 0x34, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01, 0x10, 0x32, 0x45,
            0xd0, 0x14, 0xff, 0xff, 0xff, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00,
            0x00, 0x00, 0x0c, 0x0a, 0x00, 0x01, 0x03, 0x0a, 0x00, 0x01, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x03, 0x9d, 0xd5, 0xa8,
            0x03, 0x86, 0xee, 0x71, 0x67, 0x44, 0x1a, 0x37, 0xa9, 0x04, 0x27,
            0xfc, 0xc7,
        ],
        Some(AuthCtx {
            key_id: 1,
            key: "HOLO".to_owned(),
        }),
        Packet::Hello(Hello {
            hdr: PacketHdr::new(
                PacketType::Hello,
                ip4!("1.1.1.1"),
                ip4!("0.0.0.0"),
                PacketHdrAuth::Cryptographic {
                    key_id: 1,
                    auth_len: 16,
                    seqno: 843436052,
                },
            ),
            network_mask: ip4!("255.255.255.0"),
            hello_interval: 3,
            options: Options::E,
            priority: 1,
            dead_interval: 12,
            dr: Some(ip4!("10.0.1.3")),
            bdr: Some(ip4!("10.0.1.2")),
            neighbors: btreeset![
                ip4!("2.2.2.2"),
                ip4!("3.3.3.3"),
            ],
        }),
    )
});

static DBDESC1: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x02, 0x00, 0x48, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x01, 0xd8, 0x9e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x05, 0xdc, 0x42, 0x00, 0x4e, 0xb8, 0x8f, 0x2e, 0x00,
            0x03, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
            0x80, 0x00, 0x00, 0x02, 0x48, 0xd6, 0x00, 0x30, 0x00, 0x03, 0x02,
            0x05, 0xac, 0x10, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01, 0x80, 0x00,
            0x00, 0x01, 0xfc, 0xff, 0x00, 0x24,
        ],
        None,
        Packet::DbDesc(DbDesc {
            hdr: hdr(PacketType::DbDesc, ip4!("1.1.1.1"), ip4!("0.0.0.1")),
            mtu: 1500,
            options: Options::E | Options::O,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no: 1320718126,
            lsa_hdrs: vec![
                LsaHdr {
                    age: 3,
                    options: Options::E,
                    lsa_type: LsaTypeCode::Router.into(),
                    lsa_id: ip4!("1.1.1.1"),
                    adv_rtr: ip4!("1.1.1.1"),
                    seq_no: 0x80000002,
                    cksum: 0x48d6,
                    length: 48,
                },
                LsaHdr {
                    age: 3,
                    options: Options::E,
                    lsa_type: LsaTypeCode::AsExternal.into(),
                    lsa_id: ip4!("172.16.1.0"),
                    adv_rtr: ip4!("1.1.1.1"),
                    seq_no: 0x80000001,
                    cksum: 0xfcff,
                    length: 36,
                },
            ],
        }),
    )
});

static LSREQUEST1: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> =
    Lazy::new(|| {
        (
            vec![
                0x02, 0x03, 0x00, 0x30, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
                0x00, 0x01, 0x46, 0xab, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01,
                0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x05,
                0xac, 0x10, 0x01, 0x00, 0x01, 0x01, 0x01, 0x01,
            ],
            None,
            Packet::LsRequest(LsRequest {
                hdr: hdr(
                    PacketType::LsRequest,
                    ip4!("2.2.2.2"),
                    ip4!("0.0.0.1"),
                ),
                entries: vec![
                    LsaKey {
                        lsa_type: LsaTypeCode::Router.into(),
                        adv_rtr: ip4!("1.1.1.1"),
                        lsa_id: ip4!("1.1.1.1"),
                    },
                    LsaKey {
                        lsa_type: LsaTypeCode::AsExternal.into(),
                        adv_rtr: ip4!("1.1.1.1"),
                        lsa_id: ip4!("172.16.1.0"),
                    },
                ],
            }),
        )
    });

static LSUPDATE1: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x04, 0x00, 0x78, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00,
            0x01, 0x40, 0xa1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x31, 0x02, 0x01, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x02,
            0x37, 0xf4, 0x00, 0x24, 0x01, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x01,
            0x00, 0xff, 0xff, 0xff, 0x00, 0x03, 0x00, 0x00, 0x0a, 0x00, 0x31,
            0x02, 0x03, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x80,
            0x00, 0x00, 0x01, 0xd2, 0x7a, 0x00, 0x1c, 0xff, 0xff, 0xff, 0xff,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x31, 0x02, 0x03, 0x0a, 0x00, 0x02,
            0x00, 0x02, 0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0xfa, 0x44,
            0x00, 0x1c, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x0a,
        ],
        None,
        Packet::LsUpdate(LsUpdate {
            hdr: hdr(PacketType::LsUpdate, ip4!("2.2.2.2"), ip4!("0.0.0.1")),
            lsas: vec![
                LSA1.1.clone(),
                Lsa::new(
                    49,
                    Options::E,
                    ip4!("2.2.2.2"),
                    ip4!("2.2.2.2"),
                    0x80000001,
                    LsaBody::SummaryNetwork(LsaSummary {
                        mask: ip4!("255.255.255.255"),
                        metric: 0,
                    }),
                ),
                Lsa::new(
                    49,
                    Options::E,
                    ip4!("10.0.2.0"),
                    ip4!("2.2.2.2"),
                    0x80000001,
                    LsaBody::SummaryNetwork(LsaSummary {
                        mask: ip4!("255.255.255.0"),
                        metric: 10,
                    }),
                ),
            ],
        }),
    )
});

static LSACK1: Lazy<(Vec<u8>, Option<AuthCtx>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x05, 0x00, 0x54, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x01, 0xa0, 0x2e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x03, 0x03, 0x03, 0x03, 0x02,
            0x02, 0x02, 0x02, 0x80, 0x00, 0x00, 0x01, 0x09, 0x36, 0x00, 0x1c,
            0x00, 0x01, 0x02, 0x03, 0x0a, 0x00, 0x03, 0x00, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x01, 0x54, 0xdf, 0x00, 0x1c, 0x00, 0x01,
            0x02, 0x03, 0x0a, 0x00, 0x04, 0x00, 0x02, 0x02, 0x02, 0x02, 0x80,
            0x00, 0x00, 0x01, 0x49, 0xe9, 0x00, 0x1c,
        ],
        None,
        Packet::LsAck(LsAck {
            hdr: hdr(PacketType::LsAck, ip4!("1.1.1.1"), ip4!("0.0.0.1")),
            lsa_hdrs: vec![
                LsaHdr {
                    age: 1,
                    options: Options::E,
                    lsa_type: LsaTypeCode::SummaryNetwork.into(),
                    lsa_id: ip4!("3.3.3.3"),
                    adv_rtr: ip4!("2.2.2.2"),
                    seq_no: 0x80000001,
                    cksum: 0x0936,
                    length: 28,
                },
                LsaHdr {
                    age: 1,
                    options: Options::E,
                    lsa_type: LsaTypeCode::SummaryNetwork.into(),
                    lsa_id: ip4!("10.0.3.0"),
                    adv_rtr: ip4!("2.2.2.2"),
                    seq_no: 0x80000001,
                    cksum: 0x54df,
                    length: 28,
                },
                LsaHdr {
                    age: 1,
                    options: Options::E,
                    lsa_type: LsaTypeCode::SummaryNetwork.into(),
                    lsa_id: ip4!("10.0.4.0"),
                    adv_rtr: ip4!("2.2.2.2"),
                    seq_no: 0x80000001,
                    cksum: 0x49e9,
                    length: 28,
                },
            ],
        }),
    )
});

//
// Test LSAs.
//

static LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x31, 0x02, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x80, 0x00, 0x00, 0x02, 0x37, 0xf4, 0x00, 0x24, 0x01, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x01, 0x00, 0xff, 0xff, 0xff, 0x00, 0x03,
            0x00, 0x00, 0x0a,
        ],
        Lsa::new(
            49,
            Options::E,
            ip4!("2.2.2.2"),
            ip4!("2.2.2.2"),
            0x80000002,
            LsaBody::Router(LsaRouter {
                flags: LsaRouterFlags::B,
                links: vec![LsaRouterLink {
                    link_type: LsaRouterLinkType::StubNetwork,
                    link_id: ip4!("10.0.1.0"),
                    link_data: ip4!("255.255.255.0"),
                    metric: 10,
                }],
            }),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref auth, ref hello) = *HELLO1;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_encode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_encode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5() {
    let (ref bytes, ref auth, ref hello) = *HELLO1_MD5;
    test_decode_packet(bytes, auth, hello);
}

#[test]
fn test_decode_hello_md5_wrong_key() {
    let (ref bytes, _, _) = *HELLO1_MD5;
    let auth = AuthCtx {
        key_id: 1,
        key: "OLOH".to_owned(),
    };
    let mut buf = Bytes::copy_from_slice(bytes);
    assert_eq!(
        Packet::decode(&mut buf, Some(&auth)),
        Err(DecodeError::AuthError)
    );
}

#[test]
fn test_decode_hello_md5_wrong_key_id() {
    let (ref bytes, _, _) = *HELLO1_MD5;
    let auth = AuthCtx {
        key_id: 2,
        key: "HOLO".to_owned(),
    };
    let mut buf = Bytes::copy_from_slice(bytes);
    assert_eq!(
        Packet::decode(&mut buf, Some(&auth)),
        Err(DecodeError::AuthKeyIdNotFound(1))
    );
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref auth, ref dbdesc) = *DBDESC1;
    test_encode_packet(bytes, auth, dbdesc);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref auth, ref dbdesc) = *DBDESC1;
    test_decode_packet(bytes, auth, dbdesc);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_encode_packet(bytes, auth, request);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref auth, ref request) = *LSREQUEST1;
    test_decode_packet(bytes, auth, request);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupdate) = *LSUPDATE1;
    test_encode_packet(bytes, auth, lsupdate);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref auth, ref lsupdate) = *LSUPDATE1;
    test_decode_packet(bytes, auth, lsupdate);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref auth, ref lsack) = *LSACK1;
    test_encode_packet(bytes, auth, lsack);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref auth, ref lsack) = *LSACK1;
    test_decode_packet(bytes, auth, lsack);
}

#[test]
fn test_encode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_lsa1() {
    let (ref bytes, ref lsa) = *LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_decode_bad_checksum() {
    let (ref bytes, _, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[12] ^= 0xff;
    let mut buf = Bytes::from(bytes);
    assert_eq!(
        Packet::decode(&mut buf, None),
        Err(DecodeError::InvalidChecksum)
    );
}

#[test]
fn test_decode_bad_version() {
    let (ref bytes, _, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[0] = 3;
    let mut buf = Bytes::from(bytes);
    assert_eq!(
        Packet::decode(&mut buf, None),
        Err(DecodeError::InvalidVersion(3))
    );
}

#[test]
fn test_decode_truncated() {
    let (ref bytes, _, _) = *HELLO1;
    let mut buf = Bytes::copy_from_slice(&bytes[..20]);
    assert_eq!(
        Packet::decode(&mut buf, None),
        Err(DecodeError::InvalidLength(20))
    );
}
