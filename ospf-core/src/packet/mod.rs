//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod auth;
pub mod error;
pub mod lsa;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::ops::Range;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use ospf_utils::ip::Ipv4AddrExt;
use serde::{Deserialize, Serialize};

use crate::packet::auth::{AuthCtx, MD5_DIGEST_LENGTH};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};

// Options field carried by Hello and Database Description packets, and by
// every LSA header.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u8 {
        const E = 0x02;
        const MC = 0x04;
        const NP = 0x08;
        const DC = 0x20;
        const O = 0x40;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        // Master/Slave.
        const MS = 0x01;
        // More.
        const M = 0x02;
        // Init.
        const I = 0x04;
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 1,
    DbDesc = 2,
    LsRequest = 3,
    LsUpdate = 4,
    LsAck = 5,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthType {
    Null = 0,
    Simple = 1,
    Cryptographic = 2,
}

// Common packet header (24 bytes):
//
//   version (1) | type (1) | packet length (2)
//   router ID (4)
//   area ID (4)
//   checksum (2) | AuType (2)
//   authentication (8)
//
// With cryptographic authentication, the last 8 bytes hold a zero field (2),
// the key ID (1), the digest length (1) and the sequence number (4), and the
// digest itself trails the packet.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    #[serde(default)]
    pub auth: PacketHdrAuth,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketHdrAuth {
    #[default]
    Null,
    Simple([u8; 8]),
    Cryptographic {
        key_id: u8,
        auth_len: u8,
        seqno: u32,
    },
}

// Hello body:
//
//   network mask (4)
//   HelloInterval (2) | options (1) | priority (1)
//   RouterDeadInterval (4)
//   DR (4)
//   BDR (4)
//   neighbor Router IDs (4 each)
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: Options,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

// Database Description body:
//
//   interface MTU (2) | options (1) | flags (1)
//   DD sequence number (4)
//   LSA headers (20 each)
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// Link State Request body: a list of (LS type (4), LS ID (4), advertising
// router (4)) entries.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

// Link State Update body: LSA count (4) followed by the full LSAs.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

// Link State Acknowledgment body: LSA headers (20 each).
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

// Encoding and decoding of the part of a packet that follows the common
// header.
trait PacketBody: Sized {
    // Shortest valid body.
    const MIN_LENGTH: u16;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self>;

    fn encode_body(&self, buf: &mut BytesMut);
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 2;
    pub const LENGTH: u16 = 24;
    const LEN_RANGE: Range<usize> = 2..4;
    const CKSUM_RANGE: Range<usize> = 12..14;
    const AUTH_RANGE: Range<usize> = 16..24;

    pub fn new(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        auth: PacketHdrAuth,
    ) -> Self {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
            auth,
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self.auth {
            PacketHdrAuth::Null => AuthType::Null,
            PacketHdrAuth::Simple(_) => AuthType::Simple,
            PacketHdrAuth::Cryptographic { .. } => AuthType::Cryptographic,
        }
    }

    // Cryptographic sequence number, if any.
    pub fn auth_seqno(&self) -> Option<u32> {
        match self.auth {
            PacketHdrAuth::Cryptographic { seqno, .. } => Some(seqno),
            PacketHdrAuth::Null | PacketHdrAuth::Simple(_) => None,
        }
    }

    // Returns the header and the packet length it announces. The caller
    // guarantees at least `LENGTH` bytes.
    fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16)> {
        let version = buf.get_u8();
        if version != Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let pkt_type = buf.get_u8();
        let pkt_type = PacketType::from_u8(pkt_type)
            .ok_or(DecodeError::UnknownPacketType(pkt_type))?;

        let pkt_len = buf.get_u16();
        if pkt_len < Self::LENGTH {
            return Err(DecodeError::InvalidLength(pkt_len));
        }

        let router_id = buf.get_ipv4();
        if !router_id.is_usable() {
            return Err(DecodeError::InvalidRouterId(router_id));
        }
        let area_id = buf.get_ipv4();

        // The checksum is verified over the raw packet later on.
        buf.advance(2);

        let au_type = buf.get_u16();
        let auth = match AuthType::from_u16(au_type) {
            Some(AuthType::Null) => {
                buf.advance(8);
                PacketHdrAuth::Null
            }
            Some(AuthType::Simple) => {
                let mut password = [0; 8];
                buf.copy_to_slice(&mut password);
                PacketHdrAuth::Simple(password)
            }
            Some(AuthType::Cryptographic) => {
                buf.advance(2);
                PacketHdrAuth::Cryptographic {
                    key_id: buf.get_u8(),
                    auth_len: buf.get_u8(),
                    seqno: buf.get_u32(),
                }
            }
            None => return Err(DecodeError::UnsupportedAuthType(au_type)),
        };

        let hdr = PacketHdr::new(pkt_type, router_id, area_id, auth);
        Ok((hdr, pkt_len))
    }

    // Packet length and checksum are left zeroed until the body is known.
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_ipv4(&self.area_id);
        buf.put_u16(0);
        buf.put_u16(self.auth_type() as u16);
        match self.auth {
            // The password is written once the checksum is in place.
            PacketHdrAuth::Null | PacketHdrAuth::Simple(_) => buf.put_u64(0),
            PacketHdrAuth::Cryptographic {
                key_id,
                auth_len,
                seqno,
            } => {
                buf.put_u16(0);
                buf.put_u8(key_id);
                buf.put_u8(auth_len);
                buf.put_u32(seqno);
            }
        }
    }

    // Fills in the length, then the checksum or message digest, of a fully
    // encoded packet.
    fn finalize(&self, buf: &mut BytesMut, auth: Option<&AuthCtx>) {
        let pkt_len = buf.len() as u16;
        buf[Self::LEN_RANGE].copy_from_slice(&pkt_len.to_be_bytes());

        match self.auth {
            PacketHdrAuth::Null => {
                let cksum = checksum(buf);
                buf[Self::CKSUM_RANGE].copy_from_slice(&cksum);
            }
            PacketHdrAuth::Simple(password) => {
                let cksum = checksum(buf);
                buf[Self::CKSUM_RANGE].copy_from_slice(&cksum);
                buf[Self::AUTH_RANGE].copy_from_slice(&password);
            }
            // Without a key the digest is left out.
            PacketHdrAuth::Cryptographic { .. } => {
                if let Some(auth) = auth {
                    let digest = auth::md5_digest(buf, &auth.key);
                    buf.put_slice(&digest);
                }
            }
        }
    }

    // Checks the raw packet against either the message digest (when a key
    // is available) or the standard checksum. `data` may extend past
    // `pkt_len` with the digest trailer.
    fn verify(
        &self,
        data: &[u8],
        pkt_len: usize,
        auth: Option<&AuthCtx>,
    ) -> DecodeResult<()> {
        match (self.auth, auth) {
            (
                PacketHdrAuth::Cryptographic {
                    key_id, auth_len, ..
                },
                Some(auth),
            ) => {
                if key_id != auth.key_id {
                    return Err(DecodeError::AuthKeyIdNotFound(key_id));
                }
                if auth_len != MD5_DIGEST_LENGTH {
                    return Err(DecodeError::AuthLenError(auth_len));
                }
                let trailer = data
                    .get(pkt_len..pkt_len + auth_len as usize)
                    .ok_or(DecodeError::AuthError)?;
                let digest = auth::md5_digest(&data[..pkt_len], &auth.key);
                if *trailer != digest {
                    return Err(DecodeError::AuthError);
                }
                Ok(())
            }
            (PacketHdrAuth::Cryptographic { .. }, None) => Ok(()),
            _ => {
                // The authentication field isn't covered by the checksum.
                let data = &data[..pkt_len];
                let mut cksum = Checksum::new();
                cksum.add_bytes(&data[..Self::AUTH_RANGE.start]);
                cksum.add_bytes(&data[Self::AUTH_RANGE.end..]);
                if cksum.checksum() != [0; 2] {
                    return Err(DecodeError::InvalidChecksum);
                }
                Ok(())
            }
        }
    }
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;
}

impl PacketBody for Hello {
    const MIN_LENGTH: u16 = Self::BASE_LENGTH;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let network_mask = buf.get_ipv4();
        let hello_interval = buf.get_u16();
        let options = Options::from_bits_truncate(buf.get_u8());
        let priority = buf.get_u8();
        let dead_interval = buf.get_u32();
        let dr = buf.get_opt_ipv4();
        let bdr = buf.get_opt_ipv4();
        let neighbors = std::iter::from_fn(|| {
            (buf.remaining() >= 4).then(|| buf.get_ipv4())
        })
        .collect();

        Ok(Hello {
            hdr,
            network_mask,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.network_mask);
        buf.put_u16(self.hello_interval);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.priority);
        buf.put_u32(self.dead_interval);
        buf.put_opt_ipv4(&self.dr);
        buf.put_opt_ipv4(&self.bdr);
        self.neighbors.iter().for_each(|nbr| buf.put_ipv4(nbr));
    }
}

// ===== impl DbDesc =====

impl DbDesc {
    pub const BASE_LENGTH: u16 = 8;
}

impl PacketBody for DbDesc {
    const MIN_LENGTH: u16 = Self::BASE_LENGTH;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(DbDesc {
            hdr,
            mtu: buf.get_u16(),
            options: Options::from_bits_truncate(buf.get_u8()),
            dd_flags: DbDescFlags::from_bits_truncate(buf.get_u8()),
            dd_seq_no: buf.get_u32(),
            lsa_hdrs: decode_lsa_hdrs(buf),
        })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u16(self.mtu);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.dd_flags.bits());
        buf.put_u32(self.dd_seq_no);
        encode_lsa_hdrs(&self.lsa_hdrs, buf);
    }
}

// ===== impl LsRequest =====

impl LsRequest {
    pub const ENTRY_LENGTH: u16 = 12;
}

impl PacketBody for LsRequest {
    const MIN_LENGTH: u16 = 0;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let mut entries = vec![];
        while buf.remaining() >= Self::ENTRY_LENGTH as usize {
            // The LS type is carried in a 32-bit field.
            let lsa_type = LsaType(buf.get_u32() as u8);
            let lsa_id = buf.get_ipv4();
            let adv_rtr = buf.get_ipv4();
            entries.push(LsaKey::new(lsa_type, adv_rtr, lsa_id));
        }

        Ok(LsRequest { hdr, entries })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        for key in &self.entries {
            buf.put_u32(key.lsa_type.0.into());
            buf.put_ipv4(&key.lsa_id);
            buf.put_ipv4(&key.adv_rtr);
        }
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;
}

impl PacketBody for LsUpdate {
    const MIN_LENGTH: u16 = Self::BASE_LENGTH;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let count = buf.get_u32();
        let lsas = (0..count)
            .map(|_| Lsa::decode(buf))
            .collect::<DecodeResult<_>>()?;

        Ok(LsUpdate { hdr, lsas })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u32(self.lsas.len() as u32);
        self.lsas.iter().for_each(|lsa| buf.put_slice(&lsa.raw));
    }
}

// ===== impl LsAck =====

impl PacketBody for LsAck {
    const MIN_LENGTH: u16 = 0;

    fn decode_body(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let lsa_hdrs = decode_lsa_hdrs(buf);
        Ok(LsAck { hdr, lsa_hdrs })
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        encode_lsa_hdrs(&self.lsa_hdrs, buf);
    }
}

// ===== impl Packet =====

impl Packet {
    // Decodes a packet received from the network.
    //
    // Cryptographically authenticated packets are only checked against
    // their message digest when a key is provided. All other packets must
    // have a valid checksum.
    pub fn decode(
        buf: &mut Bytes,
        auth: Option<&AuthCtx>,
    ) -> DecodeResult<Self> {
        if buf.len() < PacketHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        // Zero-copy handle on the whole datagram.
        let data = buf.clone();
        let (hdr, pkt_len) = PacketHdr::decode(buf)?;
        if pkt_len as usize > data.len() {
            return Err(DecodeError::InvalidLength(pkt_len));
        }
        hdr.verify(&data, pkt_len as usize, auth)?;

        let body_len = (pkt_len - PacketHdr::LENGTH) as usize;
        let mut body = buf.slice(..body_len);
        let packet = match hdr.pkt_type {
            PacketType::Hello => Packet::Hello(decode_body(hdr, &mut body)?),
            PacketType::DbDesc => Packet::DbDesc(decode_body(hdr, &mut body)?),
            PacketType::LsRequest => {
                Packet::LsRequest(decode_body(hdr, &mut body)?)
            }
            PacketType::LsUpdate => {
                Packet::LsUpdate(decode_body(hdr, &mut body)?)
            }
            PacketType::LsAck => Packet::LsAck(decode_body(hdr, &mut body)?),
        };

        Ok(packet)
    }

    // Encodes the packet for transmission.
    //
    // The keyed-MD5 digest is appended only when the header asks for
    // cryptographic authentication and a key is provided.
    pub fn encode(&self, auth: Option<&AuthCtx>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            let hdr = self.hdr();
            hdr.encode(&mut buf);
            match self {
                Packet::Hello(pkt) => pkt.encode_body(&mut buf),
                Packet::DbDesc(pkt) => pkt.encode_body(&mut buf),
                Packet::LsRequest(pkt) => pkt.encode_body(&mut buf),
                Packet::LsUpdate(pkt) => pkt.encode_body(&mut buf),
                Packet::LsAck(pkt) => pkt.encode_body(&mut buf),
            }
            hdr.finalize(&mut buf, auth);

            buf.clone().freeze()
        })
    }

    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }

    pub fn hdr_mut(&mut self) -> &mut PacketHdr {
        match self {
            Packet::Hello(pkt) => &mut pkt.hdr,
            Packet::DbDesc(pkt) => &mut pkt.hdr,
            Packet::LsRequest(pkt) => &mut pkt.hdr,
            Packet::LsUpdate(pkt) => &mut pkt.hdr,
            Packet::LsAck(pkt) => &mut pkt.hdr,
        }
    }
}

// ===== helper functions =====

fn decode_body<T: PacketBody>(
    hdr: PacketHdr,
    buf: &mut Bytes,
) -> DecodeResult<T> {
    if buf.remaining() < T::MIN_LENGTH as usize {
        return Err(DecodeError::InvalidLength(buf.len() as u16));
    }
    T::decode_body(hdr, buf)
}

// Trailing bytes that don't make up a full header are ignored.
fn decode_lsa_hdrs(buf: &mut Bytes) -> Vec<LsaHdr> {
    let count = buf.remaining() / LsaHdr::LENGTH as usize;
    (0..count).map(|_| LsaHdr::decode(buf)).collect()
}

fn encode_lsa_hdrs(lsa_hdrs: &[LsaHdr], buf: &mut BytesMut) {
    lsa_hdrs.iter().for_each(|lsa_hdr| lsa_hdr.encode(buf));
}

fn checksum(data: &[u8]) -> [u8; 2] {
    let mut cksum = Checksum::new();
    cksum.add_bytes(data);
    cksum.checksum()
}
