//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use serde::{Deserialize, Serialize};

use crate::lsdb::{LSA_MAX_AGE, LSA_RESERVED_SEQ_NO};
use crate::packet::Options;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};

// A decoded LSA along with its wire representation.
//
// `raw` is what gets flooded, so it must be kept in sync with the header
// whenever the age changes.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lsa {
    #[serde(default, skip_serializing)]
    pub raw: Bytes,
    pub hdr: LsaHdr,
    pub body: LsaBody,
    // Logical time at which `hdr.age` was last set. The current age is
    // derived from it.
    #[serde(skip)]
    pub base_time: Option<Duration>,
}

// Identifies an LSA instance-independently.
//
// LSDBs are ordered by this key, so the field order matters: LSAs of the
// same type are kept together, grouped by advertising router.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub adv_rtr: Ipv4Addr,
    pub lsa_id: Ipv4Addr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaScope {
    Area,
    As,
    Unknown,
}

// Raw LS type, which may not be one we know about.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u8);

#[derive(Clone, Copy, Debug, Eq, Ord, FromPrimitive, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaTypeCode {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryRouter = 4,
    AsExternal = 5,
}

// LSA header (20 bytes):
//
//   LS age (2) | options (1) | LS type (1)
//   Link State ID (4)
//   advertising router (4)
//   LS sequence number (4)
//   LS checksum (2) | length (2)
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    pub age: u16,
    pub options: Options,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    #[new(default)]
    pub cksum: u16,
    #[new(default)]
    pub length: u16,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    Network(LsaNetwork),
    SummaryNetwork(LsaSummary),
    SummaryRouter(LsaSummary),
    AsExternal(LsaAsExternal),
    Unknown(LsaUnknown),
}

// Router-LSA body:
//
//   flags (1) | 0 (1) | link count (2)
//   per link:
//     Link ID (4)
//     Link Data (4)
//     type (1) | TOS count (1) | metric (2)
//     TOS entries (4 each, ignored)
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaRouterFlags: u8 {
        // Area border router.
        const B = 0x01;
        // AS boundary router.
        const E = 0x02;
        // Virtual link endpoint.
        const V = 0x04;
        const NT = 0x10;
    }
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 1,
    TransitNetwork = 2,
    StubNetwork = 3,
    VirtualLink = 4,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

// Network-LSA body: network mask (4) followed by the attached routers (4
// each).
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaNetwork {
    pub mask: Ipv4Addr,
    pub attached_rtrs: BTreeSet<Ipv4Addr>,
}

// Summary-LSA body (types 3 and 4):
//
//   network mask (4)
//   0 (1) | metric (3)
//   TOS entries (4 each, ignored)
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaSummary {
    pub mask: Ipv4Addr,
    pub metric: u32,
}

// AS-external-LSA body:
//
//   network mask (4)
//   flags (1) | metric (3)
//   forwarding address (4)
//   external route tag (4)
//   TOS entries (16 each, ignored)
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaAsExternal {
    pub mask: Ipv4Addr,
    pub flags: LsaAsExternalFlags,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaAsExternalFlags: u8 {
        // Type 2 external metric.
        const E = 0x80;
    }
}

// Body of an LSA whose type isn't known. It can still be stored and
// flooded using its raw bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknown {
    pub lsa_type: LsaType,
}

// ===== impl Lsa =====

impl Lsa {
    // Offset of the checksum within the checksummed data, which starts
    // after the LS age field.
    const CKSUM_OFFSET: usize = 14;

    pub fn new(
        age: u16,
        options: Options,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: LsaBody,
    ) -> Self {
        let lsa_type = body.lsa_type();
        let mut lsa = Lsa {
            raw: Bytes::new(),
            hdr: LsaHdr::new(age, options, lsa_type, lsa_id, adv_rtr, seq_no),
            body,
            base_time: None,
        };
        lsa.encode();
        lsa
    }

    // Current age, capped at MaxAge.
    pub fn age(&self, now: Duration) -> u16 {
        let Some(base_time) = self.base_time else {
            return self.hdr.age;
        };
        let elapsed = now.saturating_sub(base_time).as_secs();
        let elapsed = u16::try_from(elapsed).unwrap_or(u16::MAX);
        self.hdr.age.saturating_add(elapsed).min(LSA_MAX_AGE)
    }

    // Header as it should be advertised at `now`.
    pub fn hdr_aged(&self, now: Duration) -> LsaHdr {
        LsaHdr {
            age: self.age(now),
            ..self.hdr
        }
    }

    pub(crate) fn set_age(&mut self, age: u16, now: Duration) {
        self.hdr.age = age;
        self.base_time = Some(now);

        // The age isn't covered by the checksum, so patching it in place is
        // enough.
        if self.raw.len() >= 2 {
            let mut raw = BytesMut::from(&self.raw[..]);
            raw[..2].copy_from_slice(&age.to_be_bytes());
            self.raw = raw.freeze();
        }
    }

    pub(crate) fn set_maxage(&mut self, now: Duration) {
        self.set_age(LSA_MAX_AGE, now);
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < LsaHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }
        let start = buf.clone();
        let hdr = LsaHdr::decode(buf);

        let body_len = hdr
            .length
            .checked_sub(LsaHdr::LENGTH)
            .map(usize::from)
            .filter(|body_len| *body_len <= buf.remaining())
            .ok_or(DecodeError::InvalidLsaLength)?;
        let mut body = buf.split_to(body_len);
        let body = LsaBody::decode(hdr.lsa_type, &mut body)?;

        Ok(Lsa {
            raw: start.slice(..hdr.length as usize),
            hdr,
            body,
            base_time: None,
        })
    }

    // Regenerates the raw bytes, length and checksum from the header and
    // body.
    pub(crate) fn encode(&mut self) {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();
            self.hdr.cksum = 0;
            self.hdr.encode(&mut buf);
            self.body.encode(&mut buf);

            let length = buf.len() as u16;
            buf[18..20].copy_from_slice(&length.to_be_bytes());
            let cksum = Self::checksum(&buf[2..]);
            buf[16..18].copy_from_slice(&cksum);

            self.hdr.length = length;
            self.hdr.cksum = u16::from_be_bytes(cksum);
            self.raw = buf.clone().freeze();
        });
    }

    // Checks that the LSA can be installed (RFC 2328, Section 13, steps 1
    // and 4).
    pub(crate) fn validate(&self) -> Result<(), LsaValidationError> {
        if self.hdr.age > LSA_MAX_AGE {
            return Err(LsaValidationError::InvalidLsaAge);
        }
        if self.hdr.seq_no == LSA_RESERVED_SEQ_NO {
            return Err(LsaValidationError::InvalidLsaSeqNo);
        }
        if !self.is_checksum_valid() {
            return Err(LsaValidationError::InvalidChecksum);
        }
        if let LsaBody::Router(_) = self.body
            && self.hdr.lsa_id != self.hdr.adv_rtr
        {
            return Err(LsaValidationError::RouterLsaIdMismatch);
        }

        Ok(())
    }

    // ISO 8473 check bytes, computed with the checksum field zeroed.
    fn checksum(data: &[u8]) -> [u8; 2] {
        let sum = fletcher::calc_fletcher16(data);
        let c0 = i32::from(sum & 0xff);
        let c1 = i32::from(sum >> 8);

        let pos = (data.len() - Self::CKSUM_OFFSET - 1) as i32;
        let x = match (pos * c0 - c1).rem_euclid(255) {
            0 => 255,
            x => x,
        };
        let mut y = 510 - c0 - x;
        if y > 255 {
            y -= 255;
        }
        [x as u8, y as u8]
    }

    fn is_checksum_valid(&self) -> bool {
        // Hand-built LSAs in tests may leave the checksum unset.
        #[cfg(feature = "testing")]
        {
            if self.hdr.cksum == 0 {
                return true;
            }
        }

        self.raw
            .get(2..self.hdr.length as usize)
            .is_some_and(|data| fletcher::calc_fletcher16(data) == 0)
    }
}

// ===== impl LsaKey =====

impl std::fmt::Display for LsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} adv-rtr {} lsa-id {}",
            self.lsa_type, self.adv_rtr, self.lsa_id
        )
    }
}

// ===== impl LsaType =====

impl LsaType {
    pub fn type_code(&self) -> Option<LsaTypeCode> {
        LsaTypeCode::from_u8(self.0)
    }

    pub fn scope(&self) -> LsaScope {
        match self.type_code() {
            Some(LsaTypeCode::AsExternal) => LsaScope::As,
            Some(_) => LsaScope::Area,
            None => LsaScope::Unknown,
        }
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<LsaTypeCode> for LsaType {
    fn from(code: LsaTypeCode) -> LsaType {
        LsaType(code as u8)
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    // The caller guarantees at least `LENGTH` bytes.
    pub fn decode(buf: &mut Bytes) -> Self {
        LsaHdr {
            age: buf.get_u16(),
            options: Options::from_bits_truncate(buf.get_u8()),
            lsa_type: LsaType(buf.get_u8()),
            lsa_id: buf.get_ipv4(),
            adv_rtr: buf.get_ipv4(),
            seq_no: buf.get_u32(),
            cksum: buf.get_u16(),
            length: buf.get_u16(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.lsa_type.0);
        buf.put_ipv4(&self.lsa_id);
        buf.put_ipv4(&self.adv_rtr);
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    pub fn is_maxage(&self) -> bool {
        self.age == LSA_MAX_AGE
    }

    pub fn key(&self) -> LsaKey {
        LsaKey::new(self.lsa_type, self.adv_rtr, self.lsa_id)
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub fn lsa_type(&self) -> LsaType {
        let code = match self {
            LsaBody::Router(_) => LsaTypeCode::Router,
            LsaBody::Network(_) => LsaTypeCode::Network,
            LsaBody::SummaryNetwork(_) => LsaTypeCode::SummaryNetwork,
            LsaBody::SummaryRouter(_) => LsaTypeCode::SummaryRouter,
            LsaBody::AsExternal(_) => LsaTypeCode::AsExternal,
            LsaBody::Unknown(lsa) => return lsa.lsa_type,
        };
        code.into()
    }

    fn decode(lsa_type: LsaType, buf: &mut Bytes) -> DecodeResult<Self> {
        let body = match lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                LsaBody::Router(LsaRouter::decode(buf)?)
            }
            Some(LsaTypeCode::Network) => {
                LsaBody::Network(LsaNetwork::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryNetwork) => {
                LsaBody::SummaryNetwork(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryRouter) => {
                LsaBody::SummaryRouter(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::AsExternal) => {
                LsaBody::AsExternal(LsaAsExternal::decode(buf)?)
            }
            None => LsaBody::Unknown(LsaUnknown { lsa_type }),
        };

        Ok(body)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::Network(lsa) => lsa.encode(buf),
            LsaBody::SummaryNetwork(lsa) | LsaBody::SummaryRouter(lsa) => {
                lsa.encode(buf)
            }
            LsaBody::AsExternal(lsa) => lsa.encode(buf),
            LsaBody::Unknown(_) => (),
        }
    }
}

// ===== impl LsaRouter =====

impl LsaRouter {
    const BASE_LENGTH: usize = 4;
    const LINK_LENGTH: usize = 12;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure_len(buf, Self::BASE_LENGTH)?;
        let flags = LsaRouterFlags::from_bits_truncate(buf.get_u8());
        buf.advance(1);
        let count = buf.get_u16();

        let mut links = Vec::with_capacity(count.into());
        for _ in 0..count {
            ensure_len(buf, Self::LINK_LENGTH)?;
            let link_id = buf.get_ipv4();
            let link_data = buf.get_ipv4();
            let link_type = buf.get_u8();
            let link_type = LsaRouterLinkType::from_u8(link_type)
                .ok_or(DecodeError::UnknownRouterLinkType(link_type))?;
            let tos_count = usize::from(buf.get_u8());
            let metric = buf.get_u16();

            ensure_len(buf, tos_count * 4)?;
            buf.advance(tos_count * 4);

            links.push(LsaRouterLink {
                link_type,
                link_id,
                link_data,
                metric,
            });
        }

        Ok(LsaRouter { flags, links })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(0);
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_ipv4(&link.link_id);
            buf.put_ipv4(&link.link_data);
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
        }
    }
}

// ===== impl LsaNetwork =====

impl LsaNetwork {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure_len(buf, 4)?;
        let mask = buf.get_ipv4();
        let attached_rtrs = std::iter::from_fn(|| {
            (buf.remaining() >= 4).then(|| buf.get_ipv4())
        })
        .collect();

        Ok(LsaNetwork {
            mask,
            attached_rtrs,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        self.attached_rtrs.iter().for_each(|rtr| buf.put_ipv4(rtr));
    }
}

// ===== impl LsaSummary =====

impl LsaSummary {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure_len(buf, 8)?;
        let mask = buf.get_ipv4();
        buf.advance(1);
        let metric = buf.get_u24();

        Ok(LsaSummary { mask, metric })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(0);
        buf.put_u24(self.metric);
    }
}

// ===== impl LsaAsExternal =====

impl LsaAsExternal {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure_len(buf, 16)?;
        Ok(LsaAsExternal {
            mask: buf.get_ipv4(),
            flags: LsaAsExternalFlags::from_bits_truncate(buf.get_u8()),
            metric: buf.get_u24(),
            fwd_addr: buf.get_opt_ipv4(),
            tag: buf.get_u32(),
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(self.flags.bits());
        buf.put_u24(self.metric);
        buf.put_opt_ipv4(&self.fwd_addr);
        buf.put_u32(self.tag);
    }
}

// ===== helper functions =====

fn ensure_len(buf: &Bytes, len: usize) -> DecodeResult<()> {
    if buf.remaining() < len {
        return Err(DecodeError::InvalidLsaLength);
    }
    Ok(())
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn router_lsa() -> Lsa {
        Lsa::new(
            49,
            Options::E,
            Ipv4Addr::new(2, 2, 2, 2),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000002,
            LsaBody::Router(LsaRouter::new(
                LsaRouterFlags::B,
                vec![LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    Ipv4Addr::new(10, 0, 1, 0),
                    Ipv4Addr::new(255, 255, 255, 0),
                    10,
                )],
            )),
        )
    }

    #[test]
    fn encode_sets_length_and_checksum() {
        let lsa = router_lsa();
        assert_eq!(lsa.hdr.length, 36);
        assert_eq!(lsa.raw.len(), 36);
        assert_ne!(lsa.hdr.cksum, 0);
        assert!(lsa.validate().is_ok());
    }

    #[test]
    fn decode_keeps_raw_bytes() {
        let lsa = router_lsa();
        let mut buf = lsa.raw.clone();
        let decoded = Lsa::decode(&mut buf).unwrap();
        assert_eq!(decoded, lsa);
        assert!(buf.is_empty());
    }

    #[test]
    fn age_follows_logical_clock() {
        let mut lsa = router_lsa();
        assert_eq!(lsa.age(Duration::from_secs(1000)), 49);

        lsa.set_age(100, Duration::from_secs(10));
        assert_eq!(lsa.age(Duration::from_secs(25)), 115);
        assert_eq!(lsa.age(Duration::from_secs(10_000)), LSA_MAX_AGE);
        assert_eq!(&lsa.raw[0..2], &100u16.to_be_bytes());
        // Changing the age doesn't invalidate the checksum.
        assert!(lsa.validate().is_ok());
    }

    #[test]
    fn validate_errors() {
        let mut lsa = router_lsa();
        lsa.hdr.seq_no = LSA_RESERVED_SEQ_NO;
        assert_eq!(lsa.validate(), Err(LsaValidationError::InvalidLsaSeqNo));

        let mut lsa = router_lsa();
        lsa.hdr.age = LSA_MAX_AGE + 1;
        assert_eq!(lsa.validate(), Err(LsaValidationError::InvalidLsaAge));

        let lsa = Lsa::new(
            0,
            Options::E,
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(2, 2, 2, 2),
            0x80000001,
            LsaBody::Router(LsaRouter::new(LsaRouterFlags::empty(), vec![])),
        );
        assert_eq!(
            lsa.validate(),
            Err(LsaValidationError::RouterLsaIdMismatch)
        );
    }

    #[test]
    fn truncated_router_links() {
        let lsa = router_lsa();
        let mut raw = BytesMut::from(lsa.raw.as_ref());
        // Claim two links while carrying only one.
        raw[22..24].copy_from_slice(&2u16.to_be_bytes());
        let mut buf = raw.freeze();
        assert_eq!(Lsa::decode(&mut buf), Err(DecodeError::InvalidLsaLength));
    }

    #[test]
    fn lsa_type_scope() {
        assert_eq!(LsaType(1).scope(), LsaScope::Area);
        assert_eq!(LsaType(3).scope(), LsaScope::Area);
        assert_eq!(LsaType(5).scope(), LsaScope::As);
        assert_eq!(LsaType(11).scope(), LsaScope::Unknown);
    }
}
