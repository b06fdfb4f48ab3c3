//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub type DecodeResult<T> = Result<T, DecodeError>;

// Reasons for rejecting a received packet before it reaches the protocol
// handlers. Any of these drops the whole packet.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    // Packet header
    InvalidVersion(u8),
    UnknownPacketType(u8),
    InvalidLength(u16),
    InvalidChecksum,
    InvalidRouterId(Ipv4Addr),
    // Authentication
    UnsupportedAuthType(u16),
    AuthKeyIdNotFound(u8),
    AuthLenError(u8),
    AuthError,
    // LSAs
    InvalidLsaLength,
    UnknownRouterLinkType(u8),
}

// Reasons for discarding a single LSA of an LS Update. The other LSAs of the
// same packet are still processed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaValidationError {
    InvalidChecksum,
    InvalidLsaAge,
    InvalidLsaSeqNo,
    RouterLsaIdMismatch,
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidVersion(version) => {
                write!(f, "unsupported OSPF version {version}")
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type {pkt_type}")
            }
            DecodeError::InvalidLength(len) => {
                write!(f, "bad packet length {len}")
            }
            DecodeError::InvalidChecksum => f.write_str("bad packet checksum"),
            DecodeError::InvalidRouterId(router_id) => {
                write!(f, "unusable Router ID {router_id}")
            }
            DecodeError::UnsupportedAuthType(au_type) => {
                write!(f, "unsupported AuType {au_type}")
            }
            DecodeError::AuthKeyIdNotFound(key_id) => {
                write!(f, "no key configured for Key ID {key_id}")
            }
            DecodeError::AuthLenError(len) => {
                write!(f, "unexpected message digest length {len}")
            }
            DecodeError::AuthError => f.write_str("message digest mismatch"),
            DecodeError::InvalidLsaLength => f.write_str("malformed LSA"),
            DecodeError::UnknownRouterLinkType(link_type) => {
                write!(f, "unknown router link type {link_type}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

// ===== impl LsaValidationError =====

impl std::fmt::Display for LsaValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            LsaValidationError::InvalidChecksum => "bad LSA checksum",
            LsaValidationError::InvalidLsaAge => "LS age above MaxAge",
            LsaValidationError::InvalidLsaSeqNo => {
                "reserved LS sequence number (0x80000000)"
            }
            LsaValidationError::RouterLsaIdMismatch => {
                "Router-LSA ID differs from its advertising router"
            }
        };
        f.write_str(msg)
    }
}

impl std::error::Error for LsaValidationError {}
