//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{warn, warn_span};

use crate::collections::{AreaId, InterfaceId, LsaEntryId, NeighborId};
use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::error::DecodeError;
use crate::packet::lsa::LsaType;
use crate::packet::{AuthType, PacketType};

// Errors returned by the host API or raised while processing an event.
//
// Errors raised while processing an event are logged and dropped. They never
// change protocol state.
#[derive(Clone, Debug)]
pub enum Error {
    // Host API
    InstanceInactive,
    AreaExists(Ipv4Addr),
    AreaNotFound(Ipv4Addr),
    InterfaceExists(String),
    InterfaceNotFound(String),
    // Timer or deferred event referring to a deleted object
    AreaIdNotFound(AreaId),
    InterfaceIdNotFound(InterfaceId),
    NeighborIdNotFound(NeighborId),
    LsaEntryIdNotFound(LsaEntryId),
    // Packet input
    InvalidSrcAddr(Ipv4Addr),
    InvalidDstAddr(Ipv4Addr),
    PacketDecodeError(DecodeError),
    UnknownNeighbor(Ipv4Addr, Ipv4Addr),
    PacketAuthInvalidSeqno(Ipv4Addr, u32),
    InterfaceCfgError(String, Ipv4Addr, PacketType, InterfaceCfgError),
    DbDescReject(Ipv4Addr, nsm::State),
    LsaUnknownType(LsaType),
    // State machines
    IsmUnexpectedEvent(ism::State, ism::Event),
    NsmUnexpectedEvent(Ipv4Addr, nsm::State, nsm::Event),
}

// Mismatches between a received packet and the receiving interface's
// configuration. Reported to observers through `if_config_error`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InterfaceCfgError {
    AreaIdMismatch(Ipv4Addr, Ipv4Addr),
    HelloMaskMismatch(Ipv4Addr, Ipv4Addr),
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u32, u32),
    ExternalRoutingCapabilityMismatch(bool),
    MtuMismatch(u16),
    DuplicateRouterId(Ipv4Addr),
    AuthTypeMismatch(AuthType, AuthType),
    AuthKeyMismatch,
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::InstanceInactive => warn!("{}", self),
            Error::AreaExists(area_id) | Error::AreaNotFound(area_id) => {
                warn!(%area_id, "{}", self)
            }
            Error::InterfaceExists(name) | Error::InterfaceNotFound(name) => {
                warn!(%name, "{}", self)
            }
            Error::AreaIdNotFound(id) => warn!(area = ?id, "{}", self),
            Error::InterfaceIdNotFound(id) => {
                warn!(interface = ?id, "{}", self)
            }
            Error::NeighborIdNotFound(id) => warn!(neighbor = ?id, "{}", self),
            Error::LsaEntryIdNotFound(id) => warn!(lsa = ?id, "{}", self),
            Error::InvalidSrcAddr(addr) | Error::InvalidDstAddr(addr) => {
                warn!(%addr, "{}", self)
            }
            Error::PacketDecodeError(..) => warn!("{}", self),
            Error::UnknownNeighbor(src, router_id) => {
                warn!(%src, %router_id, "{}", self)
            }
            Error::PacketAuthInvalidSeqno(src, seqno) => {
                warn!(%src, %seqno, "{}", self)
            }
            Error::InterfaceCfgError(name, src, pkt_type, error) => {
                let _iface = warn_span!("interface", %name).entered();
                let _input = warn_span!("input", %src, ?pkt_type).entered();
                error.log();
            }
            Error::DbDescReject(router_id, state) => {
                let _nbr = warn_span!("neighbor", %router_id).entered();
                warn!(?state, "{}", self);
            }
            Error::LsaUnknownType(lsa_type) => warn!(%lsa_type, "{}", self),
            Error::IsmUnexpectedEvent(state, event) => {
                let _fsm = warn_span!("fsm").entered();
                warn!(?state, ?event, "{}", self);
            }
            Error::NsmUnexpectedEvent(router_id, state, event) => {
                let _nbr = warn_span!("neighbor", %router_id).entered();
                let _fsm = warn_span!("fsm").entered();
                warn!(?state, ?event, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Error::InstanceInactive => "instance isn't running",
            Error::AreaExists(..) => "duplicate area",
            Error::AreaNotFound(..) => "no such area",
            Error::InterfaceExists(..) => "duplicate interface",
            Error::InterfaceNotFound(..) => "no such interface",
            Error::AreaIdNotFound(..)
            | Error::InterfaceIdNotFound(..)
            | Error::NeighborIdNotFound(..)
            | Error::LsaEntryIdNotFound(..) => "stale object reference",
            Error::InvalidSrcAddr(..) => "packet source address rejected",
            Error::InvalidDstAddr(..) => {
                "packet destination address rejected"
            }
            Error::PacketDecodeError(error) => {
                return write!(f, "malformed packet: {error}");
            }
            Error::UnknownNeighbor(..) => "packet from unknown neighbor",
            Error::PacketAuthInvalidSeqno(..) => {
                "cryptographic sequence number went backwards"
            }
            Error::InterfaceCfgError(_, _, _, error) => {
                return error.fmt(f);
            }
            Error::DbDescReject(..) => "Database Description rejected",
            Error::LsaUnknownType(..) => "LSA of unknown type",
            Error::IsmUnexpectedEvent(..) => "unexpected interface event",
            Error::NsmUnexpectedEvent(..) => "unexpected neighbor event",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PacketDecodeError(error) => Some(error),
            Error::InterfaceCfgError(_, _, _, error) => Some(error),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(error: DecodeError) -> Error {
        Error::PacketDecodeError(error)
    }
}

// ===== impl InterfaceCfgError =====

impl InterfaceCfgError {
    pub(crate) fn log(&self) {
        match self {
            InterfaceCfgError::AreaIdMismatch(received, ours)
            | InterfaceCfgError::HelloMaskMismatch(received, ours) => {
                warn!(%received, %ours, "{}", self)
            }
            InterfaceCfgError::HelloIntervalMismatch(received, ours) => {
                warn!(%received, %ours, "{}", self)
            }
            InterfaceCfgError::DeadIntervalMismatch(received, ours) => {
                warn!(%received, %ours, "{}", self)
            }
            InterfaceCfgError::ExternalRoutingCapabilityMismatch(e_bit) => {
                warn!(%e_bit, "{}", self)
            }
            InterfaceCfgError::MtuMismatch(mtu) => warn!(%mtu, "{}", self),
            InterfaceCfgError::DuplicateRouterId(router_id) => {
                warn!(%router_id, "{}", self)
            }
            InterfaceCfgError::AuthTypeMismatch(received, ours) => {
                warn!(?received, ?ours, "{}", self)
            }
            InterfaceCfgError::AuthKeyMismatch => warn!("{}", self),
        }
    }
}

impl std::fmt::Display for InterfaceCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceCfgError::AreaIdMismatch(..) => {
                write!(f, "packet belongs to another area")
            }
            InterfaceCfgError::HelloMaskMismatch(..) => {
                write!(f, "Hello network mask mismatch")
            }
            InterfaceCfgError::HelloIntervalMismatch(..) => {
                write!(f, "HelloInterval mismatch")
            }
            InterfaceCfgError::DeadIntervalMismatch(..) => {
                write!(f, "RouterDeadInterval mismatch")
            }
            InterfaceCfgError::ExternalRoutingCapabilityMismatch(..) => {
                write!(f, "E-bit mismatch")
            }
            InterfaceCfgError::MtuMismatch(..) => {
                write!(f, "neighbor MTU larger than ours")
            }
            InterfaceCfgError::DuplicateRouterId(..) => {
                write!(f, "neighbor uses our Router ID")
            }
            InterfaceCfgError::AuthTypeMismatch(..) => {
                write!(f, "AuType mismatch")
            }
            InterfaceCfgError::AuthKeyMismatch => {
                write!(f, "authentication key mismatch")
            }
        }
    }
}

impl std::error::Error for InterfaceCfgError {}
