//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{Span, debug, debug_span};

use crate::interface::ism;
use crate::neighbor::{NeighborNetId, nsm};
use crate::packet::Packet;
use crate::packet::error::LsaValidationError;
use crate::packet::lsa::LsaHdr;

// Debug messages emitted by the adjacency and flooding machinery.
//
// All messages are logged under the "ospf-instance" span entered by the host
// driver, if any.
#[derive(Debug)]
pub enum Debug<'a> {
    // Instance
    InstanceStart(Ipv4Addr),
    InstanceStop,
    // Interface
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    IsmEvent(&'a str, &'a ism::State, &'a ism::Event),
    IsmTransition(&'a str, &'a ism::State, &'a ism::State),
    IsmDrElection(
        &'a str,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
    ),
    // Neighbor
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    // Packet I/O
    PacketRx(&'a str, &'a Ipv4Addr, &'a Ipv4Addr, &'a Packet),
    PacketTx(&'a str, &'a [Ipv4Addr], &'a Packet),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    // Flooding
    QuestionableAck(Ipv4Addr, &'a LsaHdr),
    LsaDiscard(Ipv4Addr, &'a LsaHdr, &'a LsaValidationError),
    LsaMinArrivalDiscard(Ipv4Addr, &'a LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a LsaHdr),
    // Database
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaOriginateMinInterval(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    LsaRefresh(&'a LsaHdr),
}

// Why an interface isn't running the protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceInactiveReason {
    InstanceDown,
    OperationalDown,
    MissingIpv4Address,
    LoopedBack,
    Resetting,
}

// What triggered a SeqNoMismatch event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    UnexpectedDbDesc,
    InvalidLsaType,
}

// Why an LSA is being removed from the routing domain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
}

// ===== impl Debug =====

impl Debug<'_> {
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart(router_id) => {
                debug!(%router_id, "{}", self);
            }
            Debug::InstanceStop => {
                debug!("{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                let _iface = iface_span(name).entered();
                debug!("{}", self);
            }
            Debug::InterfaceStop(name, reason) => {
                let _iface = iface_span(name).entered();
                debug!(%reason, "{}", self);
            }
            Debug::IsmEvent(name, state, event) => {
                let _iface = iface_span(name).entered();
                let _fsm = debug_span!("fsm").entered();
                debug!(?state, ?event, "{}", self);
            }
            Debug::IsmTransition(name, old_state, new_state) => {
                let _iface = iface_span(name).entered();
                let _fsm = debug_span!("fsm").entered();
                debug!(?old_state, ?new_state, "{}", self);
            }
            Debug::IsmDrElection(name, old_dr, new_dr, old_bdr, new_bdr) => {
                let _iface = iface_span(name).entered();
                let _fsm = debug_span!("fsm").entered();
                debug!(?old_dr, ?new_dr, ?old_bdr, ?new_bdr, "{}", self);
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                let _nbr = nbr_span(router_id).entered();
                debug!("{}", self);
            }
            Debug::NsmEvent(router_id, state, event) => {
                let _nbr = nbr_span(router_id).entered();
                let _fsm = debug_span!("fsm").entered();
                debug!(?state, ?event, "{}", self);
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                let _nbr = nbr_span(router_id).entered();
                let _fsm = debug_span!("fsm").entered();
                debug!(?old_state, ?new_state, "{}", self);
            }
            Debug::PacketRx(name, src, dst, packet) => {
                let _net = debug_span!("network").entered();
                let _input = debug_span!("input").entered();
                let data = serde_json::to_string(packet).unwrap_or_default();
                debug!(interface = %name, %src, %dst, %data, "{}", self);
            }
            Debug::PacketTx(name, dst, packet) => {
                let _net = debug_span!("network").entered();
                let _output = debug_span!("output").entered();
                let data = serde_json::to_string(packet).unwrap_or_default();
                debug!(interface = %name, ?dst, %data, "{}", self);
            }
            Debug::PacketRxIgnore(router_id, state) => {
                let _nbr = nbr_span(router_id).entered();
                debug!(?state, "{}", self);
            }
            Debug::QuestionableAck(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr) => {
                let _nbr = nbr_span(router_id).entered();
                log_lsa(lsa_hdr, self);
            }
            Debug::LsaDiscard(router_id, lsa_hdr, error) => {
                let _nbr = nbr_span(router_id).entered();
                debug!(
                    lsa_type = %lsa_hdr.lsa_type,
                    lsa_id = %lsa_hdr.lsa_id,
                    adv_rtr = %lsa_hdr.adv_rtr,
                    %error,
                    "{}",
                    self
                );
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr) => {
                log_lsa(lsa_hdr, self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(
                    lsa_type = %lsa_hdr.lsa_type,
                    lsa_id = %lsa_hdr.lsa_id,
                    adv_rtr = %lsa_hdr.adv_rtr,
                    %reason,
                    "{}",
                    self
                );
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Debug::InstanceStart(..) => "instance started",
            Debug::InstanceStop => "instance stopped",
            Debug::InterfaceCreate(..) => "interface created",
            Debug::InterfaceDelete(..) => "interface deleted",
            Debug::InterfaceStart(..) => "interface up",
            Debug::InterfaceStop(..) => "interface down",
            Debug::IsmEvent(..) | Debug::NsmEvent(..) => "event",
            Debug::IsmTransition(..) | Debug::NsmTransition(..) => {
                "state transition"
            }
            Debug::IsmDrElection(..) => "DR/BDR election",
            Debug::NeighborCreate(..) => "neighbor created",
            Debug::NeighborDelete(..) => "neighbor deleted",
            Debug::PacketRx(..) | Debug::PacketTx(..) => "packet",
            Debug::PacketRxIgnore(..) => {
                "ignoring packet from neighbor not in adjacency"
            }
            Debug::QuestionableAck(..) => "questionable acknowledgment",
            Debug::LsaDiscard(..) => "invalid LSA discarded",
            Debug::LsaMinArrivalDiscard(..) => {
                "LSA discarded: arrived within MinLSArrival"
            }
            Debug::LsaSelfOriginated(..) => "received self-originated LSA",
            Debug::LsaInstall(..) => "LSA installed",
            Debug::LsaOriginate(..) => "LSA originated",
            Debug::LsaOriginateMinInterval(..) => {
                "LSA origination delayed by MinLSInterval"
            }
            Debug::LsaFlush(..) => "LSA flushed",
            Debug::LsaRefresh(..) => "LSA refreshed",
        };
        f.write_str(msg)
    }
}

// ===== impl InterfaceInactiveReason =====

impl std::fmt::Display for InterfaceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            InterfaceInactiveReason::InstanceDown => "instance down",
            InterfaceInactiveReason::OperationalDown => "link down",
            InterfaceInactiveReason::MissingIpv4Address => {
                "no primary IPv4 address"
            }
            InterfaceInactiveReason::LoopedBack => "looped back",
            InterfaceInactiveReason::Resetting => "resetting",
        };
        f.write_str(reason)
    }
}

// ===== impl SeqNoMismatchReason =====

impl std::fmt::Display for SeqNoMismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SeqNoMismatchReason::InconsistentFlags => "unexpected I/M/MS bits",
            SeqNoMismatchReason::InconsistentOptions => "options changed",
            SeqNoMismatchReason::InconsistentSeqNo => {
                "DD sequence number out of order"
            }
            SeqNoMismatchReason::UnexpectedDbDesc => {
                "Database Description received in the wrong state"
            }
            SeqNoMismatchReason::InvalidLsaType => {
                "LSA type not allowed in this area"
            }
        };
        f.write_str(reason)
    }
}

// ===== impl LsaFlushReason =====

impl std::fmt::Display for LsaFlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaFlushReason::Expiry => f.write_str("MaxAge reached"),
            LsaFlushReason::PrematureAging => f.write_str("premature aging"),
        }
    }
}

// ===== helper functions =====

fn iface_span(name: &str) -> Span {
    debug_span!("interface", %name)
}

fn nbr_span(router_id: &Ipv4Addr) -> Span {
    debug_span!("neighbor", %router_id)
}

fn log_lsa(lsa_hdr: &LsaHdr, msg: &Debug<'_>) {
    debug!(
        lsa_type = %lsa_hdr.lsa_type,
        lsa_id = %lsa_hdr.lsa_id,
        adv_rtr = %lsa_hdr.adv_rtr,
        seq_no = %format_args!("{:#010x}", lsa_hdr.seq_no),
        age = lsa_hdr.age,
        "{}",
        msg
    );
}
