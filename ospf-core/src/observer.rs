//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use crate::debug::LsaFlushReason;
use crate::error::{Error, InterfaceCfgError};
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::PacketType;
use crate::packet::lsa::{Lsa, LsaHdr};

// Observer of protocol events.
//
// Observers are registered with `Instance::add_observer` and are notified
// once the processing of the current host request is complete, in the order
// the events occurred. All callbacks default to no-ops.
pub trait Observer {
    fn if_state_change(
        &mut self,
        _ifname: &str,
        _old_state: ism::State,
        _new_state: ism::State,
    ) {
    }

    // DR and BDR are identified by their interface addresses.
    fn if_dr_change(
        &mut self,
        _ifname: &str,
        _dr: Option<Ipv4Addr>,
        _bdr: Option<Ipv4Addr>,
    ) {
    }

    fn nbr_state_change(
        &mut self,
        _ifname: &str,
        _router_id: Ipv4Addr,
        _src: Ipv4Addr,
        _old_state: nsm::State,
        _new_state: nsm::State,
    ) {
    }

    // `area_id` is `None` for AS-scope LSAs.
    fn lsa_install(&mut self, _area_id: Option<Ipv4Addr>, _lsa: &Lsa) {}

    fn lsa_flush(
        &mut self,
        _area_id: Option<Ipv4Addr>,
        _lsa_hdr: &LsaHdr,
        _reason: LsaFlushReason,
    ) {
    }

    fn packet_drop(&mut self, _ifname: &str, _src: Ipv4Addr, _reason: &Error) {
    }

    fn if_config_error(
        &mut self,
        _ifname: &str,
        _src: Ipv4Addr,
        _pkt_type: PacketType,
        _error: &InterfaceCfgError,
    ) {
    }
}

// Protocol event waiting to be delivered to the observers.
#[derive(Clone, Debug)]
pub enum Notification {
    IfStateChange {
        ifname: String,
        old_state: ism::State,
        new_state: ism::State,
    },
    IfDrChange {
        ifname: String,
        dr: Option<Ipv4Addr>,
        bdr: Option<Ipv4Addr>,
    },
    NbrStateChange {
        ifname: String,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
        old_state: nsm::State,
        new_state: nsm::State,
    },
    LsaInstall {
        area_id: Option<Ipv4Addr>,
        lsa: Lsa,
    },
    LsaFlush {
        area_id: Option<Ipv4Addr>,
        lsa_hdr: LsaHdr,
        reason: LsaFlushReason,
    },
    PacketDrop {
        ifname: String,
        src: Ipv4Addr,
        reason: Error,
    },
    IfConfigError {
        ifname: String,
        src: Ipv4Addr,
        pkt_type: PacketType,
        error: InterfaceCfgError,
    },
}

// ===== impl Notification =====

impl Notification {
    // Delivers the notification to the given observer.
    pub(crate) fn deliver(&self, observer: &mut dyn Observer) {
        match self {
            Notification::IfStateChange {
                ifname,
                old_state,
                new_state,
            } => observer.if_state_change(ifname, *old_state, *new_state),
            Notification::IfDrChange { ifname, dr, bdr } => {
                observer.if_dr_change(ifname, *dr, *bdr)
            }
            Notification::NbrStateChange {
                ifname,
                router_id,
                src,
                old_state,
                new_state,
            } => observer.nbr_state_change(
                ifname, *router_id, *src, *old_state, *new_state,
            ),
            Notification::LsaInstall { area_id, lsa } => {
                observer.lsa_install(*area_id, lsa)
            }
            Notification::LsaFlush {
                area_id,
                lsa_hdr,
                reason,
            } => observer.lsa_flush(*area_id, lsa_hdr, *reason),
            Notification::PacketDrop { ifname, src, reason } => {
                observer.packet_drop(ifname, *src, reason)
            }
            Notification::IfConfigError {
                ifname,
                src,
                pkt_type,
                error,
            } => observer.if_config_error(ifname, *src, *pkt_type, error),
        }
    }
}

// ===== global functions =====

pub(crate) fn if_state_change(
    instance: &InstanceUpView<'_>,
    iface: &Interface,
    old_state: ism::State,
) {
    instance.tx.protocol_output.notify(Notification::IfStateChange {
        ifname: iface.name.clone(),
        old_state,
        new_state: iface.state.ism_state,
    });
}

pub(crate) fn if_dr_change(
    instance: &InstanceUpView<'_>,
    iface: &Interface,
    dr: Option<Ipv4Addr>,
    bdr: Option<Ipv4Addr>,
) {
    instance.tx.protocol_output.notify(Notification::IfDrChange {
        ifname: iface.name.clone(),
        dr,
        bdr,
    });
}

pub(crate) fn nbr_state_change(
    instance: &InstanceUpView<'_>,
    iface: &Interface,
    nbr: &Neighbor,
    old_state: nsm::State,
) {
    instance.tx.protocol_output.notify(Notification::NbrStateChange {
        ifname: iface.name.clone(),
        router_id: nbr.router_id,
        src: nbr.src,
        old_state,
        new_state: nbr.state,
    });
}

pub(crate) fn lsa_install(
    instance: &InstanceUpView<'_>,
    area_id: Option<Ipv4Addr>,
    lsa: &Lsa,
) {
    instance.tx.protocol_output.notify(Notification::LsaInstall {
        area_id,
        lsa: lsa.clone(),
    });
}

pub(crate) fn lsa_flush(
    instance: &InstanceUpView<'_>,
    area_id: Option<Ipv4Addr>,
    lsa_hdr: &LsaHdr,
    reason: LsaFlushReason,
) {
    instance.tx.protocol_output.notify(Notification::LsaFlush {
        area_id,
        lsa_hdr: *lsa_hdr,
        reason,
    });
}

pub(crate) fn packet_drop(
    instance: &InstanceUpView<'_>,
    ifname: &str,
    src: Ipv4Addr,
    reason: &Error,
) {
    instance.tx.protocol_output.notify(Notification::PacketDrop {
        ifname: ifname.to_owned(),
        src,
        reason: reason.clone(),
    });
}

pub(crate) fn if_config_error(
    instance: &InstanceUpView<'_>,
    ifname: &str,
    src: Ipv4Addr,
    pkt_type: PacketType,
    error: &InterfaceCfgError,
) {
    instance.tx.protocol_output.notify(Notification::IfConfigError {
        ifname: ifname.to_owned(),
        src,
        pkt_type,
        error: error.clone(),
    });
}
