//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::sync::Arc;

use crate::area::{Area, AreaType};
use crate::collections::{
    Areas, Arena, InterfaceIndex, LsdbIndex, NeighborIndex,
};
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::Lsa;

// Result of matching a newly received LSA against the Link state request
// list of an adjacency that isn't Full yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LsRequestCheck {
    NotRequested,
    // A more recent instance was requested.
    Pending,
    // The request was removed. The received LSA is the requested instance.
    Satisfied,
    // The request was removed. The received LSA is more recent.
    Superseded,
}

// ===== global functions =====

// Floods the LSA out of every interface in its flooding scope (RFC 2328,
// Section 13.3). `src` identifies where the LSA came from, unless it's
// self-originated.
//
// Returns whether the LSA was flooded back out of the receiving interface.
pub(crate) fn flood(
    instance: &InstanceUpView<'_>,
    areas: &Areas,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsdb_idx: LsdbIndex,
    lsa: &Arc<Lsa>,
    src: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool {
    let scope: Vec<&Area> = match lsdb_idx {
        LsdbIndex::Area(area_idx) => vec![&areas[area_idx]],
        // AS-external-LSAs don't enter stub areas.
        LsdbIndex::As => areas
            .iter()
            .filter(|area| area.config.area_type == AreaType::Normal)
            .collect(),
    };

    let mut flooded_back = false;
    for area in scope {
        for iface_idx in area.interfaces.indexes() {
            flooded_back |= flood_interface(
                iface_idx, area, instance, interfaces, neighbors, lsa, src,
            );
        }
    }
    flooded_back
}

// ===== helper functions =====

fn flood_interface(
    iface_idx: InterfaceIndex,
    area: &Area,
    instance: &InstanceUpView<'_>,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool {
    let iface = &mut interfaces[iface_idx];
    if iface.is_passive() {
        return false;
    }

    let lsa_key = lsa.hdr.key();
    let src_nbr_idx = src.map(|(_, nbr_idx)| nbr_idx);

    // (1) Examine each neighbor attached to the interface.
    let mut rxmt_added = false;
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut neighbors[nbr_idx];

        // (1a) No database exchange yet.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // (1b) Exchange or Loading.
        if nbr.state != nsm::State::Full {
            match ls_request_check(nbr, lsa) {
                LsRequestCheck::NotRequested => (),
                LsRequestCheck::Pending => continue,
                check => {
                    nbr.loading_done_check(iface, area, instance);
                    if check == LsRequestCheck::Satisfied {
                        continue;
                    }
                }
            }
        }

        // (1c) Never send the LSA back to the neighbor it came from.
        if src_nbr_idx == Some(nbr_idx) {
            continue;
        }

        // (1d) The new instance replaces any older one in the rxmt list.
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
        rxmt_added = true;
    }

    // (2) None of the neighbors needs the LSA.
    if !rxmt_added {
        return false;
    }

    let received_here =
        src.filter(|(src_iface_idx, _)| *src_iface_idx == iface_idx);
    if let Some((_, src_nbr_idx)) = received_here {
        let src_net_id = neighbors[src_nbr_idx].network_id();

        // (3) Sent by the DR or BDR, so the other neighbors have it already.
        if iface.state.dr == Some(src_net_id)
            || iface.state.bdr == Some(src_net_id)
        {
            return false;
        }

        // (4) The BDR leaves flooding back to the DR.
        if iface.state.ism_state == ism::State::Backup {
            return false;
        }
    }

    // (5) Send it out. Transmission is paced so that several LSAs can share
    // the same LS Update.
    iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());

    received_here.is_some()
}

fn ls_request_check(nbr: &mut Neighbor, lsa: &Lsa) -> LsRequestCheck {
    let lsa_key = lsa.hdr.key();
    let lists = &mut nbr.lists;
    let Some(req) = lists
        .ls_request
        .get(&lsa_key)
        .or_else(|| lists.ls_request_pending.get(&lsa_key))
    else {
        return LsRequestCheck::NotRequested;
    };

    match lsdb::lsa_compare(&lsa.hdr, req) {
        Ordering::Less => LsRequestCheck::Pending,
        cmp => {
            lists.ls_request.remove(&lsa_key);
            lists.ls_request_pending.remove(&lsa_key);
            if cmp == Ordering::Equal {
                LsRequestCheck::Satisfied
            } else {
                LsRequestCheck::Superseded
            }
        }
    }
}
