//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use ipnetwork::Ipv4Network;
use ospf_utils::ip::Ipv4NetworkExt;
use ospf_utils::timer::TimeoutTask;
use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaId, Arena, InterfaceId, LsaEntryId, LsaEntryIndex, LsdbId,
    LsdbIndex, lsdb_get, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::instance::{
    InstanceArenas, InstanceUpView, ProtocolInputChannelsTx,
    RedistributedRoute,
};
use crate::interface::{Interface, InterfaceType, ism};
use crate::neighbor::nsm;
use crate::packet::Options;
use crate::packet::lsa::{
    Lsa, LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaHdr, LsaKey,
    LsaNetwork, LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType,
    LsaType, LsaTypeCode,
};
use crate::{observer, tasks};

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSA data.
    pub data: Arc<Lsa>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub expiry_timer: Option<TimeoutTask>,
    // Refresh timer that triggers every LSA_REFRESH_TIME seconds.
    pub refresh_timer: Option<TimeoutTask>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum LsaOriginateEvent {
    AreaStart {
        area_id: AreaId,
    },
    InterfaceStateChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceDrChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborToFromFull {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    SelfOriginatedLsaRcvd {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
    RedistributeChange {
        prefix: Ipv4Network,
    },
}

#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(
        lsdb_id: LsdbId,
        id: LsaEntryId,
        data: Arc<Lsa>,
        protocol_input: &ProtocolInputChannelsTx,
    ) -> LsaEntry {
        let expiry_timer = (!data.hdr.is_maxage()).then(|| {
            tasks::lsa_expiry_timer(lsdb_id, id, &data, protocol_input)
        });

        LsaEntry {
            id,
            data,
            expiry_timer,
            refresh_timer: None,
            flags: Default::default(),
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in Section
// 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub fn lsa_compare(a: &LsaHdr, b: &LsaHdr) -> Ordering {
    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age.abs_diff(b.age) > LSA_MAX_AGE_DIFF {
        return b.age.cmp(&a.age);
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of RFC
// 2328. Its purpose is to determine if the contents of the LSAs are identical.
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = LsaHdr::LENGTH as usize;
    a.raw.get(hdr_length..) == b.raw.get(hdr_length..)
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry, now: Duration) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(base_time) => {
            now.saturating_sub(base_time)
                < Duration::from_secs(LSA_MIN_ARRIVAL)
        }
        None => false,
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry, now: Duration) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    match lse.data.base_time {
        Some(base_time) => {
            now.saturating_sub(base_time)
                < Duration::from_secs(LSA_MIN_INTERVAL)
        }
        None => false,
    }
}

// Checks if the provided area can accept the given LSA type.
pub(crate) fn lsa_type_is_valid(
    area_type: Option<AreaType>,
    lsa_type: LsaType,
) -> bool {
    // Reject LSAs of unknown type.
    if lsa_type.type_code().is_none() {
        return false;
    }

    // Reject AS-external and type-4 summary LSAs (as per errata 3746 of RFC
    // 2328) on stub areas.
    if let Some(area_type) = area_type
        && area_type != AreaType::Normal
        && matches!(
            lsa_type.type_code(),
            Some(LsaTypeCode::SummaryRouter | LsaTypeCode::AsExternal)
        )
    {
        return false;
    }

    true
}

// Checks whether the LSA is self-originated.
pub(crate) fn lsa_is_self_originated(
    lsa: &Lsa,
    router_id: Ipv4Addr,
    interfaces: &Arena<Interface>,
) -> bool {
    // 1) The LSA's Advertising Router is equal to the router's own Router
    // ID.
    if lsa.hdr.adv_rtr == router_id {
        return true;
    }

    // 2) The LSA is a network-LSA and its Link State ID is equal to one of
    // the router's own IP interface addresses.
    lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && interfaces
            .iter()
            .filter_map(|(_, iface)| iface.system.primary_addr)
            .any(|primary_addr| lsa.hdr.lsa_id == primary_addr.ip())
}

// Installs the provided LSA to the specified LSDB.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    mut lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    // Anchor the LSA age to the logical clock.
    if lsa.base_time.is_none() {
        let now = instance.tx.protocol_input.now();
        Arc::make_mut(&mut lsa).base_time = Some(now);
    }

    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    // Add LSA entry to LSDB, replacing the old instance.
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);
    let (lse_idx, lse) = lsdb.insert(
        &mut arenas.lsa_entries,
        lsdb_id,
        lsa.clone(),
        &instance.tx.protocol_input,
    );

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(
        &lse.data,
        instance.state.router_id,
        &arenas.interfaces,
    ) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // Keep track of self-originated Network-LSAs in the corresponding
    // interface structures. This is necessary to allow flushing those LSAs
    // later, since the interface address might change.
    if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
        && lsa.hdr.adv_rtr == instance.state.router_id
        && let LsdbIndex::Area(area_idx) = lsdb_idx
    {
        let area = &mut arenas.areas[area_idx];
        if let Some((_, iface)) = area
            .interfaces
            .get_mut_by_addr(&mut arenas.interfaces, lsa.hdr.lsa_id)
        {
            iface.state.network_lsa_self =
                (!lsa.hdr.is_maxage()).then(|| lsa.hdr.key());
        }
    }

    // Notify observers.
    let area_id = lsdb_area_id(arenas, lsdb_idx);
    observer::lsa_install(instance, area_id, &lsa);

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Lsa,
) {
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if lsa.hdr.seq_no == LSA_MAX_SEQ_NO.wrapping_add(1)
        && let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
    {
        // Record LSA that will be originated later and then flush the
        // existing instance.
        lsdb.seqno_wrapping.insert(lsa_key, lsa);
        let reason = LsaFlushReason::PrematureAging;
        flush(instance, arenas, lsdb_idx, old_lse_idx, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    let lse_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    let lse = &mut arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;

    // Schedule LSA refreshing.
    let refresh_timer =
        tasks::lsa_refresh_timer(lsdb_id, lse.id, &instance.tx.protocol_input);
    lse.refresh_timer = Some(refresh_timer);
}

// Attempts to originate the provided LSA, but only if it passes a few checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let now = instance.tx.protocol_input.now();
    let (lsdb_id, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);
    let old_lse = lsdb.get(&arenas.lsa_entries, &lsa_key);

    // Get next sequence number.
    let seq_no = old_lse
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no.wrapping_add(1))
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = old_lse {
        // If an LSA with identical contents already exists in the LSDB, skip
        // originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding, proceed
        // to originate a new instance with an updated sequence number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse, now)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    o.get_mut().data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let timeout = tasks::lsa_orig_delayed_timer(
                        lsdb_id,
                        lsa_key,
                        old_lse.data.base_time,
                        &instance.tx.protocol_input,
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_idx, lsa);
}

// Flushes LSA from the LSDB.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Disarm timers.
    lse.expiry_timer = None;
    lse.refresh_timer = None;

    // Set the LSA age to MaxAge.
    let now = instance.tx.protocol_input.now();
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage(now);
    let hdr = lsa.hdr;
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists.
    let lse_idx = install(instance, arenas, lsdb_idx, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Remove pending LSA origination, if any.
    let (_, lsdb) =
        lsdb_index_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_idx);
    lsdb.delayed_orig.remove(&hdr.key());

    // Notify observers.
    let area_id = lsdb_area_id(arenas, lsdb_idx);
    observer::lsa_flush(instance, area_id, &hdr, reason);
}

// Flushes all self-originated LSAs from the LSDB.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    // AS-scope LSAs.
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (LsdbIndex::As, lse_idx)),
    );

    // Area-scope LSAs.
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        let lsdb_idx = LsdbIndex::Area(area_idx);
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, lse)| {
                    lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
        );
    }

    // Flush LSAs.
    for (lsdb_idx, lse_idx) in idxs {
        flush(instance, arenas, lsdb_idx, lse_idx, reason);
    }
}

// Originates or flushes the required LSAs in response to an LSA origination
// event.
pub(crate) fn lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::AreaStart { area_id } => {
            // Originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // Originate AS-External-LSAs for the routes redistributed so far.
            if area.config.area_type == AreaType::Normal {
                for (prefix, route) in &instance.state.redistributed {
                    lsa_orig_external(instance, *prefix, route);
                }
            }
        }
        LsaOriginateEvent::InterfaceStateChange { .. } => {
            // (Re)originate Router-LSA in all areas since the ABR status
            // might have changed.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceDrChange { area_id, iface_id }
        | LsaOriginateEvent::NeighborToFromFull { area_id, iface_id } => {
            // (Re)originate Router-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            // Check if the received self-originated LSA needs to be
            // reoriginated or flushed.
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
        LsaOriginateEvent::RedistributeChange { prefix } => {
            // (Re)originate or flush the AS-External-LSA.
            match instance.state.redistributed.get(&prefix) {
                Some(route) => {
                    if arenas.areas.iter().any(|area| {
                        area.config.area_type == AreaType::Normal
                    }) {
                        lsa_orig_external(instance, prefix, route);
                    }
                }
                None => {
                    let lsa_key = LsaKey::new(
                        LsaTypeCode::AsExternal.into(),
                        instance.state.router_id,
                        prefix.ip(),
                    );
                    if let Some((_, lse)) =
                        instance.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
                    {
                        lsa_flush(instance, LsdbId::As, lse.id);
                    }
                }
            }

            // The Router-LSA E-bit depends on the redistributed routes.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }
        }
    };

    Ok(())
}

// ===== helper functions =====

fn lsa_orig_router(
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area.options();

    // Router-LSA's flags.
    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if !instance.state.redistributed.is_empty()
        && area.config.area_type == AreaType::Normal
    {
        flags.insert(LsaRouterFlags::E);
    }

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
    {
        let Some(primary_addr) = iface.system.primary_addr else {
            continue;
        };

        // Add a host route to interfaces in Loopback state.
        if iface.state.ism_state == ism::State::Loopback {
            links.push(LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                primary_addr.ip(),
                Ipv4Addr::BROADCAST,
                0,
            ));
            continue;
        }

        let mut add_stub_link = iface.is_passive();
        if !add_stub_link {
            match iface.config.if_type {
                InterfaceType::PointToPoint
                | InterfaceType::PointToMultipoint => {
                    // Add a Type-1 link (p2p) for each fully adjacent
                    // neighbor.
                    links.extend(
                        iface
                            .state
                            .neighbors
                            .iter(&arenas.neighbors)
                            .filter(|nbr| nbr.state == nsm::State::Full)
                            .map(|nbr| {
                                LsaRouterLink::new(
                                    LsaRouterLinkType::PointToPoint,
                                    nbr.router_id,
                                    primary_addr.ip(),
                                    iface.config.cost,
                                )
                            }),
                    );
                    add_stub_link = true;
                }
                InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                    let transit_dr = iface.state.dr.filter(|dr| {
                        (iface.state.ism_state == ism::State::Dr
                            && iface
                                .state
                                .neighbors
                                .iter(&arenas.neighbors)
                                .any(|nbr| nbr.state == nsm::State::Full))
                            || iface
                                .state
                                .neighbors
                                .get_by_net_id(&arenas.neighbors, *dr)
                                .is_some_and(|(_, nbr)| {
                                    nbr.state == nsm::State::Full
                                })
                    });
                    match transit_dr {
                        Some(dr)
                            if iface.state.ism_state
                                != ism::State::Waiting =>
                        {
                            // Add a Type-2 (transit) link.
                            links.push(LsaRouterLink::new(
                                LsaRouterLinkType::TransitNetwork,
                                dr.get(),
                                primary_addr.ip(),
                                iface.config.cost,
                            ));
                        }
                        _ => {
                            // Add a Type-3 (stub) link.
                            add_stub_link = true;
                        }
                    }
                }
            }
        }

        if add_stub_link {
            let addr = primary_addr.apply_mask();
            links.push(LsaRouterLink::new(
                LsaRouterLinkType::StubNetwork,
                addr.ip(),
                addr.mask(),
                iface.config.cost,
            ));
        }
    }

    // (Re)originate Router-LSA.
    let lsa_body = LsaBody::Router(LsaRouter::new(flags, links));
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        options,
        instance.state.router_id,
        lsa_body,
    );
}

fn lsa_orig_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let Some(primary_addr) = iface.system.primary_addr else {
        return;
    };
    let lsdb_id = LsdbId::Area(area.id);

    // LSA's header options.
    let options = area.options();

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    // (Re)originate Network-LSA. The Link State ID is the IP interface address
    // of the Designated Router.
    let lsa_body = LsaBody::Network(LsaNetwork {
        mask: primary_addr.mask(),
        attached_rtrs,
    });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        options,
        primary_addr.ip(),
        lsa_body,
    );
}

fn lsa_flush_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    if let Some(lsa_key) = &iface.state.network_lsa_self
        && let Some((_, lse)) =
            area.state.lsdb.get(&arenas.lsa_entries, lsa_key)
    {
        lsa_flush(instance, LsdbId::Area(area.id), lse.id);
    }
}

fn lsa_orig_external(
    instance: &InstanceUpView<'_>,
    prefix: Ipv4Network,
    route: &RedistributedRoute,
) {
    let mut flags = LsaAsExternalFlags::empty();
    if route.metric_type_e2 {
        flags.insert(LsaAsExternalFlags::E);
    }
    let lsa_body = LsaBody::AsExternal(LsaAsExternal::new(
        prefix.mask(),
        flags,
        route.metric,
        None,
        route.tag,
    ));
    instance.tx.protocol_input.lsa_orig_check(
        LsdbId::As,
        Options::E,
        prefix.ip(),
        lsa_body,
    );
}

fn process_self_originated_lsa(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let (lsdb_idx, lsdb) =
        lsdb_get(&instance.state.lsdb, &arenas.areas, lsdb_id)?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    let lsa = &lse.data;

    // Check LSA type.
    match (lsa.hdr.lsa_type.type_code(), lsdb_idx) {
        (Some(LsaTypeCode::Router), LsdbIndex::Area(area_idx)) => {
            // Reoriginate Router-LSA.
            let area = &arenas.areas[area_idx];
            lsa_orig_router(area, instance, arenas);
        }
        (Some(LsaTypeCode::Network), LsdbIndex::Area(area_idx)) => {
            let area = &arenas.areas[area_idx];

            // Check if the router is still the DR for the network.
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| {
                    iface
                        .system
                        .primary_addr
                        .is_some_and(|addr| addr.ip() == lsa.hdr.lsa_id)
                })
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
                // Ensure the Router-ID hasn't changed.
                .filter(|_| lsa.hdr.adv_rtr == instance.state.router_id)
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                flush = true;
            }
        }
        (Some(LsaTypeCode::AsExternal), LsdbIndex::As) => {
            // Reoriginate the AS-External-LSA if the prefix is still being
            // redistributed.
            match instance
                .state
                .redistributed
                .iter()
                .find(|(prefix, _)| {
                    prefix.ip() == lsa.hdr.lsa_id
                        && lsa.hdr.adv_rtr == instance.state.router_id
                }) {
                Some((prefix, route)) => {
                    lsa_orig_external(instance, *prefix, route);
                }
                None => flush = true,
            }
        }
        _ => {
            // Summary-LSAs are never originated by this router, and LSAs of
            // unknown type shouldn't reach this point.
            flush = true;
        }
    }

    if flush {
        lsa_flush(instance, lsdb_id, lse_id);
    }

    Ok(())
}

fn lsa_flush(
    instance: &InstanceUpView<'_>,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) {
    instance.tx.protocol_input.lsa_flush(
        lsdb_id,
        lse_id,
        LsaFlushReason::PrematureAging,
    );
}

// Returns the area ID of the given LSDB, or `None` for the AS-scope LSDB.
fn lsdb_area_id(
    arenas: &InstanceArenas,
    lsdb_idx: LsdbIndex,
) -> Option<Ipv4Addr> {
    lsdb_idx
        .as_area()
        .map(|area_idx| arenas.areas[*area_idx].area_id)
}

// Removes old instance of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    for area_idx in arenas.areas.indexes() {
        // Filter by LSA area.
        if let LsdbIndex::Area(lsdb_area_idx) = lsdb_idx
            && area_idx != lsdb_area_idx
        {
            continue;
        }

        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];

            // Iterate over all neighbors from this interface.
            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];

                // Remove LSA from rxmt list as long as it's an older version.
                if let btree_map::Entry::Occupied(o) =
                    nbr.lists.ls_rxmt.entry(lsa.hdr.key())
                    && lsa_compare(&o.get().hdr, &lsa.hdr) == Ordering::Less
                {
                    o.remove();
                    nbr.rxmt_lsupd_stop_check();
                }
            }
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr(seq_no: u32, cksum: u16, age: u16) -> LsaHdr {
        let mut hdr = LsaHdr::new(
            age,
            Options::E,
            LsaTypeCode::Router.into(),
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(1, 1, 1, 1),
            seq_no,
        );
        hdr.cksum = cksum;
        hdr
    }

    fn router_lsa(seq_no: u32, metric: u16) -> Lsa {
        let link = LsaRouterLink::new(
            LsaRouterLinkType::StubNetwork,
            Ipv4Addr::new(10, 0, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            metric,
        );
        Lsa::new(
            0,
            Options::E,
            Ipv4Addr::new(1, 1, 1, 1),
            Ipv4Addr::new(1, 1, 1, 1),
            seq_no,
            LsaBody::Router(LsaRouter::new(
                LsaRouterFlags::empty(),
                vec![link],
            )),
        )
    }

    #[test]
    fn compare_seqno_is_signed() {
        let a = hdr(LSA_INIT_SEQ_NO, 0, 0);
        let b = hdr(LSA_INIT_SEQ_NO + 1, 0, 0);
        let c = hdr(LSA_MAX_SEQ_NO, 0, 0);
        assert_eq!(lsa_compare(&b, &a), Ordering::Greater);
        assert_eq!(lsa_compare(&a, &c), Ordering::Less);
        assert_eq!(lsa_compare(&c, &b), Ordering::Greater);
    }

    #[test]
    fn compare_checksum_then_maxage_then_age() {
        assert_eq!(
            lsa_compare(&hdr(10, 0x200, 0), &hdr(10, 0x100, 0)),
            Ordering::Greater
        );
        assert_eq!(
            lsa_compare(&hdr(10, 0x100, LSA_MAX_AGE), &hdr(10, 0x100, 5)),
            Ordering::Greater
        );
        assert_eq!(
            lsa_compare(&hdr(10, 0x100, 10), &hdr(10, 0x100, 1000)),
            Ordering::Greater
        );
        assert_eq!(
            lsa_compare(&hdr(10, 0x100, 10), &hdr(10, 0x100, 900)),
            Ordering::Equal
        );
    }

    #[test]
    fn compare_is_antisymmetric() {
        let hdrs = [
            hdr(LSA_INIT_SEQ_NO, 0x10, 0),
            hdr(LSA_INIT_SEQ_NO, 0x10, 1200),
            hdr(LSA_INIT_SEQ_NO, 0x10, LSA_MAX_AGE),
            hdr(LSA_INIT_SEQ_NO, 0x20, 0),
            hdr(LSA_INIT_SEQ_NO + 7, 0x01, 3000),
            hdr(LSA_MAX_SEQ_NO, 0xffff, 0),
        ];
        for a in &hdrs {
            assert_eq!(lsa_compare(a, a), Ordering::Equal);
            for b in &hdrs {
                assert_eq!(lsa_compare(a, b), lsa_compare(b, a).reverse());
            }
        }
    }

    #[test]
    fn same_contents() {
        let a = router_lsa(LSA_INIT_SEQ_NO, 10);
        let b = router_lsa(LSA_INIT_SEQ_NO + 1, 10);
        let c = router_lsa(LSA_INIT_SEQ_NO + 1, 20);
        assert!(lsa_same_contents(&a, &b));
        assert!(!lsa_same_contents(&a, &c));

        let mut d = b.clone();
        d.set_maxage(Duration::ZERO);
        assert!(!lsa_same_contents(&b, &d));
    }

    #[test]
    fn type_validity() {
        let ext = LsaTypeCode::AsExternal.into();
        let asbr = LsaTypeCode::SummaryRouter.into();
        let net = LsaTypeCode::SummaryNetwork.into();
        assert!(lsa_type_is_valid(None, ext));
        assert!(lsa_type_is_valid(Some(AreaType::Normal), ext));
        assert!(!lsa_type_is_valid(Some(AreaType::Stub), ext));
        assert!(!lsa_type_is_valid(Some(AreaType::Stub), asbr));
        assert!(lsa_type_is_valid(Some(AreaType::Stub), net));
        assert!(!lsa_type_is_valid(None, LsaType(11)));
    }
}
