//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::net::Ipv4Addr;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, InterfaceId, InterfaceIndex, LsaEntryId,
    LsdbId, LsdbIndex, NeighborId, NeighborIndex, lsdb_get, lsdb_get_mut,
    lsdb_index, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{self, LsaEntry, LsaEntryFlags, LsaOriginateEvent};
use crate::neighbor::{
    LastDbDesc, Neighbor, NeighborNetId, RxmtPacketType, nsm,
};
use crate::packet::lsa::{Lsa, LsaBody, LsaHdr, LsaKey, LsaScope};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketType,
};
use crate::{output, tasks};

// ===== Interface FSM event =====

pub(crate) fn process_ism_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    event: ism::Event,
) -> Result<(), Error> {
    let (_, area, _, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;

    // Neighbors killed while the interface was going down leave behind
    // NbrChange events that no longer apply.
    if event == ism::Event::NbrChange && iface.is_down() {
        return Ok(());
    }

    iface.fsm(
        area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    event: nsm::Event,
) -> Result<(), Error> {
    let (_, area, _, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    nbr.fsm(iface, area, instance, &arenas.lsa_entries, event);

    // Neighbors reaching the Down state are removed right away. The Hello
    // Tx task is resynced since NBMA interfaces poll known neighbors.
    if nbr.state == nsm::State::Down {
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);
        iface.sync_hello_tx(area, instance);
    }

    Ok(())
}

// ===== Hello transmission =====

pub(crate) fn process_send_hello(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    dst: Option<Ipv4Addr>,
) -> Result<(), Error> {
    let (area, iface) = iface_lookup(arenas, area_id, iface_id)?;
    output::send_hello(iface, area, instance, &arenas.neighbors, dst);
    Ok(())
}

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    packet: Packet,
) -> Result<(), Error> {
    let (area_idx, area, iface_idx, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;

    // Nothing is accepted on interfaces that aren't running the protocol.
    // Our own multicast transmissions looping back are dropped as well.
    if iface.is_down()
        || iface.is_passive()
        || iface.state.src_addr == Some(src)
    {
        return Ok(());
    }
    iface.validate_packet_dst(dst)?;
    iface.validate_packet_src(src)?;

    let hdr = packet.hdr();
    let router_id = hdr.router_id;
    let pkt_type = hdr.pkt_type;
    if hdr.area_id != area.area_id {
        let error =
            InterfaceCfgError::AreaIdMismatch(hdr.area_id, area.area_id);
        return Err(cfg_error(iface, src, pkt_type, error));
    }
    iface
        .validate_packet_auth(hdr)
        .map_err(|error| cfg_error(iface, src, pkt_type, error))?;
    if let Some(seqno) = hdr.auth_seqno()
        && let Some((_, nbr)) =
            iface.get_neighbor(src, router_id, &mut arenas.neighbors)
    {
        auth_seqno_update(nbr, pkt_type, src, seqno)?;
    }

    Debug::PacketRx(&iface.name, &src, &dst, &packet).log();

    // Hellos are the only packets that may come from unknown neighbors.
    if let Packet::Hello(hello) = packet {
        return process_packet_hello(
            iface,
            area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
            src,
            hello,
        );
    }
    let (nbr_idx, nbr) = iface
        .get_neighbor(src, router_id, &mut arenas.neighbors)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;

    match packet {
        // Handled above.
        Packet::Hello(_) => Ok(()),
        Packet::DbDesc(dbdesc) => process_packet_dbdesc(
            nbr,
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            src,
            dbdesc,
        ),
        Packet::LsRequest(ls_req) => process_packet_lsreq(
            nbr,
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            ls_req,
        ),
        Packet::LsUpdate(ls_upd) => process_packet_lsupd(
            nbr_idx, iface_idx, area_idx, instance, arenas, ls_upd,
        ),
        Packet::LsAck(ls_ack) => process_packet_lsack(nbr, ls_ack),
    }
}

fn process_packet_hello(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
    src: Ipv4Addr,
    hello: Hello,
) -> Result<(), Error> {
    let router_id = hello.hdr.router_id;
    hello_params_check(iface, area, instance, &hello)
        .map_err(|error| cfg_error(iface, src, PacketType::Hello, error))?;

    let dr = hello.dr.map(NeighborNetId::from);
    let bdr = hello.bdr.map(NeighborNetId::from);
    let dr_election = iface.is_broadcast_or_nbma();

    let (_, nbr) = match iface.get_neighbor(src, router_id, neighbors) {
        Some(value) => value,
        None => {
            let (nbr_idx, nbr) =
                iface.state.neighbors.insert(neighbors, router_id, src);
            nbr.priority = hello.priority;
            if dr_election {
                nbr.dr = dr;
                nbr.bdr = bdr;
            }
            iface.sync_hello_tx(area, instance);
            (nbr_idx, nbr)
        }
    };

    // Only point-to-point neighbors are keyed by Router ID, so this is the
    // one case where the source address can change.
    nbr.src = src;

    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::HelloRcvd);
    if !hello.neighbors.contains(&instance.state.router_id) {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::OneWayRcvd);
        if dr_election {
            nbr.priority = hello.priority;
            nbr.dr = dr;
            nbr.bdr = bdr;
        }
        return Ok(());
    }
    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);

    // Point-to-multipoint interfaces skip the DR/BDR examination (RFC 2328
    // errata 4022).
    if dr_election {
        hello_examine_dr_bdr(nbr, iface, area, instance, &hello, dr, bdr);
    }

    Ok(())
}

fn hello_params_check(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    hello: &Hello,
) -> Result<(), InterfaceCfgError> {
    iface.validate_hello(hello)?;

    let hello_interval = iface.config.hello_interval;
    if hello.hello_interval != hello_interval {
        return Err(InterfaceCfgError::HelloIntervalMismatch(
            hello.hello_interval,
            hello_interval,
        ));
    }

    let dead_interval = u32::from(iface.config.dead_interval);
    if hello.dead_interval != dead_interval {
        return Err(InterfaceCfgError::DeadIntervalMismatch(
            hello.dead_interval,
            dead_interval,
        ));
    }

    // Stub areas carry no AS-external routes, so the E-bit must be clear.
    let e_bit = hello.options.contains(Options::E);
    if e_bit != (area.config.area_type == AreaType::Normal) {
        return Err(InterfaceCfgError::ExternalRoutingCapabilityMismatch(
            e_bit,
        ));
    }

    if hello.hdr.router_id == instance.state.router_id {
        return Err(InterfaceCfgError::DuplicateRouterId(hello.hdr.router_id));
    }

    Ok(())
}

// Looks at the priority and DR/BDR fields of a bidirectional neighbor's
// Hello and schedules the resulting interface events.
fn hello_examine_dr_bdr(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    hello: &Hello,
    dr: Option<NeighborNetId>,
    bdr: Option<NeighborNetId>,
) {
    let protocol_input = &instance.tx.protocol_input;
    let net_id = Some(nbr.network_id());

    if hello.priority != nbr.priority {
        nbr.priority = hello.priority;
        protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
    }

    // A neighbor declaring itself DR with no BDR, or declaring itself BDR,
    // ends the Waiting period early.
    let claims_dr = dr == net_id;
    let claims_bdr = bdr == net_id;
    if iface.state.ism_state == ism::State::Waiting
        && ((claims_dr && bdr.is_none()) || claims_bdr)
    {
        protocol_input.ism_event(area.id, iface.id, ism::Event::BackupSeen);
    }

    // Any change in the neighbor's claim to be DR or BDR calls for a new
    // election.
    if claims_dr != (nbr.dr == net_id) || claims_bdr != (nbr.bdr == net_id) {
        protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
    }

    nbr.dr = dr;
    nbr.bdr = bdr;
}

fn process_packet_dbdesc(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
    src: Ipv4Addr,
    dbdesc: DbDesc,
) -> Result<(), Error> {
    if !iface.config.mtu_ignore && dbdesc.mtu > iface.system.mtu {
        let error = InterfaceCfgError::MtuMismatch(dbdesc.mtu);
        return Err(cfg_error(iface, src, PacketType::DbDesc, error));
    }

    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            // An Init neighbor is first promoted as if a bidirectional Hello
            // had been seen.
            if nbr.state == nsm::State::Init {
                let event = nsm::Event::TwoWayRcvd;
                nbr.fsm(iface, area, instance, lsa_entries, event);
            }
            if nbr.state != nsm::State::ExStart
                || !dbdesc_negotiate(nbr, instance, &dbdesc)
            {
                return Ok(());
            }
            let event = nsm::Event::NegotiationDone;
            nbr.fsm(iface, area, instance, lsa_entries, event);
        }
        _ if nbr.dbdesc_is_dup(&dbdesc) => {
            // Only the slave answers duplicates, by repeating its last
            // packet. The master retransmits on its own timer.
            if !nbr.dd_flags.contains(DbDescFlags::MS) {
                output::rxmt_dbdesc(nbr, instance);
            }
            return Ok(());
        }
        state => {
            let mismatch = if state == nsm::State::Exchange {
                dbdesc_exchange_check(nbr, &dbdesc)
            } else {
                Some(SeqNoMismatchReason::UnexpectedDbDesc)
            };
            if let Some(reason) = mismatch {
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
        }
    }

    // The packet is accepted from here on.
    nbr.rxmt_dbdesc_stop();

    let area_type = Some(area.config.area_type);
    if dbdesc
        .lsa_hdrs
        .iter()
        .any(|lsa_hdr| !lsdb::lsa_type_is_valid(area_type, lsa_hdr.lsa_type))
    {
        let reason = SeqNoMismatchReason::InvalidLsaType;
        let event = nsm::Event::SeqNoMismatch(reason);
        nbr.fsm(iface, area, instance, lsa_entries, event);
        return Ok(());
    }
    for lsa_hdr in &dbdesc.lsa_hdrs {
        let lsa_key = lsa_hdr.key();

        // Our own summary entries that are no newer than the neighbor's copy
        // need not be described to it (RFC 5243).
        if nbr.lists.db_summary.get(&lsa_key).is_some_and(|lsa| {
            lsdb::lsa_compare(&lsa.hdr, lsa_hdr) != Ordering::Greater
        }) {
            nbr.lists.db_summary.remove(&lsa_key);
        }

        // Request the LSA unless the local copy is at least as recent.
        let up_to_date = lsdb_lookup(instance, area, lsa_entries, &lsa_key)
            .is_some_and(|lse| {
                lsdb::lsa_compare(&lse.data.hdr, lsa_hdr) != Ordering::Less
            });
        if !up_to_date {
            nbr.lists.ls_request.insert(lsa_key, *lsa_hdr);
        }
    }
    if !nbr.lists.ls_request.is_empty()
        && nbr.lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // The master advances the sequence number and keeps polling while
    // either side has more to describe. The slave echoes the master's
    // sequence number in every response.
    let master = nbr.dd_flags.contains(DbDescFlags::MS);
    if master {
        nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no;
        output::send_dbdesc(nbr, iface, area, instance);
    }
    let exchange_done = !nbr.dd_flags.contains(DbDescFlags::M)
        && !dbdesc.dd_flags.contains(DbDescFlags::M);
    if master && !exchange_done {
        output::send_dbdesc(nbr, iface, area, instance);
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::ExchangeDone);

        // The slave holds on to its last packet for RouterDeadInterval in
        // case the master retransmits its final poll.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            let task = tasks::dbdesc_free_timer(nbr, iface, area, instance);
            nbr.tasks.dbdesc_free_timer = Some(task);
        }
    }

    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options,
        dd_flags: dbdesc.dd_flags,
        dd_seq_no: dbdesc.dd_seq_no,
    });

    Ok(())
}

// Settles the master/slave relationship from a packet received in the
// ExStart state. Returns whether negotiation is done.
fn dbdesc_negotiate(
    nbr: &mut Neighbor,
    instance: &InstanceUpView<'_>,
    dbdesc: &DbDesc,
) -> bool {
    let router_id = dbdesc.hdr.router_id;
    let init_flags = DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS;

    if dbdesc.dd_flags.contains(init_flags)
        && dbdesc.lsa_hdrs.is_empty()
        && router_id > instance.state.router_id
    {
        // The neighbor is master. Adopt its sequence number.
        nbr.dd_flags.remove(DbDescFlags::MS);
        nbr.dd_seq_no = dbdesc.dd_seq_no;
    } else if !dbdesc.dd_flags.intersects(DbDescFlags::I | DbDescFlags::MS)
        && dbdesc.dd_seq_no == nbr.dd_seq_no
        && router_id < instance.state.router_id
    {
        // The neighbor acknowledged us as master.
    } else {
        return false;
    }

    nbr.options = Some(dbdesc.options);
    true
}

// Checks a non-duplicate packet received in the Exchange state.
fn dbdesc_exchange_check(
    nbr: &Neighbor,
    dbdesc: &DbDesc,
) -> Option<SeqNoMismatchReason> {
    let master = nbr.dd_flags.contains(DbDescFlags::MS);
    if dbdesc.dd_flags.contains(DbDescFlags::I) {
        return Some(SeqNoMismatchReason::InconsistentFlags);
    }

    match &nbr.last_rcvd_dbdesc {
        Some(last) => {
            if dbdesc.dd_flags.contains(DbDescFlags::MS)
                != last.dd_flags.contains(DbDescFlags::MS)
            {
                return Some(SeqNoMismatchReason::InconsistentFlags);
            }
            if dbdesc.options != last.options {
                return Some(SeqNoMismatchReason::InconsistentOptions);
            }
        }
        // The master has nothing stored yet when the slave's first packet
        // answers the negotiation.
        None if master => (),
        None => return Some(SeqNoMismatchReason::UnexpectedDbDesc),
    }

    // The master waits for its own sequence number to be echoed. The slave
    // waits for the next one.
    let expected = if master {
        nbr.dd_seq_no
    } else {
        nbr.dd_seq_no.wrapping_add(1)
    };
    (dbdesc.dd_seq_no != expected)
        .then_some(SeqNoMismatchReason::InconsistentSeqNo)
}

fn process_packet_lsreq(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
    ls_req: LsRequest,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    for lsa_key in &ls_req.entries {
        // Requests for LSA types we don't know are skipped.
        if !lsdb::lsa_type_is_valid(None, lsa_key.lsa_type) {
            continue;
        }

        // A request for an LSA we don't have means the Database Exchange
        // went wrong.
        let Some(lse) = lsdb_lookup(instance, area, lsa_entries, lsa_key)
        else {
            nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
            return Ok(());
        };
        nbr.lists.ls_update.insert(*lsa_key, lse.data.clone());
    }

    if !nbr.lists.ls_update.is_empty() {
        instance
            .tx
            .protocol_input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ls_upd: LsUpdate,
) -> Result<(), Error> {
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    for lsa in ls_upd.lsas {
        let flow = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, area_idx, instance, arenas, lsa,
        );
        if flow.is_break() {
            break;
        }
    }

    Ok(())
}

// Runs the receive procedure of RFC 2328 section 13 for one LSA. Breaks when
// the rest of the LS Update must be dropped.
fn process_packet_lsupd_lsa(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    #[allow(unused_mut)] mut lsa: Lsa,
) -> ControlFlow<()> {
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];

    // Test harnesses may inject LSAs without their encoded form.
    #[cfg(feature = "testing")]
    if lsa.raw.is_empty() {
        lsa.encode();
    }

    // Steps 1-3. The whole LSA is validated, not only its checksum.
    if let Err(error) = lsa.validate() {
        Debug::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();
        return ControlFlow::Continue(());
    }
    if !lsdb::lsa_type_is_valid(Some(area.config.area_type), lsa.hdr.lsa_type)
    {
        Error::LsaUnknownType(lsa.hdr.lsa_type).log();
        return ControlFlow::Continue(());
    }

    let lsa_key = lsa.hdr.key();
    let lsdb_idx = match lsa.hdr.lsa_type.scope() {
        LsaScope::As => LsdbIndex::As,
        LsaScope::Area | LsaScope::Unknown => LsdbIndex::Area(area_idx),
    };
    let lse = lsdb_lookup(instance, area, &arenas.lsa_entries, &lsa_key);

    // Step 4. A MaxAge LSA we've never heard of is acknowledged and dropped,
    // unless a database exchange in progress might still need it.
    if lsa.hdr.is_maxage()
        && lse.is_none()
        && !any_nbr_exchanging(&arenas.neighbors)
    {
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        return ControlFlow::Continue(());
    }

    // Step 5 onwards depends on how the received instance compares to the
    // database copy.
    match lse.map(|lse| lsdb::lsa_compare(&lse.data.hdr, &lsa.hdr)) {
        None | Some(Ordering::Less) => {
            let now = instance.tx.protocol_input.now();
            if let Some(lse) = lse
                && lsdb::lsa_min_arrival_check(lse, now)
            {
                Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
                return ControlFlow::Continue(());
            }
            lsupd_install(
                nbr_idx, iface_idx, area_idx, lsdb_idx, instance, arenas, lsa,
            );
            ControlFlow::Continue(())
        }
        Some(Ordering::Equal) => {
            let nbr = &mut arenas.neighbors[nbr_idx];
            lsupd_same_instance(nbr, iface, area, instance, &lsa.hdr);
            ControlFlow::Continue(())
        }
        Some(Ordering::Greater) => {
            let nbr = &mut arenas.neighbors[nbr_idx];
            let lsa_entries = &arenas.lsa_entries;
            let Some(lse) = lse else {
                return ControlFlow::Continue(());
            };
            lsupd_older_instance(
                nbr,
                iface,
                area,
                instance,
                lsa_entries,
                lse,
                &lsa.hdr,
            )
        }
    }
}

// Step 5 for a received LSA that is newer than the database copy, or that
// has no database copy at all.
fn lsupd_install(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    lsdb_idx: LsdbIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    mut lsa: Lsa,
) {
    // Anchor the age before the LSA is shared with the flooding lists, so
    // that every copy ages and the LSDB entry stays pointer-equal to them.
    if lsa.base_time.is_none() {
        lsa.base_time = Some(instance.tx.protocol_input.now());
    }
    let lsa = Arc::new(lsa);
    let flooded_back = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lsa,
        Some((iface_idx, nbr_idx)),
    );

    // Installation also takes the old copy off every retransmission list.
    let lse_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
    instance.state.rx_lsa_count += 1;
    let lse = &mut arenas.lsa_entries[lse_idx];
    lse.flags.insert(LsaEntryFlags::RECEIVED);

    // No ack is needed when the LSA went back out the receiving interface.
    // A Backup only acks what comes from the DR.
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];
    if !flooded_back
        && (iface.state.ism_state != ism::State::Backup
            || iface.state.dr == Some(nbr.network_id()))
    {
        iface.enqueue_delayed_ack(area, instance, &lse.data.hdr);
    }

    // A newer copy of one of our own LSAs must be superseded or flushed.
    if lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED) {
        Debug::LsaSelfOriginated(nbr.router_id, &lse.data.hdr).log();
        let (lsdb_id, _) =
            lsdb_index(&instance.state.lsdb, &arenas.areas, lsdb_idx);
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::SelfOriginatedLsaRcvd {
                lsdb_id,
                lse_id: lse.id,
            },
        );
    }
}

// Step 6 (errata 3974). The received LSA is the same instance as the
// database copy.
fn lsupd_same_instance(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
) {
    // An instance we were retransmitting to this neighbor counts as an
    // implied acknowledgment.
    if nbr.lists.ls_rxmt.remove(&lsa_hdr.key()).is_none() {
        output::send_lsack_direct(nbr, iface, area, instance, lsa_hdr);
        return;
    }
    nbr.rxmt_lsupd_stop_check();

    if iface.state.ism_state == ism::State::Backup
        && iface.state.dr == Some(nbr.network_id())
    {
        iface.enqueue_delayed_ack(area, instance, lsa_hdr);
    }
}

// Steps 7-8 (errata 3974). The database copy is more recent than the
// received LSA.
fn lsupd_older_instance(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
    lse: &LsaEntry,
    lsa_hdr: &LsaHdr,
) -> ControlFlow<()> {
    let lsa_key = lsa_hdr.key();

    // Still having the LSA on the request list means the neighbor described
    // an instance it doesn't have.
    if nbr.lists.ls_request.contains_key(&lsa_key)
        || nbr.lists.ls_request_pending.contains_key(&lsa_key)
    {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
        return ControlFlow::Break(());
    }

    // A copy that is both MaxAge and at MaxSequenceNumber is on its way out
    // of the domain. Drop the received LSA without acknowledging it.
    let db_hdr = &lse.data.hdr;
    if db_hdr.is_maxage() && db_hdr.seq_no == lsdb::LSA_MAX_SEQ_NO {
        return ControlFlow::Continue(());
    }

    // Otherwise send our copy back, rate-limited by MinLSArrival.
    let now = instance.tx.protocol_input.now();
    if lsdb::lsa_min_arrival_check(lse, now) {
        Debug::LsaMinArrivalDiscard(nbr.router_id, lsa_hdr).log();
        return ControlFlow::Continue(());
    }
    nbr.lists.ls_update.insert(lsa_key, lse.data.clone());
    instance
        .tx
        .protocol_input
        .send_lsupd(area.id, iface.id, Some(nbr.id));

    ControlFlow::Continue(())
}

fn process_packet_lsack(
    nbr: &mut Neighbor,
    ls_ack: LsAck,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    for lsa_hdr in &ls_ack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();
        let Some(rxmt_lsa) = nbr.lists.ls_rxmt.get(&lsa_key) else {
            continue;
        };

        // Acks for a different instance leave the retransmission list alone.
        if lsdb::lsa_compare(&rxmt_lsa.hdr, lsa_hdr) != Ordering::Equal {
            Debug::QuestionableAck(nbr.router_id, lsa_hdr).log();
            continue;
        }
        nbr.lists.ls_rxmt.remove(&lsa_key);
        nbr.rxmt_lsupd_stop_check();
    }

    Ok(())
}

// ===== Free last sent/received Database Description packets =====

pub(crate) fn process_dbdesc_free(
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    let (_, _, _, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== Request to send LS Update =====

pub(crate) fn process_send_lsupd(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: Option<NeighborId>,
) -> Result<(), Error> {
    let (_, area, _, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;

    // Without a neighbor this is the interface's own pacing timer firing.
    let nbr_idx = match nbr_id {
        Some(nbr_id) => Some(
            iface
                .state
                .neighbors
                .get_by_id(&arenas.neighbors, nbr_id)?
                .0,
        ),
        None => {
            iface.state.tasks.ls_update_timer = None;
            None
        }
    };
    output::send_lsupd(nbr_idx, iface, area, instance, &mut arenas.neighbors);

    Ok(())
}

// ===== Packet retransmission =====

pub(crate) fn process_packet_rxmt(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    packet_type: RxmtPacketType,
) -> Result<(), Error> {
    let (area, iface) = iface_lookup(arenas, area_id, iface_id)?;
    let (_, nbr) = iface.state.neighbors.get_by_id(&arenas.neighbors, nbr_id)?;

    match packet_type {
        RxmtPacketType::DbDesc => output::rxmt_dbdesc(nbr, instance),
        RxmtPacketType::LsRequest => {
            output::rxmt_lsreq(nbr, iface, area, instance)
        }
        RxmtPacketType::LsUpdate => {
            output::rxmt_lsupd(nbr, iface, area, instance)
        }
    }

    Ok(())
}

// ===== Delayed Ack timeout =====

pub(crate) fn process_delayed_ack_timeout(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(), Error> {
    let (_, area, _, iface) = iface_lookup_mut(
        &mut arenas.areas,
        &mut arenas.interfaces,
        area_id,
        iface_id,
    )?;

    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, area, instance, &arenas.neighbors);

    Ok(())
}

// ===== LSA origination event =====

pub(crate) fn process_lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    lsdb::lsa_orig_event(instance, arenas, event)
}

// ===== LSA origination check =====

pub(crate) fn process_lsa_orig_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    options: Options,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) -> Result<(), Error> {
    let (lsdb_idx, _) = lsdb_get(&instance.state.lsdb, &arenas.areas, lsdb_id)?;
    lsdb::originate_check(
        instance, arenas, lsdb_idx, options, lsa_id, lsa_body,
    );
    Ok(())
}

// ===== LSA delayed origination timer =====

pub(crate) fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    let (lsdb_idx, lsdb) =
        lsdb_get_mut(&mut instance.state.lsdb, &mut arenas.areas, lsdb_id)?;
    if let Some(delayed) = lsdb.delayed_orig.remove(&lsa_key) {
        lsdb::originate(instance, arenas, lsdb_idx, delayed.data);
    }
    Ok(())
}

// ===== LSA flush event =====

pub(crate) fn process_lsa_flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    reason: LsaFlushReason,
) -> Result<(), Error> {
    let (lsdb_idx, lsdb) =
        lsdb_get(&instance.state.lsdb, &arenas.areas, lsdb_id)?;
    let (lse_idx, _) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    lsdb::flush(instance, arenas, lsdb_idx, lse_idx, reason);
    Ok(())
}

// ===== LSA refresh event =====

pub(crate) fn process_lsa_refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let (lsdb_idx, lsdb) =
        lsdb_get(&instance.state.lsdb, &arenas.areas, lsdb_id)?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;

    // LSAs learned from other routers age out instead.
    if !lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED) {
        return Ok(());
    }

    let hdr = &lse.data.hdr;
    Debug::LsaRefresh(hdr).log();
    let seq_no = hdr.seq_no.wrapping_add(1);
    let lsa = lsa_reissue(hdr, seq_no, lse.data.body.clone());
    lsdb::originate(instance, arenas, lsdb_idx, lsa);

    Ok(())
}

// ===== LSDB MaxAge sweep interval =====

pub(crate) fn process_lsdb_maxage_sweep_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_id: LsdbId,
) -> Result<(), Error> {
    let (lsdb_idx, lsdb) =
        lsdb_get(&instance.state.lsdb, &arenas.areas, lsdb_id)?;

    // MaxAge LSAs stay around while a database exchange is in progress.
    if any_nbr_exchanging(&arenas.neighbors) {
        return Ok(());
    }

    // Only LSAs that every neighbor has acknowledged can be removed.
    // Installing an instance takes older copies off the retransmission
    // lists, so any listed copy under the same key is this one.
    let acked: Vec<_> = lsdb
        .maxage_lsas
        .iter()
        .copied()
        .filter(|lse_idx| {
            let key = arenas.lsa_entries[*lse_idx].data.hdr.key();
            !arenas
                .neighbors
                .iter()
                .any(|(_, nbr)| nbr.lists.ls_rxmt.contains_key(&key))
        })
        .collect();

    for lse_idx in acked {
        let (_, lsdb) = lsdb_index_mut(
            &mut instance.state.lsdb,
            &mut arenas.areas,
            lsdb_idx,
        );
        let Some(lse) = arenas.lsa_entries.get(lse_idx) else {
            continue;
        };

        // A flushed LSA that was waiting out a sequence number wrap comes
        // back with the initial sequence number. Anything else is deleted.
        match lsdb.seqno_wrapping.remove(&lse.data.hdr.key()) {
            Some(lsa) => {
                let seq_no = lsdb::LSA_INIT_SEQ_NO;
                let lsa = lsa_reissue(&lsa.hdr, seq_no, lsa.body);
                lsdb::originate(instance, arenas, lsdb_idx, lsa);
            }
            None => lsdb.delete(&mut arenas.lsa_entries, lse_idx),
        }
    }

    Ok(())
}

// ===== helper functions =====

fn iface_lookup(
    arenas: &InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(&Area, &Interface), Error> {
    let (_, area) = arenas.areas.get_by_id(area_id)?;
    let (_, iface) = area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
    Ok((area, iface))
}

fn iface_lookup_mut<'a>(
    areas: &'a mut Areas,
    interfaces: &'a mut Arena<Interface>,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(AreaIndex, &'a mut Area, InterfaceIndex, &'a mut Interface), Error>
{
    let (area_idx, area) = areas.get_mut_by_id(area_id)?;
    let (iface_idx, iface) =
        area.interfaces.get_mut_by_id(interfaces, iface_id)?;
    Ok((area_idx, area, iface_idx, iface))
}

// Finds the database copy of an LSA in the LSDB matching its flooding scope.
fn lsdb_lookup<'a>(
    instance: &InstanceUpView<'_>,
    area: &Area,
    lsa_entries: &'a Arena<LsaEntry>,
    lsa_key: &LsaKey,
) -> Option<&'a LsaEntry> {
    let lsdb = match lsa_key.lsa_type.scope() {
        LsaScope::As => &instance.state.lsdb,
        LsaScope::Area => &area.state.lsdb,
        LsaScope::Unknown => return None,
    };
    lsdb.get(lsa_entries, lsa_key).map(|(_, lse)| lse)
}

fn any_nbr_exchanging(neighbors: &Arena<Neighbor>) -> bool {
    neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    })
}

fn cfg_error(
    iface: &Interface,
    src: Ipv4Addr,
    pkt_type: PacketType,
    error: InterfaceCfgError,
) -> Error {
    Error::InterfaceCfgError(iface.name.clone(), src, pkt_type, error)
}

// Cryptographic sequence numbers must not decrease. They're tracked per
// packet type since RFC 4222 lets routers prioritize some packet types over
// others.
fn auth_seqno_update(
    nbr: &mut Neighbor,
    pkt_type: PacketType,
    src: Ipv4Addr,
    seqno: u32,
) -> Result<(), Error> {
    let last = nbr.auth_seqno.entry(pkt_type).or_default();
    if seqno < *last {
        return Err(Error::PacketAuthInvalidSeqno(src, seqno));
    }
    *last = seqno;
    Ok(())
}

fn lsa_reissue(hdr: &LsaHdr, seq_no: u32, body: LsaBody) -> Lsa {
    Lsa::new(0, hdr.options, hdr.lsa_id, hdr.adv_rtr, seq_no, body)
}
