//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use smallvec::{SmallVec, smallvec};

use crate::area::Area;
use crate::collections::{Arena, NeighborIndex};
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::network::MulticastAddr;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{
    DbDesc, DbDescFlags, LsAck, LsRequest, LsUpdate, Packet, PacketHdr,
    PacketType,
};

// ===== Hello Packets =====

pub(crate) fn send_hello(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
    dst: Option<Ipv4Addr>,
) {
    if iface.is_passive() {
        return;
    }
    let Some(packet) = iface.generate_hello(area, instance, neighbors) else {
        return;
    };

    let dst = match dst {
        Some(dst) => smallvec![dst],
        None => iface.hello_destinations(neighbors),
    };
    iface.send_packet(instance, dst, packet);
}

// ===== Database Description Packets =====

pub(crate) fn send_dbdesc(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    let now = instance.tx.protocol_input.now();
    let budget = iface
        .max_packet_size()
        .saturating_sub(PacketHdr::LENGTH + DbDesc::BASE_LENGTH);

    // The Database summary list is only populated from the Exchange state
    // onwards, so negotiation packets go out empty.
    let lsa_hdrs = pop_batch(&mut nbr.lists.db_summary, budget, false, |_| {
        LsaHdr::LENGTH
    })
    .into_iter()
    .map(|(_, lsa)| lsa.hdr_aged(now))
    .collect();

    // Once everything has been described, the M-bit goes away. The initial
    // packet keeps it set regardless.
    if !nbr.dd_flags.contains(DbDescFlags::I) && nbr.lists.db_summary.is_empty()
    {
        nbr.dd_flags.remove(DbDescFlags::M);
    }

    let packet = Packet::DbDesc(DbDesc {
        hdr: iface.packet_hdr(PacketType::DbDesc, area, instance),
        mtu: iface.system.mtu,
        options: area.options(),
        dd_flags: nbr.dd_flags,
        dd_seq_no: nbr.dd_seq_no,
        lsa_hdrs,
    });
    let dst = send_dest_nbr(nbr, iface);
    let Some(msg) = iface.send_packet(instance, dst, packet) else {
        return;
    };
    nbr.last_sent_dbdesc = Some(msg);

    // The master retransmits every packet until it's acknowledged. The slave
    // only retransmits its initial packet, the rest being answered on demand.
    if nbr.dd_flags.intersects(DbDescFlags::MS | DbDescFlags::I) {
        nbr.rxmt_dbdesc_start(iface, area, instance);
    }
}

pub(crate) fn rxmt_dbdesc(nbr: &Neighbor, instance: &InstanceUpView<'_>) {
    if let Some(msg) = &nbr.last_sent_dbdesc {
        instance.tx.protocol_output.send_packet(msg.clone());
    }
}

// ===== LS Request Packets =====

// Moves the next batch of Link state request list entries to the pending
// list and requests them.
pub(crate) fn send_lsreq(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    let budget = iface.max_packet_size().saturating_sub(PacketHdr::LENGTH);
    let batch = pop_batch(&mut nbr.lists.ls_request, budget, false, |_| {
        LsRequest::ENTRY_LENGTH
    });
    nbr.lists.ls_request_pending.extend(batch);

    send_lsreq_pending(nbr, iface, area, instance);
    nbr.rxmt_lsreq_start(iface, area, instance);
}

pub(crate) fn rxmt_lsreq(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    send_lsreq_pending(nbr, iface, area, instance);
}

// ===== LS Update Packets =====

// Drains either a neighbor's LS Update list or, without a neighbor, the
// interface's flooding list.
pub(crate) fn send_lsupd(
    nbr_idx: Option<NeighborIndex>,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
) {
    let now = instance.tx.protocol_input.now();
    let budget = iface
        .max_packet_size()
        .saturating_sub(PacketHdr::LENGTH + LsUpdate::BASE_LENGTH);
    let transmit_delay = iface.config.transmit_delay;

    let (dst, mut pending) = match nbr_idx {
        Some(nbr_idx) => {
            let nbr = &mut neighbors[nbr_idx];
            let dst = send_dest_nbr(nbr, iface);
            (dst, std::mem::take(&mut nbr.lists.ls_update))
        }
        None => {
            let dst = send_dest_iface(iface, neighbors);
            (dst, std::mem::take(&mut iface.state.ls_update_list))
        }
    };

    // LSAs too big for a single packet are sent alone and left to IP
    // fragmentation.
    while !pending.is_empty() {
        let lsas = pop_batch(&mut pending, budget, true, |lsa| lsa.hdr.length)
            .into_iter()
            .map(|(_, lsa)| lsa_aged_for_tx(&lsa, transmit_delay, now))
            .collect();
        let hdr = iface.packet_hdr(PacketType::LsUpdate, area, instance);
        let packet = Packet::LsUpdate(LsUpdate { hdr, lsas });
        iface.send_packet(instance, dst.clone(), packet);
    }
}

// Resends as much of the LS retransmission list as fits in one packet.
pub(crate) fn rxmt_lsupd(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    let now = instance.tx.protocol_input.now();
    let budget = iface
        .max_packet_size()
        .saturating_sub(PacketHdr::LENGTH + LsUpdate::BASE_LENGTH);

    let budget = u32::from(budget);
    let mut used = 0;
    let lsas: Vec<_> = nbr
        .lists
        .ls_rxmt
        .values()
        .enumerate()
        .take_while(|(i, lsa)| {
            used += u32::from(lsa.hdr.length);
            *i == 0 || used <= budget
        })
        .map(|(_, lsa)| lsa_aged_for_tx(lsa, iface.config.transmit_delay, now))
        .collect();
    if lsas.is_empty() {
        return;
    }

    let hdr = iface.packet_hdr(PacketType::LsUpdate, area, instance);
    let packet = Packet::LsUpdate(LsUpdate { hdr, lsas });
    iface.send_packet(instance, send_dest_nbr(nbr, iface), packet);
}

// ===== LS Ack Packets =====

pub(crate) fn send_lsack_direct(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
) {
    let packet = Packet::LsAck(LsAck {
        hdr: iface.packet_hdr(PacketType::LsAck, area, instance),
        lsa_hdrs: vec![*lsa_hdr],
    });
    iface.send_packet(instance, send_dest_nbr(nbr, iface), packet);
}

// Flushes the interface's delayed acknowledgments, packing as many LSA
// headers as possible into each packet.
pub(crate) fn send_lsack_delayed(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
) {
    let dst = send_dest_iface(iface, neighbors);
    let budget = iface.max_packet_size().saturating_sub(PacketHdr::LENGTH);

    loop {
        let lsa_hdrs: Vec<_> =
            pop_batch(&mut iface.state.ls_ack_list, budget, false, |_| {
                LsaHdr::LENGTH
            })
            .into_iter()
            .map(|(_, lsa_hdr)| lsa_hdr)
            .collect();
        if lsa_hdrs.is_empty() {
            break;
        }

        let hdr = iface.packet_hdr(PacketType::LsAck, area, instance);
        let packet = Packet::LsAck(LsAck { hdr, lsa_hdrs });
        iface.send_packet(instance, dst.clone(), packet);
    }
}

// ===== helper functions =====

fn send_lsreq_pending(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    if nbr.lists.ls_request_pending.is_empty() {
        return;
    }

    let hdr = iface.packet_hdr(PacketType::LsRequest, area, instance);
    let entries = nbr.lists.ls_request_pending.keys().copied().collect();
    let packet = Packet::LsRequest(LsRequest { hdr, entries });
    iface.send_packet(instance, send_dest_nbr(nbr, iface), packet);
}

// Pops entries off the front of `list` while their encoded lengths fit in
// `budget` bytes. With `oversize_ok`, the first entry is always taken.
fn pop_batch<V>(
    list: &mut BTreeMap<LsaKey, V>,
    budget: u16,
    oversize_ok: bool,
    length: impl Fn(&V) -> u16,
) -> Vec<(LsaKey, V)> {
    let budget = usize::from(budget);
    let mut used = 0;
    let mut batch = vec![];
    while let Some(entry) = list.first_entry() {
        let len = usize::from(length(entry.get()));
        if used + len > budget && !(oversize_ok && batch.is_empty()) {
            break;
        }
        used += len;
        batch.push(entry.remove_entry());
    }
    batch
}

// Returns a copy of the LSA with its age incremented by InfTransDelay.
fn lsa_aged_for_tx(lsa: &Lsa, transmit_delay: u16, now: Duration) -> Lsa {
    let mut lsa = lsa.clone();
    let age = lsa
        .age(now)
        .saturating_add(transmit_delay)
        .min(lsdb::LSA_MAX_AGE);
    lsa.set_age(age, now);
    lsa
}

// Point-to-point neighbors are always reached through AllSPFRouters, since
// their address may be unnumbered.
fn send_dest_nbr(
    nbr: &Neighbor,
    iface: &Interface,
) -> SmallVec<[Ipv4Addr; 4]> {
    let addr = match iface.config.if_type {
        InterfaceType::PointToPoint => MulticastAddr::AllSpfRtrs.addr(),
        _ => nbr.src,
    };
    smallvec![addr]
}

// Destinations for packets addressed to every adjacency on the interface.
fn send_dest_iface(
    iface: &Interface,
    neighbors: &Arena<Neighbor>,
) -> SmallVec<[Ipv4Addr; 4]> {
    match iface.config.if_type {
        // Only the DR and BDR talk to everyone. Other routers address the
        // DR and BDR through AllDRouters.
        InterfaceType::Broadcast => match iface.state.ism_state {
            ism::State::Dr | ism::State::Backup => {
                smallvec![MulticastAddr::AllSpfRtrs.addr()]
            }
            _ => smallvec![MulticastAddr::AllDrRtrs.addr()],
        },
        // No multicast here. Each adjacent neighbor gets its own copy.
        InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => iface
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::Exchange)
            .map(|nbr| nbr.src)
            .collect(),
        InterfaceType::PointToPoint => {
            smallvec![MulticastAddr::AllSpfRtrs.addr()]
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Options;
    use crate::packet::lsa::{LsaBody, LsaNetwork};

    #[test]
    fn tx_age_is_capped() {
        let body = LsaBody::Network(LsaNetwork {
            mask: Ipv4Addr::new(255, 255, 255, 0),
            attached_rtrs: [Ipv4Addr::new(1, 1, 1, 1)].into(),
        });
        let mut lsa = Lsa::new(
            10,
            Options::E,
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(1, 1, 1, 1),
            lsdb::LSA_INIT_SEQ_NO,
            body,
        );
        lsa.base_time = Some(Duration::from_secs(100));

        let now = Duration::from_secs(105);
        let aged = lsa_aged_for_tx(&lsa, 1, now);
        assert_eq!(aged.hdr.age, 16);
        assert_eq!(aged.raw[0..2], 16u16.to_be_bytes());

        let now = Duration::from_secs(100 + lsdb::LSA_MAX_AGE as u64);
        let aged = lsa_aged_for_tx(&lsa, 1, now);
        assert!(aged.hdr.is_maxage());
    }
}
