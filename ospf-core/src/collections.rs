//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use generational_arena::Index;
use ospf_utils::timer::IntervalTask;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::error::Error;
use crate::instance::ProtocolInputChannelsTx;
use crate::interface::Interface;
use crate::lsdb::{LsaDelayedOrig, LsaEntry};
use crate::neighbor::{Neighbor, NeighborNetId};
use crate::packet::lsa::{Lsa, LsaKey};
use crate::tasks;

// Stable object identifier. Unlike arena indexes, IDs are never reused, so
// they can be safely carried by timer expirations and other deferred
// messages.
pub type ObjectId = u32;

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;
pub type LsaEntryId = ObjectId;
pub type LsaEntryIndex = Index;

// Generational arena shared by all objects of the same kind.
#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

#[derive(Debug, Default)]
pub struct Areas {
    arena: Arena<Area>,
    ids: HashMap<AreaId, AreaIndex>,
    by_area_id: BTreeMap<Ipv4Addr, AreaIndex>,
    next_id: AreaId,
}

#[derive(Debug, Default)]
pub struct Interfaces {
    ids: HashMap<InterfaceId, InterfaceIndex>,
    by_name: BTreeMap<String, InterfaceIndex>,
    next_id: InterfaceId,
}

#[derive(Debug, Default)]
pub struct Neighbors {
    ids: HashMap<NeighborId, NeighborIndex>,
    by_router_id: BTreeMap<Ipv4Addr, NeighborIndex>,
    by_net_id: BTreeMap<NeighborNetId, NeighborIndex>,
    next_id: NeighborId,
}

#[derive(Debug, Default)]
pub struct Lsdb {
    ids: HashMap<LsaEntryId, LsaEntryIndex>,
    // Ordered by LS type first.
    by_key: BTreeMap<LsaKey, LsaEntryIndex>,
    pub maxage_lsas: HashSet<LsaEntryIndex>,
    maxage_sweeper: Option<IntervalTask>,
    // Originations postponed by MinLSInterval.
    pub delayed_orig: HashMap<LsaKey, LsaDelayedOrig>,
    // New instances waiting for the MaxSequenceNumber copy to be flushed.
    pub seqno_wrapping: HashMap<LsaKey, Lsa>,
    next_id: LsaEntryId,
}

// Stable reference to one of the LSDBs of the instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsdbId {
    Area(AreaId),
    As,
}

#[derive(Clone, Copy, Debug, EnumAsInner, Eq, PartialEq)]
pub enum LsdbIndex {
    Area(AreaIndex),
    As,
}

// Objects that can be looked up by their stable ID.
trait Identified {
    fn object_id(&self) -> ObjectId;
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub(crate) fn get(&self, index: Index) -> Option<&T> {
        self.0.get(index)
    }

    fn insert(&mut self, object: T) -> Index {
        self.0.insert(object)
    }

    fn remove(&mut self, index: Index) -> Option<T> {
        self.0.remove(index)
    }

    // Resolves an object ID, making sure the arena slot wasn't reused.
    fn resolve(
        &self,
        ids: &HashMap<ObjectId, Index>,
        id: ObjectId,
    ) -> Option<(Index, &T)>
    where
        T: Identified,
    {
        let index = *ids.get(&id)?;
        self.0
            .get(index)
            .filter(|object| object.object_id() == id)
            .map(|object| (index, object))
    }

    fn resolve_mut(
        &mut self,
        ids: &HashMap<ObjectId, Index>,
        id: ObjectId,
    ) -> Option<(Index, &mut T)>
    where
        T: Identified,
    {
        let index = *ids.get(&id)?;
        self.0
            .get_mut(index)
            .filter(|object| object.object_id() == id)
            .map(|object| (index, object))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(generational_arena::Arena::new())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &T {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut T {
        &mut self.0[index]
    }
}

// ===== impl Areas =====

impl Areas {
    pub(crate) fn insert(
        &mut self,
        area_id: Ipv4Addr,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        if self.by_area_id.contains_key(&area_id) {
            return Err(Error::AreaExists(area_id));
        }

        self.next_id += 1;
        let area_idx = self.arena.insert(Area::new(self.next_id, area_id));
        self.ids.insert(self.next_id, area_idx);
        self.by_area_id.insert(area_id, area_idx);

        Ok((area_idx, &mut self.arena[area_idx]))
    }

    pub(crate) fn get_by_id(
        &self,
        id: AreaId,
    ) -> Result<(AreaIndex, &Area), Error> {
        self.arena
            .resolve(&self.ids, id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        self.arena
            .resolve_mut(&self.ids, id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_by_area_id(
        &self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &Area)> {
        let area_idx = *self.by_area_id.get(&area_id)?;
        Some((area_idx, &self.arena[area_idx]))
    }

    pub(crate) fn get_mut_by_area_id(
        &mut self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &mut Area)> {
        let area_idx = *self.by_area_id.get(&area_id)?;
        Some((area_idx, &mut self.arena[area_idx]))
    }

    // Areas in ascending Area ID order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Area> {
        self.by_area_id.values().map(|area_idx| &self.arena[*area_idx])
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Area> {
        self.arena.0.iter_mut().map(|(_, area)| area)
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = AreaIndex> + '_ {
        self.by_area_id.values().copied()
    }

    // An ABR has interfaces running in more than one area.
    pub(crate) fn is_abr(&self, interfaces: &Arena<Interface>) -> bool {
        self.iter()
            .filter(|area| area.is_active(interfaces))
            .nth(1)
            .is_some()
    }
}

impl std::ops::Index<AreaIndex> for Areas {
    type Output = Area;

    fn index(&self, index: AreaIndex) -> &Area {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<AreaIndex> for Areas {
    fn index_mut(&mut self, index: AreaIndex) -> &mut Area {
        &mut self.arena[index]
    }
}

// ===== impl Interfaces =====

impl Interfaces {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        ifname: &str,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        if self.by_name.contains_key(ifname) {
            return Err(Error::InterfaceExists(ifname.to_owned()));
        }

        self.next_id += 1;
        let iface = Interface::new(self.next_id, ifname.to_owned());
        let iface_idx = arena.insert(iface);
        self.ids.insert(self.next_id, iface_idx);
        self.by_name.insert(ifname.to_owned(), iface_idx);

        Ok((iface_idx, &mut arena[iface_idx]))
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a Interface), Error> {
        arena
            .resolve(&self.ids, id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        arena
            .resolve_mut(&self.ids, id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_by_name<'a>(
        &self,
        arena: &'a Arena<Interface>,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &'a Interface)> {
        let iface_idx = *self.by_name.get(ifname)?;
        Some((iface_idx, &arena[iface_idx]))
    }

    // Looks up the interface whose primary address is `addr`.
    pub(crate) fn get_mut_by_addr<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        addr: Ipv4Addr,
    ) -> Option<(InterfaceIndex, &'a mut Interface)> {
        let iface_idx = self.indexes().find(|iface_idx| {
            arena[*iface_idx]
                .system
                .primary_addr
                .is_some_and(|primary_addr| primary_addr.ip() == addr)
        })?;
        Some((iface_idx, &mut arena[iface_idx]))
    }

    // Interfaces in name order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Interface>,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.by_name.values().map(|iface_idx| &arena[*iface_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.by_name.values().copied()
    }
}

// ===== impl Neighbors =====

impl Neighbors {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> (NeighborIndex, &'a mut Neighbor) {
        self.next_id += 1;
        let nbr = Neighbor::new(self.next_id, router_id, src);
        let net_id = nbr.network_id();
        let nbr_idx = arena.insert(nbr);
        self.ids.insert(self.next_id, nbr_idx);
        self.by_router_id.insert(router_id, nbr_idx);
        self.by_net_id.insert(net_id, nbr_idx);

        (nbr_idx, &mut arena[nbr_idx])
    }

    // Dropping the neighbor cancels all of its timers.
    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Neighbor>,
        nbr_idx: NeighborIndex,
    ) {
        let Some(nbr) = arena.remove(nbr_idx) else {
            return;
        };
        self.ids.remove(&nbr.id);
        self.by_router_id.remove(&nbr.router_id);
        self.by_net_id.remove(&nbr.network_id());
    }

    pub(crate) fn update_router_id(
        &mut self,
        nbr_idx: NeighborIndex,
        nbr: &mut Neighbor,
        router_id: Ipv4Addr,
    ) {
        self.by_router_id.remove(&nbr.router_id);
        nbr.router_id = router_id;
        self.by_router_id.insert(router_id, nbr_idx);
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a Neighbor), Error> {
        arena
            .resolve(&self.ids, id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a mut Neighbor), Error> {
        arena
            .resolve_mut(&self.ids, id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_mut_by_router_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        let nbr_idx = *self.by_router_id.get(&router_id)?;
        Some((nbr_idx, &mut arena[nbr_idx]))
    }

    // Neighbors on broadcast and NBMA networks are identified by their
    // interface address rather than by their Router ID.
    pub(crate) fn get_by_net_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        let nbr_idx = *self.by_net_id.get(&net_id)?;
        Some((nbr_idx, &arena[nbr_idx]))
    }

    pub(crate) fn get_mut_by_net_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        let nbr_idx = *self.by_net_id.get(&net_id)?;
        Some((nbr_idx, &mut arena[nbr_idx]))
    }

    // Neighbors in Router ID order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = &'a Neighbor> + 'a {
        self.by_router_id.values().map(|nbr_idx| &arena[*nbr_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = NeighborIndex> + '_ {
        self.by_router_id.values().copied()
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    // Installs the LSA, replacing any existing instance with the same key.
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry>,
        lsdb_id: LsdbId,
        lsa: Arc<Lsa>,
        protocol_input: &ProtocolInputChannelsTx,
    ) -> (LsaEntryIndex, &'a mut LsaEntry) {
        let key = lsa.hdr.key();
        let maxage = lsa.hdr.is_maxage();
        if let Some(old_lse_idx) = self.by_key.get(&key).copied() {
            self.delete(arena, old_lse_idx);
        }

        self.next_id += 1;
        let lse = LsaEntry::new(lsdb_id, self.next_id, lsa, protocol_input);
        let lse_idx = arena.insert(lse);
        self.ids.insert(self.next_id, lse_idx);
        self.by_key.insert(key, lse_idx);

        // MaxAge LSAs are removed by the sweeper once no longer needed.
        if maxage {
            self.maxage_lsas.insert(lse_idx);
            self.maxage_sweeper.get_or_insert_with(|| {
                tasks::lsdb_maxage_sweep_interval(lsdb_id, protocol_input)
            });
        }

        (lse_idx, &mut arena[lse_idx])
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<LsaEntry>,
        lse_idx: LsaEntryIndex,
    ) {
        let Some(lse) = arena.remove(lse_idx) else {
            return;
        };
        self.ids.remove(&lse.id);
        self.by_key.remove(&lse.data.hdr.key());
        if self.maxage_lsas.remove(&lse_idx) && self.maxage_lsas.is_empty() {
            self.maxage_sweeper = None;
        }
    }

    pub(crate) fn clear(&mut self, arena: &mut Arena<LsaEntry>) {
        for (_, lse_idx) in std::mem::take(&mut self.by_key) {
            arena.remove(lse_idx);
        }
        self.ids.clear();
        self.maxage_lsas.clear();
        self.maxage_sweeper = None;
        self.delayed_orig.clear();
        self.seqno_wrapping.clear();
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry), Error> {
        arena
            .resolve(&self.ids, id)
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    pub(crate) fn get<'a>(
        &self,
        arena: &'a Arena<LsaEntry>,
        key: &LsaKey,
    ) -> Option<(LsaEntryIndex, &'a LsaEntry)> {
        let lse_idx = *self.by_key.get(key)?;
        Some((lse_idx, &arena[lse_idx]))
    }

    // LSAs in key order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry)> + 'a {
        self.by_key
            .values()
            .map(|lse_idx| (*lse_idx, &arena[*lse_idx]))
    }
}

// ===== impl Identified =====

impl Identified for Area {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Identified for Interface {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Identified for Neighbor {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Identified for LsaEntry {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

// ===== global functions =====

pub(crate) fn lsdb_get<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    lsdb_id: LsdbId,
) -> Result<(LsdbIndex, &'a Lsdb), Error> {
    match lsdb_id {
        LsdbId::Area(area_id) => {
            let (area_idx, area) = areas.get_by_id(area_id)?;
            Ok((LsdbIndex::Area(area_idx), &area.state.lsdb))
        }
        LsdbId::As => Ok((LsdbIndex::As, instance_lsdb)),
    }
}

pub(crate) fn lsdb_get_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    lsdb_id: LsdbId,
) -> Result<(LsdbIndex, &'a mut Lsdb), Error> {
    match lsdb_id {
        LsdbId::Area(area_id) => {
            let (area_idx, area) = areas.get_mut_by_id(area_id)?;
            Ok((LsdbIndex::Area(area_idx), &mut area.state.lsdb))
        }
        LsdbId::As => Ok((LsdbIndex::As, instance_lsdb)),
    }
}

pub(crate) fn lsdb_index<'a>(
    instance_lsdb: &'a Lsdb,
    areas: &'a Areas,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a Lsdb) {
    match lsdb_idx {
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];
            (LsdbId::Area(area.id), &area.state.lsdb)
        }
        LsdbIndex::As => (LsdbId::As, instance_lsdb),
    }
}

pub(crate) fn lsdb_index_mut<'a>(
    instance_lsdb: &'a mut Lsdb,
    areas: &'a mut Areas,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a mut Lsdb) {
    match lsdb_idx {
        LsdbIndex::Area(area_idx) => {
            let area = &mut areas[area_idx];
            (LsdbId::Area(area.id), &mut area.state.lsdb)
        }
        LsdbIndex::As => (LsdbId::As, instance_lsdb),
    }
}
