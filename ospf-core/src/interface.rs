//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use ism::{Action, Event, State};
use ospf_utils::ip::Ipv4AddrExt;
use ospf_utils::timer::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, NeighborIndex, Neighbors};
use crate::config::{InterfaceAuthCfg, InterfaceCfg};
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, InterfaceCfgError};
use crate::instance::InstanceUpView;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::MulticastAddr;
use crate::packet::auth::{self, AuthCtx, MD5_DIGEST_LENGTH};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{
    Hello, Packet, PacketHdr, PacketHdrAuth, PacketType,
};
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::{observer, tasks};

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

// Interface data provided by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceSys {
    // Whether the interface is operationally up.
    pub operative: bool,
    // Whether the interface is looped back.
    pub loopback: bool,
    // Primary IPv4 address.
    pub primary_addr: Option<Ipv4Network>,
    // Interface MTU.
    pub mtu: u16,
}

#[derive(Debug, Default)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // Source address used when sending packets.
    pub src_addr: Option<Ipv4Addr>,
    // The network DR/BDR.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // Statistics.
    pub event_count: u32,
    // Self-originated Network-LSA.
    pub network_lsa_self: Option<LsaKey>,
    // Tasks.
    pub tasks: InterfaceTasks,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // ISM Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // NBMA poll interval tasks.
    pub nbma_poll_interval: HashMap<Ipv4Addr, IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceType {
    #[default]
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
}

// Interface state machine.
//
// DR election and the ISM transition function are free of side effects. The
// actions returned by `transition` are carried out by `Interface::fsm`.
pub mod ism {
    use serde::{Deserialize, Serialize};
    use smallvec::{SmallVec, smallvec};

    use super::InterfaceType;
    use crate::debug::InterfaceInactiveReason;
    use crate::neighbor::NeighborNetId;

    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown(InterfaceInactiveReason),
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Action {
        // Start sending Hellos.
        Start,
        StartWaitTimer,
        StopWaitTimer,
        // Invoke the neighbor event Start for the eligible NBMA neighbors.
        NbmaStart,
        // Apply the outcome of the DR election.
        ApplyElection(Election),
        // Kill all neighbors and reset the interface variables.
        Stop(InterfaceInactiveReason),
    }

    // Inputs that influence the outcome of a transition.
    #[derive(Clone, Copy, Debug)]
    pub struct Context {
        pub if_type: InterfaceType,
        pub priority: u8,
        // Result of the DR election, for the events that require one.
        pub election: Option<Election>,
    }

    // Result of the DR election.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Election {
        pub dr: Option<NeighborNetId>,
        pub bdr: Option<NeighborNetId>,
        pub state: State,
    }

    // Router taking part in the DR election.
    #[derive(Clone, Copy, Debug)]
    pub struct DrCandidate {
        pub router_id: std::net::Ipv4Addr,
        pub net_id: NeighborNetId,
        // DR and BDR declared by this router.
        pub dr: Option<NeighborNetId>,
        pub bdr: Option<NeighborNetId>,
        pub priority: u8,
    }

    pub type Actions = SmallVec<[Action; 4]>;

    // Computes the ISM transition as specified in Section 9.3 of RFC 2328.
    //
    // Returns `None` for unexpected events. Otherwise, returns the new state
    // (`None` when the state doesn't change) and the actions to perform.
    pub fn transition(
        state: State,
        event: &Event,
        ctx: &Context,
    ) -> Option<(Option<State>, Actions)> {
        let transition = match (state, event) {
            (State::Down, Event::InterfaceUp) => match ctx.if_type {
                InterfaceType::PointToPoint
                | InterfaceType::PointToMultipoint => {
                    (Some(State::PointToPoint), smallvec![Action::Start])
                }
                InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                    if ctx.priority == 0 {
                        (Some(State::DrOther), smallvec![Action::Start])
                    } else {
                        let mut actions: Actions =
                            smallvec![Action::Start, Action::StartWaitTimer];
                        if ctx.if_type == InterfaceType::NonBroadcast {
                            actions.push(Action::NbmaStart);
                        }
                        (Some(State::Waiting), actions)
                    }
                }
            },
            (State::Waiting, Event::NbrChange) => {
                // This is an unspecified event but it can happen during normal
                // operation, so ignore it gracefully.
                (None, smallvec![])
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                let election = ctx.election?;
                (
                    Some(election.state),
                    smallvec![
                        Action::StopWaitTimer,
                        Action::ApplyElection(election)
                    ],
                )
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                let election = ctx.election?;
                (
                    Some(election.state),
                    smallvec![Action::ApplyElection(election)],
                )
            }
            (_, Event::InterfaceDown(reason)) => {
                (Some(State::Down), smallvec![Action::Stop(*reason)])
            }
            (_, Event::LoopInd) => (
                Some(State::Loopback),
                smallvec![Action::Stop(InterfaceInactiveReason::LoopedBack)],
            ),
            (State::Loopback, Event::UnloopInd) => {
                // No actions are necessary.
                (Some(State::Down), smallvec![])
            }
            _ => return None,
        };

        Some(transition)
    }

    // Returns whether the given ISM event requires a DR election.
    pub fn needs_election(state: State, event: &Event) -> bool {
        matches!(
            (state, event),
            (State::Waiting, Event::BackupSeen | Event::WaitTimer)
                | (
                    State::DrOther | State::Backup | State::Dr,
                    Event::NbrChange
                )
        )
    }

    // Runs the DR election algorithm (RFC 2328 - Section 9.4).
    //
    // The candidates are the eligible routers in the 2-Way state or higher,
    // including the calculating router (identified by `net_id`) when its
    // priority is non-zero.
    pub fn elect(
        net_id: NeighborNetId,
        old_dr: Option<NeighborNetId>,
        old_bdr: Option<NeighborNetId>,
        candidates: &[DrCandidate],
    ) -> Election {
        let mut candidates = candidates.to_vec();

        // Steps 2 and 3: calculate the new BDR and DR.
        let (mut new_dr, mut new_bdr) = calc_dr_bdr(&candidates);

        // Step 4: check if the router is the new DR/BDR or no longer the
        // DR/BDR.
        if (new_dr == Some(net_id) || old_dr == Some(net_id))
            && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            // Repeat steps 2 and 3.
            for myself in candidates.iter_mut().filter(|c| c.net_id == net_id)
            {
                myself.dr = new_dr;
                myself.bdr = new_bdr;
            }
            (new_dr, new_bdr) = calc_dr_bdr(&candidates);
        }

        // Step 5: set the interface state accordingly.
        let state = if new_dr == Some(net_id) {
            State::Dr
        } else if new_bdr == Some(net_id) {
            State::Backup
        } else {
            State::DrOther
        };

        Election {
            dr: new_dr,
            bdr: new_bdr,
            state,
        }
    }

    fn calc_dr_bdr(
        candidates: &[DrCandidate],
    ) -> (Option<NeighborNetId>, Option<NeighborNetId>) {
        let rank = |rtr: &&DrCandidate| (rtr.priority, rtr.router_id);

        // Step 2: calculate the new Backup Designated Router.
        let new_bdr = candidates
            .iter()
            .filter(|rtr| rtr.dr != Some(rtr.net_id))
            .filter(|rtr| rtr.bdr == Some(rtr.net_id))
            .max_by_key(rank)
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|rtr| rtr.dr != Some(rtr.net_id))
                    .max_by_key(rank)
            })
            .map(|rtr| rtr.net_id);

        // Step 3: calculate the new Designated Router.
        let new_dr = candidates
            .iter()
            .filter(|rtr| rtr.dr == Some(rtr.net_id))
            .max_by_key(rank)
            .map(|rtr| rtr.net_id)
            .or(new_bdr);

        (new_dr, new_bdr)
    }
}

// ===== impl Interface =====

impl Interface {
    // Maximum size of the IPv4 header.
    const IPV4_HDR_SIZE: u16 = 20;

    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            id,
            name,
            system: Default::default(),
            config: Default::default(),
            state: Default::default(),
        }
    }

    // Reacts to changes in the interface's operational status, raising the
    // appropriate ISM events.
    pub(crate) fn update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        if self.system.loopback {
            if self.state.ism_state != State::Loopback {
                let event = Event::LoopInd;
                self.fsm(area, instance, neighbors, lsa_entries, event);
            }
            return;
        }
        if self.state.ism_state == State::Loopback {
            let event = Event::UnloopInd;
            self.fsm(area, instance, neighbors, lsa_entries, event);
        }

        match self.is_ready() {
            Ok(()) if self.is_down() => {
                self.fsm(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    Event::InterfaceUp,
                );
            }
            Err(reason) if !self.is_down() => {
                self.fsm(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    Event::InterfaceDown(reason),
                );
            }
            _ => (),
        }
    }

    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.system.operative {
            return Err(InterfaceInactiveReason::OperationalDown);
        }

        if self.system.primary_addr.is_none() {
            return Err(InterfaceInactiveReason::MissingIpv4Address);
        }

        Ok(())
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.name, &self.state.ism_state, &event).log();

        let election = ism::needs_election(self.state.ism_state, &event)
            .then(|| self.dr_election(instance, neighbors))
            .flatten();
        let ctx = ism::Context {
            if_type: self.config.if_type,
            priority: self.config.priority,
            election,
        };
        let Some((new_state, actions)) =
            ism::transition(self.state.ism_state, &event, &ctx)
        else {
            Error::IsmUnexpectedEvent(self.state.ism_state, event).log();
            return;
        };

        for action in actions {
            match action {
                Action::Start => {
                    self.start(area, instance);
                }
                Action::StartWaitTimer => {
                    let task = tasks::ism_wait_timer(self, area, instance);
                    self.state.tasks.wait_timer = Some(task);
                }
                Action::StopWaitTimer => {
                    self.state.tasks.wait_timer = None;
                }
                Action::NbmaStart => {
                    self.nbma_start(area, instance, neighbors, |priority| {
                        priority != 0
                    });
                }
                Action::ApplyElection(election) => {
                    self.apply_election(area, instance, neighbors, election);
                }
                Action::Stop(reason) => {
                    self.stop(area, instance, neighbors, lsa_entries, reason);
                }
            }
        }

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state.ism_state
        {
            self.fsm_state_change(area, instance, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        new_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceStateChange {
                area_id: area.id,
                iface_id: self.id,
            },
        );
        if self.state.ism_state == State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::IsmTransition(&self.name, &self.state.ism_state, &new_state)
            .log();
        let old_state = self.state.ism_state;
        self.state.ism_state = new_state;
        observer::if_state_change(instance, self, old_state);

        // Update statistics.
        self.state.event_count += 1;
    }

    fn start(&mut self, area: &Area, instance: &InstanceUpView<'_>) {
        Debug::InterfaceStart(&self.name).log();

        // Initialize source address.
        self.state.src_addr = self.system.primary_addr.map(|addr| addr.ip());

        // Start Hello Tx task.
        if !self.is_passive() {
            self.hello_interval_start(area, instance);
        }
    }

    fn stop(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(&self.name, reason).log();

        // Kill all neighbors.
        let event = match reason {
            InterfaceInactiveReason::OperationalDown
            | InterfaceInactiveReason::MissingIpv4Address => {
                nsm::Event::LinkDown
            }
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Reset interface state.
        self.state.src_addr = None;
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        self.state.tasks = Default::default();
    }

    // Restart the Hello Tx task.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.is_passive() && self.state.ism_state >= State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.config.passive
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    // Runs the DR election over the current set of eligible routers.
    fn dr_election(
        &self,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> Option<ism::Election> {
        let router_id = instance.state.router_id;
        let net_id = NeighborNetId::from(self.state.src_addr?);

        let myself = (self.config.priority != 0).then_some(ism::DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });
        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| ism::DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.network_id(),
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });
        let candidates = myself.into_iter().chain(nbrs).collect::<Vec<_>>();

        Some(ism::elect(
            net_id,
            self.state.dr,
            self.state.bdr,
            &candidates,
        ))
    }

    fn apply_election(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        election: ism::Election,
    ) {
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;
        self.state.dr = election.dr;
        self.state.bdr = election.bdr;
        Debug::IsmDrElection(
            &self.name,
            old_dr,
            election.dr,
            old_bdr,
            election.bdr,
        )
        .log();

        // Step 6: if the attached network is an NBMA network, and the router
        // itself has just become either DR or BDR, it must start sending Hello
        // Packets to those neighbors that are not eligible to become DR. This
        // is done by invoking the neighbor event Start for each neighbor having
        // a Router Priority of 0.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(election.state, State::Dr | State::Backup)
        {
            self.nbma_start(area, instance, neighbors, |priority| {
                priority == 0
            });
        }

        // Step 7: if the DR or BDR changes, invoke the AdjOk? event on all
        // neighbors whose state is at least 2-Way.
        if election.dr != old_dr || election.bdr != old_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            // Notify observers (DR and BDR by interface address).
            let dr = election.dr.map(|net_id| net_id.get());
            let bdr = election.bdr.map(|net_id| net_id.get());
            observer::if_dr_change(instance, self, dr, bdr);
        }

        // Synchronize interface's Hello Tx task (updated DR, BDR or set of
        // Hello destinations).
        if election.dr != old_dr
            || election.bdr != old_bdr
            || election.state != self.state.ism_state
        {
            self.sync_hello_tx(area, instance);
        }

        // If the DR changed, reoriginate LSAs that might have been affected.
        if election.dr != old_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }
    }

    // Invokes the neighbor event Start for the configured NBMA neighbors
    // whose priority matches the given filter.
    //
    // Neighbors that aren't known yet are created using their IP address as
    // a provisional Router ID.
    fn nbma_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        filter: impl Fn(u8) -> bool,
    ) {
        let static_nbrs = self
            .config
            .static_nbrs
            .iter()
            .filter(|(_, snbr)| filter(snbr.priority))
            .map(|(addr, snbr)| (*addr, snbr.priority))
            .collect::<Vec<_>>();
        for (addr, priority) in static_nbrs {
            let net_id = NeighborNetId::from(addr);
            if self
                .state
                .neighbors
                .get_by_net_id(neighbors, net_id)
                .is_some()
            {
                continue;
            }

            let (_, nbr) = self.state.neighbors.insert(neighbors, addr, addr);
            nbr.priority = priority;
            instance.tx.protocol_input.nsm_event(
                area.id,
                self.id,
                nbr.id,
                nsm::Event::Start,
            );
            self.nbma_poll_interval_stop(addr);
        }
    }

    pub(crate) fn need_adjacency(&self, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                true
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
        }
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance, None, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        addr: Ipv4Addr,
        poll_interval: u16,
    ) {
        let task = tasks::hello_interval(
            self,
            area,
            instance,
            Some(addr),
            poll_interval,
        );
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: Ipv4Addr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Start LS Update timeout if necessary.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    pub(crate) fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> Option<Packet> {
        let primary_addr = self.system.primary_addr?;
        let hdr = self.packet_hdr(PacketType::Hello, area, instance);

        Some(Packet::Hello(Hello {
            hdr,
            network_mask: primary_addr.mask(),
            hello_interval: self.config.hello_interval,
            options: area.options(),
            priority: self.config.priority,
            dead_interval: self.config.dead_interval as u32,
            dr: self.state.dr.map(|dr| dr.get()),
            bdr: self.state.bdr.map(|bdr| bdr.get()),
            // Neighbors provisionally created for NBMA networks aren't listed
            // until a Hello is received from them.
            neighbors: self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Init)
                .map(|nbr| nbr.router_id)
                .collect(),
        }))
    }

    // Returns the list of periodic Hello destinations.
    pub(crate) fn hello_destinations(
        &self,
        neighbors: &Arena<Neighbor>,
    ) -> SmallVec<[Ipv4Addr; 4]> {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::Broadcast => {
                smallvec![MulticastAddr::AllSpfRtrs.addr()]
            }
            InterfaceType::PointToMultipoint => {
                self.config.static_nbrs.keys().copied().collect()
            }
            InterfaceType::NonBroadcast => {
                // RFC 2328 - Section 9.5.1:
                // "If the router is eligible to become Designated Router, it
                // must periodically send Hello Packets to all neighbors that
                // are also eligible. In addition, if the router is itself the
                // Designated Router or Backup Designated Router, it must also
                // send periodic Hello Packets to all other neighbors. [...] If
                // the router is not eligible to become Designated Router, it
                // must periodically send Hello Packets to both the Designated
                // Router and the Backup Designated Router (if they exist)".
                //
                // Dead neighbors are polled separately.
                if self.config.priority != 0 {
                    let dr_or_backup = self.is_dr_or_backup();
                    self.config
                        .static_nbrs
                        .iter()
                        .filter(|(_, snbr)| dr_or_backup || snbr.priority != 0)
                        .map(|(addr, _)| *addr)
                        .filter(|addr| {
                            let polls = &self.state.tasks.nbma_poll_interval;
                            !polls.contains_key(addr)
                        })
                        .collect()
                } else {
                    [self.state.dr, self.state.bdr]
                        .into_iter()
                        .flatten()
                        .filter(|net_id| {
                            self.state
                                .neighbors
                                .get_by_net_id(neighbors, *net_id)
                                .is_some()
                        })
                        .map(|net_id| net_id.get())
                        .collect()
                }
            }
        }
    }

    pub(crate) fn validate_packet_dst(
        &self,
        dst: Ipv4Addr,
    ) -> Result<(), Error> {
        // Check if the destination matches the interface primary address.
        if self.state.src_addr == Some(dst) {
            return Ok(());
        }

        // Check if the destination matches AllSPFRouters.
        if dst == MulticastAddr::AllSpfRtrs.addr() {
            return Ok(());
        }

        // Packets whose IP destination is AllDRouters should only be accepted
        // if the state of the receiving interface is DR or Backup.
        if dst == MulticastAddr::AllDrRtrs.addr() && self.is_dr_or_backup() {
            return Ok(());
        }

        Err(Error::InvalidDstAddr(dst))
    }

    pub(crate) fn validate_packet_src(
        &self,
        src: Ipv4Addr,
    ) -> Result<(), Error> {
        if !src.is_usable() {
            return Err(Error::InvalidSrcAddr(src));
        }

        // The packet's IP source address is required to be on the same
        // network as the receiving interface.
        if self.config.if_type != InterfaceType::PointToPoint
            && !self
                .system
                .primary_addr
                .is_some_and(|primary_addr| primary_addr.contains(src))
        {
            return Err(Error::InvalidSrcAddr(src));
        }

        Ok(())
    }

    // Validates the packet authentication fields against the interface
    // configuration. The keyed-MD5 digest itself is verified while decoding.
    pub(crate) fn validate_packet_auth(
        &self,
        hdr: &PacketHdr,
    ) -> Result<(), InterfaceCfgError> {
        match (&self.config.auth, &hdr.auth) {
            (InterfaceAuthCfg::Null, PacketHdrAuth::Null) => Ok(()),
            (InterfaceAuthCfg::Simple { key }, PacketHdrAuth::Simple(rcvd)) => {
                if auth::simple_password(key) != *rcvd {
                    return Err(InterfaceCfgError::AuthKeyMismatch);
                }
                Ok(())
            }
            (
                InterfaceAuthCfg::Cryptographic { key_id, .. },
                PacketHdrAuth::Cryptographic {
                    key_id: rcvd_key_id,
                    ..
                },
            ) => {
                if key_id != rcvd_key_id {
                    return Err(InterfaceCfgError::AuthKeyMismatch);
                }
                Ok(())
            }
            (_, _) => Err(InterfaceCfgError::AuthTypeMismatch(
                hdr.auth_type(),
                self.config.auth.auth_type(),
            )),
        }
    }

    pub(crate) fn validate_hello(
        &self,
        hello: &Hello,
    ) -> Result<(), InterfaceCfgError> {
        match self.config.if_type {
            InterfaceType::PointToPoint => {
                // Nothing to validate.
            }
            InterfaceType::PointToMultipoint
            | InterfaceType::Broadcast
            | InterfaceType::NonBroadcast => {
                // Validate the Hello Network mask field.
                if let Some(primary_addr) = self.system.primary_addr {
                    let iface_addrmask = primary_addr.mask();
                    if hello.network_mask != iface_addrmask {
                        return Err(InterfaceCfgError::HelloMaskMismatch(
                            hello.network_mask,
                            iface_addrmask,
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    // Returns the maximum size of the OSPF packets sent on this interface.
    pub(crate) fn max_packet_size(&self) -> u16 {
        let mut max = self.system.mtu.saturating_sub(Self::IPV4_HDR_SIZE);

        // Reserve space for the message digest when authentication is enabled.
        if let InterfaceAuthCfg::Cryptographic { .. } = self.config.auth {
            max = max.saturating_sub(MD5_DIGEST_LENGTH as u16);
        }

        max
    }

    // Looks up the neighbor that sent a packet.
    pub(crate) fn get_neighbor<'a>(
        &mut self,
        src: Ipv4Addr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor>,
    ) -> Option<(NeighborIndex, &'a mut Neighbor)> {
        match self.config.if_type {
            InterfaceType::PointToPoint => {
                // If the receiving interface connects to a point-to-point
                // network, the sender is identified by the Router ID (source
                // router) found in the packet's OSPF header.
                self.state
                    .neighbors
                    .get_mut_by_router_id(neighbors, router_id)
            }
            InterfaceType::Broadcast
            | InterfaceType::NonBroadcast
            | InterfaceType::PointToMultipoint => {
                // If the receiving interface connects to a broadcast network,
                // Point-to-MultiPoint network or NBMA network the sender is
                // identified by the IP source address found in the packet's IP
                // header.
                let net_id = NeighborNetId::from(src);
                let (nbr_idx, nbr) =
                    self.state.neighbors.get_mut_by_net_id(neighbors, net_id)?;

                // Update the neighbor's Router ID before returning it.
                if nbr.router_id != router_id {
                    self.state
                        .neighbors
                        .update_router_id(nbr_idx, nbr, router_id);
                }
                Some((nbr_idx, nbr))
            }
        }
    }

    // Returns the authentication fields of the packets sent on this
    // interface.
    fn packet_hdr_auth(&self) -> PacketHdrAuth {
        match &self.config.auth {
            InterfaceAuthCfg::Null => PacketHdrAuth::Null,
            InterfaceAuthCfg::Simple { key } => {
                PacketHdrAuth::Simple(auth::simple_password(key))
            }
            InterfaceAuthCfg::Cryptographic { key_id, .. } => {
                // The sequence number is set right before transmission.
                PacketHdrAuth::Cryptographic {
                    key_id: *key_id,
                    auth_len: MD5_DIGEST_LENGTH,
                    seqno: 0,
                }
            }
        }
    }

    // Returns the keying material used for cryptographic authentication.
    pub(crate) fn auth_ctx(&self) -> Option<AuthCtx> {
        match &self.config.auth {
            InterfaceAuthCfg::Cryptographic { key_id, key } => {
                Some(AuthCtx::new(*key_id, key.clone()))
            }
            _ => None,
        }
    }

    pub(crate) fn packet_hdr(
        &self,
        pkt_type: PacketType,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> PacketHdr {
        PacketHdr::new(
            pkt_type,
            instance.state.router_id,
            area.area_id,
            self.packet_hdr_auth(),
        )
    }

    // Enqueues packet for network transmission.
    pub(crate) fn send_packet(
        &self,
        instance: &InstanceUpView<'_>,
        dst: SmallVec<[Ipv4Addr; 4]>,
        packet: Packet,
    ) -> Option<NetTxPacketMsg> {
        let src = self.state.src_addr?;
        if dst.is_empty() {
            return None;
        }

        let msg = NetTxPacketMsg {
            ifname: self.name.clone(),
            src,
            dst,
            packet,
            auth: self.auth_ctx(),
        };
        instance.tx.protocol_output.send_packet(msg.clone());
        Some(msg)
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl InterfaceSys {
    const DEFAULT_MTU: u16 = 1500;
}

impl Default for InterfaceSys {
    fn default() -> InterfaceSys {
        InterfaceSys {
            operative: false,
            loopback: false,
            primary_addr: None,
            mtu: Self::DEFAULT_MTU,
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::ism::*;
    use super::*;

    fn net_id(addr: [u8; 4]) -> NeighborNetId {
        NeighborNetId::from(Ipv4Addr::from(addr))
    }

    fn candidate(
        addr: [u8; 4],
        router_id: [u8; 4],
        priority: u8,
        dr: Option<NeighborNetId>,
        bdr: Option<NeighborNetId>,
    ) -> DrCandidate {
        DrCandidate {
            router_id: Ipv4Addr::from(router_id),
            net_id: net_id(addr),
            dr,
            bdr,
            priority,
        }
    }

    fn ctx(if_type: InterfaceType, priority: u8) -> Context {
        Context {
            if_type,
            priority,
            election: None,
        }
    }

    #[test]
    fn interface_up() {
        let (state, actions) = transition(
            State::Down,
            &Event::InterfaceUp,
            &ctx(InterfaceType::PointToPoint, 1),
        )
        .unwrap();
        assert_eq!(state, Some(State::PointToPoint));
        assert_eq!(actions.as_slice(), [Action::Start]);

        let (state, actions) = transition(
            State::Down,
            &Event::InterfaceUp,
            &ctx(InterfaceType::Broadcast, 0),
        )
        .unwrap();
        assert_eq!(state, Some(State::DrOther));
        assert_eq!(actions.as_slice(), [Action::Start]);

        let (state, actions) = transition(
            State::Down,
            &Event::InterfaceUp,
            &ctx(InterfaceType::NonBroadcast, 1),
        )
        .unwrap();
        assert_eq!(state, Some(State::Waiting));
        assert_eq!(
            actions.as_slice(),
            [Action::Start, Action::StartWaitTimer, Action::NbmaStart]
        );
    }

    #[test]
    fn waiting_events() {
        let mut ctx = ctx(InterfaceType::Broadcast, 1);
        let (state, actions) =
            transition(State::Waiting, &Event::NbrChange, &ctx).unwrap();
        assert_eq!(state, None);
        assert!(actions.is_empty());

        // An election result is required to leave the Waiting state.
        assert!(transition(State::Waiting, &Event::WaitTimer, &ctx).is_none());

        let election = Election {
            dr: Some(net_id([10, 0, 0, 1])),
            bdr: None,
            state: State::Dr,
        };
        ctx.election = Some(election);
        let (state, actions) =
            transition(State::Waiting, &Event::BackupSeen, &ctx).unwrap();
        assert_eq!(state, Some(State::Dr));
        assert_eq!(
            actions.as_slice(),
            [Action::StopWaitTimer, Action::ApplyElection(election)]
        );
    }

    #[test]
    fn loopback_events() {
        let ctx = ctx(InterfaceType::Broadcast, 1);
        let (state, actions) =
            transition(State::Dr, &Event::LoopInd, &ctx).unwrap();
        assert_eq!(state, Some(State::Loopback));
        assert_eq!(
            actions.as_slice(),
            [Action::Stop(InterfaceInactiveReason::LoopedBack)]
        );

        let (state, _) =
            transition(State::Loopback, &Event::UnloopInd, &ctx).unwrap();
        assert_eq!(state, Some(State::Down));
        assert!(transition(State::Dr, &Event::UnloopInd, &ctx).is_none());
        assert!(transition(State::Down, &Event::WaitTimer, &ctx).is_none());
    }

    #[test]
    fn higher_router_id_wins() {
        // Both routers just left the Waiting state and nobody declared itself
        // DR or BDR yet.
        let a = net_id([10, 0, 0, 1]);
        let b = net_id([10, 0, 0, 2]);
        let candidates = [
            candidate([10, 0, 0, 2], [2, 2, 2, 2], 1, None, None),
            candidate([10, 0, 0, 1], [1, 1, 1, 1], 1, None, None),
        ];

        // Router B elects itself DR and router A as BDR.
        let election = elect(b, None, None, &candidates);
        assert_eq!(election.dr, Some(b));
        assert_eq!(election.bdr, Some(a));
        assert_eq!(election.state, State::Dr);

        // Once router B declares itself DR, router A becomes the BDR.
        let candidates = [
            candidate([10, 0, 0, 1], [1, 1, 1, 1], 1, Some(b), Some(b)),
            candidate([10, 0, 0, 2], [2, 2, 2, 2], 1, Some(b), Some(a)),
        ];
        let election = elect(a, Some(b), Some(b), &candidates);
        assert_eq!(election.dr, Some(b));
        assert_eq!(election.bdr, Some(a));
        assert_eq!(election.state, State::Backup);
    }

    #[test]
    fn election_is_idempotent() {
        let myself = net_id([10, 0, 0, 3]);
        let mut candidates = vec![
            candidate([10, 0, 0, 3], [3, 3, 3, 3], 1, None, None),
            candidate([10, 0, 0, 1], [1, 1, 1, 1], 5, None, None),
            candidate([10, 0, 0, 2], [2, 2, 2, 2], 5, None, None),
            candidate([10, 0, 0, 4], [4, 4, 4, 4], 1, None, None),
        ];
        let first = elect(myself, None, None, &candidates);
        assert_eq!(first, elect(myself, None, None, &candidates));

        // Feeding the outcome back yields the same result.
        candidates[0].dr = first.dr;
        candidates[0].bdr = first.bdr;
        let second = elect(myself, first.dr, first.bdr, &candidates);
        assert_eq!(first, second);
        assert_eq!(second.dr, Some(net_id([10, 0, 0, 2])));
        assert_eq!(second.state, State::DrOther);
    }

    #[test]
    fn election_keeps_current_dr() {
        // A router with higher priority doesn't preempt the current DR.
        let dr = net_id([10, 0, 0, 1]);
        let candidates = [
            candidate([10, 0, 0, 1], [1, 1, 1, 1], 1, Some(dr), None),
            candidate([10, 0, 0, 9], [9, 9, 9, 9], 200, Some(dr), None),
        ];
        let myself = net_id([10, 0, 0, 9]);
        let election = elect(myself, Some(dr), None, &candidates);
        assert_eq!(election.dr, Some(dr));
        assert_eq!(election.bdr, Some(myself));
        assert_eq!(election.state, State::Backup);
    }

    #[test]
    fn election_without_candidates() {
        let myself = net_id([10, 0, 0, 1]);
        let election = elect(myself, None, None, &[]);
        assert_eq!(election.dr, None);
        assert_eq!(election.bdr, None);
        assert_eq!(election.state, State::DrOther);
    }
}
