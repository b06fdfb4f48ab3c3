//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use nsm::{Action, Event, State};
use ospf_utils::timer::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{Arena, NeighborId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{LsaEntry, LsaOriginateEvent, lsa_type_is_valid};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{DbDesc, DbDescFlags, Options, PacketType};
use crate::tasks::messages::input::RxmtIntervalMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::{observer, output, tasks};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<NetTxPacketMsg>,
    pub auth_seqno: HashMap<PacketType, u32>,

    pub event_count: u32,
    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

// Address used to identify a neighbor on a multi-access network.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(Ipv4Addr);

#[derive(Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Neighbor state machine.
//
// The transition function is free of side effects. The actions it returns are
// carried out by `Neighbor::fsm`.
pub mod nsm {
    use serde::{Deserialize, Serialize};
    use smallvec::{SmallVec, smallvec};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Action {
        // Send a Hello packet to the neighbor (NBMA only).
        SendHello,
        // Start or restart the Inactivity Timer.
        InactivityTimerReset,
        InactivityTimerStop,
        // Increment the DD sequence number, declare ourselves master and start
        // sending empty Database Description packets.
        StartExchangeNegotiation,
        // List the contents of the LSDB in the Database summary list.
        ListDatabaseSummary,
        // Clear all LSA lists and stop the retransmission timers.
        ResetAdjacency,
    }

    // Inputs that influence the outcome of a transition.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Context {
        // Whether an adjacency should be established with the neighbor.
        pub need_adjacency: bool,
        // Whether the Link state request list is non-empty.
        pub requests_pending: bool,
    }

    pub type Actions = SmallVec<[Action; 4]>;

    // Computes the NSM transition as specified in Section 10.3 of RFC 2328.
    //
    // Returns `None` for unexpected events. Otherwise, returns the new state
    // (`None` when the state doesn't change) and the actions to perform.
    pub fn transition(
        state: State,
        event: &Event,
        ctx: &Context,
    ) -> Option<(Option<State>, Actions)> {
        let transition = match (state, event) {
            // NSM (state, event) -> (Action, new state)
            (State::Down, Event::Start) => (
                Some(State::Attempt),
                smallvec![Action::SendHello, Action::InactivityTimerReset],
            ),
            // NSM (state, event) -> (Action, new state)
            (State::Attempt | State::Down, Event::HelloRcvd) => {
                (Some(State::Init), smallvec![Action::InactivityTimerReset])
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => (None, smallvec![Action::InactivityTimerReset]),
            // NSM (state, event) -> (Action, new state)
            (State::Init, Event::TwoWayRcvd)
            | (State::TwoWay, Event::AdjOk) => {
                if ctx.need_adjacency {
                    (
                        Some(State::ExStart),
                        smallvec![Action::StartExchangeNegotiation],
                    )
                } else {
                    (Some(State::TwoWay), smallvec![])
                }
            }
            // NSM (state, event) -> (Action, new state)
            (State::ExStart, Event::NegotiationDone) => (
                Some(State::Exchange),
                smallvec![Action::ListDatabaseSummary],
            ),
            // NSM (state, event) -> (Action, new state)
            (State::Exchange, Event::ExchangeDone) => {
                if ctx.requests_pending {
                    // Wait for outstanding LS Requests to be responded.
                    (Some(State::Loading), smallvec![])
                } else {
                    (Some(State::Full), smallvec![])
                }
            }
            // NSM (state, event) -> (Action, new state)
            (State::Loading, Event::LoadingDone) => {
                (Some(State::Full), smallvec![])
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::ExStart | State::Exchange | State::Loading | State::Full,
                Event::AdjOk,
            ) => {
                if ctx.need_adjacency {
                    (None, smallvec![])
                } else {
                    (Some(State::TwoWay), smallvec![Action::ResetAdjacency])
                }
            }
            // NSM (state, event) -> (Action, new state)
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => (
                Some(State::ExStart),
                smallvec![
                    Action::ResetAdjacency,
                    Action::StartExchangeNegotiation
                ],
            ),
            // NSM (state, event) -> (Action, new state)
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => (
                Some(State::Down),
                smallvec![Action::ResetAdjacency, Action::InactivityTimerStop],
            ),
            // NSM (state, event) -> (Action, new state)
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => (Some(State::Init), smallvec![Action::ResetAdjacency]),
            // NSM (state, event) -> (Action, new state)
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::TwoWayRcvd,
            )
            | (State::Init, Event::OneWayRcvd) => {
                // No action required.
                (None, smallvec![])
            }
            _ => return None,
        };

        Some(transition)
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        // Initialize the DD Sequence Number.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                // Random value.
                rand::random::<u32>()
            }
            #[cfg(feature = "deterministic")]
            {
                // Fixed value for deterministic test results.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            auth_seqno: Default::default(),
            event_count: 0,
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    pub(crate) fn fsm(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let ctx = nsm::Context {
            need_adjacency: iface.need_adjacency(self),
            requests_pending: !self.lists.ls_request.is_empty()
                || !self.lists.ls_request_pending.is_empty(),
        };
        let Some((new_state, actions)) =
            nsm::transition(self.state, &event, &ctx)
        else {
            Error::NsmUnexpectedEvent(self.router_id, self.state, event).log();
            return;
        };

        for action in actions {
            match action {
                Action::SendHello => {
                    instance.tx.protocol_input.send_hello(
                        area.id,
                        iface.id,
                        Some(self.src),
                    );
                }
                Action::InactivityTimerReset => {
                    self.inactivity_timer_reset(iface, area, instance);
                }
                Action::InactivityTimerStop => {
                    self.tasks.inactivity_timer = None;
                }
                Action::StartExchangeNegotiation => {
                    self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                    self.dd_flags.insert(
                        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
                    );
                    output::send_dbdesc(self, iface, area, instance);
                }
                Action::ListDatabaseSummary => {
                    self.list_database_summary(
                        iface,
                        area,
                        instance,
                        lsa_entries,
                    );
                }
                Action::ResetAdjacency => {
                    self.reset_adjacency();
                }
            }
        }

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state
        {
            self.fsm_state_change(iface, area, instance, event, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        event: Event,
        new_state: State,
    ) {
        let protocol_input = &instance.tx.protocol_input;

        // Gaining or losing bidirectional communication affects the DR
        // election.
        let was_bidir = self.state >= State::TwoWay;
        let is_bidir = new_state >= State::TwoWay;
        if was_bidir != is_bidir
            && iface.is_broadcast_or_nbma()
            && !iface.is_down()
        {
            protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        // Full adjacencies are advertised in the Router-LSA, and in the
        // Network-LSA when we're DR.
        if new_state == State::Full || self.state == State::Full {
            protocol_input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // Configured NBMA neighbors that went silent keep being polled at
        // PollInterval. Polling stops as soon as they come back.
        if iface.config.if_type == InterfaceType::NonBroadcast {
            let poll_interval = iface
                .config
                .static_nbrs
                .get(&self.src)
                .map(|snbr| snbr.poll_interval);
            if new_state == State::Down && event == Event::InactivityTimer {
                if let Some(poll_interval) = poll_interval {
                    iface.nbma_poll_interval_start(
                        area,
                        instance,
                        self.src,
                        poll_interval,
                    );
                }
            } else if self.state == State::Down {
                iface.nbma_poll_interval_stop(self.src);
            }
        }

        Debug::NsmTransition(self.router_id, &self.state, &new_state).log();
        let old_state = self.state;
        self.state = new_state;
        observer::nbr_state_change(instance, iface, self, old_state);

        self.event_count += 1;
    }

    // Lists the contents of the entire LSDB in the Database summary list.
    //
    // MaxAge LSAs are added to the Link state retransmission list instead.
    fn list_database_summary(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        for lse in area
            .state
            .lsdb
            .iter(lsa_entries)
            .chain(instance.state.lsdb.iter(lsa_entries))
            .map(|(_, lse)| lse)
            // Filter out unneeded LSAs.
            .filter(|lse| {
                lsa_type_is_valid(
                    Some(area.config.area_type),
                    lse.data.hdr.lsa_type,
                )
            })
        {
            let lsa_key = lse.data.hdr.key();
            if lse.data.hdr.is_maxage() {
                self.lists.ls_rxmt.insert(lsa_key, lse.data.clone());
                self.rxmt_lsupd_start_check(iface, area, instance);
            } else {
                self.lists.db_summary.insert(lsa_key, lse.data.clone());
            }
        }

        self.dd_flags.remove(DbDescFlags::I);
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        // Wait until the whole batch of outstanding requests is answered.
        if !self.lists.ls_request_pending.is_empty() {
            return;
        }
        self.rxmt_lsreq_stop();

        if !self.lists.ls_request.is_empty() {
            output::send_lsreq(self, iface, area, instance);
        } else if self.state == State::Loading {
            instance.tx.protocol_input.nsm_event(
                area.id,
                iface.id,
                self.id,
                Event::LoadingDone,
            );
        }
    }

    fn reset_adjacency(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.lists = Default::default();
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &DbDesc) -> bool {
        self.last_rcvd_dbdesc.as_ref().is_some_and(|last| {
            (last.options, last.dd_flags, last.dd_seq_no)
                == (dbdesc.options, dbdesc.dd_flags, dbdesc.dd_seq_no)
        })
    }

    pub(crate) fn network_id(&self) -> NeighborNetId {
        NeighborNetId(self.src)
    }

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = tasks::nsm_inactivity_timer(self, iface, area, instance);
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        match &mut self.tasks.inactivity_timer {
            Some(timer) => timer.reset(None),
            None => self.inactivity_timer_start(iface, area, instance),
        }
    }

    fn rxmt_task(
        &self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        packet_type: RxmtPacketType,
    ) -> IntervalTask {
        let msg = RxmtIntervalMsg {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
            packet_type,
        };
        tasks::packet_rxmt_interval(iface, msg, instance)
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let packet_type = RxmtPacketType::DbDesc;
        let task = self.rxmt_task(iface, area, instance, packet_type);
        self.tasks.rxmt_dbdesc = Some(task);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let packet_type = RxmtPacketType::LsRequest;
        let task = self.rxmt_task(iface, area, instance, packet_type);
        self.tasks.rxmt_lsreq = Some(task);
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if self.lists.ls_rxmt.is_empty() || self.tasks.rxmt_lsupd.is_some() {
            return;
        }
        let packet_type = RxmtPacketType::LsUpdate;
        let task = self.rxmt_task(iface, area, instance, packet_type);
        self.tasks.rxmt_lsupd = Some(task);
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        if self.lists.ls_rxmt.is_empty() {
            self.tasks.rxmt_lsupd = None;
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}

// ===== impl NeighborNetId =====

impl NeighborNetId {
    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

impl std::fmt::Display for NeighborNetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Ipv4Addr> for NeighborNetId {
    fn from(addr: Ipv4Addr) -> NeighborNetId {
        NeighborNetId(addr)
    }
}

// ===== unit tests =====
