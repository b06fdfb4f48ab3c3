//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use itertools::Itertools;
use ospf_utils::ip::Ipv4NetworkExt;
use ospf_utils::timer::{IntervalTask, TimeoutTask, TimerQueue};

use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, InterfaceId, InterfaceIndex, LsaEntryId,
    Lsdb, LsdbId, NeighborId,
};
use crate::config::{AreaCfg, InstanceCfg, InterfaceCfg};
use crate::debug::{Debug, InterfaceInactiveReason, LsaFlushReason};
use crate::error::Error;
use crate::interface::{Interface, InterfaceSys, ism};
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, nsm};
use crate::network::Transport;
use crate::observer::{Notification, Observer};
use crate::packet::lsa::{Lsa, LsaBody, LsaKey, LsaScope};
use crate::packet::{Options, Packet, PacketHdrAuth};
use crate::tasks::messages::ProtocolInputMsg;
use crate::tasks::messages::input::{
    IsmEventMsg, LsaFlushMsg, LsaOrigCheckMsg, LsaOrigEventMsg, NsmEventMsg,
    ProtocolMsg, SendHelloMsg, SendLsUpdateMsg,
};
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::{events, lsdb, observer, output};

// OSPFv2 routing instance.
//
// The instance is driven entirely by its host: packets are fed through
// `process_packet`, time moves forward through `advance_clock`, and outgoing
// packets are handed to the configured `Transport`. Every host call runs to
// completion, including all the events it triggers, before returning.
pub struct Instance {
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance arenas.
    pub arenas: InstanceArenas,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
    // Packet transmission service.
    transport: Box<dyn Transport>,
    // Registered observers.
    observers: Vec<Box<dyn Observer>>,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb,
    // Routes redistributed into OSPF.
    pub redistributed: BTreeMap<Ipv4Network, RedistributedRoute>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    // Authentication non-decreasing sequence number.
    pub auth_seqno: u32,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

#[derive(Debug, Default)]
pub struct InstanceChannelsTx {
    pub protocol_input: ProtocolInputChannelsTx,
    pub protocol_output: ProtocolOutputChannelsTx,
}

// Deferred events and timers.
//
// Events raised while processing another event are queued and processed in
// FIFO order once the current event is complete.
#[derive(Debug, Default)]
pub struct ProtocolInputChannelsTx {
    queue: RefCell<VecDeque<ProtocolInputMsg>>,
    timers: TimerQueue<ProtocolInputMsg>,
}

// Packets and notifications waiting to be delivered to the host.
#[derive(Debug, Default)]
pub struct ProtocolOutputChannelsTx {
    net: RefCell<VecDeque<NetTxPacketMsg>>,
    notif: RefCell<VecDeque<Notification>>,
}

pub struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx,
}

// Route redistributed into OSPF as an AS-external-LSA.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RedistributedRoute {
    pub metric: u32,
    pub metric_type_e2: bool,
    pub tag: u32,
}

// Neighbor summary returned by `Instance::neighbors`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NeighborInfo {
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub priority: u8,
    pub state: nsm::State,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub ls_rxmt_count: usize,
    pub ls_request_count: usize,
    pub db_summary_count: usize,
}

// Instance-wide LSA counters returned by `Instance::statistics`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InstanceStatistics {
    // LSA instances originated by this router, including refreshes.
    pub orig_lsa_count: u32,
    // Newer LSA instances accepted from neighbors.
    pub rx_lsa_count: u32,
}

// Interface summary returned by `Instance::interface_state`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InterfaceInfo {
    pub state: ism::State,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(config: InstanceCfg, transport: Box<dyn Transport>) -> Instance {
        Instance {
            config,
            state: None,
            arenas: Default::default(),
            tx: Default::default(),
            transport,
            observers: Default::default(),
        }
    }

    // Registers an observer of protocol events.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    // Returns the current value of the logical clock.
    pub fn now(&self) -> Duration {
        self.tx.protocol_input.now()
    }

    pub fn area_add(
        &mut self,
        area_id: Ipv4Addr,
        config: AreaCfg,
    ) -> Result<(), Error> {
        let (_, area) = self.arenas.areas.insert(area_id)?;
        area.config = config;
        let area_id = area.id;

        // Originate the area's LSAs if the instance is already running.
        if let Some((instance, _)) = self.as_up() {
            instance
                .tx
                .protocol_input
                .lsa_orig_event(LsaOriginateEvent::AreaStart { area_id });
            self.process_deferred();
        }

        Ok(())
    }

    pub fn interface_add(
        &mut self,
        area_id: Ipv4Addr,
        ifname: &str,
        config: InterfaceCfg,
    ) -> Result<(), Error> {
        if interface_lookup(&self.arenas, ifname).is_ok() {
            return Err(Error::InterfaceExists(ifname.to_owned()));
        }

        let (area_idx, area) = self
            .arenas
            .areas
            .get_mut_by_area_id(area_id)
            .ok_or(Error::AreaNotFound(area_id))?;
        let (iface_idx, iface) =
            area.interfaces.insert(&mut self.arenas.interfaces, ifname)?;
        iface.config = config;

        self.interface_sync(area_idx, iface_idx);
        Ok(())
    }

    // Updates the interface's operational data as reported by the host.
    //
    // Changes to the primary address restart the interface.
    pub fn interface_update(
        &mut self,
        ifname: &str,
        system: InterfaceSys,
    ) -> Result<(), Error> {
        let (area_idx, iface_idx) = interface_lookup(&self.arenas, ifname)?;

        if let Some((instance, arenas)) = self.as_up() {
            let area = &arenas.areas[area_idx];
            let iface = &mut arenas.interfaces[iface_idx];
            if iface.system.primary_addr != system.primary_addr
                && !iface.is_down()
            {
                let reason = InterfaceInactiveReason::Resetting;
                iface.fsm(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                    ism::Event::InterfaceDown(reason),
                );
            }
        }
        self.arenas.interfaces[iface_idx].system = system;

        self.interface_sync(area_idx, iface_idx);
        Ok(())
    }

    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }

        let router_id = self.config.router_id;
        Debug::InstanceStart(router_id).log();

        // Store instance initial state.
        self.state = Some(InstanceState::new(router_id));

        // Iterate over all configured areas.
        if let Some((instance, arenas)) = self.as_up() {
            for area in arenas.areas.iter() {
                // Try to start interfaces.
                for iface_idx in area.interfaces.indexes() {
                    let iface = &mut arenas.interfaces[iface_idx];
                    iface.update(
                        area,
                        &instance,
                        &mut arenas.neighbors,
                        &arenas.lsa_entries,
                    );
                }

                // Originate the area's LSAs.
                instance.tx.protocol_input.lsa_orig_event(
                    LsaOriginateEvent::AreaStart { area_id: area.id },
                );
            }
        }

        self.process_deferred();
    }

    pub fn stop(&mut self) {
        let Some((mut instance, arenas)) = self.as_up() else {
            return;
        };

        Debug::InstanceStop.log();

        // Flush all self-originated LSAs.
        lsdb::flush_all_self_originated(&mut instance, arenas);

        for area in arenas.areas.iter() {
            for iface_idx in area.interfaces.indexes() {
                let iface = &mut arenas.interfaces[iface_idx];
                if iface.is_down() || iface.is_passive() {
                    continue;
                }

                // Send pending LS Updates.
                output::send_lsupd(
                    None,
                    iface,
                    area,
                    &instance,
                    &mut arenas.neighbors,
                );

                // Stop interface.
                let reason = InterfaceInactiveReason::InstanceDown;
                iface.fsm(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                    ism::Event::InterfaceDown(reason),
                );
            }
        }

        // Deliver the final packets and notifications. Pending events are
        // meaningless from now on.
        self.flush_output();
        self.tx.protocol_input.queue.borrow_mut().clear();

        // Clear all LSDBs.
        for area in self.arenas.areas.iter_mut() {
            area.state.lsdb.clear(&mut self.arenas.lsa_entries);
        }
        if let Some(state) = &mut self.state {
            state.lsdb.clear(&mut self.arenas.lsa_entries);
        }

        // Clear instance state.
        self.state = None;
    }

    // Processes a packet received on the given interface.
    pub fn process_packet(
        &mut self,
        ifname: &str,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        packet: Packet,
    ) -> Result<(), Error> {
        let (area_idx, iface_idx) = interface_lookup(&self.arenas, ifname)?;
        let (mut instance, arenas) =
            self.as_up().ok_or(Error::InstanceInactive)?;
        let area_id = arenas.areas[area_idx].id;
        let iface_id = arenas.interfaces[iface_idx].id;

        if let Err(error) = events::process_packet(
            &mut instance,
            arenas,
            area_id,
            iface_id,
            src,
            dst,
            packet,
        ) {
            packet_error(&instance, ifname, src, &error);
        }

        self.process_deferred();
        Ok(())
    }

    // Decodes and processes a packet received on the given interface.
    pub fn process_packet_raw(
        &mut self,
        ifname: &str,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        mut data: Bytes,
    ) -> Result<(), Error> {
        let (_, iface_idx) = interface_lookup(&self.arenas, ifname)?;
        let auth = self.arenas.interfaces[iface_idx].auth_ctx();

        match Packet::decode(&mut data, auth.as_ref()) {
            Ok(packet) => self.process_packet(ifname, src, dst, packet),
            Err(error) => {
                let (instance, _) =
                    self.as_up().ok_or(Error::InstanceInactive)?;
                packet_error(&instance, ifname, src, &error.into());
                self.flush_output();
                Ok(())
            }
        }
    }

    // Moves the logical clock forward to `now`, processing every timer that
    // expires in between in deadline order.
    pub fn advance_clock(&mut self, now: Duration) {
        while let Some(msg) = self.tx.protocol_input.timers.pop_expired(now) {
            self.process_protocol_msg(msg);
            self.process_deferred();
        }
    }

    // Returns the deadline of the next timer to expire, if any.
    pub fn next_timer_deadline(&self) -> Option<Duration> {
        self.tx.protocol_input.timers.next_deadline()
    }

    // Starts redistributing the given route as an AS-external-LSA.
    pub fn redistribute_add(
        &mut self,
        prefix: Ipv4Network,
        route: RedistributedRoute,
    ) -> Result<(), Error> {
        let (instance, _) = self.as_up().ok_or(Error::InstanceInactive)?;
        let prefix = prefix.apply_mask();
        instance.state.redistributed.insert(prefix, route);
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::RedistributeChange { prefix });
        self.process_deferred();
        Ok(())
    }

    // Stops redistributing the given route.
    pub fn redistribute_del(
        &mut self,
        prefix: Ipv4Network,
    ) -> Result<(), Error> {
        let (instance, _) = self.as_up().ok_or(Error::InstanceInactive)?;
        let prefix = prefix.apply_mask();
        if instance.state.redistributed.remove(&prefix).is_some() {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::RedistributeChange { prefix },
            );
        }
        self.process_deferred();
        Ok(())
    }

    pub fn interface_state(
        &self,
        ifname: &str,
    ) -> Result<InterfaceInfo, Error> {
        let (_, iface_idx) = interface_lookup(&self.arenas, ifname)?;
        let iface = &self.arenas.interfaces[iface_idx];
        Ok(InterfaceInfo {
            state: iface.state.ism_state,
            dr: iface.state.dr.map(|net_id| net_id.get()),
            bdr: iface.state.bdr.map(|net_id| net_id.get()),
        })
    }

    pub fn neighbors(&self, ifname: &str) -> Result<Vec<NeighborInfo>, Error> {
        let (_, iface_idx) = interface_lookup(&self.arenas, ifname)?;
        let iface = &self.arenas.interfaces[iface_idx];
        let neighbors = iface
            .state
            .neighbors
            .iter(&self.arenas.neighbors)
            .map(|nbr| NeighborInfo {
                router_id: nbr.router_id,
                src: nbr.src,
                priority: nbr.priority,
                state: nbr.state,
                dr: nbr.dr.map(|net_id| net_id.get()),
                bdr: nbr.bdr.map(|net_id| net_id.get()),
                ls_rxmt_count: nbr.lists.ls_rxmt.len(),
                ls_request_count: nbr.lists.ls_request.len()
                    + nbr.lists.ls_request_pending.len(),
                db_summary_count: nbr.lists.db_summary.len(),
            })
            .collect_vec();
        Ok(neighbors)
    }

    pub fn statistics(&self) -> Option<InstanceStatistics> {
        let state = self.state.as_ref()?;
        Some(InstanceStatistics {
            orig_lsa_count: state.orig_lsa_count,
            rx_lsa_count: state.rx_lsa_count,
        })
    }

    // Returns all LSAs from the given area's LSDB, ordered by their keys.
    pub fn lsdb_area(
        &self,
        area_id: Ipv4Addr,
    ) -> Result<impl Iterator<Item = &Arc<Lsa>> + '_, Error> {
        let (_, area) = self
            .arenas
            .areas
            .get_by_area_id(area_id)
            .ok_or(Error::AreaNotFound(area_id))?;
        Ok(area
            .state
            .lsdb
            .iter(&self.arenas.lsa_entries)
            .map(|(_, lse)| &lse.data))
    }

    // Returns all AS-scope LSAs, ordered by their keys.
    pub fn lsdb_as(
        &self,
    ) -> Result<impl Iterator<Item = &Arc<Lsa>> + '_, Error> {
        let state = self.state.as_ref().ok_or(Error::InstanceInactive)?;
        Ok(state
            .lsdb
            .iter(&self.arenas.lsa_entries)
            .map(|(_, lse)| &lse.data))
    }

    // Looks up an LSA. AS-scope LSAs are looked up in the instance's LSDB
    // regardless of the provided area.
    pub fn lsa_get(
        &self,
        area_id: Ipv4Addr,
        key: &LsaKey,
    ) -> Option<&Arc<Lsa>> {
        let lsdb = match key.lsa_type.scope() {
            LsaScope::As => &self.state.as_ref()?.lsdb,
            LsaScope::Area | LsaScope::Unknown => {
                let (_, area) = self.arenas.areas.get_by_area_id(area_id)?;
                &area.state.lsdb
            }
        };
        lsdb.get(&self.arenas.lsa_entries, key)
            .map(|(_, lse)| &lse.data)
    }

    // Returns whether the given LSA is waiting to be acknowledged by any
    // neighbor.
    pub fn is_on_any_rxmt_list(&self, key: &LsaKey) -> bool {
        self.arenas
            .neighbors
            .iter()
            .any(|(_, nbr)| nbr.lists.ls_rxmt.contains_key(key))
    }

    pub fn has_any_neighbor_in_states(&self, states: &[nsm::State]) -> bool {
        self.arenas
            .neighbors
            .iter()
            .any(|(_, nbr)| states.contains(&nbr.state))
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut InstanceArenas)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                config: &self.config,
                state,
                tx: &self.tx,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }

    // Raises the ISM events corresponding to the interface's current
    // operational status.
    fn interface_sync(
        &mut self,
        area_idx: AreaIndex,
        iface_idx: InterfaceIndex,
    ) {
        if let Some((instance, arenas)) = self.as_up() {
            let area = &arenas.areas[area_idx];
            let iface = &mut arenas.interfaces[iface_idx];
            iface.update(
                area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
            self.process_deferred();
        }
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) = process_protocol_msg(&mut instance, arenas, msg)
        {
            error.log();
        }
    }

    // Processes all deferred events, then delivers the resulting packets and
    // notifications to the host.
    fn process_deferred(&mut self) {
        while let Some(msg) = self.tx.protocol_input.dequeue() {
            self.process_protocol_msg(msg);
        }
        self.flush_output();
    }

    fn flush_output(&mut self) {
        loop {
            let msg = self.tx.protocol_output.net.borrow_mut().pop_front();
            let Some(mut msg) = msg else {
                break;
            };

            // Stamp the cryptographic sequence number.
            if let PacketHdrAuth::Cryptographic { seqno, .. } =
                &mut msg.packet.hdr_mut().auth
                && let Some(state) = &mut self.state
            {
                state.auth_seqno = state.auth_seqno.wrapping_add(1);
                *seqno = state.auth_seqno;
            }

            Debug::PacketTx(&msg.ifname, &msg.dst, &msg.packet).log();
            for dst in &msg.dst {
                self.transport.send_packet(
                    &msg.ifname,
                    msg.src,
                    *dst,
                    &msg.packet,
                    msg.auth.as_ref(),
                );
            }
        }

        loop {
            let notif = self.tx.protocol_output.notif.borrow_mut().pop_front();
            let Some(notif) = notif else {
                break;
            };
            for observer in &mut self.observers {
                notif.deliver(observer.as_mut());
            }
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.stop();
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(router_id: Ipv4Addr) -> InstanceState {
        InstanceState {
            router_id,
            lsdb: Default::default(),
            redistributed: Default::default(),
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            auth_seqno: 0,
        }
    }
}

// ===== impl ProtocolInputChannelsTx =====

impl ProtocolInputChannelsTx {
    pub(crate) fn now(&self) -> Duration {
        self.timers.now()
    }

    pub(crate) fn timeout(
        &self,
        timeout: Duration,
        msg: ProtocolInputMsg,
    ) -> TimeoutTask {
        self.timers.timeout(timeout, msg)
    }

    pub(crate) fn interval(
        &self,
        interval: Duration,
        tick_on_start: bool,
        msg: ProtocolInputMsg,
    ) -> IntervalTask {
        self.timers.interval(interval, tick_on_start, msg)
    }

    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        self.enqueue(ProtocolMsg::IsmEvent(IsmEventMsg {
            area_id,
            iface_id,
            event,
        }));
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        self.enqueue(ProtocolMsg::NsmEvent(NsmEventMsg {
            area_id,
            iface_id,
            nbr_id,
            event,
        }));
    }

    pub(crate) fn send_hello(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        dst: Option<Ipv4Addr>,
    ) {
        self.enqueue(ProtocolMsg::SendHello(SendHelloMsg {
            area_id,
            iface_id,
            dst,
        }));
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        self.enqueue(ProtocolMsg::SendLsUpdate(SendLsUpdateMsg {
            area_id,
            iface_id,
            nbr_id,
        }));
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        self.enqueue(ProtocolMsg::LsaOrigEvent(LsaOrigEventMsg { event }));
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Options,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        self.enqueue(ProtocolMsg::LsaOrigCheck(LsaOrigCheckMsg {
            lsdb_id,
            options,
            lsa_id,
            lsa_body,
        }));
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        self.enqueue(ProtocolMsg::LsaFlush(LsaFlushMsg {
            lsdb_id,
            lse_id,
            reason,
        }));
    }

    fn enqueue(&self, msg: ProtocolInputMsg) {
        self.queue.borrow_mut().push_back(msg);
    }

    fn dequeue(&self) -> Option<ProtocolInputMsg> {
        self.queue.borrow_mut().pop_front()
    }
}

// ===== impl ProtocolOutputChannelsTx =====

impl ProtocolOutputChannelsTx {
    pub(crate) fn send_packet(&self, msg: NetTxPacketMsg) {
        self.net.borrow_mut().push_back(msg);
    }

    pub(crate) fn notify(&self, notif: Notification) {
        self.notif.borrow_mut().push_back(notif);
    }
}

// ===== helper functions =====

// Finds the area and interface corresponding to the given interface name.
fn interface_lookup(
    arenas: &InstanceArenas,
    ifname: &str,
) -> Result<(AreaIndex, InterfaceIndex), Error> {
    arenas
        .areas
        .indexes()
        .find_map(|area_idx| {
            let area = &arenas.areas[area_idx];
            area.interfaces
                .get_by_name(&arenas.interfaces, ifname)
                .map(|(iface_idx, _)| (area_idx, iface_idx))
        })
        .ok_or_else(|| Error::InterfaceNotFound(ifname.to_owned()))
}

// Logs a packet processing error and reports it to the observers.
fn packet_error(
    instance: &InstanceUpView<'_>,
    ifname: &str,
    src: Ipv4Addr,
    error: &Error,
) {
    error.log();

    match error {
        Error::InterfaceCfgError(_, _, pkt_type, cfg_error) => {
            observer::if_config_error(
                instance, ifname, src, *pkt_type, cfg_error,
            );
        }
        _ => {
            observer::packet_drop(instance, ifname, src, error);
        }
    }
}

fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Interface FSM event.
        ProtocolMsg::IsmEvent(msg) => events::process_ism_event(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.event,
        )?,
        // Neighbor FSM event.
        ProtocolMsg::NsmEvent(msg) => events::process_nsm_event(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.nbr_id,
            msg.event,
        )?,
        // Hello transmission.
        ProtocolMsg::SendHello(msg) => events::process_send_hello(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.dst,
        )?,
        // Free last sent/received Database Description packets.
        ProtocolMsg::DbDescFree(msg) => events::process_dbdesc_free(
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.nbr_id,
        )?,
        // Request to send LS Update.
        ProtocolMsg::SendLsUpdate(msg) => events::process_send_lsupd(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.nbr_id,
        )?,
        // Packet retransmission.
        ProtocolMsg::RxmtInterval(msg) => events::process_packet_rxmt(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
            msg.nbr_id,
            msg.packet_type,
        )?,
        // Delayed Ack timeout.
        ProtocolMsg::DelayedAck(msg) => events::process_delayed_ack_timeout(
            instance,
            arenas,
            msg.area_id,
            msg.iface_id,
        )?,
        // LSA origination event.
        ProtocolMsg::LsaOrigEvent(msg) => {
            events::process_lsa_orig_event(instance, arenas, msg.event)?
        }
        // LSA origination check.
        ProtocolMsg::LsaOrigCheck(msg) => events::process_lsa_orig_check(
            instance,
            arenas,
            msg.lsdb_id,
            msg.options,
            msg.lsa_id,
            msg.lsa_body,
        )?,
        // LSA delayed origination timer.
        ProtocolMsg::LsaOrigDelayed(msg) => {
            events::process_lsa_orig_delayed_timer(
                instance,
                arenas,
                msg.lsdb_id,
                msg.lsa_key,
            )?
        }
        // LSA flush.
        ProtocolMsg::LsaFlush(msg) => events::process_lsa_flush(
            instance,
            arenas,
            msg.lsdb_id,
            msg.lse_id,
            msg.reason,
        )?,
        // LSA refresh event.
        ProtocolMsg::LsaRefresh(msg) => events::process_lsa_refresh(
            instance,
            arenas,
            msg.lsdb_id,
            msg.lse_id,
        )?,
        // LSA MaxAge sweep interval.
        ProtocolMsg::LsdbMaxAgeSweep(msg) => {
            events::process_lsdb_maxage_sweep_interval(
                instance,
                arenas,
                msg.lsdb_id,
            )?
        }
    }

    Ok(())
}
