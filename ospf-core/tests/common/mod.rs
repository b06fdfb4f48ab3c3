//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use ipnetwork::Ipv4Network;
use ospf_core::config::{AreaCfg, InstanceCfg, InterfaceCfg};
use ospf_core::debug::LsaFlushReason;
use ospf_core::error::{Error, InterfaceCfgError};
use ospf_core::instance::{Instance, NeighborInfo};
use ospf_core::interface::{InterfaceSys, ism};
use ospf_core::neighbor::nsm;
use ospf_core::network::capture::{CaptureTransport, CapturedPacket};
use ospf_core::observer::Observer;
use ospf_core::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaTypeCode};
use ospf_core::packet::{
    DbDesc, DbDescFlags, Hello, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketHdrAuth, PacketType,
};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub const IFNAME: &str = "eth0";
pub const AREA_ID: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

// Protocol event recorded by the test observer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    IfState(ism::State),
    DrChange(Option<Ipv4Addr>, Option<Ipv4Addr>),
    NbrState(Ipv4Addr, nsm::State),
    LsaInstall(LsaKey, u32),
    LsaFlush(LsaKey, LsaFlushReason),
    PacketDrop(Ipv4Addr, String),
    IfConfigError(Ipv4Addr, PacketType, InterfaceCfgError),
}

// Observer that records every protocol event.
#[derive(Debug)]
pub struct Recorder(pub Rc<RefCell<Vec<Event>>>);

// Simulated router attached to the shared segment.
pub struct Router {
    pub instance: Instance,
    pub transport: CaptureTransport,
    pub events: Rc<RefCell<Vec<Event>>>,
    pub addr: Ipv4Network,
    pub connected: bool,
}

// Packet transmitted on the shared segment.
#[derive(Clone, Debug)]
pub struct TxRecord {
    pub time: Duration,
    pub from: Ipv4Addr,
    pub packet: CapturedPacket,
}

// Broadcast segment connecting a set of routers. All routers share the same
// logical clock and packets are delivered with no latency.
#[derive(Default)]
pub struct Network {
    pub routers: Vec<Router>,
    pub now: Duration,
    pub log: Vec<TxRecord>,
}

// Layer that keeps the messages of all warnings and errors.
struct WarnCollector(Arc<Mutex<Vec<String>>>);

#[derive(Default)]
struct MessageVisitor(String);

// ===== impl Recorder =====

impl Observer for Recorder {
    fn if_state_change(
        &mut self,
        _ifname: &str,
        _old_state: ism::State,
        new_state: ism::State,
    ) {
        self.0.borrow_mut().push(Event::IfState(new_state));
    }

    fn if_dr_change(
        &mut self,
        _ifname: &str,
        dr: Option<Ipv4Addr>,
        bdr: Option<Ipv4Addr>,
    ) {
        self.0.borrow_mut().push(Event::DrChange(dr, bdr));
    }

    fn nbr_state_change(
        &mut self,
        _ifname: &str,
        router_id: Ipv4Addr,
        _src: Ipv4Addr,
        _old_state: nsm::State,
        new_state: nsm::State,
    ) {
        self.0
            .borrow_mut()
            .push(Event::NbrState(router_id, new_state));
    }

    fn lsa_install(&mut self, _area_id: Option<Ipv4Addr>, lsa: &Lsa) {
        self.0
            .borrow_mut()
            .push(Event::LsaInstall(lsa.hdr.key(), lsa.hdr.seq_no));
    }

    fn lsa_flush(
        &mut self,
        _area_id: Option<Ipv4Addr>,
        lsa_hdr: &LsaHdr,
        reason: LsaFlushReason,
    ) {
        self.0
            .borrow_mut()
            .push(Event::LsaFlush(lsa_hdr.key(), reason));
    }

    fn packet_drop(&mut self, _ifname: &str, src: Ipv4Addr, reason: &Error) {
        self.0
            .borrow_mut()
            .push(Event::PacketDrop(src, reason.to_string()));
    }

    fn if_config_error(
        &mut self,
        _ifname: &str,
        src: Ipv4Addr,
        pkt_type: PacketType,
        error: &InterfaceCfgError,
    ) {
        self.0.borrow_mut().push(Event::IfConfigError(
            src,
            pkt_type,
            error.clone(),
        ));
    }
}

// ===== impl Router =====

impl Router {
    pub fn router_id(&self) -> Ipv4Addr {
        self.instance.config.router_id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    // Returns the states the given neighbor went through, in order.
    pub fn nbr_states(&self, nbr_router_id: Ipv4Addr) -> Vec<nsm::State> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::NbrState(router_id, state)
                    if *router_id == nbr_router_id =>
                {
                    Some(*state)
                }
                _ => None,
            })
            .collect()
    }

    pub fn neighbor(&self, nbr_router_id: Ipv4Addr) -> Option<NeighborInfo> {
        self.instance
            .neighbors(IFNAME)
            .unwrap()
            .into_iter()
            .find(|nbr| nbr.router_id == nbr_router_id)
    }

    pub fn lsa(&self, key: &LsaKey) -> Option<Arc<Lsa>> {
        self.instance.lsa_get(AREA_ID, key).cloned()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }
}

// ===== impl Network =====

impl Network {
    pub fn new() -> Network {
        init_tracing();
        Default::default()
    }

    // Adds a router to the segment. The router isn't started.
    pub fn add_router(
        &mut self,
        router_id: Ipv4Addr,
        addr: Ipv4Network,
        iface_cfg: InterfaceCfg,
    ) {
        let area_cfg = AreaCfg::default();
        self.add_router_in_area(router_id, addr, area_cfg, iface_cfg);
    }

    pub fn add_router_in_area(
        &mut self,
        router_id: Ipv4Addr,
        addr: Ipv4Network,
        area_cfg: AreaCfg,
        iface_cfg: InterfaceCfg,
    ) {
        let transport = CaptureTransport::default();
        let events = Rc::new(RefCell::new(vec![]));
        let mut instance = Instance::new(
            InstanceCfg { router_id },
            Box::new(transport.clone()),
        );
        instance.add_observer(Box::new(Recorder(events.clone())));
        instance.area_add(AREA_ID, area_cfg).unwrap();
        instance.interface_add(AREA_ID, IFNAME, iface_cfg).unwrap();
        instance
            .interface_update(
                IFNAME,
                InterfaceSys {
                    operative: true,
                    loopback: false,
                    primary_addr: Some(addr),
                    mtu: 1500,
                },
            )
            .unwrap();
        instance.advance_clock(self.now);

        self.routers.push(Router {
            instance,
            transport,
            events,
            addr,
            connected: true,
        });
    }

    pub fn start(&mut self) {
        for router in &mut self.routers {
            router.instance.start();
        }
        self.deliver();
    }

    pub fn router(&self, router_id: Ipv4Addr) -> &Router {
        self.routers
            .iter()
            .find(|router| router.router_id() == router_id)
            .unwrap()
    }

    pub fn router_mut(&mut self, router_id: Ipv4Addr) -> &mut Router {
        self.routers
            .iter_mut()
            .find(|router| router.router_id() == router_id)
            .unwrap()
    }

    // Detaches a router from the segment. Its instance keeps running.
    pub fn disconnect(&mut self, router_id: Ipv4Addr) {
        self.router_mut(router_id).connected = false;
    }

    // Moves the shared clock forward, firing every timer in deadline order
    // and delivering all packets they generate.
    pub fn advance(&mut self, duration: Duration) {
        let target = self.now + duration;
        loop {
            let next = self
                .routers
                .iter()
                .filter_map(|router| router.instance.next_timer_deadline())
                .min();
            match next {
                Some(deadline) if deadline <= target => {
                    self.now = self.now.max(deadline);
                    for router in &mut self.routers {
                        router.instance.advance_clock(deadline);
                    }
                    self.deliver();
                }
                _ => break,
            }
        }

        self.now = target;
        for router in &mut self.routers {
            router.instance.advance_clock(target);
        }
        self.deliver();
    }

    // Delivers all pending packets until the segment goes quiet.
    pub fn deliver(&mut self) {
        loop {
            let mut pending = vec![];
            for router in &self.routers {
                let from = router.router_id();
                for packet in router.transport.take() {
                    if router.connected {
                        pending.push((from, packet));
                    }
                }
            }
            if pending.is_empty() {
                break;
            }

            for (from, packet) in pending {
                let data = packet.packet.encode(packet.auth.as_ref());
                for router in &mut self.routers {
                    if router.router_id() == from
                        || !router.connected
                        || !router.instance.is_active()
                    {
                        continue;
                    }
                    if !packet.dst.is_multicast()
                        && packet.dst != router.addr.ip()
                    {
                        continue;
                    }
                    router
                        .instance
                        .process_packet_raw(
                            IFNAME,
                            packet.src,
                            packet.dst,
                            data.clone(),
                        )
                        .unwrap();
                }
                self.log.push(TxRecord {
                    time: self.now,
                    from,
                    packet,
                });
            }
        }
    }

    // Hands a crafted packet to the given router, then delivers whatever it
    // sends in response. `src` is the packet's IP source address.
    pub fn inject(
        &mut self,
        to: Ipv4Addr,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        packet: Packet,
    ) {
        self.router_mut(to)
            .instance
            .process_packet(IFNAME, src, dst, packet)
            .unwrap();
        self.deliver();
    }

    // Returns the LS Updates sent by the given router that carry the given
    // LSA instance.
    pub fn lsupd_tx(
        &self,
        from: Ipv4Addr,
        key: &LsaKey,
        seq_no: u32,
    ) -> Vec<&TxRecord> {
        self.log
            .iter()
            .filter(|record| record.from == from)
            .filter(|record| match &record.packet.packet {
                Packet::LsUpdate(pkt) => pkt.lsas.iter().any(|lsa| {
                    lsa.hdr.key() == *key && lsa.hdr.seq_no == seq_no
                }),
                _ => false,
            })
            .collect()
    }
}

// ===== impl WarnCollector =====

impl<S: Subscriber> Layer<S> for WarnCollector {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() > Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0.lock().unwrap().push(visitor.0);
    }
}

// ===== impl MessageVisitor =====

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

// ===== global functions =====

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .init();
        }
    });
}

pub fn router_lsa_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaTypeCode::Router.into(), router_id, router_id)
}

pub fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

// Runs `f` and returns the messages of the warnings it logged.
pub fn capture_warnings(f: impl FnOnce()) -> Vec<String> {
    let warnings = Arc::new(Mutex::new(vec![]));
    let subscriber = tracing_subscriber::registry()
        .with(WarnCollector(warnings.clone()));
    tracing::subscriber::with_default(subscriber, f);
    let warnings = warnings.lock().unwrap();
    warnings.clone()
}

pub fn packet_hdr(pkt_type: PacketType, router_id: Ipv4Addr) -> PacketHdr {
    PacketHdr::new(pkt_type, router_id, AREA_ID, PacketHdrAuth::Null)
}

// Hello from a /24 broadcast or point-to-point neighbor using the default
// timers.
pub fn hello(
    router_id: Ipv4Addr,
    options: Options,
    neighbors: &[Ipv4Addr],
) -> Packet {
    Packet::Hello(Hello {
        hdr: packet_hdr(PacketType::Hello, router_id),
        network_mask: Ipv4Addr::new(255, 255, 255, 0),
        hello_interval: 10,
        options,
        priority: 1,
        dead_interval: 40,
        dr: None,
        bdr: None,
        neighbors: neighbors.iter().copied().collect(),
    })
}

pub fn dbdesc(
    router_id: Ipv4Addr,
    options: Options,
    dd_flags: DbDescFlags,
    dd_seq_no: u32,
    lsa_hdrs: Vec<LsaHdr>,
) -> Packet {
    Packet::DbDesc(DbDesc {
        hdr: packet_hdr(PacketType::DbDesc, router_id),
        mtu: 1500,
        options,
        dd_flags,
        dd_seq_no,
        lsa_hdrs,
    })
}

pub fn lsreq(router_id: Ipv4Addr, entries: Vec<LsaKey>) -> Packet {
    Packet::LsRequest(LsRequest {
        hdr: packet_hdr(PacketType::LsRequest, router_id),
        entries,
    })
}

pub fn lsupd(router_id: Ipv4Addr, lsas: Vec<Lsa>) -> Packet {
    Packet::LsUpdate(LsUpdate {
        hdr: packet_hdr(PacketType::LsUpdate, router_id),
        lsas,
    })
}
