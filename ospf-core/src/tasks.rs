//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use ospf_utils::timer::{IntervalTask, TimeoutTask};

use crate::area::Area;
use crate::collections::{LsaEntryId, LsdbId};
use crate::debug::LsaFlushReason;
use crate::instance::{InstanceUpView, ProtocolInputChannelsTx};
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaKey};
use crate::tasks::messages::input::{
    DbDescFreeMsg, DelayedAckMsg, IsmEventMsg, LsaFlushMsg, LsaOrigDelayedMsg,
    LsaRefreshMsg, LsdbMaxAgeSweepMsg, NsmEventMsg, ProtocolMsg,
    RxmtIntervalMsg, SendHelloMsg, SendLsUpdateMsg,
};

// LS Update pacing delay.
const LS_UPDATE_PACING_MSECS: u64 = 100;
// Delayed acks must go out well within RxmtInterval to avoid needless
// retransmissions (RFC 2328 section 13.5).
const DELAYED_ACK_SECS: u64 = 1;
const MAXAGE_SWEEP_SECS: u64 = 5;

// Every timer below lives in the instance's logical-clock timer queue and
// carries the input message that gets processed once it fires:
//
// * interface: hello_interval, ism_wait_timer, ls_update_timer and
//   delayed_ack_timer
// * neighbor: nsm_inactivity_timer, packet_rxmt_interval and
//   dbdesc_free_timer
// * LSDB: lsa_expiry_timer, lsa_refresh_timer, lsa_orig_delayed_timer and
//   lsdb_maxage_sweep_interval

// OSPF inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use serde::{Deserialize, Serialize};

    use crate::collections::{
        AreaId, InterfaceId, LsaEntryId, LsdbId, NeighborId,
    };
    use crate::debug::LsaFlushReason;
    use crate::interface::ism;
    use crate::lsdb::LsaOriginateEvent;
    use crate::neighbor::{RxmtPacketType, nsm};
    use crate::packet::Options;
    use crate::packet::lsa::{LsaBody, LsaKey};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (deferred events and expired timers -> instance).
    pub mod input {
        use super::*;

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            IsmEvent(IsmEventMsg),
            NsmEvent(NsmEventMsg),
            SendHello(SendHelloMsg),
            DbDescFree(DbDescFreeMsg),
            SendLsUpdate(SendLsUpdateMsg),
            RxmtInterval(RxmtIntervalMsg),
            DelayedAck(DelayedAckMsg),
            LsaOrigEvent(LsaOrigEventMsg),
            LsaOrigCheck(LsaOrigCheckMsg),
            LsaOrigDelayed(LsaOrigDelayedMsg),
            LsaFlush(LsaFlushMsg),
            LsaRefresh(LsaRefreshMsg),
            LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg),
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct IsmEventMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub event: ism::Event,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub nbr_id: NeighborId,
            pub event: nsm::Event,
        }

        // Hello transmission request. Without an explicit destination, the
        // Hello is sent to all of the interface's Hello destinations.
        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct SendHelloMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub dst: Option<Ipv4Addr>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DbDescFreeMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub nbr_id: NeighborId,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct SendLsUpdateMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub nbr_id: Option<NeighborId>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
            pub nbr_id: NeighborId,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DelayedAckMsg {
            pub area_id: AreaId,
            pub iface_id: InterfaceId,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigEventMsg {
            pub event: LsaOriginateEvent,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigCheckMsg {
            pub lsdb_id: LsdbId,
            pub options: Options,
            pub lsa_id: Ipv4Addr,
            pub lsa_body: LsaBody,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigDelayedMsg {
            pub lsdb_id: LsdbId,
            pub lsa_key: LsaKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaFlushMsg {
            pub lsdb_id: LsdbId,
            pub lse_id: LsaEntryId,
            pub reason: LsaFlushReason,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaRefreshMsg {
            pub lsdb_id: LsdbId,
            pub lse_id: LsaEntryId,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsdbMaxAgeSweepMsg {
            pub lsdb_id: LsdbId,
        }
    }

    // Output messages (instance -> host).
    pub mod output {
        use smallvec::SmallVec;

        use super::*;
        use crate::packet::Packet;
        use crate::packet::auth::AuthCtx;

        #[derive(Clone, Debug, Serialize)]
        pub struct NetTxPacketMsg {
            pub ifname: String,
            pub src: Ipv4Addr,
            pub dst: SmallVec<[Ipv4Addr; 4]>,
            pub packet: Packet,
            #[serde(skip)]
            pub auth: Option<AuthCtx>,
        }
    }
}

// ===== global functions =====

// Periodic Hello transmission. Without a destination, the Hello goes to all
// of the interface's Hello destinations.
pub(crate) fn hello_interval(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    dst: Option<Ipv4Addr>,
    interval: u16,
) -> IntervalTask {
    let msg = ProtocolMsg::SendHello(SendHelloMsg {
        area_id: area.id,
        iface_id: iface.id,
        dst,
    });
    let interval = Duration::from_secs(interval.into());
    instance.tx.protocol_input.interval(interval, true, msg)
}

pub(crate) fn ism_wait_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let msg = ProtocolMsg::IsmEvent(IsmEventMsg {
        area_id: area.id,
        iface_id: iface.id,
        event: ism::Event::WaitTimer,
    });
    instance.tx.protocol_input.timeout(dead_interval(iface), msg)
}

pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let msg = ProtocolMsg::NsmEvent(NsmEventMsg {
        area_id: area.id,
        iface_id: iface.id,
        nbr_id: nbr.id,
        event: nsm::Event::InactivityTimer,
    });
    instance.tx.protocol_input.timeout(dead_interval(iface), msg)
}

// Retransmits the packet described by `msg` every RxmtInterval until
// cancelled. The first retransmission happens one interval from now.
pub(crate) fn packet_rxmt_interval(
    iface: &Interface,
    msg: RxmtIntervalMsg,
    instance: &InstanceUpView<'_>,
) -> IntervalTask {
    let interval = Duration::from_secs(iface.config.retransmit_interval.into());
    let msg = ProtocolMsg::RxmtInterval(msg);
    instance.tx.protocol_input.interval(interval, false, msg)
}

// Releases the slave's last Database Description packets once the master
// can no longer retransmit its final poll.
pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let msg = ProtocolMsg::DbDescFree(DbDescFreeMsg {
        area_id: area.id,
        iface_id: iface.id,
        nbr_id: nbr.id,
    });
    instance.tx.protocol_input.timeout(dead_interval(iface), msg)
}

// Short pacing delay so that LSAs flooded in a burst share LS Updates.
pub(crate) fn ls_update_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let msg = ProtocolMsg::SendLsUpdate(SendLsUpdateMsg {
        area_id: area.id,
        iface_id: iface.id,
        nbr_id: None,
    });
    instance
        .tx
        .protocol_input
        .timeout(Duration::from_millis(LS_UPDATE_PACING_MSECS), msg)
}

pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let msg = ProtocolMsg::DelayedAck(DelayedAckMsg {
        area_id: area.id,
        iface_id: iface.id,
    });
    instance
        .tx
        .protocol_input
        .timeout(Duration::from_secs(DELAYED_ACK_SECS), msg)
}

// Flushes the LSA once its age reaches MaxAge.
pub(crate) fn lsa_expiry_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa: &Lsa,
    protocol_input: &ProtocolInputChannelsTx,
) -> TimeoutTask {
    let remaining = lsdb::LSA_MAX_AGE.saturating_sub(lsa.hdr.age);
    let msg = ProtocolMsg::LsaFlush(LsaFlushMsg {
        lsdb_id,
        lse_id,
        reason: LsaFlushReason::Expiry,
    });
    protocol_input.timeout(Duration::from_secs(remaining.into()), msg)
}

pub(crate) fn lsa_refresh_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    protocol_input: &ProtocolInputChannelsTx,
) -> TimeoutTask {
    let timeout = Duration::from_secs(lsdb::LSA_REFRESH_TIME.into());
    let msg = ProtocolMsg::LsaRefresh(LsaRefreshMsg { lsdb_id, lse_id });
    protocol_input.timeout(timeout, msg)
}

// Postpones an origination until MinLSInterval has passed since the
// current instance was originated at `lsa_base_time`.
pub(crate) fn lsa_orig_delayed_timer(
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
    lsa_base_time: Option<Duration>,
    protocol_input: &ProtocolInputChannelsTx,
) -> TimeoutTask {
    let elapsed = match lsa_base_time {
        Some(base_time) => protocol_input.now().saturating_sub(base_time),
        None => Duration::ZERO,
    };
    let timeout =
        Duration::from_secs(lsdb::LSA_MIN_INTERVAL).saturating_sub(elapsed);
    let msg =
        ProtocolMsg::LsaOrigDelayed(LsaOrigDelayedMsg { lsdb_id, lsa_key });
    protocol_input.timeout(timeout, msg)
}

pub(crate) fn lsdb_maxage_sweep_interval(
    lsdb_id: LsdbId,
    protocol_input: &ProtocolInputChannelsTx,
) -> IntervalTask {
    let interval = Duration::from_secs(MAXAGE_SWEEP_SECS);
    let msg = ProtocolMsg::LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg { lsdb_id });
    protocol_input.interval(interval, false, msg)
}

// ===== helper functions =====

fn dead_interval(iface: &Interface) -> Duration {
    Duration::from_secs(iface.config.dead_interval.into())
}
