//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{Instrument, debug_span};

use crate::instance::{Instance, RedistributedRoute};
use crate::interface::InterfaceSys;

// Requests sent by the host to a running instance.
#[derive(Debug)]
pub enum HostMsg {
    // Packet received from the network.
    NetRxPacket {
        ifname: String,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        data: Bytes,
    },
    // Interface operational data update.
    InterfaceUpdate {
        ifname: String,
        system: InterfaceSys,
    },
    RedistributeAdd {
        prefix: Ipv4Network,
        route: RedistributedRoute,
    },
    RedistributeDel {
        prefix: Ipv4Network,
    },
    Stop,
}

// ===== global functions =====

// Runs the instance until the host requests it to stop or closes its end of
// the channel.
//
// The logical clock is anchored at the time this function is called, and
// every timer is processed once the corresponding wall-clock time is reached.
pub async fn run(mut instance: Instance, mut rx: UnboundedReceiver<HostMsg>) {
    let router_id = instance.config.router_id;
    let span = debug_span!("ospf-instance", %router_id);
    async move {
        let start = Instant::now();
        instance.start();

        loop {
            let deadline = instance.next_timer_deadline();
            let sleep =
                tokio::time::sleep_until(start + deadline.unwrap_or_default());

            tokio::select! {
                msg = rx.recv() => {
                    // Catch up with the wall clock before processing the
                    // request.
                    instance.advance_clock(start.elapsed());

                    match msg {
                        Some(HostMsg::NetRxPacket {
                            ifname,
                            src,
                            dst,
                            data,
                        }) => {
                            if let Err(error) = instance
                                .process_packet_raw(&ifname, src, dst, data)
                            {
                                error.log();
                            }
                        }
                        Some(HostMsg::InterfaceUpdate { ifname, system }) => {
                            if let Err(error) =
                                instance.interface_update(&ifname, system)
                            {
                                error.log();
                            }
                        }
                        Some(HostMsg::RedistributeAdd { prefix, route }) => {
                            if let Err(error) =
                                instance.redistribute_add(prefix, route)
                            {
                                error.log();
                            }
                        }
                        Some(HostMsg::RedistributeDel { prefix }) => {
                            if let Err(error) =
                                instance.redistribute_del(prefix)
                            {
                                error.log();
                            }
                        }
                        Some(HostMsg::Stop) | None => break,
                    }
                }
                _ = sleep, if deadline.is_some() => {
                    instance.advance_clock(start.elapsed());
                }
            }
        }

        instance.stop();
    }
    .instrument(span)
    .await
}

// Runs the instance on a dedicated current-thread runtime.
//
// Instances aren't `Send`, so they can't be spawned onto a multi-threaded
// runtime.
pub fn run_blocking(
    instance: Instance,
    rx: UnboundedReceiver<HostMsg>,
) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(run(instance, rx));
    Ok(())
}
