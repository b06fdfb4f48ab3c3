//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::area::AreaType;
use crate::interface::InterfaceType;
use crate::packet::AuthType;

// Instance-wide configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceCfg {
    pub router_id: Ipv4Addr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AreaCfg {
    pub area_type: AreaType,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceCfg {
    pub if_type: InterfaceType,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
    pub priority: u8,
    pub cost: u16,
    pub passive: bool,
    pub mtu_ignore: bool,
    pub auth: InterfaceAuthCfg,
    pub static_nbrs: BTreeMap<Ipv4Addr, StaticNbrCfg>,
}

// Interface authentication.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum InterfaceAuthCfg {
    Null,
    Simple { key: String },
    Cryptographic { key_id: u8, key: String },
}

// Statically configured neighbor (NBMA and Point-to-MultiPoint networks).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticNbrCfg {
    pub priority: u8,
    pub poll_interval: u16,
}

// Complete configuration, as loaded from a JSON document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub router_id: Ipv4Addr,
    #[serde(default)]
    pub areas: Vec<AreaEntryCfg>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AreaEntryCfg {
    pub area_id: Ipv4Addr,
    #[serde(default)]
    pub area_type: AreaType,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntryCfg>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InterfaceEntryCfg {
    pub name: String,
    #[serde(flatten)]
    pub config: InterfaceCfg,
}

// ===== impl AreaCfg =====

impl Default for AreaCfg {
    fn default() -> AreaCfg {
        AreaCfg {
            area_type: AreaType::Normal,
        }
    }
}

// ===== impl InterfaceCfg =====

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            if_type: InterfaceType::Broadcast,
            hello_interval: 10,
            dead_interval: 40,
            retransmit_interval: 5,
            transmit_delay: 1,
            priority: 1,
            cost: 10,
            passive: false,
            mtu_ignore: false,
            auth: InterfaceAuthCfg::Null,
            static_nbrs: Default::default(),
        }
    }
}

// ===== impl InterfaceAuthCfg =====

impl InterfaceAuthCfg {
    pub(crate) fn auth_type(&self) -> AuthType {
        match self {
            InterfaceAuthCfg::Null => AuthType::Null,
            InterfaceAuthCfg::Simple { .. } => AuthType::Simple,
            InterfaceAuthCfg::Cryptographic { .. } => AuthType::Cryptographic,
        }
    }
}

impl Default for InterfaceAuthCfg {
    fn default() -> InterfaceAuthCfg {
        InterfaceAuthCfg::Null
    }
}

// ===== impl StaticNbrCfg =====

impl Default for StaticNbrCfg {
    fn default() -> StaticNbrCfg {
        StaticNbrCfg {
            priority: 0,
            poll_interval: 120,
        }
    }
}

// ===== impl Config =====

impl Config {
    pub fn from_json(data: &str) -> serde_json::Result<Config> {
        serde_json::from_str(data)
    }

    pub fn instance(&self) -> InstanceCfg {
        InstanceCfg {
            router_id: self.router_id,
        }
    }
}

impl AreaEntryCfg {
    pub fn config(&self) -> AreaCfg {
        AreaCfg {
            area_type: self.area_type,
        }
    }
}

// ===== unit tests =====
