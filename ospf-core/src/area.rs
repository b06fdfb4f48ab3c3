//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::collections::{AreaId, Arena, Interfaces, Lsdb};
use crate::config::AreaCfg;
use crate::interface::Interface;
use crate::packet::Options;

// OSPF area.
#[derive(Debug)]
pub struct Area {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area configuration data.
    pub config: AreaCfg,
    // Area state data.
    pub state: AreaState,
    // Area interfaces.
    pub interfaces: Interfaces,
}

// OSPF area state.
#[derive(Debug, Default)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
}

// OSPF area type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AreaType {
    #[default]
    Normal,
    Stub,
}

// ===== impl Area =====

impl Area {
    // Create new area.
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Self {
        Self {
            id,
            area_id,
            config: Default::default(),
            state: Default::default(),
            interfaces: Default::default(),
        }
    }

    // Returns whether this area is active.
    //
    // An area is active as long as it contains at least one operational
    // interface.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    // Returns whether this is the backbone area.
    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }

    // Returns the options associated to this area.
    //
    // These options are used for sending OSPF Hello and Database Description
    // packets, as well as for originating area-scope LSAs.
    pub(crate) fn options(&self) -> Options {
        let mut options = Options::empty();
        if self.config.area_type == AreaType::Normal {
            options.insert(Options::E);
        }
        options
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_area_options() {
        let mut area = Area::new(1, Ipv4Addr::new(0, 0, 0, 1));
        assert!(!area.is_backbone());
        assert_eq!(area.options(), Options::E);

        area.config.area_type = AreaType::Stub;
        assert_eq!(area.options(), Options::empty());
    }
}
