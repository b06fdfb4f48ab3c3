//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Small helpers shared by the OSPF crates: byte buffer extensions, IPv4
//! address helpers and the logical-clock timer queue.

pub mod bytes;
pub mod ip;
pub mod timer;
