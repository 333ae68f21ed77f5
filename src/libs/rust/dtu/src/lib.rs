/*
 * Copyright (C) 2024 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

//! A timing model of the Data Transfer Unit (DTU).
//!
//! The DTU sits next to a core and performs all communication of this core with other cores and
//! memories. Software programs it via a register file: endpoints describe communication channels
//! (memory regions, message targets and receive buffers) and the command registers start
//! operations on them (SEND, REPLY, READ, WRITE, ...).
//!
//! The model is driven by a discrete-event simulation ([`sim`]). Every multi-step operation keeps
//! its state explicitly and is resumed by events that fire at a later tick or by responses that
//! arrive via the ports ([`port`]). A [`system::System`] connects several processing elements,
//! each consisting of a DTU, a scratchpad memory and optionally a core.

mod dtu;
mod mem;
mod msg;
mod params;
mod pt;

pub mod header;
pub mod memory;
pub mod noc;
pub mod packet;
pub mod port;
pub mod regfile;
pub mod sim;
pub mod system;
pub mod tlb;
pub mod xfer;

/// The id of an endpoint
pub type EpId = usize;
/// The id of a processing element (and thereby of its DTU and core)
pub type PeId = usize;

/// The endpoint id that denotes "no endpoint"
pub const INVALID_EP: EpId = 0xFF;

pub use dtu::{Command, Dtu, DtuEvent, DtuStats, ExtCommand, ExtOpcode, Opcode};
pub use params::DtuParams;
pub use pt::WalkState;
