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

//! Accelerators that are attached to a DTU and can be time multiplexed
//!
//! An accelerator does not run software. Instead, a hardware state machine
//! ([`ctxsw::AccelContextSwitch`]) drives the DTU via its register interface to save the context
//! of the accelerator to memory and to restore it from there whenever the scheduler asks for it.

mod accelerator;
mod context;
mod accelcore;

pub mod ctxsw;

pub use self::accelerator::{Accelerator, RctMuxFlags};
pub use self::context::ContextAccel;
pub use self::accelcore::AccelCore;
pub use self::ctxsw::{AccelContextSwitch, CtxSwState};
