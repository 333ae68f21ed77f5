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

//! The base library shared by the DTU model, the accelerator model and the tools.
//!
//! It contains the error codes, the logger with its log flags, the fixed configuration, the
//! WvTest-based test framework and a couple of small utilities.

// Macros
pub use static_assertions::const_assert;

#[macro_use]
pub mod io;
#[macro_use]
pub mod test;

pub mod cfg;
pub mod errors;
pub mod kif;
pub mod time;
pub mod util;
