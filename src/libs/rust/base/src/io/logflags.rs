/*
 * Copyright (C) 2023-2024 Nils Asmussen, Barkhausen Institut
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

use bitflags::bitflags;

use std::str;

bitflags! {
    /// All log flags used in the DTU model
    ///
    /// Logging is controlled at runtime via the environment variable `DTU_LOG`, which holds a
    /// `|`-separated list of flag names (e.g., `DTU_LOG="Info|Error|DtuCmds|DtuMsgs"`). Any
    /// component can then use the `log` macro to log something. The available flags are kept
    /// here.
    ///
    /// There are three general flags: `Info`, `Debug`, and `Error`. Info and Error are enabled
    /// by default. The remaining flags control the logging of a specific unit of the DTU or the
    /// accelerator.
    ///
    /// Note however that the log flags are hard coded to `Info` and `Error` in bench mode!
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct LogFlags : u64 {
        /// General: informational output (enabled by default)
        const Info          = 1 << 0;
        /// General: debugging output (disable by default)
        const Debug         = 1 << 1;
        /// General: error output (enabled by default)
        const Error         = 1 << 2;

        #[doc(hidden)]
        const __dtu_start = 3;

        /// DTU: command execution
        const DtuCmds       = 1 << (Self::__dtu_start.bits() + 0);
        /// DTU: register accesses
        const DtuRegs       = 1 << (Self::__dtu_start.bits() + 1);
        /// DTU: transfers and buffer usage
        const DtuXfers      = 1 << (Self::__dtu_start.bits() + 2);
        /// DTU: sent and received messages
        const DtuMsgs       = 1 << (Self::__dtu_start.bits() + 3);
        /// DTU: credit changes
        const DtuCredits    = 1 << (Self::__dtu_start.bits() + 4);
        /// DTU: memory reads/writes over the NoC
        const DtuMem        = 1 << (Self::__dtu_start.bits() + 5);
        /// DTU: TLB lookups, inserts and invalidations
        const DtuTlb        = 1 << (Self::__dtu_start.bits() + 6);
        /// DTU: page table walks
        const DtuPts        = 1 << (Self::__dtu_start.bits() + 7);
        /// DTU: cache requests of the core
        const DtuCache      = 1 << (Self::__dtu_start.bits() + 8);

        #[doc(hidden)]
        const __accel_start = Self::__dtu_start.bits() + 9;

        /// Accelerator: context switches
        const AccelCtxSw    = 1 << (Self::__accel_start.bits() + 0);
        /// Accelerator: state changes of the context switch engine
        const AccelState    = 1 << (Self::__accel_start.bits() + 1);

        #[doc(hidden)]
        const __sim_start = Self::__accel_start.bits() + 2;

        /// Simulation: every dispatched event
        const SimEvents     = 1 << (Self::__sim_start.bits() + 0);
    }
}

impl Default for LogFlags {
    fn default() -> Self {
        Self::Info | Self::Error
    }
}

impl str::FromStr for LogFlags {
    type Err = bitflags::parser::ParseError;

    fn from_str(flags: &str) -> Result<Self, Self::Err> {
        Ok(Self(flags.parse()?))
    }
}
