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

//! Contains the time types of the simulation

use core::fmt;

use crate::util::math;

/// A point in simulated time; one tick is one picosecond
pub type Tick = u64;

/// A number of clock cycles
pub type Cycles = u64;

/// The clock of a simulated component
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Clock {
    period: Tick,
}

impl Clock {
    /// Creates a new clock with given period in ticks
    pub const fn new(period: Tick) -> Self {
        Self { period }
    }

    /// Returns the period in ticks
    pub fn period(&self) -> Tick {
        self.period
    }

    /// Returns the tick of the clock edge `cycles` cycles after the next edge at or after `now`
    pub fn edge(&self, now: Tick, cycles: Cycles) -> Tick {
        math::round_up(now, self.period) + cycles * self.period
    }

    /// Returns the number of cycles that have passed until `now`
    pub fn cycle(&self, now: Tick) -> Cycles {
        now / self.period
    }
}

impl Default for Clock {
    fn default() -> Self {
        // 1 GHz
        Self::new(1000)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", 1_000_000 / self.period)
    }
}
