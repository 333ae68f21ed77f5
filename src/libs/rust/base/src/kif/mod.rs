/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2024 Nils Asmussen, Barkhausen Institut
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

//! Contains the types that are shared between the DTU and its configuring software

use bitflags::bitflags;

bitflags! {
    /// The permission bitmap that is used for memory endpoints and page table entries
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct Perm : u64 {
        /// Read permission
        const R = 0x1;
        /// Write permission
        const W = 0x2;
        /// Read + write permission
        const RW = Self::R.bits() | Self::W.bits();
    }
}
