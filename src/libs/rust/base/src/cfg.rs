/*
 * Copyright (C) 2020-2024 Nils Asmussen, Barkhausen Institut
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

//! The fixed configuration of the DTU model

/// The size of a DTU register in bytes
pub const REG_SIZE: usize = 8;

/// The number of bits of the opcode in the command register
pub const CMD_OPCODE_BITS: u32 = 4;
/// The number of bits of the endpoint id in the command register
pub const CMD_EPID_BITS: u32 = 8;
/// The maximum number of endpoints that the command register can address
pub const MAX_EPS: usize = 1 << CMD_EPID_BITS;

/// The default base address of the register file in the address space of the core
pub const DTU_REG_BASE: u64 = 0xF000_0000;

pub const PAGE_BITS: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// The number of page table levels
pub const LEVEL_CNT: usize = 2;
/// The number of address bits translated per level
pub const LEVEL_BITS: usize = 9;
pub const LEVEL_MASK: usize = (1 << LEVEL_BITS) - 1;
/// The size of a page table entry (log2)
pub const PTE_BITS: usize = 3;
pub const PTE_SIZE: usize = 1 << PTE_BITS;

/// The scratchpad address of the flags word shared with the context-switch scheduler
pub const RCTMUX_FLAGS: u64 = 0x2FF8;

/// The endpoint used to receive replies for system calls
pub const EP_SYSR: usize = 2;
