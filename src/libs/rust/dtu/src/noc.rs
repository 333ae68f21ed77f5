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

//! Contains the addressing scheme and the packet types of the network-on-chip

use core::fmt;

use crate::{EpId, PeId};

/// The types of packets that travel over the NoC
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NocPacketType {
    /// A message (header + payload) for a receive endpoint
    Message,
    /// A read request for remote memory or registers
    ReadReq,
    /// A write request for remote memory or registers
    WriteReq,
    /// A cache miss of a core that is served by a memory PE
    CacheMemReq,
    /// The functional (zero-latency) variant of [`NocPacketType::CacheMemReq`]
    CacheMemReqFunc,
}

impl NocPacketType {
    /// Returns true if the packet type is served without modeling time
    pub fn is_functional(self) -> bool {
        self == Self::CacheMemReqFunc
    }
}

const VALID_BIT: u32 = 59;
const CORE_SHIFT: u32 = 52;
const CORE_BITS: u32 = 7;
const VPE_SHIFT: u32 = 36;
const VPE_BITS: u32 = 16;
const OFFSET_BITS: u32 = 36;

/// The maximum number of cores that can be addressed on the NoC
pub const MAX_CORES: usize = 1 << CORE_BITS;

/// A global address on the NoC
///
/// Layout: `| 0 | valid:1 | core:7 | vpe:16 | offset:36 |`
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct NocAddr {
    pub valid: bool,
    pub core_id: PeId,
    pub vpe_id: u16,
    pub offset: u64,
}

impl NocAddr {
    /// Creates a valid address for `offset` within the memory of the given core
    pub fn new(core_id: PeId, offset: u64) -> Self {
        Self::new_with_vpe(core_id, 0, offset)
    }

    /// Creates a valid address for `offset` within the memory of the given core and VPE
    pub fn new_with_vpe(core_id: PeId, vpe_id: u16, offset: u64) -> Self {
        Self {
            valid: true,
            core_id,
            vpe_id,
            offset: offset & ((1 << OFFSET_BITS) - 1),
        }
    }

    /// Creates the address that is used to deliver a message to endpoint `ep` of the given core
    pub fn new_ep(core_id: PeId, ep: EpId) -> Self {
        Self::new(core_id, ep as u64)
    }

    /// Decodes the given raw address
    pub fn from_raw(raw: u64) -> Self {
        Self {
            valid: (raw >> VALID_BIT) & 1 != 0,
            core_id: ((raw >> CORE_SHIFT) & ((1 << CORE_BITS) - 1)) as PeId,
            vpe_id: ((raw >> VPE_SHIFT) & ((1 << VPE_BITS) - 1)) as u16,
            offset: raw & ((1 << OFFSET_BITS) - 1),
        }
    }

    /// Returns the raw representation of this address
    pub fn raw(&self) -> u64 {
        (self.valid as u64) << VALID_BIT
            | (self.core_id as u64 & ((1 << CORE_BITS) - 1)) << CORE_SHIFT
            | (self.vpe_id as u64) << VPE_SHIFT
            | self.offset
    }

    /// Interprets the offset as an endpoint id (used for messages)
    pub fn ep(&self) -> EpId {
        self.offset as EpId
    }

    /// Returns the address `off` bytes behind this one
    pub fn add(&self, off: u64) -> Self {
        Self::new_with_vpe(self.core_id, self.vpe_id, self.offset + off)
    }
}

impl fmt::Debug for NocAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}:{:#x}", self.core_id, self.offset)
    }
}
