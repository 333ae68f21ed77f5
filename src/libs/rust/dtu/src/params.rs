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

use base::cfg;
use base::errors::{Code, Error};
use base::time::{Cycles, Tick};
use base::util::{math, parse};

use crate::PeId;

/// The parameters of one DTU instance
///
/// The defaults correspond to the configuration that is used for the gem5 platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DtuParams {
    /// The number of endpoints
    pub num_endpoints: usize,
    /// The maximum payload of a single NoC packet in bytes
    pub max_noc_packet_size: usize,
    /// The size of a local memory access in bytes
    pub block_size: usize,
    /// The number of transfer buffers
    pub buf_count: usize,
    /// The size of each transfer buffer in bytes
    pub buf_size: usize,
    /// The number of TLB entries (0 disables address translation)
    pub tlb_entries: usize,
    /// The PE that serves cache misses of the core
    pub mem_pe: Option<PeId>,
    /// The address of the register file in the address space of the core
    pub reg_base: u64,
    /// The clock period in ticks
    pub clock_period: Tick,
    pub register_access_latency: Cycles,
    pub command_to_noc_request_latency: Cycles,
    pub start_msg_transfer_delay: Cycles,
    pub transfer_to_mem_request_latency: Cycles,
    pub transfer_to_noc_latency: Cycles,
    pub noc_to_transfer_latency: Cycles,
}

impl Default for DtuParams {
    fn default() -> Self {
        Self {
            num_endpoints: 16,
            max_noc_packet_size: 1024,
            block_size: 64,
            buf_count: 4,
            buf_size: 1024,
            tlb_entries: 32,
            mem_pe: None,
            reg_base: cfg::DTU_REG_BASE,
            clock_period: 1000,
            register_access_latency: 1,
            command_to_noc_request_latency: 5,
            start_msg_transfer_delay: 2,
            transfer_to_mem_request_latency: 1,
            transfer_to_noc_latency: 3,
            noc_to_transfer_latency: 3,
        }
    }
}

impl DtuParams {
    /// Returns the maximum size of one chunk of a transfer
    ///
    /// A chunk has to fit into a transfer buffer and into a NoC packet.
    pub fn chunk_limit(&self) -> usize {
        self.buf_size.min(self.max_noc_packet_size)
    }

    /// Checks whether the parameters describe a DTU that can be built
    pub fn validate(&self) -> Result<(), Error> {
        if self.num_endpoints == 0 || self.num_endpoints > cfg::MAX_EPS {
            return Err(Error::new(Code::InvArgs));
        }
        if self.buf_count == 0 || self.buf_size < self.max_noc_packet_size {
            return Err(Error::new(Code::InvArgs));
        }
        if !math::is_pow2(self.block_size) || self.block_size > cfg::PAGE_SIZE {
            return Err(Error::new(Code::InvArgs));
        }
        if self.clock_period == 0 || !math::is_aligned(self.reg_base, cfg::REG_SIZE as u64) {
            return Err(Error::new(Code::InvArgs));
        }
        Ok(())
    }

    /// Sets the parameter `key` to the given value
    ///
    /// This is used to override parameters from the command line (`--param key=value`).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "num_endpoints" => self.num_endpoints = parse::int(value)? as usize,
            "max_noc_packet_size" => self.max_noc_packet_size = parse::size(value)?,
            "block_size" => self.block_size = parse::size(value)?,
            "buf_count" => self.buf_count = parse::int(value)? as usize,
            "buf_size" => self.buf_size = parse::size(value)?,
            "tlb_entries" => self.tlb_entries = parse::int(value)? as usize,
            "mem_pe" => self.mem_pe = Some(parse::int(value)? as PeId),
            "reg_base" => self.reg_base = parse::addr(value)?,
            "clock_period" => self.clock_period = parse::int(value)?,
            "register_access_latency" => self.register_access_latency = parse::int(value)?,
            "command_to_noc_request_latency" => {
                self.command_to_noc_request_latency = parse::int(value)?
            },
            "start_msg_transfer_delay" => self.start_msg_transfer_delay = parse::int(value)?,
            "transfer_to_mem_request_latency" => {
                self.transfer_to_mem_request_latency = parse::int(value)?
            },
            "transfer_to_noc_latency" => self.transfer_to_noc_latency = parse::int(value)?,
            "noc_to_transfer_latency" => self.noc_to_transfer_latency = parse::int(value)?,
            _ => return Err(Error::new(Code::InvArgs)),
        }
        Ok(())
    }
}
