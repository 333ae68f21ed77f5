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

use bitflags::bitflags;

use base::cfg;
use dtu::packet::Packet;
use dtu::regfile::{self, CmdReg, RegId};
use dtu::{Command, EpId, Opcode};

bitflags! {
    /// The flags in the word at [`cfg::RCTMUX_FLAGS`] that is shared with the scheduler
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct RctMuxFlags : u64 {
        /// The context should be restored
        const RESTORE = 1 << 0;
        /// The context should be saved
        const STORE   = 1 << 1;
        /// The scheduler waits for the accelerator to resume
        const WAITING = 1 << 2;
        /// Set by the accelerator when a save or restore is complete
        const SIGNAL  = 1 << 3;
    }
}

/// The interface of an accelerator towards its context switch engine
pub trait Accelerator {
    /// The size of the context that is kept inside the accelerator
    fn context_size(&self) -> usize;

    /// The size of the state that resides in the scratchpad at [`Accelerator::buffer_addr`]
    fn state_size(&self) -> usize;

    fn context(&self) -> &[u8];
    fn context_mut(&mut self) -> &mut [u8];

    /// The memory endpoint that denotes the save area
    fn context_ep(&self) -> EpId;

    /// The scratchpad address of the state; the context is staged right below it
    fn buffer_addr(&self) -> u64;

    /// The maximum size of a scratchpad access
    fn chunk_size(&self) -> usize;

    /// The maximum size of a single DTU command
    fn max_data_size(&self) -> usize;

    /// The address of the DTU registers in the address space of the accelerator
    fn reg_base(&self) -> u64 {
        cfg::DTU_REG_BASE
    }

    /// Is called after the context has been restored
    fn set_switched(&mut self);

    /// Returns the address of the given DTU register
    fn reg_addr(&self, id: RegId) -> u64 {
        regfile::reg_addr(self.reg_base(), id)
    }

    /// Creates the request that reads the given register
    fn reg_read_pkt(&self, id: RegId) -> Packet {
        Packet::new_read(self.reg_addr(id), cfg::REG_SIZE)
    }

    /// Creates the request that writes `val` to the given register
    fn reg_write_pkt(&self, id: RegId, val: u64) -> Packet {
        Packet::new_reg_write(self.reg_addr(id), &[val])
    }

    /// Creates the request that starts command `op` on the context endpoint
    ///
    /// The command registers are written at once, so that the command is started with the
    /// given arguments.
    fn cmd_pkt(&self, op: Opcode, data: u64, size: usize, off: usize) -> Packet {
        let cmd = Command::new(op, self.context_ep());
        Packet::new_reg_write(self.reg_addr(RegId::Cmd(CmdReg::Command)), &[
            cmd.encode(),
            0,
            data,
            size as u64,
            off as u64,
            cfg::EP_SYSR as u64,
        ])
    }
}
