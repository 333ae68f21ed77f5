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

//! Contains the packets that are exchanged between the components

use core::fmt;

use base::cfg;
use base::errors::Code;

use crate::noc::NocPacketType;
use crate::PeId;

/// The command of a packet
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemCmd {
    ReadReq,
    WriteReq,
    ReadResp,
    WriteResp,
}

impl MemCmd {
    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadReq | Self::ReadResp)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Self::WriteReq | Self::WriteResp)
    }

    pub fn is_response(self) -> bool {
        matches!(self, Self::ReadResp | Self::WriteResp)
    }

    /// Returns the response command for this request command
    pub fn response(self) -> Self {
        match self {
            Self::ReadReq | Self::ReadResp => Self::ReadResp,
            Self::WriteReq | Self::WriteResp => Self::WriteResp,
        }
    }
}

/// The state a DTU attaches to the packets it sends over the NoC
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NocSenderState {
    pub ty: NocPacketType,
    /// The PE that sent the request and receives the response
    pub src: PeId,
    /// The sequence number of the command the packet belongs to
    pub cmd_seq: u64,
    /// The result reported by the receiver
    pub result: Code,
}

/// The reasons for which the DTU accesses its local memory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemReqType {
    /// A block of a transfer
    Transfer,
    /// The header of a message to reply to
    Header,
    /// The update of a header's flags after a reply
    HeaderUpdate,
    /// A page table entry
    Translation,
    /// A functional request from the NoC
    Functional,
}

/// The state a DTU attaches to the packets it sends to its local memory
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemSenderState {
    pub ty: MemReqType,
    /// The id of the operation within the unit denoted by `ty`
    pub id: u64,
}

/// The sender state that is attached to a packet to resume the right operation on its response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SenderState {
    Noc(NocSenderState),
    Mem(MemSenderState),
    /// A request of the core that was forwarded over the NoC; holds the original address
    Cache { addr: u64 },
}

/// A memory or NoC packet
///
/// The sender states form a stack: each component that forwards a packet pushes its state and
/// pops it again when the response passes by.
#[derive(Clone)]
pub struct Packet {
    cmd: MemCmd,
    addr: u64,
    size: usize,
    data: Vec<u8>,
    result: Code,
    functional: bool,
    states: Vec<SenderState>,
}

impl Packet {
    /// Creates a request to read `size` bytes at `addr`
    pub fn new_read(addr: u64, size: usize) -> Self {
        Self {
            cmd: MemCmd::ReadReq,
            addr,
            size,
            data: Vec::new(),
            result: Code::Success,
            functional: false,
            states: Vec::new(),
        }
    }

    /// Creates a request to write `data` to `addr`
    pub fn new_write(addr: u64, data: Vec<u8>) -> Self {
        Self {
            cmd: MemCmd::WriteReq,
            addr,
            size: data.len(),
            data,
            result: Code::Success,
            functional: false,
            states: Vec::new(),
        }
    }

    /// Creates a request to write the given register values to consecutive registers at `addr`
    pub fn new_reg_write(addr: u64, regs: &[u64]) -> Self {
        let data = regs.iter().flat_map(|r| r.to_le_bytes()).collect();
        Self::new_write(addr, data)
    }

    pub fn cmd(&self) -> MemCmd {
        self.cmd
    }

    pub fn is_read(&self) -> bool {
        self.cmd.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.cmd.is_write()
    }

    pub fn is_response(&self) -> bool {
        self.cmd.is_response()
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn set_addr(&mut self, addr: u64) {
        self.addr = addr;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the data, which also changes the size of writes and read responses
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.size = data.len();
        self.data = data;
    }

    pub fn take_data(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.data)
    }

    pub fn result(&self) -> Code {
        self.result
    }

    pub fn set_result(&mut self, result: Code) {
        self.result = result;
    }

    pub fn is_error(&self) -> bool {
        self.result != Code::Success
    }

    /// Returns true if the packet is handled without modeling time
    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn set_functional(&mut self, functional: bool) {
        self.functional = functional;
    }

    /// Turns this request into the corresponding response
    ///
    /// Writes loose their data; the data of reads is provided by the responder.
    pub fn make_response(&mut self) {
        if self.cmd == MemCmd::WriteReq {
            self.data.clear();
        }
        self.cmd = self.cmd.response();
    }

    pub fn push_state(&mut self, state: SenderState) {
        self.states.push(state);
    }

    pub fn pop_state(&mut self) -> Option<SenderState> {
        self.states.pop()
    }

    /// Returns the NoC sender state, if it is the topmost state
    pub fn noc_state(&self) -> Option<&NocSenderState> {
        match self.states.last() {
            Some(SenderState::Noc(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the NoC sender state mutably, if it is the topmost state
    pub fn noc_state_mut(&mut self) -> Option<&mut NocSenderState> {
        match self.states.last_mut() {
            Some(SenderState::Noc(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the register value at index `idx` within the data
    pub fn reg(&self, idx: usize) -> u64 {
        let off = idx * cfg::REG_SIZE;
        let mut word = [0u8; cfg::REG_SIZE];
        if let Some(bytes) = self.data.get(off..off + cfg::REG_SIZE) {
            word.copy_from_slice(bytes);
        }
        u64::from_le_bytes(word)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{:?} @ {:#x}, {}B, {:?}]",
            self.cmd, self.addr, self.size, self.result
        )
    }
}
