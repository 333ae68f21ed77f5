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

//! Contains the register file of the DTU
//!
//! The register file is a flat array of 64-bit registers, mapped into the address space of the
//! core at `reg_base` and reachable via the NoC. It consists of the global DTU registers, the
//! request registers, the command registers and the endpoint registers (in this order).

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use base::cfg;
use base::errors::Code;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;

use crate::packet::Packet;
use crate::{EpId, PeId};

/// The type of a register
pub type Reg = u64;

/// Denotes an unlimited number of credits
pub const UNLIM_CREDITS: Reg = Reg::MAX;

/// The global registers of the DTU
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum DtuReg {
    /// Status flags (see [`StatusFlags`])
    Status,
    /// The physical address of the root page table (0 = no translation)
    RootPt,
    /// The number of unread messages over all receive endpoints
    MsgCnt,
    /// The external command register (see [`crate::ExtCommand`])
    ExtCmd,
    /// The last protocol error on message reception: `code | ep << 32`
    RecvErr,
}

/// The request registers of the DTU
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum ReqReg {
    /// External requests for the core (acknowledged by writing 0)
    ExtReq,
}

/// The command registers of the DTU
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum CmdReg {
    /// The command to execute (see [`crate::Command`])
    Command,
    /// Aborts the running command when written with [`ABORT_CMD`]
    Abort,
    DataAddr,
    DataSize,
    Offset,
    ReplyEpid,
    ReplyLabel,
}

/// The registers of every endpoint
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum EpReg {
    // receive endpoints
    BufAddr,
    BufMsgSize,
    BufSize,
    BufMsgCnt,
    BufRdPtr,
    BufWrPtr,
    // send endpoints
    TgtCoreid,
    TgtEpid,
    MaxMsgSize,
    Label,
    Credits,
    MaxCredits,
    // memory endpoints
    ReqRemAddr,
    ReqRemSize,
    ReqFlags,
}

pub const NUM_DTU_REGS: usize = 5;
pub const NUM_REQ_REGS: usize = 1;
pub const NUM_CMD_REGS: usize = 7;
pub const NUM_EP_REGS: usize = 15;

/// The value to write into [`CmdReg::Abort`] to abort the running command
pub const ABORT_CMD: Reg = 1;

bitflags! {
    /// The flags in the status register
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct StatusFlags : Reg {
        /// The core may configure endpoints and issue external commands
        const PRIV = 1 << 0;
    }
}

bitflags! {
    /// Describes what a register access has changed
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct RegAccess : u8 {
        const WROTE_CMD     = 1 << 0;
        const WROTE_EXT_CMD = 1 << 1;
        const WROTE_ABORT   = 1 << 2;
        /// At least one write has been ignored
        const REJECTED      = 1 << 3;
    }
}

/// Who accesses the register file
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Accessor {
    /// The local core
    Cpu,
    /// Another PE via the NoC
    Noc,
}

/// The symbolic id of a register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegId {
    Dtu(DtuReg),
    Req(ReqReg),
    Cmd(CmdReg),
    Ep(EpId, EpReg),
}

impl RegId {
    /// Returns the offset of the register within the register file
    pub fn addr(self) -> u64 {
        let idx = match self {
            Self::Dtu(r) => usize::from(r),
            Self::Req(r) => NUM_DTU_REGS + usize::from(r),
            Self::Cmd(r) => NUM_DTU_REGS + NUM_REQ_REGS + usize::from(r),
            Self::Ep(ep, r) => {
                NUM_DTU_REGS + NUM_REQ_REGS + NUM_CMD_REGS + ep * NUM_EP_REGS + usize::from(r)
            },
        };
        (idx * cfg::REG_SIZE) as u64
    }
}

/// The registers of a send endpoint
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SendEp {
    pub tgt_core: PeId,
    pub tgt_ep: EpId,
    /// The maximum message size including the header (0 = invalid endpoint)
    pub max_msg_size: usize,
    pub label: u64,
    pub credits: Reg,
    pub max_credits: Reg,
}

impl SendEp {
    pub fn is_valid(&self) -> bool {
        self.max_msg_size != 0
    }
}

/// The registers of a receive endpoint
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecvEp {
    pub buf_addr: u64,
    /// The size of each slot (header + payload)
    pub msg_size: usize,
    /// The number of slots
    pub size: usize,
    pub msg_count: usize,
    /// The offset of the next message to read
    pub rd_ptr: u64,
    /// The offset of the next slot to write
    pub wr_ptr: u64,
}

impl RecvEp {
    pub fn is_valid(&self) -> bool {
        self.size != 0 && self.msg_size != 0
    }

    /// Returns the size of the ring buffer in bytes
    pub fn ring_size(&self) -> u64 {
        (self.size * self.msg_size) as u64
    }

    /// Returns `ptr` advanced by one slot, wrapping at the end of the ring buffer
    pub fn next_ptr(&self, ptr: u64) -> u64 {
        (ptr + self.msg_size as u64) % self.ring_size()
    }
}

/// The registers of a memory endpoint
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemEp {
    pub tgt_core: PeId,
    pub rem_addr: u64,
    pub rem_size: u64,
    pub flags: Perm,
}

impl MemEp {
    pub fn is_valid(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// The register file
pub struct RegFile {
    dtu: [Reg; NUM_DTU_REGS],
    req: [Reg; NUM_REQ_REGS],
    cmd: [Reg; NUM_CMD_REGS],
    eps: Vec<Reg>,
    num_eps: usize,
}

impl RegFile {
    /// Creates a register file with `num_eps` endpoints, all registers being zero
    pub fn new(num_eps: usize) -> Self {
        Self {
            dtu: [0; NUM_DTU_REGS],
            req: [0; NUM_REQ_REGS],
            cmd: [0; NUM_CMD_REGS],
            eps: vec![0; num_eps * NUM_EP_REGS],
            num_eps,
        }
    }

    pub fn num_eps(&self) -> usize {
        self.num_eps
    }

    /// Returns the size of the register file in bytes
    pub fn size(&self) -> usize {
        (NUM_DTU_REGS + NUM_REQ_REGS + NUM_CMD_REGS + self.num_eps * NUM_EP_REGS) * cfg::REG_SIZE
    }

    pub fn get(&self, reg: DtuReg) -> Reg {
        self.dtu[usize::from(reg)]
    }

    pub fn set(&mut self, reg: DtuReg, val: Reg) {
        self.dtu[usize::from(reg)] = val;
    }

    pub fn get_req(&self, reg: ReqReg) -> Reg {
        self.req[usize::from(reg)]
    }

    pub fn set_req(&mut self, reg: ReqReg, val: Reg) {
        self.req[usize::from(reg)] = val;
    }

    pub fn get_cmd(&self, reg: CmdReg) -> Reg {
        self.cmd[usize::from(reg)]
    }

    pub fn set_cmd(&mut self, reg: CmdReg, val: Reg) {
        self.cmd[usize::from(reg)] = val;
    }

    pub fn get_ep(&self, ep: EpId, reg: EpReg) -> Reg {
        self.eps[ep * NUM_EP_REGS + usize::from(reg)]
    }

    /// Sets the given endpoint register
    ///
    /// Changes of the message count are reflected in the global message count.
    pub fn set_ep(&mut self, ep: EpId, reg: EpReg, val: Reg) {
        let idx = ep * NUM_EP_REGS + usize::from(reg);
        if reg == EpReg::BufMsgCnt {
            let total = self.get(DtuReg::MsgCnt).saturating_sub(self.eps[idx]) + val;
            self.set(DtuReg::MsgCnt, total);
        }
        self.eps[idx] = val;
    }

    /// Returns the register with given id
    pub fn get_reg(&self, id: RegId) -> Reg {
        match id {
            RegId::Dtu(r) => self.get(r),
            RegId::Req(r) => self.get_req(r),
            RegId::Cmd(r) => self.get_cmd(r),
            RegId::Ep(ep, r) => self.get_ep(ep, r),
        }
    }

    /// Sets the register with given id
    pub fn set_reg(&mut self, id: RegId, val: Reg) {
        match id {
            RegId::Dtu(r) => self.set(r, val),
            RegId::Req(r) => self.set_req(r, val),
            RegId::Cmd(r) => self.set_cmd(r, val),
            RegId::Ep(ep, r) => self.set_ep(ep, r, val),
        }
    }

    fn decode(&self, off: u64) -> Option<RegId> {
        let mut idx = off as usize / cfg::REG_SIZE;
        if idx < NUM_DTU_REGS {
            return DtuReg::try_from(idx).ok().map(RegId::Dtu);
        }
        idx -= NUM_DTU_REGS;
        if idx < NUM_REQ_REGS {
            return ReqReg::try_from(idx).ok().map(RegId::Req);
        }
        idx -= NUM_REQ_REGS;
        if idx < NUM_CMD_REGS {
            return CmdReg::try_from(idx).ok().map(RegId::Cmd);
        }
        idx -= NUM_CMD_REGS;
        let ep = idx / NUM_EP_REGS;
        if ep >= self.num_eps {
            return None;
        }
        EpReg::try_from(idx % NUM_EP_REGS)
            .ok()
            .map(|r| RegId::Ep(ep, r))
    }

    pub fn send_ep(&self, ep: EpId) -> SendEp {
        SendEp {
            tgt_core: self.get_ep(ep, EpReg::TgtCoreid) as PeId,
            tgt_ep: self.get_ep(ep, EpReg::TgtEpid) as EpId,
            max_msg_size: self.get_ep(ep, EpReg::MaxMsgSize) as usize,
            label: self.get_ep(ep, EpReg::Label),
            credits: self.get_ep(ep, EpReg::Credits),
            max_credits: self.get_ep(ep, EpReg::MaxCredits),
        }
    }

    pub fn set_send_ep(&mut self, ep: EpId, sep: &SendEp) {
        self.set_ep(ep, EpReg::TgtCoreid, sep.tgt_core as Reg);
        self.set_ep(ep, EpReg::TgtEpid, sep.tgt_ep as Reg);
        self.set_ep(ep, EpReg::MaxMsgSize, sep.max_msg_size as Reg);
        self.set_ep(ep, EpReg::Label, sep.label);
        self.set_ep(ep, EpReg::Credits, sep.credits);
        self.set_ep(ep, EpReg::MaxCredits, sep.max_credits);
    }

    pub fn recv_ep(&self, ep: EpId) -> RecvEp {
        RecvEp {
            buf_addr: self.get_ep(ep, EpReg::BufAddr),
            msg_size: self.get_ep(ep, EpReg::BufMsgSize) as usize,
            size: self.get_ep(ep, EpReg::BufSize) as usize,
            msg_count: self.get_ep(ep, EpReg::BufMsgCnt) as usize,
            rd_ptr: self.get_ep(ep, EpReg::BufRdPtr),
            wr_ptr: self.get_ep(ep, EpReg::BufWrPtr),
        }
    }

    pub fn set_recv_ep(&mut self, ep: EpId, rep: &RecvEp) {
        self.set_ep(ep, EpReg::BufAddr, rep.buf_addr);
        self.set_ep(ep, EpReg::BufMsgSize, rep.msg_size as Reg);
        self.set_ep(ep, EpReg::BufSize, rep.size as Reg);
        self.set_ep(ep, EpReg::BufMsgCnt, rep.msg_count as Reg);
        self.set_ep(ep, EpReg::BufRdPtr, rep.rd_ptr);
        self.set_ep(ep, EpReg::BufWrPtr, rep.wr_ptr);
    }

    pub fn mem_ep(&self, ep: EpId) -> MemEp {
        MemEp {
            tgt_core: self.get_ep(ep, EpReg::TgtCoreid) as PeId,
            rem_addr: self.get_ep(ep, EpReg::ReqRemAddr),
            rem_size: self.get_ep(ep, EpReg::ReqRemSize),
            flags: Perm::from_bits_truncate(self.get_ep(ep, EpReg::ReqFlags)),
        }
    }

    pub fn set_mem_ep(&mut self, ep: EpId, mep: &MemEp) {
        self.set_ep(ep, EpReg::TgtCoreid, mep.tgt_core as Reg);
        self.set_ep(ep, EpReg::ReqRemAddr, mep.rem_addr);
        self.set_ep(ep, EpReg::ReqRemSize, mep.rem_size);
        self.set_ep(ep, EpReg::ReqFlags, mep.flags.bits());
    }

    /// Clears all registers of the given endpoint
    pub fn invalidate_ep(&mut self, ep: EpId) {
        for r in 0..NUM_EP_REGS {
            if let Ok(reg) = EpReg::try_from(r) {
                self.set_ep(ep, reg, 0);
            }
        }
    }

    /// Handles the register access `pkt` at offset `off` and turns it into the response
    ///
    /// Accesses have to be register aligned and cover whole registers. Global and endpoint
    /// registers can only be written via the NoC or by a privileged core. While a command is
    /// running (`cmd_busy`), all command registers except [`CmdReg::Abort`] are read-only.
    pub fn handle_request(
        &mut self,
        off: u64,
        pkt: &mut Packet,
        from: Accessor,
        cmd_busy: bool,
    ) -> RegAccess {
        let mut res = RegAccess::empty();
        let size = pkt.size();

        if off % cfg::REG_SIZE as u64 != 0
            || size % cfg::REG_SIZE != 0
            || size == 0
            || off as usize + size > self.size()
        {
            log!(
                LogFlags::DtuRegs,
                "Invalid register access at {:#x} with {} bytes",
                off,
                size
            );
            pkt.set_result(Code::InvArgs);
            pkt.make_response();
            return res;
        }

        let privileged = from == Accessor::Noc
            || StatusFlags::from_bits_truncate(self.get(DtuReg::Status)).contains(StatusFlags::PRIV);

        let mut rdata = Vec::new();
        for i in 0..size / cfg::REG_SIZE {
            let id = match self.decode(off + (i * cfg::REG_SIZE) as u64) {
                Some(id) => id,
                None => {
                    pkt.set_result(Code::InvArgs);
                    break;
                },
            };

            if pkt.is_read() {
                let val = self.get_reg(id);
                log!(LogFlags::DtuRegs, "{:?} reads {:?} -> {:#x}", from, id, val);
                rdata.extend_from_slice(&val.to_le_bytes());
                continue;
            }

            let val = pkt.reg(i);
            match id {
                RegId::Dtu(_) | RegId::Ep(..) if !privileged => {
                    log!(LogFlags::DtuRegs, "Rejecting unprivileged write to {:?}", id);
                    pkt.set_result(Code::NoPerm);
                    res |= RegAccess::REJECTED;
                    continue;
                },
                RegId::Cmd(CmdReg::Abort) => res |= RegAccess::WROTE_ABORT,
                RegId::Cmd(_) if cmd_busy => {
                    log!(LogFlags::DtuRegs, "Rejecting write to {:?}: command running", id);
                    res |= RegAccess::REJECTED;
                    continue;
                },
                RegId::Cmd(CmdReg::Command) => res |= RegAccess::WROTE_CMD,
                RegId::Dtu(DtuReg::ExtCmd) => res |= RegAccess::WROTE_EXT_CMD,
                _ => {},
            }

            log!(LogFlags::DtuRegs, "{:?} writes {:?} <- {:#x}", from, id, val);
            self.set_reg(id, val);
        }

        if pkt.is_read() {
            pkt.set_data(rdata);
        }
        pkt.make_response();
        res
    }
}

/// Returns the address of the given register in the address space of a core whose register file
/// is mapped at `reg_base`
pub fn reg_addr(reg_base: u64, id: RegId) -> u64 {
    reg_base + id.addr()
}
