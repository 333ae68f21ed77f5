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

//! Contains the command engine of the DTU

use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use base::cfg;
use base::errors::{Code, Error};
use base::io::LogFlags;
use base::log;
use base::time::{Clock, Cycles, Tick};

use crate::mem::MemCmdState;
use crate::msg::MsgUnit;
use crate::noc::{NocAddr, NocPacketType};
use crate::packet::{MemReqType, Packet, SenderState};
use crate::params::DtuParams;
use crate::port::{Port, Requester, Responder};
use crate::pt::PtUnit;
use crate::regfile::{Accessor, CmdReg, DtuReg, Reg, RegAccess, RegFile, ReqReg, ABORT_CMD};
use crate::sim::{Ctx, Event};
use crate::tlb::Tlb;
use crate::xfer::XferUnit;
use crate::{EpId, PeId};

/// The opcodes of the command register
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Opcode {
    Idle,
    Send,
    Reply,
    Read,
    Write,
    IncReadPtr,
    WakeupCore,
}

/// The content of the command register
///
/// Layout: `| error | epid:CMD_EPID_BITS | opcode:CMD_OPCODE_BITS |`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// The raw opcode; might not denote a known [`Opcode`]
    pub opcode: u64,
    pub ep: EpId,
    pub error: Code,
}

impl Command {
    const OPCODE_MASK: Reg = (1 << cfg::CMD_OPCODE_BITS) - 1;
    const EPID_MASK: Reg = (1 << cfg::CMD_EPID_BITS) - 1;
    const ERROR_SHIFT: u32 = cfg::CMD_OPCODE_BITS + cfg::CMD_EPID_BITS;

    /// Creates a new command with given opcode and endpoint
    pub fn new(opcode: Opcode, ep: EpId) -> Self {
        Self {
            opcode: opcode.into(),
            ep,
            error: Code::Success,
        }
    }

    /// Decodes the given command register value
    pub fn decode(reg: Reg) -> Self {
        Self {
            opcode: reg & Self::OPCODE_MASK,
            ep: ((reg >> cfg::CMD_OPCODE_BITS) & Self::EPID_MASK) as EpId,
            error: Code::from_field(reg >> Self::ERROR_SHIFT),
        }
    }

    /// Encodes this command into a register value
    pub fn encode(&self) -> Reg {
        (self.opcode & Self::OPCODE_MASK)
            | ((self.ep as Reg) & Self::EPID_MASK) << cfg::CMD_OPCODE_BITS
            | (u32::from(self.error) as Reg) << Self::ERROR_SHIFT
    }

    /// Returns the opcode, if it is known
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    pub fn is_idle(&self) -> bool {
        self.opcode == Reg::from(Opcode::Idle)
    }
}

/// The opcodes of the external command register
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ExtOpcode {
    Idle,
    /// Wakes up the core
    WakeupCore,
    /// Invalidates the TLB entry of the page denoted by the argument
    InvPage,
    /// Invalidates all TLB entries
    InvTlb,
    /// Injects an interrupt into the core
    InjectIrq,
}

/// The content of the external command register
///
/// Layout: `| arg (page aligned) | error:8 | opcode:4 |`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExtCommand {
    pub opcode: u64,
    pub error: Code,
    pub arg: u64,
}

impl ExtCommand {
    const OPCODE_MASK: Reg = 0xF;
    const ERROR_SHIFT: u32 = 4;
    const ERROR_MASK: Reg = 0xFF;

    pub fn new(opcode: ExtOpcode, arg: u64) -> Self {
        Self {
            opcode: opcode.into(),
            error: Code::Success,
            arg: arg & !(cfg::PAGE_MASK as u64),
        }
    }

    pub fn decode(reg: Reg) -> Self {
        Self {
            opcode: reg & Self::OPCODE_MASK,
            error: Code::from_field((reg >> Self::ERROR_SHIFT) & Self::ERROR_MASK),
            arg: reg & !(cfg::PAGE_MASK as u64),
        }
    }

    pub fn encode(&self) -> Reg {
        (self.opcode & Self::OPCODE_MASK)
            | ((u32::from(self.error) as Reg) & Self::ERROR_MASK) << Self::ERROR_SHIFT
            | (self.arg & !(cfg::PAGE_MASK as u64))
    }

    pub fn opcode(&self) -> Option<ExtOpcode> {
        ExtOpcode::try_from(self.opcode).ok()
    }
}

/// The internal events of the DTU
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DtuEvent {
    /// Execute the command that has been written to the command register
    ExecCmd,
    /// Finish the command with given sequence number
    FinishCmd { seq: u64, result: Code },
    /// Execute the external command
    ExecExtCmd,
    /// Perform the next local memory access of the given transfer
    Xfer(u64),
}

/// Statistics of a DTU
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DtuStats {
    pub commands: u64,
    pub failed_commands: u64,
    pub aborted_commands: u64,
    pub rejected_writes: u64,
    pub msgs_sent: u64,
    pub msgs_received: u64,
    pub msgs_dropped: u64,
    pub noc_reads: u64,
    pub noc_writes: u64,
    pub noc_packets: u64,
    pub tlb_hits: u64,
    pub tlb_misses: u64,
    pub pt_walks: u64,
    pub translation_faults: u64,
    pub recv_errors: u64,
}

impl fmt::Display for DtuStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  commands: {} ({} failed, {} aborted, {} rejected writes)",
            self.commands, self.failed_commands, self.aborted_commands, self.rejected_writes
        )?;
        writeln!(
            f,
            "  messages: {} sent, {} received, {} dropped, {} receive errors",
            self.msgs_sent, self.msgs_received, self.msgs_dropped, self.recv_errors
        )?;
        writeln!(
            f,
            "  noc: {} packets, {} reads, {} writes",
            self.noc_packets, self.noc_reads, self.noc_writes
        )?;
        write!(
            f,
            "  translation: {} hits, {} misses, {} walks, {} faults",
            self.tlb_hits, self.tlb_misses, self.pt_walks, self.translation_faults
        )
    }
}

/// The data transfer unit of one processing element
pub struct Dtu {
    pub(crate) id: PeId,
    pub(crate) params: DtuParams,
    pub(crate) clock: Clock,
    pub(crate) regs: RegFile,
    pub(crate) mem_size: usize,
    pub(crate) stats: DtuStats,

    pub(crate) cmd: Command,
    pub(crate) cmd_seq: u64,
    pub(crate) cmd_running: bool,

    pub(crate) mem_cmd: Option<MemCmdState>,
    pub(crate) msgs: MsgUnit,
    pub(crate) xfers: XferUnit,
    pub(crate) pts: PtUnit,
    pub(crate) tlb: Tlb,
}

impl Dtu {
    /// Creates a new DTU for PE `id` with a local memory of `mem_size` bytes
    pub fn new(id: PeId, params: DtuParams, mem_size: usize) -> Result<Self, Error> {
        params.validate()?;
        if mem_size as u64 > params.reg_base {
            return Err(Error::new(Code::InvArgs));
        }

        Ok(Self {
            id,
            clock: Clock::new(params.clock_period),
            regs: RegFile::new(params.num_endpoints),
            mem_size,
            stats: DtuStats::default(),
            cmd: Command::new(Opcode::Idle, 0),
            cmd_seq: 0,
            cmd_running: false,
            mem_cmd: None,
            msgs: MsgUnit::new(params.num_endpoints),
            xfers: XferUnit::new(params.buf_count),
            pts: PtUnit::default(),
            tlb: Tlb::new(params.tlb_entries),
            params,
        })
    }

    pub fn id(&self) -> PeId {
        self.id
    }

    pub fn params(&self) -> &DtuParams {
        &self.params
    }

    pub fn regs(&self) -> &RegFile {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut RegFile {
        &mut self.regs
    }

    pub fn stats(&self) -> &DtuStats {
        &self.stats
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn tlb_mut(&mut self) -> &mut Tlb {
        &mut self.tlb
    }

    /// Returns the current content of the command register
    pub fn command(&self) -> Command {
        Command::decode(self.regs.get_cmd(CmdReg::Command))
    }

    /// Returns true if a command is being executed
    pub fn is_cmd_running(&self) -> bool {
        self.cmd_running
    }

    /// Returns the number of transfers that are in flight or waiting for a buffer
    pub fn active_transfers(&self) -> usize {
        self.xfers.len()
    }

    /// Returns the number of page table walks in progress
    pub fn pending_walks(&self) -> usize {
        self.pts.len()
    }

    /// Returns the tick of the clock edge `cycles` cycles from now
    pub(crate) fn at(&self, ctx: &Ctx<'_>, cycles: Cycles) -> Tick {
        self.clock.edge(ctx.now(), cycles)
    }

    /// Returns true if `seq` denotes the command that is currently executed
    pub(crate) fn is_current(&self, seq: u64) -> bool {
        self.cmd_running && seq == self.cmd_seq
    }

    /// Returns true if local accesses have to be translated
    pub(crate) fn translation_enabled(&self) -> bool {
        self.params.tlb_entries > 0 && self.regs.get(DtuReg::RootPt) != 0
    }

    pub(crate) fn wakeup_core(&self, ctx: &mut Ctx<'_>) {
        ctx.schedule(ctx.now(), Event::CoreWakeup);
    }

    /// Handles an internal event
    pub fn handle_event(&mut self, ev: DtuEvent, ctx: &mut Ctx<'_>) {
        match ev {
            DtuEvent::ExecCmd => self.exec_cmd(ctx),
            DtuEvent::FinishCmd { seq, result } => self.complete_cmd(seq, result, ctx),
            DtuEvent::ExecExtCmd => self.exec_ext_cmd(ctx),
            DtuEvent::Xfer(id) => self.xfer_step(id, ctx),
        }
    }

    /// Handles an access to the register file at offset `off`
    fn access_regs(&mut self, off: u64, pkt: &mut Packet, from: Accessor, ctx: &mut Ctx<'_>) {
        let acc = self.regs.handle_request(off, pkt, from, self.cmd_running);

        if acc.contains(RegAccess::REJECTED) {
            self.stats.rejected_writes += 1;
        }
        if acc.contains(RegAccess::WROTE_ABORT) && self.regs.get_cmd(CmdReg::Abort) == ABORT_CMD {
            self.regs.set_cmd(CmdReg::Abort, 0);
            self.abort_cmd(ctx);
        }
        if acc.contains(RegAccess::WROTE_CMD) {
            self.start_cmd(ctx);
        }
        if acc.contains(RegAccess::WROTE_EXT_CMD) {
            let when = self.at(ctx, self.params.register_access_latency);
            ctx.schedule(when, Event::Dtu(DtuEvent::ExecExtCmd));
        }
    }

    fn start_cmd(&mut self, ctx: &mut Ctx<'_>) {
        let cmd = self.command();
        if cmd.is_idle() {
            return;
        }

        self.cmd = cmd;
        self.cmd_seq += 1;
        self.cmd_running = true;
        self.stats.commands += 1;

        log!(
            LogFlags::DtuCmds,
            "Starting command {:?} on EP{} (seq {})",
            cmd.opcode(),
            cmd.ep,
            self.cmd_seq
        );

        let when = self.at(ctx, self.params.register_access_latency);
        ctx.schedule(when, Event::Dtu(DtuEvent::ExecCmd));
    }

    fn exec_cmd(&mut self, ctx: &mut Ctx<'_>) {
        if !self.cmd_running {
            return;
        }

        let cmd = self.cmd;
        let op = match cmd.opcode() {
            Some(op) => op,
            None => {
                log!(LogFlags::Error, "Unknown command opcode {}", cmd.opcode);
                return self.finish_cmd(Code::UnknownCmd, ctx);
            },
        };

        if op != Opcode::WakeupCore && cmd.ep >= self.params.num_endpoints {
            log!(LogFlags::Error, "{:?}: invalid endpoint {}", op, cmd.ep);
            return self.finish_cmd(Code::InvEP, ctx);
        }

        match op {
            Opcode::Idle => self.finish_cmd(Code::Success, ctx),
            Opcode::Send => self.start_send(ctx),
            Opcode::Reply => self.start_reply(ctx),
            Opcode::Read => self.start_mem_cmd(false, ctx),
            Opcode::Write => self.start_mem_cmd(true, ctx),
            Opcode::IncReadPtr => {
                let res = self.inc_read_ptr(cmd.ep);
                self.finish_cmd(res, ctx);
            },
            Opcode::WakeupCore => {
                self.wakeup_core(ctx);
                self.finish_cmd(Code::Success, ctx);
            },
        }
    }

    /// Finishes the current command with `result` at the next clock edge
    pub(crate) fn finish_cmd(&mut self, result: Code, ctx: &mut Ctx<'_>) {
        let when = self.at(ctx, 1);
        ctx.schedule(when, Event::Dtu(DtuEvent::FinishCmd {
            seq: self.cmd_seq,
            result,
        }));
    }

    fn complete_cmd(&mut self, seq: u64, result: Code, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            log!(LogFlags::DtuCmds, "Ignoring completion of stale command {}", seq);
            return;
        }

        log!(
            LogFlags::DtuCmds,
            "Finished command {:?} on EP{} with {:?}",
            self.cmd.opcode(),
            self.cmd.ep,
            result
        );

        if result != Code::Success {
            self.stats.failed_commands += 1;
        }
        self.write_back(result);
        self.wakeup_core(ctx);
    }

    fn write_back(&mut self, result: Code) {
        self.cmd_running = false;
        self.mem_cmd = None;
        self.msgs.reply = None;

        let mut done = Command::new(Opcode::Idle, self.cmd.ep);
        done.error = result;
        self.regs.set_cmd(CmdReg::Command, done.encode());
    }

    fn abort_cmd(&mut self, ctx: &mut Ctx<'_>) {
        if !self.cmd_running {
            log!(LogFlags::DtuCmds, "Abort: no command running");
            return;
        }

        log!(
            LogFlags::DtuCmds,
            "Aborting command {:?} on EP{} (seq {})",
            self.cmd.opcode(),
            self.cmd.ep,
            self.cmd_seq
        );

        self.cancel_cmd_transfers(ctx);
        self.stats.aborted_commands += 1;
        self.write_back(Code::Abort);
        self.wakeup_core(ctx);
    }

    fn exec_ext_cmd(&mut self, ctx: &mut Ctx<'_>) {
        let mut cmd = ExtCommand::decode(self.regs.get(DtuReg::ExtCmd));

        let res = match cmd.opcode() {
            Some(ExtOpcode::Idle) => Code::Success,
            Some(ExtOpcode::WakeupCore) => {
                self.wakeup_core(ctx);
                Code::Success
            },
            Some(ExtOpcode::InvPage) => {
                self.tlb.remove(cmd.arg);
                Code::Success
            },
            Some(ExtOpcode::InvTlb) => {
                self.tlb.clear();
                Code::Success
            },
            Some(ExtOpcode::InjectIrq) => {
                self.regs.set_req(ReqReg::ExtReq, 1);
                ctx.schedule(ctx.now(), Event::CoreIrq);
                Code::Success
            },
            None => Code::UnknownCmd,
        };

        log!(
            LogFlags::DtuCmds,
            "External command {:?} ({:#x}) -> {:?}",
            cmd.opcode(),
            cmd.arg,
            res
        );

        cmd.opcode = ExtOpcode::Idle.into();
        cmd.error = res;
        self.regs.set(DtuReg::ExtCmd, cmd.encode());
    }

    /// Turns `pkt` into a NoC response with given result and sends it back at `when`
    pub(crate) fn noc_respond(&mut self, mut pkt: Packet, result: Code, when: Tick, ctx: &mut Ctx<'_>) {
        pkt.set_result(result);
        if let Some(state) = pkt.noc_state_mut() {
            state.result = result;
        }
        pkt.make_response();
        ctx.reply(Port::Noc, pkt, when);
    }

    /// Sends `pkt` of type `ty` over the NoC at `when`, tagged with the current command
    pub(crate) fn noc_send(&mut self, mut pkt: Packet, ty: NocPacketType, when: Tick, ctx: &mut Ctx<'_>) {
        pkt.push_state(SenderState::Noc(crate::packet::NocSenderState {
            ty,
            src: self.id,
            cmd_seq: self.cmd_seq,
            result: Code::Success,
        }));
        self.stats.noc_packets += 1;
        log!(
            LogFlags::DtuXfers,
            "Sending {:?} to {:?} ({} bytes)",
            ty,
            NocAddr::from_raw(pkt.addr()),
            pkt.size()
        );
        ctx.send(Port::Noc, pkt, when);
    }

    fn recv_noc_request(&mut self, pkt: Packet, ctx: &mut Ctx<'_>) {
        let ty = match pkt.noc_state() {
            Some(s) => s.ty,
            None => {
                log!(LogFlags::Error, "Dropping NoC request without sender state: {:?}", pkt);
                return;
            },
        };

        match ty {
            NocPacketType::Message => self.recv_msg(pkt, ctx),
            NocPacketType::ReadReq | NocPacketType::WriteReq => self.recv_remote_access(pkt, ctx),
            NocPacketType::CacheMemReq | NocPacketType::CacheMemReqFunc => {
                self.recv_cache_mem_req(pkt, ctx)
            },
        }
    }

    fn complete_noc_request(&mut self, pkt: Packet, ctx: &mut Ctx<'_>) {
        let state = match pkt.noc_state() {
            Some(s) => *s,
            None => {
                log!(LogFlags::Error, "Dropping NoC response without sender state: {:?}", pkt);
                return;
            },
        };

        match state.ty {
            NocPacketType::Message => self.msg_sent(state.cmd_seq, pkt.result(), ctx),
            NocPacketType::ReadReq => self.read_chunk_received(state.cmd_seq, pkt, ctx),
            NocPacketType::WriteReq => self.write_chunk_sent(state.cmd_seq, pkt.result(), ctx),
            NocPacketType::CacheMemReq | NocPacketType::CacheMemReqFunc => {
                self.cache_mem_resp(pkt, ctx)
            },
        }
    }

    fn complete_mem_request(&mut self, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        let state = match pkt.pop_state() {
            Some(SenderState::Mem(s)) => s,
            _ => {
                log!(LogFlags::Error, "Dropping memory response without sender state: {:?}", pkt);
                return;
            },
        };

        match state.ty {
            MemReqType::Transfer => self.xfer_mem_resp(state.id, pkt, ctx),
            MemReqType::Header => self.reply_header_read(state.id, pkt, ctx),
            MemReqType::HeaderUpdate => self.reply_header_updated(state.id, pkt.result(), ctx),
            MemReqType::Translation => self.walk_step(state.id, pkt, ctx),
            MemReqType::Functional => {
                let res = pkt.result();
                let when = ctx.now();
                self.noc_respond(pkt, res, when, ctx);
            },
        }
    }
}

impl Responder for Dtu {
    fn recv_request(&mut self, port: Port, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        match port {
            Port::Cpu => {
                let base = self.params.reg_base;
                if pkt.addr() >= base && pkt.addr() < base + self.regs.size() as u64 {
                    self.access_regs(pkt.addr() - base, &mut pkt, Accessor::Cpu, ctx);
                    let when = self.at(ctx, self.params.register_access_latency);
                    ctx.reply(Port::Cpu, pkt, when);
                }
                else {
                    self.start_cache_access(pkt, ctx);
                }
            },

            Port::Noc => {
                let addr = NocAddr::from_raw(pkt.addr());
                let is_reg_access = matches!(
                    pkt.noc_state().map(|s| s.ty),
                    Some(NocPacketType::ReadReq) | Some(NocPacketType::WriteReq)
                ) && addr.offset >= self.params.reg_base;

                if is_reg_access {
                    self.access_regs(addr.offset - self.params.reg_base, &mut pkt, Accessor::Noc, ctx);
                    let res = pkt.result();
                    if let Some(state) = pkt.noc_state_mut() {
                        state.result = res;
                    }
                    let when = self.at(ctx, self.params.register_access_latency);
                    ctx.reply(Port::Noc, pkt, when);
                }
                else {
                    self.recv_noc_request(pkt, ctx);
                }
            },

            Port::Mem => log!(LogFlags::Error, "Unexpected request on memory port: {:?}", pkt),
        }
    }
}

impl Requester for Dtu {
    fn complete_request(&mut self, port: Port, pkt: Packet, ctx: &mut Ctx<'_>) {
        match port {
            Port::Mem => self.complete_mem_request(pkt, ctx),
            Port::Noc => self.complete_noc_request(pkt, ctx),
            Port::Cpu => log!(LogFlags::Error, "Unexpected response on CPU port: {:?}", pkt),
        }
    }
}
