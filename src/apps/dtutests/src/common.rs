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

//! Helpers to build and drive small systems in the tests

use std::any::Any;

use base::errors::Code;
use base::kif::Perm;
use base::{wv_assert_ok, wv_assert_some};
use dtu::packet::Packet;
use dtu::port::{Port, Requester};
use dtu::regfile::{reg_addr, CmdReg, MemEp, RecvEp, RegId, SendEp};
use dtu::sim::Ctx;
use dtu::system::{Core, System};
use dtu::{Command, DtuParams, EpId, Opcode, PeId, INVALID_EP};

pub const MEM_SIZE: usize = 64 * 1024;

/// Creates a system with `count` PEs that use the default parameters
pub fn system(count: usize) -> System {
    system_with(DtuParams::default(), count)
}

/// Creates a system with `count` PEs that use the given parameters
pub fn system_with(params: DtuParams, count: usize) -> System {
    let mut sys = System::new();
    for _ in 0..count {
        wv_assert_ok!(sys.add_pe(params.clone(), MEM_SIZE));
    }
    sys
}

pub fn cmd_addr(sys: &System, pe: PeId, reg: CmdReg) -> u64 {
    reg_addr(sys.dtu(pe).params().reg_base, RegId::Cmd(reg))
}

pub fn reg(sys: &System, pe: PeId, id: RegId) -> u64 {
    reg_addr(sys.dtu(pe).params().reg_base, id)
}

/// The arguments of a command
#[derive(Copy, Clone, Debug)]
pub struct CmdArgs {
    pub data: u64,
    pub size: usize,
    pub offset: u64,
    pub reply_ep: EpId,
    pub reply_label: u64,
}

impl CmdArgs {
    pub fn new(data: u64, size: usize) -> Self {
        Self {
            data,
            size,
            offset: 0,
            reply_ep: INVALID_EP,
            reply_label: 0,
        }
    }

    pub fn offset(mut self, off: u64) -> Self {
        self.offset = off;
        self
    }

    pub fn reply(mut self, ep: EpId, label: u64) -> Self {
        self.reply_ep = ep;
        self.reply_label = label;
        self
    }
}

/// Writes the command registers of PE `pe` as its core would do
pub fn issue_raw(sys: &mut System, pe: PeId, cmd: u64, args: CmdArgs) {
    let addr = cmd_addr(sys, pe, CmdReg::Command);
    sys.cpu_write_regs(pe, addr, &[
        cmd,
        0,
        args.data,
        args.size as u64,
        args.offset,
        args.reply_ep as u64,
        args.reply_label,
    ]);
}

pub fn issue(sys: &mut System, pe: PeId, op: Opcode, ep: EpId, args: CmdArgs) {
    issue_raw(sys, pe, Command::new(op, ep).encode(), args);
}

/// Executes the given command to completion and returns its result
pub fn run_cmd(sys: &mut System, pe: PeId, op: Opcode, ep: EpId, args: CmdArgs) -> Code {
    issue(sys, pe, op, ep, args);
    sys.run();
    sys.dtu(pe).command().error
}

pub fn config_send(
    sys: &mut System,
    pe: PeId,
    ep: EpId,
    dst: (PeId, EpId),
    max_msg_size: usize,
    label: u64,
    credits: u64,
) {
    sys.dtu_mut(pe).regs_mut().set_send_ep(ep, &SendEp {
        tgt_core: dst.0,
        tgt_ep: dst.1,
        max_msg_size,
        label,
        credits,
        max_credits: credits,
    });
}

pub fn config_recv(sys: &mut System, pe: PeId, ep: EpId, buf_addr: u64, msg_size: usize, slots: usize) {
    sys.dtu_mut(pe).regs_mut().set_recv_ep(ep, &RecvEp {
        buf_addr,
        msg_size,
        size: slots,
        ..Default::default()
    });
}

pub fn config_mem(sys: &mut System, pe: PeId, ep: EpId, dst: PeId, addr: u64, size: u64, perm: Perm) {
    sys.dtu_mut(pe).regs_mut().set_mem_ep(ep, &MemEp {
        tgt_core: dst,
        rem_addr: addr,
        rem_size: size,
        flags: perm,
    });
}

/// Returns `len` bytes of a pattern that depends on `seed`
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
        .collect()
}

pub fn read_mem(sys: &System, pe: PeId, addr: u64, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    wv_assert_ok!(sys.mem(pe).read(addr, &mut buf));
    buf
}

/// A core that does nothing but record what it receives
#[derive(Default)]
pub struct TestCore {
    pub responses: Vec<Packet>,
    pub wakeups: u64,
    pub irqs: u64,
}

impl Requester for TestCore {
    fn complete_request(&mut self, _port: Port, pkt: Packet, _ctx: &mut Ctx<'_>) {
        self.responses.push(pkt);
    }
}

impl Core for TestCore {
    fn tick(&mut self, _ctx: &mut Ctx<'_>) {
    }

    fn wakeup(&mut self, _ctx: &mut Ctx<'_>) {
        self.wakeups += 1;
    }

    fn interrupt(&mut self, _ctx: &mut Ctx<'_>) {
        self.irqs += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn test_core(sys: &System, pe: PeId) -> &TestCore {
    wv_assert_some!(sys.core::<TestCore>(pe))
}
