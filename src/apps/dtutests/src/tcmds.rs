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

use base::errors::Code;
use base::kif::Perm;
use base::test::WvTester;
use base::{wv_assert, wv_assert_eq, wv_assert_ok, wv_run_test};
use dtu::regfile::{CmdReg, DtuReg, RegId, ReqReg, StatusFlags, ABORT_CMD};
use dtu::system::System;
use dtu::{Command, ExtCommand, ExtOpcode, Opcode};

use crate::common::{self, CmdArgs, TestCore};

const MEP: usize = 4;
const LOCAL: u64 = 0x4000;
const SIZE: usize = 3000;

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, unknown_cmd);
    wv_run_test!(t, invalid_ep);
    wv_run_test!(t, busy);
    wv_run_test!(t, abort);
    wv_run_test!(t, abort_idle);
    wv_run_test!(t, wakeup);
    wv_run_test!(t, inject_irq);
}

fn mem_system() -> System {
    let mut sys = common::system(2);
    common::config_mem(&mut sys, 0, MEP, 1, 0x2000, 0x4000, Perm::RW);
    wv_assert_ok!(sys.mem_mut(1).write(0x2000, &common::pattern(SIZE, 6)));
    sys
}

/// Runs the system until the command of PE0 has been started and makes some progress
fn run_into_cmd(t: &mut dyn WvTester, sys: &mut System) {
    while !sys.dtu(0).is_cmd_running() {
        wv_assert!(t, sys.step());
    }
    for _ in 0..20 {
        sys.step();
    }
    wv_assert!(t, sys.dtu(0).is_cmd_running());
}

fn unknown_cmd(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    common::issue_raw(&mut sys, 0, 12 | (1 << 4), CmdArgs::new(0, 0));
    sys.run();

    let cmd = sys.dtu(0).command();
    wv_assert_eq!(t, cmd.error, Code::UnknownCmd);
    wv_assert!(t, cmd.is_idle());
    wv_assert_eq!(t, cmd.ep, 1);
    wv_assert_eq!(t, sys.dtu(0).stats().failed_commands, 1);
}

fn invalid_ep(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    for op in [Opcode::Send, Opcode::Reply, Opcode::Read, Opcode::Write, Opcode::IncReadPtr] {
        let res = common::run_cmd(&mut sys, 0, op, 200, CmdArgs::new(0, 8));
        wv_assert_eq!(t, res, Code::InvEP);
    }
    // writing an idle command does not start anything
    common::issue(&mut sys, 0, Opcode::Idle, 0, CmdArgs::new(0, 0));
    sys.run();
    wv_assert_eq!(t, sys.dtu(0).stats().commands, 5);
}

fn busy(t: &mut dyn WvTester) {
    let mut sys = mem_system();
    common::issue(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, SIZE));
    run_into_cmd(t, &mut sys);

    // the arguments of a running command cannot be changed
    let addr = common::cmd_addr(&sys, 0, CmdReg::DataAddr);
    sys.cpu_write_regs(0, addr, &[0x8000]);
    let addr = common::cmd_addr(&sys, 0, CmdReg::Command);
    sys.cpu_write_regs(0, addr, &[Command::new(Opcode::Write, MEP).encode()]);
    sys.run();

    let cmd = sys.dtu(0).command();
    wv_assert_eq!(t, cmd.error, Code::Success);
    wv_assert_eq!(t, cmd.ep, MEP);
    wv_assert_eq!(t, sys.dtu(0).regs().get_cmd(CmdReg::DataAddr), LOCAL);
    wv_assert_eq!(t, sys.dtu(0).stats().rejected_writes, 2);
    wv_assert_eq!(t, sys.dtu(0).stats().commands, 1);
    wv_assert_eq!(t, common::read_mem(&sys, 0, LOCAL, SIZE), common::pattern(SIZE, 6));
}

fn abort(t: &mut dyn WvTester) {
    let mut sys = mem_system();
    common::issue(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, SIZE));
    run_into_cmd(t, &mut sys);

    let addr = common::cmd_addr(&sys, 0, CmdReg::Abort);
    sys.cpu_write_regs(0, addr, &[ABORT_CMD]);
    sys.run();

    let cmd = sys.dtu(0).command();
    wv_assert_eq!(t, cmd.error, Code::Abort);
    wv_assert!(t, cmd.is_idle());
    wv_assert!(t, !sys.dtu(0).is_cmd_running());
    wv_assert_eq!(t, sys.dtu(0).regs().get_cmd(CmdReg::Abort), 0);
    wv_assert_eq!(t, sys.dtu(0).active_transfers(), 0);
    wv_assert_eq!(t, sys.dtu(0).stats().aborted_commands, 1);

    // the late responses of the aborted command do not disturb the next one
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(0x8000, SIZE));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 0, 0x8000, SIZE), common::pattern(SIZE, 6));
    wv_assert_eq!(t, sys.dtu(0).stats().aborted_commands, 1);
}

fn abort_idle(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    let res = common::run_cmd(&mut sys, 0, Opcode::WakeupCore, 0, CmdArgs::new(0, 0));
    wv_assert_eq!(t, res, Code::Success);

    let addr = common::cmd_addr(&sys, 0, CmdReg::Abort);
    sys.cpu_write_regs(0, addr, &[ABORT_CMD]);
    sys.run();

    // nothing to abort, so the last result stays
    wv_assert_eq!(t, sys.dtu(0).command().error, Code::Success);
    wv_assert_eq!(t, sys.dtu(0).stats().aborted_commands, 0);
    wv_assert_eq!(t, sys.dtu(0).regs().get_cmd(CmdReg::Abort), 0);
}

fn wakeup(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    wv_assert_ok!(sys.set_core(0, Box::new(TestCore::default())));

    // the command wakes up the core and so does its completion
    let res = common::run_cmd(&mut sys, 0, Opcode::WakeupCore, 0, CmdArgs::new(0, 0));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::test_core(&sys, 0).wakeups, 2);

    // no endpoint is involved
    let res = common::run_cmd(&mut sys, 0, Opcode::WakeupCore, 255, CmdArgs::new(0, 0));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::test_core(&sys, 0).wakeups, 4);
}

fn inject_irq(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    wv_assert_ok!(sys.set_core(0, Box::new(TestCore::default())));
    sys.dtu_mut(0).regs_mut().set(DtuReg::Status, StatusFlags::PRIV.bits());

    let addr = common::reg(&sys, 0, RegId::Dtu(DtuReg::ExtCmd));
    sys.cpu_write_regs(0, addr, &[ExtCommand::new(ExtOpcode::InjectIrq, 0).encode()]);
    sys.run();

    let core = common::test_core(&sys, 0);
    wv_assert_eq!(t, core.irqs, 1);
    wv_assert_eq!(t, core.wakeups, 0);
    wv_assert_eq!(t, sys.dtu(0).regs().get_req(ReqReg::ExtReq), 1);

    let ext = ExtCommand::decode(sys.dtu(0).regs().get(DtuReg::ExtCmd));
    wv_assert_eq!(t, ext.opcode(), Some(ExtOpcode::Idle));
    wv_assert_eq!(t, ext.error, Code::Success);

    // the core acknowledges the request
    let addr = common::reg(&sys, 0, RegId::Req(ReqReg::ExtReq));
    sys.cpu_write_regs(0, addr, &[0]);
    sys.run();
    wv_assert_eq!(t, sys.dtu(0).regs().get_req(ReqReg::ExtReq), 0);

    let ext = ExtCommand::new(ExtOpcode::WakeupCore, 0).encode();
    sys.cpu_write_regs(0, common::reg(&sys, 0, RegId::Dtu(DtuReg::ExtCmd)), &[ext]);
    sys.run();
    wv_assert_eq!(t, common::test_core(&sys, 0).wakeups, 1);
}
