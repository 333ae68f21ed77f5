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

use accel::{AccelContextSwitch, AccelCore, Accelerator, ContextAccel, CtxSwState, RctMuxFlags};
use base::cfg;
use base::errors::Code;
use base::kif::Perm;
use base::test::WvTester;
use base::time::Clock;
use base::{wv_assert, wv_assert_eq, wv_assert_ok, wv_assert_some, wv_run_test};
use dtu::packet::Packet;
use dtu::regfile::{DtuReg, RegId};
use dtu::sim::Event;
use dtu::system::System;
use dtu::{Command, ExtCommand, ExtOpcode, Opcode};

use crate::common::{self, CmdArgs};

const CTX_EP: usize = 4;
const SAVE_AREA: u64 = 0x8000;
const SAVE_SIZE: u64 = 0x2000;
const BUF: u64 = 0x4000;
const CTX_SIZE: usize = 4096;
const STATE_SIZE: usize = 512;

type Core = AccelCore<ContextAccel>;

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, idle);
    wv_run_test!(t, save_restore);
    wv_run_test!(t, odd_sizes);
    wv_run_test!(t, save_error);
    wv_run_test!(t, remote_irq);
    wv_run_test!(t, engine_flags);
    wv_run_test!(t, engine_pending);
}

/// Builds a system with an accelerator on PE0 that saves its context to PE1
fn accel_system(accel: ContextAccel, pes: usize) -> System {
    let mut sys = common::system(pes);
    common::config_mem(&mut sys, 0, CTX_EP, 1, SAVE_AREA, SAVE_SIZE, Perm::RW);
    wv_assert_ok!(sys.set_core(0, Box::new(AccelCore::new(accel, Clock::new(1000)))));
    sys
}

fn default_accel() -> ContextAccel {
    ContextAccel::new(CTX_SIZE, STATE_SIZE, CTX_EP, BUF)
}

fn core(sys: &System) -> &Core {
    wv_assert_some!(sys.core::<Core>(0))
}

fn set_flags(sys: &mut System, flags: RctMuxFlags) {
    wv_assert_ok!(sys.mem_mut(0).write_word(cfg::RCTMUX_FLAGS, flags.bits()));
}

fn flags(sys: &System) -> RctMuxFlags {
    RctMuxFlags::from_bits_truncate(wv_assert_ok!(sys.mem(0).read_word(cfg::RCTMUX_FLAGS)))
}

/// Fills context and state of the accelerator with recognizable data
fn fill(sys: &mut System, seed: u8) -> (Vec<u8>, Vec<u8>) {
    let c = wv_assert_some!(sys.core_mut::<Core>(0));
    let ctx = common::pattern(c.accel().context_size(), seed);
    let state = common::pattern(c.accel().state_size(), seed.wrapping_add(1));
    c.accel_mut().context_mut().copy_from_slice(&ctx);
    let buf = c.accel().buffer_addr();
    wv_assert_ok!(sys.mem_mut(0).write(buf, &state));
    (ctx, state)
}

/// Asks the accelerator on PE0 to save its context and runs until it is done
fn save(sys: &mut System) {
    set_flags(sys, RctMuxFlags::STORE);
    sys.inject(0, Event::CoreIrq);
    sys.run();
}

/// Asks the accelerator on PE0 to restore its context and runs until it is done
fn restore(sys: &mut System) {
    set_flags(sys, RctMuxFlags::RESTORE);
    sys.inject(0, Event::CoreIrq);
    sys.run();
}

fn idle(t: &mut dyn WvTester) {
    let mut sys = accel_system(default_accel(), 2);
    sys.run();

    // without a request of the scheduler, the accelerator keeps working
    let c = core(&sys);
    wv_assert!(t, c.is_parked());
    wv_assert_eq!(t, c.ctxsw().state(), CtxSwState::Check);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Check), 1);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Flags), 1);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Save), 0);
    wv_assert_eq!(t, c.accel().switched(), 0);
}

fn save_restore(t: &mut dyn WvTester) {
    let mut sys = accel_system(default_accel(), 2);
    sys.run();
    let (ctx, state) = fill(&mut sys, 11);

    save(&mut sys);
    {
        let c = core(&sys);
        wv_assert!(t, c.ctxsw().is_waiting());
        wv_assert!(t, c.ctxsw().is_pending());
        wv_assert!(t, c.is_parked());
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Save), 1);
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveWrite), 4);
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveSend), 18);
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveDone), 1);
    }
    wv_assert_eq!(t, flags(&sys), RctMuxFlags::SIGNAL);
    wv_assert_eq!(t, common::read_mem(&sys, 1, SAVE_AREA, CTX_SIZE), ctx);
    wv_assert_eq!(t, common::read_mem(&sys, 1, SAVE_AREA + CTX_SIZE as u64, STATE_SIZE), state);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_writes, 18);

    // another accelerator runs here in the meantime
    fill(&mut sys, 99);
    // a wakeup does not resume a saved accelerator
    sys.inject(0, Event::CoreWakeup);
    sys.run();
    wv_assert!(t, core(&sys).ctxsw().is_waiting());

    restore(&mut sys);
    let c = core(&sys);
    wv_assert!(t, c.is_parked());
    wv_assert!(t, !c.ctxsw().is_pending());
    wv_assert_eq!(t, c.ctxsw().state(), CtxSwState::Check);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Restore), 18);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::RestoreRead), 4);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::RestoreDone), 1);
    wv_assert_eq!(t, c.accel().context(), &ctx[..]);
    wv_assert_eq!(t, c.accel().switched(), 1);
    wv_assert_eq!(t, common::read_mem(&sys, 0, BUF, STATE_SIZE), state);
    wv_assert_eq!(t, flags(&sys), RctMuxFlags::SIGNAL);
    wv_assert_eq!(t, sys.dtu(0).stats().failed_commands, 0);
}

fn odd_sizes(t: &mut dyn WvTester) {
    let accel = ContextAccel::new(1000, 300, CTX_EP, BUF)
        .with_chunk_size(384)
        .with_max_data_size(100);
    let mut sys = accel_system(accel, 2);
    sys.run();
    let (ctx, state) = fill(&mut sys, 21);

    save(&mut sys);
    {
        let c = core(&sys);
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveWrite), 3);
        wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveSend), 13);
    }
    wv_assert_eq!(t, common::read_mem(&sys, 1, SAVE_AREA, 1000), ctx);
    wv_assert_eq!(t, common::read_mem(&sys, 1, SAVE_AREA + 1000, 300), state);

    fill(&mut sys, 77);
    restore(&mut sys);
    let c = core(&sys);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::Restore), 13);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::RestoreRead), 3);
    wv_assert_eq!(t, c.accel().context(), &ctx[..]);
    wv_assert_eq!(t, common::read_mem(&sys, 0, BUF, 300), state);
}

fn save_error(t: &mut dyn WvTester) {
    let mut sys = accel_system(default_accel(), 2);
    sys.dtu_mut(0).regs_mut().invalidate_ep(CTX_EP);
    sys.run();

    save(&mut sys);
    let c = core(&sys);
    // the failed command ends the save instead of being retried
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveSend), 1);
    wv_assert_eq!(t, c.ctxsw().issued(CtxSwState::SaveDone), 1);
    wv_assert!(t, c.ctxsw().is_waiting());
    wv_assert_eq!(t, sys.dtu(0).command().error, Code::NoMEP);
    wv_assert_eq!(t, flags(&sys), RctMuxFlags::SIGNAL);
}

fn remote_irq(t: &mut dyn WvTester) {
    let mut sys = accel_system(default_accel(), 3);
    sys.run();
    let (ctx, _) = fill(&mut sys, 5);
    set_flags(&mut sys, RctMuxFlags::STORE);

    // PE2 acts as the scheduler and injects the interrupt via the external command register
    let ext_cmd = sys.dtu(0).params().reg_base + RegId::Dtu(DtuReg::ExtCmd).addr();
    common::config_mem(&mut sys, 2, 1, 0, ext_cmd, 8, Perm::W);
    let irq = ExtCommand::new(ExtOpcode::InjectIrq, 0).encode();
    wv_assert_ok!(sys.mem_mut(2).write_word(0x100, irq));
    let res = common::run_cmd(&mut sys, 2, Opcode::Write, 1, CmdArgs::new(0x100, 8));
    wv_assert_eq!(t, res, Code::Success);

    wv_assert!(t, core(&sys).ctxsw().is_waiting());
    wv_assert_eq!(t, common::read_mem(&sys, 1, SAVE_AREA, CTX_SIZE), ctx);
    // the engine has acknowledged the request
    wv_assert_eq!(t, sys.dtu(0).regs().get_req(dtu::regfile::ReqReg::ExtReq), 0);
}

/// Delivers the response `resp` to the request that `sw` issues next
fn respond(sw: &mut AccelContextSwitch, acc: &mut ContextAccel, resp: Packet) -> bool {
    wv_assert_some!(sw.tick(acc));
    sw.handle_mem_resp(acc, &resp)
}

fn flags_resp(flags: RctMuxFlags) -> Packet {
    Packet::new_reg_write(cfg::RCTMUX_FLAGS, &[flags.bits()])
}

fn engine_flags(t: &mut dyn WvTester) {
    let mut acc = ContextAccel::new(64, 0, CTX_EP, BUF);
    let mut sw = AccelContextSwitch::new();
    wv_assert_eq!(t, sw.state(), CtxSwState::Check);

    // the first request acknowledges the interrupt
    let pkt = wv_assert_some!(sw.tick(&acc));
    wv_assert!(t, pkt.is_write());
    wv_assert_eq!(t, pkt.addr(), acc.reg_addr(RegId::Req(dtu::regfile::ReqReg::ExtReq)));
    wv_assert!(t, !sw.handle_mem_resp(&mut acc, &pkt));
    wv_assert_eq!(t, sw.state(), CtxSwState::Flags);

    // nothing to do
    wv_assert!(t, respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    wv_assert_eq!(t, sw.state(), CtxSwState::Check);
    // the re-poll keeps the flag of the CHECK -> FLAGS transition
    wv_assert!(t, sw.has_state_changed());

    // the scheduler only waits for a signal
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::WAITING)));
    wv_assert_eq!(t, sw.state(), CtxSwState::RestoreDone);
    let pkt = wv_assert_some!(sw.tick(&acc));
    wv_assert_eq!(t, pkt.addr(), cfg::RCTMUX_FLAGS);
    wv_assert_eq!(t, pkt.reg(0), RctMuxFlags::SIGNAL.bits());
    wv_assert!(t, sw.handle_mem_resp(&mut acc, &pkt));
    wv_assert_eq!(t, sw.state(), CtxSwState::Check);
    wv_assert_eq!(t, acc.switched(), 1);
}

fn engine_pending(t: &mut dyn WvTester) {
    let mut acc = ContextAccel::new(64, 0, CTX_EP, BUF);
    let mut sw = AccelContextSwitch::new();

    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::STORE)));
    wv_assert_eq!(t, sw.state(), CtxSwState::Save);

    // abort, then stage the whole context at once
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    let staged = wv_assert_some!(sw.tick(&acc));
    wv_assert_eq!(t, staged.addr(), BUF - 64);
    wv_assert_eq!(t, staged.size(), 64);
    wv_assert!(t, !sw.handle_mem_resp(&mut acc, &staged));
    wv_assert_eq!(t, sw.state(), CtxSwState::SaveSend);

    // the WRITE command fails
    let mut failed = Command::new(Opcode::Idle, CTX_EP);
    failed.error = Code::NoMEP;
    let cmd = Packet::new_reg_write(0, &[failed.encode()]);
    wv_assert!(t, !respond(&mut sw, &mut acc, cmd.clone()));
    wv_assert_eq!(t, sw.offset(), 64);
    wv_assert!(t, !respond(&mut sw, &mut acc, cmd));
    wv_assert_eq!(t, sw.state(), CtxSwState::SaveDone);
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));

    wv_assert!(t, sw.is_waiting());
    wv_assert!(t, sw.is_pending());
    wv_assert!(t, sw.tick(&acc).is_none());

    // without a request to restore, the engine goes back to waiting
    sw.restart();
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    wv_assert!(t, !respond(&mut sw, &mut acc, flags_resp(RctMuxFlags::empty())));
    wv_assert!(t, sw.is_waiting());
    wv_assert_eq!(t, acc.switched(), 0);
}
