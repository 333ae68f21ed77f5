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
use base::{wv_assert, wv_assert_eq, wv_assert_ok, wv_assert_some, wv_run_test};
use dtu::packet::Packet;
use dtu::regfile::{EpReg, RegId};
use dtu::system::System;
use dtu::{DtuParams, Opcode};

use crate::common::{self, CmdArgs, TestCore};

const MEP: usize = 4;
const REGION: u64 = 0x2000;
const REGION_SIZE: u64 = 0x1000;
const LOCAL: u64 = 0x4000;

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, write_read);
    wv_run_test!(t, bounds);
    wv_run_test!(t, perms);
    wv_run_test!(t, empty);
    wv_run_test!(t, remote_bounds);
    wv_run_test!(t, remote_regs);
    wv_run_test!(t, cache);
    wv_run_test!(t, cache_functional);
    wv_run_test!(t, cache_without_mem);
}

fn setup(perm: Perm) -> System {
    let mut sys = common::system(2);
    common::config_mem(&mut sys, 0, MEP, 1, REGION, REGION_SIZE, perm);
    sys
}

fn write_read(t: &mut dyn WvTester) {
    let mut sys = setup(Perm::RW);
    let data = common::pattern(3000, 3);
    wv_assert_ok!(sys.mem_mut(0).write(LOCAL, &data));

    // the data is split into chunks of at most one NoC packet
    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 3000).offset(0x10));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 1, REGION + 0x10, 3000), data);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_writes, 3);
    // nothing outside the written range is touched
    wv_assert_eq!(t, common::read_mem(&sys, 1, REGION, 0x10), vec![0u8; 0x10]);

    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(0x8000, 3000).offset(0x10));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 0, 0x8000, 3000), data);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_reads, 3);

    wv_assert_eq!(t, sys.dtu(0).active_transfers(), 0);
    wv_assert_eq!(t, sys.dtu(1).active_transfers(), 0);
    wv_assert!(t, !sys.dtu(0).is_cmd_running());
}

fn bounds(t: &mut dyn WvTester) {
    let mut sys = setup(Perm::RW);

    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 0x100).offset(0xF01));
    wv_assert_eq!(t, res, Code::OutOfBounds);
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 0x1001));
    wv_assert_eq!(t, res, Code::OutOfBounds);
    // offset + size overflows
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 0x10).offset(u64::MAX - 4));
    wv_assert_eq!(t, res, Code::OutOfBounds);

    // the last byte of the region is accessible
    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 0x100).offset(0xF00));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_packets, 1);
}

fn perms(t: &mut dyn WvTester) {
    let mut sys = setup(Perm::R);
    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 8));
    wv_assert_eq!(t, res, Code::NoPerm);
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 8));
    wv_assert_eq!(t, res, Code::Success);

    common::config_mem(&mut sys, 0, MEP, 1, REGION, REGION_SIZE, Perm::W);
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 8));
    wv_assert_eq!(t, res, Code::NoPerm);

    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP + 1, CmdArgs::new(LOCAL, 8));
    wv_assert_eq!(t, res, Code::NoMEP);
    wv_assert_eq!(t, sys.dtu(0).stats().failed_commands, 3);
}

fn empty(t: &mut dyn WvTester) {
    let mut sys = setup(Perm::RW);
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 0).offset(REGION_SIZE));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_packets, 0);
}

fn remote_bounds(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    // the endpoint permits more than the memory of PE1 holds
    common::config_mem(&mut sys, 0, MEP, 1, 0xFFF0, 0x100, Perm::RW);

    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 0x20));
    wv_assert_eq!(t, res, Code::OutOfBounds);
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL, 0x10));
    wv_assert_eq!(t, res, Code::Success);
}

fn remote_regs(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    common::config_send(&mut sys, 1, 3, (0, 2), 64, 0, 1);
    sys.dtu_mut(1).regs_mut().set_ep(3, EpReg::Credits, 0);

    let credits = sys.dtu(1).params().reg_base + RegId::Ep(3, EpReg::Credits).addr();
    common::config_mem(&mut sys, 0, MEP, 1, credits, 8, Perm::RW);

    // the registers of other DTUs are written with privileges
    wv_assert_ok!(sys.mem_mut(0).write_word(LOCAL, 1));
    let res = common::run_cmd(&mut sys, 0, Opcode::Write, MEP, CmdArgs::new(LOCAL, 8));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, sys.dtu(1).regs().send_ep(3).credits, 1);

    let res = common::run_cmd(&mut sys, 0, Opcode::Read, MEP, CmdArgs::new(LOCAL + 8, 8));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, wv_assert_ok!(sys.mem(0).read_word(LOCAL + 8)), 1);
}

/// Builds a system whose PE0 has a core with its cache misses served by PE1
fn cache_system() -> System {
    let params = DtuParams {
        mem_pe: Some(1),
        ..Default::default()
    };
    let mut sys = System::new();
    wv_assert_ok!(sys.add_pe(params, common::MEM_SIZE));
    wv_assert_ok!(sys.add_pe(DtuParams::default(), 4 * common::MEM_SIZE));
    wv_assert_ok!(sys.set_core(0, Box::new(TestCore::default())));
    sys
}

fn cache(t: &mut dyn WvTester) {
    let mut sys = cache_system();
    let data = common::pattern(64, 5);
    wv_assert_ok!(sys.mem_mut(1).write(0x20000, &data));

    sys.cpu_request(0, Packet::new_read(0x20000, 64));
    sys.cpu_request(0, Packet::new_write(0x20040, data.clone()));
    let end = sys.run();
    wv_assert!(t, end > 0);

    let core = common::test_core(&sys, 0);
    wv_assert_eq!(t, core.responses.len(), 2);
    wv_assert!(t, core.responses.iter().all(|r| r.is_response() && !r.is_error()));
    let rd = wv_assert_some!(core.responses.iter().find(|r| r.is_read()));
    wv_assert_eq!(t, rd.addr(), 0x20000);
    wv_assert_eq!(t, rd.data(), &data[..]);
    let wr = wv_assert_some!(core.responses.iter().find(|r| r.is_write()));
    wv_assert_eq!(t, wr.addr(), 0x20040);
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x20040, 64), data);
}

fn cache_functional(t: &mut dyn WvTester) {
    let mut sys = cache_system();
    wv_assert_ok!(sys.mem_mut(1).write(0x30000, &[0xAB; 16]));

    let mut pkt = Packet::new_read(0x30000, 16);
    pkt.set_functional(true);
    sys.cpu_request(0, pkt);
    // functional accesses do not take time
    wv_assert_eq!(t, sys.run(), 0);

    let core = common::test_core(&sys, 0);
    wv_assert_eq!(t, core.responses.len(), 1);
    wv_assert_eq!(t, core.responses[0].data(), &[0xABu8; 16][..]);
}

fn cache_without_mem(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    wv_assert_ok!(sys.set_core(0, Box::new(TestCore::default())));

    sys.cpu_request(0, Packet::new_read(0x20000, 8));
    sys.run();

    let core = common::test_core(&sys, 0);
    wv_assert_eq!(t, core.responses.len(), 1);
    wv_assert_eq!(t, core.responses[0].result(), Code::NoMEP);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_packets, 0);
}
