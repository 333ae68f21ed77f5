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
use dtu::regfile::{DtuReg, RegId, StatusFlags};
use dtu::system::System;
use dtu::tlb::{Tlb, TlbResult};
use dtu::{DtuParams, ExtCommand, ExtOpcode, Opcode, PeId};

use crate::common::{self, CmdArgs, TestCore};

const ROOT_PT: u64 = 0x8000;
const VIRT: u64 = 0x40_0000;
const VIRT_RO: u64 = 0x40_1000;
const UNMAPPED: u64 = 0x80_0000;
const PAGE: u64 = 0xA000;
const PAGE_RO: u64 = 0xB000;

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, lookup);
    wv_run_test!(t, lru);
    wv_run_test!(t, invalidate);
    wv_run_test!(t, walk);
    wv_run_test!(t, fault);
    wv_run_test!(t, perm_fault);
    wv_run_test!(t, ext_cmds);
    wv_run_test!(t, ext_cmds_unpriv);
    wv_run_test!(t, cache);
}

fn lookup(t: &mut dyn WvTester) {
    let mut tlb = Tlb::new(4);
    wv_assert!(t, tlb.is_empty());
    wv_assert_eq!(t, tlb.lookup(0x1000, Perm::R), TlbResult::Miss);

    tlb.insert(0x1234, 0x5678, Perm::R);
    wv_assert_eq!(t, tlb.len(), 1);
    wv_assert_eq!(t, tlb.lookup(0x1010, Perm::R), TlbResult::Hit(0x5010));
    wv_assert_eq!(t, tlb.lookup(0x1FFF, Perm::R), TlbResult::Hit(0x5FFF));
    wv_assert_eq!(t, tlb.lookup(0x1010, Perm::W), TlbResult::PageFault);
    wv_assert_eq!(t, tlb.lookup(0x2000, Perm::R), TlbResult::Miss);

    // reinserting replaces the entry
    tlb.insert(0x1000, 0x7000, Perm::RW);
    wv_assert_eq!(t, tlb.len(), 1);
    wv_assert_eq!(t, tlb.lookup(0x1008, Perm::W), TlbResult::Hit(0x7008));

    let mut none = Tlb::new(0);
    none.insert(0x1000, 0x2000, Perm::RW);
    wv_assert!(t, none.is_empty());
}

fn lru(t: &mut dyn WvTester) {
    let mut tlb = Tlb::new(2);
    tlb.insert(0x1000, 0x1000, Perm::R);
    tlb.insert(0x2000, 0x2000, Perm::R);

    // 0x2000 is now the least recently used one
    wv_assert_eq!(t, tlb.lookup(0x1000, Perm::R), TlbResult::Hit(0x1000));
    tlb.insert(0x3000, 0x3000, Perm::R);

    wv_assert_eq!(t, tlb.len(), 2);
    wv_assert_eq!(t, tlb.capacity(), 2);
    wv_assert_eq!(t, tlb.lookup(0x2000, Perm::R), TlbResult::Miss);
    wv_assert_eq!(t, tlb.lookup(0x1000, Perm::R), TlbResult::Hit(0x1000));
    wv_assert_eq!(t, tlb.lookup(0x3000, Perm::R), TlbResult::Hit(0x3000));
}

fn invalidate(t: &mut dyn WvTester) {
    let mut tlb = Tlb::new(8);
    for i in 1..=4 {
        tlb.insert(i * 0x1000, i * 0x10000, Perm::RW);
    }

    tlb.remove(0x2abc);
    wv_assert_eq!(t, tlb.len(), 3);
    wv_assert_eq!(t, tlb.lookup(0x2000, Perm::R), TlbResult::Miss);
    // removing a missing entry is fine
    tlb.remove(0x9000);
    wv_assert_eq!(t, tlb.len(), 3);

    tlb.clear();
    wv_assert!(t, tlb.is_empty());
    wv_assert_eq!(t, tlb.lookup(0x1000, Perm::R), TlbResult::Miss);
}

fn write_pte(sys: &mut System, pe: PeId, addr: u64, pte: u64) {
    wv_assert_ok!(sys.mem_mut(pe).write_word(addr, pte));
}

/// Maps VIRT to PAGE (RW) and VIRT_RO to PAGE_RO (R) in the address space of PE `pe`
fn map_pages(sys: &mut System, pe: PeId) {
    let rw = Perm::RW.bits();
    write_pte(sys, pe, ROOT_PT + 0x10, 0x9000 | rw);
    write_pte(sys, pe, 0x9000, PAGE | rw);
    write_pte(sys, pe, 0x9008, PAGE_RO | Perm::R.bits());
    sys.dtu_mut(pe).regs_mut().set(DtuReg::RootPt, ROOT_PT);
}

fn walk(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    map_pages(&mut sys, 0);
    common::config_send(&mut sys, 0, 1, (1, 2), 128, 0, 2);
    common::config_recv(&mut sys, 1, 2, 0x1000, 128, 4);

    wv_assert_ok!(sys.mem_mut(0).write(PAGE + 0x10, &common::pattern(32, 4)));
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 1, CmdArgs::new(VIRT + 0x10, 32));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x1000 + 24, 32), common::pattern(32, 4));

    wv_assert_eq!(t, sys.dtu(0).stats().pt_walks, 1);
    wv_assert_eq!(t, sys.dtu(0).stats().tlb_misses, 1);
    wv_assert_eq!(t, sys.dtu(0).tlb().len(), 1);

    // the second message uses the TLB entry
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 1, CmdArgs::new(VIRT + 0x10, 32));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, sys.dtu(0).stats().pt_walks, 1);
    wv_assert!(t, sys.dtu(0).stats().tlb_hits >= 1);
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(2).msg_count, 2);
    wv_assert_eq!(t, sys.dtu(0).pending_walks(), 0);
}

fn fault(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    map_pages(&mut sys, 0);
    common::config_send(&mut sys, 0, 1, (1, 2), 128, 0, 2);
    common::config_recv(&mut sys, 1, 2, 0x1000, 128, 4);

    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 1, CmdArgs::new(UNMAPPED, 32));
    wv_assert_eq!(t, res, Code::TranslationFault);
    wv_assert_eq!(t, sys.dtu(0).stats().translation_faults, 1);
    wv_assert_eq!(t, sys.dtu(0).pending_walks(), 0);
    wv_assert_eq!(t, sys.dtu(0).active_transfers(), 0);
    wv_assert!(t, sys.dtu(0).tlb().is_empty());
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(2).msg_count, 0);

    // the DTU is usable afterwards
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 1, CmdArgs::new(VIRT, 32));
    wv_assert_eq!(t, res, Code::Success);
}

fn perm_fault(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    map_pages(&mut sys, 0);
    common::config_mem(&mut sys, 0, 4, 1, 0x2000, 0x1000, Perm::RW);
    wv_assert_ok!(sys.mem_mut(1).write(0x2000, &common::pattern(64, 2)));

    // the page is read-only, so it cannot receive data
    let res = common::run_cmd(&mut sys, 0, Opcode::Read, 4, CmdArgs::new(VIRT_RO, 64));
    wv_assert_eq!(t, res, Code::TranslationFault);
    wv_assert_eq!(t, common::read_mem(&sys, 0, PAGE_RO, 64), vec![0u8; 64]);

    // but it can be the source of a WRITE
    let res = common::run_cmd(&mut sys, 0, Opcode::Write, 4, CmdArgs::new(VIRT_RO, 64));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x2000, 64), vec![0u8; 64]);

    let res = common::run_cmd(&mut sys, 0, Opcode::Read, 4, CmdArgs::new(VIRT, 64));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 0, PAGE, 64), vec![0u8; 64]);
    wv_assert_eq!(t, sys.dtu(0).active_transfers(), 0);
}

fn ext_cmd(sys: &mut System, val: u64) -> ExtCommand {
    let addr = common::reg(sys, 0, RegId::Dtu(DtuReg::ExtCmd));
    sys.cpu_write_regs(0, addr, &[val]);
    sys.run();
    ExtCommand::decode(sys.dtu(0).regs().get(DtuReg::ExtCmd))
}

fn fill_tlb(sys: &mut System) {
    let tlb = sys.dtu_mut(0).tlb_mut();
    tlb.insert(VIRT, PAGE, Perm::RW);
    tlb.insert(VIRT_RO, PAGE_RO, Perm::R);
}

fn ext_cmds(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    sys.dtu_mut(0).regs_mut().set(DtuReg::Status, StatusFlags::PRIV.bits());
    fill_tlb(&mut sys);

    let res = ext_cmd(&mut sys, ExtCommand::new(ExtOpcode::InvPage, VIRT_RO + 0x123).encode());
    wv_assert_eq!(t, res.opcode(), Some(ExtOpcode::Idle));
    wv_assert_eq!(t, res.error, Code::Success);
    wv_assert_eq!(t, sys.dtu(0).tlb().len(), 1);
    wv_assert_eq!(t, sys.dtu_mut(0).tlb_mut().lookup(VIRT, Perm::R), TlbResult::Hit(PAGE));

    let res = ext_cmd(&mut sys, ExtCommand::new(ExtOpcode::InvTlb, 0).encode());
    wv_assert_eq!(t, res.error, Code::Success);
    wv_assert!(t, sys.dtu(0).tlb().is_empty());

    let res = ext_cmd(&mut sys, 0xF);
    wv_assert_eq!(t, res.opcode(), Some(ExtOpcode::Idle));
    wv_assert_eq!(t, res.error, Code::UnknownCmd);
}

fn ext_cmds_unpriv(t: &mut dyn WvTester) {
    let mut sys = common::system(1);
    fill_tlb(&mut sys);

    let res = ext_cmd(&mut sys, ExtCommand::new(ExtOpcode::InvTlb, 0).encode());
    wv_assert_eq!(t, res.opcode(), Some(ExtOpcode::Idle));
    wv_assert_eq!(t, sys.dtu(0).tlb().len(), 2);
    wv_assert_eq!(t, sys.dtu(0).stats().rejected_writes, 1);

    // the root page table is protected as well
    let addr = common::reg(&sys, 0, RegId::Dtu(DtuReg::RootPt));
    sys.cpu_write_regs(0, addr, &[ROOT_PT]);
    sys.run();
    wv_assert_eq!(t, sys.dtu(0).regs().get(DtuReg::RootPt), 0);
}

fn cache(t: &mut dyn WvTester) {
    let params = DtuParams {
        mem_pe: Some(1),
        ..Default::default()
    };
    let mut sys = common::system_with(params, 2);
    map_pages(&mut sys, 0);
    wv_assert_ok!(sys.set_core(0, Box::new(TestCore::default())));
    wv_assert_ok!(sys.mem_mut(1).write(PAGE + 0x20, &common::pattern(16, 8)));

    sys.cpu_request(0, Packet::new_read(VIRT + 0x20, 16));
    sys.cpu_request(0, Packet::new_write(VIRT_RO, vec![1; 8]));
    sys.run();

    let core = common::test_core(&sys, 0);
    wv_assert_eq!(t, core.responses.len(), 2);
    let rd = wv_assert_some!(core.responses.iter().find(|r| r.is_read()));
    wv_assert_eq!(t, rd.result(), Code::Success);
    wv_assert_eq!(t, rd.addr(), VIRT + 0x20);
    wv_assert_eq!(t, rd.data(), &common::pattern(16, 8)[..]);
    let wr = wv_assert_some!(core.responses.iter().find(|r| r.is_write()));
    wv_assert_eq!(t, wr.result(), Code::TranslationFault);
    wv_assert_eq!(t, common::read_mem(&sys, 1, PAGE_RO, 8), vec![0u8; 8]);
}
