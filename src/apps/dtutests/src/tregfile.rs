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
use base::{wv_assert, wv_assert_eq, wv_run_test};
use dtu::packet::Packet;
use dtu::regfile::{
    Accessor, CmdReg, DtuReg, EpReg, MemEp, RecvEp, RegAccess, RegFile, RegId, ReqReg, SendEp,
    StatusFlags,
};

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, layout);
    wv_run_test!(t, read_write);
    wv_run_test!(t, privileged);
    wv_run_test!(t, invalid_access);
    wv_run_test!(t, busy_command);
    wv_run_test!(t, msg_count);
    wv_run_test!(t, endpoints);
}

fn access(regs: &mut RegFile, id: RegId, vals: &[u64], from: Accessor, busy: bool) -> (RegAccess, Code) {
    let mut pkt = Packet::new_reg_write(id.addr(), vals);
    let acc = regs.handle_request(id.addr(), &mut pkt, from, busy);
    (acc, pkt.result())
}

fn layout(t: &mut dyn WvTester) {
    wv_assert_eq!(t, RegId::Dtu(DtuReg::Status).addr(), 0);
    wv_assert_eq!(t, RegId::Dtu(DtuReg::RecvErr).addr(), 4 * 8);
    wv_assert_eq!(t, RegId::Req(ReqReg::ExtReq).addr(), 5 * 8);
    wv_assert_eq!(t, RegId::Cmd(CmdReg::Command).addr(), 6 * 8);
    wv_assert_eq!(t, RegId::Cmd(CmdReg::ReplyLabel).addr(), 12 * 8);
    wv_assert_eq!(t, RegId::Ep(0, EpReg::BufAddr).addr(), 13 * 8);
    wv_assert_eq!(t, RegId::Ep(1, EpReg::BufAddr).addr(), (13 + 15) * 8);
    wv_assert_eq!(t, RegId::Ep(1, EpReg::ReqFlags).addr(), (13 + 15 + 14) * 8);
    wv_assert_eq!(t, RegFile::new(4).size(), (13 + 4 * 15) * 8);
}

fn read_write(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(4);
    let (acc, res) = access(&mut regs, RegId::Cmd(CmdReg::DataAddr), &[0x1000, 0x20, 0x8], Accessor::Cpu, false);
    wv_assert_eq!(t, acc, RegAccess::empty());
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::DataAddr), 0x1000);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::DataSize), 0x20);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::Offset), 0x8);

    let addr = RegId::Cmd(CmdReg::DataAddr).addr();
    let mut pkt = Packet::new_read(addr, 16);
    regs.handle_request(addr, &mut pkt, Accessor::Cpu, false);
    wv_assert!(t, pkt.is_response());
    wv_assert_eq!(t, pkt.reg(0), 0x1000);
    wv_assert_eq!(t, pkt.reg(1), 0x20);

    // writing the command register is reported, but the register is written anyway
    let (acc, _) = access(&mut regs, RegId::Cmd(CmdReg::Command), &[0x11], Accessor::Cpu, false);
    wv_assert_eq!(t, acc, RegAccess::WROTE_CMD);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::Command), 0x11);
}

fn privileged(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(4);
    let credits = RegId::Ep(2, EpReg::Credits);

    let (acc, res) = access(&mut regs, credits, &[5], Accessor::Cpu, false);
    wv_assert!(t, acc.contains(RegAccess::REJECTED));
    wv_assert_eq!(t, res, Code::NoPerm);
    wv_assert_eq!(t, regs.get_ep(2, EpReg::Credits), 0);

    let (acc, res) = access(&mut regs, RegId::Dtu(DtuReg::ExtCmd), &[1], Accessor::Cpu, false);
    wv_assert!(t, acc.contains(RegAccess::REJECTED));
    wv_assert!(t, !acc.contains(RegAccess::WROTE_EXT_CMD));
    wv_assert_eq!(t, res, Code::NoPerm);

    // remote configuration is always allowed
    let (_, res) = access(&mut regs, credits, &[5], Accessor::Noc, false);
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, regs.get_ep(2, EpReg::Credits), 5);

    regs.set(DtuReg::Status, StatusFlags::PRIV.bits());
    let (acc, res) = access(&mut regs, RegId::Dtu(DtuReg::ExtCmd), &[1], Accessor::Cpu, false);
    wv_assert_eq!(t, acc, RegAccess::WROTE_EXT_CMD);
    wv_assert_eq!(t, res, Code::Success);
    let (_, res) = access(&mut regs, credits, &[6], Accessor::Cpu, false);
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, regs.get_ep(2, EpReg::Credits), 6);
}

fn invalid_access(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(2);

    let mut pkt = Packet::new_write(4, vec![0; 8]);
    regs.handle_request(4, &mut pkt, Accessor::Noc, false);
    wv_assert_eq!(t, pkt.result(), Code::InvArgs);

    let mut pkt = Packet::new_write(0, vec![0; 4]);
    regs.handle_request(0, &mut pkt, Accessor::Noc, false);
    wv_assert_eq!(t, pkt.result(), Code::InvArgs);

    let end = regs.size() as u64;
    let mut pkt = Packet::new_read(end - 8, 16);
    regs.handle_request(end - 8, &mut pkt, Accessor::Noc, false);
    wv_assert_eq!(t, pkt.result(), Code::InvArgs);
    wv_assert!(t, pkt.is_response());
}

fn busy_command(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(2);
    regs.set_cmd(CmdReg::DataSize, 64);

    let (acc, res) = access(&mut regs, RegId::Cmd(CmdReg::DataSize), &[128], Accessor::Cpu, true);
    wv_assert!(t, acc.contains(RegAccess::REJECTED));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::DataSize), 64);

    let (acc, _) = access(&mut regs, RegId::Cmd(CmdReg::Command), &[3], Accessor::Cpu, true);
    wv_assert_eq!(t, acc, RegAccess::REJECTED);

    let (acc, _) = access(&mut regs, RegId::Cmd(CmdReg::Abort), &[1], Accessor::Cpu, true);
    wv_assert_eq!(t, acc, RegAccess::WROTE_ABORT);
    wv_assert_eq!(t, regs.get_cmd(CmdReg::Abort), 1);
}

fn msg_count(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(4);
    regs.set_ep(0, EpReg::BufMsgCnt, 3);
    regs.set_ep(1, EpReg::BufMsgCnt, 2);
    wv_assert_eq!(t, regs.get(DtuReg::MsgCnt), 5);
    regs.set_ep(0, EpReg::BufMsgCnt, 1);
    wv_assert_eq!(t, regs.get(DtuReg::MsgCnt), 3);

    // remote writes of the message count are tracked as well
    access(&mut regs, RegId::Ep(3, EpReg::BufMsgCnt), &[4], Accessor::Noc, false);
    wv_assert_eq!(t, regs.get(DtuReg::MsgCnt), 7);
    regs.invalidate_ep(1);
    wv_assert_eq!(t, regs.get(DtuReg::MsgCnt), 5);
}

fn endpoints(t: &mut dyn WvTester) {
    let mut regs = RegFile::new(4);

    let sep = SendEp {
        tgt_core: 3,
        tgt_ep: 7,
        max_msg_size: 128,
        label: 0xDEAD_BEEF,
        credits: 2,
        max_credits: 4,
    };
    regs.set_send_ep(1, &sep);
    wv_assert_eq!(t, regs.send_ep(1), sep);
    wv_assert!(t, regs.send_ep(1).is_valid());
    wv_assert!(t, !regs.send_ep(2).is_valid());

    let rep = RecvEp {
        buf_addr: 0x1000,
        msg_size: 64,
        size: 4,
        msg_count: 0,
        rd_ptr: 0,
        wr_ptr: 192,
    };
    regs.set_recv_ep(2, &rep);
    wv_assert_eq!(t, regs.recv_ep(2), rep);
    wv_assert_eq!(t, rep.ring_size(), 256);
    wv_assert_eq!(t, rep.next_ptr(rep.wr_ptr), 0);

    let mep = MemEp {
        tgt_core: 1,
        rem_addr: 0x4000,
        rem_size: 0x1000,
        flags: Perm::RW,
    };
    regs.set_mem_ep(3, &mep);
    wv_assert_eq!(t, regs.mem_ep(3), mep);

    regs.invalidate_ep(3);
    wv_assert!(t, !regs.mem_ep(3).is_valid());
}
