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
use base::test::WvTester;
use base::{wv_assert, wv_assert_eq, wv_assert_ok, wv_run_test};
use dtu::header::{HeaderFlags, MessageHeader, HEADER_SIZE};
use dtu::regfile::{DtuReg, EpReg, UNLIM_CREDITS};
use dtu::system::System;
use dtu::Opcode;

use crate::common::{self, CmdArgs};

const SEP: usize = 1;
const REPLY_REP: usize = 3;
const REP: usize = 2;
const BUF: u64 = 0x1000;
const MSG_SIZE: usize = 256;
const DATA: u64 = 0x100;
const LABEL: u64 = 0x1234;
const RLABEL: u64 = 0x55;

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, send);
    wv_run_test!(t, credits);
    wv_run_test!(t, reply);
    wv_run_test!(t, unexpected_reply);
    wv_run_test!(t, reply_pagefault);
    wv_run_test!(t, dropped_reply);
    wv_run_test!(t, no_space);
    wv_run_test!(t, read_ptr);
    wv_run_test!(t, invalid_eps);
    wv_run_test!(t, sizes);
    wv_run_test!(t, huge_sizes);
}

/// PE0 sends via SEP to REP on PE1 and receives replies on REPLY_REP
fn setup(credits: u64, slots: usize) -> System {
    let mut sys = common::system(2);
    common::config_send(&mut sys, 0, SEP, (1, REP), MSG_SIZE, LABEL, credits);
    common::config_recv(&mut sys, 0, REPLY_REP, BUF, MSG_SIZE, 4);
    common::config_recv(&mut sys, 1, REP, BUF, MSG_SIZE, slots);
    sys
}

fn send_msg(sys: &mut System, len: usize) -> Code {
    wv_assert_ok!(sys.mem_mut(0).write(DATA, &common::pattern(len, 1)));
    common::run_cmd(sys, 0, Opcode::Send, SEP, CmdArgs::new(DATA, len).reply(REPLY_REP, RLABEL))
}

fn header(sys: &System, pe: usize, addr: u64) -> MessageHeader {
    wv_assert_ok!(MessageHeader::from_bytes(&common::read_mem(sys, pe, addr, HEADER_SIZE)))
}

fn send(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);

    let rep = sys.dtu(1).regs().recv_ep(REP);
    wv_assert_eq!(t, rep.msg_count, 1);
    wv_assert_eq!(t, rep.wr_ptr, MSG_SIZE as u64);
    wv_assert_eq!(t, sys.dtu(1).regs().get(DtuReg::MsgCnt), 1);

    let hdr = header(&sys, 1, BUF);
    wv_assert_eq!(t, hdr.flags, HeaderFlags::REPLY_ENABLED);
    wv_assert_eq!(t, hdr.sender_core, 0);
    wv_assert_eq!(t, hdr.sender_ep, SEP);
    wv_assert_eq!(t, hdr.reply_ep, REPLY_REP);
    wv_assert_eq!(t, hdr.length, 16);
    wv_assert_eq!(t, hdr.label, LABEL);
    wv_assert_eq!(t, hdr.reply_label, RLABEL);
    wv_assert_eq!(t, common::read_mem(&sys, 1, BUF + HEADER_SIZE as u64, 16), common::pattern(16, 1));

    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 1);
    wv_assert_eq!(t, sys.dtu(0).stats().msgs_sent, 1);
    wv_assert_eq!(t, sys.dtu(1).stats().msgs_received, 1);
}

fn credits(t: &mut dyn WvTester) {
    let mut sys = setup(1, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::Success);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 0);

    let packets = sys.dtu(0).stats().noc_packets;
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::NoCredits);
    // no packet has been sent for the failed command
    wv_assert_eq!(t, sys.dtu(0).stats().noc_packets, packets);
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(REP).msg_count, 1);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 0);
}

fn reply(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 1);

    wv_assert_ok!(sys.mem_mut(1).write(0x200, &common::pattern(8, 9)));
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 8));
    wv_assert_eq!(t, res, Code::Success);

    // the reply went to the reply endpoint and carries the reply label
    wv_assert_eq!(t, sys.dtu(0).regs().recv_ep(REPLY_REP).msg_count, 1);
    let hdr = header(&sys, 0, BUF);
    wv_assert_eq!(t, hdr.flags, HeaderFlags::REPLY | HeaderFlags::GRANT_CREDITS);
    wv_assert_eq!(t, hdr.sender_core, 1);
    wv_assert_eq!(t, hdr.sender_ep, REP);
    wv_assert_eq!(t, hdr.reply_ep, SEP);
    wv_assert_eq!(t, hdr.label, RLABEL);
    wv_assert_eq!(t, hdr.reply_label, 0);
    wv_assert_eq!(t, common::read_mem(&sys, 0, BUF + HEADER_SIZE as u64, 8), common::pattern(8, 9));

    // the credit is back
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 2);
    wv_assert_eq!(t, sys.dtu(0).regs().get(DtuReg::RecvErr), 0);

    // the original message cannot be replied to twice
    let hdr = header(&sys, 1, BUF);
    wv_assert!(t, !hdr.flags.contains(HeaderFlags::REPLY_ENABLED));
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 8));
    wv_assert_eq!(t, res, Code::RepliesDisabled);
    wv_assert_eq!(t, sys.dtu(0).regs().recv_ep(REPLY_REP).msg_count, 1);
}

fn unexpected_reply(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);

    // pretend that the credit has been returned already
    sys.dtu_mut(0).regs_mut().set_ep(SEP, EpReg::Credits, 2);

    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 8));
    wv_assert_eq!(t, res, Code::Success);

    let err = sys.dtu(0).regs().get(DtuReg::RecvErr);
    wv_assert_eq!(t, err & 0xFFFF_FFFF, u32::from(Code::UnexpectedReply) as u64);
    wv_assert_eq!(t, err >> 32, SEP as u64);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 2);
    wv_assert_eq!(t, sys.dtu(0).stats().recv_errors, 1);
    // the reply is delivered nevertheless
    wv_assert_eq!(t, sys.dtu(0).regs().recv_ep(REPLY_REP).msg_count, 1);
}

fn reply_pagefault(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);

    // mark the received message as a pagefault request
    let flags = HeaderFlags::REPLY_ENABLED | HeaderFlags::PAGEFAULT;
    wv_assert_ok!(sys.mem_mut(1).write(BUF, &[flags.bits()]));

    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 8));
    wv_assert_eq!(t, res, Code::Success);

    let hdr = header(&sys, 0, BUF);
    wv_assert_eq!(
        t,
        hdr.flags,
        HeaderFlags::REPLY | HeaderFlags::GRANT_CREDITS | HeaderFlags::PAGEFAULT
    );
    wv_assert_eq!(t, header(&sys, 1, BUF).flags, HeaderFlags::PAGEFAULT);
}

fn dropped_reply(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 1);

    // the reply endpoint has a single slot, which is occupied
    common::config_recv(&mut sys, 0, REPLY_REP, BUF, MSG_SIZE, 1);
    sys.dtu_mut(0).regs_mut().set_ep(REPLY_REP, EpReg::BufMsgCnt, 1);

    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 8));
    wv_assert_eq!(t, res, Code::RecvNoSpace);
    wv_assert_eq!(t, sys.dtu(0).stats().msgs_dropped, 1);
    // a dropped reply does not return the credit
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 1);
    wv_assert_eq!(t, sys.dtu(0).regs().get(DtuReg::RecvErr), 0);

    // same for replies that do not fit into the slots
    let res = common::run_cmd(&mut sys, 1, Opcode::IncReadPtr, REP, CmdArgs::new(0, 0));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 0);
    common::config_recv(&mut sys, 0, REPLY_REP, BUF, 64, 4);
    wv_assert_ok!(sys.mem_mut(1).write(0x200, &common::pattern(64, 3)));
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, 64));
    wv_assert_eq!(t, res, Code::RecvOutOfBounds);
    wv_assert_eq!(t, sys.dtu(0).stats().msgs_dropped, 2);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 0);
}

fn no_space(t: &mut dyn WvTester) {
    let mut sys = setup(UNLIM_CREDITS, 2);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::Success);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::Success);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::RecvNoSpace);

    let rep = sys.dtu(1).regs().recv_ep(REP);
    wv_assert_eq!(t, rep.msg_count, 2);
    wv_assert_eq!(t, rep.wr_ptr, 0);
    wv_assert_eq!(t, sys.dtu(1).stats().msgs_dropped, 1);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, UNLIM_CREDITS);
}

fn read_ptr(t: &mut dyn WvTester) {
    let mut sys = setup(UNLIM_CREDITS, 2);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::Success);
    wv_assert_eq!(t, send_msg(&mut sys, 8), Code::Success);

    let inc = |sys: &mut System| common::run_cmd(sys, 1, Opcode::IncReadPtr, REP, CmdArgs::new(0, 0));

    wv_assert_eq!(t, inc(&mut sys), Code::Success);
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(REP).rd_ptr, MSG_SIZE as u64);
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(REP).msg_count, 1);
    wv_assert_eq!(t, sys.dtu(1).regs().get(DtuReg::MsgCnt), 1);

    wv_assert_eq!(t, inc(&mut sys), Code::Success);
    wv_assert_eq!(t, sys.dtu(1).regs().recv_ep(REP).rd_ptr, 0);
    wv_assert_eq!(t, inc(&mut sys), Code::NoMsgs);

    // the next message wraps around to the first slot
    wv_assert_eq!(t, send_msg(&mut sys, 4), Code::Success);
    let rep = sys.dtu(1).regs().recv_ep(REP);
    wv_assert_eq!(t, rep.msg_count, 1);
    wv_assert_eq!(t, rep.wr_ptr, MSG_SIZE as u64);
    wv_assert_eq!(t, header(&sys, 1, BUF).length, 4);
}

fn invalid_eps(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);

    // no send endpoint
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 7, CmdArgs::new(DATA, 8));
    wv_assert_eq!(t, res, Code::NoSEP);

    // no receive endpoint at the destination
    common::config_send(&mut sys, 0, 5, (1, 9), MSG_SIZE, 0, 1);
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, 5, CmdArgs::new(DATA, 8));
    wv_assert_eq!(t, res, Code::NoREP);
    wv_assert_eq!(t, sys.dtu(1).stats().msgs_dropped, 1);

    // no receive endpoint to reply from
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, 9, CmdArgs::new(DATA, 8));
    wv_assert_eq!(t, res, Code::NoREP);

    // no message to reply to
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(DATA, 8));
    wv_assert_eq!(t, res, Code::NoMsgs);
}

fn sizes(t: &mut dyn WvTester) {
    let mut sys = setup(UNLIM_CREDITS, 4);

    // header and payload have to fit into the maximum message size
    wv_assert_eq!(t, send_msg(&mut sys, MSG_SIZE - HEADER_SIZE + 1), Code::SendInvMsgSize);
    wv_assert_eq!(t, send_msg(&mut sys, MSG_SIZE - HEADER_SIZE), Code::Success);
    wv_assert_eq!(t, send_msg(&mut sys, 0), Code::Success);

    // the receiver has smaller slots than the sender expects
    common::config_recv(&mut sys, 1, REP, BUF, 64, 4);
    wv_assert_eq!(t, send_msg(&mut sys, 64), Code::RecvOutOfBounds);
    wv_assert_eq!(t, send_msg(&mut sys, 64 - HEADER_SIZE), Code::Success);
}

fn huge_sizes(t: &mut dyn WvTester) {
    let mut sys = setup(2, 4);

    // sizes that overflow together with the header are rejected
    let res = common::run_cmd(&mut sys, 0, Opcode::Send, SEP, CmdArgs::new(DATA, usize::MAX));
    wv_assert_eq!(t, res, Code::SendInvMsgSize);
    wv_assert_eq!(t, sys.dtu(0).regs().send_ep(SEP).credits, 2);
    wv_assert_eq!(t, sys.dtu(0).stats().noc_packets, 0);

    wv_assert_eq!(t, send_msg(&mut sys, 16), Code::Success);
    let res = common::run_cmd(&mut sys, 1, Opcode::Reply, REP, CmdArgs::new(0x200, usize::MAX));
    wv_assert_eq!(t, res, Code::SendInvMsgSize);
    // the message can still be replied to
    let hdr = header(&sys, 1, BUF);
    wv_assert!(t, hdr.flags.contains(HeaderFlags::REPLY_ENABLED));
    wv_assert_eq!(t, sys.dtu(0).regs().recv_ep(REPLY_REP).msg_count, 0);
}
