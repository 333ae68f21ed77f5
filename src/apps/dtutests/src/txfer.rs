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
use base::util::math;
use base::{wv_assert, wv_assert_eq, wv_assert_ok, wv_run_test};
use dtu::header::MessageHeader;
use dtu::xfer::Transfer;
use dtu::{DtuParams, Opcode};

use crate::common::{self, CmdArgs};

pub fn run(t: &mut dyn WvTester) {
    wv_run_test!(t, chunks);
    wv_run_test!(t, empty_transfer);
    wv_run_test!(t, unaligned_blocks);
    wv_run_test!(t, buffer_queue);
}

fn chunks(t: &mut dyn WvTester) {
    for (size, limit) in [(1, 1024), (1024, 1024), (1025, 1024), (4608, 256), (1000, 384), (7, 3)] {
        let chunks = Transfer::new(size, limit).collect::<Vec<_>>();

        wv_assert_eq!(t, chunks.len(), math::div_ceil(size, limit));
        wv_assert_eq!(t, chunks.iter().map(|c| c.size).sum::<usize>(), size);

        let last = chunks[chunks.len() - 1];
        let exp_last = if size % limit == 0 { limit } else { size % limit };
        wv_assert_eq!(t, last.size, exp_last);
        wv_assert!(t, last.last);
        wv_assert_eq!(t, chunks.iter().filter(|c| c.last).count(), 1);

        let mut off = 0;
        for c in &chunks {
            wv_assert_eq!(t, c.offset, off);
            off += c.size;
        }
    }
}

fn empty_transfer(t: &mut dyn WvTester) {
    let mut xfer = Transfer::new(0, 64);
    wv_assert_eq!(t, xfer.remaining(), 0);
    wv_assert!(t, xfer.next_chunk().is_none());
}

fn unaligned_blocks(t: &mut dyn WvTester) {
    let mut sys = common::system(2);
    common::config_mem(&mut sys, 0, 4, 1, 0x2000, 0x1000, Perm::RW);

    let data = common::pattern(200, 3);
    wv_assert_ok!(sys.mem_mut(0).write(0x30, &data));

    let res = common::run_cmd(&mut sys, 0, Opcode::Write, 4, CmdArgs::new(0x30, 200).offset(0x5));
    wv_assert_eq!(t, res, Code::Success);
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x2005, 200), data);
    // the bytes around the written range are untouched
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x2004, 1), vec![0]);
    wv_assert_eq!(t, common::read_mem(&sys, 1, 0x2005 + 200, 1), vec![0]);
}

fn buffer_queue(t: &mut dyn WvTester) {
    let params = DtuParams {
        buf_count: 1,
        ..Default::default()
    };
    let mut sys = common::system_with(params, 4);
    common::config_recv(&mut sys, 0, 2, 0x1000, 256, 4);

    for pe in 1..4 {
        common::config_send(&mut sys, pe, 1, (0, 2), 256, pe as u64, 1);
        wv_assert_ok!(sys.mem_mut(pe).write(0x100, &common::pattern(100, pe as u8)));
        common::issue(&mut sys, pe, Opcode::Send, 1, CmdArgs::new(0x100, 100));
    }
    sys.run();

    for pe in 1..4 {
        wv_assert_eq!(t, sys.dtu(pe).command().error, Code::Success);
    }
    wv_assert_eq!(t, sys.dtu(0).regs().recv_ep(2).msg_count, 3);
    wv_assert_eq!(t, sys.dtu(0).active_transfers(), 0);

    let mut senders = Vec::new();
    for slot in 0..3 {
        let addr = 0x1000 + slot * 256;
        let hdr = wv_assert_ok!(MessageHeader::from_bytes(&common::read_mem(&sys, 0, addr, 24)));
        wv_assert_eq!(t, hdr.label, hdr.sender_core as u64);
        wv_assert_eq!(
            t,
            common::read_mem(&sys, 0, addr + 24, 100),
            common::pattern(100, hdr.sender_core as u8)
        );
        senders.push(hdr.sender_core);
    }
    senders.sort();
    wv_assert_eq!(t, senders, vec![1, 2, 3]);
}
