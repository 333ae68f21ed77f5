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

use accel::{AccelCore, Accelerator, ContextAccel, RctMuxFlags};
use base::cfg;
use base::kif::Perm;
use base::time::Clock;
use dtu::regfile::{reg_addr, CmdReg, MemEp, RecvEp, RegId, SendEp};
use dtu::sim::Event;
use dtu::system::System;
use dtu::{Command, DtuParams, EpId, Opcode, PeId};
use log::{debug, info};

use crate::error::Error;

/// The scenarios the simulator can run
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Scenario {
    /// PE0 sends messages to PE1, which acknowledges and answers each of them
    Message,
    /// PE0 writes a buffer to PE1 and reads it back
    Memory,
    /// The accelerator on PE0 saves its context to PE1 and restores it again
    CtxSw,
}

impl Scenario {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "message" => Some(Self::Message),
            "memory" => Some(Self::Memory),
            "ctxsw" => Some(Self::CtxSw),
            _ => None,
        }
    }
}

const SEP: EpId = 1;
const REP: EpId = 2;
const REPLY_REP: EpId = 3;
const MEP: EpId = 4;
const MSG_SIZE: usize = 256;
const MSG_COUNT: usize = 8;
const MEM_SIZE: usize = 64 * 1024;
const XFER_SIZE: usize = 8 * 1024;

fn build(params: &DtuParams, pes: usize) -> Result<System, Error> {
    let mut sys = System::new();
    for _ in 0..pes {
        sys.add_pe(params.clone(), MEM_SIZE)?;
    }
    Ok(sys)
}

fn exec(
    sys: &mut System,
    pe: PeId,
    what: &'static str,
    cmd: Command,
    data: u64,
    size: usize,
    reply_ep: EpId,
) -> Result<(), Error> {
    let addr = reg_addr(sys.dtu(pe).params().reg_base, RegId::Cmd(CmdReg::Command));
    sys.cpu_write_regs(pe, addr, &[
        cmd.encode(),
        0,
        data,
        size as u64,
        0,
        reply_ep as u64,
        0,
    ]);
    sys.run();

    let res = sys.dtu(pe).command().error;
    if res.is_success() {
        Ok(())
    }
    else {
        Err(Error::CmdFailed(what, res))
    }
}

fn message(sys: &mut System) -> Result<(), Error> {
    sys.dtu_mut(0).regs_mut().set_send_ep(SEP, &SendEp {
        tgt_core: 1,
        tgt_ep: REP,
        max_msg_size: MSG_SIZE,
        label: 0x1234,
        credits: 1,
        max_credits: 1,
    });
    let rep = RecvEp {
        buf_addr: 0x1000,
        msg_size: MSG_SIZE,
        size: 4,
        ..Default::default()
    };
    sys.dtu_mut(0).regs_mut().set_recv_ep(REPLY_REP, &rep);
    sys.dtu_mut(1).regs_mut().set_recv_ep(REP, &rep);

    for i in 0..MSG_COUNT {
        let payload = vec![i as u8; 64];
        sys.mem_mut(0).write(0x100, &payload)?;
        exec(sys, 0, "send", Command::new(Opcode::Send, SEP), 0x100, payload.len(), REPLY_REP)?;
        debug!("message {} delivered at tick {}", i, sys.now());

        exec(sys, 1, "reply", Command::new(Opcode::Reply, REP), 0x200, 16, 0)?;
        exec(sys, 1, "ack", Command::new(Opcode::IncReadPtr, REP), 0, 0, 0)?;
        exec(sys, 0, "ack reply", Command::new(Opcode::IncReadPtr, REPLY_REP), 0, 0, 0)?;
    }

    if sys.dtu(0).regs().send_ep(SEP).credits != 1 {
        return Err(Error::Check("credits have not been returned"));
    }
    Ok(())
}

fn memory(sys: &mut System) -> Result<(), Error> {
    sys.dtu_mut(0).regs_mut().set_mem_ep(MEP, &MemEp {
        tgt_core: 1,
        rem_addr: 0x4000,
        rem_size: XFER_SIZE as u64,
        flags: Perm::RW,
    });

    let data: Vec<u8> = (0..XFER_SIZE).map(|i| (i % 251) as u8).collect();
    sys.mem_mut(0).write(0x1000, &data)?;

    exec(sys, 0, "write", Command::new(Opcode::Write, MEP), 0x1000, XFER_SIZE, 0)?;
    info!("wrote {} bytes until tick {}", XFER_SIZE, sys.now());
    exec(sys, 0, "read", Command::new(Opcode::Read, MEP), 0x8000, XFER_SIZE, 0)?;
    info!("read {} bytes until tick {}", XFER_SIZE, sys.now());

    let mut back = vec![0u8; XFER_SIZE];
    sys.mem(0).read(0x8000, &mut back)?;
    if back != data {
        return Err(Error::Check("data read back differs"));
    }
    Ok(())
}

type Core = AccelCore<ContextAccel>;

fn switch(sys: &mut System, flags: RctMuxFlags) -> Result<(), Error> {
    sys.mem_mut(0).write_word(cfg::RCTMUX_FLAGS, flags.bits())?;
    sys.inject(0, Event::CoreIrq);
    sys.run();
    info!("{:?} done at tick {}", flags, sys.now());
    Ok(())
}

fn ctxsw(sys: &mut System) -> Result<(), Error> {
    sys.dtu_mut(0).regs_mut().set_mem_ep(MEP, &MemEp {
        tgt_core: 1,
        rem_addr: 0x8000,
        rem_size: 0x2000,
        flags: Perm::RW,
    });

    let accel = ContextAccel::new(4096, 512, MEP, 0x4000);
    let clock = Clock::new(sys.dtu(0).params().clock_period);
    sys.set_core(0, Box::new(AccelCore::new(accel, clock)))?;
    sys.run();

    let orig: Vec<u8> = (0..4096).map(|i| (i % 13) as u8).collect();
    if let Some(c) = sys.core_mut::<Core>(0) {
        c.accel_mut().context_mut().copy_from_slice(&orig);
    }

    switch(sys, RctMuxFlags::STORE)?;
    if let Some(c) = sys.core_mut::<Core>(0) {
        c.accel_mut().context_mut().fill(0);
    }
    switch(sys, RctMuxFlags::RESTORE)?;

    let c = sys.core::<Core>(0).ok_or(Error::Check("accelerator is missing"))?;
    if c.accel().context() != &orig[..] {
        return Err(Error::Check("restored context differs"));
    }
    info!("context switched {} time(s)", c.accel().switched());
    Ok(())
}

/// Runs `scenario` on a system of DTUs with the given parameters and returns the system
pub fn run(scenario: Scenario, params: &DtuParams) -> Result<System, Error> {
    let mut sys = build(params, 2)?;
    info!("running {:?} scenario", scenario);

    match scenario {
        Scenario::Message => message(&mut sys)?,
        Scenario::Memory => memory(&mut sys)?,
        Scenario::CtxSw => ctxsw(&mut sys)?,
    }
    Ok(sys)
}
