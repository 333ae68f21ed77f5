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

//! Contains the memory unit of the DTU
//!
//! The memory unit executes the READ and WRITE commands, serves memory and register accesses of
//! other PEs and forwards cache misses of the core to the memory PE.

use base::errors::Code;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;

use crate::dtu::Dtu;
use crate::noc::{NocAddr, NocPacketType};
use crate::packet::{MemReqType, MemSenderState, NocSenderState, Packet, SenderState};
use crate::port::Port;
use crate::pt::TranslationOrigin;
use crate::regfile::{CmdReg, MemEp};
use crate::sim::Ctx;
use crate::tlb::TlbResult;
use crate::xfer::{Chunk, Transfer, TransferEvent, XferFlags, XferKind, XferOrigin};

/// The state of a running READ or WRITE command
///
/// Only one chunk is on the NoC at a time; the chunks of a READ are written to the local memory
/// while the next one is requested.
#[derive(Debug)]
pub struct MemCmdState {
    write: bool,
    mep: MemEp,
    /// The local address of the data
    data_addr: u64,
    /// The offset within the memory region of the endpoint
    offset: u64,
    chunks: Transfer,
    cur: Option<Chunk>,
    pending_writes: usize,
    noc_done: bool,
}

impl Dtu {
    pub(crate) fn start_mem_cmd(&mut self, write: bool, ctx: &mut Ctx<'_>) {
        let ep = self.cmd.ep;
        let mep = self.regs.mem_ep(ep);
        let data_addr = self.regs.get_cmd(CmdReg::DataAddr);
        let size = self.regs.get_cmd(CmdReg::DataSize);
        let offset = self.regs.get_cmd(CmdReg::Offset);

        if !mep.is_valid() {
            return self.finish_cmd(Code::NoMEP, ctx);
        }
        let access = if write { Perm::W } else { Perm::R };
        if !mep.flags.contains(access) {
            log!(LogFlags::Error, "EP{}: {:?} access not permitted ({:?})", ep, access, mep.flags);
            return self.finish_cmd(Code::NoPerm, ctx);
        }
        match offset.checked_add(size) {
            Some(end) if end <= mep.rem_size => {},
            _ => {
                log!(
                    LogFlags::Error,
                    "EP{}: access {:#x}+{:#x} exceeds region of {:#x} bytes",
                    ep,
                    offset,
                    size,
                    mep.rem_size
                );
                return self.finish_cmd(Code::OutOfBounds, ctx);
            },
        }
        if size == 0 {
            return self.finish_cmd(Code::Success, ctx);
        }

        log!(
            LogFlags::DtuMem,
            "{} {} bytes {} {:?}",
            if write { "Writing" } else { "Reading" },
            size,
            if write { "to" } else { "from" },
            NocAddr::new(mep.tgt_core, mep.rem_addr + offset)
        );

        self.mem_cmd = Some(MemCmdState {
            write,
            mep,
            data_addr,
            offset,
            chunks: Transfer::new(size as usize, self.params.chunk_limit()),
            cur: None,
            pending_writes: 0,
            noc_done: false,
        });
        self.next_mem_chunk(ctx);
    }

    fn next_mem_chunk(&mut self, ctx: &mut Ctx<'_>) {
        let seq = self.cmd_seq;
        let (write, chunk, target, local) = match self.mem_cmd.as_mut() {
            Some(st) => match st.chunks.next_chunk() {
                Some(c) => {
                    st.cur = Some(c);
                    let target = NocAddr::new(st.mep.tgt_core, st.mep.rem_addr + st.offset + c.offset as u64);
                    (st.write, c, target, st.data_addr + c.offset as u64)
                },
                None => return,
            },
            None => return,
        };

        if write {
            let xfer = TransferEvent::new(
                XferKind::LocalRead,
                XferFlags::empty(),
                local,
                chunk.size,
                XferOrigin::Cmd(seq),
            )
            .with_target(target, NocPacketType::WriteReq);
            self.start_transfer(xfer, 0, ctx);
        }
        else {
            self.stats.noc_reads += 1;
            let pkt = Packet::new_read(target.raw(), chunk.size);
            let when = self.at(ctx, self.params.command_to_noc_request_latency);
            self.noc_send(pkt, NocPacketType::ReadReq, when, ctx);
        }
    }

    /// Handles the NoC response for a chunk of a READ command
    pub(crate) fn read_chunk_received(&mut self, seq: u64, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            log!(LogFlags::DtuMem, "Ignoring read response of stale command {}", seq);
            return;
        }
        if pkt.is_error() {
            return self.finish_cmd(pkt.result(), ctx);
        }

        let (chunk, local) = match self.mem_cmd.as_mut() {
            Some(st) => match st.cur.take() {
                Some(c) => {
                    st.pending_writes += 1;
                    st.noc_done = c.last;
                    (c, st.data_addr + c.offset as u64)
                },
                None => return,
            },
            None => return,
        };

        let data = pkt.take_data();
        let xfer = TransferEvent::new(
            XferKind::LocalWrite,
            XferFlags::empty(),
            local,
            chunk.size.min(data.len()),
            XferOrigin::Cmd(seq),
        )
        .with_data(data, 0);
        self.start_transfer(xfer, self.params.noc_to_transfer_latency, ctx);

        if !chunk.last {
            self.next_mem_chunk(ctx);
        }
    }

    /// Is called when a chunk of a READ command has been written to the local memory
    pub(crate) fn read_chunk_written(&mut self, res: Code, ctx: &mut Ctx<'_>) {
        let done = match self.mem_cmd.as_mut() {
            Some(st) => {
                st.pending_writes -= 1;
                st.noc_done && st.pending_writes == 0
            },
            None => return,
        };

        if res != Code::Success {
            self.mem_cmd = None;
            self.finish_cmd(res, ctx);
        }
        else if done {
            self.finish_cmd(Code::Success, ctx);
        }
    }

    /// Handles the NoC response for a chunk of a WRITE command
    pub(crate) fn write_chunk_sent(&mut self, seq: u64, res: Code, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            log!(LogFlags::DtuMem, "Ignoring write response of stale command {}", seq);
            return;
        }
        if res != Code::Success {
            return self.finish_cmd(res, ctx);
        }

        let last = match self.mem_cmd.as_mut().and_then(|st| st.cur.take()) {
            Some(c) => c.last,
            None => return,
        };
        if last {
            self.finish_cmd(Code::Success, ctx);
        }
        else {
            self.next_mem_chunk(ctx);
        }
    }

    /// Serves a READ_REQ or WRITE_REQ of another PE for the local memory
    pub(crate) fn recv_remote_access(&mut self, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        let addr = NocAddr::from_raw(pkt.addr());
        let size = pkt.size();
        let in_bounds = addr
            .offset
            .checked_add(size as u64)
            .map(|end| end <= self.mem_size as u64)
            .unwrap_or(false);

        if !in_bounds {
            log!(
                LogFlags::Error,
                "Remote access {:#x}+{:#x} outside of memory",
                addr.offset,
                size
            );
            let when = self.at(ctx, self.params.transfer_to_noc_latency);
            return self.noc_respond(pkt, Code::OutOfBounds, when, ctx);
        }

        let kind = if pkt.is_read() { XferKind::RemoteRead } else { XferKind::RemoteWrite };
        let data = if pkt.is_write() { pkt.take_data() } else { Vec::new() };
        let xfer = TransferEvent::new(kind, XferFlags::PHYS, addr.offset, size, XferOrigin::Noc(pkt))
            .with_data(data, 0);
        self.start_transfer(xfer, self.params.noc_to_transfer_latency, ctx);
    }

    /// Serves a cache miss of another PE's core
    pub(crate) fn recv_cache_mem_req(&mut self, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        let functional = pkt.noc_state().map(|s| s.ty.is_functional()).unwrap_or(false);
        if !functional {
            return self.recv_remote_access(pkt, ctx);
        }

        // functional requests bypass the transfer unit and are answered immediately
        let addr = NocAddr::from_raw(pkt.addr());
        pkt.set_addr(addr.offset);
        pkt.set_functional(true);
        pkt.push_state(SenderState::Mem(MemSenderState {
            ty: MemReqType::Functional,
            id: 0,
        }));
        let when = ctx.now();
        ctx.send(Port::Mem, pkt, when);
    }

    /// Handles a request of the core that neither targets the registers nor the local memory
    pub(crate) fn start_cache_access(&mut self, pkt: Packet, ctx: &mut Ctx<'_>) {
        let virt = pkt.addr();
        if !self.translation_enabled() {
            return self.cache_translated(pkt, Ok(virt), ctx);
        }

        let access = if pkt.is_read() { Perm::R } else { Perm::W };
        match self.tlb.lookup(virt, access) {
            TlbResult::Hit(phys) => {
                self.stats.tlb_hits += 1;
                self.cache_translated(pkt, Ok(phys), ctx);
            },
            TlbResult::Miss => {
                self.stats.tlb_misses += 1;
                self.start_walk(virt, access, TranslationOrigin::Cache(pkt), ctx);
            },
            TlbResult::PageFault => {
                self.stats.translation_faults += 1;
                self.cache_translated(pkt, Err(Code::TranslationFault), ctx);
            },
        }
    }

    /// Forwards the request of the core to the memory PE, once its address is translated
    pub(crate) fn cache_translated(&mut self, mut pkt: Packet, res: Result<u64, Code>, ctx: &mut Ctx<'_>) {
        let res = res.and_then(|phys| self.params.mem_pe.map(|pe| (pe, phys)).ok_or(Code::NoMEP));
        let (mem_pe, phys) = match res {
            Ok(r) => r,
            Err(e) => {
                log!(LogFlags::DtuCache, "Cache access {:?} failed: {:?}", pkt, e);
                pkt.set_result(e);
                pkt.make_response();
                let when = self.at(ctx, self.params.register_access_latency);
                return ctx.reply(Port::Cpu, pkt, when);
            },
        };

        let ty = if pkt.is_functional() {
            NocPacketType::CacheMemReqFunc
        }
        else {
            NocPacketType::CacheMemReq
        };
        let when = if ty.is_functional() {
            ctx.now()
        }
        else {
            self.at(ctx, self.params.command_to_noc_request_latency)
        };

        log!(
            LogFlags::DtuCache,
            "Forwarding {:?} to {:?}",
            pkt,
            NocAddr::new(mem_pe, phys)
        );

        pkt.push_state(SenderState::Cache { addr: pkt.addr() });
        pkt.set_addr(NocAddr::new(mem_pe, phys).raw());
        pkt.push_state(SenderState::Noc(NocSenderState {
            ty,
            src: self.id,
            cmd_seq: 0,
            result: Code::Success,
        }));
        self.stats.noc_packets += 1;
        ctx.send(Port::Noc, pkt, when);
    }

    /// Hands the response of the memory PE back to the core
    pub(crate) fn cache_mem_resp(&mut self, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        let functional = pkt.noc_state().map(|s| s.ty.is_functional()).unwrap_or(false);
        pkt.pop_state();
        match pkt.pop_state() {
            Some(SenderState::Cache { addr }) => pkt.set_addr(addr),
            _ => {
                log!(LogFlags::Error, "Cache response without cache state: {:?}", pkt);
                return;
            },
        }

        let when = if functional {
            ctx.now()
        }
        else {
            self.at(ctx, self.params.register_access_latency)
        };
        ctx.reply(Port::Cpu, pkt, when);
    }
}
