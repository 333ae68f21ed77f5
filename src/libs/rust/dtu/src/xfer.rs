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

//! Contains the transfer unit of the DTU
//!
//! The transfer unit moves data between the local memory and the NoC. Every transfer occupies
//! one of the transfer buffers while it is active; transfers that find no free buffer wait in a
//! queue. The local memory is accessed in blocks that do not cross a `block_size` boundary and
//! each block is translated if address translation is enabled.

use bitflags::bitflags;
use std::collections::{HashMap, VecDeque};

use base::errors::Code;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;
use base::time::Cycles;

use crate::dtu::{Dtu, DtuEvent};
use crate::noc::{NocAddr, NocPacketType};
use crate::packet::{MemReqType, MemSenderState, Packet, SenderState};
use crate::port::Port;
use crate::pt::TranslationOrigin;
use crate::sim::{Ctx, Event};
use crate::tlb::TlbResult;
use crate::EpId;

/// A chunk of a transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// The offset of the chunk within the transfer
    pub offset: usize,
    pub size: usize,
    /// Whether this is the last chunk of the transfer
    pub last: bool,
}

/// Splits a transfer of `size` bytes into chunks of at most `limit` bytes
#[derive(Clone, Debug)]
pub struct Transfer {
    size: usize,
    limit: usize,
    offset: usize,
}

impl Transfer {
    pub fn new(size: usize, limit: usize) -> Self {
        Self {
            size,
            limit: limit.max(1),
            offset: 0,
        }
    }

    /// Returns the number of bytes that have not been handed out yet
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    /// Returns the next chunk or `None` if all bytes have been handed out
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        if self.offset == self.size {
            return None;
        }

        let size = self.remaining().min(self.limit);
        let chunk = Chunk {
            offset: self.offset,
            size,
            last: self.offset + size == self.size,
        };
        self.offset += size;
        Some(chunk)
    }
}

impl Iterator for Transfer {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct XferFlags : u8 {
        /// The transfer carries a message
        const MESSAGE = 1 << 0;
        /// The transfer stores a received message into a receive buffer
        const MSGRECV = 1 << 1;
        /// The local address is physical
        const PHYS    = 1 << 2;
    }
}

/// The direction of a transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XferKind {
    /// Local memory to NoC on behalf of a command
    LocalRead,
    /// NoC response to local memory on behalf of a command
    LocalWrite,
    /// Local memory to NoC for a request from another PE
    RemoteRead,
    /// NoC request from another PE to local memory
    RemoteWrite,
}

impl XferKind {
    fn access(self) -> Perm {
        match self {
            Self::LocalRead | Self::RemoteRead => Perm::R,
            Self::LocalWrite | Self::RemoteWrite => Perm::W,
        }
    }

    fn is_read(self) -> bool {
        self.access() == Perm::R
    }
}

/// Who started a transfer
#[derive(Debug)]
pub enum XferOrigin {
    /// The command with given sequence number
    Cmd(u64),
    /// The given request from the NoC, which is answered on completion
    Noc(Packet),
}

/// A transfer in flight
#[derive(Debug)]
pub struct TransferEvent {
    pub kind: XferKind,
    pub flags: XferFlags,
    /// The (virtual) local address
    pub local: u64,
    /// The number of bytes to access locally
    pub size: usize,
    /// The number of bytes accessed so far
    pub done: usize,
    /// For reads: the data read so far; for writes: the data to write starting at `skip`
    pub data: Vec<u8>,
    /// The number of leading bytes in `data` that are not part of the local access
    pub skip: usize,
    pub origin: XferOrigin,
    /// For local reads: where to send the data to
    pub target: Option<(NocAddr, NocPacketType)>,
    /// For received messages: the endpoint and slot offset
    pub recv: Option<(EpId, u64)>,
    pending: usize,
    has_buf: bool,
}

impl TransferEvent {
    pub fn new(kind: XferKind, flags: XferFlags, local: u64, size: usize, origin: XferOrigin) -> Self {
        Self {
            kind,
            flags,
            local,
            size,
            done: 0,
            data: Vec::new(),
            skip: 0,
            origin,
            target: None,
            recv: None,
            pending: 0,
            has_buf: false,
        }
    }

    /// Places `prefix` in front of the data that is read locally
    pub fn with_prefix(mut self, prefix: &[u8]) -> Self {
        self.data = prefix.to_vec();
        self.skip = prefix.len();
        self
    }

    /// Sets the data to write, starting at `skip`
    pub fn with_data(mut self, data: Vec<u8>, skip: usize) -> Self {
        self.data = data;
        self.skip = skip;
        self
    }

    pub fn with_target(mut self, addr: NocAddr, ty: NocPacketType) -> Self {
        self.target = Some((addr, ty));
        self
    }

    pub fn with_recv(mut self, ep: EpId, slot: u64) -> Self {
        self.recv = Some((ep, slot));
        self
    }

    fn is_cmd(&self) -> bool {
        matches!(self.origin, XferOrigin::Cmd(_))
    }
}

/// The transfer buffers and the transfers that use them
pub struct XferUnit {
    xfers: HashMap<u64, TransferEvent>,
    waiting: VecDeque<u64>,
    free_bufs: usize,
    next_id: u64,
}

impl XferUnit {
    pub fn new(buf_count: usize) -> Self {
        Self {
            xfers: HashMap::new(),
            waiting: VecDeque::new(),
            free_bufs: buf_count,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.xfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xfers.is_empty()
    }

    pub fn free_bufs(&self) -> usize {
        self.free_bufs
    }

    fn release(&mut self, xfer: &TransferEvent) -> Option<u64> {
        if !xfer.has_buf {
            return None;
        }
        self.free_bufs += 1;
        self.assign_waiting()
    }

    fn assign_waiting(&mut self) -> Option<u64> {
        while self.free_bufs > 0 {
            let id = self.waiting.pop_front()?;
            if let Some(x) = self.xfers.get_mut(&id) {
                x.has_buf = true;
                self.free_bufs -= 1;
                return Some(id);
            }
        }
        None
    }
}

impl Dtu {
    /// Starts the given transfer after `delay` cycles (or as soon as a buffer is free)
    pub(crate) fn start_transfer(&mut self, mut xfer: TransferEvent, delay: Cycles, ctx: &mut Ctx<'_>) {
        let id = self.xfers.next_id;
        self.xfers.next_id += 1;

        log!(
            LogFlags::DtuXfers,
            "Transfer {}: {:?} {:?} @ {:#x} ({} bytes)",
            id,
            xfer.kind,
            xfer.flags,
            xfer.local,
            xfer.size
        );

        if self.xfers.free_bufs > 0 {
            self.xfers.free_bufs -= 1;
            xfer.has_buf = true;
            self.xfers.xfers.insert(id, xfer);
            let when = self.at(ctx, delay);
            ctx.schedule(when, Event::Dtu(DtuEvent::Xfer(id)));
        }
        else {
            log!(LogFlags::DtuXfers, "Transfer {}: waiting for a buffer", id);
            self.xfers.xfers.insert(id, xfer);
            self.xfers.waiting.push_back(id);
        }
    }

    /// Issues the next local memory access of transfer `id`
    pub(crate) fn xfer_step(&mut self, id: u64, ctx: &mut Ctx<'_>) {
        let translate = self.translation_enabled();
        let block_size = self.params.block_size as u64;

        let (virt, access, phys_only) = match self.xfers.xfers.get_mut(&id) {
            Some(x) if x.done == x.size => (None, x.kind.access(), true),
            Some(x) => {
                let virt = x.local + x.done as u64;
                let left = (x.size - x.done) as u64;
                x.pending = left.min(block_size - (virt % block_size)) as usize;
                (Some(virt), x.kind.access(), x.flags.contains(XferFlags::PHYS))
            },
            None => return,
        };

        let virt = match virt {
            Some(v) => v,
            None => return self.xfer_finish(id, Code::Success, ctx),
        };

        if !translate || phys_only {
            return self.xfer_issue(id, virt, ctx);
        }

        match self.tlb.lookup(virt, access) {
            TlbResult::Hit(phys) => {
                self.stats.tlb_hits += 1;
                self.xfer_issue(id, phys, ctx);
            },
            TlbResult::Miss => {
                self.stats.tlb_misses += 1;
                self.start_walk(virt, access, TranslationOrigin::Xfer(id), ctx);
            },
            TlbResult::PageFault => {
                log!(LogFlags::DtuTlb, "Transfer {}: access {:?} to {:#x} denied", id, access, virt);
                self.stats.translation_faults += 1;
                self.xfer_finish(id, Code::TranslationFault, ctx);
            },
        }
    }

    /// Continues transfer `id` after the translation of its current block
    pub(crate) fn xfer_translated(&mut self, id: u64, res: Result<u64, Code>, ctx: &mut Ctx<'_>) {
        if !self.xfers.xfers.contains_key(&id) {
            return;
        }

        match res {
            Ok(phys) => self.xfer_issue(id, phys, ctx),
            Err(e) => self.xfer_finish(id, e, ctx),
        }
    }

    fn xfer_issue(&mut self, id: u64, phys: u64, ctx: &mut Ctx<'_>) {
        let x = match self.xfers.xfers.get(&id) {
            Some(x) => x,
            None => return,
        };

        let mut pkt = if x.kind.is_read() {
            Packet::new_read(phys, x.pending)
        }
        else {
            let start = x.skip + x.done;
            Packet::new_write(phys, x.data[start..start + x.pending].to_vec())
        };
        pkt.push_state(SenderState::Mem(MemSenderState {
            ty: MemReqType::Transfer,
            id,
        }));

        log!(
            LogFlags::DtuMem,
            "Transfer {}: {} {} bytes @ {:#x}",
            id,
            if x.kind.is_read() { "reading" } else { "writing" },
            x.pending,
            phys
        );

        let when = self.at(ctx, self.params.transfer_to_mem_request_latency);
        ctx.send(Port::Mem, pkt, when);
    }

    /// Handles the response of the local memory for transfer `id`
    pub(crate) fn xfer_mem_resp(&mut self, id: u64, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        if pkt.is_error() {
            return self.xfer_finish(id, pkt.result(), ctx);
        }

        let x = match self.xfers.xfers.get_mut(&id) {
            Some(x) => x,
            None => {
                log!(LogFlags::DtuXfers, "Transfer {}: ignoring response of cancelled transfer", id);
                return;
            },
        };

        if x.kind.is_read() {
            x.data.extend_from_slice(&pkt.take_data());
        }
        x.done += x.pending;
        x.pending = 0;
        self.xfer_step(id, ctx);
    }

    /// Removes transfer `id` and delivers its result
    fn xfer_finish(&mut self, id: u64, res: Code, ctx: &mut Ctx<'_>) {
        let xfer = match self.xfers.xfers.remove(&id) {
            Some(x) => x,
            None => return,
        };

        log!(LogFlags::DtuXfers, "Transfer {}: finished with {:?}", id, res);

        if let Some(next) = self.xfers.release(&xfer) {
            let when = self.at(ctx, 0);
            ctx.schedule(when, Event::Dtu(DtuEvent::Xfer(next)));
        }

        let TransferEvent {
            kind,
            data,
            origin,
            target,
            recv,
            ..
        } = xfer;

        match origin {
            XferOrigin::Cmd(seq) => {
                if !self.is_current(seq) {
                    return;
                }
                match kind {
                    XferKind::LocalWrite => self.read_chunk_written(res, ctx),
                    _ if res != Code::Success => self.finish_cmd(res, ctx),
                    _ => match target {
                        Some((addr, ty)) => {
                            match ty {
                                NocPacketType::Message => self.stats.msgs_sent += 1,
                                _ => self.stats.noc_writes += 1,
                            }
                            let pkt = Packet::new_write(addr.raw(), data);
                            let when = self.at(ctx, self.params.transfer_to_noc_latency);
                            self.noc_send(pkt, ty, when, ctx);
                        },
                        None => self.finish_cmd(Code::Success, ctx),
                    },
                }
            },

            XferOrigin::Noc(mut pkt) => {
                if let Some((ep, slot)) = recv {
                    self.finish_msg_receive(ep, slot, res, ctx);
                }
                if kind.is_read() && res == Code::Success {
                    pkt.set_data(data);
                }
                let when = self.at(ctx, self.params.transfer_to_noc_latency);
                self.noc_respond(pkt, res, when, ctx);
            },
        }
    }

    /// Cancels all transfers of the current command
    pub(crate) fn cancel_cmd_transfers(&mut self, ctx: &mut Ctx<'_>) {
        let ids: Vec<u64> = self
            .xfers
            .xfers
            .iter()
            .filter(|(_, x)| x.is_cmd())
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if let Some(x) = self.xfers.xfers.remove(&id) {
                log!(LogFlags::DtuXfers, "Transfer {}: cancelled", id);
                if let Some(next) = self.xfers.release(&x) {
                    let when = self.at(ctx, 0);
                    ctx.schedule(when, Event::Dtu(DtuEvent::Xfer(next)));
                }
            }
        }
        let XferUnit { xfers, waiting, .. } = &mut self.xfers;
        waiting.retain(|id| xfers.contains_key(id));
    }
}
