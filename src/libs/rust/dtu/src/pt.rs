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

//! Contains the page table walker of the DTU
//!
//! Page tables reside in the local memory. Each of the `LEVEL_CNT` levels translates
//! `LEVEL_BITS` address bits; an entry holds the physical address of the next level (or of the
//! page) and the permission bits (see [`Perm`]). Every level needs to grant the requested access.

use std::collections::HashMap;

use base::cfg;
use base::errors::Code;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;

use crate::dtu::Dtu;
use crate::packet::{MemReqType, MemSenderState, Packet, SenderState};
use crate::port::Port;
use crate::regfile::DtuReg;
use crate::sim::Ctx;

/// The state of a page table walk
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WalkState {
    Idle,
    /// The entry of the given level has been requested
    WalkPending { level: usize },
}

/// Who waits for the result of a translation
#[derive(Debug)]
pub enum TranslationOrigin {
    /// The current block of the given transfer
    Xfer(u64),
    /// The given request of the core
    Cache(Packet),
    /// The header of the message to reply to (for the command with given sequence number)
    Header(u64),
}

#[derive(Debug)]
struct Walk {
    virt: u64,
    access: Perm,
    state: WalkState,
    origin: TranslationOrigin,
}

/// The walks in progress
#[derive(Default)]
pub struct PtUnit {
    walks: HashMap<u64, Walk>,
    next_id: u64,
}

impl PtUnit {
    pub fn len(&self) -> usize {
        self.walks.len()
    }
}

/// Returns the offset of the entry for `virt` within a page table of given level
fn pte_offset(virt: u64, level: usize) -> u64 {
    let shift = cfg::PAGE_BITS + level * cfg::LEVEL_BITS;
    ((virt >> shift) & cfg::LEVEL_MASK as u64) << cfg::PTE_BITS
}

impl Dtu {
    /// Starts a page table walk to translate `virt` for `access`
    ///
    /// The result is reported to `origin` exactly once.
    pub(crate) fn start_walk(
        &mut self,
        virt: u64,
        access: Perm,
        origin: TranslationOrigin,
        ctx: &mut Ctx<'_>,
    ) {
        let id = self.pts.next_id;
        self.pts.next_id += 1;
        self.stats.pt_walks += 1;

        log!(
            LogFlags::DtuPts,
            "Walk {}: translating {:#x} for {:?}",
            id,
            virt,
            access
        );

        self.pts.walks.insert(id, Walk {
            virt,
            access,
            state: WalkState::Idle,
            origin,
        });

        let root = self.regs.get(DtuReg::RootPt) & !(cfg::PAGE_MASK as u64);
        self.request_pte(id, root, cfg::LEVEL_CNT - 1, ctx);
    }

    fn request_pte(&mut self, id: u64, table: u64, level: usize, ctx: &mut Ctx<'_>) {
        let walk = match self.pts.walks.get_mut(&id) {
            Some(w) => w,
            None => return,
        };

        walk.state = WalkState::WalkPending { level };
        let addr = table + pte_offset(walk.virt, level);
        log!(
            LogFlags::DtuPts,
            "Walk {}: reading level {} PTE @ {:#x}",
            id,
            level,
            addr
        );

        let mut pkt = Packet::new_read(addr, cfg::PTE_SIZE);
        pkt.push_state(SenderState::Mem(MemSenderState {
            ty: MemReqType::Translation,
            id,
        }));
        let when = self.at(ctx, self.params.transfer_to_mem_request_latency);
        ctx.send(Port::Mem, pkt, when);
    }

    /// Continues walk `id` with the page table entry in `pkt`
    pub(crate) fn walk_step(&mut self, id: u64, pkt: Packet, ctx: &mut Ctx<'_>) {
        let (virt, access, level) = match self.pts.walks.get(&id) {
            Some(Walk {
                virt,
                access,
                state: WalkState::WalkPending { level },
                ..
            }) => (*virt, *access, *level),
            _ => {
                log!(LogFlags::Error, "Walk {}: unexpected PTE response", id);
                return;
            },
        };

        if pkt.is_error() {
            return self.finish_walk(id, Err(Code::TranslationFault), ctx);
        }

        let pte = pkt.reg(0);
        let perm = Perm::from_bits_truncate(pte & cfg::PAGE_MASK as u64);
        if !perm.contains(access) {
            log!(
                LogFlags::DtuPts,
                "Walk {}: level {} PTE {:#x} denies {:?}",
                id,
                level,
                pte,
                access
            );
            return self.finish_walk(id, Err(Code::TranslationFault), ctx);
        }

        let base = pte & !(cfg::PAGE_MASK as u64);
        if level > 0 {
            return self.request_pte(id, base, level - 1, ctx);
        }

        self.tlb.insert(virt, base, perm);
        let phys = base | (virt & cfg::PAGE_MASK as u64);
        self.finish_walk(id, Ok(phys), ctx);
    }

    fn finish_walk(&mut self, id: u64, res: Result<u64, Code>, ctx: &mut Ctx<'_>) {
        let walk = match self.pts.walks.remove(&id) {
            Some(w) => w,
            None => return,
        };

        log!(
            LogFlags::DtuPts,
            "Walk {}: {:#x} -> {:x?}",
            id,
            walk.virt,
            res
        );
        if res.is_err() {
            self.stats.translation_faults += 1;
        }

        match walk.origin {
            TranslationOrigin::Xfer(xfer) => self.xfer_translated(xfer, res, ctx),
            TranslationOrigin::Cache(pkt) => self.cache_translated(pkt, res, ctx),
            TranslationOrigin::Header(seq) => self.reply_header_translated(seq, res, ctx),
        }
    }
}
