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

//! Contains the translation lookaside buffer of the DTU

use std::collections::HashMap;

use base::cfg;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;

/// The result of a TLB lookup
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TlbResult {
    /// The translation is present and permits the access; holds the physical address
    Hit(u64),
    /// No translation for the page is present
    Miss,
    /// The translation is present, but does not permit the access
    PageFault,
}

#[derive(Copy, Clone, Debug)]
struct TlbEntry {
    phys: u64,
    perm: Perm,
    last_use: u64,
}

/// A fully associative TLB with least-recently-used replacement
pub struct Tlb {
    entries: HashMap<u64, TlbEntry>,
    capacity: usize,
    lru_seq: u64,
}

impl Tlb {
    /// Creates an empty TLB with room for `capacity` translations
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            lru_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn page(virt: u64) -> u64 {
        virt & !(cfg::PAGE_MASK as u64)
    }

    /// Looks up the translation of `virt` for an access with permissions `access`
    pub fn lookup(&mut self, virt: u64, access: Perm) -> TlbResult {
        self.lru_seq += 1;
        match self.entries.get_mut(&Self::page(virt)) {
            None => TlbResult::Miss,
            Some(e) if !e.perm.contains(access) => TlbResult::PageFault,
            Some(e) => {
                e.last_use = self.lru_seq;
                TlbResult::Hit(e.phys | (virt & cfg::PAGE_MASK as u64))
            },
        }
    }

    /// Inserts the translation `virt` -> `phys` with permissions `perm`
    ///
    /// If the TLB is full, the least recently used entry is evicted.
    pub fn insert(&mut self, virt: u64, phys: u64, perm: Perm) {
        if self.capacity == 0 {
            return;
        }

        let page = Self::page(virt);
        if !self.entries.contains_key(&page) && self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_use)
                .map(|(v, _)| *v);
            if let Some(v) = victim {
                log!(LogFlags::DtuTlb, "TLB: evicting {:#x}", v);
                self.entries.remove(&v);
            }
        }

        self.lru_seq += 1;
        log!(
            LogFlags::DtuTlb,
            "TLB: inserting {:#x} -> {:#x} ({:?})",
            page,
            phys,
            perm
        );
        self.entries.insert(page, TlbEntry {
            phys: Self::page(phys),
            perm,
            last_use: self.lru_seq,
        });
    }

    /// Removes the translation of the page containing `virt`
    pub fn remove(&mut self, virt: u64) {
        log!(LogFlags::DtuTlb, "TLB: invalidating {:#x}", Self::page(virt));
        self.entries.remove(&Self::page(virt));
    }

    /// Removes all translations
    pub fn clear(&mut self) {
        log!(LogFlags::DtuTlb, "TLB: invalidating all entries");
        self.entries.clear();
    }
}

