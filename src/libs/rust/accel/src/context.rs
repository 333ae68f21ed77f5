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

use dtu::EpId;

use crate::accelerator::Accelerator;

/// An accelerator that consists of nothing but its context
pub struct ContextAccel {
    ctx: Vec<u8>,
    state_size: usize,
    ep: EpId,
    buffer_addr: u64,
    chunk_size: usize,
    max_data_size: usize,
    switched: u64,
}

impl ContextAccel {
    pub const DEF_CHUNK_SIZE: usize = 1024;
    pub const DEF_MAX_DATA_SIZE: usize = 256;

    /// Creates an accelerator with a zeroed context of `ctx_size` bytes and `state_size` bytes
    /// of state at `buffer_addr`, which is saved via memory endpoint `ep`
    pub fn new(ctx_size: usize, state_size: usize, ep: EpId, buffer_addr: u64) -> Self {
        Self {
            ctx: vec![0; ctx_size],
            state_size,
            ep,
            buffer_addr,
            chunk_size: Self::DEF_CHUNK_SIZE,
            max_data_size: Self::DEF_MAX_DATA_SIZE,
            switched: 0,
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_max_data_size(mut self, size: usize) -> Self {
        self.max_data_size = size;
        self
    }

    /// Returns how often the context has been restored
    pub fn switched(&self) -> u64 {
        self.switched
    }
}

impl Accelerator for ContextAccel {
    fn context_size(&self) -> usize {
        self.ctx.len()
    }

    fn state_size(&self) -> usize {
        self.state_size
    }

    fn context(&self) -> &[u8] {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut [u8] {
        &mut self.ctx
    }

    fn context_ep(&self) -> EpId {
        self.ep
    }

    fn buffer_addr(&self) -> u64 {
        self.buffer_addr
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn max_data_size(&self) -> usize {
        self.max_data_size
    }

    fn set_switched(&mut self) {
        self.switched += 1;
    }
}
