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

//! Contains the scratchpad memory of a processing element

use base::errors::{Code, Error};
use base::io::LogFlags;
use base::log;
use base::time::{Clock, Cycles};

use crate::packet::Packet;
use crate::port::{Port, Responder};
use crate::sim::Ctx;

/// A byte-addressable memory that answers requests after a fixed latency
pub struct Memory {
    data: Vec<u8>,
    clock: Clock,
    latency: Cycles,
}

impl Memory {
    /// Creates a zero-initialized memory of `size` bytes
    pub fn new(size: usize, clock: Clock, latency: Cycles) -> Self {
        Self {
            data: vec![0; size],
            clock,
            latency,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the range `addr..addr+size` lies within the memory
    pub fn contains(&self, addr: u64, size: usize) -> bool {
        addr.checked_add(size as u64)
            .map(|end| end <= self.data.len() as u64)
            .unwrap_or(false)
    }

    /// Reads `buf.len()` bytes at `addr` without modeling time
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), Error> {
        if !self.contains(addr, buf.len()) {
            return Err(Error::new(Code::OutOfBounds));
        }
        let off = addr as usize;
        buf.copy_from_slice(&self.data[off..off + buf.len()]);
        Ok(())
    }

    /// Writes `buf` to `addr` without modeling time
    pub fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), Error> {
        if !self.contains(addr, buf.len()) {
            return Err(Error::new(Code::OutOfBounds));
        }
        let off = addr as usize;
        self.data[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    pub fn read_word(&self, addr: u64) -> Result<u64, Error> {
        let mut word = [0u8; 8];
        self.read(addr, &mut word)?;
        Ok(u64::from_le_bytes(word))
    }

    pub fn write_word(&mut self, addr: u64, val: u64) -> Result<(), Error> {
        self.write(addr, &val.to_le_bytes())
    }

    /// Performs the access described by `pkt` and turns it into the response
    pub fn access(&mut self, pkt: &mut Packet) {
        if pkt.is_read() {
            let mut buf = vec![0u8; pkt.size()];
            match self.read(pkt.addr(), &mut buf) {
                Ok(_) => pkt.set_data(buf),
                Err(e) => pkt.set_result(e.code()),
            }
        }
        else if let Err(e) = self.write(pkt.addr(), pkt.data()) {
            pkt.set_result(e.code());
        }

        if pkt.is_error() {
            log!(LogFlags::Error, "Memory access failed: {:?}", pkt);
        }
        pkt.make_response();
    }
}

impl Responder for Memory {
    fn recv_request(&mut self, port: Port, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        self.access(&mut pkt);
        let when = if pkt.is_functional() {
            ctx.now()
        }
        else {
            self.clock.edge(ctx.now(), self.latency)
        };
        ctx.reply(port, pkt, when);
    }
}
