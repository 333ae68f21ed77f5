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

//! Contains the simulated system: a set of processing elements connected by the NoC

use std::any::Any;

use base::errors::{Code, Error};
use base::io::{log as logger, LogFlags};
use base::log;
use base::time::{Clock, Cycles, Tick};

use crate::dtu::Dtu;
use crate::memory::Memory;
use crate::noc::MAX_CORES;
use crate::packet::Packet;
use crate::params::DtuParams;
use crate::port::{Port, Requester, Responder};
use crate::sim::{Ctx, Event, EventQueue};
use crate::PeId;

/// The access latency of the scratchpad memories
pub const SPM_LATENCY: Cycles = 2;

/// A core that is attached to a DTU
///
/// The core sends requests on [`Port::Cpu`] and receives the responses via
/// [`Requester::complete_request`].
pub trait Core: Requester {
    /// Is called once the core has been attached to its PE
    fn start(&mut self, ctx: &mut Ctx<'_>) {
        ctx.schedule(ctx.now(), Event::CoreTick);
    }

    /// Performs the next step of the core
    fn tick(&mut self, ctx: &mut Ctx<'_>);

    /// Wakes the core up if it is sleeping
    fn wakeup(&mut self, ctx: &mut Ctx<'_>);

    /// Delivers an interrupt to the core
    fn interrupt(&mut self, ctx: &mut Ctx<'_>);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A processing element
pub struct Pe {
    pub dtu: Dtu,
    pub mem: Memory,
    pub core: Option<Box<dyn Core>>,
}

/// The system of processing elements and the event queue that drives them
#[derive(Default)]
pub struct System {
    pes: Vec<Pe>,
    queue: EventQueue<(PeId, Event)>,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a PE with a DTU configured by `params` and `mem_size` bytes of scratchpad memory
    pub fn add_pe(&mut self, params: DtuParams, mem_size: usize) -> Result<PeId, Error> {
        let id = self.pes.len();
        if id >= MAX_CORES {
            return Err(Error::new(Code::InvArgs));
        }

        let clock = Clock::new(params.clock_period);
        let dtu = Dtu::new(id, params, mem_size)?;
        self.pes.push(Pe {
            dtu,
            mem: Memory::new(mem_size, clock, SPM_LATENCY),
            core: None,
        });
        Ok(id)
    }

    /// Attaches `core` to PE `pe` and starts it
    pub fn set_core(&mut self, pe: PeId, core: Box<dyn Core>) -> Result<(), Error> {
        let p = self.pes.get_mut(pe).ok_or_else(|| Error::new(Code::InvArgs))?;
        let core = p.core.insert(core);
        let mut ctx = Ctx::new(pe, &mut self.queue);
        core.start(&mut ctx);
        Ok(())
    }

    pub fn pe_count(&self) -> usize {
        self.pes.len()
    }

    pub fn pe(&self, pe: PeId) -> &Pe {
        &self.pes[pe]
    }

    pub fn pe_mut(&mut self, pe: PeId) -> &mut Pe {
        &mut self.pes[pe]
    }

    pub fn dtu(&self, pe: PeId) -> &Dtu {
        &self.pes[pe].dtu
    }

    pub fn dtu_mut(&mut self, pe: PeId) -> &mut Dtu {
        &mut self.pes[pe].dtu
    }

    pub fn mem(&self, pe: PeId) -> &Memory {
        &self.pes[pe].mem
    }

    pub fn mem_mut(&mut self, pe: PeId) -> &mut Memory {
        &mut self.pes[pe].mem
    }

    /// Returns the core of PE `pe`, if it has one of type `T`
    pub fn core<T: Core + 'static>(&self, pe: PeId) -> Option<&T> {
        self.pes[pe].core.as_ref()?.as_any().downcast_ref()
    }

    pub fn core_mut<T: Core + 'static>(&mut self, pe: PeId) -> Option<&mut T> {
        self.pes[pe].core.as_mut()?.as_any_mut().downcast_mut()
    }

    /// Returns the current tick
    pub fn now(&self) -> Tick {
        self.queue.now()
    }

    /// Issues `pkt` on the CPU port of PE `pe` as if the core had sent it
    pub fn cpu_request(&mut self, pe: PeId, pkt: Packet) {
        let now = self.queue.now();
        self.queue.schedule(now, (pe, Event::Request(Port::Cpu, pkt)));
    }

    /// Writes the given register values to consecutive registers at `addr` on behalf of the core
    pub fn cpu_write_regs(&mut self, pe: PeId, addr: u64, regs: &[u64]) {
        self.cpu_request(pe, Packet::new_reg_write(addr, regs));
    }

    /// Schedules `ev` for PE `pe` at the current tick
    pub fn inject(&mut self, pe: PeId, ev: Event) {
        let now = self.queue.now();
        self.queue.schedule(now, (pe, ev));
    }

    /// Delivers the next event; returns false if there is none
    pub fn step(&mut self) -> bool {
        match self.queue.pop() {
            Some((_, (pe, ev))) => {
                self.dispatch(pe, ev);
                true
            },
            None => false,
        }
    }

    /// Runs until no events are left and returns the current tick
    pub fn run(&mut self) -> Tick {
        while self.step() {}
        self.now()
    }

    /// Runs all events up to and including tick `end`
    pub fn run_until(&mut self, end: Tick) -> Tick {
        while self.queue.peek_tick().map(|t| t <= end).unwrap_or(false) {
            self.step();
        }
        self.now()
    }

    fn dispatch(&mut self, pe: PeId, ev: Event) {
        let now = self.queue.now();
        logger::set_context(Some(pe), now);

        let p = match self.pes.get_mut(pe) {
            Some(p) => p,
            None => {
                log!(LogFlags::Error, "Dropping event for unknown PE{}: {:?}", pe, ev);
                return;
            },
        };

        log!(LogFlags::SimEvents, "{:?}", ev);

        let mut ctx = Ctx::new(pe, &mut self.queue);
        match ev {
            Event::Dtu(ev) => p.dtu.handle_event(ev, &mut ctx),

            Event::Request(Port::Cpu, pkt) => {
                let in_mem = pkt.addr() < p.dtu.params().reg_base && p.mem.contains(pkt.addr(), pkt.size());
                if in_mem {
                    p.mem.recv_request(Port::Cpu, pkt, &mut ctx);
                }
                else {
                    p.dtu.recv_request(Port::Cpu, pkt, &mut ctx);
                }
            },
            Event::Request(Port::Mem, pkt) => p.mem.recv_request(Port::Mem, pkt, &mut ctx),
            Event::Request(Port::Noc, pkt) => p.dtu.recv_request(Port::Noc, pkt, &mut ctx),

            Event::Response(Port::Cpu, pkt) => match p.core.as_mut() {
                Some(c) => c.complete_request(Port::Cpu, pkt, &mut ctx),
                None => log!(LogFlags::Debug, "No core to receive {:?}", pkt),
            },
            Event::Response(port, pkt) => p.dtu.complete_request(port, pkt, &mut ctx),

            Event::CoreTick => {
                if let Some(c) = p.core.as_mut() {
                    c.tick(&mut ctx);
                }
            },
            Event::CoreWakeup => {
                if let Some(c) = p.core.as_mut() {
                    c.wakeup(&mut ctx);
                }
            },
            Event::CoreIrq => {
                if let Some(c) = p.core.as_mut() {
                    c.interrupt(&mut ctx);
                }
            },
        }

        logger::set_context(None, now);
    }
}
