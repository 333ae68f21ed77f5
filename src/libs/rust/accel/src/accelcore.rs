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

use std::any::Any;

use base::io::LogFlags;
use base::log;
use base::time::Clock;
use dtu::packet::Packet;
use dtu::port::{Port, Requester};
use dtu::sim::{Ctx, Event};
use dtu::system::Core;

use crate::accelerator::Accelerator;
use crate::ctxsw::AccelContextSwitch;

/// A core that consists of an accelerator and its context switch engine
///
/// The core has at most one request in flight. It parks when the engine has nothing to do and
/// is woken up by an interrupt from the scheduler.
pub struct AccelCore<A: Accelerator> {
    accel: A,
    ctxsw: AccelContextSwitch,
    clock: Clock,
    busy: bool,
    parked: bool,
}

impl<A: Accelerator> AccelCore<A> {
    pub fn new(accel: A, clock: Clock) -> Self {
        Self {
            accel,
            ctxsw: AccelContextSwitch::new(),
            clock,
            busy: false,
            parked: false,
        }
    }

    pub fn accel(&self) -> &A {
        &self.accel
    }

    pub fn accel_mut(&mut self) -> &mut A {
        &mut self.accel
    }

    pub fn ctxsw(&self) -> &AccelContextSwitch {
        &self.ctxsw
    }

    /// Returns true if the core waits for an interrupt
    pub fn is_parked(&self) -> bool {
        self.parked
    }

    fn park(&mut self) {
        log!(LogFlags::AccelCtxSw, "accel: parking in {}", self.ctxsw.state());
        self.parked = true;
    }

    fn unpark(&mut self, ctx: &mut Ctx<'_>) {
        if self.parked {
            self.parked = false;
            if !self.busy {
                ctx.schedule(ctx.now(), Event::CoreTick);
            }
        }
    }
}

impl<A: Accelerator> Requester for AccelCore<A> {
    fn complete_request(&mut self, _port: Port, pkt: Packet, ctx: &mut Ctx<'_>) {
        self.busy = false;
        if pkt.is_error() {
            log!(LogFlags::Error, "accel: request failed: {:?}", pkt);
        }

        let idle = self.ctxsw.handle_mem_resp(&mut self.accel, &pkt);
        if idle || self.ctxsw.is_waiting() {
            self.park();
        }
        else {
            let when = self.clock.edge(ctx.now(), 1);
            ctx.schedule(when, Event::CoreTick);
        }
    }
}

impl<A: Accelerator + 'static> Core for AccelCore<A> {
    fn tick(&mut self, ctx: &mut Ctx<'_>) {
        if self.busy || self.parked {
            return;
        }

        match self.ctxsw.tick(&self.accel) {
            Some(pkt) => {
                self.busy = true;
                ctx.send(Port::Cpu, pkt, ctx.now());
            },
            None => self.park(),
        }
    }

    fn wakeup(&mut self, ctx: &mut Ctx<'_>) {
        if !self.ctxsw.is_waiting() {
            self.unpark(ctx);
        }
    }

    fn interrupt(&mut self, ctx: &mut Ctx<'_>) {
        log!(LogFlags::AccelCtxSw, "accel: interrupt in {}", self.ctxsw.state());
        if self.ctxsw.is_waiting() {
            self.ctxsw.restart();
        }
        self.unpark(ctx);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
