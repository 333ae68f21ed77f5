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

//! Contains the discrete-event simulation substrate

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use base::io::LogFlags;
use base::log;
use base::time::Tick;

use crate::dtu::DtuEvent;
use crate::noc::NocAddr;
use crate::packet::Packet;
use crate::port::Port;
use crate::PeId;

struct Entry<E> {
    when: Tick,
    seq: u64,
    ev: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {
}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.when
            .cmp(&other.when)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// A queue of timed events
///
/// Events are delivered in non-decreasing tick order; events scheduled for the same tick are
/// delivered in the order they were scheduled. An event is never delivered before its tick.
pub struct EventQueue<E> {
    heap: BinaryHeap<Reverse<Entry<E>>>,
    seq: u64,
    now: Tick,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
            now: 0,
        }
    }

    /// Returns the tick of the event that has been delivered last
    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedules `ev` at tick `when`; ticks in the past are moved to the current tick
    pub fn schedule(&mut self, when: Tick, ev: E) {
        debug_assert!(when >= self.now, "scheduling in the past ({} < {})", when, self.now);
        let when = when.max(self.now);
        self.heap.push(Reverse(Entry {
            when,
            seq: self.seq,
            ev,
        }));
        self.seq += 1;
    }

    /// Returns the tick of the next event without removing it
    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|Reverse(e)| e.when)
    }

    /// Removes the next event and advances the current time to its tick
    pub fn pop(&mut self) -> Option<(Tick, E)> {
        self.heap.pop().map(|Reverse(e)| {
            self.now = e.when;
            (e.when, e.ev)
        })
    }
}

/// The events of the simulated system
#[derive(Debug)]
pub enum Event {
    /// An internal step of a DTU
    Dtu(DtuEvent),
    /// A request that arrives at the given port
    Request(Port, Packet),
    /// A response that arrives at the given port
    Response(Port, Packet),
    /// The core should perform its next step
    CoreTick,
    /// The core should wake up if it is sleeping
    CoreWakeup,
    /// The core receives an interrupt
    CoreIrq,
}

/// The context that is handed to a component while it handles an event of its PE
pub struct Ctx<'q> {
    pe: PeId,
    now: Tick,
    queue: &'q mut EventQueue<(PeId, Event)>,
}

impl<'q> Ctx<'q> {
    pub fn new(pe: PeId, queue: &'q mut EventQueue<(PeId, Event)>) -> Self {
        let now = queue.now();
        Self { pe, now, queue }
    }

    /// Returns the PE of the component
    pub fn pe(&self) -> PeId {
        self.pe
    }

    /// Returns the current tick
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Schedules `ev` for this PE at tick `when`
    pub fn schedule(&mut self, when: Tick, ev: Event) {
        self.queue.schedule(when, (self.pe, ev));
    }

    /// Schedules `ev` for the given PE at tick `when`
    pub fn schedule_for(&mut self, pe: PeId, when: Tick, ev: Event) {
        self.queue.schedule(when, (pe, ev));
    }

    /// Sends the request `pkt` on `port` at tick `when`
    ///
    /// NoC requests are delivered to the PE denoted by the NoC address of the packet; all other
    /// requests stay within this PE.
    pub fn send(&mut self, port: Port, pkt: Packet, when: Tick) {
        let dst = match port {
            Port::Noc => NocAddr::from_raw(pkt.addr()).core_id,
            Port::Cpu | Port::Mem => self.pe,
        };
        self.schedule_for(dst, when, Event::Request(port, pkt));
    }

    /// Sends the response `pkt` back on `port` at tick `when`
    ///
    /// NoC responses are delivered to the PE recorded in the NoC sender state.
    pub fn reply(&mut self, port: Port, pkt: Packet, when: Tick) {
        let dst = match port {
            Port::Noc => match pkt.noc_state() {
                Some(s) => s.src,
                None => {
                    log!(
                        LogFlags::Error,
                        "Dropping NoC response without sender state: {:?}",
                        pkt
                    );
                    return;
                },
            },
            Port::Cpu | Port::Mem => self.pe,
        };
        self.schedule_for(dst, when, Event::Response(port, pkt));
    }
}
