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

//! Contains the interfaces between components that exchange packets
//!
//! Instead of a hierarchy of port classes, every component implements the capabilities it needs:
//! a [`Requester`] issues requests (via [`Ctx::send`]) and gets the responses delivered, a
//! [`Responder`] serves requests and answers them (via [`Ctx::reply`]). The DTU is both: it
//! serves the core and the NoC and issues requests to its memory and the NoC.

use crate::packet::Packet;
use crate::sim::Ctx;

/// The ports of a processing element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Port {
    /// Between core and DTU/scratchpad
    Cpu,
    /// Between DTUs
    Noc,
    /// Between DTU and its local memory
    Mem,
}

/// A component that issues requests
pub trait Requester {
    /// Is called with the response to a request that has been sent on `port`
    fn complete_request(&mut self, port: Port, pkt: Packet, ctx: &mut Ctx<'_>);
}

/// A component that serves requests
pub trait Responder {
    /// Is called with a request that arrived on `port`
    ///
    /// The responder has to answer every request that is not functional-only with exactly one
    /// response, carrying the sender state of the request.
    fn recv_request(&mut self, port: Port, pkt: Packet, ctx: &mut Ctx<'_>);
}
