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

//! Contains the context switch engine of accelerators
//!
//! The engine polls the flags word at [`cfg::RCTMUX_FLAGS`] after the scheduler has sent an
//! interrupt. To save the context, it aborts the running DTU command, stages the context in the
//! scratchpad directly below the state and writes context and state to the save area via WRITE
//! commands on the context endpoint. Restoring reverses this with READ commands and copies the
//! staged context back into the accelerator.

use core::fmt;
use num_enum::IntoPrimitive;

use base::cfg;
use base::errors::Code;
use base::io::LogFlags;
use base::log;
use dtu::packet::Packet;
use dtu::regfile::{CmdReg, RegId, ReqReg, ABORT_CMD};
use dtu::{Command, Opcode};

use crate::accelerator::{Accelerator, RctMuxFlags};

/// The states of the context switch engine
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(usize)]
pub enum CtxSwState {
    Save,
    SaveWrite,
    SaveSend,
    SaveWait,
    SaveDone,
    Wait,
    Check,
    Flags,
    Restore,
    RestoreWait,
    RestoreRead,
    RestoreDone,
}

const STATE_COUNT: usize = 12;

impl fmt::Display for CtxSwState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Save => "SAVE",
            Self::SaveWrite => "SAVE_WRITE",
            Self::SaveSend => "SAVE_SEND",
            Self::SaveWait => "SAVE_WAIT",
            Self::SaveDone => "SAVE_DONE",
            Self::Wait => "WAIT",
            Self::Check => "CHECK",
            Self::Flags => "FLAGS",
            Self::Restore => "RESTORE",
            Self::RestoreWait => "RESTORE_WAIT",
            Self::RestoreRead => "RESTORE_READ",
            Self::RestoreDone => "RESTORE_DONE",
        };
        f.write_str(name)
    }
}

/// The context switch engine of one accelerator
pub struct AccelContextSwitch {
    state: CtxSwState,
    state_changed: bool,
    offset: usize,
    pending: bool,
    issued: [u64; STATE_COUNT],
}

impl Default for AccelContextSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl AccelContextSwitch {
    /// Creates a new engine that starts by checking for requests of the scheduler
    pub fn new() -> Self {
        Self {
            state: CtxSwState::Check,
            state_changed: false,
            offset: 0,
            pending: false,
            issued: [0; STATE_COUNT],
        }
    }

    pub fn state(&self) -> CtxSwState {
        self.state
    }

    /// Returns true if the last response changed the state
    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    /// Returns true if the engine waits for the scheduler after a save
    pub fn is_waiting(&self) -> bool {
        self.state == CtxSwState::Wait
    }

    /// Returns true if the context has been saved, but not restored yet
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The number of bytes of the current save or restore phase that have been handled
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of requests that have been issued in the given state
    pub fn issued(&self, state: CtxSwState) -> u64 {
        self.issued[usize::from(state)]
    }

    /// Starts over with checking for requests of the scheduler
    pub fn restart(&mut self) {
        log!(LogFlags::AccelCtxSw, "ctxsw: restart in {}", self.state);
        self.state = CtxSwState::Check;
    }

    fn staging_addr<A: Accelerator + ?Sized>(acc: &A, off: usize) -> u64 {
        acc.buffer_addr() - acc.context_size() as u64 + off as u64
    }

    /// Creates the next request to issue or `None` if the engine waits
    pub fn tick<A: Accelerator + ?Sized>(&mut self, acc: &A) -> Option<Packet> {
        let ctx_size = acc.context_size();
        let total = ctx_size + acc.state_size();

        let pkt = match self.state {
            CtxSwState::Wait => return None,

            CtxSwState::Save => acc.reg_write_pkt(RegId::Cmd(CmdReg::Abort), ABORT_CMD),

            CtxSwState::SaveWrite => {
                let size = acc.chunk_size().min(ctx_size - self.offset);
                let data = acc.context()[self.offset..self.offset + size].to_vec();
                Packet::new_write(Self::staging_addr(acc, self.offset), data)
            },

            CtxSwState::SaveSend | CtxSwState::Restore => {
                let size = acc.max_data_size().min(total - self.offset);
                let op = if self.state == CtxSwState::SaveSend {
                    Opcode::Write
                }
                else {
                    Opcode::Read
                };
                let pkt = acc.cmd_pkt(op, Self::staging_addr(acc, self.offset), size, self.offset);
                self.offset += size;
                pkt
            },

            CtxSwState::SaveWait | CtxSwState::RestoreWait => {
                acc.reg_read_pkt(RegId::Cmd(CmdReg::Command))
            },

            CtxSwState::SaveDone | CtxSwState::RestoreDone => {
                Packet::new_reg_write(cfg::RCTMUX_FLAGS, &[RctMuxFlags::SIGNAL.bits()])
            },

            CtxSwState::Check => acc.reg_write_pkt(RegId::Req(ReqReg::ExtReq), 0),

            CtxSwState::Flags => Packet::new_read(cfg::RCTMUX_FLAGS, cfg::REG_SIZE),

            CtxSwState::RestoreRead => {
                let size = acc.chunk_size().min(ctx_size - self.offset);
                Packet::new_read(Self::staging_addr(acc, self.offset), size)
            },
        };

        self.issued[usize::from(self.state)] += 1;
        log!(LogFlags::AccelState, "ctxsw[{}]: issuing {:?}", self.state, pkt);
        Some(pkt)
    }

    /// Handles the response to the request issued last
    ///
    /// Returns true if the accelerator can continue with its own work, that is, if there is no
    /// request of the scheduler or if the context has just been restored.
    pub fn handle_mem_resp<A: Accelerator + ?Sized>(&mut self, acc: &mut A, pkt: &Packet) -> bool {
        let last = self.state;
        let total = acc.context_size() + acc.state_size();

        match self.state {
            CtxSwState::Wait => {
                log!(LogFlags::Error, "ctxsw: unexpected response {:?} while waiting", pkt);
            },

            CtxSwState::Save => {
                self.offset = 0;
                self.state = CtxSwState::SaveWrite;
            },

            CtxSwState::SaveWrite => {
                self.offset += pkt.size();
                if self.offset == acc.context_size() {
                    self.offset = 0;
                    self.state = CtxSwState::SaveSend;
                }
            },

            CtxSwState::SaveSend => self.state = CtxSwState::SaveWait,

            CtxSwState::SaveWait => {
                let cmd = Command::decode(pkt.reg(0));
                if cmd.is_idle() {
                    // errors are not retried; the memory endpoint might not be configured yet
                    if cmd.error != Code::Success || self.offset == total {
                        if cmd.error != Code::Success {
                            log!(LogFlags::AccelCtxSw, "ctxsw: save failed with {:?}", cmd.error);
                        }
                        self.state = CtxSwState::SaveDone;
                    }
                    else {
                        self.state = CtxSwState::SaveSend;
                    }
                }
            },

            CtxSwState::SaveDone => {
                self.state = CtxSwState::Wait;
                self.pending = true;
            },

            CtxSwState::Check => self.state = CtxSwState::Flags,

            CtxSwState::Flags => {
                let flags = RctMuxFlags::from_bits_truncate(pkt.reg(0));
                if flags.contains(RctMuxFlags::RESTORE) {
                    self.offset = 0;
                    self.state = CtxSwState::Restore;
                }
                else if flags.contains(RctMuxFlags::STORE) {
                    self.state = CtxSwState::Save;
                }
                else if flags.contains(RctMuxFlags::WAITING) {
                    self.state = CtxSwState::RestoreDone;
                }
                else if self.pending {
                    self.state = CtxSwState::Wait;
                }
                else {
                    // re-poll; keeps the change flag of the previous transition
                    self.state = CtxSwState::Check;
                    return true;
                }
            },

            CtxSwState::Restore => {
                self.pending = false;
                self.state = CtxSwState::RestoreWait;
            },

            CtxSwState::RestoreWait => {
                let cmd = Command::decode(pkt.reg(0));
                if cmd.is_idle() {
                    if self.offset == total {
                        self.offset = 0;
                        self.state = CtxSwState::RestoreRead;
                    }
                    else {
                        self.state = CtxSwState::Restore;
                    }
                }
            },

            CtxSwState::RestoreRead => {
                let off = self.offset;
                let data = pkt.data();
                acc.context_mut()[off..off + data.len()].copy_from_slice(data);
                self.offset += data.len();
                if self.offset == acc.context_size() {
                    self.state = CtxSwState::RestoreDone;
                }
            },

            CtxSwState::RestoreDone => {
                self.pending = false;
                self.state = CtxSwState::Check;
                self.state_changed = true;
                acc.set_switched();
                log!(LogFlags::AccelCtxSw, "ctxsw: context restored");
                return true;
            },
        }

        self.state_changed = last != self.state;
        if self.state_changed {
            log!(LogFlags::AccelCtxSw, "ctxsw: {} -> {}", last, self.state);
        }
        false
    }
}
