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

//! Contains the message unit of the DTU

use base::errors::Code;
use base::io::LogFlags;
use base::kif::Perm;
use base::log;

use crate::dtu::Dtu;
use crate::header::{HeaderFlags, MessageHeader, HEADER_SIZE};
use crate::noc::{NocAddr, NocPacketType};
use crate::packet::{MemReqType, MemSenderState, Packet, SenderState};
use crate::port::Port;
use crate::pt::TranslationOrigin;
use crate::regfile::{CmdReg, DtuReg, EpReg, UNLIM_CREDITS};
use crate::sim::Ctx;
use crate::tlb::TlbResult;
use crate::xfer::{TransferEvent, XferFlags, XferKind, XferOrigin};
use crate::{EpId, INVALID_EP};

/// The state of a running REPLY command
#[derive(Debug, Default)]
pub struct ReplyState {
    /// The physical address of the header that is replied to
    phys: u64,
    /// The header that is replied to, once it has been read
    hdr: Option<MessageHeader>,
}

pub struct MsgUnit {
    /// The number of slots per receive endpoint that are reserved for messages in flight
    reserved: Vec<usize>,
    pub(crate) reply: Option<ReplyState>,
}

impl MsgUnit {
    pub fn new(num_eps: usize) -> Self {
        Self {
            reserved: vec![0; num_eps],
            reply: None,
        }
    }
}

impl Dtu {
    pub(crate) fn start_send(&mut self, ctx: &mut Ctx<'_>) {
        let ep = self.cmd.ep;
        let mut sep = self.regs.send_ep(ep);
        let size = self.regs.get_cmd(CmdReg::DataSize) as usize;

        if !sep.is_valid() {
            return self.finish_cmd(Code::NoSEP, ctx);
        }
        let msg_size = size.checked_add(HEADER_SIZE).unwrap_or(usize::MAX);
        if msg_size > sep.max_msg_size || msg_size > self.params.max_noc_packet_size {
            log!(
                LogFlags::Error,
                "EP{}: message of {} bytes exceeds maximum of {} bytes",
                ep,
                msg_size,
                sep.max_msg_size.min(self.params.max_noc_packet_size)
            );
            return self.finish_cmd(Code::SendInvMsgSize, ctx);
        }
        if sep.credits == 0 {
            log!(LogFlags::DtuCredits, "EP{}: no credits to send message", ep);
            return self.finish_cmd(Code::NoCredits, ctx);
        }

        if sep.credits != UNLIM_CREDITS {
            sep.credits -= 1;
            self.regs.set_ep(ep, EpReg::Credits, sep.credits);
            log!(
                LogFlags::DtuCredits,
                "EP{}: paid credit, {} of {} left",
                ep,
                sep.credits,
                sep.max_credits
            );
        }

        let reply_ep = self.regs.get_cmd(CmdReg::ReplyEpid) as EpId;
        let hdr = MessageHeader {
            flags: if reply_ep != INVALID_EP {
                HeaderFlags::REPLY_ENABLED
            }
            else {
                HeaderFlags::empty()
            },
            sender_core: self.id,
            sender_ep: ep,
            reply_ep,
            length: size as u16,
            label: sep.label,
            reply_label: self.regs.get_cmd(CmdReg::ReplyLabel),
        };

        self.send_msg(hdr, NocAddr::new_ep(sep.tgt_core, sep.tgt_ep), ctx);
    }

    fn send_msg(&mut self, hdr: MessageHeader, dest: NocAddr, ctx: &mut Ctx<'_>) {
        log!(
            LogFlags::DtuMsgs,
            "Sending message to EP{} of PE{}: {:?}",
            dest.ep(),
            dest.core_id,
            hdr
        );

        let data_addr = self.regs.get_cmd(CmdReg::DataAddr);
        let xfer = TransferEvent::new(
            XferKind::LocalRead,
            XferFlags::MESSAGE,
            data_addr,
            hdr.length as usize,
            XferOrigin::Cmd(self.cmd_seq),
        )
        .with_prefix(&hdr.to_bytes())
        .with_target(dest, NocPacketType::Message);
        self.start_transfer(xfer, self.params.start_msg_transfer_delay, ctx);
    }

    /// Handles the NoC response for a sent message
    pub(crate) fn msg_sent(&mut self, seq: u64, res: Code, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            log!(LogFlags::DtuMsgs, "Ignoring message response of stale command {}", seq);
            return;
        }
        if res != Code::Success {
            log!(LogFlags::DtuMsgs, "Message delivery failed: {:?}", res);
        }
        self.finish_cmd(res, ctx);
    }

    pub(crate) fn start_reply(&mut self, ctx: &mut Ctx<'_>) {
        let ep = self.cmd.ep;
        let rep = self.regs.recv_ep(ep);
        let size = self.regs.get_cmd(CmdReg::DataSize) as usize;

        if !rep.is_valid() {
            return self.finish_cmd(Code::NoREP, ctx);
        }
        if rep.msg_count == 0 {
            return self.finish_cmd(Code::NoMsgs, ctx);
        }
        match size.checked_add(HEADER_SIZE) {
            Some(msg_size) if msg_size <= self.params.max_noc_packet_size => {},
            _ => return self.finish_cmd(Code::SendInvMsgSize, ctx),
        }

        self.msgs.reply = Some(ReplyState::default());

        let virt = rep.buf_addr + rep.rd_ptr;
        if !self.translation_enabled() {
            return self.read_reply_header(virt, ctx);
        }

        match self.tlb.lookup(virt, Perm::RW) {
            TlbResult::Hit(phys) => {
                self.stats.tlb_hits += 1;
                self.read_reply_header(phys, ctx);
            },
            TlbResult::Miss => {
                self.stats.tlb_misses += 1;
                let seq = self.cmd_seq;
                self.start_walk(virt, Perm::RW, TranslationOrigin::Header(seq), ctx);
            },
            TlbResult::PageFault => {
                self.stats.translation_faults += 1;
                self.finish_cmd(Code::TranslationFault, ctx);
            },
        }
    }

    pub(crate) fn reply_header_translated(&mut self, seq: u64, res: Result<u64, Code>, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            return;
        }
        match res {
            Ok(phys) => self.read_reply_header(phys, ctx),
            Err(e) => self.finish_cmd(e, ctx),
        }
    }

    fn read_reply_header(&mut self, phys: u64, ctx: &mut Ctx<'_>) {
        if let Some(r) = self.msgs.reply.as_mut() {
            r.phys = phys;
        }

        let mut pkt = Packet::new_read(phys, HEADER_SIZE);
        pkt.push_state(SenderState::Mem(MemSenderState {
            ty: MemReqType::Header,
            id: self.cmd_seq,
        }));
        let when = self.at(ctx, self.params.transfer_to_mem_request_latency);
        ctx.send(Port::Mem, pkt, when);
    }

    pub(crate) fn reply_header_read(&mut self, seq: u64, pkt: Packet, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            return;
        }
        if pkt.is_error() {
            return self.finish_cmd(pkt.result(), ctx);
        }

        let hdr = match MessageHeader::from_bytes(pkt.data()) {
            Ok(h) => h,
            Err(e) => return self.finish_cmd(e.code(), ctx),
        };
        if !hdr.flags.contains(HeaderFlags::REPLY_ENABLED) {
            log!(LogFlags::DtuMsgs, "EP{}: replies disabled for {:?}", self.cmd.ep, hdr);
            return self.finish_cmd(Code::RepliesDisabled, ctx);
        }

        let phys = match self.msgs.reply.as_mut() {
            Some(r) => {
                r.hdr = Some(hdr);
                r.phys
            },
            None => return,
        };

        // only one reply per message
        let flags = hdr.flags - HeaderFlags::REPLY_ENABLED;
        let mut upd = Packet::new_write(phys, vec![flags.bits()]);
        upd.push_state(SenderState::Mem(MemSenderState {
            ty: MemReqType::HeaderUpdate,
            id: seq,
        }));
        let when = self.at(ctx, self.params.transfer_to_mem_request_latency);
        ctx.send(Port::Mem, upd, when);
    }

    pub(crate) fn reply_header_updated(&mut self, seq: u64, res: Code, ctx: &mut Ctx<'_>) {
        if !self.is_current(seq) {
            return;
        }
        if res != Code::Success {
            return self.finish_cmd(res, ctx);
        }

        let orig = match self.msgs.reply.as_ref().and_then(|r| r.hdr) {
            Some(h) => h,
            None => return,
        };

        let hdr = MessageHeader {
            flags: HeaderFlags::REPLY
                | HeaderFlags::GRANT_CREDITS
                | (orig.flags & HeaderFlags::PAGEFAULT),
            sender_core: self.id,
            sender_ep: self.cmd.ep,
            reply_ep: orig.sender_ep,
            length: self.regs.get_cmd(CmdReg::DataSize) as u16,
            label: orig.reply_label,
            reply_label: 0,
        };
        self.send_msg(hdr, NocAddr::new_ep(orig.sender_core, orig.reply_ep), ctx);
    }

    fn recv_error(&mut self, code: Code, ep: EpId) {
        log!(LogFlags::Error, "EP{}: receive error {:?}", ep, code);
        self.stats.recv_errors += 1;
        self.regs
            .set(DtuReg::RecvErr, u64::from(u32::from(code)) | (ep as u64) << 32);
    }

    fn grant_credit(&mut self, ep: EpId) {
        if ep >= self.params.num_endpoints || !self.regs.send_ep(ep).is_valid() {
            return self.recv_error(Code::UnexpectedReply, ep);
        }

        let sep = self.regs.send_ep(ep);
        if sep.credits == UNLIM_CREDITS {
            return;
        }
        if sep.credits >= sep.max_credits {
            return self.recv_error(Code::UnexpectedReply, ep);
        }

        self.regs.set_ep(ep, EpReg::Credits, sep.credits + 1);
        log!(
            LogFlags::DtuCredits,
            "EP{}: received credit, {} of {} available",
            ep,
            sep.credits + 1,
            sep.max_credits
        );
    }

    /// Handles a message that arrived over the NoC
    pub(crate) fn recv_msg(&mut self, mut pkt: Packet, ctx: &mut Ctx<'_>) {
        let ep = NocAddr::from_raw(pkt.addr()).ep();
        let when = self.at(ctx, self.params.transfer_to_noc_latency);

        let hdr = match MessageHeader::from_bytes(pkt.data()) {
            Ok(h) => h,
            Err(e) => {
                self.stats.msgs_dropped += 1;
                return self.noc_respond(pkt, e.code(), when, ctx);
            },
        };

        if ep >= self.params.num_endpoints || !self.regs.recv_ep(ep).is_valid() {
            log!(LogFlags::Error, "EP{}: dropping message, no receive endpoint", ep);
            self.stats.msgs_dropped += 1;
            return self.noc_respond(pkt, Code::NoREP, when, ctx);
        }

        let rep = self.regs.recv_ep(ep);
        if pkt.size() > rep.msg_size {
            log!(
                LogFlags::Error,
                "EP{}: dropping message of {} bytes, slots have {} bytes",
                ep,
                pkt.size(),
                rep.msg_size
            );
            self.stats.msgs_dropped += 1;
            return self.noc_respond(pkt, Code::RecvOutOfBounds, when, ctx);
        }
        if rep.msg_count + self.msgs.reserved[ep] >= rep.size {
            log!(LogFlags::DtuMsgs, "EP{}: dropping message, buffer full", ep);
            self.stats.msgs_dropped += 1;
            return self.noc_respond(pkt, Code::RecvNoSpace, when, ctx);
        }

        if hdr.flags.contains(HeaderFlags::REPLY | HeaderFlags::GRANT_CREDITS) {
            self.grant_credit(hdr.reply_ep);
        }

        let slot = rep.wr_ptr;
        self.regs.set_ep(ep, EpReg::BufWrPtr, rep.next_ptr(slot));
        self.msgs.reserved[ep] += 1;

        log!(
            LogFlags::DtuMsgs,
            "EP{}: receiving message into slot {:#x}: {:?}",
            ep,
            slot,
            hdr
        );

        let data = pkt.take_data();
        let xfer = TransferEvent::new(
            XferKind::RemoteWrite,
            XferFlags::MESSAGE | XferFlags::MSGRECV,
            rep.buf_addr + slot,
            data.len(),
            XferOrigin::Noc(pkt),
        )
        .with_data(data, 0)
        .with_recv(ep, slot);
        self.start_transfer(xfer, self.params.noc_to_transfer_latency, ctx);
    }

    /// Completes the reception of a message into `slot` of endpoint `ep`
    pub(crate) fn finish_msg_receive(&mut self, ep: EpId, slot: u64, res: Code, ctx: &mut Ctx<'_>) {
        self.msgs.reserved[ep] = self.msgs.reserved[ep].saturating_sub(1);

        let rep = self.regs.recv_ep(ep);
        if !rep.is_valid() {
            return;
        }

        if res == Code::Success {
            self.regs.set_ep(ep, EpReg::BufMsgCnt, (rep.msg_count + 1) as u64);
            self.stats.msgs_received += 1;
            log!(
                LogFlags::DtuMsgs,
                "EP{}: received message, {} unread",
                ep,
                rep.msg_count + 1
            );
            self.wakeup_core(ctx);
        }
        else {
            // release the slot if no other message has been placed behind it
            if rep.wr_ptr == rep.next_ptr(slot) {
                self.regs.set_ep(ep, EpReg::BufWrPtr, slot);
            }
            self.stats.msgs_dropped += 1;
            log!(LogFlags::DtuMsgs, "EP{}: storing message failed: {:?}", ep, res);
        }
    }

    /// Marks the oldest message of endpoint `ep` as read
    pub(crate) fn inc_read_ptr(&mut self, ep: EpId) -> Code {
        let rep = self.regs.recv_ep(ep);
        if !rep.is_valid() {
            return Code::NoREP;
        }
        if rep.msg_count == 0 {
            return Code::NoMsgs;
        }

        self.regs.set_ep(ep, EpReg::BufRdPtr, rep.next_ptr(rep.rd_ptr));
        self.regs
            .set_ep(ep, EpReg::BufMsgCnt, (rep.msg_count - 1) as u64);
        Code::Success
    }
}
