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

//! Contains the header that precedes every message

use bitflags::bitflags;

use base::cfg;
use base::const_assert;
use base::errors::{Code, Error};

use crate::noc::MAX_CORES;
use crate::{EpId, PeId};

/// The size of the header on the wire
pub const HEADER_SIZE: usize = 24;

// endpoint and core ids are stored in single bytes
const_assert!(cfg::MAX_EPS <= 256);
const_assert!(MAX_CORES <= 256);

bitflags! {
    /// The flags of a message header
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct HeaderFlags : u8 {
        /// The message is a reply
        const REPLY         = 1 << 0;
        /// The receiver grants one credit back to the endpoint denoted by `reply_ep`
        const GRANT_CREDITS = 1 << 1;
        /// The message may be replied to; cleared with the first reply
        const REPLY_ENABLED = 1 << 2;
        /// The message was sent on behalf of a page fault
        const PAGEFAULT     = 1 << 3;
    }
}

/// The header of a message
///
/// Wire layout (little endian):
///
/// ```text
/// | flags:8 | sender core:8 | sender ep:8 | reply ep:8 | length:16 | reserved:16 |
/// | label:64                                                                   |
/// | reply label:64                                                             |
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub flags: HeaderFlags,
    pub sender_core: PeId,
    pub sender_ep: EpId,
    /// For messages: the endpoint that receives the reply. For replies: the endpoint that gets
    /// the credit back.
    pub reply_ep: EpId,
    /// The length of the payload in bytes
    pub length: u16,
    pub label: u64,
    pub reply_label: u64,
}

impl MessageHeader {
    /// Encodes the header into its wire format
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.flags.bits();
        bytes[1] = self.sender_core as u8;
        bytes[2] = self.sender_ep as u8;
        bytes[3] = self.reply_ep as u8;
        bytes[4..6].copy_from_slice(&self.length.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.label.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.reply_label.to_le_bytes());
        bytes
    }

    /// Decodes a header from the beginning of `bytes`
    ///
    /// Fails with [`Code::InvHeader`] if `bytes` is too short or contains unknown flags.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::new(Code::InvHeader));
        }

        let flags = HeaderFlags::from_bits(bytes[0]).ok_or_else(|| Error::new(Code::InvHeader))?;
        let u64_at = |off: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[off..off + 8]);
            u64::from_le_bytes(word)
        };

        Ok(Self {
            flags,
            sender_core: bytes[1] as PeId,
            sender_ep: bytes[2] as EpId,
            reply_ep: bytes[3] as EpId,
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
            label: u64_at(8),
            reply_label: u64_at(16),
        })
    }
}
