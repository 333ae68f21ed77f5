/*
 * Copyright (C) 2018 Nils Asmussen <nils@os.inf.tu-dresden.de>
 * Economic rights: Technische Universitaet Dresden (Germany)
 *
 * Copyright (C) 2019-2024 Nils Asmussen, Barkhausen Institut
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

//! Contains the error handling types

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The error codes
///
/// The numeric values are part of the hardware interface: they are stored in the error field of
/// the command register and in the `RECV_ERR` register.
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Code {
    // success
    Success = 0,
    // endpoint errors
    NoMEP,
    NoSEP,
    NoREP,
    InvEP,
    RecvGone,
    RecvNoSpace,
    RecvOutOfBounds,
    RepliesDisabled,
    // transfer errors
    OutOfBounds,
    NoCredits,
    NoPerm,
    SendInvMsgSize,
    TranslationFault,
    Abort,
    UnknownCmd,
    // protocol errors
    UnexpectedReply,
    InvHeader,
    NoMsgs,
    // generic errors
    InvArgs,
}

impl Default for Code {
    fn default() -> Self {
        Self::Success
    }
}

impl Code {
    /// Decodes the given error field, mapping unknown values to [`Code::InvArgs`]
    pub fn from_field(val: u64) -> Self {
        u32::try_from(val)
            .ok()
            .and_then(|v| Self::try_from(v).ok())
            .unwrap_or(Self::InvArgs)
    }

    /// Returns true if this code denotes success
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// The error struct that is passed around
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Error {
    code: Code,
}

impl Error {
    /// Creates a new object for given error code
    pub fn new(code: Code) -> Self {
        Error { code }
    }

    /// Returns the error code
    pub fn code(&self) -> Code {
        self.code
    }
}

impl From<Error> for Code {
    fn from(err: Error) -> Self {
        err.code()
    }
}

impl From<Code> for Result<(), Error> {
    fn from(code: Code) -> Self {
        match code {
            Code::Success => Ok(()),
            e => Err(Error::new(e)),
        }
    }
}

impl<T> From<Result<T, Error>> for Code {
    fn from(res: Result<T, Error>) -> Self {
        match res {
            Ok(_) => Code::Success,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

impl std::error::Error for Error {
}
