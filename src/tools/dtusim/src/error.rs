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

use std::fmt;

use base::errors::Code;

pub enum Error {
    DtuError(base::errors::Error),
    LogLevelError(log::ParseLevelError),
    SetLogError(log::SetLoggerError),
    CmdFailed(&'static str, Code),
    Check(&'static str),
    InvalParam(String),
}

macro_rules! impl_err {
    ($src:ty, $dst:tt) => {
        impl From<$src> for Error {
            fn from(error: $src) -> Self {
                Error::$dst(error)
            }
        }
    };
}

impl_err!(base::errors::Error, DtuError);
impl_err!(log::ParseLevelError, LogLevelError);
impl_err!(log::SetLoggerError, SetLogError);

impl fmt::Debug for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Error::DtuError(e) => write!(fmt, "DTU error: {}", e),
            Error::LogLevelError(e) => write!(fmt, "Parsing log level failed: {}", e),
            Error::SetLogError(e) => write!(fmt, "Setting logger failed: {}", e),
            Error::CmdFailed(what, c) => write!(fmt, "{} failed: {:?}", what, c),
            Error::Check(what) => write!(fmt, "check failed: {}", what),
            Error::InvalParam(p) => write!(fmt, "invalid parameter '{}'", p),
        }
    }
}
