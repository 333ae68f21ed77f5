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

//! Contains the logger

use std::cell::RefCell;
use std::env;
use std::fmt;
use std::io::{self, Write};

use crate::io::LogFlags;
use crate::time::Tick;

const LOG_ENV: &str = "DTU_LOG";
const SUFFIX: &str = "\x1B[0m";

thread_local! {
    static LOG: RefCell<Log> = RefCell::new(Log::new());
}

/// A logger that writes to stderr
///
/// Every line is prefixed with the PE and the tick of the event that is currently dispatched,
/// which the simulation loop announces via [`set_context`].
pub struct Log {
    flags: LogFlags,
    name: String,
    pe: Option<usize>,
    time: Tick,
}

impl Log {
    fn new() -> Self {
        Log {
            flags: LogFlags::default(),
            name: String::new(),
            pe: None,
            time: 0,
        }
    }

    /// Returns the currently enabled flags
    pub fn flags(&self) -> LogFlags {
        self.flags
    }

    fn write_line(&self, args: fmt::Arguments<'_>) {
        let colors = ["31", "32", "33", "34", "35", "36"];

        let stderr = io::stderr();
        let mut out = stderr.lock();
        let _ = match self.pe {
            Some(pe) => writeln!(
                out,
                "\x1B[0;{}m[PE{}:{:<8}@{:>11}] {}{}",
                colors[pe % colors.len()],
                pe,
                self.name,
                self.time,
                args,
                SUFFIX
            ),
            None => writeln!(out, "[{:<8}@{:>11}] {}", self.name, self.time, args),
        };
    }
}

/// Returns true if all of the given flags are enabled
pub fn enabled(flags: LogFlags) -> bool {
    if cfg!(feature = "bench") {
        return (LogFlags::Info | LogFlags::Error).contains(flags);
    }
    LOG.with(|l| l.borrow().flags().contains(flags))
}

/// Writes the given arguments as one line to the log
pub fn write(args: fmt::Arguments<'_>) {
    LOG.with(|l| l.borrow().write_line(args));
}

/// Replaces the enabled log flags
pub fn set_flags(flags: LogFlags) {
    LOG.with(|l| l.borrow_mut().flags = flags);
}

/// Sets the PE and time that are printed in front of every line
pub fn set_context(pe: Option<usize>, time: Tick) {
    LOG.with(|l| {
        let mut l = l.borrow_mut();
        l.pe = pe;
        l.time = time;
    });
}

/// Initializes the logger with the given name and the flags from the environment
///
/// Unknown flag names in `DTU_LOG` are reported and the default flags are kept.
pub fn init(name: &str) {
    let begin = match name.rfind('/') {
        Some(b) => b + 1,
        None => 0,
    };
    let len = (name.len() - begin).min(8);

    let flags = match env::var(LOG_ENV) {
        Ok(val) => match val.parse::<LogFlags>() {
            Ok(flags) => flags,
            Err(e) => {
                eprintln!("Ignoring invalid {}='{}': {}", LOG_ENV, val, e);
                LogFlags::default()
            },
        },
        Err(_) => LogFlags::default(),
    };

    LOG.with(|l| {
        let mut l = l.borrow_mut();
        l.name = name[begin..begin + len].to_string();
        l.flags = flags;
    });
}
