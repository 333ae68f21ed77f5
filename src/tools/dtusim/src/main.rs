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

mod error;
mod scenario;

use base::util::parse;
use dtu::DtuParams;
use log::{Level, Log, Metadata, Record};
use std::env;
use std::process::exit;
use std::str::FromStr;

use crate::error::Error;
use crate::scenario::Scenario;

struct Logger {
    level: Level,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let level_string = record.level().to_string();
            let target = if !record.target().is_empty() {
                record.target()
            }
            else {
                record.module_path().unwrap_or_default()
            };

            eprintln!("{:<5} [{}] {}", level_string, target, record.args());
        }
    }

    fn flush(&self) {
    }
}

fn usage(prog: &str) -> ! {
    eprintln!(
        "Usage: {} [--param <key>=<value>]... (message|memory|ctxsw)",
        prog
    );
    exit(1)
}

fn parse_param(params: &mut DtuParams, arg: &str) -> Result<(), Error> {
    parse::key_value(arg)
        .and_then(|(key, value)| params.set(key, value))
        .map_err(|_| Error::InvalParam(arg.to_string()))
}

fn main() -> Result<(), Error> {
    let level = Level::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "error".to_string()))?;
    log::set_boxed_logger(Box::new(Logger { level }))?;
    log::set_max_level(level.to_level_filter());

    base::io::init("dtusim");

    let args: Vec<String> = env::args().collect();
    let mut params = DtuParams::default();
    let mut scenario = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--param" => {
                let arg = args.get(i + 1).unwrap_or_else(|| usage(&args[0]));
                parse_param(&mut params, arg)?;
                i += 1;
            },
            name => match Scenario::from_name(name) {
                Some(s) if scenario.is_none() => scenario = Some(s),
                _ => usage(&args[0]),
            },
        }
        i += 1;
    }

    let scenario = scenario.unwrap_or_else(|| usage(&args[0]));
    params.validate()?;

    let sys = scenario::run(scenario, &params)?;

    println!("ticks: {}", sys.now());
    for pe in 0..sys.pe_count() {
        println!("PE{}:", pe);
        println!("{}", sys.dtu(pe).stats());
    }
    Ok(())
}
