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

use base::test::{DefaultWvTester, WvTester};
use base::wv_run_suite;

mod common;
mod tcmds;
mod tctxsw;
mod tmem;
mod tmsg;
mod tregfile;
mod ttlb;
mod txfer;

fn main() {
    base::io::init("dtutests");

    let mut tester = DefaultWvTester::default();
    wv_run_suite!(tester, tregfile::run);
    wv_run_suite!(tester, txfer::run);
    wv_run_suite!(tester, tmsg::run);
    wv_run_suite!(tester, tmem::run);
    wv_run_suite!(tester, ttlb::run);
    wv_run_suite!(tester, tcmds::run);
    wv_run_suite!(tester, tctxsw::run);
    println!("{}", tester);

    if tester.failures() > 0 {
        std::process::exit(1);
    }
}
