/*
 * Copyright (C) 2021-2024 Nils Asmussen, Barkhausen Institut
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

//! Contains helpers to parse command line arguments

use crate::errors::{Code, Error};

/// Parses an address from the given string
///
/// If the string starts with "0x", the remainder is interpreted hexadecimal, otherwise decimal.
pub fn addr(s: &str) -> Result<u64, Error> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    }
    else {
        s.parse::<u64>()
    }
    .map_err(|_| Error::new(Code::InvArgs))
}

/// Parses a size from the given string
///
/// The binary prefixes k/K, m/M, and g/G can be used to denote kibibytes, mebibytes, and gibibytes,
/// respectively.
pub fn size(s: &str) -> Result<usize, Error> {
    let mul = match s.chars().last() {
        Some(c) if c.is_ascii_digit() => 1,
        Some('k') | Some('K') => 1024,
        Some('m') | Some('M') => 1024 * 1024,
        Some('g') | Some('G') => 1024 * 1024 * 1024,
        _ => return Err(Error::new(Code::InvArgs)),
    };
    Ok(match mul {
        1 => int(s)? as usize,
        m => m * int(&s[0..s.len() - 1])? as usize,
    })
}

/// Parses a u64 from the given string
pub fn int(s: &str) -> Result<u64, Error> {
    s.parse::<u64>().map_err(|_| Error::new(Code::InvArgs))
}

/// Splits an argument of the form `key=value` into key and value
pub fn key_value(s: &str) -> Result<(&str, &str), Error> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.trim(), v.trim())),
        _ => Err(Error::new(Code::InvArgs)),
    }
}
