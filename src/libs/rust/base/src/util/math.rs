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

//! Contains math functions

use num_traits::PrimInt;

/// Rounds the given value up to the given alignment
///
/// # Examples
///
/// ```
/// use base::util::math;
/// assert_eq!(math::round_up(0x123, 0x1000), 0x1000);
/// ```
pub fn round_up<T: PrimInt>(value: T, align: T) -> T {
    (value + align - T::one()) & !(align - T::one())
}

/// Returns true if `addr` is aligned to `align`
pub fn is_aligned<T: PrimInt>(addr: T, align: T) -> bool {
    (addr & (align - T::one())) == T::zero()
}

/// Divides `value` by `div` and rounds the result up
///
/// # Examples
///
/// ```
/// use base::util::math;
/// assert_eq!(math::div_ceil(4608, 256), 18);
/// assert_eq!(math::div_ceil(4609, 256), 19);
/// ```
pub fn div_ceil<T: PrimInt>(value: T, div: T) -> T {
    (value + div - T::one()) / div
}

/// Returns true if `val` is a power of two
pub fn is_pow2<T: PrimInt>(val: T) -> bool {
    val != T::zero() && val.count_ones() == 1
}
