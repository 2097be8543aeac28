/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Seeds shared by the Zobrist tables and the magic-number search.
const SEEDS: [u64; 4] = [
    0x91C5_ABCE_BFD5_A7A1,
    0x06BA_253B_9DD8_97CD,
    0x8015_B5E5_9CC2_75E9,
    0xF8F4_27FC_5411_DE53,
];

/// A pseudo-random number generator using the "xoshiro256**" algorithm.
///
/// Deterministic: the same seeds always yield the same sequence, so Zobrist keys
/// and magic numbers are identical between runs and builds.
///
/// Algorithm from <https://prng.di.unimi.it/xoshiro256starstar.c>
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XoShiRo([u64; 4]);

impl XoShiRo {
    /// Construct a new generator from the library's seeds.
    #[inline(always)]
    pub const fn new() -> Self {
        Self(SEEDS)
    }

    /// Construct a new generator from your own seeds. They must not all be zero.
    #[inline(always)]
    pub const fn from_seeds(seeds: [u64; 4]) -> Self {
        Self(seeds)
    }

    /// `const` analog of [`XoShiRo::next_u64`], returning `(next, Self)`.
    #[inline(always)]
    pub const fn next_const(self) -> (u64, Self) {
        let (result, s) = Self::step(self.0);
        (result, Self(s))
    }

    /// The next number in the sequence.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mut a = XoShiRo::new();
    /// let mut b = XoShiRo::new();
    /// assert_eq!(a.next_u64(), b.next_u64());
    /// assert_ne!(a.next_u64(), a.next_u64());
    /// ```
    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        let (result, s) = Self::step(self.0);
        self.0 = s;
        result
    }

    /// A number with roughly 1/8th of its bits set.
    ///
    /// Good magic-number candidates are sparse.
    #[inline(always)]
    pub fn sparse_u64(&mut self) -> u64 {
        self.next_u64() & self.next_u64() & self.next_u64()
    }

    const fn step(mut s: [u64; 4]) -> (u64, [u64; 4]) {
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);

        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];

        s[2] ^= t;

        s[3] = s[3].rotate_left(45);
        (result, s)
    }
}

impl Default for XoShiRo {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}
