/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, ops::Not};

use super::{Color, File, Rank, Square};

/// A [`Bitboard`] is a set of squares, stored as the bits of a `u64`.
///
/// The internal encoding uses [Little-Endian Rank-File Mapping (LERF)](https://www.chessprogramming.org/Square_Mapping_Considerations#Little-Endian_Rank-File_Mapping),
/// so bit 0 is A1, bit 7 is H1, and bit 63 is H8.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Bitboard(pub(crate) u64);

impl Bitboard {
    pub const FILE_A: Self = Self(0x0101010101010101);
    pub const FILE_B: Self = Self(0x0202020202020202);
    pub const FILE_G: Self = Self(0x4040404040404040);
    pub const FILE_H: Self = Self(0x8080808080808080);
    pub const NOT_FILE_A: Self = Self(0xfefefefefefefefe);
    pub const NOT_FILE_H: Self = Self(0x7f7f7f7f7f7f7f7f);
    pub const RANK_1: Self = Self(0x00000000000000FF);
    pub const RANK_2: Self = Self(0x000000000000FF00);
    pub const RANK_3: Self = Self(0x0000000000FF0000);
    pub const RANK_4: Self = Self(0x00000000FF000000);
    pub const RANK_5: Self = Self(0x000000FF00000000);
    pub const RANK_6: Self = Self(0x0000FF0000000000);
    pub const RANK_7: Self = Self(0x00FF000000000000);
    pub const RANK_8: Self = Self(0xFF00000000000000);
    pub const LIGHT_SQUARES: Self = Self(0x55AA55AA55AA55AA);
    pub const DARK_SQUARES: Self = Self(0xAA55AA55AA55AA55);
    pub const EMPTY_BOARD: Self = Self(0);
    pub const FULL_BOARD: Self = Self(u64::MAX);
    pub const EDGES: Self = Self(0xFF818181818181FF);

    /// Constructs a new [`Bitboard`] from the provided bit pattern.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let board = Bitboard::new(255);
    /// assert_eq!(board, Bitboard::RANK_1);
    /// ```
    #[inline(always)]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Constructs a [`Bitboard`] with only `square` set.
    #[inline(always)]
    pub const fn from_square(square: Square) -> Self {
        Self(1 << square.index())
    }

    /// Constructs a [`Bitboard`] of every square on `file`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(Bitboard::from_file(File::H), Bitboard::FILE_H);
    /// ```
    #[inline(always)]
    pub const fn from_file(file: File) -> Self {
        Self(Self::FILE_A.0 << file.0)
    }

    /// Constructs a [`Bitboard`] of every square on `rank`.
    #[inline(always)]
    pub const fn from_rank(rank: Rank) -> Self {
        Self(Self::RANK_1.0 << (rank.0 * 8))
    }

    /// The rank `n` steps ahead of `color`'s back rank, as a [`Bitboard`].
    ///
    /// `n = 0` is the back rank.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(Bitboard::relative_rank(Color::White, 1), Bitboard::RANK_2);
    /// assert_eq!(Bitboard::relative_rank(Color::Black, 6), Bitboard::RANK_2);
    /// ```
    #[inline(always)]
    pub const fn relative_rank(color: Color, n: u8) -> Self {
        match color {
            Color::White => Self(Self::RANK_1.0 << (n * 8)),
            Color::Black => Self(Self::RANK_8.0 >> (n * 8)),
        }
    }

    #[inline(always)]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_nonempty(&self) -> bool {
        self.0 != 0
    }

    /// Returns `true` if `square` is set in this [`Bitboard`].
    #[inline(always)]
    pub const fn contains(&self, square: Square) -> bool {
        self.0 & (1 << square.index()) != 0
    }

    /// Returns `true` if `self` and `other` share at least one square.
    #[inline(always)]
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if more than one bit is set.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert!(!Square::E4.bitboard().more_than_one());
    /// assert!((Square::E4.bitboard() | Square::D4.bitboard()).more_than_one());
    /// ```
    #[inline(always)]
    pub const fn more_than_one(&self) -> bool {
        self.0 & self.0.wrapping_sub(1) != 0
    }

    /// Number of set bits.
    #[inline(always)]
    pub const fn population(&self) -> u32 {
        self.0.count_ones()
    }

    /// The lowest set square, or `None` if empty.
    #[inline(always)]
    pub const fn lsb(&self) -> Option<Square> {
        if self.0 == 0 {
            None
        } else {
            Some(self.lsb_unchecked())
        }
    }

    /// The lowest set square. The result is meaningless on an empty board.
    #[inline(always)]
    pub const fn lsb_unchecked(&self) -> Square {
        Square(self.0.trailing_zeros() as u8)
    }

    /// The highest set square. The result is meaningless on an empty board.
    #[inline(always)]
    pub const fn msb_unchecked(&self) -> Square {
        Square(63 - self.0.leading_zeros() as u8)
    }

    /// Removes and returns the lowest set square.
    #[inline(always)]
    pub fn pop_lsb(&mut self) -> Option<Square> {
        let square = self.lsb()?;
        self.0 &= self.0 - 1;
        Some(square)
    }

    /// The square of the only bit in this [`Bitboard`], if exactly one is set.
    #[inline(always)]
    pub const fn to_square(&self) -> Option<Square> {
        if self.0.count_ones() == 1 {
            Some(self.lsb_unchecked())
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn north(self) -> Self {
        Self(self.0 << 8)
    }

    #[inline(always)]
    pub const fn south(self) -> Self {
        Self(self.0 >> 8)
    }

    #[inline(always)]
    pub const fn east(self) -> Self {
        Self((self.0 & Self::NOT_FILE_H.0) << 1)
    }

    #[inline(always)]
    pub const fn west(self) -> Self {
        Self((self.0 & Self::NOT_FILE_A.0) >> 1)
    }

    /// Shifts every square one rank towards `color`'s opponent.
    #[inline(always)]
    pub const fn forward(self, color: Color) -> Self {
        match color {
            Color::White => self.north(),
            Color::Black => self.south(),
        }
    }

    /// Shifts every square one rank towards `color`'s own back rank.
    #[inline(always)]
    pub const fn backward(self, color: Color) -> Self {
        self.forward(color.opponent())
    }

    /// Every square attacked by a pawn of `color` standing on a square of this set.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let attacks = Square::E4.bitboard().pawn_attacks(Color::White);
    /// assert_eq!(attacks, Square::D5.bitboard() | Square::F5.bitboard());
    /// ```
    #[inline(always)]
    pub const fn pawn_attacks(self, color: Color) -> Self {
        let forward = self.forward(color);
        Self(forward.east().0 | forward.west().0)
    }

    /// Fills every square in front of (and including) this set towards `color`'s opponent.
    #[inline(always)]
    pub const fn fill_forward(self, color: Color) -> Self {
        let mut bb = self.0;
        match color {
            Color::White => {
                bb |= bb << 8;
                bb |= bb << 16;
                bb |= bb << 32;
            }
            Color::Black => {
                bb |= bb >> 8;
                bb |= bb >> 16;
                bb |= bb >> 32;
            }
        }
        Self(bb)
    }

    /// All squares on the files occupied by this set.
    #[inline(always)]
    pub const fn file_fill(self) -> Self {
        Self(self.fill_forward(Color::White).0 | self.fill_forward(Color::Black).0)
    }

    /// An iterator over every set square, from lowest to highest.
    #[inline(always)]
    pub const fn iter(&self) -> BitboardIter {
        BitboardIter { bitboard: *self }
    }

    /// An iterator over every subset of this [`Bitboard`], starting with the empty set.
    ///
    /// Used to enumerate blocker configurations when generating magic tables.
    #[inline(always)]
    pub const fn subsets(&self) -> BitboardSubsetIter {
        BitboardSubsetIter {
            bitboard: *self,
            subset: Self::EMPTY_BOARD,
            remaining: 1 << self.0.count_ones(),
        }
    }
}

macro_rules! impl_bitwise_op {
    ($op:ident, $op_assign:ident, $func:ident, $func_assign:ident) => {
        impl<T> std::ops::$op<T> for Bitboard
        where
            Self: From<T>,
        {
            type Output = Self;
            #[inline(always)]
            fn $func(self, rhs: T) -> Self::Output {
                Self(std::ops::$op::$func(self.0, Self::from(rhs).0))
            }
        }

        impl<T> std::ops::$op_assign<T> for Bitboard
        where
            Self: From<T>,
        {
            #[inline(always)]
            fn $func_assign(&mut self, rhs: T) {
                std::ops::$op_assign::$func_assign(&mut self.0, Self::from(rhs).0);
            }
        }
    };
}

impl_bitwise_op!(BitAnd, BitAndAssign, bitand, bitand_assign);
impl_bitwise_op!(BitOr, BitOrAssign, bitor, bitor_assign);
impl_bitwise_op!(BitXor, BitXorAssign, bitxor, bitxor_assign);

impl Not for Bitboard {
    type Output = Self;
    #[inline(always)]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl std::ops::Mul for Bitboard {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_mul(rhs.0))
    }
}

impl From<Square> for Bitboard {
    #[inline(always)]
    fn from(value: Square) -> Self {
        Self::from_square(value)
    }
}

impl From<u64> for Bitboard {
    #[inline(always)]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromIterator<Square> for Bitboard {
    fn from_iter<T: IntoIterator<Item = Square>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY_BOARD, |bb, sq| bb | sq)
    }
}

impl fmt::Display for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            for file in File::iter() {
                let occupant = if self.contains(Square::new(file, rank)) {
                    'X'
                } else {
                    '.'
                };
                write!(f, "{occupant} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitboard({:#018X})", self.0)
    }
}

/// An iterator over all set bits in a [`Bitboard`].
///
/// See [`Bitboard::iter`].
pub struct BitboardIter {
    bitboard: Bitboard,
}

impl Iterator for BitboardIter {
    type Item = Square;
    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        self.bitboard.pop_lsb()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.bitboard.population() as usize;
        (size, Some(size))
    }
}

impl ExactSizeIterator for BitboardIter {}

impl IntoIterator for Bitboard {
    type Item = Square;
    type IntoIter = BitboardIter;
    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter {
        BitboardIter { bitboard: self }
    }
}

/// An iterator over all possible subsets of a [`Bitboard`].
///
/// See [`Bitboard::subsets`].
pub struct BitboardSubsetIter {
    bitboard: Bitboard,
    subset: Bitboard,
    remaining: usize,
}

impl Iterator for BitboardSubsetIter {
    type Item = Bitboard;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let subset = self.subset;

        // Carry-Rippler: https://www.chessprogramming.org/Traversing_Subsets_of_a_Set#All_Subsets_of_any_Set
        self.subset.0 = self.subset.0.wrapping_sub(self.bitboard.0) & self.bitboard.0;
        self.remaining -= 1;

        Some(subset)
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bitboard_to_string() {
        let board = Bitboard::RANK_2 | Bitboard::from_file(File::C);
        let expected = ". . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        X X X X X X X X \n\
                        . . X . . . . . \n";
        assert_eq!(board.to_string(), expected);
    }

    #[test]
    fn test_bitboard_shifts_do_not_wrap() {
        assert_eq!(Bitboard::FILE_H.east(), Bitboard::EMPTY_BOARD);
        assert_eq!(Bitboard::FILE_A.west(), Bitboard::EMPTY_BOARD);
        assert_eq!(Bitboard::RANK_8.north(), Bitboard::EMPTY_BOARD);
        assert_eq!(Bitboard::RANK_1.south(), Bitboard::EMPTY_BOARD);
    }

    #[test]
    fn test_bitboard_subsets() {
        let mask = Square::A1.bitboard() | Square::C3.bitboard() | Square::H8.bitboard();
        let subsets = mask.subsets().collect::<Vec<_>>();
        assert_eq!(subsets.len(), 8);
        assert_eq!(subsets[0], Bitboard::EMPTY_BOARD);
        assert!(subsets.contains(&mask));
        assert!(subsets.iter().all(|s| (*s & !mask).is_empty()));
    }

    #[test]
    fn test_pop_lsb_order() {
        let mut bb = Square::H8.bitboard() | Square::A1.bitboard() | Square::E4.bitboard();
        assert_eq!(bb.pop_lsb(), Some(Square::A1));
        assert_eq!(bb.pop_lsb(), Some(Square::E4));
        assert_eq!(bb.pop_lsb(), Some(Square::H8));
        assert_eq!(bb.pop_lsb(), None);
    }

    #[test]
    fn test_fill_forward() {
        let filled = Square::D4.bitboard().fill_forward(Color::White);
        assert_eq!(filled.population(), 5);
        assert!(filled.contains(Square::D8));
        assert!(!filled.contains(Square::D3));
        assert_eq!(Square::D4.bitboard().file_fill(), Bitboard::from_file(File::D));
    }
}
