/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

/// Maximum depth of any search line, in plies.
pub const MAX_PLY: usize = 128;

/// A numerical representation of the evaluation of a position / move, in units of ["centipawns"](https://www.chessprogramming.org/Score).
///
/// Always relative to the side to move. Mate scores are encoded as [`Score::MATE`] minus the distance to mate in plies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Score(pub i32);

impl Score {
    /// Larger than any score a search can return.
    pub const INF: Self = Self(32_001);

    /// Score of delivering mate in the current position.
    pub const MATE: Self = Self(32_000);

    /// Lowest score that still means "we mate", i.e. mate within [`MAX_PLY`] plies.
    pub const MATE_IN_MAX_PLY: Self = Self(Self::MATE.0 - MAX_PLY as i32);

    /// Highest score that still means "we get mated".
    pub const MATED_IN_MAX_PLY: Self = Self(-Self::MATE_IN_MAX_PLY.0);

    /// A decisive advantage that is not (yet) a forced mate.
    pub const KNOWN_WIN: Self = Self(9_000);

    pub const DRAW: Self = Self(0);

    /// Score for mating the opponent `ply` plies from the root.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(Score::mate_in(3).0, 31_997);
    /// assert_eq!(Score::mated_in(3).0, -31_997);
    /// ```
    #[inline(always)]
    pub const fn mate_in(ply: usize) -> Self {
        Self(Self::MATE.0 - ply as i32)
    }

    /// Score for being mated `ply` plies from the root.
    #[inline(always)]
    pub const fn mated_in(ply: usize) -> Self {
        Self(-Self::MATE.0 + ply as i32)
    }

    /// Returns `true` if the score is a forced mate for either side.
    #[inline(always)]
    pub const fn is_mate(&self) -> bool {
        self.0.abs() >= Self::MATE_IN_MAX_PLY.0
    }

    /// Returns the number of plies (half moves) this score is from mate.
    #[inline(always)]
    pub const fn plies_to_mate(&self) -> i32 {
        Self::MATE.0 - self.0.abs()
    }

    /// Returns the number of full moves until mate: positive when we mate, negative when we are mated.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(Score::mate_in(1).moves_to_mate(), 1);
    /// assert_eq!(Score::mate_in(3).moves_to_mate(), 2);
    /// assert_eq!(Score::mated_in(2).moves_to_mate(), -1);
    /// ```
    #[inline(always)]
    pub const fn moves_to_mate(&self) -> i32 {
        if self.0 > 0 {
            (Self::MATE.0 - self.0 + 1) / 2
        } else {
            (-Self::MATE.0 - self.0) / 2
        }
    }

    /// Converts a score found `ply` plies from the root into one relative to the current node,
    /// so mate distances stay correct when read back at a different ply.
    #[inline(always)]
    pub const fn to_tt(self, ply: usize) -> Self {
        if self.0 >= Self::MATE_IN_MAX_PLY.0 {
            Self(self.0 + ply as i32)
        } else if self.0 <= Self::MATED_IN_MAX_PLY.0 {
            Self(self.0 - ply as i32)
        } else {
            self
        }
    }

    /// Inverse of [`Score::to_tt`].
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mate = Score::mate_in(7);
    /// assert_eq!(mate.to_tt(4).from_tt(4), mate);
    /// // Read back two plies closer to the root, the mate is two plies further away
    /// assert_eq!(mate.to_tt(4).from_tt(2), Score::mate_in(5));
    /// ```
    #[inline(always)]
    pub const fn from_tt(self, ply: usize) -> Self {
        if self.0 >= Self::MATE_IN_MAX_PLY.0 {
            Self(self.0 - ply as i32)
        } else if self.0 <= Self::MATED_IN_MAX_PLY.0 {
            Self(self.0 + ply as i32)
        } else {
            self
        }
    }

    /// Returns the absolute value of this [`Score`].
    #[inline(always)]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Converts this score into what a front-end should display.
    #[inline(always)]
    pub const fn info(self) -> ScoreInfo {
        if self.is_mate() {
            ScoreInfo::Mate(self.moves_to_mate())
        } else {
            ScoreInfo::Centipawns(self.0)
        }
    }
}

/// A score as reported to the user.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ScoreInfo {
    Centipawns(i32),

    /// Full moves until mate. Negative when the side to move is being mated.
    Mate(i32),
}

impl fmt::Display for ScoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "cp {cp}"),
            Self::Mate(moves) => write!(f, "mate {moves}"),
        }
    }
}

impl From<Score> for ScoreInfo {
    #[inline(always)]
    fn from(value: Score) -> Self {
        value.info()
    }
}

macro_rules! impl_binary_op {
    ($trait:tt, $fn:ident) => {
        impl std::ops::$trait for Score {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0, rhs.0))
            }
        }

        impl std::ops::$trait<i32> for Score {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: i32) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0, rhs))
            }
        }
    };
}

macro_rules! impl_binary_op_assign {
    ($trait:tt, $fn:ident) => {
        impl std::ops::$trait for Score {
            #[inline(always)]
            fn $fn(&mut self, rhs: Self) {
                std::ops::$trait::$fn(&mut self.0, rhs.0);
            }
        }

        impl std::ops::$trait<i32> for Score {
            #[inline(always)]
            fn $fn(&mut self, rhs: i32) {
                std::ops::$trait::$fn(&mut self.0, rhs);
            }
        }
    };
}

impl_binary_op!(Add, add);
impl_binary_op!(Sub, sub);
impl_binary_op!(Mul, mul);
impl_binary_op!(Div, div);

impl_binary_op_assign!(AddAssign, add_assign);
impl_binary_op_assign!(SubAssign, sub_assign);

impl std::ops::Neg for Score {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl PartialEq<i32> for Score {
    fn eq(&self, other: &i32) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<i32> for Score {
    fn partial_cmp(&self, other: &i32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

impl fmt::Display for Score {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mate() {
            write!(
                f,
                "{} (mate in {} plies, {} moves)",
                self.0,
                self.plies_to_mate(),
                self.moves_to_mate()
            )
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tt_ply_adjustment() {
        for ply in [0, 1, 5, 40] {
            let ours = Score::mate_in(ply + 3);
            assert_eq!(ours.to_tt(ply).from_tt(ply), ours);
            assert_eq!(ours.to_tt(ply), Score::mate_in(3));

            let theirs = Score::mated_in(ply + 3);
            assert_eq!(theirs.to_tt(ply).from_tt(ply), theirs);
            assert_eq!(theirs.to_tt(ply), Score::mated_in(3));

            // Normal scores pass through
            assert_eq!(Score(123).to_tt(ply), Score(123));
            assert_eq!(Score(-8999).from_tt(ply), Score(-8999));
        }
    }

    #[test]
    fn test_score_info() {
        assert_eq!(Score(57).info(), ScoreInfo::Centipawns(57));
        assert_eq!(Score::mate_in(1).info(), ScoreInfo::Mate(1));
        assert_eq!(Score::mated_in(0).info(), ScoreInfo::Mate(0));
        assert_eq!(Score::mated_in(4).info(), ScoreInfo::Mate(-2));
        assert_eq!(Score::mate_in(5).info().to_string(), "mate 3");
    }
}
