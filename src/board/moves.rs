/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use super::{PieceKind, Position, Square};

/// Capacity of a [`MoveList`].
///
/// No reachable chess position has more than 218 legal moves, so pseudo-legal generation
/// into 256 slots can never overflow.
pub const MAX_MOVES: usize = 256;

/// An alias for an [`arrayvec::ArrayVec`] containing at most [`MAX_MOVES`] moves.
pub type MoveList = arrayvec::ArrayVec<Move, MAX_MOVES>;

/// The four shapes a move can take.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum MoveKind {
    /// Any move that is not one of the special kinds below, including ordinary captures.
    Normal = 0 << Move::KIND_BITS,

    /// King moves two squares towards a rook, which jumps to the square the king crossed.
    Castle = 1 << Move::KIND_BITS,

    /// Pawn captures the pawn that just double-pushed past it.
    EnPassant = 2 << Move::KIND_BITS,

    /// Pawn reaches the last rank and becomes another piece.
    Promotion = 3 << Move::KIND_BITS,
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Castle => "castle",
            Self::EnPassant => "en passant",
            Self::Promotion => "promotion",
        };
        write!(f, "{name}")
    }
}

/// Represents a move made on a chess board.
///
/// Internally encoded using the following bit pattern:
/// ```text
///     00 00 000000 000000
///      |  |    |      |
///      |  |    |      +- Source square of the move.
///      |  |    +- Target square of the move.
///      |  +- MoveKind.
///      +- Promotion piece (Knight, Bishop, Rook, Queen).
/// ```
///
/// Castling is encoded as the king's own move, such as `e1g1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    const SRC_MASK: u16 = 0b0000_0000_0011_1111;
    const DST_MASK: u16 = 0b0000_1111_1100_0000;
    const KIND_MASK: u16 = 0b0011_0000_0000_0000;
    const DST_BITS: u16 = 6;
    const KIND_BITS: u16 = 12;
    const PROMO_BITS: u16 = 14;

    /// Sentinel for "no move", such as an unparseable move string or an empty TT slot.
    ///
    /// Encodes `a1a1`.
    pub const NONE: Self = Self(0);

    /// A [null move](https://www.chessprogramming.org/Null_Move): the side to move passes.
    ///
    /// Encodes `b1b1`, which can never be generated.
    pub const NULL: Self = Self(1 | 1 << Self::DST_BITS);

    /// Creates a new [`Move`] of `kind` between the given [`Square`]s.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let e2e4 = Move::new(Square::E2, Square::E4, MoveKind::Normal);
    /// assert_eq!(e2e4.to_string(), "e2e4");
    /// ```
    #[inline(always)]
    pub const fn new(from: Square, to: Square, kind: MoveKind) -> Self {
        Self(kind as u16 | (to.inner() as u16) << Self::DST_BITS | from.inner() as u16)
    }

    /// Creates a promotion of the pawn on `from` into `promotion`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let e7e8n = Move::new_promotion(Square::E7, Square::E8, PieceKind::Knight);
    /// assert_eq!(e7e8n.to_string(), "e7e8n");
    /// assert_eq!(e7e8n.promotion(), Some(PieceKind::Knight));
    /// ```
    #[inline(always)]
    pub const fn new_promotion(from: Square, to: Square, promotion: PieceKind) -> Self {
        debug_assert!(promotion.index() >= 1 && promotion.index() <= 4);
        let promo = (promotion as u16 - PieceKind::Knight as u16) << Self::PROMO_BITS;
        Self(Self::new(from, to, MoveKind::Promotion).0 | promo)
    }

    #[inline(always)]
    pub const fn from(&self) -> Square {
        Square((self.0 & Self::SRC_MASK) as u8)
    }

    #[inline(always)]
    pub const fn to(&self) -> Square {
        Square(((self.0 & Self::DST_MASK) >> Self::DST_BITS) as u8)
    }

    #[inline(always)]
    pub const fn kind(&self) -> MoveKind {
        match (self.0 & Self::KIND_MASK) >> Self::KIND_BITS {
            0 => MoveKind::Normal,
            1 => MoveKind::Castle,
            2 => MoveKind::EnPassant,
            _ => MoveKind::Promotion,
        }
    }

    /// The piece a pawn becomes, if this is a promotion.
    #[inline(always)]
    pub const fn promotion(&self) -> Option<PieceKind> {
        if self.is_promotion() {
            Some(PieceKind::from_bits_unchecked(
                (self.0 >> Self::PROMO_BITS) as u8 + 1,
            ))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn is_promotion(&self) -> bool {
        matches!(self.kind(), MoveKind::Promotion)
    }

    #[inline(always)]
    pub const fn is_castle(&self) -> bool {
        matches!(self.kind(), MoveKind::Castle)
    }

    #[inline(always)]
    pub const fn is_en_passant(&self) -> bool {
        matches!(self.kind(), MoveKind::EnPassant)
    }

    /// Returns `true` for a real move: neither [`Move::NONE`] nor [`Move::NULL`].
    #[inline(always)]
    pub const fn is_ok(&self) -> bool {
        self.from().0 != self.to().0
    }

    /// Raw 16-bit encoding, as stored in the transposition table.
    #[inline(always)]
    pub const fn inner(&self) -> u16 {
        self.0
    }

    /// Rebuilds a [`Move`] from its raw encoding.
    #[inline(always)]
    pub const fn from_inner(bits: u16) -> Self {
        Self(bits)
    }

    /// The move a piece on `to` would make to return to `from`.
    ///
    /// Used to ask whether a piece that just moved can safely retreat.
    #[inline(always)]
    pub const fn reversed(&self) -> Self {
        Self::new(self.to(), self.from(), MoveKind::Normal)
    }

    /// Index into butterfly (`from * 64 + to`) tables.
    #[inline(always)]
    pub const fn butterfly_index(&self) -> usize {
        (self.0 & (Self::SRC_MASK | Self::DST_MASK)) as usize
    }

    /// Parses a move in coordinate notation, such as `e2e4` or `e7e8q`, against `position`.
    ///
    /// `0000` yields [`Move::NULL`]. Anything that is not a legal move in `position` yields [`Move::NONE`].
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let pos = Position::default();
    /// assert_eq!(Move::from_uci(&pos, "e2e4").to_string(), "e2e4");
    /// assert_eq!(Move::from_uci(&pos, "0000"), Move::NULL);
    /// assert_eq!(Move::from_uci(&pos, "e2e5"), Move::NONE);
    /// assert_eq!(Move::from_uci(&pos, "garbage"), Move::NONE);
    /// ```
    pub fn from_uci(position: &Position, uci: &str) -> Self {
        if uci == "0000" {
            return Self::NULL;
        }

        let uci = uci.to_ascii_lowercase();
        position
            .legal_moves()
            .into_iter()
            .find(|mv| mv.to_uci() == uci)
            .unwrap_or(Self::NONE)
    }

    /// Formats this move in coordinate notation.
    pub fn to_uci(&self) -> String {
        if *self == Self::NULL || *self == Self::NONE {
            return String::from("0000");
        }

        match self.promotion() {
            Some(promotion) => format!("{}{}{}", self.from(), self.to(), promotion.char()),
            None => format!("{}{}", self.from(), self.to()),
        }
    }
}

impl fmt::Display for Move {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}

impl fmt::Debug for Move {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} ({})", self.kind())
    }
}

impl Default for Move {
    /// A default move is [`Move::NONE`].
    #[inline(always)]
    fn default() -> Self {
        Self::NONE
    }
}

impl<T: AsRef<str>> PartialEq<T> for Move {
    #[inline(always)]
    fn eq(&self, other: &T) -> bool {
        self.to_uci().eq(other.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    #[test]
    fn test_move_parts() {
        let mv = Move::new(Square::E1, Square::G1, MoveKind::Castle);
        assert_eq!(mv.from(), Square::E1);
        assert_eq!(mv.to(), Square::G1);
        assert!(mv.is_castle());
        assert!(mv.promotion().is_none());

        for kind in [
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Rook,
            PieceKind::Queen,
        ] {
            let mv = Move::new_promotion(Square::B7, Square::A8, kind);
            assert_eq!(mv.promotion(), Some(kind));
            assert_eq!(mv.from(), Square::B7);
            assert_eq!(mv.to(), Square::A8);
        }
    }

    #[test]
    fn test_sentinels() {
        assert!(!Move::NONE.is_ok());
        assert!(!Move::NULL.is_ok());
        assert_ne!(Move::NONE, Move::NULL);
        assert_eq!(Move::NULL.to_string(), "0000");
        assert_eq!(Move::default(), Move::NONE);
    }

    fn test_move_parse(fen: &str, uci: &str, expected: Move) {
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(Move::from_uci(&pos, uci), expected, "parsing {uci} in {fen}");
    }

    #[test]
    fn test_move_parsing() {
        test_move_parse(
            FEN_STARTPOS,
            "b1c3",
            Move::new(Square::B1, Square::C3, MoveKind::Normal),
        );
        test_move_parse(
            FEN_KIWIPETE,
            "e1g1",
            Move::new(Square::E1, Square::G1, MoveKind::Castle),
        );
        test_move_parse(
            FEN_KIWIPETE,
            "e1c1",
            Move::new(Square::E1, Square::C1, MoveKind::Castle),
        );
        test_move_parse(
            "8/4P3/8/8/8/8/8/k6K w - - 0 1",
            "e7e8Q",
            Move::new_promotion(Square::E7, Square::E8, PieceKind::Queen),
        );
        test_move_parse(
            "k7/8/8/3pP3/8/8/8/7K w - d6 0 1",
            "e5d6",
            Move::new(Square::E5, Square::D6, MoveKind::EnPassant),
        );

        // Promotions need a piece
        test_move_parse("8/4P3/8/8/8/8/8/k6K w - - 0 1", "e7e8", Move::NONE);
        // Not our piece
        test_move_parse(FEN_STARTPOS, "e7e5", Move::NONE);
        test_move_parse(FEN_STARTPOS, "", Move::NONE);
    }

    #[test]
    fn test_reversed() {
        let mv = Move::new(Square::G1, Square::F3, MoveKind::Normal);
        assert_eq!(mv.reversed(), Move::new(Square::F3, Square::G1, MoveKind::Normal));
    }
}
