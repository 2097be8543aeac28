/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use super::{CastlingRights, Color, File, Piece, PieceKind, Square, XoShiRo};

/// Keys for every hashable feature of a position.
///
/// Built at compile time from a fixed seed, so keys are identical between runs and builds.
static ZOBRIST_TABLE: ZobristTable = ZobristTable::new();

/// Represents a key generated from a Zobrist Hash
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[repr(transparent)]
pub struct ZobristKey(u64);

impl ZobristKey {
    /// Wraps a raw 64-bit key.
    #[inline(always)]
    pub const fn new(key: u64) -> Self {
        Self(key)
    }

    /// Return the inner `u64` of this key.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(ZobristKey::default().inner(), 0);
    /// ```
    #[inline(always)]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    /// Adds/removes `hash_key` to this [`ZobristKey`] with XOR.
    #[inline(always)]
    pub fn hash(&mut self, hash_key: u64) {
        self.0 ^= hash_key;
    }

    /// Adds/removes `piece` standing on `square`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mut d7 = ZobristKey::default();
    /// d7.hash_piece(Square::D7, Piece::BLACK_PAWN);
    ///
    /// let mut d5 = ZobristKey::default();
    /// d5.hash_piece(Square::D5, Piece::BLACK_PAWN);
    /// assert_ne!(d7, d5);
    ///
    /// // Hashing twice un-hashes
    /// d7.hash_piece(Square::D7, Piece::BLACK_PAWN);
    /// assert_eq!(d7, ZobristKey::default());
    /// ```
    #[inline(always)]
    pub fn hash_piece(&mut self, square: Square, piece: Piece) {
        self.hash(ZOBRIST_TABLE.pieces[piece.color()][piece.kind()][square]);
    }

    /// Adds/removes the en passant file of `square`.
    #[inline(always)]
    pub fn hash_ep_square(&mut self, square: Square) {
        self.hash(ZOBRIST_TABLE.ep_files[square.file().index()]);
    }

    /// Adds/removes one combination of castling rights.
    #[inline(always)]
    pub fn hash_castling_rights(&mut self, rights: CastlingRights) {
        self.hash(ZOBRIST_TABLE.castling[rights.index()]);
    }

    /// Adds/removes the "Black to move" key.
    #[inline(always)]
    pub fn hash_side_to_move(&mut self) {
        self.hash(ZOBRIST_TABLE.side_to_move);
    }

    /// Adds/removes the `nth` (zero-based) instance of a piece in a material signature.
    ///
    /// A material key is the XOR of `hash_material(piece, i)` for every `i` below the piece's count,
    /// so it identifies the exact material balance regardless of piece placement.
    #[inline(always)]
    pub fn hash_material(&mut self, piece: Piece, nth: usize) {
        self.hash(ZOBRIST_TABLE.pieces[piece.color()][piece.kind()][nth & 63]);
    }
}

impl fmt::Display for ZobristKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ZobristKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZobristKey({:#018x})", self.0)
    }
}

struct ZobristTable {
    pieces: [[[u64; Square::COUNT]; PieceKind::COUNT]; Color::COUNT],
    ep_files: [u64; File::COUNT],
    castling: [u64; CastlingRights::COUNT],
    side_to_move: u64,
}

impl ZobristTable {
    const fn new() -> Self {
        let mut prng = XoShiRo::new();
        let mut pieces = [[[0; Square::COUNT]; PieceKind::COUNT]; Color::COUNT];
        let mut ep_files = [0; File::COUNT];
        let mut castling = [0; CastlingRights::COUNT];

        let mut color = 0;
        while color < Color::COUNT {
            let mut kind = 0;
            while kind < PieceKind::COUNT {
                let mut square = 0;
                while square < Square::COUNT {
                    let (key, next) = prng.next_const();
                    pieces[color][kind][square] = key;
                    prng = next;
                    square += 1;
                }
                kind += 1;
            }
            color += 1;
        }

        let mut i = 0;
        while i < File::COUNT {
            let (key, next) = prng.next_const();
            ep_files[i] = key;
            prng = next;
            i += 1;
        }

        // No rights at all hashes to nothing
        let mut i = 1;
        while i < CastlingRights::COUNT {
            let (key, next) = prng.next_const();
            castling[i] = key;
            prng = next;
            i += 1;
        }

        let (side_to_move, _) = prng.next_const();

        Self {
            pieces,
            ep_files,
            castling,
            side_to_move,
        }
    }
}
