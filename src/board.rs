/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Precomputed attack tables, including magic bitboards for sliders.
mod attacks;

/// A 64-bit set of squares.
mod bitboard;

/// Pseudo-legal and legal move generation.
mod movegen;

/// Compact move encoding and move lists.
mod moves;

/// Perft: counting the leaves of the move tree, for validating move generation.
mod perft;

/// Colors, piece kinds, and pieces.
mod piece;

/// The board itself: make/unmake, legality, SEE, and draw detection.
mod position;

/// Deterministic pseudo-random numbers for Zobrist keys and magic numbers.
mod prng;

/// Squares, ranks, and files.
mod square;

/// Board-related constants.
mod utils;

/// Zobrist hashing.
mod zobrist;

pub use attacks::*;
pub use bitboard::*;
pub use movegen::*;
pub use moves::*;
pub use perft::*;
pub use piece::*;
pub use position::*;
pub use prng::*;
pub use square::*;
pub use utils::*;
pub use zobrist::*;
