/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::LazyLock;

use super::{Bitboard, Color, PieceKind, Square, XoShiRo};

/// Sliding-piece attack tables, built on first use and read-only afterwards.
static ATTACKS: LazyLock<Attacks> = LazyLock::new(Attacks::initialize);

const KNIGHT_ATTACKS: [Bitboard; Square::COUNT] = generate_leaper_mobility(&KNIGHT_DELTAS);
const KING_ATTACKS: [Bitboard; Square::COUNT] = generate_leaper_mobility(&QUEEN_DELTAS);
const PAWN_ATTACKS: [[Bitboard; Square::COUNT]; Color::COUNT] = [
    generate_pawn_attacks(Color::White),
    generate_pawn_attacks(Color::Black),
];
const ROOK_RAYS: [Bitboard; Square::COUNT] = generate_rider_mobility(&ROOK_DELTAS);
const BISHOP_RAYS: [Bitboard; Square::COUNT] = generate_rider_mobility(&BISHOP_DELTAS);

/// Deltas for the movement of the Queen (and King).
const QUEEN_DELTAS: [(i8, i8); 8] = [
    /* Rook */
    (1, 0),
    (0, -1),
    (-1, 0),
    (0, 1),
    /* Bishop */
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];

const ROOK_DELTAS: [(i8, i8); 4] = [
    QUEEN_DELTAS[0],
    QUEEN_DELTAS[1],
    QUEEN_DELTAS[2],
    QUEEN_DELTAS[3],
];

const BISHOP_DELTAS: [(i8, i8); 4] = [
    QUEEN_DELTAS[4],
    QUEEN_DELTAS[5],
    QUEEN_DELTAS[6],
    QUEEN_DELTAS[7],
];

const KNIGHT_DELTAS: [(i8, i8); 8] = [
    (1, 2),
    (1, -2),
    (2, 1),
    (2, -1),
    (-1, 2),
    (-1, -2),
    (-2, 1),
    (-2, -1),
];

/// A table indexed by two squares that returns the squares strictly between them,
/// if they share a rank, file, or diagonal.
const RAY_BETWEEN: [[Bitboard; Square::COUNT]; Square::COUNT] = {
    let mut rays = [[Bitboard::EMPTY_BOARD; Square::COUNT]; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let from = Square::from_index_unchecked(i);
        let mut j = 0;
        while j < QUEEN_DELTAS.len() {
            let (df, dr) = QUEEN_DELTAS[j];
            let mut ray = Bitboard::EMPTY_BOARD;
            let mut to = from;

            while let Some(shifted) = to.offset(df, dr) {
                rays[from.index()][shifted.index()] = ray;
                ray = Bitboard::new(ray.inner() | shifted.bitboard().inner());
                to = shifted;
            }

            j += 1;
        }

        i += 1;
    }

    rays
};

/// A table indexed by two squares that returns the entire line (edge to edge) through both,
/// or an empty board if they are not aligned.
const LINE_THROUGH: [[Bitboard; Square::COUNT]; Square::COUNT] = {
    let mut lines = [[Bitboard::EMPTY_BOARD; Square::COUNT]; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let from = Square::from_index_unchecked(i);
        let mut j = 0;
        // Each direction and its opposite form one line
        while j < QUEEN_DELTAS.len() {
            let (df, dr) = QUEEN_DELTAS[j];
            let mut line = from.bitboard().inner();

            let mut to = from;
            while let Some(shifted) = to.offset(df, dr) {
                line |= shifted.bitboard().inner();
                to = shifted;
            }
            to = from;
            while let Some(shifted) = to.offset(-df, -dr) {
                line |= shifted.bitboard().inner();
                to = shifted;
            }

            to = from;
            while let Some(shifted) = to.offset(df, dr) {
                lines[from.index()][shifted.index()] = Bitboard::new(line);
                to = shifted;
            }

            j += 1;
        }

        i += 1;
    }

    lines
};

/// Squares strictly between `from` and `to`, or empty if they are not aligned.
///
/// # Example
/// ```
/// # use talon::*;
/// assert_eq!(ray_between(Square::A1, Square::A4), Square::A2.bitboard() | Square::A3.bitboard());
/// assert_eq!(ray_between(Square::A1, Square::B3), Bitboard::EMPTY_BOARD);
/// ```
#[inline(always)]
pub const fn ray_between(from: Square, to: Square) -> Bitboard {
    RAY_BETWEEN[from.index()][to.index()]
}

/// The full line through `a` and `b`, or empty if they are not aligned.
///
/// # Example
/// ```
/// # use talon::*;
/// assert_eq!(line_through(Square::A3, Square::A5), Bitboard::FILE_A);
/// ```
#[inline(always)]
pub const fn line_through(a: Square, b: Square) -> Bitboard {
    LINE_THROUGH[a.index()][b.index()]
}

/// Returns `true` if all three squares lie on one rank, file, or diagonal.
#[inline(always)]
pub const fn aligned(a: Square, b: Square, c: Square) -> bool {
    LINE_THROUGH[a.index()][b.index()].contains(c)
}

#[inline(always)]
pub const fn knight_attacks(square: Square) -> Bitboard {
    KNIGHT_ATTACKS[square.index()]
}

#[inline(always)]
pub const fn king_attacks(square: Square) -> Bitboard {
    KING_ATTACKS[square.index()]
}

/// Squares attacked by a pawn of `color` on `square`.
#[inline(always)]
pub const fn pawn_attacks(square: Square, color: Color) -> Bitboard {
    PAWN_ATTACKS[color.index()][square.index()]
}

/// Rook moves on an empty board.
#[inline(always)]
pub const fn rook_rays(square: Square) -> Bitboard {
    ROOK_RAYS[square.index()]
}

/// Bishop moves on an empty board.
#[inline(always)]
pub const fn bishop_rays(square: Square) -> Bitboard {
    BISHOP_RAYS[square.index()]
}

/// Rook attacks from `square`, stopping at (and including) the first blocker in each direction.
///
/// # Example
/// ```
/// # use talon::*;
/// let blockers = Square::D6.bitboard() | Square::F4.bitboard();
/// let attacks = rook_attacks(Square::D4, blockers);
/// assert!(attacks.contains(Square::D6));
/// assert!(!attacks.contains(Square::D7));
/// assert!(attacks.contains(Square::F4));
/// assert!(!attacks.contains(Square::G4));
/// ```
#[inline(always)]
pub fn rook_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    ATTACKS.rook_attacks(square, blockers)
}

/// Bishop attacks from `square`, stopping at (and including) the first blocker in each direction.
#[inline(always)]
pub fn bishop_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    ATTACKS.bishop_attacks(square, blockers)
}

/// Union of rook and bishop attacks.
#[inline(always)]
pub fn queen_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    ATTACKS.rook_attacks(square, blockers) | ATTACKS.bishop_attacks(square, blockers)
}

/// Attacks of any non-pawn piece kind from `square`.
///
/// Pawns have color-dependent attacks; use [`pawn_attacks`] for them.
#[inline(always)]
pub fn attacks_for(kind: PieceKind, square: Square, blockers: Bitboard) -> Bitboard {
    match kind {
        PieceKind::Pawn => Bitboard::EMPTY_BOARD,
        PieceKind::Knight => knight_attacks(square),
        PieceKind::Bishop => bishop_attacks(square, blockers),
        PieceKind::Rook => rook_attacks(square, blockers),
        PieceKind::Queen => queen_attacks(square, blockers),
        PieceKind::King => king_attacks(square),
    }
}

/// Perfect-hash parameters for one slider on one square.
#[derive(Clone, Copy, Debug, Default)]
struct Magic {
    mask: Bitboard,
    magic: u64,
    shift: u32,
    offset: usize,
}

impl Magic {
    #[inline(always)]
    const fn index(&self, blockers: Bitboard) -> usize {
        let relevant = blockers.inner() & self.mask.inner();
        (relevant.wrapping_mul(self.magic) >> self.shift) as usize + self.offset
    }
}

/// Magic-bitboard lookup tables for rooks and bishops.
///
/// Constructed once with [`Attacks::initialize`]; every lookup afterwards is a single multiply and shift.
pub struct Attacks {
    rook: [Magic; Square::COUNT],
    bishop: [Magic; Square::COUNT],
    table: Vec<Bitboard>,
}

impl Attacks {
    /// Finds a collision-free magic multiplier for every square and fills the shared attack table.
    ///
    /// Magics are searched with a fixed-seed [`XoShiRo`], so the tables are identical on every run.
    pub fn initialize() -> Self {
        let mut prng = XoShiRo::new();
        let mut table = Vec::with_capacity(102_400 + 5_248);

        let rook = Self::find_magics(&ROOK_DELTAS, &mut table, &mut prng);
        let bishop = Self::find_magics(&BISHOP_DELTAS, &mut table, &mut prng);

        Self {
            rook,
            bishop,
            table,
        }
    }

    #[inline(always)]
    pub fn rook_attacks(&self, square: Square, blockers: Bitboard) -> Bitboard {
        self.table[self.rook[square.index()].index(blockers)]
    }

    #[inline(always)]
    pub fn bishop_attacks(&self, square: Square, blockers: Bitboard) -> Bitboard {
        self.table[self.bishop[square.index()].index(blockers)]
    }

    fn find_magics(
        deltas: &[(i8, i8)],
        table: &mut Vec<Bitboard>,
        prng: &mut XoShiRo,
    ) -> [Magic; Square::COUNT] {
        let mut magics = [Magic::default(); Square::COUNT];

        for square in Square::iter() {
            // Edges only matter when the slider stands on them
            let edges = ((Bitboard::RANK_1 | Bitboard::RANK_8) & !Bitboard::from_rank(square.rank()))
                | ((Bitboard::FILE_A | Bitboard::FILE_H) & !Bitboard::from_file(square.file()));
            let mask = generate_rider_mobility(deltas)[square.index()] & !edges;
            let bits = mask.population();

            let occupancies = mask.subsets().collect::<Vec<_>>();
            let reference = occupancies
                .iter()
                .map(|&occ| slider_attacks_slow(square, occ, deltas))
                .collect::<Vec<_>>();

            let size = 1usize << bits;
            let offset = table.len();
            table.resize(offset + size, Bitboard::EMPTY_BOARD);

            // Records which attempt last wrote each slot, so slots need not be cleared between attempts
            let mut epoch = vec![0u32; size];
            let mut attempt = 0;

            let mut magic = Magic {
                mask,
                magic: 0,
                shift: 64 - bits,
                offset,
            };

            'search: loop {
                magic.magic = prng.sparse_u64();

                // Quickly discard multipliers that leave the top byte sparse
                if (mask.inner().wrapping_mul(magic.magic) >> 56).count_ones() < 6 {
                    continue;
                }

                attempt += 1;
                for (occ, &attacks) in occupancies.iter().zip(&reference) {
                    let index = magic.index(*occ);
                    let slot = index - offset;

                    if epoch[slot] < attempt {
                        epoch[slot] = attempt;
                        table[index] = attacks;
                    } else if table[index] != attacks {
                        continue 'search;
                    }
                }

                break;
            }

            magics[square.index()] = magic;
        }

        magics
    }
}

/// Slider attacks computed by walking each ray. Only used to build the magic tables.
fn slider_attacks_slow(square: Square, blockers: Bitboard, deltas: &[(i8, i8)]) -> Bitboard {
    let mut attacks = Bitboard::EMPTY_BOARD;

    for &(df, dr) in deltas {
        let mut ray = square;
        while let Some(shifted) = ray.offset(df, dr) {
            attacks |= shifted;
            if blockers.contains(shifted) {
                break;
            }
            ray = shifted;
        }
    }

    attacks
}

const fn generate_pawn_attacks(color: Color) -> [Bitboard; Square::COUNT] {
    let mut boards = [Bitboard::EMPTY_BOARD; Square::COUNT];
    let mut i = 0;
    while i < Square::COUNT {
        boards[i] = Bitboard::from_square(Square::from_index_unchecked(i)).pawn_attacks(color);
        i += 1;
    }
    boards
}

/// Generates the moves from every location for the "Leaper" pieces (King and Knight).
const fn generate_leaper_mobility(deltas: &[(i8, i8)]) -> [Bitboard; Square::COUNT] {
    let mut mobility = [Bitboard::EMPTY_BOARD; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let square = Square::from_index_unchecked(i);
        let mut movement = 0;

        let mut j = 0;
        while j < deltas.len() {
            let (df, dr) = deltas[j];
            if let Some(shifted) = square.offset(df, dr) {
                movement |= shifted.bitboard().inner();
            }
            j += 1;
        }

        mobility[i] = Bitboard::new(movement);
        i += 1;
    }

    mobility
}

/// Generates the moves from every location for the "Rider" pieces on an empty board.
const fn generate_rider_mobility(deltas: &[(i8, i8)]) -> [Bitboard; Square::COUNT] {
    let mut mobility = [Bitboard::EMPTY_BOARD; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let square = Square::from_index_unchecked(i);
        let mut movement = 0;

        let mut j = 0;
        while j < deltas.len() {
            let (df, dr) = deltas[j];
            let mut ray = square;

            while let Some(shifted) = ray.offset(df, dr) {
                movement |= shifted.bitboard().inner();
                ray = shifted;
            }

            j += 1;
        }

        mobility[i] = Bitboard::new(movement);
        i += 1;
    }

    mobility
}
