/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::{
    attacks_for, line_through, psqt, tune, Bitboard, Color, File, Piece, PieceKind, Position,
    Rank, Score, Tapered, ZobristKey,
};

/// Shorthand for building the bonus tables below.
const fn s(mg: i32, eg: i32) -> Tapered {
    Tapered::new(mg, eg)
}

/// Non-pawn material (both sides) at or above which the position counts as a pure middlegame.
const MIDGAME_LIMIT: i32 = 6_000;

/// Non-pawn material (both sides) at or below which the position counts as a pure endgame.
const ENDGAME_LIMIT: i32 = tune::endgame_material!();

/// Indexed by the number of safe squares a piece attacks.
const KNIGHT_MOBILITY: [Tapered; 9] = [
    s(-37, -38), s(-28, -27), s(-4, -13), s(-1, -5), s(3, 2),
    s(7, 5), s(11, 13), s(15, 14), s(18, 14),
];

const BISHOP_MOBILITY: [Tapered; 14] = [
    s(-24, -29), s(-10, -9), s(8, -1), s(13, 6), s(18, 11),
    s(25, 21), s(27, 27), s(31, 29), s(32, 31), s(35, 35),
    s(39, 37), s(40, 43), s(46, 45), s(48, 47),
];

const ROOK_MOBILITY: [Tapered; 15] = [
    s(-28, -39), s(-12, -9), s(-5, 13), s(-2, 27), s(-2, 35),
    s(0, 40), s(4, 54), s(7, 60), s(10, 64), s(11, 71),
    s(15, 77), s(16, 80), s(21, 82), s(24, 84), s(29, 84),
];

const QUEEN_MOBILITY: [Tapered; 28] = [
    s(-20, -17), s(-12, -6), s(1, 3), s(2, 9), s(7, 18),
    s(12, 27), s(12, 31), s(20, 38), s(21, 39), s(23, 43),
    s(27, 47), s(28, 51), s(30, 55), s(35, 58), s(36, 59),
    s(36, 61), s(37, 64), s(38, 65), s(42, 66), s(47, 68),
    s(49, 70), s(54, 78), s(56, 79), s(56, 80), s(59, 87),
    s(59, 88), s(61, 95), s(64, 99),
];

/// Penalty per doubled pawn, by file.
const DOUBLED: [Tapered; File::COUNT] = [
    s(5, 20), s(8, 22), s(9, 22), s(9, 22),
    s(9, 22), s(9, 22), s(8, 22), s(5, 20),
];

/// Penalty per isolated pawn, by whether an enemy pawn stands in front of it and by file.
const ISOLATED: [[Tapered; File::COUNT]; 2] = [
    [
        s(18, 22), s(25, 23), s(28, 24), s(28, 24),
        s(28, 24), s(28, 24), s(25, 23), s(18, 22),
    ],
    [
        s(11, 14), s(18, 17), s(20, 18), s(20, 18),
        s(20, 18), s(20, 18), s(18, 17), s(11, 14),
    ],
];

/// Bonus for a pawn defended by or standing next to another pawn, by relative rank.
const CONNECTED: [Tapered; Rank::COUNT] = [
    s(0, 0), s(2, 2), s(3, 3), s(6, 6),
    s(15, 15), s(31, 31), s(59, 59), s(0, 0),
];

const ROOK_OPEN_FILE: Tapered = s(17, 8);
const ROOK_SEMI_OPEN_FILE: Tapered = s(8, 4);

/// Material imbalance slots: the bishop pair, then pawn, knight, bishop, rook, and queen counts.
const IMBALANCE_SLOTS: usize = 6;

const IMBALANCE_LINEAR: [i32; IMBALANCE_SLOTS] = [1852, -162, -1122, -183, 249, -154];

/// How each slot interacts with our own pieces in the same or a lower slot.
const IMBALANCE_OURS: [[i32; IMBALANCE_SLOTS]; IMBALANCE_SLOTS] = [
    [0, 0, 0, 0, 0, 0],
    [39, 2, 0, 0, 0, 0],
    [35, 271, -4, 0, 0, 0],
    [0, 105, 4, 0, 0, 0],
    [-27, -2, 46, 100, -141, 0],
    [-177, 25, 129, 142, -137, 0],
];

/// How each slot interacts with the opponent's pieces in the same or a lower slot.
const IMBALANCE_THEIRS: [[i32; IMBALANCE_SLOTS]; IMBALANCE_SLOTS] = [
    [0, 0, 0, 0, 0, 0],
    [37, 0, 0, 0, 0, 0],
    [10, 62, 0, 0, 0, 0],
    [57, 64, 39, 0, 0, 0],
    [50, 40, 23, -22, 0, 0],
    [98, 105, -39, 141, 274, 0],
];

/// The raw imbalance sum is in 1/16 centipawns, then weighted by this percentage.
const IMBALANCE_WEIGHT: i32 = 16;

const KING_SHIELD_CLOSE: i32 = 10;
const KING_SHIELD_FAR: i32 = 5;

/// Side material below which a side without pawns cannot win.
const STRONG_MATERIAL: i32 = 400;

/// Number of entries in each thread's pawn structure cache.
const PAWN_TABLE_SIZE: usize = 16_384;

/// Number of entries in each thread's material cache.
const MATERIAL_TABLE_SIZE: usize = 8_192;

/// Pawn-only evaluation terms for one pawn structure.
#[derive(Clone, Copy, Debug, Default)]
struct PawnEntry {
    key: ZobristKey,

    /// From White's perspective.
    score: Tapered,
    passed: [Bitboard; Color::COUNT],
    attacks: [Bitboard; Color::COUNT],

    /// Files without a pawn of that color, as a bitmask of file indices.
    semi_open: [u8; Color::COUNT],
}

impl PawnEntry {
    fn new(position: &Position) -> Self {
        let mut entry = Self {
            key: position.pawn_key(),
            ..Default::default()
        };
        entry.score = entry.evaluate_color(position, Color::White)
            - entry.evaluate_color(position, Color::Black);
        entry
    }

    #[inline(always)]
    fn is_semi_open(&self, color: Color, file: File) -> bool {
        self.semi_open[color] & (1 << file.index()) != 0
    }

    fn evaluate_color(&mut self, position: &Position, us: Color) -> Tapered {
        let them = us.opponent();
        let ours = position.pieces(us, PieceKind::Pawn);
        let theirs = position.pieces(them, PieceKind::Pawn);
        let mut score = Tapered::ZERO;

        self.attacks[us] = ours.pawn_attacks(us);
        self.semi_open[us] = 0xFF;

        for &square in position.piece_list(us, PieceKind::Pawn) {
            let file = square.file();
            let file_bb = Bitboard::from_file(file);
            let adjacent = file_bb.east() | file_bb.west();
            let ahead = square.bitboard().forward(us).fill_forward(us);
            let span = ahead | ahead.east() | ahead.west();
            let beside = Bitboard::from_rank(square.rank())
                | Bitboard::from_rank(square.backward(us).rank());

            self.semi_open[us] &= !(1 << file.index());

            let opposed = theirs.intersects(ahead);
            let doubled = ours.intersects(ahead);
            let isolated = !ours.intersects(adjacent);
            let connected = ours.intersects(adjacent & beside);
            let passed = !theirs.intersects(span);

            if passed && !doubled {
                self.passed[us] |= square;
            }
            if doubled {
                score -= DOUBLED[file.index()];
            }
            if isolated {
                score -= ISOLATED[opposed as usize][file.index()];
            }
            if connected {
                score += CONNECTED[square.relative_rank(us) as usize];
            }
        }

        score
    }
}

/// Caches [`PawnEntry`]s by pawn key.
#[derive(Debug, Clone)]
struct PawnTable(Vec<PawnEntry>);

impl PawnTable {
    fn probe(&mut self, position: &Position) -> PawnEntry {
        let key = position.pawn_key();
        let index = key.inner() as usize & (PAWN_TABLE_SIZE - 1);
        let entry = &mut self.0[index];
        if entry.key != key {
            *entry = PawnEntry::new(position);
        }
        *entry
    }
}

impl Default for PawnTable {
    fn default() -> Self {
        Self(vec![PawnEntry::default(); PAWN_TABLE_SIZE])
    }
}

/// Material imbalance for one material configuration.
#[derive(Clone, Copy, Debug, Default)]
struct MaterialEntry {
    key: ZobristKey,

    /// From White's perspective.
    imbalance: Tapered,
}

impl MaterialEntry {
    fn new(position: &Position) -> Self {
        let white = imbalance_slots(position, Color::White);
        let black = imbalance_slots(position, Color::Black);
        let value = (imbalance(&white, &black) - imbalance(&black, &white)) / 16;
        let value = value * IMBALANCE_WEIGHT / 100;

        Self {
            key: position.material_key(),
            imbalance: Tapered::new(value, value),
        }
    }
}

/// Piece counts of `color` in imbalance slot order.
fn imbalance_slots(position: &Position, color: Color) -> [i32; IMBALANCE_SLOTS] {
    let count = |kind| position.piece_count(color, kind) as i32;
    [
        (count(PieceKind::Bishop) > 1) as i32,
        count(PieceKind::Pawn),
        count(PieceKind::Knight),
        count(PieceKind::Bishop),
        count(PieceKind::Rook),
        count(PieceKind::Queen),
    ]
}

/// Linear and quadratic imbalance of `ours` against `theirs`, in 1/16 centipawns.
fn imbalance(ours: &[i32; IMBALANCE_SLOTS], theirs: &[i32; IMBALANCE_SLOTS]) -> i32 {
    let mut bonus = 0;

    for slot in 0..IMBALANCE_SLOTS {
        if ours[slot] == 0 {
            continue;
        }

        let value = (0..=slot).fold(IMBALANCE_LINEAR[slot], |value, other| {
            value
                + IMBALANCE_OURS[slot][other] * ours[other]
                + IMBALANCE_THEIRS[slot][other] * theirs[other]
        });

        bonus += ours[slot] * value;
    }

    bonus
}

/// Caches [`MaterialEntry`]s by material key.
#[derive(Debug, Clone)]
struct MaterialTable(Vec<MaterialEntry>);

impl MaterialTable {
    fn probe(&mut self, position: &Position) -> MaterialEntry {
        let key = position.material_key();
        let index = key.inner() as usize & (MATERIAL_TABLE_SIZE - 1);
        let entry = &mut self.0[index];
        if entry.key != key {
            *entry = MaterialEntry::new(position);
        }
        *entry
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self(vec![MaterialEntry::default(); MATERIAL_TABLE_SIZE])
    }
}

/// Encapsulates the logic of scoring a chess position.
///
/// Each search thread owns one, as it caches pawn structure and material evaluations between calls.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    pawns: PawnTable,
    material: MaterialTable,
}

impl Evaluator {
    /// Forgets every cached pawn structure and material configuration.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Evaluate this position from the side-to-move's perspective.
    ///
    /// A positive/high number is good for the side-to-move, while a negative number is better for the opponent.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mut evaluator = Evaluator::default();
    /// let white = Position::from_fen("4k3/8/8/8/8/8/4P3/R3K3 w - - 0 1").unwrap();
    /// let black = Position::from_fen("4k3/8/8/8/8/8/4P3/R3K3 b - - 0 1").unwrap();
    /// assert!(evaluator.evaluate(&white) > Score(400));
    /// assert!(evaluator.evaluate(&black) < Score(-400));
    /// ```
    pub fn evaluate(&mut self, position: &Position) -> Score {
        let trace = self.trace(position);
        let stm = position.side_to_move();
        Score(trace.total * stm.sign() + tune::tempo!())
    }

    /// Computes every evaluation term, from White's perspective.
    pub fn trace(&mut self, position: &Position) -> EvalTrace {
        let pawns = self.pawns.probe(position);
        let material = self.material.probe(position);
        let phase = game_phase(position);

        let mut trace = EvalTrace {
            phase,
            pawns: pawns.score,
            imbalance: material.imbalance,
            ..Default::default()
        };

        for color in Color::all() {
            let sign = color.sign();
            let (placement, mobility) = pieces(position, &pawns, color);
            trace.psqt += placement * sign;
            trace.mobility += mobility * sign;
            trace.passed += passed_pawns(position, &pawns, color) * sign;
            trace.king_shield += Tapered::new(king_shield(position, color), 0) * sign;
        }

        let score = trace.psqt
            + trace.imbalance
            + trace.mobility
            + trace.pawns
            + trace.passed
            + trace.king_shield;
        trace.total = scale_for_material(position, score.taper(phase));
        trace
    }
}

/// Game phase from the remaining non-pawn material, from [`Tapered::MAX_PHASE`] (opening) down to `0` (endgame).
///
/// # Example
/// ```
/// # use talon::*;
/// assert_eq!(game_phase(&Position::default()), Tapered::MAX_PHASE);
/// let kings = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
/// assert_eq!(game_phase(&kings), 0);
/// ```
pub fn game_phase(position: &Position) -> i32 {
    let npm = position.non_pawn_material(Color::White) + position.non_pawn_material(Color::Black);
    let npm = npm.clamp(ENDGAME_LIMIT, MIDGAME_LIMIT);
    (npm - ENDGAME_LIMIT) * Tapered::MAX_PHASE / (MIDGAME_LIMIT - ENDGAME_LIMIT)
}

/// Placement and mobility of every piece of `color`.
fn pieces(position: &Position, pawns: &PawnEntry, color: Color) -> (Tapered, Tapered) {
    let them = color.opponent();
    let king = position.king_square(color);
    let pinned = position.pinned(color);
    let occupied = position.occupied();
    let mobility_area = !(pawns.attacks[them]
        | position.pieces(color, PieceKind::Pawn)
        | position.pieces(color, PieceKind::King));

    let mut placement = Tapered::ZERO;
    let mut mobility = Tapered::ZERO;

    for kind in PieceKind::all() {
        let piece = Piece::new(color, kind);
        for &square in position.piece_list(color, kind) {
            placement += psqt(piece, square);

            let table: &[Tapered] = match kind {
                PieceKind::Knight => &KNIGHT_MOBILITY,
                PieceKind::Bishop => &BISHOP_MOBILITY,
                PieceKind::Rook => &ROOK_MOBILITY,
                PieceKind::Queen => &QUEEN_MOBILITY,
                PieceKind::Pawn | PieceKind::King => continue,
            };

            let mut attacks = attacks_for(kind, square, occupied);
            if pinned.contains(square) {
                attacks &= line_through(king, square);
            }
            let count = (attacks & mobility_area).population() as usize;
            mobility += table[count.min(table.len() - 1)];

            if kind == PieceKind::Rook && pawns.is_semi_open(color, square.file()) {
                placement += if pawns.is_semi_open(them, square.file()) {
                    ROOK_OPEN_FILE
                } else {
                    ROOK_SEMI_OPEN_FILE
                };
            }
        }
    }

    (placement, mobility)
}

/// Bonus for each passed pawn of `color`, growing quickly with its rank and with how far the enemy king is.
fn passed_pawns(position: &Position, pawns: &PawnEntry, color: Color) -> Tapered {
    let them = color.opponent();
    let our_king = position.king_square(color);
    let their_king = position.king_square(them);
    let mut score = Tapered::ZERO;

    for square in pawns.passed[color] {
        let r = square.relative_rank(color) as i32 - 1;
        let rr = r * (r - 1);
        let mut mg = 17 * rr;
        let mut eg = 7 * (rr + r + 1);

        if rr > 0 {
            let block = square.forward(color);
            eg += their_king.distance(block) as i32 * 5 * rr
                - our_king.distance(block) as i32 * 2 * rr;

            if position.piece_at(block).is_none() {
                mg += 9 * rr;
                eg += 9 * rr;
            }
        }

        if position.piece_count(color, PieceKind::Pawn) < position.piece_count(them, PieceKind::Pawn) {
            eg += eg / 4;
        }

        score += Tapered::new(mg, eg);
    }

    // Weighted down, as the raw terms above are deliberately steep
    Tapered::new(score.mg * 25 / 100, score.eg * 34 / 100)
}

/// Middlegame bonus for pawns sheltering a castled king.
fn king_shield(position: &Position, color: Color) -> i32 {
    let king = position.king_square(color);
    let files = match king.file().index() {
        5..=7 => [File::F, File::G, File::H],
        0..=2 => [File::A, File::B, File::C],
        _ => return 0,
    };

    let pawns = position.pieces(color, PieceKind::Pawn);
    let close = Bitboard::relative_rank(color, 1);
    let far = Bitboard::relative_rank(color, 2);

    files
        .into_iter()
        .map(|file| {
            let file = Bitboard::from_file(file);
            if pawns.intersects(file & close) {
                KING_SHIELD_CLOSE
            } else if pawns.intersects(file & far) {
                KING_SHIELD_FAR
            } else {
                0
            }
        })
        .sum()
}

/// Pulls `score` (White's perspective) towards a draw when the stronger side has no pawns and too little to mate.
fn scale_for_material(position: &Position, score: i32) -> i32 {
    let strong = if score > 0 { Color::White } else { Color::Black };
    let weak = strong.opponent();

    if position.piece_count(strong, PieceKind::Pawn) > 0 {
        return score;
    }

    let strong_material = position.non_pawn_material(strong);
    let weak_material = position.non_pawn_material(weak);
    let value = |kind: PieceKind| kind.value();

    if strong_material < STRONG_MATERIAL {
        return 0;
    }
    if position.piece_count(weak, PieceKind::Pawn) == 0 && strong_material == 2 * value(PieceKind::Knight) {
        return 0;
    }

    let rook = value(PieceKind::Rook);
    let drawish = (strong_material == rook && weak_material == value(PieceKind::Bishop))
        || (strong_material == rook + value(PieceKind::Bishop) && weak_material == rook)
        || (strong_material == rook + value(PieceKind::Knight) && weak_material == rook);

    if drawish {
        score / 2
    } else {
        score
    }
}

/// Every term of an evaluation, from White's perspective.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalTrace {
    pub phase: i32,
    pub psqt: Tapered,
    pub imbalance: Tapered,
    pub mobility: Tapered,
    pub pawns: Tapered,
    pub passed: Tapered,
    pub king_shield: Tapered,

    /// Tapered and scaled sum of all terms, without tempo.
    pub total: i32,
}

impl fmt::Display for EvalTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14}{:>8}{:>8}", "Term", "MG", "EG")?;
        for (name, term) in [
            ("Material+PSQT", self.psqt),
            ("Imbalance", self.imbalance),
            ("Mobility", self.mobility),
            ("Pawns", self.pawns),
            ("Passed", self.passed),
            ("King shield", self.king_shield),
        ] {
            writeln!(f, "{name:<14}{:>8}{:>8}", term.mg, term.eg)?;
        }
        writeln!(f, "Phase: {}/{}", self.phase, Tapered::MAX_PHASE)?;
        write!(f, "Total (White): {}", self.total)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    fn eval(fen: &str) -> Score {
        Evaluator::default().evaluate(&Position::from_fen(fen).unwrap())
    }

    #[test]
    fn test_startpos_is_tempo() {
        assert_eq!(eval(FEN_STARTPOS), Score(tune::tempo!()));
    }

    #[test]
    fn test_eval_is_symmetric() {
        let fens = [
            (
                "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
                "rnbqk2r/pppp1ppp/5n2/2b1p3/4P3/2N2N2/PPPP1PPP/R1BQKB1R b KQkq - 4 4",
            ),
            (
                "8/5k2/8/2P5/8/8/5K2/8 w - - 0 1",
                "8/5k2/8/8/2p5/8/5K2/8 b - - 0 1",
            ),
        ];

        for (fen, mirrored) in fens {
            assert_eq!(eval(fen), eval(mirrored), "{fen} vs {mirrored}");
        }
    }

    #[test]
    fn test_material_dominates() {
        assert!(eval("4k3/8/8/8/8/8/8/3QK3 w - - 0 1") > Score(800));
        assert!(eval("4k3/8/8/8/8/8/8/3QK3 b - - 0 1") < Score(-800));
    }

    #[test]
    fn test_insufficient_material() {
        // A lone minor piece cannot win
        assert_eq!(eval("4k3/8/8/8/8/8/8/2B1K3 w - - 0 1"), Score(tune::tempo!()));
        assert_eq!(eval("4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1"), Score(tune::tempo!()));
    }

    #[test]
    fn test_pawn_structure() {
        let position = Position::from_fen("4k3/8/8/3p4/8/8/P1P1P3/4K3 w - - 0 1").unwrap();
        let entry = PawnEntry::new(&position);

        // Only a2 has no enemy pawn in front of it on its own or adjacent files
        assert!(entry.passed[Color::White].contains(Square::A2));
        assert!(!entry.passed[Color::White].contains(Square::C2));
        assert!(!entry.passed[Color::White].contains(Square::E2));
        assert!(!entry.passed[Color::Black].contains(Square::D5));
        assert!(entry.is_semi_open(Color::White, File::D));
        assert!(!entry.is_semi_open(Color::Black, File::D));
    }

    #[test]
    fn test_material_imbalance() {
        // Equal material has no imbalance
        let position = Position::default();
        assert_eq!(MaterialEntry::new(&position).imbalance, Tapered::ZERO);

        // The bishop pair is worth more than bishop and knight
        let pair = Position::from_fen("4k3/pppp4/8/8/8/8/PPPP4/2B1KB2 w - - 0 1").unwrap();
        let mixed = Position::from_fen("4k3/pppp4/8/8/8/8/PPPP4/2B1KN2 w - - 0 1").unwrap();
        let pair = MaterialEntry::new(&pair).imbalance;
        let mixed = MaterialEntry::new(&mixed).imbalance;
        assert!(pair.mg > mixed.mg, "{pair:?} vs {mixed:?}");
        assert_eq!(pair.mg, pair.eg);

        // Colors are mirrored
        let white = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let black = Position::from_fen("r3k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(
            MaterialEntry::new(&white).imbalance.mg,
            -MaterialEntry::new(&black).imbalance.mg
        );
    }

    #[test]
    fn test_material_cache() {
        let mut table = MaterialTable::default();
        let position = Position::from_fen(FEN_KIWIPETE).unwrap();
        let entry = table.probe(&position);
        assert_eq!(entry.key, position.material_key());
        assert_eq!(table.probe(&position).imbalance, entry.imbalance);

        // Only the material matters, not where it stands
        let moved = Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R b KQkq - 0 1").unwrap();
        assert_eq!(table.probe(&moved).key, entry.key);
    }

    #[test]
    fn test_pawn_cache_hits() {
        let mut evaluator = Evaluator::default();
        let position = Position::from_fen(FEN_KIWIPETE).unwrap();
        let first = evaluator.evaluate(&position);
        assert_eq!(evaluator.evaluate(&position), first);
    }
}
