/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ops::{Index, IndexMut};

use crate::{tune, Color, Move, Piece, Square};

/// Identifies a move by the piece that made it and where it landed.
///
/// `None` stands for "no usable move", such as at the root or right after a null move.
pub type ContinuationKey = Option<(Piece, Square)>;

/// Bonus (or, negated, penalty) for a move that caused or failed to cause a cutoff at `depth`.
///
/// # Example
/// ```
/// # use talon::*;
/// assert_eq!(stat_bonus(1), 1);
/// assert_eq!(stat_bonus(8), 78);
/// assert_eq!(stat_bonus(20), 0);
/// ```
#[inline(always)]
pub const fn stat_bonus(depth: i32) -> i32 {
    if depth > tune::max_stat_bonus_depth!() {
        0
    } else {
        depth * depth + 2 * depth - 2
    }
}

/// Applies `bonus` to `entry` using the "history gravity" formula from
/// <https://www.chessprogramming.org/History_Heuristic#History_Bonuses>.
///
/// Entries saturate at `32 * divisor`, so repeated bonuses pull a score towards the limit rather than past it.
#[inline(always)]
fn apply_gravity(entry: &mut i16, bonus: i32, divisor: i32) {
    let current = *entry as i32;
    let new = current + bonus * 32 - current * bonus.abs() / divisor;
    *entry = new.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
}

/// Quiet move scores indexed by side to move and the move's `from`/`to` squares.
#[derive(Debug, Clone)]
pub struct ButterflyHistory(Box<[[i16; Square::COUNT * Square::COUNT]; Color::COUNT]>);

impl ButterflyHistory {
    #[inline(always)]
    pub fn get(&self, color: Color, mv: Move) -> i32 {
        self.0[color][mv.butterfly_index()] as i32
    }

    #[inline(always)]
    pub fn update(&mut self, color: Color, mv: Move, bonus: i32) {
        apply_gravity(
            &mut self.0[color][mv.butterfly_index()],
            bonus,
            tune::butterfly_divisor!(),
        );
    }

    /// Clear the history table, removing all scores.
    pub fn clear(&mut self) {
        self.0.iter_mut().for_each(|table| table.fill(0));
    }
}

impl Default for ButterflyHistory {
    fn default() -> Self {
        Self(Box::new([[0; Square::COUNT * Square::COUNT]; Color::COUNT]))
    }
}

/// Stores bonuses and penalties for moving a piece to a square.
#[derive(Debug, Clone, Copy)]
pub struct PieceToHistory([[i16; Square::COUNT]; Piece::COUNT]);

impl PieceToHistory {
    #[inline(always)]
    pub fn get(&self, piece: Piece, to: Square) -> i32 {
        self.0[piece][to] as i32
    }

    #[inline(always)]
    pub fn update(&mut self, piece: Piece, to: Square, bonus: i32) {
        apply_gravity(&mut self.0[piece][to], bonus, tune::piece_to_divisor!());
    }
}

impl Default for PieceToHistory {
    #[inline(always)]
    fn default() -> Self {
        Self([[0; Square::COUNT]; Piece::COUNT])
    }
}

/// One [`PieceToHistory`] per earlier move, answering "how good was this reply to that move?".
///
/// Looked up with the [`ContinuationKey`]s of the moves 1, 2, and 4 plies back.
#[derive(Debug, Clone)]
pub struct ContinuationHistory(Vec<PieceToHistory>);

impl ContinuationHistory {
    #[inline(always)]
    fn offset(piece: Piece, square: Square) -> usize {
        piece.index() * Square::COUNT + square.index()
    }

    /// Table of replies to `key`, or `None` if there was no usable earlier move.
    #[inline(always)]
    pub fn table(&self, key: ContinuationKey) -> Option<&PieceToHistory> {
        key.map(|(piece, square)| &self.0[Self::offset(piece, square)])
    }

    /// Score of `piece` moving to `to` in reply to `key`. Zero without an earlier move.
    #[inline(always)]
    pub fn get(&self, key: ContinuationKey, piece: Piece, to: Square) -> i32 {
        self.table(key).map_or(0, |table| table.get(piece, to))
    }

    #[inline(always)]
    pub fn update(&mut self, key: ContinuationKey, piece: Piece, to: Square, bonus: i32) {
        if let Some((prev_piece, prev_square)) = key {
            self.0[Self::offset(prev_piece, prev_square)].update(piece, to, bonus);
        }
    }

    pub fn clear(&mut self) {
        self.0.fill(PieceToHistory::default());
    }
}

impl Default for ContinuationHistory {
    fn default() -> Self {
        Self(vec![
            PieceToHistory::default();
            Piece::COUNT * Square::COUNT
        ])
    }
}

/// The quiet move that last refuted each (piece, destination) of the opponent.
#[derive(Debug, Clone)]
pub struct CounterMoves([[Move; Square::COUNT]; Piece::COUNT]);

impl CounterMoves {
    #[inline(always)]
    pub fn get(&self, key: ContinuationKey) -> Move {
        key.map_or(Move::NONE, |(piece, square)| self.0[piece][square])
    }

    #[inline(always)]
    pub fn set(&mut self, key: ContinuationKey, mv: Move) {
        if let Some((piece, square)) = key {
            self.0[piece][square] = mv;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Default for CounterMoves {
    fn default() -> Self {
        Self([[Move::NONE; Square::COUNT]; Piece::COUNT])
    }
}

/// Two quiet moves per ply that most recently caused a beta cutoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Killers([Move; 2]);

impl Killers {
    /// Makes `mv` the first killer, shifting the old first killer down.
    #[inline(always)]
    pub fn push(&mut self, mv: Move) {
        if self.0[0] != mv {
            self.0[1] = self.0[0];
            self.0[0] = mv;
        }
    }

    #[inline(always)]
    pub fn clear(&mut self) {
        self.0 = [Move::NONE; 2];
    }
}

impl Index<usize> for Killers {
    type Output = Move;

    #[inline(always)]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Killers {
    #[inline(always)]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

/// Every move-ordering table a search thread keeps between searches of the same game.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub butterfly: ButterflyHistory,
    pub continuation: ContinuationHistory,
    pub counter_moves: CounterMoves,
}

impl History {
    /// Forgets everything. Called when a new game starts.
    pub fn clear(&mut self) {
        self.butterfly.clear();
        self.continuation.clear();
        self.counter_moves.clear();
    }

    /// Combined score of a quiet move for ordering, from its butterfly score and its continuation scores
    /// against the moves 1, 2, and 4 plies back.
    #[inline(always)]
    pub fn quiet_score(
        &self,
        color: Color,
        mv: Move,
        piece: Piece,
        continuations: &[ContinuationKey; 3],
    ) -> i32 {
        self.butterfly.get(color, mv)
            + continuations
                .iter()
                .map(|&key| self.continuation.get(key, piece, mv.to()))
                .sum::<i32>()
    }

    /// Applies `bonus` for `piece` moving to `to` to each continuation table.
    #[inline(always)]
    pub fn update_continuations(
        &mut self,
        continuations: &[ContinuationKey; 3],
        piece: Piece,
        to: Square,
        bonus: i32,
    ) {
        for &key in continuations {
            self.continuation.update(key, piece, to, bonus);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    #[test]
    fn test_gravity_bounds() {
        let mut entry = 0;
        for _ in 0..1_000 {
            apply_gravity(&mut entry, stat_bonus(14), tune::butterfly_divisor!());
            assert!((entry as i32) <= 32 * tune::butterfly_divisor!());
        }
        // Saturates close to the limit
        assert!((entry as i32) > 31 * tune::butterfly_divisor!());

        for _ in 0..1_000 {
            apply_gravity(&mut entry, -stat_bonus(14), tune::piece_to_divisor!());
            assert!((entry as i32) >= -32 * tune::piece_to_divisor!());
        }
        assert!(entry < 0);
    }

    #[test]
    fn test_butterfly_is_per_color() {
        let mut history = History::default();
        let mv = Move::new(Square::G1, Square::F3, MoveKind::Normal);
        history.butterfly.update(Color::White, mv, stat_bonus(4));

        assert!(history.butterfly.get(Color::White, mv) > 0);
        assert_eq!(history.butterfly.get(Color::Black, mv), 0);

        history.clear();
        assert_eq!(history.butterfly.get(Color::White, mv), 0);
    }

    #[test]
    fn test_continuation_without_previous_move() {
        let mut history = History::default();
        let mv = Move::new(Square::E2, Square::E4, MoveKind::Normal);
        let keys = [None, Some((Piece::BLACK_KNIGHT, Square::F6)), None];

        history.update_continuations(&keys, Piece::WHITE_PAWN, mv.to(), stat_bonus(3));
        assert_eq!(
            history.quiet_score(Color::White, mv, Piece::WHITE_PAWN, &keys),
            history
                .continuation
                .get(keys[1], Piece::WHITE_PAWN, Square::E4)
        );
        assert!(history.continuation.get(keys[1], Piece::WHITE_PAWN, Square::E4) > 0);
        assert_eq!(history.continuation.get(None, Piece::WHITE_PAWN, Square::E4), 0);
    }

    #[test]
    fn test_killers() {
        let a = Move::new(Square::A2, Square::A3, MoveKind::Normal);
        let b = Move::new(Square::B2, Square::B3, MoveKind::Normal);
        let mut killers = Killers::default();

        killers.push(a);
        killers.push(a);
        assert_eq!((killers[0], killers[1]), (a, Move::NONE));

        killers.push(b);
        assert_eq!((killers[0], killers[1]), (b, a));

        killers.clear();
        assert_eq!(killers[0], Move::NONE);
    }

    #[test]
    fn test_counter_moves() {
        let mut counters = CounterMoves::default();
        let reply = Move::new(Square::D7, Square::D5, MoveKind::Normal);
        let key = Some((Piece::WHITE_PAWN, Square::E4));

        counters.set(key, reply);
        assert_eq!(counters.get(key), reply);
        assert_eq!(counters.get(None), Move::NONE);
    }
}
