/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use arrayvec::ArrayVec;

use crate::{
    generate, Captures, ContinuationKey, Evasions, History, Killers, Move, MoveKind, MoveList,
    PieceKind, Position, Quiets, MAX_MOVES,
};

/// Evasions that lose material are pushed below every other evasion by this much.
const LOSING_EVASION_PENALTY: i32 = 1 << 28;

/// Where a [`MovePicker`] is in its sequence of move sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    MainTTMove,
    CapturesInit,
    GoodCaptures,
    FirstKiller,
    SecondKiller,
    CounterMove,
    QuietsInit,
    Quiets,
    BadCaptures,

    QSearchTTMove,
    QSearchCapturesInit,
    QSearchCaptures,

    EvasionTTMove,
    EvasionsInit,
    Evasions,

    Done,
}

impl Stage {
    /// The stage that follows this one.
    #[inline(always)]
    const fn next(self) -> Self {
        use Stage::*;
        match self {
            MainTTMove => CapturesInit,
            CapturesInit => GoodCaptures,
            GoodCaptures => FirstKiller,
            FirstKiller => SecondKiller,
            SecondKiller => CounterMove,
            CounterMove => QuietsInit,
            QuietsInit => Quiets,
            Quiets => BadCaptures,
            QSearchTTMove => QSearchCapturesInit,
            QSearchCapturesInit => QSearchCaptures,
            EvasionTTMove => EvasionsInit,
            EvasionsInit => Evasions,
            BadCaptures | QSearchCaptures | Evasions | Done => Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScoredMove {
    mv: Move,
    score: i32,
}

/// Hands out the moves of a position one at a time, best candidates first.
///
/// Moves are generated lazily in stages, so a cutoff on the TT move or a good capture never pays for generating quiets:
///
/// 1. The TT move
/// 2. Captures and queen promotions that do not lose material, by MVV-LVA
/// 3. The two killer moves
/// 4. The counter move
/// 5. All other quiet moves, by history
/// 6. Captures that lose material
///
/// Quiescence search only walks the TT move and captures.
/// In check, every evasion is scored and handed out in a single stage.
///
/// Each pseudo-legal move is returned at most once. Moves are not checked for full legality.
#[derive(Debug, Clone)]
pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    killers: Killers,
    counter_move: Move,
    continuations: [ContinuationKey; 3],
    quiet_sort_limit: i32,
    moves: ArrayVec<ScoredMove, MAX_MOVES>,
    bad_captures: MoveList,
    current: usize,
}

impl MovePicker {
    /// Picker for a main search node.
    ///
    /// `continuations` are the keys of the moves 1, 2, and 4 plies back.
    /// Quiets with a history score below `quiet_sort_limit` are not sorted.
    pub fn new(
        position: &Position,
        tt_move: Move,
        killers: Killers,
        counter_move: Move,
        continuations: [ContinuationKey; 3],
        quiet_sort_limit: i32,
    ) -> Self {
        let stage = if position.in_check() {
            Stage::EvasionTTMove
        } else {
            Stage::MainTTMove
        };

        Self::with_stage(position, stage, tt_move)
            .with_ordering(killers, counter_move, continuations, quiet_sort_limit)
    }

    /// Picker for a quiescence node: only captures and queen promotions, or every evasion while in check.
    pub fn qsearch(position: &Position, tt_move: Move) -> Self {
        if position.in_check() {
            return Self::with_stage(position, Stage::EvasionTTMove, tt_move);
        }

        let tt_move = if position.is_capture_or_promotion(tt_move) {
            tt_move
        } else {
            Move::NONE
        };
        Self::with_stage(position, Stage::QSearchTTMove, tt_move)
    }

    fn with_stage(position: &Position, stage: Stage, tt_move: Move) -> Self {
        let tt_move = if tt_move.is_ok() && position.pseudo_legal(tt_move) {
            tt_move
        } else {
            Move::NONE
        };

        Self {
            stage: if tt_move == Move::NONE {
                stage.next()
            } else {
                stage
            },
            tt_move,
            killers: Killers::default(),
            counter_move: Move::NONE,
            continuations: [None; 3],
            quiet_sort_limit: 0,
            moves: ArrayVec::new(),
            bad_captures: MoveList::new(),
            current: 0,
        }
    }

    fn with_ordering(
        mut self,
        killers: Killers,
        counter_move: Move,
        continuations: [ContinuationKey; 3],
        quiet_sort_limit: i32,
    ) -> Self {
        self.killers = killers;
        self.counter_move = counter_move;
        self.continuations = continuations;
        self.quiet_sort_limit = quiet_sort_limit;
        self
    }

    /// The TT move this picker accepted, or [`Move::NONE`] if it was missing or not pseudo-legal.
    #[inline(always)]
    pub fn tt_move(&self) -> Move {
        self.tt_move
    }

    /// The next move to search, or `None` once every stage is exhausted.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let pos = Position::default();
    /// let history = History::default();
    /// let tt_move = Move::from_uci(&pos, "e2e4");
    /// let mut picker = MovePicker::new(&pos, tt_move, Killers::default(), Move::NONE, [None; 3], 0);
    ///
    /// assert_eq!(picker.next_move(&pos, &history), Some(tt_move));
    /// let mut count = 1;
    /// while let Some(mv) = picker.next_move(&pos, &history) {
    ///     assert_ne!(mv, tt_move);
    ///     count += 1;
    /// }
    /// assert_eq!(count, 20);
    /// ```
    pub fn next_move(&mut self, position: &Position, history: &History) -> Option<Move> {
        loop {
            match self.stage {
                Stage::MainTTMove | Stage::QSearchTTMove | Stage::EvasionTTMove => {
                    self.stage = self.stage.next();
                    return Some(self.tt_move);
                }

                Stage::CapturesInit | Stage::QSearchCapturesInit => {
                    self.generate_captures(position);
                    self.stage = self.stage.next();
                }

                Stage::GoodCaptures => {
                    while let Some(mv) = self.pick_best() {
                        if mv == self.tt_move {
                            continue;
                        }
                        if position.see_sign(mv) >= 0 {
                            return Some(mv);
                        }
                        self.bad_captures.push(mv);
                    }
                    self.stage = self.stage.next();
                }

                Stage::FirstKiller | Stage::SecondKiller => {
                    let index = (self.stage == Stage::SecondKiller) as usize;
                    self.stage = self.stage.next();

                    let killer = self.killers[index];
                    if self.is_refutation_candidate(position, killer) {
                        return Some(killer);
                    }
                    // Left for the quiets stage, if it generates it at all
                    self.killers[index] = Move::NONE;
                }

                Stage::CounterMove => {
                    self.stage = self.stage.next();

                    let counter = self.counter_move;
                    if counter != self.killers[0]
                        && counter != self.killers[1]
                        && self.is_refutation_candidate(position, counter)
                    {
                        return Some(counter);
                    }
                    self.counter_move = Move::NONE;
                }

                Stage::QuietsInit => {
                    self.generate_quiets(position, history);
                    self.stage = self.stage.next();
                }

                Stage::Quiets => {
                    while self.current < self.moves.len() {
                        let mv = self.moves[self.current].mv;
                        self.current += 1;

                        if mv != self.tt_move
                            && mv != self.killers[0]
                            && mv != self.killers[1]
                            && mv != self.counter_move
                        {
                            return Some(mv);
                        }
                    }
                    self.stage = self.stage.next();
                    self.current = 0;
                }

                Stage::BadCaptures => {
                    if self.current < self.bad_captures.len() {
                        self.current += 1;
                        return Some(self.bad_captures[self.current - 1]);
                    }
                    self.stage = Stage::Done;
                }

                Stage::QSearchCaptures | Stage::Evasions => {
                    while let Some(mv) = self.pick_best() {
                        if mv != self.tt_move {
                            return Some(mv);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::EvasionsInit => {
                    self.generate_evasions(position, history);
                    self.stage = self.stage.next();
                }

                Stage::Done => return None,
            }
        }
    }

    /// Whether a killer or counter move can be searched as-is: a quiet, pseudo-legal move that isn't the TT move.
    #[inline(always)]
    fn is_refutation_candidate(&self, position: &Position, mv: Move) -> bool {
        mv != Move::NONE
            && mv != self.tt_move
            && mv.is_ok()
            && !position.is_capture_or_promotion(mv)
            && position.pseudo_legal(mv)
    }

    /// Swaps the best remaining move to the front of the unvisited moves and returns it.
    #[inline(always)]
    fn pick_best(&mut self) -> Option<Move> {
        let remaining = self.moves.get(self.current..)?;
        let best = remaining
            .iter()
            .enumerate()
            .max_by_key(|(i, scored)| (scored.score, std::cmp::Reverse(*i)))?
            .0;

        self.moves.swap(self.current, self.current + best);
        self.current += 1;
        Some(self.moves[self.current - 1].mv)
    }

    fn load(&mut self, moves: MoveList, score: impl Fn(Move) -> i32) {
        self.moves.clear();
        self.current = 0;
        self.moves.extend(moves.into_iter().map(|mv| ScoredMove {
            mv,
            score: score(mv),
        }));
    }

    fn generate_captures(&mut self, position: &Position) {
        let mut moves = MoveList::new();
        generate::<Captures>(position, &mut moves);
        self.load(moves, |mv| mvv_lva(position, mv));
    }

    fn generate_quiets(&mut self, position: &Position, history: &History) {
        let mut moves = MoveList::new();
        generate::<Quiets>(position, &mut moves);

        let color = position.side_to_move();
        let continuations = self.continuations;
        self.load(moves, |mv| match position.moved_piece(mv) {
            Some(piece) => history.quiet_score(color, mv, piece, &continuations),
            None => 0,
        });

        partial_insertion_sort(&mut self.moves, self.quiet_sort_limit);
    }

    fn generate_evasions(&mut self, position: &Position, history: &History) {
        let mut moves = MoveList::new();
        generate::<Evasions>(position, &mut moves);

        let color = position.side_to_move();
        self.load(moves, |mv| {
            let see = position.see_sign(mv);
            if see < 0 {
                see - LOSING_EVASION_PENALTY
            } else if position.is_capture(mv) {
                mvv_lva(position, mv)
            } else {
                history.butterfly.get(color, mv)
            }
        });
    }
}

/// Most Valuable Victim - Least Valuable Attacker, with promotions counting as capturing the promotion's gain.
///
/// See <https://www.chessprogramming.org/MVV-LVA>.
fn mvv_lva(position: &Position, mv: Move) -> i32 {
    let value = |kind: Option<PieceKind>| kind.map_or(0, |kind| kind.value());
    let victim = value(position.piece_at(mv.to()).map(|p| p.kind()));
    let attacker = value(position.moved_piece(mv).map(|p| p.kind()));
    let pawn = PieceKind::Pawn.value();

    victim - attacker
        + match mv.kind() {
            MoveKind::EnPassant => pawn,
            MoveKind::Promotion => value(mv.promotion()) - pawn,
            _ => 0,
        }
}

/// Sorts moves scoring at least `limit` to the front, in descending order. Everything else keeps no particular order.
fn partial_insertion_sort(moves: &mut [ScoredMove], limit: i32) {
    let mut sorted_end = 0;

    for p in 1..moves.len() {
        if moves[p].score < limit {
            continue;
        }

        let tmp = moves[p];
        sorted_end += 1;
        moves[p] = moves[sorted_end];

        let mut q = sorted_end;
        while q > 0 && moves[q - 1].score < tmp.score {
            moves[q] = moves[q - 1];
            q -= 1;
        }
        moves[q] = tmp;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    const POSITIONS: &[&str] = &[
        FEN_STARTPOS,
        FEN_KIWIPETE,
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        // In check
        "4k3/8/8/8/1b6/8/4r3/R3K2R w KQ - 0 1",
        "8/8/8/3k4/3pP3/8/8/4K3 b - e3 0 1",
    ];

    fn all_pseudo_legal(position: &Position) -> Vec<Move> {
        let mut moves = if position.in_check() {
            position.pseudo_legal_moves::<Evasions>().to_vec()
        } else {
            position.pseudo_legal_moves::<NonEvasions>().to_vec()
        };
        moves.sort_unstable();
        moves
    }

    fn drain(picker: &mut MovePicker, position: &Position, history: &History) -> Vec<Move> {
        std::iter::from_fn(|| picker.next_move(position, history)).collect()
    }

    #[test]
    fn test_every_move_exactly_once() {
        let history = History::default();

        for fen in POSITIONS {
            let pos = Position::from_fen(fen).unwrap();
            let expected = all_pseudo_legal(&pos);

            // Try a few different "hints" taken from the position's own moves
            for hint in [0, 1, expected.len() / 2, expected.len() - 1] {
                let tt_move = expected[hint % expected.len()];
                let killers = {
                    let mut k = Killers::default();
                    k.push(expected[(hint + 3) % expected.len()]);
                    k.push(expected[(hint + 5) % expected.len()]);
                    k
                };
                let counter = expected[(hint + 7) % expected.len()];

                let mut picker = MovePicker::new(&pos, tt_move, killers, counter, [None; 3], -4000);
                let mut picked = drain(&mut picker, &pos, &history);
                picked.sort_unstable();
                assert_eq!(picked, expected, "{fen} with hint {hint}");
            }
        }
    }

    #[test]
    fn test_captures_come_first() {
        let pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        let history = History::default();
        let mut picker = MovePicker::new(&pos, Move::NONE, Killers::default(), Move::NONE, [None; 3], 0);

        let picked = drain(&mut picker, &pos, &history);
        let first_quiet = picked.iter().position(|&mv| !pos.is_capture(mv)).unwrap();
        assert!(first_quiet > 0);

        // Every capture before the first quiet is a non-losing one
        for &mv in &picked[..first_quiet] {
            assert!(pos.is_capture(mv));
            assert!(pos.see_sign(mv) >= 0, "{mv}");
        }
    }

    #[test]
    fn test_illegal_tt_move_is_ignored() {
        let pos = Position::default();
        let history = History::default();
        let bogus = Move::new(Square::E2, Square::E5, MoveKind::Normal);

        let mut picker = MovePicker::new(&pos, bogus, Killers::default(), Move::NONE, [None; 3], 0);
        assert_eq!(picker.tt_move(), Move::NONE);
        let picked = drain(&mut picker, &pos, &history);
        assert_eq!(picked.len(), 20);
        assert!(!picked.contains(&bogus));
    }

    #[test]
    fn test_pinned_tt_move_is_returned() {
        // The knight is pinned, so its move is pseudo-legal but not legal
        let pos = Position::from_fen("4k3/4r3/8/8/8/8/4N3/4K3 w - - 0 1").unwrap();
        let history = History::default();
        let pinned_move = Move::new(Square::E2, Square::C3, MoveKind::Normal);
        assert!(!pos.is_legal(pinned_move, pos.pinned(Color::White)));

        let mut picker = MovePicker::new(&pos, pinned_move, Killers::default(), Move::NONE, [None; 3], 0);
        assert_eq!(picker.next_move(&pos, &history), Some(pinned_move));
        assert!(!drain(&mut picker, &pos, &history).contains(&pinned_move));
    }

    #[test]
    fn test_qsearch_only_captures() {
        let pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        let history = History::default();
        let quiet = Move::new(Square::A2, Square::A3, MoveKind::Normal);

        let mut picker = MovePicker::qsearch(&pos, quiet);
        assert_eq!(picker.tt_move(), Move::NONE);

        let picked = drain(&mut picker, &pos, &history);
        let mut expected = pos.pseudo_legal_moves::<Captures>().to_vec();
        expected.sort_unstable();
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, expected);

        // MVV-LVA order: the best capture is handed out first
        let scores = picked.iter().map(|&mv| mvv_lva(&pos, mv)).collect::<Vec<_>>();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_evasions_in_qsearch() {
        let pos = Position::from_fen("8/8/8/3k4/3pP3/8/8/4K3 b - e3 0 1").unwrap();
        let history = History::default();
        let mut picker = MovePicker::qsearch(&pos, Move::NONE);

        let mut picked = drain(&mut picker, &pos, &history);
        picked.sort_unstable();
        assert_eq!(picked, all_pseudo_legal(&pos));
    }

    #[test]
    fn test_partial_insertion_sort() {
        let mut moves = [5, -10, 30, -50, 20]
            .map(|score| ScoredMove {
                mv: Move::NONE,
                score,
            })
            .to_vec();

        partial_insertion_sort(&mut moves, 0);
        let scores = moves.iter().map(|m| m.score).collect::<Vec<_>>();
        assert_eq!(&scores[..3], &[30, 20, 5]);
    }
}
