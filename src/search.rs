/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    fmt,
    sync::{atomic::Ordering, LazyLock},
    time::Duration,
};

use arrayvec::ArrayVec;
use log::trace;

use crate::{
    stat_bonus, tune, Bound, ContinuationKey, Killers, Move, MoveKind, MovePicker, Position,
    Score, ScoreInfo, SearchShared, ThreadData, MAX_PLY,
};

/// How many entries below the root the search stack reaches back.
const STACK_OFFSET: usize = 4;

/// Helper threads skip depths according to these tables, so that they don't all search the same depth at once.
const SKIP_SIZE: [i32; 12] = [1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3];
const SKIP_PHASE: [i32; 12] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5];

/// Late move reductions, indexed by `[is_pv][improving][depth][move_count]`.
static REDUCTIONS: LazyLock<[[[[i32; 64]; 64]; 2]; 2]> = LazyLock::new(|| {
    let mut table = [[[[0; 64]; 64]; 2]; 2];

    for improving in 0..2 {
        for depth in 1..64 {
            for move_count in 1..64 {
                let r = ((depth as f64).ln() * (move_count as f64).ln() / 2.45).round() as i32;

                table[1][improving][depth][move_count] = (r - 1).max(0);
                table[0][improving][depth][move_count] =
                    if improving == 0 && r >= 2 { r + 1 } else { r };
            }
        }
    }

    table
});

/// A principal variation.
type PvLine = ArrayVec<Move, MAX_PLY>;

/// Constraints on a search. Anything left as `None` is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimits {
    /// Stop after completing this depth.
    pub depth: Option<i32>,

    /// Stop after searching (roughly) this many nodes.
    pub nodes: Option<u64>,

    /// Search exactly this long.
    pub movetime: Option<Duration>,

    pub wtime: Option<Duration>,
    pub btime: Option<Duration>,
    pub winc: Option<Duration>,
    pub binc: Option<Duration>,

    /// Moves until the next time control.
    pub movestogo: Option<u32>,

    /// Search until told to stop.
    pub infinite: bool,
}

impl SearchLimits {
    /// Limits for a search that ends after completing `depth`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(SearchLimits::depth(4).depth, Some(4));
    /// ```
    pub fn depth(depth: i32) -> Self {
        Self {
            depth: Some(depth),
            ..Default::default()
        }
    }
}

/// Progress of a search, reported after every completed depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInfo {
    pub depth: i32,
    pub seldepth: usize,
    pub time: Duration,
    pub nodes: u64,
    pub nps: u64,
    pub score: ScoreInfo,
    pub pv: Vec<Move>,

    /// Permille of the transposition table in use.
    pub hashfull: usize,
}

impl fmt::Display for SearchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} time {} pv",
            self.depth,
            self.seldepth,
            self.score,
            self.nodes,
            self.nps,
            self.hashfull,
            self.time.as_millis(),
        )?;

        for mv in &self.pv {
            write!(f, " {mv}")?;
        }

        Ok(())
    }
}

/// The result of a search, containing the best move found, score, and total nodes searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Best move found, or [`Move::NONE`] if there are no legal moves.
    pub best_move: Move,

    /// The expected reply to `best_move`, if the principal variation has one.
    pub ponder: Option<Move>,

    /// Score of `best_move`, from the perspective of the side to move.
    pub score: Score,

    /// Deepest fully completed iteration.
    pub depth: i32,

    /// Total nodes searched by all threads.
    pub nodes: u64,

    pub pv: Vec<Move>,
}

impl Default for SearchResult {
    /// A default search result should initialize to a *very bad* value,
    /// since there isn't a move to play.
    #[inline(always)]
    fn default() -> Self {
        Self {
            best_move: Move::NONE,
            ponder: None,
            score: -Score::INF,
            depth: 0,
            nodes: 0,
            pv: Vec::new(),
        }
    }
}

/// A legal move at the root, with its score from the current and the previous iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMove {
    pub mv: Move,

    /// [`-Score::INF`](Score::INF) for every move except the best one of the current iteration.
    pub score: Score,
    pub previous_score: Score,
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> Self {
        Self {
            mv,
            score: -Score::INF,
            previous_score: -Score::INF,
            pv: vec![mv],
        }
    }
}

/// Stable sort by score, then by the previous iteration's score, best first.
fn sort_root_moves(root_moves: &mut [RootMove]) {
    root_moves.sort_by(|a, b| (b.score, b.previous_score).cmp(&(a.score, a.previous_score)));
}

/// Per-ply search state.
#[derive(Debug, Clone, Copy, Default)]
struct StackEntry {
    killers: Killers,
    current_move: Move,

    /// Piece and destination of `current_move`. `None` for null moves and before any move is made.
    continuation: ContinuationKey,
    static_eval: Score,
    move_count: i32,
    stat_score: i32,

    /// Set while this node is re-searched for verification or internal iterative deepening.
    skip_early_pruning: bool,
}

/// Executes a search on one thread.
///
/// Each thread searches its own copy of the position, sharing only the transposition table and stop flag with the others.
pub struct Search<'a> {
    id: usize,
    shared: &'a SearchShared,
    data: &'a mut ThreadData,
    position: Position,
    root_moves: Vec<RootMove>,
    stack: Vec<StackEntry>,
    pv: Vec<PvLine>,
    nodes: u64,
    seldepth: usize,
    completed_depth: i32,
}

impl<'a> Search<'a> {
    /// Prepares thread `id` to search `position`. Thread `0` is the main thread: it alone reports progress and watches the clock.
    pub fn new(
        id: usize,
        position: Position,
        shared: &'a SearchShared,
        data: &'a mut ThreadData,
    ) -> Self {
        let root_moves = position.legal_moves().into_iter().map(RootMove::new).collect();

        Self {
            id,
            shared,
            data,
            position,
            root_moves,
            stack: vec![StackEntry::default(); MAX_PLY + STACK_OFFSET + 3],
            pv: vec![PvLine::new(); MAX_PLY + 2],
            nodes: 0,
            seldepth: 0,
            completed_depth: 0,
        }
    }

    #[inline(always)]
    fn is_main(&self) -> bool {
        self.id == 0
    }

    #[inline(always)]
    fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn ss(&mut self, ply: usize) -> &mut StackEntry {
        &mut self.stack[ply + STACK_OFFSET]
    }

    /// The stack entry `n` plies above `ply`.
    #[inline(always)]
    fn back(&self, ply: usize, n: usize) -> &StackEntry {
        &self.stack[ply + STACK_OFFSET - n]
    }

    /// Keys of the moves 1, 2, and 4 plies before the node at `ply`.
    #[inline(always)]
    fn continuations(&self, ply: usize) -> [ContinuationKey; 3] {
        [
            self.back(ply, 1).continuation,
            self.back(ply, 2).continuation,
            self.back(ply, 4).continuation,
        ]
    }

    #[inline(always)]
    fn draw_score(&self) -> Score {
        self.shared.draw_values[self.position.side_to_move()]
    }

    #[inline(always)]
    fn reduction<const PV: bool>(improving: bool, depth: i32, move_count: i32) -> i32 {
        let depth = depth.clamp(0, 63) as usize;
        let move_count = move_count.clamp(0, 63) as usize;
        REDUCTIONS[PV as usize][improving as usize][depth][move_count]
    }

    /// Counts a node, and polls the stop conditions on the main thread.
    #[inline(always)]
    fn visit(&mut self, ply: usize) {
        self.nodes += 1;
        self.shared.nodes[self.id].store(self.nodes, Ordering::Relaxed);
        self.seldepth = self.seldepth.max(ply);

        if self.is_main() && self.nodes % 1024 == 0 {
            let out_of_nodes = self
                .shared
                .limits
                .nodes
                .is_some_and(|limit| self.shared.total_nodes() >= limit);

            if out_of_nodes || self.shared.time.past_maximum() {
                self.shared.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Start the search, returning its results once it finishes or is stopped.
    pub fn start(mut self) -> SearchResult {
        if self.root_moves.is_empty() {
            let score = if self.position.in_check() {
                Score::mated_in(0)
            } else {
                self.draw_score()
            };

            return SearchResult {
                score,
                ..Default::default()
            };
        }

        let best = self.iterative_deepening();

        SearchResult {
            best_move: best.mv,
            ponder: best.pv.get(1).copied(),
            score: best.score,
            depth: self.completed_depth,
            nodes: self.shared.total_nodes(),
            pv: best.pv,
        }
    }

    /// Performs [iterative deepening](https://www.chessprogramming.org/Iterative_Deepening) (ID) on the root position.
    ///
    /// Returns the best root move of the last completed iteration.
    /// An iteration cut short by the stop flag is discarded.
    fn iterative_deepening(&mut self) -> RootMove {
        let game_ply = self.position.game_ply() as i32;
        let max_depth = self.shared.limits.depth.filter(|_| self.is_main());
        let mut best = self.root_moves[0].clone();
        let mut depth = 1;

        while depth < MAX_PLY as i32
            && !self.is_stopped()
            && max_depth.map_or(true, |max| depth <= max)
        {
            if !self.is_main() {
                let s = (self.id - 1) % SKIP_SIZE.len();
                if (depth + game_ply + SKIP_PHASE[s] / SKIP_SIZE[s]) % 2 != 0 {
                    depth += 1;
                    continue;
                }
            }

            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }

            sort_root_moves(&mut self.root_moves);
            self.search_root(depth);
            sort_root_moves(&mut self.root_moves);

            if self.is_stopped() {
                break;
            }

            best = self.root_moves[0].clone();
            self.completed_depth = depth;

            if self.is_main() {
                let info = self.info(depth);
                trace!("{info}");
                self.shared.reporter.on_iteration(&info);

                let time = &self.shared.time;
                if time.use_time() && (self.root_moves.len() == 1 || time.past_optimum()) {
                    self.shared.stop.store(true, Ordering::Relaxed);
                }
            }

            depth += 1;
        }

        best
    }

    fn info(&self, depth: i32) -> SearchInfo {
        let time = self.shared.time.elapsed();
        let nodes = self.shared.total_nodes();
        let nps = (nodes as f64 / time.as_secs_f64().max(0.001)) as u64;
        let best = &self.root_moves[0];

        SearchInfo {
            depth,
            seldepth: self.seldepth,
            time,
            nodes,
            nps,
            score: best.score.into(),
            pv: best.pv.clone(),
            hashfull: self.shared.ttable.hashfull(),
        }
    }

    /// Searches every root move with a full window, recording each move's score and principal variation.
    fn search_root(&mut self, depth: i32) -> Score {
        let (mut alpha, beta) = (-Score::INF, Score::INF);
        let ply = 0;
        self.visit(ply);

        let ss = self.ss(ply);
        ss.move_count = 0;
        ss.stat_score = 0;
        ss.current_move = Move::NONE;
        ss.continuation = None;
        self.ss(ply + 2).killers.clear();

        let key = self.position.key();
        let probe = self.shared.ttable.probe(key);
        let tt_move = self.root_moves[0].mv;
        let pinned = self.position.pinned(self.position.side_to_move());
        let killers = self.ss(ply).killers;

        let mut picker = MovePicker::new(
            &self.position,
            tt_move,
            killers,
            Move::NONE,
            self.continuations(ply),
            self.shared.params.quiet_sort_limit(depth),
        );

        let mut best_score = -Score::INF;
        let mut best_move = Move::NONE;
        let mut bound = Bound::Upper;
        let mut legal = 0;

        while let Some(mv) = picker.next_move(&self.position, &self.data.history) {
            if !self.position.is_legal(mv, pinned) {
                continue;
            }
            let Some(piece) = self.position.moved_piece(mv) else {
                continue;
            };

            self.position.make_move(mv);
            legal += 1;
            let ss = self.ss(ply);
            ss.move_count = legal;
            ss.current_move = mv;
            ss.continuation = Some((piece, mv.to()));
            self.pv[ply + 1].clear();

            let mut score;
            if legal == 1 {
                score = -self.negamax::<true>(depth - 1, -beta, -alpha, ply + 1, true);
            } else {
                score = -self.negamax::<false>(depth - 1, -alpha - 1, -alpha, ply + 1, true);
                if score > alpha {
                    self.pv[ply + 1].clear();
                    score = -self.negamax::<true>(depth - 1, -beta, -alpha, ply + 1, true);
                }
            }

            self.position.unmake_move(mv);

            if self.is_stopped() {
                break;
            }

            let child_pv = self.pv[ply + 1].clone();
            let Some(rm) = self.root_moves.iter_mut().find(|rm| rm.mv == mv) else {
                continue;
            };

            if score > best_score {
                best_score = score;
                best_move = mv;
                rm.score = score;
                rm.pv.truncate(1);
                rm.pv.extend(child_pv);
            } else {
                rm.score = -Score::INF;
            }

            if score > alpha {
                if score >= beta {
                    bound = Bound::Lower;
                    alpha = beta;
                    break;
                }
                alpha = score;
                bound = Bound::Exact;
            }
        }

        if !self.is_stopped() {
            self.shared
                .ttable
                .store(&probe, key, depth, alpha.to_tt(ply), best_move, bound);
        }

        alpha
    }

    /// Primary location of search logic.
    ///
    /// Uses the [negamax](https://www.chessprogramming.org/Negamax) algorithm in a fail-hard alpha-beta framework,
    /// with principal variation search. `PV` is set on nodes that may end up on the principal variation.
    fn negamax<const PV: bool>(
        &mut self,
        depth: i32,
        mut alpha: Score,
        mut beta: Score,
        ply: usize,
        allow_null: bool,
    ) -> Score {
        if depth <= 0 {
            return self.qsearch::<PV>(alpha, beta, ply);
        }

        self.visit(ply);
        let params = self.shared.params;
        let us = self.position.side_to_move();
        if PV {
            self.pv[ply].clear();
        }

        if self.is_stopped() || self.position.is_draw(ply) || ply >= MAX_PLY {
            return self.draw_score();
        }

        let ss = self.ss(ply);
        ss.move_count = 0;
        ss.stat_score = 0;
        ss.current_move = Move::NONE;
        ss.continuation = None;
        self.ss(ply + 1).skip_early_pruning = false;
        self.ss(ply + 2).killers.clear();

        let prev_move = self.back(ply, 1).current_move;
        let prev_key = self.back(ply, 1).continuation;

        // Mate distance pruning
        alpha = alpha.max(Score::mated_in(ply));
        beta = beta.min(Score::mate_in(ply + 1));
        if alpha >= beta {
            return alpha;
        }

        let key = self.position.key();
        let mut probe = self.shared.ttable.probe(key);
        let mut tt_move = if probe.hit { probe.entry.mv() } else { Move::NONE };
        let tt_score = if probe.hit {
            probe.entry.score().from_tt(ply)
        } else {
            Score::DRAW
        };

        // Transposition table cutoff
        if !PV && probe.hit && probe.entry.depth() >= depth {
            let needed = if tt_score >= beta {
                Bound::Lower
            } else {
                Bound::Upper
            };

            if probe.entry.bound().includes(needed) {
                if tt_move.is_ok() && self.position.pseudo_legal(tt_move) {
                    self.reward_tt_move(ply, depth, tt_move, tt_score >= beta, prev_key);
                }
                return tt_score;
            }
        }

        let in_check = self.position.in_check();
        let static_eval = if in_check {
            Score::DRAW
        } else if prev_move != Move::NULL {
            self.data.evaluator.evaluate(&self.position)
        } else {
            -self.back(ply, 1).static_eval + 2 * tune::tempo!()
        };
        self.ss(ply).static_eval = static_eval;

        if !in_check && !self.ss(ply).skip_early_pruning {
            // Razoring
            if !PV
                && depth < params.razor_max_depth
                && static_eval + params.razor_margin(depth) <= alpha
                && tt_move == Move::NONE
            {
                if depth <= 1 {
                    return self.qsearch::<false>(alpha, beta, ply);
                }

                let razor_alpha = alpha - params.razor_margin(depth);
                let score = self.qsearch::<false>(razor_alpha, razor_alpha + 1, ply);
                if score <= razor_alpha {
                    return score;
                }
            }

            // Reverse futility pruning
            if depth < params.futility_max_depth
                && static_eval - params.futility_factor * depth >= beta
                && static_eval < Score::KNOWN_WIN
                && self.position.non_pawn_material(us) > 0
            {
                return static_eval;
            }

            // Null move pruning
            if allow_null && !PV && depth > params.null_move_min_depth {
                if let Some(score) = self.null_move(depth, beta, ply) {
                    return score;
                }
            }

            // Internal iterative deepening
            if depth >= params.iid_min_depth
                && tt_move == Move::NONE
                && (PV || static_eval + params.iid_margin >= beta)
            {
                self.ss(ply).skip_early_pruning = true;
                self.negamax::<PV>(params.iid_depth(depth), alpha, beta, ply, false);
                self.ss(ply).skip_early_pruning = false;

                probe = self.shared.ttable.probe(key);
                tt_move = if probe.hit { probe.entry.mv() } else { Move::NONE };
            }
        }

        let prev_static_eval = self.back(ply, 2).static_eval;
        let improving = static_eval >= prev_static_eval || static_eval == 0 || prev_static_eval == 0;
        let tt_move_capture = tt_move.is_ok() && self.position.is_capture_or_promotion(tt_move);
        let tt_exact = probe.hit && probe.entry.bound() == Bound::Exact;
        let continuations = self.continuations(ply);
        let pinned = self.position.pinned(us);
        let killers = self.ss(ply).killers;

        let mut picker = MovePicker::new(
            &self.position,
            tt_move,
            killers,
            self.data.history.counter_moves.get(prev_key),
            continuations,
            params.quiet_sort_limit(depth),
        );

        let mut best_score = -Score::INF;
        let mut best_move = Move::NONE;
        let mut bound = Bound::Upper;
        let mut legal = 0;
        let mut quiets = ArrayVec::<Move, 64>::new();

        while let Some(mv) = picker.next_move(&self.position, &self.data.history) {
            if !self.position.is_legal(mv, pinned) {
                continue;
            }
            let Some(piece) = self.position.moved_piece(mv) else {
                continue;
            };

            self.shared.ttable.prefetch(self.position.next_key(mv));
            let capture_or_promotion = self.position.is_capture_or_promotion(mv);

            self.position.make_move(mv);
            legal += 1;
            let gives_check = self.position.in_check();
            let ss = self.ss(ply);
            ss.move_count = legal;
            ss.current_move = mv;
            ss.continuation = Some((piece, mv.to()));
            if PV {
                self.pv[ply + 1].clear();
            }

            // Check extension
            let new_depth = depth - 1 + gives_check as i32;
            let mut score = -Score::INF;

            let full_depth_search = if depth >= params.lmr_min_depth
                && legal > 1
                && !capture_or_promotion
            {
                // Late move reductions
                let mut r = Self::reduction::<PV>(improving, depth, legal);

                if self.back(ply, 1).move_count > params.lmr_move_count_threshold {
                    r -= 1;
                }
                if tt_exact {
                    r -= 1;
                }
                if tt_move_capture {
                    r += 1;
                }

                // Moves that escape a capture
                if r != 0
                    && mv.kind() == MoveKind::Normal
                    && !self.position.see_ge(mv.reversed(), 0)
                {
                    r -= 2;
                }

                let stat_score = self.data.history.quiet_score(us, mv, piece, &continuations)
                    - params.lmr_stat_offset;
                self.ss(ply).stat_score = stat_score;

                let prev_stat_score = self.back(ply, 1).stat_score;
                if stat_score >= 0 && prev_stat_score < 0 {
                    r -= 1;
                } else if prev_stat_score >= 0 && stat_score < 0 {
                    r += 1;
                }

                r = (r - stat_score / params.lmr_stat_divisor).max(0);

                let d = (new_depth - r).max(1);
                score = -self.negamax::<false>(d, -alpha - 1, -alpha, ply + 1, true);
                score > alpha && d != new_depth
            } else {
                !PV || legal > 1
            };

            if full_depth_search {
                score = -self.negamax::<false>(new_depth, -alpha - 1, -alpha, ply + 1, true);
            }

            if PV && (legal == 1 || (score > alpha && score < beta)) {
                self.pv[ply + 1].clear();
                score = -self.negamax::<true>(new_depth, -beta, -alpha, ply + 1, true);
            }

            self.position.unmake_move(mv);

            if self.is_stopped() {
                return Score::DRAW;
            }

            if !capture_or_promotion && !quiets.is_full() {
                quiets.push(mv);
            }

            if score > best_score {
                best_score = score;

                if score > alpha {
                    best_move = mv;
                    if PV {
                        self.update_pv(ply, mv);
                    }
                    if score >= beta {
                        bound = Bound::Lower;
                        alpha = beta;
                        break;
                    }
                    alpha = score;
                    bound = Bound::Exact;
                }
            }
        }

        let captured = self.position.captured_piece();
        if legal == 0 {
            alpha = if in_check {
                Score::mated_in(ply)
            } else {
                self.draw_score()
            };
        } else if best_move != Move::NONE {
            if !self.position.is_capture_or_promotion(best_move) {
                self.update_quiet_stats(ply, best_move, &quiets, stat_bonus(depth));
            }

            // The previous move was refuted right away
            if self.back(ply, 1).move_count == 1 && captured.is_none() {
                self.update_previous_continuations(ply, prev_key, -stat_bonus(depth + 1));
            }
        } else if depth >= 3 && captured.is_none() && prev_move.is_ok() {
            // Nothing beat alpha here, so the previous move was a good one
            self.update_previous_continuations(ply, prev_key, stat_bonus(depth));
        }

        self.shared
            .ttable
            .store(&probe, key, depth, alpha.to_tt(ply), best_move, bound);

        alpha
    }

    /// Passes the turn and searches with reduced depth. Returns the score to cut off with, if the position is still good enough.
    fn null_move(&mut self, depth: i32, beta: Score, ply: usize) -> Option<Score> {
        let params = self.shared.params;
        let r = params.null_move_reduction(depth);

        let ss = self.ss(ply);
        ss.current_move = Move::NULL;
        ss.continuation = None;

        self.position.make_null_move();
        self.ss(ply + 1).skip_early_pruning = true;
        let mut score = if depth - r - 1 > 0 {
            -self.negamax::<false>(depth - r - 1, -beta, -beta + 1, ply + 1, false)
        } else {
            -self.qsearch::<false>(-beta, -beta + 1, ply + 1)
        };
        self.ss(ply + 1).skip_early_pruning = false;
        self.position.undo_null_move();

        if score < beta || self.is_stopped() {
            return None;
        }

        // Don't return unproven mates
        if score >= Score::MATE_IN_MAX_PLY {
            score = beta;
        }

        if depth < params.null_move_verification_depth && beta.abs() < Score::KNOWN_WIN {
            return Some(score);
        }

        // Verification search, guarding against zugzwang
        self.ss(ply).skip_early_pruning = true;
        let verified = if depth - r < 1 {
            self.qsearch::<false>(beta - 1, beta, ply)
        } else {
            self.negamax::<false>(depth - r, beta - 1, beta, ply, false)
        };
        self.ss(ply).skip_early_pruning = false;

        (verified >= beta).then_some(score)
    }

    /// [Quiescence search](https://www.chessprogramming.org/Quiescence_Search): only captures and queen promotions,
    /// or every evasion while in check, until the position is quiet.
    fn qsearch<const PV: bool>(&mut self, mut alpha: Score, beta: Score, ply: usize) -> Score {
        self.visit(ply);
        let params = self.shared.params;
        let us = self.position.side_to_move();
        if PV {
            self.pv[ply].clear();
        }

        if self.is_stopped() || self.position.is_draw(ply) || ply >= MAX_PLY {
            return self.draw_score();
        }

        let ss = self.ss(ply);
        ss.current_move = Move::NONE;
        ss.continuation = None;

        let key = self.position.key();
        let probe = self.shared.ttable.probe(key);
        let tt_move = if probe.hit { probe.entry.mv() } else { Move::NONE };

        if probe.hit {
            let tt_score = probe.entry.score().from_tt(ply);
            let needed = if PV {
                Bound::Exact
            } else if tt_score >= beta {
                Bound::Lower
            } else {
                Bound::Upper
            };

            if probe.entry.bound() == needed || (!PV && probe.entry.bound() == Bound::Exact) {
                return tt_score;
            }
        }

        let in_check = self.position.in_check();
        let stand_pat = if in_check {
            self.ss(ply).static_eval = Score::DRAW;
            -Score::INF
        } else {
            let eval = self.data.evaluator.evaluate(&self.position);
            self.ss(ply).static_eval = eval;

            if eval >= beta {
                self.shared
                    .ttable
                    .store(&probe, key, 0, eval.to_tt(ply), Move::NONE, Bound::Lower);
                return eval;
            }

            if PV && eval > alpha {
                alpha = eval;
            }

            eval
        };

        let them = us.opponent();
        let pinned = self.position.pinned(us);
        let mut picker = MovePicker::qsearch(&self.position, tt_move);
        let mut best_move = Move::NONE;
        let mut bound = Bound::Upper;
        let mut legal = 0;

        while let Some(mv) = picker.next_move(&self.position, &self.data.history) {
            if !self.position.is_legal(mv, pinned) {
                continue;
            }
            legal += 1;

            if !in_check {
                // Delta pruning
                let victim = self
                    .position
                    .piece_at(mv.to())
                    .map_or(0, |piece| piece.kind().value());

                if stand_pat + victim + params.delta_margin < alpha
                    && self.position.material(them) - victim > params.endgame_material
                    && !mv.is_promotion()
                {
                    continue;
                }

                // Losing captures
                if !PV && self.position.see_sign(mv) < 0 {
                    continue;
                }
            }

            self.shared.ttable.prefetch(self.position.next_key(mv));
            self.position.make_move(mv);
            self.ss(ply).current_move = mv;
            let score = -self.qsearch::<PV>(-beta, -alpha, ply + 1);
            self.position.unmake_move(mv);

            if self.is_stopped() {
                return Score::DRAW;
            }

            if score > alpha {
                best_move = mv;
                if PV {
                    self.update_pv(ply, mv);
                }
                if score >= beta {
                    bound = Bound::Lower;
                    alpha = beta;
                    break;
                }
                bound = Bound::Exact;
                alpha = score;
            }
        }

        if in_check && legal == 0 {
            return Score::mated_in(ply);
        }

        self.shared
            .ttable
            .store(&probe, key, 0, alpha.to_tt(ply), best_move, bound);

        alpha
    }

    /// Sets the PV at `ply` to `mv` followed by the PV of the child node.
    fn update_pv(&mut self, ply: usize, mv: Move) {
        let (head, tail) = self.pv.split_at_mut(ply + 1);
        let line = &mut head[ply];
        line.clear();
        line.push(mv);

        let room = line.remaining_capacity();
        line.extend(tail[0].iter().copied().take(room));
    }

    /// Statistics updates for a TT cutoff on a pseudo-legal `tt_move`.
    fn reward_tt_move(
        &mut self,
        ply: usize,
        depth: i32,
        tt_move: Move,
        fail_high: bool,
        prev_key: ContinuationKey,
    ) {
        let quiet = !self.position.is_capture_or_promotion(tt_move);

        if fail_high {
            if quiet {
                self.update_quiet_stats(ply, tt_move, &[], stat_bonus(depth));
            }
            if self.back(ply, 1).move_count == 1 && self.position.captured_piece().is_none() {
                self.update_previous_continuations(ply, prev_key, -stat_bonus(depth + 1));
            }
        } else if quiet {
            let penalty = -stat_bonus(depth);
            let us = self.position.side_to_move();
            self.data.history.butterfly.update(us, tt_move, penalty);

            if let Some(piece) = self.position.moved_piece(tt_move) {
                let continuations = self.continuations(ply);
                self.data
                    .history
                    .update_continuations(&continuations, piece, tt_move.to(), penalty);
            }
        }
    }

    /// Rewards the quiet `best` move that caused a cutoff at `ply`, and penalizes the other `quiets` that were tried before it.
    fn update_quiet_stats(&mut self, ply: usize, best: Move, quiets: &[Move], bonus: i32) {
        self.ss(ply).killers.push(best);

        let us = self.position.side_to_move();
        let continuations = self.continuations(ply);
        let prev_key = self.back(ply, 1).continuation;
        let history = &mut self.data.history;

        history.butterfly.update(us, best, bonus);
        if let Some(piece) = self.position.moved_piece(best) {
            history.update_continuations(&continuations, piece, best.to(), bonus);
        }

        history.counter_moves.set(prev_key, best);

        for &mv in quiets.iter().filter(|&&mv| mv != best) {
            history.butterfly.update(us, mv, -bonus);
            if let Some(piece) = self.position.moved_piece(mv) {
                history.update_continuations(&continuations, piece, mv.to(), -bonus);
            }
        }
    }

    /// Applies `bonus` to the continuation histories of the move that led to the node at `ply`.
    fn update_previous_continuations(&mut self, ply: usize, prev_key: ContinuationKey, bonus: i32) {
        let Some((piece, square)) = prev_key else {
            return;
        };

        let continuations = self.continuations(ply - 1);
        self.data
            .history
            .update_continuations(&continuations, piece, square, bonus);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::*;

    fn search(fen: &str, depth: i32) -> SearchResult {
        let position = Position::from_fen(fen).unwrap();
        let shared = SearchShared::new(
            &position,
            SearchLimits::depth(depth),
            1,
            Arc::new(TTable::new(4)),
            Arc::default(),
            &EngineConfig::default(),
            Arc::new(NullReporter),
        );
        let mut data = ThreadData::default();

        Search::new(0, position, &shared, &mut data).start()
    }

    fn ensure_is_mate_in(fen: &str, depth: i32, moves: i32) -> SearchResult {
        let res = search(fen, depth);
        assert!(res.score.is_mate(), "Search on {fen:?} produced result that is not mate.\nResult: {res:#?}");
        assert_eq!(
            res.score.moves_to_mate(),
            moves,
            "Search on {fen:?} produced result not mate in {moves}.\nResult: {res:#?}"
        );
        res
    }

    #[test]
    fn test_reductions_table() {
        // Shallow and early moves are never reduced
        assert_eq!(Search::reduction::<false>(true, 1, 10), 0);
        assert_eq!(Search::reduction::<false>(true, 10, 1), 0);

        // ln(10)^2 / 2.45 rounds to 2
        assert_eq!(Search::reduction::<false>(true, 10, 10), 2);
        assert_eq!(Search::reduction::<false>(false, 10, 10), 3);
        assert_eq!(Search::reduction::<true>(true, 10, 10), 1);

        // Clamped beyond the table
        assert_eq!(
            Search::reduction::<false>(true, 200, 200),
            Search::reduction::<false>(true, 63, 63)
        );
    }

    #[test]
    fn test_white_mate_in_1() {
        let res = ensure_is_mate_in("k7/8/KQ6/8/8/8/8/8 w - - 0 1", 3, 1);
        let after = {
            let mut pos = Position::from_fen("k7/8/KQ6/8/8/8/8/8 w - - 0 1").unwrap();
            pos.make_move(res.best_move);
            pos
        };
        assert!(after.in_check());
        assert!(!after.has_legal_move());
    }

    #[test]
    fn test_black_mated_in_1() {
        ensure_is_mate_in("1k6/8/KQ6/2Q5/8/8/8/8 b - - 0 1", 4, -1);
    }

    #[test]
    fn test_back_rank_mate() {
        let res = ensure_is_mate_in("6k1/5ppp/8/8/8/8/1Q6/K2R4 w - - 0 1", 5, 1);
        assert!(res.best_move == "d1d8" || res.best_move == "b2b8", "{res:#?}");
    }

    #[test]
    fn test_stalemate() {
        let res = search("k7/8/KQ6/8/8/8/8/8 b - - 0 1", 5);
        assert_eq!(res.best_move, Move::NONE);
        assert_eq!(res.best_move.to_string(), "0000");
        assert_eq!(res.score, Score(-tune::contempt!()));
    }

    #[test]
    fn test_checkmated_at_root() {
        let res = search("k7/1Q6/K7/8/8/8/8/8 b - - 0 1", 5);
        assert_eq!(res.best_move, Move::NONE);
        assert_eq!(res.score, Score::mated_in(0));
    }

    #[test]
    fn test_avoids_stalemating() {
        // Qb6 stalemates, Qb7 mates
        let res = search("k7/8/K7/8/8/8/1Q6/8 w - - 0 1", 4);
        let mut pos = Position::from_fen("k7/8/K7/8/8/8/1Q6/8 w - - 0 1").unwrap();
        pos.make_move(res.best_move);
        assert!(pos.in_check());
        assert!(res.score.is_mate());
    }

    #[test]
    fn test_wins_hanging_queen() {
        let res = search("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1", 4);
        assert_eq!(res.best_move, "d2d5");
        assert!(res.score > Score(300));
    }

    #[test]
    fn test_deterministic_single_thread() {
        for fen in [FEN_STARTPOS, FEN_KIWIPETE] {
            let first = search(fen, 5);
            let second = search(fen, 5);
            assert_eq!(first.best_move, second.best_move, "{fen}");
            assert_eq!(first.score, second.score, "{fen}");
            assert_eq!(first.nodes, second.nodes, "{fen}");
            assert_eq!(first.depth, 5);
        }
    }

    #[test]
    fn test_pv_is_legal() {
        let res = search(FEN_KIWIPETE, 5);
        assert_eq!(res.pv.first(), Some(&res.best_move));

        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        for mv in res.pv {
            assert!(pos.legal_moves().contains(&mv), "{mv} in {}", pos.to_fen());
            pos.make_move(mv);
        }
    }

    #[test]
    fn test_search_info_display() {
        let info = SearchInfo {
            depth: 3,
            seldepth: 5,
            time: Duration::from_millis(12),
            nodes: 345,
            nps: 28750,
            score: ScoreInfo::Centipawns(25),
            pv: vec![Move::new(Square::E2, Square::E4, MoveKind::Normal)],
            hashfull: 1,
        };
        assert_eq!(
            info.to_string(),
            "info depth 3 seldepth 5 score cp 25 nodes 345 nps 28750 hashfull 1 time 12 pv e2e4"
        );
    }

    #[test]
    fn test_root_move_ordering() {
        let mut moves = vec![
            RootMove::new(Move::new(Square::A2, Square::A3, MoveKind::Normal)),
            RootMove::new(Move::new(Square::B2, Square::B3, MoveKind::Normal)),
            RootMove::new(Move::new(Square::C2, Square::C3, MoveKind::Normal)),
        ];
        moves[1].previous_score = Score(50);
        moves[2].score = Score(10);

        sort_root_moves(&mut moves);
        let order = moves.iter().map(|rm| rm.mv.to_string()).collect::<Vec<_>>();
        assert_eq!(order, ["c2c3", "b2b3", "a2a3"]);
    }
}
