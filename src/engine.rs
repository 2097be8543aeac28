/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use log::debug;

use crate::{
    tune, EvalTrace, Evaluator, Move, NullReporter, Position, Score, SearchLimits, SearchParams,
    SearchReporter, SearchResult, TTable, ThreadPool, BENCHMARK_FENS,
};

/// Runtime configuration of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of the transposition table, in megabytes.
    pub hash_mb: usize,

    /// Number of search threads.
    pub threads: usize,

    /// Centipawns the side to move gives up to avoid a draw. Negative values make draws attractive.
    pub contempt: i32,

    /// Subtracted from the remaining clock time when budgeting a move, in milliseconds.
    pub move_overhead_ms: u64,

    /// Pruning and reduction constants of the search.
    pub params: SearchParams,
}

impl EngineConfig {
    pub const MIN_THREADS: usize = 1;
    pub const MAX_THREADS: usize = 256;

    /// Returns a copy of this config with every value clamped to its valid range.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let config = EngineConfig {
    ///     hash_mb: 0,
    ///     threads: 1000,
    ///     ..Default::default()
    /// }
    /// .clamped();
    /// assert_eq!(config.hash_mb, 1);
    /// assert_eq!(config.threads, 256);
    /// ```
    pub fn clamped(self) -> Self {
        Self {
            hash_mb: self.hash_mb.clamp(TTable::MIN_SIZE, TTable::MAX_SIZE),
            threads: self.threads.clamp(Self::MIN_THREADS, Self::MAX_THREADS),
            ..self
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_mb: TTable::DEFAULT_SIZE,
            threads: 1,
            contempt: tune::contempt!(),
            move_overhead_ms: 10,
            params: SearchParams::default(),
        }
    }
}

/// Totals of a [`Engine::bench`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchResult {
    pub nodes: u64,
    pub time: Duration,
    pub nps: u64,
}

/// The Talon chess engine.
///
/// Owns the game being played, the transposition table, and the search threads.
/// Configuration setters must only be called while no search is running; they wait for it otherwise.
pub struct Engine {
    /// The current state of the chess board, as known to the engine.
    ///
    /// This is modified whenever a new position is given, and keeps every move played
    /// since the last irreversible one, for repetition detection.
    position: Position,

    ttable: Arc<TTable>,
    pool: ThreadPool,
    config: EngineConfig,
}

impl Engine {
    /// Constructs a new [`Engine`] at the standard starting position.
    pub fn new(config: EngineConfig) -> Self {
        let config = config.clamped();

        Self {
            position: Position::default(),
            ttable: Arc::new(TTable::new(config.hash_mb)),
            pool: ThreadPool::new(config.threads),
            config,
        }
    }

    /// Returns a string of the engine's name and current version.
    pub fn name(&self) -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    #[inline(always)]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline(always)]
    pub fn position(&self) -> &Position {
        &self.position
    }

    #[inline(always)]
    pub fn ttable(&self) -> &TTable {
        &self.ttable
    }

    /// Reallocates the transposition table to `mb` megabytes, discarding its contents.
    pub fn set_hash_size(&mut self, mb: usize) {
        self.pool.wait();
        self.config.hash_mb = mb.clamp(TTable::MIN_SIZE, TTable::MAX_SIZE);

        match Arc::get_mut(&mut self.ttable) {
            Some(ttable) => ttable.resize(self.config.hash_mb),

            // Only reachable if someone still holds the table of a finished search
            None => self.ttable = Arc::new(TTable::new(self.config.hash_mb)),
        }
    }

    /// Respawns the search threads, discarding their histories.
    pub fn set_threads(&mut self, threads: usize) {
        self.config.threads = threads.clamp(EngineConfig::MIN_THREADS, EngineConfig::MAX_THREADS);
        self.pool.set_threads(self.config.threads);
    }

    pub fn set_contempt(&mut self, contempt: i32) {
        self.config.contempt = contempt;
    }

    pub fn set_move_overhead(&mut self, ms: u64) {
        self.config.move_overhead_ms = ms;
    }

    pub fn set_params(&mut self, params: SearchParams) {
        self.config.params = params;
    }

    /// Empties the transposition table.
    pub fn clear_hash(&self) {
        self.pool.wait();
        self.ttable.clear();
    }

    /// Resets the engine's internal game state.
    ///
    /// This clears the transposition table and every thread's histories,
    /// and returns to the standard starting position.
    pub fn new_game(&mut self) {
        self.pool.stop();
        self.pool.wait();
        self.ttable.clear();
        self.pool.clear();
        self.position = Position::default();
    }

    /// Set the position to the supplied FEN string (defaults to the standard startpos if not supplied),
    /// and then apply `moves` one-by-one to the position.
    ///
    /// On error, the current position is left unchanged.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mut engine = Engine::new(EngineConfig::default());
    /// engine.set_position(None, &["e2e4", "c7c5"]).unwrap();
    /// assert_eq!(
    ///     engine.position().to_fen(),
    ///     "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
    /// );
    /// assert!(engine.set_position(None, &["e2e5"]).is_err());
    /// ```
    pub fn set_position(&mut self, fen: Option<&str>, moves: &[&str]) -> Result<()> {
        let mut position = match fen {
            Some(fen) => Position::from_fen(fen)?,
            None => Position::default(),
        };

        for (i, mv_str) in moves.iter().enumerate() {
            let mv = Move::from_uci(&position, mv_str);
            if !mv.is_ok() {
                bail!("Illegal or unknown move {mv_str:?} (move #{}) in {:?}", i + 1, position.to_fen());
            }
            position.make_move(mv);
        }

        self.pool.wait();
        self.position = position;
        Ok(())
    }

    /// Starts searching the current position in the background.
    ///
    /// Progress and the result are sent to `reporter`. Use [`Engine::stop`] and [`Engine::wait`] to end the search.
    pub fn go(&mut self, limits: SearchLimits, reporter: Arc<dyn SearchReporter>) {
        self.pool.start_search(
            &self.position,
            limits,
            Arc::clone(&self.ttable),
            &self.config,
            reporter,
        );
    }

    /// Signals the running search, if any, to stop as soon as possible.
    pub fn stop(&self) {
        self.pool.stop();
    }

    /// Blocks until the running search finishes, returning its result.
    pub fn wait(&self) -> SearchResult {
        self.pool.wait()
    }

    #[inline(always)]
    pub fn is_searching(&self) -> bool {
        self.pool.is_searching()
    }

    /// Searches the current position, blocking until done.
    pub fn search(&mut self, limits: SearchLimits) -> SearchResult {
        self.go(limits, Arc::new(NullReporter));
        self.wait()
    }

    /// Searches every position of [`BENCHMARK_FENS`] to `depth` from a fresh state, returning the totals.
    ///
    /// The engine's game state is reset afterwards.
    pub fn bench(&mut self, depth: i32) -> Result<BenchResult> {
        let start = Instant::now();
        let mut nodes = 0;

        for (i, fen) in BENCHMARK_FENS.into_iter().enumerate() {
            self.new_game();
            self.set_position(Some(fen), &[])
                .with_context(|| format!("Benchmark position {} is invalid", i + 1))?;

            let res = self.search(SearchLimits::depth(depth));
            debug!("Benchmark position {}/{}: {} nodes", i + 1, BENCHMARK_FENS.len(), res.nodes);
            nodes += res.nodes;
        }

        let time = start.elapsed();
        let nps = (nodes as f64 / time.as_secs_f64().max(0.001)) as u64;
        self.new_game();

        Ok(BenchResult { nodes, time, nps })
    }

    /// Static evaluation of the current position, from the side to move's perspective.
    pub fn eval(&self) -> Score {
        Evaluator::default().evaluate(&self.position)
    }

    /// Breakdown of [`Engine::eval`] by evaluation term, from White's perspective.
    pub fn eval_trace(&self) -> EvalTrace {
        Evaluator::default().trace(&self.position)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    #[test]
    fn test_set_position_replays_moves() {
        let mut engine = Engine::default();
        engine
            .set_position(Some(FEN_KIWIPETE), &["e1g1", "e8c8", "d5e6"])
            .unwrap();

        assert_eq!(engine.position().side_to_move(), Color::Black);
        assert_eq!(
            engine.position().piece_at(Square::G1),
            Some(Piece::WHITE_KING)
        );
        assert_eq!(
            engine.position().piece_at(Square::C8),
            Some(Piece::BLACK_KING)
        );
    }

    #[test]
    fn test_set_position_rejects_unknown_moves() {
        let mut engine = Engine::default();
        engine.set_position(None, &["e2e4"]).unwrap();
        let before = engine.position().to_fen();

        let err = engine
            .set_position(None, &["e2e4", "e7e5", "e1e3"])
            .unwrap_err();
        assert!(err.to_string().contains("e1e3"), "{err}");
        assert_eq!(engine.position().to_fen(), before);

        assert!(engine.set_position(None, &["0000"]).is_err());
        assert!(engine.set_position(Some("not a fen"), &[]).is_err());
    }

    #[test]
    fn test_game_history_repetition() {
        let mut engine = Engine::default();
        let moves = ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1"];
        engine.set_position(None, &moves).unwrap();

        // Black to move: f6g8 repeats the start position a third time
        let mut position = engine.position().clone();
        position.make_move(Move::from_uci(&position, "f6g8"));
        assert!(position.is_draw(0));
    }

    #[test]
    fn test_search_returns_legal_move() {
        let mut engine = Engine::new(EngineConfig {
            hash_mb: 2,
            ..Default::default()
        });
        let res = engine.search(SearchLimits::depth(4));

        assert!(engine.position().legal_moves().contains(&res.best_move));
        assert_eq!(res.depth, 4);
        assert!(res.nodes > 0);
        assert!(!engine.is_searching());
    }

    #[test]
    fn test_movetime_search_stops() {
        let mut engine = Engine::default();
        let limits = SearchLimits {
            movetime: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let start = Instant::now();
        let res = engine.search(limits);
        assert_ne!(res.best_move, Move::NONE);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_config_setters() {
        let mut engine = Engine::default();
        engine.set_hash_size(4);
        assert_eq!(engine.config().hash_mb, 4);
        assert_eq!(engine.ttable().size_mb(), 4);

        engine.set_hash_size(0);
        assert_eq!(engine.config().hash_mb, 1);

        engine.set_threads(0);
        assert_eq!(engine.config().threads, 1);
        engine.set_threads(3);
        assert_eq!(engine.config().threads, 3);

        let res = engine.search(SearchLimits::depth(3));
        assert_ne!(res.best_move, Move::NONE);

        engine.clear_hash();
        assert_eq!(engine.ttable().hashfull(), 0);
    }

    #[test]
    fn test_new_game_resets_position() {
        let mut engine = Engine::default();
        engine.set_position(None, &["d2d4"]).unwrap();
        engine.new_game();
        assert_eq!(engine.position().to_fen(), FEN_STARTPOS);
    }

    #[test]
    fn test_eval_matches_evaluator() {
        let mut engine = Engine::default();
        engine.set_position(Some(FEN_KIWIPETE), &[]).unwrap();

        let trace = engine.eval_trace();
        let expected = trace.total * Color::White.sign() + tune::tempo!();
        assert_eq!(engine.eval(), expected);
    }
}
