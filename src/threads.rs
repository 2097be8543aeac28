/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error};

use crate::{
    Color, EngineConfig, Evaluator, History, Position, Score, Search, SearchInfo, SearchLimits,
    SearchParams, SearchResult, TTable, TimeManager,
};

/// Stack size of every search thread.
const STACK_SIZE: usize = 16 * 1024 * 1024;

/// Receives the progress and the outcome of a search.
///
/// Only the main search thread calls these, so implementations never see concurrent calls.
pub trait SearchReporter: Send + Sync {
    /// Called after every completed depth.
    fn on_iteration(&self, _info: &SearchInfo) {}

    /// Called once, after every thread has stopped.
    fn on_finish(&self, _result: &SearchResult) {}
}

/// A [`SearchReporter`] that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl SearchReporter for NullReporter {}

/// State that outlives a single search, owned by each thread.
///
/// Histories persist between searches of the same game.
#[derive(Debug, Clone, Default)]
pub struct ThreadData {
    pub history: History,
    pub evaluator: Evaluator,
}

impl ThreadData {
    pub fn clear(&mut self) {
        self.history.clear();
        self.evaluator.clear();
    }
}

/// Everything the threads of one search have in common.
pub struct SearchShared {
    pub ttable: Arc<TTable>,

    /// Raised to cancel the search. Every thread polls it.
    pub stop: Arc<AtomicBool>,
    pub limits: SearchLimits,
    pub time: TimeManager,
    pub params: SearchParams,

    /// Score of a draw for each side. The side to move at the root dislikes draws by the contempt.
    pub draw_values: [Score; Color::COUNT],
    pub reporter: Arc<dyn SearchReporter>,

    /// Nodes searched by each thread.
    pub nodes: Vec<Arc<AtomicU64>>,
}

impl SearchShared {
    /// Sets up a search of `position` by `threads` threads.
    pub fn new(
        position: &Position,
        limits: SearchLimits,
        threads: usize,
        ttable: Arc<TTable>,
        stop: Arc<AtomicBool>,
        config: &EngineConfig,
        reporter: Arc<dyn SearchReporter>,
    ) -> Self {
        let us = position.side_to_move();
        let overhead = Duration::from_millis(config.move_overhead_ms);
        let time = TimeManager::new(&limits, us, position.fullmove(), overhead);

        let mut draw_values = [Score::DRAW; Color::COUNT];
        draw_values[us] = Score::DRAW - config.contempt;
        draw_values[us.opponent()] = Score::DRAW + config.contempt;

        Self {
            ttable,
            stop,
            limits,
            time,
            params: config.params,
            draw_values,
            reporter,
            nodes: (0..threads.max(1)).map(|_| Arc::default()).collect(),
        }
    }

    /// Nodes searched so far by all threads together.
    #[inline(always)]
    pub fn total_nodes(&self) -> u64 {
        self.nodes.iter().map(|n| n.load(Ordering::Relaxed)).sum()
    }
}

type Task = Box<dyn FnOnce(&mut ThreadData) + Send>;

#[derive(Default)]
struct ThreadState {
    searching: bool,
    exit: bool,
    task: Option<Task>,
}

struct ThreadInner {
    data: Mutex<ThreadData>,
    state: Mutex<ThreadState>,
    condvar: Condvar,
}

#[inline(always)]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ThreadInner {
    /// Sleeps until a task is scheduled, runs it, and goes back to sleep. Returns on exit.
    fn idle_loop(&self) {
        loop {
            let task = {
                let mut state = lock(&self.state);
                state.searching = false;
                self.condvar.notify_all();

                while !state.searching && !state.exit {
                    state = self
                        .condvar
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                if state.exit {
                    return;
                }

                state.task.take()
            };

            if let Some(task) = task {
                task(&mut lock(&self.data));
            }
        }
    }

    fn schedule(&self, task: Task) {
        let mut state = lock(&self.state);
        state.task = Some(task);
        state.searching = true;
        self.condvar.notify_all();
    }

    /// Blocks until this thread is idle.
    fn wait_idle(&self) {
        let mut state = lock(&self.state);
        while state.searching {
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn is_searching(&self) -> bool {
        lock(&self.state).searching
    }
}

/// A search thread, sleeping on its condition variable while idle.
struct Thread {
    inner: Arc<ThreadInner>,
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    fn new(id: usize) -> Self {
        let inner = Arc::new(ThreadInner {
            data: Mutex::default(),
            state: Mutex::new(ThreadState {
                searching: true,
                ..Default::default()
            }),
            condvar: Condvar::new(),
        });

        let worker = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name(format!("search-{id}"))
            .stack_size(STACK_SIZE)
            .spawn(move || worker.idle_loop());

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                error!("Failed to spawn search thread {id}: {err}");
                std::process::exit(1);
            }
        };

        // Wait for the thread to reach its idle loop, so no task is lost
        inner.wait_idle();

        Self {
            inner,
            handle: Some(handle),
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.inner.state);
            state.exit = true;
            self.inner.condvar.notify_all();
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("A search thread panicked");
            }
        }
    }
}

/// A fixed set of search threads running Lazy SMP.
///
/// Thread `0` is the main thread. It reports progress, decides when to stop,
/// and produces the result once the helpers have finished.
pub struct ThreadPool {
    threads: Vec<Thread>,
    stop: Arc<AtomicBool>,
    result: Arc<Mutex<Option<SearchResult>>>,
}

impl ThreadPool {
    /// Spawns `n` search threads. At least one is always spawned.
    pub fn new(n: usize) -> Self {
        let mut pool = Self {
            threads: Vec::new(),
            stop: Arc::default(),
            result: Arc::default(),
        };
        pool.set_threads(n);
        pool
    }

    /// Number of search threads.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Replaces every thread with `n` new ones, discarding their histories.
    pub fn set_threads(&mut self, n: usize) {
        self.wait();
        let n = n.max(1);

        self.threads.clear();
        self.threads = (0..n).map(Thread::new).collect();
        debug!("Spawned {n} search thread(s)");
    }

    /// Clears the histories of every thread. Blocks while a search is running.
    pub fn clear(&self) {
        for thread in &self.threads {
            lock(&thread.inner.data).clear();
        }
    }

    /// Returns `true` while the main thread is searching.
    pub fn is_searching(&self) -> bool {
        self.threads.first().is_some_and(|main| main.inner.is_searching())
    }

    /// Signals every thread to stop. Returns immediately.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Starts searching `position` on every thread. Returns immediately.
    ///
    /// Any search still running is finished first.
    pub fn start_search(
        &self,
        position: &Position,
        limits: SearchLimits,
        ttable: Arc<TTable>,
        config: &EngineConfig,
        reporter: Arc<dyn SearchReporter>,
    ) {
        self.wait();
        self.stop.store(false, Ordering::Relaxed);
        *lock(&self.result) = None;
        ttable.new_search();

        debug!(
            "Starting search with {} thread(s): {limits:?}",
            self.threads.len()
        );

        let shared = Arc::new(SearchShared::new(
            position,
            limits,
            self.threads.len(),
            ttable,
            Arc::clone(&self.stop),
            config,
            reporter,
        ));

        let Some((main, helpers)) = self.threads.split_first() else {
            return;
        };

        for (i, helper) in helpers.iter().enumerate() {
            let shared = Arc::clone(&shared);
            let position = position.clone();

            helper.inner.schedule(Box::new(move |data| {
                Search::new(i + 1, position, &shared, data).start();
            }));
        }

        let helpers = helpers
            .iter()
            .map(|thread| Arc::clone(&thread.inner))
            .collect::<Vec<_>>();
        let slot = Arc::clone(&self.result);
        let position = position.clone();

        main.inner.schedule(Box::new(move |data| {
            let mut result = Search::new(0, position, &shared, data).start();

            shared.stop.store(true, Ordering::Relaxed);
            for helper in &helpers {
                helper.wait_idle();
            }

            result.nodes = shared.total_nodes();
            debug!(
                "Search finished: bestmove {} depth {} nodes {}",
                result.best_move, result.depth, result.nodes
            );

            shared.reporter.on_finish(&result);
            *lock(&slot) = Some(result);
        }));
    }

    /// Blocks until the current search finishes, returning its result.
    ///
    /// If no search was started, a default result is returned.
    pub fn wait(&self) -> SearchResult {
        if let Some(main) = self.threads.first() {
            main.inner.wait_idle();
        }

        lock(&self.result).clone().unwrap_or_default()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}
