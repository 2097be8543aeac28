/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::{Duration, Instant};

use crate::{Color, SearchLimits};

/// Decides how long a search may run.
///
/// There are two budgets:
///
/// * The *optimum* time is a soft limit, checked after each completed depth of iterative deepening.
///   If it has passed, there probably isn't enough time left for another depth, so the search stops.
/// * The *maximum* time is a hard limit, polled during the search itself.
///   Once it has passed, the search is cancelled immediately.
#[derive(Debug, Clone, Copy)]
pub struct TimeManager {
    start: Instant,
    optimum: Duration,
    maximum: Duration,
    use_time: bool,
}

impl TimeManager {
    /// Computes the time budgets of a search for `side` about to play move number `fullmove`.
    ///
    /// `overhead` is subtracted from the remaining clock time as a safety buffer.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// # use std::time::Duration;
    /// let limits = SearchLimits {
    ///     wtime: Some(Duration::from_secs(60)),
    ///     ..Default::default()
    /// };
    /// let time = TimeManager::new(&limits, Color::White, 1, Duration::from_millis(10));
    /// assert!(time.use_time());
    /// assert!(time.optimum() < time.maximum());
    /// assert!(time.maximum() < Duration::from_secs(60));
    /// ```
    pub fn new(limits: &SearchLimits, side: Color, fullmove: u16, overhead: Duration) -> Self {
        let start = Instant::now();
        let unlimited = Self {
            start,
            optimum: Duration::MAX,
            maximum: Duration::MAX,
            use_time: false,
        };

        if limits.infinite || limits.depth.is_some() || limits.nodes.is_some() {
            return unlimited;
        }

        if let Some(movetime) = limits.movetime {
            return Self {
                start,
                optimum: movetime,
                maximum: movetime,
                use_time: true,
            };
        }

        let (time, inc) = match side {
            Color::White => (limits.wtime, limits.winc),
            Color::Black => (limits.btime, limits.binc),
        };
        let Some(time) = time else {
            return unlimited;
        };
        let inc = inc.unwrap_or(Duration::ZERO);
        let available = time.saturating_sub(overhead);

        let (optimum, maximum) = match limits.movestogo.filter(|&mtg| mtg > 0) {
            Some(movestogo) => (time / movestogo, time * 3 / movestogo),
            None => {
                // Spend a larger share of the clock as the game goes on
                let n = fullmove as f64;
                let k = 1.0 + 20.0 * n / (500.0 + n);
                (
                    time.mul_f64((0.017 * k).min(1.0)),
                    time.mul_f64((0.07 * k).min(1.0)),
                )
            }
        };

        Self {
            start,
            optimum: (optimum + inc / 2).min(available),
            maximum: (maximum + inc / 2).min(available),
            use_time: true,
        }
    }

    /// Whether the search is bounded by time at all.
    ///
    /// This is `false` for depth-limited, node-limited, and infinite searches.
    #[inline(always)]
    pub fn use_time(&self) -> bool {
        self.use_time
    }

    /// Time elapsed since this manager was created.
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Soft limit, checked between depths.
    #[inline(always)]
    pub fn optimum(&self) -> Duration {
        self.optimum
    }

    /// Hard limit, polled during the search.
    #[inline(always)]
    pub fn maximum(&self) -> Duration {
        self.maximum
    }

    /// Returns `true` if another depth should not be started.
    #[inline(always)]
    pub fn past_optimum(&self) -> bool {
        self.use_time && self.elapsed() > self.optimum
    }

    /// Returns `true` if the search must be cancelled right away.
    #[inline(always)]
    pub fn past_maximum(&self) -> bool {
        self.use_time && self.elapsed() > self.maximum
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const OVERHEAD: Duration = Duration::from_millis(10);

    fn clock(wtime: u64, winc: u64) -> SearchLimits {
        SearchLimits {
            wtime: Some(Duration::from_millis(wtime)),
            btime: Some(Duration::from_millis(wtime / 2)),
            winc: Some(Duration::from_millis(winc)),
            ..Default::default()
        }
    }

    #[test]
    fn test_sudden_death_budgets() {
        let time = TimeManager::new(&clock(100_000, 0), Color::White, 1, OVERHEAD);

        // k = 1 + 20 / 501
        let k = 1.0 + 20.0 / 501.0;
        let optimum = (100_000.0 * 0.017 * k) as u128;
        let maximum = (100_000.0 * 0.07 * k) as u128;
        assert!(time.optimum().as_millis().abs_diff(optimum) <= 1);
        assert!(time.maximum().as_millis().abs_diff(maximum) <= 1);
    }

    #[test]
    fn test_budgets_grow_with_game_length() {
        let early = TimeManager::new(&clock(100_000, 0), Color::White, 1, OVERHEAD);
        let late = TimeManager::new(&clock(100_000, 0), Color::White, 60, OVERHEAD);
        assert!(late.optimum() > early.optimum());
        assert!(late.maximum() > early.maximum());
    }

    #[test]
    fn test_uses_side_to_move_clock() {
        let white = TimeManager::new(&clock(100_000, 1_000), Color::White, 1, OVERHEAD);
        let black = TimeManager::new(&clock(100_000, 1_000), Color::Black, 1, OVERHEAD);

        // Black has half the time and no increment
        assert!(black.optimum() < white.optimum());
        assert_eq!(
            white.optimum().as_millis() - 500,
            TimeManager::new(&clock(100_000, 0), Color::White, 1, OVERHEAD)
                .optimum()
                .as_millis()
        );
    }

    #[test]
    fn test_moves_to_go() {
        let limits = SearchLimits {
            movestogo: Some(10),
            ..clock(50_000, 0)
        };
        let time = TimeManager::new(&limits, Color::White, 30, OVERHEAD);
        assert_eq!(time.optimum(), Duration::from_millis(5_000));
        assert_eq!(time.maximum(), Duration::from_millis(15_000));

        // One move left: never more than what is on the clock
        let limits = SearchLimits {
            movestogo: Some(1),
            ..clock(1_000, 0)
        };
        let time = TimeManager::new(&limits, Color::White, 30, OVERHEAD);
        assert_eq!(time.maximum(), Duration::from_millis(990));
    }

    #[test]
    fn test_movetime_fixes_both() {
        let limits = SearchLimits {
            movetime: Some(Duration::from_millis(250)),
            ..Default::default()
        };
        let time = TimeManager::new(&limits, Color::Black, 10, OVERHEAD);
        assert!(time.use_time());
        assert_eq!(time.optimum(), Duration::from_millis(250));
        assert_eq!(time.maximum(), Duration::from_millis(250));
    }

    #[test]
    fn test_untimed_searches() {
        for limits in [
            SearchLimits::default(),
            SearchLimits {
                depth: Some(5),
                ..clock(1_000, 0)
            },
            SearchLimits {
                nodes: Some(10_000),
                ..Default::default()
            },
            SearchLimits {
                infinite: true,
                ..clock(1_000, 0)
            },
        ] {
            let time = TimeManager::new(&limits, Color::White, 1, OVERHEAD);
            assert!(!time.use_time(), "{limits:?}");
            assert!(!time.past_maximum());
        }
    }
}
