/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Bonus for having the move, in centipawns.
macro_rules! tempo {
    () => {
        10
    };
}
pub(crate) use tempo;

/// Centipawns the engine is willing to concede to avoid a draw.
macro_rules! contempt {
    () => {
        1
    };
}
pub(crate) use contempt;

/// Non-pawn material (both sides) at which the position is considered a pure endgame.
macro_rules! endgame_material {
    () => {
        1300
    };
}
pub(crate) use endgame_material;

/// History bonuses drop to zero above this depth.
macro_rules! max_stat_bonus_depth {
    () => {
        14
    };
}
pub(crate) use max_stat_bonus_depth;

/// Gravity divisor of the butterfly history.
macro_rules! butterfly_divisor {
    () => {
        324
    };
}
pub(crate) use butterfly_divisor;

/// Gravity divisor of the continuation histories.
macro_rules! piece_to_divisor {
    () => {
        936
    };
}
pub(crate) use piece_to_divisor;

/// Razoring applies below this depth.
macro_rules! razor_max_depth {
    () => {
        4
    };
}
pub(crate) use razor_max_depth;

/// Razoring margin per ply of depth.
macro_rules! razor_depth_margin {
    () => {
        50
    };
}
pub(crate) use razor_depth_margin;

/// Constant part of the razoring margin.
macro_rules! razor_base_margin {
    () => {
        50
    };
}
pub(crate) use razor_base_margin;

/// Reverse futility pruning applies below this depth.
macro_rules! futility_max_depth {
    () => {
        7
    };
}
pub(crate) use futility_max_depth;

/// Reverse futility margin per ply of depth.
macro_rules! futility_factor {
    () => {
        50
    };
}
pub(crate) use futility_factor;

/// Null move pruning applies above this depth.
macro_rules! null_move_min_depth {
    () => {
        2
    };
}
pub(crate) use null_move_min_depth;

/// Constant part of the null move reduction.
macro_rules! null_move_base_reduction {
    () => {
        3
    };
}
pub(crate) use null_move_base_reduction;

/// The null move reduction grows by one ply every this many plies of depth.
macro_rules! null_move_depth_divisor {
    () => {
        6
    };
}
pub(crate) use null_move_depth_divisor;

/// Null move cutoffs are verified with a real search from this depth on.
macro_rules! null_move_verification_depth {
    () => {
        12
    };
}
pub(crate) use null_move_verification_depth;

/// Minimum depth for internal iterative deepening.
macro_rules! iid_min_depth {
    () => {
        6
    };
}
pub(crate) use iid_min_depth;

/// At non-PV nodes, IID only runs if the static eval is within this margin below beta.
macro_rules! iid_margin {
    () => {
        100
    };
}
pub(crate) use iid_margin;

/// Minimum depth for late move reductions.
macro_rules! lmr_min_depth {
    () => {
        3
    };
}
pub(crate) use lmr_min_depth;

/// Reduce one ply less after a parent that searched more than this many moves.
macro_rules! lmr_move_count_threshold {
    () => {
        15
    };
}
pub(crate) use lmr_move_count_threshold;

/// Subtracted from a move's history before it adjusts the reduction.
macro_rules! lmr_stat_offset {
    () => {
        4000
    };
}
pub(crate) use lmr_stat_offset;

/// Every this many points of history removes (or adds) one ply of reduction.
macro_rules! lmr_stat_divisor {
    () => {
        20000
    };
}
pub(crate) use lmr_stat_divisor;

/// Quiets scoring below `depth` times this value are left unsorted.
macro_rules! quiet_sort_factor {
    () => {
        -2200
    };
}
pub(crate) use quiet_sort_factor;

/// Safety margin of delta pruning in quiescence search.
macro_rules! delta_margin {
    () => {
        100
    };
}
pub(crate) use delta_margin;

/// Every pruning and reduction constant of the search.
///
/// These are empirically tuned rather than derived, so they are exposed as configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub razor_max_depth: i32,
    pub razor_depth_margin: i32,
    pub razor_base_margin: i32,

    pub futility_max_depth: i32,
    pub futility_factor: i32,

    pub null_move_min_depth: i32,
    pub null_move_base_reduction: i32,
    pub null_move_depth_divisor: i32,
    pub null_move_verification_depth: i32,

    pub iid_min_depth: i32,
    pub iid_margin: i32,

    pub lmr_min_depth: i32,
    pub lmr_move_count_threshold: i32,
    pub lmr_stat_offset: i32,
    pub lmr_stat_divisor: i32,

    pub quiet_sort_factor: i32,
    pub delta_margin: i32,
    pub endgame_material: i32,
}

impl SearchParams {
    /// Razoring margin at `depth`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(SearchParams::default().razor_margin(3), 200);
    /// ```
    #[inline(always)]
    pub const fn razor_margin(&self, depth: i32) -> i32 {
        self.razor_depth_margin * depth + self.razor_base_margin
    }

    /// Depth reduction of a null move search at `depth`.
    #[inline(always)]
    pub const fn null_move_reduction(&self, depth: i32) -> i32 {
        self.null_move_base_reduction + depth / self.null_move_depth_divisor
    }

    /// Depth of the internal iterative deepening search at `depth`.
    #[inline(always)]
    pub const fn iid_depth(&self, depth: i32) -> i32 {
        3 * depth / 4 - 2
    }

    /// History score below which quiets are not sorted at `depth`.
    #[inline(always)]
    pub const fn quiet_sort_limit(&self, depth: i32) -> i32 {
        self.quiet_sort_factor * depth
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            razor_max_depth: razor_max_depth!(),
            razor_depth_margin: razor_depth_margin!(),
            razor_base_margin: razor_base_margin!(),
            futility_max_depth: futility_max_depth!(),
            futility_factor: futility_factor!(),
            null_move_min_depth: null_move_min_depth!(),
            null_move_base_reduction: null_move_base_reduction!(),
            null_move_depth_divisor: null_move_depth_divisor!(),
            null_move_verification_depth: null_move_verification_depth!(),
            iid_min_depth: iid_min_depth!(),
            iid_margin: iid_margin!(),
            lmr_min_depth: lmr_min_depth!(),
            lmr_move_count_threshold: lmr_move_count_threshold!(),
            lmr_stat_offset: lmr_stat_offset!(),
            lmr_stat_divisor: lmr_stat_divisor!(),
            quiet_sort_factor: quiet_sort_factor!(),
            delta_margin: delta_margin!(),
            endgame_material: endgame_material!(),
        }
    }
}
