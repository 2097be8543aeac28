/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Board representation, move generation, and perft.
mod board;

/// Command-line interface.
mod cli;

/// The engine facade: game state, configuration, and search control.
mod engine;

/// Evaluation of chess positions.
mod eval;

/// Move-ordering statistics gathered during search.
mod history;

/// Staged move ordering.
mod movepicker;

/// Piece-square tables.
mod psqt;

/// Search scores, including mate scores.
mod score;

/// Main engine logic; all search related code.
mod search;

/// The pool of search threads and what they share.
mod threads;

/// Time budgeting.
mod timeman;

/// Transposition table.
mod ttable;

/// Tunable constants.
mod tune;

/// Misc utility constants.
mod utils;

pub use board::*;
pub use cli::*;
pub use engine::*;
pub use eval::*;
pub use history::*;
pub use movepicker::*;
pub use psqt::*;
pub use score::*;
pub use search::*;
pub use threads::*;
pub use timeman::*;
pub use ttable::*;
pub use tune::SearchParams;
pub use utils::*;
