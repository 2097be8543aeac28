/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::{
    perft, splitperft, Engine, EngineConfig, Piece, PsqtDisplay, SearchInfo, SearchLimits,
    SearchReporter, SearchResult, TTable, Tapered, BENCH_DEPTH,
};

/// Command-line interface of the Talon chess engine.
#[derive(Debug, Clone, Parser)]
#[command(version, about, rename_all = "lower")]
pub struct Cli {
    /// Size of the transposition table, in megabytes.
    #[arg(long, global = true, default_value_t = TTable::DEFAULT_SIZE)]
    pub hash: usize,

    /// Number of search threads.
    #[arg(long, global = true, default_value_t = 1)]
    pub threads: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// A command to be executed by the engine.
#[derive(Debug, Clone, Subcommand)]
#[command(rename_all = "lower")]
pub enum Command {
    /// Performs a perft on the position at the supplied depth, printing total node count.
    Perft {
        depth: usize,

        /// Position to start from. Defaults to the standard starting position.
        #[arg(short, long)]
        fen: Option<String>,
    },

    /// Performs a split perft on the position at the supplied depth.
    #[command(alias = "sperft")]
    Splitperft {
        depth: usize,

        #[arg(short, long)]
        fen: Option<String>,
    },

    /// Run a benchmark: a fixed-depth search on a series of positions.
    Bench {
        /// Override the default benchmark depth.
        #[arg(short, long)]
        depth: Option<i32>,
    },

    /// Search a position, printing progress after every depth and then the best move.
    Search {
        #[arg(short, long)]
        fen: Option<String>,

        /// Moves to play from the position before searching, in coordinate notation.
        #[arg(short, long, num_args = 1..)]
        moves: Vec<String>,

        #[arg(short, long)]
        depth: Option<i32>,

        /// Time to search for, in milliseconds.
        #[arg(long)]
        movetime: Option<u64>,

        #[arg(short, long)]
        nodes: Option<u64>,
    },

    /// Print an evaluation of the position, broken down by term.
    Eval {
        #[arg(short, long)]
        fen: Option<String>,
    },

    /// Print the piece-square table of a piece, tapered to a game phase.
    #[command(aliases = ["psq", "pst"])]
    Psqt {
        /// The piece, as a FEN character (`P` for a White pawn, `n` for a Black knight, ...).
        piece: char,

        /// Game phase, from 0 (endgame) to 64 (opening). Defaults to the opening.
        #[arg(short, long)]
        phase: Option<i32>,
    },

    /// Print a visual representation of the position.
    #[command(alias = "d")]
    Display {
        #[arg(short, long)]
        fen: Option<String>,
    },
}

/// Environment variable holding the log filter: `TALON_LOG` when set, `RUST_LOG` otherwise.
fn log_filter_var(talon_log_set: bool) -> &'static str {
    if talon_log_set {
        "TALON_LOG"
    } else {
        "RUST_LOG"
    }
}

/// Initializes the global logger, showing warnings and errors unless a filter is set.
pub fn init_logging() {
    let filter = log_filter_var(std::env::var_os("TALON_LOG").is_some());
    env_logger::Builder::from_env(
        Env::default()
            .filter_or(filter, "warn")
            .write_style("TALON_LOG_STYLE"),
    )
    .init();
}

/// Prints search progress to stdout.
struct PrintReporter;

impl SearchReporter for PrintReporter {
    fn on_iteration(&self, info: &SearchInfo) {
        println!("{info}");
    }

    fn on_finish(&self, result: &SearchResult) {
        match result.ponder {
            Some(ponder) => println!("bestmove {} ponder {ponder}", result.best_move),
            None => println!("bestmove {}", result.best_move),
        }
    }
}

impl Cli {
    /// Executes the parsed command.
    pub fn run(self) -> Result<()> {
        let mut engine = Engine::new(EngineConfig {
            hash_mb: self.hash,
            threads: self.threads,
            ..Default::default()
        });

        match self.command {
            Command::Perft { depth, fen } => {
                engine.set_position(fen.as_deref(), &[])?;
                let mut position = engine.position().clone();
                println!("{}", perft(&mut position, depth));
            }

            Command::Splitperft { depth, fen } => {
                engine.set_position(fen.as_deref(), &[])?;
                let mut position = engine.position().clone();
                let nodes = splitperft(&mut position, depth);
                println!("\n{nodes}");
            }

            Command::Bench { depth } => {
                let res = engine.bench(depth.unwrap_or(BENCH_DEPTH))?;
                println!(
                    "{} nodes {} nps ({} ms)",
                    res.nodes,
                    res.nps,
                    res.time.as_millis()
                );
            }

            Command::Search {
                fen,
                moves,
                depth,
                movetime,
                nodes,
            } => {
                let moves = moves.iter().map(String::as_str).collect::<Vec<_>>();
                engine.set_position(fen.as_deref(), &moves)?;

                let limits = SearchLimits {
                    depth,
                    nodes,
                    movetime: movetime.map(Duration::from_millis),
                    ..Default::default()
                };

                engine.go(limits, Arc::new(PrintReporter));
                engine.wait();
            }

            Command::Eval { fen } => {
                engine.set_position(fen.as_deref(), &[])?;
                print!("{}", engine.eval_trace());
                println!("\nScore: {}", engine.eval());
            }

            Command::Psqt { piece, phase } => {
                let piece = Piece::from_char(piece)?;
                let phase = phase.unwrap_or(Tapered::MAX_PHASE).clamp(0, Tapered::MAX_PHASE);
                print!("{}", PsqtDisplay { piece, phase });
            }

            Command::Display { fen } => {
                engine.set_position(fen.as_deref(), &[])?;
                println!("{}", engine.position());
                println!("FEN: {}", engine.position().to_fen());
                println!("Key: {}", engine.position().key());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["talon", "perft", "3", "--hash", "32", "--threads", "2"]).unwrap();
        assert_eq!(cli.hash, 32);
        assert_eq!(cli.threads, 2);
        assert!(matches!(cli.command, Command::Perft { depth: 3, fen: None }));
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "talon", "search", "--moves", "e2e4", "e7e5", "--depth", "6",
        ])
        .unwrap();
        assert_eq!(cli.hash, TTable::DEFAULT_SIZE);

        let Command::Search { moves, depth, movetime, .. } = cli.command else {
            panic!("expected a search command");
        };
        assert_eq!(moves, ["e2e4", "e7e5"]);
        assert_eq!(depth, Some(6));
        assert_eq!(movetime, None);
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["talon", "fly"]).is_err());
        assert!(Cli::try_parse_from(["talon", "perft"]).is_err());
    }

    #[test]
    fn test_log_filter_falls_back_to_rust_log() {
        assert_eq!(log_filter_var(true), "TALON_LOG");
        assert_eq!(log_filter_var(false), "RUST_LOG");
    }

    #[test]
    fn test_run_perft() {
        let cli = Cli::try_parse_from(["talon", "perft", "2", "--hash", "1"]).unwrap();
        assert!(cli.run().is_ok());

        let cli = Cli::try_parse_from(["talon", "perft", "2", "--fen", "bad"]).unwrap();
        assert!(cli.run().is_err());
    }

    #[test]
    fn test_run_psqt() {
        let cli = Cli::try_parse_from(["talon", "psqt", "N", "--phase", "32"]).unwrap();
        assert!(cli.run().is_ok());

        let cli = Cli::try_parse_from(["talon", "psqt", "x"]).unwrap();
        assert!(cli.run().is_err());
    }
}
