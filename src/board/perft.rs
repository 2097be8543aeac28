/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::Position;

/// Counts the leaf nodes of the legal move tree `depth` plies deep.
///
/// Uses bulk counting: at depth 1 the number of legal moves is returned without making them.
///
/// # Example
/// ```
/// # use talon::*;
/// let mut pos = Position::default();
/// assert_eq!(perft(&mut pos, 3), 8_902);
/// ```
pub fn perft(position: &mut Position, depth: usize) -> u64 {
    perft_generic::<true, false>(position, depth)
}

/// Like [`perft`], printing the node count below each root move.
pub fn splitperft(position: &mut Position, depth: usize) -> u64 {
    perft_generic::<true, true>(position, depth)
}

/// Generic version of [`perft`].
///
/// If `BULK` is set, depth 1 counts moves instead of making them.
/// If `SPLIT` is set, the count below each root move is printed.
pub fn perft_generic<const BULK: bool, const SPLIT: bool>(
    position: &mut Position,
    depth: usize,
) -> u64 {
    if depth == 0 {
        return 1;
    }

    let moves = position.legal_moves();
    if BULK && !SPLIT && depth == 1 {
        return moves.len() as u64;
    }

    moves.into_iter().fold(0, |nodes, mv| {
        position.make_move(mv);
        let new_nodes = perft_generic::<BULK, false>(position, depth - 1);
        position.unmake_move(mv);

        if SPLIT {
            println!("{mv}\t{new_nodes}");
        }

        nodes + new_nodes
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    #[test]
    fn test_bulk_matches_full() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        let bulk = perft_generic::<true, false>(&mut pos, 2);
        let full = perft_generic::<false, false>(&mut pos, 2);
        assert_eq!(bulk, full);
        assert_eq!(bulk, 2_039);
    }
}
