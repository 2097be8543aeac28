/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{
    attacks_for, king_attacks, line_through, pawn_attacks, ray_between, Bitboard, CastlingRights,
    Move, MoveKind, MoveList, PieceKind, Position, Square,
};

/// Selects which subset of pseudo-legal moves [`generate`] produces.
pub trait GenType {
    /// Captures, en passant, and queen promotions.
    const CAPTURES: bool;

    /// Non-captures, castling, and underpromotions.
    const QUIETS: bool;

    /// Only moves that may resolve a check. Requires the side to move to be in check.
    const EVASIONS: bool;
}

/// Captures and queen promotions, including capturing ones.
pub struct Captures;

/// Non-captures and underpromotions, including capturing ones.
pub struct Quiets;

/// Moves that may get out of check.
pub struct Evasions;

/// Every pseudo-legal move.
pub struct NonEvasions;

impl GenType for Captures {
    const CAPTURES: bool = true;
    const QUIETS: bool = false;
    const EVASIONS: bool = false;
}

impl GenType for Quiets {
    const CAPTURES: bool = false;
    const QUIETS: bool = true;
    const EVASIONS: bool = false;
}

impl GenType for Evasions {
    const CAPTURES: bool = true;
    const QUIETS: bool = true;
    const EVASIONS: bool = true;
}

impl GenType for NonEvasions {
    const CAPTURES: bool = true;
    const QUIETS: bool = true;
    const EVASIONS: bool = false;
}

/// Appends the pseudo-legal moves selected by `G` to `moves`.
///
/// # Example
/// ```
/// # use talon::*;
/// let pos = Position::default();
/// let mut moves = MoveList::new();
/// generate::<Quiets>(&pos, &mut moves);
/// assert_eq!(moves.len(), 20);
///
/// moves.clear();
/// generate::<Captures>(&pos, &mut moves);
/// assert!(moves.is_empty());
/// ```
pub fn generate<G: GenType>(position: &Position, moves: &mut MoveList) {
    let us = position.side_to_move();

    if G::EVASIONS {
        debug_assert!(position.in_check());
        generate_evasions(position, moves);
        return;
    }

    let target = if G::CAPTURES && G::QUIETS {
        !position.color(us)
    } else if G::CAPTURES {
        position.color(us.opponent())
    } else {
        !position.occupied()
    };

    generate_pawn_moves::<G>(position, target, moves);
    generate_piece_moves(position, target, moves);

    let king = position.king_square(us);
    for to in king_attacks(king) & target {
        moves.push(Move::new(king, to, MoveKind::Normal));
    }

    if G::QUIETS {
        generate_castling(position, moves);
    }
}

/// King steps away from (or captures) the checkers, plus blocks and captures of a lone checker.
fn generate_evasions(position: &Position, moves: &mut MoveList) {
    let us = position.side_to_move();
    let king = position.king_square(us);
    let checkers = position.checkers();

    // The king cannot retreat along the line of a checking slider
    let slider_checkers =
        checkers & !(position.kind(PieceKind::Pawn) | position.kind(PieceKind::Knight));
    let mut slider_lines = Bitboard::EMPTY_BOARD;
    for checker in slider_checkers {
        slider_lines |= line_through(checker, king) ^ checker;
    }

    for to in king_attacks(king) & !position.color(us) & !slider_lines {
        moves.push(Move::new(king, to, MoveKind::Normal));
    }

    // Only the king can escape a double check
    if checkers.more_than_one() {
        return;
    }

    let checker = checkers.lsb_unchecked();
    let target = ray_between(checker, king) | checker;

    generate_pawn_moves::<Evasions>(position, target, moves);
    generate_piece_moves(position, target, moves);
}

/// Knight, bishop, rook, and queen moves onto `target`.
fn generate_piece_moves(position: &Position, target: Bitboard, moves: &mut MoveList) {
    let us = position.side_to_move();
    let occupied = position.occupied();

    for kind in [
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
    ] {
        for &from in position.piece_list(us, kind) {
            for to in attacks_for(kind, from, occupied) & target {
                moves.push(Move::new(from, to, MoveKind::Normal));
            }
        }
    }
}

fn generate_pawn_moves<G: GenType>(position: &Position, target: Bitboard, moves: &mut MoveList) {
    let us = position.side_to_move();
    let them = us.opponent();
    let occupied = position.occupied();

    let enemies = if G::EVASIONS {
        position.color(them) & target
    } else {
        position.color(them)
    };
    let push_mask = if G::EVASIONS {
        target
    } else {
        Bitboard::FULL_BOARD
    };

    for &from in position.piece_list(us, PieceKind::Pawn) {
        // Pawns never stand on their last rank, so this is always on the board
        let single = from.forward(us);
        let can_push = !occupied.contains(single);
        let captures = pawn_attacks(from, us) & enemies;

        if from.relative_rank(us) == 6 {
            if can_push && push_mask.contains(single) {
                push_promotions::<G>(from, single, moves);
            }
            for to in captures {
                push_promotions::<G>(from, to, moves);
            }
            continue;
        }

        if G::QUIETS && can_push {
            if push_mask.contains(single) {
                moves.push(Move::new(from, single, MoveKind::Normal));
            }

            if from.relative_rank(us) == 1 {
                let double = single.forward(us);
                if !occupied.contains(double) && push_mask.contains(double) {
                    moves.push(Move::new(from, double, MoveKind::Normal));
                }
            }
        }

        if G::CAPTURES {
            for to in captures {
                moves.push(Move::new(from, to, MoveKind::Normal));
            }
        }
    }

    if G::CAPTURES {
        if let Some(ep) = position.ep_square() {
            // En passant evades a check by capturing the checking pawn or by landing on the checking ray
            if G::EVASIONS && !target.contains(ep) && !target.contains(ep.backward(us)) {
                return;
            }

            for from in pawn_attacks(ep, them) & position.pieces(us, PieceKind::Pawn) {
                moves.push(Move::new(from, ep, MoveKind::EnPassant));
            }
        }
    }
}

#[inline(always)]
fn push_promotions<G: GenType>(from: Square, to: Square, moves: &mut MoveList) {
    if G::CAPTURES {
        moves.push(Move::new_promotion(from, to, PieceKind::Queen));
    }

    if G::QUIETS {
        moves.push(Move::new_promotion(from, to, PieceKind::Knight));
        moves.push(Move::new_promotion(from, to, PieceKind::Rook));
        moves.push(Move::new_promotion(from, to, PieceKind::Bishop));
    }
}

/// Castling, when the right is held, the path is empty, and the king never crosses an attacked square.
fn generate_castling(position: &Position, moves: &mut MoveList) {
    let us = position.side_to_move();
    let them = us.opponent();
    let rights = position.castling_rights();
    let occupied = position.occupied();
    let king = position.king_square(us);
    if position.in_check() {
        return;
    }

    let home = |square: Square| square.relative_to(us);
    let sides = [
        (CastlingRights::short(us), home(Square::H1), home(Square::G1)),
        (CastlingRights::long(us), home(Square::A1), home(Square::C1)),
    ];

    for (right, rook, king_to) in sides {
        if !rights.contains(right) || (ray_between(king, rook) & occupied).is_nonempty() {
            continue;
        }

        let crossed = ray_between(king, king_to) | king_to;
        let attacked = crossed
            .into_iter()
            .any(|square| (position.attackers_to(square, occupied) & position.color(them)).is_nonempty());

        if !attacked {
            moves.push(Move::new(king, king_to, MoveKind::Castle));
        }
    }
}

/// Pseudo-legal moves that are not legal: they leave our own king attacked.
fn retain_legal(position: &Position, moves: &mut MoveList) {
    let us = position.side_to_move();
    let pinned = position.pinned(us);
    let king = position.king_square(us);

    moves.retain(|mv| {
        let needs_check = pinned.contains(mv.from()) || mv.from() == king || mv.is_en_passant();
        !needs_check || position.is_legal(*mv, pinned)
    });
}

impl Position {
    /// All legal moves in this position.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// assert_eq!(Position::default().legal_moves().len(), 20);
    /// assert_eq!(Position::from_fen(FEN_KIWIPETE).unwrap().legal_moves().len(), 48);
    /// ```
    pub fn legal_moves(&self) -> MoveList {
        let mut moves = MoveList::new();

        if self.in_check() {
            generate::<Evasions>(self, &mut moves);
        } else {
            generate::<NonEvasions>(self, &mut moves);
        }

        retain_legal(self, &mut moves);
        moves
    }

    /// Pseudo-legal moves of the kind selected by `G`.
    #[inline(always)]
    pub fn pseudo_legal_moves<G: GenType>(&self) -> MoveList {
        let mut moves = MoveList::new();
        generate::<G>(self, &mut moves);
        moves
    }
}

/// Reference for legality: make every pseudo-legal move and see if our king survives.
#[cfg(test)]
pub(crate) fn reference_legal_moves(position: &Position) -> Vec<Move> {
    let us = position.side_to_move();
    let mut pseudo = MoveList::new();
    generate::<NonEvasions>(position, &mut pseudo);

    let mut position = position.clone();
    pseudo
        .into_iter()
        .filter(|&mv| {
            position.make_move(mv);
            let king = position.king_square(us);
            let safe = (position.attackers_to(king, position.occupied()) & position.color(!us))
                .is_empty();
            position.unmake_move(mv);
            safe
        })
        .collect()
}
