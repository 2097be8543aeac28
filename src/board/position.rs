/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use anyhow::{anyhow, bail, Result};

use super::{
    aligned, bishop_attacks, bishop_rays, king_attacks, knight_attacks, pawn_attacks,
    ray_between, rook_attacks, rook_rays, Bitboard, Color, File, Move, MoveKind, Piece, PieceKind,
    Rank, Square, ZobristKey, FEN_STARTPOS,
};

/// Value returned by [`Position::see_sign`] for captures that cannot lose material.
pub const SEE_KNOWN_WIN: i32 = 9000;

/// Most pieces of one kind and color that a legal game can produce (8 promotions plus the originals).
const MAX_PIECES_PER_KIND: usize = 16;

/// Castling rights removed when a piece moves from or to each square.
const CASTLING_MASKS: [u8; Square::COUNT] = {
    let mut masks = [0; Square::COUNT];
    masks[Square::E1.index()] = CastlingRights::WHITE_SHORT.0 | CastlingRights::WHITE_LONG.0;
    masks[Square::H1.index()] = CastlingRights::WHITE_SHORT.0;
    masks[Square::A1.index()] = CastlingRights::WHITE_LONG.0;
    masks[Square::E8.index()] = CastlingRights::BLACK_SHORT.0 | CastlingRights::BLACK_LONG.0;
    masks[Square::H8.index()] = CastlingRights::BLACK_SHORT.0;
    masks[Square::A8.index()] = CastlingRights::BLACK_LONG.0;
    masks
};

/// Represents the castling rights of both players, as a 4-bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: Self = Self(0);
    pub const WHITE_SHORT: Self = Self(1);
    pub const WHITE_LONG: Self = Self(2);
    pub const BLACK_SHORT: Self = Self(4);
    pub const BLACK_LONG: Self = Self(8);
    pub const ALL: Self = Self(15);

    /// Number of distinct combinations of rights.
    pub const COUNT: usize = 16;

    #[inline(always)]
    pub const fn short(color: Color) -> Self {
        match color {
            Color::White => Self::WHITE_SHORT,
            Color::Black => Self::BLACK_SHORT,
        }
    }

    #[inline(always)]
    pub const fn long(color: Color) -> Self {
        match color {
            Color::White => Self::WHITE_LONG,
            Color::Black => Self::BLACK_LONG,
        }
    }

    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    const fn without(self, mask: u8) -> Self {
        Self(self.0 & !mask)
    }

    #[inline(always)]
    const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for CastlingRights {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }

        for (right, c) in [
            (Self::WHITE_SHORT, 'K'),
            (Self::WHITE_LONG, 'Q'),
            (Self::BLACK_SHORT, 'k'),
            (Self::BLACK_LONG, 'q'),
        ] {
            if self.contains(right) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Everything about a position that cannot be recovered when a move is unmade.
///
/// One record is pushed per ply by [`Position::make_move`] and [`Position::make_null_move`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateInfo {
    pub key: ZobristKey,
    pub pawn_key: ZobristKey,
    pub material_key: ZobristKey,

    /// Kind of the piece captured by the move that led here.
    pub captured: Option<PieceKind>,

    /// Set only when the side to move can actually capture en passant.
    pub ep_square: Option<Square>,
    pub castling: CastlingRights,

    /// Plies since the last capture or pawn move.
    pub halfmove: u16,
    pub plies_from_null: u16,

    /// Enemy pieces attacking the side to move's king.
    pub checkers: Bitboard,
}

/// Precomputed data for predicting whether moves of the side to move give check.
#[derive(Clone, Copy, Debug)]
pub struct CheckInfo {
    /// The enemy king.
    pub king_square: Square,

    /// Our pieces pinned to our own king.
    pub pinned: Bitboard,

    /// Our pieces that would uncover a check by moving off the line to the enemy king.
    pub discovered: Bitboard,

    /// For each piece kind, the squares from which it would attack the enemy king.
    pub check_squares: [Bitboard; PieceKind::COUNT],
}

impl CheckInfo {
    pub fn new(position: &Position) -> Self {
        let us = position.side_to_move();
        let them = us.opponent();
        let king_square = position.king_square(them);
        let occupied = position.occupied();

        let bishop = bishop_attacks(king_square, occupied);
        let rook = rook_attacks(king_square, occupied);

        Self {
            king_square,
            pinned: position.pinned(us),
            discovered: position.slider_blockers(position.color(us), king_square)
                & position.color(us),
            check_squares: [
                pawn_attacks(king_square, them),
                knight_attacks(king_square),
                bishop,
                rook,
                bishop | rook,
                Bitboard::EMPTY_BOARD,
            ],
        }
    }
}

/// A chess position with incremental make/unmake.
///
/// The board is stored three ways that must always agree: bitboards by color and kind,
/// a square-indexed mailbox, and compact per-piece square lists.
/// A stack of [`StateInfo`] records, one per ply, makes every move reversible in O(1).
#[derive(Clone)]
pub struct Position {
    colors: [Bitboard; Color::COUNT],
    kinds: [Bitboard; PieceKind::COUNT],
    mailbox: [Option<Piece>; Square::COUNT],

    piece_lists: [[[Square; MAX_PIECES_PER_KIND]; PieceKind::COUNT]; Color::COUNT],
    piece_counts: [[u8; PieceKind::COUNT]; Color::COUNT],
    list_index: [u8; Square::COUNT],

    material: [i32; Color::COUNT],
    non_pawn_material: [i32; Color::COUNT],

    side_to_move: Color,

    /// Plies since the start of the game, derived from the FEN's fullmove counter.
    game_ply: u16,

    states: Vec<StateInfo>,
}

impl Position {
    /// Creates an empty board with White to move. Only useful as a starting point for [`Position::reset`].
    fn empty() -> Self {
        Self {
            colors: [Bitboard::EMPTY_BOARD; Color::COUNT],
            kinds: [Bitboard::EMPTY_BOARD; PieceKind::COUNT],
            mailbox: [None; Square::COUNT],
            piece_lists: [[[Square::A1; MAX_PIECES_PER_KIND]; PieceKind::COUNT]; Color::COUNT],
            piece_counts: [[0; PieceKind::COUNT]; Color::COUNT],
            list_index: [0; Square::COUNT],
            material: [0; Color::COUNT],
            non_pawn_material: [0; Color::COUNT],
            side_to_move: Color::White,
            game_ply: 0,
            states: Vec::with_capacity(256),
        }
    }

    /// Parses a FEN string into a new [`Position`].
    ///
    /// Piece placement and side to move must be valid. Malformed castling rights and en passant
    /// squares are clamped to what the board allows, and missing clocks get their defaults.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let pos = Position::from_fen(FEN_KIWIPETE).unwrap();
    /// assert_eq!(pos.to_fen(), FEN_KIWIPETE);
    ///
    /// // A bogus en passant square is dropped
    /// let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - e6 0 1").unwrap();
    /// assert_eq!(pos.ep_square(), None);
    ///
    /// assert!(Position::from_fen("not a fen").is_err());
    /// ```
    pub fn from_fen(fen: &str) -> Result<Self> {
        let mut position = Self::empty();
        position.parse_fen(fen)?;
        Ok(position)
    }

    /// Replaces this position with `fen`, or with the standard starting position if `None`.
    ///
    /// On error, `self` is left untouched.
    pub fn reset(&mut self, fen: Option<&str>) -> Result<()> {
        *self = Self::from_fen(fen.unwrap_or(FEN_STARTPOS))?;
        Ok(())
    }

    fn parse_fen(&mut self, fen: &str) -> Result<()> {
        let mut fields = fen.split_whitespace();

        let placement = fields
            .next()
            .ok_or_else(|| anyhow!("Invalid FEN {fen:?}: missing piece placement"))?;
        let ranks = placement.split('/').collect::<Vec<_>>();
        if ranks.len() != Rank::COUNT {
            bail!(
                "Invalid FEN {fen:?}: expected {} ranks, got {}",
                Rank::COUNT,
                ranks.len()
            );
        }

        for (rank, pieces) in Rank::iter().rev().zip(ranks) {
            let mut file = 0;
            for c in pieces.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                } else {
                    if file >= File::COUNT as u8 {
                        bail!("Invalid FEN {fen:?}: rank {rank} is too long");
                    }
                    let piece = Piece::from_char(c)?;
                    self.put_piece(piece, Square::new(File(file), rank));
                    file += 1;
                }
            }
            if file != File::COUNT as u8 {
                bail!("Invalid FEN {fen:?}: rank {rank} does not have 8 files");
            }
        }

        for color in Color::all() {
            if self.piece_counts[color][PieceKind::King] != 1 {
                bail!("Invalid FEN {fen:?}: {} must have exactly one king", color.name());
            }
        }

        let color = fields
            .next()
            .ok_or_else(|| anyhow!("Invalid FEN {fen:?}: missing side to move"))?;
        let mut chars = color.chars();
        self.side_to_move = match (chars.next(), chars.next()) {
            (Some(c), None) => Color::from_char(c)?,
            _ => bail!("Invalid FEN {fen:?}: side to move must be 'w' or 'b'"),
        };

        let mut state = StateInfo {
            castling: self.parse_castling(fields.next().unwrap_or("-")),
            ..Default::default()
        };

        let ep = fields.next().unwrap_or("-");
        state.ep_square = match Square::from_uci(ep) {
            Ok(square) if self.can_capture_en_passant(square) => Some(square),
            Ok(_) => {
                log::warn!("Ignoring impossible en passant square {ep:?} in {fen:?}");
                None
            }
            Err(_) => {
                if ep != "-" {
                    log::warn!("Ignoring malformed en passant square {ep:?} in {fen:?}");
                }
                None
            }
        };

        state.halfmove = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove: u16 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1)
            .max(1);
        self.game_ply = 2 * (fullmove - 1) + self.side_to_move.index() as u16;

        self.states.clear();
        self.states.push(state);
        self.refresh_state();

        Ok(())
    }

    fn parse_castling(&self, field: &str) -> CastlingRights {
        let mut rights = CastlingRights::NONE;

        for c in field.chars() {
            let (color, right, rook) = match c {
                'K' => (Color::White, CastlingRights::WHITE_SHORT, Square::H1),
                'Q' => (Color::White, CastlingRights::WHITE_LONG, Square::A1),
                'k' => (Color::Black, CastlingRights::BLACK_SHORT, Square::H8),
                'q' => (Color::Black, CastlingRights::BLACK_LONG, Square::A8),
                '-' => continue,
                _ => {
                    log::warn!("Ignoring unknown castling right {c:?}");
                    continue;
                }
            };

            let king_home = Square::E1.relative_to(color);
            if self.piece_at(king_home) == Some(Piece::new(color, PieceKind::King))
                && self.piece_at(rook) == Some(Piece::new(color, PieceKind::Rook))
            {
                rights = rights.with(right);
            } else {
                log::warn!("Ignoring castling right {c:?}: king or rook has moved");
            }
        }

        rights
    }

    /// `true` if the side to move has a pawn that could capture onto `ep`,
    /// and the pawn it would capture is where a double push would have left it.
    fn can_capture_en_passant(&self, ep: Square) -> bool {
        let us = self.side_to_move;
        let them = us.opponent();

        ep.relative_rank(us) == Rank::SIX.0
            && self.piece_at(ep).is_none()
            && self.piece_at(ep.backward(us)) == Some(Piece::new(them, PieceKind::Pawn))
            && pawn_attacks(ep, them).intersects(self.pieces(us, PieceKind::Pawn))
    }

    /// Recomputes keys and checkers of the current state from the board.
    fn refresh_state(&mut self) {
        let (key, pawn_key, material_key) = self.keys_from_scratch();
        let checkers = self.attackers_to(self.king_square(self.side_to_move), self.occupied())
            & self.color(self.side_to_move.opponent());

        let state = self.state_mut();
        state.key = key;
        state.pawn_key = pawn_key;
        state.material_key = material_key;
        state.checkers = checkers;
    }

    /// Computes the position, pawn, and material keys without using any incremental state.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let pos = Position::default();
    /// assert_eq!(pos.keys_from_scratch().0, pos.key());
    /// ```
    pub fn keys_from_scratch(&self) -> (ZobristKey, ZobristKey, ZobristKey) {
        let mut key = ZobristKey::default();
        let mut pawn_key = ZobristKey::default();
        let mut material_key = ZobristKey::default();

        for square in self.occupied() {
            if let Some(piece) = self.piece_at(square) {
                key.hash_piece(square, piece);
                if piece.is_pawn() {
                    pawn_key.hash_piece(square, piece);
                }
            }
        }

        for color in Color::all() {
            for kind in PieceKind::all() {
                for nth in 0..self.piece_counts[color][kind] as usize {
                    material_key.hash_material(Piece::new(color, kind), nth);
                }
            }
        }

        let state = self.state();
        if let Some(ep) = state.ep_square {
            key.hash_ep_square(ep);
        }
        key.hash_castling_rights(state.castling);
        if self.side_to_move == Color::Black {
            key.hash_side_to_move();
        }

        (key, pawn_key, material_key)
    }

    /// Position key recomputed from the board, ignoring the incrementally maintained one.
    #[inline(always)]
    pub fn key_from_scratch(&self) -> ZobristKey {
        self.keys_from_scratch().0
    }

    /// Formats this position as a FEN string.
    pub fn to_fen(&self) -> String {
        let mut placement = String::with_capacity(72);

        for rank in Rank::iter().rev() {
            let mut empty = 0;
            for file in File::iter() {
                match self.piece_at(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            placement += &empty.to_string();
                            empty = 0;
                        }
                        placement.push(piece.char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placement += &empty.to_string();
            }
            if rank != Rank::ONE {
                placement.push('/');
            }
        }

        let state = self.state();
        let ep = state
            .ep_square
            .map(|sq| sq.to_string())
            .unwrap_or_else(|| String::from("-"));

        format!(
            "{placement} {} {} {ep} {} {}",
            self.side_to_move.char(),
            state.castling,
            state.halfmove,
            self.fullmove()
        )
    }

    /*****************************************************************************************
     * Board queries
     *****************************************************************************************/

    #[inline(always)]
    pub fn state(&self) -> &StateInfo {
        // There is always at least the root state
        &self.states[self.states.len() - 1]
    }

    #[inline(always)]
    fn state_mut(&mut self) -> &mut StateInfo {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn key(&self) -> ZobristKey {
        self.state().key
    }

    #[inline(always)]
    pub fn pawn_key(&self) -> ZobristKey {
        self.state().pawn_key
    }

    #[inline(always)]
    pub fn material_key(&self) -> ZobristKey {
        self.state().material_key
    }

    #[inline(always)]
    pub fn ep_square(&self) -> Option<Square> {
        self.state().ep_square
    }

    #[inline(always)]
    pub fn castling_rights(&self) -> CastlingRights {
        self.state().castling
    }

    #[inline(always)]
    pub fn halfmove(&self) -> u16 {
        self.state().halfmove
    }

    #[inline(always)]
    pub fn fullmove(&self) -> u16 {
        self.game_ply / 2 + 1
    }

    #[inline(always)]
    pub fn game_ply(&self) -> u16 {
        self.game_ply
    }

    #[inline(always)]
    pub fn checkers(&self) -> Bitboard {
        self.state().checkers
    }

    #[inline(always)]
    pub fn in_check(&self) -> bool {
        self.state().checkers.is_nonempty()
    }

    /// Kind of the piece captured by the last move, if any.
    #[inline(always)]
    pub fn captured_piece(&self) -> Option<PieceKind> {
        self.state().captured
    }

    #[inline(always)]
    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.mailbox[square]
    }

    #[inline(always)]
    pub fn occupied(&self) -> Bitboard {
        self.colors[0] | self.colors[1]
    }

    #[inline(always)]
    pub fn color(&self, color: Color) -> Bitboard {
        self.colors[color]
    }

    #[inline(always)]
    pub fn kind(&self, kind: PieceKind) -> Bitboard {
        self.kinds[kind]
    }

    #[inline(always)]
    pub fn pieces(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.colors[color] & self.kinds[kind]
    }

    /// Rooks and queens.
    #[inline(always)]
    pub fn orthogonal_sliders(&self) -> Bitboard {
        self.kinds[PieceKind::Rook] | self.kinds[PieceKind::Queen]
    }

    /// Bishops and queens.
    #[inline(always)]
    pub fn diagonal_sliders(&self) -> Bitboard {
        self.kinds[PieceKind::Bishop] | self.kinds[PieceKind::Queen]
    }

    #[inline(always)]
    pub fn king_square(&self, color: Color) -> Square {
        self.piece_lists[color][PieceKind::King][0]
    }

    /// Squares of every `kind` piece of `color`, in no particular order.
    #[inline(always)]
    pub fn piece_list(&self, color: Color, kind: PieceKind) -> &[Square] {
        &self.piece_lists[color][kind][..self.piece_counts[color][kind] as usize]
    }

    #[inline(always)]
    pub fn piece_count(&self, color: Color, kind: PieceKind) -> usize {
        self.piece_counts[color][kind] as usize
    }

    /// Sum of the exchange values of all of `color`'s pieces.
    #[inline(always)]
    pub fn material(&self, color: Color) -> i32 {
        self.material[color]
    }

    /// Sum of the exchange values of `color`'s knights, bishops, rooks, and queens.
    #[inline(always)]
    pub fn non_pawn_material(&self, color: Color) -> i32 {
        self.non_pawn_material[color]
    }

    /// The piece that `mv` would move.
    #[inline(always)]
    pub fn moved_piece(&self, mv: Move) -> Option<Piece> {
        self.mailbox[mv.from()]
    }

    #[inline(always)]
    pub fn is_capture(&self, mv: Move) -> bool {
        (self.mailbox[mv.to()].is_some() && !mv.is_castle()) || mv.is_en_passant()
    }

    #[inline(always)]
    pub fn is_capture_or_promotion(&self, mv: Move) -> bool {
        self.is_capture(mv) || mv.is_promotion()
    }

    /// Kind of piece `mv` would capture, if any.
    #[inline(always)]
    pub fn captured_by(&self, mv: Move) -> Option<PieceKind> {
        if mv.is_en_passant() {
            Some(PieceKind::Pawn)
        } else if mv.is_castle() {
            None
        } else {
            self.mailbox[mv.to()].map(|p| p.kind())
        }
    }

    /// All pieces of either color that attack `square`, given `occupied` as the blockers.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let pos = Position::default();
    /// let attackers = pos.attackers_to(Square::F3, pos.occupied());
    /// assert_eq!(attackers, Square::E2.bitboard() | Square::G2.bitboard() | Square::G1.bitboard());
    /// ```
    #[inline(always)]
    pub fn attackers_to(&self, square: Square, occupied: Bitboard) -> Bitboard {
        (pawn_attacks(square, Color::Black) & self.pieces(Color::White, PieceKind::Pawn))
            | (pawn_attacks(square, Color::White) & self.pieces(Color::Black, PieceKind::Pawn))
            | (knight_attacks(square) & self.kinds[PieceKind::Knight])
            | (rook_attacks(square, occupied) & self.orthogonal_sliders())
            | (bishop_attacks(square, occupied) & self.diagonal_sliders())
            | (king_attacks(square) & self.kinds[PieceKind::King])
    }

    /// Pieces (of either color) that are the only blocker between `square` and a slider in `sliders`.
    pub fn slider_blockers(&self, sliders: Bitboard, square: Square) -> Bitboard {
        let snipers = ((rook_rays(square) & self.orthogonal_sliders())
            | (bishop_rays(square) & self.diagonal_sliders()))
            & sliders;
        let occupied = self.occupied();

        let mut blockers = Bitboard::EMPTY_BOARD;
        for sniper in snipers {
            let between = ray_between(square, sniper) & occupied;
            if between.is_nonempty() && !between.more_than_one() {
                blockers |= between;
            }
        }
        blockers
    }

    /// `color`'s pieces that are pinned to its own king.
    #[inline(always)]
    pub fn pinned(&self, color: Color) -> Bitboard {
        self.slider_blockers(self.colors[color.opponent()], self.king_square(color))
            & self.colors[color]
    }

    /*****************************************************************************************
     * Move validation
     *****************************************************************************************/

    /// Returns `true` if the pseudo-legal move `mv` does not leave our king in check.
    ///
    /// `pinned` must be the side to move's pinned pieces, see [`Position::pinned`].
    pub fn is_legal(&self, mv: Move, pinned: Bitboard) -> bool {
        let us = self.side_to_move;
        let them = us.opponent();
        let from = mv.from();
        let to = mv.to();
        let king = self.king_square(us);

        // Both the capturer and the captured pawn vanish from the capture's rank
        if mv.is_en_passant() {
            let captured = to.backward(us);
            let occupied = (self.occupied() ^ from ^ captured) | to;

            return (rook_attacks(king, occupied) & self.orthogonal_sliders() & self.colors[them])
                .is_empty()
                && (bishop_attacks(king, occupied) & self.diagonal_sliders() & self.colors[them])
                    .is_empty();
        }

        if from == king {
            // Castling paths are verified during generation
            return mv.is_castle()
                || (self.attackers_to(to, self.occupied() ^ from) & self.colors[them]).is_empty();
        }

        !pinned.contains(from) || aligned(from, to, king)
    }

    /// Returns `true` if `mv` could have been generated in this position, ignoring pins.
    ///
    /// Moves taken from the transposition table or killer slots may come from another position;
    /// this guards against playing them blindly.
    pub fn pseudo_legal(&self, mv: Move) -> bool {
        if !mv.is_ok() {
            return false;
        }

        // Special moves are rare enough to check against the full list
        if mv.kind() != MoveKind::Normal {
            return self.legal_moves().contains(&mv);
        }

        let us = self.side_to_move;
        let them = us.opponent();
        let from = mv.from();
        let to = mv.to();

        let Some(piece) = self.piece_at(from) else {
            return false;
        };
        if piece.color() != us || self.colors[us].contains(to) {
            return false;
        }

        let occupied = self.occupied();
        if piece.is_pawn() {
            // Promotions are never encoded as normal moves
            if to.relative_rank(us) == Rank::EIGHT.0 {
                return false;
            }

            let single = from.forward(us);
            let is_capture = pawn_attacks(from, us).contains(to) && self.colors[them].contains(to);
            let is_push = single == to && !occupied.contains(to);
            let is_double = from.relative_rank(us) == Rank::TWO.0
                && single.forward(us) == to
                && !occupied.contains(single)
                && !occupied.contains(to);

            if !is_capture && !is_push && !is_double {
                return false;
            }
        } else if !super::attacks_for(piece.kind(), from, occupied).contains(to) {
            return false;
        }

        let checkers = self.checkers();
        if checkers.is_nonempty() {
            if !piece.is_king() {
                // Double check can only be escaped by the king
                if checkers.more_than_one() {
                    return false;
                }

                let checker = checkers.lsb_unchecked();
                let target = ray_between(checker, self.king_square(us)) | checkers;
                if !target.contains(to) {
                    return false;
                }
            } else if (self.attackers_to(to, occupied ^ from) & self.colors[them]).is_nonempty() {
                return false;
            }
        }

        true
    }

    /// Returns `true` if the pseudo-legal move `mv` checks the opponent.
    pub fn gives_check(&self, mv: Move, ci: &CheckInfo) -> bool {
        let us = self.side_to_move;
        let from = mv.from();
        let to = mv.to();
        let Some(piece) = self.piece_at(from) else {
            return false;
        };

        // Direct check
        if ci.check_squares[piece.kind()].contains(to) {
            return true;
        }

        // Discovered check
        if ci.discovered.contains(from) && !aligned(from, to, ci.king_square) {
            return true;
        }

        let occupied = self.occupied();
        match mv.kind() {
            MoveKind::Normal => false,

            MoveKind::Promotion => mv.promotion().is_some_and(|promotion| {
                super::attacks_for(promotion, to, occupied ^ from).contains(ci.king_square)
            }),

            MoveKind::EnPassant => {
                let captured = to.backward(us);
                let occupied = (occupied ^ from ^ captured) | to;
                let ours = self.colors[us];

                (rook_attacks(ci.king_square, occupied) & self.orthogonal_sliders() & ours)
                    .is_nonempty()
                    || (bishop_attacks(ci.king_square, occupied) & self.diagonal_sliders() & ours)
                        .is_nonempty()
            }

            MoveKind::Castle => {
                let (rook_from, rook_to) = castling_rook_squares(to);
                let occupied = (occupied ^ from ^ rook_from) | to | rook_to;
                rook_attacks(rook_to, occupied).contains(ci.king_square)
            }
        }
    }

    /// The Zobrist key after `mv`, ignoring castling and en passant changes.
    ///
    /// Only used to prefetch transposition table entries.
    pub fn next_key(&self, mv: Move) -> ZobristKey {
        let mut key = self.key();
        key.hash_side_to_move();

        if let Some(piece) = self.piece_at(mv.from()) {
            key.hash_piece(mv.from(), piece);
            key.hash_piece(mv.to(), piece);
            if let Some(captured) = self.piece_at(mv.to()).filter(|_| !mv.is_castle()) {
                key.hash_piece(mv.to(), captured);
            }
        }

        key
    }

    /*****************************************************************************************
     * Make / unmake
     *****************************************************************************************/

    /// Plays the pseudo-legal move `mv` and pushes a new [`StateInfo`].
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// let mut pos = Position::default();
    /// let before = pos.key();
    /// let mv = Move::from_uci(&pos, "e2e4");
    ///
    /// pos.make_move(mv);
    /// assert_eq!(pos.side_to_move(), Color::Black);
    /// assert_eq!(pos.key(), pos.keys_from_scratch().0);
    ///
    /// pos.unmake_move(mv);
    /// assert_eq!(pos.key(), before);
    /// ```
    pub fn make_move(&mut self, mv: Move) {
        let ci = CheckInfo::new(self);
        let gives_check = self.gives_check(mv, &ci);

        let us = self.side_to_move;
        let them = us.opponent();
        let from = mv.from();
        let to = mv.to();

        let Some(piece) = self.piece_at(from) else {
            debug_assert!(false, "make_move({mv}) with no piece on {from}");
            return;
        };

        let mut state = *self.state();
        state.halfmove += 1;
        state.plies_from_null += 1;
        state.captured = None;

        state.key.hash_side_to_move();
        if let Some(ep) = state.ep_square.take() {
            state.key.hash_ep_square(ep);
        }

        if mv.is_castle() {
            let (rook_from, rook_to) = castling_rook_squares(to);
            let rook = Piece::new(us, PieceKind::Rook);

            self.remove_piece(rook_from);
            self.move_piece(from, to);
            self.put_piece(rook, rook_to);

            state.key.hash_piece(from, piece);
            state.key.hash_piece(to, piece);
            state.key.hash_piece(rook_from, rook);
            state.key.hash_piece(rook_to, rook);
        } else {
            let capture_square = if mv.is_en_passant() {
                to.backward(us)
            } else {
                to
            };

            if let Some(captured) = self.piece_at(capture_square) {
                debug_assert_eq!(captured.color(), them);
                debug_assert!(!captured.is_king());

                self.remove_piece(capture_square);
                state.key.hash_piece(capture_square, captured);
                if captured.is_pawn() {
                    state.pawn_key.hash_piece(capture_square, captured);
                }
                state
                    .material_key
                    .hash_material(captured, self.piece_count(them, captured.kind()));

                state.captured = Some(captured.kind());
                state.halfmove = 0;
            }

            self.move_piece(from, to);
            state.key.hash_piece(from, piece);
            state.key.hash_piece(to, piece);

            if piece.is_pawn() {
                state.pawn_key.hash_piece(from, piece);
                state.halfmove = 0;

                if let Some(promotion) = mv.promotion() {
                    let promoted = Piece::new(us, promotion);

                    self.remove_piece(to);
                    state
                        .material_key
                        .hash_material(piece, self.piece_count(us, PieceKind::Pawn));
                    state
                        .material_key
                        .hash_material(promoted, self.piece_count(us, promotion));
                    self.put_piece(promoted, to);

                    state.key.hash_piece(to, piece);
                    state.key.hash_piece(to, promoted);
                } else {
                    state.pawn_key.hash_piece(to, piece);

                    // Only record en passant when it can actually be played
                    let skipped = from.forward(us);
                    if skipped.forward(us) == to
                        && pawn_attacks(skipped, us).intersects(self.pieces(them, PieceKind::Pawn))
                    {
                        state.ep_square = Some(skipped);
                        state.key.hash_ep_square(skipped);
                    }
                }
            }
        }

        let revoked = CASTLING_MASKS[from] | CASTLING_MASKS[to];
        if state.castling.0 & revoked != 0 {
            state.key.hash_castling_rights(state.castling);
            state.castling = state.castling.without(revoked);
            state.key.hash_castling_rights(state.castling);
        }

        state.checkers = if !gives_check {
            Bitboard::EMPTY_BOARD
        } else if mv.kind() == MoveKind::Normal && !ci.discovered.contains(from) {
            to.bitboard()
        } else {
            self.attackers_to(ci.king_square, self.occupied()) & self.colors[us]
        };

        self.side_to_move = them;
        self.game_ply += 1;
        self.states.push(state);

        debug_assert_eq!(self.key(), self.keys_from_scratch().0, "after {mv}");
    }

    /// Reverts `mv`, which must be the last move made.
    pub fn unmake_move(&mut self, mv: Move) {
        let us = self.side_to_move.opponent();
        let them = self.side_to_move;
        let from = mv.from();
        let to = mv.to();

        let captured = self.state().captured;
        self.states.pop();
        self.side_to_move = us;
        self.game_ply -= 1;

        match mv.kind() {
            MoveKind::Castle => {
                let (rook_from, rook_to) = castling_rook_squares(to);
                self.remove_piece(rook_to);
                self.move_piece(to, from);
                self.put_piece(Piece::new(us, PieceKind::Rook), rook_from);
            }

            MoveKind::Promotion => {
                self.remove_piece(to);
                self.put_piece(Piece::new(us, PieceKind::Pawn), from);
            }

            _ => self.move_piece(to, from),
        }

        if let Some(captured) = captured {
            let capture_square = if mv.is_en_passant() {
                to.backward(us)
            } else {
                to
            };
            self.put_piece(Piece::new(them, captured), capture_square);
        }
    }

    /// Passes the turn to the opponent. Must not be called while in check.
    pub fn make_null_move(&mut self) {
        debug_assert!(!self.in_check());

        let mut state = *self.state();
        state.key.hash_side_to_move();
        if let Some(ep) = state.ep_square.take() {
            state.key.hash_ep_square(ep);
        }
        state.halfmove += 1;
        state.plies_from_null = 0;
        state.captured = None;
        state.checkers = Bitboard::EMPTY_BOARD;

        self.states.push(state);
        self.side_to_move = self.side_to_move.opponent();
    }

    /// Reverts [`Position::make_null_move`].
    pub fn undo_null_move(&mut self) {
        self.states.pop();
        self.side_to_move = self.side_to_move.opponent();
    }

    fn put_piece(&mut self, piece: Piece, square: Square) {
        let (color, kind) = (piece.color(), piece.kind());

        self.colors[color] |= square;
        self.kinds[kind] |= square;
        self.mailbox[square] = Some(piece);

        let count = self.piece_counts[color][kind];
        self.piece_lists[color][kind][count as usize] = square;
        self.list_index[square] = count;
        self.piece_counts[color][kind] = count + 1;

        self.material[color] += kind.value();
        if kind != PieceKind::Pawn {
            self.non_pawn_material[color] += kind.value();
        }
    }

    fn remove_piece(&mut self, square: Square) {
        let Some(piece) = self.mailbox[square].take() else {
            return;
        };
        let (color, kind) = (piece.color(), piece.kind());

        self.colors[color] ^= square;
        self.kinds[kind] ^= square;

        // Swap the last entry into the hole
        let count = self.piece_counts[color][kind] - 1;
        let last = self.piece_lists[color][kind][count as usize];
        let index = self.list_index[square];
        self.piece_lists[color][kind][index as usize] = last;
        self.list_index[last] = index;
        self.piece_counts[color][kind] = count;

        self.material[color] -= kind.value();
        if kind != PieceKind::Pawn {
            self.non_pawn_material[color] -= kind.value();
        }
    }

    fn move_piece(&mut self, from: Square, to: Square) {
        let Some(piece) = self.mailbox[from].take() else {
            return;
        };
        let (color, kind) = (piece.color(), piece.kind());
        let both = from.bitboard() | to;

        self.colors[color] ^= both;
        self.kinds[kind] ^= both;
        self.mailbox[to] = Some(piece);

        let index = self.list_index[from];
        self.piece_lists[color][kind][index as usize] = to;
        self.list_index[to] = index;
    }

    /*****************************************************************************************
     * Static exchange evaluation
     *****************************************************************************************/

    /// The least valuable of `color`'s pieces in `attackers`.
    #[inline(always)]
    fn least_valuable_attacker(&self, attackers: Bitboard, color: Color) -> Option<(PieceKind, Square)> {
        let ours = attackers & self.colors[color];
        PieceKind::all().into_iter().find_map(|kind| {
            (ours & self.kinds[kind]).lsb().map(|square| (kind, square))
        })
    }

    /// Sliders that attack `square` through `occupied`.
    #[inline(always)]
    fn slider_attackers(&self, square: Square, occupied: Bitboard) -> Bitboard {
        (rook_attacks(square, occupied) & self.orthogonal_sliders())
            | (bishop_attacks(square, occupied) & self.diagonal_sliders())
    }

    /// Material balance of the capture sequence started by `mv` on its target square.
    ///
    /// Both sides recapture with their least valuable attacker and may stop whenever continuing would lose.
    /// A king only recaptures if the opponent has nothing left to take it with.
    /// En passant wins the pawn it removes. Castling and promotions evaluate to `0`.
    ///
    /// # Example
    /// ```
    /// # use talon::*;
    /// // Pawn takes knight, pawn takes back
    /// let pos = Position::from_fen("4k3/8/2p5/3n4/4P3/8/8/4K3 w - - 0 1").unwrap();
    /// let mv = Move::from_uci(&pos, "e4d5");
    /// assert_eq!(pos.see(mv), 325 - 100);
    /// ```
    pub fn see(&self, mv: Move) -> i32 {
        let Some((captured, occupied)) = self.exchange_start(mv) else {
            return 0;
        };

        let to = mv.to();
        let Some(piece) = self.piece_at(mv.from()) else {
            return 0;
        };

        let mut gain = [0i32; 32];
        gain[0] = captured;

        let mut occupied = occupied;
        let mut attackers = self.attackers_to(to, occupied) & occupied;
        let mut victim = piece.kind().value();
        let mut stm = piece.color().opponent();
        let mut depth = 0;

        while let Some((kind, square)) = self.least_valuable_attacker(attackers, stm) {
            if kind == PieceKind::King && (attackers & self.colors[stm.opponent()]).is_nonempty() {
                break;
            }

            depth += 1;
            gain[depth] = victim - gain[depth - 1];
            victim = kind.value();

            occupied ^= square;
            attackers |= self.slider_attackers(to, occupied);
            attackers &= occupied;
            stm = stm.opponent();
        }

        while depth > 0 {
            gain[depth - 1] = -(-gain[depth - 1]).max(gain[depth]);
            depth -= 1;
        }

        gain[0]
    }

    /// Returns `true` if the exchange started by `mv` wins at least `threshold`.
    ///
    /// Agrees with `self.see(mv) >= threshold`, but stops as soon as the outcome is decided.
    pub fn see_ge(&self, mv: Move, threshold: i32) -> bool {
        let Some((captured, occupied)) = self.exchange_start(mv) else {
            return 0 >= threshold;
        };

        let to = mv.to();
        let Some(piece) = self.piece_at(mv.from()) else {
            return 0 >= threshold;
        };

        let mut swap = captured - threshold;
        if swap < 0 {
            return false;
        }

        swap = piece.kind().value() - swap;
        if swap <= 0 {
            return true;
        }

        let mut occupied = occupied;
        if occupied.contains(to) {
            occupied ^= to;
        }
        let mut stm = piece.color();
        let mut attackers = self.attackers_to(to, occupied);
        let mut result = true;

        loop {
            stm = stm.opponent();
            attackers &= occupied;

            let Some((kind, square)) = self.least_valuable_attacker(attackers, stm) else {
                break;
            };

            result = !result;

            if kind == PieceKind::King {
                // The king may only capture if nothing can take it back
                return if (attackers & self.colors[stm.opponent()]).is_nonempty() {
                    !result
                } else {
                    result
                };
            }

            swap = kind.value() - swap;
            if swap < result as i32 {
                break;
            }

            occupied ^= square;
            attackers |= self.slider_attackers(to, occupied);
        }

        result
    }

    /// Value of the piece `mv` captures, and the occupancy once the mover and its victim have left.
    ///
    /// `None` for moves the exchange evaluation does not score.
    fn exchange_start(&self, mv: Move) -> Option<(i32, Bitboard)> {
        let from = mv.from();
        let to = mv.to();
        match mv.kind() {
            MoveKind::Normal => Some((
                self.piece_at(to).map_or(0, |p| p.kind().value()),
                self.occupied() ^ from,
            )),
            MoveKind::EnPassant => Some((
                PieceKind::Pawn.value(),
                self.occupied() ^ from ^ to.backward(self.side_to_move),
            )),
            _ => None,
        }
    }

    /// Exchange value of `mv`, or [`SEE_KNOWN_WIN`] if the mover is worth no more than its victim.
    ///
    /// En passant is always a pawn for a pawn.
    pub fn see_sign(&self, mv: Move) -> i32 {
        if mv.is_en_passant() {
            return SEE_KNOWN_WIN;
        }

        if mv.kind() == MoveKind::Normal {
            if let (Some(piece), Some(victim)) = (self.piece_at(mv.from()), self.piece_at(mv.to())) {
                if piece.kind().value() <= victim.kind().value() {
                    return SEE_KNOWN_WIN;
                }
            }
        }

        self.see(mv)
    }

    /*****************************************************************************************
     * Draws
     *****************************************************************************************/

    /// Returns `true` if the position is drawn by the fifty-move rule or by repetition.
    ///
    /// `ply` is the distance from the search root. A single repetition of a position
    /// reached after the root is enough; positions from before the root must occur twice.
    pub fn is_draw(&self, ply: usize) -> bool {
        let state = self.state();

        // Checkmate takes precedence over the fifty-move rule
        if state.halfmove >= 100 && (!self.in_check() || self.has_legal_move()) {
            return true;
        }

        let last = self.states.len() - 1;
        let end = (state.halfmove.min(state.plies_from_null) as usize).min(last);
        if end < 4 {
            return false;
        }

        let mut count = 0;
        let mut i = 4;
        while i <= end {
            if self.states[last - i].key == state.key {
                count += 1;
                if count + (ply > i) as usize >= 2 {
                    return true;
                }
            }
            i += 2;
        }

        false
    }

    /// Returns `true` if the side to move has at least one legal move.
    pub fn has_legal_move(&self) -> bool {
        !self.legal_moves().is_empty()
    }

    /// Checks that every redundant representation of the board agrees and that the incremental keys
    /// match a fresh computation.
    pub fn validate(&self) -> Result<()> {
        for square in Square::iter() {
            let piece = self.mailbox[square];
            for color in Color::all() {
                for kind in PieceKind::all() {
                    let in_bitboards = self.pieces(color, kind).contains(square);
                    if in_bitboards != (piece == Some(Piece::new(color, kind))) {
                        bail!("Bitboards and mailbox disagree on {square}");
                    }
                }
            }
        }

        for color in Color::all() {
            for kind in PieceKind::all() {
                let listed = self.piece_list(color, kind).iter().copied().collect::<Bitboard>();
                if listed != self.pieces(color, kind) || listed.population() as usize != self.piece_count(color, kind) {
                    bail!("Piece list for {} {} disagrees with bitboards", color.name(), kind.name());
                }
                for &square in self.piece_list(color, kind) {
                    let index = self.list_index[square] as usize;
                    if self.piece_list(color, kind)[index] != square {
                        bail!("List index of {square} is stale");
                    }
                }
            }
        }

        let (key, pawn_key, material_key) = self.keys_from_scratch();
        let state = self.state();
        if key != state.key || pawn_key != state.pawn_key || material_key != state.material_key {
            bail!("Incremental keys disagree with keys computed from scratch");
        }

        let checkers = self.attackers_to(self.king_square(self.side_to_move), self.occupied())
            & self.colors[self.side_to_move.opponent()];
        if checkers != state.checkers {
            bail!("Checkers {:?} should be {checkers:?}", state.checkers);
        }

        Ok(())
    }
}

/// Where the rook starts and ends when the king castles onto `king_to`.
#[inline(always)]
pub const fn castling_rook_squares(king_to: Square) -> (Square, Square) {
    match king_to.file().0 {
        6 => (
            Square::new(File::H, king_to.rank()),
            Square::new(File::F, king_to.rank()),
        ),
        _ => (
            Square::new(File::A, king_to.rank()),
            Square::new(File::D, king_to.rank()),
        ),
    }
}

impl Default for Position {
    /// The standard starting position.
    fn default() -> Self {
        let mut position = Self::empty();
        // The start position always parses
        if let Err(e) = position.parse_fen(FEN_STARTPOS) {
            log::error!("Failed to parse the start position: {e}");
        }
        position
    }
}

impl PartialEq for Position {
    /// Positions are equal if the board, side to move, and current state agree.
    ///
    /// Piece lists are compared as sets, since their order depends on move history.
    fn eq(&self, other: &Self) -> bool {
        self.colors == other.colors
            && self.kinds == other.kinds
            && self.mailbox == other.mailbox
            && self.side_to_move == other.side_to_move
            && self.state() == other.state()
            && self.game_ply == other.game_ply
            && self.material == other.material
            && self.non_pawn_material == other.non_pawn_material
            && Color::all().into_iter().all(|color| {
                PieceKind::all().into_iter().all(|kind| {
                    let mut ours = self.piece_list(color, kind).to_vec();
                    let mut theirs = other.piece_list(color, kind).to_vec();
                    ours.sort_unstable();
                    theirs.sort_unstable();
                    ours == theirs
                })
            })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            write!(f, "{rank}| ")?;
            for file in File::iter() {
                let c = self
                    .piece_at(Square::new(file, rank))
                    .map_or('.', |piece| piece.char());
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        writeln!(f, " +----------------")?;
        writeln!(f, "   a b c d e f g h")?;
        writeln!(f)?;
        writeln!(f, "FEN: {}", self.to_fen())?;
        write!(f, "Key: {}", self.key())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_fen())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    /// Plays every legal move to `depth`, checking invariants after each make and unmake.
    fn check_make_unmake(position: &mut Position, depth: usize) {
        if depth == 0 {
            return;
        }

        for mv in position.legal_moves() {
            let before = position.clone();

            position.make_move(mv);
            position.validate().unwrap_or_else(|e| panic!("after {mv} in {before:?}: {e}"));
            check_make_unmake(position, depth - 1);
            position.unmake_move(mv);

            assert!(*position == before, "unmaking {mv} did not restore {before:?}");
            assert_eq!(position.key(), before.key());
        }
    }

    #[test]
    fn test_make_unmake_round_trip() {
        for fen in [
            FEN_STARTPOS,
            FEN_KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ] {
            let mut position = Position::from_fen(fen).unwrap();
            position.validate().unwrap();
            check_make_unmake(&mut position, 3);
        }
    }

    #[test]
    fn test_zobrist_consistency_over_a_game() {
        let mut position = Position::default();
        let moves = [
            "e2e4", "c7c5", "g1f3", "d7d6", "d2d4", "c5d4", "f3d4", "g8f6", "b1c3", "a7a6",
            "c1e3", "e7e5", "d4b3", "c8e6", "f2f3", "f8e7", "d1d2", "e8g8", "e1c1", "b8d7",
            "g2g4", "b7b5", "g4g5", "b5b4", "c3e2", "f6e8", "f3f4", "a6a5", "f4f5", "a5a4",
            "f5e6", "a4b3", "e6d7", "b3a2",
        ];

        let mut history = vec![(position.clone(), Move::NONE)];
        for uci in moves {
            let mv = Move::from_uci(&position, uci);
            assert_ne!(mv, Move::NONE, "{uci} should be legal in {position:?}");
            position.make_move(mv);
            position.validate().unwrap();
            history.push((position.clone(), mv));
        }

        // Unwind the whole game, comparing against the snapshots taken on the way in
        while let Some((_, mv)) = history.pop() {
            let Some((previous, _)) = history.last() else {
                break;
            };
            position.unmake_move(mv);
            assert!(position == *previous, "unmaking {mv}");
            position.validate().unwrap();
        }
        assert_eq!(position.to_fen(), FEN_STARTPOS);
    }

    #[test]
    fn test_transposition_keys_match() {
        let mut a = Position::default();
        for uci in ["g1f3", "g8f6", "b1c3", "b8c6"] {
            a.make_move(Move::from_uci(&a, uci));
        }

        let mut b = Position::default();
        for uci in ["b1c3", "b8c6", "g1f3", "g8f6"] {
            b.make_move(Move::from_uci(&b, uci));
        }

        assert_eq!(a.key(), b.key());
        assert_eq!(a.pawn_key(), b.pawn_key());
        assert_eq!(a.material_key(), b.material_key());
    }

    #[test]
    fn test_en_passant_only_when_capturable() {
        let mut pos = Position::default();
        pos.make_move(Move::from_uci(&pos, "e2e4"));
        assert_eq!(pos.ep_square(), None);

        let mut pos = Position::from_fen("4k3/8/8/8/3p4/8/4P3/4K3 w - - 0 1").unwrap();
        pos.make_move(Move::from_uci(&pos, "e2e4"));
        assert_eq!(pos.ep_square(), Some(Square::E3));
        assert!(pos.to_fen().contains(" e3 "));
    }

    #[test]
    fn test_fen_tolerance() {
        // Castling rights without the rook are dropped
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w KQkq - 0 1").unwrap();
        assert_eq!(pos.castling_rights(), CastlingRights::NONE);

        // Garbage en passant becomes none
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - zz 0 1").unwrap();
        assert_eq!(pos.ep_square(), None);

        // Missing clocks get defaults
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 b -").unwrap();
        assert_eq!(pos.halfmove(), 0);
        assert_eq!(pos.fullmove(), 1);
        assert_eq!(pos.game_ply(), 1);

        assert!(Position::from_fen("4k3/8/8/8/8/8/8/8 w - - 0 1").is_err());
        assert!(Position::from_fen("4k3/8/8/8/8/8/4K3 w - - 0 1").is_err());
        assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 x - - 0 1").is_err());
        assert!(Position::from_fen("4k3/9/8/8/8/8/8/4K3 w - - 0 1").is_err());
    }

    #[test]
    fn test_reset() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        pos.reset(None).unwrap();
        assert_eq!(pos.to_fen(), FEN_STARTPOS);

        assert!(pos.reset(Some("bogus")).is_err());
        assert_eq!(pos.to_fen(), FEN_STARTPOS);
    }

    #[test]
    fn test_castling_rights_revoked() {
        let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        pos.make_move(Move::from_uci(&pos, "h1h8"));
        assert_eq!(pos.castling_rights(), CastlingRights::WHITE_LONG | CastlingRights::BLACK_LONG);
        assert_eq!(pos.key(), pos.keys_from_scratch().0);

        pos.make_move(Move::from_uci(&pos, "e8d7"));
        assert_eq!(pos.castling_rights(), CastlingRights::WHITE_LONG);
    }

    #[test]
    fn test_castling_moves_rook() {
        let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1").unwrap();
        pos.make_move(Move::from_uci(&pos, "e8c8"));
        assert_eq!(pos.piece_at(Square::D8), Some(Piece::BLACK_ROOK));
        assert_eq!(pos.piece_at(Square::C8), Some(Piece::BLACK_KING));
        assert_eq!(pos.piece_at(Square::A8), None);
        pos.validate().unwrap();
    }

    #[test]
    fn test_null_move() {
        let mut pos = Position::from_fen("4k3/8/8/8/3p4/8/4P3/4K3 w - - 0 1").unwrap();
        pos.make_move(Move::from_uci(&pos, "e2e4"));
        let before = pos.clone();

        pos.make_null_move();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.ep_square(), None);
        assert_eq!(pos.key(), pos.keys_from_scratch().0);

        pos.undo_null_move();
        assert!(pos == before);
    }

    #[test]
    fn test_see() {
        // Pawn takes a knight defended by a pawn
        let pos = Position::from_fen("4k3/8/2p5/3n4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "e4d5");
        assert_eq!(pos.see(mv), 225);

        // Rook takes a pawn defended by a rook, and a second rook backs up each side
        let pos = Position::from_fen("3rk3/3r4/8/3p4/8/8/3R4/3RK3 w - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "d2d5");
        assert_eq!(pos.see(mv), 100 - 500);

        // Undefended piece
        let pos = Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "d2d5");
        assert_eq!(pos.see(mv), 1000);
        assert_eq!(pos.see_sign(mv), SEE_KNOWN_WIN);

        // Queen takes a defended pawn
        let pos = Position::from_fen("4k3/2p5/3p4/8/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "d2d6");
        assert_eq!(pos.see(mv), 100 - 1000);
        assert!(!pos.see_ge(mv, 0));

        // The king cannot recapture into a defended square
        let pos = Position::from_fen("8/8/8/3k4/4p3/8/3N4/4RK2 w - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "d2e4");
        assert_eq!(pos.see(mv), 100);
        assert!(pos.see_ge(mv, 100));
        assert!(!pos.see_ge(mv, 101));
        let mv = Move::from_uci(&pos, "e1e4");
        assert_eq!(pos.see(mv), 100);

        // En passant wins the pawn that just advanced two squares
        let pos = Position::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let mv = Move::new(Square::E5, Square::D6, MoveKind::EnPassant);
        assert_eq!(pos.see(mv), 100);
        assert!(pos.see_ge(mv, 100));
        assert!(!pos.see_ge(mv, 101));
        assert_eq!(pos.see_sign(mv), SEE_KNOWN_WIN);

        // ... unless the capturing pawn is taken back
        let pos = Position::from_fen("4k3/2p5/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let mv = Move::new(Square::E5, Square::D6, MoveKind::EnPassant);
        assert_eq!(pos.see(mv), 0);
        assert!(pos.see_ge(mv, 0));
        assert!(!pos.see_ge(mv, 1));
    }

    #[test]
    fn test_see_ge_agrees_with_see() {
        for fen in [
            FEN_KIWIPETE,
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "1k1r4/1pp4p/p7/4p3/8/P5P1/1PP4P/2K1R3 w - - 0 1",
            "1k1r3q/1ppn3p/p4b2/4p3/8/P2N2P1/1PP1R1BP/2K1Q3 w - - 0 1",
            "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            for mv in pos.legal_moves() {
                let see = pos.see(mv);
                for threshold in [-1000, -500, -325, -100, -1, 0, 1, 100, 225, 325, 500, 1000] {
                    assert_eq!(
                        pos.see_ge(mv, threshold),
                        see >= threshold,
                        "see({mv}) = {see}, threshold {threshold} in {fen}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_fifty_move_rule() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").unwrap();
        assert!(pos.is_draw(0));

        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 99 80").unwrap();
        assert!(!pos.is_draw(0));

        // Checkmate on the hundredth ply is not a draw
        let pos = Position::from_fen("R3k3/8/4K3/8/8/8/8/8 b - - 100 80").unwrap();
        assert!(pos.in_check());
        assert!(!pos.is_draw(0));

        // A check that can be escaped does not save the game
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4RK2 b - - 100 80").unwrap();
        assert!(pos.in_check());
        assert!(pos.has_legal_move());
        assert!(pos.is_draw(0));

        // Stalemate with the clock run out
        let pos = Position::from_fen("k7/8/1Q6/8/8/8/8/K7 b - - 100 80").unwrap();
        assert!(!pos.in_check());
        assert!(!pos.has_legal_move());
        assert!(pos.is_draw(0));
    }

    #[test]
    fn test_repetition() {
        let mut pos = Position::default();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];

        for uci in shuffle {
            pos.make_move(Move::from_uci(&pos, uci));
        }

        // One repetition is enough when the earlier occurrence is inside the search
        assert!(pos.is_draw(5));
        // The root itself, or anything before it, must occur twice more
        assert!(!pos.is_draw(4));
        assert!(!pos.is_draw(0));

        for uci in shuffle {
            pos.make_move(Move::from_uci(&pos, uci));
        }
        assert!(pos.is_draw(0));
    }

    #[test]
    fn test_gives_check() {
        for fen in [
            FEN_KIWIPETE,
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "3k4/8/8/8/8/8/8/R3K2R w KQ - 0 1",
            "8/8/8/k1pP3R/8/8/8/4K3 w - c6 0 1",
        ] {
            let mut pos = Position::from_fen(fen).unwrap();
            let ci = CheckInfo::new(&pos);
            for mv in pos.legal_moves() {
                let predicted = pos.gives_check(mv, &ci);
                pos.make_move(mv);
                assert_eq!(predicted, pos.in_check(), "{mv} in {fen}");
                pos.unmake_move(mv);
            }
        }
    }

    #[test]
    fn test_pseudo_legal() {
        let pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        for mv in pos.legal_moves() {
            assert!(pos.pseudo_legal(mv), "{mv} should be pseudo-legal");
        }

        assert!(!pos.pseudo_legal(Move::NONE));
        assert!(!pos.pseudo_legal(Move::NULL));
        // Black piece
        assert!(!pos.pseudo_legal(Move::new(Square::A8, Square::B8, MoveKind::Normal)));
        // Blocked slider
        assert!(!pos.pseudo_legal(Move::new(Square::A1, Square::A3, MoveKind::Normal)));
        // Castling without the right
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w - - 0 1").unwrap();
        assert!(!pos.pseudo_legal(Move::new(Square::E1, Square::G1, MoveKind::Castle)));
    }
}
