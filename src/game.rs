//! A single absorption-chess match: position, clock, turn, promotion-pending
//! protocol, and history. A `Game` is owned exclusively by one Match
//! Controller for the lifetime of a match.

use crate::rules;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct KingCastled {
    pub white: bool,
    pub black: bool,
}

/// Board state immediately before a promoting move, kept around only while
/// `promotion_pending` is set so that `cancel_promotion` can restore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromotionSnapshot {
    board_before: Board,
    en_passant_before: Option<Square>,
    history_len_before: usize,
}

/// Settings a match is started with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GameSettings {
    pub time_minutes: u32,
    pub time_increment_seconds: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            time_minutes: 10,
            time_increment_seconds: 0,
        }
    }
}

/// What calling `apply_move` accomplished, distinguishing the
/// promotion-pending branch (turn does not switch) from a completed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveApplied {
    PromotionPending,
    Completed { game_over: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub board: Board,
    pub turn: Color,
    pub game_over: bool,
    pub winner: Option<Color>,
    pub end_reason: Option<GameOverReason>,
    pub history: Vec<MoveHistoryEntry>,
    pub white_in_check: bool,
    pub black_in_check: bool,
    pub en_passant: Option<Square>,
    pub promotion_pending: Option<PromotionPending>,
    pub clock: Clock,
    pub king_castled: KingCastled,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    promotion_snapshot: Option<PromotionSnapshot>,
}

impl Game {
    /// Sets up the standard starting position, white to move, clocks seeded
    /// from `settings`.
    pub fn new(settings: GameSettings, now_ms: i64) -> Self {
        let initial_ms = settings.time_minutes as i64 * 60_000;
        let increment_ms = settings.time_increment_seconds as i64 * 1_000;
        Self {
            board: Board::starting_position(),
            turn: Color::White,
            game_over: false,
            winner: None,
            end_reason: None,
            history: Vec::new(),
            white_in_check: false,
            black_in_check: false,
            en_passant: None,
            promotion_pending: None,
            clock: Clock::new(initial_ms, increment_ms, now_ms),
            king_castled: KingCastled::default(),
            promotion_snapshot: None,
        }
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    /// Legal destinations for the side to move, keyed by origin square —
    /// published to clients as `valid_moves`; the server re-validates every
    /// incoming move regardless of what was published.
    pub fn legal_moves(&self) -> std::collections::HashMap<Square, Vec<Square>> {
        if self.game_over || self.promotion_pending.is_some() {
            return std::collections::HashMap::new();
        }
        rules::legal_moves_by_origin(&self.board, self.turn, self.en_passant)
    }

    /// Validates and applies a move submitted by the side to move.
    pub fn apply_move(&mut self, from: Square, to: Square, now_ms: i64) -> Result<MoveApplied, MoveError> {
        if self.game_over {
            return Err(MoveError::GameOver);
        }
        if self.promotion_pending.is_some() {
            return Err(MoveError::PromotionPendingMustResolve);
        }
        if !Square::in_bounds(from.row as i16, from.col as i16)
            || !Square::in_bounds(to.row as i16, to.col as i16)
        {
            return Err(MoveError::OutOfBounds);
        }

        let piece = self.board.get(from).ok_or(MoveError::NoPiece)?;
        if piece.color != self.turn {
            return Err(MoveError::WrongTurn);
        }
        if let Some(target) = self.board.get(to) {
            if target.color == piece.color {
                return Err(MoveError::OwnPieceAtTarget);
            }
        }

        let legal = rules::generate_legal_moves(&self.board, self.turn, self.en_passant);
        let mv = match legal.iter().find(|m| m.from == from && m.to == to) {
            Some(m) => *m,
            None => return Err(self.classify_illegal(from, to)),
        };

        // A move that lands a pawn on the back rank leaves the turn open
        // (promotion-pending) until the player resolves it, so the clock
        // is left untouched here; the full turn's elapsed time is debited
        // in one shot when the promotion is resolved, not split across
        // the submitting move and the deliberation that follows it.
        let is_promoting = piece.kind == PieceKind::Pawn && to.row == self.turn.promotion_row();
        if !is_promoting {
            let remaining = self.clock.debit_elapsed(self.turn, now_ms);
            if remaining <= 0 {
                self.end_game(self.turn.opponent(), GameOverReason::Timeout);
                return Ok(MoveApplied::Completed { game_over: true });
            }
        }

        let board_before = self.board.clone();
        let en_passant_before = self.en_passant;
        let history_len_before = self.history.len();

        let effect = rules::apply_move(&mut self.board, mv, self.turn);

        self.en_passant = None;
        if effect.piece_kind == PieceKind::Pawn {
            let row_diff = (to.row as i8 - from.row as i8).abs();
            if row_diff == 2 {
                let ep_row = (from.row as i8 + self.turn.pawn_direction()) as u8;
                self.en_passant = Some(Square::new(ep_row, from.col));
            }
        }

        if mv.is_castling {
            match self.turn {
                Color::White => self.king_castled.white = true,
                Color::Black => self.king_castled.black = true,
            }
        }

        self.history.push(MoveHistoryEntry {
            from,
            to,
            piece_kind: effect.piece_kind,
            captured_kind: effect.captured_kind,
            en_passant_captured: effect.en_passant_captured,
            abilities_gained: (!effect.abilities_gained.is_empty()).then(|| effect.abilities_gained.clone()),
            promoted_to: None,
        });

        if effect.piece_kind == PieceKind::Pawn && to.row == self.turn.promotion_row() {
            self.promotion_pending = Some(PromotionPending {
                row: to.row,
                col: to.col,
                color: self.turn,
                from,
            });
            self.promotion_snapshot = Some(PromotionSnapshot {
                board_before,
                en_passant_before,
                history_len_before,
            });
            self.update_check_flags();
            return Ok(MoveApplied::PromotionPending);
        }

        self.clock.apply_increment_and_restart(self.turn, now_ms);
        self.turn = self.turn.opponent();
        self.update_check_flags();
        self.check_terminal();
        Ok(MoveApplied::Completed { game_over: self.game_over })
    }

    /// Resolves a pending promotion with `choice`, charging the whole
    /// deliberation interval (since the submitting move left the clock
    /// untouched) before applying the increment and switching the turn.
    pub fn apply_promotion(&mut self, choice: PieceKind, now_ms: i64) -> Result<(), MoveError> {
        let pending = self.promotion_pending.ok_or(MoveError::PromotionPendingMustResolve)?;
        if !matches!(choice, PieceKind::Queen | PieceKind::Rook | PieceKind::Bishop | PieceKind::Knight) {
            return Err(MoveError::AbilityDisallows);
        }

        self.promotion_pending = None;
        self.promotion_snapshot = None;

        let remaining = self.clock.debit_elapsed(pending.color, now_ms);
        if remaining <= 0 {
            self.end_game(pending.color.opponent(), GameOverReason::Timeout);
            return Ok(());
        }

        let square = pending.square();
        let mut piece = self.board.get(square).expect("promotion square must hold the pawn");
        piece.kind = choice;
        piece.abilities.insert(choice);
        self.board.set(square, Some(piece));

        if let Some(last) = self.history.last_mut() {
            last.promoted_to = Some(choice);
        }

        self.clock.apply_increment_and_restart(pending.color, now_ms);
        self.turn = pending.color.opponent();
        self.update_check_flags();
        self.check_terminal();
        Ok(())
    }

    /// Cancels a pending promotion, restoring the board, history, and
    /// ability state to just before the promoting move. Only valid when
    /// the deployment's `promotion_cancel_allowed` flag is set.
    pub fn cancel_promotion(&mut self, promotion_cancel_allowed: bool) -> Result<(), MoveError> {
        if !promotion_cancel_allowed {
            return Err(MoveError::AbilityDisallows);
        }
        self.promotion_pending.take().ok_or(MoveError::PromotionPendingMustResolve)?;
        let snapshot = self.promotion_snapshot.take().expect("pending promotion must carry a snapshot");

        self.board = snapshot.board_before;
        self.en_passant = snapshot.en_passant_before;
        self.history.truncate(snapshot.history_len_before);
        self.update_check_flags();
        Ok(())
    }

    /// Ends the game by resignation of `by`.
    pub fn resign(&mut self, by: Color) {
        self.end_game(by.opponent(), GameOverReason::Resign);
    }

    /// Ends the game as an agreed draw.
    pub fn accept_draw(&mut self) {
        self.end_game_draw(GameOverReason::Draw);
    }

    /// Ends the game on a flag-fall for `flagged`, called by the clock
    /// scanner when it observes `remaining <= 0` outside of a move.
    pub fn adjudicate_timeout(&mut self, flagged: Color) {
        self.end_game(flagged.opponent(), GameOverReason::Timeout);
    }

    /// Ends the game as a draw when both seats are disconnected
    /// simultaneously (see the all-disconnected-draw rule).
    pub fn adjudicate_disconnect_draw(&mut self) {
        self.end_game_draw(GameOverReason::Disconnect);
    }

    /// Ends the game by disconnect-forfeit against `disconnected`.
    pub fn adjudicate_disconnect_forfeit(&mut self, disconnected: Color) {
        self.end_game(disconnected.opponent(), GameOverReason::Disconnect);
    }

    fn end_game(&mut self, winner: Color, reason: GameOverReason) {
        self.game_over = true;
        self.winner = Some(winner);
        self.end_reason = Some(reason);
    }

    fn end_game_draw(&mut self, reason: GameOverReason) {
        self.game_over = true;
        self.winner = None;
        self.end_reason = Some(reason);
    }

    fn update_check_flags(&mut self) {
        self.white_in_check = rules::is_in_check(&self.board, Color::White);
        self.black_in_check = rules::is_in_check(&self.board, Color::Black);
    }

    /// Checkmate/stalemate detection for the side now to move, plus a
    /// defensive king-capture check that should never fire through legal
    /// play once own-king-safety filtering is correct.
    fn check_terminal(&mut self) {
        if self.game_over {
            return;
        }
        if self.board.find_king(Color::White).is_none() {
            self.end_game(Color::Black, GameOverReason::Checkmate);
            return;
        }
        if self.board.find_king(Color::Black).is_none() {
            self.end_game(Color::White, GameOverReason::Checkmate);
            return;
        }

        let legal = rules::generate_legal_moves(&self.board, self.turn, self.en_passant);
        if legal.is_empty() {
            if rules::is_in_check(&self.board, self.turn) {
                self.end_game(self.turn.opponent(), GameOverReason::Checkmate);
            } else {
                self.end_game_draw(GameOverReason::Stalemate);
            }
        }
    }

    /// Distinguishes "no ability permits this geometry" from "the move is
    /// geometrically possible but leaves the mover's own king in check",
    /// for the `invalid_move` diagnostic.
    fn classify_illegal(&self, from: Square, to: Square) -> MoveError {
        let pseudo = rules::generate_pseudo_legal_moves(&self.board, self.turn, self.en_passant);
        if pseudo.iter().any(|m| m.from == from && m.to == to) {
            MoveError::PutsOwnKingInCheck
        } else {
            MoveError::AbilityDisallows
        }
    }
}
