//! Wire protocol: the JSON shapes exchanged over the per-client socket.
//!
//! Inbound frames are tagged by a `type` field; `ClientMessage` models that
//! as a single `#[serde(tag = "type")]` enum instead of the stringly-typed
//! dispatch the legacy handlers used, so an unhandled variant is a compile
//! error rather than a silently-ignored string.

use crate::game::{Game, GameSettings};
use crate::lobby::{Lobby, LobbySettings};
use crate::types::{Color, GameOverReason, PieceKind, Square};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLobbyFields {
    #[serde(default = "default_player_name")]
    pub player_name: String,
    #[serde(default)]
    pub settings: LobbySettings,
}

fn default_player_name() -> String {
    "Player".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinLobbyFields {
    pub lobby_code: String,
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchGameFields {
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovePieceFields {
    pub from: Square,
    pub to: Square,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionChoice {
    Queen,
    Rook,
    Bishop,
    Knight,
    Cancel,
}

impl PromotionChoice {
    /// `None` only for `Cancel`, which the caller handles via
    /// `Game::cancel_promotion` rather than `Game::apply_promotion`.
    pub fn as_piece_kind(self) -> Option<PieceKind> {
        match self {
            PromotionChoice::Queen => Some(PieceKind::Queen),
            PromotionChoice::Rook => Some(PieceKind::Rook),
            PromotionChoice::Bishop => Some(PieceKind::Bishop),
            PromotionChoice::Knight => Some(PieceKind::Knight),
            PromotionChoice::Cancel => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionChoiceFields {
    pub choice: PromotionChoice,
}

/// Every inbound command a client session may send, tagged by `type`.
/// `#[serde(deny_unknown_fields)]` is deliberately *not* set: extra client
/// fields are ignored rather than rejected, matching the spec's framing
/// rule that only a missing/unknown `type` is an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ValidateServer,
    CreateLobby(CreateLobbyFields),
    JoinLobby(JoinLobbyFields),
    LeaveLobby,
    SwapColors,
    RandomizeColors,
    StartGame,
    SearchGame(SearchGameFields),
    CancelSearch,
    MovePiece(MovePieceFields),
    PromotionChoice(PromotionChoiceFields),
    Resign,
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    GetValidMoves,
}

// ---------------------------------------------------------------------------
// game_state payload (§6)
// ---------------------------------------------------------------------------

/// Legal destinations for the side to move, keyed by `"row,col"` strings —
/// the shape clients expect `valid_moves` in.
pub fn valid_moves_json(map: &HashMap<Square, Vec<Square>>) -> serde_json::Value {
    let object: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(from, tos)| (from.key(), serde_json::to_value(tos).expect("Square serializes")))
        .collect();
    serde_json::Value::Object(object)
}

/// Builds the `game_state` payload embedded in `game_started`/`move_made`/
/// `promotion_pending`/`game_over` messages. `include_valid_moves` is false
/// only while the game carries a pending promotion (§4.1) or has ended.
pub fn game_state_json(game: &Game, promotion_cancel_allowed: bool, include_valid_moves: bool) -> serde_json::Value {
    let mut value = serde_json::json!({
        "board": game.board,
        "current_turn": game.turn,
        "game_over": game.game_over,
        "winner": game.winner,
        "move_history": game.history,
        "white_king_in_check": game.white_in_check,
        "black_king_in_check": game.black_in_check,
        "en_passant_target": game.en_passant,
        "promotion_pending": game.promotion_pending,
        "promotion_cancel_allowed": promotion_cancel_allowed,
        "clock": game.clock,
    });
    if include_valid_moves {
        value["valid_moves"] = valid_moves_json(&game.legal_moves());
    }
    value
}

// ---------------------------------------------------------------------------
// Outbound message helpers
// ---------------------------------------------------------------------------

pub fn error_message(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "type": "error", "message": message.into() })
}

pub fn lobby_summary_json(lobby: &Lobby) -> serde_json::Value {
    serde_json::json!({
        "lobby_code": lobby.code,
        "owner_id": lobby.owner_id,
        "seats": lobby.seats,
        "settings": lobby.settings,
    })
}

/// Default settings matchmaking hands to a freshly-paired lobby (§4.5).
pub fn matchmaking_default_settings() -> LobbySettings {
    LobbySettings { time_minutes: 10, time_increment_seconds: 0, with_bot: false }
}

pub fn default_game_settings() -> GameSettings {
    GameSettings::default()
}

pub fn reason_json(reason: GameOverReason) -> serde_json::Value {
    serde_json::to_value(reason).expect("GameOverReason serializes")
}

pub fn color_json(color: Color) -> serde_json::Value {
    serde_json::to_value(color).expect("Color serializes")
}
