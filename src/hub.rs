//! The `Hub` actor: the single authoritative owner of every lobby, the
//! matchmaking queue, the durable snapshot store, and the AI seam. Every
//! inbound client command is funneled through this actor's mailbox, which
//! is exactly the per-match (and, here, whole-server) serialization the
//! spec's concurrency model asks for — actix guarantees the handlers below
//! never run concurrently with each other or with the clock scanner tick.

use actix::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant as TokioInstant;

use crate::ai::{AiAdapter, RandomAiAdapter, BOT_MOVE_DELAY};
use crate::config::ServerConfig;
use crate::game::MoveApplied;
use crate::lobby::{ClientId, LeaveOutcome, LobbyError, LobbyRegistry, LobbyState};
use crate::matchmaking::{MatchmakingQueue, Pairing};
use crate::protocol::{
    game_state_json, lobby_summary_json, matchmaking_default_settings, reason_json, valid_moves_json,
    ClientMessage, CreateLobbyFields, JoinLobbyFields, MovePieceFields, PromotionChoiceFields, SearchGameFields,
};
use crate::session::Deliver;
use crate::storage::SnapshotStore;
use crate::types::{Color, GameOverReason, MoveError, Square};

// ---------------------------------------------------------------------------
// Messages a `WsSession` sends to the `Hub`
// ---------------------------------------------------------------------------

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub client_id: ClientId,
    /// Type-erased so anything that can `Handler<Deliver>` may stand in for
    /// a session — a real `WsSession` in production, a recording stub in tests.
    pub addr: Recipient<Deliver>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub client_id: ClientId,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Inbound {
    pub client_id: ClientId,
    pub message: ClientMessage,
}

fn error_message(message: impl Into<String>) -> serde_json::Value {
    json!({ "type": "error", "message": message.into() })
}

fn lobby_error_text(e: LobbyError) -> &'static str {
    match e {
        LobbyError::NotFound => "lobby not found",
        LobbyError::Full => "lobby is full",
        LobbyError::NotOwner => "only the lobby owner may do that",
        LobbyError::WrongState => "lobby is not accepting that action in its current state",
        LobbyError::WrongSeatCount => "a game needs exactly two seats to start",
        LobbyError::AlreadyInLobby => "already in a lobby",
        LobbyError::PlayerNotInLobby => "not a member of that lobby",
    }
}

fn move_error_details(err: MoveError, from: Square, to: Square) -> Vec<String> {
    vec![format!("{} -> {}: {}", from.key(), to.key(), err)]
}

enum MoveOutcome {
    Invalid {
        reason: MoveError,
        from: Square,
        to: Square,
    },
    PromotionPending {
        promoter: Color,
        state_json: serde_json::Value,
    },
    GameOver {
        reason: GameOverReason,
        state_json: serde_json::Value,
    },
    Completed {
        state_json: serde_json::Value,
        next_turn_is_bot: bool,
    },
}

enum PromotionOutcome {
    Rejected,
    Canceled {
        state_json: serde_json::Value,
    },
    Applied {
        state_json: serde_json::Value,
        next_turn_is_bot: bool,
    },
    GameOver {
        reason: GameOverReason,
        state_json: serde_json::Value,
    },
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

pub struct Hub {
    config: ServerConfig,
    registry: LobbyRegistry,
    matchmaking: MatchmakingQueue,
    snapshot: SnapshotStore,
    ai: Box<dyn AiAdapter>,
    sessions: HashMap<ClientId, Recipient<Deliver>>,
    /// Rolling window of an offerer's recent `offer_draw` timestamps (ms),
    /// for the per-offerer rate limit (§4.3).
    draw_offer_log: HashMap<ClientId, Vec<i64>>,
    /// Lobby code -> the client who most recently offered a draw there,
    /// cleared on the next move by either player (implicit expiry, §4.3).
    draw_offer_from: HashMap<String, ClientId>,
    /// Cancellable auto-resign tasks, keyed by the disconnected client.
    grace_tasks: HashMap<ClientId, SpawnHandle>,
    /// Cancellable scheduled bot-move tasks, keyed by lobby code.
    ai_tasks: HashMap<String, SpawnHandle>,
    started_at: TokioInstant,
}

impl Hub {
    pub fn new(config: ServerConfig, snapshot: SnapshotStore) -> Self {
        Self {
            config,
            registry: LobbyRegistry::new(),
            matchmaking: MatchmakingQueue::new(),
            snapshot,
            ai: Box::new(RandomAiAdapter),
            sessions: HashMap::new(),
            draw_offer_log: HashMap::new(),
            draw_offer_from: HashMap::new(),
            grace_tasks: HashMap::new(),
            ai_tasks: HashMap::new(),
            started_at: TokioInstant::now(),
        }
    }

    /// Test-only constructor that swaps in a deterministic `AiAdapter`, so
    /// bot-turn tests don't depend on `RandomAiAdapter`'s RNG.
    #[cfg(test)]
    fn new_with_ai(config: ServerConfig, snapshot: SnapshotStore, ai: Box<dyn AiAdapter>) -> Self {
        let mut hub = Self::new(config, snapshot);
        hub.ai = ai;
        hub
    }

    fn now_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    /// Rebuilds the registry from the durable snapshot on cold start, and
    /// immediately starts the disconnect-grace clock for every seat of a
    /// restored `Running` lobby — the process has no live sessions for any
    /// of them yet (§7 "Crash safety").
    fn bootstrap(&mut self, ctx: &mut Context<Self>) {
        let codes = match self.snapshot.list_active_on_disk() {
            Ok(codes) => codes,
            Err(e) => {
                log::warn!("failed to list active snapshots: {e}");
                return;
            }
        };
        for code in codes {
            match self.snapshot.load_active(&code) {
                Ok(lobby) => {
                    let running = lobby.state == LobbyState::Running;
                    let seats: Vec<ClientId> = lobby.seats.iter().filter_map(|s| s.client_id).collect();
                    log::info!("restored lobby {} from snapshot (running={})", lobby.code, running);
                    self.registry.restore(lobby);
                    if running {
                        for client_id in seats {
                            self.schedule_grace(client_id, ctx);
                        }
                    }
                }
                Err(e) => log::warn!("failed to load snapshot {code}: {e}"),
            }
        }
    }

    fn schedule_grace(&mut self, client_id: ClientId, ctx: &mut Context<Self>) {
        let grace_secs = self.config.grace_period_secs;
        let handle = ctx.run_later(Duration::from_secs(grace_secs), move |act, ctx| {
            act.expire_grace(client_id, ctx);
        });
        self.grace_tasks.insert(client_id, handle);
    }

    fn expire_grace(&mut self, client_id: ClientId, ctx: &mut Context<Self>) {
        self.grace_tasks.remove(&client_id);
        if self.sessions.contains_key(&client_id) {
            return;
        }
        let code = match self
            .registry
            .lobby_by_client(client_id)
            .filter(|l| l.state == LobbyState::Running)
            .map(|l| l.code.clone())
        {
            Some(c) => c,
            None => return,
        };
        log::info!("grace period expired for {client_id}; auto-resigning in lobby {code}");
        let state_json = {
            let lobby = match self.registry.get_mut(&code) {
                Some(l) => l,
                None => return,
            };
            let color = match lobby.seat_for(client_id) {
                Some(s) => s.color,
                None => return,
            };
            let game = match lobby.game.as_mut() {
                Some(g) => g,
                None => return,
            };
            if game.game_over {
                return;
            }
            game.adjudicate_disconnect_forfeit(color);
            game_state_json(game, self.config.promotion_cancel_allowed, false)
        };
        self.cleanup_ended_lobby(&code, ctx);
        self.persist_by_code(&code);
        self.broadcast(
            &code,
            json!({"type":"game_over","reason": reason_json(GameOverReason::Disconnect),"game_state": state_json}),
        );
    }

    fn cancel_lobby_tasks(&mut self, code: &str, ctx: &mut Context<Self>) {
        if let Some(handle) = self.ai_tasks.remove(code) {
            ctx.cancel_future(handle);
        }
        let client_ids: Vec<ClientId> = self
            .registry
            .get(code)
            .map(|l| l.seats.iter().filter_map(|s| s.client_id).collect())
            .unwrap_or_default();
        for client_id in client_ids {
            if let Some(handle) = self.grace_tasks.remove(&client_id) {
                ctx.cancel_future(handle);
            }
        }
    }

    fn cleanup_ended_lobby(&mut self, code: &str, ctx: &mut Context<Self>) {
        self.registry.end_lobby(code);
        self.draw_offer_from.remove(code);
        self.cancel_lobby_tasks(code, ctx);
    }

    fn persist_by_code(&self, code: &str) {
        let lobby = match self.registry.get(code) {
            Some(l) => l,
            None => return,
        };
        if lobby.state == LobbyState::Ended {
            if let Err(e) = self.snapshot.save_active(lobby) {
                log::warn!("persist lobby {code} before archive failed: {e}");
            }
            if let Err(e) = self.snapshot.archive(lobby) {
                log::warn!("archive lobby {code} failed: {e}");
            }
        } else if let Err(e) = self.snapshot.save_active(lobby) {
            log::warn!("persist lobby {code} failed: {e}");
        }
    }

    fn snapshot_remove(&self, code: &str) {
        if let Err(e) = self.snapshot.remove_active(code) {
            log::warn!("failed to remove snapshot for closed lobby {code}: {e}");
        }
    }

    fn send_to(&self, client_id: ClientId, payload: serde_json::Value) {
        if let Some(addr) = self.sessions.get(&client_id) {
            addr.do_send(Deliver(payload));
        }
    }

    fn broadcast(&self, code: &str, payload: serde_json::Value) {
        if let Some(lobby) = self.registry.get(code) {
            for seat in &lobby.seats {
                if let Some(id) = seat.client_id {
                    if let Some(addr) = self.sessions.get(&id) {
                        addr.do_send(Deliver(payload.clone()));
                    }
                }
            }
        }
    }

    fn broadcast_except(&self, code: &str, except: ClientId, payload: serde_json::Value) {
        if let Some(lobby) = self.registry.get(code) {
            for seat in &lobby.seats {
                if let Some(id) = seat.client_id {
                    if id != except {
                        if let Some(addr) = self.sessions.get(&id) {
                            addr.do_send(Deliver(payload.clone()));
                        }
                    }
                }
            }
        }
    }

    fn broadcast_lobby_update(&mut self, code: &str) {
        if let Some(lobby) = self.registry.get(code) {
            let payload = json!({"type":"lobby_update","lobby": lobby_summary_json(lobby)});
            let ids: Vec<ClientId> = lobby.seats.iter().filter_map(|s| s.client_id).collect();
            self.persist_by_code(code);
            for id in ids {
                self.send_to(id, payload.clone());
            }
        }
    }

    fn schedule_bot_move(&mut self, code: String, ctx: &mut Context<Self>) {
        if let Some(prev) = self.ai_tasks.remove(&code) {
            ctx.cancel_future(prev);
        }
        let key = code.clone();
        let handle = ctx.run_later(BOT_MOVE_DELAY, move |act, ctx| {
            act.ai_tasks.remove(&code);
            act.perform_bot_move(code, ctx);
        });
        self.ai_tasks.insert(key, handle);
    }

    fn perform_bot_move(&mut self, code: String, ctx: &mut Context<Self>) {
        let now_ms = self.now_ms();
        let mv = {
            let lobby = match self.registry.get(&code) {
                Some(l) if l.state == LobbyState::Running => l,
                _ => return,
            };
            let game = match lobby.game.as_ref() {
                Some(g) if !g.game_over && g.promotion_pending.is_none() => g,
                _ => return,
            };
            self.ai.best_move(game, 1, BOT_MOVE_DELAY.as_millis() as u64)
        };
        if let Some(mv) = mv {
            self.apply_move_and_react(code, mv.from, mv.to, now_ms, None, ctx);
        } else {
            log::warn!("AI adapter returned no move for lobby {code}");
        }
    }

    fn try_apply_move(&mut self, code: &str, from: Square, to: Square, now_ms: i64) -> Option<MoveOutcome> {
        let lobby = self.registry.get_mut(code)?;
        let game = lobby.game.as_mut()?;
        let result = game.apply_move(from, to, now_ms);
        Some(match result {
            Err(e) => MoveOutcome::Invalid { reason: e, from, to },
            Ok(MoveApplied::PromotionPending) => {
                let promoter = game.promotion_pending.expect("just set").color;
                MoveOutcome::PromotionPending {
                    promoter,
                    state_json: game_state_json(game, self.config.promotion_cancel_allowed, false),
                }
            }
            Ok(MoveApplied::Completed { game_over }) => {
                if game_over {
                    MoveOutcome::GameOver {
                        reason: game.end_reason.expect("game_over implies end_reason"),
                        state_json: game_state_json(game, self.config.promotion_cancel_allowed, false),
                    }
                } else {
                    let turn = game.turn;
                    let next_turn_is_bot = lobby.seats.iter().any(|s| s.is_bot && s.color == turn);
                    MoveOutcome::Completed {
                        state_json: game_state_json(game, self.config.promotion_cancel_allowed, true),
                        next_turn_is_bot,
                    }
                }
            }
        })
    }

    fn apply_move_and_react(
        &mut self,
        code: String,
        from: Square,
        to: Square,
        now_ms: i64,
        reply_to: Option<ClientId>,
        ctx: &mut Context<Self>,
    ) {
        let outcome = match self.try_apply_move(&code, from, to, now_ms) {
            Some(o) => o,
            None => return,
        };
        match outcome {
            MoveOutcome::Invalid { reason, from, to } => {
                if let Some(client_id) = reply_to {
                    self.send_to(
                        client_id,
                        json!({"type":"invalid_move","reason": reason.to_string(),"details": move_error_details(reason, from, to)}),
                    );
                } else {
                    log::warn!("bot move {}->{} rejected in lobby {code}: {reason}", from.key(), to.key());
                }
            }
            MoveOutcome::PromotionPending { promoter, state_json } => {
                let promoter_id = self
                    .registry
                    .get(&code)
                    .and_then(|l| l.seats.iter().find(|s| s.color == promoter))
                    .and_then(|s| s.client_id);
                if let Some(id) = promoter_id {
                    self.send_to(id, json!({"type":"promotion_pending","game_state": state_json}));
                }
                self.persist_by_code(&code);
            }
            MoveOutcome::GameOver { reason, state_json } => {
                self.cleanup_ended_lobby(&code, ctx);
                self.persist_by_code(&code);
                self.broadcast(&code, json!({"type":"game_over","reason": reason_json(reason),"game_state": state_json}));
            }
            MoveOutcome::Completed { state_json, next_turn_is_bot } => {
                self.draw_offer_from.remove(&code);
                self.persist_by_code(&code);
                self.broadcast(&code, json!({"type":"move_made","game_state": state_json}));
                if next_turn_is_bot {
                    self.schedule_bot_move(code.clone(), ctx);
                }
            }
        }
    }

    fn scan_clocks(&mut self, ctx: &mut Context<Self>) {
        let now_ms = self.now_ms();
        for code in self.registry.all_codes() {
            self.scan_one(code, now_ms, ctx);
        }
    }

    fn scan_one(&mut self, code: String, now_ms: i64, ctx: &mut Context<Self>) {
        enum Outcome {
            None,
            GameOver { reason: GameOverReason, state_json: serde_json::Value },
        }
        let outcome = {
            let lobby = match self.registry.get_mut(&code) {
                Some(l) if l.state == LobbyState::Running => l,
                _ => return,
            };
            let has_human = lobby.seats.iter().any(|s| !s.is_bot);
            let all_disconnected = has_human
                && lobby
                    .seats
                    .iter()
                    .filter(|s| !s.is_bot)
                    .all(|s| s.client_id.map(|id| !self.sessions.contains_key(&id)).unwrap_or(true));
            let game = match lobby.game.as_mut() {
                Some(g) if !g.game_over => g,
                _ => return,
            };
            if all_disconnected {
                game.adjudicate_disconnect_draw();
                Outcome::GameOver {
                    reason: GameOverReason::Disconnect,
                    state_json: game_state_json(game, self.config.promotion_cancel_allowed, false),
                }
            } else if game.clock.remaining(game.turn, now_ms) <= 0 {
                let flagged = game.turn;
                game.adjudicate_timeout(flagged);
                Outcome::GameOver {
                    reason: GameOverReason::Timeout,
                    state_json: game_state_json(game, self.config.promotion_cancel_allowed, false),
                }
            } else {
                Outcome::None
            }
        };
        if let Outcome::GameOver { reason, state_json } = outcome {
            log::info!("lobby {code} ended by scanner: {reason:?}");
            self.cleanup_ended_lobby(&code, ctx);
            self.persist_by_code(&code);
            self.broadcast(&code, json!({"type":"game_over","reason": reason_json(reason),"game_state": state_json}));
        }
    }

    // -- inbound command dispatch -------------------------------------------

    fn handle_message(&mut self, client_id: ClientId, message: ClientMessage, ctx: &mut Context<Self>) {
        match message {
            ClientMessage::ValidateServer => {
                self.send_to(client_id, json!({"type":"validate_server_response","isChessServer": true}));
            }
            ClientMessage::CreateLobby(fields) => self.handle_create_lobby(client_id, fields),
            ClientMessage::JoinLobby(fields) => self.handle_join_lobby(client_id, fields),
            ClientMessage::LeaveLobby => self.handle_leave_lobby(client_id),
            ClientMessage::SwapColors => self.handle_swap_colors(client_id),
            ClientMessage::RandomizeColors => self.handle_randomize_colors(client_id),
            ClientMessage::StartGame => self.handle_start_game(client_id, ctx),
            ClientMessage::SearchGame(fields) => self.handle_search_game(client_id, fields, ctx),
            ClientMessage::CancelSearch => self.handle_cancel_search(client_id),
            ClientMessage::MovePiece(fields) => self.handle_move_piece(client_id, fields, ctx),
            ClientMessage::PromotionChoice(fields) => self.handle_promotion_choice(client_id, fields, ctx),
            ClientMessage::Resign => self.handle_resign(client_id, ctx),
            ClientMessage::OfferDraw => self.handle_offer_draw(client_id),
            ClientMessage::AcceptDraw => self.handle_accept_draw(client_id, ctx),
            ClientMessage::DeclineDraw => self.handle_decline_draw(client_id),
            ClientMessage::GetValidMoves => self.handle_get_valid_moves(client_id),
        }
    }

    fn handle_create_lobby(&mut self, client_id: ClientId, fields: CreateLobbyFields) {
        let now_ms = self.now_ms();
        match self.registry.create_lobby(client_id, fields.player_name, fields.settings, now_ms) {
            Ok(lobby) => {
                let code = lobby.code.clone();
                let payload = json!({"type":"lobby_created","lobby_code": lobby.code,"lobby": lobby_summary_json(lobby)});
                log::info!("lobby {code} created by {client_id}");
                self.persist_by_code(&code);
                self.send_to(client_id, payload);
            }
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_join_lobby(&mut self, client_id: ClientId, fields: JoinLobbyFields) {
        match self.registry.join_lobby(&fields.lobby_code, client_id, fields.player_name) {
            Ok(lobby) => {
                let code = lobby.code.clone();
                let joined_payload = json!({"type":"lobby_joined","lobby_code": lobby.code,"lobby": lobby_summary_json(lobby)});
                let update_payload = json!({"type":"lobby_update","lobby": lobby_summary_json(lobby)});
                let other_ids: Vec<ClientId> = lobby
                    .seats
                    .iter()
                    .filter_map(|s| s.client_id)
                    .filter(|&id| id != client_id)
                    .collect();
                self.persist_by_code(&code);
                self.send_to(client_id, joined_payload);
                for id in other_ids {
                    self.send_to(id, update_payload.clone());
                }
            }
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_leave_lobby(&mut self, client_id: ClientId) {
        match self.registry.leave_lobby(client_id) {
            Ok((code, LeaveOutcome::LobbyClosed)) => {
                log::info!("lobby {code} closed (empty)");
                self.snapshot_remove(&code);
            }
            Ok((code, LeaveOutcome::LobbyUpdated)) => {
                self.broadcast_lobby_update(&code);
            }
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_swap_colors(&mut self, client_id: ClientId) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return self.send_to(client_id, error_message("not in a lobby")),
        };
        match self.registry.swap_colors(&code, client_id) {
            Ok(()) => self.broadcast_lobby_update(&code),
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_randomize_colors(&mut self, client_id: ClientId) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return self.send_to(client_id, error_message("not in a lobby")),
        };
        match self.registry.randomize_colors(&code, client_id) {
            Ok(()) => self.broadcast_lobby_update(&code),
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_start_game(&mut self, client_id: ClientId, ctx: &mut Context<Self>) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return self.send_to(client_id, error_message("not in a lobby")),
        };
        let now_ms = self.now_ms();
        match self.registry.start_game(&code, client_id, now_ms) {
            Ok(lobby) => {
                let game = lobby.game.as_ref().expect("start_game constructs a Game");
                let state_json = game_state_json(game, self.config.promotion_cancel_allowed, true);
                let bot_turn = lobby.seats.iter().any(|s| s.is_bot && s.color == game.turn);
                let seats: Vec<(ClientId, Color)> =
                    lobby.seats.iter().filter_map(|s| s.client_id.map(|id| (id, s.color))).collect();
                log::info!("lobby {code} started by {client_id}");
                self.persist_by_code(&code);
                for (id, color) in seats {
                    self.send_to(
                        id,
                        json!({"type":"game_started","player_color": color,"game_state": state_json.clone()}),
                    );
                }
                if bot_turn {
                    self.schedule_bot_move(code, ctx);
                }
            }
            Err(e) => self.send_to(client_id, error_message(lobby_error_text(e))),
        }
    }

    fn handle_search_game(&mut self, client_id: ClientId, fields: SearchGameFields, ctx: &mut Context<Self>) {
        if let Some(lobby) = self.registry.lobby_by_client(client_id) {
            if lobby.state != LobbyState::Ended {
                self.send_to(client_id, error_message("already in a lobby"));
                return;
            }
            let code = lobby.code.clone();
            let _ = self.registry.leave_lobby(client_id);
            self.snapshot_remove(&code);
        }
        self.send_to(client_id, json!({"type":"search_started"}));
        if let Some(pairing) = self.matchmaking.search(client_id, fields.player_name) {
            self.form_matched_lobby(pairing, ctx);
        }
    }

    fn form_matched_lobby(&mut self, pairing: Pairing, ctx: &mut Context<Self>) {
        let now_ms = self.now_ms();
        let (first_id, first_name) = pairing.first;
        let (second_id, second_name) = pairing.second;
        let code = match self
            .registry
            .create_lobby(first_id, first_name.clone(), matchmaking_default_settings(), now_ms)
        {
            Ok(lobby) => lobby.code.clone(),
            Err(e) => {
                log::error!("matchmaking failed to create lobby for {first_id}: {e:?}");
                return;
            }
        };
        if let Err(e) = self.registry.join_lobby(&code, second_id, second_name.clone()) {
            log::error!("matchmaking failed to seat {second_id} in lobby {code}: {e:?}");
            return;
        }
        log::info!("matched {first_id} and {second_id} into lobby {code}");
        self.send_to(
            first_id,
            json!({"type":"search_game_found","opponent_name": second_name,"lobby_code": code,"player_color": Color::White}),
        );
        self.send_to(
            second_id,
            json!({"type":"search_game_found","opponent_name": first_name,"lobby_code": code,"player_color": Color::Black}),
        );
        self.persist_by_code(&code);
        self.handle_start_game(first_id, ctx);
    }

    fn handle_cancel_search(&mut self, client_id: ClientId) {
        self.matchmaking.cancel(client_id);
        self.send_to(client_id, json!({"type":"search_game_cancelled"}));
    }

    fn handle_move_piece(&mut self, client_id: ClientId, fields: MovePieceFields, ctx: &mut Context<Self>) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return self.send_to(client_id, error_message("not in a lobby")),
        };
        let now_ms = self.now_ms();
        let authorized = {
            let lobby = match self.registry.get(&code) {
                Some(l) if l.state == LobbyState::Running => l,
                _ => {
                    self.send_to(
                        client_id,
                        json!({"type":"invalid_move","reason": MoveError::GameOver.to_string(),"details": Vec::<String>::new()}),
                    );
                    return;
                }
            };
            let color = lobby.seat_for(client_id).map(|s| s.color);
            let game = lobby.game.as_ref().expect("Running lobby carries a Game");
            color.is_some() && color == Some(game.turn)
        };
        if !authorized {
            self.send_to(
                client_id,
                json!({"type":"invalid_move","reason": MoveError::WrongTurn.to_string(),"details": ["it is not your turn"]}),
            );
            return;
        }
        self.draw_offer_from.remove(&code);
        self.apply_move_and_react(code, fields.from, fields.to, now_ms, Some(client_id), ctx);
    }

    fn handle_promotion_choice(&mut self, client_id: ClientId, fields: PromotionChoiceFields, ctx: &mut Context<Self>) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        let now_ms = self.now_ms();
        self.draw_offer_from.remove(&code);
        let outcome = {
            let lobby = match self.registry.get_mut(&code) {
                Some(l) => l,
                None => return,
            };
            let seat_color = lobby.seat_for(client_id).map(|s| s.color);
            let game = match lobby.game.as_mut() {
                Some(g) => g,
                None => return,
            };
            let pending = match game.promotion_pending {
                Some(p) => p,
                None => return,
            };
            if seat_color != Some(pending.color) {
                PromotionOutcome::Rejected
            } else {
                match fields.choice.as_piece_kind() {
                    None => match game.cancel_promotion(self.config.promotion_cancel_allowed) {
                        Ok(()) => PromotionOutcome::Canceled {
                            state_json: game_state_json(game, self.config.promotion_cancel_allowed, true),
                        },
                        Err(_) => PromotionOutcome::Rejected,
                    },
                    Some(kind) => match game.apply_promotion(kind, now_ms) {
                        Ok(()) => {
                            if game.game_over {
                                PromotionOutcome::GameOver {
                                    reason: game.end_reason.expect("game_over implies end_reason"),
                                    state_json: game_state_json(game, self.config.promotion_cancel_allowed, false),
                                }
                            } else {
                                let next_turn_is_bot = lobby.seats.iter().any(|s| s.is_bot && s.color == lobby.game.as_ref().unwrap().turn);
                                let game = lobby.game.as_ref().unwrap();
                                PromotionOutcome::Applied {
                                    state_json: game_state_json(game, self.config.promotion_cancel_allowed, true),
                                    next_turn_is_bot,
                                }
                            }
                        }
                        Err(_) => PromotionOutcome::Rejected,
                    },
                }
            }
        };
        match outcome {
            PromotionOutcome::Rejected => {
                self.send_to(client_id, error_message("no pending promotion to resolve"));
            }
            PromotionOutcome::Canceled { state_json } => {
                self.persist_by_code(&code);
                self.broadcast(&code, json!({"type":"promotion_canceled","game_state": state_json}));
            }
            PromotionOutcome::Applied { state_json, next_turn_is_bot } => {
                self.persist_by_code(&code);
                self.broadcast(&code, json!({"type":"promotion_applied","game_state": state_json}));
                if next_turn_is_bot {
                    self.schedule_bot_move(code.clone(), ctx);
                }
            }
            PromotionOutcome::GameOver { reason, state_json } => {
                self.cleanup_ended_lobby(&code, ctx);
                self.persist_by_code(&code);
                self.broadcast(&code, json!({"type":"game_over","reason": reason_json(reason),"game_state": state_json}));
            }
        }
    }

    fn handle_resign(&mut self, client_id: ClientId, ctx: &mut Context<Self>) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        let state_json = {
            let lobby = match self.registry.get_mut(&code) {
                Some(l) => l,
                None => return,
            };
            let color = match lobby.seat_for(client_id) {
                Some(s) => s.color,
                None => return,
            };
            let game = match lobby.game.as_mut() {
                Some(g) => g,
                None => return,
            };
            if game.game_over {
                return;
            }
            game.resign(color);
            game_state_json(game, self.config.promotion_cancel_allowed, false)
        };
        self.cleanup_ended_lobby(&code, ctx);
        self.persist_by_code(&code);
        self.broadcast(&code, json!({"type":"game_over","reason": reason_json(GameOverReason::Resign),"game_state": state_json}));
    }

    fn handle_offer_draw(&mut self, client_id: ClientId) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        let now_ms = self.now_ms();
        let window_ms = self.config.draw_offer_window_secs as i64 * 1000;
        let limit = self.config.draw_offer_limit;
        let rate_limited_retry_after: Option<i64> = {
            let history = self.draw_offer_log.entry(client_id).or_default();
            history.retain(|&t| now_ms - t <= window_ms);
            if history.len() as u32 >= limit {
                Some(((window_ms - (now_ms - history[0])) / 1000).max(0))
            } else {
                history.push(now_ms);
                None
            }
        };
        if let Some(retry_after) = rate_limited_retry_after {
            self.send_to(client_id, json!({"type":"draw_offer_rate_limited","retry_after": retry_after}));
            return;
        }
        let game_over = self
            .registry
            .get(&code)
            .and_then(|l| l.game.as_ref())
            .map(|g| g.game_over)
            .unwrap_or(true);
        if game_over {
            return;
        }
        self.draw_offer_from.insert(code.clone(), client_id);
        let opponent = self.registry.get(&code).and_then(|l| l.opponent_seat(client_id)).and_then(|s| s.client_id);
        if let Some(opp) = opponent {
            self.send_to(opp, json!({"type":"draw_offered","from": client_id}));
        }
        self.send_to(client_id, json!({"type":"draw_offer_ack"}));
    }

    fn handle_accept_draw(&mut self, client_id: ClientId, ctx: &mut Context<Self>) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        let state_json = {
            let lobby = match self.registry.get_mut(&code) {
                Some(l) => l,
                None => return,
            };
            let game = match lobby.game.as_mut() {
                Some(g) => g,
                None => return,
            };
            if game.game_over {
                return;
            }
            game.accept_draw();
            game_state_json(game, self.config.promotion_cancel_allowed, false)
        };
        self.cleanup_ended_lobby(&code, ctx);
        self.persist_by_code(&code);
        self.broadcast(&code, json!({"type":"game_over","reason": reason_json(GameOverReason::Draw),"game_state": state_json}));
    }

    fn handle_decline_draw(&mut self, client_id: ClientId) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        if let Some(offerer) = self.draw_offer_from.remove(&code) {
            self.send_to(offerer, json!({"type":"draw_declined","from": client_id}));
        }
    }

    fn handle_get_valid_moves(&mut self, client_id: ClientId) {
        let code = match self.registry.lobby_by_client(client_id) {
            Some(l) => l.code.clone(),
            None => return,
        };
        let moves_json = {
            let lobby = match self.registry.get(&code) {
                Some(l) => l,
                None => return,
            };
            let game = match lobby.game.as_ref() {
                Some(g) => g,
                None => return,
            };
            valid_moves_json(&game.legal_moves())
        };
        self.send_to(client_id, json!({"type":"valid_moves","moves": moves_json}));
    }
}

impl Actor for Hub {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.bootstrap(ctx);
        let interval = Duration::from_millis(self.config.scan_interval_ms);
        ctx.run_interval(interval, |act, ctx| act.scan_clocks(ctx));
        log::info!(
            "hub started (scan_interval={}ms grace_period={}s draw_offer_limit={}/{}s)",
            self.config.scan_interval_ms,
            self.config.grace_period_secs,
            self.config.draw_offer_limit,
            self.config.draw_offer_window_secs
        );
    }
}

impl Handler<Connect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Connect, ctx: &mut Self::Context) {
        self.sessions.insert(msg.client_id, msg.addr);
        log::debug!("client {} connected", msg.client_id);
        if let Some(handle) = self.grace_tasks.remove(&msg.client_id) {
            ctx.cancel_future(handle);
            let running_code = self
                .registry
                .lobby_by_client(msg.client_id)
                .filter(|l| l.state == LobbyState::Running)
                .map(|l| l.code.clone());
            if let Some(code) = running_code {
                log::info!("client {} reconnected to lobby {code}", msg.client_id);
                self.broadcast(&code, json!({"type":"player_reconnected","client_id": msg.client_id}));
            }
        }
    }
}

impl Handler<Disconnect> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, ctx: &mut Self::Context) {
        self.sessions.remove(&msg.client_id);
        log::debug!("client {} disconnected", msg.client_id);
        let running_code = self
            .registry
            .lobby_by_client(msg.client_id)
            .filter(|l| l.state == LobbyState::Running)
            .map(|l| l.code.clone());
        if let Some(code) = running_code {
            let now_ms = self.now_ms();
            let abort_time = now_ms + self.config.grace_period_secs as i64 * 1000;
            log::info!("client {} disconnected mid-game in lobby {code}, grace until {abort_time}ms", msg.client_id);
            self.broadcast_except(
                &code,
                msg.client_id,
                json!({"type":"player_disconnected","client_id": msg.client_id,"disconnect_time": now_ms,"abort_time": abort_time}),
            );
            self.schedule_grace(msg.client_id, ctx);
        }
    }
}

impl Handler<Inbound> for Hub {
    type Result = ();

    fn handle(&mut self, msg: Inbound, ctx: &mut Self::Context) {
        self.handle_message(msg.client_id, msg.message, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiMove;
    use crate::game::Game;
    use crate::lobby::LobbySettings;
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    /// Stands in for a `WsSession`: records every `Deliver`ed payload so
    /// tests can assert on what the `Hub` would have written to a socket.
    struct Sink {
        inbox: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl Actor for Sink {
        type Context = Context<Self>;
    }

    impl Handler<Deliver> for Sink {
        type Result = ();
        fn handle(&mut self, msg: Deliver, _ctx: &mut Self::Context) {
            self.inbox.lock().unwrap().push(msg.0);
        }
    }

    fn new_sink() -> (Arc<Mutex<Vec<serde_json::Value>>>, Recipient<Deliver>) {
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let addr = Sink { inbox: inbox.clone() }.start();
        (inbox, addr.recipient())
    }

    fn messages_of_type(inbox: &Arc<Mutex<Vec<serde_json::Value>>>, tag: &str) -> Vec<serde_json::Value> {
        inbox.lock().unwrap().iter().filter(|v| v["type"] == tag).cloned().collect()
    }

    fn test_snapshot_store() -> SnapshotStore {
        let dir = std::env::temp_dir().join(format!("absorb-chess-hub-test-{}", Uuid::new_v4()));
        SnapshotStore::new(&dir).unwrap()
    }

    struct FixedAiAdapter(AiMove);

    impl AiAdapter for FixedAiAdapter {
        fn best_move(&self, _game: &Game, _depth_hint: u32, _time_budget_ms: u64) -> Option<AiMove> {
            Some(self.0)
        }
    }

    async fn create_join_start(
        hub: &Addr<Hub>,
        white_id: ClientId,
        black_id: ClientId,
        settings: LobbySettings,
    ) -> String {
        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields { player_name: "Alice".into(), settings }),
        })
        .await
        .unwrap();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: String::new(), player_name: "Bob".into() }),
        })
        .await
        .ok();
        String::new()
    }

    #[actix_rt::test]
    async fn lobby_create_join_start_sends_mirrored_game_started() {
        let hub = Hub::new(ServerConfig::default(), test_snapshot_store()).start();
        let (owner_inbox, owner_addr) = new_sink();
        let (joiner_inbox, joiner_addr) = new_sink();
        let owner_id = Uuid::new_v4();
        let joiner_id = Uuid::new_v4();

        hub.send(Connect { client_id: owner_id, addr: owner_addr }).await.unwrap();
        hub.send(Connect { client_id: joiner_id, addr: joiner_addr }).await.unwrap();

        hub.send(Inbound {
            client_id: owner_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings::default(),
            }),
        })
        .await
        .unwrap();

        let created = messages_of_type(&owner_inbox, "lobby_created");
        assert_eq!(created.len(), 1);
        let code = created[0]["lobby_code"].as_str().unwrap().to_string();

        hub.send(Inbound {
            client_id: joiner_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .unwrap();

        hub.send(Inbound { client_id: owner_id, message: ClientMessage::StartGame }).await.unwrap();

        let owner_started = messages_of_type(&owner_inbox, "game_started");
        let joiner_started = messages_of_type(&joiner_inbox, "game_started");
        assert_eq!(owner_started.len(), 1);
        assert_eq!(joiner_started.len(), 1);
        assert_eq!(owner_started[0]["player_color"], "white");
        assert_eq!(joiner_started[0]["player_color"], "black");
    }

    #[actix_rt::test]
    async fn move_piece_broadcasts_move_made_to_both_seats() {
        let hub = Hub::new(ServerConfig::default(), test_snapshot_store()).start();
        let (white_inbox, white_addr) = new_sink();
        let (black_inbox, black_addr) = new_sink();
        let white_id = Uuid::new_v4();
        let black_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();
        hub.send(Connect { client_id: black_id, addr: black_addr }).await.unwrap();

        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings::default(),
            }),
        })
        .await
        .unwrap();
        let code = messages_of_type(&white_inbox, "lobby_created")[0]["lobby_code"].as_str().unwrap().to_string();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .unwrap();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::MovePiece(MovePieceFields { from: Square::new(6, 4), to: Square::new(4, 4) }),
        })
        .await
        .unwrap();

        assert_eq!(messages_of_type(&white_inbox, "move_made").len(), 1);
        assert_eq!(messages_of_type(&black_inbox, "move_made").len(), 1);

        // black tries to move out of turn; must not switch the turn or leak to white as an opponent-visible event.
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::MovePiece(MovePieceFields { from: Square::new(1, 4), to: Square::new(2, 4) }),
        })
        .await
        .unwrap();
        assert_eq!(messages_of_type(&black_inbox, "invalid_move").len(), 1);
        assert_eq!(messages_of_type(&white_inbox, "move_made").len(), 1);
    }

    #[actix_rt::test]
    async fn draw_offer_rate_limit_kicks_in_on_the_fourth_offer() {
        let hub = Hub::new(ServerConfig::default(), test_snapshot_store()).start();
        let (white_inbox, white_addr) = new_sink();
        let (black_inbox, black_addr) = new_sink();
        let white_id = Uuid::new_v4();
        let black_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();
        hub.send(Connect { client_id: black_id, addr: black_addr }).await.unwrap();
        let _ = create_join_start(&hub, white_id, black_id, LobbySettings::default()).await;
        let code = messages_of_type(&white_inbox, "lobby_created")[0]["lobby_code"].as_str().unwrap().to_string();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .ok();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        for _ in 0..3 {
            hub.send(Inbound { client_id: white_id, message: ClientMessage::OfferDraw }).await.unwrap();
        }
        assert_eq!(messages_of_type(&white_inbox, "draw_offer_ack").len(), 3);
        assert_eq!(messages_of_type(&black_inbox, "draw_offered").len(), 3);

        hub.send(Inbound { client_id: white_id, message: ClientMessage::OfferDraw }).await.unwrap();
        assert_eq!(messages_of_type(&white_inbox, "draw_offer_rate_limited").len(), 1);
        assert_eq!(messages_of_type(&black_inbox, "draw_offered").len(), 3);
    }

    #[actix_rt::test]
    async fn reconnect_before_grace_expiry_cancels_autoresign() {
        tokio::time::pause();
        let config = ServerConfig { grace_period_secs: 2, ..ServerConfig::default() };
        let hub = Hub::new(config, test_snapshot_store()).start();
        let (white_inbox, white_addr) = new_sink();
        let (black_inbox, black_addr) = new_sink();
        let white_id = Uuid::new_v4();
        let black_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();
        hub.send(Connect { client_id: black_id, addr: black_addr }).await.unwrap();
        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings::default(),
            }),
        })
        .await
        .unwrap();
        let code = messages_of_type(&white_inbox, "lobby_created")[0]["lobby_code"].as_str().unwrap().to_string();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .unwrap();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        hub.send(Disconnect { client_id: white_id }).await.unwrap();
        let disconnected = messages_of_type(&black_inbox, "player_disconnected");
        assert_eq!(disconnected.len(), 1);
        assert!(disconnected[0]["abort_time"].as_i64().unwrap() > 0);

        tokio::time::advance(StdDuration::from_millis(500)).await;

        let (_, white_addr2) = new_sink();
        hub.send(Connect { client_id: white_id, addr: white_addr2 }).await.unwrap();
        assert_eq!(messages_of_type(&black_inbox, "player_reconnected").len(), 1);

        tokio::time::advance(StdDuration::from_secs(3)).await;
        assert_eq!(messages_of_type(&black_inbox, "game_over").len(), 0);
    }

    #[actix_rt::test]
    async fn disconnect_without_reconnect_ends_game_as_disconnect_forfeit() {
        tokio::time::pause();
        let config = ServerConfig { grace_period_secs: 1, ..ServerConfig::default() };
        let hub = Hub::new(config, test_snapshot_store()).start();
        let (white_inbox, white_addr) = new_sink();
        let (black_inbox, black_addr) = new_sink();
        let white_id = Uuid::new_v4();
        let black_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();
        hub.send(Connect { client_id: black_id, addr: black_addr }).await.unwrap();
        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings::default(),
            }),
        })
        .await
        .unwrap();
        let code = messages_of_type(&white_inbox, "lobby_created")[0]["lobby_code"].as_str().unwrap().to_string();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .unwrap();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        hub.send(Disconnect { client_id: white_id }).await.unwrap();
        tokio::time::advance(StdDuration::from_millis(1_200)).await;

        let over = messages_of_type(&black_inbox, "game_over");
        assert_eq!(over.len(), 1);
        assert_eq!(over[0]["reason"], "disconnect");
        assert_eq!(over[0]["game_state"]["winner"], "black");
    }

    #[actix_rt::test]
    async fn clock_scanner_ends_game_on_flag_fall() {
        tokio::time::pause();
        let config = ServerConfig { scan_interval_ms: 50, ..ServerConfig::default() };
        let hub = Hub::new(config, test_snapshot_store()).start();
        let (white_inbox, white_addr) = new_sink();
        let (black_inbox, black_addr) = new_sink();
        let white_id = Uuid::new_v4();
        let black_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();
        hub.send(Connect { client_id: black_id, addr: black_addr }).await.unwrap();
        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings { time_minutes: 0, time_increment_seconds: 0, with_bot: false },
            }),
        })
        .await
        .unwrap();
        let code = messages_of_type(&white_inbox, "lobby_created")[0]["lobby_code"].as_str().unwrap().to_string();
        hub.send(Inbound {
            client_id: black_id,
            message: ClientMessage::JoinLobby(JoinLobbyFields { lobby_code: code, player_name: "Bob".into() }),
        })
        .await
        .unwrap();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        tokio::time::advance(StdDuration::from_millis(250)).await;

        let over = messages_of_type(&white_inbox, "game_over");
        assert_eq!(over.len(), 1);
        assert_eq!(over[0]["reason"], "timeout");
        assert_eq!(over[0]["game_state"]["winner"], "black");
        assert_eq!(messages_of_type(&black_inbox, "game_over").len(), 1);
    }

    #[actix_rt::test]
    async fn matchmaking_pairs_two_searchers_and_auto_starts() {
        let hub = Hub::new(ServerConfig::default(), test_snapshot_store()).start();
        let (a_inbox, a_addr) = new_sink();
        let (b_inbox, b_addr) = new_sink();
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        hub.send(Connect { client_id: a_id, addr: a_addr }).await.unwrap();
        hub.send(Connect { client_id: b_id, addr: b_addr }).await.unwrap();

        hub.send(Inbound {
            client_id: a_id,
            message: ClientMessage::SearchGame(SearchGameFields { player_name: "Alice".into() }),
        })
        .await
        .unwrap();
        assert_eq!(messages_of_type(&a_inbox, "search_started").len(), 1);
        assert!(messages_of_type(&a_inbox, "search_game_found").is_empty());

        hub.send(Inbound {
            client_id: b_id,
            message: ClientMessage::SearchGame(SearchGameFields { player_name: "Bob".into() }),
        })
        .await
        .unwrap();

        let a_found = messages_of_type(&a_inbox, "search_game_found");
        let b_found = messages_of_type(&b_inbox, "search_game_found");
        assert_eq!(a_found.len(), 1);
        assert_eq!(b_found.len(), 1);
        assert_eq!(a_found[0]["player_color"], "white");
        assert_eq!(b_found[0]["player_color"], "black");

        assert_eq!(messages_of_type(&a_inbox, "game_started").len(), 1);
        assert_eq!(messages_of_type(&b_inbox, "game_started").len(), 1);
    }

    #[actix_rt::test]
    async fn bot_seat_replies_after_the_ui_settle_delay() {
        tokio::time::pause();
        let fixed = FixedAiAdapter(AiMove { from: Square::new(1, 4), to: Square::new(3, 4) });
        let hub = Hub::new_with_ai(ServerConfig::default(), test_snapshot_store(), Box::new(fixed)).start();
        let (white_inbox, white_addr) = new_sink();
        let white_id = Uuid::new_v4();
        hub.send(Connect { client_id: white_id, addr: white_addr }).await.unwrap();

        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::CreateLobby(CreateLobbyFields {
                player_name: "Alice".into(),
                settings: LobbySettings { time_minutes: 10, time_increment_seconds: 0, with_bot: true },
            }),
        })
        .await
        .unwrap();
        hub.send(Inbound { client_id: white_id, message: ClientMessage::StartGame }).await.unwrap();

        hub.send(Inbound {
            client_id: white_id,
            message: ClientMessage::MovePiece(MovePieceFields { from: Square::new(6, 4), to: Square::new(4, 4) }),
        })
        .await
        .unwrap();
        assert_eq!(messages_of_type(&white_inbox, "move_made").len(), 1);

        tokio::time::advance(BOT_MOVE_DELAY + StdDuration::from_millis(50)).await;

        assert_eq!(messages_of_type(&white_inbox, "move_made").len(), 2);
    }
}
