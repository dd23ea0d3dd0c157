//! Lobby formation: seats, ownership, color assignment, and the code→lobby /
//! client→lobby indices a Match Controller is created from.

use crate::game::{Game, GameSettings};
use crate::types::Color;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type ClientId = Uuid;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;

/// One occupant of a lobby. `client_id` is `None` only for a bot seat; a bot
/// seat has no session and the AI Adapter produces its moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub client_id: Option<ClientId>,
    pub display_name: String,
    pub color: Color,
    pub is_bot: bool,
}

impl Seat {
    fn human(client_id: ClientId, display_name: String, color: Color) -> Self {
        Self { client_id: Some(client_id), display_name, color, is_bot: false }
    }

    fn bot(color: Color) -> Self {
        Self { client_id: None, display_name: "Bot".to_string(), color, is_bot: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyState {
    Forming,
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LobbySettings {
    pub time_minutes: u32,
    pub time_increment_seconds: u32,
    #[serde(default)]
    pub with_bot: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self { time_minutes: 10, time_increment_seconds: 0, with_bot: false }
    }
}

impl From<LobbySettings> for GameSettings {
    fn from(s: LobbySettings) -> Self {
        GameSettings { time_minutes: s.time_minutes, time_increment_seconds: s.time_increment_seconds }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lobby {
    pub code: String,
    pub owner_id: ClientId,
    pub seats: Vec<Seat>,
    pub settings: LobbySettings,
    pub state: LobbyState,
    pub created_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub game: Option<Game>,
}

impl Lobby {
    pub fn has_bot(&self) -> bool {
        self.seats.iter().any(|s| s.is_bot)
    }

    pub fn seat_for(&self, client_id: ClientId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.client_id == Some(client_id))
    }

    pub fn seats_view(&self) -> Vec<(ClientId, String, Color)> {
        self.seats
            .iter()
            .filter_map(|s| s.client_id.map(|id| (id, s.display_name.clone(), s.color)))
            .collect()
    }

    pub fn opponent_seat(&self, client_id: ClientId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.client_id != Some(client_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyError {
    NotFound,
    Full,
    NotOwner,
    WrongState,
    WrongSeatCount,
    AlreadyInLobby,
    PlayerNotInLobby,
}

/// Outcome of a seat leaving a lobby, used by the caller to decide what to
/// broadcast.
pub enum LeaveOutcome {
    LobbyClosed,
    LobbyUpdated,
}

/// In-memory registry of lobbies plus the client→lobby index. Owned by the
/// Hub actor; not itself an actor, so its methods run synchronously inside
/// the Hub's own message handlers.
#[derive(Default)]
pub struct LobbyRegistry {
    lobbies: HashMap<String, Lobby>,
    client_lobby_map: HashMap<ClientId, String>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..CODE_LEN)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }

    /// Inserts a lobby loaded from a durable snapshot directly, bypassing
    /// the create/join validation those paths run — used only on cold
    /// start to rebuild the registry for lobbies that already existed.
    pub fn restore(&mut self, lobby: Lobby) {
        for seat in &lobby.seats {
            if let Some(client_id) = seat.client_id {
                self.client_lobby_map.insert(client_id, lobby.code.clone());
            }
        }
        self.lobbies.insert(lobby.code.clone(), lobby);
    }

    /// Creates a new Forming lobby with `owner_id` seated as white. When
    /// `settings.with_bot` is set, a bot seat is added immediately as black
    /// so the lobby starts with the two seats `start_game` requires.
    pub fn create_lobby(
        &mut self,
        owner_id: ClientId,
        display_name: String,
        settings: LobbySettings,
        now_ms: i64,
    ) -> Result<&Lobby, LobbyError> {
        if self.client_lobby_map.contains_key(&owner_id) {
            return Err(LobbyError::AlreadyInLobby);
        }
        let code = self.generate_code();
        let mut seats = vec![Seat::human(owner_id, display_name, Color::White)];
        if settings.with_bot {
            seats.push(Seat::bot(Color::Black));
        }
        let lobby = Lobby {
            code: code.clone(),
            owner_id,
            seats,
            settings,
            state: LobbyState::Forming,
            created_at_ms: now_ms,
            game: None,
        };
        self.client_lobby_map.insert(owner_id, code.clone());
        self.lobbies.insert(code.clone(), lobby);
        Ok(self.lobbies.get(&code).expect("just inserted"))
    }

    pub fn join_lobby(
        &mut self,
        code: &str,
        client_id: ClientId,
        display_name: String,
    ) -> Result<&Lobby, LobbyError> {
        if self.client_lobby_map.contains_key(&client_id) {
            return Err(LobbyError::AlreadyInLobby);
        }
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.state != LobbyState::Forming {
            return Err(LobbyError::WrongState);
        }
        if lobby.seats.len() >= 2 {
            return Err(LobbyError::Full);
        }
        let color = if lobby.seats.iter().any(|s| s.color == Color::White) {
            Color::Black
        } else {
            Color::White
        };
        lobby.seats.push(Seat::human(client_id, display_name, color));
        self.client_lobby_map.insert(client_id, code.to_string());
        Ok(self.lobbies.get(code).expect("checked above"))
    }

    pub fn lobby_by_client(&self, client_id: ClientId) -> Option<&Lobby> {
        self.client_lobby_map.get(&client_id).and_then(|code| self.lobbies.get(code))
    }

    pub fn lobby_by_client_mut(&mut self, client_id: ClientId) -> Option<&mut Lobby> {
        let code = self.client_lobby_map.get(&client_id)?.clone();
        self.lobbies.get_mut(&code)
    }

    pub fn get(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Lobby> {
        self.lobbies.get_mut(code)
    }

    pub fn lobby_exists(&self, code: &str) -> bool {
        self.lobbies.contains_key(code)
    }

    pub fn all_codes(&self) -> Vec<String> {
        self.lobbies.keys().cloned().collect()
    }

    /// Removes `client_id`'s seat from its lobby. If the owner leaves while
    /// other seats remain, ownership transfers to the first remaining seat.
    /// An empty lobby is destroyed.
    pub fn leave_lobby(&mut self, client_id: ClientId) -> Result<(String, LeaveOutcome), LobbyError> {
        let code = self.client_lobby_map.remove(&client_id).ok_or(LobbyError::PlayerNotInLobby)?;
        let lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotFound)?;
        lobby.seats.retain(|s| s.client_id != Some(client_id));

        if lobby.seats.iter().all(|s| s.is_bot) || lobby.seats.is_empty() {
            self.lobbies.remove(&code);
            return Ok((code, LeaveOutcome::LobbyClosed));
        }

        if lobby.owner_id == client_id {
            if let Some(next) = lobby.seats.iter().find(|s| !s.is_bot) {
                lobby.owner_id = next.client_id.expect("human seat has a client id");
            }
        }
        Ok((code, LeaveOutcome::LobbyUpdated))
    }

    pub fn swap_colors(&mut self, code: &str, requester: ClientId) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        Self::guard_owner_forming(lobby, requester)?;
        for seat in &mut lobby.seats {
            seat.color = seat.color.opponent();
        }
        Ok(())
    }

    pub fn randomize_colors(&mut self, code: &str, requester: ClientId) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        Self::guard_owner_forming(lobby, requester)?;
        if rand::thread_rng().gen_bool(0.5) {
            for seat in &mut lobby.seats {
                seat.color = seat.color.opponent();
            }
        }
        Ok(())
    }

    fn guard_owner_forming(lobby: &Lobby, requester: ClientId) -> Result<(), LobbyError> {
        if lobby.owner_id != requester {
            return Err(LobbyError::NotOwner);
        }
        if lobby.state != LobbyState::Forming {
            return Err(LobbyError::WrongState);
        }
        Ok(())
    }

    /// Transitions a lobby to `Running`, constructing its `Game`. Caller
    /// supplies `now_ms` so clock seeding stays deterministic under tests.
    pub fn start_game(&mut self, code: &str, requester: ClientId, now_ms: i64) -> Result<&Lobby, LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.owner_id != requester {
            return Err(LobbyError::NotOwner);
        }
        if lobby.state != LobbyState::Forming {
            return Err(LobbyError::WrongState);
        }
        if lobby.seats.len() != 2 {
            return Err(LobbyError::WrongSeatCount);
        }
        lobby.game = Some(Game::new(lobby.settings.into(), now_ms));
        lobby.state = LobbyState::Running;
        Ok(lobby)
    }

    pub fn end_lobby(&mut self, code: &str) {
        if let Some(lobby) = self.lobbies.get_mut(code) {
            lobby.state = LobbyState::Ended;
        }
    }

    pub fn remove(&mut self, code: &str) -> Option<Lobby> {
        if let Some(lobby) = self.lobbies.get(code) {
            for seat in &lobby.seats {
                if let Some(id) = seat.client_id {
                    self.client_lobby_map.remove(&id);
                }
            }
        }
        self.lobbies.remove(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> ClientId {
        Uuid::new_v4()
    }

    #[test]
    fn create_lobby_seats_owner_as_white() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let lobby = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap();
        assert_eq!(lobby.seats.len(), 1);
        assert_eq!(lobby.seats[0].color, Color::White);
        assert_eq!(lobby.state, LobbyState::Forming);
    }

    #[test]
    fn with_bot_setting_seats_a_bot_immediately() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let settings = LobbySettings { with_bot: true, ..Default::default() };
        let lobby = registry.create_lobby(owner, "Alice".into(), settings, 0).unwrap();
        assert_eq!(lobby.seats.len(), 2);
        assert!(lobby.has_bot());
    }

    #[test]
    fn join_assigns_remaining_color_and_rejects_third_seat() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let code = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().code.clone();
        let joiner = uid();
        let lobby = registry.join_lobby(&code, joiner, "Bob".into()).unwrap();
        assert_eq!(lobby.seats.len(), 2);
        assert_eq!(lobby.seats[1].color, Color::Black);

        let third = uid();
        assert_eq!(registry.join_lobby(&code, third, "Carl".into()).unwrap_err(), LobbyError::Full);
    }

    #[test]
    fn owner_leaving_transfers_ownership_to_remaining_seat() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let code = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().code.clone();
        let joiner = uid();
        registry.join_lobby(&code, joiner, "Bob".into()).unwrap();

        let (_, outcome) = registry.leave_lobby(owner).unwrap();
        assert!(matches!(outcome, LeaveOutcome::LobbyUpdated));
        assert_eq!(registry.get(&code).unwrap().owner_id, joiner);
    }

    #[test]
    fn last_seat_leaving_closes_the_lobby() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let code = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().code.clone();
        let (_, outcome) = registry.leave_lobby(owner).unwrap();
        assert!(matches!(outcome, LeaveOutcome::LobbyClosed));
        assert!(registry.get(&code).is_none());
    }

    #[test]
    fn non_owner_cannot_swap_colors() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let code = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().code.clone();
        let joiner = uid();
        registry.join_lobby(&code, joiner, "Bob".into()).unwrap();
        assert_eq!(registry.swap_colors(&code, joiner).unwrap_err(), LobbyError::NotOwner);
        registry.swap_colors(&code, owner).unwrap();
        assert_eq!(registry.get(&code).unwrap().seats[0].color, Color::Black);
    }

    #[test]
    fn start_game_requires_two_seats_and_owner() {
        let mut registry = LobbyRegistry::new();
        let owner = uid();
        let code = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().code.clone();
        assert_eq!(registry.start_game(&code, owner, 0).unwrap_err(), LobbyError::WrongSeatCount);
        let joiner = uid();
        registry.join_lobby(&code, joiner, "Bob".into()).unwrap();
        assert_eq!(registry.start_game(&code, joiner, 0).unwrap_err(), LobbyError::NotOwner);
        let lobby = registry.start_game(&code, owner, 1_000).unwrap();
        assert_eq!(lobby.state, LobbyState::Running);
        assert!(lobby.game.is_some());
    }
}
