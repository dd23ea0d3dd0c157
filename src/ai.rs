//! The seam to the move-search engine: `AiAdapter::best_move` is the single
//! entry point a Match Controller calls for a bot seat's turn. The search
//! itself is out of scope; this module supplies a synchronous, pure stand-in
//! plus the async wrapper the Controller schedules it through.

use crate::game::Game;
use crate::types::Square;
use rand::seq::SliceRandom;
use std::time::Duration;

/// A move proposal from the adapter: a plain `(from, to)` pair, since the
/// adapter has no reason to know about castling/en-passant flags — the
/// Controller re-validates and applies it exactly like a client-submitted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiMove {
    pub from: Square,
    pub to: Square,
}

/// Picks a move for the side to move in `game`. Implementations may be
/// in-process or shell out to an external engine; the Controller guarantees
/// at most one outstanding call per game and applies the result only on its
/// own dispatch path, never from within this call.
pub trait AiAdapter: Send + Sync {
    fn best_move(&self, game: &Game, depth_hint: u32, time_budget_ms: u64) -> Option<AiMove>;
}

/// Picks uniformly at random among the side-to-move's legal moves. Stands in
/// for a real search engine, which is explicitly out of scope.
pub struct RandomAiAdapter;

impl AiAdapter for RandomAiAdapter {
    fn best_move(&self, game: &Game, _depth_hint: u32, _time_budget_ms: u64) -> Option<AiMove> {
        let legal = game.legal_moves();
        let candidates: Vec<AiMove> = legal
            .into_iter()
            .flat_map(|(from, tos)| tos.into_iter().map(move |to| AiMove { from, to }))
            .collect();
        candidates.choose(&mut rand::thread_rng()).copied()
    }
}

/// A small UI-settle delay before a bot's first move and before each
/// subsequent one, so the opponent sees the board update before the bot
/// replies.
pub const BOT_MOVE_DELAY: Duration = Duration::from_millis(1200);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameSettings;

    #[test]
    fn random_adapter_returns_a_legal_move_from_the_opening_position() {
        let game = Game::new(GameSettings::default(), 0);
        let adapter = RandomAiAdapter;
        let mv = adapter.best_move(&game, 1, 100).expect("opening position has legal moves");
        let legal = game.legal_moves();
        assert!(legal.get(&mv.from).map(|tos| tos.contains(&mv.to)).unwrap_or(false));
    }
}
