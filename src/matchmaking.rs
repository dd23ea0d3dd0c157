//! FIFO matchmaking queue: `search_game` pairs the first two distinct
//! waiting clients and hands the pairing to the Lobby Registry; `cancel_search`
//! withdraws a waiting entry.

use crate::lobby::ClientId;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Waiting {
    client_id: ClientId,
    display_name: String,
}

/// A matched pair, ready to be turned into a lobby by the caller.
pub struct Pairing {
    pub first: (ClientId, String),
    pub second: (ClientId, String),
}

#[derive(Default)]
pub struct MatchmakingQueue {
    waiting: VecDeque<Waiting>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_waiting(&self, client_id: ClientId) -> bool {
        self.waiting.iter().any(|w| w.client_id == client_id)
    }

    /// Enqueues `client_id`. If another client was already waiting, pops
    /// both and returns the pairing; otherwise the client now waits alone.
    pub fn search(&mut self, client_id: ClientId, display_name: String) -> Option<Pairing> {
        if self.is_waiting(client_id) {
            return None;
        }
        if let Some(pos) = self.waiting.iter().position(|w| w.client_id != client_id) {
            let opponent = self.waiting.remove(pos).expect("position just found");
            Some(Pairing {
                first: (client_id, display_name),
                second: (opponent.client_id, opponent.display_name),
            })
        } else {
            self.waiting.push_back(Waiting { client_id, display_name });
            None
        }
    }

    /// Removes `client_id` from the queue, if present.
    pub fn cancel(&mut self, client_id: ClientId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|w| w.client_id != client_id);
        self.waiting.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn first_searcher_waits_alone() {
        let mut queue = MatchmakingQueue::new();
        let a = Uuid::new_v4();
        assert!(queue.search(a, "Alice".into()).is_none());
        assert!(queue.is_waiting(a));
    }

    #[test]
    fn second_distinct_searcher_pairs_with_the_first() {
        let mut queue = MatchmakingQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.search(a, "Alice".into());
        let pairing = queue.search(b, "Bob".into()).expect("should pair");
        assert_eq!(pairing.first.0, b);
        assert_eq!(pairing.second.0, a);
        assert!(!queue.is_waiting(a));
        assert!(!queue.is_waiting(b));
    }

    #[test]
    fn searching_twice_from_the_same_client_is_a_no_op() {
        let mut queue = MatchmakingQueue::new();
        let a = Uuid::new_v4();
        queue.search(a, "Alice".into());
        assert!(queue.search(a, "Alice".into()).is_none());
        assert_eq!(queue.waiting.len(), 1);
    }

    #[test]
    fn cancel_removes_a_waiting_entry() {
        let mut queue = MatchmakingQueue::new();
        let a = Uuid::new_v4();
        queue.search(a, "Alice".into());
        assert!(queue.cancel(a));
        assert!(!queue.is_waiting(a));
        assert!(!queue.cancel(a));
    }
}
