//! Durable snapshot store for lobby rows.
//!
//! In-memory state is authoritative; this store exists purely so a restart
//! can rebuild the Lobby Registry from still-connected sessions. Each lobby
//! is one JSON document:
//!
//! - **Forming/Running** lobbies live uncompressed under `<base>/active/<code>.json`,
//!   rewritten atomically (temp file + rename) after each mutation.
//! - **Ended** lobbies are zstd-compressed and moved to
//!   `<base>/archive/<code>.json.zst`; the active file is removed.
//!
//! Writes are best-effort: a failed snapshot write is logged and otherwise
//! ignored, since the server stays correct from in-memory state alone.

use crate::lobby::Lobby;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ZSTD_COMPRESSION_LEVEL: i32 = 19;

pub struct SnapshotStore {
    active_dir: PathBuf,
    archive_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let active_dir = base_dir.join("active");
        let archive_dir = base_dir.join("archive");

        fs::create_dir_all(&active_dir)?;
        fs::create_dir_all(&archive_dir)?;

        log::info!("snapshot store initialized at {}", base_dir.display());

        Ok(Self { active_dir, archive_dir })
    }

    fn active_path(&self, code: &str) -> PathBuf {
        self.active_dir.join(format!("{code}.json"))
    }

    fn archive_path(&self, code: &str) -> PathBuf {
        self.archive_dir.join(format!("{code}.json.zst"))
    }

    /// Rewrites a lobby's active snapshot, via a temp file + rename so a
    /// crash mid-write never leaves a partial document behind.
    pub fn save_active(&self, lobby: &Lobby) -> Result<(), String> {
        let data = serde_json::to_vec(lobby).map_err(|e| format!("serialize lobby {}: {e}", lobby.code))?;
        let path = self.active_path(&lobby.code);
        let temp_path = self.active_dir.join(format!("{}.json.tmp", lobby.code));

        fs::write(&temp_path, &data).map_err(|e| format!("write temp snapshot: {e}"))?;
        fs::rename(&temp_path, &path).map_err(|e| format!("rename temp snapshot: {e}"))?;

        log::debug!("saved active snapshot for lobby {} ({} bytes)", lobby.code, data.len());
        Ok(())
    }

    /// Compresses and moves a lobby's snapshot to the archive once it has
    /// ended, removing the active copy.
    pub fn archive(&self, lobby: &Lobby) -> Result<usize, String> {
        let raw = serde_json::to_vec(lobby).map_err(|e| format!("serialize lobby {}: {e}", lobby.code))?;
        let compressed = zstd::encode_all(raw.as_slice(), ZSTD_COMPRESSION_LEVEL)
            .map_err(|e| format!("zstd compression failed: {e}"))?;

        fs::write(self.archive_path(&lobby.code), &compressed).map_err(|e| format!("write archive: {e}"))?;

        let active_path = self.active_path(&lobby.code);
        if active_path.exists() {
            let _ = fs::remove_file(&active_path);
        }

        log::info!(
            "archived lobby {}: {} -> {} bytes",
            lobby.code,
            raw.len(),
            compressed.len()
        );
        Ok(compressed.len())
    }

    pub fn load_active(&self, code: &str) -> Result<Lobby, String> {
        let data = fs::read(self.active_path(code)).map_err(|e| format!("read active snapshot {code}: {e}"))?;
        serde_json::from_slice(&data).map_err(|e| format!("decode active snapshot {code}: {e}"))
    }

    pub fn load_archive(&self, code: &str) -> Result<Lobby, String> {
        let compressed = fs::read(self.archive_path(code)).map_err(|e| format!("read archive {code}: {e}"))?;
        let raw = zstd::decode_all(compressed.as_slice()).map_err(|e| format!("zstd decompression failed: {e}"))?;
        serde_json::from_slice(&raw).map_err(|e| format!("decode archive {code}: {e}"))
    }

    /// Lists the lobby codes with an active (Forming/Running) snapshot,
    /// used on cold start to rebuild the registry.
    pub fn list_active_on_disk(&self) -> Result<Vec<String>, String> {
        let mut codes = Vec::new();
        let entries = fs::read_dir(&self.active_dir).map_err(|e| format!("read active dir: {e}"))?;
        for entry in entries {
            let entry = entry.map_err(|e| format!("read dir entry: {e}"))?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if let Some(code) = filename.strip_suffix(".json") {
                codes.push(code.to_string());
            }
        }
        Ok(codes)
    }

    pub fn remove_active(&self, code: &str) -> Result<(), String> {
        let path = self.active_path(code);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| format!("remove active snapshot: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::{LobbySettings, LobbyState};
    use uuid::Uuid;

    fn sample_lobby(code: &str) -> Lobby {
        let mut registry = crate::lobby::LobbyRegistry::new();
        let owner = Uuid::new_v4();
        let lobby = registry.create_lobby(owner, "Alice".into(), LobbySettings::default(), 0).unwrap().clone();
        let mut lobby = lobby;
        lobby.code = code.to_string();
        lobby
    }

    #[test]
    fn save_and_load_active_round_trips() {
        let dir = std::env::temp_dir().join(format!("absorb-chess-test-{}", Uuid::new_v4()));
        let store = SnapshotStore::new(&dir).unwrap();
        let lobby = sample_lobby("ABC123");
        store.save_active(&lobby).unwrap();

        let loaded = store.load_active("ABC123").unwrap();
        assert_eq!(loaded.code, "ABC123");
        assert_eq!(loaded.state, LobbyState::Forming);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn archive_removes_active_copy() {
        let dir = std::env::temp_dir().join(format!("absorb-chess-test-{}", Uuid::new_v4()));
        let store = SnapshotStore::new(&dir).unwrap();
        let mut lobby = sample_lobby("ENDED1");
        lobby.state = LobbyState::Ended;
        store.save_active(&lobby).unwrap();
        store.archive(&lobby).unwrap();

        assert!(store.load_active("ENDED1").is_err());
        let loaded = store.load_archive("ENDED1").unwrap();
        assert_eq!(loaded.state, LobbyState::Ended);

        fs::remove_dir_all(&dir).ok();
    }
}
