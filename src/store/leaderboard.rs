//! Survival-time leaderboards and their file persistence

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Number of entries included in ranking broadcasts
pub const LEADERBOARD_TOP_N: usize = 10;

/// A single survival record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: String,
    /// Survival time in seconds
    pub time: f32,
    /// Unix millis of the death report; breaks ties (earlier ranks higher)
    pub timestamp: u64,
}

impl LeaderboardEntry {
    pub fn new(player_id: impl Into<String>, time: f32, timestamp: u64) -> Self {
        Self {
            player_id: player_id.into(),
            time,
            timestamp,
        }
    }

    /// Descending by time, then ascending by timestamp
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then(self.timestamp.cmp(&other.timestamp))
    }
}

/// Leaderboard errors
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("Leaderboard storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed leaderboard line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Ranked list of entries, kept sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert and return the entry's 1-based rank
    pub fn insert(&mut self, entry: LeaderboardEntry) -> usize {
        self.entries.push(entry.clone());
        self.entries.sort_by(LeaderboardEntry::rank_cmp);
        self.entries
            .iter()
            .position(|e| *e == entry)
            .map(|i| i + 1)
            .unwrap_or(self.entries.len())
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the `player_id,time` file format. Entries keep file order via
    /// their line index as timestamp.
    pub fn parse(text: &str) -> Result<Self, LeaderboardError> {
        let mut entries = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (player_id, time) = line.rsplit_once(',').ok_or_else(|| LeaderboardError::Parse {
                line: index + 1,
                reason: "missing comma".to_string(),
            })?;

            let time: f32 = time.trim().parse().map_err(|e| LeaderboardError::Parse {
                line: index + 1,
                reason: format!("bad time: {}", e),
            })?;

            entries.push(LeaderboardEntry::new(player_id.trim(), time, index as u64));
        }

        entries.sort_by(LeaderboardEntry::rank_cmp);
        Ok(Self { entries })
    }

    /// Whole-file rendering, one `player_id,time` line per entry
    pub fn to_file_contents(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{},{}\n", e.player_id, e.time))
            .collect()
    }

    /// Read the durable leaderboard. A missing file, an unreadable file or
    /// any malformed line yields an empty leaderboard.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => match Self::parse(&text) {
                Ok(board) => {
                    info!(path = %path.display(), entries = board.len(), "Loaded leaderboard");
                    board
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding malformed leaderboard");
                    Self::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No leaderboard file, starting empty");
                Self::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Leaderboard unavailable, starting empty");
                Self::new()
            }
        }
    }
}

/// Background task rewriting the leaderboard file in submission order
#[derive(Debug, Clone)]
pub struct LeaderboardWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl LeaderboardWriter {
    /// Spawn the writer. The task ends once every writer handle is dropped.
    pub fn spawn(path: impl Into<PathBuf>) -> (Self, JoinHandle<()>) {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let handle = tokio::spawn(async move {
            while let Some(mut contents) = rx.recv().await {
                // Only the newest snapshot matters
                while let Ok(newer) = rx.try_recv() {
                    contents = newer;
                }
                if let Err(e) = write_file(&path, &contents).await {
                    warn!(path = %path.display(), error = %e, "Failed to persist leaderboard");
                } else {
                    debug!(path = %path.display(), bytes = contents.len(), "Leaderboard persisted");
                }
            }
        });

        (Self { tx }, handle)
    }

    /// Queue a full rewrite; never waits on the filesystem
    pub fn persist(&self, contents: String) {
        if self.tx.send(contents).is_err() {
            warn!("Leaderboard writer stopped, update not persisted");
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), LeaderboardError> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Session-scoped and durable leaderboards
#[derive(Debug, Default)]
pub struct LeaderboardStore {
    durable: Leaderboard,
    session: Leaderboard,
    writer: Option<LeaderboardWriter>,
}

impl LeaderboardStore {
    pub fn new(durable: Leaderboard, writer: Option<LeaderboardWriter>) -> Self {
        Self {
            durable,
            session: Leaderboard::new(),
            writer,
        }
    }

    /// Append to both boards, persist the durable one and return the
    /// entry's rank within the session board
    pub fn record(&mut self, entry: LeaderboardEntry) -> usize {
        self.durable.insert(entry.clone());
        let rank = self.session.insert(entry);

        if let Some(writer) = &self.writer {
            writer.persist(self.durable.to_file_contents());
        }

        rank
    }

    pub fn durable(&self) -> &Leaderboard {
        &self.durable
    }

    #[cfg(test)]
    pub fn session(&self) -> &Leaderboard {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.txt", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_sort_descending_time_then_earlier_timestamp() {
        let mut board = Leaderboard::new();
        board.insert(LeaderboardEntry::new("a", 12.3, 1));
        board.insert(LeaderboardEntry::new("b", 45.0, 2));
        board.insert(LeaderboardEntry::new("c", 45.0, 3));

        let order: Vec<(&str, f32, u64)> = board
            .entries()
            .iter()
            .map(|e| (e.player_id.as_str(), e.time, e.timestamp))
            .collect();
        assert_eq!(order, vec![("b", 45.0, 2), ("c", 45.0, 3), ("a", 12.3, 1)]);
    }

    #[test]
    fn test_insert_returns_rank() {
        let mut board = Leaderboard::new();
        assert_eq!(board.insert(LeaderboardEntry::new("a", 10.0, 1)), 1);
        assert_eq!(board.insert(LeaderboardEntry::new("b", 20.0, 2)), 1);
        assert_eq!(board.insert(LeaderboardEntry::new("c", 15.0, 3)), 2);
        assert_eq!(board.insert(LeaderboardEntry::new("d", 20.0, 4)), 2);
        assert_eq!(board.insert(LeaderboardEntry::new("e", 1.0, 5)), 5);
    }

    #[test]
    fn test_file_format_round_trip() {
        let mut board = Leaderboard::new();
        board.insert(LeaderboardEntry::new("p1", 12.5, 1));
        board.insert(LeaderboardEntry::new("p2", 30.0, 2));

        let text = board.to_file_contents();
        assert_eq!(text, "p2,30\np1,12.5\n");

        let parsed = Leaderboard::parse(&text).unwrap();
        let ids: Vec<&str> = parsed.entries().iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(matches!(
            Leaderboard::parse("p1,10\nnonsense\n"),
            Err(LeaderboardError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            Leaderboard::parse("p1,ten\n"),
            Err(LeaderboardError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_store_records_into_both_boards() {
        let mut durable = Leaderboard::new();
        durable.insert(LeaderboardEntry::new("old", 99.0, 0));
        let mut store = LeaderboardStore::new(durable, None);

        let rank = store.record(LeaderboardEntry::new("new", 5.0, 10));
        assert_eq!(rank, 1);
        assert_eq!(store.durable().len(), 2);
        assert_eq!(store.session().len(), 1);
        assert_eq!(store.durable().entries()[1].player_id, "new");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let board = Leaderboard::load(temp_path("missing-leaderboard")).await;
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_empty() {
        let path = temp_path("bad-leaderboard");
        assert_ok!(tokio::fs::write(&path, "p1,10\n???\n").await);

        let board = Leaderboard::load(&path).await;
        assert!(board.is_empty());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_writer_rewrites_whole_file() {
        let path = temp_path("leaderboard");
        let (writer, handle) = LeaderboardWriter::spawn(path.clone());
        let mut store = LeaderboardStore::new(Leaderboard::new(), Some(writer));

        store.record(LeaderboardEntry::new("p1", 10.0, 1));
        store.record(LeaderboardEntry::new("p2", 20.0, 2));
        drop(store);
        assert_ok!(handle.await);

        let text = assert_ok!(tokio::fs::read_to_string(&path).await);
        assert_eq!(text, "p2,20\np1,10\n");

        let reloaded = Leaderboard::load(&path).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entries()[0].player_id, "p2");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
