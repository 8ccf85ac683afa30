//! File Journal
//!
//! Stores each trade as `<dir>/<id>.json`. Writes go to a temporary file
//! that is renamed over the target, so a crash never leaves a half-written
//! document behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::{Trade, TradeId};
use crate::ports::{JournalError, TradeJournal};

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Clone)]
pub struct FileJournal {
    dir: PathBuf,
}

impl FileJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trade_path(&self, id: TradeId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }

    /// Read a single trade, `None` if it was never written
    pub async fn load(&self, id: TradeId) -> Result<Option<Trade>, JournalError> {
        let path = self.trade_path(id);
        match fs::read_to_string(&path).await {
            Ok(content) => parse(&path, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(JournalError::ReadError(format!("{}: {}", path.display(), e))),
        }
    }
}

fn parse(path: &Path, content: &str) -> Result<Trade, JournalError> {
    serde_json::from_str(content)
        .map_err(|e| JournalError::CorruptedFile(format!("{}: {}", path.display(), e)))
}

#[async_trait]
impl TradeJournal for FileJournal {
    async fn save(&self, trade: &Trade) -> Result<(), JournalError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| JournalError::DirectoryError(e.to_string()))?;

        let content = serde_json::to_string_pretty(trade)
            .map_err(|e| JournalError::SerializationError(e.to_string()))?;

        let path = self.trade_path(trade.id);
        let tmp = path.with_extension(TMP_EXTENSION);
        fs::write(&tmp, content)
            .await
            .map_err(|e| JournalError::WriteError(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| JournalError::WriteError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Journaled trade {} ({})", trade.id, trade.status);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Trade>, JournalError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::ReadError(e.to_string())),
        };

        let mut trades = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JournalError::ReadError(e.to_string()))?
        {
            let path = entry.path();
            // Leftover temp files from an interrupted write are skipped
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| JournalError::ReadError(format!("{}: {}", path.display(), e)))?;
            trades.push(parse(&path, &content)?);
        }

        tracing::info!("Loaded {} trades from {}", trades.len(), self.dir.display());
        Ok(trades)
    }
}
