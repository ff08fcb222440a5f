// src/wiki/store.rs
use crate::wiki::error::WikiError;
use log::info;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub title: String,
    pub content: String,
}

/// Entries live as `<title>.md` files in one directory. Titles are matched
/// case-insensitively; the file name keeps the casing used at creation.
#[derive(Debug, Clone)]
pub struct EntryStore {
    dir: PathBuf,
}

impl EntryStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, WikiError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Serving wiki entries from {:?}", dir);
        Ok(EntryStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All stored titles, sorted.
    pub async fn list_entries(&self) -> Result<Vec<String>, WikiError> {
        let mut titles = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                titles.push(stem.to_string());
            }
        }
        titles.sort();
        Ok(titles)
    }

    /// The stored title matching `title` regardless of case.
    pub async fn find(&self, title: &str) -> Result<Option<String>, WikiError> {
        let wanted = title.to_lowercase();
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .find(|stored| stored.to_lowercase() == wanted))
    }

    pub async fn get_entry(&self, title: &str) -> Result<Option<Entry>, WikiError> {
        let Some(stored) = self.find(title).await? else {
            return Ok(None);
        };
        let content = tokio::fs::read_to_string(self.path_for(&stored)).await?;
        Ok(Some(Entry {
            title: stored,
            content,
        }))
    }

    /// Titles containing `query` as a case-insensitive substring.
    pub async fn search(&self, query: &str) -> Result<Vec<String>, WikiError> {
        let needle = query.to_lowercase();
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .filter(|title| title.to_lowercase().contains(&needle))
            .collect())
    }

    /// Writes `content` under `title`, overwriting an existing entry that
    /// matches case-insensitively. Returns the stored title.
    pub async fn save_entry(&self, title: &str, content: &str) -> Result<String, WikiError> {
        let title = validate_title(title)?;
        let stored = self.find(title).await?.unwrap_or_else(|| title.to_string());
        tokio::fs::write(self.path_for(&stored), content).await?;
        info!("Saved entry {:?} ({} bytes)", stored, content.len());
        Ok(stored)
    }

    fn path_for(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{title}.{EXTENSION}"))
    }
}

/// Titles become file names, so they may not name a path.
pub fn validate_title(title: &str) -> Result<&str, WikiError> {
    let trimmed = title.trim();
    let invalid = trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(WikiError::InvalidTitle(title.to_string()));
    }
    Ok(trimmed)
}

/// Form submissions arrive with CRLF line endings.
pub fn normalize_content(content: &str) -> String {
    content.replace('\r', "")
}
