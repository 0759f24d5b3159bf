//! Durable conversation memory.
//!
//! A [`SessionStore`] keeps every conversation turn in one JSON file,
//! grouped into sessions:
//!
//! ```json
//! {
//!   "sessions": [
//!     { "id": "session_20250101_120000", "created": "...",
//!       "messages": [ { "role": "user", "content": "...", "timestamp": "...", "metadata": {} } ],
//!       "context": {} }
//!   ],
//!   "metadata": { "created": "...", "version": "1.0", "last_updated": "..." }
//! }
//! ```
//!
//! The file is the source of truth: the store loads it on open and
//! rewrites it in full after every mutation. Exactly one session is
//! current at any time.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::MemoryError;

const FORMAT_VERSION: &str = "1.0";

pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub context: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryMetadata {
    created: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    sessions: Vec<Session>,
    metadata: MemoryMetadata,
}

impl MemoryFile {
    fn fresh() -> Self {
        Self {
            sessions: Vec::new(),
            metadata: MemoryMetadata {
                created: now(),
                version: FORMAT_VERSION.to_string(),
                last_updated: None,
            },
        }
    }
}

/// A message that matched [`SessionStore::search_conversations`].
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMatch {
    pub session_id: String,
    pub session_date: String,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_sessions: usize,
    pub current_session: String,
    pub total_messages: usize,
    pub memory_file: String,
    pub last_updated: Option<String>,
    pub created: String,
}

pub struct SessionStore {
    path: PathBuf,
    state: MemoryFile,
    current: String,
}

impl SessionStore {
    /// Load the store at `path`, resuming its most recent session.
    ///
    /// Never fails: a missing file starts an empty store, and an
    /// unparseable one is moved aside to `<file>.corrupt` before starting
    /// fresh. A store without sessions gets a new one immediately.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "could not create memory directory");
            }
        }

        let state = load_state(&path);
        let mut store = Self {
            path,
            state,
            current: String::new(),
        };

        match store.state.sessions.last() {
            Some(last) => store.current = last.id.clone(),
            None => {
                store.current = store.push_session();
                if let Err(e) = store.persist() {
                    tracing::warn!(error = %e, "could not save new session");
                }
            }
        }

        tracing::debug!(session = %store.current, sessions = store.state.sessions.len(), "memory loaded");
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_session(&self) -> &str {
        &self.current
    }

    pub fn sessions(&self) -> &[Session] {
        &self.state.sessions
    }

    /// Append an empty session without switching to it.
    pub fn create_session(&mut self) -> Result<String, MemoryError> {
        let id = self.push_session();
        self.persist()?;
        Ok(id)
    }

    /// Create a session and make it current. Earlier sessions stay stored
    /// and searchable but no longer contribute recent context.
    pub fn start_new_session(&mut self) -> Result<String, MemoryError> {
        let id = self.push_session();
        self.current = id.clone();
        tracing::info!(session = %id, "started new session");
        self.persist()?;
        Ok(id)
    }

    /// Append a message to the current session.
    ///
    /// On a persistence error the message is still held in memory.
    pub fn add_message(
        &mut self,
        role: Role,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), MemoryError> {
        let session = self
            .state
            .sessions
            .iter_mut()
            .find(|s| s.id == self.current)
            .ok_or_else(|| MemoryError::SessionNotFound(self.current.clone()))?;

        session.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now(),
            metadata,
        });
        self.persist()
    }

    /// The last `n` messages of the current session, oldest first.
    pub fn recent_context(&self, n: usize) -> &[Message] {
        match self.state.sessions.iter().rev().find(|s| s.id == self.current) {
            Some(session) => {
                let start = session.messages.len().saturating_sub(n);
                &session.messages[start..]
            }
            None => &[],
        }
    }

    /// Case-insensitive substring search over every session, oldest
    /// session first, stopping after `limit` matches.
    pub fn search_conversations(&self, query: &str, limit: usize) -> Vec<ConversationMatch> {
        let needle = query.to_lowercase();
        self.state
            .sessions
            .iter()
            .flat_map(|session| {
                session
                    .messages
                    .iter()
                    .map(move |message| (session, message))
            })
            .filter(|(_, message)| message.content.to_lowercase().contains(&needle))
            .take(limit)
            .map(|(session, message)| ConversationMatch {
                session_id: session.id.clone(),
                session_date: session.created.clone(),
                message: message.clone(),
            })
            .collect()
    }

    /// Drop every session and start over with one fresh current session.
    pub fn clear_memory(&mut self) -> Result<(), MemoryError> {
        self.state = MemoryFile::fresh();
        self.current = self.push_session();
        tracing::info!(session = %self.current, "memory cleared");
        self.persist()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_sessions: self.state.sessions.len(),
            current_session: self.current.clone(),
            total_messages: self.state.sessions.iter().map(|s| s.messages.len()).sum(),
            memory_file: self.path.display().to_string(),
            last_updated: self.state.metadata.last_updated.clone(),
            created: self.state.metadata.created.clone(),
        }
    }

    fn push_session(&mut self) -> String {
        let base = format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let mut id = base.clone();
        let mut n = 2;
        while self.state.sessions.iter().any(|s| s.id == id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }

        self.state.sessions.push(Session {
            id: id.clone(),
            created: now(),
            messages: Vec::new(),
            context: Metadata::new(),
        });
        id
    }

    /// Write the whole state through a temp file and rename.
    fn persist(&mut self) -> Result<(), MemoryError> {
        self.state.metadata.last_updated = Some(now());

        let write = || -> std::io::Result<()> {
            let json = serde_json::to_string_pretty(&self.state)?;
            let tmp = sibling(&self.path, "tmp");
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &self.path)
        };

        write().map_err(|source| {
            tracing::warn!(path = %self.path.display(), error = %source, "could not save memory");
            MemoryError::Persist {
                path: self.path.display().to_string(),
                source,
            }
        })
    }
}

fn load_state(path: &Path) -> MemoryFile {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MemoryFile::fresh(),
        Err(e) => {
            set_aside(path, &e, "could not read memory file, starting fresh");
            return MemoryFile::fresh();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(state) => state,
        Err(e) => {
            set_aside(path, &e, "memory file is malformed, starting fresh");
            MemoryFile::fresh()
        }
    }
}

/// Move an unusable memory file to `<file>.corrupt` so the next save
/// cannot overwrite its history.
fn set_aside(path: &Path, error: &dyn std::error::Error, message: &str) {
    let backup = sibling(path, "corrupt");
    tracing::warn!(
        path = %path.display(),
        backup = %backup.display(),
        error = %error,
        "{}",
        message
    );
    if let Err(e) = std::fs::rename(path, &backup) {
        tracing::warn!(error = %e, "could not back up memory file");
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn now() -> String {
    Local::now().to_rfc3339()
}
