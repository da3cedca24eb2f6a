use crate::protocol::{DaemonState, MetadataSnapshot, PlaybackStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub last_url: Option<String>,
    pub gain: f32,
}

pub struct StateManager {
    state: Arc<RwLock<DaemonState>>,
    state_file: PathBuf,
}

impl StateManager {
    /// Loads `state_file` if present.  `default_gain` is used when nothing
    /// was persisted yet.
    pub fn new(state_file: PathBuf, default_gain: f32) -> Self {
        let persistent = Self::load_persistent(&state_file).unwrap_or(PersistentState {
            last_url: None,
            gain: default_gain,
        });

        let state = DaemonState {
            rev: 1,
            url: persistent.last_url,
            status: PlaybackStatus::Inactive,
            gain: persistent.gain.clamp(0.0, 1.0),
            metadata: MetadataSnapshot::default(),
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            state_file,
        }
    }

    pub async fn get_state(&self) -> DaemonState {
        self.state.read().await.clone()
    }

    /// Records the url passed to start.  An empty url clears it.
    pub async fn set_url(&self, url: &str) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.url = if url.is_empty() {
                None
            } else {
                Some(url.to_string())
            };
            state.metadata = MetadataSnapshot::default();
            state.rev += 1;
        }
        self.save().await
    }

    /// Returns true when the status actually changed.
    pub async fn set_status(&self, status: PlaybackStatus) -> bool {
        let mut state = self.state.write().await;
        if state.status == status {
            return false;
        }
        state.status = status;
        if status == PlaybackStatus::Inactive {
            state.metadata = MetadataSnapshot::default();
        }
        state.rev += 1;
        true
    }

    pub async fn set_gain(&self, gain: f32) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.gain = gain.clamp(0.0, 1.0);
            state.rev += 1;
        }
        self.save().await
    }

    pub async fn set_metadata(&self, metadata: MetadataSnapshot) {
        let mut state = self.state.write().await;
        state.metadata = metadata;
        state.rev += 1;
    }

    async fn save(&self) -> anyhow::Result<()> {
        let state = self.state.read().await;
        let persistent = PersistentState {
            last_url: state.url.clone(),
            gain: state.gain,
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &PathBuf) -> Option<PersistentState> {
        let content = std::fs::read_to_string(state_file).ok()?;
        match serde_json::from_str::<PersistentState>(&content) {
            Ok(persistent) => Some(persistent),
            Err(e) => {
                tracing::warn!("Ignoring unreadable state file {}: {}", state_file.display(), e);
                None
            }
        }
    }
}
