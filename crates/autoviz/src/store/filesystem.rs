// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::{newest_first, SessionStore};
use crate::error::{StoreError, StoreResult};
use crate::session::{AnalysisSession, SessionId, SessionSummary};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

/// One JSON document per session under a root directory. Writes go to a
/// temporary file in the same directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened session store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{id}.{EXTENSION}"))
    }
}

fn write_atomically(root: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = NamedTempFile::new_in(root)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &AnalysisSession) -> StoreResult<SessionId> {
        let contents = serde_json::to_vec_pretty(session)?;
        let root = self.root.clone();
        let target = self.path_for(&session.id());
        tokio::task::spawn_blocking(move || write_atomically(&root, &target, &contents))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!(session_id = %session.id(), "Session written");
        Ok(session.id())
    }

    async fn load(&self, id: &SessionId) -> StoreResult<AnalysisSession> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(StoreError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<AnalysisSession>(&bytes)?));
            match parsed {
                Ok(session) => summaries.push(session.to_summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }
        newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }
}
