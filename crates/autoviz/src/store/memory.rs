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
use dashmap::DashMap;
use tracing::{debug, warn};

/// Keeps serialised snapshots, so a loaded session never aliases the one
/// that was saved.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, String>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &AnalysisSession) -> StoreResult<SessionId> {
        let snapshot = serde_json::to_string(session)?;
        self.sessions.insert(session.id(), snapshot);
        debug!(session_id = %session.id(), "Session saved in memory");
        Ok(session.id())
    }

    async fn load(&self, id: &SessionId) -> StoreResult<AnalysisSession> {
        let snapshot = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*id))?;
        Ok(serde_json::from_str(&snapshot)?)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for entry in self.sessions.iter() {
            match serde_json::from_str::<AnalysisSession>(entry.value()) {
                Ok(session) => summaries.push(session.to_summary()),
                Err(e) => warn!(
                    session_id = %entry.key(),
                    error = %e,
                    "Skipping unreadable session snapshot"
                ),
            }
        }
        newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(*id))
    }
}
