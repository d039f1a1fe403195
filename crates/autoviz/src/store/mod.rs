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

//! Session persistence. A saved session is either fully retrievable or not
//! visible at all.

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSessionStore;
pub use memory::InMemorySessionStore;

use crate::error::StoreResult;
use crate::session::{AnalysisSession, SessionId, SessionSummary};
use async_trait::async_trait;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Saving a session whose id already exists replaces it.
    async fn save(&self, session: &AnalysisSession) -> StoreResult<SessionId>;

    async fn load(&self, id: &SessionId) -> StoreResult<AnalysisSession>;

    /// History, newest first.
    async fn list(&self) -> StoreResult<Vec<SessionSummary>>;

    async fn delete(&self, id: &SessionId) -> StoreResult<()>;
}

pub(crate) fn newest_first(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
