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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CompletionError {
    #[error("Completion timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request refused by provider: {0}")]
    Refused(String),

    #[error("Transport error: {0}")]
    TransportError(String),
}

impl CompletionError {
    /// Transient failures are worth another attempt; a refusal is a well-formed
    /// answer and repeating the request will not change it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompletionError::Timeout
                | CompletionError::RateLimited
                | CompletionError::TransportError(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            CompletionError::Timeout => "timeout",
            CompletionError::RateLimited => "rate_limited",
            CompletionError::Refused(_) => "refused",
            CompletionError::TransportError(_) => "transport_error",
        }
    }
}

pub type CompletionResult<T> = Result<T, CompletionError>;
