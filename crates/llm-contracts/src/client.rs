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

use crate::requests::CompletionRequest;
use crate::responses::CompletionResponse;
use crate::types::CompletionResult;
use async_trait::async_trait;

/// A black-box text-completion service.
///
/// Implementations perform exactly one attempt per call. Timeouts, retries and
/// backoff belong to the caller.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse>;

    fn provider_name(&self) -> &str;
}
