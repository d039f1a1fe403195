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

//! Provider-neutral contract for a text-completion service.
//!
//! Callers depend on [`TextCompletion`] only; concrete providers live with the
//! code that wires them up.

pub mod client;
pub mod config;
pub mod requests;
pub mod responses;
pub mod types;

pub use client::TextCompletion;
pub use config::ProviderConfig;
pub use requests::{CompletionRequest, Message, Role};
pub use responses::{CompletionResponse, FinishReason, Usage};
pub use types::{CompletionError, CompletionResult};
