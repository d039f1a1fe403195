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

//! Natural-language insight generation over profiles and chosen charts.

pub mod generator;
pub mod parser;
pub mod prompt;

pub use generator::InsightGenerator;
pub use parser::ResponseParser;
pub use prompt::{InsightPrompt, PromptBuilder};

use serde::{Deserialize, Serialize};

/// One observation tied to the columns that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightStatement {
    pub text: String,
    pub columns: Vec<String>,
    pub confidence: Option<f64>,
}
