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

use anyhow::Result;
use autoviz::session::{AnalysisSession, InsightOutcome, SessionSummary};
use autoviz::table::Tabular;

pub fn print_session(session: &AnalysisSession, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
        return Ok(());
    }

    println!("Session {} [{}]", session.id(), session.status());
    if let Some(filename) = &session.upload().filename {
        println!("File: {filename} ({} bytes)", session.upload().byte_len);
    }
    if let Some(previous) = session.supersedes() {
        println!("Supersedes: {previous}");
    }
    if let Some(raw) = session.raw_table() {
        println!(
            "Ingested {} rows x {} columns ({}, delimiter {:?}, {} rejected)",
            raw.row_count(),
            raw.column_count(),
            raw.encoding(),
            raw.delimiter(),
            raw.rejected_rows().len()
        );
    }
    if let Some(summary) = session.summary() {
        println!("{summary}");
    }

    if let Some(profiles) = session.clean_profiles() {
        println!("\nColumns:");
        for profile in profiles {
            println!("  {profile}");
        }
    }

    if let Some(log) = session.cleaning_log() {
        println!("\nCleaning ({} actions):", log.len());
        for action in log.iter() {
            println!("  {action}");
        }
    }

    if let Some(charts) = session.charts() {
        println!("\nCharts:");
        for chart in charts {
            println!("  {chart}");
        }
    }

    match session.insight_outcome() {
        Some(InsightOutcome::Generated(statements)) => {
            println!("\nInsights:");
            for statement in statements {
                let columns = if statement.columns.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", statement.columns.join(", "))
                };
                println!("  - {}{columns}", statement.text);
            }
        }
        Some(InsightOutcome::Skipped) => println!("\nInsights: not requested"),
        None => {}
    }
    if let Some((stage, kind, message)) = session.failure() {
        println!("\nFailed at {stage} ({kind}): {message}");
    }
    Ok(())
}

pub fn print_history(history: &[SessionSummary]) {
    if history.is_empty() {
        println!("No sessions recorded");
        return;
    }
    for entry in history {
        let shape = match (entry.rows, entry.columns) {
            (Some(rows), Some(columns)) => format!("{rows}x{columns}"),
            _ => "-".to_string(),
        };
        println!(
            "{}  {}  {:<28}  {:<9}  charts={} insights={}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.status,
            shape,
            entry.chart_count,
            entry.insight_count,
            entry.filename.as_deref().unwrap_or("<unnamed>")
        );
    }
}
