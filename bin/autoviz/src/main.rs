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

mod report;

use anyhow::{anyhow, Context, Result};
use autoviz::config::PipelineConfig;
use autoviz::ingest::Upload;
use autoviz::llm::OpenAIClient;
use autoviz::pipeline::AnalysisPipeline;
use autoviz::session::{AnalysisSession, SessionId, Stage};
use autoviz::store::{FileSessionStore, SessionStore};
use clap::{Parser, Subcommand};
use llm_contracts::TextCompletion;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Ingest, profile, clean and chart a delimited file.
    Analyze {
        file: PathBuf,
        /// Encoding label to try first (e.g. windows-1252).
        #[arg(long)]
        encoding: Option<String>,
        #[arg(long, default_value_t = false)]
        no_insights: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    Show {
        id: SessionId,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    History,

    /// Re-run every stage after ingest under the current configuration.
    Reanalyze {
        id: SessionId,
        #[arg(long, default_value_t = false)]
        no_insights: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Write a session's cleaned table as CSV.
    Export {
        id: SessionId,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "autoviz")]
#[command(about = "Automated profiling, cleaning, chart selection and insights for tabular data")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    /// TOML configuration file; AUTOVIZ_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = ".autoviz/sessions")]
    store_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Cli::parse();

    let filter = if args.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("debug,reqwest=info,hyper=info,h2=info,hyper_util=info,rustls=info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,reqwest=warn,hyper=warn,h2=warn,hyper_util=warn,rustls=warn")
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = PipelineConfig::load(args.config.as_deref()).context("loading configuration")?;
    let store = FileSessionStore::open(&args.store_dir)
        .await
        .with_context(|| format!("opening session store {}", args.store_dir.display()))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling pending insight requests");
            interrupt.cancel();
        }
    });

    match args.command {
        Commands::Analyze {
            file,
            encoding,
            no_insights,
            json,
        } => {
            let mut upload =
                Upload::from_path(&file).with_context(|| format!("reading {}", file.display()))?;
            if let Some(encoding) = encoding {
                upload = upload.with_encoding(encoding);
            }
            let pipeline = build_pipeline(config, no_insights)?;
            let session = pipeline.analyze(&upload, &cancel).await?;
            store.save(&session).await?;
            finish(&session, json)
        }
        Commands::Show { id, json } => {
            let session = store.load(&id).await?;
            report::print_session(&session, json)
        }
        Commands::History => {
            let history = store.list().await?;
            report::print_history(&history);
            Ok(())
        }
        Commands::Reanalyze {
            id,
            no_insights,
            json,
        } => {
            let previous = store.load(&id).await?;
            let pipeline = build_pipeline(config, no_insights)?;
            let session = pipeline.reanalyze(&previous, &cancel).await?;
            store.save(&session).await?;
            finish(&session, json)
        }
        Commands::Export { id, out } => {
            let session = store.load(&id).await?;
            let clean = session
                .clean_table()
                .ok_or_else(|| anyhow!("session {id} has no cleaned table"))?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            clean.write_csv(file)?;
            info!(session_id = %id, out = %out.display(), "Exported cleaned table");
            Ok(())
        }
    }
}

fn build_pipeline(mut config: PipelineConfig, no_insights: bool) -> Result<AnalysisPipeline> {
    if no_insights {
        config.insight.enabled = false;
    }
    let client: Option<Arc<dyn TextCompletion>> = if config.insight.enabled {
        let client = OpenAIClient::new(&config.provider, config.completion_timeout())?;
        if client.has_api_key() {
            Some(Arc::new(client) as Arc<dyn TextCompletion>)
        } else {
            warn!(
                env = %config.provider.api_key_env,
                "No API key found; insight generation will be skipped"
            );
            None
        }
    } else {
        None
    };
    Ok(AnalysisPipeline::new(config, client)?)
}

/// Prints the session and maps an early failure to a non-zero exit.
fn finish(session: &AnalysisSession, json: bool) -> Result<()> {
    report::print_session(session, json)?;
    match session.failure() {
        Some((Stage::Insight, kind, message)) => {
            warn!(session_id = %session.id(), %kind, "Insights unavailable: {message}");
            Ok(())
        }
        Some((stage, kind, message)) => Err(anyhow!(
            "session {} failed at {stage} ({kind}): {message}",
            session.id()
        )),
        None => Ok(()),
    }
}
