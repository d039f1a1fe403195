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

use autoviz::config::PipelineConfig;
use autoviz::error::StoreError;
use autoviz::ingest::Upload;
use autoviz::pipeline::AnalysisPipeline;
use autoviz::session::{AnalysisSession, SessionId};
use autoviz::store::{FileSessionStore, InMemorySessionStore, SessionStore};
use tokio_util::sync::CancellationToken;

async fn analysed(text: &str) -> AnalysisSession {
    AnalysisPipeline::new(PipelineConfig::default(), None)
        .unwrap()
        .analyze(
            &Upload::new(text.as_bytes().to_vec()).with_filename("sales.csv"),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
}

async fn exercise(store: &dyn SessionStore) {
    let first = analysed("region,units\nnorth,4\nsouth,7\nnorth,\n").await;
    let second = analysed("region,units\neast,1\nwest,2\n").await;

    assert_eq!(store.save(&first).await.unwrap(), first.id());
    store.save(&second).await.unwrap();

    let loaded = store.load(&first.id()).await.unwrap();
    assert_eq!(loaded, first);
    assert_eq!(loaded.cleaning_log(), first.cleaning_log());
    assert_eq!(loaded.charts(), first.charts());

    let history = store.list().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id());
    assert_eq!(history[1].filename.as_deref(), Some("sales.csv"));
    assert_eq!(history[1].rows, Some(3));

    store.delete(&first.id()).await.unwrap();
    assert!(matches!(
        store.load(&first.id()).await,
        Err(StoreError::NotFound(id)) if id == first.id()
    ));
    assert!(matches!(
        store.delete(&SessionId::new()).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_in_memory_store() {
    let store = InMemorySessionStore::new();
    exercise(&store).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::open(dir.path().join("sessions")).await.unwrap();
    exercise(&store).await;

    let files: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_file_store_skips_corrupt_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::open(dir.path()).await.unwrap();
    let session = analysed("a,b\n1,x\n2,y\n").await;
    store.save(&session).await.unwrap();
    std::fs::write(dir.path().join("garbage.json"), b"{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let history = store.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, session.id());
}

#[tokio::test]
async fn test_saved_session_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let session = analysed("a,b\n1,x\n2,y\n").await;
    {
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        store.save(&session).await.unwrap();
    }
    let reopened = FileSessionStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.load(&session.id()).await.unwrap(), session);
}

#[tokio::test]
async fn test_sessions_with_extreme_values_round_trip() {
    let session = analysed("big,label\n1e308,a\n1.5e308,b\n1.7e308,c\n").await;
    let stats = session.clean_profiles().unwrap()[0].numeric.clone().unwrap();
    assert!(stats.mean.is_finite());
    assert!(stats.std_dev.map_or(true, f64::is_finite));

    let dir = tempfile::tempdir().unwrap();
    let file_store = FileSessionStore::open(dir.path()).await.unwrap();
    let memory_store = InMemorySessionStore::new();
    for store in [&file_store as &dyn SessionStore, &memory_store] {
        store.save(&session).await.unwrap();
        assert_eq!(store.load(&session.id()).await.unwrap(), session);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
