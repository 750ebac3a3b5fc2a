//! Session tests against the in-memory store

use cumulus_browser::{
    BrowserConfig, BrowserError, BrowserEvent, BrowserSession, BrowserSnapshot, Command, Pointer,
    SessionHandle, UploadStatus,
};
use cumulus_fs::{ApiError, FileHandle, MemoryFs, Operation, Search};
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn seeded(files: usize) -> Arc<MemoryFs> {
    let fs = MemoryFs::new("alice");
    for i in 0..files {
        fs.add_file(&format!("/docs/file-{:03}.txt", i), 100).unwrap();
    }
    fs.add_directory("/photos").unwrap();
    Arc::new(fs)
}

fn start(
    fs: &Arc<MemoryFs>,
    config: BrowserConfig,
) -> (SessionHandle, UnboundedReceiver<BrowserEvent>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    BrowserSession::spawn(config, fs.clone()).unwrap()
}

async fn settle<F>(session: &SessionHandle, predicate: F) -> BrowserSnapshot
where
    F: FnMut(&BrowserSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), session.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .unwrap()
}

async fn open(session: &SessionHandle, path: &str) -> BrowserSnapshot {
    session
        .dispatch(Command::Navigate {
            path: path.to_string(),
        })
        .await
        .unwrap();
    let expected = path.to_string();
    settle(session, move |s| {
        s.current_path() == Some(expected.as_str()) && !s.loading_more
    })
    .await
}

#[tokio::test]
async fn test_paginates_large_directory() {
    let fs = seeded(120);
    let (session, _events) = start(&fs, BrowserConfig::default());

    let snapshot = open(&session, "/docs").await;
    assert_eq!(snapshot.content.len(), 50);
    assert_eq!(snapshot.content_size, Some(120));

    for expected in [100, 120] {
        session.dispatch(Command::LoadMore).await.unwrap();
        let snapshot = settle(&session, |s| !s.loading_more).await;
        assert_eq!(snapshot.content.len(), expected);
    }

    session.dispatch(Command::LoadMore).await.unwrap();
    let snapshot = session.snapshot();
    assert!(!snapshot.loading_more);
    assert_eq!(snapshot.content.len(), 120);
    assert_eq!(fs.calls(Operation::FetchContentPage), 3);

    let names: Vec<&str> = snapshot.content.iter().map(|n| n.name()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[tokio::test]
async fn test_upload_into_partial_listing_loads_every_node() {
    let fs = seeded(120);
    let (session, _events) = start(&fs, BrowserConfig::default());
    let snapshot = open(&session, "/docs").await;
    assert_eq!(snapshot.content.len(), 50);

    session
        .dispatch(Command::StageFiles {
            files: vec![FileHandle::from_bytes("zzz.txt", vec![7u8; 64])],
        })
        .await
        .unwrap();
    session.dispatch(Command::UploadAll).await.unwrap();
    let snapshot = settle(&session, |s| s.uploads_drained).await;
    assert_eq!(snapshot.uploads[0].status, UploadStatus::Done);
    assert_eq!(snapshot.content.len(), 51);

    for _ in 0..2 {
        session.dispatch(Command::LoadMore).await.unwrap();
        settle(&session, |s| !s.loading_more).await;
    }
    let snapshot = session.snapshot();
    assert_eq!(snapshot.content.len(), 121);
    assert_eq!(snapshot.content_size, Some(121));
    assert!(snapshot.is_complete());
    assert!(snapshot.content.iter().any(|n| n.name() == "file-050.txt"));
    assert_eq!(
        snapshot.content.iter().filter(|n| n.name() == "zzz.txt").count(),
        1
    );

    let page_calls = fs.calls(Operation::FetchContentPage);
    session.dispatch(Command::LoadMore).await.unwrap();
    assert!(!session.snapshot().loading_more);
    assert_eq!(fs.calls(Operation::FetchContentPage), page_calls);
}

#[tokio::test]
async fn test_last_navigation_wins() {
    let fs = seeded(3);
    fs.add_file("/slow/late.txt", 1).unwrap();
    fs.set_latency("/slow", Duration::from_millis(150));
    let (session, _events) = start(&fs, BrowserConfig::default());

    session
        .dispatch(Command::Navigate {
            path: "/slow".into(),
        })
        .await
        .unwrap();
    let snapshot = open(&session, "/docs").await;
    assert_eq!(snapshot.content.len(), 3);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_path(), Some("/docs"));
    assert_eq!(snapshot.content.len(), 3);
    assert_eq!(fs.calls(Operation::FetchDirectory), 2);
}

#[tokio::test]
async fn test_navigation_failure_event() {
    let fs = seeded(1);
    let (session, mut events) = start(&fs, BrowserConfig::default());

    session
        .dispatch(Command::Navigate {
            path: "/missing".into(),
        })
        .await
        .unwrap();
    let snapshot = settle(&session, |s| !s.directory_loading).await;
    assert!(snapshot.directory_error.as_ref().is_some_and(|e| e.is_not_found()));
    assert!(snapshot.current.is_none());

    match events.next().await {
        Some(BrowserEvent::NavigationFailed { path, .. }) => assert_eq!(path, "/missing"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_search_never_reaches_store() {
    let fs = seeded(10);
    let config = BrowserConfig {
        search_debounce_ms: 50,
        ..Default::default()
    };
    let (session, _events) = start(&fs, config);
    let before = open(&session, "/docs").await;

    session
        .dispatch(Command::SetSearch {
            search: Some(Search::new("file-00")),
        })
        .await
        .unwrap();
    session
        .dispatch(Command::SetSearch { search: None })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fs.calls(Operation::SearchPage), 0);
    assert_eq!(session.snapshot().content, before.content);
}

#[tokio::test]
async fn test_debounced_search_replaces_content() {
    let fs = seeded(30);
    let config = BrowserConfig {
        search_debounce_ms: 20,
        ..Default::default()
    };
    let (session, _events) = start(&fs, config);
    open(&session, "/docs").await;

    for query in ["f", "fi", "file-01"] {
        session
            .dispatch(Command::SetSearch {
                search: Some(Search::new(query)),
            })
            .await
            .unwrap();
    }
    let snapshot = settle(&session, |s| s.content_size.is_some() && !s.loading_more).await;

    assert_eq!(fs.calls(Operation::SearchPage), 1);
    assert_eq!(snapshot.content.len(), 10);
    assert!(snapshot.content.iter().all(|n| n.name().contains("file-01")));

    session
        .dispatch(Command::SetSearch { search: None })
        .await
        .unwrap();
    assert_eq!(session.snapshot().content.len(), 30);
}

#[tokio::test]
async fn test_uploads_run_independently() {
    let fs = seeded(2);
    fs.inject_failure(
        Operation::UploadFile,
        Some("bad.txt"),
        ApiError::transport("connection reset"),
    );
    let (session, mut events) = start(&fs, BrowserConfig::default());
    open(&session, "/docs").await;

    session
        .dispatch(Command::StageFiles {
            files: vec![
                FileHandle::from_bytes("good.txt", vec![1u8; 600_000]),
                FileHandle::from_bytes("bad.txt", vec![2u8; 10]),
            ],
        })
        .await
        .unwrap();
    session.dispatch(Command::UploadAll).await.unwrap();
    let snapshot = settle(&session, |s| s.uploads_drained).await;

    let good = &snapshot.uploads[0];
    let bad = &snapshot.uploads[1];
    assert_eq!((good.status, good.progress), (UploadStatus::Done, 100));
    assert_eq!(bad.status, UploadStatus::Ready);
    assert_eq!(bad.error.as_ref().map(|e| e.key.as_str()), Some("api-error.transport"));

    assert_eq!(snapshot.content.len(), 3);
    assert!(snapshot.content.iter().any(|n| n.name() == "good.txt"));
    assert!(fs.node("/docs/good.txt").is_some());

    let mut completed = 0;
    let mut failed = 0;
    while completed + failed < 2 {
        match events.next().await {
            Some(BrowserEvent::UploadCompleted { .. }) => completed += 1,
            Some(BrowserEvent::UploadFailed { .. }) => failed += 1,
            Some(_) => {}
            None => break,
        }
    }
    assert_eq!((completed, failed), (1, 1));
}

#[tokio::test]
async fn test_upload_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join("notes.md");
    std::fs::write(&local, b"# Notes\n").unwrap();

    let fs = seeded(0);
    let (session, _events) = start(&fs, BrowserConfig::default());
    open(&session, "/photos").await;

    let handle = FileHandle::from_path(&local).await.unwrap();
    assert_eq!(handle.size, 8);
    session
        .dispatch(Command::StageFiles {
            files: vec![handle],
        })
        .await
        .unwrap();
    session.dispatch(Command::UploadAll).await.unwrap();
    let snapshot = settle(&session, |s| {
        s.uploads.iter().all(|t| t.status == UploadStatus::Done)
    })
    .await;

    assert_eq!(snapshot.content.len(), 1);
    let stored = fs.node("/photos/notes.md").unwrap();
    let file = stored.as_file().unwrap();
    assert_eq!(file.size, 8);
    assert!(file.cipher.is_some());
}

#[tokio::test]
async fn test_drag_selection_onto_directory() {
    let fs = seeded(5);
    fs.add_directory("/docs/archive").unwrap();
    let (session, mut events) = start(&fs, BrowserConfig::default());
    let snapshot = open(&session, "/docs").await;

    let archive = snapshot.content[0].clone();
    assert!(archive.is_directory());
    let picked: Vec<_> = snapshot.content[1..4].to_vec();
    for node in &picked {
        session
            .dispatch(Command::Select {
                id: node.id().to_string(),
            })
            .await
            .unwrap();
    }

    session
        .dispatch(Command::BeginDrag {
            node: picked[1].clone(),
            pointer: Pointer { x: 5.0, y: 5.0 },
        })
        .await
        .unwrap();
    assert_eq!(session.snapshot().dragged.map(|d| d.nodes), Some(picked.clone()));

    session
        .dispatch(Command::Drop { target: archive })
        .await
        .unwrap();
    session.dispatch(Command::EndDrag).await.unwrap();

    let snapshot = settle(&session, |s| s.content.len() == 3).await;
    for node in &picked {
        assert!(!snapshot.content.contains(node));
        assert!(fs
            .node(&format!("/docs/archive/{}", node.name()))
            .is_some());
    }
    assert!(snapshot.selection.is_empty());
    assert!(snapshot.dragged.is_none());

    loop {
        match events.next().await {
            Some(BrowserEvent::NodesMoved { nodes, destination }) => {
                assert_eq!(destination, "/docs/archive");
                assert_eq!(nodes.len(), 3);
                break;
            }
            Some(_) => {}
            None => panic!("event stream closed"),
        }
    }
}

#[tokio::test]
async fn test_create_and_delete_directory() {
    let fs = seeded(1);
    let (session, _events) = start(&fs, BrowserConfig::default());
    open(&session, "/docs").await;

    session
        .dispatch(Command::CreateDirectory {
            name: "reports".into(),
        })
        .await
        .unwrap();
    let snapshot = settle(&session, |s| s.content.len() == 2).await;
    let created = snapshot.content[1].clone();
    assert_eq!(created.path(), "/docs/reports");

    session
        .dispatch(Command::DeleteNodes {
            node_ids: vec![created.id().to_string()],
            delete_content: false,
        })
        .await
        .unwrap();
    let snapshot = settle(&session, |s| s.content.len() == 1).await;
    assert!(snapshot.operation_error.is_none());
    assert!(fs.node("/docs/reports").is_none());
}

#[tokio::test]
async fn test_rejected_command_reports_error() {
    let fs = seeded(1);
    let (session, _events) = start(&fs, BrowserConfig::default());

    let result = session
        .dispatch(Command::StageFiles {
            files: vec![FileHandle::from_bytes("a.txt", vec![1])],
        })
        .await;
    assert!(matches!(result, Err(BrowserError::NoCurrentDirectory)));
    assert!(session.snapshot().uploads.is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let fs = seeded(0);
    let config = BrowserConfig {
        page_size: 0,
        ..Default::default()
    };
    let result = BrowserSession::spawn(config, fs);
    assert!(matches!(result, Err(BrowserError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_commands_fail_after_shutdown() {
    let fs = seeded(0);
    let (session, _events) = start(&fs, BrowserConfig::default());
    session.shutdown().unwrap();

    let result = session.dispatch(Command::SelectAll).await;
    assert!(matches!(result, Err(BrowserError::SessionClosed)));
}
