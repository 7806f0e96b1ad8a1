use memo_core::model::memo::parse_timestamp;
use memo_core::{
    open_repository, IndexBackend, IndexedMemoRepository, Memo, MemoFields, MemoRepository,
    MemoService, RepoError, StorageLayout, SyncStatus,
};
use std::sync::Arc;

const BACKENDS: [IndexBackend; 2] = [IndexBackend::OrderedList, IndexBackend::Relational];

fn memo_at(title: &str, content: &str, timestamp: &str) -> Memo {
    let at = parse_timestamp(timestamp).unwrap();
    Memo::from_fields(MemoFields {
        id: uuid::Uuid::new_v4(),
        title: title.to_string(),
        content: content.to_string(),
        created_at: at,
        updated_at: at,
        tags: Vec::new(),
        is_pinned: false,
        version: 1,
        sync_status: SyncStatus::Synced,
        deleted_at: None,
    })
}

#[tokio::test]
async fn add_then_read_back_on_both_backends() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let repo = open_repository(layout.clone(), backend).await.unwrap();

        let memo = Memo::create_new("Groceries", "# List\n- milk\n- eggs")
            .with_tags(&["home".to_string(), "Errands".to_string()]);
        repo.add(&memo).await.unwrap();

        let loaded = repo.get_by_id(memo.id()).await.unwrap().unwrap();
        assert_eq!(loaded, memo, "backend {backend:?}");
        assert!(layout.content_file(memo.id()).exists());

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let summaries = repo.list().await.unwrap();
        assert_eq!(summaries[0].preview, memo.preview());
        assert_eq!(summaries[0].file_path, format!("content/{}.md", memo.id()));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}

#[tokio::test]
async fn most_recent_memo_comes_first() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();

        let older = memo_at("T1", "first", "2024-05-01T10:00:00Z");
        let newer = memo_at("T2", "second", "2024-05-01T11:00:00Z");
        repo.add(&older).await.unwrap();
        repo.add(&newer).await.unwrap();

        let titles: Vec<String> = repo
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|memo| memo.title().to_string())
            .collect();
        assert_eq!(titles, ["T2", "T1"], "backend {backend:?}");
    }
}

#[tokio::test]
async fn relational_backend_puts_pinned_memos_first() {
    let dir = tempfile::tempdir().unwrap();
    let repo = IndexedMemoRepository::relational(StorageLayout::new(dir.path()))
        .await
        .unwrap();

    let pinned = memo_at("pinned", "", "2024-01-01T00:00:00Z").with_pinned(true);
    let recent = memo_at("recent", "", "2024-06-01T00:00:00Z");
    repo.add(&recent).await.unwrap();
    repo.add(&pinned).await.unwrap();

    let all = repo.get_all().await.unwrap();
    assert_eq!(all[0].id(), pinned.id());
    assert_eq!(all[1].id(), recent.id());
}

#[tokio::test]
async fn orphaned_index_entries_are_hidden() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let repo = open_repository(layout.clone(), backend).await.unwrap();

        let kept = Memo::create_new("kept", "body");
        let orphan = Memo::create_new("orphan", "body");
        repo.add(&kept).await.unwrap();
        repo.add(&orphan).await.unwrap();
        std::fs::remove_file(layout.content_file(orphan.id())).unwrap();

        let ids: Vec<_> = repo.get_all().await.unwrap().iter().map(Memo::id).collect();
        assert_eq!(ids, [kept.id()], "backend {backend:?}");
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.get_by_id(orphan.id()).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn update_replaces_snapshot_and_rejects_missing_memo() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();

        let memo = Memo::create_new("title", "old body");
        repo.add(&memo).await.unwrap();
        let edited = memo.with_content("new body");
        repo.update(&edited).await.unwrap();
        let tagged = edited.with_tags(&["x".to_string()]);
        repo.update(&tagged).await.unwrap();

        let loaded = repo.get_by_id(memo.id()).await.unwrap().unwrap();
        assert_eq!(loaded.content(), "new body");
        assert_eq!(loaded.tags(), ["x".to_string()]);
        assert_eq!(loaded.version(), 3);

        let stranger = Memo::create_new("never stored", "");
        let err = repo.update(&stranger).await.unwrap_err();
        assert!(
            matches!(err, RepoError::NotFound(id) if id == stranger.id()),
            "backend {backend:?}: {err}"
        );
    }
}

#[tokio::test]
async fn stale_snapshot_update_is_a_conflict() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();

        let v1 = Memo::create_new("title", "first");
        repo.add(&v1).await.unwrap();
        let v2 = v1.with_content("second");
        repo.update(&v2).await.unwrap();

        let err = repo.update(&v1).await.unwrap_err();
        assert!(
            matches!(
                err,
                RepoError::Conflict { stored_version: 2, attempted_version: 1, .. }
            ),
            "backend {backend:?}: {err}"
        );
        let skipped = v2.with_content("third").with_content("fourth");
        assert!(matches!(
            repo.update(&skipped).await.unwrap_err(),
            RepoError::Conflict { attempted_version: 4, .. }
        ));

        let stored = repo.get_by_id(v1.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 2, "backend {backend:?}");
        assert_eq!(stored.content(), "second");
        assert_eq!(stored.updated_at(), v2.updated_at());
    }
}

#[tokio::test]
async fn update_moving_updated_at_backwards_is_a_conflict() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();

        let stored = memo_at("title", "body", "2024-05-01T10:00:00Z");
        repo.add(&stored).await.unwrap();
        let rewound = Memo::from_fields(MemoFields {
            id: stored.id(),
            title: "title".to_string(),
            content: "rewound".to_string(),
            created_at: stored.created_at(),
            updated_at: parse_timestamp("2024-04-01T10:00:00Z").unwrap(),
            tags: Vec::new(),
            is_pinned: false,
            version: 2,
            sync_status: SyncStatus::Synced,
            deleted_at: None,
        });

        let err = repo.update(&rewound).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict { .. }), "backend {backend:?}: {err}");
    }
}

#[tokio::test]
async fn adding_existing_id_is_rejected() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();
        let memo = Memo::create_new("once", "");
        repo.add(&memo).await.unwrap();
        let err = repo.add(&memo).await.unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists(_)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}

#[tokio::test]
async fn delete_is_idempotent_and_removes_file() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let repo = open_repository(layout.clone(), backend).await.unwrap();

        let memo = Memo::create_new("doomed", "");
        repo.add(&memo).await.unwrap();
        assert!(repo.delete(memo.id()).await.unwrap());
        assert!(!layout.content_file(memo.id()).exists());
        assert!(!repo.delete(memo.id()).await.unwrap());
        assert!(!repo.delete(uuid::Uuid::new_v4()).await.unwrap());
        assert!(repo.get_all().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn concurrent_adds_are_all_kept() {
    for backend in BACKENDS {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repository(StorageLayout::new(dir.path()), backend)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.add(&Memo::create_new(format!("memo {n}"), "")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 16, "backend {backend:?}");
    }
}

#[tokio::test]
async fn corrupt_ordered_index_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    std::fs::create_dir_all(layout.content_dir()).unwrap();
    std::fs::write(layout.ordered_index_file(), "{ definitely not json").unwrap();

    let repo = IndexedMemoRepository::ordered_list(layout);
    assert!(repo.get_all().await.unwrap().is_empty());

    repo.add(&Memo::create_new("fresh", "")).await.unwrap();
    assert_eq!(repo.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn service_creates_default_memo_only_when_empty() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repository(StorageLayout::new(dir.path()), IndexBackend::Relational)
        .await
        .unwrap();
    let service = MemoService::new(repo);

    let first = service.load_or_create_default().await.unwrap();
    assert_eq!(first.len(), 1);
    let second = service.load_or_create_default().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id(), second[0].id());

    let pinned = service.set_pinned(first[0].id(), true).await.unwrap();
    assert!(pinned.is_pinned());
    assert!(service.set_tags(pinned.id(), vec![" ".to_string()]).await.is_err());
}
