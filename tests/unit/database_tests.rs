use certificate_notary::infrastructure::registry::{
    LookupOutcome, RegistryClient, Rejection, SubmitOutcome,
};
use certificate_notary::{digest, IssueMetadata, SqliteRegistry};
use std::sync::Arc;

fn metadata(issued_to: &str) -> IssueMetadata {
    IssueMetadata::new(issued_to, "0x123")
}

#[tokio::test]
async fn test_submit_then_lookup() {
    let registry = SqliteRegistry::open_in_memory().unwrap();
    let hash = digest(b"test content");

    let outcome = registry
        .submit(&hash, b"test content", &metadata("alice").with_filename("test.txt"))
        .await
        .unwrap();
    let accepted = match outcome {
        SubmitOutcome::Accepted(record) => record,
        other => panic!("Expected Accepted, got {:?}", other),
    };
    assert!(accepted.timestamp > 0);

    match registry.lookup(&hash).await.unwrap() {
        LookupOutcome::Found(record) => assert_eq!(record, accepted),
        LookupOutcome::NotFound => panic!("record not found"),
    }
}

#[tokio::test]
async fn test_lookup_unknown_hash() {
    let registry = SqliteRegistry::open_in_memory().unwrap();

    let outcome = registry.lookup(&digest(b"never issued")).await.unwrap();
    assert_eq!(outcome, LookupOutcome::NotFound);
}

#[tokio::test]
async fn test_duplicate_hash_rejected_without_overwrite() {
    let registry = SqliteRegistry::open_in_memory().unwrap();
    let hash = digest(b"same content");

    registry
        .submit(&hash, b"same content", &metadata("alice"))
        .await
        .unwrap();
    let second = registry
        .submit(&hash, b"same content", &metadata("mallory"))
        .await
        .unwrap();

    assert_eq!(second, SubmitOutcome::Rejected(Rejection::DuplicateHash));
    assert_eq!(registry.count_certificates().unwrap(), 1);
    match registry.lookup(&hash).await.unwrap() {
        LookupOutcome::Found(record) => assert_eq!(record.issued_to, "alice"),
        LookupOutcome::NotFound => panic!("record not found"),
    }
}

#[tokio::test]
async fn test_list_newest_first() {
    let registry = SqliteRegistry::open_in_memory().unwrap();
    for name in ["first", "second", "third"] {
        registry
            .submit(&digest(name.as_bytes()), name.as_bytes(), &metadata(name))
            .await
            .unwrap();
    }

    let names: Vec<String> = registry
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.issued_to)
        .collect();
    assert_eq!(names, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notary.db");
    let path = path.to_str().unwrap();
    let hash = digest(b"persistent");

    {
        let registry = SqliteRegistry::open(path).unwrap();
        registry
            .submit(&hash, b"persistent", &metadata("alice").with_content_id("QmSnapshot"))
            .await
            .unwrap();
    }

    let registry = SqliteRegistry::open(path).unwrap();
    assert_eq!(registry.count_certificates().unwrap(), 1);
    match registry.lookup(&hash).await.unwrap() {
        LookupOutcome::Found(record) => {
            assert_eq!(record.content_id.as_deref(), Some("QmSnapshot"));
        }
        LookupOutcome::NotFound => panic!("record lost after reopen"),
    }
}

#[tokio::test]
async fn test_records_cannot_be_updated_or_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notary.db");
    let path = path.to_str().unwrap();
    let hash = digest(b"immutable");

    let registry = SqliteRegistry::open(path).unwrap();
    registry
        .submit(&hash, b"immutable", &metadata("alice"))
        .await
        .unwrap();

    // Tamper through a separate connection
    let conn = rusqlite::Connection::open(path).unwrap();
    let update = conn.execute(
        "UPDATE certificates SET issued_to = 'mallory' WHERE hash = ?1",
        [hash.as_str()],
    );
    assert!(update.unwrap_err().to_string().contains("append-only"));

    let delete = conn.execute("DELETE FROM certificates", []);
    assert!(delete.is_err());

    match registry.lookup(&hash).await.unwrap() {
        LookupOutcome::Found(record) => assert_eq!(record.issued_to, "alice"),
        LookupOutcome::NotFound => panic!("record deleted"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_from_many_tasks() {
    let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
    let hash = digest(b"contended");

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let hash = hash.clone();
            tokio::spawn(async move {
                registry
                    .submit(&hash, b"contended", &metadata(&format!("issuer-{}", i)))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            SubmitOutcome::Accepted(_) => accepted += 1,
            SubmitOutcome::Rejected(Rejection::DuplicateHash) => {}
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(registry.count_certificates().unwrap(), 1);
    assert_eq!(registry.list().await.unwrap().len(), 1);
}
