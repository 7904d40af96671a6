//! Concurrency tests for the shared key-value store.

use std::collections::HashSet;
use std::sync::Arc;

use theater_protocol::Fields;
use theater_store::{KvStore, MemoryKv};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_incr_is_unique_under_contention() {
    let kv = Arc::new(MemoryKv::new());
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let kv = kv.clone();
        tasks.push(tokio::spawn(async move {
            (0..50)
                .map(|_| kv.incr("gameServer-config", "Lobbies").unwrap())
                .collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for id in task.await.unwrap() {
            assert!(seen.insert(id), "id {id} handed out twice");
        }
    }
    assert_eq!(seen.len(), 400);
    assert_eq!(seen.iter().max(), Some(&400));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_updates_are_all_kept() {
    let kv = Arc::new(MemoryKv::new());
    kv.create("gameServer-1", &Fields::new().with("GID", "1")).unwrap();

    let mut tasks = Vec::new();
    for writer in 0..16 {
        let kv = kv.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..20 {
                let fields = Fields::new().with(format!("B-U-w{writer}"), round.to_string());
                assert!(kv.update("gameServer-1", &fields).unwrap());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let record = kv.get_all("gameServer-1").unwrap().unwrap();
    for writer in 0..16 {
        assert_eq!(record.get(&format!("B-U-w{writer}")), Some("19"));
    }
    assert_eq!(record.get("GID"), Some("1"));
}
