//! Lifecycle tests driving one agent from several threads.

use std::sync::Arc;
use std::thread;

use ann_index::{Agent, AgentConfig};
use ann_types::{DistanceType, ErrorKind, InsertConfig, SearchConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn open(dir: &TempDir) -> Agent {
    let config = AgentConfig::new(8)
        .with_index_path(dir.path())
        .with_distance(DistanceType::L2);
    Agent::open(config).unwrap()
}

fn vector(seed: usize) -> Vec<f32> {
    (0..8).map(|i| ((seed * 31 + i) % 17) as f32).collect()
}

#[test]
fn test_concurrent_writers_and_commits() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(open(&dir));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let agent = agent.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let id = format!("w{}-{}", t, i);
                    agent
                        .insert(&id, vector(t * 1000 + i), &InsertConfig::default())
                        .unwrap();
                }
            })
        })
        .collect();

    let committer = {
        let agent = agent.clone();
        thread::spawn(move || {
            let cancel = CancellationToken::new();
            for _ in 0..20 {
                match agent.commit(&cancel, 64) {
                    Ok(_) => {}
                    Err(e) => assert!(matches!(
                        e.kind(),
                        ErrorKind::FailedPrecondition | ErrorKind::Aborted
                    )),
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    committer.join().unwrap();

    let cancel = CancellationToken::new();
    if agent.uncommitted() > 0 {
        agent.commit(&cancel, 0).unwrap();
    }
    let info = agent.index_info();
    assert_eq!(info.stored, 1000);
    assert_eq!(info.uncommitted, 0);
    assert_eq!(agent.get_object("w2-17").unwrap().vector, vector(2017));
}

#[test]
fn test_restart_between_saves_keeps_last_completed() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    {
        let config = AgentConfig::new(8)
            .with_index_path(dir.path())
            .with_distance(DistanceType::L2)
            .with_copy_on_write(true);
        let agent = Agent::open(config).unwrap();
        for i in 0..10 {
            agent
                .insert(&format!("id-{}", i), vector(i), &InsertConfig::default())
                .unwrap();
        }
        agent.commit_and_save(&cancel, 0).unwrap();

        // Committed but never saved
        agent
            .insert("late", vector(99), &InsertConfig::default())
            .unwrap();
        agent.commit(&cancel, 0).unwrap();
    }

    let agent = open(&dir);
    assert_eq!(agent.index_info().stored, 10);
    assert!(!agent.exists("late"));
    let results = agent
        .linear_search(&vector(3), &SearchConfig::default().with_num(1))
        .unwrap();
    assert_eq!(results[0].id, "id-3");
}

#[test]
fn test_flush_while_idle_then_reuse() {
    let dir = TempDir::new().unwrap();
    let agent = open(&dir);
    let cancel = CancellationToken::new();

    agent.insert("a", vector(1), &InsertConfig::default()).unwrap();
    agent.commit_and_save(&cancel, 0).unwrap();
    agent.flush(&cancel).unwrap();

    agent.insert("a", vector(2), &InsertConfig::default()).unwrap();
    agent.commit(&cancel, 0).unwrap();
    assert_eq!(agent.get_object("a").unwrap().vector, vector(2));
}
