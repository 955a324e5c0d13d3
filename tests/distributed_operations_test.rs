mod common;

use std::collections::HashMap;

use common::{spawn_cluster, MockCluster, PeerState};
use replistore::replication::Lookup;

#[tokio::test]
async fn test_full_replication_with_two_available_peers() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;

    let record = origin.store("doc.txt", b"replicate me", None, HashMap::new()).await.unwrap();
    let report = origin.replicate_now().await;
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 0);

    let record = origin.record(&record.id).await.unwrap();
    assert_eq!(record.replicas.len(), 3);
    assert_eq!(record.replicas[0], origin.id());

    for peer in &nodes[1..] {
        assert!(record.has_replica(peer.node.id()));
        assert_eq!(&peer.node.retrieve(&record.id).await.unwrap().unwrap()[..], b"replicate me");
    }

    let stats = origin.stats().await;
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.replication_jobs, 0);
    assert_eq!(stats.average_replication_factor, 3.0);
}

#[tokio::test]
async fn test_hanging_peer_leaves_file_partially_replicated() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;
    cluster.set_state("c", PeerState::Hang);

    let record = origin.store("doc.txt", b"partial", None, HashMap::new()).await.unwrap();
    let report = origin.replicate_now().await;

    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].target_node, nodes[2].node.id());
    assert!(report.failures[0].error.is_some());

    let record = origin.record(&record.id).await.unwrap();
    assert_eq!(record.replicas.len(), 2);
    assert!(!record.has_replica(nodes[2].node.id()));

    // Failed jobs are purged, not retried.
    assert_eq!(origin.stats().await.replication_jobs, 0);
}

#[tokio::test]
async fn test_scheduling_twice_adds_nothing() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;

    origin.store("doc.txt", b"once", None, HashMap::new()).await.unwrap();
    assert_eq!(origin.stats().await.replication_jobs, 2);

    assert_eq!(origin.reconcile().await, 0);
    assert_eq!(origin.reconcile().await, 0);
    assert_eq!(origin.stats().await.replication_jobs, 2);
}

#[tokio::test]
async fn test_health_cycle_marks_dead_peer_and_skips_it() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;
    cluster.set_state("c", PeerState::Down);

    let summary = origin.check_health().await;
    assert_eq!(summary.probed, 2);
    assert_eq!(summary.available, 1);
    assert_eq!(summary.unavailable, 1);
    assert!(!origin.registry().is_available(nodes[2].node.id()).await);

    let record = origin.store("doc.txt", b"two copies", None, HashMap::new()).await.unwrap();
    let report = origin.replicate_now().await;
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(origin.record(&record.id).await.unwrap().replicas.len(), 2);

    // Once the peer is back the next health cycle schedules the missing copy.
    cluster.set_state("c", PeerState::Up);
    origin.check_health().await;
    let report = origin.replicate_now().await;
    assert_eq!(report.completed, 1);
    assert_eq!(origin.record(&record.id).await.unwrap().replicas.len(), 3);
}

#[tokio::test]
async fn test_read_falls_back_to_replica_and_fills_cache() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b"], 2).await;
    let origin = &nodes[0].node;

    let record = origin.store("doc.txt", b"fetched remotely", None, HashMap::new()).await.unwrap();
    origin.replicate_now().await;

    // Drop only the local bytes; the record still lists the peer.
    std::fs::remove_dir_all(nodes[0].dir.path().join("objects")).unwrap();

    let data = origin.retrieve(&record.id).await.unwrap().unwrap();
    assert_eq!(&data[..], b"fetched remotely");

    // The copy now sits locally, so the peer can go away.
    cluster.set_state("b", PeerState::Down);
    assert_eq!(&origin.retrieve(&record.id).await.unwrap().unwrap()[..], b"fetched remotely");
    assert_eq!(origin.record(&record.id).await.unwrap().replicas.len(), 2);
}

#[tokio::test]
async fn test_unreachable_replicas_mean_not_found() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b"], 2).await;
    let origin = &nodes[0].node;

    let record = origin.store("doc.txt", b"stranded", None, HashMap::new()).await.unwrap();
    origin.replicate_now().await;

    std::fs::remove_dir_all(nodes[0].dir.path().join("objects")).unwrap();
    cluster.set_state("b", PeerState::Down);
    origin.check_health().await;

    assert!(origin.retrieve(&record.id).await.unwrap().is_none());
    assert!(origin.record(&record.id).await.is_some());
    assert_eq!(origin.lookup(&record.id).await.unwrap(), Lookup::Unreachable);
    assert_eq!(origin.lookup("never-stored").await.unwrap(), Lookup::Unknown);
}

#[tokio::test]
async fn test_remove_deletes_remote_copies() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;

    let record = origin.store("doc.txt", b"short lived", None, HashMap::new()).await.unwrap();
    origin.replicate_now().await;

    assert!(origin.remove(&record.id).await.unwrap());
    for peer in &nodes[1..] {
        assert!(peer.node.record(&record.id).await.is_none());
        assert!(peer.node.retrieve(&record.id).await.unwrap().is_none());
    }
    assert!(!origin.remove(&record.id).await.unwrap());
}

#[tokio::test]
async fn test_remove_before_drain_cancels_jobs() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    let origin = &nodes[0].node;

    let record = origin.store("doc.txt", b"never copied", None, HashMap::new()).await.unwrap();
    assert!(origin.remove(&record.id).await.unwrap());

    assert_eq!(origin.stats().await.replication_jobs, 0);
    let report = origin.replicate_now().await;
    assert_eq!(report.completed + report.failed, 0);
    assert!(nodes[1].node.record(&record.id).await.is_none());
}

#[tokio::test]
async fn test_receivers_do_not_schedule_replication() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b", "c"], 3).await;
    cluster.set_state("c", PeerState::Down);
    let origin = &nodes[0].node;

    origin.check_health().await;
    let record = origin.store("doc.txt", b"origin decides", None, HashMap::new()).await.unwrap();
    origin.replicate_now().await;

    // "b" holds a copy of an under-replicated file it did not originate.
    let receiver = &nodes[1].node;
    assert!(receiver.record(&record.id).await.is_some());
    assert_eq!(receiver.reconcile().await, 0);
    assert_eq!(receiver.stats().await.replication_jobs, 0);
}

#[tokio::test]
async fn test_background_loops_replicate_without_manual_trigger() {
    let cluster = MockCluster::new();
    let nodes = spawn_cluster(&cluster, &["a", "b"], 2).await;
    let origin = &nodes[0].node;
    origin.start().await;

    let record = origin.store("doc.txt", b"eventually", None, HashMap::new()).await.unwrap();

    let mut replicas = 1;
    for _ in 0..40 {
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        replicas = origin.record(&record.id).await.unwrap().replicas.len();
        if replicas == 2 {
            break;
        }
    }
    assert_eq!(replicas, 2);

    origin.shutdown().await.unwrap();
}
