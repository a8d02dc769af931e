//! End-to-end election tests over gRPC on localhost.
//!
//! Each test uses its own port range so tests can run in parallel.


use std::collections::HashMap;
use std::time::Duration;

use raft_election::config::ChaosConfig;
use test_harness::{wait_for, TestCluster};

/// A fresh 3-node cluster elects exactly one leader
#[tokio::test]
async fn test_three_nodes_elect_single_leader() {
    let mut cluster = TestCluster::new(3, 52100).await;

    cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");

    assert_eq!(cluster.count_leaders().await, 1, "Exactly one leader");

    // Followers learn who leads
    let followers_know_leader = wait_for(
        || async {
            let Some(leader) = cluster.get_leader_id().await else {
                return false;
            };
            for node in cluster.nodes.values() {
                if node.node_id != leader && node.leader_id().await != Some(leader) {
                    return false;
                }
            }
            true
        },
        Duration::from_secs(2),
        Duration::from_millis(20),
    )
    .await;
    assert!(followers_know_leader, "Followers should record the leader");

    cluster.shutdown().await;
}

/// Heartbeats keep a healthy leader in place
#[tokio::test]
async fn test_leadership_is_stable_without_failures() {
    let mut cluster = TestCluster::new(3, 52110).await;

    cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");
    // Let any election that raced the first one settle
    tokio::time::sleep(Duration::from_millis(500)).await;
    let leader = cluster.get_leader_id().await.expect("Leader should remain");
    let term = cluster.get_node(leader).unwrap().current_term().await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(cluster.get_leader_id().await, Some(leader));
    assert_eq!(cluster.get_node(leader).unwrap().current_term().await, term);
    for node in cluster.nodes.values() {
        assert_eq!(node.current_term().await, term, "No node should start an election");
    }

    cluster.shutdown().await;
}

/// Silencing the leader makes the rest elect a new one at a higher term
#[tokio::test]
async fn test_new_leader_after_leader_crash() {
    let mut cluster = TestCluster::new(3, 52120).await;

    let initial_leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Initial leader should be elected");
    let initial_term = cluster
        .get_node(initial_leader)
        .unwrap()
        .current_term()
        .await;

    assert!(cluster.shutdown_node(initial_leader));

    let new_leader = cluster
        .wait_for_new_leader(initial_leader, Duration::from_secs(5))
        .await
        .expect("New leader should be elected");

    assert_ne!(new_leader, initial_leader);
    let new_term = cluster.get_node(new_leader).unwrap().current_term().await;
    assert!(new_term > initial_term, "Term should increase after re-election");
    assert_eq!(cluster.count_leaders().await, 1);

    cluster.shutdown().await;
}

/// Even cluster sizes still converge despite possible split votes
#[tokio::test]
async fn test_four_node_cluster_elects_leader() {
    let mut cluster = TestCluster::new(4, 52130).await;

    cluster
        .wait_for_leader(Duration::from_secs(10))
        .await
        .expect("4-node cluster should elect a leader");
    assert_eq!(cluster.count_leaders().await, 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_five_node_cluster_survives_two_crashes() {
    let mut cluster = TestCluster::new(5, 52140).await;

    let first = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");
    assert!(cluster.shutdown_node(first));

    let second = cluster
        .wait_for_new_leader(first, Duration::from_secs(5))
        .await
        .expect("Second leader should be elected");
    assert!(cluster.shutdown_node(second));

    // Three of five remain, still a majority
    let third = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Third leader should be elected");
    assert!(third != first && third != second);

    cluster.shutdown().await;
}

/// Two of three nodes down leaves no majority, so no leader
#[tokio::test]
async fn test_no_leader_without_majority() {
    let mut cluster = TestCluster::new(3, 52150).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");
    let follower = cluster
        .active_node_ids()
        .into_iter()
        .find(|&id| id != leader)
        .unwrap();

    cluster.shutdown_node(leader);
    cluster.shutdown_node(follower);

    let survivor = cluster.active_node_ids()[0];
    let term_before = cluster.get_node(survivor).unwrap().current_term().await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(cluster.count_leaders().await, 0);
    // It keeps trying, one term per failed candidacy
    assert!(cluster.get_node(survivor).unwrap().current_term().await > term_before);

    cluster.shutdown().await;
}

/// Observed over time, no term ever has two leaders
#[tokio::test]
async fn test_at_most_one_leader_per_term() {
    let mut cluster = TestCluster::new(5, 52160).await;
    cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");

    let mut leaders_by_term: HashMap<u64, u64> = HashMap::new();
    let mut crashed = 0;
    for round in 0..150 {
        for node in cluster.nodes.values() {
            if !node.is_running() {
                continue;
            }
            let status = node.status().await;
            if status.role == raft_election::raft::RaftRole::Leader {
                let previous = leaders_by_term.insert(status.term, node.node_id);
                assert!(
                    previous.is_none() || previous == Some(node.node_id),
                    "Two leaders in term {}: {:?} and {}",
                    status.term,
                    previous,
                    node.node_id
                );
            }
        }
        // Knock out two leaders along the way to force more elections
        if round % 50 == 49 && crashed < 2 {
            if let Some(leader) = cluster.get_leader_id().await {
                cluster.shutdown_node(leader);
                crashed += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(!leaders_by_term.is_empty());
    cluster.shutdown().await;
}

/// With chaos enabled the elected leader crashes itself and is replaced
#[tokio::test]
async fn test_chaos_kill_triggers_reelection() {
    let mut cluster = TestCluster::with_config(3, 52170, |config| {
        config.chaos = Some(ChaosConfig {
            kill_leader_after_ms: 500,
        });
    })
    .await;

    let first = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("Leader should be elected");
    let first_term = cluster.get_node(first).unwrap().current_term().await;

    assert!(
        cluster.wait_for_stop(first, Duration::from_secs(3)).await,
        "Chaos should stop the leader"
    );

    let second = cluster
        .wait_for_new_leader(first, Duration::from_secs(5))
        .await
        .expect("Survivors should elect a new leader");
    assert_ne!(second, first);
    assert!(cluster.get_node(second).unwrap().current_term().await > first_term);

    cluster.shutdown().await;
}
