// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use arena_node::consensus::Dispatcher;
use arena_node::nodes::{ComputeClient, DispatchError, ResolveRequest, WorkerEndpoint};
use arena_node::outcome::Outcome;
use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

use super::support::{clean_win, registry_with, worker_url, Script, ScriptedClient};

mock! {
    pub Compute {}

    #[async_trait]
    impl ComputeClient for Compute {
        async fn resolve(
            &self,
            endpoint: &WorkerEndpoint,
            request: &ResolveRequest,
        ) -> Result<Outcome, DispatchError>;
        async fn health(&self, endpoint: &WorkerEndpoint) -> Result<u16, DispatchError>;
    }
}

fn request(contest_id: &str) -> ResolveRequest {
    ResolveRequest {
        contest_id: contest_id.to_string(),
        payload: serde_json::json!({ "fighterA": { "id": "x" }, "fighterB": { "id": "y" } }),
        seed: 7,
    }
}

#[tokio::test]
async fn test_dispatch_collects_one_vote_per_worker() {
    let (registry, _) = registry_with(&[("w1", 1), ("w2", 1), ("w3", 1)]).await;

    let mut mock = MockCompute::new();
    mock.expect_resolve()
        .times(3)
        .returning(|endpoint, request| {
            assert_eq!(request.contest_id, "c1");
            if endpoint.url.contains("w3") {
                Ok(Outcome {
                    winner_id: "  ".to_string(),
                    rounds: vec![],
                    summary: String::new(),
                })
            } else {
                Ok(clean_win("x", "y"))
            }
        });

    let dispatcher = Dispatcher::new(registry.clone(), Arc::new(mock), 3, Duration::from_secs(5));
    let selected = dispatcher.select_workers("c1", None).await;
    assert_eq!(selected.len(), 3);

    let votes = dispatcher.dispatch(&request("c1"), &selected).await;
    assert_eq!(votes.len(), 3);
    assert_eq!(votes.iter().filter(|v| v.valid).count(), 2);

    let blank = votes.iter().find(|v| !v.valid).unwrap();
    assert!(blank.error.as_deref().unwrap().contains("empty winner"));
    assert!(blank.voted_winner_id.is_none());
}

#[tokio::test]
async fn test_timeouts_become_invalid_votes_and_release_load() {
    let (registry, ids) = registry_with(&[("fast", 1), ("slow", 1), ("down", 1)]).await;
    let client = ScriptedClient::new()
        .on(&worker_url("fast"), Script::Answer(clean_win("x", "y")))
        .on(&worker_url("slow"), Script::Stall(Duration::from_secs(10)))
        .on(
            &worker_url("down"),
            Script::Fail(DispatchError::Status {
                status: 500,
                message: "boom".to_string(),
            }),
        );

    let timeout = Duration::from_millis(100);
    let dispatcher = Dispatcher::new(registry.clone(), Arc::new(client), 3, timeout);
    let selected = dispatcher.select_workers("c2", Some(3)).await;
    let votes = dispatcher.dispatch(&request("c2"), &selected).await;

    let slow_vote = votes.iter().find(|v| v.worker_id == ids[1]).unwrap();
    assert!(!slow_vote.valid);
    assert!(slow_vote.elapsed_ms <= timeout.as_millis() as u64);

    let down_vote = votes.iter().find(|v| v.worker_id == ids[2]).unwrap();
    assert!(!down_vote.valid);
    assert!(down_vote.error.as_deref().unwrap().contains("500"));

    for id in &ids {
        let worker = registry.get(id).await.unwrap();
        assert_eq!(worker.current_load, 0);
        assert_eq!(worker.total_requests, 1);
    }
    assert_eq!(registry.get(&ids[0]).await.unwrap().successful_requests, 1);
    assert_eq!(registry.get(&ids[1]).await.unwrap().successful_requests, 0);
}

#[tokio::test]
async fn test_selection_is_stable_for_a_contest() {
    let (registry, _) = registry_with(&[("a", 3), ("b", 1), ("c", 2), ("d", 5), ("e", 1)]).await;
    let dispatcher = Dispatcher::new(
        registry,
        Arc::new(ScriptedClient::new()),
        3,
        Duration::from_secs(1),
    );

    let first: Vec<String> = dispatcher
        .select_workers("contest-9", None)
        .await
        .into_iter()
        .map(|w| w.id)
        .collect();
    let again: Vec<String> = dispatcher
        .select_workers("contest-9", None)
        .await
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first, again);
}
