/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cx_runtime::prelude::*;

use crate::setup::{
    actors::{payloads_for, register_picky, register_recorder, register_sticky},
    eventually, launch, launch_with_processor,
    processors::SlowProcessor,
};

mod setup;

fn create(actor_type: &str, actor_id: &str) -> TransactionOperation {
    TransactionOperation::Create {
        actor_type: actor_type.to_string(),
        actor_id: actor_id.to_string(),
        config: ActorConfig::new(),
    }
}

fn update(actor_id: &str, key: &str, value: i64) -> TransactionOperation {
    TransactionOperation::Update {
        actor_id: actor_id.to_string(),
        update: StateUpdate::new().set(key, value),
    }
}

/// A committed transaction applies every operation and delivers its messages.
#[tokio::test]
async fn test_commit_applies_all_operations() -> anyhow::Result<()> {
    let runtime = launch().await?;
    let journal = register_recorder(&runtime);
    runtime.create_actor("basic", "bank", ActorConfig::new()).await?;
    runtime.create_actor("basic", "closed", ActorConfig::new()).await?;

    let tx = Transaction::new(vec![
        create("recorder", "auditor"),
        update("bank", "balance", 100),
        TransactionOperation::Delete {
            actor_id: "closed".to_string(),
        },
        TransactionOperation::Message {
            from: "bank".to_string(),
            to: "auditor".to_string(),
            payload: Value::from("deposit"),
        },
    ])
    .with_id("tx_deposit");

    let receipt = runtime.execute_transaction(tx).await?;
    assert_eq!(receipt.transaction_id, "tx_deposit");
    assert_eq!(receipt.operations_applied, 4);
    assert_eq!(receipt.message_ids.len(), 1);

    assert_eq!(
        runtime.get_actor_state("bank")?.properties.get("balance"),
        Some(&Value::Int(100))
    );
    assert!(runtime.get_actor_state("closed").is_err());
    assert!(eventually(|| payloads_for(&journal, "auditor") == vec![Value::from("deposit")]).await);
    assert_eq!(runtime.metrics().transactions_committed, 1);

    runtime.shutdown().await?;
    Ok(())
}

/// One unknown actor among three operations rejects the whole transaction.
#[tokio::test]
async fn test_unknown_actor_rejects_everything() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime.create_actor("basic", "a", ActorConfig::new()).await?;

    let tx = Transaction::new(vec![
        update("a", "score", 1),
        create("basic", "b"),
        update("missing", "score", 1),
    ]);
    let err = runtime.execute_transaction(tx).await.unwrap_err();
    assert_eq!(err.code(), "TRANSACTION_VALIDATION");

    assert!(!runtime.get_actor_state("a")?.properties.contains_key("score"));
    assert!(runtime.get_actor_state("b").is_err());
    assert_eq!(runtime.metrics().transactions_failed, 1);

    runtime.shutdown().await?;
    Ok(())
}

/// Operations may reference actors created earlier in the same transaction.
#[tokio::test]
async fn test_create_then_update_in_one_transaction() -> anyhow::Result<()> {
    let runtime = launch().await?;

    let tx = Transaction::new(vec![create("basic", "fresh"), update("fresh", "level", 2)]);
    runtime.execute_transaction(tx).await?;
    assert_eq!(
        runtime.get_actor_state("fresh")?.properties.get("level"),
        Some(&Value::Int(2))
    );

    let tx = Transaction::new(vec![
        TransactionOperation::Delete {
            actor_id: "fresh".to_string(),
        },
        update("fresh", "level", 3),
    ]);
    assert_eq!(
        runtime.execute_transaction(tx).await.unwrap_err().code(),
        "TRANSACTION_VALIDATION"
    );
    assert!(runtime.get_actor_state("fresh").is_ok());

    runtime.shutdown().await?;
    Ok(())
}

/// A failure during apply compensates every operation applied before it.
#[tokio::test]
async fn test_apply_failure_rolls_back() -> anyhow::Result<()> {
    let runtime = launch().await?;
    let journal = register_recorder(&runtime);
    register_picky(&runtime);
    runtime
        .create_actor("basic", "hero", ActorConfig::new().with_property("hp", 10))
        .await?;
    runtime
        .create_actor("basic", "villain", ActorConfig::new().with_property("hp", 50))
        .await?;
    runtime.create_actor("recorder", "witness", ActorConfig::new()).await?;

    let tx = Transaction::new(vec![
        update("hero", "hp", 99),
        TransactionOperation::Delete {
            actor_id: "villain".to_string(),
        },
        create("basic", "sidekick"),
        TransactionOperation::Message {
            from: "hero".to_string(),
            to: "witness".to_string(),
            payload: Value::from("victory"),
        },
        create("picky", "nameless"),
    ]);
    let err = runtime.execute_transaction(tx).await.unwrap_err();
    assert!(matches!(err, RuntimeError::TransactionApply { index: 4, .. }), "{err:?}");

    assert_eq!(
        runtime.get_actor_state("hero")?.properties.get("hp"),
        Some(&Value::Int(10))
    );
    assert_eq!(
        runtime.get_actor_state("villain")?.properties.get("hp"),
        Some(&Value::Int(50))
    );
    assert!(runtime.get_actor_state("sidekick").is_err());
    assert!(runtime.get_actor_state("nameless").is_err());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(payloads_for(&journal, "witness").is_empty());

    let metrics = runtime.metrics();
    assert_eq!(metrics.transactions_rolled_back, 1);
    assert_eq!(metrics.transactions_failed, 1);

    runtime.shutdown().await?;
    Ok(())
}

/// Transactions decode from the JSON shape clients send.
#[tokio::test]
async fn test_transaction_from_json() -> anyhow::Result<()> {
    let runtime = launch().await?;

    let tx: Transaction = serde_json::from_value(serde_json::json!({
        "operations": [
            {"type": "create", "actorType": "basic", "actorId": "j1", "config": {"namespace": "json"}},
            {"type": "update", "actorId": "j1", "update": {"properties": {"source": "json"}}}
        ],
        "timeoutMs": 5000
    }))?;
    assert!(tx.id.starts_with("tx_"));

    let receipt = runtime.execute_transaction(tx).await?;
    assert_eq!(receipt.operations_applied, 2);
    assert_eq!(runtime.list_actors(Some("json")).len(), 1);

    runtime.shutdown().await?;
    Ok(())
}

/// A create that loses the race for an id leaves the winner's actor alone.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_create_leaves_other_owner() -> anyhow::Result<()> {
    let mut config = RuntimeConfig::default();
    config.transactions.max_concurrent = 1;
    let runtime = launch_with_processor(config, Arc::new(SlowProcessor::new(Duration::from_millis(300)))).await?;

    // Holds the only permit while its actor's consciousness initializes.
    let holder = tokio::spawn({
        let runtime = runtime.clone();
        async move {
            let tx = Transaction::new(vec![TransactionOperation::Create {
                actor_type: "basic".to_string(),
                actor_id: "slow".to_string(),
                config: ActorConfig::new().with_consciousness(Value::from("seed")),
            }]);
            runtime.execute_transaction(tx).await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let contender = tokio::spawn({
        let runtime = runtime.clone();
        async move {
            runtime
                .execute_transaction(Transaction::new(vec![create("basic", "x")]))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    runtime
        .create_actor("basic", "x", ActorConfig::new().with_property("owner", "direct"))
        .await?;

    holder.await??;
    let err = contender.await?.unwrap_err();
    assert!(matches!(err, RuntimeError::TransactionApply { index: 0, .. }), "{err:?}");

    let state = runtime.get_actor_state("x")?;
    assert_eq!(state.properties.get("owner"), Some(&Value::from("direct")));
    assert_eq!(runtime.metrics().transactions_rolled_back, 0);

    runtime.shutdown().await?;
    Ok(())
}

/// A delete that overruns its deadline is undone once the teardown finishes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_delete_restores_actor() -> anyhow::Result<()> {
    let runtime = launch().await?;
    register_sticky(&runtime, Duration::from_millis(300));
    runtime
        .create_actor("sticky", "z", ActorConfig::new().with_property("hp", 5))
        .await?;

    let tx = Transaction::new(vec![TransactionOperation::Delete {
        actor_id: "z".to_string(),
    }])
    .with_timeout(Duration::from_millis(50));
    let err = runtime.execute_transaction(tx).await.unwrap_err();
    assert_eq!(err.code(), "TRANSACTION_TIMEOUT");

    let state = runtime.get_actor_state("z")?;
    assert_eq!(state.actor_type, "sticky");
    assert_eq!(state.properties.get("hp"), Some(&Value::Int(5)));
    assert!(runtime.update_actor_state("z", &StateUpdate::new().set("hp", 6)).await);
    assert_eq!(runtime.metrics().transactions_rolled_back, 1);

    runtime.shutdown().await?;
    Ok(())
}

/// A destroy keeps going after its caller stops waiting, and the id becomes free again.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_destroy_still_completes() -> anyhow::Result<()> {
    let runtime = launch().await?;
    register_sticky(&runtime, Duration::from_millis(300));
    runtime.create_actor("sticky", "z", ActorConfig::new()).await?;

    let abandoned = tokio::time::timeout(Duration::from_millis(50), runtime.destroy_actor("z")).await;
    assert!(abandoned.is_err());

    assert!(eventually(|| runtime.get_actor_state("z").is_err()).await);
    assert_eq!(runtime.actor_count(), 0);
    assert_eq!(runtime.metrics().actors_destroyed, 1);
    runtime.create_actor("basic", "z", ActorConfig::new()).await?;

    runtime.shutdown().await?;
    Ok(())
}

/// Transactions are refused once the runtime shuts down.
#[tokio::test]
async fn test_transaction_after_shutdown() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime.shutdown().await?;

    let err = runtime
        .execute_transaction(Transaction::new(vec![create("basic", "late")]))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Shutdown), "{err:?}");
    Ok(())
}
