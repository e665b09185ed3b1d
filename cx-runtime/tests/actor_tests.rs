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

use cx_runtime::prelude::*;

use crate::setup::{actors::register_recorder, launch};

mod setup;

/// A second create with the same id fails and leaves the first actor's state alone.
#[tokio::test]
async fn test_duplicate_create_keeps_first_actor() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime
        .create_actor("basic", "npc", ActorConfig::new().with_property("hp", 10))
        .await?;

    let err = runtime
        .create_actor("basic", "npc", ActorConfig::new().with_property("hp", 99))
        .await
        .unwrap_err();
    assert_eq!(err, RuntimeError::DuplicateActor("npc".to_string()));

    let state = runtime.get_actor_state("npc")?;
    assert_eq!(state.properties.get("hp"), Some(&Value::Int(10)));
    assert_eq!(runtime.actor_count(), 1);

    runtime.shutdown().await?;
    Ok(())
}

/// Unknown ids are a no-op for destroy and `NotFound` for reads.
#[tokio::test]
async fn test_unknown_actor() -> anyhow::Result<()> {
    let runtime = launch().await?;

    assert!(!runtime.destroy_actor("ghost").await);
    let err = runtime.get_actor_state("ghost").unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(!runtime.update_actor_state("ghost", &StateUpdate::new().set("x", 1)).await);

    runtime.shutdown().await?;
    Ok(())
}

/// Updates merge into the prior state and repeating them changes nothing further.
#[tokio::test]
async fn test_update_round_trip_is_idempotent() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime
        .create_actor("basic", "door", ActorConfig::new().with_property("color", "red"))
        .await?;

    let update = StateUpdate::new().set("open", true).set("angle", 90);
    assert!(runtime.update_actor_state("door", &update).await);
    let first = runtime.get_actor_state("door")?;
    assert_eq!(first.properties.get("color"), Some(&Value::from("red")));
    assert_eq!(first.properties.get("open"), Some(&Value::Bool(true)));
    assert_eq!(first.properties.get("angle"), Some(&Value::Int(90)));

    assert!(runtime.update_actor_state("door", &update).await);
    let second = runtime.get_actor_state("door")?;
    assert_eq!(first.properties, second.properties);

    assert!(runtime.update_actor_state("door", &StateUpdate::new().remove("angle")).await);
    assert!(!runtime.get_actor_state("door")?.properties.contains_key("angle"));

    runtime.shutdown().await?;
    Ok(())
}

/// Listing filters by namespace.
#[tokio::test]
async fn test_namespace_listing() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime
        .create_actor("basic", "a1", ActorConfig::new().with_namespace("ns1"))
        .await?;
    runtime.create_actor("basic", "b1", ActorConfig::new()).await?;

    let ns1 = runtime.list_actors(Some("ns1"));
    assert_eq!(ns1.len(), 1);
    assert_eq!(ns1[0].id, "a1");
    assert!(runtime.list_actors(Some("ns2")).is_empty());
    assert_eq!(runtime.list_actors(None).len(), 2);
    assert_eq!(runtime.get_actor_state("b1")?.namespace, "default");

    assert!(runtime.destroy_actor("a1").await);
    assert!(runtime.list_actors(Some("ns1")).is_empty());

    runtime.shutdown().await?;
    Ok(())
}

/// Invalid descriptors are rejected before anything is registered.
#[tokio::test]
async fn test_invalid_configuration() -> anyhow::Result<()> {
    let runtime = launch().await?;

    let err = runtime.create_actor("dragon", "d1", ActorConfig::new()).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_CONFIGURATION");

    let err = runtime
        .create_actor("basic", "d1", ActorConfig::new().with_namespace("   "))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CONFIGURATION");

    let err = runtime.create_actor("basic", "", ActorConfig::new()).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_CONFIGURATION");
    assert_eq!(runtime.actor_count(), 0);

    runtime.shutdown().await?;
    Ok(())
}

/// An id becomes free again once destroy has completed.
#[tokio::test]
async fn test_id_reuse_after_destroy() -> anyhow::Result<()> {
    let runtime = launch().await?;
    register_recorder(&runtime);

    runtime.create_actor("recorder", "r", ActorConfig::new()).await?;
    assert!(runtime.destroy_actor("r").await);
    assert!(!runtime.destroy_actor("r").await);
    runtime.create_actor("basic", "r", ActorConfig::new()).await?;
    assert_eq!(runtime.get_actor_state("r")?.actor_type, "basic");

    let metrics = runtime.metrics();
    assert_eq!(metrics.actors_created, 2);
    assert_eq!(metrics.actors_destroyed, 1);
    assert_eq!(metrics.active_actors, 1);

    runtime.shutdown().await?;
    Ok(())
}

/// The maintenance sweep destroys actors marked inactive.
#[tokio::test]
async fn test_sweep_inactive() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime.create_actor("basic", "idle", ActorConfig::new()).await?;
    runtime.create_actor("basic", "busy", ActorConfig::new()).await?;
    assert!(runtime.update_actor_state("idle", &StateUpdate::new().active(false)).await);

    assert_eq!(runtime.sweep_inactive().await, 1);
    assert!(runtime.get_actor_state("idle").is_err());
    assert!(runtime.get_actor_state("busy").is_ok());

    runtime.shutdown().await?;
    Ok(())
}

/// After shutdown every entry point refuses work.
#[tokio::test]
async fn test_shutdown_stops_everything() -> anyhow::Result<()> {
    let runtime = launch().await?;
    runtime.create_actor("basic", "a", ActorConfig::new()).await?;

    runtime.shutdown().await?;
    assert!(runtime.is_shut_down());
    assert_eq!(runtime.actor_count(), 0);
    assert_eq!(
        runtime.send_message("x", "a", Value::Null).unwrap_err(),
        RuntimeError::Shutdown
    );
    assert_eq!(
        runtime.create_actor("basic", "b", ActorConfig::new()).await.unwrap_err(),
        RuntimeError::Shutdown
    );
    Ok(())
}
