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

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{ConsciousnessEvent, ProcessorError, ProcessorResult};
use crate::actor::StateUpdate;
use crate::common::{now_millis, TimestampMs, Value, ValueMap};
use crate::traits::ConsciousnessProcessor;

const AWARENESS: &str = "awareness";
const EMOTION: &str = "emotion";
const ENERGY: &str = "energy";
const LEVEL: &str = "level";
const DEFAULT_AFFECT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Affect {
    awareness: f64,
    emotion: f64,
    energy: f64,
}

impl Default for Affect {
    fn default() -> Self {
        Self {
            awareness: DEFAULT_AFFECT,
            emotion: DEFAULT_AFFECT,
            energy: DEFAULT_AFFECT,
        }
    }
}

impl Affect {
    fn from_blob(blob: Option<&Value>) -> Self {
        let mut affect = Self::default();
        if let Some(map) = blob.and_then(Value::as_map) {
            affect.set_from(map);
        }
        affect
    }

    fn set_from(&mut self, map: &ValueMap) {
        for (key, slot) in [
            (AWARENESS, &mut self.awareness),
            (EMOTION, &mut self.emotion),
            (ENERGY, &mut self.energy),
        ] {
            if let Some(v) = map.get(key).and_then(Value::as_f64) {
                *slot = v.clamp(0.0, 1.0);
            }
        }
    }

    fn shift(&mut self, map: &ValueMap) {
        for (key, slot) in [
            (AWARENESS, &mut self.awareness),
            (EMOTION, &mut self.emotion),
            (ENERGY, &mut self.energy),
        ] {
            if let Some(delta) = map.get(key).and_then(Value::as_f64) {
                *slot = (*slot + delta).clamp(0.0, 1.0);
            }
        }
    }

    fn level(&self) -> f64 {
        (self.awareness + self.emotion + self.energy) / 3.0
    }

    fn to_blob(self) -> Value {
        let mut map = ValueMap::new();
        map.insert(AWARENESS.to_string(), Value::Float(self.awareness));
        map.insert(EMOTION.to_string(), Value::Float(self.emotion));
        map.insert(ENERGY.to_string(), Value::Float(self.energy));
        map.insert(LEVEL.to_string(), Value::Float(self.level()));
        Value::Map(map)
    }
}

/// Processor tracking awareness, emotion and energy per actor.
///
/// Each dimension lives in `[0, 1]` and starts at `0.5`; the level is their
/// mean. Maps carrying any of the three keys set them absolutely, a Unity
/// change's `deltas` map shifts them, and events move one dimension by their
/// intensity (`stimulus` → awareness, `emotional` → emotion, `rest` and
/// `fatigue` → energy).
#[derive(Debug, Default)]
pub struct AffectiveProcessor {
    tracked: DashMap<String, TimestampMs>,
}

impl AffectiveProcessor {
    /// Creates a processor with no tracked actors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actors currently tracked.
    #[must_use]
    pub fn tracked_actors(&self) -> usize {
        self.tracked.len()
    }

    fn touch(&self, actor_id: &str) {
        self.tracked.insert(actor_id.to_string(), now_millis());
    }

    fn updated(&self, actor_id: &str, before: Affect, after: Affect) -> Option<Value> {
        self.touch(actor_id);
        (before != after).then(|| after.to_blob())
    }
}

#[async_trait]
impl ConsciousnessProcessor for AffectiveProcessor {
    async fn initialize_actor_consciousness(&self, actor_id: &str, seed: &Value) -> ProcessorResult<Option<Value>> {
        if !seed.is_null() && seed.as_map().is_none() {
            return Err(ProcessorError(format!(
                "seed for {actor_id} must be a map, got {}",
                seed.kind()
            )));
        }
        self.touch(actor_id);
        Ok(Some(Affect::from_blob(Some(seed)).to_blob()))
    }

    async fn cleanup_actor_consciousness(&self, actor_id: &str) -> ProcessorResult<()> {
        self.tracked.remove(actor_id);
        Ok(())
    }

    async fn process_state_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        update: &StateUpdate,
    ) -> ProcessorResult<Option<Value>> {
        let before = Affect::from_blob(current);
        let mut after = before;
        after.set_from(&update.properties);
        Ok(self.updated(actor_id, before, after))
    }

    async fn process_unity_change(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        change: &Value,
    ) -> ProcessorResult<Option<Value>> {
        let before = Affect::from_blob(current);
        let mut after = before;
        if let Some(map) = change.as_map() {
            after.set_from(map);
            if let Some(deltas) = map.get("deltas").and_then(Value::as_map) {
                after.shift(deltas);
            }
        }
        Ok(self.updated(actor_id, before, after))
    }

    async fn apply_consciousness_update(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        event: &ConsciousnessEvent,
    ) -> ProcessorResult<Option<Value>> {
        let before = Affect::from_blob(current);
        let mut after = before;
        let dimension = match event.kind.as_str() {
            "stimulus" => Some((AWARENESS, event.intensity)),
            "emotional" => Some((EMOTION, event.intensity)),
            "rest" => Some((ENERGY, event.intensity)),
            "fatigue" => Some((ENERGY, -event.intensity)),
            _ => None,
        };
        if let Some((key, delta)) = dimension {
            let mut shift = ValueMap::new();
            shift.insert(key.to_string(), Value::Float(delta));
            after.shift(&shift);
        }
        if let Some(map) = event.data.as_map() {
            after.set_from(map);
        }
        trace!(actor_id, kind = %event.kind, level = after.level(), "Applied consciousness event");
        Ok(self.updated(actor_id, before, after))
    }

    async fn apply_ai_response(
        &self,
        actor_id: &str,
        current: Option<&Value>,
        response: &Value,
    ) -> ProcessorResult<Option<Value>> {
        let before = Affect::from_blob(current);
        let mut after = before;
        if let Some(map) = response.as_map() {
            after.set_from(map);
        }
        Ok(self.updated(actor_id, before, after))
    }

    fn consciousness_level(&self, current: Option<&Value>) -> f64 {
        Affect::from_blob(current).level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(blob: &Value, key: &str) -> f64 {
        blob.get(key).and_then(Value::as_f64).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_defaults_to_half() {
        let processor = AffectiveProcessor::new();
        let blob = processor
            .initialize_actor_consciousness("a", &Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert!((field(&blob, LEVEL) - 0.5).abs() < f64::EPSILON);
        assert_eq!(processor.tracked_actors(), 1);
    }

    #[tokio::test]
    async fn test_seed_is_clamped() {
        let processor = AffectiveProcessor::new();
        let seed = Value::from(serde_json::json!({ "awareness": 3.0, "energy": 0.2 }));
        let blob = processor
            .initialize_actor_consciousness("a", &seed)
            .await
            .unwrap()
            .unwrap();
        assert!((field(&blob, AWARENESS) - 1.0).abs() < f64::EPSILON);
        assert!((field(&blob, ENERGY) - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_non_map_seed_rejected() {
        let processor = AffectiveProcessor::new();
        assert!(processor
            .initialize_actor_consciousness("a", &Value::from("loud"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fatigue_lowers_energy() {
        let processor = AffectiveProcessor::new();
        let event = ConsciousnessEvent::new("a", "fatigue", 0.3);
        let blob = processor
            .apply_consciousness_update("a", None, &event)
            .await
            .unwrap()
            .unwrap();
        assert!((field(&blob, ENERGY) - 0.2).abs() < 1e-9);
        assert!((processor.consciousness_level(Some(&blob)) - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unchanged_returns_none() {
        let processor = AffectiveProcessor::new();
        let blob = Affect::default().to_blob();
        let result = processor
            .apply_ai_response("a", Some(&blob), &Value::from(serde_json::json!({ "emotion": 0.5 })))
            .await
            .unwrap();
        assert!(result.is_none());
        processor.cleanup_actor_consciousness("a").await.unwrap();
        assert_eq!(processor.tracked_actors(), 0);
    }
}
