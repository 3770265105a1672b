//! A/B testing: sticky group assignment, variant resolution and
//! conversion/impression/click events.

use crate::EXPIRY_DAYS;
use pwx_core::events::EventEmitter;
use pwx_core::time::now_ms;
use pwx_storage::LocalStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

const ASSIGNMENTS_KEY: &str = "ab-tests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    A,
    B,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Group::A => "A",
            Group::B => "B",
        }
    }
}

/// Uniform roll in `[0, 1)`. Abstracted so tests can force assignment.
pub trait Rng {
    fn roll(&self) -> f64;
}

/// splitmix64 seeded from the clock. Assignment splits need spread, not
/// cryptographic strength.
pub struct EntropyRng {
    state: Cell<u64>,
}

impl EntropyRng {
    pub fn new() -> Self {
        Self {
            state: Cell::new(now_ms() ^ 0x9E37_79B9_7F4A_7C15),
        }
    }
}

impl Default for EntropyRng {
    fn default() -> Self {
        Self::new()
    }
}

impl Rng for EntropyRng {
    fn roll(&self) -> f64 {
        let mut z = self.state.get().wrapping_add(0x9E37_79B9_7F4A_7C15);
        self.state.set(z);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Hook into a host-page analytics data layer. Optional; its absence is
/// never an error.
pub type DataLayerHook = Rc<dyn Fn(&str, &Value)>;

pub struct ABTestManager {
    store: Rc<LocalStore>,
    emitter: EventEmitter,
    rng: Rc<dyn Rng>,
    data_layer: Option<DataLayerHook>,
}

impl ABTestManager {
    pub fn new(store: Rc<LocalStore>, emitter: EventEmitter, rng: Rc<dyn Rng>) -> Self {
        Self {
            store,
            emitter,
            rng,
            data_layer: None,
        }
    }

    pub fn set_data_layer(&mut self, hook: DataLayerHook) {
        self.data_layer = Some(hook);
    }

    /// Sticky 50/50 assignment.
    pub fn group(&self, test_id: &str) -> Group {
        self.group_with_split(test_id, 0.5)
    }

    /// The single assignment authority: the first call rolls group A
    /// with probability `split` and persists; every later call returns
    /// the stored group unchanged.
    pub fn group_with_split(&self, test_id: &str, split: f64) -> Group {
        let mut assignments = self.load();
        if let Some(group) = assignments.get(test_id) {
            return *group;
        }

        let group = if self.rng.roll() < split {
            Group::A
        } else {
            Group::B
        };
        assignments.insert(test_id.to_string(), group);
        self.save(&assignments);
        self.emitter.emit(
            "abtest:assigned",
            &json!({"testId": test_id, "group": group.as_str()}),
        );
        group
    }

    pub fn force_group(&self, test_id: &str, group: Group) {
        let mut assignments = self.load();
        assignments.insert(test_id.to_string(), group);
        self.save(&assignments);
    }

    /// Drop a single assignment; the next `group` call re-rolls.
    pub fn reset(&self, test_id: &str) {
        let mut assignments = self.load();
        if assignments.remove(test_id).is_some() {
            self.save(&assignments);
        }
    }

    pub fn reset_all(&self) {
        self.store.remove(ASSIGNMENTS_KEY);
    }

    /// Pure projection of `group` over a caller-supplied `{A: …, B: …}`
    /// variant map.
    pub fn variant(&self, test_id: &str, variants: &Value, split: f64) -> Option<Value> {
        let group = self.group_with_split(test_id, split);
        variants.get(group.as_str()).cloned()
    }

    pub fn track_conversion(&self, test_id: &str, metadata: Option<Value>) {
        self.track(test_id, "conversion", metadata);
    }

    pub fn track_impression(&self, test_id: &str, metadata: Option<Value>) {
        self.track(test_id, "impression", metadata);
    }

    pub fn track_click(&self, test_id: &str, metadata: Option<Value>) {
        self.track(test_id, "click", metadata);
    }

    fn track(&self, test_id: &str, kind: &str, metadata: Option<Value>) {
        let group = self.group(test_id);
        let mut payload = json!({
            "testId": test_id,
            "group": group.as_str(),
            "event": kind,
        });
        if let (Value::Object(map), Some(meta)) = (&mut payload, metadata) {
            map.insert("metadata".into(), meta);
        }
        let event = format!("abtest:{kind}");
        self.emitter.emit(&event, &payload);
        if let Some(hook) = &self.data_layer {
            hook(&event, &payload);
        }
    }

    fn load(&self) -> HashMap<String, Group> {
        self.store.get_as(ASSIGNMENTS_KEY).unwrap_or_default()
    }

    fn save(&self, assignments: &HashMap<String, Group>) {
        self.store
            .set_serialize(ASSIGNMENTS_KEY, assignments, Some(EXPIRY_DAYS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwx_storage::MemoryBackend;

    struct FixedRng(Cell<f64>);

    impl Rng for FixedRng {
        fn roll(&self) -> f64 {
            self.0.get()
        }
    }

    fn manager(roll: f64) -> (ABTestManager, Rc<FixedRng>, EventEmitter) {
        let store = Rc::new(LocalStore::new(Rc::new(MemoryBackend::new()), "pwx"));
        let emitter = EventEmitter::new();
        let rng = Rc::new(FixedRng(Cell::new(roll)));
        (
            ABTestManager::new(store, emitter.clone(), Rc::clone(&rng) as Rc<dyn Rng>),
            rng,
            emitter,
        )
    }

    #[test]
    fn assignment_is_sticky_across_calls() {
        let (manager, rng, _) = manager(0.1);
        assert_eq!(manager.group("t1"), Group::A);
        // A different roll must not change an existing assignment.
        rng.0.set(0.9);
        for _ in 0..5 {
            assert_eq!(manager.group("t1"), Group::A);
        }
    }

    #[test]
    fn split_decides_the_first_roll_only() {
        let (manager, _, _) = manager(0.6);
        assert_eq!(manager.group_with_split("t1", 0.5), Group::B);
        assert_eq!(manager.group_with_split("t2", 0.7), Group::A);
    }

    #[test]
    fn force_and_reset_override_stickiness() {
        let (manager, rng, _) = manager(0.1);
        assert_eq!(manager.group("t1"), Group::A);

        manager.force_group("t1", Group::B);
        assert_eq!(manager.group("t1"), Group::B);

        manager.reset("t1");
        rng.0.set(0.9);
        assert_eq!(manager.group("t1"), Group::B);
    }

    #[test]
    fn variant_projects_the_assigned_group() {
        let (manager, _, _) = manager(0.1);
        let variants = json!({"A": {"color": "red"}, "B": {"color": "blue"}});
        assert_eq!(
            manager.variant("t1", &variants, 0.5),
            Some(json!({"color": "red"}))
        );
        assert_eq!(manager.variant("t1", &json!({}), 0.5), None);
    }

    #[test]
    fn tracking_emits_internal_events_and_data_layer_pushes() {
        let (mut manager, _, emitter) = manager(0.1);
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        emitter.on("abtest:conversion", move |payload| {
            assert_eq!(payload["group"], "A");
            assert_eq!(payload["metadata"]["order"], 42);
            s.set(s.get() + 1);
        });

        let pushed = Rc::new(Cell::new(0));
        let p = Rc::clone(&pushed);
        manager.set_data_layer(Rc::new(move |event, _| {
            assert_eq!(event, "abtest:conversion");
            p.set(p.get() + 1);
        }));

        manager.track_conversion("t1", Some(json!({"order": 42})));
        assert_eq!(seen.get(), 1);
        assert_eq!(pushed.get(), 1);
    }

    #[test]
    fn tracking_without_a_data_layer_is_fine() {
        let (manager, _, _) = manager(0.9);
        manager.track_impression("t1", None);
        manager.track_click("t1", None);
    }

    #[test]
    fn entropy_rng_stays_in_unit_interval() {
        let rng = EntropyRng::new();
        for _ in 0..1000 {
            let roll = rng.roll();
            assert!((0.0..1.0).contains(&roll));
        }
    }
}
