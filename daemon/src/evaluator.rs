/// Decides which triggers a canonical event fires and hands their actions to
/// the queue.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::ConfigStore;
use crate::live_event::CanonicalEvent;
use crate::queue::ActionQueue;
use crate::trigger::{PatternCache, Trigger};

/// Human-readable notification that a trigger fired.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerNotice {
    pub trigger_id: String,
    pub message: String,
    /// Number of actions handed to the queue.
    pub enqueued: usize,
}

#[derive(Default)]
struct EvaluatorState {
    /// When each trigger last fired. Lives for the process only.
    last_fired: HashMap<String, Instant>,
    patterns: PatternCache,
}

pub struct TriggerEvaluator {
    store: ConfigStore,
    queue: ActionQueue,
    notices: Option<mpsc::UnboundedSender<TriggerNotice>>,
    state: Mutex<EvaluatorState>,
}

impl TriggerEvaluator {
    pub fn new(store: ConfigStore, queue: ActionQueue) -> Self {
        Self {
            store,
            queue,
            notices: None,
            state: Mutex::new(EvaluatorState::default()),
        }
    }

    /// Sends a [`TriggerNotice`] to `tx` for every fired trigger.
    pub fn with_notices(mut self, tx: mpsc::UnboundedSender<TriggerNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Evaluates `event` against the current triggers, records cooldowns,
    /// enqueues the actions of every fired trigger and returns the fired
    /// triggers in configuration order.
    ///
    /// Never awaits: all actions of all fired triggers are enqueued before
    /// this returns, in trigger order then action order.
    pub fn process(&self, event: &CanonicalEvent) -> Vec<Trigger> {
        let config = self.store.get_all();
        if !config.settings.enable_automation {
            return Vec::new();
        }

        let event_type = event.trigger_type();
        let fired: Vec<Trigger> = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let state = &mut *state;
            let now = Instant::now();

            config
                .triggers
                .iter()
                .filter(|t| t.enabled && t.trigger_type == event_type)
                .filter(|t| t.matches(event, &mut state.patterns))
                .filter(|t| {
                    let Some(cooldown) = t.cooldown() else {
                        return true;
                    };
                    if let Some(last) = state.last_fired.get(&t.id) {
                        if now.saturating_duration_since(*last) < cooldown {
                            tracing::debug!(trigger_id = %t.id, "Trigger on cooldown");
                            return false;
                        }
                    }
                    state.last_fired.insert(t.id.clone(), now);
                    true
                })
                .cloned()
                .collect()
        };

        for trigger in &fired {
            let mut enqueued = 0;
            for action_id in &trigger.actions {
                match config.action(action_id) {
                    Some(action) => {
                        // Completion is observed through the queue's own logging.
                        drop(self.queue.enqueue(Arc::new(action.clone())));
                        enqueued += 1;
                    }
                    None => {
                        tracing::debug!(trigger_id = %trigger.id, %action_id, "Skipping unknown action");
                    }
                }
            }

            let label = if trigger.name.is_empty() { &trigger.id } else { &trigger.name };
            let message = format!("Triggered: {label} ({})", trigger.trigger_type.as_str());
            tracing::debug!(trigger_id = %trigger.id, enqueued, "{message}");
            if let Some(tx) = &self.notices {
                let _ = tx.send(TriggerNotice {
                    trigger_id: trigger.id.clone(),
                    message,
                    enqueued,
                });
            }
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind};
    use crate::config::{Config, ConfigPatch, Settings};
    use crate::live_event::{normalize, ChatEvent, GiftEvent, LikeEvent, RawEvent, UserIdentity};
    use crate::queue::tests::{action, ScriptedExecutor};
    use crate::trigger::TriggerType;
    use serde_json::json;
    use std::time::Duration;

    fn trigger(id: &str, trigger_type: TriggerType, actions: &[&str]) -> Trigger {
        Trigger {
            id: id.to_string(),
            name: String::new(),
            trigger_type,
            enabled: true,
            gift_id: None,
            gift_name: None,
            min_streak: None,
            exact_match: None,
            regex: None,
            role: None,
            cooldown_secs: None,
            actions: actions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn chat(comment: &str) -> CanonicalEvent {
        CanonicalEvent::Chat(ChatEvent {
            user: UserIdentity::default(),
            comment: comment.to_string(),
            is_moderator: false,
            is_subscriber: false,
            role: None,
        })
    }

    fn like() -> CanonicalEvent {
        CanonicalEvent::Like(LikeEvent {
            user: UserIdentity::default(),
            like_count: 1,
            total_like_count: 1,
        })
    }

    struct Harness {
        evaluator: TriggerEvaluator,
        store: ConfigStore,
        queue: ActionQueue,
        exec: Arc<ScriptedExecutor>,
    }

    fn harness(triggers: Vec<Trigger>, actions: Vec<Action>) -> Harness {
        let store = ConfigStore::new(Config {
            triggers,
            actions,
            ..Default::default()
        });
        let exec = Arc::new(ScriptedExecutor::default());
        let queue = ActionQueue::new(exec.clone(), Duration::from_millis(100));
        let evaluator = TriggerEvaluator::new(store.clone(), queue.clone());
        Harness { evaluator, store, queue, exec }
    }

    fn ids(fired: &[Trigger]) -> Vec<&str> {
        fired.iter().map(|t| t.id.as_str()).collect()
    }

    /// Waits until the queue has nothing left to run.
    async fn settle(queue: &ActionQueue) {
        queue.enqueue(action("__barrier")).await.unwrap();
    }

    // ── automation switch ─────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn automation_disabled_fires_nothing_and_keeps_no_cooldown() {
        let mut t = trigger("jump", TriggerType::Chat, &["a"]);
        t.cooldown_secs = Some(10.0);
        let h = harness(vec![t], vec![action("a")]);

        h.store.set(ConfigPatch {
            settings: Some(Settings { enable_automation: false, ..Settings::default() }),
            ..Default::default()
        });
        assert!(h.evaluator.process(&chat("hi")).is_empty());
        assert!(h.queue.is_empty());

        // Re-enabling fires immediately: the disabled call recorded no cooldown.
        h.store.set(ConfigPatch {
            settings: Some(Settings::default()),
            ..Default::default()
        });
        assert_eq!(ids(&h.evaluator.process(&chat("hi"))), ["jump"]);
    }

    // ── filtering ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn only_enabled_triggers_of_matching_type() {
        let mut disabled = trigger("off", TriggerType::Chat, &[]);
        disabled.enabled = false;
        let h = harness(
            vec![
                trigger("gift", TriggerType::Gift, &[]),
                disabled,
                trigger("chat", TriggerType::Chat, &[]),
                trigger("like", TriggerType::Like, &[]),
            ],
            vec![],
        );
        assert_eq!(ids(&h.evaluator.process(&chat("x"))), ["chat"]);
        assert_eq!(ids(&h.evaluator.process(&like())), ["like"]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_regex_does_not_affect_siblings() {
        let mut broken = trigger("broken", TriggerType::Chat, &[]);
        broken.regex = Some("(".into());
        let mut good = trigger("good", TriggerType::Chat, &[]);
        good.regex = Some("^hello".into());
        let h = harness(vec![broken, good], vec![]);

        assert_eq!(ids(&h.evaluator.process(&chat("Hello there"))), ["good"]);
    }

    #[tokio::test(start_paused = true)]
    async fn gift_streak_example() {
        let mut t = trigger("roses", TriggerType::Gift, &[]);
        t.gift_name = Some("rose".into());
        t.min_streak = Some(10);
        let h = harness(vec![t], vec![]);

        let gift = |repeat_count: u32| {
            normalize(&RawEvent::new(
                "gift",
                json!({ "giftId": 5655, "giftName": "Rose", "repeatCount": repeat_count, "repeatEnd": true, "diamondCount": 1 }),
            ))
            .unwrap()
        };
        assert_eq!(ids(&h.evaluator.process(&gift(12))), ["roses"]);
        assert!(h.evaluator.process(&gift(5)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gift_triggers_match_only_final_streak_events() {
        let h = harness(vec![trigger("any-gift", TriggerType::Gift, &[])], vec![]);
        let tick = RawEvent::new("gift", json!({ "giftId": 1, "repeatCount": 3, "repeatEnd": false }));
        // Non-final ticks never become canonical events, so nothing is evaluated.
        assert!(normalize(&tick).is_none());

        let fin = CanonicalEvent::Gift(GiftEvent {
            gift_id: 1,
            gift_name: String::new(),
            user: UserIdentity::default(),
            repeat_count: 3,
            diamond_count: 3,
            streak_final: true,
            timestamp: None,
        });
        assert_eq!(ids(&h.evaluator.process(&fin)), ["any-gift"]);
    }

    // ── cooldown ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn cooldown_ten_seconds() {
        let mut t = trigger("t", TriggerType::Like, &[]);
        t.cooldown_secs = Some(10.0);
        let h = harness(vec![t], vec![]);

        assert_eq!(h.evaluator.process(&like()).len(), 1); // t=0
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(h.evaluator.process(&like()).len(), 0); // t=5
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(h.evaluator.process(&like()).len(), 1); // t=11
    }

    #[tokio::test(start_paused = true)]
    async fn chat_exact_match_with_cooldown_example() {
        let mut t = trigger("jump", TriggerType::Chat, &[]);
        t.exact_match = Some("!jump".into());
        t.cooldown_secs = Some(5.0);
        let h = harness(vec![t], vec![]);

        assert_eq!(h.evaluator.process(&chat("!jump")).len(), 1); // t=0
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(h.evaluator.process(&chat("!jump")).len(), 0); // t=3
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(h.evaluator.process(&chat("!jump")).len(), 1); // t=6
    }

    #[tokio::test(start_paused = true)]
    async fn huge_cooldown_blocks_refire() {
        let mut t = trigger("t", TriggerType::Like, &[]);
        t.cooldown_secs = Some(1e20);
        let h = harness(vec![t], vec![]);

        assert_eq!(h.evaluator.process(&like()).len(), 1);
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(h.evaluator.process(&like()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_fire_does_not_extend_cooldown() {
        let mut t = trigger("t", TriggerType::Like, &[]);
        t.cooldown_secs = Some(10.0);
        let h = harness(vec![t], vec![]);

        h.evaluator.process(&like());
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(h.evaluator.process(&like()).is_empty());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(h.evaluator.process(&like()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_matching_event_does_not_start_cooldown() {
        let mut t = trigger("jump", TriggerType::Chat, &[]);
        t.exact_match = Some("!jump".into());
        t.cooldown_secs = Some(60.0);
        let h = harness(vec![t], vec![]);

        assert!(h.evaluator.process(&chat("hello")).is_empty());
        assert_eq!(h.evaluator.process(&chat("!jump")).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldowns_are_per_trigger() {
        let mut a = trigger("a", TriggerType::Like, &[]);
        a.cooldown_secs = Some(30.0);
        let b = trigger("b", TriggerType::Like, &[]);
        let h = harness(vec![a, b], vec![]);

        assert_eq!(ids(&h.evaluator.process(&like())), ["a", "b"]);
        assert_eq!(ids(&h.evaluator.process(&like())), ["b"]);
    }

    // ── enqueue order ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn actions_enqueued_in_trigger_then_action_order() {
        let h = harness(
            vec![
                trigger("t1", TriggerType::Chat, &["A", "B"]),
                trigger("t2", TriggerType::Chat, &["C"]),
            ],
            vec![action("C"), action("B"), action("A")],
        );

        let fired = h.evaluator.process(&chat("go"));
        assert_eq!(ids(&fired), ["t1", "t2"]);
        // All three are queued before any of them has run.
        assert!(h.exec.started().is_empty());

        settle(&h.queue).await;
        assert_eq!(h.exec.started(), ["A", "B", "C", "__barrier"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_action_ids_are_skipped() {
        let h = harness(
            vec![trigger("t", TriggerType::Chat, &["A", "ghost", "B"])],
            vec![action("A"), action("B")],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let evaluator = TriggerEvaluator::new(h.store.clone(), h.queue.clone()).with_notices(tx);

        evaluator.process(&chat("go"));
        settle(&h.queue).await;
        assert_eq!(h.exec.started(), ["A", "B", "__barrier"]);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.trigger_id, "t");
        assert_eq!(notice.enqueued, 2);
        assert_eq!(notice.message, "Triggered: t (chat)");
    }

    #[tokio::test(start_paused = true)]
    async fn notice_uses_trigger_name_when_set() {
        let mut t = trigger("t", TriggerType::Like, &[]);
        t.name = "Like burst".into();
        let h = harness(vec![t], vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let evaluator = TriggerEvaluator::new(h.store.clone(), h.queue.clone()).with_notices(tx);

        evaluator.process(&like());
        assert_eq!(rx.recv().await.unwrap().message, "Triggered: Like burst (like)");
    }

    #[tokio::test(start_paused = true)]
    async fn config_changes_apply_to_next_event() {
        let h = harness(vec![], vec![]);
        assert!(h.evaluator.process(&like()).is_empty());

        h.store.set(ConfigPatch {
            triggers: Some(vec![trigger("new", TriggerType::Like, &["A"])]),
            actions: Some(vec![Action {
                id: "A".into(),
                name: String::new(),
                kind: ActionKind::Tts { text: "hi".into() },
            }]),
            ..Default::default()
        });
        assert_eq!(ids(&h.evaluator.process(&like())), ["new"]);
    }
}
