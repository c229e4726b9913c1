use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::live_event::{CanonicalEvent, ChatEvent, GiftEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Gift,
    Chat,
    Follow,
    Share,
    Like,
    /// Accepted in config files, but no live event maps to it.
    Join,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Gift => "gift",
            TriggerType::Chat => "chat",
            TriggerType::Follow => "follow",
            TriggerType::Share => "share",
            TriggerType::Like => "like",
            TriggerType::Join => "join",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Follower,
    Subscriber,
    Moderator,
    Admin,
}

/// A conditional rule mapping one kind of live event onto a list of actions.
///
/// Every condition field is optional; an absent (or empty) one always matches.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Trigger {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Gift: exact upstream gift id.
    #[serde(default)]
    pub gift_id: Option<u64>,
    /// Gift: case-insensitive substring of the gift name.
    #[serde(default)]
    pub gift_name: Option<String>,
    /// Gift: minimum cumulative streak count.
    #[serde(default)]
    pub min_streak: Option<u32>,

    /// Chat: the whole comment must equal this text.
    #[serde(default)]
    pub exact_match: Option<String>,
    /// Chat: case-insensitive regular expression searched in the comment.
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub role: Option<ChatRole>,

    /// Minimum seconds between two fires of this trigger.
    #[serde(default, alias = "cooldown")]
    pub cooldown_secs: Option<f64>,
    /// Action ids, run in this order when the trigger fires.
    #[serde(default)]
    pub actions: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Trigger {
    /// The effective cooldown, if any. Zero, negative and NaN values mean
    /// "no cooldown"; values too large for a `Duration` saturate.
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_secs
            .filter(|s| *s > 0.0)
            .map(|s| Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX))
    }

    /// Evaluates the type-specific condition against `event`.
    ///
    /// The caller has already checked that the event kind matches
    /// [`Trigger::trigger_type`]. Regex patterns are compiled through
    /// `patterns` so each distinct pattern is built once.
    pub fn matches(&self, event: &CanonicalEvent, patterns: &mut PatternCache) -> bool {
        match event {
            CanonicalEvent::Gift(gift) => self.matches_gift(gift),
            CanonicalEvent::Chat(chat) => self.matches_chat(chat, patterns),
            CanonicalEvent::Like(_) | CanonicalEvent::Social(_) => true,
        }
    }

    fn matches_gift(&self, gift: &GiftEvent) -> bool {
        if let Some(id) = self.gift_id {
            if gift.gift_id != id {
                return false;
            }
        }
        if let Some(name) = non_empty(&self.gift_name) {
            if !gift.gift_name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = self.min_streak {
            if gift.repeat_count < min {
                return false;
            }
        }
        true
    }

    fn matches_chat(&self, chat: &ChatEvent, patterns: &mut PatternCache) -> bool {
        if let Some(text) = non_empty(&self.exact_match) {
            if chat.comment != text {
                return false;
            }
        }
        if let Some(pattern) = non_empty(&self.regex) {
            if !patterns.is_match(&self.id, pattern, &chat.comment) {
                return false;
            }
        }
        match self.role {
            None => true,
            Some(role) => role_matches(role, chat),
        }
    }
}

/// Moderator and subscriber requirements are checked against the upstream
/// flags. The remaining roles compare against the upstream role string when
/// one was delivered.
fn role_matches(role: ChatRole, chat: &ChatEvent) -> bool {
    match role {
        ChatRole::Moderator => chat.is_moderator,
        ChatRole::Subscriber => chat.is_subscriber,
        ChatRole::User => true,
        ChatRole::Follower | ChatRole::Admin => match chat.role.as_deref() {
            Some(upstream) => {
                let wanted = if role == ChatRole::Follower { "follower" } else { "admin" };
                upstream.eq_ignore_ascii_case(wanted)
            }
            None => true,
        },
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Compiled chat patterns keyed by source text. Invalid patterns are cached
/// too, so a broken trigger is reported once rather than on every message.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Option<Regex>>,
}

impl PatternCache {
    pub fn is_match(&mut self, trigger_id: &str, pattern: &str, text: &str) -> bool {
        let entry = self.compiled.entry(pattern.to_string()).or_insert_with(|| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(trigger_id, pattern, error = %e, "Invalid trigger regex; treating as no match");
                    None
                }
            }
        });
        entry.as_ref().is_some_and(|re| re.is_match(text))
    }
}
