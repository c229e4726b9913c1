/// Upstream live-session notifications and their normalized form.
///
/// [`normalize`] is the only gate between the live-event source and the
/// trigger evaluator. Gift notifications are dropped unless they close a gift
/// streak, so a combo of 12 roses reaches the evaluator exactly once, carrying
/// the cumulative count and total diamond value.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trigger::TriggerType;

/// A notification exactly as the live-event source delivered it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RawEvent {
    /// Upstream event name: `gift`, `chat`, `like`, `social`, or the
    /// simulation shortcuts `follow` / `share`.
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
impl RawEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: Option<String>,
    /// Account handle.
    pub unique_id: Option<String>,
    pub nickname: Option<String>,
}

impl UserIdentity {
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.unique_id.as_deref())
            .or(self.user_id.as_deref())
            .unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GiftEvent {
    pub gift_id: u64,
    pub gift_name: String,
    #[serde(flatten)]
    pub user: UserIdentity,
    /// Cumulative count over the whole streak.
    pub repeat_count: u32,
    /// Unit diamond value multiplied by `repeat_count`.
    pub diamond_count: u64,
    pub streak_final: bool,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(flatten)]
    pub user: UserIdentity,
    pub comment: String,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeEvent {
    #[serde(flatten)]
    pub user: UserIdentity,
    pub like_count: u32,
    pub total_like_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SocialKind {
    Follow,
    Share,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialEvent {
    #[serde(rename = "type")]
    pub kind: SocialKind,
    #[serde(flatten)]
    pub user: UserIdentity,
}

/// The pipeline-internal event representation.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalEvent {
    Gift(GiftEvent),
    Chat(ChatEvent),
    Like(LikeEvent),
    Social(SocialEvent),
}

impl CanonicalEvent {
    /// Trigger type this event is matched against.
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            CanonicalEvent::Gift(_) => TriggerType::Gift,
            CanonicalEvent::Chat(_) => TriggerType::Chat,
            CanonicalEvent::Like(_) => TriggerType::Like,
            CanonicalEvent::Social(s) => match s.kind {
                SocialKind::Follow => TriggerType::Follow,
                SocialKind::Share => TriggerType::Share,
            },
        }
    }

    pub fn user(&self) -> &UserIdentity {
        match self {
            CanonicalEvent::Gift(e) => &e.user,
            CanonicalEvent::Chat(e) => &e.user,
            CanonicalEvent::Like(e) => &e.user,
            CanonicalEvent::Social(e) => &e.user,
        }
    }

    /// Event name used when forwarding to overlay observers.
    pub fn overlay_name(&self) -> &'static str {
        match self {
            CanonicalEvent::Gift(_) => "gift",
            CanonicalEvent::Chat(_) => "chat",
            CanonicalEvent::Like(_) => "like",
            CanonicalEvent::Social(_) => "social",
        }
    }

    /// JSON payload forwarded to overlay observers.
    pub fn to_payload(&self) -> Value {
        let payload = match self {
            CanonicalEvent::Gift(e) => serde_json::to_value(e),
            CanonicalEvent::Chat(e) => serde_json::to_value(e),
            CanonicalEvent::Like(e) => serde_json::to_value(e),
            CanonicalEvent::Social(e) => serde_json::to_value(e),
        };
        payload.unwrap_or(Value::Null)
    }
}

// ── Upstream payload shapes ────────────────────────────────────────────────────

/// Upstream ids arrive as either JSON strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(s) => s,
            IdValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    user_id: Option<IdValue>,
    unique_id: Option<String>,
    nickname: Option<String>,
}

impl From<RawUser> for UserIdentity {
    fn from(raw: RawUser) -> Self {
        Self {
            user_id: raw.user_id.map(IdValue::into_string),
            unique_id: raw.unique_id,
            nickname: raw.nickname,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGift {
    gift_id: u64,
    #[serde(default)]
    gift_name: String,
    #[serde(flatten)]
    user: RawUser,
    #[serde(default = "one")]
    repeat_count: u32,
    #[serde(default)]
    repeat_end: bool,
    /// Unit price of a single gift.
    #[serde(default)]
    diamond_count: u64,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChat {
    #[serde(flatten)]
    user: RawUser,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    is_moderator: bool,
    #[serde(default)]
    is_subscriber: bool,
    #[serde(alias = "role")]
    user_role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLike {
    #[serde(flatten)]
    user: RawUser,
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    total_like_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSocial {
    #[serde(flatten)]
    user: RawUser,
    #[serde(alias = "type")]
    display_type: Option<String>,
}

fn one() -> u32 {
    1
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Converts an upstream notification into a [`CanonicalEvent`].
///
/// Returns `None` for non-final gift streak ticks, unknown event kinds and
/// payloads that do not have the expected shape. Discards are logged, never
/// reported to the caller.
pub fn normalize(raw: &RawEvent) -> Option<CanonicalEvent> {
    let result = match raw.kind.as_str() {
        "gift" => parse::<RawGift>(raw).map(normalize_gift),
        "chat" => parse::<RawChat>(raw).map(|c| {
            Some(CanonicalEvent::Chat(ChatEvent {
                user: c.user.into(),
                comment: c.comment,
                is_moderator: c.is_moderator,
                is_subscriber: c.is_subscriber,
                role: c.user_role,
            }))
        }),
        "like" => parse::<RawLike>(raw).map(|l| {
            Some(CanonicalEvent::Like(LikeEvent {
                user: l.user.into(),
                like_count: l.like_count,
                total_like_count: l.total_like_count,
            }))
        }),
        "social" => parse::<RawSocial>(raw).map(|s| {
            let kind = s.display_type.as_deref().and_then(social_kind);
            if kind.is_none() {
                tracing::debug!(display_type = ?s.display_type, "Ignoring social event");
            }
            kind.map(|kind| CanonicalEvent::Social(SocialEvent { kind, user: s.user.into() }))
        }),
        "follow" | "share" => parse::<RawSocial>(raw).map(|s| {
            let kind = if raw.kind == "follow" { SocialKind::Follow } else { SocialKind::Share };
            Some(CanonicalEvent::Social(SocialEvent { kind, user: s.user.into() }))
        }),
        other => {
            tracing::debug!(kind = other, "Discarding unknown live event kind");
            return None;
        }
    };

    match result {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(kind = %raw.kind, error = %e, "Discarding malformed live event");
            None
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(raw: &RawEvent) -> Result<T, serde_json::Error> {
    T::deserialize(&raw.data)
}

fn normalize_gift(g: RawGift) -> Option<CanonicalEvent> {
    if !g.repeat_end {
        tracing::trace!(gift_id = g.gift_id, repeat_count = g.repeat_count, "Gift streak in progress");
        return None;
    }
    Some(CanonicalEvent::Gift(GiftEvent {
        gift_id: g.gift_id,
        gift_name: g.gift_name,
        user: g.user.into(),
        repeat_count: g.repeat_count,
        diamond_count: g.diamond_count.saturating_mul(u64::from(g.repeat_count)),
        streak_final: true,
        timestamp: g.timestamp,
    }))
}

fn social_kind(display_type: &str) -> Option<SocialKind> {
    let lower = display_type.to_lowercase();
    if lower.contains("follow") {
        Some(SocialKind::Follow)
    } else if lower.contains("share") {
        Some(SocialKind::Share)
    } else {
        None
    }
}
