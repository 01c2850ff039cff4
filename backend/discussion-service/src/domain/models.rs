/// Domain models for discussion-service
///
/// Documents are stored with camelCase field names and decoded into these
/// structs at the store boundary.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
/// so that lexicographic order in queries matches chronological order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }

    /// Same encoding for optional fields; absent and `null` both mean `None`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_some(&super::format(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub upvote_count: i64,
    #[serde(default)]
    pub downvote_count: i64,
    /// Always `upvote_count - downvote_count`
    #[serde(default)]
    pub vote_score: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Download URLs of uploaded files
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default = "default_published")]
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    /// Set for replies; threading is presentational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub upvote_count: i64,
    #[serde(default)]
    pub downvote_count: i64,
    #[serde(default)]
    pub vote_score: i64,
}

/// One user's vote on one post or comment. Its path encodes (subject, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub user_id: String,
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    pub direction: VoteDirection,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A scheduled community event. Written by admins, readable by everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "timestamp")]
    pub start_date: DateTime<Utc>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub location: String,
    /// Image URL, empty when unset
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_link: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    pub created_by: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    #[default]
    Published,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Meetup,
    Workshop,
    Conference,
    Social,
    #[default]
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Meetup => "meetup",
            EventType::Workshop => "workshop",
            EventType::Conference => "conference",
            EventType::Social => "social",
            EventType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Basic,
    Author,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Basic => "basic",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Role::Basic),
            "author" => Ok(Role::Author),
            "admin" => Ok(Role::Admin),
            other => Err(ServiceError::validation(
                "validation/invalid-role",
                format!("Invalid role '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

/// Case-sensitive: only `"up"` and `"down"` are accepted.
impl FromStr for VoteDirection {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            _ => Err(ServiceError::validation(
                "validation/invalid-direction",
                "Invalid vote direction",
            )),
        }
    }
}

/// A user's vote on a subject, including the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    None,
    Up,
    Down,
}

impl From<Option<VoteDirection>> for VoteState {
    fn from(direction: Option<VoteDirection>) -> Self {
        match direction {
            None => VoteState::None,
            Some(VoteDirection::Up) => VoteState::Up,
            Some(VoteDirection::Down) => VoteState::Down,
        }
    }
}

impl VoteState {
    pub fn direction(&self) -> Option<VoteDirection> {
        match self {
            VoteState::None => None,
            VoteState::Up => Some(VoteDirection::Up),
            VoteState::Down => Some(VoteDirection::Down),
        }
    }
}

/// Effect of one vote request: the caller's new state and the counter deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub next: VoteState,
    pub up_delta: i64,
    pub down_delta: i64,
}

impl VoteTransition {
    /// Voting the same direction again withdraws the vote; voting the other
    /// direction switches it.
    pub fn plan(existing: VoteState, requested: VoteDirection) -> Self {
        let (next, up_delta, down_delta) = match (existing, requested) {
            (VoteState::None, VoteDirection::Up) => (VoteState::Up, 1, 0),
            (VoteState::None, VoteDirection::Down) => (VoteState::Down, 0, 1),
            (VoteState::Up, VoteDirection::Up) => (VoteState::None, -1, 0),
            (VoteState::Down, VoteDirection::Down) => (VoteState::None, 0, -1),
            (VoteState::Up, VoteDirection::Down) => (VoteState::Down, -1, 1),
            (VoteState::Down, VoteDirection::Up) => (VoteState::Up, 1, -1),
        };
        Self {
            next,
            up_delta,
            down_delta,
        }
    }

    /// Metric label, e.g. `none_to_up`.
    pub fn label(existing: VoteState, next: VoteState) -> &'static str {
        match (existing, next) {
            (VoteState::None, VoteState::Up) => "none_to_up",
            (VoteState::None, VoteState::Down) => "none_to_down",
            (VoteState::Up, VoteState::None) => "up_to_none",
            (VoteState::Down, VoteState::None) => "down_to_none",
            (VoteState::Up, VoteState::Down) => "up_to_down",
            (VoteState::Down, VoteState::Up) => "down_to_up",
            _ => "unchanged",
        }
    }
}

/// Subject counters after a vote, plus the caller's new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub vote_score: i64,
    pub direction: VoteState,
}
