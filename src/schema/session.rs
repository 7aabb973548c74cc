use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-player session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random token (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Personality traits that bias choice phrasing for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonalityTrait {
    Cautious,
    Bold,
    Diplomatic,
    Direct,
    Curious,
    Practical,
    Optimistic,
    Pessimistic,
    Detailed,
    Concise,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 10] = [
        Self::Cautious,
        Self::Bold,
        Self::Diplomatic,
        Self::Direct,
        Self::Curious,
        Self::Practical,
        Self::Optimistic,
        Self::Pessimistic,
        Self::Detailed,
        Self::Concise,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cautious => "cautious",
            Self::Bold => "bold",
            Self::Diplomatic => "diplomatic",
            Self::Direct => "direct",
            Self::Curious => "curious",
            Self::Practical => "practical",
            Self::Optimistic => "optimistic",
            Self::Pessimistic => "pessimistic",
            Self::Detailed => "detailed",
            Self::Concise => "concise",
        }
    }

    /// Adverbs this trait contributes to choice personalization.
    pub fn adverbs(&self) -> [&'static str; 3] {
        match self {
            Self::Cautious => ["carefully", "cautiously", "deliberately"],
            Self::Bold => ["boldly", "bravely", "confidently"],
            Self::Diplomatic => ["politely", "respectfully", "graciously"],
            Self::Direct => ["directly", "straightforwardly", "bluntly"],
            Self::Curious => ["curiously", "inquisitively", "wonderingly"],
            Self::Practical => ["practically", "sensibly", "reasonably"],
            Self::Optimistic => ["hopefully", "optimistically", "eagerly"],
            Self::Pessimistic => ["warily", "skeptically", "doubtfully"],
            Self::Detailed => ["meticulously", "thoroughly", "carefully"],
            Self::Concise => ["simply", "briefly", "efficiently"],
        }
    }
}

/// Randomized traits fixed for the lifetime of a session.
///
/// Order is significant: the eligible adverb list is built by walking the
/// traits in the order they were drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub traits: Vec<PersonalityTrait>,
    pub styles: Vec<String>,
}

/// One entry in a session's choice log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    pub from_node: String,
    pub choice_index: usize,
    pub text: String,
    pub tag: Option<String>,
}

/// Mutable per-session record. Only the traversal engine advances it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    id: SessionId,
    current_node: String,
    path: Vec<String>,
    score: i64,
    sentiment: FxHashMap<String, u32>,
    history: Vec<ChoiceRecord>,
    created_at: DateTime<Utc>,
    profile: SessionProfile,
}

impl SessionState {
    /// A fresh session positioned at `start` with score 0 and empty tallies.
    pub fn new(
        id: SessionId,
        start: &str,
        profile: SessionProfile,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            current_node: start.to_string(),
            path: vec![start.to_string()],
            score: 0,
            sentiment: FxHashMap::default(),
            history: Vec::new(),
            created_at,
            profile,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn current_node(&self) -> &str {
        &self.current_node
    }

    /// Visited node ids, beginning with the start node.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn sentiment(&self) -> &FxHashMap<String, u32> {
        &self.sentiment
    }

    /// Occurrence count for `tag`, zero when never seen.
    pub fn tally(&self, tag: &str) -> u32 {
        self.sentiment.get(tag).copied().unwrap_or(0)
    }

    pub fn history(&self) -> &[ChoiceRecord] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Up to `limit` distinct tags in the order they were first earned.
    pub fn leading_tags(&self, limit: usize) -> Vec<&str> {
        let mut tags: Vec<&str> = Vec::new();
        for record in &self.history {
            if let Some(tag) = record.tag.as_deref() {
                if self.tally(tag) > 0 && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags.truncate(limit);
        tags
    }

    /// Commit a resolved transition. Callers validate before calling.
    pub(crate) fn advance(&mut self, to: &str, score_delta: i64, record: ChoiceRecord) {
        if let Some(tag) = record.tag.as_ref() {
            *self.sentiment.entry(tag.clone()).or_insert(0) += 1;
        }
        self.score += score_delta;
        self.path.push(to.to_string());
        self.current_node = to.to_string();
        self.history.push(record);
    }
}
