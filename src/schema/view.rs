/// Externally visible payloads handed to the transport layer.

use serde::{Deserialize, Serialize};

use super::session::SessionId;

/// A choice as shown to the player. `index` is the position to submit back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceView {
    pub index: usize,
    pub text: String,
}

/// Extra illustrations generated once a session reaches an ending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingArt {
    pub retrospective_prompt: String,
    pub retrospective_url: String,
    pub cover_prompt: String,
    pub cover_url: String,
}

/// The personalized view of a session's current node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub session_id: SessionId,
    pub node_id: String,
    pub situation: String,
    pub is_end: bool,
    pub ending_category: Option<String>,
    pub choices: Vec<ChoiceView>,
    pub image_prompt: String,
    pub image_url: String,
    pub image_seed: u64,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ending_art: Option<EndingArt>,
}

/// Shareable four-panel summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareCard {
    pub prompt: String,
    pub image_url: String,
    pub score: i64,
    pub ending_category: String,
}

/// Body of a choice submission as the transport deserializes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRequest {
    #[serde(default)]
    pub choice_index: Option<i64>,
}

impl ChoiceRequest {
    pub fn new(index: i64) -> Self {
        Self {
            choice_index: Some(index),
        }
    }

    /// The requested index, or `None` when missing or negative.
    pub fn index(&self) -> Option<usize> {
        self.choice_index.and_then(|i| usize::try_from(i).ok())
    }
}
