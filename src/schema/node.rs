use serde::{Deserialize, Serialize};

/// Where a choice leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A concrete node id.
    Goto(String),
    /// Resolve an ending from the accumulated score and sentiment.
    CalculateEnd,
}

impl Target {
    /// The concrete node id, if this target names one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Goto(id) => Some(id),
            Self::CalculateEnd => None,
        }
    }
}

/// A single option presented at a node. Choices are addressed by their
/// position in the owning node's choice list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub next: Target,
    /// Added to the session score when the choice is taken. May be negative.
    #[serde(default)]
    pub score: i64,
    /// Behavioral tag counted in the sentiment tally.
    #[serde(default)]
    pub tag: Option<String>,
}

/// An authored story node. Immutable once the graph is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: String,
    pub situation: String,
    /// Base illustration prompt before personalization.
    pub prompt: String,
    /// Base numeric seed fed into the dynamic seed derivation.
    pub seed: u64,
    pub choices: Vec<Choice>,
    pub is_end: bool,
    pub ending_category: Option<String>,
}

impl StoryNode {
    /// Returns the choice at `index`, if any.
    pub fn choice(&self, index: usize) -> Option<&Choice> {
        self.choices.get(index)
    }
}

/// Coarse ending classification computed from score and sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Good,
    Neutral,
    Bad,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Good, Outcome::Neutral, Outcome::Bad];

    /// Lowercase name, as used in story files and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Neutral => "neutral",
            Self::Bad => "bad",
        }
    }
}

/// Ordered lists of specific ending node ids per outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingPools {
    pub good: Vec<String>,
    pub neutral: Vec<String>,
    pub bad: Vec<String>,
}

impl EndingPools {
    pub fn pool(&self, outcome: Outcome) -> &[String] {
        match outcome {
            Outcome::Good => &self.good,
            Outcome::Neutral => &self.neutral,
            Outcome::Bad => &self.bad,
        }
    }
}
