/// Traversal engine: applies choices to session state and resolves endings.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::graph::StoryGraph;
use crate::core::variant::SessionHash;
use crate::schema::node::{Outcome, StoryNode, Target};
use crate::schema::session::{ChoiceRecord, SessionState};

/// Tags that count toward a good ending.
pub const POSITIVE_TAGS: [&str; 5] = ["kind", "adventurous", "bold", "wise", "resourceful"];
/// Tags that count toward a bad ending.
pub const NEGATIVE_TAGS: [&str; 3] = ["selfish", "cautious", "stubborn"];
/// Minimum score for a good ending.
pub const GOOD_SCORE: i64 = 5;

#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("invalid choice {index} at '{node}' ({available} available)")]
    InvalidChoice {
        node: String,
        index: usize,
        available: usize,
    },
    #[error("session is at unknown node '{0}'")]
    InvalidState(String),
    #[error("node not found: {0}")]
    NotFound(String),
}

/// The committed effect of one choice.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub choice_index: usize,
    pub score_delta: i64,
    pub tag: Option<String>,
    /// Set when the choice resolved a calculated ending.
    pub outcome: Option<Outcome>,
}

fn tag_sum(sentiment: &FxHashMap<String, u32>, tags: &[&str]) -> u32 {
    tags.iter()
        .map(|t| sentiment.get(*t).copied().unwrap_or(0))
        .sum()
}

/// Classify an ending from score and sentiment.
///
/// Good needs `score >= 5` and positive tags outnumbering negative ones.
/// Otherwise a non-positive score or negative majority is bad. Anything
/// else is neutral.
pub fn classify(score: i64, sentiment: &FxHashMap<String, u32>) -> Outcome {
    let positive = tag_sum(sentiment, &POSITIVE_TAGS);
    let negative = tag_sum(sentiment, &NEGATIVE_TAGS);

    if score >= GOOD_SCORE && positive > negative {
        Outcome::Good
    } else if score <= 0 || negative > positive {
        Outcome::Bad
    } else {
        Outcome::Neutral
    }
}

/// Pick the specific ending for `outcome`: `hash mod len` over the pool.
pub fn resolve_ending<'g>(
    graph: &'g StoryGraph,
    outcome: Outcome,
    hash: &SessionHash,
) -> Result<&'g StoryNode, TraversalError> {
    let pool = graph.endings().pool(outcome);
    if pool.is_empty() {
        return Err(TraversalError::NotFound(format!(
            "{} ending pool is empty",
            outcome.name()
        )));
    }
    let id = &pool[hash.rem(pool.len() as u64) as usize];
    graph
        .get(id)
        .ok_or_else(|| TraversalError::NotFound(id.clone()))
}

/// Apply choice `choice_index` at the session's current node.
///
/// On error the state is left untouched.
pub fn apply_choice(
    graph: &StoryGraph,
    state: &mut SessionState,
    choice_index: usize,
) -> Result<Transition, TraversalError> {
    let node = graph
        .get(state.current_node())
        .ok_or_else(|| TraversalError::InvalidState(state.current_node().to_string()))?;

    let choice = node
        .choice(choice_index)
        .ok_or_else(|| TraversalError::InvalidChoice {
            node: node.id.clone(),
            index: choice_index,
            available: node.choices.len(),
        })?;

    let (to, outcome) = match &choice.next {
        Target::Goto(id) => {
            let next = graph
                .get(id)
                .ok_or_else(|| TraversalError::NotFound(id.clone()))?;
            (next.id.clone(), None)
        }
        Target::CalculateEnd => {
            let outcome = classify(state.score(), state.sentiment());
            let ending = resolve_ending(graph, outcome, &SessionHash::of(state.id()))?;
            info!(
                session = %state.id(),
                outcome = outcome.name(),
                ending = %ending.id,
                score = state.score(),
                "Resolved ending"
            );
            (ending.id.clone(), Some(outcome))
        }
    };

    let record = ChoiceRecord {
        from_node: node.id.clone(),
        choice_index,
        text: choice.text.clone(),
        tag: choice.tag.clone(),
    };
    state.advance(&to, choice.score, record);

    debug!(
        session = %state.id(),
        from = %node.id,
        to = %to,
        score = state.score(),
        "Applied choice"
    );

    Ok(Transition {
        from: node.id.clone(),
        to,
        choice_index,
        score_delta: choice.score,
        tag: choice.tag.clone(),
        outcome,
    })
}
