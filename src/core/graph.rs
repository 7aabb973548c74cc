/// Story graph: authored nodes, loading from RON, lookup, and validation.

use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use thiserror::Error;

use crate::schema::node::{Choice, EndingPools, Outcome, StoryNode, Target};

/// The built-in Mystic Forest story.
const MYSTIC_FOREST: &str = include_str!("../../story_data/mystic_forest.ron");

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("invalid story graph: {0}")]
    Invalid(String),
}

// The file format keys nodes by id; the id moves into `StoryNode` on load.

#[derive(Debug, Deserialize)]
struct RonNode {
    situation: String,
    prompt: String,
    seed: u64,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    is_end: bool,
    #[serde(default)]
    ending_category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Story")]
struct RonStory {
    start: String,
    nodes: HashMap<String, RonNode>,
    #[serde(default)]
    endings: EndingPools,
}

/// Immutable, shareable story graph.
#[derive(Debug, Clone)]
pub struct StoryGraph {
    start: String,
    nodes: HashMap<String, StoryNode>,
    endings: EndingPools,
}

impl StoryGraph {
    /// The story shipped with the crate.
    pub fn mystic_forest() -> Result<StoryGraph, GraphError> {
        Self::parse_ron(MYSTIC_FOREST)
    }

    /// Load and validate a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<StoryGraph, GraphError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<StoryGraph, GraphError> {
        let graph = Self::parse_ron_unchecked(input)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Parse without structural validation. Used by the linter so it can
    /// report every problem instead of stopping at the first.
    pub fn parse_ron_unchecked(input: &str) -> Result<StoryGraph, GraphError> {
        let raw: RonStory = ron::from_str(input)?;
        let nodes = raw
            .nodes
            .into_iter()
            .map(|(id, node)| {
                let story_node = StoryNode {
                    id: id.clone(),
                    situation: node.situation,
                    prompt: node.prompt,
                    seed: node.seed,
                    choices: node.choices,
                    is_end: node.is_end,
                    ending_category: node.ending_category,
                };
                (id, story_node)
            })
            .collect();

        Ok(StoryGraph {
            start: raw.start,
            nodes,
            endings: raw.endings,
        })
    }

    /// Build and validate a graph from in-memory nodes.
    pub fn from_nodes(
        start: &str,
        nodes: Vec<StoryNode>,
        endings: EndingPools,
    ) -> Result<StoryGraph, GraphError> {
        let graph = StoryGraph {
            start: start.to_string(),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            endings,
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn endings(&self) -> &EndingPools {
        &self.endings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    /// Look up a node, failing with `NotFound` for unknown ids.
    pub fn lookup(&self, id: &str) -> Result<&StoryNode, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> Vec<&StoryNode> {
        let mut nodes: Vec<&StoryNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Structural problems, in a stable order. Empty for a valid graph.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.nodes.contains_key(&self.start) {
            problems.push(format!("start node '{}' does not exist", self.start));
        }

        for node in self.nodes() {
            if node.is_end && !node.choices.is_empty() {
                problems.push(format!(
                    "end node '{}' has {} choices (expected none)",
                    node.id,
                    node.choices.len()
                ));
            }
            if !node.is_end && node.choices.is_empty() {
                problems.push(format!("node '{}' is not an ending but has no choices", node.id));
            }
            for (i, choice) in node.choices.iter().enumerate() {
                if let Target::Goto(target) = &choice.next {
                    if !self.nodes.contains_key(target) {
                        problems.push(format!(
                            "choice {} of '{}' leads to unknown node '{}'",
                            i, node.id, target
                        ));
                    }
                }
            }
        }

        let uses_calculated_end = self
            .nodes
            .values()
            .flat_map(|n| n.choices.iter())
            .any(|c| c.next == Target::CalculateEnd);

        for outcome in Outcome::ALL {
            let pool = self.endings.pool(outcome);
            if pool.is_empty() && uses_calculated_end {
                problems.push(format!("ending pool '{}' is empty", outcome.name()));
            }
            for id in pool {
                match self.nodes.get(id) {
                    None => problems.push(format!(
                        "ending pool '{}' references unknown node '{}'",
                        outcome.name(),
                        id
                    )),
                    Some(node) if !node.is_end => problems.push(format!(
                        "ending pool '{}' references non-ending node '{}'",
                        outcome.name(),
                        id
                    )),
                    Some(_) => {}
                }
            }
        }

        problems
    }

    /// Fail with `Invalid` if the graph has any structural problem.
    pub fn validate(&self) -> Result<(), GraphError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Invalid(problems.join("; ")))
        }
    }

    /// Node ids reachable from the start node. `CalculateEnd` reaches every
    /// node in every ending pool.
    pub fn reachable(&self) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some((id, _)) = self.nodes.get_key_value(&self.start) {
            seen.insert(id.as_str());
            queue.push_back(id.as_str());
        }

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for choice in &node.choices {
                let next: Vec<&str> = match &choice.next {
                    Target::Goto(target) => vec![target.as_str()],
                    Target::CalculateEnd => Outcome::ALL
                        .iter()
                        .flat_map(|o| self.endings.pool(*o).iter().map(String::as_str))
                        .collect(),
                };
                for target in next {
                    if let Some((key, _)) = self.nodes.get_key_value(target) {
                        if seen.insert(key.as_str()) {
                            queue.push_back(key.as_str());
                        }
                    }
                }
            }
        }

        seen
    }
}
