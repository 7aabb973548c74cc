/// Presentation: turns a node plus session state into the outward view.

use crate::core::config::EngineConfig;
use crate::core::variant::{self, SessionHash};
use crate::schema::node::StoryNode;
use crate::schema::session::SessionState;
use crate::schema::view::{ChoiceView, EndingArt, NodeView, ShareCard};

/// Category shown when an ending node carries no label.
const FALLBACK_CATEGORY: &str = "Adventure Complete";

/// Maps a prompt to an image URL. Implementations must be pure: no I/O,
/// no failure. The URL is never fetched or validated here.
pub trait ImageRenderer: Send + Sync {
    fn prompt_to_url(&self, prompt: &str) -> String;
}

/// Appends the URL-escaped prompt to a fixed base endpoint.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    base_url: String,
}

impl TemplateRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ImageRenderer for TemplateRenderer {
    fn prompt_to_url(&self, prompt: &str) -> String {
        format!("{}{}", self.base_url, quote(prompt))
    }
}

/// Percent-encode `input`, leaving ASCII alphanumerics, `-._~` and `/`.
pub fn quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Builds views for one engine. Holds no state of its own.
pub struct Presenter<'a> {
    pub start_node: &'a str,
    pub config: &'a EngineConfig,
    pub renderer: &'a dyn ImageRenderer,
}

impl<'a> Presenter<'a> {
    fn enhanced_prompt(&self, node: &StoryNode, state: &SessionState, hash: &SessionHash, token: u64) -> String {
        let styles = if state.profile().styles.is_empty() {
            &self.config.default_styles
        } else {
            &state.profile().styles
        };
        variant::enhance_prompt(&node.prompt, state.sentiment(), styles, Some(hash), token)
    }

    fn choices(&self, node: &StoryNode, state: &SessionState, hash: &SessionHash) -> Vec<ChoiceView> {
        node.choices
            .iter()
            .enumerate()
            .map(|(index, choice)| {
                // The first choice at the start node is never personalized.
                let text = if node.id == self.start_node && index == 0 {
                    choice.text.clone()
                } else {
                    variant::personalize_choice_text(&choice.text, index, &state.profile().traits, hash)
                };
                ChoiceView { index, text }
            })
            .collect()
    }

    /// The personalized view of `node` for `state`. `token` makes each
    /// rendered prompt unique per request.
    pub fn view(&self, node: &StoryNode, state: &SessionState, token: u64) -> NodeView {
        let hash = SessionHash::of(state.id());
        let image_prompt = self.enhanced_prompt(node, state, &hash, token);
        let image_url = self.renderer.prompt_to_url(&image_prompt);
        let image_seed = variant::dynamic_seed(node.seed, state.path(), Some(state.id()));

        let ending_art = node.is_end.then(|| {
            let category = node.ending_category.as_deref().unwrap_or(FALLBACK_CATEGORY);
            let retrospective_prompt = format!(
                "Manga style, 4-panel story summary of the '{}' ending with a score of {}, {}",
                category,
                state.score(),
                image_prompt
            );
            let cover_prompt = format!(
                "Fantasy book cover, hero's journey, '{}' ending, final score {}, {}",
                category,
                state.score(),
                image_prompt
            );
            EndingArt {
                retrospective_url: self.renderer.prompt_to_url(&retrospective_prompt),
                retrospective_prompt,
                cover_url: self.renderer.prompt_to_url(&cover_prompt),
                cover_prompt,
            }
        });

        NodeView {
            session_id: state.id().clone(),
            node_id: node.id.clone(),
            situation: node.situation.clone(),
            is_end: node.is_end,
            ending_category: node.ending_category.clone(),
            choices: self.choices(node, state, &hash),
            image_prompt,
            image_url,
            image_seed,
            score: state.score(),
            ending_art,
        }
    }

    /// A shareable summary, or `None` if `node` is not an ending.
    pub fn share_card(&self, node: &StoryNode, state: &SessionState, token: u64) -> Option<ShareCard> {
        if !node.is_end {
            return None;
        }
        let hash = SessionHash::of(state.id());
        let category = node
            .ending_category
            .clone()
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

        let tags = state.leading_tags(3);
        let personality = if tags.is_empty() {
            "an adventurer".to_string()
        } else {
            format!("a {} adventurer", tags.join(", "))
        };

        let prompt = format!(
            "Manga style, 4-panel comic strip telling the story of {} who achieved the '{}' ending with a score of {}, {}, clean white background with title '{}' and score displayed",
            personality,
            category,
            state.score(),
            self.enhanced_prompt(node, state, &hash, token),
            self.config.share_title
        );

        Some(ShareCard {
            image_url: self.renderer.prompt_to_url(&prompt),
            prompt,
            score: state.score(),
            ending_category: category,
        })
    }
}
