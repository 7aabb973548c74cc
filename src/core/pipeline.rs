/// The story pipeline: session request → personalized view.
///
/// Wires together the story graph, session store, traversal engine and
/// presentation assembler behind a small set of request-level operations.
/// Every read and mutation of a session happens under that session's lock,
/// so the view returned by an operation always reflects the state that
/// operation produced.

use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::graph::{GraphError, StoryGraph};
use crate::core::present::{ImageRenderer, Presenter, TemplateRenderer};
use crate::core::store::{SessionStore, StoreError};
use crate::core::traversal::{self, TraversalError};
use crate::schema::node::StoryNode;
use crate::schema::session::{SessionId, SessionProfile, SessionState};
use crate::schema::view::{ChoiceRequest, NodeView, ShareCard};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("story graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("traversal error: {0}")]
    Traversal(#[from] TraversalError),
    #[error("session error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("choice index missing or negative")]
    MissingChoice,
    #[error("session '{0}' has not reached an ending")]
    NotEnded(SessionId),
}

/// The top-level story engine. Built via `StoryEngine::builder()`.
///
/// Shareable across threads; requests for different sessions never
/// contend, requests for the same session are queued.
///
/// Expiry is only checked when a session is touched. Sessions that are never
/// revisited stay in memory until the host calls `evict_expired`, so a
/// long-running transport must call it periodically.
pub struct StoryEngine {
    graph: StoryGraph,
    store: SessionStore,
    config: EngineConfig,
    renderer: Box<dyn ImageRenderer>,
}

/// Builder for constructing a `StoryEngine`.
#[derive(Default)]
pub struct StoryEngineBuilder {
    story_path: Option<String>,
    config_path: Option<String>,
    /// Directly provided graph (for testing without files).
    graph: Option<StoryGraph>,
    /// Directly provided config (for testing without files).
    config: Option<EngineConfig>,
    renderer: Option<Box<dyn ImageRenderer>>,
}

fn current_node<'g>(graph: &'g StoryGraph, state: &SessionState) -> Result<&'g StoryNode, TraversalError> {
    graph
        .get(state.current_node())
        .ok_or_else(|| TraversalError::InvalidState(state.current_node().to_string()))
}

impl StoryEngine {
    pub fn builder() -> StoryEngineBuilder {
        StoryEngineBuilder::default()
    }

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    fn presenter(&self) -> Presenter<'_> {
        Presenter {
            start_node: self.graph.start(),
            config: &self.config,
            renderer: &*self.renderer,
        }
    }

    fn render(&self, state: &SessionState, token: u64) -> Result<NodeView, TraversalError> {
        let node = current_node(&self.graph, state)?;
        Ok(self.presenter().view(node, state, token))
    }

    fn start_session(&self, id: SessionId, now: DateTime<Utc>, token: u64) -> Result<NodeView, PipelineError> {
        let state = self.store.create(id, self.graph.start(), now);
        Ok(self.render(&state, token)?)
    }

    /// Return the session's current view, creating the session on first
    /// contact. With no id a fresh one is generated.
    #[instrument(skip_all, fields(session = ?id))]
    pub fn open(&self, id: Option<&SessionId>, token: u64) -> Result<NodeView, PipelineError> {
        let now = Utc::now();
        let Some(id) = id else {
            return self.start_session(SessionId::generate(), now, token);
        };
        let view = self
            .store
            .get_or_create(id, self.graph.start(), now, |state| self.render(state, token))?;
        Ok(view)
    }

    /// The strict form of `open`: an unknown or expired id is an error.
    #[instrument(skip_all, fields(session = %id))]
    pub fn view(&self, id: &SessionId, token: u64) -> Result<NodeView, PipelineError> {
        let view = self
            .store
            .with_session(id, Utc::now(), |state| self.render(state, token))
            .inspect_err(|e| warn!(error = %e, "Rejected view"))??;
        Ok(view)
    }

    /// Apply choice `index` at the session's current node and return the
    /// resulting view. On error the session is unchanged.
    #[instrument(skip_all, fields(session = %id, index = index))]
    pub fn choose(&self, id: &SessionId, index: usize, token: u64) -> Result<NodeView, PipelineError> {
        let result = self.store.with_session(id, Utc::now(), |state| -> Result<NodeView, TraversalError> {
            traversal::apply_choice(&self.graph, state, index)?;
            self.render(state, token)
        });
        match result {
            Ok(Ok(view)) => Ok(view),
            Ok(Err(e)) => {
                warn!(error = %e, "Rejected choice");
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Rejected choice");
                Err(e.into())
            }
        }
    }

    /// `choose` driven by a deserialized request body.
    pub fn submit(&self, id: &SessionId, request: &ChoiceRequest, token: u64) -> Result<NodeView, PipelineError> {
        let Some(index) = request.index() else {
            warn!(session = %id, requested = ?request.choice_index, "Rejected choice request");
            return Err(PipelineError::MissingChoice);
        };
        self.choose(id, index, token)
    }

    /// Replace the session wholesale with a fresh one at the start node and
    /// a newly drawn profile. With no id a fresh one is generated.
    #[instrument(skip_all, fields(session = ?id))]
    pub fn reset(&self, id: Option<&SessionId>, token: u64) -> Result<NodeView, PipelineError> {
        let id = id.cloned().unwrap_or_else(SessionId::generate);
        info!(session = %id, "Resetting session");
        self.start_session(id, Utc::now(), token)
    }

    /// As `reset`, with a caller-chosen profile.
    pub fn reset_with_profile(
        &self,
        id: &SessionId,
        profile: SessionProfile,
        token: u64,
    ) -> Result<NodeView, PipelineError> {
        let state = self
            .store
            .create_with_profile(id.clone(), self.graph.start(), profile, Utc::now());
        Ok(self.render(&state, token)?)
    }

    /// A shareable summary of a finished session.
    #[instrument(skip_all, fields(session = %id))]
    pub fn share_card(&self, id: &SessionId, token: u64) -> Result<ShareCard, PipelineError> {
        self.store.with_session(id, Utc::now(), |state| -> Result<ShareCard, PipelineError> {
            let node = current_node(&self.graph, state)?;
            self.presenter()
                .share_card(node, state, token)
                .ok_or_else(|| PipelineError::NotEnded(id.clone()))
        })?
    }

    /// A copy of the session's state (path, score, tallies, history).
    pub fn session(&self, id: &SessionId) -> Result<SessionState, PipelineError> {
        Ok(self.store.snapshot(id, Utc::now())?)
    }

    /// Drop sessions idle longer than the configured TTL and return how
    /// many were removed. Nothing calls this automatically.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.store.evict_expired(now)
    }
}

impl StoryEngineBuilder {
    pub fn story_path(mut self, path: &str) -> Self {
        self.story_path = Some(path.to_string());
        self
    }

    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Provide a graph directly (for testing without files).
    pub fn with_graph(mut self, graph: StoryGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Provide a config directly (for testing without files).
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default URL-template renderer.
    pub fn with_renderer(mut self, renderer: impl ImageRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Resolve the story and config sources and validate the graph.
    /// Without a graph or story path the built-in story is used.
    pub fn build(self) -> Result<StoryEngine, PipelineError> {
        let graph = match (self.graph, self.story_path) {
            (Some(graph), _) => graph,
            (None, Some(path)) => StoryGraph::load_from_ron(Path::new(&path))?,
            (None, None) => StoryGraph::mystic_forest()?,
        };
        graph.validate()?;

        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(Path::new(&path))?,
            (None, None) => EngineConfig::default(),
        };

        let renderer = self
            .renderer
            .unwrap_or_else(|| Box::new(TemplateRenderer::new(config.image_base_url.clone())));

        info!(
            start = graph.start(),
            nodes = graph.len(),
            ttl_secs = config.session_ttl_secs,
            "Built story engine"
        );

        Ok(StoryEngine {
            store: SessionStore::new(config.session_ttl()),
            graph,
            config,
            renderer,
        })
    }
}
