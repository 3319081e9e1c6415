//! Dual-renderer loader: the per-URI state machine.
//!
//! ```text
//! Idle ──begin──▶ LoadingPrimary ──load_end──▶ Loaded
//!                      │
//!                    error
//!                      ▼
//!                LoadingSecondary ──load_end──▶ Loaded
//!                      │
//!                    error
//!                      ▼
//!                 ErrorTerminal
//! ```
//!
//! Both loading states use the *same* URI; only the renderer changes. Choosing
//! a different URI is the degradation chain's job. Every load is issued with a
//! [`LoadTicket`]; completions carrying a ticket from a superseded generation
//! or renderer are ignored, which is how an unmounted or re-keyed surface
//! drops late callbacks.

use tracing::debug;

use crate::cache::tier::Tier;
use crate::render::RendererKind;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoaderState {
    #[default]
    Idle,
    LoadingPrimary { uri: String, tier: Option<Tier> },
    LoadingSecondary { uri: String, tier: Option<Tier> },
    Loaded { uri: String, tier: Option<Tier>, renderer: RendererKind },
    ErrorTerminal { uri: String, tier: Option<Tier> },
}

impl LoaderState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoaderState::LoadingPrimary { .. } | LoaderState::LoadingSecondary { .. })
    }

    /// `Loaded` or `ErrorTerminal`.
    pub fn is_settled(&self) -> bool {
        matches!(self, LoaderState::Loaded { .. } | LoaderState::ErrorTerminal { .. })
    }

    /// Renderer currently responsible for the in-flight load.
    pub fn active_renderer(&self) -> Option<RendererKind> {
        match self {
            LoaderState::LoadingPrimary { .. } => Some(RendererKind::Rich),
            LoaderState::LoadingSecondary { .. } => Some(RendererKind::Baseline),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            LoaderState::Idle => None,
            LoaderState::LoadingPrimary { uri, .. }
            | LoaderState::LoadingSecondary { uri, .. }
            | LoaderState::Loaded { uri, .. }
            | LoaderState::ErrorTerminal { uri, .. } => Some(uri),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoaderState::Idle => "idle",
            LoaderState::LoadingPrimary { .. } => "loading_primary",
            LoaderState::LoadingSecondary { .. } => "loading_secondary",
            LoaderState::Loaded { .. } => "loaded",
            LoaderState::ErrorTerminal { .. } => "error_terminal",
        }
    }
}

/// Identifies one issued load. Only the most recent ticket is honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    renderer: RendererKind,
    uri: String,
}

impl LoadTicket {
    pub fn renderer(&self) -> RendererKind {
        self.renderer
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of feeding a completion into the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Stale or unexpected completion; state unchanged.
    Ignored,
    /// Primary failed; load the same URI with the secondary renderer.
    Fallback(LoadTicket),
    /// The URI rendered.
    Loaded,
    /// Both renderers failed for this URI.
    Failed,
}

#[derive(Debug, Default)]
pub struct DualRendererImageLoader {
    state: LoaderState,
    generation: u64,
}

impl DualRendererImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoaderState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start loading `uri` with the primary renderer.
    ///
    /// Only valid from `Idle`; an empty URI leaves the loader idle.
    pub fn begin(&mut self, uri: &str, tier: Option<Tier>) -> Option<LoadTicket> {
        if uri.is_empty() || self.state != LoaderState::Idle {
            return None;
        }
        self.state = LoaderState::LoadingPrimary {
            uri: uri.to_string(),
            tier,
        };
        debug!(uri, generation = self.generation, "Loader: idle -> loading_primary");
        Some(self.ticket(RendererKind::Rich, uri))
    }

    fn ticket(&self, renderer: RendererKind, uri: &str) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
            renderer,
            uri: uri.to_string(),
        }
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation
            && self.state.active_renderer() == Some(ticket.renderer)
            && self.state.uri() == Some(ticket.uri.as_str())
    }

    /// A renderer reported a successful load.
    pub fn on_load_end(&mut self, ticket: &LoadTicket) -> Transition {
        if !self.is_current(ticket) {
            return Transition::Ignored;
        }
        let state = std::mem::take(&mut self.state);
        let (uri, tier) = match state {
            LoaderState::LoadingPrimary { uri, tier } | LoaderState::LoadingSecondary { uri, tier } => (uri, tier),
            other => {
                self.state = other;
                return Transition::Ignored;
            }
        };
        debug!(uri = %uri, renderer = %ticket.renderer, "Loader: -> loaded");
        self.state = LoaderState::Loaded {
            uri,
            tier,
            renderer: ticket.renderer,
        };
        Transition::Loaded
    }

    /// A renderer reported an error.
    pub fn on_error(&mut self, ticket: &LoadTicket) -> Transition {
        if !self.is_current(ticket) {
            return Transition::Ignored;
        }
        match std::mem::take(&mut self.state) {
            LoaderState::LoadingPrimary { uri, tier } => {
                debug!(uri = %uri, "Loader: loading_primary -> loading_secondary");
                let next = self.ticket(RendererKind::Baseline, &uri);
                self.state = LoaderState::LoadingSecondary { uri, tier };
                Transition::Fallback(next)
            }
            LoaderState::LoadingSecondary { uri, tier } => {
                debug!(uri = %uri, "Loader: loading_secondary -> error_terminal");
                self.state = LoaderState::ErrorTerminal { uri, tier };
                Transition::Failed
            }
            other => {
                self.state = other;
                Transition::Ignored
            }
        }
    }

    /// Drop the current URI (identity change or next candidate). Outstanding
    /// tickets become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = LoaderState::Idle;
    }

    /// Whether a loading indicator should be visible.
    pub fn show_loader(&self, enabled: bool) -> bool {
        enabled && self.state.is_loading()
    }
}
