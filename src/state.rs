//! Application state: the wizard, the session usage meter, prompts, and the optional Gemini client.
//!
//! One wizard per process, shared by HTTP and WebSocket handlers. The usage meter sits beside it
//! (not inside it) so nothing the wizard does can reset the totals.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{load_course_config_from_env, Prompts};
use crate::error::{GenerationError, Stage};
use crate::gemini::Gemini;
use crate::usage::UsageMeter;
use crate::wizard::Wizard;

#[derive(Clone)]
pub struct AppState {
    pub wizard: Arc<RwLock<Wizard>>,
    pub usage: UsageMeter,
    pub gemini: Option<Gemini>,
    pub prompts: Prompts,
}

impl AppState {
    /// Build state from env: load prompt overrides, init the Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_course_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let gemini = Gemini::from_env();
        if let Some(g) = &gemini {
            info!(target: "course_wizard", base_url = %g.base_url, model = %g.model, "Gemini enabled.");
        } else {
            warn!(target: "course_wizard", "Gemini disabled (no GEMINI_API_KEY). Every generation step will fail until a key is set.");
        }

        Self::with_parts(gemini, prompts)
    }

    pub fn with_parts(gemini: Option<Gemini>, prompts: Prompts) -> Self {
        Self {
            wizard: Arc::new(RwLock::new(Wizard::new())),
            usage: UsageMeter::new(),
            gemini,
            prompts,
        }
    }

    /// The client, or a transport error for `stage` when no key was configured.
    pub fn gemini_for(&self, stage: Stage) -> Result<&Gemini, GenerationError> {
        self.gemini.as_ref().ok_or_else(|| GenerationError::Transport {
            stage,
            message: "GEMINI_API_KEY is not set".into(),
        })
    }
}
