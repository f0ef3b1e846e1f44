//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Course, GroundingSource, LessonVariation, PillarTopic};
use crate::error::ApiError;
use crate::render::ModuleView;
use crate::usage::TokenUsage;
use crate::wizard::{Step, Wizard};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetWizard,
    GetUsage,
    SubmitTopic {
        topic: String,
    },
    SelectPillar {
        #[serde(rename = "pillarId")]
        pillar_id: String,
    },
    SelectVariation {
        #[serde(rename = "variationId")]
        variation_id: String,
    },
    Back,
    Restart,
    GetModuleView,
    OpenModule {
        index: usize,
    },
    SelectAnswer {
        question: usize,
        option: usize,
    },
    CheckAnswer {
        question: usize,
    },
    ExportCourse,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Wizard {
        wizard: WizardOut,
    },
    Usage {
        usage: TokenUsage,
    },
    ModuleView {
        view: ModuleView,
    },
    Export {
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(rename = "archiveBase64")]
        archive_base64: String,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl From<&ApiError> for ServerWsMessage {
    fn from(e: &ApiError) -> Self {
        ServerWsMessage::Error { kind: e.kind().to_string(), message: e.user_message() }
    }
}

/// Full wizard snapshot used by both WS and HTTP.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardOut {
    pub step: Step,
    pub busy: bool,
    pub busy_message: Option<String>,
    pub topic: Option<String>,
    pub pillars: Vec<PillarTopic>,
    pub sources: Vec<GroundingSource>,
    pub selected_pillar: Option<PillarTopic>,
    pub variations: Vec<LessonVariation>,
    pub selected_variation: Option<LessonVariation>,
    pub course: Option<Course>,
    /// Active module of the course view, when on the course step.
    pub module: Option<ModuleView>,
    pub usage: TokenUsage,
}

/// Convert the internal wizard to the public snapshot.
pub fn to_out(w: &Wizard, usage: TokenUsage) -> WizardOut {
    WizardOut {
        step: w.step(),
        busy: w.busy().is_some(),
        busy_message: w.busy().map(str::to_string),
        topic: w.topic().map(str::to_string),
        pillars: w.pillars().to_vec(),
        sources: w.sources().to_vec(),
        selected_pillar: w.selected_pillar().map(|p| p.as_ref().clone()),
        variations: w.variations().to_vec(),
        selected_variation: w.selected_variation().map(|v| v.as_ref().clone()),
        course: w.course().map(|s| s.course.as_ref().clone()),
        module: w.course().map(|s| s.view()),
        usage,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct TopicIn {
    pub topic: String,
}

#[derive(Debug, Deserialize)]
pub struct PillarIn {
    #[serde(rename = "pillarId")]
    pub pillar_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VariationIn {
    #[serde(rename = "variationId")]
    pub variation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ModuleIn {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SelectAnswerIn {
    pub question: usize,
    pub option: usize,
}

#[derive(Debug, Deserialize)]
pub struct CheckAnswerIn {
    pub question: usize,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: ErrorBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub generation_enabled: bool,
}
