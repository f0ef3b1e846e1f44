//! Error taxonomy: generation (transport vs format), export, and wizard command errors.

use thiserror::Error;

/// Which generation call failed. Drives the user-facing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
  Pillars,
  Variations,
  Course,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Pillars => "pillars",
      Stage::Variations => "variations",
      Stage::Course => "course",
    }
  }

  /// Generic retry prompt shown to the user. Transport and format failures read the same.
  pub fn user_message(self) -> &'static str {
    match self {
      Stage::Pillars => "Error generating pillar topics. Please try again.",
      Stage::Variations => "Error generating lesson variations. Please try again.",
      Stage::Course => "Error creating the course. Please try again.",
    }
  }
}

#[derive(Debug, Error)]
pub enum GenerationError {
  /// The call never produced a usable HTTP response (network, auth, quota, missing key).
  #[error("{stage:?} request failed: {message}")]
  Transport { stage: Stage, message: String },

  /// The service answered but the body did not match the expected structure.
  #[error("{stage:?} response had an unexpected format: {detail}")]
  Format { stage: Stage, detail: String },
}

impl GenerationError {
  pub fn stage(&self) -> Stage {
    match self {
      GenerationError::Transport { stage, .. } | GenerationError::Format { stage, .. } => *stage,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      GenerationError::Transport { .. } => "transport",
      GenerationError::Format { .. } => "format",
    }
  }

  pub fn is_format(&self) -> bool {
    matches!(self, GenerationError::Format { .. })
  }
}

#[derive(Debug, Error)]
pub enum ExportError {
  #[error("archive construction failed: {0}")]
  Archive(#[from] zip::result::ZipError),
  #[error("archive write failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("course data could not be embedded: {0}")]
  Embed(#[from] serde_json::Error),
  #[error("course cannot be exported: {0}")]
  InvalidCourse(String),
}

/// Commands rejected by the wizard without touching its state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
  #[error("a generation request is already in progress")]
  Busy,
  #[error("this action is not available on the {actual} step")]
  WrongStep { actual: &'static str },
  #[error("topic must not be empty")]
  EmptyTopic,
  #[error("unknown pillar id: {0}")]
  UnknownPillar(String),
  #[error("unknown variation id: {0}")]
  UnknownVariation(String),
  #[error("already at the first step")]
  NothingToGoBackTo,
  #[error("no course has been generated yet")]
  NoCourse,
  #[error("module index {0} is out of range")]
  UnknownModule(usize),
  #[error("question index {0} is out of range")]
  UnknownQuestion(usize),
  #[error("option index {0} is out of range")]
  UnknownOption(usize),
}

/// Anything a wizard/course command can fail with, as seen by HTTP and WebSocket callers.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Wizard(#[from] WizardError),
  #[error(transparent)]
  Generation(#[from] GenerationError),
  #[error(transparent)]
  Export(#[from] ExportError),
}

impl ApiError {
  /// Machine-readable category.
  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::Generation(e) => e.kind(),
      ApiError::Export(_) => "export",
      ApiError::Wizard(e) => match e {
        WizardError::Busy => "busy",
        WizardError::WrongStep { .. } | WizardError::NothingToGoBackTo => "wrong_step",
        WizardError::NoCourse => "no_course",
        WizardError::UnknownPillar(_) | WizardError::UnknownVariation(_) => "not_found",
        WizardError::EmptyTopic
        | WizardError::UnknownModule(_)
        | WizardError::UnknownQuestion(_)
        | WizardError::UnknownOption(_) => "invalid_input",
      },
    }
  }

  /// What the user gets to read. Generation failures stay generic.
  pub fn user_message(&self) -> String {
    match self {
      ApiError::Generation(e) => e.stage().user_message().to_string(),
      ApiError::Export(_) => "There was an error preparing the download.".to_string(),
      ApiError::Wizard(e) => e.to_string(),
    }
  }
}
