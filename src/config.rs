//! Service configuration: Gemini connection settings from the environment and
//! prompt templates from an optional TOML file.
//!
//! TOML schema (every key optional):
//!
//! ```toml
//! [prompts]
//! pillars_template = "... {topic} ..."
//! variations_template = "... {pillar_title} ... {pillar_description} ..."
//! course_template = "... {title} ... {objective} ... {difficulty} ..."
//! ```

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CourseConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt templates for the three generation calls. Placeholders use `{name}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Free-text pillar request with web search. Placeholders: `{topic}`, `{count}`.
  pub pillars_template: String,
  /// Schema-constrained variations request. Placeholders: `{pillar_title}`, `{pillar_description}`, `{count}`.
  pub variations_template: String,
  /// Schema-constrained course request. Placeholders: `{title}`, `{objective}`, `{difficulty}`.
  pub course_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      pillars_template: r#"Act as an expert mentor in online course creation.
The user wants to build a course about: "{topic}".
Use Google Search to find current trends, popular subtopics and market needs related to this subject.

Generate {count} distinct, relevant "Pillar Topics" that could anchor a broad content strategy.

Return the answer STRICTLY in the following JSON format inside a code block:
```json
[
  {
    "id": "1",
    "title": "Pillar title",
    "description": "Short description of what this pillar covers."
  }
]
```"#
        .into(),
      variations_template: r#"As an expert mentor: the user selected the Pillar Topic "{pillar_title}" ({pillar_description}).
Generate {count} specific, engaging "Lesson Variations" for this pillar.
They must cover different angles (e.g. practical, theoretical, case study, step by step, common mistakes)."#
        .into(),
      course_template: r#"Create a COMPLETE, DETAILED course for the lesson: "{title}".
Objective: "{objective}".
Difficulty: "{difficulty}".

The course must be structured in 4-6 modules.
Each module must have:
1. A clear title.
2. Extensive educational content in Markdown (use bold, lists, subheadings). The tone is a friendly but expert mentor.
3. One ENGLISH keyword to look up a representative image (e.g. "computer", "meeting", "code").
4. A 2-question multiple-choice quiz to check understanding.
5. OPTIONAL: if the content is better explained with data, include a simple chart (chartData) with 3-5 data points.

Also pick an overall color theme for the course."#
        .into(),
    }
  }
}

/// Connection settings for the Gemini API.
#[derive(Clone, Debug)]
pub struct GeminiSettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl GeminiSettings {
  /// Read GEMINI_API_KEY (or API_KEY), GEMINI_BASE_URL and GEMINI_MODEL. None without a key.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY")
      .or_else(|_| std::env::var("API_KEY"))
      .ok()
      .map(|k| k.trim().to_string())
      .filter(|k| !k.is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
    Some(Self { api_key, base_url: base_url.trim_end_matches('/').to_string(), model })
  }
}

/// Attempt to load `CourseConfig` from COURSE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_course_config_from_env() -> Option<CourseConfig> {
  let path = std::env::var("COURSE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<CourseConfig>(&s) {
      Ok(cfg) => {
        info!(target: "course_wizard", %path, "Loaded course config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "course_wizard", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "course_wizard", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
