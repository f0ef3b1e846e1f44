//! Minimal Gemini client for the three wizard calls.
//!
//! We only call `models/{model}:generateContent`. The pillar call enables the Google Search tool and
//! gets free text back (search grounding and response schemas cannot be combined), so its JSON is
//! dug out of a fenced block or the raw text. The variation and course calls send a strict
//! `responseSchema` and parse the reply as raw JSON.
//!
//! Calls are instrumented and log model, latency, response size and usage (not contents).
//! NOTE: We never log the API key; raw model text is logged only truncated, on parse failures.

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::config::{GeminiSettings, Prompts};
use crate::domain::{
  ensure_unique_ids, validate_course, validate_pillars, validate_variations, Course, Difficulty,
  GroundingSource, LessonVariation, PillarBatch, PillarTopic, ThemeColor, BATCH_SIZE,
};
use crate::error::{GenerationError, Stage};
use crate::usage::TokenUsage;
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY (or API_KEY); otherwise return None.
  pub fn from_env() -> Option<Self> {
    let settings = GeminiSettings::from_env()?;
    match Self::new(settings) {
      Ok(g) => Some(g),
      Err(e) => {
        error!(target: "generation", error = %e, "Failed to build HTTP client");
        None
      }
    }
  }

  /// No request timeout: course generation routinely takes close to a minute.
  pub fn new(settings: GeminiSettings) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent("course-wizard-backend/0.1")
      .build()?;
    Ok(Self {
      client,
      api_key: settings.api_key,
      base_url: settings.base_url,
      model: settings.model,
    })
  }

  fn endpoint(&self) -> String {
    format!("{}/models/{}:generateContent", self.base_url, self.model)
  }

  /// One `generateContent` round trip. Non-2xx and undecodable envelopes are transport errors.
  #[instrument(level = "info", skip(self, req), fields(model = %self.model, stage = stage.as_str()))]
  async fn generate_content(
    &self,
    stage: Stage,
    req: &GenerateContentRequest,
  ) -> Result<GenerateContentResponse, GenerationError> {
    let transport = |message: String| GenerationError::Transport { stage, message };
    let start = Instant::now();

    let res = self
      .client
      .post(self.endpoint())
      .header("x-goog-api-key", &self.api_key)
      .json(req)
      .send()
      .await
      .map_err(|e| transport(e.to_string()))?;

    let status = res.status();
    let body = res.text().await.map_err(|e| transport(e.to_string()))?;
    let elapsed = start.elapsed();

    if !status.is_success() {
      let msg = extract_api_error(&body).unwrap_or(body);
      error!(?elapsed, %status, "Gemini call rejected");
      return Err(transport(format!("Gemini HTTP {}: {}", status, msg)));
    }

    info!(?elapsed, response_bytes = body.len(), "Gemini response received");
    serde_json::from_str::<GenerateContentResponse>(&body)
      .map_err(|e| transport(format!("undecodable Gemini envelope: {}", e)))
  }

  // --- Wizard calls ---

  /// Ten pillar topics for `topic`, plus whatever citations search grounding attached.
  #[instrument(level = "info", skip(self, prompts, on_usage), fields(topic_len = topic.len()))]
  pub async fn generate_pillars(
    &self,
    prompts: &Prompts,
    topic: &str,
    on_usage: impl FnOnce(TokenUsage),
  ) -> Result<PillarBatch, GenerationError> {
    let count = BATCH_SIZE.to_string();
    let prompt = fill_template(&prompts.pillars_template, &[("topic", topic), ("count", &count)]);
    let req = GenerateContentRequest {
      contents: vec![Content::user(prompt)],
      tools: vec![Tool { google_search: GoogleSearch {} }],
      generation_config: None,
    };

    let res = self.generate_content(Stage::Pillars, &req).await?;
    let text = res.text();

    let mut pillars = parse_pillar_reply(&text).map_err(|detail| {
      warn!(target: "generation", reply = %trunc_for_log(&text, 300), "Pillar reply did not parse");
      GenerationError::Format { stage: Stage::Pillars, detail }
    })?;
    ensure_unique_ids(&mut pillars);
    validate_pillars(&pillars)
      .map_err(|detail| GenerationError::Format { stage: Stage::Pillars, detail })?;

    let sources = res.grounding_sources();
    res.report_usage(on_usage);
    info!(pillars = pillars.len(), sources = sources.len(), "Pillar topics generated");
    Ok(PillarBatch { pillars, sources })
  }

  /// Ten lesson variations for the selected pillar (schema-constrained).
  #[instrument(level = "info", skip(self, prompts, pillar, on_usage), fields(pillar_id = %pillar.id))]
  pub async fn generate_variations(
    &self,
    prompts: &Prompts,
    pillar: &PillarTopic,
    on_usage: impl FnOnce(TokenUsage),
  ) -> Result<Vec<LessonVariation>, GenerationError> {
    let count = BATCH_SIZE.to_string();
    let prompt = fill_template(
      &prompts.variations_template,
      &[
        ("pillar_title", &pillar.title),
        ("pillar_description", &pillar.description),
        ("count", &count),
      ],
    );
    let req = GenerateContentRequest::with_schema(prompt, variations_schema());

    let res = self.generate_content(Stage::Variations, &req).await?;
    let mut variations: Vec<LessonVariation> = parse_contract(Stage::Variations, &res.text())?;
    ensure_unique_ids(&mut variations);
    validate_variations(&variations)
      .map_err(|detail| GenerationError::Format { stage: Stage::Variations, detail })?;

    res.report_usage(on_usage);
    info!(variations = variations.len(), "Lesson variations generated");
    Ok(variations)
  }

  /// Full course for the selected variation (schema-constrained).
  #[instrument(level = "info", skip(self, prompts, variation, on_usage), fields(variation_id = %variation.id, difficulty = variation.difficulty.as_str()))]
  pub async fn generate_course(
    &self,
    prompts: &Prompts,
    variation: &LessonVariation,
    on_usage: impl FnOnce(TokenUsage),
  ) -> Result<Course, GenerationError> {
    let prompt = fill_template(
      &prompts.course_template,
      &[
        ("title", &variation.title),
        ("objective", &variation.objective),
        ("difficulty", variation.difficulty.as_str()),
      ],
    );
    let req = GenerateContentRequest::with_schema(prompt, course_schema());

    let res = self.generate_content(Stage::Course, &req).await?;
    let course: Course = parse_contract(Stage::Course, &res.text())?;
    validate_course(&course)
      .map_err(|detail| GenerationError::Format { stage: Stage::Course, detail })?;

    res.report_usage(on_usage);
    info!(
      modules = course.modules.len(),
      theme = course.theme_color.as_str(),
      title_preview = %course.title.chars().take(40).collect::<String>(),
      "Course generated"
    );
    Ok(course)
  }
}

// --- Reply parsing ---

/// Body of the first ```` ```json ```` fence, else of the first bare fence (language tag skipped).
fn fenced_block(text: &str) -> Option<&str> {
  if let Some(start) = text.find("```json") {
    let rest = &text[start + "```json".len()..];
    if let Some(end) = rest.find("```") {
      return Some(rest[..end].trim());
    }
  }
  let start = text.find("```")?;
  let rest = &text[start + 3..];
  let rest = match rest.find('\n') {
    Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
    _ => rest,
  };
  let end = rest.find("```")?;
  Some(rest[..end].trim())
}

/// Best-effort parse of free text: fenced block first, then the raw reply.
/// When a fence was present its error is the one reported.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
  let fenced_err = match fenced_block(text) {
    Some(block) => match serde_json::from_str::<T>(block) {
      Ok(v) => return Ok(v),
      Err(e) => Some(e),
    },
    None => None,
  };

  let raw = text.trim();
  if raw.is_empty() {
    return Err("the model reply was empty".into());
  }
  match serde_json::from_str::<T>(raw) {
    Ok(v) => Ok(v),
    Err(raw_err) => Err(format!(
      "the model reply did not contain a parseable JSON block ({})",
      fenced_err.unwrap_or(raw_err)
    )),
  }
}

/// Pillars arrive either as a bare array or wrapped as `{ "pillars": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PillarReply {
  List(Vec<PillarTopic>),
  Wrapped { pillars: Vec<PillarTopic> },
}

fn parse_pillar_reply(text: &str) -> Result<Vec<PillarTopic>, String> {
  Ok(match extract_json::<PillarReply>(text)? {
    PillarReply::List(p) | PillarReply::Wrapped { pillars: p } => p,
  })
}

/// Contract-enforced parse: the service promised raw JSON matching the schema.
fn parse_contract<T: DeserializeOwned>(stage: Stage, text: &str) -> Result<T, GenerationError> {
  serde_json::from_str::<T>(text.trim()).map_err(|e| {
    warn!(target: "generation", stage = stage.as_str(), reply = %trunc_for_log(text, 300), "Schema-constrained reply did not parse");
    GenerationError::Format { stage, detail: format!("reply violated the response schema: {}", e) }
  })
}

// --- Response schemas (OpenAPI subset understood by Gemini) ---

fn variations_schema() -> Value {
  let difficulties: Vec<&str> = Difficulty::ALL.iter().map(|d| d.as_str()).collect();
  json!({
    "type": "ARRAY",
    "items": {
      "type": "OBJECT",
      "properties": {
        "id": { "type": "STRING" },
        "title": { "type": "STRING", "description": "Catchy lesson title" },
        "objective": { "type": "STRING", "description": "What the student will learn" },
        "difficulty": { "type": "STRING", "enum": difficulties }
      },
      "required": ["id", "title", "objective", "difficulty"]
    }
  })
}

fn course_schema() -> Value {
  let themes: Vec<&str> = ThemeColor::ALL.iter().map(|t| t.as_str()).collect();
  json!({
    "type": "OBJECT",
    "properties": {
      "title": { "type": "STRING" },
      "subtitle": { "type": "STRING" },
      "themeColor": { "type": "STRING", "enum": themes },
      "modules": {
        "type": "ARRAY",
        "items": {
          "type": "OBJECT",
          "properties": {
            "id": { "type": "STRING" },
            "title": { "type": "STRING" },
            "contentMarkdown": { "type": "STRING" },
            "imageKeyword": { "type": "STRING" },
            "quiz": {
              "type": "ARRAY",
              "items": {
                "type": "OBJECT",
                "properties": {
                  "question": { "type": "STRING" },
                  "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                  "correctIndex": { "type": "INTEGER" },
                  "explanation": { "type": "STRING" }
                },
                "required": ["question", "options", "correctIndex", "explanation"]
              }
            },
            "chartData": {
              "type": "OBJECT",
              "properties": {
                "title": { "type": "STRING" },
                "data": {
                  "type": "ARRAY",
                  "items": {
                    "type": "OBJECT",
                    "properties": {
                      "label": { "type": "STRING" },
                      "value": { "type": "NUMBER" }
                    },
                    "required": ["label", "value"]
                  }
                }
              },
              "nullable": true
            }
          },
          "required": ["id", "title", "contentMarkdown", "imageKeyword", "quiz"]
        }
      }
    },
    "required": ["title", "subtitle", "themeColor", "modules"]
  })
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  tools: Vec<Tool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
  fn with_schema(prompt: String, schema: Value) -> Self {
    Self {
      contents: vec![Content::user(prompt)],
      tools: Vec::new(),
      generation_config: Some(GenerationConfig {
        response_mime_type: "application/json".into(),
        response_schema: schema,
      }),
    }
  }
}

#[derive(Serialize)]
struct Content { role: &'static str, parts: Vec<PartReq> }

impl Content {
  fn user(text: String) -> Self {
    Self { role: "user", parts: vec![PartReq { text }] }
  }
}

#[derive(Serialize)]
struct PartReq { text: String }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool { google_search: GoogleSearch }

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig { response_mime_type: String, response_schema: Value }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
  #[serde(default)] content: Option<CandidateContent>,
  #[serde(default)] grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent { #[serde(default)] parts: Vec<PartResp> }

#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata { #[serde(default)] grounding_chunks: Vec<GroundingChunk> }

#[derive(Deserialize)]
struct GroundingChunk { #[serde(default)] web: Option<WebChunk> }

#[derive(Deserialize)]
struct WebChunk {
  #[serde(default)] uri: Option<String>,
  #[serde(default)] title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u64>,
  #[serde(default)] candidates_token_count: Option<u64>,
  #[serde(default)] total_token_count: Option<u64>,
}

impl GenerateContentResponse {
  /// Concatenated text parts of the first candidate.
  fn text(&self) -> String {
    self.candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
      .unwrap_or_default()
  }

  /// Web citations of the first candidate that carry both a title and a URI, in service order.
  fn grounding_sources(&self) -> Vec<GroundingSource> {
    self.candidates
      .first()
      .and_then(|c| c.grounding_metadata.as_ref())
      .map(|m| {
        m.grounding_chunks
          .iter()
          .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            match (&web.title, &web.uri) {
              (Some(title), Some(url)) if !title.is_empty() && !url.is_empty() => {
                Some(GroundingSource { title: title.clone(), url: url.clone() })
              }
              _ => None,
            }
          })
          .collect()
      })
      .unwrap_or_default()
  }

  /// Hand service-reported counters to the callback, if the service sent any.
  fn report_usage(&self, on_usage: impl FnOnce(TokenUsage)) {
    if let Some(u) = &self.usage_metadata {
      let usage = TokenUsage {
        prompt_tokens: u.prompt_token_count.unwrap_or(0),
        response_tokens: u.candidates_token_count.unwrap_or(0),
        total_tokens: u.total_token_count.unwrap_or(0),
      };
      info!(prompt_tokens = usage.prompt_tokens, response_tokens = usage.response_tokens, total_tokens = usage.total_tokens, "Gemini usage");
      on_usage(usage);
    }
  }
}

/// Try to extract a clean error message from a Google API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
pub(crate) mod test_support {
  use serde_json::{json, Value};

  use super::Gemini;
  use crate::config::GeminiSettings;

  pub const MODEL: &str = "gemini-test";
  pub const ENDPOINT: &str = "/models/gemini-test:generateContent";

  pub fn client(base_url: &str) -> Gemini {
    Gemini::new(GeminiSettings {
      api_key: "test-key".into(),
      base_url: base_url.into(),
      model: MODEL.into(),
    })
    .unwrap()
  }

  /// A `generateContent` envelope with one text part and usage counters.
  pub fn reply(text: &str, prompt: u64, response: u64) -> Value {
    json!({
      "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }],
      "usageMetadata": {
        "promptTokenCount": prompt,
        "candidatesTokenCount": response,
        "totalTokenCount": prompt + response
      }
    })
  }
}
