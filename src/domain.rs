//! Domain models produced by the generation pipeline: pillars, variations, and the course itself.
//!
//! Everything here serializes as camelCase JSON, the same field names the model is asked to emit.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Number of pillar topics / lesson variations the model must return per batch.
pub const BATCH_SIZE: usize = 10;
/// Allowed range for `Course::modules`.
pub const MIN_MODULES: usize = 4;
pub const MAX_MODULES: usize = 6;

/// A broad thematic subject proposed as the foundation of a curriculum.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PillarTopic {
  #[serde(default, deserialize_with = "lenient_id")]
  pub id: String,
  pub title: String,
  pub description: String,
}

/// Ids may come back as strings, numbers or null; anything unusable is repaired later.
fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(match Option::<RawId>::deserialize(d)? {
    Some(RawId::Text(s)) => s,
    Some(RawId::Number(n)) => n.to_string(),
    None => String::new(),
  })
}

/// Citation returned by the retrieval-augmented pillar call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GroundingSource {
  pub title: String,
  pub url: String,
}

/// Output of the pillar stage.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PillarBatch {
  pub pillars: Vec<PillarTopic>,
  pub sources: Vec<GroundingSource>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
  #[serde(alias = "Principiante")]
  Beginner,
  #[serde(alias = "Intermedio")]
  Intermediate,
  #[serde(alias = "Avanzado")]
  Advanced,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Beginner, Difficulty::Intermediate, Difficulty::Advanced];

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Beginner => "Beginner",
      Difficulty::Intermediate => "Intermediate",
      Difficulty::Advanced => "Advanced",
    }
  }
}

/// One specific angle on a pillar topic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LessonVariation {
  #[serde(default, deserialize_with = "lenient_id")]
  pub id: String,
  pub title: String,
  pub objective: String,
  pub difficulty: Difficulty,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
  pub question: String,
  pub options: Vec<String>,
  pub correct_index: usize,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChartPoint {
  pub label: String,
  pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
  pub title: String,
  #[serde(default)]
  pub data: Vec<ChartPoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
  #[serde(default)]
  pub id: String,
  pub title: String,
  pub content_markdown: String,
  pub image_keyword: String,
  #[serde(default)]
  pub quiz: Vec<QuizQuestion>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chart_data: Option<ChartSeries>,
}

/// Palette applied to a generated course. Unknown values fall back to `Blue`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ThemeColor {
  #[default]
  Blue,
  Indigo,
  Emerald,
  Rose,
  Amber,
  Violet,
}

impl ThemeColor {
  pub const ALL: [ThemeColor; 6] = [
    ThemeColor::Blue,
    ThemeColor::Indigo,
    ThemeColor::Emerald,
    ThemeColor::Rose,
    ThemeColor::Amber,
    ThemeColor::Violet,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ThemeColor::Blue => "blue",
      ThemeColor::Indigo => "indigo",
      ThemeColor::Emerald => "emerald",
      ThemeColor::Rose => "rose",
      ThemeColor::Amber => "amber",
      ThemeColor::Violet => "violet",
    }
  }
}

impl From<String> for ThemeColor {
  fn from(s: String) -> Self {
    ThemeColor::ALL
      .into_iter()
      .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
      .unwrap_or_default()
  }
}

/// Root artifact of the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
  pub title: String,
  pub subtitle: String,
  #[serde(default)]
  pub theme_color: ThemeColor,
  pub modules: Vec<CourseModule>,
}

impl CourseModule {
  /// Empty and absent chart data are the same thing: no chart.
  pub fn chart(&self) -> Option<&ChartSeries> {
    self.chart_data.as_ref().filter(|c| !c.data.is_empty())
  }
}

// --- Structural contracts ---

/// Items whose `id` must be unique inside a generated batch.
pub trait BatchItem {
  fn id_mut(&mut self) -> &mut String;
}

impl BatchItem for PillarTopic {
  fn id_mut(&mut self) -> &mut String { &mut self.id }
}

impl BatchItem for LessonVariation {
  fn id_mut(&mut self) -> &mut String { &mut self.id }
}

/// Replace blank or repeated ids with fresh UUIDs so ids are unique within the batch.
pub fn ensure_unique_ids<T: BatchItem>(items: &mut [T]) {
  let mut seen = HashSet::new();
  for item in items.iter_mut() {
    let id = item.id_mut();
    let trimmed = id.trim().to_string();
    if trimmed.is_empty() || !seen.insert(trimmed.clone()) {
      *id = Uuid::new_v4().to_string();
      seen.insert(id.clone());
    } else {
      *id = trimmed;
    }
  }
}

pub fn validate_pillars(pillars: &[PillarTopic]) -> Result<(), String> {
  if pillars.len() != BATCH_SIZE {
    return Err(format!("expected {} pillar topics, got {}", BATCH_SIZE, pillars.len()));
  }
  if let Some(i) = pillars
    .iter()
    .position(|p| p.title.trim().is_empty() || p.description.trim().is_empty())
  {
    return Err(format!("pillar #{} has an empty title or description", i + 1));
  }
  Ok(())
}

pub fn validate_variations(variations: &[LessonVariation]) -> Result<(), String> {
  if variations.len() != BATCH_SIZE {
    return Err(format!("expected {} lesson variations, got {}", BATCH_SIZE, variations.len()));
  }
  if let Some(i) = variations.iter().position(|v| v.title.trim().is_empty()) {
    return Err(format!("variation #{} has an empty title", i + 1));
  }
  Ok(())
}

pub fn validate_course(course: &Course) -> Result<(), String> {
  let n = course.modules.len();
  if !(MIN_MODULES..=MAX_MODULES).contains(&n) {
    return Err(format!("expected {}-{} modules, got {}", MIN_MODULES, MAX_MODULES, n));
  }
  for (m, module) in course.modules.iter().enumerate() {
    for (q, question) in module.quiz.iter().enumerate() {
      if question.options.len() < 2 {
        return Err(format!("module {} question {} has fewer than 2 options", m + 1, q + 1));
      }
      if question.correct_index >= question.options.len() {
        return Err(format!(
          "module {} question {}: correctIndex {} out of range for {} options",
          m + 1,
          q + 1,
          question.correct_index,
          question.options.len()
        ));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  pub fn pillars() -> Vec<PillarTopic> {
    (1..=BATCH_SIZE)
      .map(|i| PillarTopic {
        id: i.to_string(),
        title: format!("Pillar {i}"),
        description: format!("What pillar {i} covers"),
      })
      .collect()
  }

  pub fn variations() -> Vec<LessonVariation> {
    (1..=BATCH_SIZE)
      .map(|i| LessonVariation {
        id: format!("v{i}"),
        title: format!("Variation V{i}"),
        objective: format!("Objective of V{i}"),
        difficulty: Difficulty::ALL[i % 3],
      })
      .collect()
  }

  pub fn question(correct_index: usize) -> QuizQuestion {
    QuizQuestion {
      question: "Which one?".into(),
      options: vec!["a".into(), "b".into(), "c".into()],
      correct_index,
      explanation: "Because b.".into(),
    }
  }

  pub fn course(title: &str) -> Course {
    let modules = (0..4)
      .map(|i| CourseModule {
        id: format!("m{i}"),
        title: format!("Module title {i}"),
        content_markdown: format!("# Heading {i}\n\nSome **bold** text."),
        image_keyword: "laptop".into(),
        quiz: vec![question(1), question(0)],
        chart_data: (i == 1).then(|| ChartSeries {
          title: "Adoption".into(),
          data: vec![
            ChartPoint { label: "2022".into(), value: 10.0 },
            ChartPoint { label: "2023".into(), value: 20.0 },
            ChartPoint { label: "2024".into(), value: 35.5 },
          ],
        }),
      })
      .collect();
    Course { title: title.into(), subtitle: "A subtitle".into(), theme_color: ThemeColor::Indigo, modules }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_theme_falls_back_to_blue() {
    let t: ThemeColor = serde_json::from_str("\"teal\"").unwrap();
    assert_eq!(t, ThemeColor::Blue);
    let t: ThemeColor = serde_json::from_str("\"Emerald\"").unwrap();
    assert_eq!(t, ThemeColor::Emerald);
    assert_eq!(serde_json::to_string(&ThemeColor::Violet).unwrap(), "\"violet\"");
  }

  #[test]
  fn difficulty_accepts_spanish_aliases() {
    let d: Difficulty = serde_json::from_str("\"Avanzado\"").unwrap();
    assert_eq!(d, Difficulty::Advanced);
    assert!(serde_json::from_str::<Difficulty>("\"Expert\"").is_err());
  }

  #[test]
  fn course_parses_camel_case_with_null_chart() {
    let raw = r#"{
      "title": "T", "subtitle": "S", "themeColor": "rose",
      "modules": [{
        "id": "1", "title": "M", "contentMarkdown": "x", "imageKeyword": "desk",
        "quiz": [{"question": "q", "options": ["a","b"], "correctIndex": 1, "explanation": "e"}],
        "chartData": null
      }]
    }"#;
    let c: Course = serde_json::from_str(raw).unwrap();
    assert_eq!(c.theme_color, ThemeColor::Rose);
    assert!(c.modules[0].chart_data.is_none());
    assert_eq!(c.modules[0].quiz[0].correct_index, 1);
  }

  #[test]
  fn empty_chart_is_no_chart() {
    let mut c = fixtures::course("x");
    assert!(c.modules[1].chart().is_some());
    c.modules[1].chart_data.as_mut().unwrap().data.clear();
    assert!(c.modules[1].chart().is_none());
    assert!(c.modules[0].chart().is_none());
  }

  #[test]
  fn numeric_and_null_ids_are_accepted() {
    let raw = r#"[
      {"id": 1, "title": "A", "description": "d"},
      {"id": null, "title": "B", "description": "d"},
      {"title": "C", "description": "d"}
    ]"#;
    let mut p: Vec<PillarTopic> = serde_json::from_str(raw).unwrap();
    assert_eq!(p[0].id, "1");
    assert_eq!(p[1].id, "");
    assert_eq!(p[2].id, "");
    ensure_unique_ids(&mut p);
    assert_eq!(p[0].id, "1");
    assert!(!p[1].id.is_empty() && p[1].id != p[2].id);

    let v: LessonVariation =
      serde_json::from_str(r#"{"id": 7, "title": "t", "objective": "o", "difficulty": "Beginner"}"#).unwrap();
    assert_eq!(v.id, "7");
  }

  #[test]
  fn pillar_contract() {
    let mut p = fixtures::pillars();
    assert!(validate_pillars(&p).is_ok());
    p[3].description = "  ".into();
    assert!(validate_pillars(&p).is_err());
    p.pop();
    assert!(validate_pillars(&p).unwrap_err().contains("got 9"));
  }

  #[test]
  fn course_contract() {
    let mut c = fixtures::course("x");
    assert!(validate_course(&c).is_ok());
    c.modules[2].quiz[0].correct_index = 3;
    assert!(validate_course(&c).unwrap_err().contains("correctIndex 3"));

    let mut c = fixtures::course("x");
    c.modules.truncate(3);
    assert!(validate_course(&c).is_err());

    let mut c = fixtures::course("x");
    c.modules[0].quiz[0].options.truncate(1);
    c.modules[0].quiz[0].correct_index = 0;
    assert!(validate_course(&c).is_err());
  }

  #[test]
  fn blank_and_duplicate_ids_are_replaced() {
    let mut p = fixtures::pillars();
    p[1].id = "1".into();
    p[2].id = " ".into();
    ensure_unique_ids(&mut p);
    let ids: HashSet<_> = p.iter().map(|x| x.id.clone()).collect();
    assert_eq!(ids.len(), BATCH_SIZE);
    assert_eq!(p[0].id, "1");
    assert_ne!(p[1].id, "1");
  }
}
