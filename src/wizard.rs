//! The four-step course wizard.
//!
//! Forward moves are split into `begin_*` (validate, mark busy, hand back the input for the
//! generation call) and `complete_*` (install the result). Callers release the wizard lock between
//! the two, so nothing is held across the network call; the busy flag keeps a second command out.
//! `abort` clears busy after a failed call and leaves everything else as it was.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{GroundingSource, LessonVariation, PillarBatch, PillarTopic, Course};
use crate::error::WizardError;
use crate::render::CourseSession;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
  Topic,
  SelectPillar,
  SelectVariation,
  ViewCourse,
}

impl Step {
  pub fn as_str(self) -> &'static str {
    match self {
      Step::Topic => "topic",
      Step::SelectPillar => "select_pillar",
      Step::SelectVariation => "select_variation",
      Step::ViewCourse => "view_course",
    }
  }
}

#[derive(Debug)]
pub struct Wizard {
  step: Step,
  busy: Option<String>,
  topic: Option<String>,
  pillars: Arc<Vec<PillarTopic>>,
  sources: Arc<Vec<GroundingSource>>,
  selected_pillar: Option<Arc<PillarTopic>>,
  variations: Arc<Vec<LessonVariation>>,
  selected_variation: Option<Arc<LessonVariation>>,
  course: Option<CourseSession>,
}

impl Default for Wizard {
  fn default() -> Self {
    Self {
      step: Step::Topic,
      busy: None,
      topic: None,
      pillars: Arc::default(),
      sources: Arc::default(),
      selected_pillar: None,
      variations: Arc::default(),
      selected_variation: None,
      course: None,
    }
  }
}

impl Wizard {
  pub fn new() -> Self {
    Self::default()
  }

  // --- Read access ---

  pub fn step(&self) -> Step { self.step }
  pub fn busy(&self) -> Option<&str> { self.busy.as_deref() }
  pub fn topic(&self) -> Option<&str> { self.topic.as_deref() }
  pub fn pillars(&self) -> &Arc<Vec<PillarTopic>> { &self.pillars }
  pub fn sources(&self) -> &Arc<Vec<GroundingSource>> { &self.sources }
  pub fn selected_pillar(&self) -> Option<&Arc<PillarTopic>> { self.selected_pillar.as_ref() }
  pub fn variations(&self) -> &Arc<Vec<LessonVariation>> { &self.variations }
  pub fn selected_variation(&self) -> Option<&Arc<LessonVariation>> { self.selected_variation.as_ref() }
  pub fn course(&self) -> Option<&CourseSession> { self.course.as_ref() }

  /// Live course view; only while on the course step.
  pub fn course_session_mut(&mut self) -> Result<&mut CourseSession, WizardError> {
    self.course.as_mut().ok_or(WizardError::NoCourse)
  }

  // --- Guards ---

  fn ensure_idle(&self) -> Result<(), WizardError> {
    if self.busy.is_some() { Err(WizardError::Busy) } else { Ok(()) }
  }

  fn ensure_step(&self, expected: Step) -> Result<(), WizardError> {
    if self.step == expected { Ok(()) } else { Err(WizardError::WrongStep { actual: self.step.as_str() }) }
  }

  /// A completion must land on the step whose `begin_*` marked us busy.
  fn ensure_pending(&self, expected: Step) -> Result<(), WizardError> {
    self.ensure_step(expected)?;
    if self.busy.is_none() {
      return Err(WizardError::WrongStep { actual: self.step.as_str() });
    }
    Ok(())
  }

  // --- Topic → SelectPillar ---

  pub fn begin_topic(&mut self, topic: &str) -> Result<String, WizardError> {
    self.ensure_idle()?;
    self.ensure_step(Step::Topic)?;
    let topic = topic.trim();
    if topic.is_empty() {
      return Err(WizardError::EmptyTopic);
    }
    self.busy = Some(format!("Analyzing trends about \"{}\"...", topic));
    Ok(topic.to_string())
  }

  pub fn complete_topic(&mut self, topic: String, batch: PillarBatch) -> Result<(), WizardError> {
    self.ensure_pending(Step::Topic)?;
    info!(target: "wizard", pillars = batch.pillars.len(), sources = batch.sources.len(), "Topic → SelectPillar");
    self.topic = Some(topic);
    self.pillars = Arc::new(batch.pillars);
    self.sources = Arc::new(batch.sources);
    self.step = Step::SelectPillar;
    self.busy = None;
    Ok(())
  }

  // --- SelectPillar → SelectVariation ---

  pub fn begin_pillar(&mut self, pillar_id: &str) -> Result<Arc<PillarTopic>, WizardError> {
    self.ensure_idle()?;
    self.ensure_step(Step::SelectPillar)?;
    let pillar = self
      .pillars
      .iter()
      .find(|p| p.id == pillar_id)
      .cloned()
      .ok_or_else(|| WizardError::UnknownPillar(pillar_id.to_string()))?;
    self.busy = Some(format!("Designing variations for \"{}\"...", pillar.title));
    Ok(Arc::new(pillar))
  }

  pub fn complete_pillar(&mut self, pillar: Arc<PillarTopic>, variations: Vec<LessonVariation>) -> Result<(), WizardError> {
    self.ensure_pending(Step::SelectPillar)?;
    info!(target: "wizard", pillar_id = %pillar.id, variations = variations.len(), "SelectPillar → SelectVariation");
    self.selected_pillar = Some(pillar);
    self.variations = Arc::new(variations);
    self.step = Step::SelectVariation;
    self.busy = None;
    Ok(())
  }

  // --- SelectVariation → ViewCourse ---

  pub fn begin_variation(&mut self, variation_id: &str) -> Result<Arc<LessonVariation>, WizardError> {
    self.ensure_idle()?;
    self.ensure_step(Step::SelectVariation)?;
    let variation = self
      .variations
      .iter()
      .find(|v| v.id == variation_id)
      .cloned()
      .ok_or_else(|| WizardError::UnknownVariation(variation_id.to_string()))?;
    self.busy = Some(format!(
      "Building the full course \"{}\"... This can take a minute.",
      variation.title
    ));
    Ok(Arc::new(variation))
  }

  pub fn complete_variation(&mut self, variation: Arc<LessonVariation>, course: Course) -> Result<(), WizardError> {
    self.ensure_pending(Step::SelectVariation)?;
    info!(target: "wizard", variation_id = %variation.id, modules = course.modules.len(), "SelectVariation → ViewCourse");
    self.selected_variation = Some(variation);
    self.course = Some(CourseSession::new(Arc::new(course)));
    self.step = Step::ViewCourse;
    self.busy = None;
    Ok(())
  }

  /// Generation failed: stay where we are.
  pub fn abort(&mut self) {
    debug!(target: "wizard", step = self.step.as_str(), "Generation aborted; state unchanged");
    self.busy = None;
  }

  // --- Backward moves (never call the generator) ---

  pub fn back(&mut self) -> Result<Step, WizardError> {
    self.ensure_idle()?;
    match self.step {
      Step::ViewCourse => {
        // Variation list and pillar selection stay exactly as they were.
        self.course = None;
        self.selected_variation = None;
        self.step = Step::SelectVariation;
      }
      Step::SelectVariation => {
        self.variations = Arc::default();
        self.selected_pillar = None;
        self.step = Step::SelectPillar;
      }
      Step::SelectPillar => self.clear_all(),
      Step::Topic => return Err(WizardError::NothingToGoBackTo),
    }
    info!(target: "wizard", step = self.step.as_str(), "Navigated back");
    Ok(self.step)
  }

  /// Back to the topic step from anywhere. Usage totals live elsewhere and are untouched.
  pub fn restart(&mut self) -> Result<(), WizardError> {
    self.ensure_idle()?;
    self.clear_all();
    info!(target: "wizard", "Wizard restarted");
    Ok(())
  }

  fn clear_all(&mut self) {
    self.step = Step::Topic;
    self.topic = None;
    self.pillars = Arc::default();
    self.sources = Arc::default();
    self.selected_pillar = None;
    self.variations = Arc::default();
    self.selected_variation = None;
    self.course = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::fixtures;

  fn batch() -> PillarBatch {
    PillarBatch {
      pillars: fixtures::pillars(),
      sources: vec![GroundingSource { title: "S".into(), url: "https://s.example".into() }],
    }
  }

  fn at_course() -> Wizard {
    let mut w = Wizard::new();
    let t = w.begin_topic("  Testing  ").unwrap();
    assert_eq!(t, "Testing");
    w.complete_topic(t, batch()).unwrap();
    let p = w.begin_pillar("3").unwrap();
    w.complete_pillar(p, fixtures::variations()).unwrap();
    let v = w.begin_variation("v2").unwrap();
    w.complete_variation(v, fixtures::course("Intro")).unwrap();
    w
  }

  #[test]
  fn forward_path_reaches_course() {
    let w = at_course();
    assert_eq!(w.step(), Step::ViewCourse);
    assert_eq!(w.selected_pillar().unwrap().id, "3");
    assert_eq!(w.selected_variation().unwrap().id, "v2");
    assert_eq!(w.variations().len(), 10);
    assert!(w.busy().is_none());
    assert_eq!(w.course().unwrap().active(), 0);
  }

  #[test]
  fn empty_topic_is_rejected_without_going_busy() {
    let mut w = Wizard::new();
    assert_eq!(w.begin_topic("   "), Err(WizardError::EmptyTopic));
    assert!(w.busy().is_none());
  }

  #[test]
  fn busy_blocks_every_command() {
    let mut w = Wizard::new();
    w.begin_topic("x").unwrap();
    assert!(w.busy().unwrap().contains("\"x\""));
    assert_eq!(w.begin_topic("y"), Err(WizardError::Busy));
    assert_eq!(w.back(), Err(WizardError::Busy));
    assert_eq!(w.restart(), Err(WizardError::Busy));
  }

  #[test]
  fn failure_keeps_state_and_clears_busy() {
    let mut w = Wizard::new();
    let t = w.begin_topic("x").unwrap();
    w.complete_topic(t, batch()).unwrap();
    let pillars = w.pillars().clone();

    w.begin_pillar("1").unwrap();
    w.abort();

    assert_eq!(w.step(), Step::SelectPillar);
    assert!(w.busy().is_none());
    assert!(w.selected_pillar().is_none());
    assert!(Arc::ptr_eq(&pillars, w.pillars()));
  }

  #[test]
  fn back_from_course_keeps_identical_list_and_pillar() {
    let mut w = at_course();
    let variations = w.variations().clone();
    let pillar = w.selected_pillar().unwrap().clone();

    assert_eq!(w.back(), Ok(Step::SelectVariation));
    assert!(w.course().is_none());
    assert!(Arc::ptr_eq(&variations, w.variations()));
    assert!(Arc::ptr_eq(&pillar, w.selected_pillar().unwrap()));

    let v5 = w.begin_variation("v5").unwrap();
    assert_eq!(v5.title, "Variation V5");
  }

  #[test]
  fn back_from_variations_discards_them() {
    let mut w = at_course();
    w.back().unwrap();
    assert_eq!(w.back(), Ok(Step::SelectPillar));
    assert!(w.variations().is_empty());
    assert!(w.selected_pillar().is_none());
    assert_eq!(w.pillars().len(), 10);

    assert_eq!(w.back(), Ok(Step::Topic));
    assert!(w.pillars().is_empty());
    assert!(w.sources().is_empty());
    assert_eq!(w.back(), Err(WizardError::NothingToGoBackTo));
  }

  #[test]
  fn restart_clears_everything() {
    let mut w = at_course();
    w.restart().unwrap();
    assert_eq!(w.step(), Step::Topic);
    assert!(w.topic().is_none());
    assert!(w.pillars().is_empty() && w.sources().is_empty() && w.variations().is_empty());
    assert!(w.course().is_none() && w.selected_variation().is_none());
  }

  #[test]
  fn commands_on_wrong_step_or_unknown_ids_are_rejected() {
    let mut w = Wizard::new();
    assert_eq!(w.begin_pillar("1"), Err(WizardError::WrongStep { actual: "topic" }));
    let t = w.begin_topic("x").unwrap();
    w.complete_topic(t, batch()).unwrap();
    assert_eq!(w.begin_pillar("nope"), Err(WizardError::UnknownPillar("nope".into())));
    assert!(w.busy().is_none());
    assert!(matches!(w.course_session_mut(), Err(WizardError::NoCourse)));
  }

  #[test]
  fn completion_without_begin_is_rejected() {
    let mut w = Wizard::new();
    assert!(w.complete_topic("x".into(), batch()).is_err());
    assert_eq!(w.step(), Step::Topic);
  }
}
