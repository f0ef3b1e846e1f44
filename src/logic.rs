//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - the three generation-gated wizard steps (topic, pillar, variation)
//!   - back / restart navigation
//!   - the live course view (module selection, quiz select/check)
//!   - exporting the current course as an offline bundle
//!
//! Generation runs in its own task: a caller that goes away does not cancel the call, and the
//! wizard always leaves the busy state when it finishes.

use std::future::Future;

use tracing::{error, info, instrument};

use crate::error::{ApiError, ExportError, GenerationError, Stage, WizardError};
use crate::export::{build_bundle, Bundle};
use crate::protocol::{to_out, WizardOut};
use crate::render::{CourseSession, ModuleView};
use crate::state::AppState;
use crate::usage::TokenUsage;
use crate::wizard::Wizard;

pub async fn wizard_snapshot(state: &AppState) -> WizardOut {
  let w = state.wizard.read().await;
  to_out(&w, state.usage.snapshot())
}

pub fn usage_snapshot(state: &AppState) -> TokenUsage {
  state.usage.snapshot()
}

/// Install a finished generation result, or roll back the busy flag and report.
async fn settle<T>(
  state: &AppState,
  stage: Stage,
  result: Result<T, GenerationError>,
  apply: impl FnOnce(&mut Wizard, T) -> Result<(), WizardError>,
) -> Result<WizardOut, ApiError> {
  let mut w = state.wizard.write().await;
  match result {
    Ok(value) => {
      apply(&mut w, value)?;
      Ok(to_out(&w, state.usage.snapshot()))
    }
    Err(e) => {
      w.abort();
      error!(target: "wizard", stage = stage.as_str(), kind = e.kind(), error = %e, "Generation failed; staying on current step");
      Err(e.into())
    }
  }
}

/// Run `call` and settle the wizard inside one spawned task. The caller only waits for the
/// outcome; dropping it leaves the task to finish and clear the busy flag on its own.
async fn generate<T, Fut>(
  state: &AppState,
  stage: Stage,
  call: impl FnOnce(AppState) -> Fut,
  apply: impl FnOnce(&mut Wizard, T) -> Result<(), WizardError> + Send + 'static,
) -> Result<WizardOut, ApiError>
where
  T: Send + 'static,
  Fut: Future<Output = Result<T, GenerationError>> + Send + 'static,
{
  let st = state.clone();
  let pending = call(state.clone());
  let task = tokio::spawn(async move {
    let result = pending.await;
    settle(&st, stage, result, apply).await
  });

  match task.await {
    Ok(out) => out,
    Err(e) => {
      state.wizard.write().await.abort();
      error!(target: "wizard", stage = stage.as_str(), error = %e, "Generation task failed");
      Err(GenerationError::Transport { stage, message: format!("generation task failed: {}", e) }.into())
    }
  }
}

#[instrument(level = "info", skip(state), fields(topic_len = topic.len()))]
pub async fn submit_topic(state: &AppState, topic: &str) -> Result<WizardOut, ApiError> {
  let topic = state.wizard.write().await.begin_topic(topic)?;

  generate(
    state,
    Stage::Pillars,
    |st| async move {
      let batch = st
        .gemini_for(Stage::Pillars)?
        .generate_pillars(&st.prompts, &topic, |u| st.usage.accumulate(u))
        .await?;
      Ok::<_, GenerationError>((topic, batch))
    },
    |w, (topic, batch)| w.complete_topic(topic, batch),
  )
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn select_pillar(state: &AppState, pillar_id: &str) -> Result<WizardOut, ApiError> {
  let pillar = state.wizard.write().await.begin_pillar(pillar_id)?;

  generate(
    state,
    Stage::Variations,
    |st| async move {
      let variations = st
        .gemini_for(Stage::Variations)?
        .generate_variations(&st.prompts, &pillar, |u| st.usage.accumulate(u))
        .await?;
      Ok::<_, GenerationError>((pillar, variations))
    },
    |w, (pillar, variations)| w.complete_pillar(pillar, variations),
  )
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn select_variation(state: &AppState, variation_id: &str) -> Result<WizardOut, ApiError> {
  let variation = state.wizard.write().await.begin_variation(variation_id)?;

  generate(
    state,
    Stage::Course,
    |st| async move {
      let course = st
        .gemini_for(Stage::Course)?
        .generate_course(&st.prompts, &variation, |u| st.usage.accumulate(u))
        .await?;
      Ok::<_, GenerationError>((variation, course))
    },
    |w, (variation, course)| w.complete_variation(variation, course),
  )
  .await
}

#[instrument(level = "info", skip(state))]
pub async fn go_back(state: &AppState) -> Result<WizardOut, ApiError> {
  let mut w = state.wizard.write().await;
  w.back()?;
  Ok(to_out(&w, state.usage.snapshot()))
}

#[instrument(level = "info", skip(state))]
pub async fn restart(state: &AppState) -> Result<WizardOut, ApiError> {
  let mut w = state.wizard.write().await;
  w.restart()?;
  Ok(to_out(&w, state.usage.snapshot()))
}

// --- Live course view ---

/// Run `f` against the course session and return the resulting view.
async fn with_course(
  state: &AppState,
  f: impl FnOnce(&mut CourseSession) -> Result<(), WizardError>,
) -> Result<ModuleView, ApiError> {
  let mut w = state.wizard.write().await;
  let session = w.course_session_mut()?;
  f(session)?;
  Ok(session.view())
}

pub async fn course_view(state: &AppState) -> Result<ModuleView, ApiError> {
  with_course(state, |_| Ok(())).await
}

#[instrument(level = "debug", skip(state))]
pub async fn open_module(state: &AppState, index: usize) -> Result<ModuleView, ApiError> {
  with_course(state, |s| s.open_module(index)).await
}

#[instrument(level = "debug", skip(state))]
pub async fn select_answer(state: &AppState, question: usize, option: usize) -> Result<ModuleView, ApiError> {
  with_course(state, |s| s.select_answer(question, option)).await
}

#[instrument(level = "debug", skip(state))]
pub async fn check_answer(state: &AppState, question: usize) -> Result<ModuleView, ApiError> {
  with_course(state, |s| s.check_answer(question)).await
}

// --- Export ---

/// Zip the current course. Wizard state is only read.
#[instrument(level = "info", skip(state))]
pub async fn export_course(state: &AppState) -> Result<Bundle, ApiError> {
  let course = {
    let w = state.wizard.read().await;
    w.course().map(|s| s.course.clone()).ok_or(WizardError::NoCourse)?
  };

  let result = tokio::task::spawn_blocking(move || build_bundle(&course))
    .await
    .unwrap_or_else(|e| Err(ExportError::Io(std::io::Error::other(e.to_string()))));

  match result {
    Ok(bundle) => {
      info!(target: "export", file_name = %bundle.file_name, "Course exported");
      Ok(bundle)
    }
    Err(e) => {
      error!(target: "export", error = %e, "Course export failed");
      Err(e.into())
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;
  use std::time::Duration;

  use wiremock::matchers::{body_string_contains, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  use super::*;
  use crate::config::Prompts;
  use crate::domain::fixtures;
  use crate::gemini::test_support::{client, reply, ENDPOINT};
  use crate::render::OptionState;
  use crate::wizard::Step;

  fn state_for(server: &MockServer) -> AppState {
    AppState::with_parts(Some(client(&server.uri())), Prompts::default())
  }

  async fn mount_pillars(server: &MockServer) {
    let text = format!("```json\n{}\n```", serde_json::to_string(&fixtures::pillars()).unwrap());
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .and(body_string_contains("googleSearch"))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply(&text, 10, 20)))
      .mount(server)
      .await;
  }

  async fn mount_variations(server: &MockServer) {
    let text = serde_json::to_string(&fixtures::variations()).unwrap();
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .and(body_string_contains("Lesson Variations"))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply(&text, 5, 50)))
      .mount(server)
      .await;
  }

  async fn mount_course_for(server: &MockServer, variation_title: &str, course_title: &str, expect: u64) {
    let text = serde_json::to_string(&fixtures::course(course_title)).unwrap();
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .and(body_string_contains(format!("\\\"{}\\\"", variation_title)))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply(&text, 100, 1000)))
      .expect(expect)
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn back_from_course_then_pick_another_variation() {
    let server = MockServer::start().await;
    mount_pillars(&server).await;
    mount_variations(&server).await;
    mount_course_for(&server, "Variation V2", "Course for V2", 1).await;
    mount_course_for(&server, "Variation V5", "Course for V5", 1).await;
    let state = state_for(&server);

    submit_topic(&state, "Testing").await.unwrap();
    select_pillar(&state, "4").await.unwrap();
    let out = select_variation(&state, "v2").await.unwrap();
    assert_eq!(out.step, Step::ViewCourse);
    assert_eq!(out.course.unwrap().title, "Course for V2");

    let (list, pillar) = {
      let w = state.wizard.read().await;
      (w.variations().clone(), w.selected_pillar().unwrap().clone())
    };

    let out = go_back(&state).await.unwrap();
    assert_eq!(out.step, Step::SelectVariation);
    assert_eq!(out.variations.len(), 10);
    {
      let w = state.wizard.read().await;
      assert!(std::sync::Arc::ptr_eq(&list, w.variations()));
      assert!(std::sync::Arc::ptr_eq(&pillar, w.selected_pillar().unwrap()));
    }

    let out = select_variation(&state, "v5").await.unwrap();
    assert_eq!(out.course.unwrap().title, "Course for V5");
    assert_eq!(out.selected_variation.unwrap().id, "v5");
    // expect(1) on both course mocks is verified when the server drops.
  }

  #[tokio::test]
  async fn restart_keeps_usage_total() {
    let server = MockServer::start().await;
    mount_pillars(&server).await;
    mount_variations(&server).await;
    let state = state_for(&server);

    submit_topic(&state, "Testing").await.unwrap();
    let out = select_pillar(&state, "1").await.unwrap();
    let before = out.usage;
    assert_eq!(before, TokenUsage { prompt_tokens: 15, response_tokens: 70, total_tokens: 85 });

    let out = restart(&state).await.unwrap();
    assert_eq!(out.step, Step::Topic);
    assert!(out.pillars.is_empty() && out.sources.is_empty() && out.variations.is_empty());
    assert!(out.course.is_none());
    assert_eq!(out.usage, before);
    assert_eq!(usage_snapshot(&state), before);
  }

  #[tokio::test]
  async fn malformed_reply_keeps_topic_step_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply("not json at all", 99, 99)))
      .mount(&server)
      .await;
    let state = state_for(&server);

    let err = submit_topic(&state, "Testing").await.unwrap_err();
    assert_eq!(err.kind(), "format");
    assert_eq!(err.user_message(), Stage::Pillars.user_message());

    let snap = wizard_snapshot(&state).await;
    assert_eq!(snap.step, Step::Topic);
    assert!(!snap.busy);
    assert_eq!(snap.usage, TokenUsage::default());
  }

  #[tokio::test]
  async fn second_submission_while_busy_is_rejected() {
    let server = MockServer::start().await;
    let text = serde_json::to_string(&fixtures::pillars()).unwrap();
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply(&text, 1, 1)).set_delay(Duration::from_millis(300)))
      .expect(1)
      .mount(&server)
      .await;
    let state = state_for(&server);

    let first = {
      let st = state.clone();
      tokio::spawn(async move { submit_topic(&st, "Testing").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = submit_topic(&state, "Other").await.unwrap_err();
    assert!(matches!(err, ApiError::Wizard(WizardError::Busy)));
    assert!(wizard_snapshot(&state).await.busy);

    let out = first.await.unwrap().unwrap();
    assert_eq!(out.step, Step::SelectPillar);
    assert!(!out.busy);
  }

  #[tokio::test]
  async fn generation_completes_after_caller_goes_away() {
    let server = MockServer::start().await;
    let text = serde_json::to_string(&fixtures::pillars()).unwrap();
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .respond_with(ResponseTemplate::new(200).set_body_json(reply(&text, 4, 6)).set_delay(Duration::from_millis(200)))
      .expect(1)
      .mount(&server)
      .await;
    let state = state_for(&server);

    let caller = {
      let st = state.clone();
      tokio::spawn(async move { submit_topic(&st, "Testing").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snap = wizard_snapshot(&state).await;
    assert!(!snap.busy);
    assert_eq!(snap.step, Step::SelectPillar);
    assert_eq!(snap.pillars.len(), 10);
    assert_eq!(snap.usage, TokenUsage { prompt_tokens: 4, response_tokens: 6, total_tokens: 10 });
    assert!(restart(&state).await.is_ok());
  }

  #[tokio::test]
  async fn failed_generation_clears_busy_after_caller_goes_away() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(ENDPOINT))
      .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(200)))
      .mount(&server)
      .await;
    let state = state_for(&server);

    let caller = {
      let st = state.clone();
      tokio::spawn(async move { submit_topic(&st, "Testing").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snap = wizard_snapshot(&state).await;
    assert!(!snap.busy);
    assert_eq!(snap.step, Step::Topic);
    assert_eq!(snap.usage, TokenUsage::default());
  }

  #[tokio::test]
  async fn missing_key_is_transport_error() {
    let state = AppState::with_parts(None, Prompts::default());
    let err = submit_topic(&state, "Testing").await.unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert!(!wizard_snapshot(&state).await.busy);
  }

  #[tokio::test]
  async fn live_quiz_and_export_share_the_current_course() {
    let server = MockServer::start().await;
    mount_pillars(&server).await;
    mount_variations(&server).await;
    mount_course_for(&server, "Variation V1", "Intro to Testing!!", 1).await;
    let state = state_for(&server);

    assert!(matches!(export_course(&state).await, Err(ApiError::Wizard(WizardError::NoCourse))));

    submit_topic(&state, "Testing").await.unwrap();
    select_pillar(&state, "2").await.unwrap();
    select_variation(&state, "v1").await.unwrap();

    select_answer(&state, 0, 2).await.unwrap();
    let view = check_answer(&state, 0).await.unwrap();
    assert_eq!(view.quiz[0].options[2].state, OptionState::Incorrect);
    assert_eq!(view.quiz[0].options[1].state, OptionState::Correct);

    let view = open_module(&state, 1).await.unwrap();
    assert!(view.chart.is_some());
    assert!(matches!(open_module(&state, 9).await, Err(ApiError::Wizard(WizardError::UnknownModule(9)))));

    let bundle = export_course(&state).await.unwrap();
    assert_eq!(bundle.file_name, "course_intro_to_testing.zip");
    let archive = zip::ZipArchive::new(Cursor::new(bundle.bytes)).unwrap();
    assert_eq!(archive.len(), 3);

    // Export leaves the wizard where it was.
    let snap = wizard_snapshot(&state).await;
    assert_eq!(snap.step, Step::ViewCourse);
    assert_eq!(snap.module.unwrap().index, 1);
  }
}
