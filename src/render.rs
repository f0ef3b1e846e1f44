//! Course rendering logic shared by the live course view and the offline bundle.
//!
//! Nothing here touches HTTP or the filesystem. The live adapter serializes `ModuleView`s; the
//! exporter embeds `StyleTables` into `script.js`, so both renderers pull every class string, image
//! URL, label and chart series from the same functions. The only logic the exported script
//! re-implements is `option_state`, a five-way match.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::domain::{ChartSeries, Course, ThemeColor};
use crate::error::WizardError;

// --- Theme ---

/// Every style a theme contributes, in one record.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThemePalette {
  pub main_style: &'static str,
  pub soft_background: &'static str,
  pub border: &'static str,
  pub text: &'static str,
  /// Bar fill for charts.
  pub chart: &'static str,
}

pub fn palette(theme: ThemeColor) -> ThemePalette {
  match theme {
    ThemeColor::Blue => ThemePalette {
      main_style: "bg-blue-600 text-white",
      soft_background: "bg-blue-50",
      border: "border-blue-200",
      text: "text-blue-800",
      chart: "#3b82f6",
    },
    ThemeColor::Indigo => ThemePalette {
      main_style: "bg-indigo-600 text-white",
      soft_background: "bg-indigo-50",
      border: "border-indigo-200",
      text: "text-indigo-800",
      chart: "#4f46e5",
    },
    ThemeColor::Emerald => ThemePalette {
      main_style: "bg-emerald-600 text-white",
      soft_background: "bg-emerald-50",
      border: "border-emerald-200",
      text: "text-emerald-800",
      chart: "#059669",
    },
    ThemeColor::Rose => ThemePalette {
      main_style: "bg-rose-600 text-white",
      soft_background: "bg-rose-50",
      border: "border-rose-200",
      text: "text-rose-800",
      chart: "#3b82f6",
    },
    ThemeColor::Amber => ThemePalette {
      main_style: "bg-amber-600 text-white",
      soft_background: "bg-amber-50",
      border: "border-amber-200",
      text: "text-amber-800",
      chart: "#3b82f6",
    },
    ThemeColor::Violet => ThemePalette {
      main_style: "bg-violet-600 text-white",
      soft_background: "bg-violet-50",
      border: "border-violet-200",
      text: "text-violet-800",
      chart: "#3b82f6",
    },
  }
}

// --- Module chrome ---

pub const IMAGE_SERVICE: &str = "https://picsum.photos/seed";

pub fn hero_image_url(image_keyword: &str, index: usize) -> String {
  format!("{}/{}{}/1200/600", IMAGE_SERVICE, image_keyword, index)
}

pub fn module_label(index: usize) -> String {
  format!("Module {}", index + 1)
}

const SIDEBAR_BASE: &str = "w-full text-left px-4 py-3 rounded-lg text-sm font-medium transition-all";
const SIDEBAR_INACTIVE: &str = "text-slate-600 hover:bg-slate-50 hover:text-slate-900";

fn sidebar_active(p: &ThemePalette) -> String {
  format!("{} {} shadow-sm ring-1 ring-inset {}", p.soft_background, p.text, p.border)
}

pub fn sidebar_class(p: &ThemePalette, active: bool) -> String {
  if active {
    format!("{} {}", SIDEBAR_BASE, sidebar_active(p))
  } else {
    format!("{} {}", SIDEBAR_BASE, SIDEBAR_INACTIVE)
  }
}

const NEXT_BASE: &str = "px-6 py-3 rounded-xl font-medium text-white shadow-md disabled:opacity-50 disabled:shadow-none transition-all";
const NEXT_ENABLED: &str = "bg-slate-900 hover:bg-slate-800";
const NEXT_LAST: &str = "bg-slate-300";

pub fn next_button_class(is_last: bool) -> String {
  format!("{} {}", NEXT_BASE, if is_last { NEXT_LAST } else { NEXT_ENABLED })
}

pub fn quiz_box_class(p: &ThemePalette) -> String {
  format!("rounded-2xl p-6 md:p-8 {} border {}", p.soft_background, p.border)
}

pub fn check_button_class(p: &ThemePalette) -> String {
  format!("mt-4 px-4 py-2 {} rounded-lg text-sm font-medium hover:opacity-90 transition-opacity", p.main_style)
}

// --- Chart ---

/// Bar chart series ready for a charting library.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
  pub title: String,
  pub labels: Vec<String>,
  pub values: Vec<f64>,
  pub color: &'static str,
}

/// `None` when the module has no chart or an empty one.
pub fn chart_view(series: Option<&ChartSeries>, p: &ThemePalette) -> Option<ChartView> {
  let series = series.filter(|s| !s.data.is_empty())?;
  Some(ChartView {
    title: series.title.clone(),
    labels: series.data.iter().map(|d| d.label.clone()).collect(),
    values: series.data.iter().map(|d| d.value).collect(),
    color: p.chart,
  })
}

// --- Quiz ---

/// Answer state of one question: pick freely, then check once.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct QuizAnswer {
  pub selected: Option<usize>,
  pub checked: bool,
}

impl QuizAnswer {
  /// Ignored once the answer has been checked.
  pub fn select(&mut self, option: usize) -> bool {
    if self.checked {
      return false;
    }
    self.selected = Some(option);
    true
  }

  /// Only possible with a selection.
  pub fn check(&mut self) -> bool {
    if self.checked || self.selected.is_none() {
      return false;
    }
    self.checked = true;
    true
  }

  pub fn is_correct(&self, correct_index: usize) -> bool {
    self.checked && self.selected == Some(correct_index)
  }
}

/// Visual state of a single option.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionState {
  /// Not selected, not checked.
  Idle,
  /// Selected, waiting for check.
  Selected,
  /// Checked: this is the right answer (whether or not it was picked).
  Correct,
  /// Checked: picked but wrong.
  Incorrect,
  /// Checked: neither picked nor right.
  Dimmed,
}

impl OptionState {
  pub const ALL: [OptionState; 5] = [
    OptionState::Idle,
    OptionState::Selected,
    OptionState::Correct,
    OptionState::Incorrect,
    OptionState::Dimmed,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OptionState::Idle => "idle",
      OptionState::Selected => "selected",
      OptionState::Correct => "correct",
      OptionState::Incorrect => "incorrect",
      OptionState::Dimmed => "dimmed",
    }
  }
}

pub fn option_state(answer: &QuizAnswer, correct_index: usize, option: usize) -> OptionState {
  let picked = answer.selected == Some(option);
  match (answer.checked, option == correct_index, picked) {
    (true, true, _) => OptionState::Correct,
    (true, false, true) => OptionState::Incorrect,
    (true, false, false) => OptionState::Dimmed,
    (false, _, true) => OptionState::Selected,
    (false, _, false) => OptionState::Idle,
  }
}

const OPTION_BASE: &str = "w-full text-left p-3 rounded-lg border transition-all";
const INDICATOR_BASE: &str = "w-5 h-5 rounded-full border flex items-center justify-center mr-3 flex-shrink-0";

const ICON_CHECK: &str = r#"<svg class="w-3 h-3" fill="none" stroke="currentColor" viewBox="0 0 24 24"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="3" d="M5 13l4 4L19 7" /></svg>"#;
const ICON_CROSS: &str = r#"<svg class="w-3 h-3" fill="none" stroke="currentColor" viewBox="0 0 24 24"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="3" d="M6 18L18 6M6 6l12 12" /></svg>"#;
const ICON_DOT: &str = r#"<div class="w-2.5 h-2.5 rounded-full bg-indigo-500"></div>"#;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionStyle {
  pub button: String,
  pub indicator: String,
  /// Markup placed inside the indicator; empty for none.
  pub icon: &'static str,
}

pub fn option_style(state: OptionState) -> OptionStyle {
  let (button, indicator, icon) = match state {
    OptionState::Idle => ("border-slate-200 hover:bg-slate-50 hover:border-slate-300", "border-slate-300", ""),
    OptionState::Selected => ("bg-slate-50 border-indigo-500 ring-1 ring-indigo-500 text-slate-900", "border-indigo-500", ICON_DOT),
    OptionState::Correct => ("bg-green-50 border-green-500 text-green-700 ring-1 ring-green-500", "border-green-500 bg-green-500 text-white", ICON_CHECK),
    OptionState::Incorrect => ("bg-red-50 border-red-300 text-red-700", "border-red-500 bg-red-500 text-white", ICON_CROSS),
    OptionState::Dimmed => ("border-slate-200 opacity-60", "border-slate-300", ""),
  };
  OptionStyle {
    button: format!("{} {}", OPTION_BASE, button),
    indicator: format!("{} {}", INDICATOR_BASE, indicator),
    icon,
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStyle {
  pub heading: &'static str,
  pub class_name: &'static str,
}

pub fn feedback_style(correct: bool) -> FeedbackStyle {
  if correct {
    FeedbackStyle { heading: "Correct!", class_name: "mt-4 p-4 rounded-lg text-sm bg-green-50 text-green-800" }
  } else {
    FeedbackStyle { heading: "Incorrect", class_name: "mt-4 p-4 rounded-lg text-sm bg-red-50 text-red-800" }
  }
}

// --- Live view ---

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarItem {
  pub index: usize,
  pub title: String,
  pub active: bool,
  pub class_name: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
  pub index: usize,
  pub text: String,
  pub state: OptionState,
  pub style: OptionStyle,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
  pub correct: bool,
  pub heading: &'static str,
  pub class_name: &'static str,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub index: usize,
  pub question: String,
  pub options: Vec<OptionView>,
  /// The "check answer" button shows only between selecting and checking.
  pub can_check: bool,
  pub check_button_class: String,
  pub feedback: Option<FeedbackView>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavView {
  pub prev_enabled: bool,
  pub next_enabled: bool,
  pub next_class_name: String,
}

/// Everything needed to draw one module of the course.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
  pub course_title: String,
  pub index: usize,
  pub total: usize,
  pub label: String,
  pub title: String,
  pub hero_image_url: String,
  pub content_markdown: String,
  pub palette: ThemePalette,
  pub sidebar: Vec<SidebarItem>,
  pub chart: Option<ChartView>,
  pub quiz_box_class: String,
  pub quiz: Vec<QuestionView>,
  pub nav: NavView,
}

/// Live state of the course view: which module is open and how each quiz question was answered.
/// Discarded whenever the wizard installs or clears a course.
#[derive(Clone, Debug)]
pub struct CourseSession {
  pub course: Arc<Course>,
  active: usize,
  answers: HashMap<(usize, usize), QuizAnswer>,
}

impl CourseSession {
  pub fn new(course: Arc<Course>) -> Self {
    Self { course, active: 0, answers: HashMap::new() }
  }

  pub fn active(&self) -> usize {
    self.active
  }

  pub fn open_module(&mut self, index: usize) -> Result<(), WizardError> {
    if index >= self.course.modules.len() {
      return Err(WizardError::UnknownModule(index));
    }
    self.active = index;
    Ok(())
  }

  fn question_bounds(&self, question: usize) -> Result<usize, WizardError> {
    let module = self.course.modules.get(self.active).ok_or(WizardError::UnknownModule(self.active))?;
    module
      .quiz
      .get(question)
      .map(|q| q.options.len())
      .ok_or(WizardError::UnknownQuestion(question))
  }

  pub fn select_answer(&mut self, question: usize, option: usize) -> Result<(), WizardError> {
    let options = self.question_bounds(question)?;
    if option >= options {
      return Err(WizardError::UnknownOption(option));
    }
    self.answers.entry((self.active, question)).or_default().select(option);
    Ok(())
  }

  pub fn check_answer(&mut self, question: usize) -> Result<(), WizardError> {
    self.question_bounds(question)?;
    self.answers.entry((self.active, question)).or_default().check();
    Ok(())
  }

  pub fn answer(&self, module: usize, question: usize) -> QuizAnswer {
    self.answers.get(&(module, question)).copied().unwrap_or_default()
  }

  pub fn view(&self) -> ModuleView {
    module_view(&self.course, self.active, |q| self.answer(self.active, q))
  }
}

/// Assemble the view of module `index`; `answer_of(q)` supplies quiz state per question.
pub fn module_view(course: &Course, index: usize, answer_of: impl Fn(usize) -> QuizAnswer) -> ModuleView {
  let p = palette(course.theme_color);
  let total = course.modules.len();
  let module = &course.modules[index];

  let sidebar = course
    .modules
    .iter()
    .enumerate()
    .map(|(i, m)| SidebarItem {
      index: i,
      title: m.title.clone(),
      active: i == index,
      class_name: sidebar_class(&p, i == index),
    })
    .collect();

  let quiz = module
    .quiz
    .iter()
    .enumerate()
    .map(|(qi, q)| {
      let answer = answer_of(qi);
      let options = q
        .options
        .iter()
        .enumerate()
        .map(|(oi, text)| {
          let state = option_state(&answer, q.correct_index, oi);
          OptionView { index: oi, text: text.clone(), state, style: option_style(state) }
        })
        .collect();
      let feedback = answer.checked.then(|| {
        let correct = answer.is_correct(q.correct_index);
        let style = feedback_style(correct);
        FeedbackView { correct, heading: style.heading, class_name: style.class_name, explanation: q.explanation.clone() }
      });
      QuestionView {
        index: qi,
        question: q.question.clone(),
        options,
        can_check: answer.selected.is_some() && !answer.checked,
        check_button_class: check_button_class(&p),
        feedback,
      }
    })
    .collect();

  ModuleView {
    course_title: course.title.clone(),
    index,
    total,
    label: module_label(index),
    title: module.title.clone(),
    hero_image_url: hero_image_url(&module.image_keyword, index),
    content_markdown: module.content_markdown.clone(),
    palette: p,
    sidebar,
    chart: chart_view(module.chart_data.as_ref(), &p),
    quiz_box_class: quiz_box_class(&p),
    quiz,
    nav: NavView {
      prev_enabled: index > 0,
      next_enabled: index + 1 < total,
      next_class_name: next_button_class(index + 1 == total),
    },
  }
}

// --- Tables for the offline bundle ---

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarStyles {
  pub active: String,
  pub inactive: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextButtonStyles {
  pub enabled: String,
  pub last: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FeedbackStyles {
  pub correct: FeedbackStyle,
  pub incorrect: FeedbackStyle,
}

/// Precomputed styles and per-module data the exported script renders from.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleTables {
  pub palette: ThemePalette,
  pub sidebar: SidebarStyles,
  pub options: BTreeMap<&'static str, OptionStyle>,
  pub feedback: FeedbackStyles,
  pub check_button: String,
  pub quiz_box: String,
  pub next_button: NextButtonStyles,
  pub hero_images: Vec<String>,
  pub module_labels: Vec<String>,
  pub charts: Vec<Option<ChartView>>,
}

pub fn style_tables(course: &Course) -> StyleTables {
  let p = palette(course.theme_color);
  StyleTables {
    palette: p,
    sidebar: SidebarStyles { active: sidebar_class(&p, true), inactive: sidebar_class(&p, false) },
    options: OptionState::ALL.into_iter().map(|s| (s.as_str(), option_style(s))).collect(),
    feedback: FeedbackStyles { correct: feedback_style(true), incorrect: feedback_style(false) },
    check_button: check_button_class(&p),
    quiz_box: quiz_box_class(&p),
    next_button: NextButtonStyles { enabled: next_button_class(false), last: next_button_class(true) },
    hero_images: course
      .modules
      .iter()
      .enumerate()
      .map(|(i, m)| hero_image_url(&m.image_keyword, i))
      .collect(),
    module_labels: (0..course.modules.len()).map(module_label).collect(),
    charts: course.modules.iter().map(|m| chart_view(m.chart_data.as_ref(), &p)).collect(),
  }
}
