//! Offline course bundle: `index.html`, `styles.css` and `script.js` zipped at the archive root.
//!
//! The script carries the whole course plus the `render::StyleTables` computed for it, and only
//! re-implements the module render cycle and `optionState`, so it draws exactly what the live
//! course view draws. Markdown (marked) and charts (Chart.js) are loaded from a CDN.

use std::io::{Cursor, Write};

use tracing::{info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{validate_course, Course};
use crate::error::ExportError;
use crate::render::style_tables;
use crate::util::{escape_html, fill_template};

pub const INDEX_HTML: &str = "index.html";
pub const STYLES_CSS: &str = "styles.css";
pub const SCRIPT_JS: &str = "script.js";

/// A finished archive, ready to download.
#[derive(Clone, Debug)]
pub struct Bundle {
  pub file_name: String,
  pub bytes: Vec<u8>,
}

/// `course_` + the title's ASCII alphanumerics, other runs collapsed to `_`, lowercased.
pub fn archive_file_name(title: &str) -> String {
  let mut slug = String::with_capacity(title.len());
  for ch in title.chars() {
    if ch.is_ascii_alphanumeric() {
      slug.push(ch.to_ascii_lowercase());
    } else if !slug.is_empty() && !slug.ends_with('_') {
      slug.push('_');
    }
  }
  let slug = slug.trim_end_matches('_');
  if slug.is_empty() {
    "course.zip".to_string()
  } else {
    format!("course_{}.zip", slug)
  }
}

#[instrument(level = "info", skip(course), fields(modules = course.modules.len()))]
pub fn build_bundle(course: &Course) -> Result<Bundle, ExportError> {
  validate_course(course).map_err(ExportError::InvalidCourse)?;

  let html = render_html(course);
  let script = render_script(course)?;

  let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
  for (name, body) in [(INDEX_HTML, html.as_str()), (STYLES_CSS, STYLES), (SCRIPT_JS, script.as_str())] {
    zip.start_file(name, options)?;
    zip.write_all(body.as_bytes())?;
  }
  let bytes = zip.finish()?.into_inner();

  let file_name = archive_file_name(&course.title);
  info!(target: "export", %file_name, archive_bytes = bytes.len(), "Course bundle built");
  Ok(Bundle { file_name, bytes })
}

pub fn render_html(course: &Course) -> String {
  fill_template(INDEX_TEMPLATE, &[("title", &escape_html(&course.title))])
}

/// Course literal + style tables + runtime.
pub fn render_script(course: &Course) -> Result<String, ExportError> {
  let course_json = serde_json::to_string(course)?;
  let tables_json = serde_json::to_string(&style_tables(course))?;
  Ok(format!("const course = {};\nconst view = {};\n{}", course_json, tables_json, RUNTIME))
}

const STYLES: &str = r#"/* Custom scrollbar */
::-webkit-scrollbar { width: 8px; }
::-webkit-scrollbar-track { background: #f1f5f9; }
::-webkit-scrollbar-thumb { background: #cbd5e1; border-radius: 4px; }
::-webkit-scrollbar-thumb:hover { background: #94a3b8; }

.markdown-content h1 { font-size: 1.5rem; font-weight: 700; margin-top: 2rem; margin-bottom: 1rem; color: #1e293b; }
.markdown-content h2 { font-size: 1.25rem; font-weight: 600; margin-top: 1.5rem; margin-bottom: 0.75rem; color: #334155; }
.markdown-content p { margin-bottom: 1rem; line-height: 1.75; color: #475569; }
.markdown-content ul { list-style-type: disc; padding-left: 1.5rem; margin-bottom: 1rem; color: #475569; }
.markdown-content ol { list-style-type: decimal; padding-left: 1.5rem; margin-bottom: 1rem; color: #475569; }
.markdown-content li { margin-bottom: 0.5rem; }
.markdown-content strong { font-weight: 700; color: #0f172a; }
"#;

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <script src="https://cdn.tailwindcss.com"></script>
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap" rel="stylesheet">
    <script src="https://cdn.jsdelivr.net/npm/marked/marked.min.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
    <link rel="stylesheet" href="styles.css">
    <style>body { font-family: 'Inter', sans-serif; }</style>
</head>
<body class="bg-slate-50 text-slate-900 antialiased">
    <header class="sticky top-0 z-30 bg-white border-b border-slate-200 shadow-sm">
        <div class="max-w-7xl mx-auto px-4 sm:px-6 lg:px-8 h-16 flex items-center justify-between">
            <h1 id="course-title" class="text-xl font-bold text-slate-900 truncate max-w-md">{title}</h1>
            <div id="course-badge" class="px-3 py-1 rounded-full text-xs font-bold uppercase tracking-wide bg-slate-100 text-slate-600">Full Course</div>
        </div>
    </header>

    <div class="flex flex-col md:flex-row max-w-7xl mx-auto w-full min-h-[calc(100vh-64px)]">
        <nav class="w-full md:w-72 bg-white border-r border-slate-200 flex-shrink-0 md:h-[calc(100vh-64px)] overflow-y-auto">
            <div class="p-6">
                <h2 class="text-xs font-semibold text-slate-400 uppercase tracking-wider mb-4">Course Contents</h2>
                <div id="module-list" class="space-y-1"></div>
            </div>
        </nav>

        <main class="flex-1 p-6 md:p-10 overflow-y-auto h-[calc(100vh-64px)]">
            <div class="max-w-3xl mx-auto">
                <div class="relative h-64 w-full rounded-2xl overflow-hidden mb-8 shadow-md">
                    <img id="hero-img" src="" alt="" class="w-full h-full object-cover">
                    <div class="absolute inset-0 bg-gradient-to-t from-black/70 to-transparent flex items-end">
                        <div class="p-8">
                            <span id="hero-subtitle" class="text-white/80 text-sm font-medium uppercase tracking-wider mb-2 block"></span>
                            <h2 id="hero-title" class="text-3xl md:text-4xl font-bold text-white leading-tight"></h2>
                        </div>
                    </div>
                </div>

                <div id="content-area" class="markdown-content mb-12"></div>

                <div id="chart-container" class="bg-white rounded-2xl p-6 shadow-sm border border-slate-200 mb-12 hidden">
                    <h3 id="chart-title" class="text-lg font-bold text-slate-900 mb-6 flex items-center"></h3>
                    <div class="h-64 w-full"><canvas id="chart-canvas"></canvas></div>
                </div>

                <div id="quiz-box" class="rounded-2xl p-6 md:p-8 border bg-slate-50 border-slate-200">
                    <h3 id="quiz-title" class="text-xl font-bold mb-6 flex items-center text-slate-800">Test your knowledge</h3>
                    <div id="quiz-questions" class="space-y-8"></div>
                </div>

                <div class="flex justify-between mt-12 pt-6 border-t border-slate-200 pb-10">
                    <button id="prev-btn" class="px-6 py-3 rounded-xl font-medium text-slate-600 disabled:opacity-30 hover:bg-slate-100 transition-colors">&larr; Previous</button>
                    <button id="next-btn">Next Lesson &rarr;</button>
                </div>
            </div>
        </main>
    </div>

    <script src="script.js"></script>
</body>
</html>
"#;

const RUNTIME: &str = r#"
let currentModuleIndex = 0;
let chartInstance = null;
const answers = {};

function answerFor(moduleIdx, questionIdx) {
  const key = moduleIdx + '-' + questionIdx;
  if (!answers[key]) answers[key] = { selected: null, checked: false };
  return answers[key];
}

// Same five states as the live course view.
function optionState(answer, correctIndex, option) {
  const picked = answer.selected === option;
  if (answer.checked) {
    if (option === correctIndex) return 'correct';
    return picked ? 'incorrect' : 'dimmed';
  }
  return picked ? 'selected' : 'idle';
}

document.addEventListener('DOMContentLoaded', () => {
  renderHeader();
  renderSidebar();
  renderModule(0);

  document.getElementById('prev-btn').addEventListener('click', () => {
    if (currentModuleIndex > 0) renderModule(currentModuleIndex - 1);
  });
  document.getElementById('next-btn').addEventListener('click', () => {
    if (currentModuleIndex < course.modules.length - 1) renderModule(currentModuleIndex + 1);
  });
});

function renderHeader() {
  document.getElementById('course-title').textContent = course.title;
  document.getElementById('course-badge').className =
    'px-3 py-1 rounded-full text-xs font-bold uppercase tracking-wide ' + view.palette.softBackground + ' ' + view.palette.text;
  document.getElementById('quiz-title').className = 'text-xl font-bold mb-6 flex items-center ' + view.palette.text;
  document.getElementById('quiz-box').className = view.quizBox;
}

function renderSidebar() {
  const list = document.getElementById('module-list');
  list.innerHTML = '';
  course.modules.forEach((mod, idx) => {
    const btn = document.createElement('button');
    const num = document.createElement('span');
    num.className = 'mr-2 opacity-60';
    num.textContent = (idx + 1) + '.';
    btn.appendChild(num);
    btn.appendChild(document.createTextNode(mod.title));
    btn.id = 'sidebar-btn-' + idx;
    btn.onclick = () => renderModule(idx);
    list.appendChild(btn);
  });
}

function renderModule(index) {
  currentModuleIndex = index;
  const module = course.modules[index];

  document.querySelectorAll('#module-list button').forEach((btn, idx) => {
    btn.className = idx === index ? view.sidebar.active : view.sidebar.inactive;
  });

  const hero = document.getElementById('hero-img');
  hero.src = view.heroImages[index];
  hero.alt = module.title;
  document.getElementById('hero-title').textContent = module.title;
  document.getElementById('hero-subtitle').textContent = view.moduleLabels[index];

  document.getElementById('content-area').innerHTML = marked.parse(module.contentMarkdown);

  const chart = view.charts[index];
  const chartContainer = document.getElementById('chart-container');
  if (chart) {
    chartContainer.classList.remove('hidden');
    document.getElementById('chart-title').textContent = chart.title;
    renderChart(chart);
  } else {
    chartContainer.classList.add('hidden');
    if (chartInstance) { chartInstance.destroy(); chartInstance = null; }
  }

  renderQuiz();

  const last = index === course.modules.length - 1;
  const prevBtn = document.getElementById('prev-btn');
  const nextBtn = document.getElementById('next-btn');
  prevBtn.disabled = index === 0;
  nextBtn.disabled = last;
  nextBtn.className = last ? view.nextButton.last : view.nextButton.enabled;

  window.scrollTo({ top: 0, behavior: 'smooth' });
}

function renderChart(chart) {
  const ctx = document.getElementById('chart-canvas').getContext('2d');
  if (chartInstance) chartInstance.destroy();
  chartInstance = new Chart(ctx, {
    type: 'bar',
    data: {
      labels: chart.labels,
      datasets: [{ label: chart.title, data: chart.values, backgroundColor: chart.color, borderRadius: 4 }]
    },
    options: {
      responsive: true,
      maintainAspectRatio: false,
      plugins: { legend: { display: false } },
      scales: { y: { beginAtZero: true, grid: { display: false } }, x: { grid: { display: false } } }
    }
  });
}

function renderQuiz() {
  const moduleIdx = currentModuleIndex;
  const quiz = course.modules[moduleIdx].quiz;
  const container = document.getElementById('quiz-questions');
  container.innerHTML = '';

  quiz.forEach((q, qIdx) => {
    const answer = answerFor(moduleIdx, qIdx);
    const card = document.createElement('div');
    card.className = 'bg-white rounded-xl p-6 shadow-sm border border-slate-100';

    const title = document.createElement('p');
    title.className = 'font-semibold text-slate-900 mb-4';
    title.textContent = (qIdx + 1) + '. ' + q.question;
    card.appendChild(title);

    const list = document.createElement('div');
    list.className = 'space-y-3';
    q.options.forEach((opt, optIdx) => {
      const style = view.options[optionState(answer, q.correctIndex, optIdx)];
      const btn = document.createElement('button');
      btn.className = style.button;
      btn.disabled = answer.checked;
      const row = document.createElement('div');
      row.className = 'flex items-center';
      const indicator = document.createElement('div');
      indicator.className = style.indicator;
      indicator.innerHTML = style.icon;
      row.appendChild(indicator);
      row.appendChild(document.createTextNode(opt));
      btn.appendChild(row);
      btn.onclick = () => {
        if (answer.checked) return;
        answer.selected = optIdx;
        renderQuiz();
      };
      list.appendChild(btn);
    });
    card.appendChild(list);

    if (answer.selected !== null && !answer.checked) {
      const check = document.createElement('button');
      check.className = view.checkButton;
      check.textContent = 'Check answer';
      check.onclick = () => {
        answer.checked = true;
        renderQuiz();
      };
      card.appendChild(check);
    }

    if (answer.checked) {
      const fb = answer.selected === q.correctIndex ? view.feedback.correct : view.feedback.incorrect;
      const box = document.createElement('div');
      box.className = fb.className;
      const heading = document.createElement('strong');
      heading.className = 'block mb-1';
      heading.textContent = fb.heading;
      box.appendChild(heading);
      box.appendChild(document.createTextNode(q.explanation));
      card.appendChild(box);
    }

    container.appendChild(card);
  });
}
"#;

#[cfg(test)]
mod tests {
  use std::io::Read;

  use super::*;
  use crate::domain::fixtures;
  use crate::render::{option_style, OptionState};

  fn unzip(bytes: &[u8]) -> zip::ZipArchive<Cursor<Vec<u8>>> {
    zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap()
  }

  #[test]
  fn runtime_option_state_matches_live_renderer() {
    let body = "function optionState(answer, correctIndex, option) {
  const picked = answer.selected === option;
  if (answer.checked) {
    if (option === correctIndex) return 'correct';
    return picked ? 'incorrect' : 'dimmed';
  }
  return picked ? 'selected' : 'idle';
}";
    assert!(RUNTIME.contains(body));
    for state in OptionState::ALL {
      assert!(body.contains(&format!("'{}'", state.as_str())), "{}", state.as_str());
    }

    // Same decision table, evaluated in Rust: selected 2, correct 1.
    let mut answer = crate::render::QuizAnswer::default();
    answer.select(2);
    let states: Vec<_> = (0..3).map(|o| crate::render::option_state(&answer, 1, o).as_str()).collect();
    assert_eq!(states, ["idle", "idle", "selected"]);
    answer.check();
    let states: Vec<_> = (0..3).map(|o| crate::render::option_state(&answer, 1, o).as_str()).collect();
    assert_eq!(states, ["dimmed", "correct", "incorrect"]);
  }

  #[test]
  fn file_name_is_lowercase_alnum_and_underscores() {
    let name = archive_file_name("Intro to Testing!!");
    assert_eq!(name, "course_intro_to_testing.zip");
    let stem = name.trim_end_matches(".zip");
    assert!(stem.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));

    assert_eq!(archive_file_name("  C++ & Rust: 2024 "), "course_c_rust_2024.zip");
    assert_eq!(archive_file_name("¡¿?!"), "course.zip");
    assert_eq!(archive_file_name("Diseño Web"), "course_dise_o_web.zip");
  }

  #[test]
  fn archive_holds_exactly_three_artifacts() {
    let course = fixtures::course("Intro to Testing!!");
    let bundle = build_bundle(&course).unwrap();
    assert_eq!(bundle.file_name, "course_intro_to_testing.zip");

    let mut archive = unzip(&bundle.bytes);
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["index.html", "script.js", "styles.css"]);

    let mut html = String::new();
    archive.by_name(INDEX_HTML).unwrap().read_to_string(&mut html).unwrap();
    assert!(html.contains(r#"href="styles.css""#));
    assert!(html.contains(r#"src="script.js""#));
    assert!(html.contains("marked.min.js"));
    assert!(html.contains("chart.js"));
  }

  #[test]
  fn script_embeds_course_and_shared_tables() {
    let course = fixtures::course("Intro to Testing!!");
    let script = render_script(&course).unwrap();

    let course_json = serde_json::to_string(&course).unwrap();
    assert!(script.starts_with(&format!("const course = {};", course_json)));
    assert!(!script.contains("fetch("));

    let incorrect = serde_json::to_string(&option_style(OptionState::Incorrect)).unwrap();
    let correct = serde_json::to_string(&option_style(OptionState::Correct)).unwrap();
    assert!(script.contains(&format!("\"incorrect\":{}", incorrect)));
    assert!(script.contains(&format!("\"correct\":{}", correct)));
    assert!(script.contains("https://picsum.photos/seed/laptop3/1200/600"));
    // Module 0 has no chart, module 1 does.
    assert!(script.contains("\"charts\":[null,{\"title\":\"Adoption\""));
  }

  #[test]
  fn title_is_escaped_in_markup() {
    let course = fixtures::course("<Tags> & \"Quotes\"");
    let html = render_html(&course);
    assert!(html.contains("<title>&lt;Tags&gt; &amp; &quot;Quotes&quot;</title>"));
    assert!(!html.contains("{title}"));
  }

  #[test]
  fn invalid_course_is_not_exported() {
    let mut course = fixtures::course("x");
    course.modules[0].quiz[0].correct_index = 42;
    assert!(matches!(build_bundle(&course), Err(ExportError::InvalidCourse(_))));
  }
}
