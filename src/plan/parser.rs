//! Plan markdown analysis.
//!
//! Pulls structured facts out of free-form English or Russian markdown
//! written by the agent: what is implemented, what is left, technical debt,
//! risks, and candidate tasks. This is keyword matching over headings and
//! list items, not a grammar. Unrecognized text is skipped.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::board::models::{NewTask, Priority};

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").unwrap());

// `- item`, `* item`, `1. item`, `2) item`, optionally with a checkbox.
static LIST_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[(?P<check>[ xX])\]\s*)?(?P<text>.+?)\s*$").unwrap()
});

static PHASE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:phase|stage|milestone|sprint|этап|фаза|спринт)\s*(?P<num>\d+)").unwrap()
});

static PRIORITY_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[Pp](?P<level>[0-3])\b").unwrap());

// `Risk: ...`, `TODO: ...` and friends outside of any list.
static INLINE_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<marker>todo|fixme|hack|risk|риск|сделать)\s*[:\-]\s*(?P<text>.+?)\s*$")
        .unwrap()
});

static EMPHASIS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|__|`|~~").unwrap());

// ── Keyword tables ───────────────────────────────────────────────────

const IMPLEMENTED_KEYWORDS: &[&str] = &[
    "implemented", "completed", "done", "finished", "shipped", "existing features",
    "current state", "реализовано", "реализованные", "выполнено", "готово", "сделано",
    "текущее состояние",
];

const TODO_KEYWORDS: &[&str] = &[
    "todo", "to do", "to-do", "remaining", "next steps", "not implemented", "pending",
    "missing", "осталось", "нужно сделать", "следующие шаги", "не реализовано",
    "в планах", "планы",
];

const TECH_DEBT_KEYWORDS: &[&str] = &[
    "technical debt", "tech debt", "refactoring", "cleanup", "технический долг",
    "техдолг", "тех. долг", "рефакторинг",
];

const RISK_KEYWORDS: &[&str] = &[
    "risk", "concern", "blocker", "issues", "problems", "риск", "проблем", "опасени",
    "блокер",
];

const TASK_KEYWORDS: &[&str] = &[
    "tasks", "suggested", "recommend", "action items", "plan", "roadmap", "задачи",
    "рекомендац", "предлагаем", "план", "дорожная карта",
];

const CRITICAL_KEYWORDS: &[&str] = &[
    "critical", "blocker", "urgent", "asap", "security hole", "критич", "срочно", "блокер",
    "немедленно",
];

const HIGH_KEYWORDS: &[&str] = &[
    "important", "high priority", "security", "bug", "crash", "data loss", "важн",
    "высок", "безопасн", "ошибк", "падени",
];

const LOW_KEYWORDS: &[&str] = &[
    "nice to have", "optional", "low priority", "later", "minor", "cosmetic", "желательно",
    "опционально", "низк", "потом", "когда-нибудь",
];

const TYPE_KEYWORDS: &[(TaskType, &[&str])] = &[
    (TaskType::Bug, &["fix", "bug", "error", "crash", "broken", "исправ", "баг", "ошибк", "сломан"]),
    (TaskType::Test, &["test", "coverage", "e2e", "тест", "покрыти"]),
    (TaskType::Docs, &["document", "docs", "readme", "guide", "документ", "описани"]),
    (TaskType::Refactor, &["refactor", "cleanup", "clean up", "debt", "simplify", "extract", "рефактор", "долг", "упрост"]),
    (TaskType::Chore, &["upgrade", "dependenc", "ci", "deploy", "config", "обнов", "зависимост", "деплой", "настро"]),
];

// ── Output types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Feature,
    Bug,
    Refactor,
    Test,
    Docs,
    Chore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub phase: Option<String>,
}

impl SuggestedTask {
    pub fn to_new_task(&self) -> NewTask {
        let mut description = self.description.clone();
        if let Some(phase) = &self.phase {
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str(&format!("Phase: {}", phase));
        }
        NewTask {
            title: self.title.clone(),
            description,
            priority: Some(self.priority),
            kanban_status: None,
            suggested_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanAnalysis {
    pub implemented: Vec<String>,
    pub todo: Vec<String>,
    pub technical_debt: Vec<String>,
    pub risks: Vec<String>,
    pub suggested_tasks: Vec<SuggestedTask>,
}

impl PlanAnalysis {
    pub fn is_empty(&self) -> bool {
        self.implemented.is_empty()
            && self.todo.is_empty()
            && self.technical_debt.is_empty()
            && self.risks.is_empty()
            && self.suggested_tasks.is_empty()
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Other,
    Implemented,
    Todo,
    TechDebt,
    Risks,
    Tasks,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Order matters: "not implemented" must win over "implemented", and
/// "technical debt" over the generic task words.
fn classify_heading(lower: &str) -> Section {
    if contains_any(lower, TECH_DEBT_KEYWORDS) {
        Section::TechDebt
    } else if contains_any(lower, RISK_KEYWORDS) {
        Section::Risks
    } else if contains_any(lower, TODO_KEYWORDS) {
        Section::Todo
    } else if contains_any(lower, IMPLEMENTED_KEYWORDS) {
        Section::Implemented
    } else if contains_any(lower, TASK_KEYWORDS) {
        Section::Tasks
    } else {
        Section::Other
    }
}

/// Strip emphasis markers, status emoji and trailing punctuation.
fn clean_item(text: &str) -> String {
    let text = EMPHASIS_REGEX.replace_all(text, "");
    text.trim_start_matches(['✅', '❌', '⬜', '🔲', '☐', '☑', '⚠', '\u{FE0F}', ' '])
        .trim_end_matches(['.', ';', ',', ' '])
        .trim()
        .to_string()
}

pub fn infer_priority(text: &str) -> Priority {
    if let Some(caps) = PRIORITY_TAG_REGEX.captures(text) {
        return match &caps["level"] {
            "0" => Priority::Critical,
            "1" => Priority::High,
            "2" => Priority::Medium,
            _ => Priority::Low,
        };
    }
    let lower = text.to_lowercase();
    if contains_any(&lower, CRITICAL_KEYWORDS) {
        Priority::Critical
    } else if contains_any(&lower, HIGH_KEYWORDS) {
        Priority::High
    } else if contains_any(&lower, LOW_KEYWORDS) {
        Priority::Low
    } else {
        Priority::Medium
    }
}

pub fn infer_task_type(text: &str) -> TaskType {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords.iter().any(|k| {
                // Short ASCII keywords match whole words only ("ci" in "decision").
                if k.len() <= 3 && k.is_ascii() {
                    words.contains(k)
                } else {
                    lower.contains(k)
                }
            })
        })
        .map(|(t, _)| *t)
        .unwrap_or(TaskType::Feature)
}

fn split_title(text: &str) -> (String, String) {
    for separator in [": ", " — ", " - "] {
        if let Some((head, tail)) = text.split_once(separator) {
            let head = head.trim();
            if !head.is_empty() && head.chars().count() <= 100 {
                return (head.to_string(), tail.trim().to_string());
            }
        }
    }
    if text.chars().count() > 100 {
        let title: String = text.chars().take(97).collect();
        (format!("{}...", title.trim_end()), text.to_string())
    } else {
        (text.to_string(), String::new())
    }
}

fn suggest(text: &str, phase: Option<&str>, forced_type: Option<TaskType>) -> SuggestedTask {
    let (title, description) = split_title(text);
    let phase = PHASE_REGEX
        .find(text)
        .map(|m| m.as_str().to_string())
        .or_else(|| phase.map(str::to_string));
    SuggestedTask {
        priority: infer_priority(text),
        task_type: forced_type.unwrap_or_else(|| infer_task_type(text)),
        title,
        description,
        phase,
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Analyze a plan document.
pub fn analyze_plan(markdown: &str) -> PlanAnalysis {
    let mut analysis = PlanAnalysis::default();
    let mut section = Section::Other;
    let mut phase: Option<String> = None;
    let mut in_code_block = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }

        if let Some(caps) = HEADING_REGEX.captures(line) {
            let heading = clean_item(&caps[1]);
            let lower = heading.to_lowercase();
            if PHASE_REGEX.is_match(&heading) {
                phase = Some(heading.clone());
                section = match classify_heading(&lower) {
                    Section::Other => Section::Tasks,
                    other => other,
                };
            } else {
                section = classify_heading(&lower);
                if section != Section::Tasks {
                    phase = None;
                }
            }
            continue;
        }

        if let Some(caps) = LIST_ITEM_REGEX.captures(line) {
            let text = clean_item(&caps["text"]);
            if text.is_empty() {
                continue;
            }
            let checkbox = caps.name("check").map(|m| m.as_str());
            let done_marker = caps["text"].contains('✅');
            let phase_ref = phase.as_deref();

            match (checkbox, section) {
                (Some("x") | Some("X"), _) => push_unique(&mut analysis.implemented, text),
                (Some(_), _) => {
                    push_unique(&mut analysis.todo, text.clone());
                    analysis.suggested_tasks.push(suggest(&text, phase_ref, None));
                }
                (None, _) if done_marker => push_unique(&mut analysis.implemented, text),
                (None, Section::Implemented) => push_unique(&mut analysis.implemented, text),
                (None, Section::Todo) => {
                    push_unique(&mut analysis.todo, text.clone());
                    analysis.suggested_tasks.push(suggest(&text, phase_ref, None));
                }
                (None, Section::TechDebt) => {
                    push_unique(&mut analysis.technical_debt, text.clone());
                    analysis
                        .suggested_tasks
                        .push(suggest(&text, phase_ref, Some(TaskType::Refactor)));
                }
                (None, Section::Risks) => push_unique(&mut analysis.risks, text),
                (None, Section::Tasks) => {
                    analysis.suggested_tasks.push(suggest(&text, phase_ref, None));
                }
                (None, Section::Other) => {}
            }
            continue;
        }

        if let Some(caps) = INLINE_MARKER_REGEX.captures(line) {
            let text = clean_item(&caps["text"]);
            if text.is_empty() {
                continue;
            }
            match caps["marker"].to_lowercase().as_str() {
                "risk" | "риск" => push_unique(&mut analysis.risks, text),
                "hack" | "fixme" => push_unique(&mut analysis.technical_debt, text),
                _ => push_unique(&mut analysis.todo, text),
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    analysis
        .suggested_tasks
        .retain(|t| seen.insert(t.title.to_lowercase()));
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGLISH_PLAN: &str = r#"
# Project plan

## Implemented
- User login with **OAuth**
- [x] Kanban board

## Remaining work
- [ ] Add export to CSV
- Fix crash when project path is missing

## Technical debt
- Refactor the websocket hub

## Risks
- Rate limits on the GitHub API

## Phase 2: Integrations
1. Slack notifications - post when an approval is pending (P1)
2. Write docs for the approval flow

```bash
- not a list item
```

TODO: wire up metrics
"#;

    #[test]
    fn test_english_sections() {
        let a = analyze_plan(ENGLISH_PLAN);
        assert_eq!(a.implemented, vec!["User login with OAuth", "Kanban board"]);
        assert_eq!(
            a.todo,
            vec![
                "Add export to CSV",
                "Fix crash when project path is missing",
                "wire up metrics"
            ]
        );
        assert_eq!(a.technical_debt, vec!["Refactor the websocket hub"]);
        assert_eq!(a.risks, vec!["Rate limits on the GitHub API"]);
    }

    #[test]
    fn test_suggested_tasks_inference() {
        let a = analyze_plan(ENGLISH_PLAN);
        let titles: Vec<&str> = a.suggested_tasks.iter().map(|t| t.title.as_str()).collect();
        assert!(titles.contains(&"Add export to CSV"));
        assert!(!titles.iter().any(|t| t.contains("not a list item")));

        let crash = a
            .suggested_tasks
            .iter()
            .find(|t| t.title.starts_with("Fix crash"))
            .unwrap();
        assert_eq!(crash.task_type, TaskType::Bug);
        assert_eq!(crash.priority, Priority::High);

        let debt = a
            .suggested_tasks
            .iter()
            .find(|t| t.title.contains("websocket"))
            .unwrap();
        assert_eq!(debt.task_type, TaskType::Refactor);

        let slack = a
            .suggested_tasks
            .iter()
            .find(|t| t.title == "Slack notifications")
            .unwrap();
        assert_eq!(slack.priority, Priority::High);
        assert_eq!(slack.phase.as_deref(), Some("Phase 2: Integrations"));
        assert!(slack.description.starts_with("post when"));

        let docs = a
            .suggested_tasks
            .iter()
            .find(|t| t.title.starts_with("Write docs"))
            .unwrap();
        assert_eq!(docs.task_type, TaskType::Docs);
    }

    #[test]
    fn test_russian_plan() {
        let plan = r#"
## Реализовано
- Авторизация пользователей
## Осталось сделать
- Исправить ошибку синхронизации задач
- Добавить экспорт отчётов (желательно)
## Технический долг
- Упростить модуль уведомлений
## Риски
- Зависимость от внешнего API
## Этап 3
- Срочно: настроить резервное копирование
"#;
        let a = analyze_plan(plan);
        assert_eq!(a.implemented, vec!["Авторизация пользователей"]);
        assert_eq!(a.todo.len(), 2);
        assert_eq!(a.technical_debt, vec!["Упростить модуль уведомлений"]);
        assert_eq!(a.risks, vec!["Зависимость от внешнего API"]);

        let fix = a
            .suggested_tasks
            .iter()
            .find(|t| t.title.starts_with("Исправить"))
            .unwrap();
        assert_eq!(fix.task_type, TaskType::Bug);
        assert_eq!(fix.priority, Priority::High);

        let export = a
            .suggested_tasks
            .iter()
            .find(|t| t.title.starts_with("Добавить экспорт"))
            .unwrap();
        assert_eq!(export.priority, Priority::Low);
        assert_eq!(export.task_type, TaskType::Feature);

        let backup = a
            .suggested_tasks
            .iter()
            .find(|t| t.title == "Срочно")
            .unwrap();
        assert_eq!(backup.priority, Priority::Critical);
        assert_eq!(backup.phase.as_deref(), Some("Этап 3"));
        assert_eq!(backup.task_type, TaskType::Chore);
    }

    #[test]
    fn test_not_implemented_heading_is_todo() {
        let a = analyze_plan("### Not implemented yet\n- Billing\n");
        assert_eq!(a.todo, vec!["Billing"]);
        assert!(a.implemented.is_empty());
    }

    #[test]
    fn test_checkmark_emoji_counts_as_implemented() {
        let a = analyze_plan("## Status\n- ✅ Search\n- Settings page\n");
        assert_eq!(a.implemented, vec!["Search"]);
        assert!(a.todo.is_empty());
    }

    #[test]
    fn test_empty_and_unstructured_input() {
        assert!(analyze_plan("").is_empty());
        assert!(analyze_plan("Just a paragraph of prose without lists.").is_empty());
    }

    #[test]
    fn test_duplicate_tasks_are_collapsed() {
        let a = analyze_plan("## Tasks\n- Add search\n- add search\n");
        assert_eq!(a.suggested_tasks.len(), 1);
    }

    #[test]
    fn test_priority_tags_override_keywords() {
        assert_eq!(infer_priority("Minor polish P0"), Priority::Critical);
        assert_eq!(infer_priority("Critical fix P3"), Priority::Low);
        assert_eq!(infer_priority("Plain item"), Priority::Medium);
    }

    #[test]
    fn test_short_keywords_match_whole_words() {
        assert_eq!(infer_task_type("Record the decision"), TaskType::Feature);
        assert_eq!(infer_task_type("Set up CI pipeline"), TaskType::Chore);
    }

    #[test]
    fn test_to_new_task_carries_phase() {
        let task = SuggestedTask {
            title: "Add search".into(),
            description: "Full text".into(),
            priority: Priority::High,
            task_type: TaskType::Feature,
            phase: Some("Phase 1".into()),
        };
        let new_task = task.to_new_task();
        assert_eq!(new_task.priority, Some(Priority::High));
        assert_eq!(new_task.description, "Full text\n\nPhase: Phase 1");
    }
}
