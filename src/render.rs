//! Terminal rendering. Every function returns a `String` so the binary decides
//! where it goes and tests can inspect it with colors turned off.

use chrono::NaiveDate;
use colored::*;

use crate::catalog::MedicalCase;
use crate::error::{HospitalError, Toast};
use crate::history::{display_name, format_date_heading, relative_label, DateGroup};
use crate::language::{translations, Language};
use crate::message::{ChatMessage, MessageId, MessageView, Role};
use crate::playback::PlaybackSnapshot;

const BAR_WIDTH: usize = 30;

pub fn role_label(role: Role, language: Language) -> ColoredString {
    let label = format!("[{}]", role.label(language));
    match role {
        Role::Doctor => label.bright_cyan().bold(),
        Role::Patient => label.bright_green().bold(),
        Role::Reporter => label.bright_magenta().bold(),
    }
}

/// A complete message as one block.
pub fn render_message(message: &ChatMessage, language: Language) -> String {
    let mut out = format!("{}\n", role_label(message.role, language));
    match message.view() {
        MessageView::Structured { reasoning, content } => {
            if let Some(r) = reasoning {
                out.push_str(&format!("{}\n", r.dimmed().italic()));
            }
            if let Some(c) = content {
                out.push_str(c);
                out.push('\n');
            }
        }
        MessageView::Raw(raw) => {
            out.push_str(&format!("{}\n", raw.yellow()));
        }
        MessageView::Empty if message.is_streaming => {
            out.push_str(&format!(
                "{}\n",
                translations::WAITING_FOR_RESPONSE.get(language).dimmed()
            ));
        }
        MessageView::Empty => {}
    }
    out
}

pub fn render_toast(toast: &Toast) -> String {
    let body = if toast.title.is_empty() {
        toast.description.clone()
    } else {
        format!("{}: {}", toast.title, toast.description)
    };
    if toast.destructive {
        body.bright_red().to_string()
    } else {
        body.bright_blue().to_string()
    }
}

/// The one line printed when a command fails. Errors that carry no toast
/// still get their message shown.
pub fn render_error(error: &HospitalError, language: Language) -> String {
    match error.toast(language) {
        Some(toast) => render_toast(&toast),
        None => error.to_string().bright_red().to_string(),
    }
}

/// Turns successive snapshots of a streaming message into text that can be
/// appended to a terminal.
///
/// Reasoning only ever grows, so its new suffix is printed. Content is
/// replaced by each fragment; when the new content extends what was printed
/// only the suffix goes out, otherwise the whole content is printed again on a
/// fresh line.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    current: Option<MessageId>,
    reasoning: String,
    content: String,
    raw_len: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, message: &ChatMessage, language: Language) -> String {
        let mut out = String::new();
        if self.current != Some(message.id) {
            *self = StreamPrinter {
                current: Some(message.id),
                ..Self::default()
            };
            out.push_str(&format!("{}\n", role_label(message.role, language)));
        }

        if let Some(tail) = message.reasoning_content.strip_prefix(self.reasoning.as_str()) {
            if !tail.is_empty() {
                out.push_str(&tail.dimmed().italic().to_string());
            }
        }
        self.reasoning.clone_from(&message.reasoning_content);

        if message.content != self.content {
            match message.content.strip_prefix(self.content.as_str()) {
                Some(tail) if !self.content.is_empty() => out.push_str(tail),
                _ => {
                    if !self.reasoning.is_empty() || !self.content.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&message.content);
                }
            }
            self.content.clone_from(&message.content);
        }

        if !message.has_structured() && message.raw_text.len() > self.raw_len {
            out.push_str(&message.raw_text[self.raw_len..].yellow().to_string());
            self.raw_len = message.raw_text.len();
        }

        if !message.is_streaming {
            out.push('\n');
            self.current = None;
        }
        out
    }
}

pub fn render_case_line(case: &MedicalCase, language: Language) -> String {
    format!(
        "{}  {}  {} · {}  {}",
        case.id.bright_white().bold(),
        case.title.bright_cyan(),
        case.category,
        case.difficulty.label(language),
        case.tags.join(", ").dimmed()
    )
}

pub fn render_case_list(cases: &[&MedicalCase], language: Language) -> String {
    if cases.is_empty() {
        return format!("{}\n", translations::NO_CASES_FOUND.get(language).yellow());
    }
    let mut out = format!("{}\n", translations::SELECT_CASE.get(language).bright_yellow().bold());
    for case in cases {
        out.push_str(&render_case_line(case, language));
        out.push('\n');
    }
    out
}

pub fn render_progress(playback: &PlaybackSnapshot, language: Language) -> String {
    let filled = (playback.progress_percent() / 100.0 * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let state = if playback.playing {
        translations::PLAY.get(language)
    } else {
        translations::PAUSE.get(language)
    };
    format!(
        "{}: [{}{}] {} ({})",
        translations::PROGRESS.get(language),
        "=".repeat(filled).bright_blue(),
        " ".repeat(BAR_WIDTH - filled),
        playback.progress_label(language),
        state
    )
}

pub fn render_history(groups: &[DateGroup<'_>], today: NaiveDate, language: Language) -> String {
    let mut out = format!("{}\n", translations::SESSION_HISTORY.get(language).bright_yellow().bold());
    if groups.is_empty() {
        out.push_str(&format!("{}\n", translations::NO_DIALOGUE_HISTORY.get(language).dimmed()));
        return out;
    }
    for group in groups {
        out.push_str(&format!("{}\n", format_date_heading(group.date, language).bright_white().bold()));
        for d in &group.dialogues {
            out.push_str(&format!(
                "  {}  {} {}  {}\n",
                display_name(d),
                d.total_lines,
                translations::MESSAGES.get(language),
                relative_label(&d.edit_time, today, language).dimmed()
            ));
        }
    }
    out
}

pub fn header(title: &str) -> String {
    format!("{}\n{}", title.bright_cyan().bold(), "=".repeat(50).bright_blue())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DialogueSummary;
    use crate::assembler::apply_fragment;
    use crate::catalog::builtin_cases;
    use crate::history::group_by_date;
    use crate::playback::DialoguePlayback;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn message_block_prefers_structured() {
        plain();
        let mut m = ChatMessage::placeholder(Role::Doctor);
        apply_fragment(&mut m, r#"{"reasoning_content":"thinking","content":"Rest."}"#);
        assert_eq!(render_message(&m, Language::En), "[Doctor]\nthinking\nRest.\n");
    }

    #[test]
    fn streaming_empty_message_shows_waiting() {
        plain();
        let m = ChatMessage::placeholder(Role::Doctor);
        assert_eq!(render_message(&m, Language::Zh), "[医生]\n等待回应...\n");
    }

    #[test]
    fn printer_emits_suffixes_for_growing_content() {
        plain();
        let mut p = StreamPrinter::new();
        let mut m = ChatMessage::placeholder(Role::Doctor);
        let mut out = String::new();
        for frag in [
            r#"{"reasoning_content":"Pain "}"#,
            r#"{"reasoning_content":"on exertion."}"#,
            r#"{"content":"Likely"}"#,
            r#"{"content":"Likely angina."}"#,
        ] {
            apply_fragment(&mut m, frag);
            out.push_str(&p.update(&m, Language::En));
        }
        m.is_streaming = false;
        out.push_str(&p.update(&m, Language::En));
        assert_eq!(out, "[Doctor]\nPain on exertion.\nLikely angina.\n");
    }

    #[test]
    fn printer_reprints_rewritten_content() {
        plain();
        let mut p = StreamPrinter::new();
        let mut m = ChatMessage::placeholder(Role::Doctor);
        apply_fragment(&mut m, r#"{"content":"Take aspirin"}"#);
        p.update(&m, Language::En);
        apply_fragment(&mut m, r#"{"content":"Call emergency services"}"#);
        assert_eq!(p.update(&m, Language::En), "\nCall emergency services");
    }

    #[test]
    fn printer_shows_raw_fallback() {
        plain();
        let mut p = StreamPrinter::new();
        let mut m = ChatMessage::placeholder(Role::Doctor);
        apply_fragment(&mut m, "<html>");
        assert_eq!(p.update(&m, Language::En), "[Doctor]\n<html>");
    }

    #[test]
    fn command_error_renders_once() {
        plain();
        let err = HospitalError::Auth("not signed in".into());
        let toast = err.toast(Language::En).unwrap();
        let line = render_error(&err, Language::En);
        assert_eq!(line, render_toast(&toast));
        assert_eq!(line.matches(toast.description.as_str()).count(), 1);
        assert!(!render_error(&HospitalError::Aborted, Language::En).is_empty());
    }

    #[test]
    fn progress_bar_reflects_position() {
        plain();
        let mut pb = DialoguePlayback::new(builtin_cases()[0].dialogue.clone());
        let line = render_progress(&pb.snapshot(), Language::En);
        assert!(line.ends_with("1 of 13 (Play)"), "{line}");
        pb.toggle();
        assert!(render_progress(&pb.snapshot(), Language::En).ends_with("(Pause)"));
    }

    #[test]
    fn empty_case_list_message() {
        plain();
        let expected = format!("{}\n", translations::NO_CASES_FOUND.get(Language::Zh));
        assert_eq!(render_case_list(&[], Language::Zh), expected);
    }

    #[test]
    fn history_lists_groups() {
        plain();
        let list = vec![DialogueSummary {
            dialogue_id: 1,
            dialogue_name: Some("Chest pain follow-up".into()),
            total_lines: 12,
            edit_time: "2024-03-05 10:00:00".into(),
        }];
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let out = render_history(&group_by_date(&list), today, Language::En);
        assert!(out.contains("March 5, 2024"));
        assert!(out.contains("Chest pain follow-up  12 messages  Today"));
    }
}
