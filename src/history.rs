//! Past dialogues of the signed-in user, grouped by day.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use crate::api::DialogueSummary;
use crate::language::{translations, Language};

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Dialogues edited on the same calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup<'a> {
    /// `YYYY-MM-DD`.
    pub date: &'a str,
    pub dialogues: Vec<&'a DialogueSummary>,
}

/// The `YYYY-MM-DD` part of an `edit_time`.
pub fn date_key(edit_time: &str) -> &str {
    edit_time.split(' ').next().unwrap_or(edit_time)
}

/// Group by day, latest day first. Order within a day is the server's.
pub fn group_by_date(dialogues: &[DialogueSummary]) -> Vec<DateGroup<'_>> {
    let mut groups: BTreeMap<&str, Vec<&DialogueSummary>> = BTreeMap::new();
    for d in dialogues {
        groups.entry(date_key(&d.edit_time)).or_default().push(d);
    }
    groups
        .into_iter()
        .rev()
        .map(|(date, dialogues)| DateGroup { date, dialogues })
        .collect()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date_key(text.trim()), "%Y-%m-%d").ok()
}

pub fn parse_edit_time(edit_time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(edit_time.trim(), "%Y-%m-%d %H:%M:%S").ok()
}

/// Heading for a day group. Unparseable input is returned unchanged.
pub fn format_date_heading(date: &str, language: Language) -> String {
    let Some(d) = parse_date(date) else {
        return date.to_string();
    };
    match language {
        Language::Zh => format!("{} 年 {} 月 {} 日", d.year(), d.month(), d.day()),
        Language::En => format!("{} {}, {}", MONTHS[d.month0() as usize], d.day(), d.year()),
    }
}

/// "Today", "Yesterday", "3 days ago", or the plain date beyond a week.
pub fn relative_label(edit_time: &str, today: NaiveDate, language: Language) -> String {
    let Some(d) = parse_date(edit_time) else {
        return edit_time.to_string();
    };
    match (today - d).num_days() {
        0 => translations::TODAY.get(language).to_string(),
        1 => translations::YESTERDAY.get(language).to_string(),
        n @ 2..=6 => format!("{n} {}", translations::DAYS_AGO.get(language)),
        _ => d.format("%Y-%m-%d").to_string(),
    }
}

pub fn display_name(dialogue: &DialogueSummary) -> String {
    match dialogue.dialogue_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("#{}", dialogue.dialogue_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn summary(id: i64, edit_time: &str) -> DialogueSummary {
        DialogueSummary {
            dialogue_id: id,
            dialogue_name: Some(format!("Session {id}")),
            total_lines: 10,
            edit_time: edit_time.to_string(),
        }
    }

    #[test]
    fn groups_latest_day_first() {
        let list = vec![
            summary(1, "2024-03-04 09:00:00"),
            summary(2, "2024-03-05 10:00:00"),
            summary(3, "2024-03-04 18:30:00"),
            summary(4, "2023-12-31 23:59:59"),
        ];
        let groups = group_by_date(&list);
        let dates: Vec<&str> = groups.iter().map(|g| g.date).collect();
        assert_eq!(dates, vec!["2024-03-05", "2024-03-04", "2023-12-31"]);
        let ids: Vec<i64> = groups[1].dialogues.iter().map(|d| d.dialogue_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn empty_history_has_no_groups() {
        assert!(group_by_date(&[]).is_empty());
    }

    #[test]
    fn headings_per_language() {
        assert_eq!(format_date_heading("2024-03-05", Language::Zh), "2024 年 3 月 5 日");
        assert_eq!(format_date_heading("2024-03-05", Language::En), "March 5, 2024");
        assert_eq!(format_date_heading("someday", Language::En), "someday");
    }

    #[rstest]
    #[case("2024-03-10 08:00:00", Language::En, "Today")]
    #[case("2024-03-09 23:59:59", Language::En, "Yesterday")]
    #[case("2024-03-09 12:00:00", Language::Zh, "昨天")]
    #[case("2024-03-07 12:00:00", Language::En, "3 days ago")]
    #[case("2024-03-04 12:00:00", Language::Zh, "6 天前")]
    #[case("2024-03-03 12:00:00", Language::En, "2024-03-03")]
    #[case("garbage", Language::En, "garbage")]
    fn relative_labels(#[case] edit_time: &str, #[case] lang: Language, #[case] expected: &str) {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(relative_label(edit_time, today, lang), expected);
    }

    #[test]
    fn parses_full_timestamp() {
        let t = parse_edit_time("2024-03-05 14:07:09").unwrap();
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(parse_edit_time("2024-03-05").is_none());
    }

    #[test]
    fn unnamed_dialogue_uses_id() {
        let mut d = summary(9, "2024-01-01 00:00:00");
        d.dialogue_name = Some("  ".into());
        assert_eq!(display_name(&d), "#9");
        d.dialogue_name = None;
        assert_eq!(display_name(&d), "#9");
    }
}
