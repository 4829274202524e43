//! Medical case catalog: wire types, local search and paging.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;

use crate::language::{translations, Language};
use crate::message::Role;

/// One scripted line of a case transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (Difficulty::Easy, Language::En) => "Easy",
            (Difficulty::Easy, Language::Zh) => "简单",
            (Difficulty::Medium, Language::En) => "Medium",
            (Difficulty::Medium, Language::Zh) => "中等",
            (Difficulty::Hard, Language::En) => "Hard",
            (Difficulty::Hard, Language::Zh) => "困难",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalCase {
    /// The data service sends numeric ids, the bundled catalog uses strings.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
}

impl MedicalCase {
    /// True when `needle` (already lowercased) occurs in any searchable field.
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.category.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

// -- Wire types ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseQuery {
    pub search_query: String,
    /// Free-form filter clause forwarded to the data service.
    pub where_condition: String,
    pub page: u32,
}

impl Default for CaseQuery {
    fn default() -> Self {
        CaseQuery {
            search_query: String::new(),
            where_condition: String::new(),
            page: 1,
        }
    }
}

impl CaseQuery {
    pub fn search(query: impl Into<String>) -> Self {
        CaseQuery {
            search_query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaseListResponse {
    #[serde(default)]
    pub cases: Vec<MedicalCase>,
    pub total_cases: u32,
    pub total_pages: u32,
}

// -- Local search ----------------------------------------------------------

/// Case-insensitive substring search over title, description, category and
/// tags. A blank query keeps every case.
pub fn filter_cases<'a>(cases: &'a [MedicalCase], query: &str) -> Vec<&'a MedicalCase> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return cases.iter().collect();
    }
    cases.iter().filter(|c| c.matches(&needle)).collect()
}

pub fn find_case<'a>(cases: &'a [MedicalCase], id: &str) -> Option<&'a MedicalCase> {
    cases.iter().find(|c| c.id == id)
}

/// Empty-result text for the case list.
pub fn empty_message(language: Language) -> &'static str {
    translations::NO_CASES_FOUND.get(language)
}

static BUILTIN: Lazy<Vec<MedicalCase>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../assets/cases.json")).unwrap_or_else(|e| {
        error!(error = %e, "bundled case catalog is malformed");
        Vec::new()
    })
});

/// Cases shipped with the binary so playback works without the data service.
pub fn builtin_cases() -> &'static [MedicalCase] {
    &BUILTIN
}

// -- Paging ----------------------------------------------------------------

/// 1-based page cursor clamped to `[1, total_pages]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, total_pages: u32) -> Self {
        let total_pages = total_pages.max(1);
        Pagination {
            page: page.clamp(1, total_pages),
            total_pages,
        }
    }

    pub fn from_response(page: u32, response: &CaseListResponse) -> Self {
        Self::new(page, response.total_pages)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next(self) -> Self {
        Self::new(self.page.saturating_add(1), self.total_pages)
    }

    pub fn prev(self) -> Self {
        Self::new(self.page.saturating_sub(1), self.total_pages)
    }
}
