// src/pipeline/api.rs
use chrono::NaiveDate;
use quire_core::validator::Violation;
use quire_core::{Diagnostic, Stage};
use quire_types::QuestionId;
use serde::Serialize;
use std::collections::BTreeMap;

/// One exam document to build.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// Template name, resolved through the engine's template source.
    pub template: String,
    /// Question ids in exam order.
    pub questions: Vec<QuestionId>,
    pub title: String,
    /// Document date; today when `None`.
    pub date: Option<NaiveDate>,
}

impl MergeRequest {
    pub fn new(template: impl Into<String>, questions: impl IntoIterator<Item = impl Into<QuestionId>>) -> Self {
        Self {
            template: template.into(),
            questions: questions.into_iter().map(Into::into).collect(),
            title: String::new(),
            date: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// The finished document and what happened while building it.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub bytes: Vec<u8>,
    pub report: MergeReport,
}

/// A question replaced by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedQuestion {
    pub question: QuestionId,
    pub number: u32,
    pub stage: Stage,
    pub reason: String,
}

/// A repair or fallback applied to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionWarning {
    pub question: QuestionId,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Question slots in the output, placeholders included.
    pub questions: usize,
    pub degraded: Vec<DegradedQuestion>,
    pub warnings: Vec<QuestionWarning>,
    /// Pre-existing problems in the template's own content.
    pub template_warnings: Vec<Violation>,
    /// Distinct binaries written to storage.
    pub binaries: usize,
    /// Definitions added to the header, by category.
    pub new_definitions: BTreeMap<String, usize>,
}

impl MergeReport {
    /// True when at least one question is a placeholder.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
