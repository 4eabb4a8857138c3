// src/pipeline/engine.rs
//! The merge pipeline for one exam document.
//!
//! Fetch -> Sanitize -> Allocate/Dedup -> Merge definitions + Assemble ->
//! Write binaries -> Validate -> Package. Each call to [`MergeEngine::merge`]
//! owns its session; nothing is shared between merges except the sources.
//! Templates that are zip packages take the HWPX path, which skips the
//! binary storage stage: images become package entries.

use super::api::{DegradedQuestion, MergeOutput, MergeReport, MergeRequest, QuestionWarning};
use crate::error::MergeError;
use itertools::Itertools;
use quire_core::assembler::{BodyAssembler, QuestionBlock, QuestionContent, QuestionSlot};
use quire_core::binstore::{BinaryWriter, check_cardinality, merge_storage};
use quire_core::definitions::{DefinitionIndex, DefinitionSet, merge_mapping_table};
use quire_core::hwpx::{self, HwpxFragment, HwpxTemplate};
use quire_core::packager::{PackageParts, Packager};
use quire_core::sanitizer::{Degraded, FragmentOutcome, Sanitizer};
use quire_core::session::{MergeSession, RewrittenFragment};
use quire_core::template::{TemplateDocument, format_date, insert_content, locate_insertion, substitute_metadata};
use quire_core::validator::{Origin, Validator};
use quire_core::{MergeConfig, PackageError};
use quire_traits::{FragmentRecord, FragmentSource, TemplateSource};
use quire_types::QuestionId;
use std::sync::Arc;

/// A configured merge engine. Cheap to share; every merge is independent.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    fragments: Arc<dyn FragmentSource>,
    templates: Arc<dyn TemplateSource>,
    config: Arc<MergeConfig>,
}

impl MergeEngine {
    pub(super) fn new(
        fragments: Arc<dyn FragmentSource>,
        templates: Arc<dyn TemplateSource>,
        config: MergeConfig,
    ) -> Self {
        Self {
            fragments,
            templates,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Builds one document.
    ///
    /// Questions that cannot be used become numbered placeholders and are
    /// listed in the report; the merge itself only fails when no valid
    /// document can be produced.
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeOutput, MergeError> {
        log::info!(
            "merging {} questions into template '{}'",
            request.questions.len(),
            request.template
        );
        let bytes = self.load_template(&request.template)?;
        if hwpx::is_package(&bytes) {
            return self.merge_package(request, bytes);
        }
        let template = TemplateDocument::parse(&request.template, &bytes).map_err(MergeError::Template)?;
        let records = self.fetch_all(&request.questions)?;
        let outcomes = self.sanitize_all(&records);
        drop(records);

        let mut report = MergeReport {
            questions: request.questions.len(),
            ..MergeReport::default()
        };

        log::info!("allocating ids for {} fragments", outcomes.len());
        let mut session = MergeSession::new(
            template.definition_index(),
            template.max_instance_id(),
            self.config.sanitizer.unresolved_reference,
        );
        let mut blocks = Vec::with_capacity(outcomes.len());
        let mut degraded = Vec::new();
        for (position, outcome) in outcomes.into_iter().enumerate() {
            let rewritten = match outcome {
                FragmentOutcome::Sanitized(fragment) => session.rewrite(fragment),
                FragmentOutcome::Degraded(fault) => Err(fault),
            };
            blocks.push(into_block(position, rewritten, &mut report, &mut degraded));
        }
        let session = session.finish();

        log::info!("writing {} binaries", session.binaries.len());
        let storage = BinaryWriter::new(&self.config.binaries)
            .write(session.binaries.resources(), session.first_bin_item)?;
        let mapping = merge_mapping_table(template.mapping_table(), &session.definitions, &storage.items);
        let binary_storage = (template.binary_storage().is_some() || !storage.blobs.is_empty())
            .then(|| merge_storage(template.binary_storage(), &storage.blobs));
        check_cardinality(Some(&mapping), binary_storage.as_ref())?;

        let mut body = template
            .body()
            .cloned()
            .ok_or(MergeError::Template(PackageError::MissingBody))?;
        body.clear_spans();
        let packaging = &self.config.packaging;
        let date = format_date(request.date, packaging);
        substitute_metadata(&mut body, &request.title, &date, packaging);
        let point = locate_insertion(&mut body, &packaging.anchor).map_err(MergeError::Template)?;
        let assembled =
            BodyAssembler::new(&self.config.assembly).assemble(point.prelude.clone(), blocks);

        log::info!("validating merged document");
        let index = DefinitionIndex::from_header(Some(&mapping), binary_storage.as_ref());
        let mut validator = Validator::new(&index);
        validator.check_header(Some(&mapping), &session.definitions);
        validator.check_body("BODY", &body.children, &Origin::Template);
        validator.check_body(
            &point.container_name,
            &assembled.nodes[..assembled.prelude_len],
            &Origin::Template,
        );
        for slot in assembled.slots.iter().filter(|slot| !slot.degraded) {
            validator.check_body(
                &point.container_name,
                &assembled.nodes[slot.range.clone()],
                &Origin::Fragment(slot.question.clone()),
            );
        }
        let integrity = validator.finish();
        if integrity.has_fatal() {
            log::warn!("integrity check failed: {integrity}");
            return Err(MergeError::Integrity(integrity));
        }
        report.template_warnings = integrity.warnings().cloned().collect();

        summarize(
            &mut report,
            degraded,
            &assembled.slots,
            session.binaries.len(),
            &session.definitions,
        );

        insert_content(&mut body, &point, assembled.nodes)?;
        let bytes = Packager::new(&template).package(PackageParts {
            mapping: &mapping,
            body: &body,
            storage: binary_storage.as_ref(),
        })?;

        warn_if_degraded(&report);
        Ok(MergeOutput { bytes, report })
    }

    /// The merge for an HWPX package template.
    fn merge_package(&self, request: &MergeRequest, bytes: Vec<u8>) -> Result<MergeOutput, MergeError> {
        let template = HwpxTemplate::open(&request.template, bytes).map_err(MergeError::Template)?;
        let records = self.fetch_all(&request.questions)?;
        let prepared = self.prepare_all(&records);
        drop(records);

        let mut report = MergeReport {
            questions: request.questions.len(),
            ..MergeReport::default()
        };

        log::info!("allocating ids for {} package fragments", prepared.len());
        let mut session = template.session(self.config.sanitizer.unresolved_reference);
        let mut blocks = Vec::with_capacity(prepared.len());
        let mut degraded = Vec::new();
        for (position, fragment) in prepared.into_iter().enumerate() {
            let rewritten = fragment.map(|fragment| session.rewrite(fragment));
            blocks.push(into_block(position, rewritten, &mut report, &mut degraded));
        }
        let session = session.finish();

        let date = format_date(request.date, &self.config.packaging);
        let draft = template
            .compose(&session, blocks, &request.title, &date, &self.config)
            .map_err(MergeError::Template)?;

        log::info!("validating merged package");
        let integrity = draft.validate(&template);
        if integrity.has_fatal() {
            log::warn!("integrity check failed: {integrity}");
            return Err(MergeError::Integrity(integrity));
        }
        report.template_warnings = integrity.warnings().cloned().collect();
        summarize(
            &mut report,
            degraded,
            &draft.slots,
            session.binaries.len(),
            &session.definitions,
        );

        let bytes = draft.package(&template)?;
        warn_if_degraded(&report);
        Ok(MergeOutput { bytes, report })
    }

    fn load_template(&self, name: &str) -> Result<Vec<u8>, MergeError> {
        self.templates
            .load(name)
            .map(|data| data.as_ref().clone())
            .map_err(|source| MergeError::TemplateSource {
                name: name.to_string(),
                source,
            })
    }

    fn fetch_all(&self, questions: &[QuestionId]) -> Result<Vec<(QuestionId, FragmentRecord)>, MergeError> {
        log::info!("fetching {} fragments from {}", questions.len(), self.fragments.name());
        questions
            .iter()
            .map(|question| {
                self.fragments
                    .fetch(question)
                    .map(|record| (question.clone(), record))
                    .map_err(|source| MergeError::Fetch {
                        question: question.clone(),
                        source,
                    })
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn sanitize_all(&self, records: &[(QuestionId, FragmentRecord)]) -> Vec<FragmentOutcome> {
        use rayon::prelude::*;
        let sanitizer = Sanitizer::new(&self.config.sanitizer);
        records
            .par_iter()
            .map(|(question, record)| sanitizer.sanitize(question, record))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn sanitize_all(&self, records: &[(QuestionId, FragmentRecord)]) -> Vec<FragmentOutcome> {
        let sanitizer = Sanitizer::new(&self.config.sanitizer);
        records
            .iter()
            .map(|(question, record)| sanitizer.sanitize(question, record))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn prepare_all(&self, records: &[(QuestionId, FragmentRecord)]) -> Vec<Result<HwpxFragment, Degraded>> {
        use rayon::prelude::*;
        records
            .par_iter()
            .map(|(question, record)| hwpx::prepare(question, record, &self.config.sanitizer))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn prepare_all(&self, records: &[(QuestionId, FragmentRecord)]) -> Vec<Result<HwpxFragment, Degraded>> {
        records
            .iter()
            .map(|(question, record)| hwpx::prepare(question, record, &self.config.sanitizer))
            .collect()
    }
}

/// The block for one question, recording its warnings or its fault.
fn into_block(
    position: usize,
    rewritten: Result<RewrittenFragment, Degraded>,
    report: &mut MergeReport,
    degraded: &mut Vec<(usize, Degraded)>,
) -> QuestionBlock {
    match rewritten {
        Ok(fragment) => {
            report.warnings.extend(fragment.diagnostics.into_iter().map(|diagnostic| {
                QuestionWarning {
                    question: fragment.question.clone(),
                    diagnostic,
                }
            }));
            QuestionBlock {
                question: fragment.question,
                content: QuestionContent::Merged(fragment.body),
            }
        }
        Err(fault) => {
            degraded.push((position, fault.clone()));
            QuestionBlock {
                question: fault.question.clone(),
                content: QuestionContent::Placeholder(fault),
            }
        }
    }
}

fn summarize(
    report: &mut MergeReport,
    degraded: Vec<(usize, Degraded)>,
    slots: &[QuestionSlot],
    binaries: usize,
    definitions: &DefinitionSet,
) {
    report.degraded = degraded
        .into_iter()
        .map(|(position, fault)| DegradedQuestion {
            number: slots.get(position).map_or(0, |slot| slot.number),
            question: fault.question,
            stage: fault.stage,
            reason: fault.fault.to_string(),
        })
        .collect();
    report.binaries = binaries;
    report.new_definitions = definitions
        .iter()
        .map(|(category, _)| category.to_string())
        .counts()
        .into_iter()
        .collect();
}

fn warn_if_degraded(report: &MergeReport) {
    if report.is_degraded() {
        log::warn!(
            "document built with {} of {} questions degraded",
            report.degraded.len(),
            report.questions
        );
    }
}
