//! The merge session: rewrites sanitised fragments onto global ids.
//!
//! Definitions are resolved on demand. A definition's own references are
//! rewritten first, so its content can be compared against everything
//! the merged header already holds; an equivalent entry is reused rather
//! than allocated. Styles are matched by name and get their id before
//! their references are followed, which keeps `NextStyle` cycles finite.

use crate::allocator::{AllocationKey, IdAllocator};
use crate::config::ReferencePolicy;
use crate::dedup::BinaryRegistry;
use crate::definitions::{DefinitionEntry, DefinitionIndex, DefinitionSet, FragmentDefinitions, canonical_form};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{FragmentFault, Stage};
use crate::sanitizer::{DecodedBinary, Degraded, RefTarget, SanitizedFragment};
use crate::schema::{is_null_reference, references_of};
use quire_types::{DefinitionCategory, GlobalId, LocalId, QuestionId};
use quire_xml::tree::element_at_mut;
use quire_xml::{Element, Node, NodePath};
use std::collections::HashMap;

/// A fragment whose references all point into the merged header.
#[derive(Debug, Clone)]
pub struct RewrittenFragment {
    pub question: QuestionId,
    pub body: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything the session allocated.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub definitions: DefinitionSet,
    pub binaries: BinaryRegistry,
    pub ids: IdAllocator,
    /// First binary index position handed to a new binary.
    pub first_bin_item: GlobalId,
}

struct FragmentContext<'f> {
    question: &'f QuestionId,
    definitions: &'f FragmentDefinitions,
    binaries: &'f HashMap<LocalId, DecodedBinary>,
}

#[derive(Debug)]
pub struct MergeSession {
    index: DefinitionIndex,
    ids: IdAllocator,
    binaries: BinaryRegistry,
    added: DefinitionSet,
    next_instance: u32,
    first_bin_item: GlobalId,
    policy: ReferencePolicy,
}

impl MergeSession {
    /// Starts a session over the template's header index. New instance ids
    /// start above `max_instance`.
    pub fn new(index: DefinitionIndex, max_instance: Option<u32>, policy: ReferencePolicy) -> Self {
        let mut ids = IdAllocator::new();
        for category in DefinitionCategory::all() {
            if let Some(max) = index.max_id(category) {
                ids.reserve(category, max);
            }
        }
        let first_bin_item = ids.peek(DefinitionCategory::BinItem);
        Self {
            index,
            ids,
            binaries: BinaryRegistry::new(),
            added: DefinitionSet::default(),
            next_instance: max_instance.map_or(1, |max| max.saturating_add(1)),
            first_bin_item,
            policy,
        }
    }

    /// Rewrites every pending reference of a fragment and gives its shape
    /// objects fresh instance ids.
    pub fn rewrite(&mut self, fragment: SanitizedFragment) -> Result<RewrittenFragment, Degraded> {
        let SanitizedFragment {
            question,
            mut body,
            references,
            definitions,
            binaries,
            diagnostics,
        } = fragment;

        let missing = references.iter().find_map(|r| match &r.target {
            RefTarget::Binary { data } if !binaries.contains_key(data) => Some(data.clone()),
            _ => None,
        });
        if let Some(data) = missing {
            return Err(Degraded {
                question,
                stage: Stage::Allocate,
                fault: FragmentFault::MissingBinary(data),
            });
        }

        let mut notes = Diagnostics::default();
        notes.extend(diagnostics);
        let ctx = FragmentContext {
            question: &question,
            definitions: &definitions,
            binaries: &binaries,
        };

        for reference in references {
            let resolved = match &reference.target {
                RefTarget::Definition { category, local } => {
                    self.resolve_definition(&ctx, *category, local, &mut notes)
                }
                RefTarget::Binary { data } => self.resolve_binary(&ctx, data),
            };
            let Some(el) = element_at_mut(&mut body, &reference.path) else {
                log::warn!(
                    "reference path {:?} no longer exists in {question}",
                    reference.path
                );
                continue;
            };
            match resolved {
                Some(id) => el.set_attr(reference.attribute, id),
                None => {
                    el.remove_attr(reference.attribute);
                }
            }
        }

        for node in &mut body {
            if let Node::Element(el) = node {
                self.assign_instance_ids(el);
            }
        }

        Ok(RewrittenFragment {
            question,
            body,
            diagnostics: notes.into_vec(),
        })
    }

    fn resolve_definition(
        &mut self,
        ctx: &FragmentContext<'_>,
        category: DefinitionCategory,
        local: &LocalId,
        notes: &mut Diagnostics,
    ) -> Option<GlobalId> {
        let key = AllocationKey::new(category, ctx.question, local);
        if let Some(id) = self.ids.lookup(&key) {
            return Some(id);
        }
        let Some(source) = ctx.definitions.get(category, local) else {
            return self.unresolved(category, local, notes);
        };

        if category == DefinitionCategory::Style {
            if let Some(existing) = source.attr("Name").and_then(|name| self.index.style_named(name)) {
                return Some(self.ids.bind(key, existing));
            }
            let id = self.ids.resolve(key);
            let mut element = source.clone();
            self.rewrite_internal(ctx, &mut element, notes);
            self.add(ctx, category, id, local, element);
            return Some(id);
        }

        let mut element = source.clone();
        self.rewrite_internal(ctx, &mut element, notes);
        if let Some(existing) = self.index.find_equivalent(category, &canonical_form(&element)) {
            log::trace!("{category} {local} of {} reuses {existing}", ctx.question);
            return Some(self.ids.bind(key, existing));
        }
        let id = self.ids.resolve(key);
        self.add(ctx, category, id, local, element);
        Some(id)
    }

    fn add(
        &mut self,
        ctx: &FragmentContext<'_>,
        category: DefinitionCategory,
        id: GlobalId,
        local: &LocalId,
        mut element: Element,
    ) {
        element.set_attr("Id", id);
        element.clear_spans();
        self.index.insert(category, id, &element);
        self.added.push(
            category,
            DefinitionEntry {
                id,
                element,
                origin: (ctx.question.clone(), local.clone()),
            },
        );
    }

    /// Rewrites the references a definition makes to other definitions.
    fn rewrite_internal(
        &mut self,
        ctx: &FragmentContext<'_>,
        element: &mut Element,
        notes: &mut Diagnostics,
    ) {
        let mut found = Vec::new();
        collect_definition_refs(element, &mut NodePath::new(), &mut found);
        for (path, attribute, category, local) in found {
            let resolved = self.resolve_definition(ctx, category, &local, notes);
            let Some(target) = element.at_path_mut(&path) else {
                continue;
            };
            match resolved {
                Some(id) => target.set_attr(attribute, id),
                None => {
                    target.remove_attr(attribute);
                }
            }
        }
    }

    fn unresolved(
        &mut self,
        category: DefinitionCategory,
        local: &LocalId,
        notes: &mut Diagnostics,
    ) -> Option<GlobalId> {
        let template_id = match self.policy {
            ReferencePolicy::TemplateFallback => local
                .as_number()
                .map(GlobalId::new)
                .filter(|id| self.index.contains(category, id.get()))
                .filter(|id| self.added.origin_of(category, *id).is_none()),
            ReferencePolicy::Strip => None,
        };
        notes.push(Diagnostic::UnresolvedReference {
            category,
            local: local.clone(),
            fallback: template_id.is_some(),
        });
        template_id
    }

    fn resolve_binary(&mut self, ctx: &FragmentContext<'_>, data: &LocalId) -> Option<GlobalId> {
        let key = AllocationKey::new(DefinitionCategory::BinItem, ctx.question, data);
        if let Some(id) = self.ids.lookup(&key) {
            return Some(id);
        }
        let binary = ctx.binaries.get(data)?;
        let handle = self.binaries.register(
            &mut self.ids,
            ctx.question,
            data,
            binary.format.clone(),
            &binary.bytes,
        );
        Some(handle.item_id)
    }

    fn assign_instance_ids(&mut self, element: &mut Element) {
        element.visit_mut(&mut |el| {
            if el.name == "SHAPEOBJECT" {
                el.set_attr("InstId", self.next_instance);
                self.next_instance = self.next_instance.saturating_add(1);
            }
        });
    }

    pub fn index(&self) -> &DefinitionIndex {
        &self.index
    }

    pub fn definitions(&self) -> &DefinitionSet {
        &self.added
    }

    pub fn binaries(&self) -> &BinaryRegistry {
        &self.binaries
    }

    pub fn finish(self) -> SessionOutput {
        log::debug!(
            "session finished: {} definitions added, {} binaries stored, {} local ids bound",
            self.added.len(),
            self.binaries.len(),
            self.ids.bound_count()
        );
        SessionOutput {
            definitions: self.added,
            binaries: self.binaries,
            ids: self.ids,
            first_bin_item: self.first_bin_item,
        }
    }
}

type DefinitionRef = (NodePath, &'static str, DefinitionCategory, LocalId);

fn collect_definition_refs(element: &Element, path: &mut NodePath, found: &mut Vec<DefinitionRef>) {
    for reference in references_of(&element.name) {
        if let Some(value) = element.attr(reference.attribute).filter(|v| !is_null_reference(v)) {
            found.push((
                path.clone(),
                reference.attribute,
                reference.category,
                LocalId::from(value.trim()),
            ));
        }
    }
    for (index, child) in element.children.iter().enumerate() {
        if let Node::Element(child) = child {
            path.push(index);
            collect_definition_refs(child, path, found);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizerConfig;
    use crate::sanitizer::{FragmentOutcome, Sanitizer};
    use quire_traits::{BinaryPayload, FragmentRecord};
    use quire_types::BinaryFormat;
    use quire_xml::{parse_document, write_nodes};

    const TEMPLATE_MAPPING: &str = r#"<MAPPINGTABLE>
        <FACENAMELIST Count="1"><FONTFACE Lang="Hangul" Count="1"><FONT Id="0" Name="Batang" Type="ttf"/></FONTFACE></FACENAMELIST>
        <BORDERFILLLIST Count="1"><BORDERFILL Id="1" ThreeD="false"/></BORDERFILLLIST>
        <CHARSHAPELIST Count="1"><CHARSHAPE Id="0" Height="1000"><FONTID Hangul="0"/></CHARSHAPE></CHARSHAPELIST>
        <PARASHAPELIST Count="1"><PARASHAPE Id="0" Align="Justify"/></PARASHAPELIST>
        <STYLELIST Count="1"><STYLE Id="0" Name="Normal" ParaShape="0" CharShape="0" NextStyle="0"/></STYLELIST>
    </MAPPINGTABLE>"#;

    fn session(policy: ReferencePolicy) -> MergeSession {
        let mapping = parse_document(TEMPLATE_MAPPING).unwrap();
        MergeSession::new(DefinitionIndex::from_header(Some(&mapping), None), Some(100), policy)
    }

    fn sanitized(question: &str, record: FragmentRecord) -> SanitizedFragment {
        match Sanitizer::new(&SanitizerConfig::default()).sanitize(&QuestionId::from(question), &record) {
            FragmentOutcome::Sanitized(f) => f,
            FragmentOutcome::Degraded(d) => panic!("degraded: {}", d.fault),
        }
    }

    const DEFS: &str = r#"<MAPPINGTABLE>
        <FACENAMELIST><FONTFACE Lang="Hangul"><FONT Id="0" Name="Gulim" Type="ttf"/></FONTFACE></FACENAMELIST>
        <CHARSHAPELIST>
            <CHARSHAPE Id="0" Height="1000"><FONTID Hangul="0"/></CHARSHAPE>
            <CHARSHAPE Id="1" Height="1400"><FONTID Hangul="0"/></CHARSHAPE>
        </CHARSHAPELIST>
        <PARASHAPELIST><PARASHAPE Id="0" Align="Center"/></PARASHAPELIST>
        <STYLELIST>
            <STYLE Id="0" Name="Normal" ParaShape="0" CharShape="0" NextStyle="0"/>
            <STYLE Id="1" Name="Question" ParaShape="0" CharShape="1" NextStyle="1"/>
        </STYLELIST>
    </MAPPINGTABLE>"#;

    #[test]
    fn definitions_are_renumbered_above_the_template() {
        let mut session = session(ReferencePolicy::TemplateFallback);
        let fragment = sanitized(
            "q1",
            FragmentRecord::new(r#"<P Style="1" ParaShape="0"><TEXT CharShape="1"><CHAR>x</CHAR></TEXT></P>"#)
                .with_definitions(DEFS),
        );
        let out = session.rewrite(fragment).unwrap();
        let markup = write_nodes(&out.body).unwrap();
        assert_eq!(markup, r#"<P Style="1" ParaShape="1"><TEXT CharShape="1"><CHAR>x</CHAR></TEXT></P>"#);

        let added = session.definitions();
        let font = &added.entries(DefinitionCategory::FontFace(quire_types::FontLang::Hangul))[0];
        assert_eq!(font.id, GlobalId::new(1));
        let shape = &added.entries(DefinitionCategory::CharShape)[0];
        assert_eq!(shape.element.attr("Id"), Some("1"));
        assert_eq!(shape.element.child("FONTID").unwrap().attr("Hangul"), Some("1"));
        let style = &added.entries(DefinitionCategory::Style)[0];
        assert_eq!(style.element.attr("NextStyle"), Some("1"));
        assert_eq!(style.element.attr("CharShape"), Some("1"));
    }

    #[test]
    fn equivalent_definitions_are_reused() {
        let mut session = session(ReferencePolicy::TemplateFallback);
        let defs = r#"<BORDERFILLLIST><BORDERFILL Id="7" ThreeD="false"/></BORDERFILLLIST>"#;
        let fragment = sanitized(
            "q1",
            FragmentRecord::new(r#"<P><TEXT><TABLE BorderFill="7"/></TEXT></P>"#).with_definitions(defs),
        );
        let out = session.rewrite(fragment).unwrap();
        assert!(write_nodes(&out.body).unwrap().contains(r#"BorderFill="1""#));
        assert!(session.definitions().is_empty());
    }

    #[test]
    fn same_local_id_in_two_questions_gets_two_ids() {
        let mut session = session(ReferencePolicy::TemplateFallback);
        let defs_a = r#"<PARASHAPELIST><PARASHAPE Id="3" Align="Left"/></PARASHAPELIST>"#;
        let defs_b = r#"<PARASHAPELIST><PARASHAPE Id="3" Align="Right"/></PARASHAPELIST>"#;
        let a = sanitized("a", FragmentRecord::new(r#"<P ParaShape="3"/>"#).with_definitions(defs_a));
        let b = sanitized("b", FragmentRecord::new(r#"<P ParaShape="3"/>"#).with_definitions(defs_b));
        let a = write_nodes(&session.rewrite(a).unwrap().body).unwrap();
        let b = write_nodes(&session.rewrite(b).unwrap().body).unwrap();
        assert_eq!(a, r#"<P ParaShape="1"/>"#);
        assert_eq!(b, r#"<P ParaShape="2"/>"#);
    }

    #[test]
    fn unresolved_reference_falls_back_or_strips() {
        let record = FragmentRecord::new(r#"<P ParaShape="0"><TEXT CharShape="9"><CHAR>x</CHAR></TEXT></P>"#);

        let mut fallback = session(ReferencePolicy::TemplateFallback);
        let out = fallback.rewrite(sanitized("q", record.clone())).unwrap();
        assert_eq!(
            write_nodes(&out.body).unwrap(),
            r#"<P ParaShape="0"><TEXT><CHAR>x</CHAR></TEXT></P>"#
        );
        assert!(out.diagnostics.contains(&Diagnostic::UnresolvedReference {
            category: DefinitionCategory::CharShape,
            local: LocalId::from("9"),
            fallback: false,
        }));

        let mut strip = session(ReferencePolicy::Strip);
        let out = strip.rewrite(sanitized("q", record)).unwrap();
        assert_eq!(write_nodes(&out.body).unwrap(), "<P><TEXT><CHAR>x</CHAR></TEXT></P>");
    }

    #[test]
    fn binaries_are_registered_once() {
        let mut session = session(ReferencePolicy::TemplateFallback);
        let picture = r#"<P><TEXT><PICTURE><IMAGE BinItem="5"/></PICTURE></TEXT></P>"#;
        let a = sanitized(
            "a",
            FragmentRecord::new(picture).with_binary(BinaryPayload::raw("5", BinaryFormat::Png, b"img".to_vec())),
        );
        let b = sanitized(
            "b",
            FragmentRecord::new(picture).with_binary(BinaryPayload::raw("5", BinaryFormat::Png, b"img".to_vec())),
        );
        let a = write_nodes(&session.rewrite(a).unwrap().body).unwrap();
        let b = write_nodes(&session.rewrite(b).unwrap().body).unwrap();
        assert!(a.contains(r#"<IMAGE BinItem="1""#));
        assert!(b.contains(r#"<IMAGE BinItem="1""#));
        assert_eq!(session.binaries().len(), 1);
    }

    #[test]
    fn shape_objects_get_instance_ids_above_the_template() {
        let mut session = session(ReferencePolicy::TemplateFallback);
        let fragment = sanitized(
            "q",
            FragmentRecord::new(r#"<P><TEXT><TABLE><SHAPEOBJECT InstId="5"/></TABLE><EQUATION><SHAPEOBJECT/></EQUATION></TEXT></P>"#),
        );
        let markup = write_nodes(&session.rewrite(fragment).unwrap().body).unwrap();
        assert!(markup.contains(r#"InstId="101""#));
        assert!(markup.contains(r#"InstId="102""#));
    }
}
