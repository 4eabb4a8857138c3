//! Rewrites prepared HWPX questions onto the template's header ids.
//!
//! Works like the HML session: definitions resolve on demand, equivalent
//! entries are reused, styles match by name. Images are renamed to
//! `image{n}` package items, one per distinct payload.

use super::fragment::{HwpxFragment, OwpmlDefinitions};
use super::owpml::{self, is, is_null_reference, references_of};
use crate::allocator::{AllocationKey, IdAllocator};
use crate::config::ReferencePolicy;
use crate::dedup::BinaryRegistry;
use crate::definitions::{DefinitionEntry, DefinitionIndex, DefinitionSet, canonical_form};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::sanitizer::DecodedBinary;
use crate::session::RewrittenFragment;
use quire_types::{DefinitionCategory, GlobalId, LocalId, QuestionId};
use quire_xml::{Element, Node};
use std::collections::HashMap;

/// Prefix of package binary item ids.
pub const ITEM_PREFIX: &str = "image";

pub fn item_name(id: GlobalId) -> String {
    format!("{ITEM_PREFIX}{id}")
}

/// The number of an `image{n}` item id.
pub fn item_number(name: &str) -> Option<u32> {
    name.strip_prefix(ITEM_PREFIX)?.parse().ok()
}

/// Content identity of a header entry, ignoring its `id`.
pub(crate) fn entry_signature(element: &Element) -> String {
    let mut bare = element.clone();
    bare.remove_attr("id");
    canonical_form(&bare)
}

/// Ids, content and style names of the template header.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    definitions: DefinitionIndex,
    styles: HashMap<String, GlobalId>,
}

impl HeaderIndex {
    pub fn from_header(header: &Element) -> Self {
        let mut index = Self::default();
        owpml::for_each_entry(header, &mut |category, id, element| match id.parse::<u32>() {
            Ok(id) => index.insert(category, GlobalId::new(id), element),
            Err(_) => log::debug!("{category} entry with non-numeric id '{id}' not indexed"),
        });
        index
    }

    pub fn insert(&mut self, category: DefinitionCategory, id: GlobalId, element: &Element) {
        let mut bare = element.clone();
        bare.remove_attr("id");
        self.definitions.insert(category, id, &bare);
        if category == DefinitionCategory::Style {
            if let Some(name) = element.attr("name") {
                self.styles.entry(name.to_string()).or_insert(id);
            }
        }
    }

    pub fn contains(&self, category: DefinitionCategory, id: u32) -> bool {
        self.definitions.contains(category, id)
    }

    pub fn max_id(&self, category: DefinitionCategory) -> Option<u32> {
        self.definitions.max_id(category)
    }

    fn find_equivalent(&self, category: DefinitionCategory, element: &Element) -> Option<GlobalId> {
        self.definitions.find_equivalent(category, &entry_signature(element))
    }

    fn style_named(&self, name: &str) -> Option<GlobalId> {
        self.styles.get(name).copied()
    }
}

/// What an HWPX session allocated.
#[derive(Debug, Clone, Default)]
pub struct HwpxSessionOutput {
    pub definitions: DefinitionSet,
    pub binaries: BinaryRegistry,
}

struct Context<'f> {
    question: &'f QuestionId,
    definitions: &'f OwpmlDefinitions,
    binaries: &'f HashMap<LocalId, DecodedBinary>,
}

#[derive(Debug)]
pub struct HwpxSession {
    index: HeaderIndex,
    ids: IdAllocator,
    binaries: BinaryRegistry,
    added: DefinitionSet,
    policy: ReferencePolicy,
}

impl HwpxSession {
    /// New ids start above the template's. Binary items start above
    /// `max_item`, the largest `image{n}` the package already holds.
    pub fn new(index: HeaderIndex, max_item: Option<u32>, policy: ReferencePolicy) -> Self {
        let mut ids = IdAllocator::new();
        for category in DefinitionCategory::all() {
            if let Some(max) = index.max_id(category) {
                ids.reserve(category, max);
            }
        }
        if let Some(max) = max_item {
            ids.reserve(DefinitionCategory::BinItem, max);
            ids.reserve(DefinitionCategory::BinData, max);
        }
        Self {
            index,
            ids,
            binaries: BinaryRegistry::new(),
            added: DefinitionSet::default(),
            policy,
        }
    }

    pub fn rewrite(&mut self, fragment: HwpxFragment) -> RewrittenFragment {
        let HwpxFragment {
            question,
            mut paragraphs,
            definitions,
            binaries,
            diagnostics,
        } = fragment;
        let mut notes = Diagnostics::default();
        notes.extend(diagnostics);
        let ctx = Context {
            question: &question,
            definitions: &definitions,
            binaries: &binaries,
        };
        for paragraph in &mut paragraphs {
            paragraph.clear_spans();
            self.rewrite_references(&ctx, paragraph, &mut notes);
        }
        RewrittenFragment {
            question: question.clone(),
            body: paragraphs.into_iter().map(Node::Element).collect(),
            diagnostics: notes.into_vec(),
        }
    }

    /// Rewrites every reference at or below `element`.
    fn rewrite_references(&mut self, ctx: &Context<'_>, element: &mut Element, notes: &mut Diagnostics) {
        for reference in references_of(&element.name) {
            let Some(value) = element.attr(reference.attribute).filter(|v| !is_null_reference(v)) else {
                continue;
            };
            let local = LocalId::from(value.trim());
            match self.resolve_definition(ctx, reference.category, &local, notes) {
                Some(id) => element.set_attr(reference.attribute, id),
                None => {
                    element.remove_attr(reference.attribute);
                }
            }
        }
        if is(&element.name, owpml::IMAGE) {
            if let Some(value) = element.attr(owpml::BINARY_REF).filter(|v| !is_null_reference(v)) {
                let local = LocalId::from(value.trim());
                if let Some(id) = self.resolve_binary(ctx, &local) {
                    element.set_attr(owpml::BINARY_REF, item_name(id));
                }
            }
        }
        for child in element.elements_mut() {
            self.rewrite_references(ctx, child, notes);
        }
    }

    fn resolve_definition(
        &mut self,
        ctx: &Context<'_>,
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
            if let Some(existing) = source.attr("name").and_then(|name| self.index.style_named(name)) {
                return Some(self.ids.bind(key, existing));
            }
            let id = self.ids.resolve(key);
            let element = self.rewrite_entry(ctx, source, notes);
            self.add(ctx, category, id, local, element);
            return Some(id);
        }

        let element = self.rewrite_entry(ctx, source, notes);
        if let Some(existing) = self.index.find_equivalent(category, &element) {
            log::trace!("{category} {local} of {} reuses {existing}", ctx.question);
            return Some(self.ids.bind(key, existing));
        }
        let id = self.ids.resolve(key);
        self.add(ctx, category, id, local, element);
        Some(id)
    }

    /// A copy of a definition with its own references rewritten.
    fn rewrite_entry(&mut self, ctx: &Context<'_>, source: &Element, notes: &mut Diagnostics) -> Element {
        let mut element = source.clone();
        element.clear_spans();
        self.rewrite_references(ctx, &mut element, notes);
        element
    }

    fn add(&mut self, ctx: &Context<'_>, category: DefinitionCategory, id: GlobalId, local: &LocalId, mut element: Element) {
        element.set_attr("id", id);
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

    fn unresolved(&mut self, category: DefinitionCategory, local: &LocalId, notes: &mut Diagnostics) -> Option<GlobalId> {
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

    fn resolve_binary(&mut self, ctx: &Context<'_>, local: &LocalId) -> Option<GlobalId> {
        let key = AllocationKey::new(DefinitionCategory::BinItem, ctx.question, local);
        if let Some(id) = self.ids.lookup(&key) {
            return Some(id);
        }
        let binary = ctx.binaries.get(local)?;
        let handle = self.binaries.register(
            &mut self.ids,
            ctx.question,
            local,
            binary.format.clone(),
            &binary.bytes,
        );
        Some(handle.item_id)
    }

    pub fn definitions(&self) -> &DefinitionSet {
        &self.added
    }

    pub fn finish(self) -> HwpxSessionOutput {
        log::debug!(
            "hwpx session finished: {} definitions added, {} binaries stored",
            self.added.len(),
            self.binaries.len()
        );
        HwpxSessionOutput {
            definitions: self.added,
            binaries: self.binaries,
        }
    }
}
