//! Header definitions: indexing what a header holds, collecting what a
//! fragment brings, and merging new entries into the output header.

use crate::schema::MAPPING_LISTS;
use itertools::Itertools;
use quire_types::{DefinitionCategory, FontLang, GlobalId, LocalId, QuestionId};
use quire_xml::{Element, Node, write_element};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Content identity of a definition: its markup without `Id`, with
/// attributes sorted at every level.
pub fn canonical_form(element: &Element) -> String {
    let mut canonical = element.clone();
    canonical.remove_attr("Id");
    canonical.visit_mut(&mut |el| {
        el.span = None;
        el.attributes.sort_by(|a, b| a.name.cmp(&b.name));
        el.children.retain(|n| !n.is_blank_text());
    });
    write_element(&canonical).unwrap_or_else(|_| format!("{canonical:?}"))
}

/// Visits every definition entry in a header subtree.
///
/// Lists may be nested in any wrapper (`HEAD`, `MAPPINGTABLE`) or be given
/// bare. Binary index entries are reported with their 1-based position.
pub(crate) fn for_each_entry<'a>(element: &'a Element, f: &mut impl FnMut(DefinitionCategory, u32, &'a Element)) {
    let mut bin_position = 0;
    walk_entries(element, &mut bin_position, f);
}

fn walk_entries<'a>(
    element: &'a Element,
    bin_position: &mut u32,
    f: &mut impl FnMut(DefinitionCategory, u32, &'a Element),
) {
    let id = || element.attr("Id").and_then(|v| v.trim().parse::<u32>().ok());
    match element.name.as_str() {
        "FONTFACE" => {
            let Some(lang) = element.attr("Lang").and_then(FontLang::from_name) else {
                log::warn!("font face list without a known Lang attribute skipped");
                return;
            };
            for font in element.elements().filter(|el| el.name == "FONT") {
                if let Some(id) = font.attr("Id").and_then(|v| v.trim().parse().ok()) {
                    f(DefinitionCategory::FontFace(lang), id, font);
                }
            }
        }
        "BORDERFILL" | "CHARSHAPE" | "PARASHAPE" | "STYLE" => {
            let category = match element.name.as_str() {
                "BORDERFILL" => DefinitionCategory::BorderFill,
                "CHARSHAPE" => DefinitionCategory::CharShape,
                "PARASHAPE" => DefinitionCategory::ParaShape,
                _ => DefinitionCategory::Style,
            };
            if let Some(id) = id() {
                f(category, id, element);
            }
        }
        "BINITEM" => {
            *bin_position += 1;
            f(DefinitionCategory::BinItem, *bin_position, element);
        }
        "BINDATA" => {
            if let Some(id) = id() {
                f(DefinitionCategory::BinData, id, element);
            }
        }
        _ => {
            for child in element.elements() {
                walk_entries(child, bin_position, f);
            }
        }
    }
}

/// Ids, content signatures and style names present in a header.
#[derive(Debug, Clone, Default)]
pub struct DefinitionIndex {
    ids: HashMap<DefinitionCategory, BTreeSet<u32>>,
    signatures: HashMap<(DefinitionCategory, String), u32>,
    styles: HashMap<String, u32>,
    /// Largest storage id any binary index entry points at.
    bin_data_floor: Option<u32>,
}

impl DefinitionIndex {
    /// Indexes a header's `MAPPINGTABLE` and binary storage.
    pub fn from_header(mapping: Option<&Element>, storage: Option<&Element>) -> Self {
        let mut index = Self::default();
        for part in mapping.into_iter().chain(storage) {
            for_each_entry(part, &mut |category, id, element| {
                index.insert(category, GlobalId::new(id), element);
            });
        }
        index
    }

    /// Records a definition under a global id.
    pub fn insert(&mut self, category: DefinitionCategory, id: GlobalId, element: &Element) {
        let id = id.get();
        self.ids.entry(category).or_default().insert(id);
        match category {
            DefinitionCategory::BinItem => {
                if let Some(data) = element.attr("BinData").and_then(|v| v.trim().parse().ok()) {
                    self.bin_data_floor = Some(self.bin_data_floor.map_or(data, |f: u32| f.max(data)));
                }
            }
            DefinitionCategory::BinData => {}
            DefinitionCategory::Style => {
                if let Some(name) = element.attr("Name") {
                    self.styles.entry(name.to_string()).or_insert(id);
                }
                self.signatures
                    .entry((category, canonical_form(element)))
                    .or_insert(id);
            }
            _ => {
                self.signatures
                    .entry((category, canonical_form(element)))
                    .or_insert(id);
            }
        }
    }

    pub fn contains(&self, category: DefinitionCategory, id: u32) -> bool {
        self.ids.get(&category).is_some_and(|ids| ids.contains(&id))
    }

    /// Largest id in use, counting storage ids the binary index points at.
    pub fn max_id(&self, category: DefinitionCategory) -> Option<u32> {
        let defined = self.ids.get(&category).and_then(|ids| ids.last().copied());
        match category {
            DefinitionCategory::BinData => defined.max(self.bin_data_floor),
            _ => defined,
        }
    }

    pub fn count(&self, category: DefinitionCategory) -> usize {
        self.ids.get(&category).map_or(0, BTreeSet::len)
    }

    /// An existing definition with the same content.
    pub fn find_equivalent(&self, category: DefinitionCategory, canonical: &str) -> Option<GlobalId> {
        self.signatures
            .get(&(category, canonical.to_string()))
            .copied()
            .map(GlobalId::new)
    }

    pub fn style_named(&self, name: &str) -> Option<GlobalId> {
        self.styles.get(name).copied().map(GlobalId::new)
    }
}

/// Definitions a fragment supplies, keyed by their local ids.
#[derive(Debug, Clone, Default)]
pub struct FragmentDefinitions {
    entries: HashMap<(DefinitionCategory, u32), Element>,
    bin_items: Vec<Element>,
}

impl FragmentDefinitions {
    /// Collects every definition found under `element`.
    pub fn collect(&mut self, element: &Element) {
        for_each_entry(element, &mut |category, id, entry| match category {
            DefinitionCategory::BinItem => self.bin_items.push(entry.clone()),
            DefinitionCategory::BinData => {}
            _ => {
                self.entries.entry((category, id)).or_insert_with(|| entry.clone());
            }
        });
    }

    pub fn get(&self, category: DefinitionCategory, local: &LocalId) -> Option<&Element> {
        let id = local.as_number()?;
        self.entries.get(&(category, id))
    }

    /// Storage id behind a 1-based binary index position, if the fragment
    /// declares its own binary index.
    pub fn bin_data_for(&self, item: &LocalId) -> Option<LocalId> {
        let position = item.as_number()? as usize;
        let entry = self.bin_items.get(position.checked_sub(1)?)?;
        entry.attr("BinData").map(LocalId::from)
    }

    /// Declared format of the binary index entry pointing at `data`.
    pub fn bin_format_for(&self, data: &LocalId) -> Option<&str> {
        self.bin_items
            .iter()
            .find(|item| item.attr("BinData") == Some(data.as_str()))
            .and_then(|item| item.attr("Format"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.bin_items.is_empty()
    }
}

/// A definition added to the output header.
#[derive(Debug, Clone)]
pub struct DefinitionEntry {
    pub id: GlobalId,
    pub element: Element,
    pub origin: (QuestionId, LocalId),
}

/// Definitions added during a merge, per category in allocation order.
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    entries: BTreeMap<DefinitionCategory, Vec<DefinitionEntry>>,
}

impl DefinitionSet {
    pub fn push(&mut self, category: DefinitionCategory, entry: DefinitionEntry) {
        self.entries.entry(category).or_default().push(entry);
    }

    /// Replaces the element of an entry added earlier.
    pub fn update(&mut self, category: DefinitionCategory, id: GlobalId, element: Element) {
        if let Some(entry) = self
            .entries
            .get_mut(&category)
            .and_then(|list| list.iter_mut().find(|e| e.id == id))
        {
            entry.element = element;
        }
    }

    pub fn entries(&self, category: DefinitionCategory) -> &[DefinitionEntry] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefinitionCategory, &DefinitionEntry)> {
        self.entries
            .iter()
            .flat_map(|(category, list)| list.iter().map(move |e| (*category, e)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The question a new definition came from.
    pub fn origin_of(&self, category: DefinitionCategory, id: GlobalId) -> Option<&QuestionId> {
        self.entries(category)
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.origin.0)
    }
}

/// The template's `MAPPINGTABLE` with new definitions and binary index
/// entries appended and every list count corrected.
pub fn merge_mapping_table(
    template: Option<&Element>,
    added: &DefinitionSet,
    bin_items: &[Element],
) -> Element {
    let mut mapping = template
        .cloned()
        .unwrap_or_else(|| Element::new("MAPPINGTABLE"));
    mapping.clear_spans();

    let mut touched = BTreeSet::new();
    for (category, entries) in &added.entries {
        if category.is_binary() || entries.is_empty() {
            continue;
        }
        let Some(list) = list_for(&mut mapping, *category) else {
            continue;
        };
        list.children.extend(
            entries
                .iter()
                .sorted_by_key(|e| e.id)
                .map(|e| Node::Element(e.element.clone())),
        );
        touched.insert(list_name(*category));
    }
    if !bin_items.is_empty() {
        if let Some(list) = ensure_list(&mut mapping, "BINDATALIST") {
            list.children.extend(bin_items.iter().cloned().map(Node::Element));
            touched.insert("BINDATALIST");
        }
    }

    fix_counts(&mut mapping, &touched);
    log::debug!(
        "header merged: {} new definitions, {} new binary items ({})",
        added.len(),
        bin_items.len(),
        touched.iter().join(", ")
    );
    mapping
}

fn list_name(category: DefinitionCategory) -> &'static str {
    match category {
        DefinitionCategory::FontFace(_) => "FACENAMELIST",
        other => other.list_tag(),
    }
}

fn list_for(mapping: &mut Element, category: DefinitionCategory) -> Option<&mut Element> {
    let list = ensure_list(mapping, list_name(category))?;
    let DefinitionCategory::FontFace(lang) = category else {
        return Some(list);
    };
    let position = list
        .children
        .iter()
        .position(|n| {
            n.as_element()
                .is_some_and(|el| el.name == "FONTFACE" && el.attr("Lang") == Some(lang.as_str()))
        });
    let index = match position {
        Some(index) => index,
        None => {
            let rank = |el: &Element| {
                el.attr("Lang")
                    .and_then(FontLang::from_name)
                    .and_then(|l| FontLang::ALL.iter().position(|x| *x == l))
            };
            let own = FontLang::ALL.iter().position(|x| *x == lang);
            let at = list
                .children
                .iter()
                .position(|n| n.as_element().is_some_and(|el| rank(el) > own))
                .unwrap_or(list.children.len());
            let face = Element::new("FONTFACE")
                .with_attr("Lang", lang.as_str())
                .with_attr("Count", 0);
            list.children.insert(at, Node::Element(face));
            at
        }
    };
    list.children[index].as_element_mut()
}

/// The direct child list `name`, created at its canonical position.
fn ensure_list<'a>(mapping: &'a mut Element, name: &'static str) -> Option<&'a mut Element> {
    let index = match mapping.child_index(name) {
        Some(index) => index,
        None => {
            let rank = |n: &str| MAPPING_LISTS.iter().position(|l| *l == n);
            let own = rank(name);
            let at = mapping
                .children
                .iter()
                .position(|n| n.as_element().is_some_and(|el| rank(&el.name) > own))
                .unwrap_or(mapping.children.len());
            mapping
                .children
                .insert(at, Node::Element(Element::new(name).with_attr("Count", 0)));
            at
        }
    };
    mapping.children[index].as_element_mut()
}

/// Sets `Count` to the number of entries on every list that declares one,
/// and on every list this merge touched.
fn fix_counts(mapping: &mut Element, touched: &BTreeSet<&str>) {
    for list in mapping.elements_mut() {
        if !MAPPING_LISTS.contains(&list.name.as_str()) {
            continue;
        }
        if list.name == "FACENAMELIST" {
            for face in list.elements_mut().filter(|el| el.name == "FONTFACE") {
                let fonts = face.elements().filter(|el| el.name == "FONT").count();
                face.set_attr("Count", fonts);
            }
        }
        if list.has_attr("Count") || touched.contains(list.name.as_str()) {
            let count = list.elements().count();
            list.set_attr("Count", count);
        }
    }
}
