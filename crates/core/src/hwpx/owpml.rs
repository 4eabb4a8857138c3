//! The OWPML vocabulary inside HWPX packages.
//!
//! Producers disagree on namespace prefixes (`hp:p`, `p`, `hwpml:p`), so
//! every lookup here goes by local name.

use quire_types::{DefinitionCategory, FontLang};
use quire_xml::Element;

pub const PARAGRAPH: &str = "p";
pub const RUN: &str = "run";
pub const TEXT: &str = "t";
pub const SECTION: &str = "sec";
pub const SECTION_PROPERTIES: &str = "secPr";
pub const PICTURE: &str = "pic";
pub const IMAGE: &str = "img";
pub const BINARY_REF: &str = "binaryItemIDRef";
pub const REF_LIST: &str = "refList";
pub const FONT_FACES: &str = "fontfaces";
pub const FONT_FACE: &str = "fontface";
pub const FONT: &str = "font";
pub const FONT_REF: &str = "fontRef";
pub const MANIFEST: &str = "manifest";
pub const MANIFEST_ITEM: &str = "item";

/// Ids meaning "no reference".
const NULL_REFERENCES: &[&str] = &["4294967295", "-1"];

pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

pub fn is(name: &str, local: &str) -> bool {
    local_name(name) == local
}

/// `local` with the namespace prefix `like` uses.
pub fn qualified(like: &str, local: &str) -> String {
    match like.split_once(':') {
        Some((prefix, _)) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

pub fn is_null_reference(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || NULL_REFERENCES.contains(&value)
}

/// Local name of the list holding a category's entries, below `refList`.
pub fn list_name(category: DefinitionCategory) -> Option<&'static str> {
    match category {
        DefinitionCategory::FontFace(_) => Some(FONT_FACES),
        DefinitionCategory::BorderFill => Some("borderFills"),
        DefinitionCategory::CharShape => Some("charProperties"),
        DefinitionCategory::ParaShape => Some("paraProperties"),
        DefinitionCategory::Style => Some("styles"),
        DefinitionCategory::BinItem | DefinitionCategory::BinData => None,
    }
}

/// The category of a non-font entry element.
pub fn entry_category(local: &str) -> Option<DefinitionCategory> {
    match local {
        "borderFill" => Some(DefinitionCategory::BorderFill),
        "charPr" => Some(DefinitionCategory::CharShape),
        "paraPr" => Some(DefinitionCategory::ParaShape),
        "style" => Some(DefinitionCategory::Style),
        _ => None,
    }
}

/// The `lang` of a `fontface` (`HANGUL`) or a `fontRef` attribute (`hangul`).
pub fn font_lang(value: &str) -> Option<FontLang> {
    FontLang::ALL
        .into_iter()
        .find(|lang| lang.as_str().eq_ignore_ascii_case(value.trim()))
}

pub fn lang_value(lang: FontLang) -> String {
    lang.as_str().to_ascii_uppercase()
}

/// Visits every header entry below `element` with its raw `id`.
pub fn for_each_entry<'a>(element: &'a Element, f: &mut impl FnMut(DefinitionCategory, &'a str, &'a Element)) {
    let local = local_name(&element.name);
    if local == FONT_FACE {
        let Some(lang) = element.attr("lang").and_then(font_lang) else {
            log::warn!("font face without a known lang skipped");
            return;
        };
        for font in element.elements().filter(|el| is(&el.name, FONT)) {
            if let Some(id) = font.attr("id") {
                f(DefinitionCategory::FontFace(lang), id.trim(), font);
            }
        }
        return;
    }
    if let Some(category) = entry_category(local) {
        if let Some(id) = element.attr("id") {
            f(category, id.trim(), element);
        }
        return;
    }
    for child in element.elements() {
        for_each_entry(child, f);
    }
}

/// An attribute whose value is the id of a header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwpmlReference {
    pub element: &'static str,
    pub attribute: &'static str,
    pub category: DefinitionCategory,
}

const fn reference(element: &'static str, attribute: &'static str, category: DefinitionCategory) -> OwpmlReference {
    OwpmlReference {
        element,
        attribute,
        category,
    }
}

pub const REFERENCES: &[OwpmlReference] = &[
    reference("p", "paraPrIDRef", DefinitionCategory::ParaShape),
    reference("p", "styleIDRef", DefinitionCategory::Style),
    reference("run", "charPrIDRef", DefinitionCategory::CharShape),
    reference("tbl", "borderFillIDRef", DefinitionCategory::BorderFill),
    reference("tc", "borderFillIDRef", DefinitionCategory::BorderFill),
    reference("charPr", "borderFillIDRef", DefinitionCategory::BorderFill),
    reference("border", "borderFillIDRef", DefinitionCategory::BorderFill),
    reference("style", "paraPrIDRef", DefinitionCategory::ParaShape),
    reference("style", "charPrIDRef", DefinitionCategory::CharShape),
    reference("style", "nextStyleIDRef", DefinitionCategory::Style),
];

/// Reference attributes of an element, `fontRef` languages included.
pub fn references_of(name: &str) -> Vec<OwpmlReference> {
    let local = local_name(name);
    if local == FONT_REF {
        return FontLang::ALL
            .into_iter()
            .map(|lang| OwpmlReference {
                element: FONT_REF,
                attribute: font_ref_name(lang),
                category: DefinitionCategory::FontFace(lang),
            })
            .collect();
    }
    REFERENCES.iter().filter(|r| r.element == local).copied().collect()
}

fn font_ref_name(lang: FontLang) -> &'static str {
    match lang {
        FontLang::Hangul => "hangul",
        FontLang::Latin => "latin",
        FontLang::Hanja => "hanja",
        FontLang::Japanese => "japanese",
        FontLang::Other => "other",
        FontLang::Symbol => "symbol",
        FontLang::User => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_ignored() {
        assert_eq!(local_name("hp:p"), "p");
        assert_eq!(local_name("p"), "p");
        assert!(is("hh:charPr", "charPr"));
        assert_eq!(qualified("hh:charProperties", "charPr"), "hh:charPr");
        assert_eq!(qualified("styles", "style"), "style");
    }

    #[test]
    fn font_refs_cover_every_language() {
        let refs = references_of("hh:fontRef");
        assert_eq!(refs.len(), FontLang::ALL.len());
        assert!(refs.iter().any(|r| r.attribute == "hangul"
            && r.category == DefinitionCategory::FontFace(FontLang::Hangul)));
        assert_eq!(font_lang("HANGUL"), Some(FontLang::Hangul));
        assert_eq!(font_ref_name(FontLang::Latin), "latin");
    }

    #[test]
    fn null_references() {
        assert!(is_null_reference("4294967295"));
        assert!(is_null_reference(" "));
        assert!(!is_null_reference("0"));
    }
}
