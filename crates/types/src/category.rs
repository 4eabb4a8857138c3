//! Definition categories of the document header.
//!
//! Every category has its own id space. Font ids are additionally scoped by
//! language, so `FontFace(Hangul)` and `FontFace(Latin)` count separately.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The language slots of a `FONTFACE` list and of a `FONTID` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FontLang {
    Hangul,
    Latin,
    Hanja,
    Japanese,
    Other,
    Symbol,
    User,
}

impl FontLang {
    pub const ALL: [FontLang; 7] = [
        FontLang::Hangul,
        FontLang::Latin,
        FontLang::Hanja,
        FontLang::Japanese,
        FontLang::Other,
        FontLang::Symbol,
        FontLang::User,
    ];

    /// The `Lang` attribute value, which is also the `FONTID` attribute name.
    pub fn as_str(self) -> &'static str {
        match self {
            FontLang::Hangul => "Hangul",
            FontLang::Latin => "Latin",
            FontLang::Hanja => "Hanja",
            FontLang::Japanese => "Japanese",
            FontLang::Other => "Other",
            FontLang::Symbol => "Symbol",
            FontLang::User => "User",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.as_str() == name)
    }
}

/// A header definition category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefinitionCategory {
    FontFace(FontLang),
    BorderFill,
    CharShape,
    ParaShape,
    Style,
    /// Lightweight binary index entry, addressed by 1-based position.
    BinItem,
    /// Binary storage blob, addressed by its `Id`.
    BinData,
}

impl DefinitionCategory {
    /// Categories in dependency order: a category only references
    /// categories listed before it (styles also reference other styles).
    pub fn all() -> impl Iterator<Item = DefinitionCategory> {
        FontLang::ALL
            .into_iter()
            .map(DefinitionCategory::FontFace)
            .chain([
                DefinitionCategory::BorderFill,
                DefinitionCategory::CharShape,
                DefinitionCategory::ParaShape,
                DefinitionCategory::Style,
                DefinitionCategory::BinData,
                DefinitionCategory::BinItem,
            ])
    }

    /// Element name of a single definition entry.
    pub fn entry_tag(self) -> &'static str {
        match self {
            DefinitionCategory::FontFace(_) => "FONT",
            DefinitionCategory::BorderFill => "BORDERFILL",
            DefinitionCategory::CharShape => "CHARSHAPE",
            DefinitionCategory::ParaShape => "PARASHAPE",
            DefinitionCategory::Style => "STYLE",
            DefinitionCategory::BinItem => "BINITEM",
            DefinitionCategory::BinData => "BINDATA",
        }
    }

    /// Element name of the list holding the entries.
    pub fn list_tag(self) -> &'static str {
        match self {
            DefinitionCategory::FontFace(_) => "FONTFACE",
            DefinitionCategory::BorderFill => "BORDERFILLLIST",
            DefinitionCategory::CharShape => "CHARSHAPELIST",
            DefinitionCategory::ParaShape => "PARASHAPELIST",
            DefinitionCategory::Style => "STYLELIST",
            DefinitionCategory::BinItem => "BINDATALIST",
            DefinitionCategory::BinData => "BINDATASTORAGE",
        }
    }

    /// Whether ids are positions in the list instead of an `Id` attribute.
    pub fn is_positional(self) -> bool {
        matches!(self, DefinitionCategory::BinItem)
    }

    /// First id handed out when the template defines nothing in this category.
    pub fn first_id(self) -> u32 {
        match self {
            DefinitionCategory::BinItem | DefinitionCategory::BinData => 1,
            _ => 0,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, DefinitionCategory::BinItem | DefinitionCategory::BinData)
    }
}

impl fmt::Display for DefinitionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionCategory::FontFace(lang) => write!(f, "font-face({})", lang.as_str()),
            DefinitionCategory::BorderFill => f.write_str("border-fill"),
            DefinitionCategory::CharShape => f.write_str("character-shape"),
            DefinitionCategory::ParaShape => f.write_str("paragraph-shape"),
            DefinitionCategory::Style => f.write_str("style"),
            DefinitionCategory::BinItem => f.write_str("binary-item"),
            DefinitionCategory::BinData => f.write_str("binary-data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_lang_round_trips_through_name() {
        for lang in FontLang::ALL {
            assert_eq!(FontLang::from_name(lang.as_str()), Some(lang));
        }
        assert_eq!(FontLang::from_name("Klingon"), None);
    }

    #[test]
    fn dependency_order_puts_fonts_first_and_styles_after_shapes() {
        let order: Vec<_> = DefinitionCategory::all().collect();
        let pos = |c| order.iter().position(|x| *x == c).unwrap();
        assert!(pos(DefinitionCategory::FontFace(FontLang::User)) < pos(DefinitionCategory::CharShape));
        assert!(pos(DefinitionCategory::BorderFill) < pos(DefinitionCategory::CharShape));
        assert!(pos(DefinitionCategory::ParaShape) < pos(DefinitionCategory::Style));
        assert!(pos(DefinitionCategory::BinData) < pos(DefinitionCategory::BinItem));
    }

    #[test]
    fn binary_categories_are_one_based() {
        assert_eq!(DefinitionCategory::BinItem.first_id(), 1);
        assert_eq!(DefinitionCategory::Style.first_id(), 0);
        assert!(DefinitionCategory::BinItem.is_positional());
        assert!(!DefinitionCategory::BinData.is_positional());
    }
}
