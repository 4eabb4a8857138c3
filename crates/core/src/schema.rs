//! The document vocabulary: which body elements exist, where they may
//! appear, and which attributes point into the header.

use crate::config::SanitizerConfig;
use quire_types::{DefinitionCategory, FontLang};
use std::collections::BTreeSet;

macro_rules! body_tags {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// A body element the merger understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BodyTag {
            $($variant),*
        }

        impl BodyTag {
            pub const ALL: &'static [BodyTag] = &[$(BodyTag::$variant),*];

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(BodyTag::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(BodyTag::$variant => $name),*
                }
            }
        }
    };
}

body_tags! {
    Paragraph => "P",
    Text => "TEXT",
    Char => "CHAR",
    Tab => "TAB",
    LineBreak => "LINEBREAK",
    Hyphen => "HYPHEN",
    NbSpace => "NBSPACE",
    FwSpace => "FWSPACE",
    TitleMark => "TITLEMARK",
    MarkpenBegin => "MARKPENBEGIN",
    MarkpenEnd => "MARKPENEND",
    Table => "TABLE",
    Row => "ROW",
    Cell => "CELL",
    CellZoneList => "CELLZONELIST",
    CellZone => "CELLZONE",
    ParaList => "PARALIST",
    ShapeObject => "SHAPEOBJECT",
    ShapeComment => "SHAPECOMMENT",
    Size => "SIZE",
    Position => "POSITION",
    OutsideMargin => "OUTSIDEMARGIN",
    InsideMargin => "INSIDEMARGIN",
    Caption => "CAPTION",
    ShapeComponent => "SHAPECOMPONENT",
    RotationInfo => "ROTATIONINFO",
    RenderingInfo => "RENDERINGINFO",
    TransMatrix => "TRANSMATRIX",
    ScaMatrix => "SCAMATRIX",
    RotMatrix => "ROTMATRIX",
    LineShape => "LINESHAPE",
    FillBrush => "FILLBRUSH",
    WindowBrush => "WINDOWBRUSH",
    Gradation => "GRADATION",
    Color => "COLOR",
    ImageBrush => "IMAGEBRUSH",
    Shadow => "SHADOW",
    DrawText => "DRAWTEXT",
    TextMargin => "TEXTMARGIN",
    Picture => "PICTURE",
    ImageRect => "IMAGERECT",
    ImageClip => "IMAGECLIP",
    Effects => "EFFECTS",
    Image => "IMAGE",
    Equation => "EQUATION",
    Script => "SCRIPT",
    Line => "LINE",
    Rectangle => "RECTANGLE",
    Ellipse => "ELLIPSE",
    Arc => "ARC",
    Polygon => "POLYGON",
    Point => "POINT",
    Curve => "CURVE",
    Segment => "SEGMENT",
    Container => "CONTAINER",
    Ole => "OLE",
    TextArt => "TEXTART",
    FieldBegin => "FIELDBEGIN",
    FieldEnd => "FIELDEND",
    Bookmark => "BOOKMARK",
    AutoNum => "AUTONUM",
    AutoNumFormat => "AUTONUMFORMAT",
    NewNum => "NEWNUM",
    IndexMark => "INDEXMARK",
    Compose => "COMPOSE",
    CompCharShape => "COMPCHARSHAPE",
    Dutmal => "DUTMAL",
    HiddenComment => "HIDDENCOMMENT",
    EndNote => "ENDNOTE",
    FootNote => "FOOTNOTE",
    SecDef => "SECDEF",
    ColDef => "COLDEF",
    Header => "HEADER",
    Footer => "FOOTER",
    PageNum => "PAGENUM",
    PageHiding => "PAGEHIDING",
    PageNumCtrl => "PAGENUMCTRL",
}

/// Controls owned by the template's page layout.
pub const LAYOUT_CONTROLS: &[&str] = &[
    "SECDEF",
    "COLDEF",
    "HEADER",
    "FOOTER",
    "PAGENUM",
    "PAGEHIDING",
    "PAGENUMCTRL",
];

/// Document-level wrappers a fragment may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Document,
    Head,
    Body,
    Section,
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Body(BodyTag),
    Wrapper(Wrapper),
    Unknown,
}

pub fn classify(name: &str) -> ElementKind {
    if let Some(tag) = BodyTag::from_name(name) {
        return ElementKind::Body(tag);
    }
    match name {
        "HWPML" => ElementKind::Wrapper(Wrapper::Document),
        "HEAD" => ElementKind::Wrapper(Wrapper::Head),
        "BODY" => ElementKind::Wrapper(Wrapper::Body),
        "SECTION" => ElementKind::Wrapper(Wrapper::Section),
        "TAIL" => ElementKind::Wrapper(Wrapper::Tail),
        _ => ElementKind::Unknown,
    }
}

/// What the sanitizer does with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPolicy {
    Keep,
    /// Remove the tag, keep its children.
    Unwrap,
    /// Remove the tag and its subtree.
    Drop,
}

/// Element whitelist built from the sanitizer configuration.
#[derive(Debug, Clone)]
pub struct ElementPolicy {
    allowed: Option<BTreeSet<String>>,
    dropped: BTreeSet<String>,
}

impl ElementPolicy {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            allowed: config.allowed_elements.clone(),
            dropped: config.dropped_elements.clone(),
        }
    }

    pub fn decide(&self, name: &str) -> TagPolicy {
        if self.dropped.contains(name) || is_header_part(name) {
            return TagPolicy::Drop;
        }
        let allowed = |name: &str| self.allowed.as_ref().is_none_or(|set| set.contains(name));
        match classify(name) {
            ElementKind::Body(_) if allowed(name) => TagPolicy::Keep,
            ElementKind::Body(_) => TagPolicy::Unwrap,
            ElementKind::Wrapper(Wrapper::Head | Wrapper::Tail) => TagPolicy::Drop,
            ElementKind::Wrapper(_) => TagPolicy::Unwrap,
            ElementKind::Unknown => match &self.allowed {
                Some(set) if set.contains(name) => TagPolicy::Keep,
                _ => TagPolicy::Unwrap,
            },
        }
    }
}

use BodyTag as T;

const PARAGRAPHS: &[BodyTag] = &[T::Paragraph];

const CHAR_CONTENT: &[BodyTag] = &[
    T::Tab,
    T::LineBreak,
    T::Hyphen,
    T::NbSpace,
    T::FwSpace,
    T::TitleMark,
    T::MarkpenBegin,
    T::MarkpenEnd,
];

const INLINE_CONTROLS: &[BodyTag] = &[
    T::Table,
    T::Picture,
    T::Equation,
    T::Line,
    T::Rectangle,
    T::Ellipse,
    T::Arc,
    T::Polygon,
    T::Curve,
    T::Container,
    T::Ole,
    T::TextArt,
    T::FieldBegin,
    T::FieldEnd,
    T::Bookmark,
    T::AutoNum,
    T::NewNum,
    T::IndexMark,
    T::Compose,
    T::Dutmal,
    T::HiddenComment,
    T::SecDef,
    T::ColDef,
    T::Header,
    T::Footer,
    T::PageNum,
    T::PageHiding,
    T::PageNumCtrl,
];

const TEXT_CHILDREN: &[BodyTag] = &[
    T::Char,
    T::Table,
    T::Picture,
    T::Equation,
    T::Line,
    T::Rectangle,
    T::Ellipse,
    T::Arc,
    T::Polygon,
    T::Curve,
    T::Container,
    T::Ole,
    T::TextArt,
    T::FieldBegin,
    T::FieldEnd,
    T::Bookmark,
    T::AutoNum,
    T::NewNum,
    T::IndexMark,
    T::Compose,
    T::Dutmal,
    T::HiddenComment,
    T::SecDef,
    T::ColDef,
    T::Header,
    T::Footer,
    T::PageNum,
    T::PageHiding,
    T::PageNumCtrl,
];

const TABLE_CHILDREN: &[BodyTag] = &[T::ShapeObject, T::InsideMargin, T::CellZoneList, T::Row];

const PICTURE_CHILDREN: &[BodyTag] = &[
    T::ShapeObject,
    T::ShapeComponent,
    T::LineShape,
    T::ImageRect,
    T::ImageClip,
    T::Effects,
    T::InsideMargin,
    T::Image,
];

const NOTE_CHILDREN: &[BodyTag] = &[T::AutoNumFormat, T::ParaList];

/// Element children permitted under `parent`, or `None` when the parent
/// is not constrained.
pub fn legal_children(parent: &str) -> Option<&'static [BodyTag]> {
    let children = match parent {
        "SECTION" | "PARALIST" => PARAGRAPHS,
        "P" => &[T::Text],
        "TEXT" => TEXT_CHILDREN,
        "CHAR" => CHAR_CONTENT,
        "TABLE" => TABLE_CHILDREN,
        "ROW" => &[T::Cell],
        "CELL" => &[T::ParaList],
        "PICTURE" => PICTURE_CHILDREN,
        "EQUATION" => &[T::ShapeObject, T::Script],
        "ENDNOTE" | "FOOTNOTE" => NOTE_CHILDREN,
        _ => return None,
    };
    Some(children)
}

/// Whether `child` may appear directly under `parent`.
pub fn is_legal_child(parent: &str, child: &str) -> bool {
    match legal_children(parent) {
        Some(allowed) => BodyTag::from_name(child).is_some_and(|tag| allowed.contains(&tag)),
        None => true,
    }
}

/// Containers whose element children are all paragraphs.
pub fn is_paragraph_container(name: &str) -> bool {
    matches!(name, "SECTION" | "PARALIST")
}

/// Inline objects and controls that sit in a run next to `CHAR`.
pub fn is_inline(tag: BodyTag) -> bool {
    INLINE_CONTROLS.contains(&tag)
}

pub fn is_char_content(tag: BodyTag) -> bool {
    CHAR_CONTENT.contains(&tag)
}

pub fn is_note(tag: BodyTag) -> bool {
    matches!(tag, T::EndNote | T::FootNote)
}

/// Elements where whitespace between children carries no meaning.
pub fn is_element_only(name: &str) -> bool {
    name != "CHAR" && legal_children(name).is_some()
}

/// Attribute values that mean "no reference".
pub fn is_null_reference(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "4294967295" || value == "-1"
}

/// An attribute that holds a header id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceAttr {
    pub element: &'static str,
    pub attribute: &'static str,
    pub category: DefinitionCategory,
}

const fn reference(
    element: &'static str,
    attribute: &'static str,
    category: DefinitionCategory,
) -> ReferenceAttr {
    ReferenceAttr {
        element,
        attribute,
        category,
    }
}

use DefinitionCategory as C;

/// Every reference attribute, body and header.
pub const REFERENCE_ATTRS: &[ReferenceAttr] = &[
    reference("P", "Style", C::Style),
    reference("P", "ParaShape", C::ParaShape),
    reference("TEXT", "CharShape", C::CharShape),
    reference("TABLE", "BorderFill", C::BorderFill),
    reference("CELL", "BorderFill", C::BorderFill),
    reference("IMAGE", "BinItem", C::BinItem),
    reference("STYLE", "ParaShape", C::ParaShape),
    reference("STYLE", "CharShape", C::CharShape),
    reference("STYLE", "NextStyle", C::Style),
    reference("CHARSHAPE", "BorderFillId", C::BorderFill),
    reference("FONTID", "Hangul", C::FontFace(FontLang::Hangul)),
    reference("FONTID", "Latin", C::FontFace(FontLang::Latin)),
    reference("FONTID", "Hanja", C::FontFace(FontLang::Hanja)),
    reference("FONTID", "Japanese", C::FontFace(FontLang::Japanese)),
    reference("FONTID", "Other", C::FontFace(FontLang::Other)),
    reference("FONTID", "Symbol", C::FontFace(FontLang::Symbol)),
    reference("FONTID", "User", C::FontFace(FontLang::User)),
    reference("PARABORDER", "BorderFill", C::BorderFill),
    reference("BINITEM", "BinData", C::BinData),
];

/// Reference attributes declared on an element name.
pub fn references_of(element: &str) -> impl Iterator<Item = &'static ReferenceAttr> + '_ {
    REFERENCE_ATTRS.iter().filter(move |r| r.element == element)
}

/// Attributes a fragment may use for an image's binary instead of `BinItem`.
pub const BINARY_ALIASES: &[&str] = &["BinItem", "BinData", "data-hml-bin-id"];

/// Bookkeeping attributes never carried into the output.
pub fn is_bookkeeping_attr(name: &str) -> bool {
    name.starts_with("data-hml-") || matches!(name, "InstId" | "tmpId" | "Path")
}

/// Paragraph attributes forcing breaks the template layout owns.
pub const BREAK_ATTRS: &[&str] = &["ColumnBreak", "PageBreak"];

/// Header structures that may arrive inside a fragment's markup.
pub fn is_header_part(name: &str) -> bool {
    matches!(name, "MAPPINGTABLE" | "BINDATASTORAGE") || MAPPING_LISTS.contains(&name)
}

/// Header lists in the order they appear under `MAPPINGTABLE`.
pub const MAPPING_LISTS: &[&str] = &[
    "BINDATALIST",
    "FACENAMELIST",
    "BORDERFILLLIST",
    "CHARSHAPELIST",
    "TABDEFLIST",
    "NUMBERINGLIST",
    "BULLETLIST",
    "PARASHAPELIST",
    "STYLELIST",
    "MEMOSHAPELIST",
];
