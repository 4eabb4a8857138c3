pub mod fixtures;

use chrono::NaiveDate;
use quire::{
    FragmentRecord, InMemoryFragmentSource, InMemoryTemplateSource, MergeEngine,
    MergeEngineBuilder, MergeError, MergeReport, MergeRequest,
};
use quire_xml::{Element, parse_document};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const TEMPLATE_NAME: &str = "exam.hml";

/// A merged document, parsed back for inspection.
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub report: MergeReport,
    pub root: Element,
}

impl MergedDocument {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn head(&self) -> &Element {
        self.root.child("HEAD").expect("output has a HEAD")
    }

    pub fn mapping(&self) -> &Element {
        self.head().child("MAPPINGTABLE").expect("output has a MAPPINGTABLE")
    }

    /// The definition list with the given name, e.g. `CHARSHAPELIST`.
    pub fn list(&self, name: &str) -> Option<&Element> {
        self.mapping().child(name)
    }

    pub fn section(&self) -> &Element {
        self.root
            .child("BODY")
            .and_then(|body| body.child("SECTION"))
            .expect("output has a SECTION")
    }

    /// Every element with the given name, in document order.
    pub fn all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.root.visit(&mut |el| {
            if el.name == name {
                found.push(el);
            }
        });
        found
    }

    /// Text of every section paragraph, in order.
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.section()
            .elements()
            .filter(|el| el.name == "P")
            .map(Element::text_content)
            .collect()
    }
}

/// An engine over an in-memory store holding `questions` and the fixture template.
pub fn engine_with(questions: Vec<(&str, FragmentRecord)>) -> Result<MergeEngine, Box<dyn std::error::Error>> {
    engine_from(MergeEngineBuilder::new(), questions)
}

/// Like [`engine_with`], starting from a preconfigured builder.
pub fn engine_from(
    builder: MergeEngineBuilder,
    questions: Vec<(&str, FragmentRecord)>,
) -> Result<MergeEngine, Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let fragments = InMemoryFragmentSource::new();
    for (id, record) in questions {
        fragments.insert(id, record)?;
    }
    let templates = InMemoryTemplateSource::new();
    templates.add(TEMPLATE_NAME, fixtures::exam_template().into_bytes())?;
    Ok(builder
        .with_fragment_source(fragments)
        .with_template_source(templates)
        .build()?)
}

pub fn fixed_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
}

/// Merges `ids` into the fixture template and parses the result.
pub fn merge(engine: &MergeEngine, ids: &[&str]) -> Result<MergedDocument, Box<dyn std::error::Error>> {
    let request = MergeRequest::new(TEMPLATE_NAME, ids.iter().copied())
        .with_title("Midterm")
        .with_date(fixed_date());
    let output = engine.merge(&request)?;
    let root = parse_document(std::str::from_utf8(&output.bytes)?)?;
    Ok(MergedDocument {
        bytes: output.bytes,
        report: output.report,
        root,
    })
}

/// Runs a merge that is expected to fail.
pub fn merge_err(engine: &MergeEngine, ids: &[&str]) -> MergeError {
    let request = MergeRequest::new(TEMPLATE_NAME, ids.iter().copied()).with_date(fixed_date());
    match engine.merge(&request) {
        Ok(_) => panic!("merge of {ids:?} unexpectedly succeeded"),
        Err(err) => err,
    }
}
