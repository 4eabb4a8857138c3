mod common;

use common::TestResult;
use common::fixtures::TEMPLATE_MAPPING;
use quire_core::validator::{Origin, Validator, Violation};
use quire_core::{DefinitionIndex, DefinitionSet};
use quire_types::{DefinitionCategory, QuestionId};
use quire_xml::{Element, Node, ParseOptions, parse_fragment};

fn template_mapping() -> Result<Element, Box<dyn std::error::Error>> {
    parse_fragment(TEMPLATE_MAPPING, ParseOptions::strict())?
        .into_iter()
        .find_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
        .ok_or_else(|| "mapping table fixture is empty".into())
}

fn paragraphs(markup: &str) -> Result<Vec<Node>, Box<dyn std::error::Error>> {
    Ok(parse_fragment(markup, ParseOptions::strict())?)
}

#[test]
fn every_injected_broken_reference_is_reported() -> TestResult {
    let mapping = template_mapping()?;
    let index = DefinitionIndex::from_header(Some(&mapping), None);

    for k in [1usize, 4, 9] {
        let markup: String = (0..k)
            .map(|i| format!(r#"<P ParaShape="0" Style="0"><TEXT CharShape="{}"><CHAR>{i}</CHAR></TEXT></P>"#, 100 + i))
            .collect();
        let mut validator = Validator::new(&index);
        validator.check_body("SECTION", &paragraphs(&markup)?, &Origin::Fragment(QuestionId::from("q7")));
        validator.check_header(Some(&mapping), &DefinitionSet::default());
        let report = validator.finish();

        assert_eq!(report.violations.len(), k, "k = {k}");
        assert!(report.has_fatal());
        let values: Vec<_> = report
            .fatal()
            .map(|v| match v {
                Violation::UnresolvedReference { category, value, origin, .. } => {
                    assert_eq!(*category, DefinitionCategory::CharShape);
                    assert_eq!(origin, &Origin::Fragment(QuestionId::from("q7")));
                    value.clone()
                }
                other => panic!("unexpected violation {other:?}"),
            })
            .collect();
        let expected: Vec<_> = (0..k).map(|i| (100 + i).to_string()).collect();
        assert_eq!(values, expected);
    }
    Ok(())
}

#[test]
fn resolved_fragment_content_is_clean() -> TestResult {
    let mapping = template_mapping()?;
    let index = DefinitionIndex::from_header(Some(&mapping), None);
    let mut validator = Validator::new(&index);
    validator.check_body(
        "SECTION",
        &paragraphs(r#"<P ParaShape="0" Style="0"><TEXT CharShape="0"><CHAR>ok</CHAR></TEXT></P>"#)?,
        &Origin::Fragment(QuestionId::from("q1")),
    );
    validator.check_header(Some(&mapping), &DefinitionSet::default());

    assert!(validator.finish().is_clean());
    Ok(())
}

#[test]
fn template_content_only_warns() -> TestResult {
    let mapping = template_mapping()?;
    let index = DefinitionIndex::from_header(Some(&mapping), None);
    let mut validator = Validator::new(&index);
    validator.check_body(
        "SECTION",
        &paragraphs(r#"<P ParaShape="12"><TEXT CharShape="0"><CHAR>a</CHAR></TEXT></P><CHAR>stray</CHAR>"#)?,
        &Origin::Template,
    );
    let report = validator.finish();

    assert!(!report.has_fatal());
    assert_eq!(report.warnings().count(), 2);
    assert!(report.warnings().any(|v| matches!(
        v,
        Violation::IllegalNesting { parent, child, .. } if parent == "SECTION" && child == "CHAR"
    )));
    Ok(())
}

#[test]
fn binary_reference_without_an_index_entry_is_fatal() -> TestResult {
    let mapping = template_mapping()?;
    let index = DefinitionIndex::from_header(Some(&mapping), None);
    let mut validator = Validator::new(&index);
    validator.check_body(
        "SECTION",
        &paragraphs(r#"<P><TEXT><PICTURE><SHAPEOBJECT/><IMAGE BinItem="1"/></PICTURE></TEXT></P>"#)?,
        &Origin::Fragment(QuestionId::from("pic")),
    );
    let report = validator.finish();

    assert_eq!(report.fatal().count(), 1);
    assert!(report.to_string().contains("pic"));
    Ok(())
}
