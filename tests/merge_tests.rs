mod common;

use common::fixtures::*;
use common::{TestResult, engine_from, engine_with, merge, merge_err};
use quire::{Diagnostic, MergeEngineBuilder, MergeError, Stage};
use quire_types::{DefinitionCategory, LocalId};

fn non_empty(texts: Vec<String>) -> Vec<String> {
    texts.into_iter().filter(|t| !t.is_empty()).collect()
}

#[test]
fn questions_keep_request_order() -> TestResult {
    let engine = engine_with(vec![
        ("q1", question("alpha")),
        ("q2", question("beta")),
        ("q3", question("gamma")),
    ])?;
    let doc = merge(&engine, &["q3", "q1", "q2"])?;

    assert_eq!(
        non_empty(doc.paragraph_texts()),
        ["Midterm (2024-03-15)", "1. gamma", "2. alpha", "3. beta"]
    );
    assert_eq!(doc.report.questions, 3);
    assert!(!doc.report.is_degraded());
    Ok(())
}

#[test]
fn typed_numbers_are_not_doubled() -> TestResult {
    let engine = engine_with(vec![
        ("a", question("22. Which is larger?")),
        ("b", question("(3) Solve for x.")),
    ])?;
    let doc = merge(&engine, &["a", "b"])?;

    let texts = non_empty(doc.paragraph_texts());
    assert_eq!(texts[1], "1. Which is larger?");
    assert_eq!(texts[2], "2. Solve for x.");
    Ok(())
}

#[test]
fn leading_values_that_are_not_numbers_survive() -> TestResult {
    let engine = engine_with(vec![
        ("pi", question("3.14 is close to pi")),
        ("year", question("2024 was a leap year")),
        ("figure", question_opening_with_picture("4. Describe the figure.", "fig", &image_bytes(2, 64))),
    ])?;
    let doc = merge(&engine, &["pi", "year", "figure"])?;

    let texts = non_empty(doc.paragraph_texts());
    assert_eq!(texts[1], "1. 3.14 is close to pi");
    assert_eq!(texts[2], "2. 2024 was a leap year");
    // Text after an inline object is never treated as a typed number.
    assert_eq!(texts[3], "3. 4. Describe the figure.");
    Ok(())
}

#[test]
fn anchor_paragraph_is_replaced_by_content() -> TestResult {
    let engine = engine_from(
        MergeEngineBuilder::new().with_spacer_paragraphs(0),
        vec![("q1", question("one")), ("q2", question("two"))],
    )?;
    let doc = merge(&engine, &["q1", "q2"])?;

    assert!(!doc.text().contains("{{CONTENT_HERE}}"));
    assert!(!doc.text().contains("{{TITLE}}"));
    // Title paragraph plus one paragraph per question.
    assert_eq!(doc.paragraph_texts().len(), 3);
    Ok(())
}

#[test]
fn spacers_follow_every_question() -> TestResult {
    let engine = engine_with(vec![("q1", question("one")), ("q2", question("two"))])?;
    let doc = merge(&engine, &["q1", "q2"])?;

    assert_eq!(doc.paragraph_texts(), ["Midterm (2024-03-15)", "1. one", "", "2. two", ""]);
    Ok(())
}

#[test]
fn unparseable_question_becomes_a_numbered_placeholder() -> TestResult {
    let mut questions: Vec<(String, _)> = (1..=10).map(|i| (format!("q{i}"), question(&format!("question {i}")))).collect();
    questions.insert(5, ("bad".to_string(), unparseable_question()));
    let ids: Vec<&str> = questions.iter().map(|(id, _)| id.as_str()).collect();
    let engine = engine_with(questions.iter().map(|(id, record)| (id.as_str(), record.clone())).collect())?;

    let doc = merge(&engine, &ids)?;

    assert_eq!(doc.report.questions, 11);
    assert!(doc.report.is_degraded());
    assert_eq!(doc.report.degraded.len(), 1);
    let degraded = &doc.report.degraded[0];
    assert_eq!(degraded.question.as_str(), "bad");
    assert_eq!(degraded.number, 6);
    assert_eq!(degraded.stage, Stage::Sanitize);

    let texts = non_empty(doc.paragraph_texts());
    assert_eq!(texts.len(), 12);
    assert!(texts[6].starts_with("6. [question bad unavailable"), "got {:?}", texts[6]);
    assert_eq!(texts[7], "7. question 6");
    assert_eq!(texts[11], "11. question 10");
    Ok(())
}

#[test]
fn missing_binary_degrades_only_its_question() -> TestResult {
    let engine = engine_with(vec![("ok", question("fine")), ("pic", question_missing_binary())])?;
    let doc = merge(&engine, &["ok", "pic"])?;

    assert_eq!(doc.report.degraded.len(), 1);
    assert_eq!(doc.report.degraded[0].number, 2);
    assert!(doc.report.degraded[0].reason.contains("not supplied"));
    assert!(doc.all("PICTURE").is_empty());
    assert!(doc.all("BINDATA").is_empty());
    Ok(())
}

#[test]
fn template_parts_survive_byte_for_byte() -> TestResult {
    let engine = engine_with(vec![("q1", question("one"))])?;
    let doc = merge(&engine, &["q1"])?;
    let text = doc.text();

    assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?><HWPML"#));
    assert!(text.ends_with("</HWPML>"));
    assert!(text.contains(DOC_SETTING));
    assert!(text.contains("<DOCSUMMARY><TITLE>exam</TITLE></DOCSUMMARY>"));
    assert!(text.contains(
        r#"<TAIL><SCRIPTCODE Type="JScript" Version="1.0"><SCRIPTHEADER>var Documents = XHwpDocuments;</SCRIPTHEADER></SCRIPTCODE></TAIL>"#
    ));
    assert!(text.contains(r#"<SECDEF TextDirection="0"/>"#));
    Ok(())
}

#[test]
fn equivalent_definitions_reuse_template_ids() -> TestResult {
    let engine = engine_with(vec![("q1", question("one")), ("q2", question("two"))])?;
    let doc = merge(&engine, &["q1", "q2"])?;

    assert!(doc.report.new_definitions.is_empty());
    let shapes = doc.list("CHARSHAPELIST").expect("char shapes");
    assert_eq!(shapes.attr("Count"), Some("1"));
    assert_eq!(doc.list("STYLELIST").and_then(|l| l.attr("Count")), Some("1"));
    let shapes: Vec<_> = doc.all("TEXT").iter().filter_map(|run| run.attr("CharShape")).collect();
    assert!(!shapes.is_empty());
    assert!(shapes.iter().all(|shape| *shape == "0"));
    Ok(())
}

#[test]
fn new_definitions_are_appended_once() -> TestResult {
    let engine = engine_with(vec![
        ("plain", question("plain")),
        ("big", question_with_height("big", 1200)),
        ("big-again", question_with_height("big again", 1200)),
        ("huge", question_with_height("huge", 2000)),
    ])?;
    let doc = merge(&engine, &["plain", "big", "big-again", "huge"])?;

    let shapes = doc.list("CHARSHAPELIST").expect("char shapes");
    assert_eq!(shapes.attr("Count"), Some("3"));
    let ids: Vec<_> = shapes.elements().filter_map(|s| s.attr("Id")).collect();
    assert_eq!(ids, ["0", "1", "2"]);
    assert_eq!(shapes.elements().nth(1).and_then(|s| s.attr("Height")), Some("1200"));
    assert_eq!(doc.report.new_definitions.get("character-shape"), Some(&2));

    let paragraphs: Vec<_> = doc.section().elements().filter(|el| el.name == "P").collect();
    let shape_of = |text: &str| {
        paragraphs
            .iter()
            .find(|p| p.text_content().ends_with(text))
            .and_then(|p| p.elements().last())
            .and_then(|run| run.attr("CharShape"))
            .map(str::to_string)
    };
    assert_eq!(shape_of("plain").as_deref(), Some("0"));
    assert_eq!(shape_of("big").as_deref(), Some("1"));
    assert_eq!(shape_of("big again").as_deref(), Some("1"));
    assert_eq!(shape_of("huge").as_deref(), Some("2"));
    Ok(())
}

#[test]
fn dangling_references_are_stripped_with_warnings() -> TestResult {
    let engine = engine_with(vec![("q1", question_with_dangling_shapes(3))])?;
    let doc = merge(&engine, &["q1"])?;

    let unresolved: Vec<_> = doc
        .report
        .warnings
        .iter()
        .filter_map(|w| match &w.diagnostic {
            Diagnostic::UnresolvedReference { category, local, fallback } => {
                Some((*category, local.clone(), *fallback))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        unresolved,
        [40u32, 41, 42].map(|id| (DefinitionCategory::CharShape, LocalId::from(id), false))
    );
    let runs = doc.all("TEXT");
    assert!(runs.iter().all(|run| run.attr("CharShape") != Some("40")));
    assert!(doc.report.template_warnings.is_empty());
    Ok(())
}

#[test]
fn undefined_reference_falls_back_to_the_template() -> TestResult {
    let engine = engine_with(vec![(
        "bare",
        quire::FragmentRecord::new(r#"<P><TEXT CharShape="0"><CHAR>bare</CHAR></TEXT></P>"#),
    )])?;
    let doc = merge(&engine, &["bare"])?;

    let warning = &doc.report.warnings[0];
    assert_eq!(warning.question.as_str(), "bare");
    assert!(matches!(
        warning.diagnostic,
        Diagnostic::UnresolvedReference { fallback: true, .. }
    ));
    assert!(doc.report.new_definitions.is_empty());
    Ok(())
}

#[test]
fn unknown_question_fails_the_merge() -> TestResult {
    let engine = engine_with(vec![("q1", question("one"))])?;
    let err = merge_err(&engine, &["q1", "nope"]);

    assert_eq!(err.stage(), Some(Stage::Fetch));
    assert_eq!(err.question().map(|q| q.as_str()), Some("nope"));
    assert!(matches!(err, MergeError::Fetch { .. }));
    Ok(())
}

#[test]
fn report_serializes_for_callers() -> TestResult {
    let engine = engine_with(vec![("bad", unparseable_question()), ("ok", question("ok"))])?;
    let doc = merge(&engine, &["bad", "ok"])?;

    let json = serde_json::to_value(&doc.report)?;
    assert_eq!(json["questions"], 2);
    assert_eq!(json["degraded"][0]["question"], "bad");
    assert_eq!(json["degraded"][0]["stage"], "sanitize");
    assert!(json["newDefinitions"].is_object());
    Ok(())
}
