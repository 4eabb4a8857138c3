mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::fixtures::*;
use common::{MergedDocument, TestResult, engine_with, merge};
use quire::{BinaryFormat, BinaryPayload, FragmentRecord};
use quire_core::binstore::decode_payload;
use quire_xml::Element;

/// Follows `IMAGE@BinItem -> BINITEM@BinData -> BINDATA@Id`.
fn resolve_image<'a>(doc: &'a MergedDocument, image: &Element) -> Option<(&'a Element, &'a Element)> {
    let position: usize = image.attr("BinItem")?.parse().ok()?;
    let item = doc
        .list("BINDATALIST")?
        .elements()
        .filter(|el| el.name == "BINITEM")
        .nth(position.checked_sub(1)?)?;
    let data = item.attr("BinData")?;
    let blob = doc
        .all("BINDATA")
        .into_iter()
        .find(|blob| blob.attr("Id") == Some(data))?;
    Some((item, blob))
}

fn stored_bytes(blob: &Element) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let compressed = blob.attr("Compress") == Some("true");
    Ok(decode_payload(&blob.text_content(), compressed)?)
}

#[test]
fn picture_resolves_through_the_binary_index() -> TestResult {
    let bytes = image_bytes(7, 300);
    let engine = engine_with(vec![("q1", question_with_picture("figure", "img1", &bytes))])?;
    let doc = merge(&engine, &["q1"])?;

    let images = doc.all("IMAGE");
    assert_eq!(images.len(), 1);
    assert!(!images[0].has_attr("data-hml-bin-id"));
    let (item, blob) = resolve_image(&doc, images[0]).expect("image resolves to a blob");
    assert_eq!(item.attr("Type"), Some("Embedding"));
    assert_eq!(item.attr("Format"), Some("png"));
    assert_eq!(blob.attr("Encoding"), Some("Base64"));
    assert_eq!(stored_bytes(blob)?, bytes);
    assert_eq!(doc.report.binaries, 1);
    Ok(())
}

#[test]
fn declared_size_matches_the_stored_stream() -> TestResult {
    let bytes = image_bytes(1, 1000);
    let engine = engine_with(vec![("q1", question_with_picture("figure", "a", &bytes))])?;
    let doc = merge(&engine, &["q1"])?;

    let blob = doc.all("BINDATA")[0];
    let compact: String = blob.text_content().chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let stream = STANDARD.decode(compact)?;
    assert_eq!(blob.attr("Size"), Some(stream.len().to_string().as_str()));
    assert_eq!(blob.attr("Compress"), Some("false"));
    Ok(())
}

#[test]
fn compressible_formats_are_deflated() -> TestResult {
    let bitmap = vec![0x42u8; 4096];
    let record = FragmentRecord::new(
        r#"<P><TEXT><CHAR>chart</CHAR><PICTURE><IMAGE data-hml-bin-id="chart"/></PICTURE></TEXT></P>"#,
    )
    .with_binary(BinaryPayload::raw("chart", BinaryFormat::Bmp, bitmap.clone()));
    let engine = engine_with(vec![("q1", record)])?;
    let doc = merge(&engine, &["q1"])?;

    let (item, blob) = resolve_image(&doc, doc.all("IMAGE")[0]).expect("image resolves");
    assert_eq!(item.attr("Format"), Some("bmp"));
    assert_eq!(blob.attr("Compress"), Some("true"));
    let size: usize = blob.attr("Size").unwrap_or("0").parse()?;
    assert!(size < bitmap.len());
    assert_eq!(stored_bytes(blob)?, bitmap);
    Ok(())
}

#[test]
fn identical_images_are_stored_once() -> TestResult {
    let bytes = image_bytes(3, 512);
    let ids = ["q1", "q2", "q3", "q4"];
    let engine = engine_with(
        ids.iter()
            .enumerate()
            .map(|(i, id)| (*id, question_with_picture(&format!("figure {i}"), &format!("local{i}"), &bytes)))
            .collect(),
    )?;
    let doc = merge(&engine, &ids)?;

    assert_eq!(doc.all("BINDATA").len(), 1);
    assert_eq!(doc.list("BINDATALIST").and_then(|l| l.attr("Count")), Some("1"));
    let images = doc.all("IMAGE");
    assert_eq!(images.len(), 4);
    assert!(images.iter().all(|image| image.attr("BinItem") == Some("1")));
    assert_eq!(doc.report.binaries, 1);
    Ok(())
}

#[test]
fn distinct_images_get_their_own_entries() -> TestResult {
    let engine = engine_with(vec![
        ("q1", question_with_picture("first", "img", &image_bytes(1, 64))),
        ("q2", question_with_picture("second", "img", &image_bytes(2, 64))),
    ])?;
    let doc = merge(&engine, &["q1", "q2"])?;

    let items: Vec<_> = doc.all("IMAGE").iter().filter_map(|i| i.attr("BinItem")).collect();
    assert_eq!(items, ["1", "2"]);
    let storage = doc.root.child("TAIL").and_then(|t| t.child("BINDATASTORAGE")).expect("storage");
    assert_eq!(storage.attr("Count"), Some("2"));
    for image in doc.all("IMAGE") {
        assert!(resolve_image(&doc, image).is_some());
    }
    // The script part of the tail is untouched.
    assert!(doc.text().contains("<SCRIPTHEADER>var Documents = XHwpDocuments;</SCRIPTHEADER>"));
    Ok(())
}

#[test]
fn base64_payloads_are_decoded_before_storage() -> TestResult {
    let bytes = image_bytes(9, 200);
    let record = FragmentRecord::new(
        r#"<P><TEXT><CHAR>x</CHAR><PICTURE><IMAGE data-hml-bin-id="b"/></PICTURE></TEXT></P>"#,
    )
    .with_binary(BinaryPayload::base64("b", BinaryFormat::Png, &STANDARD.encode(&bytes)));
    let engine = engine_with(vec![("q1", record)])?;
    let doc = merge(&engine, &["q1"])?;

    let (_, blob) = resolve_image(&doc, doc.all("IMAGE")[0]).expect("image resolves");
    assert_eq!(stored_bytes(blob)?, bytes);
    Ok(())
}

#[test]
fn shape_objects_get_unique_instance_ids() -> TestResult {
    let engine = engine_with(vec![
        ("q1", question_with_picture("a", "x", &image_bytes(1, 32))),
        ("q2", question_with_picture("b", "x", &image_bytes(1, 32))),
    ])?;
    let doc = merge(&engine, &["q1", "q2"])?;

    let mut ids: Vec<_> = doc.all("SHAPEOBJECT").iter().filter_map(|s| s.attr("InstId")).collect();
    assert_eq!(ids.len(), 2);
    ids.dedup();
    assert_eq!(ids.len(), 2);
    Ok(())
}
