use quire::{BinaryFormat, BinaryPayload, FragmentRecord};

/// The settings part every fixture template carries, byte for byte.
pub const DOC_SETTING: &str = "<DOCSETTING>\r\n  <BEGINNUMBER Page=\"1\" Footnote=\"1\" Endnote=\"1\" Picture=\"1\" Table=\"1\" Equation=\"1\"/>\r\n  <CARETPOS List=\"0\" Para=\"0\" Pos=\"16\"/>\r\n</DOCSETTING>";

/// The shared header definitions of the fixture template.
pub const TEMPLATE_MAPPING: &str = concat!(
    "<MAPPINGTABLE>",
    "<FACENAMELIST><FONTFACE Lang=\"Hangul\" Count=\"1\"><FONT Id=\"0\" Type=\"ttf\" Name=\"Batang\"/></FONTFACE></FACENAMELIST>",
    "<BORDERFILLLIST Count=\"1\"><BORDERFILL Id=\"1\" ThreeD=\"false\" Shadow=\"false\"/></BORDERFILLLIST>",
    "<CHARSHAPELIST Count=\"1\"><CHARSHAPE Id=\"0\" Height=\"1000\" TextColor=\"0\"><FONTID Hangul=\"0\"/></CHARSHAPE></CHARSHAPELIST>",
    "<PARASHAPELIST Count=\"1\"><PARASHAPE Id=\"0\" Align=\"Justify\"/></PARASHAPELIST>",
    "<STYLELIST Count=\"1\"><STYLE Id=\"0\" Type=\"Para\" Name=\"Normal\" ParaShape=\"0\" CharShape=\"0\" NextStyle=\"0\"/></STYLELIST>",
    "</MAPPINGTABLE>",
);

/// A minimal exam template with a title line and a content anchor.
pub fn exam_template() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\" ?>\r\n\
         <HWPML Version=\"2.8\" SubVersion=\"8.0.0.0\" Style2=\"embed\">\
         <HEAD SecCnt=\"1\"><DOCSUMMARY><TITLE>exam</TITLE></DOCSUMMARY>{DOC_SETTING}{TEMPLATE_MAPPING}</HEAD>\
         <BODY><SECTION Id=\"0\">\
         <P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\"><SECDEF TextDirection=\"0\"/><CHAR>{{{{TITLE}}}} ({{{{DATE}}}})</CHAR></TEXT></P>\
         <P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\"><CHAR>{{{{CONTENT_HERE}}}}</CHAR></TEXT></P>\
         </SECTION></BODY>\
         <TAIL><SCRIPTCODE Type=\"JScript\" Version=\"1.0\"><SCRIPTHEADER>var Documents = XHwpDocuments;</SCRIPTHEADER></SCRIPTCODE></TAIL>\
         </HWPML>\r\n"
    )
}

/// Definitions most fragments ship: a font, a character shape, a
/// paragraph shape and the "Normal" style.
pub fn fragment_definitions(height: u32) -> String {
    format!(
        "<MAPPINGTABLE>\
         <FACENAMELIST><FONTFACE Lang=\"Hangul\"><FONT Id=\"0\" Type=\"ttf\" Name=\"Batang\"/></FONTFACE></FACENAMELIST>\
         <CHARSHAPELIST><CHARSHAPE Id=\"0\" Height=\"{height}\" TextColor=\"0\"><FONTID Hangul=\"0\"/></CHARSHAPE></CHARSHAPELIST>\
         <PARASHAPELIST><PARASHAPE Id=\"0\" Align=\"Justify\"/></PARASHAPELIST>\
         <STYLELIST><STYLE Id=\"0\" Type=\"Para\" Name=\"Normal\" ParaShape=\"0\" CharShape=\"0\" NextStyle=\"0\"/></STYLELIST>\
         </MAPPINGTABLE>"
    )
}

/// A one-paragraph question.
pub fn question(text: &str) -> FragmentRecord {
    FragmentRecord::new(format!(
        "<P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\"><CHAR>{text}</CHAR></TEXT></P>"
    ))
    .with_definitions(fragment_definitions(1000))
}

/// A question whose only run uses a character shape the template lacks.
pub fn question_with_height(text: &str, height: u32) -> FragmentRecord {
    FragmentRecord::new(format!(
        "<P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\"><CHAR>{text}</CHAR></TEXT></P>"
    ))
    .with_definitions(fragment_definitions(height))
}

/// A question with an inline picture of the given bytes under `local_id`.
pub fn question_with_picture(text: &str, local_id: &str, bytes: &[u8]) -> FragmentRecord {
    FragmentRecord::new(format!(
        "<P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\"><CHAR>{text}</CHAR>\
         <PICTURE><SHAPEOBJECT InstId=\"99\"><SIZE Width=\"1000\" Height=\"1000\"/><POSITION TreatAsChar=\"true\"/></SHAPEOBJECT>\
         <IMAGE data-hml-bin-id=\"{local_id}\"/></PICTURE></TEXT></P>"
    ))
    .with_definitions(fragment_definitions(1000))
    .with_binary(BinaryPayload::raw(local_id, BinaryFormat::Png, bytes.to_vec()))
}

/// A question whose first run is a picture, followed by `text`.
pub fn question_opening_with_picture(text: &str, local_id: &str, bytes: &[u8]) -> FragmentRecord {
    FragmentRecord::new(format!(
        "<P ParaShape=\"0\" Style=\"0\"><TEXT CharShape=\"0\">\
         <PICTURE><SHAPEOBJECT InstId=\"7\"><SIZE Width=\"500\" Height=\"500\"/><POSITION TreatAsChar=\"true\"/></SHAPEOBJECT>\
         <IMAGE data-hml-bin-id=\"{local_id}\"/></PICTURE><CHAR>{text}</CHAR></TEXT></P>"
    ))
    .with_definitions(fragment_definitions(1000))
    .with_binary(BinaryPayload::raw(local_id, BinaryFormat::Png, bytes.to_vec()))
}

/// Markup no repair pass can turn into a usable body.
pub fn unparseable_question() -> FragmentRecord {
    FragmentRecord::new("<P><TEXT><CHAR>broken</CHAR></TEXT></P><!-- never closed")
}

/// A picture pointing at a binary the fragment does not ship.
pub fn question_missing_binary() -> FragmentRecord {
    FragmentRecord::new(
        "<P><TEXT><CHAR>see figure</CHAR><PICTURE><IMAGE BinItem=\"3\"/></PICTURE></TEXT></P>",
    )
}

/// A question referencing `count` character shapes it never defines.
pub fn question_with_dangling_shapes(count: u32) -> FragmentRecord {
    let runs: String = (0..count)
        .map(|i| format!("<TEXT CharShape=\"{}\"><CHAR>run {i}</CHAR></TEXT>", 40 + i))
        .collect();
    FragmentRecord::new(format!("<P ParaShape=\"0\" Style=\"0\">{runs}</P>"))
        .with_definitions(fragment_definitions(1000))
}

/// Bytes that look nothing like each other across seeds.
pub fn image_bytes(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
