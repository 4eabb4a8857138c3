//! Header parts, binaries and reference attributes pulled out of a fragment.

use super::{DecodedBinary, PendingRef, RefTarget};
use crate::binstore::{decode_base64, decode_payload, inflate_raw};
use crate::config::MissingBinaryPolicy;
use crate::definitions::FragmentDefinitions;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::FragmentFault;
use crate::schema::{BINARY_ALIASES, is_null_reference, references_of};
use quire_traits::BinaryPayload;
use quire_types::{BinaryFormat, LocalId, PayloadEncoding};
use quire_xml::{Element, Node, NodePath};
use std::collections::HashMap;

/// Collects header definitions and binary storage found anywhere in `nodes`.
pub(super) fn collect_header_parts(
    nodes: &[Node],
    definitions: &mut FragmentDefinitions,
    storage: &mut Vec<Element>,
) {
    for el in nodes.iter().filter_map(Node::as_element) {
        match el.name.as_str() {
            "MAPPINGTABLE" => definitions.collect(el),
            "BINDATASTORAGE" => storage.push(el.clone()),
            name if crate::schema::is_header_part(name) => definitions.collect(el),
            _ => collect_header_parts(&el.children, definitions, storage),
        }
    }
}

/// Decodes supplied payloads and embedded storage blobs. Supplied payloads
/// win over a blob with the same id.
pub(super) fn decode_binaries(
    payloads: &[BinaryPayload],
    storage: &[Element],
    definitions: &FragmentDefinitions,
) -> Result<HashMap<LocalId, DecodedBinary>, FragmentFault> {
    let mut binaries = HashMap::new();

    for payload in payloads {
        let bytes = decode_supplied(payload).map_err(|message| FragmentFault::UndecodableBinary {
            id: payload.local_id.clone(),
            message,
        })?;
        binaries.insert(
            payload.local_id.clone(),
            DecodedBinary {
                format: payload.format.clone(),
                bytes,
            },
        );
    }

    for blob in storage.iter().flat_map(|s| s.elements()).filter(|el| el.name == "BINDATA") {
        let Some(id) = blob.attr("Id").map(LocalId::from) else {
            continue;
        };
        if binaries.contains_key(&id) {
            continue;
        }
        let compressed = blob.attr("Compress").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let bytes = decode_payload(&blob.text_content(), compressed).map_err(|err| {
            FragmentFault::UndecodableBinary {
                id: id.clone(),
                message: err.to_string(),
            }
        })?;
        let format = definitions
            .bin_format_for(&id)
            .map_or_else(|| BinaryFormat::from_tag("bin"), BinaryFormat::from_tag);
        binaries.insert(id, DecodedBinary { format, bytes });
    }
    Ok(binaries)
}

pub(crate) fn decode_supplied(payload: &BinaryPayload) -> Result<Vec<u8>, String> {
    let as_text = || std::str::from_utf8(&payload.bytes).map_err(|e| e.to_string());
    match payload.encoding {
        PayloadEncoding::Raw => Ok(payload.bytes.clone()),
        PayloadEncoding::Base64 => decode_base64(as_text()?).map_err(|e| e.to_string()),
        PayloadEncoding::Base64Deflate => {
            let stream = decode_base64(as_text()?).map_err(|e| e.to_string())?;
            inflate_raw(&stream).map_err(|e| e.to_string())
        }
    }
}

/// Moves a binary reference written on a picture down to its image.
pub(super) fn move_picture_binary(picture: &mut Element) {
    let alias = BINARY_ALIASES
        .iter()
        .find_map(|name| picture.remove_attr(name).map(|value| (*name, value)));
    for name in BINARY_ALIASES {
        picture.remove_attr(name);
    }
    let Some((name, value)) = alias else {
        return;
    };
    match picture.child_mut("IMAGE") {
        Some(image) => {
            if !BINARY_ALIASES.iter().any(|a| image.has_attr(a)) {
                image.set_attr(name, value);
            }
        }
        None => picture
            .children
            .push(Node::Element(Element::new("IMAGE").with_attr(name, value))),
    }
}

/// The fragment storage id an image points at.
///
/// `BinItem` is a position in the fragment's binary index when it has
/// one, otherwise the storage id itself. The other aliases always name
/// the storage id.
pub fn binary_target(image: &Element, definitions: &FragmentDefinitions) -> Option<LocalId> {
    if let Some(item) = image.attr("BinItem").filter(|v| !is_null_reference(v)) {
        let item = LocalId::from(item.trim());
        return Some(definitions.bin_data_for(&item).unwrap_or(item));
    }
    BINARY_ALIASES[1..]
        .iter()
        .find_map(|name| image.attr(name).filter(|v| !is_null_reference(v)))
        .map(|v| LocalId::from(v.trim()))
}

/// Applies the missing-binary policy to every picture.
pub(super) fn check_binaries(
    nodes: &mut Vec<Node>,
    definitions: &FragmentDefinitions,
    binaries: &HashMap<LocalId, DecodedBinary>,
    policy: MissingBinaryPolicy,
    diagnostics: &mut Diagnostics,
) -> Result<(), FragmentFault> {
    let mut index = 0;
    while index < nodes.len() {
        let Node::Element(el) = &mut nodes[index] else {
            index += 1;
            continue;
        };
        let image = match el.name.as_str() {
            "PICTURE" => el.child("IMAGE"),
            "IMAGE" => Some(&*el),
            _ => None,
        };
        let missing = image
            .and_then(|image| binary_target(image, definitions))
            .filter(|target| !binaries.contains_key(target));
        match (missing, policy) {
            (Some(target), MissingBinaryPolicy::Degrade) => {
                return Err(FragmentFault::MissingBinary(target));
            }
            (Some(target), MissingBinaryPolicy::DropPicture) => {
                log::warn!("dropping picture with missing binary '{target}'");
                diagnostics.push(Diagnostic::DroppedPicture { binary: target });
                nodes.remove(index);
            }
            (None, _) => {
                check_binaries(&mut el.children, definitions, binaries, policy, diagnostics)?;
                index += 1;
            }
        }
    }
    Ok(())
}

/// Empties every non-null reference attribute and records where it was.
pub(super) fn take_references(
    nodes: &mut [Node],
    definitions: &FragmentDefinitions,
) -> Vec<PendingRef> {
    let mut references = Vec::new();
    let mut path = NodePath::new();
    for (index, node) in nodes.iter_mut().enumerate() {
        if let Node::Element(el) = node {
            path.push(index);
            take_from(el, &mut path, definitions, &mut references);
            path.pop();
        }
    }
    references
}

fn take_from(
    el: &mut Element,
    path: &mut NodePath,
    definitions: &FragmentDefinitions,
    references: &mut Vec<PendingRef>,
) {
    if el.name == "IMAGE" {
        let target = binary_target(el, definitions);
        for alias in BINARY_ALIASES {
            el.remove_attr(alias);
        }
        if let Some(data) = target {
            el.attributes.insert(
                0,
                quire_xml::Attribute {
                    name: "BinItem".to_string(),
                    value: String::new(),
                },
            );
            references.push(PendingRef {
                path: path.clone(),
                attribute: "BinItem",
                target: RefTarget::Binary { data },
            });
        }
    } else {
        let name = el.name.clone();
        for reference in references_of(&name) {
            let Some(value) = el.attr(reference.attribute) else {
                continue;
            };
            if is_null_reference(value) {
                continue;
            }
            let local = LocalId::from(value.trim());
            el.set_attr(reference.attribute, "");
            references.push(PendingRef {
                path: path.clone(),
                attribute: reference.attribute,
                target: RefTarget::Definition {
                    category: reference.category,
                    local,
                },
            });
        }
    }
    el.attributes.retain(|a| !a.name.starts_with("data-hml-"));

    for (index, child) in el.children.iter_mut().enumerate() {
        if let Node::Element(child) = child {
            path.push(index);
            take_from(child, path, definitions, references);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_xml::{ParseOptions, parse_fragment, write_nodes};

    fn nodes(markup: &str) -> Vec<Node> {
        parse_fragment(markup, ParseOptions::strict()).unwrap()
    }

    #[test]
    fn picture_alias_moves_to_image() {
        let mut picture = nodes(r#"<PICTURE BinData="4"><IMAGE/></PICTURE>"#)
            .remove(0)
            .as_element()
            .cloned()
            .unwrap();
        move_picture_binary(&mut picture);
        assert!(!picture.has_attr("BinData"));
        assert_eq!(picture.child("IMAGE").unwrap().attr("BinData"), Some("4"));
    }

    #[test]
    fn binary_target_prefers_the_index_position() {
        let mut defs = FragmentDefinitions::default();
        defs.collect(
            &nodes(r#"<BINDATALIST><BINITEM BinData="12"/></BINDATALIST>"#)[0]
                .as_element()
                .cloned()
                .unwrap(),
        );
        let image = Element::new("IMAGE").with_attr("BinItem", 1);
        assert_eq!(binary_target(&image, &defs), Some(LocalId::from("12")));

        let direct = Element::new("IMAGE").with_attr("data-hml-bin-id", "abc");
        assert_eq!(binary_target(&direct, &defs), Some(LocalId::from("abc")));

        let null = Element::new("IMAGE").with_attr("BinItem", "4294967295");
        assert_eq!(binary_target(&null, &defs), None);
    }

    #[test]
    fn storage_blobs_are_decoded() {
        let storage = nodes(
            r#"<BINDATASTORAGE><BINDATA Id="2" Compress="false">aGk=</BINDATA></BINDATASTORAGE>"#,
        );
        let storage: Vec<Element> = storage.iter().filter_map(Node::as_element).cloned().collect();
        let binaries = decode_binaries(&[], &storage, &FragmentDefinitions::default()).unwrap();
        assert_eq!(binaries[&LocalId::from("2")].bytes, b"hi");
    }

    #[test]
    fn bad_payload_is_a_fault() {
        let payload = BinaryPayload::base64("x", BinaryFormat::Png, "***");
        let err = decode_binaries(&[payload], &[], &FragmentDefinitions::default()).unwrap_err();
        assert!(matches!(err, FragmentFault::UndecodableBinary { .. }));
    }

    #[test]
    fn references_are_emptied_with_paths() {
        let mut body = nodes(
            r#"<P Style="0"><TEXT CharShape="3"><TABLE BorderFill="2"/></TEXT></P>"#,
        );
        let refs = take_references(&mut body, &FragmentDefinitions::default());
        let paths: Vec<_> = refs.iter().map(|r| (r.path.clone(), r.attribute)).collect();
        assert_eq!(
            paths,
            [
                (vec![0], "Style"),
                (vec![0, 0], "CharShape"),
                (vec![0, 0, 0], "BorderFill")
            ]
        );
        assert_eq!(
            write_nodes(&body).unwrap(),
            r#"<P Style=""><TEXT CharShape=""><TABLE BorderFill=""/></TEXT></P>"#
        );
    }
}
