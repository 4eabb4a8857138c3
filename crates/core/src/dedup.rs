//! Content-addressed registry of embedded binaries.

use crate::allocator::{AllocationKey, IdAllocator};
use quire_types::{BinaryFormat, DefinitionCategory, GlobalId, LocalId, QuestionId};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// SHA-256 of a binary's decoded bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentSignature([u8; 32]);

impl ContentSignature {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Debug for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentSignature({self})")
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One stored binary and everyone who referenced it.
#[derive(Debug, Clone)]
pub struct BinaryResource {
    pub signature: ContentSignature,
    pub format: BinaryFormat,
    pub bytes: Vec<u8>,
    /// Position in the binary index (`BINITEM`).
    pub item_id: GlobalId,
    /// Storage id (`BINDATA@Id`).
    pub data_id: GlobalId,
    pub origins: Vec<(QuestionId, LocalId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHandle {
    pub item_id: GlobalId,
    pub data_id: GlobalId,
    /// True when an identical payload was already registered.
    pub reused: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BinaryRegistry {
    by_signature: HashMap<ContentSignature, usize>,
    resources: Vec<BinaryResource>,
}

impl BinaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a payload, reusing the ids of an identical one if present.
    pub fn register(
        &mut self,
        ids: &mut IdAllocator,
        question: &QuestionId,
        local: &LocalId,
        format: BinaryFormat,
        bytes: &[u8],
    ) -> BinaryHandle {
        let item_key = AllocationKey::new(DefinitionCategory::BinItem, question, local);
        let data_key = AllocationKey::new(DefinitionCategory::BinData, question, local);
        let signature = ContentSignature::of(bytes);

        if let Some(&index) = self.by_signature.get(&signature) {
            let resource = &mut self.resources[index];
            resource.origins.push((question.clone(), local.clone()));
            let item_id = ids.bind(item_key, resource.item_id);
            let data_id = ids.bind(data_key, resource.data_id);
            log::debug!(
                "binary {local} of {question} reuses item {item_id} ({signature})"
            );
            return BinaryHandle {
                item_id,
                data_id,
                reused: true,
            };
        }

        let item_id = ids.resolve(item_key);
        let data_id = ids.resolve(data_key);
        self.by_signature.insert(signature, self.resources.len());
        self.resources.push(BinaryResource {
            signature,
            format,
            bytes: bytes.to_vec(),
            item_id,
            data_id,
            origins: vec![(question.clone(), local.clone())],
        });
        BinaryHandle {
            item_id,
            data_id,
            reused: false,
        }
    }

    /// Registered binaries in allocation order.
    pub fn resources(&self) -> &[BinaryResource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_share_ids() {
        let mut ids = IdAllocator::new();
        let mut registry = BinaryRegistry::new();
        let q1 = QuestionId::from("q1");
        let q2 = QuestionId::from("q2");

        let a = registry.register(&mut ids, &q1, &LocalId::from("1"), BinaryFormat::Png, b"logo");
        let b = registry.register(&mut ids, &q2, &LocalId::from("7"), BinaryFormat::Png, b"logo");
        let c = registry.register(&mut ids, &q2, &LocalId::from("8"), BinaryFormat::Png, b"other");

        assert_eq!(a.item_id, b.item_id);
        assert_eq!(a.data_id, b.data_id);
        assert!(b.reused);
        assert_ne!(a.item_id, c.item_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resources()[0].origins.len(), 2);
    }

    #[test]
    fn ids_follow_reserved_floor() {
        let mut ids = IdAllocator::new();
        ids.reserve(DefinitionCategory::BinItem, 2);
        ids.reserve(DefinitionCategory::BinData, 5);
        let mut registry = BinaryRegistry::new();
        let handle = registry.register(
            &mut ids,
            &QuestionId::from("q"),
            &LocalId::from("1"),
            BinaryFormat::Jpg,
            b"jpeg",
        );
        assert_eq!(handle.item_id, GlobalId::new(3));
        assert_eq!(handle.data_id, GlobalId::new(6));
    }

    #[test]
    fn signature_is_content_based() {
        assert_eq!(ContentSignature::of(b"x"), ContentSignature::of(b"x"));
        assert_ne!(ContentSignature::of(b"x"), ContentSignature::of(b"y"));
    }
}
