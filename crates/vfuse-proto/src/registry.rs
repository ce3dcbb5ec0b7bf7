use std::collections::HashMap;

use crate::error::{ProtoError, Result};
use crate::messages::{MessageKind, STANDARD_PAIRS};

/// Immutable bidirectional map between wire tags and schemas.
///
/// Built once at startup and shared (typically behind an `Arc`) by every
/// connection. Both peers must build identical tables.
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    by_tag: Vec<Option<MessageKind>>,
    by_kind: HashMap<MessageKind, u32>,
}

impl MessageRegistry {
    /// Start an empty table.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The protocol table every vfuse peer uses.
    pub fn standard() -> Result<Self> {
        STANDARD_PAIRS
            .iter()
            .fold(Self::builder(), |builder, (req, res)| builder.rpc(*req, *res))
            .build()
    }

    /// Tag for a schema (type-of direction).
    pub fn tag_of(&self, kind: MessageKind) -> Option<u32> {
        self.by_kind.get(&kind).copied()
    }

    /// Schema for a tag (new-value direction). Placeholder tags yield `None`.
    pub fn kind_of(&self, tag: u32) -> Option<MessageKind> {
        self.by_tag.get(tag as usize).copied().flatten()
    }

    /// Number of tags in use, placeholders included.
    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    /// Registered `(tag, kind)` pairs in tag order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, MessageKind)> + '_ {
        self.by_tag
            .iter()
            .enumerate()
            .filter_map(|(tag, kind)| kind.map(|kind| (tag as u32, kind)))
    }
}

/// Appends request/response pairs in tag order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    slots: Vec<Option<(MessageKind, MessageKind)>>,
}

impl RegistryBuilder {
    /// Register the next pair: `request` gets tag `2k`, `response` gets `2k+1`.
    pub fn rpc(mut self, request: MessageKind, response: MessageKind) -> Self {
        self.slots.push(Some((request, response)));
        self
    }

    /// Burn the next two tags for a retired pair.
    pub fn placeholder(mut self) -> Self {
        self.slots.push(None);
        self
    }

    /// Freeze the table.
    ///
    /// Fails if any schema appears twice or a pair is registered backwards.
    pub fn build(self) -> Result<MessageRegistry> {
        let mut by_tag = Vec::with_capacity(self.slots.len() * 2);
        let mut by_kind = HashMap::with_capacity(self.slots.len() * 2);

        for slot in self.slots {
            let (request, response) = match slot {
                Some((request, response)) => (Some(request), Some(response)),
                None => (None, None),
            };

            for (kind, want_request) in [(request, true), (response, false)] {
                let tag = by_tag.len() as u32;
                if let Some(kind) = kind {
                    if kind.is_request() != want_request {
                        return Err(ProtoError::MisplacedKind(kind));
                    }
                    if by_kind.insert(kind, tag).is_some() {
                        return Err(ProtoError::DuplicateRegistration(kind));
                    }
                }
                by_tag.push(kind);
            }
        }

        tracing::debug!(tags = by_tag.len(), "message registry built");
        Ok(MessageRegistry { by_tag, by_kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_positional() {
        let registry = MessageRegistry::standard().unwrap();

        assert_eq!(registry.tag_count(), 38);
        assert_eq!(registry.tag_of(MessageKind::AttrRequest), Some(0));
        assert_eq!(registry.tag_of(MessageKind::AttrResponse), Some(1));
        assert_eq!(registry.tag_of(MessageKind::ReadRequest), Some(10));
        assert_eq!(registry.tag_of(MessageKind::RenameResponse), Some(29));
        assert_eq!(registry.tag_of(MessageKind::CloseRequest), Some(36));
        assert_eq!(registry.kind_of(37), Some(MessageKind::CloseResponse));
        assert_eq!(registry.kind_of(38), None);
    }

    #[test]
    fn lookups_are_inverse() {
        let registry = MessageRegistry::standard().unwrap();
        for (tag, kind) in registry.entries() {
            assert_eq!(registry.tag_of(kind), Some(tag));
            assert_eq!(registry.kind_of(tag), Some(kind));
        }
    }

    #[test]
    fn placeholder_consumes_two_tags() {
        let registry = MessageRegistry::builder()
            .rpc(MessageKind::AttrRequest, MessageKind::AttrResponse)
            .placeholder()
            .rpc(MessageKind::CloseRequest, MessageKind::CloseResponse)
            .build()
            .unwrap();

        assert_eq!(registry.kind_of(2), None);
        assert_eq!(registry.kind_of(3), None);
        assert_eq!(registry.tag_of(MessageKind::CloseRequest), Some(4));
        assert_eq!(registry.tag_of(MessageKind::CloseResponse), Some(5));
        assert_eq!(registry.entries().count(), 4);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = MessageRegistry::builder()
            .rpc(MessageKind::AttrRequest, MessageKind::AttrResponse)
            .rpc(MessageKind::AttrRequest, MessageKind::ReadResponse)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ProtoError::DuplicateRegistration(MessageKind::AttrRequest)
        ));
    }

    #[test]
    fn backwards_pair_is_rejected() {
        let err = MessageRegistry::builder()
            .rpc(MessageKind::OpenResponse, MessageKind::OpenRequest)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ProtoError::MisplacedKind(MessageKind::OpenResponse)
        ));
    }
}
