//! Key and record codecs
//!
//! Every encoder has an exact size function and a matching decoder. Decoders reject
//! truncated input, trailing bytes, unknown type tags and invalid UTF-8.

use super::SchemaError;
use crate::tree::node::{DirectoryNode, FileNode, Node};
use crate::types::{NodeId, NodeKind, NODE_NAME_LENGTH_MAX};

pub const PREFIX_LEN: usize = 4;
pub const NODES_PREFIX: [u8; PREFIX_LEN] = *b"NODE";
pub const NAME_INDEX_PREFIX: [u8; PREFIX_LEN] = *b"NIDX";
pub const RELATIONSHIPS_PREFIX: [u8; PREFIX_LEN] = *b"RELS";
pub const META_PREFIX: [u8; PREFIX_LEN] = *b"META";

/// On-disk layout version recorded under `META schema_version`
pub const SCHEMA_VERSION: u32 = 1;

const ID_LEN: usize = 4;
const STAMP_LEN: usize = 8;

/// Check that a child name can be keyed: non-empty, at most 255 UTF-8 bytes,
/// no `/` and no NUL.
pub fn validate_name(name: &str) -> Result<(), SchemaError> {
    check_name_length(name)?;
    if let Some(c) = name.chars().find(|&c| c == '/' || c == '\0') {
        return Err(invalid_name(name, format!("contains forbidden character {:?}", c)));
    }
    Ok(())
}

fn check_name_length(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(invalid_name(name, "name is empty".to_string()));
    }
    if name.len() > NODE_NAME_LENGTH_MAX {
        return Err(invalid_name(
            name,
            format!(
                "{} UTF-8 bytes exceeds the limit of {}",
                name.len(),
                NODE_NAME_LENGTH_MAX
            ),
        ));
    }
    Ok(())
}

fn invalid_name(name: &str, reason: String) -> SchemaError {
    SchemaError::InvalidName {
        name: name.to_string(),
        reason,
    }
}

/// Cursor over an encoded buffer
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        ByteReader { buf, pos: 0, what }
    }

    fn error(&self, reason: String) -> SchemaError {
        if self.what == "record" {
            SchemaError::MalformedRecord(reason)
        } else {
            SchemaError::MalformedKey {
                table: self.what,
                reason,
            }
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SchemaError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(self.error(format!(
                "truncated at byte {}, need {} more of {}",
                self.pos,
                len,
                self.buf.len()
            )));
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn expect_prefix(&mut self, prefix: &[u8; PREFIX_LEN]) -> Result<(), SchemaError> {
        let found = self.take(PREFIX_LEN)?;
        if found != prefix {
            return Err(self.error(format!("unexpected prefix {:?}", found)));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, SchemaError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, SchemaError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, SchemaError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn kind(&mut self) -> Result<NodeKind, SchemaError> {
        let tag = self.u8()?;
        NodeKind::from_tag(tag).ok_or_else(|| self.error(format!("unknown node type {}", tag)))
    }

    fn name(&mut self) -> Result<String, SchemaError> {
        let len = self.u8()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| self.error(format!("name is not UTF-8: {}", e)))
    }

    fn finish(self) -> Result<(), SchemaError> {
        if self.pos != self.buf.len() {
            return Err(self.error(format!(
                "{} trailing bytes",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Nodes table key: `NODE ∥ nodeID`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodesKey {
    pub node_id: NodeId,
}

impl NodesKey {
    pub const ENCODED_LEN: usize = PREFIX_LEN + ID_LEN;

    pub fn new(node_id: NodeId) -> Self {
        NodesKey { node_id }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(&NODES_PREFIX);
        buf.extend_from_slice(&self.node_id.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = ByteReader::new(bytes, "Nodes");
        reader.expect_prefix(&NODES_PREFIX)?;
        let node_id = reader.u32()?;
        reader.finish()?;
        Ok(NodesKey { node_id })
    }
}

/// NameIndex table key
///
/// `NIDX ∥ parentID ∥ nodeID ∥ mtime ∥ type ∥ nameLength ∥ name`. Directories carry mtime 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameIndexKey {
    parent_id: NodeId,
    node_id: NodeId,
    mtime: u64,
    kind: NodeKind,
    name: String,
}

impl NameIndexKey {
    /// Bytes before the name
    pub const FIXED_LEN: usize = PREFIX_LEN + ID_LEN + ID_LEN + STAMP_LEN + 1 + 1;

    /// Build a key. Fails instead of truncating when the name is not keyable.
    pub fn new(
        parent_id: NodeId,
        node_id: NodeId,
        mtime: u64,
        kind: NodeKind,
        name: &str,
    ) -> Result<Self, SchemaError> {
        validate_name(name)?;
        Ok(NameIndexKey {
            parent_id,
            node_id,
            mtime,
            kind,
            name: name.to_string(),
        })
    }

    /// Key for a persisted child record.
    pub fn for_record(
        parent_id: NodeId,
        node_id: NodeId,
        record: &NodeRecord,
    ) -> Result<Self, SchemaError> {
        let mtime = match record.kind {
            NodeKind::File => record.stamp,
            NodeKind::Directory => 0,
        };
        NameIndexKey::new(parent_id, node_id, mtime, record.kind, &record.name)
    }

    /// Shared prefix of all NameIndex keys under one parent.
    pub fn parent_prefix(parent_id: NodeId) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_LEN + ID_LEN);
        buf.extend_from_slice(&NAME_INDEX_PREFIX);
        buf.extend_from_slice(&parent_id.to_be_bytes());
        buf
    }

    pub fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn mtime(&self) -> u64 {
        self.mtime
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoded_len(&self) -> usize {
        Self::FIXED_LEN + self.name.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&NAME_INDEX_PREFIX);
        buf.extend_from_slice(&self.parent_id.to_be_bytes());
        buf.extend_from_slice(&self.node_id.to_be_bytes());
        buf.extend_from_slice(&self.mtime.to_be_bytes());
        buf.push(self.kind.tag());
        // validate_name bounds the length to one byte
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = ByteReader::new(bytes, "NameIndex");
        reader.expect_prefix(&NAME_INDEX_PREFIX)?;
        let parent_id = reader.u32()?;
        let node_id = reader.u32()?;
        let mtime = reader.u64()?;
        let kind = reader.kind()?;
        let name = reader.name()?;
        reader.finish()?;
        validate_name(&name).map_err(|e| SchemaError::MalformedKey {
            table: "NameIndex",
            reason: e.to_string(),
        })?;
        Ok(NameIndexKey {
            parent_id,
            node_id,
            mtime,
            kind,
            name,
        })
    }
}

/// Relationships table key: `RELS ∥ parentID ∥ nodeID`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipsKey {
    pub parent_id: NodeId,
    pub node_id: NodeId,
}

impl RelationshipsKey {
    pub const ENCODED_LEN: usize = PREFIX_LEN + ID_LEN + ID_LEN;

    pub fn new(parent_id: NodeId, node_id: NodeId) -> Self {
        RelationshipsKey { parent_id, node_id }
    }

    pub fn parent_prefix(parent_id: NodeId) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_LEN + ID_LEN);
        buf.extend_from_slice(&RELATIONSHIPS_PREFIX);
        buf.extend_from_slice(&parent_id.to_be_bytes());
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(&RELATIONSHIPS_PREFIX);
        buf.extend_from_slice(&self.parent_id.to_be_bytes());
        buf.extend_from_slice(&self.node_id.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = ByteReader::new(bytes, "Relationships");
        reader.expect_prefix(&RELATIONSHIPS_PREFIX)?;
        let parent_id = reader.u32()?;
        let node_id = reader.u32()?;
        reader.finish()?;
        Ok(RelationshipsKey { parent_id, node_id })
    }
}

/// Store metadata entries: `META ∥ name`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    /// Next node ID to hand out (u32)
    NextNodeId,
    /// Layout version (u32)
    SchemaVersion,
    /// Comparator name (UTF-8), informational
    Collation,
}

impl MetaKey {
    fn label(self) -> &'static [u8] {
        match self {
            MetaKey::NextNodeId => b"next_node_id",
            MetaKey::SchemaVersion => b"schema_version",
            MetaKey::Collation => b"collation",
        }
    }

    pub fn encode(self) -> Vec<u8> {
        let label = self.label();
        let mut buf = Vec::with_capacity(PREFIX_LEN + label.len());
        buf.extend_from_slice(&META_PREFIX);
        buf.extend_from_slice(label);
        buf
    }

    pub fn encode_u32(value: u32) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }

    pub fn decode_u32(self, bytes: &[u8]) -> Result<u32, SchemaError> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| SchemaError::MalformedKey {
            table: "Metadata",
            reason: format!(
                "{} holds {} bytes, expected 4",
                String::from_utf8_lossy(self.label()),
                bytes.len()
            ),
        })?;
        Ok(u32::from_be_bytes(raw))
    }
}

/// Nodes table value: `type ∥ nameLength ∥ name ∥ stamp`
///
/// `stamp` is the mtime of a file or the listing revision of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub kind: NodeKind,
    pub name: String,
    pub stamp: u64,
}

impl NodeRecord {
    pub fn file(name: impl Into<String>, mtime: u64) -> Self {
        NodeRecord {
            kind: NodeKind::File,
            name: name.into(),
            stamp: mtime,
        }
    }

    pub fn directory(name: impl Into<String>, listing_revision: u64) -> Self {
        NodeRecord {
            kind: NodeKind::Directory,
            name: name.into(),
            stamp: listing_revision,
        }
    }

    /// Record for a node's own fields; children are not part of the record.
    pub fn from_node(node: &Node) -> Self {
        match node {
            Node::File(file) => NodeRecord::file(file.name.clone(), file.mtime),
            Node::Directory(directory) => {
                NodeRecord::directory(directory.name.clone(), directory.listing_revision)
            }
        }
    }

    /// Materialize the record as a childless node carrying `node_id`.
    pub fn into_node(self, node_id: NodeId) -> Node {
        match self.kind {
            NodeKind::File => Node::File(FileNode {
                node_id: Some(node_id),
                name: self.name,
                mtime: self.stamp,
            }),
            NodeKind::Directory => Node::Directory(DirectoryNode {
                node_id: Some(node_id),
                name: self.name,
                listing_revision: self.stamp,
                children: Vec::new(),
            }),
        }
    }

    pub fn encoded_len(&self) -> usize {
        1 + 1 + self.name.len() + STAMP_LEN
    }

    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        check_name_length(&self.name)?;
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.kind.tag());
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.stamp.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut reader = ByteReader::new(bytes, "record");
        let kind = reader.kind()?;
        let name = reader.name()?;
        let stamp = reader.u64()?;
        reader.finish()?;
        if name.is_empty() {
            return Err(SchemaError::MalformedRecord("empty name".to_string()));
        }
        Ok(NodeRecord { kind, name, stamp })
    }
}
