//! Portable archive format for node subtrees
//!
//! A versioned JSON envelope around a [`Node`]. Decoding an encoded tree yields the
//! same names, kinds, mtimes, listing revisions and child sets at every level.

use crate::error::ArchiveError;
use crate::tree::node::Node;
use serde::{Deserialize, Serialize};

/// Current archive format version
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    root: &'a Node,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    root: Node,
}

/// Encode a subtree to archive bytes.
pub fn encode(node: &Node) -> Result<Vec<u8>, ArchiveError> {
    let envelope = EnvelopeRef {
        version: ARCHIVE_VERSION,
        root: node,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Decode a subtree from archive bytes.
pub fn decode(bytes: &[u8]) -> Result<Node, ArchiveError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.version != ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion {
            found: envelope.version,
            expected: ARCHIVE_VERSION,
        });
    }
    validate(&envelope.root)?;
    Ok(envelope.root)
}

fn validate(node: &Node) -> Result<(), ArchiveError> {
    if node.name().is_empty() {
        return Err(ArchiveError::InvalidNode("empty node name".to_string()));
    }
    if let Node::Directory(directory) = node {
        for child in &directory.children {
            validate(child)?;
        }
    }
    Ok(())
}
