//! Node identifiers, nodes and their configuration form.

use serde::{Deserialize, Serialize};

use crate::address_space::variant::Variant;

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Namespace-qualified node identifier.
///
/// Written in config as `{ ns = 2, i = 1000 }` or `{ ns = 2, s = "Pump" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawNodeId", into = "RawNodeId")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(v) => write!(f, "s={}", v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNodeId {
    #[serde(default)]
    ns: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<String>,
}

impl TryFrom<RawNodeId> for NodeId {
    type Error = String;

    fn try_from(raw: RawNodeId) -> Result<Self, Self::Error> {
        match (raw.i, raw.s) {
            (Some(i), None) => Ok(NodeId::numeric(raw.ns, i)),
            (None, Some(s)) => Ok(NodeId::string(raw.ns, s)),
            _ => Err("node id needs exactly one of 'i' or 's'".to_string()),
        }
    }
}

impl From<NodeId> for RawNodeId {
    fn from(id: NodeId) -> Self {
        match id.identifier {
            Identifier::Numeric(i) => RawNodeId { ns: id.namespace, i: Some(i), s: None },
            Identifier::String(s) => RawNodeId { ns: id.namespace, i: None, s: Some(s) },
        }
    }
}

/// Node classes supported by the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    Variable,
}

/// Read/write permission bits of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessLevel(u8);

impl AccessLevel {
    pub const NONE: AccessLevel = AccessLevel(0x00);
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);
    pub const READ_WRITE: AccessLevel = AccessLevel(0x03);

    pub fn from_flags(readable: bool, writable: bool) -> Self {
        let mut bits = 0;
        if readable {
            bits |= Self::CURRENT_READ.0;
        }
        if writable {
            bits |= Self::CURRENT_WRITE.0;
        }
        AccessLevel(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn readable(&self) -> bool {
        self.0 & Self::CURRENT_READ.0 != 0
    }

    pub fn writable(&self) -> bool {
        self.0 & Self::CURRENT_WRITE.0 != 0
    }
}

/// Class-specific node data.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object,
    Variable { value: Variant, access: AccessLevel },
}

/// A node in the address space.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_id: NodeId,
    pub browse_name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// `None` only for the Objects folder.
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn node_class(&self) -> NodeClass {
        match self.kind {
            NodeKind::Object => NodeClass::Object,
            NodeKind::Variable { .. } => NodeClass::Variable,
        }
    }
}

fn objects_folder() -> NodeId {
    crate::address_space::OBJECTS_FOLDER
}

fn yes() -> bool {
    true
}

/// Node as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub node_id: NodeId,
    pub node_class: NodeClass,
    pub browse_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "objects_folder")]
    pub parent: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Variant>,
    #[serde(default = "yes")]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
}

impl NodeDefinition {
    pub fn into_node(self) -> Node {
        let kind = match self.node_class {
            NodeClass::Object => NodeKind::Object,
            NodeClass::Variable => NodeKind::Variable {
                value: self.value.unwrap_or_default(),
                access: AccessLevel::from_flags(self.readable, self.writable),
            },
        };
        Node {
            display_name: self.display_name.unwrap_or_else(|| self.browse_name.clone()),
            node_id: self.node_id,
            browse_name: self.browse_name,
            description: self.description,
            parent: Some(self.parent),
            kind,
        }
    }
}
