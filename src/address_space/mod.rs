//! Minimal address space.
//!
//! # Structure
//! ```text
//! Objects (i=85)
//!   └── Server (i=2253)
//!         └── ServerStatus (i=2256)
//!               └── CurrentTime (i=2258)   updated by the server clock timer
//!   └── ... nodes from configuration
//! ```
//!
//! # Design Decisions
//! - Only Object and Variable node classes; references are parent links
//! - Configured nodes may be listed in any order; parents are inserted first
//! - Client writes respect the access level, internal updates do not

pub mod namespace;
pub mod node;
pub mod variant;

use std::collections::HashMap;

use thiserror::Error;

pub use namespace::{NamespaceTable, OPC_UA_NAMESPACE};
pub use node::{AccessLevel, Identifier, Node, NodeClass, NodeDefinition, NodeId, NodeKind};
pub use variant::Variant;

pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
pub const SERVER: NodeId = NodeId::numeric(0, 2253);
pub const SERVER_STATUS: NodeId = NodeId::numeric(0, 2256);
pub const SERVER_CURRENT_TIME: NodeId = NodeId::numeric(0, 2258);

/// Errors from address space operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressSpaceError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("parent {parent} of node {node} does not exist")]
    UnknownParent { node: NodeId, parent: NodeId },

    #[error("namespace index {index} of node {node} is not registered")]
    UnknownNamespace { node: NodeId, index: u16 },

    #[error("node {0} is not a variable")]
    NotVariable(NodeId),

    #[error("node {0} is not writable")]
    NotWritable(NodeId),
}

/// All nodes known to a server.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    namespaces: NamespaceTable,
    nodes: HashMap<NodeId, Node>,
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl AddressSpace {
    /// Create the address space with its standard nodes.
    pub fn new(application_uri: &str) -> Self {
        let mut space = Self {
            namespaces: NamespaceTable::new(application_uri),
            nodes: HashMap::new(),
            children: HashMap::new(),
        };
        space.nodes.insert(
            OBJECTS_FOLDER,
            Node {
                node_id: OBJECTS_FOLDER,
                browse_name: "Objects".to_string(),
                display_name: "Objects".to_string(),
                description: None,
                parent: None,
                kind: NodeKind::Object,
            },
        );

        let standard = [
            (SERVER, "Server", OBJECTS_FOLDER, None),
            (SERVER_STATUS, "ServerStatus", SERVER, None),
            (
                SERVER_CURRENT_TIME,
                "CurrentTime",
                SERVER_STATUS,
                Some(Variant::DateTime(std::time::SystemTime::now())),
            ),
        ];
        for (node_id, name, parent, value) in standard {
            let kind = match value {
                Some(value) => NodeKind::Variable {
                    value,
                    access: AccessLevel::CURRENT_READ,
                },
                None => NodeKind::Object,
            };
            // Standard ids are unique and their parents exist by construction.
            let _ = space.insert(Node {
                node_id,
                browse_name: name.to_string(),
                display_name: name.to_string(),
                description: None,
                parent: Some(parent),
                kind,
            });
        }
        space
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn register_namespace(&mut self, uri: &str) -> u16 {
        let idx = self.namespaces.register(uri);
        tracing::debug!(uri, index = idx, "Namespace registered");
        idx
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Children of a node in insertion order.
    pub fn browse_children(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_object(&mut self, node_id: NodeId, browse_name: &str, parent: NodeId) -> Result<(), AddressSpaceError> {
        self.insert(Node {
            node_id,
            browse_name: browse_name.to_string(),
            display_name: browse_name.to_string(),
            description: None,
            parent: Some(parent),
            kind: NodeKind::Object,
        })
    }

    pub fn add_variable(
        &mut self,
        node_id: NodeId,
        browse_name: &str,
        parent: NodeId,
        value: Variant,
        access: AccessLevel,
    ) -> Result<(), AddressSpaceError> {
        self.insert(Node {
            node_id,
            browse_name: browse_name.to_string(),
            display_name: browse_name.to_string(),
            description: None,
            parent: Some(parent),
            kind: NodeKind::Variable { value, access },
        })
    }

    /// Insert a node whose namespace and parent already exist.
    pub fn insert(&mut self, node: Node) -> Result<(), AddressSpaceError> {
        if !self.namespaces.contains_index(node.node_id.namespace) {
            return Err(AddressSpaceError::UnknownNamespace {
                index: node.node_id.namespace,
                node: node.node_id,
            });
        }
        if self.nodes.contains_key(&node.node_id) {
            return Err(AddressSpaceError::DuplicateNode(node.node_id));
        }
        if let Some(parent) = &node.parent {
            if !self.nodes.contains_key(parent) {
                return Err(AddressSpaceError::UnknownParent {
                    node: node.node_id.clone(),
                    parent: parent.clone(),
                });
            }
            self.children.entry(parent.clone()).or_default().push(node.node_id.clone());
        }
        self.nodes.insert(node.node_id.clone(), node);
        Ok(())
    }

    /// Insert configured nodes, parents before children regardless of order.
    pub fn populate(&mut self, definitions: Vec<NodeDefinition>) -> Result<usize, AddressSpaceError> {
        let mut pending = definitions;
        let mut inserted = 0;

        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|def| self.nodes.contains_key(&def.parent));

            if ready.is_empty() {
                // Nothing left can be attached: report the first orphan.
                let def = &waiting[0];
                return Err(AddressSpaceError::UnknownParent {
                    node: def.node_id.clone(),
                    parent: def.parent.clone(),
                });
            }
            for def in ready {
                self.insert(def.into_node())?;
                inserted += 1;
            }
            pending = waiting;
        }
        Ok(inserted)
    }

    pub fn read_value(&self, id: &NodeId) -> Result<&Variant, AddressSpaceError> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Variable { value, .. }) => Ok(value),
            Some(NodeKind::Object) => Err(AddressSpaceError::NotVariable(id.clone())),
            None => Err(AddressSpaceError::UnknownNode(id.clone())),
        }
    }

    /// Client write: rejected unless the variable is writable.
    pub fn write_value(&mut self, id: &NodeId, new_value: Variant) -> Result<(), AddressSpaceError> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Variable { value, access }) => {
                if !access.writable() {
                    return Err(AddressSpaceError::NotWritable(id.clone()));
                }
                *value = new_value;
                Ok(())
            }
            Some(NodeKind::Object) => Err(AddressSpaceError::NotVariable(id.clone())),
            None => Err(AddressSpaceError::UnknownNode(id.clone())),
        }
    }

    /// Server-internal update that ignores the access level.
    pub fn set_value(&mut self, id: &NodeId, new_value: Variant) -> Result<(), AddressSpaceError> {
        match self.nodes.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Variable { value, .. }) => {
                *value = new_value;
                Ok(())
            }
            Some(NodeKind::Object) => Err(AddressSpaceError::NotVariable(id.clone())),
            None => Err(AddressSpaceError::UnknownNode(id.clone())),
        }
    }
}
