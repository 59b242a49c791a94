//! Namespace table.

/// URI of namespace 0.
pub const OPC_UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// Ordered namespace URIs; the position is the namespace index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    /// Index 0 is the OPC UA namespace, index 1 the server's application URI.
    pub fn new(application_uri: &str) -> Self {
        Self {
            uris: vec![OPC_UA_NAMESPACE.to_string(), application_uri.to_string()],
        }
    }

    /// Register a namespace, returning the existing index for a known URI.
    pub fn register(&mut self, uri: &str) -> u16 {
        if let Some(idx) = self.index_of(uri) {
            return idx;
        }
        self.uris.push(uri.to_string());
        (self.uris.len() - 1) as u16
    }

    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris.iter().position(|u| u == uri).map(|i| i as u16)
    }

    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(index as usize).map(String::as_str)
    }

    pub fn contains_index(&self, index: u16) -> bool {
        (index as usize) < self.uris.len()
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }
}
