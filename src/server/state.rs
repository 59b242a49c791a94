//! Server lifecycle states.

/// Lifecycle state of a [`Server`](super::Server).
///
/// ```text
/// Uninitialized ──create──▶ Created ──iterate──▶ Running
///                              │                   │
///                              └─────shutdown──────┴──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Created,
    Running,
    Stopped,
}

impl ServerState {
    /// Resources are allocated in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Created => "Created",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}
