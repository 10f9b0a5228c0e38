//! The conceptual error taxonomy from spec §7. Individual crates define
//! their own `thiserror` enums for their own operations; this type is the
//! small shared vocabulary used to decide retry/eviction/abort behavior
//! and to pick a FAIL-message prefix on the wire.

/// Which of the five conceptual kinds (§7) a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed message, wrong opcode, length mismatch. Never retried.
    Protocol,
    /// Connect timeout, send/recv failure, unexpected close. Retried by
    /// the caller's own retry loop.
    Transport,
    /// Uniqueness violation, no rows updated, merge conflict.
    Catalog,
    /// Cannot open file, cannot bind socket. Fatal at the operation scope.
    Resource,
    /// Slow or bad peer during a download. Recovered by local eviction.
    CapacityOrPeer,
}

impl FailureKind {
    pub const fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::CapacityOrPeer)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Protocol => "protocol error",
            FailureKind::Transport => "transport error",
            FailureKind::Catalog => "catalog error",
            FailureKind::Resource => "resource error",
            FailureKind::CapacityOrPeer => "peer error",
        };
        f.write_str(s)
    }
}
