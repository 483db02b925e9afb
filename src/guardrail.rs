//! Text policy seam for the relay's text path
//!
//! Reservation-domain policy (menu scope, party-size sanity, prompt
//! hygiene) lives outside this crate. The bridge only needs a yes/no with a
//! reason it can surface as a `warning` envelope, so the interface is a
//! single async check.

use async_trait::async_trait;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the text may be forwarded to the engine
    pub allowed: bool,
    /// Reason surfaced to the caller when blocked
    pub reason: Option<String>,
}

impl Verdict {
    /// Verdict that lets the text through
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Verdict that blocks the text with a reason
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Policy applied to client text before it reaches the engine
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// Check one piece of client text
    async fn check(&self, text: &str) -> Verdict;
}

/// Default policy: everything passes
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissive;

#[async_trait]
impl Guardrail for Permissive {
    async fn check(&self, _text: &str) -> Verdict {
        Verdict::allow()
    }
}

/// Rejects text longer than a fixed byte length
#[derive(Debug, Clone, Copy)]
pub struct MaxLength(pub usize);

#[async_trait]
impl Guardrail for MaxLength {
    async fn check(&self, text: &str) -> Verdict {
        if text.len() > self.0 {
            Verdict::reject(format!("message exceeds {} bytes", self.0))
        } else {
            Verdict::allow()
        }
    }
}
