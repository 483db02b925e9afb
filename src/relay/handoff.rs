//! Handoff detection policy
//!
//! The engine surfaces stage transfers only as tool invocations, so the
//! bridge has to guess from the tool identifier whether audio is about to
//! pause. Detection is a pluggable predicate so the pattern list can change
//! without touching the forwarding logic.

use crate::config::HandoffConfig;

/// Predicate deciding whether a tool invocation hands the conversation to
/// another processing stage
pub trait HandoffDetector: Send + Sync {
    /// True when the named tool triggers an audible handoff
    fn is_handoff(&self, tool_name: &str) -> bool;
}

/// Case-insensitive substring matching against two marker lists.
///
/// A name containing any transfer marker counts as a handoff, unless it also
/// contains a routing marker. Routing transfers swap stages without a gap in
/// engine audio, so padding them would add a pause where none is needed.
#[derive(Debug, Clone)]
pub struct MarkerDetector {
    transfer_markers: Vec<String>,
    routing_markers: Vec<String>,
}

impl MarkerDetector {
    /// Build a detector from marker lists.
    #[must_use]
    pub fn new(transfer_markers: &[String], routing_markers: &[String]) -> Self {
        Self {
            transfer_markers: transfer_markers.iter().map(|m| m.to_lowercase()).collect(),
            routing_markers: routing_markers.iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

impl From<&HandoffConfig> for MarkerDetector {
    fn from(config: &HandoffConfig) -> Self {
        Self::new(&config.transfer_markers, &config.routing_markers)
    }
}

impl HandoffDetector for MarkerDetector {
    fn is_handoff(&self, tool_name: &str) -> bool {
        let name = tool_name.to_lowercase();
        if !self.transfer_markers.iter().any(|m| name.contains(m)) {
            return false;
        }
        !self.routing_markers.iter().any(|m| name.contains(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> MarkerDetector {
        MarkerDetector::from(&HandoffConfig::default())
    }

    #[test]
    fn transfer_tools_are_handoffs() {
        assert!(detector().is_handoff("transfer_to_reservation_specialist"));
        assert!(detector().is_handoff("handoff_to_order_taker"));
    }

    #[test]
    fn routing_markers_are_exempt() {
        assert!(!detector().is_handoff("transfer_to_main_agent"));
        assert!(!detector().is_handoff("transfer_routing"));
    }

    #[test]
    fn ordinary_tools_are_not_handoffs() {
        assert!(!detector().is_handoff("lookup_menu"));
        assert!(!detector().is_handoff("create_reservation"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(detector().is_handoff("TransferToSpecialist"));
        let custom = MarkerDetector::new(&["ESCALATE".to_string()], &[]);
        assert!(custom.is_handoff("escalate_to_human"));
    }
}
