//! Dialogue states and the legal transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Where a conversation stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// No query in progress.
    Idle,
    /// Got `width/aspect`, asking for the ring.
    AwaitingRing,
    /// Asked which motorbike the tire is for.
    AwaitingMotorType,
    /// Know the motorbike, asking front or rear.
    AwaitingMotorPosition,
    /// Guessed a size from free text, waiting for a yes or a correction.
    ConfirmingInferredSize,
    /// Showing recommended sizes for a motorbike wheel.
    ShowingMotorRecommendations,
    /// Showing a page of catalog results.
    ShowingResults,
    /// Customer asked for a tire brand, waiting for a size.
    AwaitingBrandFilteredSize,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingRing => "awaiting_ring",
            FlowState::AwaitingMotorType => "awaiting_motor_type",
            FlowState::AwaitingMotorPosition => "awaiting_motor_position",
            FlowState::ConfirmingInferredSize => "confirming_inferred_size",
            FlowState::ShowingMotorRecommendations => "showing_motor_recommendations",
            FlowState::ShowingResults => "showing_results",
            FlowState::AwaitingBrandFilteredSize => "awaiting_brand_filtered_size",
        }
    }

    /// States where a new text message starts a fresh query.
    pub fn is_resting(&self) -> bool {
        matches!(
            self,
            FlowState::Idle | FlowState::ShowingResults | FlowState::ShowingMotorRecommendations
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - any state -> Idle (restart, category browsing, dead ends)
/// - any state -> ShowingResults (results found)
/// - resting state -> any prompt state, or -> ShowingMotorRecommendations
/// - AwaitingRing -> AwaitingRing, AwaitingMotorPosition,
///   ShowingMotorRecommendations, AwaitingMotorType
/// - AwaitingMotorType -> AwaitingMotorType, AwaitingMotorPosition,
///   ShowingMotorRecommendations, AwaitingRing
/// - AwaitingMotorPosition -> AwaitingMotorPosition,
///   ShowingMotorRecommendations, AwaitingRing
/// - ConfirmingInferredSize -> ConfirmingInferredSize
/// - AwaitingBrandFilteredSize -> AwaitingBrandFilteredSize, AwaitingRing
pub fn validate_transition(from: FlowState, to: FlowState) -> Result<(), ChatError> {
    use FlowState::*;

    let valid = matches!(to, Idle | ShowingResults)
        || (from.is_resting()
            && matches!(
                to,
                AwaitingRing
                    | AwaitingMotorType
                    | AwaitingMotorPosition
                    | ConfirmingInferredSize
                    | AwaitingBrandFilteredSize
                    | ShowingMotorRecommendations
            ))
        || matches!(
            (from, to),
            (AwaitingRing, AwaitingRing)
                | (AwaitingRing, AwaitingMotorPosition)
                | (AwaitingRing, ShowingMotorRecommendations)
                | (AwaitingRing, AwaitingMotorType)
                | (AwaitingMotorType, AwaitingMotorType)
                | (AwaitingMotorType, AwaitingMotorPosition)
                | (AwaitingMotorType, ShowingMotorRecommendations)
                | (AwaitingMotorType, AwaitingRing)
                | (AwaitingMotorPosition, AwaitingMotorPosition)
                | (AwaitingMotorPosition, ShowingMotorRecommendations)
                | (AwaitingMotorPosition, AwaitingRing)
                | (ConfirmingInferredSize, ConfirmingInferredSize)
                | (AwaitingBrandFilteredSize, AwaitingBrandFilteredSize)
                | (AwaitingBrandFilteredSize, AwaitingRing)
        );

    if valid {
        Ok(())
    } else {
        Err(ChatError::SessionCorruption(format!(
            "illegal transition {from} -> {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlowState::*;

    const ALL: [FlowState; 8] = [
        Idle,
        AwaitingRing,
        AwaitingMotorType,
        AwaitingMotorPosition,
        ConfirmingInferredSize,
        ShowingMotorRecommendations,
        ShowingResults,
        AwaitingBrandFilteredSize,
    ];

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_any_state_to_idle_and_results() {
        for from in ALL {
            assert!(validate_transition(from, Idle).is_ok());
            assert!(validate_transition(from, ShowingResults).is_ok());
        }
    }

    #[test]
    fn test_idle_to_prompts() {
        assert!(validate_transition(Idle, AwaitingRing).is_ok());
        assert!(validate_transition(Idle, ConfirmingInferredSize).is_ok());
        assert!(validate_transition(Idle, AwaitingBrandFilteredSize).is_ok());
        assert!(validate_transition(Idle, AwaitingMotorPosition).is_ok());
    }

    #[test]
    fn test_results_accept_fresh_query() {
        assert!(validate_transition(ShowingResults, AwaitingRing).is_ok());
        assert!(validate_transition(ShowingMotorRecommendations, AwaitingMotorType).is_ok());
    }

    #[test]
    fn test_ring_to_motor_path() {
        assert!(validate_transition(AwaitingRing, AwaitingMotorPosition).is_ok());
        assert!(validate_transition(AwaitingRing, ShowingMotorRecommendations).is_ok());
        assert!(validate_transition(AwaitingMotorPosition, ShowingMotorRecommendations).is_ok());
    }

    #[test]
    fn test_brand_filtered_reuses_size_grammar() {
        assert!(validate_transition(AwaitingBrandFilteredSize, AwaitingRing).is_ok());
        assert!(validate_transition(AwaitingBrandFilteredSize, AwaitingBrandFilteredSize).is_ok());
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_confirming_cannot_jump_to_prompts() {
        assert!(validate_transition(ConfirmingInferredSize, AwaitingRing).is_err());
        assert!(validate_transition(ConfirmingInferredSize, AwaitingMotorPosition).is_err());
    }

    #[test]
    fn test_motor_position_cannot_reach_brand_filter() {
        let err = validate_transition(AwaitingMotorPosition, AwaitingBrandFilteredSize).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "session corrupted: illegal transition awaiting_motor_position -> awaiting_brand_filtered_size"
        );
    }

    #[test]
    fn test_ring_cannot_confirm_inferred() {
        assert!(validate_transition(AwaitingRing, ConfirmingInferredSize).is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for s in ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s));
        }
    }
}
