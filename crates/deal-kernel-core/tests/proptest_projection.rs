// crates/deal-kernel-core/tests/proptest_projection.rs
// ============================================================================
// Module: Projection Property Tests
// Description: Property tests for projection determinism and composition.
// ============================================================================
//! ## Overview
//! The projection must be a pure fold: identical inputs yield identical
//! outputs, folding composes over stream splits, and the frozen state always
//! reports the frozen stress mode.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use deal_kernel_core::ALL_EVENT_TYPES;
use deal_kernel_core::EventType;
use deal_kernel_core::LifecycleState;
use deal_kernel_core::Projection;
use deal_kernel_core::StressMode;
use deal_kernel_core::project;
use proptest::prelude::*;

// ============================================================================
// SECTION: Strategies
// ============================================================================

/// Strategy producing an arbitrary accepted event type.
fn any_event_type() -> impl Strategy<Value = EventType> {
    (0..ALL_EVENT_TYPES.len()).prop_map(|index| ALL_EVENT_TYPES[index])
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// The fold is deterministic: same stream, same outcome.
    #[test]
    fn prop_projection_is_deterministic(events in proptest::collection::vec(any_event_type(), 0..64)) {
        let first = project(Projection::initial(), events.iter().copied());
        let second = project(Projection::initial(), events.iter().copied());
        prop_assert_eq!(first, second);
    }

    /// Folding composes: a stream split at any point yields the same result.
    #[test]
    fn prop_projection_composes_over_splits(
        events in proptest::collection::vec(any_event_type(), 0..64),
        split in 0usize..64,
    ) {
        let split = split.min(events.len());
        let (head, tail) = events.split_at(split);
        let staged = project(
            project(Projection::initial(), head.iter().copied()),
            tail.iter().copied(),
        );
        let whole = project(Projection::initial(), events.iter().copied());
        prop_assert_eq!(staged, whole);
    }

    /// A frozen state always reports the frozen stress mode and vice versa.
    #[test]
    fn prop_frozen_state_matches_frozen_stress(
        events in proptest::collection::vec(any_event_type(), 0..64),
    ) {
        let projection = project(Projection::initial(), events.iter().copied());
        prop_assert_eq!(
            projection.state == LifecycleState::Frozen,
            projection.stress_mode == StressMode::Sm3
        );
    }
}
