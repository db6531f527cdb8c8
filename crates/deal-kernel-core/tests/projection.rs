// crates/deal-kernel-core/tests/projection.rs
// ============================================================================
// Module: Projection Tests
// Description: Tests for the lifecycle state machine and stress modes.
// ============================================================================
//! ## Overview
//! Validates the pure projection fold: transition applicability, freeze
//! restoration, distress balancing, dispute stickiness, and precedence.

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

use deal_kernel_core::EventType;
use deal_kernel_core::LifecycleState;
use deal_kernel_core::Projection;
use deal_kernel_core::StressMode;
use deal_kernel_core::project;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Folds events from the initial projection.
fn fold(events: &[EventType]) -> Projection {
    project(Projection::initial(), events.iter().copied())
}

/// Events taking a fresh deal to `Operating`.
const TO_OPERATING: &[EventType] = &[
    EventType::ReviewOpened,
    EventType::DealApproved,
    EventType::ClosingReadinessAttested,
    EventType::ClosingFinalized,
    EventType::OperationsActivated,
];

// ============================================================================
// SECTION: Lifecycle Transitions
// ============================================================================

/// Tests the happy path from draft to operating.
#[test]
fn test_happy_path_reaches_operating() {
    let projection = fold(TO_OPERATING);
    assert_eq!(projection.state, LifecycleState::Operating);
    assert_eq!(projection.stress_mode, StressMode::Sm0);
}

/// Tests inapplicable events are no-ops.
#[test]
fn test_inapplicable_events_are_ignored() {
    let projection = fold(&[
        EventType::ClosingFinalized,
        EventType::OperationsActivated,
        EventType::ReviewOpened,
        EventType::ClosingFinalized,
    ]);
    assert_eq!(projection.state, LifecycleState::UnderReview);
}

/// Tests the genesis event does not move the state machine.
#[test]
fn test_deal_created_is_a_noop() {
    let projection = fold(&[EventType::DealCreated]);
    assert_eq!(projection.state, LifecycleState::Draft);
    assert_eq!(projection.stress_mode, StressMode::Sm0);
}

/// Tests change detection and reconciliation loop.
#[test]
fn test_change_reconciliation_round_trip() {
    let mut events = TO_OPERATING.to_vec();
    events.push(EventType::MaterialChangeDetected);
    assert_eq!(fold(&events).state, LifecycleState::Changed);
    events.push(EventType::ChangeReconciled);
    assert_eq!(fold(&events).state, LifecycleState::Operating);
}

/// Tests termination absorbs every later event.
#[test]
fn test_terminated_is_absorbing() {
    let projection = fold(&[
        EventType::DealTerminated,
        EventType::ReviewOpened,
        EventType::FreezeImposed,
        EventType::ExitFinalized,
    ]);
    assert_eq!(projection.state, LifecycleState::Terminated);
}

/// Tests exit is reachable from any non-terminated state, including frozen.
#[test]
fn test_exit_from_frozen() {
    let projection = fold(&[EventType::FreezeImposed, EventType::ExitFinalized]);
    assert_eq!(projection.state, LifecycleState::Exited);
}

/// Tests freeze cannot be imposed on an exited deal.
#[test]
fn test_no_freeze_after_exit() {
    let projection = fold(&[EventType::ExitFinalized, EventType::FreezeImposed]);
    assert_eq!(projection.state, LifecycleState::Exited);
}

// ============================================================================
// SECTION: Freeze and Restore
// ============================================================================

/// Tests a lifted freeze restores the pre-freeze state.
#[test]
fn test_freeze_restores_prior_state() {
    let mut events = TO_OPERATING.to_vec();
    events.push(EventType::FreezeImposed);
    let frozen = fold(&events);
    assert_eq!(frozen.state, LifecycleState::Frozen);
    assert_eq!(frozen.stress_mode, StressMode::Sm3);

    events.push(EventType::FreezeLifted);
    let lifted = fold(&events);
    assert_eq!(lifted.state, LifecycleState::Operating);
    assert_eq!(lifted.stress_mode, StressMode::Sm0);
}

/// Tests ordinary events do not leak through a freeze.
#[test]
fn test_frozen_ignores_lifecycle_events() {
    let projection = fold(&[
        EventType::ReviewOpened,
        EventType::FreezeImposed,
        EventType::DealApproved,
        EventType::FreezeLifted,
    ]);
    assert_eq!(projection.state, LifecycleState::UnderReview);
}

// ============================================================================
// SECTION: Stress Modes
// ============================================================================

/// Tests unresolved distress sets and clears the distressed mode.
#[test]
fn test_distress_balance_drives_sm2() {
    let mut events = TO_OPERATING.to_vec();
    events.push(EventType::DistressDeclared);
    let distressed = fold(&events);
    assert_eq!(distressed.state, LifecycleState::Distressed);
    assert_eq!(distressed.stress_mode, StressMode::Sm2);

    events.push(EventType::DistressResolved);
    let resolved = fold(&events);
    assert_eq!(resolved.state, LifecycleState::Resolved);
    assert_eq!(resolved.stress_mode, StressMode::Sm0);
}

/// Tests operations can restart from a resolved deal.
#[test]
fn test_operations_restart_after_resolution() {
    let mut events = TO_OPERATING.to_vec();
    events.extend([
        EventType::DistressDeclared,
        EventType::DistressResolved,
        EventType::OperationsActivated,
    ]);
    assert_eq!(fold(&events).state, LifecycleState::Operating);
}

/// Tests a dispute is sticky and yields to higher-precedence modes.
#[test]
fn test_dispute_is_sticky_with_precedence() {
    let mut events = TO_OPERATING.to_vec();
    events.push(EventType::DataDisputed);
    assert_eq!(fold(&events).stress_mode, StressMode::Sm1);

    events.push(EventType::DistressDeclared);
    assert_eq!(fold(&events).stress_mode, StressMode::Sm2);

    events.push(EventType::FreezeImposed);
    assert_eq!(fold(&events).stress_mode, StressMode::Sm3);

    events.push(EventType::FreezeLifted);
    assert_eq!(fold(&events).stress_mode, StressMode::Sm2);

    events.push(EventType::DistressResolved);
    assert_eq!(fold(&events).stress_mode, StressMode::Sm1);
}
