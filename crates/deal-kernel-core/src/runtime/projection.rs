// crates/deal-kernel-core/src/runtime/projection.rs
// ============================================================================
// Module: Deal Kernel Lifecycle Projection
// Description: Pure fold deriving lifecycle state and stress mode.
// Purpose: Make the deal's observable state a deterministic replay of events.
// Dependencies: crate::core::event, serde
// ============================================================================

//! ## Overview
//! The projection is a pure fold over the ordered event stream. It never
//! mutates in place beyond the fold accumulator and is restartable from any
//! prefix. Unknown or inapplicable events are no-ops, which keeps the fold
//! tolerant of future event vocabulary growth.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::event::EventType;

// ============================================================================
// SECTION: Lifecycle States
// ============================================================================

/// Deal lifecycle states.
///
/// # Invariants
/// - Variants serialize with their exact wire spelling.
/// - `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Initial state after creation.
    Draft,
    /// Formal review in progress.
    UnderReview,
    /// Deal approved.
    Approved,
    /// Closing readiness attested.
    ReadyToClose,
    /// Closing finalized.
    Closed,
    /// Operations active.
    Operating,
    /// Material change detected; reconciliation pending.
    Changed,
    /// Distress declared.
    Distressed,
    /// Distress resolved.
    Resolved,
    /// Frozen by court or regulator.
    Frozen,
    /// Exit finalized.
    Exited,
    /// Terminated (absorbing).
    Terminated,
}

impl LifecycleState {
    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::UnderReview => "UnderReview",
            Self::Approved => "Approved",
            Self::ReadyToClose => "ReadyToClose",
            Self::Closed => "Closed",
            Self::Operating => "Operating",
            Self::Changed => "Changed",
            Self::Distressed => "Distressed",
            Self::Resolved => "Resolved",
            Self::Frozen => "Frozen",
            Self::Exited => "Exited",
            Self::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Stress Modes
// ============================================================================

/// Orthogonal stress condition of a deal.
///
/// # Invariants
/// - Precedence when recomputed: frozen > distressed > disputed > normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StressMode {
    /// Normal operation.
    #[serde(rename = "SM0")]
    Sm0,
    /// Data disputed at least once.
    #[serde(rename = "SM1")]
    Sm1,
    /// Unresolved distress.
    #[serde(rename = "SM2")]
    Sm2,
    /// Frozen.
    #[serde(rename = "SM3")]
    Sm3,
}

impl StressMode {
    /// Returns the canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sm0 => "SM0",
            Self::Sm1 => "SM1",
            Self::Sm2 => "SM2",
            Self::Sm3 => "SM3",
        }
    }
}

impl fmt::Display for StressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Projection Accumulator
// ============================================================================

/// Fold accumulator for the lifecycle and stress projection.
///
/// # Invariants
/// - `last_non_frozen` tracks the most recent state other than `Frozen` and
///   is the state restored when a freeze lifts.
/// - Distress is active while declared count exceeds resolved count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Current stress mode.
    pub stress_mode: StressMode,
    /// State restored when a freeze lifts.
    last_non_frozen: LifecycleState,
    /// Sticky dispute marker.
    disputed: bool,
    /// Declared-minus-resolved distress balance.
    open_distress: u32,
}

impl Default for Projection {
    fn default() -> Self {
        Self::initial()
    }
}

impl Projection {
    /// Returns the initial projection for a fresh deal.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            state: LifecycleState::Draft,
            stress_mode: StressMode::Sm0,
            last_non_frozen: LifecycleState::Draft,
            disputed: false,
            open_distress: 0,
        }
    }

    /// Applies one event to the accumulator.
    pub fn apply(&mut self, event_type: EventType) {
        match event_type {
            EventType::DataDisputed => self.disputed = true,
            EventType::DistressDeclared => {
                self.open_distress = self.open_distress.saturating_add(1);
            }
            EventType::DistressResolved => {
                self.open_distress = self.open_distress.saturating_sub(1);
            }
            _ => {}
        }

        if let Some(next) = transition(self.state, self.last_non_frozen, event_type) {
            self.state = next;
            if next != LifecycleState::Frozen {
                self.last_non_frozen = next;
            }
        }

        self.stress_mode = self.recompute_stress();
    }

    /// Recomputes the stress mode under the fixed precedence order.
    const fn recompute_stress(&self) -> StressMode {
        if matches!(self.state, LifecycleState::Frozen) {
            StressMode::Sm3
        } else if self.open_distress > 0 {
            StressMode::Sm2
        } else if self.disputed {
            StressMode::Sm1
        } else {
            StressMode::Sm0
        }
    }
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

/// Pure lifecycle transition function.
///
/// Returns `None` when the event does not apply in the current state.
const fn transition(
    state: LifecycleState,
    last_non_frozen: LifecycleState,
    event_type: EventType,
) -> Option<LifecycleState> {
    use EventType as E;
    use LifecycleState as S;

    match (state, event_type) {
        (S::Terminated, _) => None,
        (_, E::DealTerminated) => Some(S::Terminated),
        (S::Exited, E::FreezeImposed | E::ExitFinalized) => None,
        (_, E::ExitFinalized) => Some(S::Exited),
        (S::Frozen, E::FreezeLifted) => Some(last_non_frozen),
        (S::Frozen, _) => None,
        (_, E::FreezeImposed) => Some(S::Frozen),
        (S::Draft, E::ReviewOpened) => Some(S::UnderReview),
        (S::UnderReview, E::DealApproved) => Some(S::Approved),
        (S::Approved, E::ClosingReadinessAttested) => Some(S::ReadyToClose),
        (S::ReadyToClose, E::ClosingFinalized) => Some(S::Closed),
        (S::Closed | S::Resolved, E::OperationsActivated) => Some(S::Operating),
        (S::Operating, E::MaterialChangeDetected) => Some(S::Changed),
        (S::Changed, E::ChangeReconciled) => Some(S::Operating),
        (S::Operating | S::Changed, E::DistressDeclared) => Some(S::Distressed),
        (S::Distressed, E::DistressResolved) => Some(S::Resolved),
        _ => None,
    }
}

// ============================================================================
// SECTION: Fold Entry Point
// ============================================================================

/// Folds an ordered event-type stream into a projection.
///
/// The caller supplies events in commit order (dense sequence order for the
/// committed ledger; committed followed by simulated for sandbox views).
#[must_use]
pub fn project<I>(initial: Projection, events: I) -> Projection
where
    I: IntoIterator<Item = EventType>,
{
    let mut acc = initial;
    for event_type in events {
        acc.apply(event_type);
    }
    acc
}
