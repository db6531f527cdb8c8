// crates/deal-kernel-core/src/core/identifiers.rs
// ============================================================================
// Module: Deal Kernel Identifiers
// Description: Canonical opaque identifiers for kernel entities.
// Purpose: Provide strongly typed UUIDv4 identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout the kernel.
//! All identifiers are UUIDv4 values that serialize as their hyphenated
//! string form on the wire. Newtypes prevent cross-entity identifier mixups
//! at compile time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a UUID-backed identifier newtype with the kernel's standard API.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        ///
        /// # Invariants
        /// - Wraps a UUIDv4 value; the wire form is the hyphenated string.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random (v4) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID value.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value).map(Self)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

uuid_identifier! {
    /// Deal identifier.
    DealId
}

uuid_identifier! {
    /// Actor identifier (human or system principal).
    ActorId
}

uuid_identifier! {
    /// Role identifier.
    RoleId
}

uuid_identifier! {
    /// Committed ledger event identifier.
    EventId
}

uuid_identifier! {
    /// Material object identifier.
    MaterialId
}

uuid_identifier! {
    /// Material revision identifier.
    RevisionId
}

uuid_identifier! {
    /// Content-addressed artifact identifier.
    ArtifactId
}

uuid_identifier! {
    /// Artifact link identifier.
    LinkId
}

uuid_identifier! {
    /// Draft sandbox identifier.
    DraftId
}

uuid_identifier! {
    /// Simulated (sandbox) event identifier.
    SimulatedEventId
}

uuid_identifier! {
    /// Cached sandbox gate preview identifier.
    GatePreviewId
}
