//! Error types for the modeling engine.

use std::sync::Arc;

use chrono::NaiveDateTime;

/// Errors raised by the modeling engine.
///
/// Every variant corresponds to a contract violation or an invalid request;
/// none of them are caught internally. The engine fails loudly and early,
/// before mutation where feasible, rather than degrading gracefully.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// A value that already lives in one slot was attached to a different one.
    ///
    /// Explainable values are singly-owned; the caller must detach the value
    /// from its current owner first.
    #[error("value '{label}' already belongs to {existing}, cannot attach it to {attempted}")]
    AlreadyOwned {
        /// Label of the value being attached.
        label: String,
        /// The slot the value currently occupies.
        existing: String,
        /// The slot the caller tried to attach it to.
        attempted: String,
    },

    /// An owned-value identity was requested for a value with no owner.
    ///
    /// An un-owned value has no stable id for dependency bookkeeping.
    #[error("value '{label}' has no owner, so it has no stable id")]
    Unowned {
        /// Label of the value.
        label: String,
    },

    /// A replacement value's kind does not match the value it replaces.
    #[error("cannot replace {slot}: expected a {expected}, got a {actual}")]
    TypeMismatch {
        /// The slot being replaced.
        slot: String,
        /// Kind of the value currently in the slot.
        expected: &'static str,
        /// Kind of the replacement.
        actual: &'static str,
    },

    /// The referenced object does not exist in the graph.
    #[error("no object with id {0} in the graph")]
    MissingObject(String),

    /// The object has no attribute with the given name.
    #[error("object {object} has no attribute '{attr}'")]
    MissingAttribute {
        /// Owning object id.
        object: String,
        /// Attribute name.
        attr: String,
    },

    /// Weighted-mix weights do not sum to 1 (within 1e-6).
    #[error("weights of mix '{label}' sum to {total}, expected 1")]
    NonUnitWeights {
        /// Label or slot description of the mix.
        label: String,
        /// The actual sum.
        total: f64,
    },

    /// A list operation addressed an index past the end of the list.
    #[error("index {index} is out of range for list '{label}' of length {len}")]
    IndexOutOfRange {
        /// Label or slot description of the list.
        label: String,
        /// The requested index.
        index: usize,
        /// The list's length.
        len: usize,
    },

    /// A frozen weighted mix was mutated through a forbidden operation.
    ///
    /// Mixes are immutable after construction except through the tracked
    /// weight-replacement path.
    #[error("mix '{label}' is frozen, '{operation}' is not permitted")]
    FrozenMix {
        /// Label or slot description of the mix.
        label: String,
        /// The rejected operation.
        operation: &'static str,
    },

    /// An object was deleted while other objects still reference it.
    #[error("cannot delete {object}: still referenced by {by}")]
    StillReferenced {
        /// The object being deleted.
        object: String,
        /// The referencing container, named so the caller can unlink it.
        by: String,
    },

    /// An object already belongs to another system.
    #[error("object {object} already belongs to system {system}")]
    SystemMembership {
        /// The doubly-claimed object.
        object: String,
        /// The system it already belongs to.
        system: String,
    },

    /// A simulation date falls outside the modeled hourly window.
    ///
    /// Raised before any mutation occurs; partial application is never
    /// allowed.
    #[error("simulation date {at} is outside the modeling window {window}")]
    SimulationOutOfWindow {
        /// The requested simulation start.
        at: NaiveDateTime,
        /// Human rendering of the available window, or "empty" if the graph
        /// has no hourly data at all.
        window: String,
    },

    /// Arithmetic or conversion between dimensionally incompatible quantities.
    #[error("dimensionality mismatch: {left} is incompatible with {right}")]
    Dimensionality {
        /// Unit or dimension of the left operand.
        left: String,
        /// Unit or dimension of the right operand / conversion target.
        right: String,
    },

    /// Element-wise arithmetic between hourly series with different index
    /// ranges.
    #[error("hourly series are misaligned: {left} vs {right}")]
    MisalignedSeries {
        /// Range of the left operand.
        left: String,
        /// Range of the right operand.
        right: String,
    },

    /// A weekly recurrence template failed construction-time validation.
    #[error("invalid weekly recurrence: {reason}")]
    InvalidRecurrence {
        /// What the validator rejected.
        reason: String,
    },

    /// Serialized data names a class missing from the registry.
    #[error("unknown class '{0}' in serialized data")]
    UnknownClass(String),

    /// Serialized data carries a version this build cannot read.
    #[error("unsupported serialized version {0}")]
    UnsupportedVersion(u32),

    /// JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// A registered recompute function failed.
    ///
    /// Carries the user error so callers can downcast it to the original
    /// domain error type.
    #[error("recompute function failed: {0}")]
    Recompute(Arc<anyhow::Error>),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(Arc::new(err))
    }
}

impl EngineError {
    /// Wrap a user error from a recompute function.
    pub fn recompute(err: impl Into<anyhow::Error>) -> Self {
        EngineError::Recompute(Arc::new(err.into()))
    }

    /// Attempt to downcast a `Recompute` error to a specific user error type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        match self {
            EngineError::Recompute(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}
