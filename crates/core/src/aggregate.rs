//! Aggregate root trait for domain models with a lifecycle.

/// Aggregate root marker + minimal interface.
///
/// Kept small on purpose: aggregates own their transitions and bring in no
/// infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Incremented once per successful state transition.
    fn version(&self) -> u64;
}
