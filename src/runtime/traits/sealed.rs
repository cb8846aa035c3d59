// ABOUTME: Sealed trait pattern for runtime traits.
// ABOUTME: Only adapters inside this crate can implement the runtime contract.

/// Sealed trait to prevent external implementations.
///
/// Every adapter must honour the contract's invariants, and those are tested
/// here; keeping the traits sealed lets operations be added without breaking
/// out-of-tree implementations that would not have them.
pub trait Sealed {}
