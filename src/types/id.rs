// ABOUTME: Engine-assigned identifiers tagged with the kind of object they name.
// ABOUTME: A container id can never be passed where a network or exec id is expected.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The kind of engine object an [`EngineId`] refers to.
pub trait IdKind {
    /// Short lowercase label used in debug output.
    const LABEL: &'static str;
}

pub enum ContainerKind {}
pub enum NetworkKind {}
pub enum ExecKind {}

impl IdKind for ContainerKind {
    const LABEL: &'static str = "container";
}

impl IdKind for NetworkKind {
    const LABEL: &'static str = "network";
}

impl IdKind for ExecKind {
    const LABEL: &'static str = "exec";
}

/// Opaque identifier handed out by the container engine.
///
/// Engines identify objects by long hex strings; the domain model mostly works
/// with names, but ids are kept alongside so diagnostics can point at the exact
/// engine object.
#[must_use = "ids reference engine objects and should not be ignored"]
pub struct EngineId<K: IdKind> {
    value: String,
    _kind: PhantomData<K>,
}

impl<K: IdKind> EngineId<K> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The 12-character prefix engines print in their own CLIs.
    pub fn short(&self) -> &str {
        match self.value.char_indices().nth(12) {
            Some((idx, _)) => &self.value[..idx],
            None => &self.value,
        }
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl<K: IdKind> fmt::Debug for EngineId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", K::LABEL, self.short())
    }
}

impl<K: IdKind> fmt::Display for EngineId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K: IdKind> Clone for EngineId<K> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<K: IdKind> PartialEq for EngineId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K: IdKind> Eq for EngineId<K> {}

impl<K: IdKind> Hash for EngineId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

pub type ContainerId = EngineId<ContainerKind>;
pub type NetworkId = EngineId<NetworkKind>;
pub type ExecId = EngineId<ExecKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_truncates_long_ids() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(format!("{id:?}"), "container:0123456789ab");
    }

    #[test]
    fn short_keeps_short_ids() {
        let id = NetworkId::new("net1");
        assert_eq!(id.short(), "net1");
        assert_eq!(id.to_string(), "net1");
    }
}
