use dagflow_core::types::EdgeDefinition;

/// Stable edge handle. Ids grow monotonically, so ordering by id is
/// insertion order.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EdgeId(pub(crate) u64);

/// A directed data channel: `source.source_slot -> target.target_slot`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Output slot on the source node.
    pub source_slot: String,
    /// Target node id.
    pub target: String,
    /// Input slot on the target node.
    pub target_slot: String,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        source_slot: impl Into<String>,
        target: impl Into<String>,
        target_slot: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_slot: source_slot.into(),
            target: target.into(),
            target_slot: target_slot.into(),
        }
    }

    /// Edge between same-named slots, e.g. `a.value -> b.value`.
    pub fn same_slot(
        source: impl Into<String>,
        target: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        let slot = slot.into();
        Self::new(source, slot.clone(), target, slot)
    }

    pub fn to_definition(&self) -> EdgeDefinition {
        EdgeDefinition::new(
            self.source.clone(),
            self.source_slot.clone(),
            self.target.clone(),
            self.target_slot.clone(),
        )
    }
}

impl From<EdgeDefinition> for Edge {
    fn from(def: EdgeDefinition) -> Self {
        Self {
            source: def.source,
            source_slot: def.source_slot,
            target: def.target,
            target_slot: def.target_slot,
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source, self.source_slot, self.target, self.target_slot
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_builders() {
        let e = Edge::new("a", "out", "b", "in");
        assert_eq!(e.source, "a");
        assert_eq!(e.target_slot, "in");
        assert_eq!(e.to_string(), "a.out -> b.in");

        let e = Edge::same_slot("a", "b", "value");
        assert_eq!(e.source_slot, "value");
        assert_eq!(e.target_slot, "value");
    }

    #[test]
    fn test_definition_conversion() {
        let def = EdgeDefinition::new("a", "out", "b", "in");
        let edge: Edge = def.clone().into();
        assert_eq!(edge.to_definition(), def);
    }
}
