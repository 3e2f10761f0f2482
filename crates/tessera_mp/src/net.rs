//! Bundled connections between placeable objects.
//!
//! All individual nets between two clusters are bundled into one weighted
//! connection before annealing; the weight is the number (or criticality
//! sum) of the underlying nets.

use crate::ids::MacroId;
use serde::{Deserialize, Serialize};

/// A weighted two-terminal connection between placeable objects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BundledNet {
    /// First endpoint.
    pub source: MacroId,
    /// Second endpoint.
    pub target: MacroId,
    /// Positive connection weight.
    pub weight: f32,
}

impl BundledNet {
    /// Creates a bundled net between two objects.
    pub fn new(source: MacroId, target: MacroId, weight: f32) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }

    /// Returns whether two nets connect the same unordered pair of objects.
    pub fn connects_same_pair(&self, other: &BundledNet) -> bool {
        (self.source == other.source && self.target == other.target)
            || (self.source == other.target && self.target == other.source)
    }
}

/// Merges duplicate nets, summing the weights of every net that connects
/// the same unordered pair of objects.
///
/// Self-loops (both terminals equal) are dropped: they contribute nothing
/// to wirelength.
pub fn merge_nets(nets: Vec<BundledNet>) -> Vec<BundledNet> {
    let mut merged: Vec<BundledNet> = Vec::new();
    for net in nets {
        if net.source == net.target {
            continue;
        }
        match merged.iter_mut().find(|m| m.connects_same_pair(&net)) {
            Some(existing) => existing.weight += net.weight,
            None => merged.push(net),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> MacroId {
        MacroId::from_raw(i)
    }

    #[test]
    fn connects_same_pair_is_unordered() {
        let a = BundledNet::new(id(0), id(1), 1.0);
        let b = BundledNet::new(id(1), id(0), 2.0);
        let c = BundledNet::new(id(0), id(2), 1.0);
        assert!(a.connects_same_pair(&b));
        assert!(!a.connects_same_pair(&c));
    }

    #[test]
    fn merge_sums_duplicate_weights() {
        let nets = vec![
            BundledNet::new(id(0), id(1), 1.0),
            BundledNet::new(id(1), id(0), 2.5),
            BundledNet::new(id(0), id(2), 1.0),
        ];
        let merged = merge_nets(nets);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].weight, 3.5);
        assert_eq!(merged[1].weight, 1.0);
    }

    #[test]
    fn merge_drops_self_loops() {
        let nets = vec![
            BundledNet::new(id(3), id(3), 4.0),
            BundledNet::new(id(0), id(1), 1.0),
        ];
        let merged = merge_nets(nets);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, id(0));
    }

    #[test]
    fn merge_empty() {
        assert!(merge_nets(Vec::new()).is_empty());
    }

    #[test]
    fn serde_roundtrip() {
        let net = BundledNet::new(id(0), id(1), 2.0);
        let json = serde_json::to_string(&net).unwrap();
        let restored: BundledNet = serde_json::from_str(&json).unwrap();
        assert_eq!(net, restored);
    }
}
