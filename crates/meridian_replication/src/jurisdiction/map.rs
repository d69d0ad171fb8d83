use crate::types::OctalCode;
use serde::{Deserialize, Serialize};

/// Where an address sits relative to a jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Within,
    /// Above the jurisdiction root, or on another branch entirely
    Outside,
    /// Inside the root's subtree but beneath one of the end nodes
    Below,
}

/// The region a server is authoritative for: the subtree under `root`,
/// minus the subtrees under each of `end_nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionMap {
    pub root: OctalCode,
    #[serde(default)]
    pub end_nodes: Vec<OctalCode>,
}

impl JurisdictionMap {
    pub fn new(root: OctalCode, end_nodes: Vec<OctalCode>) -> Self {
        Self { root, end_nodes }
    }

    /// Authority over the whole world.
    pub fn everything() -> Self {
        Self::new(OctalCode::root(), Vec::new())
    }

    pub fn classify(&self, address: &OctalCode) -> Containment {
        if !self.root.is_ancestor_of(address) {
            return Containment::Outside;
        }
        if self.end_nodes.iter().any(|end| end.is_ancestor_of(address)) {
            return Containment::Below;
        }
        Containment::Within
    }

    pub fn contains(&self, address: &OctalCode) -> bool {
        self.classify(address) == Containment::Within
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let map = JurisdictionMap::new(
            OctalCode::from_octants(&[2]),
            vec![OctalCode::from_octants(&[2, 5])],
        );

        assert_eq!(map.classify(&OctalCode::from_octants(&[2])), Containment::Within);
        assert_eq!(map.classify(&OctalCode::from_octants(&[2, 4, 1])), Containment::Within);
        assert_eq!(map.classify(&OctalCode::from_octants(&[2, 5])), Containment::Below);
        assert_eq!(map.classify(&OctalCode::from_octants(&[2, 5, 0])), Containment::Below);
        assert_eq!(map.classify(&OctalCode::from_octants(&[3, 1])), Containment::Outside);
        assert_eq!(map.classify(&OctalCode::root()), Containment::Outside);

        assert!(JurisdictionMap::everything().contains(&OctalCode::from_octants(&[7, 7])));
    }
}
