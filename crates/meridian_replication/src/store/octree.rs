//! Arena-backed octree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`], so moving
//! content between regions is a remove from one slot's element and an insert
//! into another's. Nodes are created lazily on first use; empty leaves can be
//! collapsed and their slots are reused.

use crate::codec::CountedRead;
use crate::types::{octant_for, AABox, OctalCode, Vec3};
use bytes::BufMut;

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// Capabilities every kind of octree content provides.
///
/// Entities are the only content kind here; the tree itself only needs these
/// operations and is generic over them.
pub trait SpatialElement {
    type Item;

    fn new(bounds: AABox) -> Self;

    fn bounds(&self) -> AABox;

    fn contains(&self, point: Vec3) -> bool {
        self.bounds().contains(point)
    }

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    /// Adds an item without any uniqueness check.
    fn insert(&mut self, item: Self::Item);

    /// Advances every item, moving the ones that no longer belong here into
    /// `relocated`.
    fn sweep(&mut self, now: u64, delta_seconds: f32, relocated: &mut Vec<Self::Item>);

    fn encode<B: BufMut>(&self, out: &mut B);

    fn decode(data: &[u8]) -> CountedRead<Self::Item>;

    /// Microsecond time of the last mutation.
    fn last_changed(&self) -> u64;
}

#[derive(Debug)]
struct Node<E> {
    code: OctalCode,
    parent: Option<NodeId>,
    children: [Option<NodeId>; 8],
    element: E,
}

impl<E> Node<E> {
    fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

#[derive(Debug)]
pub struct Octree<E> {
    nodes: Vec<Option<Node<E>>>,
    free: Vec<usize>,
    root_scale: f32,
}

impl<E: SpatialElement> Octree<E> {
    /// Creates a tree whose root cube spans `[0, root_scale)` on every axis.
    pub fn new(root_scale: f32) -> Self {
        let root = Node {
            code: OctalCode::root(),
            parent: None,
            children: [None; 8],
            element: E::new(OctalCode::root().bounding_box(root_scale)),
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            root_scale,
        }
    }

    pub fn root_scale(&self) -> f32 {
        self.root_scale
    }

    pub fn root_bounds(&self) -> AABox {
        AABox::new(Vec3::ZERO, self.root_scale)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn element(&self, id: NodeId) -> Option<&E> {
        self.node(id).map(|node| &node.element)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut E> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|node| &mut node.element)
    }

    pub fn code(&self, id: NodeId) -> Option<&OctalCode> {
        self.node(id).map(|node| &node.code)
    }

    fn node(&self, id: NodeId) -> Option<&Node<E>> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Ids of every live node, root first.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| NodeId(index))
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &E)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (NodeId(index), &node.element)))
    }

    /// Looks up the node at `code` without creating anything.
    pub fn find(&self, code: &OctalCode) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        for octant in code.octants() {
            current = self.node(current)?.children[*octant as usize]?;
        }
        Some(current)
    }

    /// Returns the node at `code`, creating it and any missing ancestors.
    pub fn get_or_create(&mut self, code: &OctalCode) -> NodeId {
        let mut current = NodeId::ROOT;
        for octant in code.octants() {
            current = self.child_or_create(current, *octant);
        }
        current
    }

    /// Deepest node holding `point` whose children would be too small for an
    /// item of edge `extent`, never deeper than `max_depth`. `point` must lie
    /// inside the root bounds.
    pub fn node_for(&mut self, point: Vec3, extent: f32, max_depth: usize) -> NodeId {
        let mut current = NodeId::ROOT;
        let mut bounds = self.root_bounds();
        let mut depth = 0;

        while depth < max_depth {
            let child_scale = bounds.scale * 0.5;
            if extent > child_scale {
                break;
            }
            let octant = octant_for(&bounds, point);
            current = self.child_or_create(current, octant);
            bounds = AABox::new(
                bounds.corner + crate::types::octant_offset(octant) * child_scale,
                child_scale,
            );
            depth += 1;
        }
        current
    }

    fn child_or_create(&mut self, parent: NodeId, octant: u8) -> NodeId {
        let octant = (octant & 0b111) as usize;
        if let Some(child) = self.node(parent).and_then(|node| node.children[octant]) {
            return child;
        }

        let code = match self.node(parent) {
            Some(node) => node.code.child(octant as u8),
            None => return parent,
        };
        let child = Node {
            element: E::new(code.bounding_box(self.root_scale)),
            code,
            parent: Some(parent),
            children: [None; 8],
        };

        let id = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(child);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(child));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(node) = self.nodes[parent.0].as_mut() {
            node.children[octant] = Some(id);
        }
        id
    }

    /// Removes empty leaf nodes bottom-up, never the root. Returns how many
    /// nodes were released.
    pub fn collapse_empty_leaves(&mut self) -> usize {
        let mut collapsed = 0;
        loop {
            let candidates: Vec<NodeId> = self
                .elements()
                .filter(|(id, element)| *id != NodeId::ROOT && element.is_empty())
                .map(|(id, _)| id)
                .filter(|id| self.node(*id).is_some_and(Node::is_leaf))
                .collect();
            if candidates.is_empty() {
                return collapsed;
            }

            for id in candidates {
                let Some(node) = self.nodes[id.0].take() else {
                    continue;
                };
                if let Some(parent) = node.parent.and_then(|p| self.nodes[p.0].as_mut()) {
                    for slot in parent.children.iter_mut() {
                        if *slot == Some(id) {
                            *slot = None;
                        }
                    }
                }
                self.free.push(id.0);
                collapsed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityTreeElement;

    #[test]
    fn test_get_or_create_builds_path() {
        let mut tree: Octree<EntityTreeElement> = Octree::new(16.0);
        let code = OctalCode::from_octants(&[1, 6, 3]);
        let id = tree.get_or_create(&code);

        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.code(id), Some(&code));
        assert_eq!(tree.find(&code), Some(id));
        assert_eq!(tree.get_or_create(&code), id);
        assert_eq!(
            tree.element(id).map(|e| e.bounds()),
            Some(code.bounding_box(16.0))
        );
    }

    #[test]
    fn test_node_for_respects_extent_and_depth() {
        let mut tree: Octree<EntityTreeElement> = Octree::new(16.0);
        let point = Vec3::new(1.0, 1.0, 1.0);

        let small = tree.node_for(point, 0.5, 3);
        assert_eq!(tree.code(small).map(OctalCode::depth), Some(3));

        let large = tree.node_for(point, 6.0, 10);
        assert_eq!(tree.code(large).map(OctalCode::depth), Some(1));

        let huge = tree.node_for(point, 100.0, 10);
        assert_eq!(huge, NodeId::ROOT);
    }

    #[test]
    fn test_collapse_reuses_slots() {
        let mut tree: Octree<EntityTreeElement> = Octree::new(16.0);
        tree.get_or_create(&OctalCode::from_octants(&[0, 0, 0]));
        assert_eq!(tree.node_count(), 4);

        assert_eq!(tree.collapse_empty_leaves(), 3);
        assert_eq!(tree.node_count(), 1);

        tree.get_or_create(&OctalCode::from_octants(&[7]));
        assert_eq!(tree.node_count(), 2);
        assert!(tree.find(&OctalCode::from_octants(&[0])).is_none());
    }
}
