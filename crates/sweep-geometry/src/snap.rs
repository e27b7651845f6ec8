//! Snap-aware node interning (spec §9: "replace float-tuple hash keys with
//! an interning map"). Two coordinates within `snap_tolerance` of each other
//! are identified as the same node; the first coordinate seen wins and is
//! reused bitwise by every edge that touches it afterwards.

use geo::Coord;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Snap-aware coordinate interning index. Node ids are assigned in insertion
/// order and never reused or renumbered, matching spec §9's "stable id
/// throughout pipeline" requirement.
pub struct NodeSnapIndex {
    tolerance: f64,
    coords: Vec<Coord<f64>>,
    tree: RTree<IndexedPoint>,
}

impl NodeSnapIndex {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            coords: Vec::new(),
            tree: RTree::new(),
        }
    }

    /// Returns the id of the node at (or within tolerance of) `coord`,
    /// allocating a new one if none exists yet. The coordinate stored for a
    /// newly allocated node is `coord` itself, exactly.
    pub fn insert_or_get(&mut self, coord: Coord<f64>) -> usize {
        let envelope = AABB::from_corners(
            [coord.x - self.tolerance, coord.y - self.tolerance],
            [coord.x + self.tolerance, coord.y + self.tolerance],
        );
        let mut best: Option<(usize, f64)> = None;
        for candidate in self.tree.locate_in_envelope(&envelope) {
            let [cx, cy] = *candidate.geom();
            let d2 = (cx - coord.x).powi(2) + (cy - coord.y).powi(2);
            if d2 <= self.tolerance * self.tolerance
                && best.map(|(_, best_d2)| d2 < best_d2).unwrap_or(true)
            {
                best = Some((candidate.data, d2));
            }
        }
        if let Some((id, _)) = best {
            return id;
        }
        let id = self.coords.len();
        self.coords.push(coord);
        self.tree.insert(IndexedPoint::new([coord.x, coord.y], id));
        id
    }

    pub fn coord(&self, id: usize) -> Coord<f64> {
        self.coords[id]
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_coords_share_a_node() {
        let mut idx = NodeSnapIndex::new(1e-6);
        let a = idx.insert_or_get(Coord { x: 1.0, y: 2.0 });
        let b = idx.insert_or_get(Coord { x: 1.0, y: 2.0 });
        assert_eq!(a, b);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn nearby_coords_within_tolerance_share_a_node() {
        let mut idx = NodeSnapIndex::new(1e-6);
        let a = idx.insert_or_get(Coord { x: 1.0, y: 2.0 });
        let b = idx.insert_or_get(Coord {
            x: 1.0 + 5e-7,
            y: 2.0,
        });
        assert_eq!(a, b);
    }

    #[test]
    fn coords_beyond_tolerance_are_distinct() {
        let mut idx = NodeSnapIndex::new(1e-6);
        let a = idx.insert_or_get(Coord { x: 1.0, y: 2.0 });
        let b = idx.insert_or_get(Coord { x: 1.001, y: 2.0 });
        assert_ne!(a, b);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn first_seen_coordinate_is_kept_bitwise() {
        let mut idx = NodeSnapIndex::new(1e-6);
        let a = idx.insert_or_get(Coord { x: 1.0, y: 2.0 });
        idx.insert_or_get(Coord {
            x: 1.0 + 1e-9,
            y: 2.0,
        });
        assert_eq!(idx.coord(a), Coord { x: 1.0, y: 2.0 });
    }
}
