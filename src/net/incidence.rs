//! 稀疏弧表：按迁移存放 `(库所, 权重)` 行，分别表示 `Pre` 与 `Post`。
//!
//! 每一行按库所编号升序保存且无重复项；同一对节点上的重复弧在插入时累加权重。
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::IndexVec;
use crate::net::structure::Weight;

pub type ArcRow = SmallVec<[(PlaceId, Weight); 4]>;

#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence {
    rows: IndexVec<TransitionId, ArcRow>,
}

impl Incidence {
    pub fn new(transitions: usize) -> Self {
        Self {
            rows: IndexVec::from_elem(ArcRow::new(), transitions),
        }
    }

    pub fn transitions(&self) -> usize {
        self.rows.len()
    }

    /// Adds `weight` to the arc between `place` and `transition`.
    pub fn add(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        if weight == 0 {
            return;
        }
        let row = &mut self.rows[transition];
        match row.binary_search_by_key(&place, |(p, _)| *p) {
            Ok(pos) => row[pos].1 += weight,
            Err(pos) => row.insert(pos, (place, weight)),
        }
    }

    /// Weight of the arc, 0 when absent.
    pub fn get(&self, place: PlaceId, transition: TransitionId) -> Weight {
        let row = &self.rows[transition];
        row.binary_search_by_key(&place, |(p, _)| *p)
            .map(|pos| row[pos].1)
            .unwrap_or(0)
    }

    pub fn row(&self, transition: TransitionId) -> &[(PlaceId, Weight)] {
        &self.rows[transition]
    }

    /// Whether any transition has an arc on `place`.
    pub fn touches(&self, place: PlaceId) -> bool {
        self.rows
            .iter()
            .any(|row| row.binary_search_by_key(&place, |(p, _)| *p).is_ok())
    }

    /// `self - other` for one transition, as signed per-place deltas; zero entries omitted.
    pub fn difference(&self, other: &Incidence, transition: TransitionId) -> Vec<(PlaceId, i128)> {
        let mut delta: Vec<(PlaceId, i128)> = Vec::new();
        let (mut lhs, mut rhs) = (
            self.row(transition).iter().peekable(),
            other.row(transition).iter().peekable(),
        );
        loop {
            let next = match (lhs.peek(), rhs.peek()) {
                (Some(&&(lp, lw)), Some(&&(rp, rw))) => {
                    if lp == rp {
                        lhs.next();
                        rhs.next();
                        (lp, lw as i128 - rw as i128)
                    } else if lp < rp {
                        lhs.next();
                        (lp, lw as i128)
                    } else {
                        rhs.next();
                        (rp, -(rw as i128))
                    }
                }
                (Some(&&(lp, lw)), None) => {
                    lhs.next();
                    (lp, lw as i128)
                }
                (None, Some(&&(rp, rw))) => {
                    rhs.next();
                    (rp, -(rw as i128))
                }
                (None, None) => break,
            };
            if next.1 != 0 {
                delta.push(next);
            }
        }
        delta
    }
}

impl fmt::Debug for Incidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (transition, row) in self.rows.iter_enumerated() {
            if !row.is_empty() {
                map.entry(&transition, &row.as_slice());
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_arcs_accumulate() {
        let mut pre = Incidence::new(1);
        let t = TransitionId::new(0);
        pre.add(PlaceId::new(2), t, 1);
        pre.add(PlaceId::new(0), t, 3);
        pre.add(PlaceId::new(2), t, 2);
        assert_eq!(pre.row(t), &[(PlaceId::new(0), 3), (PlaceId::new(2), 3)]);
        assert_eq!(pre.get(PlaceId::new(1), t), 0);
        assert!(pre.touches(PlaceId::new(2)));
        assert!(!pre.touches(PlaceId::new(1)));
    }

    #[test]
    fn difference_omits_balanced_places() {
        let t = TransitionId::new(0);
        let mut pre = Incidence::new(1);
        let mut post = Incidence::new(1);
        pre.add(PlaceId::new(0), t, 1);
        pre.add(PlaceId::new(1), t, 2);
        post.add(PlaceId::new(0), t, 1);
        post.add(PlaceId::new(3), t, 4);
        assert_eq!(
            post.difference(&pre, t),
            vec![(PlaceId::new(1), -2), (PlaceId::new(3), 4)]
        );
    }
}
