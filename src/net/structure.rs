//! P/T 网静态结构元素：库所、迁移、弧与标识。
use std::borrow::Cow;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
    /// 显示标签；不可见（静默）迁移没有标签。
    pub label: Option<String>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }

    pub fn with_label(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: Some(label.into()),
        }
    }

    /// The label shown on reachability edges: the display label, else the name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("Transition");
        tuple.field(&self.name);
        if let Some(label) = &self.label {
            tuple.field(label);
        }
        tuple.finish()
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub weight: Weight,
    pub direction: ArcDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

impl Arc {
    pub fn new(
        place: PlaceId,
        transition: TransitionId,
        weight: Weight,
        direction: ArcDirection,
    ) -> Self {
        Self {
            place,
            transition,
            weight,
            direction,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarkingError {
    #[error("place `{place}` has a negative token count ({count})")]
    Negative { place: String, count: i64 },
    #[error("marking references unknown place `{0}`")]
    UnknownPlace(String),
    #[error("removing {weight} tokens from place {place:?} holding {tokens}")]
    Underflow {
        place: PlaceId,
        tokens: Weight,
        weight: Weight,
    },
    #[error("token count overflow on place {0:?}")]
    Overflow(PlaceId),
}

/// 标识：库所上的非负令牌计数，视为库所上的多重集。
///
/// 标识按网的库所数稠密存储，零计数与“缺省”等价，因此直接比较即为多重集相等。
/// 标识是值类型，`add`/`subtract`/`with_tokens` 均返回新实例。
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Marking(IndexVec<PlaceId, Weight>);

impl Marking {
    pub fn new(tokens: IndexVec<PlaceId, Weight>) -> Self {
        Self(tokens)
    }

    /// The empty marking over `places` places.
    pub fn zeros(places: usize) -> Self {
        Self(IndexVec::from_elem(0, places))
    }

    /// 见 [`Net::marking`]。
    pub fn from_counts<'a, I>(net: &Net, counts: I) -> Result<Self, MarkingError>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        net.marking(counts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&tokens| tokens == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, Weight)> + '_ {
        self.0.iter_enumerated().map(|(place, &tokens)| (place, tokens))
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0.get(place).copied().unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u128 {
        self.0.iter().map(|&tokens| tokens as u128).sum()
    }

    pub fn with_tokens(&self, place: PlaceId, tokens: Weight) -> Self {
        let mut next = self.clone();
        next.0[place] = tokens;
        next
    }

    pub fn add(&self, place: PlaceId, weight: Weight) -> Result<Self, MarkingError> {
        let after = self
            .tokens(place)
            .checked_add(weight)
            .ok_or(MarkingError::Overflow(place))?;
        Ok(self.with_tokens(place, after))
    }

    pub fn subtract(&self, place: PlaceId, weight: Weight) -> Result<Self, MarkingError> {
        let tokens = self.tokens(place);
        let after = tokens.checked_sub(weight).ok_or(MarkingError::Underflow {
            place,
            tokens,
            weight,
        })?;
        Ok(self.with_tokens(place, after))
    }

    /// Deterministic deduplication key: marked places in ascending id order.
    pub fn canonical_key(&self) -> MarkingKey {
        MarkingKey(
            self.iter()
                .filter(|&(_, tokens)| tokens > 0)
                .collect::<SmallVec<_>>(),
        )
    }

    pub(crate) fn tokens_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place]
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter().filter(|&(_, tokens)| tokens > 0) {
            map.entry(&place, &tokens);
        }
        map.finish()
    }
}

/// 标识的规范键：`tokens > 0` 的 `(库所, 计数)` 按库所编号升序排列。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MarkingKey(SmallVec<[(PlaceId, Weight); 8]>);

impl MarkingKey {
    pub fn entries(&self) -> &[(PlaceId, Weight)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the key as `name:count` pairs sorted by place name and joined
    /// with `_`; the all-zero marking renders as `empty`.
    ///
    /// 名称中的 `\` 与 `:` 会被转义，因此不同的标识不会渲染成同一个字符串。
    pub fn render<'a>(&self, place_name: impl Fn(PlaceId) -> &'a str) -> String {
        if self.0.is_empty() {
            return "empty".to_owned();
        }
        self.0
            .iter()
            .map(|&(place, tokens)| (place_name(place), tokens))
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(name, tokens)| format!("{}:{tokens}", escape_place_name(name)))
            .join("_")
    }
}

fn escape_place_name(name: &str) -> Cow<'_, str> {
    if !name.contains(['\\', ':']) {
        return Cow::Borrowed(name);
    }
    let mut escaped = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if matches!(c, '\\' | ':') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

impl fmt::Debug for MarkingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|(place, tokens)| format!("{place}={tokens}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::index_vec::Idx;

    fn p(idx: usize) -> PlaceId {
        PlaceId::from_usize(idx)
    }

    #[test]
    fn key_ignores_construction_order() {
        let a = Marking::zeros(3).with_tokens(p(2), 1).with_tokens(p(0), 4);
        let b = Marking::zeros(3).with_tokens(p(0), 4).with_tokens(p(2), 1);
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key().entries(), &[(p(0), 4), (p(2), 1)]);
    }

    #[test]
    fn zero_counts_equal_absence() {
        let a = Marking::zeros(2).with_tokens(p(1), 0);
        assert_eq!(a, Marking::zeros(2));
        assert!(a.canonical_key().is_empty());
        assert!(a.is_empty());
    }

    #[test]
    fn add_and_subtract_return_new_markings() {
        let m = Marking::zeros(2).with_tokens(p(0), 2);
        let n = m.subtract(p(0), 2).unwrap().add(p(1), 3).unwrap();
        assert_eq!(m.tokens(p(0)), 2);
        assert_eq!(n.tokens(p(0)), 0);
        assert_eq!(n.tokens(p(1)), 3);
        assert_eq!(n.total_tokens(), 3);
        assert!(matches!(
            m.subtract(p(1), 1),
            Err(MarkingError::Underflow { tokens: 0, weight: 1, .. })
        ));
        assert!(matches!(
            m.with_tokens(p(1), u64::MAX).add(p(1), 1),
            Err(MarkingError::Overflow(_))
        ));
    }

    #[test]
    fn render_sorts_by_name() {
        let names = ["b", "a", "c"];
        let m = Marking::zeros(3).with_tokens(p(0), 1).with_tokens(p(1), 2);
        let rendered = m.canonical_key().render(|place| names[place.index()]);
        assert_eq!(rendered, "a:2_b:1");
        assert_eq!(Marking::zeros(3).canonical_key().render(|_| "x"), "empty");
    }

    #[test]
    fn render_escapes_separators_in_names() {
        let names = ["a", "b", "a:1_b"];
        let pair = Marking::zeros(3).with_tokens(p(0), 1).with_tokens(p(1), 1);
        let single = Marking::zeros(3).with_tokens(p(2), 1);
        let pair_id = pair.canonical_key().render(|place| names[place.index()]);
        let single_id = single.canonical_key().render(|place| names[place.index()]);
        assert_eq!(pair_id, "a:1_b:1");
        assert_eq!(single_id, r"a\:1_b:1");
        assert_ne!(pair_id, single_id);

        let names = [r"x\"];
        let m = Marking::zeros(1).with_tokens(p(0), 2);
        assert_eq!(m.canonical_key().render(|place| names[place.index()]), r"x\\:2");
    }
}
