//! 运行时: 网的构造校验、可发生集与发生语义.
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::Incidence;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{
    Arc, ArcDirection, Marking, MarkingError, Place, Transition, Weight,
};

/// 网结构不合法，调用方需修正输入。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("duplicate place `{0}`")]
    DuplicatePlace(String),
    #[error("duplicate transition `{0}`")]
    DuplicateTransition(String),
    #[error("arc {from} -> {to} references unknown node `{missing}`")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },
    #[error("arc {from} -> {to} must connect a place and a transition")]
    SameKind { from: String, to: String },
    #[error("arc {from} -> {to} is ambiguous: `{name}` names both a place and a transition")]
    Ambiguous {
        from: String,
        to: String,
        name: String,
    },
    #[error("arc {from} -> {to} has non-positive weight {weight}")]
    NonPositiveWeight {
        from: String,
        to: String,
        weight: i64,
    },
}

/// 发生规则错误。`NotEnabled` 表示调用方违反前置条件，属于程序缺陷。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition {0:?} is not enabled under the supplied marking")]
    NotEnabled(TransitionId),
    #[error("transition {0:?} cannot be reversed under the supplied marking")]
    NotReversible(TransitionId),
    #[error("marking has {actual} places but the net has {expected}")]
    MarkingSize { expected: usize, actual: usize },
    #[error("firing transition {transition:?}: {source}")]
    Overflow {
        transition: TransitionId,
        #[source]
        source: MarkingError,
    },
}

/// Petri 网连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<(PlaceId, String)>,
    /// 孤立变迁（无任何连接的弧）
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

/// 不可变的 P/T 网。只能经由 [`NetBuilder`] 构造，构造后不再修改。
#[derive(Clone, serde::Serialize)]
pub struct Net {
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    pre: Incidence,
    post: Incidence,
    #[serde(skip)]
    place_names: FxHashMap<String, PlaceId>,
    #[serde(skip)]
    transition_names: FxHashMap<String, TransitionId>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .finish()
    }
}

impl Net {
    pub fn builder() -> NetBuilder {
        NetBuilder::default()
    }

    pub fn places(&self) -> &IndexVec<PlaceId, Place> {
        &self.places
    }

    pub fn transitions(&self) -> &IndexVec<TransitionId, Transition> {
        &self.transitions
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn place_id(&self, name: &str) -> Option<PlaceId> {
        self.place_names.get(name).copied()
    }

    pub fn transition_id(&self, name: &str) -> Option<TransitionId> {
        self.transition_names.get(name).copied()
    }

    /// 输入弧: place -> transition
    pub fn input_arcs(&self, transition: TransitionId) -> &[(PlaceId, Weight)] {
        self.pre.row(transition)
    }

    /// 输出弧: transition -> place
    pub fn output_arcs(&self, transition: TransitionId) -> &[(PlaceId, Weight)] {
        self.post.row(transition)
    }

    pub fn arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.transitions.indices().flat_map(move |transition| {
            let inputs = self.pre.row(transition).iter().map(move |&(place, weight)| {
                Arc::new(place, transition, weight, ArcDirection::PlaceToTransition)
            });
            let outputs = self.post.row(transition).iter().map(move |&(place, weight)| {
                Arc::new(place, transition, weight, ArcDirection::TransitionToPlace)
            });
            inputs.chain(outputs)
        })
    }

    /// 迁移效应 `C[:, t] = Post[:, t] - Pre[:, t]`。
    pub fn effect(&self, transition: TransitionId) -> Vec<(PlaceId, i128)> {
        self.post.difference(&self.pre, transition)
    }

    pub fn empty_marking(&self) -> Marking {
        Marking::zeros(self.places_len())
    }

    /// 由 `库所名 -> 计数` 构造标识，未列出的库所计 0。
    pub fn marking<'a, I>(&self, counts: I) -> Result<Marking, MarkingError>
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut marking = self.empty_marking();
        for (name, count) in counts {
            let place = self
                .place_id(name)
                .ok_or_else(|| MarkingError::UnknownPlace(name.to_owned()))?;
            if count < 0 {
                return Err(MarkingError::Negative {
                    place: name.to_owned(),
                    count,
                });
            }
            *marking.tokens_mut(place) = count as Weight;
        }
        Ok(marking)
    }

    pub fn is_enabled(&self, marking: &Marking, transition: TransitionId) -> bool {
        if transition.index() >= self.transitions_len() {
            return false;
        }
        self.pre
            .row(transition)
            .iter()
            .all(|&(place, weight)| marking.tokens(place) >= weight)
    }

    /// 按声明顺序返回全部可发生迁移。
    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .indices()
            .filter(|&transition| self.is_enabled(marking, transition))
            .collect()
    }

    pub fn fire(&self, marking: &Marking, transition: TransitionId) -> Result<Marking, FireError> {
        self.check(marking, transition)?;
        if !self.is_enabled(marking, transition) {
            return Err(FireError::NotEnabled(transition));
        }

        let mut next = marking.clone();
        for &(place, weight) in self.pre.row(transition) {
            *next.tokens_mut(place) -= weight;
        }
        for &(place, weight) in self.post.row(transition) {
            let tokens = next.tokens_mut(place);
            *tokens = tokens.checked_add(weight).ok_or(FireError::Overflow {
                transition,
                source: MarkingError::Overflow(place),
            })?;
        }
        Ok(next)
    }

    /// `fire` 的逆操作：归还输入弧令牌，撤回输出弧令牌。
    pub fn unfire(&self, marking: &Marking, transition: TransitionId) -> Result<Marking, FireError> {
        self.check(marking, transition)?;
        let reversible = self
            .post
            .row(transition)
            .iter()
            .all(|&(place, weight)| marking.tokens(place) >= weight);
        if !reversible {
            return Err(FireError::NotReversible(transition));
        }

        let mut prev = marking.clone();
        for &(place, weight) in self.post.row(transition) {
            *prev.tokens_mut(place) -= weight;
        }
        for &(place, weight) in self.pre.row(transition) {
            let tokens = prev.tokens_mut(place);
            *tokens = tokens.checked_add(weight).ok_or(FireError::Overflow {
                transition,
                source: MarkingError::Overflow(place),
            })?;
        }
        Ok(prev)
    }

    /// Fires `sequence` in order starting at `marking`.
    pub fn fire_sequence<I>(&self, marking: &Marking, sequence: I) -> Result<Marking, FireError>
    where
        I: IntoIterator<Item = TransitionId>,
    {
        sequence
            .into_iter()
            .try_fold(marking.clone(), |current, transition| {
                self.fire(&current, transition)
            })
    }

    fn check(&self, marking: &Marking, transition: TransitionId) -> Result<(), FireError> {
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if marking.len() != self.places_len() {
            return Err(FireError::MarkingSize {
                expected: self.places_len(),
                actual: marking.len(),
            });
        }
        Ok(())
    }

    pub fn to_dot(&self, marking: Option<&Marking>) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (place_id, place) in self.places.iter_enumerated() {
            let tokens = marking.map(|m| m.tokens(place_id)).unwrap_or(0);
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\\n{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
                place_id.index(),
                escape_label(&place.name),
                tokens
            );
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let (style, fill) = match transition.label {
                Some(_) => ("filled", "#ffe0b2"),
                None => ("filled", "#424242"),
            };
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\", shape=box, style={}, fillcolor=\"{}\"];",
                transition_id.index(),
                escape_label(transition.display_label()),
                style,
                fill
            );
        }

        for arc in self.arcs() {
            let place_node = format!("place_{}", arc.place.index());
            let transition_node = format!("trans_{}", arc.transition.index());
            let (from, to) = match arc.direction {
                ArcDirection::PlaceToTransition => (place_node, transition_node),
                ArcDirection::TransitionToPlace => (transition_node, place_node),
            };
            if arc.weight == 1 {
                let _ = writeln!(&mut dot, "    {} -> {};", from, to);
            } else {
                let _ = writeln!(&mut dot, "    {} -> {} [label=\"{}\"];", from, to, arc.weight);
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P, marking: Option<&Marking>) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot(marking))
    }

    /// 诊断信息：检测孤立节点与永远无法触发的迁移
    pub fn diagnose_connectivity(&self, initial: Option<&Marking>) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            total_places: self.places_len(),
            total_transitions: self.transitions_len(),
            ..Default::default()
        };

        for (place_id, place) in self.places.iter_enumerated() {
            let consumed = self.pre.touches(place_id);
            let produced = self.post.touches(place_id);
            let marked = initial.map(|m| m.tokens(place_id) > 0).unwrap_or(false);

            if !consumed && !produced {
                report.isolated_places.push((place_id, place.name.clone()));
            } else if !produced && !marked && consumed {
                report.warnings.push(format!(
                    "place `{}` has no incoming arcs and no initial tokens; its output transitions can never fire",
                    place.name
                ));
            }
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let has_preset = !self.pre.row(transition_id).is_empty();
            let has_postset = !self.post.row(transition_id).is_empty();

            if !has_preset && !has_postset {
                report
                    .isolated_transitions
                    .push((transition_id, transition.name.clone()));
            } else if !has_preset {
                report.warnings.push(format!(
                    "transition `{}` has no input places and is always enabled; the state space may be unbounded",
                    transition.name
                ));
            }
        }

        report
    }

    pub fn log_diagnostics(&self, initial: Option<&Marking>) {
        let report = self.diagnose_connectivity(initial);

        if !report.has_issues() {
            log::debug!(
                "net connectivity ok ({} places, {} transitions)",
                report.total_places,
                report.total_transitions
            );
            return;
        }

        for (id, name) in &report.isolated_places {
            log::warn!("isolated place [{}] {}", id.index(), name);
        }
        for (id, name) in &report.isolated_transitions {
            log::warn!("isolated transition [{}] {}", id.index(), name);
        }
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[derive(Debug, Clone)]
struct PendingArc {
    source: String,
    target: String,
    weight: i64,
}

/// 网的构造器。弧按名称引用端点，校验推迟到 [`NetBuilder::build`]。
#[derive(Debug, Clone, Default)]
pub struct NetBuilder {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    arcs: Vec<PendingArc>,
}

impl NetBuilder {
    pub fn place(&mut self, name: impl Into<String>) -> &mut Self {
        self.places.push(Place::new(name));
        self
    }

    pub fn transition(&mut self, transition: Transition) -> &mut Self {
        self.transitions.push(transition);
        self
    }

    /// 弧 `source -> target`，方向由端点种类决定。
    pub fn arc(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        weight: i64,
    ) -> &mut Self {
        self.arcs.push(PendingArc {
            source: source.into(),
            target: target.into(),
            weight,
        });
        self
    }

    pub fn build(&self) -> Result<Net, NetError> {
        let mut place_names = FxHashMap::default();
        let mut places = IndexVec::new();
        for place in &self.places {
            if place_names.contains_key(&place.name) {
                return Err(NetError::DuplicatePlace(place.name.clone()));
            }
            let id = places.push(place.clone());
            place_names.insert(place.name.clone(), id);
        }

        let mut transition_names = FxHashMap::default();
        let mut transitions = IndexVec::new();
        for transition in &self.transitions {
            if transition_names.contains_key(&transition.name) {
                return Err(NetError::DuplicateTransition(transition.name.clone()));
            }
            let id = transitions.push(transition.clone());
            transition_names.insert(transition.name.clone(), id);
        }

        let mut pre = Incidence::new(transitions.len());
        let mut post = Incidence::new(transitions.len());

        for arc in &self.arcs {
            let resolve = |name: &str| -> Result<Node, NetError> {
                match (place_names.get(name), transition_names.get(name)) {
                    (Some(&place), None) => Ok(Node::Place(place)),
                    (None, Some(&transition)) => Ok(Node::Transition(transition)),
                    (Some(_), Some(_)) => Err(NetError::Ambiguous {
                        from: arc.source.clone(),
                        to: arc.target.clone(),
                        name: name.to_owned(),
                    }),
                    (None, None) => Err(NetError::UnknownNode {
                        from: arc.source.clone(),
                        to: arc.target.clone(),
                        missing: name.to_owned(),
                    }),
                }
            };

            let source = resolve(&arc.source)?;
            let target = resolve(&arc.target)?;
            if arc.weight <= 0 {
                return Err(NetError::NonPositiveWeight {
                    from: arc.source.clone(),
                    to: arc.target.clone(),
                    weight: arc.weight,
                });
            }
            let weight = arc.weight as Weight;

            match (source, target) {
                (Node::Place(place), Node::Transition(transition)) => {
                    pre.add(place, transition, weight)
                }
                (Node::Transition(transition), Node::Place(place)) => {
                    post.add(place, transition, weight)
                }
                _ => {
                    return Err(NetError::SameKind {
                        from: arc.source.clone(),
                        to: arc.target.clone(),
                    });
                }
            }
        }

        Ok(Net {
            places,
            transitions,
            pre,
            post,
            place_names,
            transition_names,
        })
    }
}

#[derive(Clone, Copy)]
enum Node {
    Place(PlaceId),
    Transition(TransitionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer_consumer() -> Net {
        let mut builder = Net::builder();
        builder
            .place("p0")
            .place("p1")
            .transition(Transition::with_label("t0", "produce"))
            .transition(Transition::new("t1"))
            .arc("p0", "t0", 1)
            .arc("t0", "p1", 2)
            .arc("p1", "t1", 2)
            .arc("t1", "p0", 1);
        builder.build().unwrap()
    }

    #[test]
    fn builder_resolves_arc_directions() {
        let net = producer_consumer();
        let t0 = net.transition_id("t0").unwrap();
        let p0 = net.place_id("p0").unwrap();
        let p1 = net.place_id("p1").unwrap();

        assert_eq!(net.places_len(), 2);
        assert_eq!(net.transitions_len(), 2);
        assert_eq!(net.input_arcs(t0), &[(p0, 1)]);
        assert_eq!(net.output_arcs(t0), &[(p1, 2)]);
        assert_eq!(net.arcs().count(), 4);
        assert_eq!(net.effect(t0), vec![(p0, -1), (p1, 2)]);
    }

    #[test]
    fn malformed_nets_are_rejected() {
        let mut dup = Net::builder();
        dup.place("p").place("p");
        assert_eq!(dup.build().unwrap_err(), NetError::DuplicatePlace("p".into()));

        let mut dup_t = Net::builder();
        dup_t.transition(Transition::new("t")).transition(Transition::new("t"));
        assert_eq!(
            dup_t.build().unwrap_err(),
            NetError::DuplicateTransition("t".into())
        );

        let mut unknown = Net::builder();
        unknown.place("p").arc("p", "t", 1);
        assert!(matches!(
            unknown.build(),
            Err(NetError::UnknownNode { missing, .. }) if missing == "t"
        ));

        let mut zero = Net::builder();
        zero.place("p").transition(Transition::new("t")).arc("p", "t", 0);
        assert!(matches!(
            zero.build(),
            Err(NetError::NonPositiveWeight { weight: 0, .. })
        ));

        let mut same = Net::builder();
        same.place("a").place("b").arc("a", "b", 1);
        assert!(matches!(same.build(), Err(NetError::SameKind { .. })));

        let mut ambiguous = Net::builder();
        ambiguous
            .place("x")
            .transition(Transition::new("x"))
            .place("p")
            .arc("p", "x", 1);
        assert!(matches!(ambiguous.build(), Err(NetError::Ambiguous { .. })));
    }

    #[test]
    fn marking_from_counts() {
        let net = producer_consumer();
        let m = net.marking([("p1", 3)]).unwrap();
        assert_eq!(m.tokens(net.place_id("p0").unwrap()), 0);
        assert_eq!(m.tokens(net.place_id("p1").unwrap()), 3);
        assert!(matches!(
            net.marking([("p0", -1)]),
            Err(MarkingError::Negative { count: -1, .. })
        ));
        assert_eq!(
            net.marking([("nope", 1)]).unwrap_err(),
            MarkingError::UnknownPlace("nope".into())
        );
    }

    #[test]
    fn fire_respects_weights() {
        let net = producer_consumer();
        let t0 = net.transition_id("t0").unwrap();
        let t1 = net.transition_id("t1").unwrap();
        let m0 = net.marking([("p0", 1)]).unwrap();

        assert_eq!(net.enabled_transitions(&m0), vec![t0]);
        let m1 = net.fire(&m0, t0).unwrap();
        assert_eq!(m1, net.marking([("p1", 2)]).unwrap());
        assert_eq!(net.fire(&m1, t0).unwrap_err(), FireError::NotEnabled(t0));
        assert_eq!(net.fire_sequence(&m0, [t0, t1]).unwrap(), m0);
        assert_eq!(
            net.fire(&m0, TransitionId::new(9)).unwrap_err(),
            FireError::OutOfBounds(TransitionId::new(9))
        );
    }

    #[test]
    fn unfire_inverts_fire() {
        let net = producer_consumer();
        let t0 = net.transition_id("t0").unwrap();
        let m0 = net.marking([("p0", 2), ("p1", 1)]).unwrap();
        let m1 = net.fire(&m0, t0).unwrap();
        assert_eq!(net.unfire(&m1, t0).unwrap(), m0);
        assert_eq!(
            net.unfire(&m0, t0).unwrap_err(),
            FireError::NotReversible(t0)
        );
    }

    #[test]
    fn source_transitions_are_always_enabled() {
        let mut builder = Net::builder();
        builder
            .place("p")
            .transition(Transition::new("gen"))
            .arc("gen", "p", 1);
        let net = builder.build().unwrap();
        let generator = net.transition_id("gen").unwrap();
        assert!(net.is_enabled(&net.empty_marking(), generator));

        let report = net.diagnose_connectivity(None);
        assert!(report.has_issues());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn dot_mentions_every_node() {
        let net = producer_consumer();
        let dot = net.to_dot(Some(&net.marking([("p0", 1)]).unwrap()));
        assert!(dot.contains("place_0 [label=\"p0\\n1\""));
        assert!(dot.contains("trans_0 [label=\"produce\""));
        assert!(dot.contains("trans_0 -> place_1 [label=\"2\"];"));
    }
}
