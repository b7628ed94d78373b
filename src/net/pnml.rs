//! PNML 导入。
//!
//! 采用流式解析，嵌套的 `<page>` 被展平。库所与迁移以 PNML `id` 作为标识；
//! 迁移的 `<name><text>` 作为显示标签，带有 `activity="$invisible$"` 的
//! `<toolspecific>` 的迁移视为静默迁移（无标签）。
//! `<finalmarkings>` 中的全部 `<marking>` 合并为一个终止标识，同一库所的计数相加。
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::net::core::Net;
use crate::net::io::{ParseError, ParsedNet};
use crate::net::structure::Transition;

const INVISIBLE_ACTIVITY: &str = "$invisible$";

#[derive(Debug)]
enum Element {
    Place {
        id: String,
        marking: String,
    },
    Transition {
        id: String,
        label: String,
        invisible: bool,
    },
    Arc {
        source: String,
        target: String,
        inscription: String,
    },
    FinalPlace {
        idref: String,
        count: String,
    },
}

#[derive(Default)]
struct PnmlReader {
    stack: Vec<String>,
    current: Option<Element>,
    places: Vec<(String, Option<i64>)>,
    transitions: Vec<Transition>,
    arcs: Vec<(String, String, i64)>,
    final_marking: Vec<(String, i64)>,
    has_final_marking: bool,
}

pub fn parse_pnml(content: &str) -> Result<ParsedNet, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut state = PnmlReader::default();
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                state.open(&start)?;
                state.stack.push(local_name(&start));
            }
            Event::Empty(start) => {
                state.open(&start)?;
                state.close(&local_name(&start))?;
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                state.stack.pop();
                state.close(&name)?;
            }
            Event::Text(text) => state.text(&text.unescape()?),
            Event::CData(data) => state.text(&String::from_utf8_lossy(&data.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attribute(
    start: &BytesStart<'_>,
    element: &'static str,
    name: &'static str,
) -> Result<String, ParseError> {
    optional_attribute(start, name)?.ok_or(ParseError::MissingAttribute {
        element,
        attribute: name,
    })
}

fn optional_attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, ParseError> {
    match start.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn parse_count(what: &'static str, text: &str) -> Result<i64, ParseError> {
    let trimmed = text.trim();
    trimmed.parse::<i64>().map_err(|_| ParseError::InvalidNumber {
        what,
        value: trimmed.to_owned(),
    })
}

impl PnmlReader {
    fn inside(&self, name: &str) -> bool {
        self.stack.iter().any(|open| open == name)
    }

    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), ParseError> {
        match local_name(start).as_str() {
            "place" if self.inside("finalmarkings") => {
                self.current = Some(Element::FinalPlace {
                    idref: attribute(start, "place", "idref")?,
                    count: String::new(),
                });
            }
            "place" => {
                self.current = Some(Element::Place {
                    id: attribute(start, "place", "id")?,
                    marking: String::new(),
                });
            }
            "transition" => {
                self.current = Some(Element::Transition {
                    id: attribute(start, "transition", "id")?,
                    label: String::new(),
                    invisible: false,
                });
            }
            "arc" => {
                self.current = Some(Element::Arc {
                    source: attribute(start, "arc", "source")?,
                    target: attribute(start, "arc", "target")?,
                    inscription: String::new(),
                });
            }
            "toolspecific" => {
                let activity = optional_attribute(start, "activity")?;
                if let Some(Element::Transition { invisible, .. }) = self.current.as_mut() {
                    if activity.as_deref() == Some(INVISIBLE_ACTIVITY) {
                        *invisible = true;
                    }
                }
            }
            "finalmarkings" => self.has_final_marking = true,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let depth = self.stack.len();
        if depth < 2 || self.stack[depth - 1] != "text" {
            return;
        }
        let parent = self.stack[depth - 2].as_str();
        match (self.current.as_mut(), parent) {
            (Some(Element::Place { marking, .. }), "initialMarking") => marking.push_str(text),
            (Some(Element::Transition { label, .. }), "name") => label.push_str(text),
            (Some(Element::Arc { inscription, .. }), "inscription") => inscription.push_str(text),
            (Some(Element::FinalPlace { count, .. }), "place") => count.push_str(text),
            _ => {}
        }
    }

    fn close(&mut self, name: &str) -> Result<(), ParseError> {
        let closes_current = matches!(
            (&self.current, name),
            (Some(Element::Place { .. } | Element::FinalPlace { .. }), "place")
                | (Some(Element::Transition { .. }), "transition")
                | (Some(Element::Arc { .. }), "arc")
        );
        if !closes_current {
            return Ok(());
        }

        match self.current.take() {
            Some(Element::Place { id, marking }) => {
                let tokens = if marking.trim().is_empty() {
                    None
                } else {
                    Some(parse_count("initial marking", &marking)?)
                };
                self.places.push((id, tokens));
            }
            Some(Element::Transition {
                id,
                label,
                invisible,
            }) => {
                let label = label.trim();
                let transition = if invisible || label.is_empty() {
                    Transition::new(id)
                } else {
                    Transition::with_label(id, label)
                };
                self.transitions.push(transition);
            }
            Some(Element::Arc {
                source,
                target,
                inscription,
            }) => {
                let weight = if inscription.trim().is_empty() {
                    1
                } else {
                    parse_count("arc inscription", &inscription)?
                };
                self.arcs.push((source, target, weight));
            }
            Some(Element::FinalPlace { idref, count }) => {
                let count = if count.trim().is_empty() {
                    1
                } else {
                    parse_count("final marking", &count)?
                };
                self.final_marking.push((idref, count));
            }
            None => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<ParsedNet, ParseError> {
        if self.places.is_empty() && self.transitions.is_empty() {
            return Err(ParseError::EmptyNet);
        }

        let mut builder = Net::builder();
        for (id, _) in &self.places {
            builder.place(id.as_str());
        }
        for transition in self.transitions {
            builder.transition(transition);
        }
        for (source, target, weight) in self.arcs {
            builder.arc(source, target, weight);
        }
        let net = builder.build()?;

        let initial_marking = net.marking(
            self.places
                .iter()
                .filter_map(|(id, tokens)| tokens.map(|tokens| (id.as_str(), tokens))),
        )?;
        let final_marking = if self.has_final_marking {
            let mut totals: IndexMap<&str, i64> = IndexMap::new();
            for (idref, count) in &self.final_marking {
                let total = totals.entry(idref.as_str()).or_default();
                // 负数保留下来交给 `Net::marking` 报错
                *total = if *total < 0 || *count < 0 {
                    (*total).min(*count)
                } else {
                    total.saturating_add(*count)
                };
            }
            Some(net.marking(totals)?)
        } else {
            None
        };

        log::debug!(
            "parsed PNML net: {} places, {} transitions, {} arcs",
            net.places_len(),
            net.transitions_len(),
            net.arcs().count()
        );

        Ok(ParsedNet {
            net,
            initial_marking,
            final_marking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::MarkingError;

    const SEQUENCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pnml>
  <net id="net1" type="http://www.pnml.org/version-2009/grammar/pnmlcoremodel">
    <page id="n0">
      <place id="source"><name><text>source</text></name><initialMarking><text>2</text></initialMarking></place>
      <place id="sink"><name><text>sink</text></name></place>
      <transition id="t1"><name><text>Register &amp; check</text></name></transition>
      <transition id="tau">
        <name><text>tau</text></name>
        <toolspecific tool="ProM" version="6.4" activity="$invisible$" localNodeID="x"/>
      </transition>
      <arc id="a1" source="source" target="t1"><inscription><text>2</text></inscription></arc>
      <arc id="a2" source="t1" target="sink"/>
      <arc id="a3" source="sink" target="tau"/>
    </page>
    <finalmarkings>
      <marking><place idref="sink"><text>1</text></place></marking>
    </finalmarkings>
  </net>
</pnml>"#;

    #[test]
    fn parses_labels_weights_and_markings() {
        let parsed = parse_pnml(SEQUENCE).unwrap();
        let net = &parsed.net;
        let source = net.place_id("source").unwrap();
        let sink = net.place_id("sink").unwrap();
        let t1 = net.transition_id("t1").unwrap();
        let tau = net.transition_id("tau").unwrap();

        assert_eq!(net.places_len(), 2);
        assert_eq!(net.transitions()[t1].label.as_deref(), Some("Register & check"));
        assert_eq!(net.transitions()[tau].label, None);
        assert_eq!(net.transitions()[tau].display_label(), "tau");
        assert_eq!(net.input_arcs(t1), &[(source, 2)]);
        assert_eq!(net.output_arcs(t1), &[(sink, 1)]);
        assert_eq!(parsed.initial_marking.tokens(source), 2);
        assert_eq!(parsed.final_marking.unwrap().tokens(sink), 1);
    }

    #[test]
    fn missing_final_marking_is_none() {
        let without = SEQUENCE.replace(
            r#"<finalmarkings>
      <marking><place idref="sink"><text>1</text></place></marking>
    </finalmarkings>"#,
            "",
        );
        assert!(parse_pnml(&without).unwrap().final_marking.is_none());
    }

    #[test]
    fn final_markings_for_the_same_place_are_summed() {
        let split = SEQUENCE.replace(
            r#"<marking><place idref="sink"><text>1</text></place></marking>"#,
            r#"<marking><place idref="sink"><text>1</text></place></marking>
      <marking><place idref="sink"><text>2</text></place><place idref="source"/></marking>"#,
        );
        let parsed = parse_pnml(&split).unwrap();
        let final_marking = parsed.final_marking.unwrap();
        let sink = parsed.net.place_id("sink").unwrap();
        let source = parsed.net.place_id("source").unwrap();
        assert_eq!(final_marking.tokens(sink), 3);
        assert_eq!(final_marking.tokens(source), 1);
    }

    #[test]
    fn rejects_bad_inscription() {
        let bad = SEQUENCE.replace("<inscription><text>2</text>", "<inscription><text>two</text>");
        assert!(matches!(
            parse_pnml(&bad),
            Err(ParseError::InvalidNumber { what: "arc inscription", .. })
        ));
    }

    #[test]
    fn rejects_dangling_arc() {
        let bad = SEQUENCE.replace(r#"target="tau""#, r#"target="ghost""#);
        assert!(matches!(parse_pnml(&bad), Err(ParseError::Net(_))));
    }

    #[test]
    fn rejects_negative_marking() {
        let bad = SEQUENCE.replace("<initialMarking><text>2</text>", "<initialMarking><text>-1</text>");
        assert!(matches!(
            parse_pnml(&bad),
            Err(ParseError::Marking(MarkingError::Negative { count: -1, .. }))
        ));
    }

    #[test]
    fn rejects_non_xml_and_empty_documents() {
        assert!(parse_pnml("<pnml><net></net></pnml>").is_err());
        assert!(matches!(
            parse_pnml(r#"<pnml><net><place/></net></pnml>"#),
            Err(ParseError::MissingAttribute { element: "place", attribute: "id" })
        ));
    }
}
