//! I/O 支持：网文档的读取（PNML、JSON、RON）与结果的 JSON 序列化。
use std::fs;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::{Net, NetError};
use crate::net::pnml;
use crate::net::structure::{ArcDirection, Marking, MarkingError, Transition};

/// 网文档解析失败，与网结构错误区分开。
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid {what} `{value}`")]
    InvalidNumber { what: &'static str, value: String },
    #[error("document contains no places or transitions")]
    EmptyNet,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported net format `{0}` (expected .pnml, .json or .ron)")]
    UnsupportedFormat(String),
    #[error("malformed net: {0}")]
    Net(#[from] NetError),
    #[error("invalid marking: {0}")]
    Marking(#[from] MarkingError),
}

/// 解析结果：网、初始标识以及可选的终止标识。
#[derive(Debug, Clone)]
pub struct ParsedNet {
    pub net: Net,
    pub initial_marking: Marking,
    pub final_marking: Option<Marking>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetFormat {
    Pnml,
    Json,
    Ron,
}

impl NetFormat {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pnml" | "xml" => Ok(NetFormat::Pnml),
            "json" => Ok(NetFormat::Json),
            "ron" => Ok(NetFormat::Ron),
            _ => Err(ParseError::UnsupportedFormat(extension)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcDoc {
    pub source: String,
    pub target: String,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

fn default_weight() -> i64 {
    1
}

/// JSON/RON 形式的网文档，经 [`NetBuilder`](crate::net::NetBuilder) 校验后得到 [`ParsedNet`]。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetDocument {
    pub places: Vec<String>,
    pub transitions: Vec<TransitionDoc>,
    pub arcs: Vec<ArcDoc>,
    #[serde(default)]
    pub initial_marking: IndexMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_marking: Option<IndexMap<String, i64>>,
}

impl NetDocument {
    pub fn into_parsed(self) -> Result<ParsedNet, ParseError> {
        let mut builder = Net::builder();
        for place in &self.places {
            builder.place(place.as_str());
        }
        for transition in self.transitions {
            builder.transition(Transition {
                name: transition.name,
                label: transition.label,
            });
        }
        for arc in self.arcs {
            builder.arc(arc.source, arc.target, arc.weight);
        }
        let net = builder.build()?;

        let initial_marking = net.marking(
            self.initial_marking
                .iter()
                .map(|(name, &count)| (name.as_str(), count)),
        )?;
        let final_marking = self
            .final_marking
            .as_ref()
            .map(|counts| net.marking(counts.iter().map(|(name, &count)| (name.as_str(), count))))
            .transpose()?;

        Ok(ParsedNet {
            net,
            initial_marking,
            final_marking,
        })
    }

    pub fn from_parsed(parsed: &ParsedNet) -> Self {
        let net = &parsed.net;
        let counts = |marking: &Marking| {
            marking
                .iter()
                .filter(|&(_, tokens)| tokens > 0)
                .map(|(place, tokens)| (net.places()[place].name.clone(), tokens as i64))
                .collect::<IndexMap<_, _>>()
        };
        Self {
            places: net.places().iter().map(|p| p.name.clone()).collect(),
            transitions: net
                .transitions()
                .iter()
                .map(|t| TransitionDoc {
                    name: t.name.clone(),
                    label: t.label.clone(),
                })
                .collect(),
            arcs: net
                .arcs()
                .map(|arc| {
                    let place = net.places()[arc.place].name.clone();
                    let transition = net.transitions()[arc.transition].name.clone();
                    let (source, target) = match arc.direction {
                        ArcDirection::PlaceToTransition => (place, transition),
                        ArcDirection::TransitionToPlace => (transition, place),
                    };
                    ArcDoc {
                        source,
                        target,
                        weight: arc.weight as i64,
                    }
                })
                .collect(),
            initial_marking: counts(&parsed.initial_marking),
            final_marking: parsed.final_marking.as_ref().map(counts),
        }
    }
}

pub fn parse_net(content: &str, format: NetFormat) -> Result<ParsedNet, ParseError> {
    match format {
        NetFormat::Pnml => pnml::parse_pnml(content),
        NetFormat::Json => from_json_str::<NetDocument>(content)?.into_parsed(),
        NetFormat::Ron => ron::from_str::<NetDocument>(content)?.into_parsed(),
    }
}

pub fn read_net<P: AsRef<Path>>(path: P) -> Result<ParsedNet, ParseError> {
    let path = path.as_ref();
    let format = NetFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    parse_net(&content, format)
}

pub fn to_json_string<T>(value: &T) -> Result<String, ParseError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, ParseError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), ParseError> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(to_json_string(value)?.as_bytes())?;
    Ok(())
}

pub fn to_ron_string(document: &NetDocument) -> Result<String, ron::Error> {
    let pretty = PrettyConfig::default().new_line("\n".to_owned());
    ron::ser::to_string_pretty(document, pretty)
}
