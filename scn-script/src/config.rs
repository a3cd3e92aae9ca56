//! YAML description of one game's opcode set.

use std::collections::BTreeMap;

use scn_nls::Encoding;
use serde::Deserialize;

use crate::edit::LineBreakRule;
use crate::error::{Result, ScriptError};
use crate::relocate::{ReferenceRule, ReferenceTable};
use crate::signature::{flatten, FieldDecoder, GroupKey, Signature, SignatureTable, TableNode};

const DEFAULT_KEY: &str = "default";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Fields(Vec<String>),
    Group(BTreeMap<String, RawNode>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    #[serde(default)]
    encoding: Option<String>,
    opcodes: BTreeMap<String, RawNode>,
    #[serde(default)]
    references: BTreeMap<Signature, ReferenceRule>,
    #[serde(default)]
    line_break: Option<LineBreakRule>,
}

/// Everything a batch needs to know about a game's scripts.
#[derive(Debug)]
pub struct ScriptTable {
    pub encoding: Encoding,
    pub signatures: SignatureTable,
    pub references: ReferenceTable,
    pub line_break: Option<LineBreakRule>,
}

impl ScriptTable {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawTable =
            serde_yaml::from_str(text).map_err(|e| ScriptError::Table(e.to_string()))?;

        let encoding = match raw.encoding.as_deref() {
            Some(name) => name
                .parse::<Encoding>()
                .map_err(|e| ScriptError::Table(e.to_string()))?,
            None => Encoding::default(),
        };

        let mut root = Vec::with_capacity(raw.opcodes.len());
        for (key, node) in &raw.opcodes {
            if key == DEFAULT_KEY {
                return Err(ScriptError::Table(
                    "\"default\" is only valid inside a group".to_string(),
                ));
            }
            root.push((table_signature(key)?, convert(node)?));
        }
        let signatures = SignatureTable::from_entries(flatten(&root)?)?;

        let mut references = ReferenceTable::new();
        for (signature, rule) in raw.references {
            if signatures.get(&signature).is_none() {
                return Err(ScriptError::Table(format!(
                    "reference rule for unknown opcode [{signature}]"
                )));
            }
            references.insert(signature, rule);
        }

        if let Some(rule) = &raw.line_break {
            if signatures.get(&rule.signature).is_none() {
                return Err(ScriptError::Table(format!(
                    "line break opcode [{}] is not in the table",
                    rule.signature
                )));
            }
        }

        log::debug!(
            "loaded {} signatures, {} reference rules, encoding {encoding}",
            signatures.len(),
            references.len()
        );

        Ok(Self {
            encoding,
            signatures,
            references,
            line_break: raw.line_break,
        })
    }
}

fn table_signature(key: &str) -> Result<Signature> {
    key.parse()
        .map_err(|e: ScriptError| ScriptError::Table(format!("opcode key {key:?}: {e}")))
}

fn convert(node: &RawNode) -> Result<TableNode> {
    match node {
        RawNode::Fields(fields) => fields
            .iter()
            .map(|f| f.parse::<FieldDecoder>())
            .collect::<Result<Vec<_>>>()
            .map(TableNode::Fields),
        RawNode::Group(children) => {
            let mut out = Vec::with_capacity(children.len());
            for (key, child) in children {
                let key = if key == DEFAULT_KEY {
                    GroupKey::Default
                } else {
                    GroupKey::Prefix(table_signature(key)?)
                };
                out.push((key, convert(child)?));
            }
            Ok(TableNode::Group(out))
        }
    }
}
