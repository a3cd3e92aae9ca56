use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::value::TaggedValue;

/// One decoded opcode.
///
/// Serialises as `{"op": "10 FF", "offset": 12, "index": 3, "value": ["u32:40"]}`,
/// which is the form external editors work on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "op")]
    pub signature: Signature,
    /// Where the signature began in the source blob.
    pub offset: usize,
    /// Position among all records of the blob.
    pub index: usize,
    /// Repeated fields are flattened in encounter order.
    #[serde(rename = "value", default)]
    pub fields: Vec<TaggedValue>,
}

impl Record {
    pub fn is(&self, signature: &Signature) -> bool {
        &self.signature == signature
    }
}

pub fn to_json(records: &[Record]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

pub fn from_json(text: &str) -> serde_json::Result<Vec<Record>> {
    serde_json::from_str(text)
}
