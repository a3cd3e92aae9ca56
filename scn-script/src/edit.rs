//! Record-list edits applied between decode and re-encode.

use serde::Deserialize;

use crate::error::{Result, ScriptError};
use crate::record::Record;
use crate::signature::Signature;

/// Drops a line-break pseudo-opcode that may only follow certain opcodes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LineBreakRule {
    #[serde(rename = "op")]
    pub signature: Signature,
    pub after: Vec<Signature>,
}

impl LineBreakRule {
    pub fn new(signature: Signature, after: Vec<Signature>) -> Self {
        Self { signature, after }
    }

    /// Remove every line break, checking each against the last record kept.
    ///
    /// Offsets of the surviving records are left as decoded so references to
    /// them still relocate.
    pub fn strip(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut kept: Vec<Record> = Vec::with_capacity(records.len());
        let mut removed = 0usize;
        for record in records {
            if !record.is(&self.signature) {
                kept.push(record);
                continue;
            }
            let previous = kept.last().map(|r| &r.signature);
            if !previous.is_some_and(|p| self.after.contains(p)) {
                return Err(ScriptError::UnexpectedLineBreak {
                    index: record.index,
                    previous: previous.map_or_else(|| "<none>".to_string(), ToString::to_string),
                    allowed: self
                        .after
                        .iter()
                        .map(|s| format!("[{s}]"))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            removed += 1;
        }
        log::debug!("removed {removed} line breaks [{}]", self.signature);
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TaggedValue;
    use pretty_assertions::assert_eq;

    fn sig(s: &str) -> Signature {
        Signature::hex(s).unwrap()
    }

    fn rec(op: &str, index: usize) -> Record {
        Record {
            signature: sig(op),
            offset: index * 4,
            index,
            fields: vec![],
        }
    }

    fn rule() -> LineBreakRule {
        LineBreakRule::new(sig("14"), vec![sig("08"), sig("00")])
    }

    #[test]
    fn strips_after_allowed() {
        let mut text = rec("00", 0);
        text.fields.push(TaggedValue::Str("a".into()));
        let records = vec![text, rec("14", 1), rec("08", 2), rec("14", 3), rec("15", 4)];
        let kept = rule().strip(records).unwrap();
        let ops: Vec<String> = kept.iter().map(|r| r.signature.to_string()).collect();
        assert_eq!(ops, vec!["00", "08", "15"]);
        assert_eq!(kept[1].offset, 8);
    }

    #[test]
    fn break_after_disallowed_opcode() {
        // Removed breaks are invisible: the second one is checked against "00".
        let records = vec![rec("00", 0), rec("14", 1), rec("14", 2)];
        assert_eq!(rule().strip(records).unwrap().len(), 1);

        let records = vec![rec("15", 0), rec("14", 1)];
        let err = rule().strip(records).unwrap_err();
        match err {
            ScriptError::UnexpectedLineBreak { index, previous, .. } => {
                assert_eq!(index, 1);
                assert_eq!(previous, "15");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn leading_break_is_rejected() {
        let err = rule().strip(vec![rec("14", 0)]).unwrap_err();
        assert!(matches!(err, ScriptError::UnexpectedLineBreak { index: 0, .. }));
    }
}
