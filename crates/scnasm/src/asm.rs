use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use scn_nls::Codec;
use scn_script::record::from_json;
use scn_script::{LineBreakRule, Reassembler, ScriptTable};

use crate::batch::{self, BatchReport, Job};

pub struct Assembler<'a> {
    table: &'a ScriptTable,
    codec: Codec,
    output: PathBuf,
    line_break: Option<&'a LineBreakRule>,
}

impl<'a> Assembler<'a> {
    pub fn new(table: &'a ScriptTable, codec: Codec, output: impl Into<PathBuf>) -> Self {
        Self {
            table,
            codec,
            output: output.into(),
            line_break: None,
        }
    }

    pub fn strip_line_breaks(mut self, rule: &'a LineBreakRule) -> Self {
        self.line_break = Some(rule);
        self
    }

    /// `<rel>` under the output root with the `.json` suffix removed.
    fn target(&self, job: &Job) -> PathBuf {
        self.output.join(job.rel.with_extension(""))
    }

    pub fn assemble(&self, job: &Job) -> Result<()> {
        let text = fs::read_to_string(&job.source)
            .with_context(|| format!("reading {}", job.source.display()))?;
        let mut records = from_json(&text).with_context(|| format!("parsing {}", job.source.display()))?;
        if let Some(rule) = self.line_break {
            records = rule.strip(records)?;
        }

        let bytes = Reassembler::new(&self.table.references, &self.codec)
            .conformed(&self.table.signatures)
            .reassemble(&job.name(), records)?;

        let target = self.target(job);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&target, &bytes).with_context(|| format!("writing {}", target.display()))?;
        log::debug!("{}: {} bytes", job.name(), bytes.len());
        Ok(())
    }

    pub fn run(&self, input: &Path, workers: usize) -> Result<BatchReport> {
        let jobs = batch::collect(input, |p| p.extension().is_some_and(|e| e == "json"))?;
        log::info!("assembling {} file(s) from {}", jobs.len(), input.display());
        Ok(batch::run(jobs, workers, |job| self.assemble(job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::Disassembler;
    use pretty_assertions::assert_eq;
    use scn_nls::Encoding;

    const TABLE: &str = "encoding: utf8\nopcodes:\n  \"00\": [str]\n  \"06\": [u32]\n  \"14\": []\n  \"15\": []\nreferences:\n  \"06\": all\nline_break:\n  op: \"14\"\n  after: [\"00\"]\n";

    fn codec() -> Codec {
        Codec::new(Encoding::Utf8)
    }

    #[test]
    fn disasm_edit_asm() -> Result<()> {
        let table = ScriptTable::from_yaml(TABLE)?;
        let raw = tempfile::tempdir()?;
        let json = tempfile::tempdir()?;
        let rebuilt = tempfile::tempdir()?;
        fs::write(raw.path().join("001"), b"\x06\x0C\x00\x00\x00\x00hello\x00\x15")?;
        fs::write(raw.path().join("002"), b"\x00a\x00\x15")?;

        let report = Disassembler::new(&table, codec(), json.path()).run(raw.path(), 2)?;
        assert!(report.is_success());

        let path = json.path().join("001.json");
        let edited = fs::read_to_string(&path)?.replace("\"hello\"", "\"hi\"");
        fs::write(&path, edited)?;

        let report = Assembler::new(&table, codec(), rebuilt.path()).run(json.path(), 2)?;
        assert_eq!(report.succeeded, 2);
        assert_eq!(
            fs::read(rebuilt.path().join("001"))?,
            b"\x06\x09\x00\x00\x00\x00hi\x00\x15".to_vec()
        );
        assert_eq!(fs::read(rebuilt.path().join("002"))?, b"\x00a\x00\x15".to_vec());
        Ok(())
    }

    #[test]
    fn line_breaks_and_failures() -> Result<()> {
        let table = ScriptTable::from_yaml(TABLE)?;
        let json = tempfile::tempdir()?;
        let rebuilt = tempfile::tempdir()?;
        fs::write(
            json.path().join("ok.json"),
            r#"[{"op":"00","offset":0,"index":0,"value":["a"]},
                {"op":"14","offset":2,"index":1},
                {"op":"15","offset":3,"index":2}]"#,
        )?;
        fs::write(
            json.path().join("dangling.json"),
            r#"[{"op":"06","offset":0,"index":0,"value":["u32:7"]}]"#,
        )?;
        fs::write(
            json.path().join("retyped.json"),
            r#"[{"op":"06","offset":0,"index":0,"value":["u8:0"]}]"#,
        )?;

        let rule = table.line_break.as_ref().expect("rule");
        let report = Assembler::new(&table, codec(), rebuilt.path())
            .strip_line_breaks(rule)
            .run(json.path(), 1)?;
        assert_eq!(report.succeeded, 1);
        let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["dangling.json", "retyped.json"]);
        assert!(report.failed[0].1.contains("missing offset 7"), "{}", report.failed[0].1);

        assert_eq!(fs::read(rebuilt.path().join("ok"))?, b"\x00a\x00\x15".to_vec());
        assert!(!rebuilt.path().join("dangling").exists());
        Ok(())
    }
}
