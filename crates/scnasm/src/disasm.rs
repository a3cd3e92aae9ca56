use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use scn_nls::Codec;
use scn_script::record::to_json;
use scn_script::{Decoder, Halt, ScriptTable};

use crate::batch::{self, BatchReport, Job};

pub struct Disassembler<'a> {
    table: &'a ScriptTable,
    codec: Codec,
    output: PathBuf,
}

impl<'a> Disassembler<'a> {
    pub fn new(table: &'a ScriptTable, codec: Codec, output: impl Into<PathBuf>) -> Self {
        Self {
            table,
            codec,
            output: output.into(),
        }
    }

    /// `<rel>.json` under the output root.
    fn target(&self, job: &Job) -> PathBuf {
        let mut name = job.rel.clone().into_os_string();
        name.push(".json");
        self.output.join(name)
    }

    pub fn disassemble(&self, job: &Job) -> Result<()> {
        let data = fs::read(&job.source).with_context(|| format!("reading {}", job.source.display()))?;
        let decoded = Decoder::new(&self.table.signatures, &self.codec).decode(&data);

        match &decoded.halt {
            Halt::Exhausted => {}
            Halt::EndMarker => {
                if decoded.consumed < data.len() {
                    log::warn!(
                        "{}: {} byte(s) after the end marker at 0x{:X} are not disassembled",
                        job.name(),
                        data.len() - decoded.consumed,
                        decoded.consumed
                    );
                }
            }
            Halt::Unknown { byte, offset } => {
                bail!(
                    "skipped after {} record(s): unknown opcode 0x{byte:02X} at 0x{offset:X}",
                    decoded.records.len()
                );
            }
            Halt::Malformed(e) => {
                bail!("skipped after {} record(s): {e}", decoded.records.len());
            }
        }

        let target = self.target(job);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = to_json(&decoded.records)?;
        fs::write(&target, json).with_context(|| format!("writing {}", target.display()))?;
        log::debug!("{}: {} records", job.name(), decoded.records.len());
        Ok(())
    }

    pub fn run(&self, input: &Path, workers: usize) -> Result<BatchReport> {
        let jobs = batch::collect(input, |p| p.extension().is_none_or(|e| e != "json"))?;
        log::info!("disassembling {} file(s) from {}", jobs.len(), input.display());
        Ok(batch::run(jobs, workers, |job| self.disassemble(job)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scn_nls::Encoding;
    use scn_script::record::from_json;

    const TABLE: &str = "encoding: utf8\nopcodes:\n  \"00\": [str]\n  \"06\": [u32]\n  \"15\": []\n  \"FF\": [end]\nreferences:\n  \"06\": all\n";

    #[test]
    fn writes_json_and_skips_broken_files() -> Result<()> {
        let table = ScriptTable::from_yaml(TABLE)?;
        let input = tempfile::tempdir()?;
        let output = tempfile::tempdir()?;
        fs::create_dir_all(input.path().join("scene"))?;
        fs::write(input.path().join("scene/001"), b"\x06\x05\x00\x00\x00\x00hi\x00\x15")?;
        fs::write(input.path().join("002"), b"\x15\x42")?;
        fs::write(input.path().join("003"), b"\x15\xFF\x01\x02")?;
        fs::write(input.path().join("notes.json"), b"[]")?;

        let disasm = Disassembler::new(&table, Codec::new(Encoding::Utf8), output.path());
        let report = disasm.run(input.path(), 2)?;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "002");
        assert!(report.failed[0].1.contains("0x42 at 0x1"), "{}", report.failed[0].1);

        let records = from_json(&fs::read_to_string(output.path().join("scene/001.json"))?)?;
        let ops: Vec<String> = records.iter().map(|r| r.signature.to_string()).collect();
        assert_eq!(ops, vec!["06", "00", "15"]);
        assert_eq!(records[1].offset, 5);

        // End marker: the trailing bytes are dropped, the file is still written.
        let records = from_json(&fs::read_to_string(output.path().join("003.json"))?)?;
        assert_eq!(records.len(), 2);
        assert!(!output.path().join("002.json").exists());
        assert!(!output.path().join("notes.json.json").exists());
        Ok(())
    }
}
