use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use scn_nls::{Codec, Encoding};
use scn_pack::Mode;

mod asm;
mod batch;
mod config;
mod disasm;

use crate::asm::Assembler;
use crate::batch::BatchReport;
use crate::config::ToolConfig;
use crate::disasm::Disassembler;

#[derive(Parser, Debug)]
#[command(version, about = "SCN script disassembler, assembler and archive packer")]
struct Cli {
    /// TOML tool configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raise the log level of the tool itself; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ScriptArgs {
    /// Input directory.
    input: PathBuf,

    /// Output directory.
    output: PathBuf,

    /// YAML signature table. Defaults to the built-in SERAPH table.
    #[arg(short, long)]
    table: Option<PathBuf>,

    /// Text encoding: sjis, gbk or utf8.
    #[arg(short, long)]
    lang: Option<Encoding>,

    /// Worker threads.
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Compress {
    Literal,
    Greedy,
}

impl From<Compress> for Mode {
    fn from(value: Compress) -> Self {
        match value {
            Compress::Literal => Mode::Literal,
            Compress::Greedy => Mode::Greedy,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode every script under a directory to JSON record lists.
    Disasm(ScriptArgs),

    /// Re-encode JSON record lists, rewriting internal offsets.
    Asm {
        #[command(flatten)]
        args: ScriptArgs,

        /// Drop line-break opcodes named by the table before encoding.
        #[arg(long)]
        strip_line_breaks: bool,
    },

    /// Split an archive into numbered files plus __META__.json.
    Unpack {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Rebuild an archive from an unpacked directory.
    Pack {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = Compress::Literal)]
        compress: Compress,
    },
}

fn summarize(action: &str, report: &BatchReport) -> ExitCode {
    log::info!(
        "{action}: {} succeeded, {} failed",
        report.succeeded,
        report.failed.len()
    );
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: Cli, config: ToolConfig) -> Result<ExitCode> {
    match cli.command {
        Command::Disasm(args) => {
            let table = config.load_table(args.table.as_deref())?;
            let codec = Codec::new(config.encoding(args.lang, &table)?);
            let report = Disassembler::new(&table, codec, &args.output)
                .run(&args.input, config.jobs(args.jobs))?;
            Ok(summarize("disasm", &report))
        }
        Command::Asm {
            args,
            strip_line_breaks,
        } => {
            let table = config.load_table(args.table.as_deref())?;
            let codec = Codec::new(config.encoding(args.lang, &table)?);
            let mut assembler = Assembler::new(&table, codec, &args.output);
            if strip_line_breaks {
                let rule = table
                    .line_break
                    .as_ref()
                    .context("--strip-line-breaks needs a line_break rule in the table")?;
                assembler = assembler.strip_line_breaks(rule);
            }
            let report = assembler.run(&args.input, config.jobs(args.jobs))?;
            Ok(summarize("asm", &report))
        }
        Command::Unpack { input, output } => {
            scn_pack::unpack_to_dir(&input, &output)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pack {
            input,
            output,
            compress,
        } => {
            scn_pack::pack_from_dir(&input, &output, compress.into())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ToolConfig::new(path)?,
        None => ToolConfig::default(),
    };
    config.logger.clone().verbose(cli.verbose).init();
    run(cli, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from([
            "scnasm", "asm", "in", "out", "--lang", "gbk", "-j", "2", "--strip-line-breaks", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Asm { args, strip_line_breaks } => {
                assert!(strip_line_breaks);
                assert_eq!(args.lang, Some(Encoding::Gbk));
                assert_eq!(args.jobs, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["scnasm", "pack", "-i", "d", "-o", "a.dat", "--compress", "greedy"]).unwrap();
        assert!(matches!(cli.command, Command::Pack { compress: Compress::Greedy, .. }));
    }
}
