//! `bej encode`/`bej decode`: the CLI surface described as an external
//! collaborator in spec.md §6. Not part of the core codec; this binary only
//! wires file I/O and JSON text parsing/printing around `bej::encode` and
//! `bej::decode`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bej::Dictionary;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Binary Encoded JSON (BEJ) encoder/decoder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a JSON text file into a BEJ byte stream.
    Encode(CodecArgs),
    /// Decode a BEJ byte stream into JSON text.
    Decode(CodecArgs),
}

#[derive(Parser, Debug)]
struct CodecArgs {
    /// Schema dictionary (.bin or .map).
    #[arg(short = 's', long = "schema")]
    schema: PathBuf,

    /// Annotation dictionary (.bin or .map), required only if the payload
    /// uses `@`-prefixed properties.
    #[arg(short = 'a', long = "annotation")]
    annotation: Option<PathBuf>,

    /// Output path; defaults to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Input path (JSON text for `encode`, BEJ bytes for `decode`).
    input: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Encode(args) => run_encode(args),
        Command::Decode(args) => run_decode(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bej: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_dicts(schema: &PathBuf, annotation: &Option<PathBuf>) -> Result<(Dictionary, Option<Dictionary>)> {
    let schema_dict = Dictionary::load_file(schema)
        .with_context(|| format!("failed to load schema dictionary {:?}", schema))?;
    let annot_dict = match annotation {
        Some(path) => Some(
            Dictionary::load_file(path)
                .with_context(|| format!("failed to load annotation dictionary {:?}", path))?,
        ),
        None => None,
    };
    Ok((schema_dict, annot_dict))
}

fn write_output(output: &Option<PathBuf>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            let mut f = File::create(path)
                .with_context(|| format!("failed to create output file {:?}", path))?;
            f.write_all(bytes)?;
        }
        None => {
            io::stdout().write_all(bytes)?;
        }
    }
    Ok(())
}

fn run_encode(args: CodecArgs) -> Result<()> {
    let (schema_dict, annot_dict) = load_dicts(&args.schema, &args.annotation)?;

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input JSON {:?}", args.input))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).context("input is not valid JSON")?;

    let bytes = bej::encode(&value, &schema_dict, annot_dict.as_ref())
        .map_err(|e| anyhow::anyhow!("encode failed: {}", e))?;
    log::debug!(
        "encoded {} bytes from {:?}, header {}",
        bytes.len(),
        args.input,
        hex::encode(&bytes[..bej::FRAME_SIZE.min(bytes.len())])
    );

    write_output(&args.output, &bytes)
}

fn run_decode(args: CodecArgs) -> Result<()> {
    let (schema_dict, annot_dict) = load_dicts(&args.schema, &args.annotation)?;

    let mut bytes = Vec::new();
    File::open(&args.input)
        .with_context(|| format!("failed to open input {:?}", args.input))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read input {:?}", args.input))?;

    let value = bej::decode(&bytes, &schema_dict, annot_dict.as_ref())
        .map_err(|e| anyhow::anyhow!("decode failed: {}", e))?;
    log::debug!("decoded {:?} ({} bytes read)", args.input, bytes.len());

    let text = serde_json::to_string_pretty(&value).context("failed to render decoded JSON")?;
    write_output(&args.output, text.as_bytes())?;
    if args.output.is_none() {
        println!();
    }
    Ok(())
}
