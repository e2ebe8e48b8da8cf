//! CLI entry point for the DCPU-16 runner binary.
//!
//! Loads an image of 16-bit words (host byte order), runs the machine until
//! it sticks in a one-instruction loop or a cycle cap is reached, and
//! prints the final register state plus an optional memory dump.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dcpu_core::Dcpu;

const HELP_TEXT: &str =
    "Usage: dcpu-run <image.bin> [--at <addr>] [--cycles <n>] [--dump <start>:<len>] [--help]";

/// Cycle cap applied when the program never reaches the halt convention.
const DEFAULT_MAX_CYCLES: u64 = 10_000_000;

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    input: PathBuf,
    origin: u16,
    max_cycles: u64,
    dump: Option<(u16, u16)>,
}

#[derive(Debug)]
enum ParseResult {
    Args(CliArgs),
    Help,
}

fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| format!("invalid number: {text}"))
}

fn parse_address(text: &str) -> Result<u16, String> {
    let value = parse_number(text)?;
    u16::try_from(value).map_err(|_| format!("address out of range: {text}"))
}

fn parse_dump(text: &str) -> Result<(u16, u16), String> {
    let (start, length) = text
        .split_once(':')
        .ok_or_else(|| String::from("--dump expects <start>:<len>"))?;
    Ok((parse_address(start)?, parse_address(length)?))
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut input: Option<PathBuf> = None;
    let mut origin = 0;
    let mut max_cycles = DEFAULT_MAX_CYCLES;
    let mut dump = None;

    while let Some(arg) = args.next() {
        if arg == "--help" {
            return Ok(ParseResult::Help);
        }

        if arg == "--at" || arg == "--cycles" || arg == "--dump" {
            let value = args
                .next()
                .ok_or_else(|| format!("missing value for {}", arg.to_string_lossy()))?;
            let value = value.to_string_lossy();
            if arg == "--at" {
                origin = parse_address(&value)?;
            } else if arg == "--cycles" {
                max_cycles = parse_number(&value)?;
            } else {
                dump = Some(parse_dump(&value)?);
            }
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err(String::from("multiple input paths provided"));
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| String::from("missing input path"))?;
    Ok(ParseResult::Args(CliArgs {
        input,
        origin,
        max_cycles,
        dump,
    }))
}

fn read_image(path: &Path) -> Result<Vec<u16>, String> {
    let bytes =
        fs::read(path).map_err(|error| format!("cannot read {}: {error}", path.display()))?;
    if bytes.len() % 2 != 0 {
        return Err(format!(
            "{}: image length must be a whole number of 16-bit words",
            path.display()
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect())
}

fn run(args: &CliArgs) -> Result<(), String> {
    let image = read_image(&args.input)?;

    let mut machine = Dcpu::new();
    machine.load(args.origin, &image);

    let mut cycles = 0;
    let stuck = loop {
        let pc_before = machine.pc();
        cycles += machine.step_instruction();
        if machine.pc() == pc_before {
            break true;
        }
        if cycles >= args.max_cycles {
            break false;
        }
    };

    println!("{machine}");
    if stuck {
        println!("Ran {cycles} cycles before becoming stuck.");
    } else {
        println!("Stopped after {cycles} cycles without becoming stuck.");
    }

    if let Some((start, length)) = args.dump {
        print!("{}", machine.dump_words(start, length));
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{HELP_TEXT}");
            ExitCode::SUCCESS
        }
        Ok(ParseResult::Args(args)) => {
            if let Err(error) = run(&args) {
                eprintln!("error: {error}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{HELP_TEXT}");
            ExitCode::FAILURE
        }
    }
}
