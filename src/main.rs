//! Binary entry point for the `ragzip` command-line tool.
//!
//! Mirrors the teacher's `main.rs` split: [`cli::parse_args`] builds a
//! [`cli::ParsedArgs`], [`run`] performs post-parse validation and dispatches
//! to encode/decode/inspect, and `main` maps the result to the exit codes
//! spec.md §6 specifies (0 success, 1 argument error, 2 processing error).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use ragzip::cli::{self, OpMode};
use ragzip::{RagzipReader, RagzipWriter};

fn run(args: cli::ParsedArgs) -> i32 {
    if args.exit_early {
        print_usage(&args.exe_name);
        return 0;
    }

    let input_path = match &args.input_filename {
        Some(p) => p.clone(),
        None => {
            eprintln!("ragzip: no input file given");
            return 1;
        }
    };

    match args.op_mode {
        OpMode::Inspect => match inspect(&input_path) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("ragzip: {e}");
                2
            }
        },
        OpMode::Compress => {
            let output_path = args.output_filename.clone().unwrap_or_else(|| cli::args::default_output_path(args.op_mode, &input_path));
            if let Err(e) = check_clobber(&output_path, args.clobber) {
                eprintln!("ragzip: {e}");
                return 1;
            }
            match encode(&input_path, &output_path, args.page_exp, args.index_exp) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("ragzip: {e}");
                    2
                }
            }
        }
        OpMode::Decompress => {
            let output_path = args.output_filename.clone().unwrap_or_else(|| cli::args::default_output_path(args.op_mode, &input_path));
            if let Err(e) = check_clobber(&output_path, args.clobber) {
                eprintln!("ragzip: {e}");
                return 1;
            }
            match decode(&input_path, &output_path) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("ragzip: {e}");
                    2
                }
            }
        }
    }
}

fn check_clobber(output_path: &str, clobber: bool) -> anyhow::Result<()> {
    if !clobber && std::path::Path::new(output_path).exists() {
        return Err(anyhow::anyhow!("bad usage: output file '{output_path}' already exists (use --clobber to overwrite)"));
    }
    Ok(())
}

fn encode(input_path: &str, output_path: &str, page_exp: u32, index_exp: u32) -> ragzip::Result<()> {
    let input = File::open(input_path)?;
    let output = File::create(output_path)?;
    let mut reader = BufReader::new(input);
    let mut writer = RagzipWriter::new(BufWriter::new(output), page_exp, index_exp)?;

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = std::io::Read::read(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    let mut out = writer.finish()?;
    out.flush().map_err(ragzip::RagzipError::from)
}

fn decode(input_path: &str, output_path: &str) -> ragzip::Result<()> {
    let input = File::open(input_path)?;
    let output = File::create(output_path)?;
    let mut reader = RagzipReader::open(BufReader::new(input))?;
    let mut writer = BufWriter::new(output);
    std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn inspect(input_path: &str) -> ragzip::Result<()> {
    let input = File::open(input_path)?;
    let reader = RagzipReader::open(BufReader::new(input))?;
    println!("uncompressed size : {}", reader.uncompressed_size());
    println!("levels            : {}", reader.levels());
    println!("page exponent (P) : {}", reader.page_exponent());
    println!("index exponent (I): {}", reader.index_exponent());
    println!("top index offset  : {}", reader.top_index_offset());
    println!("footer offset     : {}", reader.footer_offset());
    println!("extensions        : {}", reader.extensions().len());
    Ok(())
}

fn print_usage(exe_name: &str) {
    println!("usage: {exe_name} [-d] [-s] -i <path> [-o <path>] [-P n] [-I n] [--clobber] [-v|-vv] [-h]");
    println!();
    println!("  -i <path>   input file");
    println!("  -o <path>   output file (default: input+.rgz, or input minus suffix when decoding)");
    println!("  -d          decompress");
    println!("  -s          print footer geometry and exit (implies decode mode)");
    println!("  -P <n>      page size exponent (encode only, default {})", ragzip::config::DEFAULT_PAGE_EXPONENT);
    println!("  -I <n>      index size exponent (encode only, default {})", ragzip::config::DEFAULT_INDEX_EXPONENT);
    println!("  --clobber   permit overwriting an existing output file");
    println!("  -v, -vv     increase verbosity");
    println!("  -h          show this help");
}

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ragzip: {e}");
            std::process::exit(1);
        }
    };
    let exit_code = run(args);
    std::process::exit(exit_code);
}
