//! Command-line argument parsing for the `ragzip` binary.
//!
//! A short hand-rolled loop over `argv`, in the house style of the teacher's
//! `cli::args` rather than a derive-macro parser: the teacher depends on
//! `clap` but its actual argument loop never calls it, so this crate parses
//! the same way and drops the `clap` dependency entirely (see DESIGN.md).
//!
//! The entry points are [`parse_args`] (reads `std::env::args()`) and
//! [`parse_args_from`] (an explicit slice, for unit tests). Bad or
//! unrecognized options return an `Err` whose message begins with
//! `"bad usage: "`.

use anyhow::anyhow;

use crate::config;

/// Selected operation, resolved from `-d` (or absent) plus `-s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    Compress,
    Decompress,
    /// `-s`: print the footer's geometry and exit without decoding.
    Inspect,
}

/// Everything the parse loop discovered, ready for `main` to dispatch on.
#[derive(Debug)]
pub struct ParsedArgs {
    pub op_mode: OpMode,
    pub input_filename: Option<String>,
    pub output_filename: Option<String>,
    pub page_exp: u32,
    pub index_exp: u32,
    pub nb_workers: usize,
    pub clobber: bool,
    /// `-h`: help text was printed; caller should exit 0 without touching I/O.
    pub exit_early: bool,
    pub exe_name: String,
}

/// Parses `std::env::args()`, skipping argv[0].
pub fn parse_args() -> anyhow::Result<ParsedArgs> {
    let exe_name = std::env::args().next().unwrap_or_else(|| "ragzip".to_string());
    let argv: Vec<String> = std::env::args().skip(1).collect();
    parse_args_from(&exe_name, &argv)
}

/// Parses an explicit argument list. `exe_name` is argv[0]; `argv` is argv[1..].
pub fn parse_args_from(exe_name: &str, argv: &[String]) -> anyhow::Result<ParsedArgs> {
    let mut op_mode = OpMode::Compress;
    let mut input_filename = None;
    let mut output_filename = None;
    let mut page_exp = config::DEFAULT_PAGE_EXPONENT;
    let mut index_exp = config::DEFAULT_INDEX_EXPONENT;
    let nb_workers = num_cpus::get().clamp(1, config::NB_WORKERS_MAX);
    let mut clobber = false;
    let mut exit_early = false;
    let mut verbosity = crate::cli::constants::display_level();

    let mut i = 0;
    while i < argv.len() {
        let arg = argv[i].as_str();
        match arg {
            "-i" => {
                i += 1;
                input_filename = Some(require_value(argv, i, "-i")?.to_string());
            }
            "-o" => {
                i += 1;
                output_filename = Some(require_value(argv, i, "-o")?.to_string());
            }
            "-P" => {
                i += 1;
                page_exp = require_value(argv, i, "-P")?
                    .parse()
                    .map_err(|_| anyhow!("bad usage: -P requires a numeric argument"))?;
            }
            "-I" => {
                i += 1;
                index_exp = require_value(argv, i, "-I")?
                    .parse()
                    .map_err(|_| anyhow!("bad usage: -I requires a numeric argument"))?;
            }
            "-d" | "--decompress" => op_mode = OpMode::Decompress,
            "-s" => op_mode = OpMode::Inspect,
            "--clobber" => clobber = true,
            "-v" => verbosity = verbosity.max(2),
            "-vv" => verbosity = verbosity.max(3),
            "-h" | "--help" => {
                exit_early = true;
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(anyhow!("bad usage: unrecognized option '{other}'"));
            }
            _ => {
                if input_filename.is_none() {
                    input_filename = Some(arg.to_string());
                } else {
                    return Err(anyhow!("bad usage: unexpected extra argument '{arg}'"));
                }
            }
        }
        i += 1;
    }

    crate::cli::constants::set_display_level(verbosity);

    if !exit_early && op_mode != OpMode::Inspect && input_filename.is_none() {
        return Err(anyhow!("bad usage: no input file given (-i <path>)"));
    }

    Ok(ParsedArgs {
        op_mode,
        input_filename,
        output_filename,
        page_exp,
        index_exp,
        nb_workers,
        clobber,
        exit_early,
        exe_name: exe_name.to_string(),
    })
}

fn require_value<'a>(argv: &'a [String], at: usize, flag: &str) -> anyhow::Result<&'a str> {
    argv.get(at).map(String::as_str).ok_or_else(|| anyhow!("bad usage: {flag} requires an argument"))
}

/// Resolves the output path per spec.md §6's default-path rules, when `-o`
/// was not given.
pub fn default_output_path(op_mode: OpMode, input: &str) -> String {
    match op_mode {
        OpMode::Compress => format!("{input}.rgz"),
        OpMode::Decompress | OpMode::Inspect => {
            match input.rsplit_once('.') {
                Some((stem, _suffix)) => stem.to_string(),
                None => format!("{input}.out"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_compress_with_defaults() {
        let parsed = parse_args_from("ragzip", &args(&["-i", "input.txt"])).unwrap();
        assert_eq!(parsed.op_mode, OpMode::Compress);
        assert_eq!(parsed.input_filename.as_deref(), Some("input.txt"));
        assert_eq!(parsed.page_exp, config::DEFAULT_PAGE_EXPONENT);
        assert_eq!(parsed.index_exp, config::DEFAULT_INDEX_EXPONENT);
    }

    #[test]
    fn parses_decompress_with_explicit_geometry_and_output() {
        let parsed = parse_args_from("ragzip", &args(&["-d", "-i", "a.rgz", "-o", "a.out", "-P", "14", "-I", "6"])).unwrap();
        assert_eq!(parsed.op_mode, OpMode::Decompress);
        assert_eq!(parsed.page_exp, 14);
        assert_eq!(parsed.index_exp, 6);
        assert_eq!(parsed.output_filename.as_deref(), Some("a.out"));
    }

    #[test]
    fn missing_input_is_a_usage_error() {
        let err = parse_args_from("ragzip", &args(&["--clobber"])).unwrap_err();
        assert!(err.to_string().starts_with("bad usage: "));
    }

    #[test]
    fn unrecognized_flag_is_a_usage_error() {
        let err = parse_args_from("ragzip", &args(&["--not-a-flag"])).unwrap_err();
        assert!(err.to_string().starts_with("bad usage: "));
    }

    #[test]
    fn help_flag_exits_early_without_requiring_input() {
        let parsed = parse_args_from("ragzip", &args(&["-h"])).unwrap();
        assert!(parsed.exit_early);
    }

    #[test]
    fn inspect_mode_does_not_require_output() {
        let parsed = parse_args_from("ragzip", &args(&["-s", "-i", "a.rgz"])).unwrap();
        assert_eq!(parsed.op_mode, OpMode::Inspect);
    }

    #[test]
    fn default_output_path_appends_and_strips_suffix() {
        assert_eq!(default_output_path(OpMode::Compress, "notes.txt"), "notes.txt.rgz");
        assert_eq!(default_output_path(OpMode::Decompress, "notes.txt.rgz"), "notes.txt");
    }
}
