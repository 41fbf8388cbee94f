//! C Matrix Kernel to PIM ISA Compiler CLI
//!
//! Usage:
//!   pimc kernel.c -o kernel.isa
//!   RUST_LOG=debug pimc kernel.c -o kernel.isa
//!   PIMC_TARGET_CONFIG=target.json pimc kernel.c -o kernel.isa

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser as ClapParser};
use colored::Colorize;
use std::borrow::Cow;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pim_compiler::{backend, compile, CompileError, CompileResult, TargetConfig};

/// Environment variable naming a JSON target description
const TARGET_CONFIG_ENV: &str = "PIMC_TARGET_CONFIG";

#[derive(ClapParser, Debug)]
#[command(name = "pimc")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Compiles C matrix-multiply kernels to PIM ISA instructions")]
struct Args {
    /// C source file containing the kernel
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Instruction file to write
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: PathBuf,
}

/// Parse the command line, accepting only `pimc <INPUT> -o <OUTPUT>` in that order
fn parse_args<I, T>(argv: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let args = Args::try_parse_from(argv.iter().cloned())?;

    if argv.len() != 4 || argv[2] != "-o" {
        return Err(Args::command().error(
            ErrorKind::WrongNumberOfValues,
            "expected exactly: pimc <INPUT> -o <OUTPUT>",
        ));
    }
    Ok(args)
}

fn main() {
    let args = parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn target_config() -> CompileResult<TargetConfig> {
    match std::env::var_os(TARGET_CONFIG_ENV) {
        Some(path) => {
            log::info!("Loading target configuration from {}", Path::new(&path).display());
            TargetConfig::from_json_file(path)
        }
        None => Ok(TargetConfig::default()),
    }
}

/// Read the whole input as text; bytes that are not UTF-8 become U+FFFD
fn read_source(path: &Path) -> CompileResult<(String, usize)> {
    let bytes = fs::read(path).map_err(|source| CompileError::ReadInput {
        path: path.display().to_string(),
        source,
    })?;

    let source = match String::from_utf8_lossy(&bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            log::warn!("{} is not valid UTF-8; invalid bytes were replaced", path.display());
            text
        }
    };
    Ok((source, bytes.len()))
}

fn run(args: &Args) -> CompileResult<()> {
    let start = Instant::now();

    println!("{}", "C Matrix Kernel to PIM ISA Compiler".bold().blue());
    println!("{}", "=".repeat(36));
    println!();

    let (source, size) = read_source(&args.input)?;
    println!("{}: {} ({} bytes)", "Input".green(), args.input.display(), size);

    let config = target_config()?;
    let compilation = compile(&source, &config)?;

    println!("{}: {}", "Tokens".cyan(), compilation.token_count);
    println!(
        "{}: {}x{}",
        "Matrix size".cyan(),
        compilation.dimension,
        compilation.dimension
    );
    println!("{}: {}", "AST nodes".cyan(), compilation.program.items.len());
    println!("{}: {}", "Kernel operations".cyan(), compilation.program.kernel_count());
    println!("{}: {}", "Instructions".cyan(), compilation.isa.len());

    if !compilation.diagnostics.is_empty() {
        println!(
            "{}: {} construct(s) skipped",
            "Warning".yellow(),
            compilation.diagnostics.len()
        );
    }

    let lines = compilation.isa.lines();
    let report = backend::validate(&lines);
    if !report.is_well_formed() {
        println!(
            "{}: instruction list is unbalanced \
             ({} PROG / {} END, {} unprogrammed EXE, {} terminator(s))",
            "Warning".yellow(),
            report.definitions,
            report.definition_ends,
            report.unprogrammed.len(),
            report.terminators
        );
    }

    backend::emit(&lines, &args.output)?;

    println!();
    println!("{}", "Compilation Results".bold().green());
    println!("{}", "=".repeat(50));
    println!("{}: {}", "Output".cyan(), args.output.display());
    println!("{}: {} ms", "Elapsed".cyan(), start.elapsed().as_millis());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KERNEL: &str = include_str!("../demos/multiply_n.c");

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pimc-{}-{}", std::process::id(), name))
    }

    fn args(input: &Path, output: &Path) -> Args {
        Args {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        }
    }

    #[test]
    fn test_accepts_input_flag_output() {
        let args = parse_args(["pimc", "kernel.c", "-o", "kernel.isa"]).unwrap();
        assert_eq!(args.input, PathBuf::from("kernel.c"));
        assert_eq!(args.output, PathBuf::from("kernel.isa"));
    }

    #[test]
    fn test_rejects_other_shapes() {
        let invalid: &[&[&str]] = &[
            &["pimc"],
            &["pimc", "kernel.c"],
            &["pimc", "kernel.c", "kernel.isa"],
            &["pimc", "kernel.c", "-o"],
            &["pimc", "kernel.c", "-o/tmp/kernel.isa"],
            &["pimc", "-o", "kernel.isa", "kernel.c"],
            &["pimc", "kernel.c", "-o", "kernel.isa", "extra.c"],
        ];
        for argv in invalid {
            assert!(parse_args(argv.iter().copied()).is_err(), "accepted {:?}", argv);
        }
    }

    #[test]
    fn test_run_writes_output() {
        let input = scratch("ok.c");
        let output = scratch("ok.isa");
        fs::write(&input, KERNEL).unwrap();

        run(&args(&input, &output)).unwrap();
        let written = fs::read_to_string(&output).unwrap();
        fs::remove_file(&input).ok();
        fs::remove_file(&output).ok();

        assert!(written.contains("EXE r2, 0x1000, 0x1024, 0x1048, 3\n"));
        assert_eq!(written.lines().last(), Some("END"));
    }

    #[test]
    fn test_unreadable_input_is_fatal() {
        let output = scratch("missing.isa");
        let err = run(&args(&scratch("does-not-exist.c"), &output)).unwrap_err();

        assert!(matches!(err, CompileError::ReadInput { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_overflow_writes_nothing() {
        let input = scratch("overflow.c");
        let output = scratch("overflow.isa");
        fs::write(
            &input,
            "#define N 96\nvoid multiply(int A, int B, int C, int D, int E) { }\n",
        )
        .unwrap();

        let err = run(&args(&input, &output)).unwrap_err();
        fs::remove_file(&input).ok();

        assert!(matches!(err, CompileError::MemoryOverflow { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_latin1_input_still_compiles() {
        let input = scratch("latin1.c");
        let output = scratch("latin1.isa");
        let mut bytes = b"// caf\xe9\n".to_vec();
        bytes.extend_from_slice(KERNEL.as_bytes());
        fs::write(&input, &bytes).unwrap();

        run(&args(&input, &output)).unwrap();
        let written = fs::read_to_string(&output).unwrap();
        fs::remove_file(&input).ok();
        fs::remove_file(&output).ok();

        assert!(written.contains("EXE r2, 0x1000, 0x1024, 0x1048, 3\n"));
    }
}
