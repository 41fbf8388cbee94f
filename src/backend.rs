//! Validation and emission of finished instruction lists

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{CompileError, CompileResult};

/// Structural counts over an instruction list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsaReport {
    /// `PROG` lines opening a microcode definition
    pub definitions: usize,
    /// `END <name>` lines closing a definition
    pub definition_ends: usize,
    /// `EXE <OPCODE> ...` lines inside definitions
    pub micro_ops: usize,
    /// `EXE r<n>, ...` lines invoking programmed microcode
    pub executions: usize,
    /// Bare `END` lines
    pub terminators: usize,
    /// Execution records naming a register nothing was programmed into
    pub unprogrammed: Vec<String>,
    /// Whether the list ends with its single terminator
    pub terminated: bool,
}

impl IsaReport {
    /// Advisory signal; the list is emitted either way
    pub fn is_well_formed(&self) -> bool {
        self.definitions == self.definition_ends
            && self.unprogrammed.is_empty()
            && self.terminators == 1
            && self.terminated
    }
}

/// Count paired structures in an instruction list, ignoring blanks and comments
pub fn validate<S: AsRef<str>>(instructions: &[S]) -> IsaReport {
    let mut report = IsaReport::default();
    let mut programmed = Vec::new();
    let mut last = None;

    for line in instructions.iter().map(AsRef::as_ref) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        last = Some(line);

        let mut words = line.split_whitespace();
        match words.next() {
            Some("PROG") => {
                report.definitions += 1;
                if let Some(register) = words.next() {
                    programmed.push(register.trim_end_matches(',').to_string());
                }
            }
            Some("EXE") => match words.next() {
                Some(target) if is_register(target.trim_end_matches(',')) => {
                    report.executions += 1;
                    let register = target.trim_end_matches(',');
                    if !programmed.iter().any(|r| r == register) {
                        report.unprogrammed.push(register.to_string());
                    }
                }
                _ => report.micro_ops += 1,
            },
            Some("END") => {
                if words.next().is_some() {
                    report.definition_ends += 1;
                } else {
                    report.terminators += 1;
                }
            }
            _ => {}
        }
    }

    report.terminated = last == Some("END");
    report
}

/// `r` followed by digits
fn is_register(word: &str) -> bool {
    word.strip_prefix('r')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Write one instruction per line to `path`
pub fn emit<S: AsRef<str>>(instructions: &[S], path: impl AsRef<Path>) -> CompileResult<()> {
    let path = path.as_ref();
    let io_error = |source| CompileError::WriteOutput {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    for instruction in instructions {
        writeln!(writer, "{}", instruction.as_ref()).map_err(io_error)?;
    }
    writer.flush().map_err(io_error)?;

    log::info!("ISA instructions successfully written to {}", path.display());
    Ok(())
}
