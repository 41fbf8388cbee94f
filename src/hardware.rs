//! Target description for the PIM accelerator
//!
//! The accelerator exposes a flat memory window and a handful of cores whose
//! behaviour is programmed with microcode (`PROG ... END <name>`) and then invoked
//! by register (`EXE r2, ...`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Configuration for the PIM memory window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Lowest address of the window declared by `ALLOCATE`
    pub window_low: u32,
    /// Highest address of the window; no allocation may end past it
    pub window_high: u32,
    /// First address handed out to matrices
    pub base_address: u32,
    /// Bytes per matrix element
    pub element_size: u32,
}

impl TargetConfig {
    pub fn new(window_low: u32, window_high: u32, base_address: u32, element_size: u32) -> Self {
        Self {
            window_low,
            window_high,
            base_address,
            element_size,
        }
    }

    /// 64 KiB window, matrices from 0x1000, 32-bit elements
    pub fn default_pim() -> Self {
        Self::new(0x0000, 0xFFFF, 0x1000, 4)
    }

    /// Load a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompileError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config: TargetConfig = serde_json::from_str(&text)
            .map_err(|e| CompileError::config(format!("'{}': {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CompileResult<()> {
        if self.window_low > self.window_high {
            return Err(CompileError::config(format!(
                "window {} .. {} is empty",
                Address(self.window_low),
                Address(self.window_high)
            )));
        }
        if self.base_address < self.window_low || self.base_address > self.window_high {
            return Err(CompileError::config(format!(
                "base address {} lies outside the window",
                Address(self.base_address)
            )));
        }
        if self.element_size == 0 {
            return Err(CompileError::config("element size must be non-zero"));
        }
        Ok(())
    }

    /// Bytes available for matrices
    pub fn capacity(&self) -> u64 {
        u64::from(self.window_high.saturating_sub(self.base_address))
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::default_pim()
    }
}

/// A byte address inside the PIM window, printed as `0x` plus at least four hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Address(pub u32);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Core register holding a programmed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Register(pub u8);

impl Register {
    /// Holds the multiply-accumulate primitive
    pub const MAC: Register = Register(0);
    /// Holds the matrix-multiply primitive
    pub const MATMUL: Register = Register(2);
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Micro-operations available inside a microcode definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MicroOpcode {
    Add,
    Mul,
    Zero,
    Read,
    Write,
}

impl std::fmt::Display for MicroOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MicroOpcode::Add => "ADD",
            MicroOpcode::Mul => "MUL",
            MicroOpcode::Zero => "ZERO",
            MicroOpcode::Read => "READ",
            MicroOpcode::Write => "WRITE",
        };
        write!(f, "{}", name)
    }
}

/// One line of the instruction file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Instruction {
    /// `# text`
    Comment(String),
    /// Section separator
    Blank,
    /// `ALLOCATE <low> <high>`
    Allocate { low: Address, high: Address },
    /// `PROG <reg>, <name>` opens a microcode definition
    Prog { register: Register, name: String },
    /// `EXE <OP> <operands>` inside a definition, with an optional trailing note
    MicroOp {
        opcode: MicroOpcode,
        operands: Vec<String>,
        note: Option<String>,
    },
    /// `EXE <reg>, <left>, <right>, <result>, <dim>` invokes programmed microcode
    Execute {
        register: Register,
        left: Address,
        right: Address,
        result: Address,
        dimension: u64,
    },
    /// `END <name>` closes a microcode definition
    EndDefinition(String),
    /// `FREE <address> <size>`
    Free { address: Address, size: u64 },
    /// Bare `END` terminating the program
    End,
}

impl Instruction {
    pub fn comment(text: impl Into<String>) -> Self {
        Instruction::Comment(text.into())
    }

    pub fn micro(opcode: MicroOpcode, operands: &[&str], note: &str) -> Self {
        Instruction::MicroOp {
            opcode,
            operands: operands.iter().map(|s| s.to_string()).collect(),
            note: Some(note.to_string()),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Comment(text) => write!(f, "# {}", text),
            Instruction::Blank => Ok(()),
            Instruction::Allocate { low, high } => write!(f, "ALLOCATE {} {}", low, high),
            Instruction::Prog { register, name } => write!(f, "PROG {}, {}", register, name),
            Instruction::MicroOp {
                opcode,
                operands,
                note,
            } => {
                let body = format!("EXE {} {}", opcode, operands.join(", "));
                match note {
                    Some(note) => write!(f, "{:<28}# {}", body, note),
                    None => write!(f, "{}", body),
                }
            }
            Instruction::Execute {
                register,
                left,
                right,
                result,
                dimension,
            } => write!(
                f,
                "EXE {}, {}, {}, {}, {}",
                register, left, right, result, dimension
            ),
            Instruction::EndDefinition(name) => write!(f, "END {}", name),
            Instruction::Free { address, size } => write!(f, "FREE {} {}", address, size),
            Instruction::End => write!(f, "END"),
        }
    }
}

/// Multiply-accumulate microcode: a 2-part x 2-part product for wide accumulation
pub fn mac_template() -> Vec<Instruction> {
    use MicroOpcode::{Add, Mul};

    vec![
        Instruction::comment("Define the MAC (Multiply-Accumulate) operation for dot product"),
        Instruction::comment("First program the MAC function into the pPIM core"),
        Instruction::Prog {
            register: Register::MAC,
            name: "mac_operation".to_string(),
        },
        Instruction::comment("MAC operation microcode"),
        Instruction::micro(Mul, &["r1", "ah", "bh"], "Multiply high bits"),
        Instruction::micro(Mul, &["r2", "al", "bl"], "Multiply low bits"),
        Instruction::micro(Mul, &["r3", "ah", "bl"], "Multiply high with low"),
        Instruction::micro(Mul, &["r4", "al", "bh"], "Multiply low with high"),
        Instruction::micro(Add, &["r5", "r3", "r4"], "Combine cross products"),
        Instruction::micro(Add, &["r6", "r1", "r2"], "Combine direct products"),
        Instruction::micro(Add, &["r0", "r5", "r6"], "Final result"),
        Instruction::EndDefinition("mac_operation".to_string()),
        Instruction::Blank,
    ]
}

/// Matrix-multiply microcode annotated with the square dimension
pub fn matmul_template(dimension: u64) -> Vec<Instruction> {
    use MicroOpcode::{Add, Mul, Read, Write, Zero};

    vec![
        Instruction::comment("Define a matrix multiplication operation"),
        Instruction::comment("Program the matrix multiplication function into the pPIM core"),
        Instruction::Prog {
            register: Register::MATMUL,
            name: "matrix_multiply".to_string(),
        },
        Instruction::comment("Matrix multiplication microcode"),
        Instruction::micro(Add, &["r0", "r1", "r2"], "Addition operation: r0 = r1 + r2"),
        Instruction::micro(Mul, &["r0", "r1", "r2"], "Multiplication operation: r0 = r1 * r2"),
        Instruction::micro(Zero, &["r0"], "Zero register: r0 = 0"),
        Instruction::comment(format!(
            "Matrix multiplication implementation for {}x{} matrices",
            dimension, dimension
        )),
        Instruction::comment("For each element of the result matrix"),
        Instruction::comment("Z[i][j] = sum(X[i][k] * Y[k][j]) for all k"),
        Instruction::micro(Zero, &["acc"], "Initialize accumulator to 0"),
        Instruction::micro(Read, &["r1", "X_addr[i][k]"], "Load X[i][k]"),
        Instruction::micro(Read, &["r2", "Y_addr[k][j]"], "Load Y[k][j]"),
        Instruction::micro(Mul, &["r3", "r1", "r2"], "r3 = X[i][k] * Y[k][j]"),
        Instruction::micro(Add, &["acc", "acc", "r3"], "acc += r3"),
        Instruction::micro(Write, &["Z_addr[i][j]", "acc"], "Store result to Z[i][j]"),
        Instruction::EndDefinition("matrix_multiply".to_string()),
        Instruction::Blank,
    ]
}

/// A complete instruction stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IsaProgram {
    pub instructions: Vec<Instruction>,
}

impl IsaProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn extend(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.extend(instructions);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Render every instruction as one output line
    pub fn lines(&self) -> Vec<String> {
        self.instructions.iter().map(ToString::to_string).collect()
    }

    /// Number of `EXE <reg>, ...` invocations
    pub fn execution_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Execute { .. }))
            .count()
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for IsaProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = TargetConfig::default();
        assert_eq!(config.base_address, 0x1000);
        assert_eq!(config.capacity(), 0xEFFF);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(TargetConfig::new(0x2000, 0xFFFF, 0x1000, 4).validate().is_err());
        assert!(TargetConfig::new(0, 0xFFFF, 0x1000, 0).validate().is_err());
        assert!(TargetConfig::new(0x10, 0x0, 0x10, 4).validate().is_err());
    }

    #[test]
    fn test_partial_json_config_keeps_defaults() {
        let config: TargetConfig = serde_json::from_str(r#"{ "element_size": 8 }"#).unwrap();
        assert_eq!(config.element_size, 8);
        assert_eq!(config.window_high, 0xFFFF);
    }

    #[test]
    fn test_address_format() {
        assert_eq!(Address(0x1000).to_string(), "0x1000");
        assert_eq!(Address(0x24).to_string(), "0x0024");
        assert_eq!(Address(0x12345).to_string(), "0x12345");
    }

    #[test]
    fn test_instruction_lines() {
        let exe = Instruction::Execute {
            register: Register::MATMUL,
            left: Address(0x1000),
            right: Address(0x1024),
            result: Address(0x1048),
            dimension: 3,
        };
        assert_eq!(exe.to_string(), "EXE r2, 0x1000, 0x1024, 0x1048, 3");
        assert_eq!(
            Instruction::Free {
                address: Address(0x1000),
                size: 36
            }
            .to_string(),
            "FREE 0x1000 36"
        );
        assert_eq!(Instruction::Blank.to_string(), "");
        assert_eq!(Instruction::End.to_string(), "END");
        assert_eq!(
            Instruction::micro(MicroOpcode::Zero, &["acc"], "Initialize").to_string(),
            "EXE ZERO acc                # Initialize"
        );
    }

    #[test]
    fn test_json_export() {
        let mut isa = IsaProgram::new();
        isa.push(Instruction::Free {
            address: Address(0x1000),
            size: 36,
        });
        isa.push(Instruction::End);

        let json: serde_json::Value = serde_json::from_str(&isa.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "instructions": [
                    { "Free": { "address": 4096, "size": 36 } },
                    "End"
                ]
            })
        );
    }

    #[test]
    fn test_templates_are_closed() {
        let mac = mac_template();
        assert!(matches!(mac[2], Instruction::Prog { register: Register::MAC, .. }));
        assert_eq!(
            mac[mac.len() - 2],
            Instruction::EndDefinition("mac_operation".to_string())
        );

        let matmul = matmul_template(4);
        assert!(matmul
            .iter()
            .any(|i| i.to_string() == "# Matrix multiplication implementation for 4x4 matrices"));
        assert_eq!(
            matmul[matmul.len() - 2],
            Instruction::EndDefinition("matrix_multiply".to_string())
        );
    }
}
