//! Code generator for the PIM instruction stream
//!
//! Output layout is fixed regardless of the input:
//! 1. memory window header
//! 2. MAC and matrix-multiply microcode definitions
//! 3. allocation of every matrix the program mentions
//! 4. one execution record per recognized multiply
//! 5. release of every allocated matrix, then `END`
//!
//! Allocation runs over the whole program before any execution record is written,
//! so an operation can name a matrix that is declared somewhere else.

use crate::allocator::{allocate_all, collect_matrices, AddressTable, BumpAllocator};
use crate::ast::{Function, Operands, Program};
use crate::error::{CompileError, CompileResult};
use crate::hardware::{
    mac_template, matmul_template, Address, Instruction, IsaProgram, Register, TargetConfig,
};

/// Code generator for one compilation
pub struct CodeGenerator {
    config: TargetConfig,
    dimension: u64,
    diagnostics: Vec<CompileError>,
}

impl CodeGenerator {
    pub fn new(config: TargetConfig, dimension: u64) -> Self {
        Self {
            config,
            dimension,
            diagnostics: Vec::new(),
        }
    }

    /// Operations that were skipped during generation
    pub fn diagnostics(&self) -> &[CompileError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<CompileError> {
        self.diagnostics
    }

    /// Generate the instruction stream for a recognized program
    pub fn generate(&mut self, program: &Program) -> CompileResult<IsaProgram> {
        log::info!("Starting ISA generation for matrix size {}", self.dimension);
        let mut isa = IsaProgram::new();

        isa.push(Instruction::comment("MEMORY CONFIGURATION"));
        isa.push(Instruction::Allocate {
            low: Address(self.config.window_low),
            high: Address(self.config.window_high),
        });
        isa.push(Instruction::Blank);

        isa.extend(mac_template());
        isa.extend(matmul_template(self.dimension));

        let table = self.allocate(program, &mut isa)?;
        self.execute(program, &table, &mut isa);
        self.release(&table, &mut isa);

        isa.push(Instruction::End);
        log::info!("Generated {} instructions", isa.len());
        Ok(isa)
    }

    /// Allocation pass: assign every matrix an address before anything runs
    fn allocate(&self, program: &Program, isa: &mut IsaProgram) -> CompileResult<AddressTable> {
        let names = collect_matrices(program);
        log::debug!(
            "Identified matrices to allocate: {} ({} bytes available)",
            names.join(" "),
            self.config.capacity()
        );

        let allocator = BumpAllocator::new(&self.config, self.dimension);
        let (table, allocator) = allocate_all(&names, allocator)?;
        log::debug!(
            "Allocated {} matrices, next free address {:#06x}",
            table.len(),
            allocator.cursor()
        );

        isa.push(Instruction::comment("MATRIX ALLOCATIONS"));
        for (name, allocation) in table.iter() {
            isa.push(Instruction::comment(format!(
                "Matrix {} allocated at {}",
                name, allocation.address
            )));
        }
        isa.push(Instruction::Blank);

        Ok(table)
    }

    /// Execution pass: one record per multiply found in a kernel
    fn execute(&mut self, program: &Program, table: &AddressTable, isa: &mut IsaProgram) {
        isa.push(Instruction::comment("MATRIX OPERATIONS"));

        for function in program.functions() {
            self.execute_function(function, table, isa);
        }
    }

    fn execute_function(
        &mut self,
        function: &Function,
        table: &AddressTable,
        isa: &mut IsaProgram,
    ) {
        log::debug!("Processing function: {}", function.name);

        for op in &function.operations {
            let Some(operands) = &op.operands else {
                continue;
            };
            let expression = format!(
                "{} {} {} -> {}",
                operands.left.name, op.operator, operands.right.name, operands.result.name
            );

            match self.resolve(operands, table) {
                Ok(instruction) => {
                    log::debug!("Generating multiplication: {}", expression);
                    let header = format!("MATRIX MULTIPLICATION {}", expression);
                    isa.push(Instruction::comment(header));
                    isa.push(instruction);
                }
                Err(e) => {
                    log::error!("Skipping operation in {}: {}", function.name, e);
                    self.diagnostics.push(e);
                }
            }
        }
    }

    /// Look up all three operand addresses
    fn resolve(&self, operands: &Operands, table: &AddressTable) -> CompileResult<Instruction> {
        let lookup = |name: &str| {
            table
                .address(name)
                .ok_or_else(|| CompileError::UnresolvedOperand {
                    name: name.to_string(),
                    operation: format!(
                        "{} * {} -> {}",
                        operands.left.name, operands.right.name, operands.result.name
                    ),
                })
        };

        Ok(Instruction::Execute {
            register: Register::MATMUL,
            left: lookup(&operands.left.name)?,
            right: lookup(&operands.right.name)?,
            result: lookup(&operands.result.name)?,
            dimension: self.dimension,
        })
    }

    /// Teardown: free every matrix in allocation order
    fn release(&self, table: &AddressTable, isa: &mut IsaProgram) {
        isa.push(Instruction::Blank);
        isa.push(Instruction::comment("MEMORY RELEASE"));
        for (_, allocation) in table.iter() {
            isa.push(Instruction::Free {
                address: allocation.address,
                size: allocation.size,
            });
        }
    }
}
