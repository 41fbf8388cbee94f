//! Address allocation for matrices in the PIM window
//!
//! Every matrix gets `dimension^2 * element_size` bytes from a bump cursor that
//! starts at the configured base and only moves forward. Nothing is reused within
//! one compilation.

use std::collections::{HashMap, HashSet};

use crate::ast::{Item, Program};
use crate::error::{CompileError, CompileResult};
use crate::hardware::{Address, TargetConfig};

/// Forward-only allocator over the PIM window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpAllocator {
    cursor: u64,
    ceiling: u64,
    block_size: Option<u64>,
}

impl BumpAllocator {
    /// Allocator handing out square `dimension x dimension` blocks
    pub fn new(config: &TargetConfig, dimension: u64) -> Self {
        let block_size = dimension
            .checked_mul(dimension)
            .and_then(|cells| cells.checked_mul(u64::from(config.element_size)));

        Self {
            cursor: u64::from(config.base_address),
            ceiling: u64::from(config.window_high),
            block_size,
        }
    }

    /// Next free address
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Reserve one block for `name`, returning its address and the advanced allocator
    pub fn allocate(self, name: &str) -> CompileResult<(Allocation, Self)> {
        let overflow = |requested| CompileError::MemoryOverflow {
            name: name.to_string(),
            requested,
            cursor: self.cursor,
            ceiling: self.ceiling,
        };

        let size = self.block_size.ok_or_else(|| overflow(u64::MAX))?;
        let end = self
            .cursor
            .checked_add(size)
            .filter(|end| *end <= self.ceiling)
            .ok_or_else(|| overflow(size))?;
        let address = u32::try_from(self.cursor).map_err(|_| overflow(size))?;

        let allocation = Allocation {
            address: Address(address),
            size,
        };
        Ok((allocation, Self { cursor: end, ..self }))
    }
}

/// A block handed out to one matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub address: Address,
    pub size: u64,
}

/// Matrix name to address mapping that remembers insertion order
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    order: Vec<String>,
    entries: HashMap<String, Allocation>,
}

impl AddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`; the first allocation for a name wins
    pub fn insert(&mut self, name: &str, allocation: Allocation) {
        if !self.entries.contains_key(name) {
            self.order.push(name.to_string());
            self.entries.insert(name.to_string(), allocation);
        }
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.entries.get(name).map(|a| a.address)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Allocation)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|a| (name.as_str(), a)))
    }
}

/// Every matrix named in the program, deduplicated, in first-reference order
///
/// Function parameters come before the operands of that function's operations;
/// operations outside any kernel contribute their operands too.
pub fn collect_matrices(program: &Program) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let mut visit = |name: &str| {
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    };

    for item in &program.items {
        match item {
            Item::Function(function) => {
                for param in &function.params {
                    visit(&param.name);
                }
                for operands in function.operations.iter().filter_map(|op| op.operands.as_ref()) {
                    operands.iter().for_each(|m| visit(&m.name));
                }
            }
            Item::MatrixOp(op) => {
                if let Some(operands) = &op.operands {
                    operands.iter().for_each(|m| visit(&m.name));
                }
            }
            Item::MemoryOp(_) => {}
        }
    }

    names
}

/// Allocate every name in order, failing the whole pass on overflow
pub fn allocate_all(
    names: &[String],
    mut allocator: BumpAllocator,
) -> CompileResult<(AddressTable, BumpAllocator)> {
    let mut table = AddressTable::new();

    for name in names {
        if table.contains(name) {
            continue;
        }
        let (allocation, next) = allocator.allocate(name)?;
        log::debug!("Matrix {} mapped to {}", name, allocation.address);
        table.insert(name, allocation);
        allocator = next;
    }

    Ok((table, allocator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Function, MatrixDecl, MatrixOp, Operands};
    use pretty_assertions::assert_eq;

    fn decl(name: &str) -> MatrixDecl {
        MatrixDecl::new(name, 1)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bump_allocation() {
        let config = TargetConfig::default();
        let allocator = BumpAllocator::new(&config, 3);

        let (a, allocator) = allocator.allocate("A").unwrap();
        let (b, allocator) = allocator.allocate("B").unwrap();
        assert_eq!(a.address, Address(0x1000));
        assert_eq!(a.size, 36);
        assert_eq!(b.address, Address(0x1024));
        assert_eq!(allocator.cursor(), 0x1048);
    }

    #[test]
    fn test_allocation_is_monotonic() {
        let config = TargetConfig::default();
        let list = names(&["A", "B", "C", "D", "E"]);
        let (table, _) = allocate_all(&list, BumpAllocator::new(&config, 7)).unwrap();

        let entries: Vec<_> = table.iter().collect();
        for pair in entries.windows(2) {
            let (_, first) = pair[0];
            let (_, second) = pair[1];
            assert!(u64::from(first.address.0) + first.size <= u64::from(second.address.0));
        }
        assert!(entries
            .iter()
            .all(|(_, a)| u64::from(a.address.0) + a.size <= u64::from(config.window_high)));
    }

    #[test]
    fn test_overflow_boundary() {
        let config = TargetConfig::default();
        // 59 blocks of 1 KiB (dimension 16) fit in 0xEFFF bytes, 60 do not
        let fits: Vec<String> = (0..59).map(|i| format!("M{}", i)).collect();
        assert!(allocate_all(&fits, BumpAllocator::new(&config, 16)).is_ok());

        let too_many: Vec<String> = (0..60).map(|i| format!("M{}", i)).collect();
        let err = allocate_all(&too_many, BumpAllocator::new(&config, 16)).unwrap_err();
        assert!(matches!(err, CompileError::MemoryOverflow { ref name, .. } if name == "M59"));
    }

    #[test]
    fn test_huge_dimension_overflows() {
        let config = TargetConfig::default();
        let err = BumpAllocator::new(&config, u64::MAX).allocate("A").unwrap_err();
        assert!(matches!(err, CompileError::MemoryOverflow { .. }));
    }

    #[test]
    fn test_zero_dimension() {
        let config = TargetConfig::default();
        let (table, _) =
            allocate_all(&names(&["A", "B"]), BumpAllocator::new(&config, 0)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.address("A"), Some(Address(0x1000)));
        assert_eq!(table.address("B"), Some(Address(0x1000)));
    }

    #[test]
    fn test_collect_first_reference_order() {
        let mut kernel = Function::new("multiply", 3);
        kernel.params = vec![decl("B"), decl("A")];
        kernel.operations.push(MatrixOp::multiply(
            5,
            Some(Operands {
                left: decl("A"),
                right: decl("B"),
                result: decl("Z"),
            }),
        ));

        let program = Program {
            items: vec![
                Item::MatrixOp(MatrixOp::multiply(1, None)),
                Item::Function(kernel),
                Item::MatrixOp(MatrixOp::multiply(
                    9,
                    Some(Operands {
                        left: decl("Q"),
                        right: decl("B"),
                        result: decl("A"),
                    }),
                )),
            ],
        };

        assert_eq!(collect_matrices(&program), names(&["B", "A", "Z", "Q"]));
    }
}
