//! Vesper: a dynamically-typed, class-based scripting language.
//!
//! Source text is compiled straight to bytecode in a single pass — there is
//! no AST — and executed on a stack-based virtual machine with closures,
//! classes, single inheritance, and a tracing garbage collector.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod lexer;
pub mod repl;
pub mod span;
pub mod vm;

use error::VesperError;
use vm::Vm;

/// Run a Vesper program from source code.
pub fn run(source: &str) -> Result<(), VesperError> {
    run_with_options(source, false)
}

/// Run a Vesper program, optionally printing a disassembly of the compiled
/// bytecode before execution.
pub fn run_with_options(source: &str, disassemble: bool) -> Result<(), VesperError> {
    let mut vm = Vm::new();
    vm.interpret_with(source, disassemble)
}

/// Run a Vesper program from a file path.
pub fn run_file(path: &std::path::Path, disassemble: bool) -> Result<(), VesperError> {
    let source = std::fs::read_to_string(path)?;
    run_with_options(&source, disassemble)
}

/// Compile source on a fresh heap and return its disassembly without
/// executing anything.
pub fn disassemble(source: &str) -> Result<String, VesperError> {
    let mut heap = vm::Heap::new();
    let script = vm::compile(source, &mut heap)?;
    Ok(vm::disassemble(&heap, script))
}
