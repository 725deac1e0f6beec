//! Single-pass bytecode compiler.
//!
//! Parsing and code generation happen in the same pass: the compiler pulls
//! tokens from the scanner with one token of lookahead and emits into the
//! current function's chunk as it goes. There is no AST. Variable resolution
//! happens at compile time — locals become stack slot indices, captured
//! variables become upvalue indices, everything else falls back to a global
//! name lookup.
//!
//! Nested function bodies are compiled on an explicit stack of
//! [`FunctionContext`]s; upvalue resolution walks that stack outward.

use crate::error::{CompileError, CompileErrors};
use crate::lexer::{Scanner, Token, TokenKind};

use super::heap::Heap;
use super::object::{Obj, ObjFunction, ObjRef, UpvalueDescriptor};
use super::opcode::Op;
use super::value::Value;

/// Locals and upvalues are addressed by a single byte.
const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;

/// Sentinel depth for a local whose initializer is still being compiled.
const UNINITIALIZED: i32 = -1;

/// Compile a whole script, producing the top-level function.
///
/// Every diagnostic encountered is collected; if any were recorded the
/// result is an error and no bytecode escapes.
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, CompileErrors> {
    let mut compiler = Compiler::new(source, heap);
    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    let function = compiler.pop_context();
    if compiler.had_error {
        Err(CompileErrors(compiler.errors))
    } else {
        Ok(compiler.heap.alloc(Obj::Function(function)))
    }
}

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub(crate) struct Local {
    pub name: String,
    /// Scope depth, or [`UNINITIALIZED`] until the initializer completes.
    pub depth: i32,
    /// Captured by a nested closure; close its upvalue on scope exit.
    pub is_captured: bool,
}

/// What kind of function body is being compiled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

/// Per-function compilation state; nested function literals push one.
pub(crate) struct FunctionContext {
    pub function: ObjFunction,
    pub kind: FunctionKind,
    pub locals: Vec<Local>,
    pub scope_depth: i32,
    pub upvalues: Vec<UpvalueDescriptor>,
}

impl FunctionContext {
    fn new(function: ObjFunction, kind: FunctionKind) -> Self {
        // Slot 0 belongs to the callee: it holds `this` in methods and is
        // unnameable otherwise.
        let slot_zero = Local {
            name: if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
                "this".to_string()
            } else {
                String::new()
            },
            depth: 0,
            is_captured: false,
        };
        Self {
            function,
            kind,
            locals: vec![slot_zero],
            scope_depth: 0,
            upvalues: Vec::new(),
        }
    }
}

/// Innermost-class state for `this`/`super` validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassContext {
    pub has_superclass: bool,
}

/// The compiler: token stream in, function objects out.
pub struct Compiler<'src, 'h> {
    scanner: Scanner<'src>,
    pub(crate) heap: &'h mut Heap,
    pub(crate) previous: Token,
    pub(crate) current: Token,
    pub(crate) had_error: bool,
    pub(crate) panic_mode: bool,
    pub(crate) errors: Vec<CompileError>,
    pub(crate) contexts: Vec<FunctionContext>,
    pub(crate) classes: Vec<ClassContext>,
}

impl<'src, 'h> Compiler<'src, 'h> {
    pub(crate) fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        let script = FunctionContext::new(ObjFunction::new(None), FunctionKind::Script);
        Self {
            scanner: Scanner::new(source),
            heap,
            previous: Token::eof(0, 1, 1),
            current: Token::eof(0, 1, 1),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            contexts: vec![script],
            classes: Vec::new(),
        }
    }

    // --- Token plumbing ---

    pub(crate) fn advance(&mut self) {
        self.previous = self.current.clone();
        loop {
            match self.scanner.scan_token() {
                Ok(token) => {
                    self.current = token;
                    break;
                }
                Err(err) => {
                    let line = err.span().line;
                    self.report(CompileError::plain(line, err.message()));
                }
            }
        }
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.current.kind == *kind
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(&kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    /// Consume an identifier token and return its name.
    pub(crate) fn consume_identifier(&mut self, message: &str) -> String {
        if let TokenKind::Identifier(name) = self.current.kind.clone() {
            self.advance();
            name
        } else {
            self.error_at_current(message);
            String::new()
        }
    }

    // --- Error reporting ---

    /// Report at the just-consumed token.
    pub(crate) fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    /// Report at the lookahead token.
    pub(crate) fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        let err = if token.kind == TokenKind::Eof {
            CompileError::at_end(token.line(), message)
        } else {
            CompileError::at_token(token.line(), token.kind.to_string(), message)
        };
        self.report(err);
    }

    /// Record a diagnostic unless already panicking; the first error in a
    /// synchronization window wins, the rest are swallowed.
    fn report(&mut self, err: CompileError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.errors.push(err);
    }

    // --- Emit helpers ---

    pub(crate) fn context(&self) -> &FunctionContext {
        self.contexts.last().expect("compiler context stack empty")
    }

    pub(crate) fn context_mut(&mut self) -> &mut FunctionContext {
        self.contexts.last_mut().expect("compiler context stack empty")
    }

    pub(crate) fn emit(&mut self, op: Op) {
        let line = self.previous.line();
        self.context_mut().function.chunk.emit(op, line);
    }

    pub(crate) fn emit_return(&mut self) {
        // A bare `return;` in an initializer yields the instance in slot 0.
        if self.context().kind == FunctionKind::Initializer {
            self.emit(Op::GetLocal(0));
        } else {
            self.emit(Op::Nil);
        }
        self.emit(Op::Return);
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        match self.context_mut().function.chunk.add_constant(value) {
            Some(idx) => idx,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit(Op::Constant(idx));
    }

    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.heap.intern(name);
        self.make_constant(Value::Obj(r))
    }

    /// Emit a jump with a placeholder distance; returns its offset.
    pub(crate) fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(op);
        self.context().function.chunk.len() - 1
    }

    /// Backpatch the jump at `offset` to land just past the current end.
    pub(crate) fn patch_jump(&mut self, offset: usize) {
        let jump = self.context().function.chunk.len() - offset - 1;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
            return;
        }
        self.context_mut()
            .function
            .chunk
            .patch_jump(offset, jump as u16);
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        let offset = self.context().function.chunk.len() - loop_start + 1;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
            return;
        }
        self.emit(Op::Loop(offset as u16));
    }

    // --- Scope management ---

    pub(crate) fn begin_scope(&mut self) {
        self.context_mut().scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self) {
        self.context_mut().scope_depth -= 1;
        loop {
            let (pop, captured) = {
                let ctx = self.context();
                match ctx.locals.last() {
                    Some(local) if local.depth > ctx.scope_depth => (true, local.is_captured),
                    _ => (false, false),
                }
            };
            if !pop {
                break;
            }
            // A captured local's value must outlive the slot.
            if captured {
                self.emit(Op::CloseUpvalue);
            } else {
                self.emit(Op::Pop);
            }
            self.context_mut().locals.pop();
        }
    }

    // --- Variables ---

    pub(crate) fn add_local(&mut self, name: &str) {
        if self.context().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.context_mut().locals.push(Local {
            name: name.to_string(),
            depth: UNINITIALIZED,
            is_captured: false,
        });
    }

    /// Reserve a local for `name`, rejecting duplicates in the same scope.
    pub(crate) fn declare_variable(&mut self, name: &str) {
        if self.context().scope_depth == 0 {
            return; // globals are late-bound by name
        }
        let mut duplicate = false;
        {
            let ctx = self.context();
            for local in ctx.locals.iter().rev() {
                if local.depth != UNINITIALIZED && local.depth < ctx.scope_depth {
                    break;
                }
                if local.name == name {
                    duplicate = true;
                    break;
                }
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    pub(crate) fn mark_initialized(&mut self) {
        let ctx = self.context_mut();
        if ctx.scope_depth == 0 {
            return;
        }
        if let Some(local) = ctx.locals.last_mut() {
            local.depth = ctx.scope_depth;
        }
    }

    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.context().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit(Op::DefineGlobal(global));
    }

    /// Parse a variable name; returns its global-name constant (0 for
    /// locals, which live on the stack instead).
    pub(crate) fn parse_variable(&mut self, message: &str) -> (u8, String) {
        let name = self.consume_identifier(message);
        self.declare_variable(&name);
        if self.context().scope_depth > 0 {
            return (0, name);
        }
        (self.identifier_constant(&name), name)
    }

    /// Search a context's locals back-to-front; innermost shadow wins.
    pub(crate) fn resolve_local(&mut self, ctx: usize, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (i, local) in self.contexts[ctx].locals.iter().enumerate().rev() {
            if local.name == name && !local.name.is_empty() {
                if local.depth == UNINITIALIZED {
                    uninitialized = true;
                }
                found = Some(i as u8);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    /// Resolve `name` as a capture of an enclosing function's local or
    /// upvalue, threading the capture through every context in between.
    pub(crate) fn resolve_upvalue(&mut self, ctx: usize, name: &str) -> Option<u8> {
        if ctx == 0 {
            return None;
        }
        if let Some(local) = self.resolve_local(ctx - 1, name) {
            self.contexts[ctx - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(ctx, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(ctx - 1, name) {
            return Some(self.add_upvalue(ctx, upvalue, false));
        }
        None
    }

    fn add_upvalue(&mut self, ctx: usize, index: u8, is_local: bool) -> u8 {
        // Duplicate captures of the same slot share one upvalue.
        for (i, upvalue) in self.contexts[ctx].upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return i as u8;
            }
        }
        if self.contexts[ctx].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        let idx = self.contexts[ctx].upvalues.len();
        self.contexts[ctx]
            .upvalues
            .push(UpvalueDescriptor { is_local, index });
        idx as u8
    }

    // --- Function compilation ---

    pub(crate) fn push_context(&mut self, kind: FunctionKind, name: &str) {
        let name_ref = self.heap.intern(name);
        let function = ObjFunction::new(Some(name_ref));
        self.contexts.push(FunctionContext::new(function, kind));
    }

    /// Finish the current function: emit the implicit return and hand back
    /// the finished object with its upvalue descriptors.
    pub(crate) fn pop_context(&mut self) -> ObjFunction {
        self.emit_return();
        let ctx = self.contexts.pop().expect("compiler context stack empty");
        let mut function = ctx.function;
        function.upvalues = ctx.upvalues;
        function
    }

    /// Compile a function body (parameters + block) and emit the closure.
    pub(crate) fn function(&mut self, kind: FunctionKind, name: &str) {
        self.push_context(kind, name);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.context().function.arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.context_mut().function.arity += 1;
                }
                let (constant, _) = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: unwinding the frame discards every slot at once.
        let function = self.pop_context();
        let fref = self.heap.alloc(Obj::Function(function));
        let idx = self.make_constant(Value::Obj(fref));
        self.emit(Op::Closure(idx));
    }
}
