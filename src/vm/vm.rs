//! The bytecode virtual machine — stack-based execution engine.

use crate::error::{RuntimeError, RuntimeErrorKind, TraceFrame, VesperError};

use super::compiler::compile;
use super::heap::Heap;
use super::object::{Obj, ObjClosure, ObjRef, ObjUpvalue};
use super::opcode::Op;
use super::table::Table;
use super::value::{format_value, Value};

/// Maximum call depth; exceeding it is a "Stack overflow." runtime error.
pub const FRAMES_MAX: usize = 64;
/// Value-stack capacity reserved up front.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// A call frame on the VM call stack.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// Instruction pointer (index into the function's chunk).
    pub ip: usize,
    /// Base index into the value stack: this frame's window. Slot 0 holds
    /// the callee, or the receiver for method calls.
    pub stack_base: usize,
}

/// The bytecode VM. One instance owns its heap, globals and stacks outright;
/// independent VMs never share state.
pub struct Vm {
    /// Value stack, shared across all frames.
    pub stack: Vec<Value>,
    /// Call frame stack.
    pub frames: Vec<CallFrame>,
    /// The object heap (and intern table).
    pub heap: Heap,
    /// Global variables.
    pub globals: Table,
    /// Open upvalues, sorted by descending stack slot so closing scans
    /// stop early.
    pub open_upvalues: Vec<ObjRef>,
    /// Everything printed, captured for tests and embedders.
    pub output: Vec<String>,
    /// Interned `"init"`, looked up on every construction.
    pub(crate) init_string: ObjRef,
}

impl Vm {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            heap,
            globals: Table::new(),
            open_upvalues: Vec::new(),
            output: Vec::new(),
            init_string,
        };
        vm.define_native("clock", 0, native_clock);
        vm
    }

    /// Compile and execute `source`. The VM stays valid afterwards whatever
    /// the outcome: a runtime error resets the stacks, globals persist.
    pub fn interpret(&mut self, source: &str) -> Result<(), VesperError> {
        self.interpret_with(source, false)
    }

    /// Like [`Vm::interpret`], optionally dumping a disassembly of the
    /// freshly compiled script first.
    pub fn interpret_with(&mut self, source: &str, disassemble: bool) -> Result<(), VesperError> {
        let script = compile(source, &mut self.heap)?;
        if disassemble {
            print!("{}", super::disassembler::disassemble(&self.heap, script));
            println!("---");
        }

        let closure = self.heap.alloc(Obj::Closure(ObjClosure::new(script)));
        self.push(Value::Obj(closure));
        self.call_closure(closure, 0)?;
        self.run()?;
        Ok(())
    }

    /// The fetch-decode-execute loop.
    fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let frame_idx = self.frames.len() - 1;
            let ip = self.frames[frame_idx].ip;
            let op = {
                let closure = self.heap.closure(self.frames[frame_idx].closure);
                self.heap.function(closure.function).chunk.code[ip]
            };
            self.frames[frame_idx].ip += 1;

            match op {
                Op::Constant(idx) => {
                    let value = self.read_constant(frame_idx, idx);
                    self.push(value);
                }
                Op::Nil => self.push(Value::Nil),
                Op::True => self.push(Value::Bool(true)),
                Op::False => self.push(Value::Bool(false)),

                Op::Pop => {
                    self.pop();
                }

                Op::GetLocal(slot) => {
                    let base = self.frames[frame_idx].stack_base;
                    let value = self.stack[base + slot as usize];
                    self.push(value);
                }
                Op::SetLocal(slot) => {
                    let value = self.peek(0);
                    let base = self.frames[frame_idx].stack_base;
                    self.stack[base + slot as usize] = value;
                }
                Op::GetGlobal(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value),
                        None => {
                            let text = self.heap.string(name).chars.clone();
                            return Err(
                                self.runtime_error(RuntimeErrorKind::UndefinedVariable(text))
                            );
                        }
                    }
                }
                Op::SetGlobal(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // Assignment may not create globals; undo and report.
                        self.globals.delete(name, hash);
                        let text = self.heap.string(name).chars.clone();
                        return Err(self.runtime_error(RuntimeErrorKind::UndefinedVariable(text)));
                    }
                }
                Op::DefineGlobal(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }

                Op::GetUpvalue(idx) => {
                    let upvalue = self.frame_upvalue(frame_idx, idx);
                    let value = match self.heap.upvalue(upvalue) {
                        ObjUpvalue::Open(slot) => self.stack[*slot],
                        ObjUpvalue::Closed(value) => *value,
                    };
                    self.push(value);
                }
                Op::SetUpvalue(idx) => {
                    let value = self.peek(0);
                    let upvalue = self.frame_upvalue(frame_idx, idx);
                    let open_slot = match self.heap.upvalue_mut(upvalue) {
                        ObjUpvalue::Open(slot) => Some(*slot),
                        ObjUpvalue::Closed(cell) => {
                            *cell = value;
                            None
                        }
                    };
                    if let Some(slot) = open_slot {
                        self.stack[slot] = value;
                    }
                }
                Op::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                Op::GetProperty(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    self.get_property(name, hash)?;
                }
                Op::SetProperty(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    self.set_property(name, hash)?;
                }
                Op::GetSuper(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    let superclass = self
                        .pop()
                        .as_obj()
                        .expect("super slot holds a class");
                    self.bind_method(superclass, name, hash)?;
                }

                Op::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                Op::Greater => self.binary_number_op(|a, b| Value::Bool(a > b))?,
                Op::Less => self.binary_number_op(|a, b| Value::Bool(a < b))?,

                Op::Add => self.add()?,
                Op::Subtract => {
                    self.binary_number_op(|a, b| Value::Number(a - b))?
                }
                Op::Multiply => {
                    self.binary_number_op(|a, b| Value::Number(a * b))?
                }
                Op::Divide => self.binary_number_op(|a, b| Value::Number(a / b))?,
                // Truncating remainder, like the underlying doubles.
                Op::Modulo => self.binary_number_op(|a, b| Value::Number(a % b))?,

                Op::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()));
                }
                Op::Negate => {
                    let value = self.peek(0);
                    match value {
                        Value::Number(n) => {
                            self.pop();
                            self.push(Value::Number(-n));
                        }
                        _ => {
                            return Err(self.runtime_error(RuntimeErrorKind::TypeError(
                                "Operand must be a number.".to_string(),
                            )));
                        }
                    }
                }

                Op::Print => {
                    let value = self.pop();
                    let text = format_value(&self.heap, value);
                    println!("{}", text);
                    self.output.push(text);
                }

                Op::Jump(offset) => {
                    self.frames[frame_idx].ip += offset as usize;
                }
                Op::JumpIfFalse(offset) => {
                    if !self.peek(0).is_truthy() {
                        self.frames[frame_idx].ip += offset as usize;
                    }
                }
                Op::Loop(offset) => {
                    self.frames[frame_idx].ip -= offset as usize;
                }

                Op::Call(argc) => {
                    self.call_value(argc as usize)?;
                }
                Op::Invoke(idx, argc) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    self.invoke(name, hash, argc as usize)?;
                }
                Op::SuperInvoke(idx, argc) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    let superclass = self
                        .pop()
                        .as_obj()
                        .expect("super slot holds a class");
                    self.invoke_from_class(superclass, name, hash, argc as usize)?;
                }
                Op::Closure(idx) => {
                    let fref = self
                        .read_constant(frame_idx, idx)
                        .as_obj()
                        .expect("closure constant is a function");
                    self.make_closure(frame_idx, fref);
                }

                Op::Class(idx) => {
                    let (name, _) = self.read_name(frame_idx, idx);
                    let class = self.alloc(Obj::Class(super::object::ObjClass::new(name)));
                    self.push(Value::Obj(class));
                }
                Op::Method(idx) => {
                    let (name, hash) = self.read_name(frame_idx, idx);
                    self.define_method(name, hash);
                }
                Op::Inherit => self.inherit()?,

                Op::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("frame stack empty on return");
                    self.close_upvalues(frame.stack_base);
                    self.stack.truncate(frame.stack_base);
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.push(result);
                }
            }
        }
    }

    // --- Stack operations ---

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Nil)
    }

    #[inline]
    pub fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // --- Decode helpers ---

    fn read_constant(&self, frame_idx: usize, idx: u8) -> Value {
        let closure = self.heap.closure(self.frames[frame_idx].closure);
        self.heap.function(closure.function).chunk.constants[idx as usize]
    }

    /// Read a name constant: the interned string and its hash.
    fn read_name(&self, frame_idx: usize, idx: u8) -> (ObjRef, u32) {
        let name = self
            .read_constant(frame_idx, idx)
            .as_obj()
            .expect("name constant is a string");
        (name, self.heap.string(name).hash)
    }

    fn frame_upvalue(&self, frame_idx: usize, idx: u8) -> ObjRef {
        self.heap.closure(self.frames[frame_idx].closure).upvalues[idx as usize]
    }

    // --- Arithmetic ---

    fn binary_number_op(
        &mut self,
        op: impl Fn(f64, f64) -> Value,
    ) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(op(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error(RuntimeErrorKind::TypeError(
                "Operands must be numbers.".to_string(),
            ))),
        }
    }

    /// `+` is overloaded: numbers add, strings concatenate (producing an
    /// interned result). Operands stay on the stack until the result
    /// exists, so a collection mid-concatenation cannot free them.
    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
                Ok(())
            }
            (Value::Obj(a), Value::Obj(b))
                if matches!(self.heap.get(a), Obj::String(_))
                    && matches!(self.heap.get(b), Obj::String(_)) =>
            {
                let mut text = self.heap.string(a).chars.clone();
                text.push_str(&self.heap.string(b).chars);
                let result = self.intern(&text);
                self.pop();
                self.pop();
                self.push(Value::Obj(result));
                Ok(())
            }
            _ => Err(self.runtime_error(RuntimeErrorKind::TypeError(
                "Operands must be two numbers or two strings.".to_string(),
            ))),
        }
    }

    // --- Closures and upvalues ---

    /// Build a closure, pushing it before capturing so the collector sees
    /// the partially-filled upvalue list.
    fn make_closure(&mut self, frame_idx: usize, fref: ObjRef) {
        let closure = self.alloc(Obj::Closure(ObjClosure::new(fref)));
        self.push(Value::Obj(closure));

        let count = self.heap.function(fref).upvalues.len();
        for i in 0..count {
            let descriptor = self.heap.function(fref).upvalues[i];
            let captured = if descriptor.is_local {
                let base = self.frames[frame_idx].stack_base;
                self.capture_upvalue(base + descriptor.index as usize)
            } else {
                self.frame_upvalue(frame_idx, descriptor.index)
            };
            self.heap.closure_mut(closure).upvalues.push(captured);
        }
    }

    /// Find or create the open upvalue for a stack slot. The list is kept
    /// sorted by descending slot, so the scan stops as soon as it passes
    /// the target.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &upvalue) in self.open_upvalues.iter().enumerate() {
            match self.heap.upvalue(upvalue) {
                ObjUpvalue::Open(s) if *s == slot => return upvalue,
                ObjUpvalue::Open(s) if *s < slot => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let upvalue = self.alloc(Obj::Upvalue(ObjUpvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, upvalue);
        upvalue
    }

    /// Close every open upvalue at or above `from_slot`, copying the stack
    /// value into the upvalue itself.
    pub(crate) fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(&upvalue) = self.open_upvalues.first() {
            let slot = match self.heap.upvalue(upvalue) {
                ObjUpvalue::Open(slot) if *slot >= from_slot => *slot,
                _ => break,
            };
            let value = self.stack[slot];
            *self.heap.upvalue_mut(upvalue) = ObjUpvalue::Closed(value);
            self.open_upvalues.remove(0);
        }
    }

    // --- Allocation & collection ---

    /// Allocate through the collector: if the heap has grown past its
    /// threshold (or stress mode is on), collect first.
    pub(crate) fn alloc(&mut self, obj: Obj) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    /// Intern through the collector; see [`Vm::alloc`].
    pub(crate) fn intern(&mut self, text: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(text)
    }

    /// Stop-the-world mark-and-sweep over the whole object graph.
    ///
    /// Roots: every stack value, every frame's closure, every open upvalue,
    /// the globals table, and the interned `"init"` name.
    pub fn collect_garbage(&mut self) {
        for value in &self.stack {
            self.heap.mark_value(*value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_object(self.init_string);

        self.heap.trace_references();
        self.heap.remove_white_strings();
        self.heap.sweep();
    }

    // --- Error handling ---

    /// Build a runtime error carrying the live call-stack context, then
    /// reset the stacks: the VM is reusable afterwards.
    pub(crate) fn runtime_error(&mut self, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let closure = self.heap.closure(frame.closure);
                let function = self.heap.function(closure.function);
                TraceFrame {
                    line: function.chunk.line_at(frame.ip.saturating_sub(1)),
                    function: function.name.map(|n| self.heap.string(n).chars.clone()),
                }
            })
            .collect();
        self.reset_stack();
        RuntimeError::new(kind, trace)
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds since the Unix epoch, as a number.
fn native_clock(_args: &[Value]) -> Result<Value, String> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| Value::Number(d.as_secs_f64()))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Vm {
        let mut vm = Vm::new();
        vm.interpret(source).expect("run failed");
        vm
    }

    fn output_of(source: &str) -> Vec<String> {
        run(source).output
    }

    fn runtime_kind(source: &str) -> (RuntimeErrorKind, Vec<String>) {
        let mut vm = Vm::new();
        match vm.interpret(source) {
            Err(VesperError::Runtime(err)) => (err.kind, vm.output),
            other => panic!("expected runtime error, got {:?}", other.err()),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(output_of("print 1 + 2 * 3;"), vec!["7"]);
        assert_eq!(output_of("print 2 - 3 - 4;"), vec!["-5"]);
        assert_eq!(output_of("print (1 + 2) * 3;"), vec!["9"]);
        assert_eq!(output_of("print -2 * 3;"), vec!["-6"]);
    }

    #[test]
    fn modulo_is_truncating() {
        assert_eq!(output_of("print 7 % 3;"), vec!["1"]);
        assert_eq!(output_of("print -7 % 3;"), vec!["-1"]);
        assert_eq!(output_of("print 7.5 % 2;"), vec!["1.5"]);
    }

    #[test]
    fn truthiness_in_conditions() {
        assert_eq!(
            output_of("if (0) print \"zero\"; if (\"\") print \"empty\"; if (nil) print \"nil\";"),
            vec!["zero", "empty"]
        );
    }

    #[test]
    fn logical_operators_produce_operand_values() {
        assert_eq!(output_of("print 1 and 2;"), vec!["2"]);
        assert_eq!(output_of("print nil and 2;"), vec!["nil"]);
        assert_eq!(output_of("print nil or 3;"), vec!["3"]);
        assert_eq!(output_of("print 1 or 3;"), vec!["1"]);
    }

    #[test]
    fn globals_are_late_bound() {
        assert_eq!(
            output_of("var a = 10; fun f() { return a; } a = 20; print f();"),
            vec!["20"]
        );
    }

    #[test]
    fn closures_capture_by_reference_and_persist() {
        assert_eq!(
            output_of(
                r#"
                fun makeCounter() {
                    var i = 0;
                    fun count() { i = i + 1; return i; }
                    return count;
                }
                var c = makeCounter();
                print c();
                print c();
                "#
            ),
            vec!["1", "2"]
        );
    }

    #[test]
    fn sibling_closures_share_one_upvalue() {
        assert_eq!(
            output_of(
                r#"
                fun pair() {
                    var value = 0;
                    fun get() { return value; }
                    fun set(v) { value = v; }
                    set(41);
                    return get;
                }
                print pair()();
                "#
            ),
            vec!["41"]
        );
    }

    #[test]
    fn upvalues_close_on_scope_exit() {
        assert_eq!(
            output_of(
                r#"
                var f;
                {
                    var text = "captured";
                    fun show() { print text; }
                    f = show;
                }
                f();
                "#
            ),
            vec!["captured"]
        );
    }

    #[test]
    fn string_concatenation_interns_the_result() {
        assert_eq!(output_of(r#"print "ab" == "a" + "b";"#), vec!["true"]);
        assert_eq!(output_of(r#"print "hi " + "there";"#), vec!["hi there"]);
    }

    #[test]
    fn while_and_for_loops() {
        assert_eq!(
            output_of("var sum = 0; var i = 0; while (i < 10) { sum = sum + i; i = i + 1; } print sum;"),
            vec!["45"]
        );
        assert_eq!(
            output_of("var sum = 0; for (var i = 1; i <= 5; i = i + 1) sum = sum + i; print sum;"),
            vec!["15"]
        );
    }

    #[test]
    fn recursive_fib() {
        assert_eq!(
            output_of(
                "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(15);"
            ),
            vec!["610"]
        );
    }

    #[test]
    fn classes_fields_and_methods() {
        assert_eq!(
            output_of(
                r#"
                class Point {
                    init(x, y) { this.x = x; this.y = y; }
                    sum() { return this.x + this.y; }
                }
                var p = Point(3, 4);
                print p.sum();
                p.x = 30;
                print p.sum();
                "#
            ),
            vec!["7", "34"]
        );
    }

    #[test]
    fn bound_methods_carry_their_receiver() {
        assert_eq!(
            output_of(
                r#"
                class Greeter {
                    init(name) { this.name = name; }
                    greet() { return "hi " + this.name; }
                }
                var m = Greeter("ada").greet;
                print m();
                "#
            ),
            vec!["hi ada"]
        );
    }

    #[test]
    fn initializer_returns_the_instance() {
        assert_eq!(
            output_of(
                r#"
                class Box { init() { this.full = false; return; } }
                print Box().full;
                "#
            ),
            vec!["false"]
        );
    }

    #[test]
    fn inheritance_and_super_dispatch() {
        assert_eq!(
            output_of(
                r#"
                class A { speak() { return "A"; } }
                class B < A { speak() { return super.speak() + "B"; } }
                print B().speak();
                "#
            ),
            vec!["AB"]
        );
    }

    #[test]
    fn super_binds_to_the_compile_time_ancestor() {
        // C inherits B.speak; the `super` inside it still names A.
        assert_eq!(
            output_of(
                r#"
                class A { speak() { return "A"; } }
                class B < A { speak() { return super.speak() + "B"; } }
                class C < B {}
                print C().speak();
                "#
            ),
            vec!["AB"]
        );
    }

    #[test]
    fn inherited_methods_run_against_the_subclass_instance() {
        assert_eq!(
            output_of(
                r#"
                class Counter {
                    init() { this.n = 0; }
                    bump() { this.n = this.n + 1; return this.n; }
                }
                class Loud < Counter {
                    bump() { return super.bump() * 10; }
                }
                var c = Loud();
                print c.bump();
                print c.bump();
                "#
            ),
            vec!["10", "20"]
        );
    }

    #[test]
    fn add_type_error_names_both_alternatives_and_prints_nothing() {
        let (kind, output) = runtime_kind("print 1 + \"a\";");
        assert!(output.is_empty());
        match kind {
            RuntimeErrorKind::TypeError(msg) => {
                assert_eq!(msg, "Operands must be two numbers or two strings.")
            }
            other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn undefined_variable_error() {
        let (kind, _) = runtime_kind("print missing;");
        assert!(matches!(kind, RuntimeErrorKind::UndefinedVariable(name) if name == "missing"));
    }

    #[test]
    fn assignment_to_undeclared_global_fails() {
        let (kind, _) = runtime_kind("missing = 1;");
        assert!(matches!(kind, RuntimeErrorKind::UndefinedVariable(_)));
    }

    #[test]
    fn arity_mismatch_is_reported_exactly() {
        let (kind, _) = runtime_kind("fun f(a, b) { return a; } f(1);");
        assert!(matches!(
            kind,
            RuntimeErrorKind::WrongArity {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let (kind, _) = runtime_kind("var x = 3; x();");
        assert!(matches!(kind, RuntimeErrorKind::NotCallable));
    }

    #[test]
    fn deep_recursion_overflows_the_frame_stack() {
        let (kind, _) = runtime_kind("fun f() { f(); } f();");
        assert!(matches!(kind, RuntimeErrorKind::StackOverflow));
    }

    #[test]
    fn runtime_errors_report_the_call_stack_innermost_first() {
        let mut vm = Vm::new();
        let err = vm
            .interpret("fun inner() { return 1 + nil; }\nfun outer() { return inner(); }\nouter();")
            .unwrap_err();
        let VesperError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        let frames: Vec<String> = err.trace.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            frames,
            vec![
                "[line 1] in inner()",
                "[line 2] in outer()",
                "[line 3] in script",
            ]
        );
    }

    #[test]
    fn vm_is_reusable_after_a_runtime_error() {
        let mut vm = Vm::new();
        assert!(vm.interpret("var a = 1; print a + nil;").is_err());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        // Globals defined before the error survive into the next call.
        vm.interpret("print a + 1;").expect("second run failed");
        assert_eq!(vm.output, vec!["2"]);
    }

    #[test]
    fn native_clock_returns_a_number() {
        let vm = run("var t = clock(); print t >= 0;");
        assert_eq!(vm.output, vec!["true"]);
    }

    #[test]
    fn gc_keeps_objects_reachable_only_through_upvalues() {
        let mut vm = Vm::new();
        vm.heap.stress = true; // collect on every allocation
        vm.interpret(
            r#"
            fun keeper() {
                var kept = "only" + " reachable" + " through the closure";
                fun get() { return kept; }
                return get;
            }
            var get = keeper();
            print get();
            "#,
        )
        .expect("run failed");
        assert_eq!(vm.output, vec!["only reachable through the closure"]);
    }

    #[test]
    fn gc_stress_survives_classes_and_closures_together() {
        let mut vm = Vm::new();
        vm.heap.stress = true;
        vm.interpret(
            r#"
            class Node {
                init(label) { this.label = label; }
                describe() { return "node " + this.label; }
            }
            fun build(label) {
                var node = Node(label);
                fun describe() { return node.describe(); }
                return describe;
            }
            var d = build("a" + "1");
            print d();
            "#,
        )
        .expect("run failed");
        assert_eq!(vm.output, vec!["node a1"]);
    }

    #[test]
    fn garbage_is_freed_back_to_the_byte_baseline() {
        let mut vm = Vm::new();
        vm.interpret("var keep = \"kept\" + \" value\";").unwrap();
        vm.collect_garbage();
        let baseline = vm.heap.bytes_allocated();
        let live = vm.heap.live_objects();

        vm.interpret("{ var transient = \"waste\" + \" heap\"; print transient; }")
            .unwrap();
        vm.collect_garbage();
        assert_eq!(vm.heap.bytes_allocated(), baseline);
        assert_eq!(vm.heap.live_objects(), live);
    }

    #[test]
    fn cyclic_object_graphs_are_collected() {
        let mut vm = Vm::new();
        vm.interpret(
            r#"
            class Holder {}
            {
                var a = Holder();
                var b = Holder();
                a.other = b;
                b.other = a;
            }
            "#,
        )
        .unwrap();
        vm.collect_garbage();
        let after_cycle_death = vm.heap.live_objects();
        // Run again: the two instances from the first run must be gone,
        // so live count stays flat instead of accumulating.
        vm.interpret("{ var a = Holder(); var b = Holder(); a.other = b; b.other = a; }")
            .unwrap();
        vm.collect_garbage();
        assert_eq!(vm.heap.live_objects(), after_cycle_death);
    }
}
