//! Function call dispatch for the VM.

use crate::error::{RuntimeError, RuntimeErrorKind};

use super::object::{NativeFn, Obj, ObjInstance, ObjNative, ObjRef};
use super::value::Value;
use super::vm::{CallFrame, Vm, FRAMES_MAX};

impl Vm {
    /// Call whatever sits beneath `argc` arguments on the stack.
    pub(crate) fn call_value(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = match self.peek(argc) {
            Value::Obj(r) => r,
            _ => return Err(self.runtime_error(RuntimeErrorKind::NotCallable)),
        };

        match self.heap.get(callee) {
            Obj::Closure(_) => self.call_closure(callee, argc),
            Obj::Native(_) => self.call_native(callee, argc),
            Obj::Class(_) => self.call_class(callee, argc),
            Obj::BoundMethod(bound) => {
                // Swap the receiver into the callee slot so it becomes the
                // method's slot 0 (`this`).
                let receiver = bound.receiver;
                let method = bound.method;
                let slot = self.stack.len() - argc - 1;
                self.stack[slot] = receiver;
                self.call_closure(method, argc)
            }
            _ => Err(self.runtime_error(RuntimeErrorKind::NotCallable)),
        }
    }

    /// Push a frame for a closure call: exact arity, bounded frame count.
    pub(crate) fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let arity = {
            let function = self.heap.closure(closure).function;
            self.heap.function(function).arity as usize
        };
        if argc != arity {
            return Err(self.runtime_error(RuntimeErrorKind::WrongArity {
                expected: arity,
                got: argc,
            }));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error(RuntimeErrorKind::StackOverflow));
        }

        self.frames.push(CallFrame {
            closure,
            ip: 0,
            stack_base: self.stack.len() - argc - 1,
        });
        Ok(())
    }

    /// Natives run outside the frame machinery: arguments in, value out.
    fn call_native(&mut self, native: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let (arity, func) = {
            let native = self.heap.native(native);
            (native.arity as usize, native.func)
        };
        if argc != arity {
            return Err(self.runtime_error(RuntimeErrorKind::WrongArity {
                expected: arity,
                got: argc,
            }));
        }

        let args_start = self.stack.len() - argc;
        match func(&self.stack[args_start..]) {
            Ok(result) => {
                self.stack.truncate(args_start - 1);
                self.push(result);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(RuntimeErrorKind::Native(message))),
        }
    }

    /// Calling a class constructs an instance, then runs `init` if the
    /// class has one.
    fn call_class(&mut self, class: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let instance = self.alloc(Obj::Instance(ObjInstance::new(class)));
        let slot = self.stack.len() - argc - 1;
        self.stack[slot] = Value::Obj(instance);

        let init_hash = self.heap.string(self.init_string).hash;
        match self.heap.class(class).methods.get(self.init_string, init_hash) {
            Some(Value::Obj(init)) => self.call_closure(init, argc),
            _ if argc != 0 => Err(self.runtime_error(RuntimeErrorKind::WrongArity {
                expected: 0,
                got: argc,
            })),
            _ => Ok(()),
        }
    }

    /// Register a host function under `name`.
    pub fn define_native(&mut self, name: &str, arity: u8, func: NativeFn) {
        let name_ref = self.heap.intern(name);
        let hash = self.heap.string(name_ref).hash;
        let native = self.heap.alloc(Obj::Native(ObjNative {
            name: name.to_string(),
            arity,
            func,
        }));
        self.globals.set(name_ref, hash, Value::Obj(native));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn double(args: &[Value]) -> Result<Value, String> {
        match args {
            [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
            _ => Err("double() wants a number.".to_string()),
        }
    }

    #[test]
    fn natives_are_callable_like_functions() {
        let mut vm = Vm::new();
        vm.define_native("double", 1, double);
        vm.interpret("print double(21);").expect("run failed");
        assert_eq!(vm.output, vec!["42"]);
    }

    #[test]
    fn native_errors_become_runtime_errors() {
        let mut vm = Vm::new();
        vm.define_native("double", 1, double);
        let err = vm.interpret("double(nil);").unwrap_err();
        assert!(err.to_string().contains("double() wants a number."));
    }

    #[test]
    fn native_arity_is_checked() {
        let mut vm = Vm::new();
        vm.define_native("double", 1, double);
        let err = vm.interpret("double(1, 2);").unwrap_err();
        assert!(err.to_string().contains("Expected 1 arguments but got 2."));
    }

    #[test]
    fn class_without_initializer_rejects_arguments() {
        let mut vm = Vm::new();
        let err = vm.interpret("class Empty {} Empty(1);").unwrap_err();
        assert!(err.to_string().contains("Expected 0 arguments but got 1."));
    }
}
