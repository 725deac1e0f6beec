//! Property access, method binding and class dispatch for the VM.

use crate::error::{RuntimeError, RuntimeErrorKind};

use super::object::{Obj, ObjBoundMethod, ObjRef};
use super::value::Value;
use super::vm::Vm;

impl Vm {
    fn as_instance(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => Some(r),
            _ => None,
        }
    }

    fn as_class(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => Some(r),
            _ => None,
        }
    }

    /// `expr.name`: fields shadow methods; a method read materializes a
    /// bound method carrying the receiver.
    pub(crate) fn get_property(&mut self, name: ObjRef, hash: u32) -> Result<(), RuntimeError> {
        let instance = match self.as_instance(self.peek(0)) {
            Some(r) => r,
            None => {
                return Err(self.runtime_error(RuntimeErrorKind::TypeError(
                    "Only instances have properties.".to_string(),
                )));
            }
        };

        if let Some(value) = self.heap.instance(instance).fields.get(name, hash) {
            self.pop();
            self.push(value);
            return Ok(());
        }

        let class = self.heap.instance(instance).class;
        self.bind_method(class, name, hash)
    }

    /// `expr.name = value`: stack holds `[instance, value]`; the assigned
    /// value is the expression's result.
    pub(crate) fn set_property(&mut self, name: ObjRef, hash: u32) -> Result<(), RuntimeError> {
        let instance = match self.as_instance(self.peek(1)) {
            Some(r) => r,
            None => {
                return Err(self.runtime_error(RuntimeErrorKind::TypeError(
                    "Only instances have fields.".to_string(),
                )));
            }
        };

        let value = self.peek(0);
        self.heap.instance_mut(instance).fields.set(name, hash, value);
        let value = self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    /// Replace the receiver on top of the stack with a bound method for
    /// `name` looked up on `class`.
    pub(crate) fn bind_method(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        hash: u32,
    ) -> Result<(), RuntimeError> {
        let method = match self.heap.class(class).methods.get(name, hash) {
            Some(Value::Obj(m)) => m,
            _ => {
                let text = self.heap.string(name).chars.clone();
                return Err(self.runtime_error(RuntimeErrorKind::UndefinedProperty(text)));
            }
        };

        let receiver = self.peek(0);
        let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod { receiver, method }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    /// Fused `expr.name(args...)`: skip the bound-method allocation unless
    /// the property turns out to be a field holding a callable.
    pub(crate) fn invoke(
        &mut self,
        name: ObjRef,
        hash: u32,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let instance = match self.as_instance(self.peek(argc)) {
            Some(r) => r,
            None => {
                return Err(self.runtime_error(RuntimeErrorKind::TypeError(
                    "Only instances have methods.".to_string(),
                )));
            }
        };

        if let Some(field) = self.heap.instance(instance).fields.get(name, hash) {
            let slot = self.stack.len() - argc - 1;
            self.stack[slot] = field;
            return self.call_value(argc);
        }

        let class = self.heap.instance(instance).class;
        self.invoke_from_class(class, name, hash, argc)
    }

    /// Dispatch on a statically-known class: ordinary invokes pass the
    /// receiver's class, super-invokes pass the compile-time ancestor.
    pub(crate) fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        hash: u32,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        match self.heap.class(class).methods.get(name, hash) {
            Some(Value::Obj(method)) => self.call_closure(method, argc),
            _ => {
                let text = self.heap.string(name).chars.clone();
                Err(self.runtime_error(RuntimeErrorKind::UndefinedProperty(text)))
            }
        }
    }

    /// `INHERIT`: copy the superclass method table down into the subclass,
    /// which is then popped. Methods declared afterwards overwrite entries.
    pub(crate) fn inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass = match self.as_class(self.peek(1)) {
            Some(r) => r,
            None => {
                return Err(self.runtime_error(RuntimeErrorKind::TypeError(
                    "Superclass must be a class.".to_string(),
                )));
            }
        };
        let subclass = self
            .peek(0)
            .as_obj()
            .expect("INHERIT operates on a fresh class");

        let methods = self.heap.class(superclass).methods.clone();
        self.heap.class_mut(subclass).methods.add_all(&methods);
        self.pop();
        Ok(())
    }

    /// `METHOD`: pop a closure and record it in the class beneath it.
    pub(crate) fn define_method(&mut self, name: ObjRef, hash: u32) {
        let method = self.peek(0);
        let class = self
            .peek(1)
            .as_obj()
            .expect("METHOD operates on a class");
        self.heap.class_mut(class).methods.set(name, hash, method);
        self.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn runtime_message(source: &str) -> String {
        let mut vm = Vm::new();
        vm.interpret(source).unwrap_err().to_string()
    }

    #[test]
    fn property_access_on_non_instances_fails() {
        assert!(runtime_message("var x = 3; print x.field;")
            .contains("Only instances have properties."));
        assert!(runtime_message("var x = 3; x.field = 1;")
            .contains("Only instances have fields."));
        assert!(runtime_message("\"text\".speak();").contains("Only instances have methods."));
    }

    #[test]
    fn missing_property_names_the_property() {
        assert!(runtime_message("class A {} A().missing;").contains("Undefined property 'missing'."));
        assert!(
            runtime_message("class A {} A().missing();").contains("Undefined property 'missing'.")
        );
    }

    #[test]
    fn superclass_must_be_a_class() {
        assert!(runtime_message("var NotAClass = 3; class B < NotAClass {}")
            .contains("Superclass must be a class."));
    }

    #[test]
    fn callable_fields_are_invoked_like_methods() {
        let mut vm = Vm::new();
        vm.interpret(
            r#"
            class Holder {}
            fun shout() { return "hey"; }
            var h = Holder();
            h.action = shout;
            print h.action();
            "#,
        )
        .expect("run failed");
        assert_eq!(vm.output, vec!["hey"]);
    }

    #[test]
    fn methods_added_after_inherit_override_the_copy() {
        let mut vm = Vm::new();
        vm.interpret(
            r#"
            class A { m() { return "base"; } n() { return "kept"; } }
            class B < A { m() { return "override"; } }
            var b = B();
            print b.m();
            print b.n();
            "#,
        )
        .expect("run failed");
        assert_eq!(vm.output, vec!["override", "kept"]);
    }
}
