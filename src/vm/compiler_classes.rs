//! Class declarations, methods, and `this`/`super` resolution.

use crate::lexer::TokenKind;

use super::compiler::{ClassContext, Compiler, FunctionKind};
use super::opcode::Op;

impl Compiler<'_, '_> {
    pub(crate) fn class_declaration(&mut self) {
        let class_name = self.consume_identifier("Expect class name.");
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable(&class_name);

        self.emit(Op::Class(name_constant));
        self.define_variable(name_constant);

        self.classes.push(ClassContext {
            has_superclass: false,
        });

        if self.matches(TokenKind::Less) {
            let super_name = self.consume_identifier("Expect superclass name.");
            self.named_variable(&super_name, false);
            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }

            // The superclass value stays on the stack as a hidden `super`
            // local, so super calls resolve it like any other variable.
            self.begin_scope();
            self.add_local("super");
            self.mark_initialized();

            self.named_variable(&class_name, false);
            self.emit(Op::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        self.named_variable(&class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit(Op::Pop);

        if self.classes.last().is_some_and(|c| c.has_superclass) {
            self.end_scope();
        }
        self.classes.pop();
    }

    fn method(&mut self) {
        let name = self.consume_identifier("Expect method name.");
        let constant = self.identifier_constant(&name);
        // `init` is special: its bare returns yield the instance.
        let kind = if name == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind, &name);
        self.emit(Op::Method(constant));
    }

    /// `this` is an ordinary read of the method's slot-0 local.
    pub(crate) fn this_(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    /// `super.m` / `super.m(...)` resolve `this` and the hidden `super`
    /// local as two ordinary reads, then dispatch on the compile-time-named
    /// ancestor — never re-resolved against the receiver's dynamic class.
    pub(crate) fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        let name = self.consume_identifier("Expect superclass method name.");
        let idx = self.identifier_constant(&name);

        self.named_variable("this", false);
        if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.named_variable("super", false);
            self.emit(Op::SuperInvoke(idx, argc));
        } else {
            self.named_variable("super", false);
            self.emit(Op::GetSuper(idx));
        }
    }
}
