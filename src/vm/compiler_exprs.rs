//! Expression compilation: Pratt operator-precedence parsing.

use crate::lexer::TokenKind;

use super::compiler::Compiler;
use super::opcode::Op;
use super::value::Value;

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Assignment = 1, // =
    Or = 2,         // or
    And = 3,        // and
    Equality = 4,   // == !=
    Comparison = 5, // < > <= >=
    Term = 6,       // + -
    Factor = 7,     // * / %
    Unary = 8,      // ! -
    Call = 9,       // . ()
    Primary = 10,
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }

    /// The infix binding power of a token, `None` if it cannot be infix.
    pub fn of(kind: &TokenKind) -> Precedence {
        match kind {
            TokenKind::Or => Precedence::Or,
            TokenKind::And => Precedence::And,
            TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => Precedence::Comparison,
            TokenKind::Plus | TokenKind::Minus => Precedence::Term,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
            TokenKind::LeftParen | TokenKind::Dot => Precedence::Call,
            _ => Precedence::None,
        }
    }
}

impl Compiler<'_, '_> {
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parse a prefix expression, then greedily fold infix operators of at
    /// least `precedence`, left-associatively. Assignability threads through
    /// as `can_assign`: only expressions entered at assignment precedence
    /// may consume an `=`, and a trailing one is an invalid target.
    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= Precedence::of(&self.current.kind) {
            self.advance();
            self.infix_rule(can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Dispatch on the just-consumed token as a prefix. Returns false if it
    /// cannot start an expression.
    fn prefix_rule(&mut self, can_assign: bool) -> bool {
        match self.previous.kind.clone() {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::NumberLiteral(n) => self.emit_constant(Value::Number(n)),
            TokenKind::StringLiteral(s) => self.string(&s),
            TokenKind::Identifier(name) => self.named_variable(&name, can_assign),
            TokenKind::Nil => self.emit(Op::Nil),
            TokenKind::True => self.emit(Op::True),
            TokenKind::False => self.emit(Op::False),
            TokenKind::This => self.this_(),
            TokenKind::Super => self.super_(),
            _ => return false,
        }
        true
    }

    /// Dispatch on the just-consumed token as an infix operator.
    fn infix_rule(&mut self, can_assign: bool) {
        match self.previous.kind.clone() {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => self.binary(),
            TokenKind::And => self.and_(),
            TokenKind::Or => self.or_(),
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            _ => {}
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind.clone();
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit(Op::Negate),
            TokenKind::Bang => self.emit(Op::Not),
            _ => unreachable!("unary dispatched on non-unary token"),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind.clone();
        self.parse_precedence(Precedence::of(&operator).next());
        match operator {
            TokenKind::Plus => self.emit(Op::Add),
            TokenKind::Minus => self.emit(Op::Subtract),
            TokenKind::Star => self.emit(Op::Multiply),
            TokenKind::Slash => self.emit(Op::Divide),
            TokenKind::Percent => self.emit(Op::Modulo),
            TokenKind::EqualEqual => self.emit(Op::Equal),
            TokenKind::BangEqual => {
                self.emit(Op::Equal);
                self.emit(Op::Not);
            }
            TokenKind::Less => self.emit(Op::Less),
            TokenKind::Greater => self.emit(Op::Greater),
            TokenKind::LessEqual => {
                self.emit(Op::Greater);
                self.emit(Op::Not);
            }
            TokenKind::GreaterEqual => {
                self.emit(Op::Less);
                self.emit(Op::Not);
            }
            _ => unreachable!("binary dispatched on non-binary token"),
        }
    }

    /// `and` short-circuits: the left value is the result when falsey.
    fn and_(&mut self) {
        let end_jump = self.emit_jump(Op::JumpIfFalse(u16::MAX));
        self.emit(Op::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// `or` short-circuits: the left value is the result when truthy.
    fn or_(&mut self) {
        let else_jump = self.emit_jump(Op::JumpIfFalse(u16::MAX));
        let end_jump = self.emit_jump(Op::Jump(u16::MAX));
        self.patch_jump(else_jump);
        self.emit(Op::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn string(&mut self, text: &str) {
        let r = self.heap.intern(text);
        self.emit_constant(Value::Obj(r));
    }

    /// Resolve a name to local slot / upvalue index / global constant and
    /// emit the matching get or set.
    pub(crate) fn named_variable(&mut self, name: &str, can_assign: bool) {
        let ctx = self.contexts.len() - 1;
        let (get_op, set_op) = if let Some(slot) = self.resolve_local(ctx, name) {
            (Op::GetLocal(slot), Op::SetLocal(slot))
        } else if let Some(idx) = self.resolve_upvalue(ctx, name) {
            (Op::GetUpvalue(idx), Op::SetUpvalue(idx))
        } else {
            let idx = self.identifier_constant(name);
            (Op::GetGlobal(idx), Op::SetGlobal(idx))
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit(set_op);
        } else {
            self.emit(get_op);
        }
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit(Op::Call(argc));
    }

    fn dot(&mut self, can_assign: bool) {
        let name = self.consume_identifier("Expect property name after '.'.");
        let idx = self.identifier_constant(&name);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit(Op::SetProperty(idx));
        } else if self.matches(TokenKind::LeftParen) {
            // Fused lookup + call: no intermediate bound method.
            let argc = self.argument_list();
            self.emit(Op::Invoke(idx, argc));
        } else {
            self.emit(Op::GetProperty(idx));
        }
    }

    pub(crate) fn argument_list(&mut self) -> u8 {
        let mut argc: usize = 0;
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    argc += 1;
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        argc as u8
    }
}
