//! Bytecode disassembler for debug output.

use super::chunk::Chunk;
use super::heap::Heap;
use super::object::{Obj, ObjRef};
use super::opcode::Op;
use super::value::{format_number, Value};

/// Disassemble a function (and, recursively, every function in its constant
/// pool) to a human-readable string.
pub fn disassemble(heap: &Heap, function: ObjRef) -> String {
    let mut out = String::new();
    let f = heap.function(function);
    let name = match f.name {
        Some(n) => heap.string(n).chars.clone(),
        None => "<script>".to_string(),
    };
    out.push_str(&format!(
        "== {} (arity={}, upvalues={}) ==\n",
        name,
        f.arity,
        f.upvalues.len()
    ));
    disassemble_chunk(heap, &f.chunk, &mut out);

    for constant in &f.chunk.constants {
        if let Value::Obj(r) = constant {
            if matches!(heap.get(*r), Obj::Function(_)) {
                out.push('\n');
                out.push_str(&disassemble(heap, *r));
            }
        }
    }
    out
}

fn disassemble_chunk(heap: &Heap, chunk: &Chunk, out: &mut String) {
    for (offset, op) in chunk.code.iter().enumerate() {
        let line = chunk.line_at(offset);
        let line_str = if offset > 0 && chunk.line_at(offset - 1) == line {
            "   |".to_string()
        } else {
            format!("{:4}", line)
        };
        out.push_str(&format!("{:04} {} ", offset, line_str));
        disassemble_op(heap, op, chunk, offset, out);
        out.push('\n');
    }
}

fn disassemble_op(heap: &Heap, op: &Op, chunk: &Chunk, offset: usize, out: &mut String) {
    match op {
        Op::Constant(idx) => {
            out.push_str(&format!(
                "CONSTANT     {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::Nil => out.push_str("NIL"),
        Op::True => out.push_str("TRUE"),
        Op::False => out.push_str("FALSE"),
        Op::Pop => out.push_str("POP"),
        Op::GetLocal(slot) => out.push_str(&format!("GET_LOCAL    {:>5}", slot)),
        Op::SetLocal(slot) => out.push_str(&format!("SET_LOCAL    {:>5}", slot)),
        Op::GetGlobal(idx) => {
            out.push_str(&format!(
                "GET_GLOBAL   {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::SetGlobal(idx) => {
            out.push_str(&format!(
                "SET_GLOBAL   {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::DefineGlobal(idx) => {
            out.push_str(&format!(
                "DEF_GLOBAL   {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::GetUpvalue(idx) => out.push_str(&format!("GET_UPVALUE  {:>5}", idx)),
        Op::SetUpvalue(idx) => out.push_str(&format!("SET_UPVALUE  {:>5}", idx)),
        Op::CloseUpvalue => out.push_str("CLOSE_UPVALUE"),
        Op::GetProperty(idx) => {
            out.push_str(&format!(
                "GET_PROPERTY {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::SetProperty(idx) => {
            out.push_str(&format!(
                "SET_PROPERTY {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::GetSuper(idx) => {
            out.push_str(&format!(
                "GET_SUPER    {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::Equal => out.push_str("EQUAL"),
        Op::Greater => out.push_str("GREATER"),
        Op::Less => out.push_str("LESS"),
        Op::Add => out.push_str("ADD"),
        Op::Subtract => out.push_str("SUBTRACT"),
        Op::Multiply => out.push_str("MULTIPLY"),
        Op::Divide => out.push_str("DIVIDE"),
        Op::Modulo => out.push_str("MODULO"),
        Op::Not => out.push_str("NOT"),
        Op::Negate => out.push_str("NEGATE"),
        Op::Print => out.push_str("PRINT"),
        Op::Jump(dist) => {
            out.push_str(&format!(
                "JUMP         {:>5} -> {}",
                dist,
                offset + 1 + *dist as usize
            ));
        }
        Op::JumpIfFalse(dist) => {
            out.push_str(&format!(
                "JUMP_IF_FALSE{:>5} -> {}",
                dist,
                offset + 1 + *dist as usize
            ));
        }
        Op::Loop(dist) => {
            out.push_str(&format!(
                "LOOP         {:>5} -> {}",
                dist,
                offset + 1 - *dist as usize
            ));
        }
        Op::Call(argc) => out.push_str(&format!("CALL         {:>5}", argc)),
        Op::Invoke(idx, argc) => {
            out.push_str(&format!(
                "INVOKE       {:>5} ({}) argc={}",
                idx,
                constant_text(heap, chunk, *idx),
                argc
            ));
        }
        Op::SuperInvoke(idx, argc) => {
            out.push_str(&format!(
                "SUPER_INVOKE {:>5} ({}) argc={}",
                idx,
                constant_text(heap, chunk, *idx),
                argc
            ));
        }
        Op::Closure(idx) => {
            out.push_str(&format!(
                "CLOSURE      {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::Class(idx) => {
            out.push_str(&format!(
                "CLASS        {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::Method(idx) => {
            out.push_str(&format!(
                "METHOD       {:>5} ({})",
                idx,
                constant_text(heap, chunk, *idx)
            ));
        }
        Op::Inherit => out.push_str("INHERIT"),
        Op::Return => out.push_str("RETURN"),
    }
}

fn constant_text(heap: &Heap, chunk: &Chunk, idx: u8) -> String {
    match chunk.constants.get(idx as usize) {
        Some(Value::Number(n)) => format_number(*n),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Nil) => "nil".to_string(),
        Some(Value::Obj(r)) => match heap.get(*r) {
            Obj::String(s) => format!("\"{}\"", s.chars),
            Obj::Function(f) => match f.name {
                Some(n) => format!("<fn {}>", heap.string(n).chars),
                None => "<script>".to_string(),
            },
            _ => "<obj>".to_string(),
        },
        None => "???".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::compiler::compile;

    #[test]
    fn disassembly_includes_nested_functions_and_patched_jumps() {
        let mut heap = Heap::new();
        let script = compile(
            "fun choose(c) { if (c) return 1; else return 2; } print choose(true);",
            &mut heap,
        )
        .expect("compile error");
        let text = disassemble(&heap, script);

        assert!(text.starts_with("== <script>"));
        assert!(text.contains("== choose (arity=1"));
        assert!(text.contains("JUMP_IF_FALSE"));
        assert!(!text.contains(&u16::MAX.to_string()), "unpatched jump left behind");
    }
}
