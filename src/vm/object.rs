//! Heap object variants and the handle type that names them.

use std::fmt;

use super::chunk::Chunk;
use super::table::Table;
use super::value::Value;

/// A handle to a heap object: an index into the heap's slab.
///
/// Handles compare by identity, which is the language's object equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(u32);

impl ObjRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Every kind of heap-allocated object.
#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

/// An immutable, interned string with its precomputed hash.
///
/// At most one live `ObjString` exists for any given content; the heap's
/// intern table enforces that.
#[derive(Debug)]
pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

/// FNV-1a over the raw bytes.
pub fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Descriptor recorded by the compiler for each upvalue a closure captures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpvalueDescriptor {
    /// True: captures a local of the immediately enclosing function.
    /// False: captures an upvalue of the enclosing function's closure.
    pub is_local: bool,
    /// A stack slot (if `is_local`) or an enclosing upvalue index.
    pub index: u8,
}

/// A compiled function prototype (or the top-level script).
#[derive(Debug)]
pub struct ObjFunction {
    /// Number of parameters.
    pub arity: u8,
    /// Upvalue descriptors, one per captured variable.
    pub upvalues: Vec<UpvalueDescriptor>,
    /// The compiled body.
    pub chunk: Chunk,
    /// Function name; `None` for the top-level script.
    pub name: Option<ObjRef>,
}

impl ObjFunction {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            arity: 0,
            upvalues: Vec::new(),
            chunk: Chunk::new(),
            name,
        }
    }
}

/// A host-provided function callable like any other value.
pub struct ObjNative {
    pub name: String,
    pub arity: u8,
    pub func: NativeFn,
}

/// Natives see their argument window and return a value or an error message.
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// A function paired with its captured upvalues.
///
/// `upvalues` is filled in one capture at a time right after allocation,
/// while the closure already sits on the VM stack; its final length equals
/// the function's descriptor count.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

impl ObjClosure {
    pub fn new(function: ObjRef) -> Self {
        Self {
            function,
            upvalues: Vec::new(),
        }
    }
}

/// An upvalue captures a variable from an enclosing scope.
///
/// While the variable's stack slot is live the upvalue is *open* and points
/// at it; when the owning frame unwinds, the value is copied out and the
/// upvalue is *closed*.
#[derive(Debug)]
pub enum ObjUpvalue {
    /// Points to a live stack slot.
    Open(usize),
    /// Owns the captured value after the enclosing scope exits.
    Closed(Value),
}

/// A class: a name plus its method table (name → closure).
#[derive(Debug)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

impl ObjClass {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::new(),
        }
    }
}

/// An instance: its class plus a field table (name → value).
#[derive(Debug)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl ObjInstance {
    pub fn new(class: ObjRef) -> Self {
        Self {
            class,
            fields: Table::new(),
        }
    }
}

/// A receiver bundled with a closure, produced when a method is read as a
/// first-class value.
#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(hash_string(""), 2166136261);
        assert_eq!(hash_string("a"), 0xe40c292c);
        assert_eq!(hash_string("foobar"), 0xbf9cf968);
    }
}
