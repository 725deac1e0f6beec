//! The object heap and the tracing garbage collector's machinery.
//!
//! Objects live in a slab indexed by [`ObjRef`] handles, with a free list
//! for recycled slots and a mark bit per slot — no owning pointers anywhere,
//! so cyclic object graphs (closures capturing instances capturing closures)
//! reclaim cleanly. The VM owns the root set and drives collection; the heap
//! provides marking, the gray worklist, the weak intern table, and the
//! sweep.

use super::object::{hash_string, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction,
    ObjInstance, ObjNative, ObjRef, ObjString, ObjUpvalue};
use super::table::Table;
use super::value::Value;

/// Threshold multiplier applied after each collection.
const GC_HEAP_GROW_FACTOR: usize = 2;
/// First collection happens once this many bytes are live.
const GC_INITIAL_THRESHOLD: usize = 1024 * 1024;

#[derive(Debug)]
struct Slot {
    obj: Option<Obj>,
    marked: bool,
    /// Size charged against the byte budget when the object was allocated.
    size: usize,
}

/// The process heap for one VM (or one compilation) — there is no global
/// state; independent heaps are fully isolated.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Intern set: every live string, keyed by itself. Weak — membership
    /// alone keeps nothing alive.
    pub strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    gray: Vec<ObjRef>,
    /// Collect on every allocation (tests use this to shake out missed
    /// roots; the `gc-stress` feature forces it on).
    pub stress: bool,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: GC_INITIAL_THRESHOLD,
            gray: Vec::new(),
            stress: cfg!(feature = "gc-stress"),
        }
    }

    /// Running total of live-object bytes (approximate; payload capacity is
    /// charged at allocation time).
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.obj.is_some()).count()
    }

    /// True when the allocator should trigger a collection first.
    pub fn should_collect(&self) -> bool {
        self.stress || self.bytes_allocated > self.next_gc
    }

    /// Register a new object, unmarked, and return its handle.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        let size = object_size(&obj);
        self.bytes_allocated += size;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot {
                    obj: Some(obj),
                    marked: false,
                    size,
                };
                ObjRef::new(index)
            }
            None => {
                self.slots.push(Slot {
                    obj: Some(obj),
                    marked: false,
                    size,
                });
                ObjRef::new(self.slots.len() - 1)
            }
        }
    }

    /// Return the canonical string object for `text`, allocating only if no
    /// string with this content is live.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = hash_string(text);
        let slots = &self.slots;
        let existing = self.strings.find_key(hash, |r| {
            matches!(&slots[r.index()].obj, Some(Obj::String(s)) if s.chars == text)
        });
        if let Some(r) = existing {
            return r;
        }
        let r = self.alloc(Obj::String(ObjString {
            chars: text.to_string(),
            hash,
        }));
        self.strings.set(r, hash, Value::Nil);
        r
    }

    // --- Accessors ---
    //
    // Handles are only produced by this heap, and the collector frees
    // nothing reachable, so a dangling or mistyped handle is a VM bug —
    // these panic rather than propagate.

    pub fn get(&self, r: ObjRef) -> &Obj {
        self.slots[r.index()].obj.as_ref().expect("dangling object handle")
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        self.slots[r.index()].obj.as_mut().expect("dangling object handle")
    }

    pub fn string(&self, r: ObjRef) -> &ObjString {
        match self.get(r) {
            Obj::String(s) => s,
            _ => panic!("expected string object"),
        }
    }

    pub fn function(&self, r: ObjRef) -> &ObjFunction {
        match self.get(r) {
            Obj::Function(f) => f,
            _ => panic!("expected function object"),
        }
    }

    pub fn native(&self, r: ObjRef) -> &ObjNative {
        match self.get(r) {
            Obj::Native(n) => n,
            _ => panic!("expected native object"),
        }
    }

    pub fn closure(&self, r: ObjRef) -> &ObjClosure {
        match self.get(r) {
            Obj::Closure(c) => c,
            _ => panic!("expected closure object"),
        }
    }

    pub fn closure_mut(&mut self, r: ObjRef) -> &mut ObjClosure {
        match self.get_mut(r) {
            Obj::Closure(c) => c,
            _ => panic!("expected closure object"),
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> &ObjUpvalue {
        match self.get(r) {
            Obj::Upvalue(u) => u,
            _ => panic!("expected upvalue object"),
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> &mut ObjUpvalue {
        match self.get_mut(r) {
            Obj::Upvalue(u) => u,
            _ => panic!("expected upvalue object"),
        }
    }

    pub fn class(&self, r: ObjRef) -> &ObjClass {
        match self.get(r) {
            Obj::Class(c) => c,
            _ => panic!("expected class object"),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.get_mut(r) {
            Obj::Class(c) => c,
            _ => panic!("expected class object"),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &ObjInstance {
        match self.get(r) {
            Obj::Instance(i) => i,
            _ => panic!("expected instance object"),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.get_mut(r) {
            Obj::Instance(i) => i,
            _ => panic!("expected instance object"),
        }
    }

    pub fn bound_method(&self, r: ObjRef) -> &ObjBoundMethod {
        match self.get(r) {
            Obj::BoundMethod(b) => b,
            _ => panic!("expected bound method object"),
        }
    }

    // --- Collection ---

    /// Mark a root value.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark a root object and queue it for tracing.
    pub fn mark_object(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.index()];
        if slot.obj.is_some() && !slot.marked {
            slot.marked = true;
            self.gray.push(r);
        }
    }

    /// Mark every key and value of a table owned outside the heap
    /// (the globals).
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Drain the gray worklist, blackening each object by marking what it
    /// directly references. Iterative, so the collector's memory use does
    /// not depend on object-graph depth.
    pub fn trace_references(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    fn blacken(&mut self, r: ObjRef) {
        let mut refs: Vec<ObjRef> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        match self.get(r) {
            Obj::String(_) | Obj::Native(_) => {}
            Obj::Upvalue(u) => {
                if let ObjUpvalue::Closed(v) = u {
                    values.push(*v);
                }
            }
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    refs.push(name);
                }
                values.extend(f.chunk.constants.iter().copied());
            }
            Obj::Closure(c) => {
                refs.push(c.function);
                refs.extend(c.upvalues.iter().copied());
            }
            Obj::Class(c) => {
                refs.push(c.name);
                for (key, value) in c.methods.iter() {
                    refs.push(key);
                    values.push(value);
                }
            }
            Obj::Instance(i) => {
                refs.push(i.class);
                for (key, value) in i.fields.iter() {
                    refs.push(key);
                    values.push(value);
                }
            }
            Obj::BoundMethod(b) => {
                values.push(b.receiver);
                refs.push(b.method);
            }
        }
        for child in refs {
            self.mark_object(child);
        }
        for value in values {
            self.mark_value(value);
        }
    }

    /// Drop unmarked strings from the intern set before the sweep frees
    /// them. The intern table never keeps a string alive by itself.
    pub fn remove_white_strings(&mut self) {
        let slots = &self.slots;
        self.strings.retain_keys(|r| slots[r.index()].marked);
    }

    /// Free every unmarked object, clear surviving marks, and grow the
    /// collection threshold geometrically.
    pub fn sweep(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.obj.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
            } else {
                self.bytes_allocated -= slot.size;
                slot.obj = None;
                slot.size = 0;
                self.free.push(index);
            }
        }
        self.next_gc = self.bytes_allocated * GC_HEAP_GROW_FACTOR;
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Approximate footprint of an object, charged against the GC byte budget.
fn object_size(obj: &Obj) -> usize {
    let base = std::mem::size_of::<Obj>();
    base + match obj {
        Obj::String(s) => s.chars.capacity(),
        Obj::Function(f) => {
            f.chunk.code.capacity() * std::mem::size_of::<super::opcode::Op>()
                + f.chunk.lines.capacity() * std::mem::size_of::<usize>()
                + f.chunk.constants.capacity() * std::mem::size_of::<Value>()
                + f.upvalues.capacity() * 2
        }
        Obj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<ObjRef>(),
        Obj::Native(n) => n.name.capacity(),
        Obj::Upvalue(_) => 0,
        Obj::Class(_) | Obj::Instance(_) | Obj::BoundMethod(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_is_content_unique() {
        let mut heap = Heap::new();
        let a = heap.intern("twice");
        let live = heap.live_objects();
        let b = heap.intern("twice");
        assert_eq!(a, b);
        assert_eq!(heap.live_objects(), live);
    }

    #[test]
    fn sweep_frees_unmarked_and_restores_byte_baseline() {
        let mut heap = Heap::new();
        let keep = heap.intern("keep");
        let baseline = heap.bytes_allocated();

        heap.intern("doomed-one");
        heap.intern("doomed-two");
        assert!(heap.bytes_allocated() > baseline);

        heap.mark_object(keep);
        heap.trace_references();
        heap.remove_white_strings();
        heap.sweep();

        assert_eq!(heap.bytes_allocated(), baseline);
        assert_eq!(heap.live_objects(), 1);
    }

    #[test]
    fn collected_strings_leave_the_intern_set() {
        let mut heap = Heap::new();
        heap.intern("ghost");
        heap.remove_white_strings();
        heap.sweep();

        // Re-interning after collection must produce a fresh allocation,
        // not a dangling hit in the intern table.
        let r = heap.intern("ghost");
        assert_eq!(heap.string(r).chars, "ghost");
        assert_eq!(heap.live_objects(), 1);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut heap = Heap::new();
        heap.intern("transient");
        heap.remove_white_strings();
        heap.sweep();
        let slots_before = heap.slots.len();
        heap.intern("replacement");
        assert_eq!(heap.slots.len(), slots_before);
    }

    #[test]
    fn marking_traces_through_closed_upvalues() {
        let mut heap = Heap::new();
        let inner = heap.intern("captured");
        let upvalue = heap.alloc(Obj::Upvalue(ObjUpvalue::Closed(Value::Obj(inner))));

        heap.mark_object(upvalue);
        heap.trace_references();
        heap.remove_white_strings();
        heap.sweep();

        assert_eq!(heap.string(inner).chars, "captured");
        assert_eq!(heap.live_objects(), 2);
    }
}
