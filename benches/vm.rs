//! Benchmarks for the bytecode VM: compile-and-run over classic workloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vesperlang::vm::Vm;

const FIB_RECURSIVE: &str = r#"
fun fib(n) {
    if (n < 2) return n;
    return fib(n - 1) + fib(n - 2);
}
fib(20);
"#;

const FIB_ITERATIVE: &str = r#"
fun fib(n) {
    if (n < 2) return n;
    var a = 0;
    var b = 1;
    for (var i = 2; i <= n; i = i + 1) {
        var next = a + b;
        a = b;
        b = next;
    }
    return b;
}
fib(60);
"#;

const METHOD_DISPATCH: &str = r#"
class Counter {
    init() { this.n = 0; }
    bump() { this.n = this.n + 1; return this.n; }
}
var c = Counter();
for (var i = 0; i < 2000; i = i + 1) c.bump();
"#;

/// Compile + execute on a fresh VM.
fn run_vm(source: &str) {
    let mut vm = Vm::new();
    vm.interpret(source).expect("vm error");
}

fn fib_recursive(c: &mut Criterion) {
    c.bench_function("fib_recursive_20", |b| {
        b.iter(|| run_vm(black_box(FIB_RECURSIVE)))
    });
}

fn fib_iterative(c: &mut Criterion) {
    c.bench_function("fib_iterative_60", |b| {
        b.iter(|| run_vm(black_box(FIB_ITERATIVE)))
    });
}

fn method_dispatch(c: &mut Criterion) {
    c.bench_function("method_dispatch_2000", |b| {
        b.iter(|| run_vm(black_box(METHOD_DISPATCH)))
    });
}

criterion_group!(benches, fib_recursive, fib_iterative, method_dispatch);
criterion_main!(benches);
