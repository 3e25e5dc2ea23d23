//! Benchmarks for the compiler and the VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quill::ast::{BinaryOp, Node, Ref};
use quill::vm::{CodeSegment, Compiler, DataSegment};
use quill::Session;

fn bin(left: Node, operator: BinaryOp, right: Node) -> Node {
    Node::binary(left, operator, right)
}

fn call(name: &str, args: Vec<Node>) -> Node {
    Node::call(Node::global(name), args)
}

/// `fib = fn(n) { if n <= 1 { return n }; return fib(n - 1) + fib(n - 2) }`
fn fib_definition() -> Node {
    let fib = Node::function(
        1,
        1,
        Node::block(vec![
            Node::if_then(
                bin(Node::local(0), BinaryOp::LessEqual, Node::int(1)),
                Node::ret(Node::local(0)),
            ),
            Node::ret(bin(
                call("fib", vec![bin(Node::local(0), BinaryOp::Subtract, Node::int(1))]),
                BinaryOp::Add,
                call("fib", vec![bin(Node::local(0), BinaryOp::Subtract, Node::int(2))]),
            )),
        ]),
    );
    Node::assign(Ref::Global("fib".into()), fib)
}

/// `range = fn(n) { i = 0; while i < n { yield i; i = i + 1 } }`
fn range_definition() -> Node {
    let range = Node::function(
        1,
        2,
        Node::block(vec![
            Node::assign(Ref::Local(1), Node::int(0)),
            Node::while_loop(
                bin(Node::local(1), BinaryOp::Less, Node::local(0)),
                Node::block(vec![
                    Node::yield_value(Node::local(1)),
                    Node::assign(Ref::Local(1), bin(Node::local(1), BinaryOp::Add, Node::int(1))),
                ]),
            ),
        ]),
    );
    Node::assign(Ref::Global("range".into()), range)
}

/// Sum `range(n)` with a `for` loop.
fn generator_sum(n: i64) -> Vec<Node> {
    vec![
        range_definition(),
        Node::assign(Ref::Global("sum".into()), Node::int(0)),
        Node::for_loop(
            vec![Ref::Global("i".into())],
            vec![call("range", vec![Node::int(n)])],
            Node::assign(
                Ref::Global("sum".into()),
                bin(Node::global("sum"), BinaryOp::Add, Node::global("i")),
            ),
        ),
    ]
}

/// The same sum with a plain `while` loop.
fn while_sum(n: i64) -> Vec<Node> {
    vec![
        Node::assign(Ref::Global("sum".into()), Node::int(0)),
        Node::assign(Ref::Global("i".into()), Node::int(0)),
        Node::while_loop(
            bin(Node::global("i"), BinaryOp::Less, Node::int(n)),
            Node::block(vec![
                Node::assign(
                    Ref::Global("sum".into()),
                    bin(Node::global("sum"), BinaryOp::Add, Node::global("i")),
                ),
                Node::assign(Ref::Global("i".into()), bin(Node::global("i"), BinaryOp::Add, Node::int(1))),
            ]),
        ),
    ]
}

fn run(program: &[Node]) {
    Session::new().run_program(program).expect("vm runtime error");
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive");

    for n in [10, 15, 20].iter() {
        let program = vec![fib_definition(), call("fib", vec![Node::int(*n)])];
        group.bench_with_input(BenchmarkId::new("vm", n), &program, |b, program| {
            b.iter(|| run(black_box(program)))
        });
    }

    group.finish();
}

fn loop_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_sum_comparison");

    let generator = generator_sum(10_000);
    group.bench_function("for_generator", |b| b.iter(|| run(black_box(&generator))));

    let plain = while_sum(10_000);
    group.bench_function("while", |b| b.iter(|| run(black_box(&plain))));

    group.finish();
}

/// Benchmark compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    let program = generator_sum(100);
    group.bench_function("compile_generator_sum", |b| {
        b.iter(|| {
            let mut code = CodeSegment::new();
            let mut data = DataSegment::new();
            let mut compiler = Compiler::new(&mut code, &mut data);
            for node in black_box(&program) {
                compiler.compile_statement(node).expect("compile error");
            }
            code.len()
        })
    });

    group.finish();
}

criterion_group!(benches, fib_scaling, loop_comparison, compilation_overhead);

criterion_main!(benches);
