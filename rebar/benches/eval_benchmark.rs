//! Evaluator throughput:
//!   cargo bench --bench eval_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rebar::{Interp, SeriesId, Settings, Value};

fn create_interpreter() -> Interp {
    Interp::new(Settings::default()).expect("boot failed")
}

/// Scans `source` once and roots the block so every iteration only
/// measures evaluation.
fn prepare(interp: &mut Interp, source: &str) -> SeriesId {
    let block = interp.load(source).expect("load failed");
    interp.add_root(Value::block(block)).expect("root failed");
    block
}

/// Benchmark 1: counting loop with enfix arithmetic
fn bench_loop_sum(c: &mut Criterion) {
    let mut interp = create_interpreter();
    let block = prepare(&mut interp, "n: 0 repeat i 1000 [n: n + i] n");

    c.bench_function("loop_sum_1000", |b| {
        b.iter(|| {
            let result = interp.run(black_box(block)).expect("benchmark failed");
            assert_eq!(result, Value::integer(500_500));
        });
    });
}

/// Benchmark 2: interpreted function calls with definitional return
fn bench_function_calls(c: &mut Criterion) {
    let mut interp = create_interpreter();
    interp
        .do_text("inc: func [x] [return x + 1]")
        .expect("definition failed");
    let block = prepare(&mut interp, "n: 0 loop 1000 [n: inc n] n");

    c.bench_function("function_calls_1000", |b| {
        b.iter(|| {
            interp.run(black_box(block)).expect("benchmark failed");
        });
    });
}

/// Benchmark 3: recursive fibonacci
fn bench_fibonacci(c: &mut Criterion) {
    let mut interp = create_interpreter();
    interp
        .do_text("fib: func [n] [either n < 2 [n] [(fib n - 1) + (fib n - 2)]]")
        .expect("definition failed");
    let block = prepare(&mut interp, "fib 15");

    c.bench_function("fibonacci_15", |b| {
        b.iter(|| {
            let result = interp.run(black_box(block)).expect("benchmark failed");
            assert_eq!(result, Value::integer(610));
        });
    });
}

/// Benchmark 4: allocation churn through the collector
fn bench_series_churn(c: &mut Criterion) {
    let mut interp = create_interpreter();
    let block = prepare(&mut interp, "b: copy [] loop 500 [append b reduce [1 2 3]] length-of b");

    c.bench_function("series_churn_500", |b| {
        b.iter(|| {
            interp.run(black_box(block)).expect("benchmark failed");
        });
        interp.recycle();
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_loop_sum, bench_function_calls, bench_fibonacci, bench_series_churn
}

criterion_main!(benches);
