use std::hint::black_box;
use std::io;

use awkbox::action::Executor;
use awkbox::parser::{Program, parse_program};
use awkbox::runtime::Runtime;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn compile(src: &str) -> Program {
    parse_program(src).unwrap()
}

fn make_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{} field_{} {} extra", i, i % 100, i * 7))
        .collect()
}

/// BEGIN, every line as a record, END; output is discarded.
fn run_lines(program: &Program, lines: &[String]) {
    let mut rt = Runtime::new();
    let mut out = io::sink();
    let mut exec = Executor::new(program, &mut rt, &mut out);
    exec.run_begin().unwrap();
    for line in lines {
        exec.run_record(black_box(line)).unwrap();
    }
    exec.run_end().unwrap();
}

fn bench_simple_print(c: &mut Criterion) {
    let program = compile("{ print $2 }");
    let lines = make_lines(1000);
    c.bench_function("record/simple_print_1k", |b| b.iter(|| run_lines(&program, &lines)));
}

fn bench_field_access(c: &mut Criterion) {
    let program = compile("{ x = $1 + $3 }");
    let lines = make_lines(1000);
    c.bench_function("record/field_access_1k", |b| b.iter(|| run_lines(&program, &lines)));
}

fn bench_pattern_match(c: &mut Criterion) {
    let program = compile("/field_42/ { count++ }");
    let lines = make_lines(1000);
    c.bench_function("record/pattern_match_1k", |b| b.iter(|| run_lines(&program, &lines)));
}

fn bench_field_rewrite(c: &mut Criterion) {
    let program = compile("{ $2 = toupper($2); gsub(/extra/, \"x\"); print }");
    let lines = make_lines(1000);
    c.bench_function("record/field_rewrite_1k", |b| b.iter(|| run_lines(&program, &lines)));
}

fn bench_printf(c: &mut Criterion) {
    let program = compile("{ printf \"%-10s %8.2f %5d\\n\", $2, $3 / 7, $1 }");
    let lines = make_lines(1000);
    c.bench_function("record/printf_1k", |b| b.iter(|| run_lines(&program, &lines)));
}

fn bench_accumulate(c: &mut Criterion) {
    let program = compile("{ sum += $1; count[$2]++ } END { avg = sum / NR }");
    let mut group = c.benchmark_group("record/accumulate");
    for &n in &[100, 1_000, 10_000] {
        let lines = make_lines(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &lines, |b, lines| {
            b.iter(|| run_lines(&program, lines))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_simple_print,
    bench_field_access,
    bench_pattern_match,
    bench_field_rewrite,
    bench_printf,
    bench_accumulate
);
criterion_main!(benches);
