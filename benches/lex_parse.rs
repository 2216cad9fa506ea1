use std::hint::black_box;

use awkbox::lexer::Lexer;
use awkbox::parser::{Parser, parse_program};
use criterion::{Criterion, criterion_group, criterion_main};

const SIMPLE_PRINT: &str = r#"{ print $1 }"#;

const FIELD_MATH: &str = r#"{ sum += $3; count++ } END { print sum / count }"#;

const REALISTIC: &str = r#"
BEGIN { FS = "," }
/error/ {
    errors++
    if ($3 > 100) {
        printf "CRITICAL: %s at line %d\n", $2, NR
        critical++
    } else {
        printf "warning: %s\n", $2
    }
}
$1 == "INFO" {
    info++
}
END {
    printf "errors=%d critical=%d info=%d\n", errors, critical, info
}
"#;

const FUNCTIONS: &str = r#"
function abs(x) { return x < 0 ? -x : x }
function max(a, b) { return a > b ? a : b }
function clamp(x, lo, hi) {
    if (x < lo) return lo
    if (x > hi) return hi
    return x
}
function fill(arr, n,    i) { for (i = 1; i <= n; i++) arr[i] = i * i }
BEGIN { fill(sq, 5); print max(abs(-5), clamp(10, 0, 7)), sq[3] }
"#;

const CONTROL: &str = r#"
BEGIN { FS = "," }
{
    i = 1
    do {
        if ($i ~ /^[0-9]+$/ && $i + 0 > 500) {
            a[$i]++
            if ($i + 0 > 9000) break
        }
        i++
    } while (i <= NF)
}
/^quit/ { exit 0 }
END {
    for (k in a) { n++; total += k }
    printf "keys=%d total=%d\n", n, total
}
"#;

const PROGRAMS: [(&str, &str); 5] = [
    ("simple_print", SIMPLE_PRINT),
    ("field_math", FIELD_MATH),
    ("realistic", REALISTIC),
    ("functions", FUNCTIONS),
    ("control", CONTROL),
];

fn bench_lex(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");
    for (name, src) in PROGRAMS {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut lex = Lexer::new(black_box(src));
                lex.tokenize().unwrap()
            })
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    for (name, src) in PROGRAMS {
        let tokens = Lexer::new(src).tokenize().unwrap();
        group.bench_function(name, |b| {
            b.iter(|| Parser::new(black_box(tokens.clone())).parse().unwrap())
        });
    }
    group.finish();
}

fn bench_lex_and_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("lex+parse");
    for (name, src) in PROGRAMS {
        group.bench_function(name, |b| b.iter(|| parse_program(black_box(src)).unwrap()));
    }
    group.finish();
}

criterion_group!(benches, bench_lex, bench_parse, bench_lex_and_parse);
criterion_main!(benches);
