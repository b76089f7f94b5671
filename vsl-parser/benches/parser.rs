use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use vsl_parser::parser::Parser;

fn expr(source: &str) {
    let source = source.into();
    let _ast = Parser::new(&source).parse_expr();
    assert!(source.has_no_errors());
}

fn program(source: &str) {
    let source = source.into();
    let _ast = Parser::new(&source).parse_program();
    assert!(source.has_no_errors());
}

fn long_expr(c: &mut Criterion) {
    let mut group = c.benchmark_group("long-expr");

    // stays below the parser's nesting limit
    let mut source = "1".to_string();
    for _i in 0..120 {
        source.push_str(" + 1");
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("long-expr", |b| b.iter(|| expr(&source)));
}

fn stress_precedence(c: &mut Criterion) {
    let mut group = c.benchmark_group("stress-precedence");

    let mut source = "1".to_string();
    for _i in 0..50 {
        source.push_str(" - 2 * 3 + 5 / 5");
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("stress-precedence", |b| b.iter(|| expr(&source)));
}

fn many_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("many-functions");

    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            "FUNC f{}(a, b) {{ VAR t t = a * b WHILE t DO t = t - 1 DONE RETURN t + f{}(a, b) }}\n",
            i, i
        ));
    }
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("many-functions", |b| b.iter(|| program(&source)));
}

criterion_group!(benches, long_expr, stress_precedence, many_functions);
criterion_main!(benches);
