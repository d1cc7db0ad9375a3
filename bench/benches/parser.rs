use criterion::{criterion_group, criterion_main, Criterion};
use pulse::{lexer::tokenize_into, parser::parse, token::Token};
use std::hint::black_box;

static INPUT: &str = include_str!("../../samples/big.pulse");

fn parser<'src>(input: &'src str, tokens: &mut Vec<Token<'src>>) {
    tokenize_into(input, tokens).unwrap();
    let program = parse(tokens).unwrap();
    _ = black_box(program);
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut tokens = Vec::with_capacity(INPUT.len() / 2);

    c.bench_function("parser", |b| {
        b.iter(|| {
            tokens.clear();
            black_box(parser(black_box(INPUT), &mut tokens));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
