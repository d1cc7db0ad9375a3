use criterion::{criterion_group, criterion_main, Criterion};
use pulse::{lexer, token::TokenKind};
use std::hint::black_box;

static INPUT: &str = include_str!("../../samples/big.pulse");

fn lexer(input: &str) {
    let mut i = 0;
    for token in lexer::Lexer::new(input) {
        let Ok(token) = token else {
            break;
        };
        if token.kind == TokenKind::Eof {
            break;
        }
        i += 1;
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("lexer", |b| {
        b.iter(|| {
            black_box(lexer(black_box(INPUT)));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
