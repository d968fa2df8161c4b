use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use perturb_core::{
    parse_program, remove_type_hints, rewrite_for_one_based_indexing, Evaluator, Perturbation,
};

const SOLUTION: &str = "\
from typing import List


def max_window(xs: List[int], k: int) -> List[int]:
    out = []
    for i in range(len(xs) - k + 1):
        best = xs[i]
        for j in range(i, i + k):
            if xs[j] > best:
                best = xs[j]
        out.append(best)
    return out
";

fn program_with_calls(copies: usize) -> String {
    let mut program = SOLUTION.to_string();
    for n in 0..copies {
        program.push_str(&format!(
            "print([max_window(list(range({})), 3)])\n",
            n + 10
        ));
    }
    program
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_solution", |b| {
        b.iter(|| black_box(parse_program(black_box(SOLUTION))))
    });
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");
    group.bench_function("remove_type_hints", |b| {
        b.iter(|| black_box(remove_type_hints(black_box(SOLUTION))))
    });
    group.bench_function("one_based_indexing", |b| {
        b.iter(|| black_box(rewrite_for_one_based_indexing(black_box(SOLUTION))))
    });
    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    let evaluator = Evaluator::default();
    let mut group = c.benchmark_group("eval");
    for copies in [1, 8, 32] {
        let program = program_with_calls(copies);
        group.bench_with_input(BenchmarkId::new("plain", copies), &program, |b, program| {
            b.iter(|| black_box(evaluator.eval_program_with_calls(program, None)))
        });
        group.bench_with_input(
            BenchmarkId::new("one_based", copies),
            &program,
            |b, program| {
                b.iter(|| {
                    black_box(
                        evaluator
                            .eval_program_with_calls(program, Some(Perturbation::OneBasedIndexing)),
                    )
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_rewrite, bench_eval);
criterion_main!(benches);
