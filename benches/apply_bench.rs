//! Criterion benchmarks for rule application.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scripted_editor::apply::RuleEngine;
use scripted_editor::models::{ApplyOptions, DocumentLine};
use scripted_editor::table::{parse_rule_table, COLUMNS};

const VERSE: &str = "And God said, Let there be light: and there was light. \
And God saw the light, that it was good: and God divided the light from the darkness.";

fn build_table(rule_count: usize) -> String {
    let mut text = COLUMNS.join("\t");
    text.push('\n');
    let kinds = ["w", "a", "i", "r"];
    for i in 0..rule_count {
        let kind = kinds[i % kinds.len()];
        let (search, replace) = match kind {
            "r" => (format!(r"(\w+)eth{}\b", i), "${1}s".to_string()),
            "i" => (format!("ight{}", i), "ite".to_string()),
            _ => (format!("word{}", i), format!("term{}", i)),
        };
        let cells = [
            kind, "", "", "", "", "", "", "", "-i", search.as_str(), "", "", replace.as_str(), "", "",
        ];
        text.push_str(&cells.join("\t"));
        text.push('\n');
    }
    // A few that actually hit
    text.push_str("w\t\t\t\t\t\t\t\t-i\tlight\t\t\tlamp\t\t\n");
    text.push_str("a\t\t\t\t\t\t\t\t-c\tGod\t\t\tElohim\t\t\n");
    text
}

fn build_lines(count: usize) -> Vec<DocumentLine> {
    (0..count)
        .map(|i| {
            let reference = format!("{}:{}", i / 30 + 1, i % 30 + 1);
            DocumentLine::new("GEN", "v", Some(&reference), VERSE)
        })
        .collect()
}

fn bench_apply(c: &mut Criterion) {
    let lines = build_lines(1000);

    let mut group = c.benchmark_group("apply_lines");

    for rule_count in [10, 100, 400] {
        let rules = parse_rule_table("bench", &build_table(rule_count)).unwrap();
        let engine = RuleEngine::new(rules, ApplyOptions::default()).unwrap();

        group.bench_with_input(BenchmarkId::new("rules", rule_count), &rule_count, |b, _| {
            b.iter(|| engine.apply_lines(black_box(&lines)))
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let table = build_table(400);
    let rules = parse_rule_table("bench", &table).unwrap();

    c.bench_function("compile_400_rules", |b| {
        b.iter(|| RuleEngine::new(black_box(rules.clone()), ApplyOptions::default()).unwrap())
    });
}

criterion_group!(benches, bench_apply, bench_compile);
criterion_main!(benches);
