//! Benchmarks for the JSON object scanner and cache fingerprinting.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use researchflow::providers::ChatMessage;
use researchflow::resilience::Fingerprint;
use researchflow::utils::extract_json_object;

fn scanner_benchmark(c: &mut Criterion) {
    let wrapped = format!(
        "Here is the report you asked for:\n{}\nLet me know if you need changes.",
        serde_json::json!({
            "title": "EV Adoption",
            "summary": "Sales {rose} sharply in 2024.",
            "key_findings": ["a", "b", "c"],
            "facts": [{"source": "s", "content": "nested {braces} \"quoted\""}],
        })
    );

    c.bench_function("extract_json_object", |b| {
        b.iter(|| extract_json_object(black_box(&wrapped)))
    });
}

fn fingerprint_benchmark(c: &mut Criterion) {
    let messages = vec![
        ChatMessage::system("You are an expert market research writer."),
        ChatMessage::user("x".repeat(4000)),
    ];

    c.bench_function("fingerprint", |b| {
        b.iter(|| Fingerprint::of(black_box("llama-3.3-70b-versatile"), black_box(&messages)))
    });
}

criterion_group!(benches, scanner_benchmark, fingerprint_benchmark);
criterion_main!(benches);
