use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use textbook_rag::chunking::{ChunkingConfig, chunk_text};
use textbook_rag::markup::strip_markdown;

fn sample_chapter() -> String {
    let mut chapter = String::from("---\ntitle: Locomotion\n---\n\n# Locomotion\n\n");
    for section in 0..40 {
        chapter.push_str(&format!("## Section {}\n\n", section));
        chapter.push_str(
            "Bipedal walking relies on **balance control**, where the *zero moment point* \
             stays inside the support polygon. See [the appendix](appendix.md) for details.\n\n",
        );
        chapter.push_str("- joint torque limits\n- sensor latency\n- contact detection\n\n");
        chapter.push_str("```rust\nlet zmp = estimate(&forces);\n```\n\n");
    }
    chapter
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let chapter = sample_chapter();
    let text = strip_markdown(&chapter);
    let config = ChunkingConfig::default();

    c.bench_function("strip_markdown", |b| {
        b.iter(|| strip_markdown(black_box(&chapter)))
    });
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
