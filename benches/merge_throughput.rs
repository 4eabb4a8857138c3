//! End-to-end merge throughput benchmarks
//!
//! Measures a full merge with varying:
//! - Question counts (1, 10, 50, 200)
//! - Picture share (text-only vs. every question carrying an image)
//!
//! Run benchmarks: `cargo bench --bench merge_throughput`
//!
//! Compare specific groups:
//! ```
//! cargo bench --bench merge_throughput -- "merge_throughput"
//! cargo bench --bench merge_throughput -- "picture_dedup"
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quire::{
    BinaryFormat, BinaryPayload, FragmentRecord, InMemoryFragmentSource, InMemoryTemplateSource,
    MergeEngine, MergeEngineBuilder, MergeRequest,
};
use std::hint::black_box;

const TEMPLATE: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#,
    r#"<HWPML Version="2.8"><HEAD SecCnt="1"><DOCSUMMARY/><DOCSETTING/>"#,
    r#"<MAPPINGTABLE><FACENAMELIST><FONTFACE Lang="Hangul" Count="1"><FONT Id="0" Name="Batang"/></FONTFACE></FACENAMELIST>"#,
    r#"<CHARSHAPELIST Count="1"><CHARSHAPE Id="0" Height="1000"><FONTID Hangul="0"/></CHARSHAPE></CHARSHAPELIST>"#,
    r#"<PARASHAPELIST Count="1"><PARASHAPE Id="0"/></PARASHAPELIST>"#,
    r#"<STYLELIST Count="1"><STYLE Id="0" Name="Normal" ParaShape="0" CharShape="0"/></STYLELIST></MAPPINGTABLE></HEAD>"#,
    r#"<BODY><SECTION Id="0"><P><TEXT><CHAR>{{CONTENT_HERE}}</CHAR></TEXT></P></SECTION></BODY><TAIL/></HWPML>"#,
);

/// A question with a few paragraphs and its own character shape.
fn question(i: usize, with_picture: bool) -> FragmentRecord {
    let picture = if with_picture {
        r#"<PICTURE><IMAGE data-hml-bin-id="fig"/></PICTURE>"#
    } else {
        ""
    };
    let markup = format!(
        r#"<P ParaShape="0" Style="0"><TEXT CharShape="0"><CHAR>{i}. Question {i} asks about x &amp; y.</CHAR>{picture}</TEXT></P>
           <P ParaShape="0"><TEXT CharShape="0"><CHAR>(a) first</CHAR></TEXT></P>
           <P ParaShape="0"><TEXT CharShape="0"><CHAR>(b) second</CHAR></TEXT></P>"#
    );
    let definitions = format!(
        r#"<MAPPINGTABLE><CHARSHAPELIST><CHARSHAPE Id="0" Height="{}"/></CHARSHAPELIST>
           <PARASHAPELIST><PARASHAPE Id="0"/></PARASHAPELIST>
           <STYLELIST><STYLE Id="0" Name="Normal" ParaShape="0" CharShape="0"/></STYLELIST></MAPPINGTABLE>"#,
        1000 + (i % 8) * 100
    );
    let mut record = FragmentRecord::new(markup).with_definitions(definitions);
    if with_picture {
        let bytes: Vec<u8> = (0..4096).map(|b| ((b * 7 + i % 4) % 251) as u8).collect();
        record = record.with_binary(BinaryPayload::raw("fig", BinaryFormat::Png, bytes));
    }
    record
}

fn engine(count: usize, with_pictures: bool) -> MergeEngine {
    let fragments = InMemoryFragmentSource::new();
    for i in 0..count {
        fragments
            .insert(format!("q{i}"), question(i, with_pictures))
            .expect("Failed to insert fragment");
    }
    let templates = InMemoryTemplateSource::new();
    templates
        .add("bench", TEMPLATE.as_bytes().to_vec())
        .expect("Failed to add template");
    MergeEngineBuilder::new()
        .with_fragment_source(fragments)
        .with_template_source(templates)
        .build()
        .expect("Failed to build engine")
}

fn request(count: usize) -> MergeRequest {
    MergeRequest::new("bench", (0..count).map(|i| format!("q{i}")))
}

/// Benchmark merge throughput with varying question counts
fn benchmark_merge_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_throughput");

    for count in [1, 10, 50, 200] {
        group.throughput(Throughput::Elements(count as u64));
        let engine = engine(count, false);
        let request = request(count);

        group.bench_with_input(BenchmarkId::new("questions", count), &count, |b, _| {
            b.iter(|| {
                let output = engine.merge(black_box(&request)).expect("Merge failed");
                black_box(output.bytes.len())
            });
        });
    }

    group.finish();
}

/// Benchmark merges where every question carries one of four images
fn benchmark_picture_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("picture_dedup");
    group.sample_size(20);

    for count in [10, 50] {
        group.throughput(Throughput::Elements(count as u64));
        let engine = engine(count, true);
        let request = request(count);

        group.bench_with_input(BenchmarkId::new("questions", count), &count, |b, _| {
            b.iter(|| {
                let output = engine.merge(black_box(&request)).expect("Merge failed");
                assert_eq!(output.report.binaries, count.min(4));
                black_box(output.bytes.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_merge_throughput, benchmark_picture_dedup);
criterion_main!(benches);
