//! Benchmarks for stage output handling
//!
//! Tests performance of line splitting and status pattern matching on
//! encoder-style progress output.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use videotool::backends::StageKind;
use videotool_av::{pipeline::parse_line, LineReader, StatusPattern};

/// x264 progress, one carriage-return terminated update per frame
fn x264_output(frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 1..=frames {
        out.extend_from_slice(
            format!(
                "[{:.1}%] {}/{} frames, 9.87 fps, 1520.33 kb/s, eta 0:00:21\r",
                i as f64 * 100.0 / frames as f64,
                i,
                frames
            )
            .as_bytes(),
        );
    }
    out.extend_from_slice(b"\nencoded frames\n");
    out
}

fn patterns(kind: StageKind) -> Vec<StatusPattern> {
    kind.default_patterns()
        .iter()
        .map(|(label, regex)| StatusPattern::new(*label, regex).unwrap())
        .collect()
}

fn bench_line_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_reader");

    let data = x264_output(1000);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk in [64usize, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut reader = LineReader::new();
                let mut count = 0;
                for piece in data.chunks(chunk) {
                    count += reader.feed(black_box(piece)).len();
                }
                count
            });
        });
    }

    group.finish();
}

fn bench_status_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_patterns");

    let cases = [
        (
            StageKind::X264,
            "x264_long",
            "[12.5%] 30/240 frames, 9.87 fps, 1520.33 kb/s, eta 0:00:21\r",
        ),
        (
            StageKind::Ffmpeg,
            "ffmpeg",
            "frame=  240 fps= 48 q=-0.0 size=N/A time=00:00:10.01 bitrate=N/A\r",
        ),
        (
            StageKind::Mplayer,
            "mplayer",
            "V:   4.2  105/105 10%  3%  0.0% 0 0 \r",
        ),
        (
            StageKind::X264,
            "no_match",
            "x264 [info]: profile Main, level 3.0\n",
        ),
    ];

    for (kind, name, line) in cases {
        let patterns = patterns(kind);
        group.bench_with_input(BenchmarkId::new("parse", name), &line, |b, line| {
            b.iter(|| parse_line(&patterns, black_box(line)).count());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_line_reader, bench_status_patterns);
criterion_main!(benches);
