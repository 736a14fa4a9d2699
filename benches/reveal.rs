use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use marchscape::math::CellBounds;
use marchscape::reveal::{
    CandidateIndex, CrossingMarker, IsosurfaceExtractor, MeshRevealer, RevealerConfig,
    VertexBuffer, VoxelGrid,
};

fn bench_candidate_index_64(c: &mut Criterion) {
    let field = VoxelGrid::sphere(64, 64, 64).unwrap();

    c.bench_function("candidate_index_64", |b| {
        b.iter(|| CandidateIndex::build(black_box(&field)));
    });
}

fn bench_candidate_index_128(c: &mut Criterion) {
    let field = VoxelGrid::sphere(128, 128, 128).unwrap();

    c.bench_function("candidate_index_128", |b| {
        b.iter(|| CandidateIndex::build(black_box(&field)));
    });
}

fn bench_polygonize_candidates_64(c: &mut Criterion) {
    let field = VoxelGrid::sphere(64, 64, 64).unwrap();
    let index = CandidateIndex::build(&field);
    let cells: Vec<CellBounds> = (0..index.len()).filter_map(|k| index.bounds(k)).collect();

    c.bench_function("polygonize_candidates_64", |b| {
        b.iter(|| {
            let mut primitives = 0;
            for cell in &cells {
                primitives += CrossingMarker.polygonize(&field, 128, black_box(*cell)).len() / 3;
            }
            black_box(primitives)
        });
    });
}

fn bench_full_reveal_48(c: &mut Criterion) {
    let field = Arc::new(VoxelGrid::sphere(48, 48, 48).unwrap());
    let config = RevealerConfig {
        worker_name: "bench-revealer".to_string(),
        ..Default::default()
    };

    c.bench_function("full_reveal_48", |b| {
        b.iter(|| {
            let revealer = MeshRevealer::new(
                field.clone(),
                CrossingMarker,
                [VertexBuffer::new(), VertexBuffer::new()],
                &config,
            )
            .unwrap();
            revealer.request(usize::MAX).unwrap();
            revealer.wait_idle(Duration::from_secs(30));
            black_box(revealer.current_mesh().primitive_count())
        });
    });
}

criterion_group!(
    benches,
    bench_candidate_index_64,
    bench_candidate_index_128,
    bench_polygonize_candidates_64,
    bench_full_reveal_48,
);
criterion_main!(benches);
