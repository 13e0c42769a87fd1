use criterion::{criterion_group, criterion_main, Criterion};
use swathedit::geometry::footprint::Footprint;
use swathedit::gridding::grid::{BeamSample, GridGeometry, GridOptions, IncrementalGrid};

const PINGS: usize = 400;
const BEAMS: usize = 256;

fn survey() -> Vec<BeamSample> {
    let mut samples = Vec::with_capacity(PINGS * BEAMS);
    for p in 0..PINGS {
        let nav = (250.0, p as f64 * 1.25);
        for b in 0..BEAMS {
            let across = -200.0 + 400.0 * b as f64 / (BEAMS - 1) as f64;
            let depth = 50.0 + 0.02 * across + (p as f64 * 0.1).sin();
            let beam = (nav.0 + across, nav.1);
            samples.push(BeamSample {
                x: beam.0,
                y: beam.1,
                depth,
                footprint: Footprint::for_beam(beam, nav, depth, depth, 1.0, 1.0),
            });
        }
    }
    samples
}

fn grid(parallel: bool) -> IncrementalGrid {
    let geometry = GridGeometry::new(0.0, 500.0, -10.0, 510.0, 2.0, 2.0).expect("Invalid geometry");
    let options = GridOptions {
        parallel,
        ..Default::default()
    };
    IncrementalGrid::new(geometry, options).expect("Could not allocate grid")
}

fn criterion_benchmark(c: &mut Criterion) {
    let samples = survey();
    let mut serial = grid(false);
    let mut parallel = grid(true);
    c.bench_function("Rebuild", |b| {
        b.iter(|| serial.rebuild_from(&samples).expect("Rebuild failed"))
    });
    c.bench_function("Parallel Rebuild", |b| {
        b.iter(|| parallel.rebuild_from(&samples).expect("Rebuild failed"))
    });
    c.bench_function("Edit One Beam", |b| {
        b.iter(|| {
            serial.remove_beam(&samples[PINGS * BEAMS / 2]);
            serial.add_beam(&samples[PINGS * BEAMS / 2]);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
