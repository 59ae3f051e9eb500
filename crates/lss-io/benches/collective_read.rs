use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lss_core::{Column, LssError};
use lss_io::{open, run_spmd, write_binary, Batch};
use ndarray::{ArrayD, IxDyn};

fn bench_collective_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.bin");
    let rows = 1 << 16;
    let pos = Column::F8(ArrayD::from_shape_fn(IxDyn(&[rows, 3]), |idx| {
        (idx[0] * 3 + idx[1]) as f64
    }));
    write_binary(&path, &[], &[&pos, &pos]).expect("write fixture");
    let full = open(&format!("flat:{}:f8", path.display())).expect("open full");
    let chunked = open(&format!("flat:{}:f8:-bunchsize:4096", path.display())).expect("open chunked");

    c.bench_function("collective_read_full_4_workers", |b| {
        b.iter(|| {
            let batches = run_spmd(4, |comm| {
                full.read(&["Position", "Velocity"], comm, true)
                    .expect("valid request")
                    .collect::<Result<Vec<Batch>, LssError>>()
                    .expect("read")
            });
            black_box(batches)
        })
    });

    c.bench_function("collective_read_chunked_4_workers", |b| {
        b.iter(|| {
            let batches = run_spmd(4, |comm| {
                chunked
                    .read(&["Position"], comm, false)
                    .expect("valid request")
                    .map(|batch| batch.map(|batch| batch.rows()))
                    .collect::<Result<Vec<usize>, LssError>>()
                    .expect("read")
            });
            black_box(batches)
        })
    });
}

criterion_group!(benches, bench_collective_read);
criterion_main!(benches);
