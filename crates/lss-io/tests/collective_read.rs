use std::path::{Path, PathBuf};

use lss_core::{Column, ColumnDescr, DType, LssError};
use lss_io::{open, run_spmd, write_binary, Batch, Communicator, SelfComm};
use ndarray::{ArrayD, IxDyn};
use tempfile::{tempdir, TempDir};

fn catalog(rows: usize) -> (TempDir, PathBuf, Column, Column) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let pos = Column::F8(ArrayD::from_shape_fn(IxDyn(&[rows, 3]), |idx| {
        idx[0] as f64 + idx[1] as f64 / 10.0
    }));
    let vel = Column::F8(ArrayD::from_shape_fn(IxDyn(&[rows, 3]), |idx| {
        -(idx[0] as f64) - idx[1] as f64 / 10.0
    }));
    write_binary(&path, &[], &[&pos, &vel]).unwrap();
    (dir, path, pos, vel)
}

fn connection(path: &Path, extra: &str) -> String {
    format!("flat:{}:f8{extra}", path.display())
}

fn read_batches(
    source: &lss_io::SourceHandle,
    columns: &[&str],
    comm: &dyn Communicator,
    full: bool,
) -> Result<Vec<Batch>, LssError> {
    source.read(columns, comm, full)?.collect()
}

#[test]
fn four_workers_agree_on_position_descriptors() {
    let (_dir, path, pos, _) = catalog(64);
    let source = open(&connection(&path, "")).unwrap();

    let results = run_spmd(4, |comm| read_batches(&source, &["Position"], comm, true));
    let expected = ColumnDescr::vector(DType::F8, 3);
    for (rank, result) in results.iter().enumerate() {
        let batches = result.as_ref().expect("read succeeds on every worker");
        assert_eq!(batches.len(), 1, "rank {rank}");
        let column = batches[0].column("Position").unwrap();
        assert_eq!(column.descr(), expected, "rank {rank}");
        if rank == 0 {
            assert_eq!(column, &pos);
        } else {
            assert_eq!(column.len(), 0, "rank {rank}");
            assert_eq!(column.shape(), &[0, 3]);
        }
    }

    let parts: Vec<Column> = results
        .into_iter()
        .map(|result| result.unwrap().remove(0).into_columns().remove(0))
        .collect();
    assert_eq!(Column::concat(&parts).unwrap(), pos);
}

#[test]
fn unknown_column_fails_on_every_worker() {
    let (_dir, path, _, _) = catalog(8);
    let source = open(&connection(&path, "")).unwrap();
    let errors = run_spmd(4, |comm| {
        read_batches(&source, &["Position", "Mass"], comm, false).expect_err("Mass is not stored")
    });
    assert!(errors.iter().all(|err| err.class() == "UnknownColumnError"));
    assert!(errors.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(errors[0].info().context.get("column").map(String::as_str), Some("Mass"));
}

#[test]
fn origin_failures_are_raised_everywhere() {
    let (_dir, path, _, _) = catalog(8);
    let source = open(&connection(&path, ":-size:100")).unwrap();
    let errors = run_spmd(3, |comm| {
        read_batches(&source, &["Position"], comm, true).expect_err("file is too short")
    });
    assert!(errors.iter().all(|err| err.info().code == "binary-truncated"));
    assert!(errors.windows(2).all(|pair| pair[0] == pair[1]));

    let missing = open("flat:/definitely/not/here.bin:f8").unwrap();
    let errors = run_spmd(2, |comm| {
        read_batches(&missing, &["Velocity"], comm, true).expect_err("no file")
    });
    assert!(errors.iter().all(|err| err.class() == "IoError"));
}

#[test]
fn overflowing_size_is_a_shape_error_on_every_worker() {
    let (_dir, path, _, _) = catalog(2);
    let source = open(&connection(&path, ":-size:9223372036854775807")).unwrap();

    let err = read_batches(&source, &["Position"], &SelfComm, true).expect_err("size overflows");
    assert_eq!(err.class(), "ShapeError");
    assert_eq!(err.info().code, "binary-size");

    let errors = run_spmd(3, |comm| {
        read_batches(&source, &["Velocity"], comm, false).expect_err("size overflows")
    });
    assert!(errors.iter().all(|err| err.info().code == "binary-size"));
    assert!(errors.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn chunked_failure_stops_every_worker_at_the_same_step() {
    let (_dir, path, _, _) = catalog(10);
    let source = open(&connection(&path, ":-bunchsize:3")).unwrap();
    let outcomes = run_spmd(3, |comm| {
        let mut steps = Vec::new();
        for batch in source.read(&["Position"], comm, false).unwrap() {
            steps.push(batch.map(|batch| batch.rows()).map_err(|err| err.info().code.clone()));
            // Keep only the first Position chunk once the origin has read it.
            if comm.rank() == 0 && steps.len() == 1 {
                let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
                file.set_len(3 * 24).unwrap();
            }
        }
        steps
    });
    assert_eq!(outcomes[0], vec![Ok(3), Err("binary-read".to_string())]);
    for steps in &outcomes[1..] {
        assert_eq!(steps, &vec![Ok(0), Err("binary-read".to_string())]);
    }
}

#[test]
fn single_worker_full_read_returns_declared_size() {
    let (_dir, path, pos, vel) = catalog(32);
    let source = open(&connection(&path, ":-bunchsize:5")).unwrap();
    for columns in [vec!["Position"], vec!["Velocity", "Weight"], vec!["Weight", "Position", "Velocity"]] {
        let batches = read_batches(&source, &columns, &SelfComm, true).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows(), 32);
        assert_eq!(batches[0].names(), columns.as_slice());
    }
    let batches = read_batches(&source, &["Velocity", "Weight", "Position"], &SelfComm, true).unwrap();
    assert_eq!(batches[0].column("Velocity"), Some(&vel));
    assert_eq!(batches[0].column("Position"), Some(&pos));
    assert_eq!(
        batches[0].column("Weight").unwrap().to_f64(),
        ArrayD::<f64>::ones(IxDyn(&[32]))
    );
}

#[test]
fn chunked_reads_step_in_lockstep() {
    let (_dir, path, pos, _) = catalog(10);
    let source = open(&connection(&path, ":-bunchsize:3")).unwrap();
    let results = run_spmd(3, |comm| read_batches(&source, &["Position"], comm, false).unwrap());

    let origin_rows: Vec<usize> = results[0].iter().map(Batch::rows).collect();
    assert_eq!(origin_rows, vec![3, 3, 3, 1]);
    for batches in &results[1..] {
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|batch| batch.rows() == 0));
        assert!(batches
            .iter()
            .all(|batch| batch.descrs() == vec![ColumnDescr::vector(DType::F8, 3)]));
    }
    let parts: Vec<Column> = results[0]
        .iter()
        .map(|batch| batch.columns()[0].clone())
        .collect();
    assert_eq!(Column::concat(&parts).unwrap(), pos);
}

#[test]
fn empty_chunked_source_yields_one_empty_batch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();
    let source = open(&connection(&path, ":-bunchsize:4")).unwrap();
    let results = run_spmd(2, |comm| read_batches(&source, &["Position", "Weight"], comm, false).unwrap());
    for batches in results {
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows(), 0);
        assert_eq!(batches[0].columns()[1].dtype(), DType::F8);
    }
}

#[test]
fn identical_connections_compare_equal() {
    let (_dir, path, _, _) = catalog(4);
    let a = open(&connection(&path, "")).unwrap();
    let b = open(&connection(&path, "")).unwrap();
    let c = open(&connection(&path, ":-header:0")).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}
