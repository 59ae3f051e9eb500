use std::collections::BTreeMap;
use std::path::Path;

use lss_core::{Column, ColumnDescr, DType, LssError};
use lss_io::{write_binary, BinaryFile, BinaryOptions};
use ndarray::{ArrayD, IxDyn};
use tempfile::tempdir;

const ROWS: usize = 1024;

fn vectors(rows: usize, shift: f64) -> Column {
    Column::F8(ArrayD::from_shape_fn(IxDyn(&[rows, 3]), |idx| {
        (idx[0] * 3 + idx[1]) as f64 * 0.25 + shift
    }))
}

fn layout() -> Vec<(String, ColumnDescr)> {
    vec![
        ("Position".to_string(), ColumnDescr::vector(DType::F8, 3)),
        ("Velocity".to_string(), ColumnDescr::vector(DType::F8, 3)),
    ]
}

fn header_bytes() -> Vec<u8> {
    (0..10_i64).flat_map(|v| v.to_le_bytes()).collect()
}

fn write_fixture(path: &Path, header: &[u8]) -> (Column, Column) {
    let pos = vectors(ROWS, 0.0);
    let vel = vectors(ROWS, 1000.0);
    write_binary(path, header, &[&pos, &vel]).expect("write fixture");
    (pos, vel)
}

#[test]
fn reads_blocks_with_explicit_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let (pos, vel) = write_fixture(&path, &[]);
    let options = BinaryOptions {
        size: Some(ROWS),
        ..BinaryOptions::default()
    };
    let file = BinaryFile::open(&path, &layout(), &options).unwrap();
    assert_eq!(file.size(), ROWS);
    assert_eq!(file.read("Position").unwrap(), pos);
    assert_eq!(file.read("Velocity").unwrap(), vel);
    assert_eq!(file.read_rows("Velocity", 10, 12).unwrap(), vel.slice_rows(10, 12).unwrap());
}

#[test]
fn explicit_offsets_must_cover_every_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let (pos, vel) = write_fixture(&path, &[]);
    let pos_bytes = pos.to_le_bytes().len() as u64;

    let offsets = BTreeMap::from([("Position".to_string(), 0), ("Velocity".to_string(), pos_bytes)]);
    let options = BinaryOptions {
        size: Some(ROWS),
        offsets: Some(offsets),
        ..BinaryOptions::default()
    };
    let file = BinaryFile::open(&path, &layout(), &options).unwrap();
    assert_eq!(file.read("Position").unwrap(), pos);
    assert_eq!(file.read("Velocity").unwrap(), vel);

    let partial = BinaryOptions {
        size: Some(ROWS),
        offsets: Some(BTreeMap::from([("Position".to_string(), 0)])),
        ..BinaryOptions::default()
    };
    let err = BinaryFile::open(&path, &layout(), &partial).expect_err("missing offset");
    assert_eq!(err.info().code, "binary-offsets-missing");

    let stray = BinaryOptions {
        size: Some(ROWS),
        offsets: Some(BTreeMap::from([
            ("Position".to_string(), 0),
            ("Velocity".to_string(), pos_bytes),
            ("Mass".to_string(), 0),
        ])),
        ..BinaryOptions::default()
    };
    let err = BinaryFile::open(&path, &layout(), &stray).expect_err("unknown offset");
    assert_eq!(err.info().code, "binary-offsets-unknown");
}

#[test]
fn header_is_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let header = header_bytes();
    let (pos, _) = write_fixture(&path, &header);
    let options = BinaryOptions {
        header_size: header.len() as u64,
        size: Some(ROWS),
        ..BinaryOptions::default()
    };
    let file = BinaryFile::open(&path, &layout(), &options).unwrap();
    assert_eq!(file.size(), ROWS);
    assert_eq!(file.read("Position").unwrap(), pos);
}

#[test]
fn size_is_inferred_from_file_length() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let header = header_bytes();
    let (_, vel) = write_fixture(&path, &header);
    let options = BinaryOptions {
        header_size: header.len() as u64,
        ..BinaryOptions::default()
    };
    let file = BinaryFile::open(&path, &layout(), &options).unwrap();
    assert_eq!(file.size(), ROWS);
    assert_eq!(file.read("Velocity").unwrap(), vel);
}

#[test]
fn wrong_header_size_breaks_inference() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let header = header_bytes();
    write_fixture(&path, &header);
    let options = BinaryOptions {
        header_size: header.len() as u64 - 1,
        ..BinaryOptions::default()
    };
    let err = BinaryFile::open(&path, &layout(), &options).expect_err("ragged length");
    assert!(matches!(err, LssError::Shape(_)));
    assert_eq!(err.info().code, "binary-size-infer");
}

#[test]
fn oversized_layouts_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    write_fixture(&path, &[]);
    let too_many = BinaryOptions {
        size: Some(ROWS + 1),
        ..BinaryOptions::default()
    };
    let err = BinaryFile::open(&path, &layout(), &too_many).expect_err("truncated");
    assert_eq!(err.info().code, "binary-truncated");

    let huge_header = BinaryOptions {
        header_size: 1 << 40,
        ..BinaryOptions::default()
    };
    let err = BinaryFile::open(&path, &layout(), &huge_header).expect_err("header");
    assert_eq!(err.info().code, "binary-header");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = BinaryFile::open(dir.path().join("absent.bin"), &layout(), &BinaryOptions::default())
        .expect_err("missing file");
    assert_eq!(err.class(), "IoError");
}

#[test]
fn read_ranges_are_bounds_checked() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.bin");
    write_fixture(&path, &[]);
    let file = BinaryFile::open(&path, &layout(), &BinaryOptions::default()).unwrap();
    assert_eq!(file.read_rows("Position", 5, 5).unwrap().len(), 0);
    assert!(file.read_rows("Position", 0, ROWS + 1).is_err());
    assert!(matches!(
        file.read("Mass").expect_err("no such field"),
        LssError::UnknownColumn(_)
    ));
}

#[test]
fn write_rejects_ragged_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ragged.bin");
    let err = write_binary(&path, &[], &[&vectors(3, 0.0), &vectors(4, 0.0)]).expect_err("ragged");
    assert_eq!(err.info().code, "binary-write-rows");
    assert!(!path.exists());
}
