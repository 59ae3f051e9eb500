use lss_core::Column;
use lss_store::{
    new, open, register_builtin_storage, BinnedResult, MeasurementStorages, MetaValue, Metadata,
    Sink,
};
use lss_plugin::ExtensionPoint;
use ndarray::{ArrayD, IxDyn};
use tempfile::tempdir;

fn ones(shape: &[usize]) -> Column {
    Column::F8(ArrayD::from_elem(IxDyn(shape), 1.0))
}

#[test]
fn dash_and_empty_path_select_stdout() {
    assert_eq!(Sink::parse("-"), Sink::Stdout);
    assert_eq!(Sink::parse(""), Sink::Stdout);
    assert!(!Sink::parse("out.txt").is_stdout());
    assert_eq!(Sink::Stdout.to_string(), "<stdout>");

    let storage = new("1d", "-").unwrap();
    assert!(storage.sink().is_stdout());
    assert_eq!(storage.dims(), 1);
    let storage = new("2d", "").unwrap();
    assert!(storage.sink().is_stdout());
}

#[test]
fn writing_to_stdout_leaves_it_open() {
    let storage = new("1d", "-").unwrap();
    for _ in 0..2 {
        storage
            .write(vec![vec![0.0, 1.0]], &["v"], vec![ones(&[1])], Metadata::new())
            .unwrap();
    }
}

#[test]
fn builtin_writers_cover_one_to_three_axes() {
    register_builtin_storage().unwrap();
    register_builtin_storage().unwrap();
    assert_eq!(MeasurementStorages::keys(), vec!["1d", "2d", "3d"]);
    let help = MeasurementStorages::describe();
    assert!(help.contains("usage: 1d[:path]"), "{help}");
}

#[test]
fn unknown_dimensionality_is_an_unknown_plugin() {
    let err = new("4d", "-").unwrap_err();
    assert_eq!(err.class(), "UnknownPluginError");
    assert!(err.info().hint.as_deref().unwrap_or("").contains("1d, 2d, 3d"));
}

#[test]
fn connection_strings_open_writers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let connection = format!("3d:{}", path.display());
    let handle = open(&connection).unwrap();
    assert_eq!(handle.dims(), 3);
    assert_eq!(handle.sink(), &Sink::Path(path));
    assert_eq!(handle, open(&connection).unwrap());
}

#[test]
fn dims_mismatch_is_rejected_before_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.txt");
    let storage = new("2d", path.to_str().unwrap()).unwrap();
    let err = storage
        .write(vec![vec![0.0, 1.0]], &["v"], vec![ones(&[1])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "storage-dims");
    assert!(!path.exists());
}

#[test]
fn invalid_results_are_rejected() {
    let storage = new("1d", "-").unwrap();
    let edges = || vec![vec![0.0, 1.0, 2.0]];

    let err = storage
        .write(edges(), &["v"], vec![ones(&[3])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "binned-shape");

    let err = storage
        .write(edges(), &["v", "v"], vec![ones(&[2]), ones(&[2])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "binned-names");

    let err = storage
        .write(edges(), &["v", "w"], vec![ones(&[2])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "binned-columns");

    let err = storage
        .write(vec![vec![0.0]], &["v"], vec![ones(&[0])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "binned-edges");

    let mut meta = Metadata::new();
    meta.insert("shotnoise".into(), MetaValue::Float(f64::NAN));
    let err = storage
        .write(edges(), &["v"], vec![ones(&[2])], meta)
        .unwrap_err();
    assert_eq!(err.info().code, "binned-metadata");
}

#[test]
fn results_need_one_to_three_axes() {
    let err = BinnedResult::new(Vec::new(), Vec::new(), Vec::new(), Metadata::new()).unwrap_err();
    assert_eq!(err.info().code, "binned-dims");
    let four = vec![vec![0.0, 1.0]; 4];
    let err = BinnedResult::new(four, vec!["v".into()], vec![ones(&[1, 1, 1, 1])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.info().code, "binned-dims");
}

#[test]
fn unwritable_path_fails_on_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("out.txt");
    let storage = new("1d", path.to_str().unwrap()).unwrap();
    let err = storage
        .write(vec![vec![0.0, 1.0]], &["v"], vec![ones(&[1])], Metadata::new())
        .unwrap_err();
    assert_eq!(err.class(), "IoError");
    assert_eq!(err.info().code, "sink-create");
}
