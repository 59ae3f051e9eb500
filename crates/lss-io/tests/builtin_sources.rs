use lss_core::{Column, ColumnDescr, DType, LssError};
use lss_io::{open, register_builtin_sources, DataSources, FlatSource, SelfComm, UniformSource};
use lss_plugin::ExtensionPoint;
use proptest::prelude::*;

fn read_one(connection: &str, columns: &[&str]) -> Vec<Column> {
    let source = open(connection).unwrap();
    let mut batches = source
        .read(columns, &SelfComm, true)
        .unwrap()
        .collect::<Result<Vec<_>, LssError>>()
        .unwrap();
    assert_eq!(batches.len(), 1);
    batches.remove(0).into_columns()
}

#[test]
fn builtins_register_once() {
    register_builtin_sources().unwrap();
    register_builtin_sources().unwrap();
    let keys = DataSources::keys();
    assert!(keys.contains(&"flat".to_string()));
    assert!(keys.contains(&"uniform".to_string()));

    let err = DataSources::register::<FlatSource>().expect_err("already registered");
    assert!(matches!(err, LssError::DuplicateRegistration(_)));
    let err = DataSources::register::<UniformSource>().expect_err("already registered");
    assert_eq!(err.class(), "DuplicateRegistrationError");
}

#[test]
fn help_describes_every_builtin() {
    register_builtin_sources().unwrap();
    let help = DataSources::describe();
    assert!(help.contains("usage: flat:path:dtype[:-columns:LAYOUT]"));
    assert!(help.contains("usage: uniform:N:BoxSize"));
}

#[test]
fn unknown_keys_and_bad_arguments_are_reported() {
    let err = open("hdf5:/tmp/x.h5").expect_err("not a builtin");
    assert_eq!(err.class(), "UnknownPluginError");
    assert!(err.info().context["choices"].contains("flat"));

    for connection in [
        "flat:/tmp/x.bin",
        "flat:/tmp/x.bin:c16",
        "flat:/tmp/x.bin:f8:-columns:Position[3",
        "flat:/tmp/x.bin:f8:-size:1024.0",
        "uniform:10:1 2",
        "uniform:10:1:-dtype:i4",
        "uniform:-3:1",
    ] {
        let err = open(connection).expect_err(connection);
        assert_eq!(err.class(), "SchemaValidationError", "{connection}");
    }
    assert_eq!(open("").expect_err("empty").class(), "MalformedConnectionError");
}

#[test]
fn flat_columns_follow_the_layout() {
    let source = open("flat:/tmp/x.bin:f4:-columns:Position[3],Mass").unwrap();
    assert_eq!(
        source.columns(),
        vec![
            ("Position".to_string(), ColumnDescr::vector(DType::F4, 3)),
            ("Mass".to_string(), ColumnDescr::scalar(DType::F4)),
            ("Weight".to_string(), ColumnDescr::scalar(DType::F8)),
        ]
    );
    let stored = open("flat:/tmp/x.bin:f4:-columns:Position[3],Weight").unwrap();
    assert_eq!(stored.describe_column("Weight"), Some(ColumnDescr::scalar(DType::F4)));
}

#[test]
fn uniform_catalog_is_deterministic_per_column() {
    let both = read_one("uniform:200:1 2 3:-seed:7", &["Position", "Velocity"]);
    let velocity = read_one("uniform:200:1 2 3:-seed:7", &["Velocity"]);
    assert_eq!(both[1], velocity[0]);

    let reseeded = read_one("uniform:200:1 2 3:-seed:8", &["Position"]);
    assert_ne!(both[0], reseeded[0]);

    let positions = both[0].to_f64();
    for row in positions.outer_iter() {
        for (axis, value) in row.iter().enumerate() {
            assert!(*value >= 0.0 && *value < (axis + 1) as f64);
        }
    }
    assert!(both[1].to_f64().iter().all(|v| (-1.0..1.0).contains(v)));
}

#[test]
fn uniform_supports_single_precision_and_ids() {
    let columns = read_one("uniform:16:100:-dtype:f4:-max_speed:0", &["Position", "Velocity", "ID"]);
    assert_eq!(columns[0].dtype(), DType::F4);
    assert!(columns[1].to_f64().iter().all(|v| *v == 0.0));
    assert_eq!(
        columns[2].to_f64().iter().copied().collect::<Vec<_>>(),
        (0..16).map(f64::from).collect::<Vec<_>>()
    );
}

proptest! {
    #[test]
    fn uniform_reads_match_declared_size(n in 0usize..64, seed in any::<u32>()) {
        let columns = read_one(&format!("uniform:{n}:5:-seed:{seed}"), &["ID", "Position"]);
        prop_assert_eq!(columns[0].len(), n);
        prop_assert_eq!(columns[1].shape(), &[n, 3][..]);
    }
}
