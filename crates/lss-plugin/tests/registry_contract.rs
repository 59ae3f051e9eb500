use std::sync::{OnceLock, RwLock};

use lss_core::LssError;
use lss_plugin::{
    ArgKind, ArgSchema, ArgSpec, ArgValue, ExtensionPoint, ParsedArgs, Plugin, PluginRegistry,
    Registration,
};

trait Shape: Send + Sync {
    fn area(&self) -> f64;
}

struct Shapes;

impl ExtensionPoint for Shapes {
    const FAMILY: &'static str = "Shape";
    type Object = dyn Shape;

    fn registry() -> &'static RwLock<PluginRegistry<Self>> {
        static REGISTRY: OnceLock<RwLock<PluginRegistry<Shapes>>> = OnceLock::new();
        REGISTRY.get_or_init(|| RwLock::new(PluginRegistry::new()))
    }
}

struct Square {
    side: f64,
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

impl Plugin<Shapes> for Square {
    const KEY: &'static str = "square";

    fn declare_schema(schema: &mut ArgSchema) {
        schema
            .set_description("an axis aligned square")
            .add(ArgSpec::positional("side", ArgKind::Float).help("edge length"));
    }

    fn construct(args: &ParsedArgs) -> Result<Box<dyn Shape>, LssError> {
        Ok(Box::new(Square {
            side: args.get("side")?,
        }))
    }
}

struct Rect {
    width: f64,
    height: f64,
}

impl Shape for Rect {
    fn area(&self) -> f64 {
        self.width * self.height
    }
}

impl Plugin<Shapes> for Rect {
    const KEY: &'static str = "rect";

    fn declare_schema(schema: &mut ArgSchema) {
        schema
            .add(ArgSpec::positional("width", ArgKind::Float))
            .add(ArgSpec::positional("height", ArgKind::Float));
    }

    fn construct(args: &ParsedArgs) -> Result<Box<dyn Shape>, LssError> {
        let scale: f64 = args.get("scale")?;
        Ok(Box::new(Rect {
            width: args.get::<f64>("width")? * scale,
            height: args.get::<f64>("height")? * scale,
        }))
    }

    fn post_register(schema: &mut ArgSchema) {
        schema.add(
            ArgSpec::option("scale", ArgKind::Float)
                .default_value(ArgValue::Float(1.0))
                .help("uniform scale factor"),
        );
    }
}

#[test]
fn distinct_keys_register_and_duplicates_fail() {
    let mut registry = PluginRegistry::<Shapes>::new();
    registry
        .register(Registration::of::<Square>().unwrap())
        .expect("first key");
    registry
        .register(Registration::of::<Rect>().unwrap())
        .expect("second key");
    assert_eq!(registry.keys(), vec!["rect".to_string(), "square".to_string()]);

    let err = registry
        .register(Registration::of::<Square>().unwrap())
        .expect_err("duplicate key");
    assert!(matches!(err, LssError::DuplicateRegistration(_)));
    assert_eq!(err.info().context.get("key").map(String::as_str), Some("square"));
    assert_eq!(registry.len(), 2);
}

#[test]
fn duplicate_does_not_overwrite_entry() {
    let mut registry = PluginRegistry::<Shapes>::new();
    registry.register(Registration::of::<Square>().unwrap()).unwrap();
    let mut schema = ArgSchema::new("square");
    schema.add(ArgSpec::positional("radius", ArgKind::Float));
    let imposter = Registration::<Shapes>::from_parts(schema, |_| {
        Ok(Box::new(Square { side: 0.0 }) as Box<dyn Shape>)
    })
    .unwrap();
    assert!(registry.register(imposter).is_err());
    assert!(registry.resolve("square").unwrap().schema().get("side").is_some());
}

#[test]
fn post_register_hook_extends_schema() {
    let mut registry = PluginRegistry::<Shapes>::new();
    registry.register(Registration::of::<Rect>().unwrap()).unwrap();
    let entry = registry.resolve("rect").unwrap();
    assert!(entry.schema().get("scale").is_some());
    let shape = entry
        .build(&["2".to_string(), "3".to_string(), "-scale".to_string(), "2".to_string()])
        .unwrap();
    assert_eq!(shape.area(), 24.0);
}

#[test]
fn unknown_key_lists_choices() {
    let mut registry = PluginRegistry::<Shapes>::new();
    registry.register(Registration::of::<Square>().unwrap()).unwrap();
    let err = registry.resolve("circle").expect_err("unknown");
    assert_eq!(err.class(), "UnknownPluginError");
    assert_eq!(err.info().context.get("choices").map(String::as_str), Some("square"));
}

#[test]
fn describe_empty_family_returns_sentinel() {
    let registry = PluginRegistry::<Shapes>::new();
    assert_eq!(registry.describe(), "No available Shape plugins");
}

#[test]
fn describe_concatenates_help() {
    let mut registry = PluginRegistry::<Shapes>::new();
    registry.register(Registration::of::<Square>().unwrap()).unwrap();
    registry.register(Registration::of::<Rect>().unwrap()).unwrap();
    let help = registry.describe();
    assert!(help.contains("usage: square:side"));
    assert!(help.contains("usage: rect:width:height[:-scale:FLOAT]"));
    assert!(help.contains("an axis aligned square"));
}

#[test]
fn invalid_schema_is_rejected_at_registration() {
    let mut schema = ArgSchema::new("broken");
    schema
        .add(ArgSpec::positional("a", ArgKind::Int))
        .add(ArgSpec::positional("a", ArgKind::Int));
    let err = Registration::<Shapes>::from_parts(schema, |_| {
        Ok(Box::new(Square { side: 1.0 }) as Box<dyn Shape>)
    })
    .expect_err("duplicate argument");
    assert_eq!(err.info().code, "schema-duplicate-argument");
}

#[test]
fn global_registry_opens_connections() {
    Shapes::register::<Square>().expect("register square globally");
    assert!(Shapes::keys().contains(&"square".to_string()));
    let err = Shapes::register::<Square>().expect_err("second global registration");
    assert!(matches!(err, LssError::DuplicateRegistration(_)));

    let a = Shapes::open("square:2").expect("open");
    let b = Shapes::open("square:2").expect("open");
    let c = Shapes::open("square:2.0").expect("open");
    assert_eq!(a.area(), 4.0);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(Shapes::describe().contains("square"));
}
