pub mod convert;
pub mod histogram;
pub mod inspect;
pub mod plugins;
