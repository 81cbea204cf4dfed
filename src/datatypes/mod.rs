// src/datatypes/mod.rs
pub mod values;

pub use values::{DataType, Value};
