// dqcheck-core/src/domain/data/mod.rs

pub mod row;
pub mod value;

pub use row::{Row, resolve_column};
pub use value::{Value, parse_datetime, parse_numeric};
