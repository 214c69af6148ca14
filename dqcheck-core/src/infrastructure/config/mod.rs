pub mod engine;

pub use engine::{apply_env_overrides, load_engine_config};
