//! Engine configuration
//!
//! One YAML file holds every section. Each section defaults field by field,
//! so partial files are valid.
//!
//! ```ignore
//! use encore_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{AnalysisConfig, EngineConfig, MetronomeConfig, PlaybackConfig, StorageConfig};
pub use io::{load_config, save_config};
pub use paths::{default_config_path, default_data_path};
