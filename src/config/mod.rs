pub mod loader;
pub mod schema;

pub use loader::{
    compile_tracked_kinds, load_from_env_or_file, load_from_path, validate, ENV_PREFIX,
};
pub use schema::{
    EventLevel, InterceptorConfig, ListenerConfig, LogFormat, LoggingConfig, TaggerConfig,
};
