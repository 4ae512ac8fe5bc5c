mod tracing;

pub use self::tracing::{init as init_tracing, init_with_level as init_tracing_with_level};
pub use ::tracing::level_filters::LevelFilter;
