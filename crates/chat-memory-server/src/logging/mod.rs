mod logger;

pub use logger::{init_logger, LogFormat, DEFAULT_FILTER};
