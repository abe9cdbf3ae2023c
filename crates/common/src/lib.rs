pub mod config;
pub mod logging;
mod spans;

pub use config::Environment;
pub use logging::{build_subscriber, init_test_logging, try_setup_logging};
