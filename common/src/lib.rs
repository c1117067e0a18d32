pub mod logging;

pub use logging::LogFormat;
