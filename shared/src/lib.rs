pub mod logging;
pub mod telemetry;
pub mod types;
pub mod utils;
