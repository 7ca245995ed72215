pub mod fleet;
pub mod streams;
pub mod telemetry;
