pub mod health;
pub mod predict;
pub mod telemetry;
