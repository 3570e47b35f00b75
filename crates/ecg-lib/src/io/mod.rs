pub mod chunks;
pub mod dataset;
