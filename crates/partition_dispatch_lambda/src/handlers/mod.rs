pub mod batch;
pub mod partition;
