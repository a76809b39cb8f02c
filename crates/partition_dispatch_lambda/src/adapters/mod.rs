pub mod delay;
pub mod dynamodb;
pub mod invoke;
pub mod store;
