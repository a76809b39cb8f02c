pub mod dispatcher;
pub mod scanner;
