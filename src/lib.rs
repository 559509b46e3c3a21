pub mod config;
pub mod date_parser;
pub mod error;
pub mod normalize;
pub mod progress;
pub mod records;
pub mod session;
pub mod sheet;
pub mod tools;
