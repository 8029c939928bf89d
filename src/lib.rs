pub mod config;
pub mod parser;
pub mod storage;
pub mod sync;
pub mod utils;
