pub mod database;
pub mod models;
pub mod writer;

pub use database::Database;
pub use models::DocumentState;
pub use writer::{read_text, write_csv, write_text, CsvRow};
