pub mod csv_file;
pub mod mysql;

pub use csv_file::CsvFileSink;
pub use mysql::MySqlSink;
