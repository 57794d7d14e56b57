mod hourly_generation_queries;

pub use hourly_generation_queries::{count_for_date, delete_for_date, rows_for_date, table_ident};
