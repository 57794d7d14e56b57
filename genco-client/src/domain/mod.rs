mod hourly_generation;

pub use hourly_generation::{date_label, parse_date_label, HourlyGeneration};
