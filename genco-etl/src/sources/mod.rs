pub mod grid;
pub mod interactive_page;
pub mod static_page;

pub use grid::{parse_grid, RawCell, RawGrid};
pub use interactive_page::InteractivePageSource;
pub use static_page::StaticPageSource;
