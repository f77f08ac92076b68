//! PostgreSQL source driver.
//!
//! - [`PostgresReader`]: catalog introspection and text-mode row streaming

mod reader;

pub use reader::PostgresReader;
