//! MySQL/MariaDB source driver.
//!
//! Reads catalog metadata from INFORMATION_SCHEMA and streams rows with SQLx.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;

pub use reader::MysqlReader;
