pub mod app;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod join;
pub mod keeping;
pub mod notion;
pub mod output;
pub mod paginate;
pub mod sink;
pub mod warehouse;
