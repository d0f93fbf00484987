pub mod analysis;
pub mod backtest;
pub mod config;
pub mod error;
pub mod features;
pub mod field_index;
pub mod labels;
pub mod loan_filter;
pub mod metric;
pub mod model;
pub mod padding;
pub mod record_reader;
pub mod rng;
pub mod sample;
pub mod sample_builder;
pub mod schema;
pub mod store;
pub mod table;
pub mod types;
