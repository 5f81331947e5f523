//! Integration test modules

pub mod experiment_parser;
pub mod test_utils;
pub mod upload_pipeline;
