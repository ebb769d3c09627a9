//! Integration tests for ticker-pipe

mod config_test;
mod pipeline_test;
mod support;
