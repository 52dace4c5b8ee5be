//! Integration tests for parameter sets used by models

// JSON files of parameter sets
mod files;
