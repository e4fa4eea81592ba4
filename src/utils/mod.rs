//! Utility modules for the batch runner

pub mod file_input;
