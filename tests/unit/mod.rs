//! Unit tests for all safetensors-mmap modules

mod file_tests;
mod memory_tests;
