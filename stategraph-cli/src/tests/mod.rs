//! Unit tests for stategraph-cli, organized by module.
//!
//! Each submodule documents the behaviour under test.
