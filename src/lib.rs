//! Purpose: Library crate behind the `carpanel` CLI and tests.
//! Exports: `api` (stores, panel, errors), `config` (backend choice), `core` (record model).
//! Role: Data-access layer for car records over a JSON document server or a CSV file.
//! Invariants: Everything outside `core` reaches storage through `api::CarDataAccessor`.
pub mod api;
pub mod config;
pub mod core;
