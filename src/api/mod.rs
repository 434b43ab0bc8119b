//! Purpose: Define the public Rust API boundary for carpanel.
//! Exports: The record model, the accessor contract, both stores, and `CarPanel`.
//! Role: Stable surface used by the CLI, the dev server, and integration tests.
//! Invariants: Callers depend on `CarDataAccessor`, never on a concrete store.

mod local;
mod panel;
mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::accessor::{CarDataAccessor, StoreResult};
pub use crate::core::car::{
    Car, CarFields, FIELDS, Field, MAX_PRODUCTION_YEAR, MIN_PRODUCTION_YEAR, parse_convertible,
    parse_id, parse_production_year, validate,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::ids::{next_id, next_id_for};
pub use local::CsvStore;
pub use panel::CarPanel;
pub use remote::{DEFAULT_TIMEOUT, RemoteOptions, RemoteStore};
