//! Purpose: Declare the CRUD contract every car store implements.
//! Exports: `CarDataAccessor`, `StoreResult`.
//! Role: The rest of the crate holds a `dyn CarDataAccessor` chosen once at startup.
//! Invariants: Each call is self-contained; no atomicity across a sequence of calls.
//! Invariants: Transport and I/O errors are logged by the store and returned as `Error`.
use super::car::Car;
use super::error::Error;

pub type StoreResult<T> = Result<T, Error>;

pub trait CarDataAccessor {
    /// Short backend label used in logs and CLI output.
    fn backend(&self) -> &'static str;

    /// All records, ascending by numeric id.
    fn list_all(&self) -> StoreResult<Vec<Car>>;

    fn create(&self, car: &Car) -> StoreResult<()>;

    /// Fails with `ErrorKind::NotFound` when no record has `id`.
    fn delete(&self, id: u32) -> StoreResult<()>;

    /// `Ok(None)` is the not-found outcome; `Err` means the store could not answer.
    fn find_by_id(&self, id: u32) -> StoreResult<Option<Car>>;

    /// Replaces the record sharing `car.id`; `ErrorKind::NotFound` when it is absent.
    fn update(&self, car: &Car) -> StoreResult<()>;
}
