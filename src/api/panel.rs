//! Purpose: Offer the record operations a front end needs on top of one store.
//! Exports: `CarPanel`.
//! Role: Collaborator-facing API; validates raw fields, assigns ids, delegates to the store.
//! Invariants: The panel never knows which backend it holds.
//! Invariants: Raw field data is validated before any store call.
#![allow(clippy::result_large_err)]

use tracing::{debug, error};

use crate::core::accessor::{CarDataAccessor, StoreResult};
use crate::core::car::{Car, CarFields, Field, validate};
use crate::core::error::{Error, ErrorKind};
use crate::core::ids::next_id_for;

pub struct CarPanel {
    store: Box<dyn CarDataAccessor>,
}

impl CarPanel {
    pub fn new(store: Box<dyn CarDataAccessor>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn CarDataAccessor {
        self.store.as_ref()
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn list(&self) -> StoreResult<Vec<Car>> {
        self.store.list_all()
    }

    pub fn get(&self, id: u32) -> StoreResult<Option<Car>> {
        self.store.find_by_id(id)
    }

    /// Smallest id not used by any stored record.
    pub fn next_id(&self) -> StoreResult<u32> {
        let cars = self.store.list_all()?;
        let id = next_id_for(&cars);
        debug!(id, "id to be assigned");
        Ok(id)
    }

    /// Creates a record; an absent or empty `id` field gets the next free id.
    pub fn add(&self, mut fields: CarFields) -> StoreResult<Car> {
        let needs_id = fields
            .get(Field::Id.name())
            .is_none_or(|id| id.trim().is_empty());
        if needs_id {
            fields.insert(Field::Id.name().to_string(), self.next_id()?.to_string());
        }
        let car = checked(&fields)?;
        self.store.create(&car)?;
        Ok(car)
    }

    /// Replaces the stored record with the same id.
    pub fn update(&self, fields: &CarFields) -> StoreResult<Car> {
        let car = checked(fields)?;
        self.store.update(&car)?;
        Ok(car)
    }

    /// Overlays `changes` on the stored record `id` and writes the result.
    pub fn patch(&self, id: u32, changes: &CarFields) -> StoreResult<Car> {
        let Some(current) = self.store.find_by_id(id)? else {
            return Err(Error::new(ErrorKind::NotFound).with_message(format!("car {id} not found")));
        };
        let mut fields = current.to_fields();
        for (name, value) in changes {
            if name == Field::Id.name() {
                continue;
            }
            fields.insert(name.clone(), value.clone());
        }
        self.update(&fields)
    }

    pub fn remove(&self, id: u32) -> StoreResult<()> {
        self.store.delete(id)
    }

    /// Copies every record into `target`, returning how many were written.
    pub fn copy_to(&self, target: &dyn CarDataAccessor) -> StoreResult<usize> {
        let cars = self.store.list_all()?;
        for car in &cars {
            target.create(car)?;
        }
        debug!(
            count = cars.len(),
            from = self.store.backend(),
            to = target.backend(),
            "copied cars"
        );
        Ok(cars.len())
    }
}

fn checked(fields: &CarFields) -> StoreResult<Car> {
    for (name, value) in fields {
        debug!("{name} : {value}");
    }
    validate(fields).inspect_err(|err| error!(error = %err, "invalid value"))
}
