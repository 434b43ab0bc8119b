//! Purpose: Define the car record and the rules that turn raw text fields into one.
//! Exports: `Car`, `CarFields`, `Field`, `FIELDS`, `validate`, year bounds.
//! Role: Every store and the CLI route raw input through `validate` before persisting.
//! Invariants: `id` is a positive integer; `production_year` lies in [1940, 2030].
//! Invariants: Invalid input is rejected with the failing field, never repaired.
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use super::error::Error;

pub const MIN_PRODUCTION_YEAR: u16 = 1940;
pub const MAX_PRODUCTION_YEAR: u16 = 2030;

/// Raw textual field data as submitted by a caller or read from a CSV row.
pub type CarFields = BTreeMap<String, String>;

/// Field names in canonical (header) order.
pub const FIELDS: [&str; 5] = ["id", "brand", "model", "production_year", "convertible"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Field {
    Id,
    Brand,
    Model,
    ProductionYear,
    Convertible,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Id,
        Field::Brand,
        Field::Model,
        Field::ProductionYear,
        Field::Convertible,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Brand => "brand",
            Field::Model => "model",
            Field::ProductionYear => "production_year",
            Field::Convertible => "convertible",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Car {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: u32,
    pub brand: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_production_year")]
    pub production_year: u16,
    #[serde(deserialize_with = "deserialize_convertible")]
    pub convertible: bool,
}

impl Car {
    pub fn from_fields(fields: &CarFields) -> Result<Self, Error> {
        validate(fields)
    }

    /// Textual form of one field, as written to CSV rows.
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Id => self.id.to_string(),
            Field::Brand => self.brand.clone(),
            Field::Model => self.model.clone(),
            Field::ProductionYear => self.production_year.to_string(),
            Field::Convertible => self.convertible.to_string(),
        }
    }

    pub fn to_fields(&self) -> CarFields {
        Field::ALL
            .into_iter()
            .map(|field| (field.name().to_string(), self.value(field)))
            .collect()
    }
}

/// Converts a field mapping into a typed record, failing on the first bad field.
pub fn validate(fields: &CarFields) -> Result<Car, Error> {
    let get = |field: Field| -> Result<&str, Error> {
        fields
            .get(field.name())
            .map(String::as_str)
            .ok_or_else(|| {
                Error::invalid(field).with_message(format!("missing field {}", field.name()))
            })
    };

    Ok(Car {
        id: parse_id(get(Field::Id)?)?,
        brand: get(Field::Brand)?.to_string(),
        model: get(Field::Model)?.to_string(),
        production_year: parse_production_year(get(Field::ProductionYear)?)?,
        convertible: parse_convertible(get(Field::Convertible)?)?,
    })
}

pub fn parse_id(text: &str) -> Result<u32, Error> {
    if !is_all_digits(text) {
        return Err(Error::invalid(Field::Id));
    }
    match text.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::invalid(Field::Id)),
    }
}

pub fn parse_production_year(text: &str) -> Result<u16, Error> {
    if !is_all_digits(text) {
        return Err(Error::invalid(Field::ProductionYear));
    }
    text.parse::<u16>()
        .ok()
        .filter(|year| year_in_range(u64::from(*year)))
        .ok_or_else(|| Error::invalid(Field::ProductionYear))
}

pub fn parse_convertible(text: &str) -> Result<bool, Error> {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(Error::invalid(Field::Convertible)),
    }
}

fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

fn year_in_range(year: u64) -> bool {
    (u64::from(MIN_PRODUCTION_YEAR)..=u64::from(MAX_PRODUCTION_YEAR)).contains(&year)
}

// Documents from the remote store carry numbers, bools, or their text forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(u64),
    Bool(bool),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(value) => u32::try_from(value)
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| de::Error::custom("invalid value for id")),
        Scalar::Text(text) => parse_id(&text).map_err(de::Error::custom),
        Scalar::Bool(_) => Err(de::Error::custom("invalid value for id")),
    }
}

fn deserialize_production_year<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Int(value) if year_in_range(value) => Ok(value as u16),
        Scalar::Text(text) => parse_production_year(&text).map_err(de::Error::custom),
        _ => Err(de::Error::custom("invalid value for production_year")),
    }
}

fn deserialize_convertible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Bool(value) => Ok(value),
        Scalar::Text(text) => parse_convertible(&text).map_err(de::Error::custom),
        Scalar::Int(_) => Err(de::Error::custom("invalid value for convertible")),
    }
}
