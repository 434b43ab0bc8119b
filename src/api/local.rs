//! Purpose: Implement the car accessor contract on top of a single CSV file.
//! Exports: `CsvStore`.
//! Role: File backend; every mutation is read-all, modify in memory, rewrite-all.
//! Invariants: The first line is the header; it must name each record field exactly once.
//! Invariants: Rows are written ascending by numeric id.
//! Invariants: Rewrites go through a temp file renamed over the target, so a failed
//! write leaves the previous file intact.
//! Invariants: Rewrites land on the symlink target and keep its permissions.
#![allow(clippy::result_large_err)]

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{Span, debug, error, info_span, warn};

use crate::core::accessor::{CarDataAccessor, StoreResult};
use crate::core::car::{Car, CarFields, FIELDS, Field, validate};
use crate::core::error::{Error, ErrorKind};

#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    header: OnceLock<Vec<Field>>,
    span: Span,
}

impl CsvStore {
    /// Opens nothing yet; the file is read on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let span = info_span!("csv_store", path = %path.display());
        Self {
            path,
            header: OnceLock::new(),
            span,
        }
    }

    /// Creates (or truncates) the file with the canonical header and `cars`.
    pub fn init(path: impl Into<PathBuf>, cars: &[Car]) -> StoreResult<Self> {
        let store = Self::new(path);
        let _ = store.header.set(Field::ALL.to_vec());
        {
            let _enter = store.span.enter();
            let mut cars = cars.to_vec();
            store.write_all(&mut cars)?;
            debug!(count = cars.len(), "initialized car file");
        }
        Ok(store)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header of the file, cached after the first successful read.
    pub fn header(&self) -> StoreResult<Vec<Field>> {
        if let Some(header) = self.header.get() {
            return Ok(header.clone());
        }
        let mut reader = self.open_reader()?;
        let header = self.read_header(&mut reader)?;
        Ok(self.header.get_or_init(|| header).clone())
    }

    fn open_reader(&self) -> StoreResult<csv::Reader<File>> {
        let file = File::open(&self.path).map_err(|err| {
            error!(error = %err, "failed to open car file");
            Error::new(ErrorKind::Io)
                .with_message("failed to open car file")
                .with_path(&self.path)
                .with_hint("Create it with `carpanel export --to <file>` or check the path.")
                .with_source(err)
        })?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(file))
    }

    fn read_header(&self, reader: &mut csv::Reader<File>) -> StoreResult<Vec<Field>> {
        let record = reader
            .headers()
            .map_err(|err| self.csv_error("failed to read header", err))?;
        let header = parse_header(record.iter()).map_err(|err| err.with_path(&self.path))?;
        if self.header.get().is_none() {
            let _ = self.header.set(header.clone());
        }
        Ok(header)
    }

    fn read_all(&self) -> StoreResult<Vec<Car>> {
        let mut reader = self.open_reader()?;
        let header = self.read_header(&mut reader)?;

        let mut cars: Vec<Car> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| self.csv_error("failed to read row", err))?;
            let fields: CarFields = header
                .iter()
                .zip(record.iter())
                .map(|(field, value)| (field.name().to_string(), value.to_string()))
                .collect();
            let line = record.position().map(|pos| pos.line()).unwrap_or_default();
            let car = validate(&fields).map_err(|err| {
                error!(line, error = %err, "invalid row in car file");
                Error::new(ErrorKind::Corrupt)
                    .with_message(format!("invalid row at line {line}"))
                    .with_path(&self.path)
                    .with_source(err)
            })?;
            if cars.iter().any(|existing| existing.id == car.id) {
                error!(line, id = car.id, "duplicate id in car file");
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("duplicate id {} at line {line}", car.id))
                    .with_path(&self.path));
            }
            cars.push(car);
        }
        cars.sort_by_key(|car| car.id);
        Ok(cars)
    }

    fn write_all(&self, cars: &mut [Car]) -> StoreResult<()> {
        cars.sort_by_key(|car| car.id);
        let header = match self.header.get() {
            Some(header) => header.clone(),
            None => Field::ALL.to_vec(),
        };

        let target = self.target_path()?;
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|err| {
            self.io_error("failed to create temporary car file", err)
        })?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            writer
                .write_record(header.iter().map(|field| field.name()))
                .map_err(|err| self.csv_error("failed to write header", err))?;
            for car in cars.iter() {
                writer
                    .write_record(header.iter().map(|field| car.value(*field)))
                    .map_err(|err| self.csv_error("failed to write row", err))?;
            }
            writer
                .flush()
                .map_err(|err| self.io_error("failed to flush car file", err))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| self.io_error("failed to sync car file", err))?;
        if target.exists() {
            let permissions = std::fs::metadata(&target)
                .map_err(|err| self.io_error("failed to stat car file", err))?
                .permissions();
            temp.as_file()
                .set_permissions(permissions)
                .map_err(|err| self.io_error("failed to copy car file permissions", err))?;
        }
        temp.persist(&target)
            .map_err(|err| self.io_error("failed to replace car file", err.error))?;
        debug!(count = cars.len(), "rewrote car file");
        Ok(())
    }

    /// Follows a symlinked path so the rewrite lands on the file it points to.
    fn target_path(&self) -> StoreResult<PathBuf> {
        if !self.path.exists() {
            return Ok(self.path.clone());
        }
        std::fs::canonicalize(&self.path)
            .map_err(|err| self.io_error("failed to resolve car file path", err))
    }

    fn io_error(&self, message: &str, err: std::io::Error) -> Error {
        error!(error = %err, "{message}");
        Error::new(ErrorKind::Io)
            .with_message(message)
            .with_path(&self.path)
            .with_source(err)
    }

    fn csv_error(&self, message: &str, err: csv::Error) -> Error {
        error!(error = %err, "{message}");
        let kind = if err.is_io_error() {
            ErrorKind::Io
        } else {
            ErrorKind::Corrupt
        };
        Error::new(kind)
            .with_message(message)
            .with_path(&self.path)
            .with_source(err)
    }
}

impl CarDataAccessor for CsvStore {
    fn backend(&self) -> &'static str {
        "csv"
    }

    fn list_all(&self) -> StoreResult<Vec<Car>> {
        let _enter = self.span.enter();
        self.read_all()
    }

    fn create(&self, car: &Car) -> StoreResult<()> {
        let _enter = self.span.enter();
        let mut cars = self.read_all()?;
        if cars.iter().any(|existing| existing.id == car.id) {
            warn!(id = car.id, "car id already in use");
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("car {} already exists", car.id))
                .with_path(&self.path));
        }
        cars.push(car.clone());
        self.write_all(&mut cars)?;
        debug!(id = car.id, "created car");
        Ok(())
    }

    fn delete(&self, id: u32) -> StoreResult<()> {
        let _enter = self.span.enter();
        let mut cars = self.read_all()?;
        let Some(index) = cars.iter().position(|car| car.id == id) else {
            warn!(id, "car to delete not found");
            return Err(not_found(id).with_path(&self.path));
        };
        cars.remove(index);
        self.write_all(&mut cars)?;
        debug!(id, "deleted car");
        Ok(())
    }

    fn find_by_id(&self, id: u32) -> StoreResult<Option<Car>> {
        let _enter = self.span.enter();
        let cars = self.read_all()?;
        Ok(cars.into_iter().find(|car| car.id == id))
    }

    fn update(&self, car: &Car) -> StoreResult<()> {
        let _enter = self.span.enter();
        let mut cars = self.read_all()?;
        let Some(slot) = cars.iter_mut().find(|existing| existing.id == car.id) else {
            warn!(id = car.id, "car to update not found");
            return Err(not_found(car.id).with_path(&self.path));
        };
        *slot = car.clone();
        self.write_all(&mut cars)?;
        debug!(id = car.id, "updated car");
        Ok(())
    }
}

pub(crate) fn not_found(id: u32) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("car {id} not found"))
}

fn parse_header<'a>(names: impl Iterator<Item = &'a str>) -> StoreResult<Vec<Field>> {
    let mut header = Vec::with_capacity(FIELDS.len());
    for name in names {
        let field = Field::from_name(name.trim()).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message(format!("unknown header field {name:?}"))
        })?;
        if header.contains(&field) {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("duplicate header field {name:?}")));
        }
        header.push(field);
    }
    if header.len() != FIELDS.len() {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("header must name the fields {}", FIELDS.join(","))));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::{CsvStore, parse_header};
    use crate::core::accessor::CarDataAccessor;
    use crate::core::car::{Car, Field};
    use crate::core::error::ErrorKind;

    fn car(id: u32, brand: &str) -> Car {
        Car {
            id,
            brand: brand.to_string(),
            model: "Model".to_string(),
            production_year: 2001,
            convertible: false,
        }
    }

    #[test]
    fn header_accepts_any_field_order() {
        let header = parse_header(
            ["brand", "id", "convertible", "model", "production_year"].into_iter(),
        )
        .expect("header");
        assert_eq!(header[0], Field::Brand);
        assert_eq!(header[1], Field::Id);
    }

    #[test]
    fn header_rejects_unknown_missing_or_duplicate_fields() {
        let cases: [&[&str]; 3] = [
            &["id", "brand", "model", "year", "convertible"],
            &["id", "brand", "model", "production_year"],
            &["id", "brand", "model", "production_year", "convertible", "id"],
        ];
        for names in cases {
            let err = parse_header(names.iter().copied()).expect_err("bad header");
            assert_eq!(err.kind(), ErrorKind::Corrupt);
        }
    }

    #[test]
    fn init_writes_canonical_header_and_sorted_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        CsvStore::init(&path, &[car(10, "Volvo"), car(2, "Saab, AB")]).expect("init");

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "id,brand,model,production_year,convertible");
        assert_eq!(lines[1], "2,\"Saab, AB\",Model,2001,false");
        assert_eq!(lines[2], "10,Volvo,Model,2001,false");
    }

    #[test]
    fn rewrite_keeps_the_file_header_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        std::fs::write(
            &path,
            "brand,id,model,production_year,convertible\nFord,1,T,1940,False\n",
        )
        .expect("write");

        let store = CsvStore::new(&path);
        store.create(&car(2, "Opel")).expect("create");

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "brand,id,model,production_year,convertible");
        assert_eq!(lines[1], "Ford,1,T,1940,false");
        assert_eq!(lines[2], "Opel,2,Model,2001,false");
    }

    #[test]
    fn invalid_row_is_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        std::fs::write(
            &path,
            "id,brand,model,production_year,convertible\n1,Ford,T,1908,no\n",
        )
        .expect("write");

        let err = CsvStore::new(&path).list_all().expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert!(err.message().unwrap_or_default().contains("line 2"));
    }

    #[test]
    fn duplicate_ids_are_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        std::fs::write(
            &path,
            "id,brand,model,production_year,convertible\n1,Ford,T,1950,no\n1,Fiat,500,1957,no\n",
        )
        .expect("write");

        let err = CsvStore::new(&path).list_all().expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = CsvStore::new(temp.path().join("absent.csv"));
        let err = store.list_all().expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.path().is_some());
        assert_eq!(store.header().expect_err("missing").kind(), ErrorKind::Io);
    }

    #[test]
    fn failed_rewrite_leaves_target_and_directory_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        std::fs::create_dir(&path).expect("mkdir");
        std::fs::write(path.join("keep.txt"), "keep").expect("write");

        let store = CsvStore::new(&path);
        let mut cars = vec![car(1, "Ford")];
        let err = store.write_all(&mut cars).expect_err("cannot replace directory");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(path.is_dir());
        assert_eq!(std::fs::read_to_string(path.join("keep.txt")).expect("read"), "keep");

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("cars.csv")]);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cars.csv");
        let store = CsvStore::init(&path, &[car(1, "Ford")]).expect("init");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        store.create(&car(2, "Opel")).expect("create");
        let mode = std::fs::metadata(&path).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_through_symlink_updates_the_linked_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let real = temp.path().join("real.csv");
        let link = temp.path().join("cars.csv");
        CsvStore::init(&real, &[car(1, "Ford"), car(2, "Opel")]).expect("init");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let store = CsvStore::new(&link);
        store.delete(1).expect("delete");

        assert!(std::fs::symlink_metadata(&link).expect("lstat").file_type().is_symlink());
        let ids: Vec<u32> = CsvStore::new(&real)
            .list_all()
            .expect("list")
            .iter()
            .map(|car| car.id)
            .collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(store.list_all().expect("list").len(), 1);
    }
}
