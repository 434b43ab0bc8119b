// Round-trip and ordering tests for the CSV-backed car store.
use carpanel::api::{Car, CarDataAccessor, CarFields, CsvStore, ErrorKind, next_id_for, validate};

fn car(id: u32, brand: &str, model: &str, year: u16, convertible: bool) -> Car {
    Car {
        id,
        brand: brand.to_string(),
        model: model.to_string(),
        production_year: year,
        convertible,
    }
}

fn empty_store(dir: &std::path::Path) -> CsvStore {
    CsvStore::init(dir.join("cars.csv"), &[]).expect("init")
}

#[test]
fn create_then_find_returns_equal_record() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    let created = car(1, "Citroen", "2CV", 1948, true);

    store.create(&created).expect("create");
    assert_eq!(store.find_by_id(1).expect("find"), Some(created));
    assert_eq!(store.find_by_id(2).expect("find"), None);
}

#[test]
fn delete_then_find_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    store.create(&car(1, "Citroen", "DS", 1955, false)).expect("create");
    store.create(&car(2, "Peugeot", "404", 1960, false)).expect("create");

    store.delete(1).expect("delete");
    assert_eq!(store.find_by_id(1).expect("find"), None);
    assert!(store.find_by_id(2).expect("find").is_some());
}

#[test]
fn second_delete_fails_with_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    store.create(&car(7, "Lancia", "Fulvia", 1963, false)).expect("create");

    store.delete(7).expect("first delete");
    let err = store.delete(7).expect_err("second delete");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn update_then_find_returns_new_fields() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    store.create(&car(3, "Alfa Romeo", "Spider", 1966, true)).expect("create");
    store.create(&car(4, "Alfa Romeo", "Giulia", 1962, false)).expect("create");

    let updated = car(3, "Alfa Romeo", "Duetto", 1967, true);
    store.update(&updated).expect("update");
    assert_eq!(store.find_by_id(3).expect("find"), Some(updated));
    assert_eq!(store.list_all().expect("list").len(), 2);
}

#[test]
fn update_of_missing_record_fails_and_keeps_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    store.create(&car(1, "BMW", "Isetta", 1955, false)).expect("create");
    let before = std::fs::read_to_string(store.path()).expect("read");

    let err = store
        .update(&car(2, "BMW", "507", 1956, true))
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(std::fs::read_to_string(store.path()).expect("read"), before);
}

#[test]
fn list_is_sorted_by_numeric_id_regardless_of_insertion() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    for id in [10, 2, 33, 1, 9] {
        store.create(&car(id, "Trabant", "P50", 1958, false)).expect("create");
    }

    let ids: Vec<u32> = store.list_all().expect("list").iter().map(|car| car.id).collect();
    assert_eq!(ids, vec![1, 2, 9, 10, 33]);

    let text = std::fs::read_to_string(store.path()).expect("read");
    let file_ids: Vec<&str> = text
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();
    assert_eq!(file_ids, vec!["1", "2", "9", "10", "33"]);
}

#[test]
fn create_with_existing_id_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    store.create(&car(5, "Skoda", "Octavia", 1959, false)).expect("create");

    let err = store
        .create(&car(5, "Skoda", "Felicia", 1959, true))
        .expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(store.list_all().expect("list").len(), 1);
}

#[test]
fn allocator_fills_gaps_from_listed_records() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    assert_eq!(next_id_for(&store.list_all().expect("list")), 1);

    for id in [3, 1] {
        store.create(&car(id, "Zastava", "750", 1962, false)).expect("create");
    }
    assert_eq!(next_id_for(&store.list_all().expect("list")), 2);

    store.create(&car(2, "Zastava", "101", 1971, false)).expect("create");
    assert_eq!(next_id_for(&store.list_all().expect("list")), 4);
}

#[test]
fn quoted_values_survive_a_rewrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    let quoted = car(1, "Mercedes, Benz", "300 \"Gullwing\"", 1954, false);
    store.create(&quoted).expect("create");
    store.create(&car(2, "Porsche", "356", 1948, true)).expect("create");

    assert_eq!(store.find_by_id(1).expect("find"), Some(quoted));
}

#[test]
fn end_to_end_field_mapping_persists() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = empty_store(temp.path());
    let fields: CarFields = [
        ("id", "4"),
        ("brand", "Honda"),
        ("model", "Civic"),
        ("production_year", "1999"),
        ("convertible", "no"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();

    let record = validate(&fields).expect("valid");
    assert_eq!(record.id, 4);
    assert_eq!(record.production_year, 1999);
    assert!(!record.convertible);

    store.create(&record).expect("create");
    assert_eq!(store.find_by_id(4).expect("find"), Some(record));
}

#[test]
fn existing_file_written_elsewhere_is_readable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("cars.csv");
    std::fs::write(
        &path,
        "id,brand,model,production_year,convertible\n2,Toyota,Corolla,1966,False\n1,Ford,Model A,1940,True\n",
    )
    .expect("write");

    let store = CsvStore::new(&path);
    let cars = store.list_all().expect("list");
    assert_eq!(cars[0], car(1, "Ford", "Model A", 1940, true));
    assert_eq!(cars[1], car(2, "Toyota", "Corolla", 1966, false));
}
