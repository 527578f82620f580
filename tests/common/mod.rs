#![allow(dead_code)]

mod mocks;

pub use mocks::MockFile;

use csv_batch_rs::item::csv::Row;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn row(values: &[Option<&str>]) -> Row {
    values.iter().map(|v| v.map(str::to_string)).collect()
}
