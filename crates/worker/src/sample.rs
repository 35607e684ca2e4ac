//! Deterministic demo data: a month of bakery sales and write-offs.
//!
//! Quantities are derived arithmetically from the day and product index, so
//! repeated runs with the same `as_of` produce byte-identical files.

use std::path::Path;

use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub const PRODUCTS: &[&str] = &[
    "Эклер",
    "Тирамису",
    "Чизкейк",
    "Наполеон",
    "Медовик",
    "Прага",
    "Сметанник",
    "Птичье молоко",
    "Красный бархат",
    "Торт Молочный кг",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub date: NaiveDate,
    pub product: &'static str,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SampleData {
    pub sales: Vec<SampleRow>,
    pub writeoffs: Vec<SampleRow>,
}

pub fn generate(as_of: NaiveDate, days: u32) -> SampleData {
    let mut out = SampleData::default();
    for day in 0..days {
        let date = as_of - Duration::days(i64::from(days - 1 - day));
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let d = day as usize;

        for (i, &product) in PRODUCTS.iter().enumerate() {
            // Roughly one product in five is not on the shelf on a given day.
            if (i + d) % 5 == 4 {
                continue;
            }
            let mut quantity = 10.0 + ((i * 7 + d * 3) % 41) as f64;
            if weekend {
                quantity = (quantity * 1.5).floor();
            }
            if product.ends_with("кг") {
                quantity /= 10.0;
            }
            out.sales.push(SampleRow { date, product, quantity });

            if (i * 3 + d) % 6 == 0 {
                let written_off = 1.0 + ((i + d) % 5) as f64;
                out.writeoffs.push(SampleRow {
                    date,
                    product,
                    quantity: if product.ends_with("кг") { written_off / 10.0 } else { written_off },
                });
            }
        }
    }
    out
}

pub fn write_csv(path: &Path, rows: &[SampleRow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["дата", "товар", "кол-во"])?;
    for row in rows {
        writer.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.product.to_string(),
            row.quantity.to_string(),
        ])?;
    }
    writer.flush().with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanlav_core::engine::config::IngestOptions;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
    }

    #[test]
    fn same_inputs_same_rows() {
        let a = generate(as_of(), 30);
        let b = generate(as_of(), 30);
        assert_eq!(a.sales, b.sales);
        assert_eq!(a.writeoffs, b.writeoffs);
        assert!(!a.writeoffs.is_empty());
    }

    #[test]
    fn covers_the_requested_days() {
        let data = generate(as_of(), 30);
        let first = data.sales.iter().map(|r| r.date).min().unwrap();
        let last = data.sales.iter().map(|r| r.date).max().unwrap();
        assert_eq!(last, as_of());
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        assert!(data.sales.iter().all(|r| r.quantity > 0.0));
    }

    #[test]
    fn written_files_ingest_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let data = generate(as_of(), 14);
        let sales_path = dir.path().join("sample_sales.csv");
        let writeoffs_path = dir.path().join("sample_writeoffs.csv");
        write_csv(&sales_path, &data.sales).unwrap();
        write_csv(&writeoffs_path, &data.writeoffs).unwrap();

        let ingested = vanlav_core::ingest::ingest(
            &std::fs::read(&sales_path).unwrap(),
            &std::fs::read(&writeoffs_path).unwrap(),
            &IngestOptions::default(),
        )
        .unwrap();
        assert_eq!(ingested.sales.malformed, 0);
        assert_eq!(ingested.sales.rows_used, data.sales.len());
        assert_eq!(ingested.products.len(), PRODUCTS.len());
        assert_eq!(ingested.latest_sales_date, Some(as_of()));
    }
}
