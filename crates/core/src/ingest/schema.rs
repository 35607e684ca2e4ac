//! Column resolution and row parsing.
//!
//! Files may put their columns in any order and use English or Russian
//! headers; each logical field has a list of accepted aliases.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::domain::records::Unit;
use crate::error::{FileRole, IngestError};

const PRODUCT: &[&str] = &["product", "product_id", "товар", "наименование", "name", "sku"];
const DATE: &[&str] = &["date", "дата"];
const SOLD: &[&str] = &["quantity_sold", "quantity", "qty", "sold", "кол-во", "количество"];
const WRITTEN_OFF: &[&str] = &[
    "quantity_written_off",
    "quantity",
    "qty",
    "written_off",
    "кол-во",
    "количество",
];
const UNIT: &[&str] = &["unit", "ед", "ед.", "ед. изм.", "ед.изм.", "единица"];
const REASON: &[&str] = &["reason", "причина"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub product: usize,
    pub date: usize,
    pub quantity: usize,
    pub unit: Option<usize>,
    pub reason: Option<usize>,
}

/// One successfully parsed data row (sales or write-off).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub product_id: String,
    pub date: NaiveDate,
    pub quantity: f64,
    pub unit: Option<Unit>,
    pub reason: Option<String>,
}

pub fn resolve_columns(headers: &[String], file: FileRole) -> Result<Columns, IngestError> {
    let header_map = build_header_map(headers);
    let find = |aliases: &[&str]| aliases.iter().find_map(|a| header_map.get(*a).copied());

    let quantity_aliases = match file {
        FileRole::Sales => SOLD,
        FileRole::Writeoffs => WRITTEN_OFF,
    };

    let product = find(PRODUCT).ok_or_else(|| IngestError::missing_column(file, PRODUCT[0]))?;
    let date = find(DATE).ok_or_else(|| IngestError::missing_column(file, DATE[0]))?;
    let quantity = find(quantity_aliases).ok_or_else(|| IngestError::missing_column(file, quantity_aliases[0]))?;

    Ok(Columns {
        product,
        date,
        quantity,
        unit: find(UNIT),
        reason: match file {
            FileRole::Writeoffs => find(REASON),
            FileRole::Sales => None,
        },
    })
}

fn build_header_map(headers: &[String]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        // First occurrence wins on duplicate headers.
        map.entry(normalize_header_name(name)).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

pub fn parse_row(cells: &[String], cols: &Columns) -> Result<ParsedRow, String> {
    let product_id = cell(cells, cols.product).ok_or("missing product")?.to_string();
    let date_raw = cell(cells, cols.date).ok_or("missing date")?;
    let date = parse_date(date_raw)?;
    let quantity_raw = cell(cells, cols.quantity).ok_or("missing quantity")?;
    let quantity = parse_quantity(quantity_raw)?;

    Ok(ParsedRow {
        product_id,
        date,
        quantity,
        unit: cols.unit.and_then(|i| cell(cells, i)).and_then(Unit::parse),
        reason: cols.reason.and_then(|i| cell(cells, i)).map(str::to_string),
    })
}

fn cell(cells: &[String], idx: usize) -> Option<&str> {
    cells.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Calendar years accepted in data files and request parameters.
const YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const DATE_FMTS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];
    const DATETIME_FMTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
    ];

    let s = s.trim();
    let parsed = DATE_FMTS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FMTS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        });
    if let Some(d) = parsed {
        if !YEARS.contains(&d.year()) {
            return Err(format!("date '{s}' is outside years {}..={}", YEARS.start(), YEARS.end()));
        }
        return Ok(d);
    }
    Err(format!(
        "invalid date '{s}' (expected YYYY-MM-DD, DD.MM.YYYY, DD/MM/YYYY or YYYY/MM/DD)"
    ))
}

/// Non-negative finite number; accepts a decimal comma and space-grouped thousands.
pub fn parse_quantity(s: &str) -> Result<f64, String> {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    let normalized = if compact.contains(',') && !compact.contains('.') {
        compact.replace(',', ".")
    } else {
        compact
    };

    let v = normalized
        .parse::<f64>()
        .map_err(|_| format!("quantity '{s}' is not a number"))?;
    if !v.is_finite() {
        return Err(format!("quantity '{s}' is not finite"));
    }
    if v < 0.0 {
        return Err(format!("quantity '{s}' is negative"));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_russian_headers_in_any_order() {
        let cols = resolve_columns(&headers(&["Кол-во", "\u{feff}Товар", " Дата "]), FileRole::Sales).unwrap();
        assert_eq!(cols.quantity, 0);
        assert_eq!(cols.product, 1);
        assert_eq!(cols.date, 2);
        assert_eq!(cols.unit, None);
    }

    #[test]
    fn prefers_role_specific_quantity_column() {
        let h = headers(&["product", "date", "quantity", "quantity_written_off", "reason"]);
        let cols = resolve_columns(&h, FileRole::Writeoffs).unwrap();
        assert_eq!(cols.quantity, 3);
        assert_eq!(cols.reason, Some(4));

        let cols = resolve_columns(&h, FileRole::Sales).unwrap();
        assert_eq!(cols.quantity, 2);
        assert_eq!(cols.reason, None);
    }

    #[test]
    fn reports_missing_column_by_name() {
        match resolve_columns(&headers(&["product", "qty"]), FileRole::Sales) {
            Err(IngestError::SchemaMismatch { column, file, .. }) => {
                assert_eq!(column.as_deref(), Some("date"));
                assert_eq!(file, FileRole::Sales);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_dates_in_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 6, 3).unwrap();
        for s in ["2026-06-03", "03.06.2026", "03/06/2026", "2026/06/03", "2026-06-03 00:00:00", "2026-06-03T12:30:00"] {
            assert_eq!(parse_date(s).unwrap(), expected, "{s}");
        }
        assert!(parse_date("June 3rd").is_err());
        assert!(parse_date("2026-13-01").is_err());
        assert!(parse_date("-262143-01-01").is_err());
        assert!(parse_date("0001-01-01").is_err());
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("12").unwrap(), 12.0);
        assert_eq!(parse_quantity("1,5").unwrap(), 1.5);
        assert_eq!(parse_quantity("1 250").unwrap(), 1250.0);
        assert_eq!(parse_quantity("1\u{a0}250,5").unwrap(), 1250.5);
        assert!(parse_quantity("abc").is_err());
        assert!(parse_quantity("-3").is_err());
        assert!(parse_quantity("NaN").is_err());
    }

    #[test]
    fn parse_row_reads_optional_unit_and_reason() {
        let cols = Columns {
            product: 0,
            date: 1,
            quantity: 2,
            unit: Some(3),
            reason: Some(4),
        };
        let cells: Vec<String> = ["Тирамису", "01.06.2026", "2,5", "кг", "срок годности"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = parse_row(&cells, &cols).unwrap();
        assert_eq!(row.unit, Some(Unit::Weight));
        assert_eq!(row.quantity, 2.5);
        assert_eq!(row.reason.as_deref(), Some("срок годности"));

        let short: Vec<String> = vec!["Эклер".to_string(), "01.06.2026".to_string()];
        assert!(parse_row(&short, &cols).is_err());
    }
}
