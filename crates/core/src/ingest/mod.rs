//! Record ingestor: raw sales / write-off files -> per-product daily series.
//!
//! - **Row-level validation**: malformed rows are skipped and counted, not fatal
//! - **Ratio guard**: too many malformed rows fails the whole file
//! - **Deterministic**: product order is first-seen order (sales, then write-offs)

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::records::{SalesRecord, Unit, WriteoffRecord};
use crate::engine::config::IngestOptions;
use crate::error::{FileRole, IngestError};

pub mod schema;
pub mod series;
pub mod tabular;

pub use series::{DailyPoint, ProductSeries, SeriesBuilder};

/// Only the first few issues are kept for reporting; all are counted.
const MAX_REPORTED_ISSUES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub rows_used: usize,
    pub malformed: usize,
    pub issues: Vec<RowIssue>,
}

impl IngestStats {
    fn record_issue(&mut self, issue: RowIssue) {
        self.malformed += 1;
        if self.issues.len() < MAX_REPORTED_ISSUES {
            self.issues.push(issue);
        }
    }
}

/// Ingest output: normalized series in stable order plus per-file stats.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub products: Vec<ProductSeries>,
    pub sales: IngestStats,
    pub writeoffs: IngestStats,
    /// Latest date with a sales record; the default as-of date of a run.
    pub latest_sales_date: Option<NaiveDate>,
}

impl IngestedData {
    pub fn get(&self, product_id: &str) -> Option<&ProductSeries> {
        self.products.iter().find(|s| s.product_id == product_id)
    }
}

/// Parse both files and build the per-product series.
///
/// The two files are parsed concurrently; a sales error takes precedence.
pub fn ingest(sales_raw: &[u8], writeoffs_raw: &[u8], opts: &IngestOptions) -> Result<IngestedData, IngestError> {
    let (sales, writeoffs) = rayon::join(|| parse_sales(sales_raw, opts), || parse_writeoffs(writeoffs_raw, opts));
    let (sales, sales_stats) = sales?;
    let (writeoffs, writeoff_stats) = writeoffs?;

    let mut builder = SeriesBuilder::new();
    for record in &sales {
        builder.add_sale(record);
    }
    let mut orphan_writeoffs = 0usize;
    for record in &writeoffs {
        if opts.include_writeoff_only || builder.contains(&record.product_id) {
            builder.add_writeoff(record);
        } else {
            orphan_writeoffs += 1;
        }
    }

    let products = builder.build();
    let latest_sales_date = sales.iter().map(|r| r.date).max();

    tracing::info!(
        products = products.len(),
        sales_rows = sales_stats.rows_used,
        sales_malformed = sales_stats.malformed,
        writeoff_rows = writeoff_stats.rows_used,
        writeoff_malformed = writeoff_stats.malformed,
        orphan_writeoffs,
        ?latest_sales_date,
        "ingested records"
    );

    Ok(IngestedData {
        products,
        sales: sales_stats,
        writeoffs: writeoff_stats,
        latest_sales_date,
    })
}

pub fn parse_sales(raw: &[u8], opts: &IngestOptions) -> Result<(Vec<SalesRecord>, IngestStats), IngestError> {
    parse_file(raw, FileRole::Sales, opts, |row| SalesRecord {
        unit: row.unit.unwrap_or_else(|| Unit::infer_from_product(&row.product_id)),
        product_id: row.product_id,
        date: row.date,
        quantity_sold: row.quantity,
    })
}

pub fn parse_writeoffs(raw: &[u8], opts: &IngestOptions) -> Result<(Vec<WriteoffRecord>, IngestStats), IngestError> {
    parse_file(raw, FileRole::Writeoffs, opts, |row| WriteoffRecord {
        product_id: row.product_id,
        date: row.date,
        quantity_written_off: row.quantity,
        reason: row.reason,
    })
}

fn parse_file<T>(
    raw: &[u8],
    file: FileRole,
    opts: &IngestOptions,
    into_record: impl Fn(schema::ParsedRow) -> T,
) -> Result<(Vec<T>, IngestStats), IngestError> {
    let table = tabular::read_table(raw, file)?;
    let cols = schema::resolve_columns(&table.headers, file)?;

    let mut stats = IngestStats::default();
    for issue in table.broken {
        stats.rows_read += 1;
        stats.record_issue(issue);
    }

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        stats.rows_read += 1;
        match schema::parse_row(&row.cells, &cols) {
            Ok(parsed) => records.push(into_record(parsed)),
            Err(message) => stats.record_issue(RowIssue {
                line: row.line,
                message,
            }),
        }
    }
    stats.rows_used = records.len();
    stats.issues.sort_by_key(|i| i.line);

    if stats.rows_read == 0 {
        return Err(IngestError::EmptyInput { file });
    }

    let ratio = stats.malformed as f64 / stats.rows_read as f64;
    if ratio > opts.max_malformed_fraction {
        tracing::warn!(
            %file,
            malformed = stats.malformed,
            total = stats.rows_read,
            first_issue = ?stats.issues.first(),
            "malformed row ratio above threshold"
        );
        return Err(IngestError::SchemaMismatch {
            file,
            detail: format!(
                "{:.0}% of rows are malformed (limit {:.0}%)",
                ratio * 100.0,
                opts.max_malformed_fraction * 100.0
            ),
            column: None,
            malformed: stats.malformed,
            total: stats.rows_read,
        });
    }

    if stats.rows_used == 0 {
        return Err(IngestError::EmptyInput { file });
    }

    if stats.malformed > 0 {
        tracing::debug!(%file, malformed = stats.malformed, issues = ?stats.issues, "skipped malformed rows");
    }

    Ok((records, stats))
}
