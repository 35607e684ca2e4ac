use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};

use crate::domain::records::{SalesRecord, Unit, WriteoffRecord};

/// One calendar day of a product's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyPoint {
    pub date: NaiveDate,
    /// `None` when no sales record exists for the day (distinct from selling 0).
    pub sold: Option<f64>,
    pub written_off: f64,
}

/// Date-ordered daily history of one product. Days without any record are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSeries {
    pub product_id: String,
    pub unit: Unit,
    pub points: Vec<DailyPoint>,
}

impl ProductSeries {
    pub fn empty(product_id: impl Into<String>, unit: Unit) -> Self {
        Self {
            product_id: product_id.into(),
            unit,
            points: Vec::new(),
        }
    }

    /// Points within `(as_of - window_days, as_of]`. Empty when the window
    /// start falls outside the representable date range.
    pub fn window(&self, as_of: NaiveDate, window_days: u32) -> &[DailyPoint] {
        let Some(start) = as_of.checked_sub_signed(Duration::days(i64::from(window_days.max(1)) - 1)) else {
            return &[];
        };
        let lo = self.points.partition_point(|p| p.date < start);
        let hi = self.points.partition_point(|p| p.date <= as_of);
        &self.points[lo..hi.max(lo)]
    }

    pub fn sales_days(&self) -> usize {
        self.points.iter().filter(|p| p.sold.is_some()).count()
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    unit: Option<Unit>,
    days: BTreeMap<NaiveDate, (Option<f64>, f64)>,
}

/// Aggregates records per product per calendar day, remembering first-seen order.
#[derive(Debug, Default)]
pub struct SeriesBuilder {
    order: Vec<String>,
    index: HashMap<String, usize>,
    acc: Vec<Accumulator>,
}

impl SeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, product_id: &str) -> &mut Accumulator {
        let idx = match self.index.get(product_id) {
            Some(&idx) => idx,
            None => {
                let idx = self.order.len();
                self.order.push(product_id.to_string());
                self.index.insert(product_id.to_string(), idx);
                self.acc.push(Accumulator::default());
                idx
            }
        };
        &mut self.acc[idx]
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.index.contains_key(product_id)
    }

    pub fn add_sale(&mut self, record: &SalesRecord) {
        let slot = self.slot(&record.product_id);
        slot.unit.get_or_insert(record.unit);
        let day = slot.days.entry(record.date).or_insert((None, 0.0));
        day.0 = Some(day.0.unwrap_or(0.0) + record.quantity_sold);
    }

    pub fn add_writeoff(&mut self, record: &WriteoffRecord) {
        let slot = self.slot(&record.product_id);
        let day = slot.days.entry(record.date).or_insert((None, 0.0));
        day.1 += record.quantity_written_off;
    }

    pub fn build(self) -> Vec<ProductSeries> {
        self.order
            .into_iter()
            .zip(self.acc)
            .map(|(product_id, acc)| {
                let unit = acc.unit.unwrap_or_else(|| Unit::infer_from_product(&product_id));
                let points = acc
                    .days
                    .into_iter()
                    .map(|(date, (sold, written_off))| DailyPoint {
                        date,
                        sold,
                        written_off,
                    })
                    .collect();
                ProductSeries {
                    product_id,
                    unit,
                    points,
                }
            })
            .collect()
    }
}
