use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Counting granularity of a product. Drives rounding of every amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Counted items, whole numbers.
    Piece,
    /// Weighed goods, one decimal place.
    Weight,
}

impl Unit {
    /// Label shown next to amounts in the response.
    pub fn label(self) -> &'static str {
        match self {
            Unit::Piece => "шт.",
            Unit::Weight => "кг",
        }
    }

    pub fn decimals(self) -> u32 {
        match self {
            Unit::Piece => 0,
            Unit::Weight => 1,
        }
    }

    /// Parse a unit cell (`шт.`, `pcs`, `кг`, `kg`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_end_matches('.').to_lowercase();
        match s.as_str() {
            "шт" | "штук" | "штука" | "pcs" | "pc" | "piece" | "pieces" | "ea" => Some(Unit::Piece),
            "кг" | "килограмм" | "kg" | "kilogram" | "weight" => Some(Unit::Weight),
            _ => None,
        }
    }

    /// Fallback when the file has no unit column: names mentioning kilograms are weighed.
    pub fn infer_from_product(product_id: &str) -> Self {
        let lower = product_id.to_lowercase();
        if lower.contains("кг") || lower.contains("kg") {
            Unit::Weight
        } else {
            Unit::Piece
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub product_id: String,
    pub date: NaiveDate,
    pub quantity_sold: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteoffRecord {
    pub product_id: String,
    pub date: NaiveDate,
    pub quantity_written_off: f64,
    pub reason: Option<String>,
}
