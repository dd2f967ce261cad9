//! Inventory items as the reminder planner sees them.
//!
//! The backend schema differs between the tool and BHP inventories and has
//! drifted over time, so items stay as raw JSON objects and the accessors
//! here look for the fields under every spelling seen in practice.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields that together identify an item, in key order.
const IDENTITY_FIELDS: &[&[&str]] = &[
    &["id"],
    &["code"],
    &["barcode"],
    &["qr_code", "qrCode"],
    &["sku"],
    &["serial_number", "serialNumber"],
];

/// Due-date fields, most specific first.
const DUE_DATE_FIELDS: &[&str] = &[
    "next_inspection_date",
    "nextInspectionDate",
    "inspection_date",
    "inspectionDate",
    "next_review_date",
    "nextReviewDate",
    "review_date",
    "reviewDate",
    "due_date",
    "dueDate",
    "expiry_date",
    "expiryDate",
];

/// Field-name fragments that suggest a due date.
const DUE_DATE_HINTS: &[&str] = &["inspection", "review", "due", "przeglad", "expir"];

const OVERDUE_FIELDS: &[&str] = &["is_overdue", "isOverdue", "overdue"];

const CATEGORY_FIELDS: &[&str] = &["category", "category_name", "categoryName", "kategoria"];

const WELDING_HINTS: &[&str] = &["spaw", "weld"];

/// Which inventory an item was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Tools,
    Bhp,
}

/// Message template family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemCategory {
    Tool,
    Welding,
    Bhp,
}

impl ItemCategory {
    /// Category segment of acknowledgement keys.
    pub fn ack_token(self) -> &'static str {
        match self {
            ItemCategory::Bhp => "bhp",
            ItemCategory::Tool | ItemCategory::Welding => "tools",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemCategory::Tool => "Tool",
            ItemCategory::Welding => "Welding equipment",
            ItemCategory::Bhp => "BHP equipment",
        }
    }
}

/// One inventory entry tagged with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub source: ItemSource,
    pub fields: Map<String, Value>,
}

impl InventoryItem {
    pub fn new(source: ItemSource, fields: Map<String, Value>) -> Self {
        Self { source, fields }
    }

    /// `None` unless `value` is a JSON object.
    pub fn from_value(source: ItemSource, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(source, fields)),
            _ => None,
        }
    }

    /// Stable identity used in reminder keys.
    ///
    /// Identity fields are joined with `|`; items without any fall back to
    /// `name:<name>`. `None` means the item cannot be tracked.
    pub fn identity_key(&self) -> Option<String> {
        let parts: Vec<String> = IDENTITY_FIELDS
            .iter()
            .filter_map(|spellings| spellings.iter().find_map(|f| self.scalar(f)))
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("|"));
        }
        self.name().map(|name| format!("name:{name}"))
    }

    pub fn name(&self) -> Option<&str> {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Human-readable label for messages.
    pub fn display_name(&self) -> String {
        self.name()
            .map(str::to_string)
            .or_else(|| self.identity_key())
            .unwrap_or_else(|| "Unnamed item".to_string())
    }

    /// Next inspection/review date.
    ///
    /// Known field names win. Otherwise any field whose name hints at a due
    /// date is considered, but only for dates after 2010 so that unrelated
    /// timestamps do not produce reminders.
    pub fn due_date(&self) -> Option<NaiveDate> {
        let direct = DUE_DATE_FIELDS
            .iter()
            .filter_map(|f| self.fields.get(*f))
            .find_map(date_from_value);
        if direct.is_some() {
            return direct;
        }

        let floor = NaiveDate::from_ymd_opt(2010, 1, 1)?;
        self.fields
            .iter()
            .filter(|(name, _)| {
                let name = name.to_lowercase();
                DUE_DATE_HINTS.iter().any(|hint| name.contains(hint))
            })
            .filter_map(|(_, value)| date_from_value(value))
            .find(|date| *date > floor)
    }

    pub fn is_overdue(&self) -> bool {
        OVERDUE_FIELDS
            .iter()
            .any(|f| self.fields.get(*f).and_then(Value::as_bool) == Some(true))
    }

    pub fn category(&self) -> ItemCategory {
        if self.source == ItemSource::Bhp {
            return ItemCategory::Bhp;
        }
        let welding = self.category_name().is_some_and(|name| {
            let name = name.to_lowercase();
            WELDING_HINTS.iter().any(|hint| name.contains(hint))
        });
        if welding {
            ItemCategory::Welding
        } else {
            ItemCategory::Tool
        }
    }

    fn category_name(&self) -> Option<&str> {
        CATEGORY_FIELDS.iter().find_map(|f| match self.fields.get(*f)? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str),
            _ => None,
        })
    }

    fn scalar(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn date_from_value(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_date)
}

/// Parse the date formats the backend has been seen to emit.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%d.%m.%Y").ok()
}
