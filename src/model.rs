//! Records kept by the application: users, uploaded files and the data
//! parsed out of each workbook.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extensions that carry spreadsheet data worth analysing.
pub const EXCEL_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    /// Unique across all users; used to log in
    pub email: String,
    /// Argon2 hash of the user's password
    pub password_hash: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Metadata for a file a user uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub id: u64,
    pub filename: String,
    /// Size in kilobytes
    pub size: f64,
    pub upload_date: NaiveDateTime,
    pub user_id: u64,
}

impl UploadedFile {
    /// Lower-cased text after the last dot, empty when there is none.
    pub fn extension(&self) -> String {
        match self.filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        }
    }

    /// Display classification of the file, e.g. `XLSX`.
    pub fn file_type(&self) -> String {
        self.extension().to_uppercase()
    }

    pub fn is_excel(&self) -> bool {
        is_excel_filename(&self.filename)
    }
}

/// Whether `filename` names an `.xls`/`.xlsx` workbook, ignoring case.
pub fn is_excel_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| EXCEL_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// One labelled line of the "Summary" sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryRow {
    pub row_label: String,
    pub cth: Option<f64>,
    pub hcm: Option<f64>,
    pub hni: Option<f64>,
    pub grand_total: Option<f64>,
}

/// One order line of the "BANG KE CHI TIET" sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailRow {
    pub order_date: Option<NaiveDateTime>,
    pub payment_date: Option<NaiveDateTime>,
    pub delay_days: Option<i64>,
}

/// A sheet row kept verbatim, keyed by column header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRow {
    pub sheet_name: String,
    pub row_index: usize,
    pub cells: BTreeMap<String, String>,
}

/// Column headers of one sheet, in the order the workbook lists them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
}

/// A delivery that arrived more than a day later than expected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InefficientRoute {
    pub id: u64,
    pub base_address: String,
    pub shipping_address: String,
    pub starting_time: NaiveDateTime,
    pub expected_delivery_time: NaiveDateTime,
    pub actual_delivery_time: NaiveDateTime,
    pub expected_delivery_cost: f64,
    pub actual_delivery_cost: f64,
    /// Cost per hour of driving, in VND
    pub max_delivery_cost: f64,
    /// Drive time in hours suggested by the routing service
    pub optimized_delivery_time: Option<f64>,
    pub time_saved: Option<f64>,
}

impl InefficientRoute {
    pub fn delay_hours(&self) -> f64 {
        hours_between(self.expected_delivery_time, self.actual_delivery_time)
    }

    pub fn actual_duration_hours(&self) -> f64 {
        hours_between(self.starting_time, self.actual_delivery_time)
    }

    pub fn needs_optimization(&self) -> bool {
        self.optimized_delivery_time.is_none() || self.time_saved.is_none()
    }
}

/// Everything parsed from one uploaded workbook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileDataset {
    pub summary_rows: Vec<SummaryRow>,
    pub detail_rows: Vec<DetailRow>,
    pub routes: Vec<InefficientRoute>,
    pub raw_rows: Vec<RawRow>,
    #[serde(default)]
    pub raw_sheets: Vec<RawSheet>,
}

pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
