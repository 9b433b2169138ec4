use crate::error::{AppError, Result};
use crate::model::{DetailRow, FileDataset, InefficientRoute, RawRow, RawSheet, SummaryRow};
use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Extensions accepted by the upload form
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "doc", "docx", "xls", "xlsx"];

pub const SUMMARY_SHEET: &str = "Summary";
pub const DETAIL_SHEET: &str = "BANG KE CHI TIET";

/// Rows above the header line of the "Summary" sheet
const SUMMARY_SKIP_ROWS: u32 = 3;

const ORDER_DATE_COLUMN: &str = "NGÀY ĐH";
const PAYMENT_DATE_COLUMN: &str = "NGÀY CHI";

const BASE_ADDRESS: &str = "Base Address";
const SHIPPING_ADDRESS: &str = "Shipping Address";
const STARTING_TIME: &str = "Starting Time";
const EXPECTED_HOURS: &str = "Expected Delivery Time (hours)";
const ACTUAL_HOURS: &str = "Actual Delivery Time (hours)";
const EXPECTED_COST: &str = "Expected Delivery Cost (VND)";
const ACTUAL_COST: &str = "Actual Delivery Cost (VND)";
const MAX_COST: &str = "Max Delivery Cost (VND/hr)";

const ROUTE_COLUMNS: [&str; 8] = [
    BASE_ADDRESS,
    SHIPPING_ADDRESS,
    STARTING_TIME,
    EXPECTED_HOURS,
    ACTUAL_HOURS,
    EXPECTED_COST,
    ACTUAL_COST,
    MAX_COST,
];

pub const FILE_TOO_LARGE: &str = "File too large (>10MB).";

/// Deliveries later than this many hours count as inefficient
pub const DELAY_THRESHOLD_HOURS: f64 = 24.0;

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// A single cell value, normalised from whatever the workbook stored.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    fn from_data(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::String(s) if s.trim().is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Empty),
            Data::DateTimeIso(s) => parse_datetime(s)
                .map(CellValue::DateTime)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => to_float(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(dt) => Some(*dt),
            CellValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Text form used when a row is stored verbatim.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// One worksheet as a header row plus data rows.
#[derive(Debug, Clone)]
struct SheetTable {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    /// Build a table from `range`, using absolute sheet row `header_row` as
    /// the header. Rows above the header are discarded.
    fn from_range(range: &Range<Data>, header_row: u32) -> Option<Self> {
        let start_row = range.start().map(|(row, _)| row).unwrap_or(0);
        if header_row < start_row {
            // The header sits in blank rows calamine trimmed away
            return None;
        }
        let skip = (header_row - start_row) as usize;
        let mut rows = range.rows().skip(skip);
        let header_cells = rows.next()?;
        let headers = header_cells
            .iter()
            .enumerate()
            .map(|(col, cell)| match CellValue::from_data(cell) {
                CellValue::Empty => format!("Unnamed: {}", col),
                value => value.display().trim().to_string(),
            })
            .collect();
        let rows = rows
            .map(|row| row.iter().map(CellValue::from_data).collect())
            .collect();
        Some(SheetTable { headers, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.column(name).is_some())
    }
}

fn cell(row: &[CellValue], col: Option<usize>) -> &CellValue {
    const EMPTY: &CellValue = &CellValue::Empty;
    col.and_then(|index| row.get(index)).unwrap_or(EMPTY)
}

/// Result of parsing an uploaded workbook.
#[derive(Debug, Clone, Default)]
pub struct ParsedWorkbook {
    pub summary_rows: Vec<SummaryRow>,
    pub detail_rows: Vec<DetailRow>,
    pub routes: Vec<InefficientRoute>,
    pub raw_rows: Vec<RawRow>,
    pub raw_sheets: Vec<RawSheet>,
}

/// Parse an `.xls`/`.xlsx` workbook held in memory.
///
/// Every sheet is kept as raw rows. The "Summary" and "BANG KE CHI TIET"
/// sheets are additionally interpreted, and any sheet carrying the delivery
/// columns contributes inefficient routes.
///
/// # Errors
/// * Returns `AppError::Workbook` if the bytes are not a readable workbook
///
/// # Examples
/// ```no_run
/// use retrotrack::parser::parse_workbook;
///
/// let bytes = std::fs::read("deliveries.xlsx").unwrap();
/// let parsed = parse_workbook(&bytes).unwrap();
/// println!("{} inefficient routes", parsed.routes.len());
/// ```
pub fn parse_workbook(bytes: &[u8]) -> Result<ParsedWorkbook> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let mut parsed = ParsedWorkbook::default();

    for sheet_name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet_name)?;
        let start_row = range.start().map(|(row, _)| row).unwrap_or(0);

        let Some(table) = SheetTable::from_range(&range, start_row) else {
            continue;
        };

        parsed.raw_sheets.push(RawSheet {
            name: sheet_name.clone(),
            headers: table.headers.clone(),
        });
        parsed.raw_rows.extend(raw_rows(&sheet_name, &table));

        if table.has_columns(&ROUTE_COLUMNS) {
            let first_id = parsed.routes.len() as u64 + 1;
            parsed.routes.extend(inefficient_routes(&table, first_id));
        }

        if sheet_name == SUMMARY_SHEET {
            if let Some(summary) = SheetTable::from_range(&range, SUMMARY_SKIP_ROWS) {
                parsed.summary_rows = summary_rows(&summary);
            }
        }

        if sheet_name == DETAIL_SHEET {
            if table.has_columns(&[ORDER_DATE_COLUMN, PAYMENT_DATE_COLUMN]) {
                parsed.detail_rows = detail_rows(&table);
            } else {
                log::warn!("sheet {} lacks the order/payment date columns", DETAIL_SHEET);
            }
        }
    }

    log::debug!(
        "parsed workbook: {} raw rows, {} summary rows, {} detail rows, {} routes",
        parsed.raw_rows.len(),
        parsed.summary_rows.len(),
        parsed.detail_rows.len(),
        parsed.routes.len()
    );
    Ok(parsed)
}

fn raw_rows(sheet_name: &str, table: &SheetTable) -> Vec<RawRow> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            let cells: BTreeMap<String, String> = table
                .headers
                .iter()
                .zip(row.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(header, value)| (header.clone(), value.display()))
                .collect();
            RawRow {
                sheet_name: sheet_name.to_string(),
                row_index,
                cells,
            }
        })
        .collect()
}

fn summary_rows(table: &SheetTable) -> Vec<SummaryRow> {
    let label = table.column("Row Labels");
    let cth = table.column("CTH");
    let hcm = table.column("HCM");
    let hni = table.column("HNI");
    let grand_total = table.column("Grand Total");

    table
        .rows
        .iter()
        .filter(|row| !cell(row, label).is_empty())
        .map(|row| SummaryRow {
            row_label: cell(row, label).display(),
            cth: cell(row, cth).as_f64(),
            hcm: cell(row, hcm).as_f64(),
            hni: cell(row, hni).as_f64(),
            grand_total: cell(row, grand_total).as_f64(),
        })
        .collect()
}

fn detail_rows(table: &SheetTable) -> Vec<DetailRow> {
    let ordered = table.column(ORDER_DATE_COLUMN);
    let paid = table.column(PAYMENT_DATE_COLUMN);

    table
        .rows
        .iter()
        .map(|row| {
            let order_date = cell(row, ordered).as_datetime();
            let payment_date = cell(row, paid).as_datetime();
            let delay_days = match (order_date, payment_date) {
                // Whole days, rounded toward negative infinity
                (Some(from), Some(to)) => Some((to - from).num_seconds().div_euclid(86_400)),
                _ => None,
            };
            DetailRow {
                order_date,
                payment_date,
                delay_days,
            }
        })
        .collect()
}

fn inefficient_routes(table: &SheetTable, first_id: u64) -> Vec<InefficientRoute> {
    let columns: Vec<Option<usize>> = ROUTE_COLUMNS.iter().map(|name| table.column(name)).collect();
    let mut routes = Vec::new();

    for row in &table.rows {
        let values: Vec<&CellValue> = columns.iter().map(|col| cell(row, *col)).collect();
        if values.iter().any(|value| value.is_empty()) {
            continue;
        }

        let Some(starting_time) = values[2].as_datetime() else {
            continue;
        };
        let (Some(expected_hours), Some(actual_hours)) = (values[3].as_f64(), values[4].as_f64())
        else {
            continue;
        };
        if actual_hours - expected_hours <= DELAY_THRESHOLD_HOURS {
            continue;
        }
        let (Some(expected_cost), Some(actual_cost), Some(max_cost)) =
            (values[5].as_f64(), values[6].as_f64(), values[7].as_f64())
        else {
            continue;
        };
        let (Some(expected_delivery_time), Some(actual_delivery_time)) = (
            after_hours(starting_time, expected_hours),
            after_hours(starting_time, actual_hours),
        ) else {
            log::warn!("skipping route from {}: delivery hours out of range", values[0].display());
            continue;
        };

        routes.push(InefficientRoute {
            id: first_id + routes.len() as u64,
            base_address: values[0].display(),
            shipping_address: values[1].display(),
            starting_time,
            expected_delivery_time,
            actual_delivery_time,
            expected_delivery_cost: expected_cost,
            actual_delivery_cost: actual_cost,
            max_delivery_cost: max_cost,
            optimized_delivery_time: None,
            time_saved: None,
        });
    }

    routes
}

/// Rebuild the inefficient routes of a stored dataset from its raw rows.
///
/// Only sheets whose headers carry every delivery column are scanned. Route
/// ids start at `first_id` and run on across sheets.
///
/// # Arguments
/// * `sheets` - Header order of each stored sheet
/// * `rows` - Raw rows as saved at upload time
/// * `first_id` - Id given to the first route found
pub fn routes_from_raw(sheets: &[RawSheet], rows: &[RawRow], first_id: u64) -> Vec<InefficientRoute> {
    let mut routes = Vec::new();
    for sheet in sheets {
        let mut sheet_rows: Vec<&RawRow> = rows.iter().filter(|row| row.sheet_name == sheet.name).collect();
        sheet_rows.sort_by_key(|row| row.row_index);
        let table = SheetTable {
            headers: sheet.headers.clone(),
            rows: sheet_rows
                .into_iter()
                .map(|row| {
                    sheet
                        .headers
                        .iter()
                        .map(|header| match row.cells.get(header) {
                            Some(text) => CellValue::Text(text.clone()),
                            None => CellValue::Empty,
                        })
                        .collect()
                })
                .collect(),
        };
        if table.has_columns(&ROUTE_COLUMNS) {
            routes.extend(inefficient_routes(&table, first_id + routes.len() as u64));
        }
    }
    routes
}

/// Add routes found in the stored raw rows that the dataset lacks.
///
/// A route counts as known when one with the same base address and starting
/// time is already stored. New routes take ids after the highest existing
/// one. Returns how many were added.
pub fn rescan_routes(dataset: &mut FileDataset) -> usize {
    let next_id = dataset.routes.iter().map(|route| route.id).max().unwrap_or(0) + 1;
    let found = routes_from_raw(&dataset.raw_sheets, &dataset.raw_rows, next_id);

    let mut added = 0;
    for mut route in found {
        let known = dataset.routes.iter().any(|existing| {
            existing.base_address == route.base_address && existing.starting_time == route.starting_time
        });
        if known {
            continue;
        }
        route.id = next_id + added as u64;
        dataset.routes.push(route);
        added += 1;
    }
    added
}

/// `start` moved forward by a fractional number of hours, `None` when the
/// result does not fit in a date-time.
fn after_hours(start: NaiveDateTime, hours: f64) -> Option<NaiveDateTime> {
    let millis = (hours * 3_600_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    start.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

/// Parse a number leniently: thousands commas and surrounding whitespace
/// are ignored. Infinities and NaN are not numbers here.
///
/// ```
/// use retrotrack::parser::to_float;
///
/// assert_eq!(to_float(" 1,250,000 "), Some(1_250_000.0));
/// assert_eq!(to_float("n/a"), None);
/// ```
pub fn to_float(value: &str) -> Option<f64> {
    value
        .replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Parse a date or date-time written as text.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Whether `filename` ends in one of the accepted upload extensions.
pub fn allowed_extension(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Reduce a client-supplied filename to something safe to display and store.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become a single underscore, and anything outside `[A-Za-z0-9_.-]` is
/// removed. Returns `None` when nothing usable is left.
pub fn secure_filename(filename: &str) -> Option<String> {
    let ascii: String = filename
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reject anything the upload form should not accept.
pub fn validate_upload(filename: &str, size: usize, max_bytes: usize) -> Result<String> {
    if filename.trim().is_empty() {
        return Err(AppError::InvalidUpload("No file selected.".into()));
    }
    if !allowed_extension(filename) {
        return Err(AppError::InvalidUpload("Invalid file extension.".into()));
    }
    if size > max_bytes {
        return Err(AppError::InvalidUpload(FILE_TOO_LARGE.into()));
    }
    secure_filename(filename).ok_or_else(|| AppError::InvalidUpload("Invalid file name.".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_float_strips_commas() {
        assert_eq!(to_float("1,234.5"), Some(1234.5));
        assert_eq!(to_float("  42 "), Some(42.0));
        assert_eq!(to_float(""), None);
        assert_eq!(to_float("abc"), None);
        assert_eq!(to_float("inf"), None);
        assert_eq!(to_float("NaN"), None);
    }

    #[test]
    fn after_hours_refuses_unrepresentable_offsets() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(after_hours(start, 1.5), start.checked_add_signed(Duration::minutes(90)));
        assert_eq!(after_hours(start, 1e10), None);
        assert_eq!(after_hours(start, -1e300), None);
        assert_eq!(after_hours(start, f64::INFINITY), None);
    }

    #[test]
    fn parse_datetime_accepts_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-05 08:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-05 08:30"), Some(expected));
        assert_eq!(parse_datetime("05/03/2024 08:30"), Some(expected));
        assert_eq!(
            parse_datetime("2024-03-05"),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn secure_filename_sanitizes() {
        assert_eq!(secure_filename("My Report.xlsx").as_deref(), Some("My_Report.xlsx"));
        assert_eq!(secure_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(secure_filename("báo cáo.xls").as_deref(), Some("bo_co.xls"));
        assert_eq!(secure_filename("data.XLSX").as_deref(), Some("data.XLSX"));
        assert_eq!(secure_filename("..."), None);
    }

    #[test]
    fn allowed_extension_is_case_insensitive() {
        assert!(allowed_extension("a.XLSX"));
        assert!(allowed_extension("a.pdf"));
        assert!(!allowed_extension("a.csv"));
        assert!(!allowed_extension("xlsx"));
    }

    #[test]
    fn validate_upload_reports_first_problem() {
        let max = 10 * 1024 * 1024;
        assert!(matches!(
            validate_upload("", 10, max),
            Err(AppError::InvalidUpload(msg)) if msg == "No file selected."
        ));
        assert!(matches!(
            validate_upload("notes.txt", 10, max),
            Err(AppError::InvalidUpload(msg)) if msg == "Invalid file extension."
        ));
        assert!(matches!(
            validate_upload("big.xlsx", max + 1, max),
            Err(AppError::InvalidUpload(msg)) if msg.starts_with("File too large")
        ));
        assert_eq!(validate_upload("ok file.xlsx", 10, max).unwrap(), "ok_file.xlsx");
    }

    #[test]
    fn cell_display_drops_integral_fraction() {
        assert_eq!(CellValue::Number(12.0).display(), "12");
        assert_eq!(CellValue::Number(12.5).display(), "12.5");
        assert_eq!(CellValue::Text("x".into()).display(), "x");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(matches!(
            parse_workbook(b"definitely not a workbook"),
            Err(AppError::Workbook(_))
        ));
    }
}
