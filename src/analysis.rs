//! Inefficiency and cost metrics for one uploaded file.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::format;
use crate::model::{InefficientRoute, SummaryRow, UploadedFile, User, round2};
use crate::parser::DELAY_THRESHOLD_HOURS;

const TABLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const NOT_AVAILABLE: &str = "N/A";

/// A value in a report table or metric list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    Text(String),
    Number(f64),
    Count(u64),
}

impl ReportValue {
    fn optional(value: Option<f64>) -> Self {
        match value {
            Some(v) => ReportValue::Number(v),
            None => ReportValue::Text(NOT_AVAILABLE.to_string()),
        }
    }
}

impl std::fmt::Display for ReportValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportValue::Text(text) => f.write_str(text),
            ReportValue::Number(n) => f.write_str(&format::number(*n)),
            ReportValue::Count(n) => write!(f, "{}", n),
        }
    }
}

/// Declared column of a report table.
pub struct Column<R> {
    /// Snake-case field name; the HTML and Excel headers derive from it
    pub key: &'static str,
    /// Compact heading used in the PDF and Word tables
    pub heading: &'static str,
    /// Whether the printed (PDF/Word) reports include this column
    pub printed: bool,
    pub value: fn(&R) -> ReportValue,
}

impl<R> Column<R> {
    pub fn title(&self) -> String {
        format::title_case(self.key)
    }
}

/// One line of the inefficient-routes table.
#[derive(Debug, Clone, PartialEq)]
pub struct IneffRow {
    pub file_id: u64,
    pub base_address: String,
    pub shipping_address: String,
    pub starting_time: String,
    pub expected_delivery_time: String,
    pub actual_delivery_time: String,
    pub expected_delivery_cost: f64,
    pub actual_delivery_cost: f64,
    pub max_delivery_cost: f64,
    pub delay_hours: f64,
    pub optimized_delivery_time: Option<f64>,
    pub time_saved: Option<f64>,
}

/// One line of the cost breakdown: what the route cost against what the
/// optimised route would have cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRow {
    pub route_id: u64,
    pub base_address: String,
    pub shipping_address: String,
    pub actual_duration: f64,
    pub optimized_time: f64,
    pub max_delivery_cost: f64,
    pub optimized_cost: f64,
    pub actual_cost: f64,
    pub cost_saved: f64,
}

pub static INEFF_COLUMNS: &[Column<IneffRow>] = &[
    Column { key: "file_id", heading: "File", printed: false, value: |r| ReportValue::Count(r.file_id) },
    Column { key: "base_address", heading: "Base Address", printed: true, value: |r| ReportValue::Text(r.base_address.clone()) },
    Column { key: "shipping_address", heading: "Shipping Address", printed: true, value: |r| ReportValue::Text(r.shipping_address.clone()) },
    Column { key: "starting_time", heading: "Start Time", printed: true, value: |r| ReportValue::Text(r.starting_time.clone()) },
    Column { key: "expected_delivery_time", heading: "Expected Time", printed: true, value: |r| ReportValue::Text(r.expected_delivery_time.clone()) },
    Column { key: "actual_delivery_time", heading: "Actual Time", printed: true, value: |r| ReportValue::Text(r.actual_delivery_time.clone()) },
    Column { key: "expected_delivery_cost", heading: "Expected Cost", printed: false, value: |r| ReportValue::Number(r.expected_delivery_cost) },
    Column { key: "actual_delivery_cost", heading: "Actual Cost", printed: false, value: |r| ReportValue::Number(r.actual_delivery_cost) },
    Column { key: "max_delivery_cost", heading: "Max Cost", printed: false, value: |r| ReportValue::Number(r.max_delivery_cost) },
    Column { key: "delay_hours", heading: "Delay (h)", printed: true, value: |r| ReportValue::Number(r.delay_hours) },
    Column { key: "optimized_delivery_time", heading: "Optimized (h)", printed: true, value: |r| ReportValue::optional(r.optimized_delivery_time) },
    Column { key: "time_saved", heading: "Time Saved (h)", printed: true, value: |r| ReportValue::optional(r.time_saved) },
];

pub static COST_COLUMNS: &[Column<CostRow>] = &[
    Column { key: "route_id", heading: "Route ID", printed: true, value: |r| ReportValue::Count(r.route_id) },
    Column { key: "base_address", heading: "Base Address", printed: true, value: |r| ReportValue::Text(r.base_address.clone()) },
    Column { key: "shipping_address", heading: "Shipping Address", printed: true, value: |r| ReportValue::Text(r.shipping_address.clone()) },
    Column { key: "actual_duration", heading: "Actual Dur (h)", printed: true, value: |r| ReportValue::Number(r.actual_duration) },
    Column { key: "optimized_time", heading: "Optimized (h)", printed: true, value: |r| ReportValue::Number(r.optimized_time) },
    Column { key: "max_delivery_cost", heading: "Max Cost", printed: true, value: |r| ReportValue::Number(r.max_delivery_cost) },
    Column { key: "optimized_cost", heading: "Opt Cost", printed: true, value: |r| ReportValue::Number(r.optimized_cost) },
    Column { key: "actual_cost", heading: "Act Cost", printed: true, value: |r| ReportValue::Number(r.actual_cost) },
    Column { key: "cost_saved", heading: "Saved", printed: true, value: |r| ReportValue::Number(r.cost_saved) },
];

/// Metric keys in report order.
pub const METRIC_KEYS: [&str; 11] = [
    "file_name",
    "upload_date",
    "user_name",
    "user_email",
    "inefficient_routes",
    "total_delayed_hours",
    "avg_delayed_hours",
    "total_time_saved",
    "avg_time_saved",
    "total_cost_saved",
    "avg_cost_saved",
];

/// Metrics rendered as currency
pub const CURRENCY_METRICS: [&str; 2] = ["total_cost_saved", "avg_cost_saved"];

/// Text shown for a metric; currency metrics get thousands separators.
pub fn metric_display(key: &str, value: &ReportValue) -> String {
    match value {
        ReportValue::Number(n) if CURRENCY_METRICS.contains(&key) => format::with_thousands(*n),
        other => other.to_string(),
    }
}

/// Everything a report about one file shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub file_id: u64,
    pub file_name: String,
    pub upload_date: NaiveDateTime,
    pub user_name: String,
    pub user_email: String,
    pub inefficient_routes: u64,
    pub total_delayed_hours: f64,
    pub avg_delayed_hours: f64,
    pub total_time_saved: f64,
    pub avg_time_saved: f64,
    pub total_cost_saved: f64,
    pub avg_cost_saved: f64,
    pub ineff_table: Vec<IneffRow>,
    pub cost_table: Vec<CostRow>,
}

impl ReportSummary {
    pub fn metric(&self, key: &str) -> Option<ReportValue> {
        let value = match key {
            "file_name" => ReportValue::Text(self.file_name.clone()),
            "upload_date" => {
                ReportValue::Text(self.upload_date.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            "user_name" => ReportValue::Text(self.user_name.clone()),
            "user_email" => ReportValue::Text(self.user_email.clone()),
            "inefficient_routes" => ReportValue::Count(self.inefficient_routes),
            "total_delayed_hours" => ReportValue::Number(self.total_delayed_hours),
            "avg_delayed_hours" => ReportValue::Number(self.avg_delayed_hours),
            "total_time_saved" => ReportValue::Number(self.total_time_saved),
            "avg_time_saved" => ReportValue::Number(self.avg_time_saved),
            "total_cost_saved" => ReportValue::Number(self.total_cost_saved),
            "avg_cost_saved" => ReportValue::Number(self.avg_cost_saved),
            _ => return None,
        };
        Some(value)
    }

    /// `(key, value)` pairs in report order, optionally without the user
    /// identity lines.
    pub fn metrics(&self, include_user: bool) -> Vec<(&'static str, ReportValue)> {
        METRIC_KEYS
            .iter()
            .filter(|key| include_user || !key.starts_with("user_"))
            .filter_map(|key| self.metric(key).map(|value| (*key, value)))
            .collect()
    }
}

/// Compute the report for `file` from its routes.
///
/// Averages divide by the number of routes delayed beyond the threshold,
/// and are zero when there are none.
pub fn summarize(file: &UploadedFile, user: &User, routes: &[InefficientRoute]) -> ReportSummary {
    let inefficient = routes
        .iter()
        .filter(|route| route.delay_hours() > DELAY_THRESHOLD_HOURS)
        .count() as u64;
    let average = |total: f64| {
        if inefficient > 0 {
            total / inefficient as f64
        } else {
            0.0
        }
    };

    let total_delay: f64 = routes.iter().map(InefficientRoute::delay_hours).sum();
    let total_saved: f64 = routes.iter().filter_map(|route| route.time_saved).sum();

    let cost_table = cost_rows(routes);
    let total_cost_saved: f64 = cost_table.iter().map(|row| row.cost_saved).sum();

    ReportSummary {
        file_id: file.id,
        file_name: file.filename.clone(),
        upload_date: file.upload_date,
        user_name: user.full_name(),
        user_email: user.email.clone(),
        inefficient_routes: inefficient,
        total_delayed_hours: round2(total_delay),
        avg_delayed_hours: round2(average(total_delay)),
        total_time_saved: round2(total_saved),
        avg_time_saved: round2(average(total_saved)),
        total_cost_saved: round2(total_cost_saved),
        avg_cost_saved: round2(average(total_cost_saved)),
        ineff_table: ineff_rows(file.id, routes),
        cost_table,
    }
}

pub fn ineff_rows(file_id: u64, routes: &[InefficientRoute]) -> Vec<IneffRow> {
    routes
        .iter()
        .map(|route| IneffRow {
            file_id,
            base_address: route.base_address.clone(),
            shipping_address: route.shipping_address.clone(),
            starting_time: route.starting_time.format(TABLE_TIME_FORMAT).to_string(),
            expected_delivery_time: route.expected_delivery_time.format(TABLE_TIME_FORMAT).to_string(),
            actual_delivery_time: route.actual_delivery_time.format(TABLE_TIME_FORMAT).to_string(),
            expected_delivery_cost: route.expected_delivery_cost,
            actual_delivery_cost: route.actual_delivery_cost,
            max_delivery_cost: route.max_delivery_cost,
            delay_hours: round2(route.delay_hours()),
            optimized_delivery_time: route.optimized_delivery_time,
            time_saved: route.time_saved,
        })
        .collect()
}

/// Cost comparison for every route that has an optimised drive time.
pub fn cost_rows(routes: &[InefficientRoute]) -> Vec<CostRow> {
    routes
        .iter()
        .filter_map(|route| {
            let optimized = route.optimized_delivery_time?;
            let actual = route.actual_duration_hours();
            let optimized_cost = route.max_delivery_cost * optimized;
            let actual_cost = route.max_delivery_cost * actual;
            Some(CostRow {
                route_id: route.id,
                base_address: route.base_address.clone(),
                shipping_address: route.shipping_address.clone(),
                actual_duration: round2(actual),
                optimized_time: round2(optimized),
                max_delivery_cost: route.max_delivery_cost,
                optimized_cost: round2(optimized_cost),
                actual_cost: round2(actual_cost),
                cost_saved: round2(actual_cost - optimized_cost),
            })
        })
        .collect()
}

/// Four category series aligned to one label sequence, for the cost chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub cth: Vec<f64>,
    pub hcm: Vec<f64>,
    pub hni: Vec<f64>,
    pub grand: Vec<f64>,
}

pub fn chart_series(rows: &[SummaryRow]) -> ChartSeries {
    ChartSeries {
        labels: rows.iter().map(|row| row.row_label.clone()).collect(),
        cth: rows.iter().map(|row| row.cth.unwrap_or(0.0)).collect(),
        hcm: rows.iter().map(|row| row.hcm.unwrap_or(0.0)).collect(),
        hni: rows.iter().map(|row| row.hni.unwrap_or(0.0)).collect(),
        grand: rows.iter().map(|row| row.grand_total.unwrap_or(0.0)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn file() -> UploadedFile {
        UploadedFile {
            id: 4,
            filename: "routes.xlsx".into(),
            size: 12.0,
            upload_date: at(5, 9),
            user_id: 1,
        }
    }

    fn user() -> User {
        User {
            id: 1,
            first_name: "Lan".into(),
            last_name: "Nguyen".into(),
            email: "lan@example.com".into(),
            password_hash: String::new(),
        }
    }

    fn route(id: u64, actual_day: u32, optimized: Option<f64>) -> InefficientRoute {
        InefficientRoute {
            id,
            base_address: format!("Depot {}", id),
            shipping_address: "Hanoi".into(),
            starting_time: at(1, 0),
            expected_delivery_time: at(1, 12),
            actual_delivery_time: at(actual_day, 0),
            expected_delivery_cost: 1_000_000.0,
            actual_delivery_cost: 3_000_000.0,
            max_delivery_cost: 50_000.0,
            optimized_delivery_time: optimized,
            time_saved: optimized.map(|opt| round2((actual_day as f64 - 1.0) * 24.0 - opt)),
        }
    }

    #[test]
    fn summary_of_two_routes() {
        // Route 1: 48h driven, 36h late, optimisable to 20h
        // Route 2: 72h driven, 60h late, no optimisation
        let routes = vec![route(1, 3, Some(20.0)), route(2, 4, None)];
        let summary = summarize(&file(), &user(), &routes);

        assert_eq!(summary.inefficient_routes, 2);
        assert_eq!(summary.total_delayed_hours, 96.0);
        assert_eq!(summary.avg_delayed_hours, 48.0);
        assert_eq!(summary.total_time_saved, 28.0);
        assert_eq!(summary.avg_time_saved, 14.0);
        // (48 - 20) * 50,000
        assert_eq!(summary.total_cost_saved, 1_400_000.0);
        assert_eq!(summary.avg_cost_saved, 700_000.0);
        assert_eq!(summary.user_name, "Lan Nguyen");

        assert_eq!(summary.cost_table.len(), 1);
        let cost = &summary.cost_table[0];
        assert_eq!(cost.actual_cost, 2_400_000.0);
        assert_eq!(cost.optimized_cost, 1_000_000.0);

        assert_eq!(summary.ineff_table.len(), 2);
        assert_eq!(summary.ineff_table[1].starting_time, "2024-01-01 00:00");
        assert_eq!(summary.ineff_table[1].optimized_delivery_time, None);
    }

    #[test]
    fn no_routes_means_zero_averages() {
        let summary = summarize(&file(), &user(), &[]);
        assert_eq!(summary.inefficient_routes, 0);
        assert_eq!(summary.avg_delayed_hours, 0.0);
        assert_eq!(summary.avg_cost_saved, 0.0);
        assert!(summary.ineff_table.is_empty());
        assert!(summary.cost_table.is_empty());
    }

    #[test]
    fn missing_optimisation_renders_not_available() {
        let rows = ineff_rows(4, &[route(2, 4, None)]);
        let time_saved = INEFF_COLUMNS.iter().find(|c| c.key == "time_saved").unwrap();
        assert_eq!((time_saved.value)(&rows[0]).to_string(), "N/A");
        assert_eq!(time_saved.title(), "Time Saved");
    }

    #[test]
    fn metrics_can_leave_out_user_identity() {
        let summary = summarize(&file(), &user(), &[]);
        let with_user: Vec<&str> = summary.metrics(true).iter().map(|(k, _)| *k).collect();
        let without: Vec<&str> = summary.metrics(false).iter().map(|(k, _)| *k).collect();
        assert_eq!(with_user.len(), METRIC_KEYS.len());
        assert!(!without.contains(&"user_email"));
        assert_eq!(without.len(), METRIC_KEYS.len() - 2);
        assert_eq!(
            summary.metric("upload_date").unwrap().to_string(),
            "2024-01-05 09:00:00"
        );
    }

    #[test]
    fn currency_metrics_are_grouped() {
        let value = ReportValue::Number(1_400_000.0);
        assert_eq!(metric_display("total_cost_saved", &value), "1,400,000.00");
        assert_eq!(metric_display("total_time_saved", &value), "1400000");
    }

    #[test]
    fn chart_series_fill_missing_with_zero() {
        let rows = vec![
            SummaryRow {
                row_label: "Fuel".into(),
                cth: Some(1.0),
                hcm: None,
                hni: Some(2.0),
                grand_total: Some(3.0),
            },
            SummaryRow {
                row_label: "Tolls".into(),
                ..SummaryRow::default()
            },
        ];
        let series = chart_series(&rows);
        assert_eq!(series.labels, vec!["Fuel", "Tolls"]);
        assert_eq!(series.hcm, vec![0.0, 0.0]);
        assert_eq!(series.grand, vec![3.0, 0.0]);
    }
}
