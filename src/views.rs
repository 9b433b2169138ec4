//! Page models handed to the templates.
//!
//! Each page gets its own serialisable struct so the templates only ever
//! see display-ready strings.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::analysis::{self, Column, ReportSummary, chart_series, metric_display};
use crate::flash::Flash;
use crate::format;
use crate::model::{DetailRow, FileDataset, RawRow, RawSheet, SummaryRow, UploadedFile, User};
use crate::paths;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Navigation bar and flashed messages common to every page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Shell {
    pub title: String,
    pub logged_in: bool,
    pub user_name: Option<String>,
    pub messages: Vec<Flash>,
    /// "Download Reports" menu entries
    pub report_links: Vec<Link>,
}

impl Shell {
    pub fn new(title: &str, user: Option<&User>, files: &[UploadedFile], messages: Vec<Flash>) -> Self {
        Shell {
            title: title.to_string(),
            logged_in: user.is_some(),
            user_name: user.map(User::full_name),
            messages,
            report_links: files
                .iter()
                .map(|file| Link::new(&file.filename, paths::report(file.id)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

impl Link {
    fn new(label: &str, url: String) -> Self {
        Link {
            label: label.to_string(),
            url,
        }
    }
}

/// A page body wrapped in the shell.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub shell: Shell,
    pub page: T,
}

/// One line of the file registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRow {
    pub id: u64,
    pub filename: String,
    pub file_type: String,
    pub size: String,
    pub upload_date: String,
    /// Analysis pages; empty for non-Excel files
    pub links: Vec<Link>,
    /// Shown instead of the links, e.g. `N/A for PDF`
    pub placeholder: Option<String>,
    pub delete_url: String,
    pub report_url: String,
}

pub fn file_rows(files: &[UploadedFile]) -> Vec<FileRow> {
    files
        .iter()
        .map(|file| {
            let (links, placeholder) = if file.is_excel() {
                let links = vec![
                    Link::new("View Summary", paths::view_summary(file.id)),
                    Link::new("View Details", paths::view_details(file.id)),
                    Link::new("Analyze Routes", paths::analyze_route(file.id)),
                    Link::new("Analyze Cost", paths::analyze_cost(file.id)),
                    Link::new("View All Data", paths::view_all_excel_data(file.id)),
                ];
                (links, None)
            } else {
                (Vec::new(), Some(format!("N/A for {}", file.file_type())))
            };

            FileRow {
                id: file.id,
                filename: file.filename.clone(),
                file_type: file.file_type(),
                size: format!("{:.2}", file.size),
                upload_date: file.upload_date.format(DATE_FORMAT).to_string(),
                links,
                placeholder,
                delete_url: paths::delete_file(file.id),
                report_url: paths::report(file.id),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesView {
    pub files: Vec<FileRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub file_count: usize,
}

impl ProfileView {
    pub fn new(user: &User, file_count: usize) -> Self {
        ProfileView {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            file_count,
        }
    }
}

/// Header row plus display rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    /// Every declared column, headed by its title-cased key.
    pub fn from_columns<R>(columns: &[Column<R>], rows: &[R]) -> Self {
        TableView {
            headers: columns.iter().map(Column::title).collect(),
            rows: rows
                .iter()
                .map(|row| columns.iter().map(|column| (column.value)(row).to_string()).collect())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

const SUMMARY_HEADERS: [&str; 5] = ["Row Labels", "CTH", "HCM", "HNI", "Grand Total"];

fn summary_table(rows: &[SummaryRow]) -> TableView {
    TableView {
        headers: SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| {
                vec![
                    row.row_label.clone(),
                    format::amount_or_zero(row.cth),
                    format::amount_or_zero(row.hcm),
                    format::amount_or_zero(row.hni),
                    format::amount_or_zero(row.grand_total),
                ]
            })
            .collect(),
    }
}

/// Pages that show a single table for one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileTableView {
    pub file_id: u64,
    pub file_name: String,
    pub table: TableView,
    pub empty_message: String,
}

pub fn summary_view(file: &UploadedFile, rows: &[SummaryRow]) -> FileTableView {
    FileTableView {
        file_id: file.id,
        file_name: file.filename.clone(),
        table: summary_table(rows),
        empty_message: "No summary data available".to_string(),
    }
}

pub fn details_view(file: &UploadedFile, rows: &[DetailRow]) -> FileTableView {
    let date = |value: Option<chrono::NaiveDateTime>| {
        value
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default()
    };
    FileTableView {
        file_id: file.id,
        file_name: file.filename.clone(),
        table: TableView {
            headers: vec!["Order Date".into(), "Payment Date".into(), "Delay (days)".into()],
            rows: rows
                .iter()
                .map(|row| {
                    vec![
                        date(row.order_date),
                        date(row.payment_date),
                        row.delay_days.map(|d| d.to_string()).unwrap_or_default(),
                    ]
                })
                .collect(),
        },
        empty_message: "No detail data available".to_string(),
    }
}

/// Inefficient routes with whatever optimisation data is known.
#[derive(Debug, Clone, Serialize)]
pub struct RouteAnalysisView {
    pub file_id: u64,
    pub file_name: String,
    pub table: TableView,
    pub optimizer_enabled: bool,
    pub report_url: String,
}

pub fn route_analysis_view(
    file: &UploadedFile,
    dataset: &FileDataset,
    optimizer_enabled: bool,
) -> RouteAnalysisView {
    let rows = analysis::ineff_rows(file.id, &dataset.routes);
    RouteAnalysisView {
        file_id: file.id,
        file_name: file.filename.clone(),
        table: TableView::from_columns(analysis::INEFF_COLUMNS, &rows),
        optimizer_enabled,
        report_url: paths::report(file.id),
    }
}

/// Summary table and the data behind the category bar chart.
#[derive(Debug, Clone, Serialize)]
pub struct CostAnalysisView {
    pub file_id: u64,
    pub file_name: String,
    pub has_data: bool,
    pub table: TableView,
    /// `{labels, cth_data, hcm_data, hni_data, grand_data}` as a script-safe
    /// JSON literal
    pub chart_json: String,
}

#[derive(Serialize)]
struct ChartData<'a> {
    labels: &'a [String],
    cth_data: &'a [f64],
    hcm_data: &'a [f64],
    hni_data: &'a [f64],
    grand_data: &'a [f64],
}

pub fn cost_analysis_view(file: &UploadedFile, rows: &[SummaryRow]) -> CostAnalysisView {
    let series = chart_series(rows);
    let data = ChartData {
        labels: &series.labels,
        cth_data: &series.cth,
        hcm_data: &series.hcm,
        hni_data: &series.hni,
        grand_data: &series.grand,
    };
    let chart_json = serde_json::to_string(&data).unwrap_or_else(|_| "{}".to_string());

    CostAnalysisView {
        file_id: file.id,
        file_name: file.filename.clone(),
        has_data: !rows.is_empty(),
        table: summary_table(rows),
        chart_json: script_safe(&chart_json),
    }
}

/// Keep JSON from closing the surrounding `<script>` element.
fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Every sheet of the workbook, rows in their original order.
#[derive(Debug, Clone, Serialize)]
pub struct RawDataView {
    pub file_id: u64,
    pub file_name: String,
    pub sheets: Vec<SheetView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetView {
    pub name: String,
    pub table: TableView,
}

/// Columns follow the sheet's own header order. Rows stored without a
/// matching sheet fall back to the order cells first appear in.
pub fn raw_data_view(file: &UploadedFile, raw_sheets: &[RawSheet], raw_rows: &[RawRow]) -> RawDataView {
    let mut sheets: BTreeMap<String, Vec<&RawRow>> = BTreeMap::new();
    for row in raw_rows {
        sheets.entry(row.sheet_name.clone()).or_default().push(row);
    }
    for rows in sheets.values_mut() {
        rows.sort_by_key(|row| row.row_index);
    }

    RawDataView {
        file_id: file.id,
        file_name: file.filename.clone(),
        sheets: sheets
            .into_iter()
            .map(|(name, rows)| {
                let headers = match raw_sheets.iter().find(|sheet| sheet.name == name) {
                    Some(sheet) => sheet.headers.clone(),
                    None => {
                        let mut headers: Vec<String> = Vec::new();
                        for row in &rows {
                            for key in row.cells.keys() {
                                if !headers.contains(key) {
                                    headers.push(key.clone());
                                }
                            }
                        }
                        headers
                    }
                };
                let table_rows = rows
                    .iter()
                    .map(|row| {
                        headers
                            .iter()
                            .map(|h| row.cells.get(h).cloned().unwrap_or_default())
                            .collect()
                    })
                    .collect();
                SheetView {
                    name,
                    table: TableView {
                        headers,
                        rows: table_rows,
                    },
                }
            })
            .collect(),
    }
}

/// A file with the number of inefficient routes stored for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteFileRow {
    pub filename: String,
    pub upload_date: String,
    pub route_count: usize,
    pub url: String,
}

/// `/inefficient` and `/cost-analysis` without a file picked.
#[derive(Debug, Clone, Serialize)]
pub struct RouteFilesView {
    pub heading: String,
    pub files: Vec<RouteFileRow>,
    pub empty_message: String,
    /// Form target for re-scanning stored data, if the page offers it
    pub rescan_url: Option<String>,
}

/// Files that have inefficient routes, each linking to its route table.
pub fn inefficient_files_view(files: &[(UploadedFile, usize)]) -> RouteFilesView {
    RouteFilesView {
        heading: "Inefficient Routes".to_string(),
        files: files
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(file, count)| route_file_row(file, *count, paths::inefficient(file.id)))
            .collect(),
        empty_message: "No files with inefficient routes.".to_string(),
        rescan_url: Some(paths::INEFFICIENT.to_string()),
    }
}

/// Every file of the user, each linking to its cost page.
pub fn cost_files_view(files: &[(UploadedFile, usize)]) -> RouteFilesView {
    RouteFilesView {
        heading: "Cost Analysis".to_string(),
        files: files
            .iter()
            .map(|(file, count)| route_file_row(file, *count, paths::cost_analysis(file.id)))
            .collect(),
        empty_message: "No files uploaded yet.".to_string(),
        rescan_url: None,
    }
}

fn route_file_row(file: &UploadedFile, route_count: usize, url: String) -> RouteFileRow {
    RouteFileRow {
        filename: file.filename.clone(),
        upload_date: file.upload_date.format(DATE_FORMAT).to_string(),
        route_count,
        url,
    }
}

/// Money lost per optimised route of one file.
#[derive(Debug, Clone, Serialize)]
pub struct RouteCostView {
    pub file_id: u64,
    pub file_name: String,
    pub table: TableView,
    pub chart_url: Option<String>,
    pub routes_url: String,
}

pub fn route_cost_view(file: &UploadedFile, dataset: &FileDataset) -> RouteCostView {
    let rows = analysis::cost_rows(&dataset.routes);
    let table = TableView::from_columns(analysis::COST_COLUMNS, &rows);
    RouteCostView {
        file_id: file.id,
        file_name: file.filename.clone(),
        chart_url: (!table.is_empty()).then(|| paths::report_chart(file.id)),
        table,
        routes_url: paths::inefficient(file.id),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricItem {
    pub label: String,
    pub value: String,
}

/// The report preview page.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub file_id: u64,
    pub title: String,
    pub file_name: String,
    pub upload_date: String,
    pub user_name: String,
    pub user_email: String,
    pub metrics: Vec<MetricItem>,
    pub ineff_table: Option<TableView>,
    pub cost_table: Option<TableView>,
    pub chart_url: Option<String>,
    pub pdf_url: String,
    pub word_url: String,
    pub excel_url: String,
}

pub fn report_view(summary: &ReportSummary) -> ReportView {
    let metrics = summary
        .metrics(false)
        .into_iter()
        .filter(|(key, _)| !matches!(*key, "file_name" | "upload_date"))
        .map(|(key, value)| MetricItem {
            label: format::title_case(key),
            value: metric_display(key, &value),
        })
        .collect();

    let ineff = TableView::from_columns(analysis::INEFF_COLUMNS, &summary.ineff_table);
    let cost = TableView::from_columns(analysis::COST_COLUMNS, &summary.cost_table);

    ReportView {
        file_id: summary.file_id,
        title: crate::downloader::REPORT_TITLE.to_string(),
        file_name: summary.file_name.clone(),
        upload_date: summary.upload_date.format(DATE_FORMAT).to_string(),
        user_name: summary.user_name.clone(),
        user_email: summary.user_email.clone(),
        metrics,
        chart_url: (!cost.is_empty()).then(|| paths::report_chart(summary.file_id)),
        ineff_table: (!ineff.is_empty()).then_some(ineff),
        cost_table: (!cost.is_empty()).then_some(cost),
        pdf_url: paths::download_pdf(summary.file_id),
        word_url: paths::download_word(summary.file_id),
        excel_url: paths::download_excel(summary.file_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn upload(id: u64, name: &str) -> UploadedFile {
        UploadedFile {
            id,
            filename: name.into(),
            size: 12.345,
            upload_date: NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(14, 5, 9)
                .unwrap(),
            user_id: 1,
        }
    }

    #[test]
    fn excel_rows_get_analysis_links() {
        let rows = file_rows(&[upload(3, "routes.xlsx"), upload(4, "notes.pdf")]);

        assert_eq!(rows[0].size, "12.35");
        assert_eq!(rows[0].upload_date, "2024-02-01 14:05:09");
        assert_eq!(rows[0].links.len(), 5);
        assert_eq!(rows[0].links[2].url, "/analyze_route/3");
        assert_eq!(rows[0].placeholder, None);

        assert!(rows[1].links.is_empty());
        assert_eq!(rows[1].placeholder.as_deref(), Some("N/A for PDF"));
        assert_eq!(rows[1].delete_url, "/delete-file/4");
    }

    #[test]
    fn summary_missing_values_show_zero() {
        let view = summary_view(
            &upload(1, "a.xlsx"),
            &[SummaryRow {
                row_label: "Fuel".into(),
                cth: Some(1.5),
                ..SummaryRow::default()
            }],
        );
        assert_eq!(view.table.rows[0], vec!["Fuel", "1.50", "0", "0", "0"]);
    }

    #[test]
    fn cost_chart_json_cannot_break_out_of_script() {
        let view = cost_analysis_view(
            &upload(1, "a.xlsx"),
            &[SummaryRow {
                row_label: "</script>".into(),
                grand_total: Some(2.0),
                ..SummaryRow::default()
            }],
        );
        assert!(view.has_data);
        assert!(!view.chart_json.contains("</script>"));
        assert!(view.chart_json.contains("\"grand_data\":[2.0]"));

        let empty = cost_analysis_view(&upload(1, "a.xlsx"), &[]);
        assert!(!empty.has_data);
    }

    #[test]
    fn raw_rows_are_grouped_by_sheet() {
        let raw = |sheet: &str, index: usize, cells: &[(&str, &str)]| RawRow {
            sheet_name: sheet.into(),
            row_index: index,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        };
        let view = raw_data_view(
            &upload(1, "a.xlsx"),
            &[],
            &[
                raw("Sheet2", 0, &[("X", "1")]),
                raw("Sheet1", 1, &[("B", "b1")]),
                raw("Sheet1", 0, &[("A", "a0"), ("B", "b0")]),
            ],
        );
        assert_eq!(view.sheets.len(), 2);
        assert_eq!(view.sheets[0].name, "Sheet1");
        assert_eq!(view.sheets[0].table.headers, vec!["A", "B"]);
        assert_eq!(view.sheets[0].table.rows, vec![vec!["a0", "b0"], vec!["", "b1"]]);
        assert_eq!(view.sheets[1].table.rows, vec![vec!["1"]]);
    }

    #[test]
    fn raw_columns_follow_the_sheet_headers() {
        let sheets = [RawSheet {
            name: "Deliveries".into(),
            headers: vec!["Zeta".into(), "Alpha".into(), "Unnamed: 2".into()],
        }];
        let rows = [RawRow {
            sheet_name: "Deliveries".into(),
            row_index: 0,
            cells: BTreeMap::from([("Alpha".to_string(), "a".to_string()), ("Zeta".to_string(), "z".to_string())]),
        }];
        let view = raw_data_view(&upload(1, "a.xlsx"), &sheets, &rows);
        assert_eq!(view.sheets[0].table.headers, vec!["Zeta", "Alpha", "Unnamed: 2"]);
        assert_eq!(view.sheets[0].table.rows, vec![vec!["z", "a", ""]]);
    }

    #[test]
    fn route_index_lists_only_files_with_routes() {
        let files = [(upload(1, "a.xlsx"), 0), (upload(2, "b.xlsx"), 3)];

        let view = inefficient_files_view(&files);
        assert_eq!(view.files.len(), 1);
        assert_eq!(view.files[0].filename, "b.xlsx");
        assert_eq!(view.files[0].url, "/inefficient/2");
        assert_eq!(view.rescan_url.as_deref(), Some("/inefficient"));

        let costs = cost_files_view(&files);
        assert_eq!(costs.files.len(), 2);
        assert_eq!(costs.files[0].url, "/cost-analysis/1");
        assert_eq!(costs.rescan_url, None);
    }

    #[test]
    fn route_costs_need_optimised_routes() {
        let empty = route_cost_view(&upload(4, "a.xlsx"), &FileDataset::default());
        assert!(empty.table.is_empty());
        assert_eq!(empty.chart_url, None);
        assert_eq!(empty.routes_url, "/inefficient/4");
    }
}
