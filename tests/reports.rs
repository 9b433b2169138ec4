use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use retrotrack::analysis::{ReportSummary, summarize};
use retrotrack::downloader::{ReportFormat, to_docx, to_pdf, to_xlsx};
use retrotrack::graph::cost_saved_chart;
use retrotrack::model::{InefficientRoute, UploadedFile, User};
use std::io::Cursor;

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn route(id: u64, base: &str, optimized: Option<f64>) -> InefficientRoute {
    InefficientRoute {
        id,
        base_address: base.into(),
        shipping_address: "Quận 1, TP. Hồ Chí Minh".into(),
        starting_time: at(1, 0),
        expected_delivery_time: at(1, 10),
        actual_delivery_time: at(3, 0),
        expected_delivery_cost: 1_000_000.0,
        actual_delivery_cost: 2_500_000.0,
        max_delivery_cost: 60_000.0,
        optimized_delivery_time: optimized,
        time_saved: optimized.map(|opt| 48.0 - opt),
    }
}

fn report(routes: &[InefficientRoute]) -> ReportSummary {
    let file = UploadedFile {
        id: 9,
        filename: "march.xlsx".into(),
        size: 20.5,
        upload_date: at(5, 8),
        user_id: 1,
    };
    let user = User {
        id: 1,
        first_name: "Minh".into(),
        last_name: "Tran".into(),
        email: "minh@example.com".into(),
        password_hash: String::new(),
    };
    summarize(&file, &user, routes)
}

fn full_report() -> ReportSummary {
    report(&[
        route(1, "Kho Bình Dương", Some(18.0)),
        route(2, "Depot 2", None),
        route(3, "Depot 3", Some(30.0)),
    ])
}

#[test]
fn metrics_for_mixed_routes() {
    let summary = full_report();
    assert_eq!(summary.inefficient_routes, 3);
    assert_eq!(summary.total_delayed_hours, 114.0);
    assert_eq!(summary.total_time_saved, 48.0);
    assert_eq!(summary.avg_time_saved, 16.0);
    // (30 + 18) hours * 60,000
    assert_eq!(summary.total_cost_saved, 2_880_000.0);
    assert_eq!(summary.avg_cost_saved, 960_000.0);
    assert_eq!(summary.cost_table.len(), 2);
    assert_eq!(summary.cost_table[1].route_id, 3);
}

#[test]
fn pdf_export_with_chart() {
    let summary = full_report();
    let chart = cost_saved_chart(&summary.cost_table).unwrap();
    assert!(chart.is_some());

    let pdf = to_pdf(&summary, chart.as_deref()).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn pdf_export_paginates_long_tables() {
    let routes: Vec<_> = (1..=120).map(|id| route(id, "Depot", Some(20.0))).collect();
    let summary = report(&routes);
    let short = to_pdf(&report(&routes[..2]), None).unwrap();
    let long = to_pdf(&summary, None).unwrap();
    assert!(long.len() > short.len());
}

#[test]
fn docx_export_is_a_zip_package() {
    let summary = full_report();
    let chart = cost_saved_chart(&summary.cost_table).unwrap();
    let docx = to_docx(&summary, chart.as_deref()).unwrap();
    assert!(docx.starts_with(b"PK"));

    let empty = to_docx(&report(&[]), None).unwrap();
    assert!(empty.starts_with(b"PK"));
}

#[test]
fn xlsx_export_sheets_and_headers() {
    let summary = full_report();
    let chart = cost_saved_chart(&summary.cost_table).unwrap();
    let bytes = to_xlsx(&summary, chart.as_deref()).unwrap();

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec!["Summary", "Inefficient Routes", "Cost Analysis"]
    );

    let metrics = workbook.worksheet_range("Summary").unwrap();
    let labels: Vec<String> = metrics.rows().map(|row| row[0].to_string()).collect();
    assert!(labels.contains(&"User Email".to_string()));
    assert!(labels.contains(&"Total Cost Saved".to_string()));

    let costs = workbook.worksheet_range("Cost Analysis").unwrap();
    let header: Vec<String> = costs.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
    assert_eq!(header[0], "route_id");
    assert_eq!(header[8], "cost_saved");
    assert_eq!(costs.get((1, 8)), Some(&Data::Float(1_800_000.0)));

    let routes = workbook.worksheet_range("Inefficient Routes").unwrap();
    assert_eq!(routes.height(), 4);
    // Route 2 has no optimisation yet
    let time_saved = routes.get((2, 11)).map(|c| c.to_string());
    assert_eq!(time_saved.as_deref(), Some("N/A"));
}

#[test]
fn render_dispatches_by_format() {
    let summary = report(&[]);
    assert!(ReportFormat::Pdf.render(&summary, None).unwrap().starts_with(b"%PDF"));
    assert!(ReportFormat::Xlsx.render(&summary, None).unwrap().starts_with(b"PK"));
}

#[cfg(feature = "web")]
#[test]
fn registry_row_for_an_uppercase_workbook() {
    use retrotrack::views::file_rows;

    let file = UploadedFile {
        id: 1,
        filename: "data.XLSX".into(),
        size: 1536.0,
        upload_date: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap(),
        user_id: 1,
    };
    let rows = file_rows(&[file]);
    let row = &rows[0];

    assert_eq!(
        [row.filename.as_str(), row.file_type.as_str(), row.size.as_str(), row.upload_date.as_str()],
        ["data.XLSX", "XLSX", "1536.00", "2024-01-01 10:00:00"]
    );
    let labels: Vec<&str> = row.links.iter().map(|link| link.label.as_str()).collect();
    assert_eq!(
        labels,
        ["View Summary", "View Details", "Analyze Routes", "Analyze Cost", "View All Data"]
    );
    assert_eq!(row.placeholder, None);
}
