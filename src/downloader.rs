//! Report exports: PDF, Word and Excel renditions of a [`ReportSummary`].

use crate::analysis::{COST_COLUMNS, Column, INEFF_COLUMNS, ReportSummary, ReportValue, metric_display};
use crate::error::{AppError, Result};
use crate::format;
use std::io::Cursor;

pub const REPORT_TITLE: &str = "RetroTrack Logistics Inefficiency Report";

/// Export formats offered on the report page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Docx,
    Xlsx,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Docx => "docx",
            ReportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// Attachment name, e.g. `report_3.pdf`.
    pub fn file_name(self, file_id: u64) -> String {
        format!("report_{}.{}", file_id, self.extension())
    }

    /// Render `summary` in this format.
    pub fn render(self, summary: &ReportSummary, chart: Option<&[u8]>) -> Result<Vec<u8>> {
        let result = match self {
            ReportFormat::Pdf => to_pdf(summary, chart),
            ReportFormat::Docx => to_docx(summary, chart),
            ReportFormat::Xlsx => to_xlsx(summary, chart),
        };
        if let Err(e) = &result {
            log::error!("{} export of file {} failed: {}", self.extension(), summary.file_id, e);
        }
        result
    }
}

fn printed<R>(columns: &'static [Column<R>]) -> impl Iterator<Item = &'static Column<R>> {
    columns.iter().filter(|column| column.printed)
}

fn export_error(e: impl std::fmt::Display) -> AppError {
    AppError::Export(e.to_string())
}

mod pdf {
    use super::*;
    use printpdf::image_crate::codecs::png::PngDecoder;
    use printpdf::{
        Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
        PdfLayerReference,
    };

    const PAGE_WIDTH: f32 = 297.0;
    const PAGE_HEIGHT: f32 = 210.0;
    const MARGIN: f32 = 12.0;
    const LINE: f32 = 6.0;
    /// Line pitch inside a table cell
    const CELL_LINE: f32 = 4.2;
    const CELL_PADDING: f32 = 1.8;
    const BODY_SIZE: f32 = 9.0;
    const CHART_DPI: f32 = 110.0;
    /// Average glyph width of the condensed face, in ems
    const GLYPH_EM: f32 = 0.52;
    const PT_TO_MM: f32 = 0.3528;

    const REGULAR_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansCondensed.ttf");
    const BOLD_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansCondensed-Bold.ttf");

    /// A page cursor that starts a new page when it runs off the bottom.
    pub(super) struct Writer {
        doc: PdfDocumentReference,
        layer: PdfLayerReference,
        regular: IndirectFontRef,
        bold: IndirectFontRef,
        y: f32,
    }

    impl Writer {
        pub(super) fn new(title: &str) -> Result<Self> {
            let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            let regular = doc.add_external_font(Cursor::new(REGULAR_FONT)).map_err(export_error)?;
            let bold = doc.add_external_font(Cursor::new(BOLD_FONT)).map_err(export_error)?;
            let layer = doc.get_page(page).get_layer(layer);
            Ok(Writer {
                doc,
                layer,
                regular,
                bold,
                y: PAGE_HEIGHT - MARGIN,
            })
        }

        fn new_page(&mut self) {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }

        fn ensure_room(&mut self, height: f32) {
            if self.y - height < MARGIN {
                self.new_page();
            }
        }

        pub(super) fn heading(&mut self, text: &str, size: f32) {
            self.ensure_room(size * 0.6);
            self.y -= size * 0.5;
            self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), &self.bold);
            self.y -= LINE * 0.6;
        }

        pub(super) fn line(&mut self, text: &str) {
            let size = BODY_SIZE + 1.0;
            for part in wrap(text, chars_across(PAGE_WIDTH - 2.0 * MARGIN, size)) {
                self.ensure_room(LINE);
                self.y -= LINE;
                self.layer.use_text(part, size, Mm(MARGIN), Mm(self.y), &self.regular);
            }
        }

        pub(super) fn gap(&mut self) {
            self.y -= LINE;
        }

        /// Equal-width columns across the page. Cells wrap onto as many
        /// lines as they need and the header repeats on every new page.
        pub(super) fn table(&mut self, headers: &[String], rows: &[Vec<String>]) {
            if headers.is_empty() {
                return;
            }
            let width = (PAGE_WIDTH - 2.0 * MARGIN) / headers.len() as f32;
            let max_chars = chars_across(width - CELL_PADDING, BODY_SIZE);

            self.table_row(headers, width, max_chars, true);
            for row in rows {
                let lines = wrapped_cells(row, max_chars);
                if self.y - row_height(&lines) < MARGIN {
                    self.new_page();
                    self.table_row(headers, width, max_chars, true);
                }
                self.draw_row(&lines, width, false);
            }
        }

        fn table_row(&mut self, cells: &[String], width: f32, max_chars: usize, header: bool) {
            let lines = wrapped_cells(cells, max_chars);
            self.ensure_room(row_height(&lines));
            self.draw_row(&lines, width, header);
        }

        fn draw_row(&mut self, cells: &[Vec<String>], width: f32, header: bool) {
            let font = if header { &self.bold } else { &self.regular };
            let top = self.y - CELL_LINE;
            for (i, cell) in cells.iter().enumerate() {
                let x = MARGIN + i as f32 * width;
                for (n, part) in cell.iter().enumerate() {
                    let y = top - n as f32 * CELL_LINE;
                    self.layer.use_text(part.as_str(), BODY_SIZE, Mm(x), Mm(y), font);
                }
            }
            self.y -= row_height(cells);
        }

        /// Chart on a page of its own.
        pub(super) fn image(&mut self, png: &[u8]) -> Result<()> {
            let decoder = PngDecoder::new(Cursor::new(png)).map_err(export_error)?;
            let image = Image::try_from(decoder).map_err(export_error)?;
            self.new_page();
            let height_mm = crate::graph::CHART_HEIGHT as f32 / CHART_DPI * 25.4;
            image.add_to_layer(
                self.layer.clone(),
                ImageTransform {
                    translate_x: Some(Mm(MARGIN)),
                    translate_y: Some(Mm(PAGE_HEIGHT - MARGIN - height_mm)),
                    dpi: Some(CHART_DPI),
                    ..Default::default()
                },
            );
            Ok(())
        }

        pub(super) fn finish(self) -> Result<Vec<u8>> {
            self.doc.save_to_bytes().map_err(export_error)
        }
    }

    fn chars_across(width_mm: f32, size: f32) -> usize {
        ((width_mm / (size * PT_TO_MM * GLYPH_EM)) as usize).max(4)
    }

    fn wrapped_cells(cells: &[String], max_chars: usize) -> Vec<Vec<String>> {
        cells.iter().map(|cell| wrap(cell, max_chars)).collect()
    }

    fn row_height(cells: &[Vec<String>]) -> f32 {
        let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        lines as f32 * CELL_LINE + CELL_PADDING
    }

    /// Break `text` into lines of at most `max_chars` characters, between
    /// words where it can. Words longer than a line are split. Runs of
    /// whitespace collapse to one space; no other character is lost.
    pub(super) fn wrap(text: &str, max_chars: usize) -> Vec<String> {
        let max_chars = max_chars.max(1);
        let mut lines = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for word in text.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }
            if current_len > 0 && current_len + 1 + word.len() > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }
        if current_len > 0 || lines.is_empty() {
            lines.push(current);
        }
        lines
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn wrap_keeps_every_word() {
            let address = "Kho Hà Nội, số 12 đường Giải Phóng, quận Hoàng Mai";
            let lines = wrap(address, 12);
            assert!(lines.len() > 1);
            assert!(lines.iter().all(|line| line.chars().count() <= 12));
            assert_eq!(lines.join(" "), address);
        }

        #[test]
        fn long_words_are_split_not_cut() {
            assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
            assert_eq!(wrap("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
            assert_eq!(wrap("", 4), vec![""]);
        }

        #[test]
        fn vietnamese_text_is_written() {
            let mut writer = Writer::new("Báo cáo").unwrap();
            writer.heading("Tuyến giao hàng chậm", 13.0);
            writer.line("Người nhận: Nguyễn Thị Lan, Đà Nẵng");
            writer.table(
                &["Địa chỉ".to_string(), "Giờ".to_string()],
                &[vec!["Kho Hà Nội, số 12 đường Giải Phóng, quận Hoàng Mai".to_string(), "36".to_string()]],
            );
            let bytes = writer.finish().unwrap();
            assert!(bytes.starts_with(b"%PDF"));
        }
    }
}

fn headings<R>(columns: &'static [Column<R>]) -> Vec<String> {
    printed(columns).map(|column| column.heading.to_string()).collect()
}

fn printed_cells<R>(columns: &'static [Column<R>], rows: &[R]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| printed(columns).map(|column| (column.value)(row).to_string()).collect())
        .collect()
}

/// Landscape A4 PDF report.
pub fn to_pdf(summary: &ReportSummary, chart: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut writer = pdf::Writer::new(REPORT_TITLE)?;
    writer.heading(REPORT_TITLE, 18.0);
    for (key, value) in summary.metrics(true) {
        writer.line(&format!("{}: {}", format::title_case(key), metric_display(key, &value)));
    }

    writer.gap();
    writer.heading("Inefficient Routes", 13.0);
    if summary.ineff_table.is_empty() {
        writer.line("No inefficient routes found.");
    } else {
        writer.table(&headings(INEFF_COLUMNS), &printed_cells(INEFF_COLUMNS, &summary.ineff_table));
    }

    writer.gap();
    writer.heading("Cost Analysis", 13.0);
    if summary.cost_table.is_empty() {
        writer.line("No optimised routes to compare.");
    } else {
        writer.table(&headings(COST_COLUMNS), &printed_cells(COST_COLUMNS, &summary.cost_table));
    }

    if let Some(png) = chart {
        writer.image(png)?;
    }
    writer.finish()
}

/// Word document with a metric table and both route tables.
pub fn to_docx(summary: &ReportSummary, chart: Option<&[u8]>) -> Result<Vec<u8>> {
    use docx_rs::{Docx, Paragraph, Pic, Run, Table, TableCell, TableRow};

    // 6 x 3 inches in EMU
    const CHART_WIDTH_EMU: u32 = 6 * 914_400;
    const CHART_HEIGHT_EMU: u32 = 3 * 914_400;

    fn cell(text: &str, bold: bool) -> TableCell {
        let run = Run::new().add_text(text);
        let run = if bold { run.bold() } else { run };
        TableCell::new().add_paragraph(Paragraph::new().add_run(run))
    }

    fn table(headers: &[String], rows: &[Vec<String>]) -> Table {
        let mut all = vec![TableRow::new(headers.iter().map(|h| cell(h, true)).collect())];
        all.extend(
            rows.iter()
                .map(|row| TableRow::new(row.iter().map(|c| cell(c, false)).collect())),
        );
        Table::new(all)
    }

    fn heading(text: &str, size: usize) -> Paragraph {
        Paragraph::new().add_run(Run::new().add_text(text).bold().size(size))
    }

    let mut metric_rows = vec![
        vec!["File Name".to_string(), summary.file_name.clone()],
        vec![
            "Upload Date".to_string(),
            summary.upload_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        ],
    ];
    metric_rows.extend(
        summary
            .metrics(false)
            .into_iter()
            .filter(|(key, _)| !matches!(*key, "file_name" | "upload_date"))
            .map(|(key, value)| vec![format::title_case(key), metric_display(key, &value)]),
    );

    let mut docx = Docx::new()
        .add_paragraph(heading(REPORT_TITLE, 36))
        .add_table(table(&["Metric".to_string(), "Value".to_string()], &metric_rows))
        .add_paragraph(heading("Inefficient Routes", 28));

    docx = if summary.ineff_table.is_empty() {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text("No inefficient routes found.")))
    } else {
        docx.add_table(table(&headings(INEFF_COLUMNS), &printed_cells(INEFF_COLUMNS, &summary.ineff_table)))
    };

    docx = docx.add_paragraph(heading("Cost Analysis", 28));
    docx = if summary.cost_table.is_empty() {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text("No optimised routes to compare.")))
    } else {
        docx.add_table(table(&headings(COST_COLUMNS), &printed_cells(COST_COLUMNS, &summary.cost_table)))
    };

    if let Some(png) = chart {
        let pic = Pic::new(png).size(CHART_WIDTH_EMU, CHART_HEIGHT_EMU);
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_image(pic)));
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build().pack(&mut buffer).map_err(export_error)?;
    Ok(buffer.into_inner())
}

/// Excel workbook with `Summary`, `Inefficient Routes` and `Cost Analysis`
/// sheets.
pub fn to_xlsx(summary: &ReportSummary, chart: Option<&[u8]>) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Image, Workbook, Worksheet, XlsxError};

    fn write_value(sheet: &mut Worksheet, row: u32, col: u16, value: &ReportValue) -> std::result::Result<(), XlsxError> {
        match value {
            ReportValue::Text(text) => sheet.write_string(row, col, text)?,
            ReportValue::Number(n) => sheet.write_number(row, col, *n)?,
            ReportValue::Count(n) => sheet.write_number(row, col, *n as f64)?,
        };
        Ok(())
    }

    fn table_sheet<R>(name: &str, columns: &'static [Column<R>], rows: &[R], bold: &Format) -> std::result::Result<Worksheet, XlsxError> {
        let mut sheet = Worksheet::new();
        sheet.set_name(name)?;
        for (col, column) in columns.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, column.key, bold)?;
        }
        for (r, row) in rows.iter().enumerate() {
            for (col, column) in columns.iter().enumerate() {
                write_value(&mut sheet, r as u32 + 1, col as u16, &(column.value)(row))?;
            }
        }
        Ok(sheet)
    }

    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    let mut metrics = Worksheet::new();
    metrics.set_name("Summary")?;
    metrics.write_string_with_format(0, 0, "Metric", &bold)?;
    metrics.write_string_with_format(0, 1, "Value", &bold)?;
    for (i, (key, value)) in summary.metrics(true).iter().enumerate() {
        metrics.write_string(i as u32 + 1, 0, format::title_case(key))?;
        write_value(&mut metrics, i as u32 + 1, 1, value)?;
    }
    metrics.set_column_width(0, 24)?;
    metrics.set_column_width(1, 36)?;
    workbook.push_worksheet(metrics);

    workbook.push_worksheet(table_sheet(
        "Inefficient Routes",
        INEFF_COLUMNS,
        &summary.ineff_table,
        &bold,
    )?);

    let mut costs = table_sheet("Cost Analysis", COST_COLUMNS, &summary.cost_table, &bold)?;
    if let Some(png) = chart {
        let image = Image::new_from_buffer(png)?;
        // N2
        costs.insert_image(1, 13, &image)?;
    }
    workbook.push_worksheet(costs);

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_names() {
        assert_eq!(ReportFormat::Pdf.file_name(3), "report_3.pdf");
        assert_eq!(ReportFormat::Docx.file_name(3), "report_3.docx");
        assert_eq!(ReportFormat::Xlsx.file_name(12), "report_12.xlsx");
        assert_eq!(ReportFormat::Pdf.content_type(), "application/pdf");
    }

    #[test]
    fn printed_headings_skip_wide_columns() {
        let headers = headings(INEFF_COLUMNS);
        assert_eq!(headers.first().map(String::as_str), Some("Base Address"));
        assert!(!headers.iter().any(|h| h == "File"));
        assert_eq!(headings(COST_COLUMNS).len(), COST_COLUMNS.len());
    }
}
