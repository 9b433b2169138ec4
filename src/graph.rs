//! Bar chart of the money saved per optimised route.

use crate::analysis::CostRow;
use crate::error::{AppError, Result};
use plotters::prelude::*;
use std::io::Cursor;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 500;

/// Chart values are drawn in millions of VND
const SCALE: f64 = 1_000_000.0;

#[derive(Clone, Debug)]
struct ChartOptions {
    title: String,
    x_label: String,
    y_label: String,
    width: u32,
    height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        ChartOptions {
            title: "Cost Saved per Inefficient Route".to_string(),
            x_label: "Route ID".to_string(),
            y_label: "Cost Saved (Million VND)".to_string(),
            width: CHART_WIDTH,
            height: CHART_HEIGHT,
        }
    }
}

/// Render the cost-saved bar chart as PNG bytes.
///
/// Returns `Ok(None)` when there is nothing to plot.
pub fn cost_saved_chart(rows: &[CostRow]) -> Result<Option<Vec<u8>>> {
    cost_saved_chart_with(rows, &ChartOptions::default())
}

fn cost_saved_chart_with(rows: &[CostRow], options: &ChartOptions) -> Result<Option<Vec<u8>>> {
    if rows.is_empty() {
        return Ok(None);
    }

    let mut pixels = vec![0u8; (options.width * options.height * 3) as usize];
    if let Err(e) = draw_bars(rows, options, &mut pixels, true) {
        // Text needs a system font; fall back to an unlabelled chart
        log::warn!("chart labels unavailable, drawing bars only: {}", e);
        pixels.iter_mut().for_each(|p| *p = 0);
        draw_bars(rows, options, &mut pixels, false).map_err(|e| AppError::Export(e.to_string()))?;
    }

    let image = image::RgbImage::from_raw(options.width, options.height, pixels)
        .ok_or_else(|| AppError::Export("chart buffer has the wrong size".into()))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .map_err(|e| AppError::Export(e.to_string()))?;
    Ok(Some(png.into_inner()))
}

fn draw_bars(
    rows: &[CostRow],
    options: &ChartOptions,
    pixels: &mut [u8],
    labelled: bool,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(pixels, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let values: Vec<f64> = rows.iter().map(|row| row.cost_saved / SCALE).collect();
    let max_y = values.iter().cloned().fold(0.0_f64, f64::max);
    let min_y = values.iter().cloned().fold(0.0_f64, f64::min);
    let top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };
    let bottom = if min_y < 0.0 { min_y * 1.1 } else { 0.0 };
    let count = rows.len() as i32;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if labelled {
        builder
            .caption(&options.title, ("sans-serif", 28).into_font())
            .x_label_area_size(40)
            .y_label_area_size(70);
    }
    let mut chart = builder.build_cartesian_2d(0..count, bottom..top)?;

    if labelled {
        let ids: Vec<String> = rows.iter().map(|row| row.route_id.to_string()).collect();
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(rows.len().min(30))
            .x_label_formatter(&|i| ids.get(*i as usize).cloned().unwrap_or_default())
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .draw()?;
    }

    chart.draw_series(values.iter().enumerate().map(|(i, &y)| {
        let x = i as i32;
        let color = if y >= 0.0 { BLUE } else { RED };
        Rectangle::new([(x, 0.0), (x + 1, y)], color.mix(0.8).filled())
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, saved: f64) -> CostRow {
        CostRow {
            route_id: id,
            base_address: "A".into(),
            shipping_address: "B".into(),
            actual_duration: 48.0,
            optimized_time: 20.0,
            max_delivery_cost: 50_000.0,
            optimized_cost: 0.0,
            actual_cost: 0.0,
            cost_saved: saved,
        }
    }

    #[test]
    fn empty_table_has_no_chart() {
        assert!(cost_saved_chart(&[]).unwrap().is_none());
    }

    #[test]
    fn chart_is_a_png_of_the_expected_size() {
        let png = cost_saved_chart(&[row(1, 1_400_000.0), row(7, 2_500_000.0)])
            .unwrap()
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (CHART_WIDTH, CHART_HEIGHT));
    }
}
