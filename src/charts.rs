//! PNG chart rendering for evaluation reports
//!
//! Charts carry no text, so no font backend is required.

use crate::error::{InspectError, Result};
use crate::metrics::ConfusionCounts;
use plotters::prelude::*;
use std::f64::consts::PI;

const LOSS_COLOR: RGBColor = RGBColor(31, 119, 180);
const ACCURACY_COLOR: RGBColor = RGBColor(44, 160, 44);
const DONUT_COLORS: [RGBColor; 4] = [
    RGBColor(44, 160, 44),  // tp
    RGBColor(31, 119, 180), // tn
    RGBColor(255, 127, 14), // fp
    RGBColor(214, 39, 40),  // fn
];
const EMPTY_RING: RGBColor = RGBColor(210, 210, 210);

/// What to draw
#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    /// Per-round loss and accuracy
    TrainingCurves { loss: Vec<f64>, accuracy: Vec<f64> },
    /// Ring split into tp / tn / fp / fn segments
    ConfusionDonut(ConfusionCounts),
}

impl ChartSpec {
    pub fn name(&self) -> &'static str {
        match self {
            ChartSpec::TrainingCurves { .. } => "line",
            ChartSpec::ConfusionDonut(_) => "donut",
        }
    }
}

/// Renders a chart to encoded PNG bytes
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>>;
}

/// Rasterizes with plotters into an RGB buffer and encodes it as PNG
#[derive(Debug, Clone, Copy)]
pub struct PlottersRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self { width: 640, height: 400 }
    }
}

fn chart_err<E: std::fmt::Display>(e: E) -> InspectError {
    InspectError::ChartError(e.to_string())
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; (self.width * self.height * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            root.fill(&WHITE).map_err(chart_err)?;

            match spec {
                ChartSpec::TrainingCurves { loss, accuracy } => {
                    draw_curves(&root, loss, accuracy)?
                }
                ChartSpec::ConfusionDonut(counts) => {
                    draw_donut(&root, counts, self.width, self.height)?
                }
            }

            root.present().map_err(chart_err)?;
        }
        encode_png(&buffer, self.width, self.height)
    }
}

fn draw_curves(
    root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    loss: &[f64],
    accuracy: &[f64],
) -> Result<()> {
    let rounds = loss.len().max(accuracy.len());
    let x_max = (rounds.saturating_sub(1)).max(1) as f64;

    // Loss is unbounded above, so scale it into the accuracy's [0, 1] range
    let loss_peak = loss.iter().cloned().fold(1.0f64, f64::max);

    let mut chart = ChartBuilder::on(root)
        .margin(16)
        .build_cartesian_2d(0f64..x_max, 0f64..1f64)
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            loss.iter().enumerate().map(|(i, &v)| (i as f64, v / loss_peak)),
            LOSS_COLOR.stroke_width(2),
        ))
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            accuracy.iter().enumerate().map(|(i, &v)| (i as f64, v.clamp(0.0, 1.0))),
            ACCURACY_COLOR.stroke_width(2),
        ))
        .map_err(chart_err)?;

    Ok(())
}

fn draw_donut(
    root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    counts: &ConfusionCounts,
    width: u32,
    height: u32,
) -> Result<()> {
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let outer = width.min(height) as f64 * 0.45;
    let inner = outer * 0.55;

    let values = [counts.tp, counts.tn, counts.fp, counts.fn_];
    let total: usize = values.iter().sum();

    if total == 0 {
        let ring = ring_segment(center, inner, outer, 0.0, 2.0 * PI);
        root.draw(&Polygon::new(ring, EMPTY_RING.filled()))
            .map_err(chart_err)?;
        return Ok(());
    }

    let mut angle = -PI / 2.0;
    for (value, color) in values.iter().zip(DONUT_COLORS.iter()) {
        if *value == 0 {
            continue;
        }
        let sweep = 2.0 * PI * (*value as f64) / (total as f64);
        let segment = ring_segment(center, inner, outer, angle, angle + sweep);
        root.draw(&Polygon::new(segment, color.filled()))
            .map_err(chart_err)?;
        angle += sweep;
    }

    Ok(())
}

/// Outline of an annulus sector: outer arc forward, inner arc back
fn ring_segment(
    center: (f64, f64),
    inner: f64,
    outer: f64,
    from: f64,
    to: f64,
) -> Vec<(i32, i32)> {
    let steps = (((to - from).abs() / (2.0 * PI)) * 120.0).ceil().max(2.0) as usize;
    let point = |r: f64, a: f64| {
        (
            (center.0 + r * a.cos()).round() as i32,
            (center.1 + r * a.sin()).round() as i32,
        )
    };

    let mut points = Vec::with_capacity(2 * (steps + 1));
    for i in 0..=steps {
        let a = from + (to - from) * i as f64 / steps as f64;
        points.push(point(outer, a));
    }
    for i in (0..=steps).rev() {
        let a = from + (to - from) * i as f64 / steps as f64;
        points.push(point(inner, a));
    }
    points
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(chart_err)?;
        writer.write_image_data(rgb).map_err(chart_err)?;
        writer.finish().map_err(chart_err)?;
    }
    Ok(out)
}
