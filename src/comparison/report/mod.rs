//! Chart and text renderings of a finished comparison.

mod summary;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::comparison::{ComparisonError, Result};
use crate::types::{ComparisonArtifact, ComparisonRequest, ComparisonResult, FeatureSequence};

pub use summary::{SUMMARY_CONTENT_TYPE, SUMMARY_NAME};

pub const CHART_NAME: &str = "comparison.svg";
pub const CHART_CONTENT_TYPE: &str = "image/svg+xml";

const STUDENT_COLOR: RGBColor = RED;
const REFERENCE_COLOR: RGBColor = BLUE;

type PlotResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Draws pitch and energy contours of both performances.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    size: (u32, u32),
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self { size: (1000, 700) }
    }
}

impl ReportRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }

    /// Render an SVG chart: pitch on top and, when given, energy below.
    ///
    /// Unpitched frames break the pitch line instead of dropping to zero.
    pub fn render(
        &self,
        student_pitch: &FeatureSequence,
        reference_pitch: &FeatureSequence,
        energy: Option<(&FeatureSequence, &FeatureSequence)>,
    ) -> Result<ComparisonArtifact> {
        if self.size.0 == 0 || self.size.1 == 0 {
            return Err(ComparisonError::Render("chart size must be non-zero".into()));
        }
        if student_pitch.is_empty() && reference_pitch.is_empty() {
            return Err(ComparisonError::Render("no pitch frames to draw".into()));
        }

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, self.size).into_drawing_area();
            draw_chart(&root, student_pitch, reference_pitch, energy)
                .map_err(|err| ComparisonError::Render(err.to_string()))?;
        }
        Ok(ComparisonArtifact {
            bytes: svg.into_bytes(),
            suggested_name: CHART_NAME.to_string(),
            content_type: CHART_CONTENT_TYPE,
        })
    }

    /// Plain-text report; `transcript` adds a transcript feedback section.
    pub fn render_summary(
        &self,
        request: &ComparisonRequest,
        result: &ComparisonResult,
        transcript: Option<&str>,
    ) -> ComparisonArtifact {
        summary::render_summary(request, result, transcript)
    }
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    student_pitch: &FeatureSequence,
    reference_pitch: &FeatureSequence,
    energy: Option<(&FeatureSequence, &FeatureSequence)>,
) -> PlotResult<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    match energy {
        Some((student_energy, reference_energy)) => {
            let panels = root.split_evenly((2, 1));
            draw_panel(
                &panels[0],
                "Pitch contour",
                "Pitch (Hz)",
                student_pitch,
                reference_pitch,
            )?;
            draw_panel(
                &panels[1],
                "Energy",
                "RMS",
                student_energy,
                reference_energy,
            )?;
        }
        None => draw_panel(
            root,
            "Pitch contour",
            "Pitch (Hz)",
            student_pitch,
            reference_pitch,
        )?,
    }
    root.present()?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    y_label: &str,
    student: &FeatureSequence,
    reference: &FeatureSequence,
) -> PlotResult<()>
where
    DB::ErrorType: 'static,
{
    let frames = student.len().max(reference.len()).max(2);
    let (y_min, y_max) = value_bounds(student, reference);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..(frames - 1) as f64, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Frame index")
        .y_desc(y_label)
        .y_label_formatter(&|y| format!("{:.2}", y))
        .draw()?;

    for (label, sequence, color) in [
        ("Student", student, STUDENT_COLOR),
        ("Reference", reference, REFERENCE_COLOR),
    ] {
        for (run_index, run) in finite_runs(sequence).into_iter().enumerate() {
            let series = chart.draw_series(LineSeries::new(run, &color))?;
            if run_index == 0 {
                series
                    .label(label)
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}

/// Consecutive finite points, so each `NaN` gap starts a new line.
fn finite_runs(sequence: &FeatureSequence) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (index, &value) in sequence.values().iter().enumerate() {
        if value.is_finite() {
            current.push((index as f64, value));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn value_bounds(student: &FeatureSequence, reference: &FeatureSequence) -> (f64, f64) {
    let (min, max) = student
        .values()
        .iter()
        .chain(reference.values().iter())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let padding = (max - min) * 0.05;
    (min - padding, max + padding)
}
