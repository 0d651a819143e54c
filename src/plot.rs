use std::ops::Range;
use std::path::PathBuf;

use derive_builder::Builder;
use log::info;

use crate::error::{Error, Result};
use crate::waveform::SimulationResult;

#[derive(Debug, Clone, Builder)]
#[builder(derive(Debug))]
pub struct PlotParams {
    pub output_path: PathBuf,
    #[builder(setter(into), default = "String::from(\"Transient response\")")]
    pub title: String,
    /// Image size in pixels.
    #[builder(default = "(1920, 1080)")]
    pub size: (u32, u32),
}

impl PlotParams {
    #[inline]
    pub fn builder() -> PlotParamsBuilder {
        PlotParamsBuilder::default()
    }
}

fn plot_err(e: impl std::fmt::Display) -> Error {
    Error::Plot(e.to_string())
}

/// Range of `xs`, widened when all samples are equal.
fn span<'a>(xs: impl IntoIterator<Item = &'a f64>) -> Range<f64> {
    let (lo, hi) = xs
        .into_iter()
        .filter(|x| x.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    if lo > hi {
        return 0.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.1 };
    (lo - pad)..(hi + pad)
}

/// Renders every trace of `data` against its time axis as a PNG.
pub fn plot_result(data: &SimulationResult, params: &PlotParams) -> Result<()> {
    use plotters::prelude::*;

    if data.is_empty() {
        return Err(Error::Plot("no waveforms to plot".to_string()));
    }

    let t_range = span(&data.time);
    let t_range = (t_range.start.max(0.0))..t_range.end;
    let y_range = span(data.waveforms.values().flatten());

    let root = BitMapBackend::new(&params.output_path, params.size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .x_label_area_size(35)
        .y_label_area_size(40)
        .margin(5)
        .caption(&params.title, ("sans-serif", 40.0).into_font())
        .build_cartesian_2d(t_range, y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("Time (s)")
        .y_desc("Voltage (V)")
        .draw()
        .map_err(plot_err)?;

    for (i, trace) in data.traces().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(
                trace.t.iter().copied().zip(trace.y.iter().copied()),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(trace.name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("waveforms plotted to {:?}", &params.output_path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let params = PlotParams::builder()
            .output_path(PathBuf::from("out.png"))
            .build()
            .unwrap();
        assert_eq!(params.size, (1920, 1080));
        assert_eq!(params.title, "Transient response");
        assert!(PlotParams::builder().title("x").build().is_err());
    }

    #[test]
    fn empty_result_is_not_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let params = PlotParams::builder()
            .output_path(dir.path().join("empty.png"))
            .build()
            .unwrap();
        let err = plot_result(&SimulationResult::default(), &params).unwrap_err();
        assert!(matches!(err, Error::Plot(_)));
        assert!(!params.output_path.exists());
    }

    #[test]
    fn span_pads_flat_and_ignores_non_finite() {
        let r = span(&[1.0, 1.0, f64::NAN]);
        assert!(r.start < 1.0 && r.end > 1.0);
        let r = span(&[0.0, 10.0]);
        approx::assert_relative_eq!(r.start, -0.5);
        approx::assert_relative_eq!(r.end, 10.5);
        assert_eq!(span(&[]), 0.0..1.0);
    }
}
