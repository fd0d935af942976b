//! Static plots of the gene graph and of node embeddings.
//!
//! Output format follows the file extension: `.svg` or `.png`.

pub mod layout;

use crate::data::graph::GeneGraph;
use crate::data::GeneLabel;
use anyhow::{anyhow, bail, Result};
use burn::tensor::{backend::Backend, Tensor};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

pub use layout::{to_undirected_graph, SpringLayout};

/// Canvas size in pixels
pub const PLOT_SIZE: (u32, u32) = (700, 700);

const EDGE_COLOR: RGBColor = RGBColor(190, 190, 190);

/// Set2 colour per label
pub fn label_color(label: GeneLabel) -> RGBColor {
    match label {
        GeneLabel::Driver => RGBColor(252, 141, 98),
        GeneLabel::Passenger => RGBColor(102, 194, 165),
        GeneLabel::Unknown => RGBColor(141, 160, 203),
    }
}

/// Everything a scatter plot needs
struct Scene<'a> {
    points: &'a [(f64, f64)],
    labels: &'a [GeneLabel],
    segments: Vec<((f64, f64), (f64, f64))>,
    radius: i32,
    caption: Option<&'a str>,
}

impl Scene<'_> {
    fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let axis = |f: fn(&(f64, f64)) -> f64| {
            let (lo, hi) = self.points.iter().map(f).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if !lo.is_finite() {
                (-1.0, 1.0)
            } else if hi - lo < 1e-9 {
                (lo - 1.0, hi + 1.0)
            } else {
                let pad = (hi - lo) * 0.05;
                (lo - pad, hi + pad)
            }
        };
        (axis(|p| p.0), axis(|p| p.1))
    }

    fn draw<DB: DrawingBackend>(&self, root: DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(|e| anyhow!("{}", e))?;

        let ((x0, x1), (y0, y1)) = self.bounds();
        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if let Some(caption) = self.caption {
            builder.caption(caption, ("sans-serif", 22));
        }
        let mut chart = builder
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(|e| anyhow!("{}", e))?;

        chart
            .draw_series(self.segments.iter().map(|&(a, b)| {
                PathElement::new(vec![a, b], EDGE_COLOR.stroke_width(1))
            }))
            .map_err(|e| anyhow!("{}", e))?;

        chart
            .draw_series(self.points.iter().zip(self.labels).map(|(&p, &label)| {
                Circle::new(p, self.radius, label_color(label).filled())
            }))
            .map_err(|e| anyhow!("{}", e))?;

        root.present().map_err(|e| anyhow!("{}", e))?;
        Ok(())
    }

    fn render(&self, path: &Path) -> Result<()> {
        if self.points.len() != self.labels.len() {
            bail!("{} points but {} labels", self.points.len(), self.labels.len());
        }

        let ext = path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("svg") => self.draw(SVGBackend::new(path, PLOT_SIZE).into_drawing_area()),
            Some("png") => self.draw(BitMapBackend::new(path, PLOT_SIZE).into_drawing_area()),
            _ => bail!("Unsupported plot format {:?} (use .svg or .png)", path),
        }
    }
}

/// Draw the graph with a seeded spring layout, nodes coloured by label
pub fn render_graph<P: AsRef<Path>>(path: P, graph: &GeneGraph, caption: Option<&str>) -> Result<()> {
    let path = path.as_ref();
    let ungraph = to_undirected_graph(graph);
    let points = SpringLayout::default().positions(&ungraph);

    let segments = ungraph.edge_indices()
        .filter_map(|e| ungraph.edge_endpoints(e))
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (points[a.index()], points[b.index()]))
        .collect();

    Scene {
        points: &points,
        labels: &graph.labels,
        segments,
        radius: 5,
        caption,
    }
    .render(path)?;

    info!("Saved graph plot: {:?}", path);
    Ok(())
}

/// Scatter 2-D embeddings coloured by label
pub fn render_embedding<P: AsRef<Path>>(
    path: P,
    points: &[(f64, f64)],
    labels: &[GeneLabel],
    caption: Option<&str>,
) -> Result<()> {
    Scene {
        points,
        labels,
        segments: Vec::new(),
        radius: 7,
        caption,
    }
    .render(path.as_ref())
}

/// First two embedding columns per node; a 1-D embedding is drawn on `y = 0`
pub fn embedding_points<B: Backend>(embedding: Tensor<B, 2>) -> Vec<(f64, f64)> {
    let [_, dims] = embedding.dims();
    let values: Vec<f32> = embedding.into_data().iter::<f32>().collect();
    if dims == 0 {
        return Vec::new();
    }

    values
        .chunks(dims)
        .map(|row| (row[0] as f64, row.get(1).copied().unwrap_or(0.0) as f64))
        .collect()
}
