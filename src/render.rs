//! Chart rendering, decoupled from computation: capabilities produce a
//! [`ChartSpec`] and the dispatcher hands it to whichever [`Renderer`] the
//! session was built with. A renderer failure is logged and never changes an
//! operation's outcome.

use anyhow::Result;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    Bar {
        title: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Histogram {
        title: String,
        edges: Vec<f64>,
        counts: Vec<u64>,
    },
    Line {
        title: String,
        points: Vec<(String, f64)>,
    },
    Scatter {
        title: String,
        points: Vec<(f64, f64)>,
    },
}

pub trait Renderer {
    fn render(&self, chart: &ChartSpec) -> Result<()>;
}

/// Renders charts as plain text on stdout.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    pub width: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self { width: 40 }
    }
}

impl Renderer for TextRenderer {
    fn render(&self, chart: &ChartSpec) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        match chart {
            ChartSpec::Bar { title, labels, values } => {
                writeln!(out, "{title}")?;
                let max = values.iter().copied().fold(0.0_f64, f64::max);
                let label_w = labels.iter().map(String::len).max().unwrap_or(0).min(24);
                for (label, value) in labels.iter().zip(values) {
                    let label: String = label.chars().take(24).collect();
                    writeln!(
                        out,
                        "  {label:>label_w$} | {} {value}",
                        bar(*value, max, self.width)
                    )?;
                }
            }
            ChartSpec::Histogram { title, edges, counts } => {
                writeln!(out, "{title}")?;
                let max = counts.iter().copied().max().unwrap_or(0) as f64;
                for (i, count) in counts.iter().enumerate() {
                    let (lo, hi) = (edges[i], edges[i + 1]);
                    writeln!(
                        out,
                        "  [{lo:>10.3}, {hi:>10.3}) | {} {count}",
                        bar(*count as f64, max, self.width)
                    )?;
                }
            }
            ChartSpec::Line { title, points } => {
                writeln!(out, "{title}")?;
                let max = points.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
                let label_w = points.iter().map(|(k, _)| k.len()).max().unwrap_or(0).min(24);
                for (key, value) in points {
                    writeln!(
                        out,
                        "  {key:>label_w$} | {} {value}",
                        bar(*value, max, self.width)
                    )?;
                }
            }
            ChartSpec::Scatter { title, points } => {
                writeln!(out, "{title}")?;
                for line in scatter_grid(points, self.width, 14) {
                    writeln!(out, "  {line}")?;
                }
            }
        }
        writeln!(out)?;
        Ok(())
    }
}

/// Swallows every chart; used by tests and headless embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&self, _chart: &ChartSpec) -> Result<()> {
        Ok(())
    }
}

fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || !value.is_finite() {
        return String::new();
    }
    let filled = ((value / max) * width as f64).round().max(0.0) as usize;
    "#".repeat(filled.min(width))
}

fn scatter_grid(points: &[(f64, f64)], cols: usize, rows: usize) -> Vec<String> {
    if points.is_empty() {
        return vec!["(no points)".to_string()];
    }
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in points {
        min_x = min_x.min(*x);
        max_x = max_x.max(*x);
        min_y = min_y.min(*y);
        max_y = max_y.max(*y);
    }
    let span_x = (max_x - min_x).max(f64::MIN_POSITIVE);
    let span_y = (max_y - min_y).max(f64::MIN_POSITIVE);

    let mut grid = vec![vec![' '; cols]; rows];
    for (x, y) in points {
        let cx = (((x - min_x) / span_x) * (cols - 1) as f64).round() as usize;
        let cy = (((y - min_y) / span_y) * (rows - 1) as f64).round() as usize;
        // y grows upward
        grid[rows - 1 - cy][cx] = '*';
    }
    grid.into_iter().map(|row| row.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bar_scales_to_width() {
        assert_eq!(bar(10.0, 10.0, 8), "########");
        assert_eq!(bar(5.0, 10.0, 8), "####");
        assert_eq!(bar(0.0, 10.0, 8), "");
        assert_eq!(bar(1.0, 0.0, 8), "");
    }

    #[test]
    fn scatter_grid_marks_extremes() {
        let lines = scatter_grid(&[(0.0, 0.0), (1.0, 1.0)], 10, 4);
        assert_eq!(lines.len(), 4);
        // max y lands on the first line, min y on the last
        assert!(lines[0].ends_with('*'));
        assert!(lines[3].starts_with('*'));
    }

    #[test]
    fn null_renderer_accepts_everything() {
        let chart = ChartSpec::Bar {
            title: "t".into(),
            labels: vec!["a".into()],
            values: vec![1.0],
        };
        assert!(NullRenderer.render(&chart).is_ok());
    }
}
