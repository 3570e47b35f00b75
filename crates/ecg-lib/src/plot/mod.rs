use crate::{detectors::DetectionResult, signal::Waveform};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Vertical rule at `x`, spanning the full y range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub x: f64,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Marker(Marker),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over line points and markers; `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for series in &self.series {
            match series {
                Series::Line(line) => {
                    xs.extend(line.points.iter().map(|p| p[0]));
                    ys.extend(line.points.iter().map(|p| p[1]));
                }
                Series::Marker(marker) => xs.push(marker.x),
            }
        }
        if xs.is_empty() || ys.is_empty() {
            return None;
        }
        let fold = |v: &[f64]| {
            v.iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                    (lo.min(*x), hi.max(*x))
                })
        };
        let (x_min, x_max) = fold(&xs);
        let (y_min, y_max) = fold(&ys);
        Some((x_min, x_max, y_min, y_max))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

const CHANNEL_COLORS: [u32; 2] = [0x1F77B4, 0x2CA02C];
const ONSET_COLOR: u32 = 0xD62728;

/// Both leads against time in seconds, with the detected onset as a marker.
pub fn figure_from_waveform(
    title: &str,
    waveform: &Waveform,
    onset: Option<&DetectionResult>,
    max_points: usize,
) -> Figure {
    let dt = 1.0 / waveform.sampling_rate() as f64;
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude".into());
    for (idx, channel) in waveform.channels().iter().enumerate() {
        let points: Vec<[f64; 2]> = channel
            .iter()
            .enumerate()
            .map(|(i, value)| [i as f64 * dt, *value])
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: format!("ch{}", idx + 1),
            points: decimate_points(&points, max_points),
            style: Style {
                width: 1.4,
                dash: None,
                color: Color(CHANNEL_COLORS[idx]),
            },
        }));
    }
    if let Some(onset) = onset {
        fig.add_series(Series::Marker(Marker {
            name: "onset".into(),
            x: onset.time_offset_seconds,
            style: Style {
                width: 2.0,
                dash: Some([6.0, 4.0]),
                color: Color(ONSET_COLOR),
            },
        }));
    }
    fig
}
