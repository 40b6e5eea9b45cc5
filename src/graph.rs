//! Renderer-agnostic graph output: traces and layout.

use crate::benchmarks;
use crate::models::Statistics;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};

/// Width reserved for the legend, in pixels.
pub const LEGEND_WIDTH: u32 = 180;

/// Annotation shown for graphs without traces.
pub const NO_DATA_TEXT: &str = "no data available or matching filters";

/// Display names longer than this get line breaks in the legend.
const LEGEND_NAME_WIDTH: usize = 12;

lazy_static! {
    static ref LEGEND_BREAK_RE: Regex = Regex::new(r"(.{12,}?)\s?\b").unwrap();
}

/// Visibility of a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Drawn and listed in the legend
    #[default]
    Visible,
    /// Not drawn, listed in the legend
    Invisible,
    /// Not drawn, listed in the legend as toggled off
    LegendOnly,
    /// Neither drawn nor listed
    Hidden,
}

impl Visibility {
    pub fn from_bool(visible: bool) -> Self {
        if visible {
            Self::Visible
        } else {
            Self::Invisible
        }
    }

    /// Returns true unless the trace has been switched off explicitly.
    pub fn is_on(self) -> bool {
        !matches!(self, Self::Invisible)
    }
}

impl Serialize for Visibility {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Visible => serializer.serialize_bool(true),
            Self::Invisible => serializer.serialize_bool(false),
            Self::LegendOnly => serializer.serialize_str("legendonly"),
            Self::Hidden => serializer.serialize_str("hidden"),
        }
    }
}

/// X coordinates, either formatted timestamps or numbers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XValues {
    Labels(Vec<String>),
    Numbers(Vec<f64>),
}

impl XValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Labels(labels) => labels.len(),
            Self::Numbers(numbers) => numbers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Area fill of stacked traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    /// Fill down to zero; first trace of a stack
    ToZeroY,
    /// Fill down to the previous trace of the stack
    ToNextY,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    #[default]
    Lines,
    Markers,
}

/// One renderable labelled series.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Stable identity of the trace
    pub uid: String,
    /// Legend name, possibly line-wrapped
    pub name: String,
    /// Unwrapped name
    pub display_name: String,
    pub raw_name: String,
    pub x: XValues,
    pub y: Vec<f64>,
    pub unit: String,
    pub color: String,
    pub visible: Visibility,
    pub legendgroup: String,
    pub table: String,
    pub table_name: String,
    /// Derived traces which are not part of the measured data
    pub auxiliary: bool,
    pub mode: TraceMode,
    pub width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

impl Default for XValues {
    fn default() -> Self {
        Self::Labels(Vec::new())
    }
}

impl Trace {
    /// Return a new line trace with the legend name derived from `name`.
    pub fn new(uid: &str, name: &str, x: XValues, y: Vec<f64>) -> Self {
        Self {
            uid: uid.to_string(),
            name: legend_name(name),
            display_name: name.to_string(),
            x,
            y,
            width: 1,
            ..Default::default()
        }
    }
}

/// Legend name of a trace.
///
/// Benchmark ids are replaced by their peak title. Other names longer than twelve characters are
/// broken with `<br>` at word boundaries as the legend has a fixed width.
pub fn legend_name(name: &str) -> String {
    if name == benchmarks::MEMORY_BANDWIDTH {
        return "Peak Memory Bandwidth".to_string();
    }
    if let Some(benchmark) = benchmarks::FLOP_BENCHMARKS.iter().find(|b| b.id == name) {
        return format!("Peak {}", benchmark.title);
    }
    if name.chars().count() <= LEGEND_NAME_WIDTH {
        return name.to_string();
    }
    let wrapped = LEGEND_BREAK_RE.replace_all(name, "${1}<br>");
    let wrapped: &str = &wrapped;
    wrapped.strip_suffix("<br>").unwrap_or(wrapped).to_string()
}

/// Format a runtime in seconds as `HH:MM:SS`, prefixed with `DD ` once it exceeds a day.
pub fn format_runtime(seconds: u64) -> String {
    let days = seconds / 86400;
    let rest = seconds % 86400;
    let time = format!(
        "{:02}:{:02}:{:02}",
        rest / 3600,
        (rest % 3600) / 60,
        rest % 60
    );
    if days > 0 {
        format!("{:02} {}", days, time)
    } else {
        time
    }
}

/// Runtime labels of `points` samples taken every `interval` seconds.
pub fn timestamps(points: usize, interval: f64) -> Vec<String> {
    (0..points)
        .map(|i| format_runtime((i as f64 * interval).max(0.0).floor() as u64))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub b: u32,
    pub t: u32,
    pub pad: u32,
}

const MARGIN: Margin = Margin {
    l: 60,
    r: LEGEND_WIDTH,
    b: 60,
    t: 20,
    pad: 0,
};

const MARGIN_WITH_RANGESLIDER: Margin = Margin { b: 10, ..MARGIN };

/// Axis type, `-` lets the renderer decide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AxisType {
    #[default]
    #[serde(rename = "-")]
    Auto,
    #[serde(rename = "linear")]
    Linear,
    #[serde(rename = "log")]
    Log,
}

/// Marker for an enabled range slider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RangeSlider {}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    pub autorange: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nticks: Option<u32>,
    #[serde(rename = "type")]
    pub axis_type: AxisType,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub autotick: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rangeslider: Option<RangeSlider>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub text: String,
}

/// Axis and legend metadata of a graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub margin: Margin,
    pub showlegend: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Layout {
    /// Returns true if the layout carries the "no data" annotation.
    pub fn no_data(&self) -> bool {
        self.annotations.iter().any(|a| a.text == NO_DATA_TEXT)
    }
}

/// Options of [create_layout].
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutOptions {
    /// Number of samples on the x axis; 0 selects a default width
    pub data_count: usize,
    pub y_title: String,
    pub x_title: Option<String>,
    pub autorange: bool,
    pub rangeslider: bool,
    pub x_type: AxisType,
    pub y_type: AxisType,
    pub x_autotick: bool,
    pub no_data: bool,
    pub show_legend: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            data_count: 0,
            y_title: String::new(),
            x_title: None,
            autorange: false,
            rangeslider: true,
            x_type: AxisType::Auto,
            y_type: AxisType::Auto,
            x_autotick: false,
            no_data: false,
            show_legend: true,
        }
    }
}

/// Create the layout of a graph.
pub fn create_layout(options: &LayoutOptions) -> Layout {
    let mut margin = if options.rangeslider {
        MARGIN_WITH_RANGESLIDER
    } else {
        MARGIN
    };
    if !options.show_legend {
        margin.r = 60;
    }
    if options.x_title.is_none() {
        margin.b = 40;
    }

    let data_count = if options.data_count == 0 {
        100
    } else {
        options.data_count
    };

    let mut annotations = Vec::new();
    if options.no_data {
        annotations.push(Annotation {
            text: NO_DATA_TEXT.to_string(),
        });
    }

    Layout {
        xaxis: Axis {
            title: options.x_title.clone(),
            range: Some([0.0, (data_count - 1) as f64]),
            autorange: options.autorange,
            nticks: Some(7),
            axis_type: options.x_type,
            autotick: options.x_autotick,
            rangeslider: options.rangeslider.then_some(RangeSlider {}),
        },
        yaxis: Axis {
            title: Some(options.y_title.clone()),
            autorange: options.autorange,
            axis_type: options.y_type,
            ..Default::default()
        },
        margin,
        showlegend: options.show_legend,
        annotations,
    }
}

/// Assembled traces and layout of a graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Graph {
    pub traces: Vec<Trace>,
    pub layout: Layout,
}

impl Graph {
    /// Graph without traces, annotated as having no data.
    pub fn no_data(show_legend: bool) -> Self {
        Self {
            traces: Vec::new(),
            layout: create_layout(&LayoutOptions {
                no_data: true,
                show_legend,
                ..Default::default()
            }),
        }
    }

    /// Uids of all traces in order.
    pub fn uids(&self) -> Vec<&str> {
        self.traces.iter().map(|t| t.uid.as_str()).collect()
    }

    pub fn trace(&self, uid: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.uid == uid)
    }
}
