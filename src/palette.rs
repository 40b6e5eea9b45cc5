//! Qualitative color palettes for traces.

/// Palette used when none or an unknown one is configured.
pub const DEFAULT_PALETTE: &str = "D3";

const D3: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const PLOTLY: &[&str] = &[
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];

const G10: &[&str] = &[
    "#3366cc", "#dc3912", "#ff9900", "#109618", "#990099", "#0099c6", "#dd4477", "#66aa00",
    "#b82e2e", "#316395",
];

const T10: &[&str] = &[
    "#4c78a8", "#f58518", "#e45756", "#72b7b2", "#54a24b", "#eeca3b", "#b279a2", "#ff9da6",
    "#9d755d", "#bab0ac",
];

/// Names of all known palettes.
pub const PALETTES: [&str; 4] = ["D3", "Plotly", "G10", "T10"];

/// Return the colors of a palette by name, falling back to the default palette.
pub fn colors(name: &str) -> &'static [&'static str] {
    match name {
        "Plotly" => PLOTLY,
        "G10" => G10,
        "T10" => T10,
        "D3" => D3,
        other => {
            tracing::debug!("unknown color palette {}, using {}", other, DEFAULT_PALETTE);
            D3
        }
    }
}

/// Color of the trace at `index`, cycling through the palette.
pub fn pick(name: &str, index: usize) -> &'static str {
    let colors = colors(name);
    colors[index % colors.len()]
}
