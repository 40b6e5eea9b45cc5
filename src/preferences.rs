//! Persisted user preferences and trace overrides.

use crate::error::GraphError;
use crate::models::JobId;
use crate::palette;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use strum_macros::{Display, EnumString};

/// Treatment of series whose values sum to zero.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, EnumString, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HideInactive {
    /// No special treatment
    #[default]
    None,
    /// Remove from graph and legend
    Hidden,
    /// Keep in the legend, toggled off
    Disabled,
}

/// General graph preferences shared by all graphs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphPreferences {
    pub rangeslider: bool,
    /// Show the runtime title on the x axis
    pub x_title: bool,
    pub hide_inactive: HideInactive,
    pub color_palette: String,
}

impl Default for GraphPreferences {
    fn default() -> Self {
        Self {
            rangeslider: false,
            x_title: false,
            hide_inactive: HideInactive::None,
            color_palette: palette::DEFAULT_PALETTE.to_string(),
        }
    }
}

/// Name and color override of a single trace.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TraceOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// User overrides of trace names and colors and of per-job labels.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct GraphOverrides {
    /// Label prefix per job, replacing the job id in multi-job graphs
    pub prefixes: BTreeMap<JobId, String>,
    /// Overrides per trace uid
    pub traces: BTreeMap<String, TraceOverride>,
}

impl GraphOverrides {
    /// Merge other overrides into these; entries of `other` win.
    pub fn merge(&mut self, other: GraphOverrides) {
        self.prefixes.extend(other.prefixes);
        self.traces.extend(other.traces);
    }

    /// Label prefix of a job, if a non-empty one is set.
    pub fn prefix(&self, job_id: JobId) -> Option<&str> {
        self.prefixes
            .get(&job_id)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Name override of a trace, if a non-empty one is set.
    pub fn name(&self, uid: &str) -> Option<&str> {
        self.traces
            .get(uid)?
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
    }

    /// Color override of a trace, if a non-empty one is set.
    pub fn color(&self, uid: &str) -> Option<&str> {
        self.traces
            .get(uid)?
            .color
            .as_deref()
            .filter(|c| !c.is_empty())
    }
}

/// Preferences and overrides as persisted together.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct StoredPreferences {
    pub preferences: GraphPreferences,
    pub overrides: GraphOverrides,
}

/// Load preferences from a JSON file.
///
/// A missing file yields the defaults.
///
/// # Arguments
///
/// * `path`: Path of the JSON file
pub fn load_preferences(path: &Path) -> Result<StoredPreferences, GraphError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no preferences at {}, using defaults", path.display());
            Ok(StoredPreferences::default())
        }
        Err(error) => Err(error.into()),
    }
}

/// Save preferences to a JSON file.
///
/// # Arguments
///
/// * `path`: Path of the JSON file
/// * `stored`: Preferences to save
pub fn save_preferences(path: &Path, stored: &StoredPreferences) -> Result<(), GraphError> {
    let contents = serde_json::to_string_pretty(stored)?;
    std::fs::write(path, contents)?;
    Ok(())
}
