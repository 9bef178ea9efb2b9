//! Visualization Spec Builder
//!
//! Produces a declarative, renderer-agnostic chart descriptor. Nothing here
//! checks that the bindings make sense for the data; the translation layer
//! picks the chart kind and this module only assembles it.

use crate::execution::result::Row;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Scatter,
    LineChart,
    BarChart,
    StackedBar,
    Histogram,
    #[default]
    Table,
    Kpi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    #[default]
    Linear,
    Log,
}

/// Column bindings for each visual channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBindings {
    #[serde(default, rename = "x_field")]
    pub x: Option<String>,
    #[serde(default, rename = "y_field")]
    pub y: Option<String>,
    #[serde(default, rename = "color_field")]
    pub color: Option<String>,
    #[serde(default, rename = "size_field")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisLabels {
    #[serde(default, rename = "x_label")]
    pub x: Option<String>,
    #[serde(default, rename = "y_label")]
    pub y: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisScales {
    #[serde(default, rename = "x_scale")]
    pub x: ScaleKind,
    #[serde(default, rename = "y_scale")]
    pub y: ScaleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    pub description: String,
    pub data: Vec<Row>,
    #[serde(flatten)]
    pub fields: FieldBindings,
    #[serde(flatten)]
    pub labels: AxisLabels,
    #[serde(flatten)]
    pub scales: AxisScales,
}

impl VisualizationSpec {
    /// `{"visualization": {...}}`, the shape the front end renders
    pub fn to_value(&self) -> Value {
        json!({ "visualization": self })
    }
}

pub fn build_visualization(
    kind: ChartKind,
    title: impl Into<String>,
    description: impl Into<String>,
    data: Vec<Row>,
    fields: FieldBindings,
    labels: AxisLabels,
    scales: AxisScales,
) -> VisualizationSpec {
    VisualizationSpec {
        kind,
        title: title.into(),
        description: description.into(),
        data,
        fields,
        labels,
        scales,
    }
}

const CATEGORICAL_COLUMNS: &[&str] = &["pl_discmethod", "discoverymethod", "hostname"];

const NUMERIC_COLUMNS: &[&str] = &[
    "pl_rade", "pl_bmasse", "pl_orbper", "pl_eqt", "st_teff", "st_rad", "st_mass", "st_dist", "sy_dist",
];

/// Advisory chart kind for a result's columns
pub fn suggest_chart_kind<S: AsRef<str>>(columns: &[S]) -> ChartKind {
    let has = |name: &str| columns.iter().any(|c| c.as_ref() == name);
    let count_like = columns.iter().any(|c| c.as_ref().to_lowercase().contains("count"));

    if columns.len() == 1 && count_like {
        return ChartKind::Kpi;
    }
    if has("disc_year") || has("year") {
        return ChartKind::LineChart;
    }
    if CATEGORICAL_COLUMNS.iter().any(|c| has(c)) && count_like {
        return ChartKind::BarChart;
    }
    if columns.iter().filter(|c| NUMERIC_COLUMNS.contains(&c.as_ref())).count() >= 2 {
        return ChartKind::Scatter;
    }
    ChartKind::Table
}

/// Human-readable axis label (with units) for well-known columns
pub fn column_label(column: &str) -> &str {
    match column {
        "pl_name" => "Planet Name",
        "hostname" => "Host Star",
        "pl_rade" => "Planet Radius (Earth radii)",
        "pl_bmasse" => "Planet Mass (Earth masses)",
        "pl_orbper" => "Orbital Period (days)",
        "pl_orbsmax" => "Semi-major Axis (AU)",
        "pl_eqt" => "Equilibrium Temperature (K)",
        "pl_discmethod" | "discoverymethod" => "Discovery Method",
        "disc_year" => "Discovery Year",
        "st_teff" => "Stellar Temperature (K)",
        "st_rad" => "Stellar Radius (Solar radii)",
        "st_mass" => "Stellar Mass (Solar masses)",
        "st_dist" | "sy_dist" => "Distance (parsecs)",
        "sy_pnum" => "Planets in System",
        "count" => "Count",
        other => other,
    }
}
