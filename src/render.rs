//! CSV, JSON and HTML output.

use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use tera::{Context, Tera};

use crate::error::{PullboardError, Result};
use crate::filters::TimeWindow;
use crate::leaderboard::categories;
use crate::summary::ActivityBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = PullboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(PullboardError::ConfigError(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

/// Serializes `rows` in `format`. Nothing is returned on failure.
pub fn render_rows<T: Serialize>(rows: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Csv => to_csv(rows),
        OutputFormat::Json => to_json(rows),
    }
}

/// Header row followed by one line per row, columns in field order.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| PullboardError::RenderError(format!("CSV encoding failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PullboardError::RenderError(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| PullboardError::RenderError(e.to_string()))
}

pub fn to_json<T: Serialize>(rows: &[T]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

#[derive(Debug, Clone)]
pub struct LeaderboardOptions {
    pub title: String,
    pub window: TimeWindow,
    /// Emit no-cache meta headers for pages served live.
    pub disable_caching: bool,
    /// Command line shown in the footer.
    pub command: Option<String>,
    pub top_n: usize,
}

const LEADERBOARD_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
{%- if disable_caching %}
  <meta http-equiv="Cache-Control" content="no-cache, no-store, must-revalidate">
  <meta http-equiv="Pragma" content="no-cache">
  <meta http-equiv="Expires" content="0">
{%- endif %}
  <title>{{ title }}</title>
  <script src="https://www.gstatic.com/charts/loader.js"></script>
  <style>
    body { font-family: sans-serif; margin: 2em; }
    .category { margin-bottom: 3em; }
    .chart { display: inline-block; vertical-align: top; margin: 1em; }
    footer { color: #888; font-size: small; }
  </style>
</head>
<body>
  <h1>{{ title }}</h1>
  <p>{{ since }} to {{ until }}</p>
{% for category in categories %}
  <section class="category">
    <h2>{{ category.title }}</h2>
{%- for chart in category.charts %}
    <div class="chart">
      <h3>{{ chart.title }}</h3>
      <div id="{{ chart.id }}"></div>
      <table>
        <tr><th>Name</th><th>{{ chart.metric }}</th></tr>
{%- for item in chart.items %}
        <tr><td>{{ item.name }}</td><td>{{ item.count }}</td></tr>
{%- endfor %}
      </table>
      <script>
        google.charts.load("current", {packages: ["corechart"]});
        google.charts.setOnLoadCallback(function () {
          var data = google.visualization.arrayToDataTable([
            ["Name", {{ chart.metric | json_encode() | safe }}]
{%- for item in chart.items %},
            [{{ item.name | json_encode() | safe }}, {{ item.count }}]
{%- endfor %}
          ]);
          new google.visualization.BarChart(document.getElementById("{{ chart.id }}"))
            .draw(data, {legend: {position: "none"}, width: 480});
        });
      </script>
    </div>
{%- endfor %}
  </section>
{% endfor %}
  <footer>
    Generated {{ generated }}
{%- if command %} by <code>{{ command }}</code>{% endif %}
  </footer>
</body>
</html>
"#;

/// Renders the leaderboard page for `bundle`.
pub fn render_html(options: &LeaderboardOptions, bundle: &ActivityBundle) -> Result<String> {
    let mut context = Context::new();
    context.insert("title", &options.title);
    context.insert("since", &options.window.since.format("%Y-%m-%d").to_string());
    context.insert("until", &options.window.until.format("%Y-%m-%d").to_string());
    context.insert("disable_caching", &options.disable_caching);
    context.insert("command", &options.command);
    context.insert("generated", &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
    context.insert("categories", &categories(bundle, options.top_n));

    Ok(Tera::one_off(LEADERBOARD_TEMPLATE, &context, true)?)
}
