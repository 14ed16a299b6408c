// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::model::{
    ChartKind, DrillDownSpec, MAX_SNAPSHOT_ROWS, Snapshot, SnapshotError, SnapshotStatus,
};

#[derive(Debug, Clone, Deserialize)]
struct RawDrillDown {
    #[serde(default)]
    description: String,
    #[serde(alias = "queryTemplate")]
    query_template: String,
    #[serde(default, alias = "paramMapping")]
    param_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSnapshot {
    title: Option<String>,
    query: Option<String>,
    #[serde(alias = "xField", alias = "x_field")]
    x: Option<String>,
    #[serde(alias = "yField", alias = "y_field")]
    y: Option<String>,
    columns: Option<Vec<String>>,
    rows: Option<Vec<Vec<serde_json::Value>>>,
    database: Option<String>,
    #[serde(alias = "chartType")]
    chart_type: Option<String>,
    #[serde(alias = "drillDown")]
    drill_down: Option<RawDrillDown>,
}

pub fn parse_and_classify(
    raw: &[u8],
    created_at: OffsetDateTime,
) -> Result<Snapshot, SnapshotError> {
    let parsed: RawSnapshot = serde_json::from_slice(raw)
        .map_err(|error| SnapshotError::MalformedInput(error.to_string()))?;

    let title = required(parsed.title, "title")?;
    let query = required(parsed.query, "query")?;
    let x_field = required(parsed.x, "x")?;
    let y_field = required(parsed.y, "y")?;
    let columns = required(parsed.columns, "columns")?;
    let mut rows = required(parsed.rows, "rows")?;

    if columns.is_empty() {
        return Err(SnapshotError::MalformedInput(
            "`columns` must not be empty".to_owned(),
        ));
    }

    let mut seen = BTreeSet::new();
    for column in &columns {
        if !seen.insert(column.as_str()) {
            return Err(SnapshotError::MalformedInput(format!(
                "duplicate column {column:?}"
            )));
        }
    }

    for (index, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(SnapshotError::ColumnMismatch {
                row: index,
                expected: columns.len(),
                got: row.len(),
            });
        }
    }

    let x_index = columns
        .iter()
        .position(|column| column == &x_field)
        .ok_or_else(|| {
            SnapshotError::MalformedInput(format!("x field {x_field:?} does not name a column"))
        })?;
    let y_index = columns
        .iter()
        .position(|column| column == &y_field)
        .ok_or_else(|| {
            SnapshotError::MalformedInput(format!("y field {y_field:?} does not name a column"))
        })?;

    let status = if rows.len() > MAX_SNAPSHOT_ROWS {
        let original_count = rows.len();
        rows.truncate(MAX_SNAPSHOT_ROWS);
        SnapshotStatus::Truncated { original_count }
    } else {
        SnapshotStatus::Complete
    };

    let chart_kind = parsed
        .chart_type
        .as_deref()
        .and_then(ChartKind::parse)
        .unwrap_or_else(|| infer_chart_kind(&rows, x_index, y_index));

    let drill_down = parsed.drill_down.map(|raw| DrillDownSpec {
        description: raw.description,
        query_template: raw.query_template,
        param_mapping: raw.param_mapping,
    });

    Ok(Snapshot {
        title,
        query,
        x_field,
        y_field,
        database: parsed.database,
        columns,
        rows,
        chart_kind,
        status,
        drill_down,
        created_at,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, SnapshotError> {
    value.ok_or_else(|| SnapshotError::MalformedInput(format!("missing required field `{field}`")))
}

// Decision table, evaluated in this fixed order: all-dates wins over the
// numeric checks, and the fallback is always a bar chart.
fn infer_chart_kind(rows: &[Vec<serde_json::Value>], x_index: usize, y_index: usize) -> ChartKind {
    if rows.is_empty() {
        return ChartKind::Bar;
    }

    let x_values = || rows.iter().filter_map(|row| row.get(x_index));
    let y_values = || rows.iter().filter_map(|row| row.get(y_index));

    if x_values().all(is_date_like) {
        return ChartKind::Line;
    }

    let x_numeric = x_values().all(is_numeric);
    let y_numeric = y_values().all(is_numeric);
    if y_numeric && !x_numeric {
        return ChartKind::Bar;
    }
    if x_numeric && y_numeric {
        return ChartKind::Scatter;
    }
    ChartKind::Bar
}

fn is_date_like(value: &serde_json::Value) -> bool {
    let Some(text) = value.as_str() else {
        return false;
    };
    let text = text.trim();

    if OffsetDateTime::parse(text, &Rfc3339).is_ok() {
        return true;
    }
    let full_date = format_description!("[year]-[month]-[day]");
    if Date::parse(text, &full_date).is_ok() {
        return true;
    }
    // Month buckets ("2025-01") are a common producer output for time series.
    if text.len() == 7 && Date::parse(&format!("{text}-01"), &full_date).is_ok() {
        return true;
    }
    false
}

fn is_numeric(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Number(_) => true,
        serde_json::Value::String(text) => text.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_and_classify;
    use crate::model::{ChartKind, MAX_SNAPSHOT_ROWS, SnapshotError, SnapshotStatus};
    use time::OffsetDateTime;

    fn parse(payload: &serde_json::Value) -> Result<crate::model::Snapshot, SnapshotError> {
        parse_and_classify(
            payload.to_string().as_bytes(),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    fn payload(x_values: &[serde_json::Value], y_values: &[serde_json::Value]) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = x_values
            .iter()
            .zip(y_values)
            .map(|(x, y)| serde_json::json!([x, y]))
            .collect();
        serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": rows,
        })
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let error = parse(&serde_json::json!({
            "title": "t",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [],
        }))
        .expect_err("missing query should fail");
        assert!(matches!(error, SnapshotError::MalformedInput(_)));
        assert!(error.to_string().contains("`query`"));
    }

    #[test]
    fn row_width_mismatch_is_rejected_with_row_index() {
        let error = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [["a", 1], ["b"]],
        }))
        .expect_err("short row should fail");
        assert_eq!(
            error,
            SnapshotError::ColumnMismatch {
                row: 1,
                expected: 2,
                got: 1,
            }
        );
    }

    #[test]
    fn axis_fields_must_name_columns() {
        let error = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "month",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [],
        }))
        .expect_err("unknown x field should fail");
        assert!(error.to_string().contains("month"));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let error = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "x",
            "columns": ["x", "x"],
            "rows": [],
        }))
        .expect_err("duplicate column should fail");
        assert!(error.to_string().contains("duplicate column"));
    }

    #[test]
    fn rows_beyond_cap_are_dropped_and_flagged() -> anyhow::Result<()> {
        let rows: Vec<serde_json::Value> = (0..75)
            .map(|index| serde_json::json!([format!("k{index}"), index]))
            .collect();
        let snapshot = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": rows,
        }))?;
        assert_eq!(snapshot.rows.len(), MAX_SNAPSHOT_ROWS);
        assert_eq!(
            snapshot.status,
            SnapshotStatus::Truncated { original_count: 75 }
        );
        assert_eq!(snapshot.x_text(&snapshot.rows[0]), "k0");
        Ok(())
    }

    #[test]
    fn date_axis_classifies_as_line() -> anyhow::Result<()> {
        let snapshot = parse(&payload(
            &[serde_json::json!("2025-01"), serde_json::json!("2025-02")],
            &[serde_json::json!(10), serde_json::json!(20)],
        ))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Line);
        Ok(())
    }

    #[test]
    fn categorical_axis_with_numeric_values_classifies_as_bar() -> anyhow::Result<()> {
        let snapshot = parse(&payload(
            &[serde_json::json!("A"), serde_json::json!("B")],
            &[serde_json::json!(10), serde_json::json!(20)],
        ))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Bar);
        Ok(())
    }

    #[test]
    fn numeric_axes_classify_as_scatter() -> anyhow::Result<()> {
        let snapshot = parse(&payload(
            &[serde_json::json!(1), serde_json::json!("2.5")],
            &[serde_json::json!(10), serde_json::json!(20)],
        ))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Scatter);
        Ok(())
    }

    #[test]
    fn date_check_wins_over_numeric_checks() -> anyhow::Result<()> {
        // Full dates also fail the numeric predicate, so this pins the
        // priority order rather than falling through to bar.
        let snapshot = parse(&payload(
            &[
                serde_json::json!("2025-01-01"),
                serde_json::json!("2025-01-02"),
            ],
            &[serde_json::json!(1), serde_json::json!(2)],
        ))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Line);
        Ok(())
    }

    #[test]
    fn mixed_axes_default_to_bar() -> anyhow::Result<()> {
        let snapshot = parse(&payload(
            &[serde_json::json!(1), serde_json::json!(2)],
            &[serde_json::json!("high"), serde_json::json!("low")],
        ))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Bar);
        Ok(())
    }

    #[test]
    fn explicit_chart_type_overrides_inference() -> anyhow::Result<()> {
        let snapshot = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [["2025-01", 1], ["2025-02", 2]],
            "chart_type": "scatter",
        }))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Scatter);
        Ok(())
    }

    #[test]
    fn unknown_explicit_chart_type_falls_back_to_inference() -> anyhow::Result<()> {
        let snapshot = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [["A", 1]],
            "chartType": "pie",
        }))?;
        assert_eq!(snapshot.chart_kind, ChartKind::Bar);
        Ok(())
    }

    #[test]
    fn producer_camel_case_aliases_are_accepted() -> anyhow::Result<()> {
        let snapshot = parse(&serde_json::json!({
            "title": "Orders by month",
            "query": "SELECT month, total FROM orders",
            "xField": "month",
            "yField": "total",
            "columns": ["month", "total"],
            "rows": [["2025-01", 310]],
            "drillDown": {
                "description": "orders behind a month",
                "queryTemplate": "SELECT * FROM {{database}}.orders WHERE month = '{{x}}'",
                "paramMapping": {"x": "month"},
            },
            "database": "sales_db",
        }))?;
        assert_eq!(snapshot.x_field, "month");
        let drill = snapshot.drill_down.expect("drill-down spec expected");
        assert_eq!(drill.param_mapping.get("x").map(String::as_str), Some("month"));
        Ok(())
    }

    #[test]
    fn unknown_optional_fields_are_ignored() -> anyhow::Result<()> {
        let snapshot = parse(&serde_json::json!({
            "title": "t",
            "query": "SELECT 1",
            "x": "x",
            "y": "y",
            "columns": ["x", "y"],
            "rows": [["A", 1]],
            "lineage": {"aggregation": "SUM"},
            "explain_data": null,
            "timestamp": 1754300000000_u64,
        }))?;
        assert_eq!(snapshot.title, "t");
        Ok(())
    }

    #[test]
    fn empty_rows_are_sparse_but_accepted() -> anyhow::Result<()> {
        let snapshot = parse(&payload(&[], &[]))?;
        assert!(snapshot.rows.is_empty());
        assert!(snapshot.is_sparse());
        assert_eq!(snapshot.chart_kind, ChartKind::Bar);
        Ok(())
    }
}
