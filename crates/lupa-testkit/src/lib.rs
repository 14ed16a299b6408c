// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use lupa_app::{ChartKind, DrillDownSpec, Snapshot, SnapshotStatus};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

pub const MONTHS: [&str; 12] = [
    "2025-01", "2025-02", "2025-03", "2025-04", "2025-05", "2025-06", "2025-07", "2025-08",
    "2025-09", "2025-10", "2025-11", "2025-12",
];

pub const REGIONS: [&str; 8] = [
    "North", "South", "East", "West", "Central", "Coastal", "Mountain", "Plains",
];

pub fn orders_snapshot(title: &str, rows: usize) -> Snapshot {
    Snapshot {
        title: title.to_owned(),
        query: "SELECT month, SUM(total) AS total FROM orders GROUP BY month ORDER BY month"
            .to_owned(),
        x_field: "month".to_owned(),
        y_field: "total".to_owned(),
        database: Some("sales_db".to_owned()),
        columns: vec!["month".to_owned(), "total".to_owned()],
        rows: (0..rows)
            .map(|index| {
                vec![
                    serde_json::json!(MONTHS[index % MONTHS.len()]),
                    serde_json::json!(100 + (index as i64) * 37 % 250),
                ]
            })
            .collect(),
        chart_kind: ChartKind::Line,
        status: SnapshotStatus::Complete,
        drill_down: Some(DrillDownSpec {
            description: "orders behind a month".to_owned(),
            query_template: "SELECT * FROM {{database}}.orders WHERE month = '{{x}}' LIMIT 100"
                .to_owned(),
            param_mapping: BTreeMap::from([("x".to_owned(), "month".to_owned())]),
        }),
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub fn regions_snapshot(title: &str, rows: usize) -> Snapshot {
    Snapshot {
        title: title.to_owned(),
        query: "SELECT region, COUNT(*) AS orders FROM orders GROUP BY region".to_owned(),
        x_field: "region".to_owned(),
        y_field: "orders".to_owned(),
        database: Some("sales_db".to_owned()),
        columns: vec!["region".to_owned(), "orders".to_owned()],
        rows: (0..rows)
            .map(|index| {
                vec![
                    serde_json::json!(REGIONS[index % REGIONS.len()]),
                    serde_json::json!(10 + (index as i64) * 13 % 90),
                ]
            })
            .collect(),
        chart_kind: ChartKind::Bar,
        status: SnapshotStatus::Complete,
        drill_down: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub fn producer_payload(title: &str, rows: usize) -> serde_json::Value {
    let data: Vec<serde_json::Value> = (0..rows)
        .map(|index| {
            serde_json::json!([
                MONTHS[index % MONTHS.len()],
                100 + (index as i64) * 37 % 250,
            ])
        })
        .collect();
    serde_json::json!({
        "title": title,
        "query": "SELECT month, SUM(total) AS total FROM orders GROUP BY month ORDER BY month",
        "xField": "month",
        "yField": "total",
        "columns": ["month", "total"],
        "rows": data,
        "database": "sales_db",
        "drillDown": {
            "description": "orders behind a month",
            "queryTemplate": "SELECT * FROM {{database}}.orders WHERE month = '{{x}}' LIMIT 100",
            "paramMapping": {"x": "month"},
        },
    })
}

pub fn write_payload(path: &Path, payload: &serde_json::Value) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(payload).context("encode payload")?;
    fs::write(path, encoded).with_context(|| format!("write payload {}", path.display()))
}

pub fn timestamp(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(seconds)
}
