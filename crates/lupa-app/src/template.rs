// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::model::{DrillDownError, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

impl QueryTemplate {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                // Unterminated marker: the remainder is literal text.
                literal.push_str(rest);
                rest = "";
                break;
            };
            let name = &after[..end];
            if name.is_empty() || !name.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                literal.push_str(&rest[..start + 2]);
                rest = after;
                continue;
            }
            literal.push_str(&rest[..start]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name.to_owned()));
            rest = &after[end + 2..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn render(&self, params: &ParamSource<'_>) -> Result<String, DrillDownError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => out.push_str(&params.resolve(name)?),
            }
        }
        Ok(out)
    }
}

pub struct ParamSource<'a> {
    snapshot: &'a Snapshot,
    row: &'a [serde_json::Value],
}

impl<'a> ParamSource<'a> {
    pub fn new(snapshot: &'a Snapshot, row: &'a [serde_json::Value]) -> Self {
        Self { snapshot, row }
    }

    fn resolve(&self, name: &str) -> Result<String, DrillDownError> {
        if name == "database" {
            return self
                .snapshot
                .database
                .clone()
                .ok_or_else(|| DrillDownError::UnresolvedPlaceholder(name.to_owned()));
        }

        let mapping = self
            .snapshot
            .drill_down
            .as_ref()
            .map(|spec| &spec.param_mapping);
        let column = match mapping.and_then(|mapping| mapping.get(name)) {
            Some(column) => column.as_str(),
            // The producer may omit mappings for the axis placeholders; they
            // default to the snapshot's own axis columns.
            None if name == "x" => self.snapshot.x_field.as_str(),
            None if name == "y" => self.snapshot.y_field.as_str(),
            None => return Err(DrillDownError::UnresolvedPlaceholder(name.to_owned())),
        };

        let index = self
            .snapshot
            .columns
            .iter()
            .position(|candidate| candidate == column)
            .ok_or_else(|| DrillDownError::UnresolvedPlaceholder(name.to_owned()))?;
        let value = self
            .row
            .get(index)
            .ok_or_else(|| DrillDownError::UnresolvedPlaceholder(name.to_owned()))?;
        Ok(sql_literal(value))
    }
}

// Substitution is textual by design of the producer contract: the template
// controls quoting, values only escape what would break a string literal.
pub fn sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.replace('\'', "''"),
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::Bool(flag) => flag.to_string(),
        serde_json::Value::Null => "NULL".to_owned(),
        other => other.to_string().trim_matches('"').to_owned(),
    }
}

pub fn resolve_drill_down(
    snapshot: &Snapshot,
    row_index: usize,
) -> Result<String, DrillDownError> {
    let spec = snapshot
        .drill_down
        .as_ref()
        .ok_or(DrillDownError::TemplateMissing)?;
    let row = snapshot
        .rows
        .get(row_index)
        .ok_or_else(|| DrillDownError::BackendFailure("selected row is out of range".to_owned()))?;
    let template = QueryTemplate::parse(&spec.query_template);
    template.render(&ParamSource::new(snapshot, row))
}
