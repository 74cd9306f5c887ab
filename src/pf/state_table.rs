use super::stanza::{ParseContext, Stanza};
use super::PfError;
use crate::metric::{FieldValue, Metric};
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Measurement name for pf counters.
pub const MEASUREMENT: &str = "pf";

static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^State Table").unwrap());

/// The "State Table" section of `pfctl -s info`.
pub fn stanza() -> Stanza {
    Stanza::new("State Table", &HEADER, parse)
}

/// Binds an output field key to the label pfctl prints for it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldDefinition {
    field: &'static str,
    label: &'static str,
    value: Option<i64>,
}

impl FieldDefinition {
    const fn new(field: &'static str, label: &'static str) -> Self {
        Self {
            field,
            label,
            value: None,
        }
    }
}

/// Fresh, unpopulated definitions. Built per pass so nothing from an
/// earlier cycle can leak into this one.
fn field_definitions() -> [FieldDefinition; 4] {
    [
        FieldDefinition::new("entries", "current entries"),
        FieldDefinition::new("searches", "searches"),
        FieldDefinition::new("inserts", "inserts"),
        FieldDefinition::new("removals", "removals"),
    ]
}

/// Extract the state-table counters from the stanza body.
///
/// Unknown labels and non-counter lines are skipped. A recognized label
/// whose value is not a valid i64 fails the whole pass.
fn parse(lines: &[&str], ctx: &ParseContext<'_>) -> Result<Metric, PfError> {
    let mut defs = field_definitions();

    for line in lines {
        let Some(counter) = ctx.format.match_counter_line(line) else {
            continue;
        };
        for def in defs.iter_mut().filter(|d| d.label == counter.label) {
            let value = counter
                .value
                .parse::<i64>()
                .map_err(|e| PfError::InvalidValue {
                    label: def.label.to_string(),
                    text: counter.value.to_string(),
                    source: e,
                })?;
            def.value = Some(value);
        }
    }

    assemble(&defs, ctx.command)
}

/// All-or-nothing: every definition must be populated or no metric is built.
fn assemble(defs: &[FieldDefinition], command: &str) -> Result<Metric, PfError> {
    let mut fields = HashMap::with_capacity(defs.len());
    for def in defs {
        let value = def.value.ok_or_else(|| PfError::MissingData {
            label: def.label.to_string(),
            command: command.to_string(),
        })?;
        fields.insert(def.field.to_string(), FieldValue::Int(value));
    }
    Ok(Metric::new(MEASUREMENT, HashMap::new(), fields, Utc::now()))
}
