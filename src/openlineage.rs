//! OpenLineage run events carrying the column lineage dataset facet.
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::lineage::{SqlLineageResult, UNKNOWN, WILDCARD};

pub const PRODUCER: &str = "https://data-foundations/lineage-agent";
pub const SCHEMA_URL: &str = "https://openlineage.io/spec/1-0-5/OpenLineage.json";
pub const COLUMN_LINEAGE_SCHEMA_URL: &str =
    "https://openlineage.io/spec/facets/1-2-0/ColumnLineageDatasetFacet.json";
pub const JOB_NAMESPACE: &str = "data-foundations";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventType {
    Start,
    Running,
    Complete,
    Fail,
    Abort,
    Other,
}

fn unknown() -> String {
    UNKNOWN.to_owned()
}

/// Required fields are optional here so that [`validate_event`] can report all of them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(rename = "schemaURL", default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Run>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(default)]
    pub inputs: Vec<Dataset>,
    #[serde(default)]
    pub outputs: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub facets: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub facets: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default = "unknown")]
    pub namespace: String,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default)]
    pub facets: DatasetFacets,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetFacets {
    #[serde(
        rename = "columnLineage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub column_lineage: Option<ColumnLineageFacet>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnLineageFacet {
    #[serde(rename = "_producer", default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(rename = "_schemaURL", default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, FieldLineage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLineage {
    #[serde(default)]
    pub input_fields: Vec<InputField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_description: Option<String>,
    /// Field-level transformations, emitted by some producers instead of per input field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    #[serde(default = "unknown")]
    pub namespace: String,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown")]
    pub field: String,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid OpenLineage event: {}", .problems.join("; "))]
pub struct EventValidationError {
    pub problems: Vec<String>,
}

/// Required identifiers of a validated event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventHeader {
    pub event_type: EventType,
    pub event_time: String,
    pub run_id: String,
    pub job_namespace: String,
    pub job_name: String,
    pub producer: String,
}

fn required<'e>(value: Option<&'e String>, field: &str, problems: &mut Vec<String>) -> &'e str {
    match value {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            problems.push(format!("Missing required field: {}", field));
            ""
        }
    }
}

/// Checks the event identifiers and lifecycle value, collecting every problem found.
pub fn validate_event(event: &RunEvent) -> Result<EventHeader, EventValidationError> {
    let mut problems = vec![];

    let event_type = match required(event.event_type.as_ref(), "eventType", &mut problems) {
        "" => None,
        value => match value.parse::<EventType>() {
            Ok(event_type) => Some(event_type),
            Err(_) => {
                problems.push(format!(
                    "eventType must be one of START, RUNNING, COMPLETE, FAIL, ABORT, OTHER: got `{}`",
                    value
                ));
                None
            }
        },
    };
    let event_time = required(event.event_time.as_ref(), "eventTime", &mut problems);
    let producer = required(event.producer.as_ref(), "producer", &mut problems);
    let run_id = required(
        event.run.as_ref().and_then(|run| run.run_id.as_ref()),
        "run.runId",
        &mut problems,
    );
    let job_namespace = required(
        event.job.as_ref().and_then(|job| job.namespace.as_ref()),
        "job.namespace",
        &mut problems,
    );
    let job_name = required(
        event.job.as_ref().and_then(|job| job.name.as_ref()),
        "job.name",
        &mut problems,
    );

    match event_type {
        Some(event_type) if problems.is_empty() => Ok(EventHeader {
            event_type,
            event_time: event_time.to_owned(),
            run_id: run_id.to_owned(),
            job_namespace: job_namespace.to_owned(),
            job_name: job_name.to_owned(),
            producer: producer.to_owned(),
        }),
        _ => Err(EventValidationError { problems }),
    }
}

impl RunEvent {
    /// Whether any output carries at least one column lineage field.
    pub fn has_column_lineage(&self) -> bool {
        self.outputs.iter().any(|output| {
            output
                .facets
                .column_lineage
                .as_ref()
                .is_some_and(|facet| !facet.fields.is_empty())
        })
    }
}

/// Builds a COMPLETE event describing one parsed statement: the tables it reads as inputs and
/// the target table, if any, as the output carrying the column lineage facet.
pub fn build_run_event(job_name: &str, namespace: &str, result: &SqlLineageResult) -> RunEvent {
    let mut fields = IndexMap::new();
    for column_lineage in &result.column_lineages {
        let input_fields: Vec<InputField> = column_lineage
            .source_columns
            .iter()
            .filter(|source| {
                source.table != UNKNOWN && source.table != WILDCARD && source.column != WILDCARD
            })
            .map(|source| InputField {
                namespace: namespace.to_owned(),
                name: source.table.clone(),
                field: source.column.clone(),
                transformations: vec![Transformation {
                    r#type: Some(source.transformation_type.to_string()),
                    subtype: Some(source.transformation_subtype.to_string()),
                    description: Some(source.description.clone()),
                    masking: None,
                }],
            })
            .collect();
        if !input_fields.is_empty() {
            fields.insert(
                column_lineage.column.clone(),
                FieldLineage {
                    input_fields,
                    transformation_type: None,
                    transformation_description: column_lineage.transformation_description.clone(),
                    transformations: vec![],
                },
            );
        }
    }

    // The target is reported as the output only
    let inputs = result
        .source_tables
        .iter()
        .filter(|table| result.target_table.as_ref() != Some(*table))
        .map(|table| Dataset {
            namespace: namespace.to_owned(),
            name: table.clone(),
            facets: DatasetFacets::default(),
        })
        .collect();
    let outputs = result
        .target_table
        .iter()
        .map(|table| Dataset {
            namespace: namespace.to_owned(),
            name: table.clone(),
            facets: DatasetFacets {
                column_lineage: (!fields.is_empty()).then(|| ColumnLineageFacet {
                    producer: Some(PRODUCER.to_owned()),
                    schema_url: Some(COLUMN_LINEAGE_SCHEMA_URL.to_owned()),
                    fields: fields.clone(),
                }),
                other: Default::default(),
            },
        })
        .collect();

    RunEvent {
        event_type: Some(EventType::Complete.to_string()),
        event_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        producer: Some(PRODUCER.to_owned()),
        schema_url: Some(SCHEMA_URL.to_owned()),
        run: Some(Run {
            run_id: Some(uuid::Uuid::new_v4().to_string()),
            facets: Default::default(),
        }),
        job: Some(Job {
            namespace: Some(JOB_NAMESPACE.to_owned()),
            name: Some(job_name.to_owned()),
            facets: Default::default(),
        }),
        inputs,
        outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::{EventType, RunEvent, build_run_event, validate_event};
    use crate::dialect::Dialect;
    use crate::lineage::parse_sql_lineage;

    #[test]
    fn test_validation_lists_every_problem() {
        let event: RunEvent = serde_json::from_str(r#"{"eventType": "DONE", "job": {}}"#).unwrap();
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err.problems.len(), 6);
        assert!(err.problems[0].contains("DONE"));
        assert!(err.to_string().contains("Missing required field: run.runId"));
    }

    #[test]
    fn test_valid_event_without_column_lineage() {
        let event: RunEvent = serde_json::from_str(
            r#"{
                "eventType": "START",
                "eventTime": "2024-01-15T10:00:00Z",
                "producer": "https://airflow.example.com",
                "run": {"runId": "r1"},
                "job": {"namespace": "airflow", "name": "etl"},
                "outputs": [{"namespace": "s3://bucket", "name": "out", "facets": {"schema": {}}}]
            }"#,
        )
        .unwrap();
        let header = validate_event(&event).unwrap();
        assert_eq!(header.event_type, EventType::Start);
        assert_eq!(header.job_name, "etl");
        assert!(!event.has_column_lineage());
        assert!(event.outputs[0].facets.other.contains_key("schema"));
    }

    #[test]
    fn test_build_run_event_mirrors_lineage() {
        let result = parse_sql_lineage(
            "INSERT INTO totals SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY 1",
            Dialect::Redshift,
            None,
        );
        let event = build_run_event("daily_totals", "redshift://analytics", &result);
        assert!(validate_event(&event).is_ok());
        assert_eq!(event.inputs.len(), 1);
        assert_eq!(event.outputs[0].name, "totals");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "COMPLETE");
        assert_eq!(json["schemaURL"], super::SCHEMA_URL);
        assert_eq!(json["job"]["namespace"], "data-foundations");
        let total = &json["outputs"][0]["facets"]["columnLineage"]["fields"]["total"];
        assert_eq!(total["inputFields"][0]["name"], "orders");
        assert_eq!(total["inputFields"][0]["field"], "amount");
        assert_eq!(
            total["inputFields"][0]["transformations"][0]["subtype"],
            "AGGREGATION"
        );
    }
}
