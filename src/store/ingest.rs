//! Merging parsed lineage and OpenLineage events into the graph.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{LineageStore, NewEdge, NodeKey, NodeOutcome, NodeUpsert, Result, StoreError};
use crate::lineage::{
    SqlLineageResult, TransformationSubtype, TransformationType, UNKNOWN, WILDCARD,
};
use crate::openlineage::{FieldLineage, RunEvent, validate_event};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCounts {
    pub sql_hash: String,
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub duplicates_skipped: usize,
}

impl IngestionCounts {
    fn record_node(&mut self, outcome: &NodeOutcome) {
        if outcome.created {
            self.nodes_created += 1;
        } else {
            self.nodes_updated += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIngestionCounts {
    pub run_id: String,
    pub event_type: String,
    pub datasets_created: usize,
    pub columns_created: usize,
    pub edges_created: usize,
    pub duplicates_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlProcessedStatus {
    pub sql_hash: String,
    pub processed: bool,
    pub edge_count: usize,
}

fn is_resolved(table: &str, column: &str) -> bool {
    !table.is_empty()
        && table != UNKNOWN
        && table != WILDCARD
        && !column.is_empty()
        && column != WILDCARD
}

/// Stores the datasets, columns and edges described by `result`.
///
/// Every node lives in `namespace`. Source columns that could not be bound to a table
/// (`unknown` or `*`) are skipped, and without a target table no column edges exist.
/// Edges carry the statement hash, so ingesting the same result twice only reports duplicates.
pub fn ingest_lineage_result<S: LineageStore + ?Sized>(
    store: &S,
    result: &SqlLineageResult,
    namespace: &str,
    job_id: Option<&str>,
) -> Result<IngestionCounts> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidInput("namespace cannot be empty".to_owned()));
    }
    let mut counts = IngestionCounts {
        sql_hash: result.sql_hash.clone(),
        ..Default::default()
    };
    let mut dataset_ids: HashMap<&str, String> = HashMap::new();
    let mut column_ids: HashMap<(String, String), String> = HashMap::new();

    for table in &result.source_tables {
        let outcome = store.upsert_node(&NodeUpsert::new(NodeKey::dataset(namespace, table)))?;
        counts.record_node(&outcome);
        dataset_ids.insert(table, outcome.node_id);
    }

    let Some(target_table) = &result.target_table else {
        log::info!(
            "Ingested {} without target table: {} datasets",
            result.sql_hash,
            counts.nodes_created + counts.nodes_updated
        );
        return Ok(counts);
    };
    let target = store.upsert_node(&NodeUpsert::new(NodeKey::dataset(namespace, target_table)))?;
    counts.record_node(&target);
    let target_dataset_id = target.node_id;
    dataset_ids.insert(target_table, target_dataset_id.clone());

    for column_lineage in &result.column_lineages {
        if column_lineage.column.is_empty() {
            continue;
        }
        let target_column = store.upsert_node(&NodeUpsert::new(NodeKey::column(
            namespace,
            &column_lineage.column,
            &target_dataset_id,
        )))?;
        counts.record_node(&target_column);

        for source in &column_lineage.source_columns {
            if !is_resolved(&source.table, &source.column) {
                log::debug!(
                    "Skipping unresolved source {}.{} of {}",
                    source.table,
                    source.column,
                    column_lineage.column
                );
                continue;
            }
            let dataset_id = match dataset_ids.get(source.table.as_str()) {
                Some(id) => id.clone(),
                None => {
                    let outcome = store
                        .upsert_node(&NodeUpsert::new(NodeKey::dataset(namespace, &source.table)))?;
                    counts.record_node(&outcome);
                    dataset_ids.insert(&source.table, outcome.node_id.clone());
                    outcome.node_id
                }
            };
            let column_key = (source.table.clone(), source.column.clone());
            let source_column_id = match column_ids.get(&column_key) {
                Some(id) => id.clone(),
                None => {
                    let outcome = store.upsert_node(&NodeUpsert::new(NodeKey::column(
                        namespace,
                        &source.column,
                        &dataset_id,
                    )))?;
                    counts.record_node(&outcome);
                    column_ids.insert(column_key, outcome.node_id.clone());
                    outcome.node_id
                }
            };

            let edge = NewEdge {
                transformation_type: source.transformation_type,
                description: Some(source.description.clone()),
                job_id: job_id.map(str::to_owned),
                sql_hash: Some(result.sql_hash.clone()),
                ..NewEdge::new(
                    &source_column_id,
                    &target_column.node_id,
                    source.transformation_subtype,
                )
            };
            let outcome = store.create_edge(&edge)?;
            if outcome.created {
                log::debug!(
                    "Edge {}.{} -> {}.{} ({})",
                    source.table,
                    source.column,
                    target_table,
                    column_lineage.column,
                    source.transformation_subtype
                );
                counts.edges_created += 1;
            } else if outcome.duplicate {
                counts.duplicates_skipped += 1;
            }
        }
    }

    log::info!(
        "Ingested {}: {} nodes created, {} updated, {} edges created, {} duplicates skipped",
        result.sql_hash,
        counts.nodes_created,
        counts.nodes_updated,
        counts.edges_created,
        counts.duplicates_skipped
    );
    Ok(counts)
}

/// Transformation of one output field: the first `transformations[]` entry (field level, else
/// of the first input field that has one), with the type overridden by `transformationType`.
fn field_transformation(
    field_name: &str,
    field: &FieldLineage,
) -> (TransformationType, TransformationSubtype, Option<String>) {
    let first = field.transformations.first().or_else(|| {
        field
            .input_fields
            .iter()
            .find_map(|input| input.transformations.first())
    });
    let subtype = match first.and_then(|t| t.subtype.as_deref()) {
        Some(value) => value.parse::<TransformationSubtype>().unwrap_or_else(|_| {
            log::warn!(
                "Unknown transformation subtype `{}` on field `{}`, using TRANSFORMATION.",
                value,
                field_name
            );
            TransformationSubtype::Transformation
        }),
        None => TransformationSubtype::Transformation,
    };
    let r#type = field
        .transformation_type
        .as_deref()
        .or_else(|| first.and_then(|t| t.r#type.as_deref()));
    let transformation_type = match r#type {
        Some(value) => value.parse::<TransformationType>().unwrap_or_else(|_| {
            log::warn!(
                "Unknown transformation type `{}` on field `{}`.",
                value,
                field_name
            );
            subtype.transformation_type()
        }),
        None => subtype.transformation_type(),
    };
    let description = first
        .and_then(|t| t.description.clone())
        .or_else(|| field.transformation_description.clone());
    (transformation_type, subtype, description)
}

/// Stores the column lineage facets of an OpenLineage event.
///
/// Events carry no statement hash, so edges deduplicate on their endpoints alone.
pub fn ingest_openlineage_event<S: LineageStore + ?Sized>(
    store: &S,
    event: &RunEvent,
) -> anyhow::Result<EventIngestionCounts> {
    let header = validate_event(event)?;
    let mut counts = EventIngestionCounts {
        run_id: header.run_id.clone(),
        event_type: header.event_type.to_string(),
        ..Default::default()
    };

    let job = store.upsert_node(
        &NodeUpsert::new(NodeKey::job(&header.job_namespace, &header.job_name)).with_metadata(
            serde_json::json!({"run_id": header.run_id, "producer": header.producer}),
        ),
    )?;

    for output in &event.outputs {
        let Some(facet) = output
            .facets
            .column_lineage
            .as_ref()
            .filter(|facet| !facet.fields.is_empty())
        else {
            continue;
        };
        let output_dataset =
            store.upsert_node(&NodeUpsert::new(NodeKey::dataset(&output.namespace, &output.name)))?;
        if output_dataset.created {
            counts.datasets_created += 1;
        }
        let mut input_ids: HashMap<(String, String), String> = HashMap::new();

        for (field_name, field) in &facet.fields {
            let output_column = store.upsert_node(&NodeUpsert::new(NodeKey::column(
                &output.namespace,
                field_name,
                &output_dataset.node_id,
            )))?;
            if output_column.created {
                counts.columns_created += 1;
            }
            let (transformation_type, transformation_subtype, description) =
                field_transformation(field_name, field);

            for input in &field.input_fields {
                let dataset_key = (input.namespace.clone(), input.name.clone());
                let dataset_id = match input_ids.get(&dataset_key) {
                    Some(id) => id.clone(),
                    None => {
                        let outcome = store.upsert_node(&NodeUpsert::new(NodeKey::dataset(
                            &input.namespace,
                            &input.name,
                        )))?;
                        if outcome.created {
                            counts.datasets_created += 1;
                        }
                        input_ids.insert(dataset_key, outcome.node_id.clone());
                        outcome.node_id
                    }
                };
                let input_column = store.upsert_node(&NodeUpsert::new(NodeKey::column(
                    &input.namespace,
                    &input.field,
                    &dataset_id,
                )))?;
                if input_column.created {
                    counts.columns_created += 1;
                }

                let edge = NewEdge {
                    transformation_type,
                    description: description.clone(),
                    job_id: Some(job.node_id.clone()),
                    ..NewEdge::new(
                        &input_column.node_id,
                        &output_column.node_id,
                        transformation_subtype,
                    )
                };
                let outcome = store.create_edge(&edge)?;
                if outcome.created {
                    counts.edges_created += 1;
                } else if outcome.duplicate {
                    counts.duplicates_skipped += 1;
                }
            }
        }
    }

    log::info!(
        "Ingested {} event of run {}: {} datasets, {} columns, {} edges created",
        counts.event_type,
        counts.run_id,
        counts.datasets_created,
        counts.columns_created,
        counts.edges_created
    );
    Ok(counts)
}

/// Whether edges from the statement with hash `sql_hash` are already stored.
pub fn check_sql_processed<S: LineageStore + ?Sized>(
    store: &S,
    sql_hash: &str,
) -> Result<SqlProcessedStatus> {
    let edge_count = store.count_edges_with_sql_hash(sql_hash)?;
    Ok(SqlProcessedStatus {
        sql_hash: sql_hash.to_owned(),
        processed: edge_count > 0,
        edge_count,
    })
}

#[cfg(test)]
mod tests {
    use super::field_transformation;
    use crate::lineage::{TransformationSubtype, TransformationType};
    use crate::openlineage::FieldLineage;

    fn field(json: &str) -> FieldLineage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_field_transformation_defaults() {
        let (t, s, d) = field_transformation(
            "f",
            &field(r#"{"inputFields": [{"namespace": "n", "name": "t", "field": "c"}]}"#),
        );
        assert_eq!(t, TransformationType::Direct);
        assert_eq!(s, TransformationSubtype::Transformation);
        assert_eq!(d, None);
    }

    #[test]
    fn test_field_transformation_overrides() {
        let (t, s, d) = field_transformation(
            "f",
            &field(
                r#"{
                    "inputFields": [{"namespace": "n", "name": "t", "field": "c",
                        "transformations": [{"type": "INDIRECT", "subtype": "FILTER", "description": "where"}]}],
                    "transformationType": "DIRECT"
                }"#,
            ),
        );
        assert_eq!(t, TransformationType::Direct);
        assert_eq!(s, TransformationSubtype::Filter);
        assert_eq!(d.as_deref(), Some("where"));

        let (_, s, _) = field_transformation(
            "f",
            &field(
                r#"{"inputFields": [{"namespace": "n", "name": "t", "field": "c",
                    "transformations": [{"type": "DIRECT", "subtype": "MASKED"}]}]}"#,
            ),
        );
        assert_eq!(s, TransformationSubtype::Transformation);
    }
}
