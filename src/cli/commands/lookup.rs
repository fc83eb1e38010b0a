//! Implementation of the `entity-graph lookup` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::open_graph;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, RecordRef, Value};

#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Graph spec file (YAML)
    #[arg(short, long)]
    pub spec: PathBuf,

    /// Entity to search
    #[arg(short, long)]
    pub entity: String,

    /// Identifier field declared in the entity's id_maps
    #[arg(short, long)]
    pub field: String,

    /// Identifier value
    #[arg(short, long)]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct LookupOutput {
    pub entity: String,
    pub field: String,
    pub value: String,
    pub found: bool,
    pub record: Option<serde_json::Value>,
    #[serde(skip)]
    table: Option<String>,
}

impl LookupOutput {
    fn new(args: &LookupArgs, record: Option<&RecordRef>) -> Self {
        Self {
            entity: args.entity.clone(),
            field: args.field.clone(),
            value: args.value.clone(),
            found: record.is_some(),
            record: record.map(|r| r.to_json()),
            table: record.map(|r| TableFormatter::new().format_record(r)),
        }
    }
}

impl CommandOutput for LookupOutput {
    fn to_human(&self) -> String {
        match &self.table {
            Some(table) => format!(
                "{} with {} = {}:\n{table}",
                self.entity, self.field, self.value
            ),
            None => format!(
                "No {} found with {} = {}",
                self.entity, self.field, self.value
            ),
        }
    }
}

pub async fn execute(args: LookupArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut options = config.graph.clone();
    options.refresh_interval_ms = None;
    let graph = open_graph(&args.spec, config, options).await?;

    let Some(entity_spec) = graph.spec().get(&args.entity) else {
        anyhow::bail!("Entity '{}' is not declared in {}", args.entity, args.spec.display());
    };
    if !entity_spec.id_maps.contains(&args.field) {
        anyhow::bail!(
            "{}.{} is not an id map field (declared: [{}])",
            args.entity,
            args.field,
            entity_spec.id_maps.join(", ")
        );
    }

    let initialized = graph.initialize().await.context("Failed to load graph");
    let result = initialized.map(|_| {
        let record = graph.get_by_identifier(
            &args.entity,
            &args.field,
            Value::from(args.value.as_str()),
        );
        LookupOutput::new(&args, record.as_ref())
    });
    graph.teardown().await;

    output(&result?, json_mode);
    Ok(())
}
