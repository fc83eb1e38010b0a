//! Implementation of the `entity-graph load` command.

use anyhow::{Context, Result};
use clap::Args;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

use super::open_graph;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::Config;
use crate::services::{EntityGraph, GraphStats, RefreshReport};

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Graph spec file (YAML)
    #[arg(short, long)]
    pub spec: PathBuf,

    /// Also print every record with its link containers
    #[arg(long)]
    pub records: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadOutput {
    pub report: RefreshReport,
    pub stats: GraphStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<IndexMap<String, Vec<serde_json::Value>>>,
}

impl CommandOutput for LoadOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "Loaded {} record(s) in {}ms",
                self.report.total_fetched(),
                self.report.duration_ms
            ),
            TableFormatter::new().format_stats(&self.stats),
        ];

        let links = &self.report.links;
        if !links.skipped.is_empty() {
            lines.push(format!(
                "{} foreign key(s) skipped ({} dangling, {} unresolvable)",
                links.skipped.len(),
                links.lookup_misses(),
                links.configuration_errors()
            ));
        }

        if let Some(records) = &self.records {
            for (entity, rows) in records {
                lines.push(format!("\n{entity}:"));
                for row in rows {
                    lines.push(format!("  {row}"));
                }
            }
        }
        lines.join("\n")
    }
}

/// Every record of every entity, ordered by composite key.
pub(crate) fn dump_records(graph: &EntityGraph) -> IndexMap<String, Vec<serde_json::Value>> {
    graph
        .spec()
        .iter()
        .map(|(entity, _)| {
            let mut table: Vec<_> = graph
                .entity_table(entity)
                .unwrap_or_default()
                .into_iter()
                .collect();
            table.sort_by(|(a, _), (b, _)| a.cmp(b));
            let rows = table.into_iter().map(|(_, record)| record.to_json()).collect();
            (entity.to_string(), rows)
        })
        .collect()
}

pub async fn execute(args: LoadArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut options = config.graph.clone();
    options.refresh_interval_ms = None;
    let graph = open_graph(&args.spec, config, options).await?;

    let load = graph.initialize().await.map(|report| LoadOutput {
        report,
        stats: graph.stats(),
        records: args.records.then(|| dump_records(&graph)),
    });
    graph.teardown().await;

    output(&load.context("Failed to load graph")?, json_mode);
    Ok(())
}
