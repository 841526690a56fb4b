use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use serde_json::{Map, Value};
use suprsend::{ClientConfig, Event, Suprsend, UserEdit, WorkflowTriggerRequest, telemetry};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Workflows,
    Events,
    Users,
}

/// Send a JSON array of records through one bulk endpoint and print the aggregated response.
#[derive(Parser, Debug)]
#[command(name = "suprsend", version, about)]
struct Args {
    /// Path to a YAML configuration file. `SUPRSEND_*` environment variables override it.
    #[arg(short = 'f', long, env = "SUPRSEND_CONFIG")]
    config: Option<PathBuf>,

    /// Record family
    #[arg(short, long, value_enum)]
    kind: Kind,

    /// JSON file holding an array of records
    #[arg(short, long)]
    records: PathBuf,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Validate configuration and records, then exit without sending.
    #[arg(long)]
    validate: bool,
}

/// One user edit as written in the records file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserRecord {
    distinct_id: String,
    #[serde(default)]
    set: Map<String, Value>,
    #[serde(default)]
    set_once: Map<String, Value>,
    #[serde(default)]
    increment: Map<String, Value>,
    #[serde(default)]
    append: Map<String, Value>,
    #[serde(default)]
    remove: Map<String, Value>,
    #[serde(default)]
    unset: Vec<String>,
}

impl From<UserRecord> for UserEdit {
    fn from(record: UserRecord) -> Self {
        let mut user = UserEdit::new(record.distinct_id);
        if !record.set.is_empty() {
            user.set_all(record.set);
        }
        if !record.set_once.is_empty() {
            user.set_once_all(record.set_once);
        }
        if !record.increment.is_empty() {
            user.increment_all(record.increment);
        }
        if !record.append.is_empty() {
            user.append_all(record.append);
        }
        if !record.remove.is_empty() {
            user.remove_all(record.remove);
        }
        if !record.unset.is_empty() {
            user.unset(record.unset);
        }
        user
    }
}

fn parse<T: for<'de> Deserialize<'de>>(records: Vec<Value>) -> anyhow::Result<Vec<T>> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| serde_json::from_value(record).with_context(|| format!("record {i} is malformed")))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    config.debug |= args.debug;

    let raw = std::fs::read_to_string(&args.records).with_context(|| format!("failed to read {}", args.records.display()))?;
    let records: Vec<Value> = serde_json::from_str(&raw).context("records file must hold a JSON array")?;

    if args.validate {
        println!("Configuration is valid, {} records read.", records.len());
        return Ok(());
    }

    telemetry::init_telemetry(config.debug)?;
    tracing::debug!("{:?}", args);

    let client = Suprsend::from_config(config)?;
    client.schemas().preload()?;

    let response = match args.kind {
        Kind::Workflows => {
            let mut bulk = client.bulk_workflows();
            bulk.append(records.into_iter().map(WorkflowTriggerRequest::from))?;
            bulk.trigger().await?
        }
        Kind::Events => {
            let mut bulk = client.bulk_events();
            bulk.append(parse::<Event>(records)?)?;
            bulk.trigger().await?
        }
        Kind::Users => {
            let mut bulk = client.bulk_users();
            bulk.append(parse::<UserRecord>(records)?.into_iter().map(UserEdit::from))?;
            bulk.save().await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
