use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};
use tracing::info;

use tandem_accessor::{Accessor, InMemoryAccessor};
use tandem_aggregate::{Aggregate, Aggregator, TopologyConfig};
use tandem_types::{AccessMode, AccessResult, QuerySpec, RedundancyMode};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => cmd_plan(args, cli.format, cli.verbose),
        Command::Check(args) => cmd_check(args, cli.format),
    }
}

/// A topology file built over in-memory stores.
struct Topology {
    requested: AccessMode,
    aggregates: Vec<Aggregate>,
    offline: Vec<String>,
}

impl Topology {
    fn is_offline(&self, name: &str) -> bool {
        self.offline.iter().any(|n| n == name)
    }
}

fn open_topology(path: &Path, mode: Option<AccessMode>) -> anyhow::Result<Topology> {
    let config = TopologyConfig::load(path)
        .with_context(|| format!("loading topology {}", path.display()))?;
    let requested = mode.unwrap_or(config.requested_mode);
    let descriptors = config.describe_all(|entry| {
        let store = InMemoryAccessor::new(entry.name.clone());
        store.set_available(!entry.offline);
        let accessor: Arc<dyn Accessor> = Arc::new(store);
        accessor
    });
    let offline = config
        .accessors
        .iter()
        .filter(|a| a.offline)
        .map(|a| a.name.clone())
        .collect();
    let aggregates = Aggregator::default().aggregate_groups(&descriptors, requested)?;
    info!(
        accessors = descriptors.len(),
        groups = aggregates.len(),
        requested = %requested,
        "topology built"
    );
    Ok(Topology {
        requested,
        aggregates,
        offline,
    })
}

fn mode_label(mode: RedundancyMode) -> colored::ColoredString {
    match mode {
        RedundancyMode::None => "direct".dimmed(),
        RedundancyMode::Compositing => "compositing".magenta(),
        RedundancyMode::Mirroring => "mirroring".cyan(),
        RedundancyMode::Striping => "striping".blue(),
    }
}

fn group_label(aggregate: &Aggregate) -> String {
    if aggregate.partition().is_empty() {
        aggregate.group().to_string()
    } else {
        format!("{}/{}", aggregate.group(), aggregate.partition())
    }
}

fn plan_json(topology: &Topology) -> Value {
    let groups: Vec<Value> = topology
        .aggregates
        .iter()
        .map(|agg| {
            let members: Vec<Value> = agg
                .members()
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name(),
                        "mode": m.access_mode().to_string(),
                        "priority": m.priority(),
                        "online": !topology.is_offline(m.name()),
                    })
                })
                .collect();
            json!({
                "group": agg.group(),
                "partition": agg.partition(),
                "policy": agg.mode().to_string(),
                "accessor": agg.accessor().name(),
                "members": members,
            })
        })
        .collect();
    json!({
        "requested_mode": topology.requested.to_string(),
        "groups": groups,
    })
}

fn cmd_plan(args: PlanArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let topology = open_topology(&args.file, args.mode)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&topology))?);
        return Ok(());
    }

    println!("Requested mode: {}", topology.requested.to_string().yellow());
    if topology.aggregates.is_empty() {
        println!("\nNo group resolves for this mode.");
        return Ok(());
    }
    for agg in &topology.aggregates {
        println!(
            "\n{}  {}  {}",
            group_label(agg).bold(),
            mode_label(agg.mode()),
            agg.accessor().name().dimmed()
        );
        for member in agg.members() {
            let marker = if topology.is_offline(member.name()) {
                "✗".red()
            } else {
                "✓".green()
            };
            if verbose {
                println!(
                    "  {} {}  {}  priority {}",
                    marker,
                    member.name(),
                    member.access_mode(),
                    member.priority()
                );
            } else {
                println!("  {} {}", marker, member.name());
            }
        }
    }
    Ok(())
}

/// Outcome of exercising one aggregate.
struct CheckReport {
    group: String,
    accessor: String,
    mode: RedundancyMode,
    created: AccessResult<bool>,
    count: AccessResult<usize>,
}

impl CheckReport {
    fn is_healthy(&self) -> bool {
        matches!(self.created, Ok(true)) && self.count.is_ok()
    }
}

async fn check(aggregate: &Aggregate, entity: &str) -> CheckReport {
    let accessor = aggregate.accessor();
    let created = accessor.try_create_database_async(None).await;
    let spec = QuerySpec::for_type(entity).page(0, 1);
    let count = accessor
        .find_paging_list_async(&spec, None)
        .await
        .map(|page| page.total_count);
    CheckReport {
        group: group_label(aggregate),
        accessor: accessor.name().to_string(),
        mode: aggregate.mode(),
        created,
        count,
    }
}

fn check_all(topology: &Topology, entity: &str) -> anyhow::Result<Vec<CheckReport>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(async {
        let mut reports = Vec::with_capacity(topology.aggregates.len());
        for aggregate in &topology.aggregates {
            reports.push(check(aggregate, entity).await);
        }
        reports
    }))
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let topology = open_topology(&args.file, args.mode)?;
    let reports = check_all(&topology, &args.entity)?;

    if format == OutputFormat::Json {
        let groups: Vec<Value> = reports
            .iter()
            .map(|r| {
                json!({
                    "group": r.group,
                    "accessor": r.accessor,
                    "policy": r.mode.to_string(),
                    "created": r.created.as_ref().ok(),
                    "count": r.count.as_ref().ok(),
                    "error": r
                        .created
                        .as_ref()
                        .err()
                        .or(r.count.as_ref().err())
                        .map(ToString::to_string),
                    "healthy": r.is_healthy(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "groups": groups }))?);
        return Ok(());
    }

    for report in &reports {
        let marker = if report.is_healthy() {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!(
            "{} {}  {}  {}",
            marker,
            report.group.bold(),
            mode_label(report.mode),
            report.accessor.dimmed()
        );
        match &report.created {
            Ok(true) => println!("  database: {}", "ready".green()),
            Ok(false) => println!("  database: {}", "not created".yellow()),
            Err(e) => println!("  database: {}", e.to_string().red()),
        }
        match &report.count {
            Ok(n) => println!("  {}: {} rows", args.entity, n.to_string().bold()),
            Err(e) => println!("  {}: {}", args.entity, e.to_string().red()),
        }
    }
    let unhealthy = reports.iter().filter(|r| !r.is_healthy()).count();
    if unhealthy > 0 {
        anyhow::bail!("{unhealthy} of {} groups failed the check", reports.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::AccessError;

    const TOPOLOGY: &str = r#"
[[accessors]]
name = "orders-a"
group = "orders"
redundancy = "mirroring"
priority = 1.0

[[accessors]]
name = "orders-b"
group = "orders"
redundancy = "mirroring"
priority = 2.0
offline = true

[[accessors]]
name = "events-1"
group = "events"
redundancy = "striping"
priority = 1.0

[[accessors]]
name = "events-2"
group = "events"
redundancy = "striping"
priority = 2.0

[[accessors]]
name = "audit"
group = "audit"
mode = "read"
"#;

    fn topology(mode: Option<AccessMode>) -> Topology {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, TOPOLOGY).unwrap();
        open_topology(&path, mode).unwrap()
    }

    #[test]
    fn plan_resolves_every_group() {
        let t = topology(None);
        let names: Vec<&str> = t.aggregates.iter().map(|a| a.accessor().name()).collect();
        assert_eq!(
            names,
            vec!["mirroring[orders-a,orders-b]", "striping[events-1,events-2]", "audit"]
        );
        assert!(t.is_offline("orders-b"));

        let plan = plan_json(&t);
        assert_eq!(plan["requested_mode"], "read_write");
        assert_eq!(plan["groups"][0]["members"][1]["online"], false);
        assert_eq!(plan["groups"][2]["policy"], "none");
    }

    #[test]
    fn mode_override_replaces_requested_mode() {
        let t = topology(Some(AccessMode::WRITE));
        // audit is a lone candidate, so it bypasses filtering.
        assert_eq!(t.aggregates.len(), 3);
        assert_eq!(t.requested, AccessMode::WRITE);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = open_topology(Path::new("/nonexistent/topology.toml"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("loading topology"));
    }

    #[test]
    fn check_flags_the_degraded_mirror() {
        let t = topology(None);
        let reports = check_all(&t, "order").unwrap();

        let orders = &reports[0];
        assert!(matches!(
            orders.created,
            Err(AccessError::StoreUnavailable { .. })
        ));
        // reads fail over to the healthy mirror
        assert_eq!(orders.count, Ok(0));
        assert!(!orders.is_healthy());

        assert!(reports[1].is_healthy());
        assert!(reports[2].is_healthy());
    }
}
