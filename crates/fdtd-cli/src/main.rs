use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

use fdtd_core::{Fingerprint, MonitorKind, ResultSet, Side, SimulationParameters};
use fdtd_store::{DataLayout, Filter, ResultRecord, ResultStore};

#[derive(Parser)]
#[command(name = "fdtd", about = "Inspect and query the FDTD simulation result cache")]
struct Cli {
    /// Database name under the data directory (default from config.toml)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database statistics
    Stats,

    /// List cached records
    List {
        /// Filter on a scalar column, e.g. `polarization_angle=90`
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,

        /// Print matching ids only
        #[arg(long)]
        ids_only: bool,
    },

    /// Show one record
    Show {
        id: i64,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one record
    Delete { id: i64 },

    /// Fingerprint a TOML parameter file and look it up
    Fingerprint {
        /// Parameter file path
        path: PathBuf,
    },

    /// Export a record summary to a JSON file
    Export {
        id: i64,

        /// Output file path
        path: PathBuf,
    },

    /// Create indexes on filterable columns
    Index {
        #[arg(required = true)]
        columns: Vec<String>,
    },
}

fn open_layout(cli: &Cli) -> Result<DataLayout> {
    DataLayout::open(None, cli.database.as_deref()).context("failed to open data directory")
}

fn open_store(cli: &Cli) -> Result<ResultStore> {
    let layout = open_layout(cli)?;
    layout
        .open_store()
        .with_context(|| format!("failed to open {}", layout.db_path().display()))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Stats => cmd_stats(&cli),
        Commands::List { filters, ids_only } => cmd_list(&cli, filters, *ids_only),
        Commands::Show { id, json } => cmd_show(&cli, *id, *json),
        Commands::Delete { id } => cmd_delete(&cli, *id),
        Commands::Fingerprint { path } => cmd_fingerprint(&cli, path),
        Commands::Export { id, path } => cmd_export(&cli, *id, path),
        Commands::Index { columns } => cmd_index(&cli, columns),
    }
}

fn fetch(store: &ResultStore, id: i64) -> Result<ResultRecord> {
    match store
        .get_by_id(id)
        .with_context(|| format!("failed to load record {id}"))?
    {
        Some(record) => Ok(record),
        None => bail!("no record with id {id}"),
    }
}

/// Scalar view of a record: parameters, monitors and resonances, no arrays.
fn record_json(record: &ResultRecord) -> serde_json::Value {
    let monitors: serde_json::Map<String, serde_json::Value> = MonitorKind::ALL
        .into_iter()
        .filter(|kind| record.active_monitors.contains(*kind))
        .map(|kind| (kind.name().to_string(), monitor_json(&record.results, kind)))
        .collect();

    json!({
        "id": record.id,
        "name": record.name,
        "fingerprint": record.fingerprint.as_str(),
        "created_at": record.created_at,
        "active_monitors": record.active_monitors.to_string(),
        "comment": record.comment,
        "film_thickness": record.film_thickness,
        "parameters": record.parameters,
        "wavelengths": record.results.lambdas.as_ref().map(Vec::len),
        "monitors": monitors,
    })
}

fn monitor_json(results: &ResultSet, kind: MonitorKind) -> serde_json::Value {
    match kind {
        MonitorKind::ReflectionPower | MonitorKind::TransmissionPower => {
            let power = match kind {
                MonitorKind::ReflectionPower => results.reflection_power.as_ref(),
                _ => results.transmission_power.as_ref(),
            };
            json!({ "resonance": power.and_then(|p| p.resonance) })
        }
        MonitorKind::ReflectionProfile | MonitorKind::TransmissionProfile => {
            let profile = match kind {
                MonitorKind::ReflectionProfile => results.reflection_profile.as_ref(),
                _ => results.transmission_profile.as_ref(),
            };
            json!({
                "distance": profile.map(|p| p.distance),
                "snapshots": profile.map(|p| p.snapshots.len()),
                "resonance": profile.and_then(|p| p.resonance),
            })
        }
        MonitorKind::XzProfile | MonitorKind::YzProfile => {
            let section = match kind {
                MonitorKind::XzProfile => results.xz_profile.as_ref(),
                _ => results.yz_profile.as_ref(),
            };
            json!({
                "e_snapshots": section.map(|s| s.e_snapshots.len()),
                "p_snapshots": section.map(|s| s.p_snapshots.len()),
            })
        }
    }
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let layout = open_layout(cli)?;
    let store = layout
        .open_store()
        .with_context(|| format!("failed to open {}", layout.db_path().display()))?;

    let count = store.count().context("failed to count records")?;
    let last_id = store.last_id().context("failed to read last id")?;
    let db_size = store.db_size().context("failed to read database size")?;

    println!("database:   {}", layout.database());
    println!("records:    {count}");
    match last_id {
        Some(id) => println!("last_id:    {id}"),
        None => println!("last_id:    -"),
    }
    println!("db_size:    {:.1}KB", db_size as f64 / 1024.0);
    Ok(())
}

fn cmd_list(cli: &Cli, filters: &[String], ids_only: bool) -> Result<()> {
    let store = open_store(cli)?;
    let filters = filters
        .iter()
        .map(|f| f.parse::<Filter>().with_context(|| format!("bad filter {f:?}")))
        .collect::<Result<Vec<_>>>()?;

    if ids_only {
        for id in store.filtered_ids(&filters).context("failed to query ids")? {
            println!("{id}");
        }
        return Ok(());
    }

    let summaries = store.summaries(&filters).context("failed to query records")?;
    if summaries.is_empty() {
        println!("(no records)");
        return Ok(());
    }
    for s in summaries {
        let short = s.fingerprint.get(..12).unwrap_or(s.fingerprint.as_str());
        println!(
            "{:>5}  {short}  {:<24}  {}  [{}]",
            s.id, s.name, s.created_at, s.active_monitors
        );
    }
    Ok(())
}

fn cmd_show(cli: &Cli, id: i64, as_json: bool) -> Result<()> {
    let store = open_store(cli)?;
    let record = fetch(&store, id)?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record_json(&record))
                .context("failed to serialize record")?
        );
        return Ok(());
    }

    let p = &record.parameters;
    println!("id:           {id}");
    println!("name:         {}", record.name);
    println!("fingerprint:  {}", record.fingerprint);
    println!("created_at:   {}", record.created_at.as_deref().unwrap_or("-"));
    println!("monitors:     {}", record.active_monitors);
    println!(
        "wavelength:   {}-{} nm, {} points",
        p.wavelength.start, p.wavelength.stop, p.wavelength.points
    );
    println!(
        "source:       polarization {} deg, incidence {} deg",
        p.polarization_angle, p.incidence_angle
    );
    for (slot, structure) in p.structures.iter().enumerate() {
        if let Some(material) = &structure.material {
            println!("structure {}:  {material}", slot + 1);
        }
    }
    if !record.comment.text.is_empty() {
        println!("comment:      {}", record.comment.text);
    }
    for kind in record.active_monitors.iter() {
        let resonance = match kind {
            MonitorKind::ReflectionPower | MonitorKind::TransmissionPower => record
                .results
                .power(kind.side().unwrap_or(Side::Reflection))
                .and_then(|r| r.resonance),
            MonitorKind::ReflectionProfile | MonitorKind::TransmissionProfile => record
                .results
                .profile(kind.side().unwrap_or(Side::Reflection))
                .and_then(|r| r.resonance),
            MonitorKind::XzProfile | MonitorKind::YzProfile => None,
        };
        if let Some(r) = resonance {
            println!("  {kind}: resonance {} nm ({})", r.wavelength, r.value);
        }
    }
    Ok(())
}

fn cmd_delete(cli: &Cli, id: i64) -> Result<()> {
    let store = open_store(cli)?;
    if store
        .delete_by_id(id)
        .with_context(|| format!("failed to delete record {id}"))?
    {
        println!("deleted {id}");
    } else {
        println!("no record with id {id}");
    }
    Ok(())
}

fn cmd_fingerprint(cli: &Cli, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parameters: SimulationParameters =
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    let fingerprint = Fingerprint::of(&parameters);
    println!("{fingerprint}");

    let store = open_store(cli)?;
    match store
        .find_by_fingerprint(&fingerprint)
        .context("failed to look up fingerprint")?
    {
        Some(record) => println!(
            "cached as record {} ({})",
            record.id.unwrap_or_default(),
            record.active_monitors
        ),
        None => println!("not cached"),
    }
    Ok(())
}

fn cmd_export(cli: &Cli, id: i64, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let record = fetch(&store, id)?;

    let json = serde_json::to_string_pretty(&record_json(&record))
        .context("failed to serialize record")?;
    std::fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_index(cli: &Cli, columns: &[String]) -> Result<()> {
    let store = open_store(cli)?;
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    let names = store
        .index_columns(&columns)
        .context("failed to create indexes")?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}
