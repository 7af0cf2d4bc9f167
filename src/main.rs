use anyhow::{Context, Result, anyhow};
use catalog_revisions::prelude::*;
use catalog_revisions::{Activity, HistoryRow, ObjectRef};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "catalog-revisions")]
#[command(about = "Revision history and activity streams for versioned catalog entities")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a scripted create/edit/delete scenario and prints what it recorded
    Demo {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Author of the scenario's revisions
        #[arg(long, default_value = "demo")]
        author: String,
        /// Engine config as JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone)]
struct Package {
    id: String,
    name: String,
    title: String,
    state: State,
}

impl Stateful for Package {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for Package {
    const TABLE: &'static str = "package";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("name", DataType::Text).not_null(),
            Column::new("title", DataType::Text),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.title.clone().into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> catalog_revisions::Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 4)?;
        Ok(Self {
            id: reader.text(0)?,
            name: reader.text(1)?,
            title: reader.opt_text(2)?.unwrap_or_default(),
            state: reader.state(3)?,
        })
    }
}

impl AggregateRoot for Package {}

#[derive(Debug, Clone)]
struct PackageTag {
    id: String,
    package_id: String,
    tag: String,
    state: State,
}

impl Stateful for PackageTag {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for PackageTag {
    const TABLE: &'static str = "package_tag";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("package_id", DataType::Text).not_null(),
            Column::new("tag", DataType::Text).not_null(),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.package_id.clone().into(),
            self.tag.clone().into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> catalog_revisions::Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 4)?;
        Ok(Self {
            id: reader.text(0)?,
            package_id: reader.text(1)?,
            tag: reader.text(2)?,
            state: reader.state(3)?,
        })
    }
}

impl AggregateMember for PackageTag {
    type Root = Package;

    fn root_id(&self) -> Option<String> {
        Some(self.package_id.clone())
    }
}

#[derive(Serialize)]
struct DemoReport {
    lineage: Vec<(ObjectRef, Vec<HistoryRow>)>,
    activities: Vec<Activity>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Demo {
            format,
            author,
            config,
        } => {
            let config = load_config(config)?;
            let report = run_demo(config, &author).await?;
            print_report(&report, format)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    EngineConfig::from_json_str(&json).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

async fn run_demo(config: EngineConfig, author: &str) -> Result<DemoReport> {
    let schema = VersionedSchema::builder()
        .root::<Package>()
        .member::<PackageTag>()
        .build()?;
    let db = Database::open(schema, config)?;

    let mut package = Package {
        id: "census-2020".into(),
        name: "census-2020".into(),
        title: "Census 2020".into(),
        state: State::Active,
    };

    let mut txn = db.begin();
    txn.set_revision_info(RevisionInfo::new().author(author).message("create census"))?;
    txn.insert_entity(&package).await?;
    for (id, tag) in [("t-geo", "geography"), ("t-pop", "population")] {
        txn.insert_entity(&PackageTag {
            id: id.into(),
            package_id: package.id.clone(),
            tag: tag.into(),
            state: State::Active,
        })
        .await?;
    }
    txn.commit().await?;

    let mut txn = db.begin();
    txn.set_revision_info(RevisionInfo::new().author(author).message("retitle"))?;
    package.title = "Population and Housing Census 2020".into();
    txn.save_entity(&package).await?;
    txn.soft_delete(PackageTag::TABLE, "t-geo").await?;
    txn.commit().await?;

    let mut txn = db.begin();
    txn.set_revision_info(RevisionInfo::new().author(author).message("withdraw"))?;
    package.delete();
    txn.save_entity(&package).await?;
    txn.commit().await?;

    let mut lineage = Vec::new();
    for object in [
        ObjectRef::new(Package::TABLE, "census-2020"),
        ObjectRef::new(PackageTag::TABLE, "t-geo"),
        ObjectRef::new(PackageTag::TABLE, "t-pop"),
    ] {
        let rows = db.lineage(&object.table, &object.id).await?;
        lineage.push((object, rows));
    }

    Ok(DemoReport {
        lineage,
        activities: db.activities().await?,
    })
}

fn print_report(report: &DemoReport, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        Format::Text => {
            println!("Lineage");
            for (object, rows) in &report.lineage {
                println!("  {}", object);
                for row in rows {
                    let cells: Vec<String> = row.live.iter().map(|v| v.to_string()).collect();
                    println!(
                        "    {} rev={} [{}]{}",
                        row.revision_timestamp.format("%H:%M:%S%.6f"),
                        row.revision_id,
                        cells.join(", "),
                        if row.is_unexpired() { " (current)" } else { "" }
                    );
                }
            }
            println!("Activity");
            for activity in &report.activities {
                println!(
                    "  {} {} {} by {}",
                    activity.timestamp.format("%H:%M:%S%.6f"),
                    activity.activity_type,
                    activity.object_id,
                    activity.user_id
                );
            }
        }
    }
    Ok(())
}
