use clap::{Parser, Subcommand};
use pressdb::db::{DatabaseAdapter, SqliteAdapter};
use pressdb::dump::package_dump;
use pressdb::schema::parse_manifest;
use pressdb::Pipeline;
use std::path::{Path, PathBuf};
use std::process;

/// PressDB CLI — compile content collections into a queryable SQL artifact
#[derive(Parser)]
#[command(name = "pressdb", version, about)]
struct Cli {
    /// Path to the content manifest
    #[arg(long, default_value = "content.yaml")]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the packaged dump artifact and print the integrity version
    Build {
        /// Where to write the artifact (defaults next to the dev database)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the plain statement list instead of the packaged artifact
        #[arg(long)]
        plain: bool,
    },

    /// Watch collection sources and keep the dev database in sync
    Watch,

    /// Show resolved collections and their key counts
    Status,

    /// Run a SQL query against the dev database
    Query {
        /// The SQL to execute
        sql: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = parse_manifest(&cli.manifest)?;
    let dev = manifest.dev.clone();
    let data_dir = if dev.data_dir.is_absolute() {
        dev.data_dir.clone()
    } else {
        manifest.root.join(&dev.data_dir)
    };

    match cli.command {
        Command::Build { out, plain } => {
            let pipeline = Pipeline::new(manifest).await?;
            let version = pipeline.integrity_version().to_string();

            let (path, contents) = if plain {
                let statements = pipeline.generate_dump().await?;
                let path = out.unwrap_or_else(|| data_dir.join("dump.sql"));
                (path, statements.join("\n") + "\n")
            } else {
                let statements = pipeline.generate_dump().await?;
                let artifact = package_dump(&statements)?;
                let path = out.unwrap_or_else(|| data_dir.join("dump.txt"));
                (path, artifact)
            };

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
            println!("Wrote {}", path.display());
            println!("Integrity version: {version}");
        }

        Command::Watch => {
            let pipeline = Pipeline::new(manifest).await?;
            let database = data_dir.join(&dev.database_name);
            println!("Live database: {}", database.display());
            pipeline.watch(&database).await?;
        }

        Command::Status => {
            let pipeline = Pipeline::new(manifest).await?;
            println!("Integrity version: {}", pipeline.integrity_version());
            for collection in pipeline.collections() {
                let keys = pipeline.storage().get_keys(&collection.name).await?;
                println!(
                    "  {:<24} {:<28} {} keys",
                    collection.name,
                    collection.table_name,
                    keys.len()
                );
            }
        }

        Command::Query { sql } => {
            let database = data_dir.join(&dev.database_name);
            if !database.exists() {
                return Err(format!(
                    "Dev database not found at {} (run `pressdb watch` or `pressdb build` first)",
                    database.display()
                )
                .into());
            }
            let adapter = SqliteAdapter::open(Path::new(&database))?;
            let rows = adapter.all(&sql, &[])?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
