//! Class GraphQL CLI
//!
//! Compiles a project's class definitions and runs requests against an
//! in-memory store seeded from a JSON fixture.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use familiar_graphql::{generate_schema, GraphqlApi, GraphqlConfig, MemoryStorage, Project, RequestContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "class-graphql")]
#[command(about = "Compile class definitions into a GraphQL API")]
struct Cli {
    /// Config file (defaults to graphql.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a project and report its classes
    Check {
        /// Project document (JSON)
        project: Option<PathBuf>,
    },

    /// Print the SDL of a project's schema
    Sdl {
        /// Project document (JSON)
        project: Option<PathBuf>,
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a request against a seeded in-memory store
    Query {
        /// Project document (JSON)
        project: Option<PathBuf>,
        /// Store fixture (JSON)
        #[arg(short, long)]
        fixture: Option<PathBuf>,
        /// Request document, inline or a path to a .graphql file
        #[arg(short, long)]
        query: String,
        /// Variables (JSON object)
        #[arg(long)]
        variables: Option<String>,
        /// Grant the mutation capability
        #[arg(long)]
        allow_mutation: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write it to this file
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match GraphqlConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli.command, config).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: GraphqlConfig) -> anyhow::Result<()> {
    match command {
        Commands::Check { project } => {
            let project = load_project(project, &config)?;
            let compiled = generate_schema(&project)?;
            println!("✅ {} - {} classes", project.name, compiled.class_count);
            println!("   hash: {}", compiled.hash);
            Ok(())
        }

        Commands::Sdl { project, output } => {
            let project = load_project(project, &config)?;
            let sdl = generate_schema(&project)?.sdl();
            match output {
                Some(path) => {
                    std::fs::write(&path, sdl).with_context(|| format!("writing {}", path.display()))?;
                    println!("📝 Wrote {}", path.display());
                }
                None => print!("{}", sdl),
            }
            Ok(())
        }

        Commands::Query {
            project,
            fixture,
            query,
            variables,
            allow_mutation,
        } => {
            let project = load_project(project, &config)?;
            let storage = MemoryStorage::new();
            if let Some(path) = fixture.or_else(|| config.fixture_path()) {
                let fixture = read_json(&path)?;
                storage.seed(&fixture).await?;
            }

            let mut request = async_graphql::Request::new(read_query(&query)?);
            if let Some(raw) = variables {
                let variables: serde_json::Value = serde_json::from_str(&raw).context("parsing variables")?;
                request = request.variables(async_graphql::Variables::from_json(variables));
            }

            let api = if config.cache.enabled {
                GraphqlApi::new()
            } else {
                GraphqlApi::without_cache()
            };
            let context = RequestContext {
                allow_mutation: allow_mutation || config.api.allow_mutation,
            };
            let response = api.execute(&project, Arc::new(storage), request, context).await?;

            let body = if config.api.pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{}", body);
            if response.is_err() {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Config { write } => {
            match write {
                Some(path) => {
                    config.save(&path)?;
                    println!("📝 Wrote {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}

fn load_project(path: Option<PathBuf>, config: &GraphqlConfig) -> anyhow::Result<Project> {
    let path = path.unwrap_or_else(|| config.project_path());
    if !path.exists() {
        bail!("project document {} does not exist", path.display());
    }
    Project::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn read_query(query: &str) -> anyhow::Result<String> {
    let path = Path::new(query);
    if path.extension().map_or(false, |ext| ext == "graphql" || ext == "gql") {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    Ok(query.to_string())
}
