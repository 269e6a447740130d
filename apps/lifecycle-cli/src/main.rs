use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use db_lifecycle::config::db::DATA_DIR_ENV;
use db_lifecycle::{
    ContextFactory, DataDirectory, DatabaseContext, DatabaseTarget, DbInfraError,
    DefaultContextFactory, LifecycleConfig, LifecycleVerifier, PathStyle, Provisioning,
    ProviderKind,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Embedded,
    Attached,
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    Placeholder,
    Literal,
}

#[derive(Parser)]
#[command(name = "db-lifecycle")]
#[command(about = "Create, migrate, delete and verify file-backed database stores")]
struct Args {
    /// describe | create | migrate | delete | status | verify-create | verify-migrate
    command: String,

    /// Store file name, e.g. SQLite-1.db
    file_name: String,

    /// Directory that |DataDirectory| resolves to [default: $LIFECYCLE_DATA_DIR or ./Data]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "embedded")]
    provider: Provider,

    #[arg(short, long, value_enum, default_value = "placeholder")]
    style: Style,
}

enum Command {
    Describe,
    Create,
    Migrate,
    Delete,
    Status,
    Verify(Provisioning),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("db_lifecycle=info,migration=info,sqlx=warn")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 2 } else { 0 });
        }
    };

    let command = match args.command.as_str() {
        "describe" => Command::Describe,
        "create" => Command::Create,
        "migrate" => Command::Migrate,
        "delete" => Command::Delete,
        "status" => Command::Status,
        "verify-create" => Command::Verify(Provisioning::EnsureCreated),
        "verify-migrate" => Command::Verify(Provisioning::Migrate),
        other => {
            eprintln!(
                "Unknown command: {other}. Use: describe | create | migrate | delete | status | verify-create | verify-migrate"
            );
            std::process::exit(2);
        }
    };

    let provider = match args.provider {
        Provider::Embedded => ProviderKind::EmbeddedFile,
        Provider::Attached => ProviderKind::ServerAttachedFile,
    };
    let style = match args.style {
        Style::Placeholder => PathStyle::Placeholder,
        Style::Literal => PathStyle::Literal,
    };

    let data_dir = match args.data_dir {
        Some(dir) => DataDirectory::new(dir),
        None => match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => DataDirectory::new(dir),
            None => match std::env::current_dir() {
                Ok(cwd) => DataDirectory::for_project(cwd),
                Err(e) => {
                    eprintln!("Cannot determine the current directory: {e}");
                    std::process::exit(1);
                }
            },
        },
    };

    let config = match LifecycleConfig::from_env_with_data_dir(data_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let target = match DatabaseTarget::new(provider, style, &args.file_name, &config.data_dir) {
        Ok(target) => target,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    info!(
        command = %args.command,
        provider = %target.provider(),
        connection_string = %target.connection_string(),
        "cli=start"
    );
    if let Err(e) = run(command, &target, config).await {
        error!(command = %args.command, error = %e, "cli=failed");
        eprintln!("{} failed: {e}", args.command);
        std::process::exit(1);
    }
}

async fn run(
    command: Command,
    target: &DatabaseTarget,
    config: LifecycleConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Describe => {
            println!("provider          {}", target.provider());
            println!("connection string {}", target.connection_string());
            println!("artifact          {}", target.artifact_path().display());
        }
        Command::Create => {
            let created = open(target, &config)?.ensure_created().await?;
            info!(created, "cli=create done");
            println!("created={created} path={}", target.artifact_path().display());
        }
        Command::Migrate => {
            open(target, &config)?.migrate().await?;
            println!("migrated path={}", target.artifact_path().display());
        }
        Command::Delete => {
            let deleted = open(target, &config)?.ensure_deleted().await?;
            info!(deleted, "cli=delete done");
            println!("deleted={deleted} path={}", target.artifact_path().display());
        }
        Command::Status => {
            let context = open(target, &config)?;
            let exists = context.artifact_path().exists();
            let applied = context.applied_migrations().await?;
            let expected = migration::defined_migration_names();
            println!("exists={exists} path={}", target.artifact_path().display());
            for name in &expected {
                let mark = if applied.contains(name) { "applied" } else { "pending" };
                println!("  {mark:<8} {name}");
            }
        }
        Command::Verify(provisioning) => {
            let verifier = LifecycleVerifier::new(config, DefaultContextFactory);
            let outcome = verifier.verify(target, provisioning).await?;
            info!(
                provisioning = %provisioning,
                applied = outcome.applied_migrations.len(),
                "cli=verify passed"
            );
            println!(
                "{provisioning} verified path={} absent_before={} present_after={} absent_after_teardown={} applied_migrations={}",
                outcome.artifact_path.display(),
                outcome.absent_before,
                outcome.present_after,
                outcome.absent_after_teardown,
                outcome.applied_migrations.len()
            );
        }
    }
    Ok(())
}

fn open(
    target: &DatabaseTarget,
    config: &LifecycleConfig,
) -> Result<Box<dyn DatabaseContext>, DbInfraError> {
    DefaultContextFactory.open(target.connection_string(), config)
}
