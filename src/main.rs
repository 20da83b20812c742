mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_core::UserId;

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("failed to load config {:?}", path))?;
    config.apply_env();
    Ok(config)
}

fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting reelforge {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(rf_server::start(config))?;
    Ok(())
}

fn run_sweep(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(rf_server::sweep_once(config))?;

    println!("Republished directories: {}", report.republished);
    println!("Completed videos:        {}", report.completed);
    println!("Re-queued uploads:       {}", report.requeued);
    println!("Segment dirs removed:    {}", report.segments_removed);
    println!("Thumbnail dirs removed:  {}", report.thumbnails_removed);
    println!("Deleted videos purged:   {}", report.purged);
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Uploads will fail to process until they are installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::from_file(p).with_context(|| format!("invalid config {:?}", p))?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Storage root: {}", config.storage.root.display());
    println!("  Auth enabled: {}", config.auth.enabled);
    println!(
        "  Upload limit: {} bytes (explicit last chunk: {})",
        config.upload.max_file_size, config.upload.require_last_chunk
    );
    println!(
        "  Pipeline: {} worker(s), queue of {}",
        config.pipeline.workers, config.pipeline.queue_capacity
    );
    println!("  Remote: {} (bucket {:?})", config.remote.endpoint, config.remote.bucket_id);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in warnings {
            println!("  - {w}");
        }
    }

    Ok(())
}

fn issue_token(user: &str, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let secret = config
        .auth
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("auth.secret is not set (config file or REELFORGE_AUTH_SECRET)")?;
    let user = UserId::parse(user)?;
    println!("{}", rf_server::middleware::auth::issue_token(secret, &user)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the defaults.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=debug,rf_server=debug,rf_store=debug,rf_av=debug,rf_db=debug,rf_core=debug,tower_http=debug".to_string()
        } else {
            "reelforge=info,rf_server=info,rf_store=info,rf_av=info,rf_db=info,rf_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => start_server(host, port, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Sweep => run_sweep(cli.config.as_deref()),
        Commands::IssueToken { user } => issue_token(&user, cli.config.as_deref()),
        Commands::Version => {
            println!("reelforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
