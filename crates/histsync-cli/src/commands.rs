use crate::args::{Cli, Commands};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use histsync_providers::discover;
use histsync_runtime::{Daemon, DaemonConfig, StatusSnapshot, resolve_state_path};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn run(cli: Cli) -> Result<()> {
    let state_dir = resolve_state_path(cli.state_dir.as_deref())?;
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    let config_path = DaemonConfig::config_path(&state_dir);
    let config = DaemonConfig::load_from(&config_path)?;

    match cli.command {
        Commands::Run { once } => {
            let mut daemon = Daemon::with_http_delivery(config, &state_dir)?;
            if once {
                daemon.tick(Utc::now())?;
                println!("tick complete, {} pending", daemon.queue_depth());
                return Ok(());
            }

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .context("installing signal handler")?;

            daemon.run(&shutdown)?;
            Ok(())
        }

        Commands::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            DaemonConfig::default().save_to(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }

        Commands::Status { json } => {
            let path = state_dir.join("status.json");
            let Some(status) = StatusSnapshot::read_from(&path)? else {
                bail!("no status snapshot at {} (is the daemon running?)", path.display());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }

        Commands::Sources => {
            let sources = discover(&config.effective_roots());
            if sources.is_empty() {
                println!("No sources found.");
                return Ok(());
            }
            for source in sources {
                println!(
                    "{:<28} {:<14} {}",
                    source.name,
                    source.format.name(),
                    source.path.display()
                );
            }
            Ok(())
        }
    }
}

fn print_status(status: &StatusSnapshot) {
    let stamp = |t: Option<chrono::DateTime<Utc>>| match t {
        Some(t) => t.to_rfc3339(),
        None => "never".to_string(),
    };
    println!("updated:          {}", stamp(status.updated_at));
    println!("last export:      {}", stamp(status.last_export_at));
    println!("active sessions:  {}", status.active_sessions);
    println!("pending exports:  {}", status.queue_depth);
    println!("tracked cursors:  {}", status.cursor_count);
    println!("exported total:   {}", status.exported_total);
    println!("discarded total:  {}", status.discarded_total);
    println!("errors total:     {}", status.error_total);
}
