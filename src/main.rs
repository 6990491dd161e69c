use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use incidentlens::aggregate::AccountSelection;
use incidentlens::config::Config;
use incidentlens::dashboard::{DashboardRequest, DashboardView, StatusFilter};
use incidentlens::window::TimeWindow;

#[derive(Parser)]
#[command(
    name = "incidentlens",
    about = "Multi-account alert incident dashboard",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides INCIDENTLENS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard API server
    Serve {
        /// Bind address (defaults to server.bind from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print KPIs, trend delta and recommendations
    Dashboard {
        #[command(flatten)]
        select: SelectArgs,

        /// Skip the prior-period query
        #[arg(long)]
        no_compare: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the reconciled incident table
    Incidents {
        #[command(flatten)]
        select: SelectArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List the supported time windows
    Windows,
}

#[derive(Args)]
struct SelectArgs {
    /// Account label, or "all"
    #[arg(long)]
    account: Option<String>,

    /// Time window, e.g. "Last 24 Hours", "7 Days" or "7d"
    #[arg(long, default_value = "Last 24 Hours")]
    window: TimeWindow,

    /// Status filter: all, active or closed
    #[arg(long, default_value = "all")]
    status: StatusFilter,
}

impl SelectArgs {
    fn request(&self, compare: bool) -> DashboardRequest {
        DashboardRequest {
            selection: AccountSelection::from_param(self.account.as_deref()),
            window: self.window,
            status: self.status,
            compare,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            tracing::info!(%bind, "Starting incidentlens server");
            incidentlens::serve(&bind, &config).await?;
        }
        Commands::Dashboard {
            select,
            no_compare,
            json,
        } => {
            let dashboard = incidentlens::build_dashboard(&config)?;
            let view = dashboard.refresh(&select.request(!no_compare)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_summary(&view);
            }
        }
        Commands::Incidents { select, json } => {
            let dashboard = incidentlens::build_dashboard(&config)?;
            let view = dashboard.refresh(&select.request(false)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.incidents)?);
            } else {
                print_incidents(&view);
            }
        }
        Commands::Windows => {
            for window in TimeWindow::ALL {
                println!("{}", window.label());
            }
        }
    }

    Ok(())
}

fn print_summary(view: &DashboardView) {
    let m = &view.metrics;
    println!("\n=== {} / {} ===", view.selection, view.window);
    if view.stale {
        println!("(stale: every account failed, showing previous results)");
    }
    println!("{:<20} {}", "Total alerts:", m.total);
    println!("{:<20} {}", "Active:", m.active_count);
    println!("{:<20} {}", "Closed:", m.closed_count);
    println!("{:<20} {}%", "Resolution rate:", m.resolution_rate);
    println!("{:<20} {}", "MTTR:", m.mttr);
    println!("{:<20} {}", "Frequency:", m.frequency);
    println!("{:<20} {}", "Trend:", m.trend);
    if let Some(cmp) = &view.comparison {
        let sense = if cmp.is_improvement() { "better" } else { "worse or flat" };
        println!(
            "{:<20} {} vs prior period ({} -> {}, {})",
            "Change:", cmp.display, cmp.prior_count, cmp.current_count, sense
        );
    }

    if m.by_account.len() > 1 {
        println!("\nAlerts by account:");
        for entry in &m.by_account {
            println!(" - {:<30} {}", entry.name, entry.count);
        }
    }

    println!("\nTop conditions:");
    for entry in &m.top_conditions {
        println!(" - {:<40} {}", entry.name, entry.count);
    }
    println!("\nTop entities:");
    for entry in &m.top_entities {
        println!(" - {:<40} {}", entry.name, entry.count);
    }

    println!("\nRecommendations:");
    for line in &m.recommendations {
        println!(" - {}", line);
    }

    for failure in &view.failures {
        println!("\nwarning: no data for {} ({})", failure.account, failure.reason);
    }
    println!();
}

fn print_incidents(view: &DashboardView) {
    if view.incidents.is_empty() {
        println!("No incidents in {}.", view.window);
        return;
    }
    println!(
        "{:<12} | {:<15} | {:<8} | {:<30} | {:<20} | {:<8} | Category",
        "Incident", "Account", "Status", "Condition", "Entity", "Duration"
    );
    println!(
        "{:-<12}-|-{:-<15}-|-{:-<8}-|-{:-<30}-|-{:-<20}-|-{:-<8}-|-{:-<14}",
        "", "", "", "", "", "", ""
    );
    for row in &view.incidents {
        let i = &row.incident;
        println!(
            "{:<12} | {:<15} | {:<8} | {:<30} | {:<20} | {:<8} | {}",
            i.incident_id, i.account_label, i.status, i.condition_name, i.entity_name, row.duration, row.category
        );
    }
}
