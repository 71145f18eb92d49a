//! `reach`: command-line client for a Reach server.
//!
//! # Usage
//!
//! ```text
//! reach --url http://localhost:8080 customers list
//! reach segments preview --rules big-spenders.json
//! reach campaigns create --name Diwali --segment <id> --channel sms \
//!   --message 'Hi {{firstName}}, 20% off!'
//! reach --config ~/.config/reach/config.toml overview
//! ```

mod client;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client::{ApiClient, CampaignInput, LaunchSummary};
use reach_core::{campaign::Channel, rule::SegmentRule};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_URL: &str = "http://localhost:8080";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "reach", about = "Command-line client for the Reach campaign server")]
struct Args {
  /// Path to a TOML config file (url).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the Reach server (default: http://localhost:8080).
  #[arg(long, env = "REACH_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Manage customers.
  #[command(subcommand)]
  Customers(CustomerCommand),
  /// Record orders.
  #[command(subcommand)]
  Orders(OrderCommand),
  /// Manage audience segments.
  #[command(subcommand)]
  Segments(SegmentCommand),
  /// Create, launch and inspect campaigns.
  #[command(subcommand)]
  Campaigns(CampaignCommand),
  /// Print tenant-wide totals.
  Overview,
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
  List,
  Show { id: Uuid },
  Add {
    #[arg(long)]
    name:  String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: Option<String>,
  },
  /// A customer's order history.
  Orders { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
  Add {
    #[arg(long)]
    customer: Uuid,
    /// Decimal amount, e.g. `2499.00`.
    #[arg(long)]
    amount:   String,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long)]
    date:     Option<DateTime<Utc>>,
    #[arg(long = "item")]
    items:    Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
enum SegmentCommand {
  List,
  /// Count the audience of a rule chain without saving it.
  Preview {
    /// JSON file holding an array of rules.
    #[arg(long)]
    rules: PathBuf,
  },
  Create {
    #[arg(long)]
    name:        String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    rules:       PathBuf,
  },
  Delete { id: Uuid },
  /// Turn a plain-language description into a rule chain.
  Suggest {
    #[arg(required = true)]
    query: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
enum CampaignCommand {
  List,
  Show { id: Uuid },
  /// Create a campaign and launch it, unless `--draft` is given.
  Create {
    #[arg(long)]
    name:    String,
    #[arg(long)]
    segment: Uuid,
    /// Template; `{{firstName}}`, `{{name}}` and `{{email}}` are substituted.
    #[arg(long)]
    message: String,
    #[arg(long, default_value = "email")]
    channel: Channel,
    #[arg(long)]
    draft:   bool,
  },
  Launch { id: Uuid },
  Logs { id: Uuid },
  /// Recompute delivery aggregates from the communication log.
  Stats { id: Uuid },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  #[serde(default)]
  url: String,
}

/// Flag or env var first, then the config file, then the default.
fn resolve_url(flag: Option<String>, file: &ConfigFile) -> String {
  flag
    .or_else(|| (!file.url.is_empty()).then(|| file.url.clone()))
    .unwrap_or_else(|| DEFAULT_URL.to_string())
}

fn read_rules(path: &Path) -> Result<Vec<SegmentRule>> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading rules file {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing rules file {}", path.display()))
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  let base_url = resolve_url(args.url, &file_cfg);
  tracing::debug!(%base_url, "using server");
  let client = ApiClient::new(base_url)?;

  match args.command {
    Command::Customers(cmd) => customers(&client, cmd).await,
    Command::Orders(cmd) => orders(&client, cmd).await,
    Command::Segments(cmd) => segments(&client, cmd).await,
    Command::Campaigns(cmd) => campaigns(&client, cmd).await,
    Command::Overview => {
      print!("{}", render::overview(&client.overview().await?));
      Ok(())
    }
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn customers(client: &ApiClient, cmd: CustomerCommand) -> Result<()> {
  match cmd {
    CustomerCommand::List => print!("{}", render::customers(&client.list_customers().await?)),
    CustomerCommand::Show { id } => {
      print!("{}", render::customers(&[client.get_customer(id).await?]))
    }
    CustomerCommand::Add { name, email, phone } => {
      let customer = client.create_customer(&name, &email, phone.as_deref()).await?;
      println!("created customer {}", customer.customer_id);
    }
    CustomerCommand::Orders { id } => {
      print!("{}", render::orders(&client.customer_orders(id).await?))
    }
  }
  Ok(())
}

async fn orders(client: &ApiClient, cmd: OrderCommand) -> Result<()> {
  match cmd {
    OrderCommand::Add { customer, amount, date, items } => {
      let order = client
        .record_order(customer, &amount, date.unwrap_or_else(Utc::now), &items)
        .await?;
      println!("recorded order {} for {}", order.order_id, order.customer_id);
    }
  }
  Ok(())
}

async fn segments(client: &ApiClient, cmd: SegmentCommand) -> Result<()> {
  match cmd {
    SegmentCommand::List => print!("{}", render::segments(&client.list_segments().await?)),
    SegmentCommand::Preview { rules } => {
      let rules = read_rules(&rules)?;
      let size = client.preview_segment(&rules).await?;
      println!("{}\n{size} customers match", render::rules(&rules));
    }
    SegmentCommand::Create { name, description, rules } => {
      let rules = read_rules(&rules)?;
      let segment = client.create_segment(&name, description.as_deref(), &rules).await?;
      println!(
        "created segment {} ({} customers)",
        segment.segment_id, segment.audience_size
      );
    }
    SegmentCommand::Delete { id } => {
      client.delete_segment(id).await?;
      println!("deleted segment {id}");
    }
    SegmentCommand::Suggest { query } => {
      let rules = client.suggest_rules(&query.join(" ")).await?;
      println!("{}", render::rules(&rules));
      println!("{}", serde_json::to_string_pretty(&rules)?);
    }
  }
  Ok(())
}

async fn campaigns(client: &ApiClient, cmd: CampaignCommand) -> Result<()> {
  match cmd {
    CampaignCommand::List => print!("{}", render::campaigns(&client.list_campaigns().await?)),
    CampaignCommand::Show { id } => print!("{}", render::campaign(&client.get_campaign(id).await?)),
    CampaignCommand::Create { name, segment, message, channel, draft } => {
      let input = CampaignInput {
        name,
        segment_id: segment,
        message,
        channel: channel.to_string(),
      };
      if draft {
        let campaign = client.create_draft(&input).await?;
        println!("created draft {}", campaign.campaign_id);
      } else {
        print_launch(&client.create_and_launch(&input).await?);
      }
    }
    CampaignCommand::Launch { id } => print_launch(&client.launch(id).await?),
    CampaignCommand::Logs { id } => print!("{}", render::logs(&client.campaign_logs(id).await?)),
    CampaignCommand::Stats { id } => print!("{}", render::stats(&client.refresh_stats(id).await?)),
  }
  Ok(())
}

fn print_launch(summary: &LaunchSummary) {
  println!(
    "campaign {} is {}: {} messages queued",
    summary.campaign.campaign_id, summary.campaign.status, summary.messages_queued
  );
}
