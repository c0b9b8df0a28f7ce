mod config;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use client_core::{ClientEvent, PendingOperationState, RegistryClient};
use config::load_settings;
use ledger::{HttpLedgerConnector, HttpLedgerOptions, LedgerConnector};
use shared::domain::{explorer_address_url, ImageIndex, ReportId, WalletSnapshot};

#[derive(Parser, Debug)]
#[command(name = "disaster-registry")]
struct Cli {
    /// Wallet address to act as. Reads work without one.
    #[arg(long)]
    wallet: Option<String>,
    /// Wallet balance as the wallet reports it, e.g. "12.345".
    #[arg(long)]
    balance: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the registry length and a one-line summary per report.
    List,
    /// Print one report with its attached images.
    Show { id: u64 },
    /// Submit a new disaster report.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        disaster_type: String,
        #[arg(long)]
        image_url: String,
        #[arg(long)]
        latitude: String,
        #[arg(long)]
        longitude: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        severity: String,
        #[arg(long)]
        impact: String,
    },
    /// Delete a report; its slot stays assigned but reads back empty.
    DeleteReport { id: u64 },
    /// Attach an image to a report.
    AddImage { id: u64, url: String },
    /// Remove an image; later images shift down by one index.
    DeleteImage { id: u64, index: u32 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();
    let settings = load_settings();

    let connector: Arc<dyn LedgerConnector> = Arc::new(HttpLedgerConnector::new(
        HttpLedgerOptions::new(&settings.gateway_url, &settings.contract_address),
    ));
    let wallet = WalletSnapshot {
        is_connected: cli.wallet.is_some(),
        address: cli.wallet,
        balance: cli.balance,
    };
    let (_wallet_tx, wallet_rx) = watch::channel(wallet);
    let client = RegistryClient::new(connector, wallet_rx, settings.client_options());

    let balance = client.balance_display();
    if balance.show_balance {
        println!("balance: {} CELO", balance.formatted_balance);
    }

    match cli.command {
        Command::List => {
            let count = client.report_count().await?;
            println!("{count} report slot(s)");
            for id in 0..count {
                let id = ReportId(id);
                match client.report(id).await? {
                    Some(report) => println!(
                        "#{id} {} — {} ({}, {}) severity={}",
                        report.disaster_type, report.reporter_name, report.city, report.state,
                        report.severity
                    ),
                    None => println!("#{id} (deleted)"),
                }
            }
        }
        Command::Show { id } => {
            let id = ReportId(id);
            let Some(report) = client.report(id).await? else {
                bail!("report #{id} does not exist");
            };
            println!("report #{id}");
            println!("  reporter: {} <{}>", report.reporter_name, report.email);
            println!(
                "  address:  {}",
                explorer_address_url(&settings.explorer_url, &report.reporter_address)
            );
            println!("  type:     {} ({})", report.disaster_type, report.severity);
            println!("  where:    {}, {}", report.city, report.state);
            println!("  at:       {} ({}, {})", report.date, report.latitude, report.longitude);
            println!("  impact:   {}", report.impact);
            println!("  cover:    {}", report.image_url);
            let images = client.images(id).await?;
            println!("  {} additional image(s)", images.len());
            for (index, image) in images.iter().enumerate() {
                println!("    [{index}] {} ({})", image.image_url, image.timestamp);
            }
        }
        Command::Create {
            name,
            email,
            disaster_type,
            image_url,
            latitude,
            longitude,
            city,
            state,
            date,
            severity,
            impact,
        } => {
            client.report_count().await?;
            let mut events = client.subscribe_events();
            let flow = client.create_report_flow();
            let form = flow.form();
            form.set_reporter_name(name);
            form.set_email(email);
            form.set_disaster_type(disaster_type);
            form.set_image_url(image_url);
            form.set_coordinates(latitude, longitude);
            form.set_city(city);
            form.set_state(state);
            form.set_date(date);
            form.set_severity(severity);
            form.set_impact(impact);
            flow.trigger().await;
            report_outcome(flow.current_state())?;
            // Wait for the post-write refetch so the new id is printed.
            loop {
                match events.recv().await? {
                    ClientEvent::ReportRefreshed { id, report: Some(_) } => {
                        println!("created report #{id}");
                        break;
                    }
                    ClientEvent::ReportRefreshed { report: None, .. } => {
                        println!("created, but the registry has not caught up yet");
                        break;
                    }
                    ClientEvent::Error(message) => bail!("{message}"),
                    _ => {}
                }
            }
        }
        Command::DeleteReport { id } => {
            let flow = client.delete_report_flow(ReportId(id));
            flow.trigger().await;
            report_outcome(flow.current_state())?;
            println!("deleted report #{id}");
        }
        Command::AddImage { id, url } => {
            let flow = client.add_image_flow(ReportId(id));
            flow.set_image_url(&url);
            flow.trigger().await;
            report_outcome(flow.current_state())?;
            println!("attached image to report #{id}");
        }
        Command::DeleteImage { id, index } => {
            let flow = client.delete_image_flow(ReportId(id));
            flow.trigger(ImageIndex(index)).await;
            report_outcome(flow.current_state())?;
            println!("removed image {index} from report #{id}");
        }
    }

    Ok(())
}

fn report_outcome(state: PendingOperationState) -> Result<()> {
    match state {
        PendingOperationState::Succeeded => Ok(()),
        PendingOperationState::Failed(err) => bail!("{err}"),
        PendingOperationState::Idle => bail!("submission refused: connect a wallet with --wallet"),
        other => bail!("flow ended in unexpected state {other:?}"),
    }
}
