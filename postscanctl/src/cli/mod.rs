pub mod list;
pub mod scan;

use clap::{Args, Parser, Subcommand};

use crate::client::{DEFAULT_SERVER_URL, ScanClient};

#[derive(Debug, Parser)]
#[command(name = "postscanctl", version, about = "Drive posts-maintenance scans from the terminal")]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Base URL of the posts-scan server
    #[arg(long, global = true, env = "POSTSCAN_SERVER", default_value = DEFAULT_SERVER_URL)]
    pub server: String,
}

impl ServerArgs {
    pub fn client(&self) -> ScanClient {
        ScanClient::new(self.server.clone())
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a scan and follow it until it completes
    Scan(scan::ScanArgs),
    /// Show recently started scans
    List,
    /// Cancel a running scan
    Cancel {
        /// Id returned when the scan was started
        scan_id: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = cli.server.client();
    match cli.command {
        Command::Scan(args) => scan::run(&client, &args).await.map(|_| ()),
        Command::List => list::run(&client).await,
        Command::Cancel { scan_id } => {
            let scan_id = postscan_core::types::ScanId::parse(&scan_id)?;
            let cancelled = client.cancel(&scan_id).await?;
            println!("Cancelled scan {cancelled}");
            Ok(())
        }
    }
}
