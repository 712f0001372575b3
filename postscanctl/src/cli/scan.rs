use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use postscan_core::{
    api_types::{ScanStatusResponse, StartScanBody},
    scan::ScanPhase,
};
use tracing::debug;

use crate::client::ScanClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Comma separated content kinds to scan (server defaults when omitted)
    #[arg(long = "post-types", alias = "post_types", value_delimiter = ',')]
    pub post_types: Option<Vec<String>>,

    /// Items per batch, clamped by the server
    #[arg(long = "batch-size", alias = "batch_size")]
    pub batch_size: Option<i64>,

    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64, hide = true)]
    pub poll_ms: u64,

    /// Print only the final summary
    #[arg(long, short)]
    pub quiet: bool,
}

impl ScanArgs {
    fn start_body(&self) -> StartScanBody {
        StartScanBody {
            post_types: self.post_types.clone(),
            batch_size: self.batch_size,
        }
    }
}

fn progress_bar(total: u64, quiet: bool) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

/// Start a scan and poll its status until it reaches a terminal phase.
/// Returns the final status; a failed scan is an error.
pub async fn run(client: &ScanClient, args: &ScanArgs) -> anyhow::Result<ScanStatusResponse> {
    let scan_id = client
        .start(&args.start_body())
        .await
        .context("failed to start scan")?;
    if !args.quiet {
        println!("Started scan {scan_id}");
    }

    let poll = Duration::from_millis(args.poll_ms.max(1));
    let mut status = client.status(&scan_id).await?;
    let bar = progress_bar(status.state.total, args.quiet)?;
    let mut warned_stalled = false;

    loop {
        let state = &status.state;
        bar.set_position(state.processed.min(state.total));
        bar.set_message(state.message.clone());
        debug!(scan_id = %scan_id, phase = %state.phase, processed = state.processed, "polled scan");

        if status.stalled && !warned_stalled {
            bar.println(format!(
                "warning: scan {scan_id} has made no progress recently; the server may be down or overloaded"
            ));
            warned_stalled = true;
        }

        if state.phase.is_terminal() {
            bar.finish_with_message(state.message.clone());
            break;
        }
        tokio::time::sleep(poll).await;
        status = client.status(&scan_id).await?;
    }

    match status.state.phase {
        ScanPhase::Completed => {
            println!(
                "Scan {} completed: {} of {} items processed",
                status.state.id, status.state.processed, status.state.total
            );
            Ok(status)
        }
        _ => bail!("scan {} failed: {}", status.state.id, status.state.message),
    }
}
