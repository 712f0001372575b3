use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use postscan_core::scan::ScanHistoryEntry;

use crate::client::ScanClient;

pub const EMPTY_HISTORY: &str = "No previous scans recorded.";

pub fn render_history(history: &[ScanHistoryEntry]) -> String {
    if history.is_empty() {
        return EMPTY_HISTORY.to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["ID", "Started", "Types", "Total"]
            .into_iter()
            .map(|h| Cell::new(h).fg(Color::Cyan)),
    );

    for entry in history {
        table.add_row(vec![
            Cell::new(entry.id.as_str()),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
            Cell::new(entry.target_kinds.join(", ")),
            Cell::new(entry.total),
        ]);
    }

    table.to_string()
}

pub async fn run(client: &ScanClient) -> anyhow::Result<()> {
    let history = client.list().await?;
    println!("{}", render_history(&history));
    Ok(())
}
