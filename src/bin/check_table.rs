use clap::Parser;

use tide_tracker_service::fetcher::TideTableFetcher;
use tide_tracker_service::series::{COL_FORECAST, COL_MEASURED, COL_TIMESTAMP};

#[derive(Parser)]
#[command(name = "check-table")]
#[command(about = "Fetch the tide table once and print the scraped rows", long_about = None)]
struct Cli {
    /// Source page URL
    #[arg(long, env = "TIDE_TABLE_URL")]
    url: String,

    /// Print the raw rows as pretty JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    println!("Fetching tide table from {}...\n", cli.url);

    let fetcher = TideTableFetcher::new(cli.url.clone());
    let rows = fetcher.fetch_rows().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!(
                "  {}  medição={}  previsão={}",
                row.get(COL_TIMESTAMP).unwrap_or("?"),
                row.get(COL_MEASURED).unwrap_or("?"),
                row.get(COL_FORECAST).unwrap_or("-"),
            );
        }
    }

    println!("\n{} rows scraped", rows.len());

    Ok(())
}
