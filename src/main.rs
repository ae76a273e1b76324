#![allow(missing_docs)]

use clap::Parser;
use product_gallery_scraper_lib::commands::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run(cli).await
}
