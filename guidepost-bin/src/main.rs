use clap::Parser;
use guidepost_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {e}");
            std::process::exit(1);
        }
    }
}
