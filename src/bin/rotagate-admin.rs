use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "rotagate-admin")]
#[command(about = "Management CLI for the rotagate entry point", long_about = None)]
struct Cli {
    /// Entry point base URL.
    #[arg(short, long, default_value = "https://127.0.0.1")]
    url: String,

    /// API key printed by the server at startup.
    #[arg(short, long)]
    key: String,

    /// Accept the server's self-signed certificate.
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check system status and the recorded active proxy
    Status,
    /// List proxy endpoints with health and active flags
    Proxies,
    /// Force a rotation right now
    Rotate,
    /// Inject a block directive for the next forwarded request
    Block,
    /// Inject a redirect directive for the next forwarded request
    Redirect {
        /// Absolute URL the next upstream request is rewritten to.
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(cli.insecure)
        .build()?;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let response = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/api/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Proxies => {
            client
                .get(format!("{}/api/proxies", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Rotate => {
            client
                .post(format!("{}/api/rotate", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Block => {
            client
                .post(format!("{}/api/directives", cli.url))
                .headers(headers)
                .json(&serde_json::json!({ "block": true }))
                .send()
                .await?
        }
        Commands::Redirect { target } => {
            client
                .post(format!("{}/api/directives", cli.url))
                .headers(headers)
                .json(&serde_json::json!({ "redirect_url": target }))
                .send()
                .await?
        }
    };

    print_response(response).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("{text}");
            }
        }
        std::process::exit(1);
    }

    let body: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
