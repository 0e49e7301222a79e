use clap::{Parser, Subcommand};

use nestegg::api::{ProjectArgs, run_cli_projection, run_http_server};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Portfolio projections: deterministic growth, Monte Carlo bands and FI estimates"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the projection API over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run a single projection and print the result as JSON
    Project {
        #[command(flatten)]
        args: ProjectArgs,
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();

    match Cli::parse().command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                log::error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project { args, pretty } => match run_cli_projection(args, pretty) {
            Ok(json) => println!("{json}"),
            Err(msg) => {
                eprintln!("{msg}");
                std::process::exit(2);
            }
        },
    }
}
