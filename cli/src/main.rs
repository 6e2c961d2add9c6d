use admin::AdminApi;
use clap::Parser;
use cli::{Commands, ConnectionArgs};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apigee-tools", version)]
#[command(about = "Administrative tools for Apigee Edge and Apigee X organizations")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log debug output to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    if let Err(e) = cli.command.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let client = match cli.connection.connect() {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("using organization {}", client.organization());

    match cli.command.run(&client).await {
        Ok(output) => {
            if let Some(text) = output.render() {
                println!("{}", text);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
