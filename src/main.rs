use clap::Parser;
use vault_client::VaultClient;

mod cli;
mod consts;
mod logging;
mod web;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logger(&cli.log_level, cli.json_log)?;

    match cli.command {
        Command::Serve(params) => {
            let mut builder = VaultClient::builder()
                .config(cli.vault.client_config())
                .approle(cli.vault.approle_config());
            if let Some(addr) = cli.vault.vault_addr.as_deref() {
                builder = builder.base_url(addr);
            }

            let client = builder.build().await?;
            tracing::info!(
                "{} {} connected to Vault",
                consts::APPLICATION_NAME,
                consts::VERSION
            );
            web::start_server(params, client).await?;
        }
    }
    Ok(())
}
