use std::net::IpAddr;
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use directories::BaseDirs;
use vault_client::{ApproleConfig, ClientConfig, TlsConfig};

const ROLE_ID_FILE: &str = ".vault-secret-broker-role-id";
const SECRET_ID_FILE: &str = ".vault-secret-broker-secret-id";

/// CI/CD interface to access Vault.
///
/// Instead of handing Vault credentials to CI/CD servers, the broker adds
/// another layer of protection by only handing out secrets to actually
/// running jobs.
#[derive(Debug, Parser)]
#[command(name = "vault-secret-broker", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "VSB_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log as JSON
    #[arg(
        long,
        global = true,
        env = "VSB_JSON_LOG",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub json_log: bool,

    #[command(flatten)]
    pub vault: VaultArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start serving the broker api
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct VaultArgs {
    /// Vault address
    #[arg(long, global = true, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// PEM bundle with the CA certificates to verify Vault against
    #[arg(long = "vault-cacert", global = true, env = "VAULT_CACERT")]
    pub vault_ca_cert: Option<PathBuf>,

    /// Reload the CA bundle when it changes on disk
    #[arg(
        long = "vault-cacert-reload",
        global = true,
        env = "VAULT_CACERT_RELOAD",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = parse_reload_flag
    )]
    pub vault_ca_cert_reload: bool,

    /// Vault role
    #[arg(long, global = true, env = "VSB_VAULT_ROLE", default_value = vault_client::config::DEFAULT_ROLE)]
    pub vault_role: String,

    /// Vault auth path, e.g. /v1/auth/<vault-auth-path>/
    #[arg(long, global = true, env = "VSB_VAULT_AUTH_PATH", default_value = vault_client::config::DEFAULT_AUTH_PATH)]
    pub vault_auth_path: String,

    /// Vault AppRole RoleID
    #[arg(long, global = true, env = "VSB_VAULT_APPROLE_ROLE_ID")]
    pub vault_approle_role_id: Option<String>,

    /// Vault AppRole RoleID path
    #[arg(long, global = true, env = "VSB_VAULT_APPROLE_ROLE_ID_PATH")]
    pub vault_approle_role_id_path: Option<PathBuf>,

    /// Initial Vault AppRole SecretID
    #[arg(long, global = true, env = "VSB_VAULT_APPROLE_INITIAL_SECRET_ID")]
    pub vault_approle_initial_secret_id: Option<String>,

    /// Initial Vault AppRole SecretID path
    #[arg(long, global = true, env = "VSB_VAULT_APPROLE_INITIAL_SECRET_ID_PATH")]
    pub vault_approle_initial_secret_id_path: Option<PathBuf>,

    /// Vault AppRole SecretID storage path
    #[arg(long, global = true, env = "VSB_VAULT_APPROLE_SECRET_ID_STORE_PATH")]
    pub vault_approle_secret_id_store_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// API server listen ip
    #[arg(long, env = "VSB_LISTEN_IP", default_value = "0.0.0.0")]
    pub listen_ip: IpAddr,

    /// API server listen port
    #[arg(long, env = "VSB_LISTEN_PORT", default_value_t = 8080)]
    pub listen_port: u16,

    /// API server tls listen port
    #[arg(long, env = "VSB_LISTEN_TLS_PORT", default_value_t = 8443)]
    pub listen_tls_port: u16,

    /// Enable TLS
    #[arg(long, env = "VSB_TLS")]
    pub tls: bool,

    /// TLS certificate file
    #[arg(long, env = "VSB_TLS_CERT", default_value = "server.crt")]
    pub tls_cert: PathBuf,

    /// TLS private key
    #[arg(long, env = "VSB_TLS_KEY", default_value = "server.key")]
    pub tls_key: PathBuf,
}

/// Only an explicit "false" turns reloading off
fn parse_reload_flag(value: &str) -> Result<bool, String> {
    Ok(value != "false")
}

fn home_file(name: &str) -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(name))
}

impl VaultArgs {
    pub fn approle_config(&self) -> ApproleConfig {
        let secret_id_store_path = self
            .vault_approle_secret_id_store_path
            .clone()
            .or_else(|| home_file(SECRET_ID_FILE));

        ApproleConfig {
            role_id: None,
            role_id_setting: self.vault_approle_role_id.clone(),
            role_id_path: self
                .vault_approle_role_id_path
                .clone()
                .or_else(|| home_file(ROLE_ID_FILE)),
            initial_secret_id: None,
            initial_secret_id_setting: self.vault_approle_initial_secret_id.clone(),
            initial_secret_id_path: self
                .vault_approle_initial_secret_id_path
                .clone()
                .or_else(|| home_file(SECRET_ID_FILE)),
            secret_id_store_path,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            auth_path: self.vault_auth_path.clone(),
            role: self.vault_role.clone(),
            tls: TlsConfig {
                ca_cert: self.vault_ca_cert.clone(),
                ca_cert_reload: self.vault_ca_cert_reload,
                ..TlsConfig::default()
            },
            ..ClientConfig::default()
        }
    }
}
