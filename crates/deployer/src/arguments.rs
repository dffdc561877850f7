use {
    crate::http_client,
    alloy::signers::local::PrivateKeySigner,
    clap::Parser,
    serde_json::Value,
    std::{
        fmt::{self, Display, Formatter},
        path::PathBuf,
        str::FromStr,
        time::Duration,
    },
    url::Url,
};

#[derive(Parser)]
#[clap(about = "Deploys a compiled contract and verifies its source with a block explorer")]
pub struct Arguments {
    #[clap(flatten)]
    pub http_client: http_client::Arguments,

    /// The Ethereum node URL to connect to.
    #[clap(long, env, default_value = "http://localhost:8545")]
    pub node_url: Url,

    /// Comma separated private keys. The first one sends the deployment.
    #[clap(long, env, value_delimiter = ',')]
    pub private_keys: Vec<PrivateKeySigner>,

    /// BIP-39 mnemonic to derive an additional account from. It is used after
    /// all private keys.
    #[clap(long, env)]
    pub mnemonic: Option<String>,

    /// Derivation index of the mnemonic account.
    #[clap(long, env, default_value = "0")]
    pub mnemonic_index: u32,

    /// Directory containing the Hardhat compilation artifacts.
    #[clap(long, env, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Name of the contract to deploy. Use `path/Source.sol:Name` if the name
    /// is ambiguous.
    #[clap(long, env, default_value = "BottleGame")]
    pub contract: String,

    /// Constructor arguments as a JSON array, for example
    /// `["0x1111111111111111111111111111111111111111", 42]`.
    #[clap(long, env, default_value = "[]")]
    pub constructor_args: ConstructorArgs,

    /// Number of confirmations to wait for before the deployment counts as
    /// mined.
    #[clap(long, env, default_value = "1")]
    pub confirmations: u64,

    /// Give up waiting for the deployment receipt after this long. Waits
    /// forever if unset.
    #[clap(long, env, value_parser = humantime::parse_duration)]
    pub receipt_timeout: Option<Duration>,

    /// Do not verify the deployed contract with the block explorer.
    #[clap(long, env)]
    pub skip_verification: bool,

    /// Etherscan compatible API used for source verification.
    #[clap(long, env, default_value = explorer_api::EtherscanApi::DEFAULT_URL)]
    pub explorer_api_url: Url,

    /// API key for the block explorer.
    #[clap(long, env)]
    pub explorer_api_key: Option<String>,

    /// Time between verification status checks.
    #[clap(
        long,
        env,
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub verification_poll_interval: Duration,

    /// How often to check the verification status, and how often to retry
    /// submitting while the explorer has not indexed the contract yet.
    #[clap(long, env, default_value = "10")]
    pub verification_max_attempts: u32,

    /// The log filter.
    #[clap(
        long,
        env,
        default_value = "warn,deployer=info,explorer_api=info,observe=info"
    )]
    pub log_filter: String,

    /// At which log level logs should be printed to stderr instead of stdout.
    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: tracing::Level,

    /// Whether to use JSON format for the logs.
    #[clap(long, env, default_value = "false")]
    pub use_json_logs: bool,
}

/// Constructor arguments parsed from a JSON array.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstructorArgs(pub Vec<Value>);

impl FromStr for ConstructorArgs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
            .map(Self)
            .map_err(|err| format!("expected a JSON array: {err}"))
    }
}

impl Display for ConstructorArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Array(self.0.clone()))
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self {
            http_client,
            node_url,
            private_keys,
            mnemonic,
            mnemonic_index,
            artifacts_dir,
            contract,
            constructor_args,
            confirmations,
            receipt_timeout,
            skip_verification,
            explorer_api_url,
            explorer_api_key,
            verification_poll_interval,
            verification_max_attempts,
            log_filter,
            log_stderr_threshold,
            use_json_logs,
        } = self;

        write!(f, "{}", http_client)?;
        writeln!(f, "node_url: {}", node_url)?;
        writeln!(
            f,
            "private_keys: {:?}",
            private_keys
                .iter()
                .map(|signer| signer.address())
                .collect::<Vec<_>>()
        )?;
        display_secret_option(f, "mnemonic", mnemonic)?;
        writeln!(f, "mnemonic_index: {}", mnemonic_index)?;
        writeln!(f, "artifacts_dir: {}", artifacts_dir.display())?;
        writeln!(f, "contract: {}", contract)?;
        writeln!(f, "constructor_args: {}", constructor_args)?;
        writeln!(f, "confirmations: {}", confirmations)?;
        display_option(
            f,
            "receipt_timeout",
            &receipt_timeout.map(humantime::format_duration),
        )?;
        writeln!(f, "skip_verification: {}", skip_verification)?;
        writeln!(f, "explorer_api_url: {}", explorer_api_url)?;
        display_secret_option(f, "explorer_api_key", explorer_api_key)?;
        writeln!(
            f,
            "verification_poll_interval: {:?}",
            verification_poll_interval
        )?;
        writeln!(
            f,
            "verification_max_attempts: {}",
            verification_max_attempts
        )?;
        writeln!(f, "log_filter: {}", log_filter)?;
        writeln!(f, "log_stderr_threshold: {}", log_stderr_threshold)?;
        writeln!(f, "use_json_logs: {}", use_json_logs)?;
        Ok(())
    }
}

pub fn display_secret_option<T>(
    f: &mut Formatter<'_>,
    name: &str,
    option: &Option<T>,
) -> fmt::Result {
    display_option(f, name, &option.as_ref().map(|_| "SECRET"))
}

pub fn display_option(
    f: &mut Formatter<'_>,
    name: &str,
    option: &Option<impl Display>,
) -> fmt::Result {
    write!(f, "{name}: ")?;
    match option {
        Some(display) => writeln!(f, "{display}"),
        None => writeln!(f, "None"),
    }
}
