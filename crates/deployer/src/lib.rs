pub mod account;
pub mod arguments;
pub mod artifact;
pub mod chain;
pub mod constructor;
pub mod deployment;
pub mod http_client;
pub mod verification;

use {
    crate::{
        account::Wallet,
        arguments::Arguments,
        artifact::{ArtifactStore, HardhatArtifacts},
        chain::NodeConnector,
        deployment::{Deployed, Deployment},
        http_client::HttpClientFactory,
        verification::{ExplorerVerifier, Unavailable, Verify},
    },
    clap::{Parser, error::ErrorKind},
    explorer_api::EtherscanApi,
    std::sync::Arc,
};

/// Parses `args`, sets up logging and runs the deployment. Returns the
/// process exit code.
pub async fn start(args: impl Iterator<Item = String>) -> i32 {
    dotenvy::dotenv().ok();
    let args = match Arguments::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            err.print().ok();
            return parse_error_exit_code(&err);
        }
    };
    let obs_config = observe::Config::new(
        &args.log_filter,
        Some(args.log_stderr_threshold),
        args.use_json_logs,
    );
    observe::tracing::initialize(&obs_config);
    tracing::info!("running deployer with validated arguments:\n{}", args);

    exit_code(&run(args).await)
}

pub async fn run(args: Arguments) -> Result<Deployed, deployment::Error> {
    let wallet = Wallet::from_arguments(
        &args.private_keys,
        args.mnemonic.as_deref(),
        args.mnemonic_index,
    )?;
    tracing::debug!(
        accounts = ?wallet.addresses().collect::<Vec<_>>(),
        "configured accounts"
    );
    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(HardhatArtifacts::new(args.artifacts_dir.clone()));
    let verifier = (!args.skip_verification).then(|| verifier(&args, artifacts.clone()));

    Deployment {
        wallet,
        artifacts,
        connector: Box::new(NodeConnector {
            url: args.node_url,
            confirmations: args.confirmations,
            receipt_timeout: args.receipt_timeout,
        }),
        verifier,
        contract: args.contract,
        constructor_args: args.constructor_args.0,
    }
    .run()
    .await
}

/// Builds the block explorer verifier. Configuration problems are reported
/// when verification runs, since they must not prevent the deployment.
fn verifier(args: &Arguments, artifacts: Arc<dyn ArtifactStore>) -> Box<dyn Verify> {
    let Some(api_key) = args.explorer_api_key.clone() else {
        return Box::new(Unavailable("no explorer API key configured".to_string()));
    };
    let client = match HttpClientFactory::new(&args.http_client).create() {
        Ok(client) => client,
        Err(err) => return Box::new(Unavailable(format!("failed to build HTTP client: {err}"))),
    };
    let api = EtherscanApi::new(args.explorer_api_url.clone(), api_key, client);
    Box::new(ExplorerVerifier {
        api: Arc::new(api),
        artifacts,
        poll_interval: args.verification_poll_interval,
        max_attempts: args.verification_max_attempts,
    })
}

/// Help and version requests succeed, every other argument error is a
/// configuration error.
fn parse_error_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn exit_code(result: &Result<Deployed, deployment::Error>) -> i32 {
    match result {
        Ok(deployed) => {
            tracing::info!(
                address = ?deployed.address,
                tx_hash = ?deployed.tx_hash,
                verification = ?deployed.verification,
                "deployment finished"
            );
            0
        }
        Err(err) => {
            tracing::error!(?err, "deployment failed");
            1
        }
    }
}
