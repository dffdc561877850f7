//! The deployment pipeline: resolve the signer, load the artifact, create the
//! contract, then try to verify its source.

use {
    crate::{
        account::{self, Wallet},
        artifact::{self, ArtifactStore},
        chain::Connect,
        constructor,
        verification::{VerificationOutcome, VerificationRequest, Verify},
    },
    alloy::primitives::{Address, TxHash},
    serde_json::Value,
    std::sync::Arc,
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] account::Error),

    #[error(transparent)]
    Artifact(#[from] artifact::Error),

    #[error("invalid constructor arguments")]
    ConstructorArguments(#[from] constructor::Error),

    #[error("failed to connect to the node")]
    Connection(#[source] anyhow::Error),

    #[error("failed to submit the deployment transaction")]
    Submission(#[source] anyhow::Error),

    #[error("failed to get the receipt of deployment transaction {tx_hash}")]
    Receipt {
        tx_hash: TxHash,
        #[source]
        source: anyhow::Error,
    },

    #[error("Contract Deployment Failed")]
    DeploymentFailed { tx_hash: TxHash },
}

/// Result of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployed {
    pub deployer: Address,
    pub tx_hash: TxHash,
    pub address: Address,
    pub verification: VerificationOutcome,
}

pub struct Deployment {
    pub wallet: Wallet,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub connector: Box<dyn Connect>,
    /// `None` skips verification.
    pub verifier: Option<Box<dyn Verify>>,
    pub contract: String,
    pub constructor_args: Vec<Value>,
}

impl Deployment {
    /// Deploys the contract and attempts to verify it.
    ///
    /// Everything up to and including the receipt check is fatal. Verification
    /// problems only show up in [`Deployed::verification`].
    pub async fn run(&self) -> Result<Deployed, Error> {
        let signer = self.wallet.first()?;
        let deployer = signer.address();
        tracing::info!(?deployer, "deploying with first configured account");

        let artifact = self.artifacts.read_artifact(&self.contract)?;
        let constructor_args = constructor::encode(&artifact.abi, &self.constructor_args)?;
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&constructor_args);

        let chain = self
            .connector
            .connect(signer.clone())
            .map_err(Error::Connection)?;

        let tx_hash = chain
            .submit_deployment(deployer, code.into())
            .await
            .map_err(Error::Submission)?;
        tracing::info!(
            ?tx_hash,
            contract = %artifact.contract_name,
            "deployment transaction sent"
        );

        let receipt = chain
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|source| Error::Receipt { tx_hash, source })?;
        let address = match receipt.deployed_address() {
            Some(address) if receipt.success => address,
            _ => {
                tracing::error!(?receipt, "no contract created");
                return Err(Error::DeploymentFailed { tx_hash });
            }
        };
        tracing::info!(
            ?address,
            block = ?receipt.block_number,
            gas_used = receipt.gas_used,
            "contract deployed"
        );

        let verification = match &self.verifier {
            None => VerificationOutcome::Skipped,
            Some(verifier) => {
                let outcome = match chain.chain_id().await {
                    Ok(chain_id) => {
                        let request = VerificationRequest {
                            chain_id,
                            address,
                            artifact,
                            constructor_args,
                        };
                        verifier.verify(&request).await
                    }
                    Err(err) => Err(err.context("could not determine chain for verification")),
                };
                outcome.unwrap_or_else(|err| {
                    tracing::error!(?err, "Error verifying Contract");
                    VerificationOutcome::Failed(format!("{err:#}"))
                })
            }
        };
        match &verification {
            VerificationOutcome::Verified | VerificationOutcome::AlreadyVerified => {
                tracing::info!(?address, ?verification, "contract source verified")
            }
            VerificationOutcome::Skipped => tracing::warn!("verification skipped"),
            VerificationOutcome::Failed(reason) => {
                tracing::warn!(?address, %reason, "contract source not verified")
            }
        }

        Ok(Deployed {
            deployer,
            tx_hash,
            address,
            verification,
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            artifact::{Artifact, MockArtifactStore},
            chain::{Chain, DeploymentReceipt, MockChain, MockConnect},
            verification::MockVerify,
        },
        alloy::{
            primitives::{Bytes, address, b256},
            signers::local::PrivateKeySigner,
        },
        anyhow::anyhow,
        serde_json::json,
    };

    const DEPLOYER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const DEPLOYED: Address = address!("0xbeefbeefbeefbeefbeefbeefbeefbeefbeefbeef");
    const TX_HASH: TxHash =
        b256!("0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddeaddead");

    fn wallet() -> Wallet {
        let signer: PrivateKeySigner =
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        Wallet::new(vec![signer])
    }

    fn artifact(abi: Value) -> Artifact {
        Artifact {
            contract_name: "BottleGame".to_string(),
            source_name: "contracts/BottleGame.sol".to_string(),
            abi: serde_json::from_value(abi).unwrap(),
            bytecode: Bytes::from(vec![0x60, 0x01]),
            path: "artifacts/contracts/BottleGame.sol/BottleGame.json".into(),
        }
    }

    fn artifacts(abi: Value) -> Arc<dyn ArtifactStore> {
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_read_artifact()
            .withf(|name| name == "BottleGame")
            .returning(move |_| Ok(artifact(abi.clone())));
        Arc::new(artifacts)
    }

    fn receipt(contract_address: Option<Address>, success: bool) -> DeploymentReceipt {
        DeploymentReceipt {
            transaction_hash: TX_HASH,
            block_number: Some(1),
            contract_address,
            success,
            gas_used: 100_000,
        }
    }

    /// A chain that accepts the deployment and mines it with `receipt`.
    fn connector(expected_code: Bytes, receipt: DeploymentReceipt) -> MockConnect {
        let mut chain = MockChain::new();
        chain
            .expect_submit_deployment()
            .withf(move |from, code| *from == DEPLOYER && *code == expected_code)
            .times(1)
            .returning(|_, _| Ok(TX_HASH));
        chain
            .expect_wait_for_receipt()
            .withf(|tx_hash| *tx_hash == TX_HASH)
            .times(1)
            .returning(move |_| Ok(receipt.clone()));
        chain.expect_chain_id().returning(|| Ok(31337));
        let chain: Arc<dyn Chain> = Arc::new(chain);

        let mut connector = MockConnect::new();
        connector
            .expect_connect()
            .times(1)
            .returning(move |_| Ok(chain.clone()));
        connector
    }

    fn deployment(
        wallet: Wallet,
        artifacts: Arc<dyn ArtifactStore>,
        connector: MockConnect,
        verifier: Option<MockVerify>,
    ) -> Deployment {
        Deployment {
            wallet,
            artifacts,
            connector: Box::new(connector),
            verifier: verifier.map(|verifier| Box::new(verifier) as Box<dyn Verify>),
            contract: "BottleGame".to_string(),
            constructor_args: vec![],
        }
    }

    #[tokio::test]
    async fn missing_wallet_fails_before_any_network_access() {
        let mut connector = MockConnect::new();
        connector.expect_connect().never();
        let mut artifacts = MockArtifactStore::new();
        artifacts.expect_read_artifact().never();

        let result = deployment(Wallet::default(), Arc::new(artifacts), connector, None)
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Configuration(account::Error::NoWallet)));
        assert_eq!(err.to_string(), "No Wallet Client Found");
    }

    #[tokio::test]
    async fn missing_artifact_fails_before_any_network_access() {
        let mut connector = MockConnect::new();
        connector.expect_connect().never();
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_read_artifact()
            .returning(|name| Err(artifact::Error::NotFound(name.to_string())));

        let result = deployment(wallet(), Arc::new(artifacts), connector, None)
            .run()
            .await;

        assert!(matches!(
            result,
            Err(Error::Artifact(artifact::Error::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn verification_failure_does_not_fail_the_deployment() {
        let connector = connector(
            Bytes::from(vec![0x60, 0x01]),
            receipt(Some(DEPLOYED), true),
        );
        let mut verifier = MockVerify::new();
        verifier
            .expect_verify()
            .withf(|request| {
                request.address == DEPLOYED
                    && request.chain_id == 31337
                    && request.constructor_args.is_empty()
            })
            .times(1)
            .returning(|_| Err(anyhow!("network timeout")));

        let abi = json!([{
            "type": "function",
            "name": "play",
            "inputs": [],
            "outputs": [],
            "stateMutability": "nonpayable",
        }]);

        let deployed = deployment(wallet(), artifacts(abi), connector, Some(verifier))
            .run()
            .await
            .unwrap();

        assert_eq!(
            deployed,
            Deployed {
                deployer: DEPLOYER,
                tx_hash: TX_HASH,
                address: DEPLOYED,
                verification: VerificationOutcome::Failed("network timeout".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn missing_contract_address_fails_without_verification() {
        let connector = connector(Bytes::from(vec![0x60, 0x01]), receipt(None, true));
        let mut verifier = MockVerify::new();
        verifier.expect_verify().never();

        let err = deployment(wallet(), artifacts(json!([])), connector, Some(verifier))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeploymentFailed { tx_hash } if tx_hash == TX_HASH));
        assert_eq!(err.to_string(), "Contract Deployment Failed");
    }

    #[tokio::test]
    async fn reverted_deployment_fails_without_verification() {
        let connector = connector(
            Bytes::from(vec![0x60, 0x01]),
            receipt(Some(DEPLOYED), false),
        );
        let mut verifier = MockVerify::new();
        verifier.expect_verify().never();

        let result = deployment(wallet(), artifacts(json!([])), connector, Some(verifier))
            .run()
            .await;

        assert!(matches!(result, Err(Error::DeploymentFailed { .. })));
    }

    #[tokio::test]
    async fn submission_error_is_fatal() {
        let mut chain = MockChain::new();
        chain
            .expect_submit_deployment()
            .returning(|_, _| Err(anyhow!("insufficient funds")));
        chain.expect_wait_for_receipt().never();
        let chain: Arc<dyn Chain> = Arc::new(chain);
        let mut connector = MockConnect::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(chain.clone()));

        let result = deployment(wallet(), artifacts(json!([])), connector, None)
            .run()
            .await;

        assert!(matches!(result, Err(Error::Submission(_))));
    }

    #[tokio::test]
    async fn constructor_arguments_are_appended_to_bytecode() {
        let abi = json!([{
            "type": "constructor",
            "inputs": [{"name": "rounds", "type": "uint8", "internalType": "uint8"}],
            "stateMutability": "nonpayable",
        }]);
        let mut encoded = vec![0u8; 32];
        encoded[31] = 3;
        let mut code = vec![0x60, 0x01];
        code.extend_from_slice(&encoded);
        let connector = connector(Bytes::from(code), receipt(Some(DEPLOYED), true));
        let mut verifier = MockVerify::new();
        verifier
            .expect_verify()
            .withf(move |request| request.constructor_args == Bytes::from(encoded.clone()))
            .times(1)
            .returning(|_| Ok(VerificationOutcome::Verified));

        let mut deployment = deployment(wallet(), artifacts(abi), connector, Some(verifier));
        deployment.constructor_args = vec![json!(3)];
        let deployed = deployment.run().await.unwrap();

        assert_eq!(deployed.verification, VerificationOutcome::Verified);
    }

    #[tokio::test]
    async fn invalid_constructor_arguments_fail_before_connecting() {
        let mut connector = MockConnect::new();
        connector.expect_connect().never();

        let mut deployment = deployment(wallet(), artifacts(json!([])), connector, None);
        deployment.constructor_args = vec![json!("unexpected")];
        let result = deployment.run().await;

        assert!(matches!(result, Err(Error::ConstructorArguments(_))));
    }

    #[tokio::test]
    async fn no_verifier_means_skipped() {
        let connector = connector(
            Bytes::from(vec![0x60, 0x01]),
            receipt(Some(DEPLOYED), true),
        );

        let deployed = deployment(wallet(), artifacts(json!([])), connector, None)
            .run()
            .await
            .unwrap();

        assert_eq!(deployed.verification, VerificationOutcome::Skipped);
    }
}
