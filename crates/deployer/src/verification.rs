//! Source verification of deployed contracts with a block explorer.
//!
//! Verification is best effort: callers log failures and carry on, a deployed
//! contract stays deployed no matter what the explorer says.

use {
    crate::artifact::{Artifact, ArtifactStore},
    alloy::primitives::{Address, Bytes},
    anyhow::{Context, Result, anyhow, bail},
    explorer_api::{
        BlockExplorerApi,
        Guid,
        Submission,
        VerificationStatus,
        VerifySourceRequest,
    },
    std::{sync::Arc, time::Duration},
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
    /// Verification was disabled for this run.
    Skipped,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct VerificationRequest {
    pub chain_id: u64,
    pub address: Address,
    pub artifact: Artifact,
    /// ABI encoded constructor arguments the contract was deployed with.
    pub constructor_args: Bytes,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Verify: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome>;
}

/// Verifies contracts through an Etherscan compatible explorer API.
pub struct ExplorerVerifier {
    pub api: Arc<dyn BlockExplorerApi>,
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Delay between status polls and between submissions while the explorer
    /// has not indexed the contract yet.
    pub poll_interval: Duration,
    /// Bound for both status polls and submission attempts.
    pub max_attempts: u32,
}

impl ExplorerVerifier {
    async fn submit(&self, request: &VerifySourceRequest) -> Result<Submission> {
        let mut attempt = 1;
        loop {
            match self.api.submit_verification(request).await {
                Err(explorer_api::Error::ContractNotIndexed(reason))
                    if attempt < self.max_attempts =>
                {
                    tracing::debug!(
                        attempt,
                        %reason,
                        "explorer has not indexed the contract yet"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    attempt += 1;
                }
                result => return result.context("failed to submit source code"),
            }
        }
    }

    async fn wait_for_result(&self, chain_id: u64, guid: &Guid) -> Result<VerificationOutcome> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;
            let status = self
                .api
                .verification_status(chain_id, guid)
                .await
                .context("failed to check verification status")?;
            match status {
                VerificationStatus::Pending => {
                    tracing::debug!(attempt, %guid, "verification pending");
                }
                VerificationStatus::Verified => return Ok(VerificationOutcome::Verified),
                VerificationStatus::AlreadyVerified => {
                    return Ok(VerificationOutcome::AlreadyVerified);
                }
                VerificationStatus::Failed(reason) => {
                    return Ok(VerificationOutcome::Failed(reason));
                }
            }
        }
        bail!(
            "verification {guid} still pending after {} attempts",
            self.max_attempts
        )
    }
}

#[async_trait::async_trait]
impl Verify for ExplorerVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let build_info = self
            .artifacts
            .read_build_info(&request.artifact)
            .context("failed to read build info")?;

        let verified = self
            .api
            .is_verified(request.chain_id, request.address)
            .await
            .context("failed to check whether the contract is verified")?;
        if verified {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        let submission = VerifySourceRequest {
            chain_id: request.chain_id,
            address: request.address,
            source_code: serde_json::to_string(&build_info.input)?,
            contract_name: request.artifact.fully_qualified_name(),
            compiler_version: build_info.compiler_version(),
            constructor_arguments: request.constructor_args.clone(),
        };
        match self.submit(&submission).await? {
            Submission::AlreadyVerified => Ok(VerificationOutcome::AlreadyVerified),
            Submission::Accepted(guid) => {
                tracing::info!(%guid, "source code submitted for verification");
                self.wait_for_result(request.chain_id, &guid).await
            }
        }
    }
}

/// Stands in for a verifier that could not be configured, so the problem is
/// reported like any other verification failure.
pub struct Unavailable(pub String);

#[async_trait::async_trait]
impl Verify for Unavailable {
    async fn verify(&self, _: &VerificationRequest) -> Result<VerificationOutcome> {
        Err(anyhow!("verification unavailable: {}", self.0))
    }
}
