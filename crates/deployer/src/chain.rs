//! Trait definitions for the network boundary.
//!
//! These traits abstract the node interactions of a deployment to enable
//! unit testing with mocks.

use {
    alloy::{
        network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
        primitives::{Address, Bytes, TxHash},
        providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
        rpc::{client::ClientBuilder, types::TransactionRequest},
        signers::local::PrivateKeySigner,
    },
    anyhow::{Context, Result},
    std::{sync::Arc, time::Duration},
    url::Url,
};

/// The parts of a transaction receipt a deployment cares about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploymentReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub success: bool,
    pub gas_used: u64,
}

impl DeploymentReceipt {
    /// Address of the created contract. The zero address counts as missing.
    pub fn deployed_address(&self) -> Option<Address> {
        self.contract_address.filter(|address| !address.is_zero())
    }
}

/// Network client bound to the signer of the deployment.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Chain: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// Signs and broadcasts a contract creation transaction. There is no
    /// retry: once this returns, the transaction might be mined regardless of
    /// what happens afterwards.
    async fn submit_deployment(&self, from: Address, code: Bytes) -> Result<TxHash>;

    /// Blocks until the transaction is mined.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<DeploymentReceipt>;
}

/// Creates a [`Chain`] for a resolved signer.
#[cfg_attr(test, mockall::automock)]
pub trait Connect: Send + Sync {
    fn connect(&self, signer: PrivateKeySigner) -> Result<Arc<dyn Chain>>;
}

/// Connects to a JSON-RPC node over HTTP.
#[derive(Clone, Debug)]
pub struct NodeConnector {
    pub url: Url,
    pub confirmations: u64,
    /// Unbounded if `None`.
    pub receipt_timeout: Option<Duration>,
}

impl Connect for NodeConnector {
    fn connect(&self, signer: PrivateKeySigner) -> Result<Arc<dyn Chain>> {
        let rpc = ClientBuilder::default().http(self.url.clone());
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::new(signer))
            .connect_client(rpc)
            .erased();
        Ok(Arc::new(AlloyChain {
            provider,
            confirmations: self.confirmations,
            receipt_timeout: self.receipt_timeout,
        }))
    }
}

pub struct AlloyChain {
    provider: DynProvider,
    confirmations: u64,
    receipt_timeout: Option<Duration>,
}

#[async_trait::async_trait]
impl Chain for AlloyChain {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .context("could not fetch current chain id")
    }

    async fn submit_deployment(&self, from: Address, code: Bytes) -> Result<TxHash> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_deploy_code(code);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .context("node rejected the deployment transaction")?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<DeploymentReceipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(self.confirmations)
            .with_timeout(self.receipt_timeout)
            .get_receipt()
            .await
            .with_context(|| format!("failed to wait for receipt of {tx_hash}"))?;
        Ok(DeploymentReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            success: ReceiptResponse::status(&receipt),
            gas_used: receipt.gas_used,
        })
    }
}
