use {
    alloy::{
        primitives::Address,
        signers::local::{LocalSignerError, MnemonicBuilder, PrivateKeySigner, coins_bip39::English},
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("No Wallet Client Found")]
    NoWallet,

    #[error("failed to derive account {index} from mnemonic")]
    Mnemonic {
        index: u32,
        #[source]
        source: LocalSignerError,
    },
}

/// Signers configured for a run. The first one sends the deployment
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct Wallet {
    signers: Vec<PrivateKeySigner>,
}

impl Wallet {
    pub fn new(signers: Vec<PrivateKeySigner>) -> Self {
        Self { signers }
    }

    /// Collects the explicitly configured private keys followed by the account
    /// derived from `mnemonic` at `index`, if a mnemonic is configured.
    pub fn from_arguments(
        private_keys: &[PrivateKeySigner],
        mnemonic: Option<&str>,
        index: u32,
    ) -> Result<Self, Error> {
        let mut signers = private_keys.to_vec();
        if let Some(phrase) = mnemonic {
            let signer = MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|source| Error::Mnemonic { index, source })?;
            signers.push(signer);
        }
        Ok(Self::new(signers))
    }

    /// The signer used for the deployment.
    pub fn first(&self) -> Result<&PrivateKeySigner, Error> {
        self.signers.first().ok_or(Error::NoWallet)
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.signers.iter().map(|signer| signer.address())
    }
}
