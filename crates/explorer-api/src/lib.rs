//! Client for the contract source verification API of Etherscan compatible
//! block explorers.
//!
//! See <https://docs.etherscan.io/api-reference/endpoint/verifysourcecode>.

use {
    alloy::primitives::{Address, Bytes},
    reqwest::{Client, header::CONTENT_TYPE},
    serde::Deserialize,
    std::fmt::{self, Display, Formatter},
    thiserror::Error,
    url::Url,
};

/// Identifier the explorer hands out for a queued verification request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Guid(pub String);

impl Display for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the explorer needs to recompile and match a deployed contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerifySourceRequest {
    pub chain_id: u64,
    pub address: Address,
    /// Solidity standard JSON compiler input, serialized.
    pub source_code: String,
    /// Fully qualified name, e.g. `contracts/Token.sol:Token`.
    pub contract_name: String,
    /// Compiler version in the explorer's format, e.g. `v0.8.24+commit.e11b9ed9`.
    pub compiler_version: String,
    /// ABI encoded constructor arguments.
    pub constructor_arguments: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submission {
    Accepted(Guid),
    AlreadyVerified,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
    Failed(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// The explorer has not indexed the contract's bytecode yet. Retrying
    /// after a short delay usually helps.
    #[error("explorer has not indexed the contract yet: {0}")]
    ContractNotIndexed(String),

    #[error("explorer responded with {message}: {result}")]
    Api { message: String, result: String },

    #[error("Error({0}) for response {1}")]
    Deserialize(serde_json::Error, String),

    // Recovered Response but failed on async call of response.text()
    #[error(transparent)]
    TextFetch(reqwest::Error),

    // Connectivity or non-response error
    #[error("Failed on send")]
    Send(reqwest::Error),
}

/// Abstract block explorer API. Provides a mockable implementation.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait BlockExplorerApi: Send + Sync {
    /// Returns whether the explorer already has verified source code for the
    /// contract at `address`.
    async fn is_verified(&self, chain_id: u64, address: Address) -> Result<bool, Error>;

    /// Queues a source verification request.
    async fn submit_verification(
        &self,
        request: &VerifySourceRequest,
    ) -> Result<Submission, Error>;

    /// Retrieves the state of a previously queued verification request.
    async fn verification_status(
        &self,
        chain_id: u64,
        guid: &Guid,
    ) -> Result<VerificationStatus, Error>;
}

/// Etherscan (v2, multichain) API client implementation.
#[derive(Debug)]
pub struct EtherscanApi {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl EtherscanApi {
    /// Default Etherscan API URL.
    pub const DEFAULT_URL: &'static str = "https://api.etherscan.io/v2/api";

    pub fn new(base_url: Url, api_key: String, client: Client) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn url(&self, chain_id: u64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("chainid", &chain_id.to_string());
        url
    }

    async fn get(&self, chain_id: u64, params: &[(&str, &str)]) -> Result<Envelope, Error> {
        let mut url = self.url(chain_id);
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("apikey", &self.api_key);
        self.send(self.client.get(url), params).await
    }

    async fn post(&self, chain_id: u64, params: &[(&str, &str)]) -> Result<Envelope, Error> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .append_pair("apikey", &self.api_key)
            .finish();
        let request = self
            .client
            .post(self.url(chain_id))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        self.send(request, params).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        params: &[(&str, &str)],
    ) -> Result<Envelope, Error> {
        // The url carries the api key, so only the action gets logged.
        let action = params
            .iter()
            .find_map(|(key, value)| (*key == "action").then_some(*value))
            .unwrap_or_default();
        tracing::debug!(action, "querying explorer API");

        let response_text = request
            .send()
            .await
            .map_err(Error::Send)?
            .text()
            .await
            .map_err(Error::TextFetch)?;
        tracing::debug!(action, response = %response_text, "response from explorer API");

        serde_json::from_str(&response_text)
            .map_err(|err| Error::Deserialize(err, response_text))
    }
}

#[async_trait::async_trait]
impl BlockExplorerApi for EtherscanApi {
    async fn is_verified(&self, chain_id: u64, address: Address) -> Result<bool, Error> {
        let address = address.to_string();
        let envelope = self
            .get(
                chain_id,
                &[
                    ("module", "contract"),
                    ("action", "getsourcecode"),
                    ("address", address.as_str()),
                ],
            )
            .await?;
        envelope.into_is_verified()
    }

    async fn submit_verification(
        &self,
        request: &VerifySourceRequest,
    ) -> Result<Submission, Error> {
        let address = request.address.to_string();
        let constructor_arguments =
            alloy::primitives::hex::encode(&request.constructor_arguments);
        let envelope = self
            .post(
                request.chain_id,
                &[
                    ("module", "contract"),
                    ("action", "verifysourcecode"),
                    ("contractaddress", address.as_str()),
                    ("sourceCode", request.source_code.as_str()),
                    ("codeformat", "solidity-standard-json-input"),
                    ("contractname", request.contract_name.as_str()),
                    ("compilerversion", request.compiler_version.as_str()),
                    // The misspelling is part of the API.
                    ("constructorArguements", constructor_arguments.as_str()),
                ],
            )
            .await?;
        envelope.into_submission()
    }

    async fn verification_status(
        &self,
        chain_id: u64,
        guid: &Guid,
    ) -> Result<VerificationStatus, Error> {
        let envelope = self
            .get(
                chain_id,
                &[
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid.0.as_str()),
                ],
            )
            .await?;
        envelope.into_verification_status()
    }
}

/// Response shape shared by all explorer endpoints. `result` is a string for
/// errors and most actions, but a list of records for `getsourcecode`.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceCodeRecord {
    #[serde(default)]
    source_code: String,
}

impl Envelope {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }

    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    fn into_api_error(self) -> Error {
        let result = self.result_text();
        let lowercase = result.to_lowercase();
        if lowercase.contains("unable to locate contractcode")
            || lowercase.contains("does not have bytecode")
        {
            return Error::ContractNotIndexed(result);
        }
        Error::Api {
            message: self.message,
            result,
        }
    }

    fn into_is_verified(self) -> Result<bool, Error> {
        if !self.is_ok() {
            return Err(self.into_api_error());
        }
        let records: Vec<SourceCodeRecord> = serde_json::from_value(self.result.clone())
            .map_err(|err| Error::Deserialize(err, self.result.to_string()))?;
        Ok(records
            .iter()
            .any(|record| !record.source_code.trim().is_empty()))
    }

    fn into_submission(self) -> Result<Submission, Error> {
        let result = self.result_text();
        if self.is_ok() {
            return Ok(Submission::Accepted(Guid(result)));
        }
        if is_already_verified(&result) {
            return Ok(Submission::AlreadyVerified);
        }
        Err(self.into_api_error())
    }

    fn into_verification_status(self) -> Result<VerificationStatus, Error> {
        let result = self.result_text();
        if result == "Pending in queue" {
            return Ok(VerificationStatus::Pending);
        }
        if result == "Pass - Verified" {
            return Ok(VerificationStatus::Verified);
        }
        if is_already_verified(&result) {
            return Ok(VerificationStatus::AlreadyVerified);
        }
        if result.starts_with("Fail") {
            return Ok(VerificationStatus::Failed(result));
        }
        Err(self.into_api_error())
    }
}

fn is_already_verified(result: &str) -> bool {
    let result = result.to_lowercase();
    result.contains("already verified")
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn envelope(value: serde_json::Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn accepted_submission_carries_guid() {
        let response = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn",
        }));
        assert_eq!(
            response.into_submission().unwrap(),
            Submission::Accepted(Guid(
                "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn".to_string()
            )),
        );
    }

    #[test]
    fn already_verified_submission_is_not_an_error() {
        let response = envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Contract source code already verified",
        }));
        assert_eq!(
            response.into_submission().unwrap(),
            Submission::AlreadyVerified
        );
    }

    #[test]
    fn unindexed_contract_is_reported_separately() {
        let response = envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Unable to locate ContractCode at 0xbeef",
        }));
        assert!(matches!(
            response.into_submission(),
            Err(Error::ContractNotIndexed(_))
        ));
    }

    #[test]
    fn rejected_submission_keeps_explorer_message() {
        let response = envelope(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key",
        }));
        match response.into_submission() {
            Err(Error::Api { message, result }) => {
                assert_eq!(message, "NOTOK");
                assert_eq!(result, "Invalid API Key");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn verification_status_texts() {
        let status = |status: &str, result: &str| {
            envelope(json!({"status": status, "message": "", "result": result}))
                .into_verification_status()
        };

        assert_eq!(
            status("0", "Pending in queue").unwrap(),
            VerificationStatus::Pending
        );
        assert_eq!(
            status("1", "Pass - Verified").unwrap(),
            VerificationStatus::Verified
        );
        assert_eq!(
            status("1", "Already Verified").unwrap(),
            VerificationStatus::AlreadyVerified
        );
        assert_eq!(
            status("0", "Fail - Unable to verify").unwrap(),
            VerificationStatus::Failed("Fail - Unable to verify".to_string())
        );
        assert!(matches!(
            status("0", "Max rate limit reached"),
            Err(Error::Api { .. })
        ));
    }

    #[test]
    fn source_code_presence_means_verified() {
        let verified = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [{"SourceCode": "pragma solidity ^0.8.0;", "ContractName": "Token"}],
        }));
        assert!(verified.into_is_verified().unwrap());

        let unverified = envelope(json!({
            "status": "1",
            "message": "OK",
            "result": [{"SourceCode": "", "ABI": "Contract source code not verified"}],
        }));
        assert!(!unverified.into_is_verified().unwrap());
    }

    #[test]
    fn requests_go_to_the_configured_chain() {
        let api = EtherscanApi::new(
            "https://explorer.example/api?network=test".parse().unwrap(),
            "KEY".to_string(),
            Client::new(),
        );
        assert_eq!(
            api.url(11155111).as_str(),
            "https://explorer.example/api?network=test&chainid=11155111"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn etherscan_e2e() {
        let api_key = std::env::var("EXPLORER_API_KEY").unwrap();
        let api = EtherscanApi::new(
            EtherscanApi::DEFAULT_URL.parse().unwrap(),
            api_key,
            Client::new(),
        );
        // WETH9 on mainnet.
        let weth = alloy::primitives::address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        let verified = api.is_verified(1, weth).await;
        dbg!(&verified);
        assert!(verified.unwrap());
    }
}
