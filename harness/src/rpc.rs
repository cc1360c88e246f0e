//! Access to the local validator.

use {
    playground_runner_error::error::RunnerError,
    serde::Serialize,
    serde_json::Value,
    std::{
        fmt, thread,
        time::{Duration, Instant},
    },
    trezoa_account::Account,
    trezoa_commitment_config::CommitmentConfig,
    trezoa_hash::Hash,
    trezoa_pubkey::Pubkey,
    trezoa_rpc_client::rpc_client::RpcClient,
    trezoa_rpc_client_api::{
        client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
        config::RpcTransactionConfig,
        request::{RpcError, RpcResponseErrorData},
    },
    trezoa_signature::Signature,
    trezoa_transaction::Transaction,
    trezoa_transaction_status_client_types::UiTransactionEncoding,
};

/// Per-call HTTP timeout of the RPC client.
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution metadata of a confirmed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionMeta {
    pub logs: Vec<String>,
    pub compute_units: u64,
    /// Rendered on-chain error, when the transaction failed.
    pub err: Option<String>,
}

/// Status of a submitted signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet seen at the requested commitment.
    Pending,
    Confirmed,
    /// Landed, but failed with this error.
    Failed(String),
}

/// The validator operations the engine relies on.
pub trait ChainClient: Send {
    /// Succeeds when the endpoint reports itself healthy.
    fn health(&self) -> Result<(), RunnerError>;

    /// Fetch an account, or `None` if nothing lives at the address.
    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, RunnerError>;

    fn latest_blockhash(&self) -> Result<Hash, RunnerError>;

    /// Request an airdrop, returning the airdrop transaction's signature.
    fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, RunnerError>;

    /// Submit a signed transaction and block until it is confirmed.
    ///
    /// A transaction rejected in preflight simulation, or one that landed and
    /// failed, is reported as `RunnerError::TransactionFailed`. Preflight
    /// rejections carry the simulation's logs.
    fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, RunnerError>;

    fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RunnerError>;

    /// Fetch the metadata of a confirmed transaction, if it is available yet.
    fn get_transaction(&self, signature: &Signature)
        -> Result<Option<TransactionMeta>, RunnerError>;
}

/// Poll `signature` until it is confirmed, it fails, or `timeout` elapses.
pub fn wait_for_confirmation(
    client: &dyn ChainClient,
    signature: &Signature,
    timeout: Duration,
) -> Result<(), RunnerError> {
    let deadline = Instant::now() + timeout;
    loop {
        match client.signature_status(signature)? {
            SignatureStatus::Confirmed => return Ok(()),
            SignatureStatus::Failed(reason) => {
                let logs = client
                    .get_transaction(signature)?
                    .map(|meta| meta.logs)
                    .unwrap_or_default();
                return Err(RunnerError::TransactionFailed { reason, logs });
            }
            SignatureStatus::Pending if Instant::now() >= deadline => {
                return Err(RunnerError::Rpc(format!(
                    "Transaction {signature} was not confirmed within {}ms",
                    timeout.as_millis()
                )));
            }
            SignatureStatus::Pending => thread::sleep(Duration::from_millis(250)),
        }
    }
}

/// Render an on-chain error the way the validator reports it over JSON-RPC.
fn render_error<E: Serialize + fmt::Debug>(err: &E) -> String {
    match serde_json::to_value(err) {
        Ok(Value::String(text)) => text,
        Ok(value) => value.to_string(),
        Err(_) => format!("{err:?}"),
    }
}

fn client_error(err: ClientError) -> RunnerError {
    match err.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
            RunnerError::ValidatorUnavailable(err.to_string())
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            message,
            data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
            ..
        }) => RunnerError::TransactionFailed {
            reason: message.clone(),
            logs: simulation.logs.clone().unwrap_or_default(),
        },
        ClientErrorKind::TransactionError(failure) => RunnerError::TransactionFailed {
            reason: render_error(failure),
            logs: Vec::new(),
        },
        _ => RunnerError::Rpc(err.to_string()),
    }
}

/// `ChainClient` backed by a blocking `RpcClient` at `confirmed` commitment.
///
/// The client owns an async runtime, so it must be created and dropped off
/// any async executor thread.
pub struct ValidatorClient {
    rpc: RpcClient,
}

impl ValidatorClient {
    /// Connect to `url`, waiting up to `confirm_timeout` for submitted
    /// transactions to be confirmed.
    pub fn new(url: impl ToString, confirm_timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_timeouts_and_commitment(
                url,
                RPC_REQUEST_TIMEOUT,
                CommitmentConfig::confirmed(),
                confirm_timeout,
            ),
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

impl ChainClient for ValidatorClient {
    fn health(&self) -> Result<(), RunnerError> {
        self.rpc
            .get_health()
            .map_err(|err| RunnerError::ValidatorUnavailable(err.to_string()))
    }

    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, RunnerError> {
        self.rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .map(|response| response.value)
            .map_err(client_error)
    }

    fn latest_blockhash(&self) -> Result<Hash, RunnerError> {
        self.rpc.get_latest_blockhash().map_err(client_error)
    }

    fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, RunnerError> {
        self.rpc.request_airdrop(to, lamports).map_err(client_error)
    }

    fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, RunnerError> {
        self.rpc
            .send_and_confirm_transaction(transaction)
            .map_err(client_error)
    }

    fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RunnerError> {
        let status = self
            .rpc
            .get_signature_status_with_commitment(signature, self.rpc.commitment())
            .map_err(client_error)?;
        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(err)) => SignatureStatus::Failed(render_error(&err)),
        })
    }

    fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionMeta>, RunnerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.rpc.commitment()),
            max_supported_transaction_version: Some(0),
        };
        let confirmed = match self.rpc.get_transaction_with_config(signature, config) {
            Ok(confirmed) => confirmed,
            // The node answers `null` for a transaction it has not seen yet.
            Err(err) if matches!(err.kind(), ClientErrorKind::SerdeJson(_)) => return Ok(None),
            Err(err) => return Err(client_error(err)),
        };
        Ok(confirmed.transaction.meta.map(|meta| TransactionMeta {
            logs: Option::from(meta.log_messages).unwrap_or_default(),
            compute_units: Option::from(meta.compute_units_consumed).unwrap_or_default(),
            err: meta.err.as_ref().map(render_error),
        }))
    }
}
