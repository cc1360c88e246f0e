//! Account snapshots taken around an invocation.

use {
    crate::{accounts::AccountLabel, interface::ProgramInterface, rpc::ChainClient},
    playground_runner_error::error::RunnerError,
    playground_runner_result::AccountSnapshot,
    trezoa_pubkey::Pubkey,
};

pub use playground_runner_result::compute_state_diff;

/// Reads account state from the validator, decoding data owned by the
/// program under test when its interface is known.
pub struct StateCapture<'a> {
    client: &'a dyn ChainClient,
    program: Option<(&'a Pubkey, &'a ProgramInterface)>,
}

impl<'a> StateCapture<'a> {
    pub fn new(client: &'a dyn ChainClient) -> Self {
        Self {
            client,
            program: None,
        }
    }

    /// Decode data of accounts owned by `program_id` using `interface`.
    pub fn with_interface(mut self, program_id: &'a Pubkey, interface: &'a ProgramInterface) -> Self {
        self.program = Some((program_id, interface));
        self
    }

    /// Snapshot one address. An address with no account yields a zeroed
    /// snapshot owned by the system program.
    pub fn capture_account_state(
        &self,
        address: &Pubkey,
        label: &str,
    ) -> Result<AccountSnapshot, RunnerError> {
        let Some(account) = self.client.get_account(address)? else {
            return Ok(AccountSnapshot::empty(address.to_string(), label));
        };
        let data = self
            .program
            .filter(|(program_id, _)| account.owner == **program_id)
            .and_then(|(_, interface)| interface.decode_account(&account.data));
        Ok(AccountSnapshot {
            address: address.to_string(),
            label: label.to_string(),
            owner: account.owner.to_string(),
            lamports: account.lamports,
            data_size: account.data.len() as u64,
            data,
        })
    }

    /// Snapshot several addresses, in order.
    pub fn capture_multiple_accounts(
        &self,
        accounts: &[AccountLabel],
    ) -> Result<Vec<AccountSnapshot>, RunnerError> {
        accounts
            .iter()
            .map(|account| self.capture_account_state(&account.address, &account.label))
            .collect()
    }
}
