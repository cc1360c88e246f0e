//! Building, signing and submitting single-instruction transactions.

use {
    crate::{
        accounts::ResolvedAccounts,
        interface::{InstructionDef, ProgramInterface},
        rpc::ChainClient,
    },
    playground_runner_error::error::RunnerError,
    serde_json::Value,
    std::sync::Arc,
    trezoa_hash::Hash,
    trezoa_instruction::{AccountMeta, Instruction},
    trezoa_keypair::Keypair,
    trezoa_message::Message,
    trezoa_pubkey::Pubkey,
    trezoa_signature::Signature,
    trezoa_signer::Signer,
    trezoa_transaction::Transaction,
};

/// What a landed transaction produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub signature: Signature,
    pub logs: Vec<String>,
    pub compute_units: u64,
}

/// Build the instruction for `definition`, taking addresses from `resolved`
/// and encoding `args` against the declared arguments.
pub fn build_instruction(
    interface: &ProgramInterface,
    definition: &InstructionDef,
    program_id: &Pubkey,
    resolved: &ResolvedAccounts,
    args: &[Value],
) -> Result<Instruction, RunnerError> {
    let accounts = definition
        .accounts
        .iter()
        .map(|account| {
            let pubkey = match resolved.get(&account.name) {
                Some(pubkey) => pubkey,
                None if account.optional => return Ok(AccountMeta::new_readonly(*program_id, false)),
                None => {
                    return Err(RunnerError::AccountResolutionFailed(format!(
                        "no address resolved for \"{}\" of \"{}\"",
                        account.name, definition.name
                    )))
                }
            };
            Ok(if account.writable {
                AccountMeta::new(pubkey, account.signer)
            } else {
                AccountMeta::new_readonly(pubkey, account.signer)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data = interface.encode_instruction_data(definition, args)?;
    Ok(Instruction::new_with_bytes(*program_id, &data, accounts))
}

/// Compile and sign a legacy transaction paid for by `payer`.
///
/// Every required signer of the compiled message must be among `signers`.
/// Signers the message does not need are left out.
pub fn sign_transaction(
    instructions: &[Instruction],
    payer: &Pubkey,
    signers: &[Arc<Keypair>],
    blockhash: Hash,
) -> Result<Transaction, RunnerError> {
    let message = Message::new_with_blockhash(instructions, Some(payer), &blockhash);
    let required = message.header.num_required_signatures as usize;
    let keypairs = message.account_keys[..required]
        .iter()
        .map(|key| {
            signers
                .iter()
                .find(|signer| signer.pubkey() == *key)
                .map(Arc::clone)
                .ok_or_else(|| {
                    RunnerError::AccountResolutionFailed(format!("no signer available for {key}"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut transaction = Transaction::new_unsigned(message);
    transaction
        .try_sign(&keypairs, blockhash)
        .map_err(|err| RunnerError::AccountResolutionFailed(err.to_string()))?;
    Ok(transaction)
}

/// Submit one instruction signed by the resolved signers, wait for it to be
/// confirmed, and fetch its logs and compute units.
pub fn send_instruction(
    client: &dyn ChainClient,
    interface: &ProgramInterface,
    program_id: &Pubkey,
    instruction_name: &str,
    resolved: &ResolvedAccounts,
    args: &[Value],
) -> Result<InvocationOutcome, RunnerError> {
    let definition = interface.instruction(instruction_name)?;
    let instruction = build_instruction(interface, definition, program_id, resolved, args)?;

    let blockhash = client.latest_blockhash()?;
    let payer = resolved.payer().pubkey();
    let transaction = sign_transaction(&[instruction], &payer, resolved.signers(), blockhash)?;

    log::debug!("Sending \"{}\" to {program_id}", definition.name);
    let signature = match client.send_and_confirm_transaction(&transaction) {
        Ok(signature) => signature,
        // Landed but failed: the logs are on chain.
        Err(RunnerError::TransactionFailed { reason, logs }) if logs.is_empty() => {
            let logs = match transaction.signatures.first() {
                Some(signature) => client
                    .get_transaction(signature)?
                    .map(|meta| meta.logs)
                    .unwrap_or_default(),
                None => logs,
            };
            return Err(RunnerError::TransactionFailed { reason, logs });
        }
        Err(err) => return Err(err),
    };

    let meta = client.get_transaction(&signature)?.unwrap_or_default();
    if let Some(reason) = meta.err {
        return Err(RunnerError::TransactionFailed {
            reason,
            logs: meta.logs,
        });
    }
    Ok(InvocationOutcome {
        signature,
        logs: meta.logs,
        compute_units: meta.compute_units,
    })
}
