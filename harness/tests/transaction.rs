mod common;

use {
    common::*,
    playground_runner::{
        accounts::resolve_accounts,
        interface::{instruction_discriminator, ProgramInterface},
        rpc::{wait_for_confirmation, ChainClient, SignatureStatus, TransactionMeta},
        session::ExecutionSession,
        transaction::{build_instruction, send_instruction, sign_transaction},
        RunnerError,
    },
    serde_json::json,
    std::{collections::HashMap, sync::Arc, time::Duration},
    trezoa_account::Account,
    trezoa_hash::Hash,
    trezoa_instruction::AccountMeta,
    trezoa_message::Message,
    trezoa_pubkey::Pubkey,
    trezoa_signature::Signature,
    trezoa_signer::Signer,
    trezoa_transaction::Transaction,
};

fn program_id() -> Pubkey {
    Pubkey::new_from_array([9; 32])
}

#[test]
fn test_build_instruction() {
    let interface = ProgramInterface::from_json(&vault_idl().to_string()).unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &vault_template(), "deposit", &program_id(), &payer)
            .unwrap();
    let deposit = interface.instruction("deposit").unwrap();

    let instruction =
        build_instruction(&interface, deposit, &program_id(), &resolved, &[json!(10)]).unwrap();

    assert_eq!(instruction.program_id, program_id());
    assert_eq!(
        instruction.accounts,
        vec![
            AccountMeta::new(payer.pubkey(), true),
            AccountMeta::new(resolved.get("vault").unwrap(), false),
            AccountMeta::new_readonly(trezoa_sdk_ids::system_program::id(), false),
        ]
    );
    let mut data = instruction_discriminator("deposit").to_vec();
    data.extend_from_slice(&10u64.to_le_bytes());
    assert_eq!(instruction.data, data);
}

#[test]
fn test_build_instruction_optional_and_missing_accounts() {
    let interface = ProgramInterface::from_json(
        &json!({
            "instructions": [{
                "name": "close",
                "accounts": [
                    { "name": "user", "writable": true, "signer": true },
                    { "name": "referrer", "optional": true },
                    { "name": "destination", "writable": true }
                ],
                "args": []
            }]
        })
        .to_string(),
    )
    .unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let mut template = hello_template();
    template.program_map.instructions.push(instruction(
        "close",
        vec![account("user", true, true), account("destination", true, false)],
    ));
    let resolved =
        resolve_accounts(&mut session, &template, "close", &program_id(), &payer).unwrap();
    let close = interface.instruction("close").unwrap();

    let built = build_instruction(&interface, close, &program_id(), &resolved, &[]).unwrap();
    // The program id stands in for the omitted optional account.
    assert_eq!(
        built.accounts[1],
        AccountMeta::new_readonly(program_id(), false)
    );

    // A required account with no address is an error.
    let mut template = hello_template();
    template
        .program_map
        .instructions
        .push(instruction("close", vec![account("user", true, true)]));
    let resolved =
        resolve_accounts(&mut session, &template, "close", &program_id(), &payer).unwrap();
    let err = build_instruction(&interface, close, &program_id(), &resolved, &[]).unwrap_err();
    assert!(matches!(err, RunnerError::AccountResolutionFailed(_)));
}

#[test]
fn test_sign_transaction() {
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &account_init_template(), "initialize", &program_id(), &payer)
            .unwrap();
    let interface = ProgramInterface::from_json(&account_init_idl().to_string()).unwrap();
    let initialize = interface.instruction("initialize").unwrap();
    let instruction =
        build_instruction(&interface, initialize, &program_id(), &resolved, &[json!(1)]).unwrap();
    let blockhash = Hash::new_from_array([3; 32]);

    let transaction = sign_transaction(
        &[instruction.clone()],
        &payer.pubkey(),
        resolved.signers(),
        blockhash,
    )
    .unwrap();

    let message = &transaction.message;
    assert_eq!(
        *message,
        Message::new_with_blockhash(&[instruction.clone()], Some(&payer.pubkey()), &blockhash)
    );
    assert_eq!(message.account_keys[0], payer.pubkey());
    assert_eq!(message.header.num_required_signatures, 2);
    assert_eq!(transaction.signatures.len(), 2);
    assert!(transaction.is_signed());
    transaction.verify().unwrap();

    // Without the generated account's keypair the transaction cannot be
    // signed.
    let err = sign_transaction(
        &[instruction],
        &payer.pubkey(),
        &[Arc::clone(&payer)],
        blockhash,
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::AccountResolutionFailed(_)));
}

#[test]
fn test_send_instruction() {
    let chain = FakeChain::new();
    let interface = ProgramInterface::from_json(&hello_idl().to_string()).unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &hello_template(), "say_hello", &program_id(), &payer)
            .unwrap();

    let outcome = send_instruction(
        &chain,
        &interface,
        &program_id(),
        "say_hello",
        &resolved,
        &[],
    )
    .unwrap();

    assert_eq!(outcome.signature, chain.sent_transactions()[0].signatures[0]);
    assert_eq!(outcome.compute_units, 1200);
    assert_eq!(outcome.logs.len(), 4);

    // Unknown instructions never reach the chain.
    let err = send_instruction(
        &chain,
        &interface,
        &program_id(),
        "say_goodbye",
        &resolved,
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::InstructionNotFound(_)));
    assert_eq!(chain.sent().len(), 1);
}

#[test]
fn test_send_instruction_failing_on_chain() {
    let chain = FakeChain::new();
    chain.push_effect(|_: &Message, _: &mut HashMap<Pubkey, Account>| {
        Ok(TransactionMeta {
            logs: vec!["Program log: nope".to_string()],
            compute_units: 900,
            err: Some("InstructionError(0, Custom(6000))".to_string()),
        })
    });
    let interface = ProgramInterface::from_json(&hello_idl().to_string()).unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &hello_template(), "say_hello", &program_id(), &payer)
            .unwrap();

    let err = send_instruction(
        &chain,
        &interface,
        &program_id(),
        "say_hello",
        &resolved,
        &[],
    )
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Transaction failed: InstructionError(0, Custom(6000))"
    );
    assert_eq!(err.logs(), ["Program log: nope"]);
}

#[test]
fn test_send_instruction_rejected_in_preflight() {
    let chain = FakeChain::new();
    chain.push_effect(|_: &Message, _: &mut HashMap<Pubkey, Account>| {
        Err(RunnerError::TransactionFailed {
            reason: "Transaction simulation failed: Error processing Instruction 0".to_string(),
            logs: vec!["Program log: simulated".to_string()],
        })
    });
    let interface = ProgramInterface::from_json(&hello_idl().to_string()).unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &hello_template(), "say_hello", &program_id(), &payer)
            .unwrap();

    let err = send_instruction(&chain, &interface, &program_id(), "say_hello", &resolved, &[])
        .unwrap_err();

    assert_eq!(err.logs(), ["Program log: simulated"]);
    assert!(err.to_string().contains("Transaction simulation failed"));
}

/// A chain on which nothing ever confirms.
struct StuckChain;

impl ChainClient for StuckChain {
    fn health(&self) -> Result<(), RunnerError> {
        Ok(())
    }

    fn get_account(&self, _: &Pubkey) -> Result<Option<Account>, RunnerError> {
        Ok(None)
    }

    fn latest_blockhash(&self) -> Result<Hash, RunnerError> {
        Ok(Hash::new_from_array([0; 32]))
    }

    fn request_airdrop(&self, _: &Pubkey, _: u64) -> Result<Signature, RunnerError> {
        Ok(Signature::default())
    }

    fn send_and_confirm_transaction(&self, _: &Transaction) -> Result<Signature, RunnerError> {
        Err(RunnerError::Rpc("unable to confirm transaction".to_string()))
    }

    fn signature_status(&self, _: &Signature) -> Result<SignatureStatus, RunnerError> {
        Ok(SignatureStatus::Pending)
    }

    fn get_transaction(&self, _: &Signature) -> Result<Option<TransactionMeta>, RunnerError> {
        Ok(None)
    }
}

#[test]
fn test_confirmation_timeout() {
    let signature = Signature::default();
    let err =
        wait_for_confirmation(&StuckChain, &signature, Duration::from_millis(300)).unwrap_err();
    assert!(matches!(err, RunnerError::Rpc(_)));
    assert_eq!(
        err.to_string(),
        format!("RPC request failed: Transaction {signature} was not confirmed within 300ms")
    );
}

#[test]
fn test_unconfirmed_send_is_not_retried() {
    let interface = ProgramInterface::from_json(&hello_idl().to_string()).unwrap();
    let mut session = ExecutionSession::new();
    let payer = session.payer_or_create();
    let resolved =
        resolve_accounts(&mut session, &hello_template(), "say_hello", &program_id(), &payer)
            .unwrap();

    let err = send_instruction(&StuckChain, &interface, &program_id(), "say_hello", &resolved, &[])
        .unwrap_err();
    assert_eq!(err.to_string(), "RPC request failed: unable to confirm transaction");
}
