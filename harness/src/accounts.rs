//! Mapping an instruction's symbolic account names to concrete addresses and
//! signers.
//!
//! Each declared account is resolved by the first rule that applies:
//!
//! 1. `system_program` is the system program.
//! 2. A PDA is derived from its seeds and the program id.
//! 3. `user`, `authority` and `payer` are the session fee payer.
//! 4. A name resolved earlier in the request reuses that address and signer.
//! 5. A writable or signing account gets a freshly generated keypair.
//!
//! A read-only, non-signing account matching none of these cannot be
//! resolved.

use {
    crate::{
        interface::to_snake_case,
        request::TransactionInstruction,
        session::ExecutionSession,
        template::{AccountSpec, Template},
    },
    playground_runner_error::error::RunnerError,
    std::{str::FromStr, sync::Arc},
    trezoa_keypair::Keypair,
    trezoa_pubkey::Pubkey,
    trezoa_signer::Signer,
};

/// Names that always resolve to the fee payer.
pub const PAYER_ROLES: &[&str] = &["user", "authority", "payer"];

/// Label given to the system program's snapshot.
pub const SYSTEM_PROGRAM_LABEL: &str = "System Program";

/// Label given to a freshly generated `my_account`.
pub const MY_ACCOUNT_LABEL: &str = "My Account";

fn generated_label(name: &str) -> &str {
    match name {
        "my_account" => MY_ACCOUNT_LABEL,
        _ => name,
    }
}

/// Largest number of seeds a PDA derivation accepts.
const MAX_SEEDS: usize = 16;
/// Largest single seed, in bytes.
const MAX_SEED_LEN: usize = 32;

/// An address, paired with the label its snapshots are reported under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountLabel {
    pub address: Pubkey,
    pub label: String,
}

/// The outcome of resolving one instruction's accounts.
#[derive(Clone, Debug)]
pub struct ResolvedAccounts {
    accounts: Vec<(String, Pubkey)>,
    signers: Vec<Arc<Keypair>>,
    labels: Vec<AccountLabel>,
}

impl ResolvedAccounts {
    /// An empty resolution whose first signer is `payer`.
    pub fn new(payer: Arc<Keypair>) -> Self {
        Self {
            accounts: Vec::new(),
            signers: vec![payer],
            labels: Vec::new(),
        }
    }

    /// The address resolved for an account name, in either snake_case or
    /// camelCase.
    pub fn get(&self, name: &str) -> Option<Pubkey> {
        let name = to_snake_case(name);
        self.accounts
            .iter()
            .find(|(resolved, _)| *resolved == name)
            .map(|(_, address)| *address)
    }

    /// Resolved `(name, address)` pairs in declaration order.
    pub fn accounts(&self) -> &[(String, Pubkey)] {
        &self.accounts
    }

    /// Signers, fee payer first, with no two sharing a public key.
    pub fn signers(&self) -> &[Arc<Keypair>] {
        &self.signers
    }

    pub fn payer(&self) -> &Arc<Keypair> {
        &self.signers[0]
    }

    /// The addresses to snapshot, in declaration order.
    pub fn labels(&self) -> &[AccountLabel] {
        &self.labels
    }

    fn insert(&mut self, name: &str, address: Pubkey, label: impl Into<String>) {
        let name = to_snake_case(name);
        match self.accounts.iter_mut().find(|(resolved, _)| *resolved == name) {
            Some(entry) => entry.1 = address,
            None => self.accounts.push((name, address)),
        }
        self.labels.push(AccountLabel {
            address,
            label: label.into(),
        });
    }

    fn push_signer(&mut self, signer: Arc<Keypair>) {
        let pubkey = signer.pubkey();
        if !self.signers.iter().any(|existing| existing.pubkey() == pubkey) {
            self.signers.push(signer);
        }
    }
}

/// Turn a seed expression into seed bytes.
///
/// `user.key()`, `authority.key()` and `payer.key()` (optionally followed by
/// `.as_ref()`) stand for the fee payer's address. Anything else is a literal
/// whose UTF-8 bytes are the seed, with a surrounding `b"..."` or `"..."`
/// stripped.
pub fn seed_bytes(seed: &str, payer: &Pubkey) -> Vec<u8> {
    let seed = seed.trim();
    let key_expr = seed.strip_suffix(".as_ref()").unwrap_or(seed);
    if let Some(role) = key_expr.strip_suffix(".key()") {
        if PAYER_ROLES.contains(&role) {
            return payer.to_bytes().to_vec();
        }
    }
    let literal = seed
        .strip_prefix("b\"")
        .or_else(|| seed.strip_prefix('"'))
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(seed);
    literal.as_bytes().to_vec()
}

/// Derive the PDA of `account` under `program_id`.
pub fn derive_pda(
    account: &AccountSpec,
    payer: &Pubkey,
    program_id: &Pubkey,
) -> Result<Pubkey, RunnerError> {
    let seeds = account
        .seeds
        .as_deref()
        .filter(|seeds| !seeds.is_empty())
        .ok_or_else(|| {
            RunnerError::AccountResolutionFailed(format!(
                "PDA seeds are required but missing for \"{}\"",
                account.name
            ))
        })?;
    if seeds.len() > MAX_SEEDS {
        return Err(RunnerError::AccountResolutionFailed(format!(
            "\"{}\" has {} seeds, at most {MAX_SEEDS} are allowed",
            account.name,
            seeds.len()
        )));
    }

    let seeds = seeds
        .iter()
        .map(|seed| seed_bytes(seed, payer))
        .collect::<Vec<_>>();
    if let Some(seed) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(RunnerError::AccountResolutionFailed(format!(
            "a seed of \"{}\" is {} bytes, at most {MAX_SEED_LEN} are allowed",
            account.name,
            seed.len()
        )));
    }

    let seeds = seeds.iter().map(Vec::as_slice).collect::<Vec<_>>();
    Pubkey::try_find_program_address(&seeds, program_id)
        .map(|(address, _bump)| address)
        .ok_or_else(|| {
            RunnerError::AccountResolutionFailed(format!(
                "no valid PDA exists for \"{}\"",
                account.name
            ))
        })
}

fn resolve_declared(
    session: &mut ExecutionSession,
    resolved: &mut ResolvedAccounts,
    account: &AccountSpec,
    payer: &Pubkey,
    program_id: &Pubkey,
) -> Result<(), RunnerError> {
    let name = account.name.as_str();

    if name == "system_program" {
        resolved.insert(name, trezoa_sdk_ids::system_program::id(), SYSTEM_PROGRAM_LABEL);
        return Ok(());
    }

    if account.is_pda {
        let address = derive_pda(account, payer, program_id)?;
        session.cache_address(name, address);
        resolved.insert(name, address, name);
        return Ok(());
    }

    if PAYER_ROLES.contains(&name) {
        resolved.insert(name, *payer, name);
        return Ok(());
    }

    if let Some((address, signer)) = session.cached(name) {
        resolved.insert(name, address, name);
        if let Some(signer) = signer {
            resolved.push_signer(signer);
        }
        return Ok(());
    }

    if account.is_mut || account.is_signer {
        let keypair = session.generate(name);
        resolved.insert(name, keypair.pubkey(), generated_label(name));
        resolved.push_signer(keypair);
        return Ok(());
    }

    Err(RunnerError::AccountResolutionFailed(format!(
        "cannot resolve read-only account \"{name}\": it is not a PDA, a known role, or an \
         account created earlier in this request"
    )))
}

/// Resolve the accounts `instruction` declares in the template's program map.
///
/// Within one request, resolving the same instruction again yields the same
/// addresses.
pub fn resolve_accounts(
    session: &mut ExecutionSession,
    template: &Template,
    instruction: &str,
    program_id: &Pubkey,
    payer: &Arc<Keypair>,
) -> Result<ResolvedAccounts, RunnerError> {
    let spec = template
        .program_map
        .instruction(instruction)
        .ok_or_else(|| RunnerError::InstructionNotFound(instruction.to_string()))?;

    let payer_address = payer.pubkey();
    let mut resolved = ResolvedAccounts::new(Arc::clone(payer));
    for account in &spec.accounts {
        resolve_declared(session, &mut resolved, account, &payer_address, program_id)?;
    }
    Ok(resolved)
}

/// Resolve the accounts of a caller-built instruction.
///
/// Each account's `pubkey` is a label. `system_program` and the payer roles
/// map as for declared accounts, a label seen earlier in the request reuses
/// that address, a valid base58 address is used as is, and any other label
/// gets a fresh keypair. Accounts the program map declares as PDAs are
/// derived regardless of their label.
pub fn resolve_transaction_accounts(
    session: &mut ExecutionSession,
    template: &Template,
    instruction: &TransactionInstruction,
    program_id: &Pubkey,
    payer: &Arc<Keypair>,
) -> Result<ResolvedAccounts, RunnerError> {
    let declared = template.program_map.instruction(&instruction.instruction_name);
    let payer_address = payer.pubkey();
    let mut resolved = ResolvedAccounts::new(Arc::clone(payer));

    for account in &instruction.accounts {
        let label = account.pubkey.as_str();

        let pda = declared
            .and_then(|spec| spec.accounts.iter().find(|spec| spec.name == account.name))
            .filter(|spec| spec.is_pda);
        if let Some(spec) = pda {
            let address = derive_pda(spec, &payer_address, program_id)?;
            session.cache_address(label, address);
            resolved.insert(&account.name, address, label);
            continue;
        }

        if label == "system_program" {
            resolved.insert(
                &account.name,
                trezoa_sdk_ids::system_program::id(),
                SYSTEM_PROGRAM_LABEL,
            );
        } else if PAYER_ROLES.contains(&label) {
            resolved.insert(&account.name, payer_address, label);
        } else if let Some((address, signer)) = session.cached(label) {
            resolved.insert(&account.name, address, label);
            if let Some(signer) = signer {
                resolved.push_signer(signer);
            }
        } else if let Ok(address) = Pubkey::from_str(label) {
            session.cache_address(label, address);
            resolved.insert(&account.name, address, label);
        } else {
            let keypair = session.generate(label);
            resolved.insert(&account.name, keypair.pubkey(), label);
            resolved.push_signer(keypair);
        }
    }
    Ok(resolved)
}
