#![allow(dead_code)]

use {
    playground_runner::{
        config::EngineConfig,
        process::{
            Deadline, ManagedProcess, ProcessCommand, ProcessOutput, ProcessRunner, Readiness,
        },
        rpc::{ChainClient, SignatureStatus, TransactionMeta},
        template::{
            AccountSpec, InstructionSpec, PrecomputedState, ProgramMap, Scenario, Template,
            TemplateLoader,
        },
        RunnerError,
    },
    serde_json::{json, Value},
    std::{
        collections::{HashMap, VecDeque},
        fs, io,
        path::Path,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
        thread,
        time::Duration,
    },
    trezoa_account::Account,
    trezoa_hash::Hash,
    trezoa_message::Message,
    trezoa_pubkey::Pubkey,
    trezoa_signature::Signature,
    trezoa_transaction::Transaction,
};

// Process fakes.

pub struct FakeProcess {
    readiness: Readiness,
    alive: Arc<AtomicBool>,
}

impl ManagedProcess for FakeProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn wait_for_output(&mut self, _ready: &dyn Fn(&str) -> bool, _timeout: Duration) -> Readiness {
        if self.readiness != Readiness::Ready {
            self.alive.store(false, Ordering::SeqCst);
        }
        self.readiness
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&mut self, _grace: Duration) -> io::Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RunnerState {
    runs: Vec<ProcessCommand>,
    spawns: Vec<ProcessCommand>,
    validator_alive: Option<Arc<AtomicBool>>,
}

/// Stands in for the validator, Anchor and Solana CLIs. An `anchor build`
/// writes a placeholder program binary and the configured IDL.
pub struct FakeRunner {
    pub idl: Option<String>,
    pub build_error: Option<String>,
    pub deploy_error: Option<String>,
    pub readiness: Readiness,
    /// The first build runs until its deadline, then reports a timeout.
    pub hanging_build: AtomicBool,
    state: Mutex<RunnerState>,
}

impl FakeRunner {
    pub fn new(idl: Value) -> Self {
        Self {
            idl: Some(idl.to_string()),
            build_error: None,
            deploy_error: None,
            readiness: Readiness::Ready,
            hanging_build: AtomicBool::new(false),
            state: Mutex::default(),
        }
    }

    pub fn with_build_error(mut self, error: &str) -> Self {
        self.build_error = Some(error.to_string());
        self
    }

    pub fn with_deploy_error(mut self, error: &str) -> Self {
        self.deploy_error = Some(error.to_string());
        self
    }

    pub fn with_hanging_build(self) -> Self {
        self.hanging_build.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn without_idl(mut self) -> Self {
        self.idl = None;
        self
    }

    pub fn runs(&self) -> Vec<ProcessCommand> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn spawns(&self) -> Vec<ProcessCommand> {
        self.state.lock().unwrap().spawns.clone()
    }

    pub fn builds(&self) -> usize {
        self.runs()
            .iter()
            .filter(|command| command.program == "anchor")
            .count()
    }

    pub fn deploys(&self) -> usize {
        self.runs()
            .iter()
            .filter(|command| command.program == "solana")
            .count()
    }

    /// Make the running validator look like it died.
    pub fn kill_validator(&self) {
        if let Some(alive) = &self.state.lock().unwrap().validator_alive {
            alive.store(false, Ordering::SeqCst);
        }
    }

    fn build(&self, workspace: &Path, deadline: Deadline) -> io::Result<ProcessOutput> {
        if self.hanging_build.swap(false, Ordering::SeqCst) {
            thread::sleep(deadline.remaining());
            return Err(io::Error::new(io::ErrorKind::TimedOut, "anchor build hung"));
        }
        if let Some(error) = &self.build_error {
            return Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: error.clone(),
            });
        }
        let name = fs::read_dir(workspace.join("programs"))?
            .next()
            .expect("scaffolded program")?
            .file_name()
            .to_string_lossy()
            .into_owned();
        let deploy = workspace.join("target").join("deploy");
        fs::create_dir_all(&deploy)?;
        fs::write(deploy.join(format!("{name}.so")), b"\x7fELF")?;
        if let Some(idl) = &self.idl {
            let idl_dir = workspace.join("target").join("idl");
            fs::create_dir_all(&idl_dir)?;
            fs::write(idl_dir.join(format!("{name}.json")), idl)?;
        }
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, command: &ProcessCommand, deadline: Deadline) -> io::Result<ProcessOutput> {
        self.state.lock().unwrap().runs.push(command.clone());
        match command.program.as_str() {
            "anchor" => self.build(
                command.current_dir.as_deref().expect("build directory"),
                deadline,
            ),
            "solana" => Ok(match &self.deploy_error {
                Some(error) => ProcessOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: error.clone(),
                },
                None => ProcessOutput {
                    exit_code: Some(0),
                    stdout: "Program Id: fake".to_string(),
                    stderr: String::new(),
                },
            }),
            other => Err(io::Error::new(io::ErrorKind::NotFound, other.to_string())),
        }
    }

    fn spawn(&self, command: &ProcessCommand) -> io::Result<Box<dyn ManagedProcess>> {
        let alive = Arc::new(AtomicBool::new(true));
        let mut state = self.state.lock().unwrap();
        state.spawns.push(command.clone());
        state.validator_alive = Some(Arc::clone(&alive));
        Ok(Box::new(FakeProcess {
            readiness: self.readiness,
            alive,
        }))
    }
}

// Chain fake.

/// What the fake chain does with a submitted transaction.
pub type Effect = Box<
    dyn FnOnce(&Message, &mut HashMap<Pubkey, Account>) -> Result<TransactionMeta, RunnerError>
        + Send,
>;

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Pubkey, Account>,
    effects: VecDeque<Effect>,
    sent: Vec<Transaction>,
    metas: HashMap<Signature, TransactionMeta>,
    airdrops: Vec<(Pubkey, u64)>,
}

/// An in-memory chain. Transactions without a queued effect succeed with a
/// two-line log and no state change. A transaction whose effect reports an
/// on-chain error fails the way a landed transaction does: the error comes
/// back without logs, which stay available through `get_transaction`.
#[derive(Default)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second handle onto the same chain.
    pub fn handle(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }

    pub fn push_effect(
        &self,
        effect: impl FnOnce(&Message, &mut HashMap<Pubkey, Account>) -> Result<TransactionMeta, RunnerError>
            + Send
            + 'static,
    ) {
        self.state.lock().unwrap().effects.push_back(Box::new(effect));
    }

    /// Messages of every submitted transaction, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent_transactions()
            .into_iter()
            .map(|transaction| transaction.message)
            .collect()
    }

    pub fn sent_transactions(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn airdrops(&self) -> Vec<(Pubkey, u64)> {
        self.state.lock().unwrap().airdrops.clone()
    }

    pub fn account(&self, address: &Pubkey) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(address).cloned()
    }

    pub fn set_account(&self, address: Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(address, account);
    }
}

pub fn program_logs(program_id: &Pubkey, lines: &[&str]) -> Vec<String> {
    let mut logs = vec![format!("Program {program_id} invoke [1]")];
    logs.extend(lines.iter().map(|line| format!("Program log: {line}")));
    logs.push(format!("Program {program_id} consumed 1200 of 200000 compute units"));
    logs.push(format!("Program {program_id} success"));
    logs
}

/// A system-owned account holding `lamports`.
pub fn wallet(lamports: u64) -> Account {
    Account {
        lamports,
        ..Default::default()
    }
}

impl ChainClient for FakeChain {
    fn health(&self) -> Result<(), RunnerError> {
        Ok(())
    }

    fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, RunnerError> {
        Ok(self.account(address))
    }

    fn latest_blockhash(&self) -> Result<Hash, RunnerError> {
        Ok(Hash::new_from_array([7; 32]))
    }

    fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.airdrops.push((*to, lamports));
        state.accounts.entry(*to).or_default().lamports += lamports;
        let mut bytes = [0xad; 64];
        bytes[..8].copy_from_slice(&(state.airdrops.len() as u64).to_le_bytes());
        let signature = Signature::from(bytes);
        state.metas.insert(signature, TransactionMeta::default());
        Ok(signature)
    }

    fn send_and_confirm_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, RunnerError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(transaction.clone());
        let message = &transaction.message;
        let program_id = message.account_keys[message.instructions[0].program_id_index as usize];
        let effect = state.effects.pop_front();
        let meta = match effect {
            Some(effect) => effect(message, &mut state.accounts)?,
            None => TransactionMeta {
                logs: program_logs(&program_id, &["ok"]),
                compute_units: 1200,
                err: None,
            },
        };
        let signature = transaction.signatures[0];
        state.metas.insert(signature, meta.clone());
        match meta.err {
            Some(reason) => Err(RunnerError::TransactionFailed {
                reason,
                logs: Vec::new(),
            }),
            None => Ok(signature),
        }
    }

    fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, RunnerError> {
        let state = self.state.lock().unwrap();
        Ok(match state.metas.get(signature) {
            None => SignatureStatus::Pending,
            Some(TransactionMeta { err: Some(err), .. }) => SignatureStatus::Failed(err.clone()),
            Some(_) => SignatureStatus::Confirmed,
        })
    }

    fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionMeta>, RunnerError> {
        Ok(self.state.lock().unwrap().metas.get(signature).cloned())
    }
}

// Templates.

#[derive(Default)]
pub struct InMemoryLoader {
    pub templates: HashMap<String, Template>,
}

impl InMemoryLoader {
    pub fn with(templates: Vec<Template>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), template))
                .collect(),
        }
    }
}

impl TemplateLoader for InMemoryLoader {
    fn load(&self, id: &str) -> Result<Template, RunnerError> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::TemplateNotFound(id.to_string()))
    }
}

pub fn account(name: &str, is_mut: bool, is_signer: bool) -> AccountSpec {
    AccountSpec {
        name: name.to_string(),
        is_mut,
        is_signer,
        ..Default::default()
    }
}

pub fn pda(name: &str, seeds: &[&str]) -> AccountSpec {
    AccountSpec {
        name: name.to_string(),
        is_mut: true,
        is_pda: true,
        seeds: Some(seeds.iter().map(|seed| seed.to_string()).collect()),
        ..Default::default()
    }
}

pub fn instruction(name: &str, accounts: Vec<AccountSpec>) -> InstructionSpec {
    InstructionSpec {
        name: name.to_string(),
        accounts,
    }
}

pub fn scenario(name: &str, instruction: &str, args: Option<Vec<Value>>) -> Scenario {
    Scenario {
        name: name.to_string(),
        instruction: instruction.to_string(),
        args,
        ..Default::default()
    }
}

pub const HELLO_SOURCE: &str = r#"use anchor_lang::prelude::*;

declare_id!("11111111111111111111111111111111");

#[program]
pub mod hello_solana {
    use super::*;

    pub fn say_hello(_ctx: Context<SayHello>) -> Result<()> {
        msg!("Hello, Solana!");
        Ok(())
    }
}
"#;

pub fn hello_template() -> Template {
    Template {
        id: "hello-solana".to_string(),
        code: HELLO_SOURCE.to_string(),
        program_map: ProgramMap {
            instructions: vec![instruction(
                "say_hello",
                vec![account("user", true, true), account("system_program", false, false)],
            )],
        },
        precomputed_state: PrecomputedState {
            scenarios: vec![scenario("say-hello", "say_hello", None)],
        },
    }
}

pub fn hello_idl() -> Value {
    json!({
        "address": "11111111111111111111111111111111",
        "metadata": { "name": "hello_solana", "version": "0.1.0", "spec": "0.1.0" },
        "instructions": [{
            "name": "say_hello",
            "accounts": [
                { "name": "user", "writable": true, "signer": true },
                { "name": "system_program", "address": "11111111111111111111111111111111" }
            ],
            "args": []
        }]
    })
}

pub fn vault_template() -> Template {
    let vault = || pda("vault", &["b\"vault\"", "user.key()"]);
    let accounts = || vec![account("user", true, true), vault(), account("system_program", false, false)];
    Template {
        id: "pda-vault".to_string(),
        code: "declare_id!(\"11111111111111111111111111111111\");".to_string(),
        program_map: ProgramMap {
            instructions: vec![
                instruction("initialize", accounts()),
                instruction("deposit", accounts()),
                instruction("withdraw", accounts()),
            ],
        },
        precomputed_state: PrecomputedState {
            scenarios: vec![scenario("deposit-sol", "deposit", Some(vec![json!(1_000_000)]))],
        },
    }
}

pub fn vault_idl() -> Value {
    let accounts = json!([
        { "name": "user", "writable": true, "signer": true },
        { "name": "vault", "writable": true },
        { "name": "system_program" }
    ]);
    json!({
        "metadata": { "name": "pda_vault" },
        "instructions": [
            { "name": "initialize", "accounts": accounts, "args": [] },
            { "name": "deposit", "accounts": accounts, "args": [{ "name": "amount", "type": "u64" }] },
            { "name": "withdraw", "accounts": accounts, "args": [{ "name": "amount", "type": "u64" }] }
        ]
    })
}

pub fn account_init_template() -> Template {
    Template {
        id: "account-init".to_string(),
        code: "declare_id!(\"11111111111111111111111111111111\");".to_string(),
        program_map: ProgramMap {
            instructions: vec![
                instruction(
                    "initialize",
                    vec![
                        account("my_account", true, true),
                        account("user", true, true),
                        account("system_program", false, false),
                    ],
                ),
                instruction(
                    "update",
                    vec![account("my_account", true, false), account("user", false, true)],
                ),
            ],
        },
        precomputed_state: PrecomputedState::default(),
    }
}

pub fn account_init_idl() -> Value {
    json!({
        "version": "0.1.0",
        "name": "account_init",
        "instructions": [
            {
                "name": "initialize",
                "accounts": [
                    { "name": "myAccount", "isMut": true, "isSigner": true },
                    { "name": "user", "isMut": true, "isSigner": true },
                    { "name": "systemProgram", "isMut": false, "isSigner": false }
                ],
                "args": [{ "name": "data", "type": "u64" }]
            },
            {
                "name": "update",
                "accounts": [
                    { "name": "myAccount", "isMut": true, "isSigner": false },
                    { "name": "user", "isMut": false, "isSigner": true }
                ],
                "args": [{ "name": "data", "type": "u64" }]
            }
        ],
        "accounts": [{
            "name": "MyAccount",
            "type": { "kind": "struct", "fields": [{ "name": "data", "type": "u64" }] }
        }]
    })
}

/// Engine configuration rooted in `dir`, with no settle delay.
pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        workspace_root: dir.join("workspaces"),
        program_cache_root: dir.join("cache"),
        ledger_dir: dir.join("ledger"),
        settle_delay: Duration::ZERO,
        confirm_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}
