//! # Playground Runner
//!
//! The execution engine behind the playground's live mode. Given a program
//! template and a request to run one of its instructions, it builds the
//! program, deploys it to a disposable local validator, invokes the
//! instruction in a real transaction, and reports what happened: the state
//! of every touched account before and after, a per-account diff, the
//! program logs, the compute units consumed, and an invocation trace.
//!
//! Each request walks the same pipeline:
//!
//! 1. Load the template and decide what to run.
//! 2. Check the template against the live-execution allow-list. Nothing is
//!    spawned for templates that are not on it.
//! 3. Make sure the validator is up and the session fee payer is funded.
//! 4. Build the program in a scratch workspace (`ProgramCompiler`).
//! 5. Deploy it with the Solana CLI.
//! 6. Resolve the instruction's accounts (`accounts`).
//! 7. Snapshot the accounts, run any prerequisite instructions, invoke the
//!    requested instruction, and snapshot again.
//!
//! Two kinds of request are supported:
//!
//! * Scenario requests run one instruction, either a named scenario recorded
//!   with the template or a bare instruction from its program map. Some
//!   instructions only make sense after another has run, such as
//!   withdrawing from a vault that first needs initializing; those
//!   prerequisites run automatically (see `bootstrap`).
//! * Transaction requests run a caller-built list of instructions in order,
//!   stopping at the first failure.
//!
//! ```rust,ignore
//! use playground_runner::{
//!     config::EngineConfig, request::ExecutionRequest, template::FsTemplateLoader,
//!     ExecutionEngine,
//! };
//!
//! let mut engine = ExecutionEngine::from_config(
//!     EngineConfig::default(),
//!     Box::new(FsTemplateLoader::new("templates")),
//! );
//! let request: ExecutionRequest = serde_json::from_str(
//!     r#"{ "templateId": "hello-solana", "scenario": "say-hello" }"#,
//! )?;
//! let result = engine.execute(request);
//! assert!(result.success);
//! ```
//!
//! The engine is synchronous and services one request at a time. Every
//! request, successful or not, produces an `ExecutionResult`; failures carry
//! the error's message and, when the chain produced any, the program logs.

pub mod accounts;
pub mod bootstrap;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod interface;
pub mod process;
pub mod request;
pub mod rpc;
pub mod session;
pub mod state;
pub mod template;
pub mod transaction;
pub mod validator;
pub mod workspace;

pub use {playground_runner_error::error::RunnerError, playground_runner_result as result};
use {
    crate::{
        accounts::{resolve_accounts, resolve_transaction_accounts, AccountLabel},
        compiler::{BuildArtifacts, ProgramCompiler},
        config::EngineConfig,
        interface::ProgramInterface,
        process::{Deadline, ProcessCommand, ProcessRunner, SystemProcessRunner},
        request::{ExecutionRequest, ScenarioRequest, TransactionRequest, CUSTOM_TRANSACTION},
        rpc::{ChainClient, ValidatorClient},
        session::ExecutionSession,
        state::{compute_state_diff, StateCapture},
        template::{Template, TemplateLoader},
        transaction::send_instruction,
        validator::ValidatorSupervisor,
        workspace::{write_keypair, WorkspaceManager},
    },
    playground_runner_result::{attach_changes, AccountSnapshot, ExecutionResult},
    serde_json::Value,
    std::{io, path::Path, sync::Arc, thread},
    trezoa_keypair::Keypair,
    trezoa_pubkey::Pubkey,
    trezoa_signer::Signer,
};

/// Something that turns execution requests into results.
pub trait Execute: Send {
    fn execute(&mut self, request: ExecutionRequest) -> ExecutionResult;
}

/// How far the current request has progressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    ValidatorReady,
    Compiled,
    Deployed,
    AccountsResolved,
    Invoked,
    Captured,
    Done,
}

/// What a request asks the deployed program to do.
enum Plan<'a> {
    Instruction { name: String, args: Vec<Value> },
    Transaction(&'a TransactionRequest),
}

/// The raw material of a successful result.
struct Outcome {
    before: Vec<AccountSnapshot>,
    after: Vec<AccountSnapshot>,
    logs: Vec<String>,
    compute_units: u64,
}

/// Addresses in first-seen order, without repeats.
fn unique_labels<'a>(labels: impl IntoIterator<Item = &'a AccountLabel>) -> Vec<AccountLabel> {
    let mut unique: Vec<AccountLabel> = Vec::new();
    for label in labels {
        if !unique.iter().any(|seen| seen.address == label.address) {
            unique.push(label.clone());
        }
    }
    unique
}

/// The program execution engine.
pub struct ExecutionEngine {
    config: EngineConfig,
    loader: Box<dyn TemplateLoader>,
    runner: Arc<dyn ProcessRunner>,
    client: Box<dyn ChainClient>,
    validator: ValidatorSupervisor,
    compiler: ProgramCompiler,
    workspaces: WorkspaceManager,
    session: ExecutionSession,
    stage: Stage,
    deadline: Deadline,
}

impl ExecutionEngine {
    /// Create an engine that drives `runner` for subprocesses and talks to
    /// the validator through `client`.
    pub fn new(
        config: EngineConfig,
        loader: Box<dyn TemplateLoader>,
        runner: Arc<dyn ProcessRunner>,
        client: Box<dyn ChainClient>,
    ) -> Self {
        let validator = ValidatorSupervisor::new(
            Arc::clone(&runner),
            &config.validator_program,
            config.validator_port,
            &config.ledger_dir,
        )
        .with_timeouts(config.startup_timeout, config.stop_grace_period);
        let compiler = ProgramCompiler::new(
            Arc::clone(&runner),
            &config.anchor_program,
            &config.anchor_version,
            &config.program_cache_root,
        );
        let workspaces = WorkspaceManager::new(&config.workspace_root);
        let deadline = Deadline::after(config.execution_timeout);
        Self {
            config,
            loader,
            runner,
            client,
            validator,
            compiler,
            workspaces,
            deadline,
            session: ExecutionSession::new(),
            stage: Stage::Idle,
        }
    }

    /// Create an engine backed by real subprocesses and the validator's
    /// JSON-RPC endpoint.
    ///
    /// The RPC client runs its own async runtime, so this must not be called
    /// from an async task, and the engine must not be dropped in one.
    pub fn from_config(config: EngineConfig, loader: Box<dyn TemplateLoader>) -> Self {
        let client = Box::new(ValidatorClient::new(config.rpc_url(), config.confirm_timeout));
        Self::new(config, loader, Arc::new(SystemProcessRunner), client)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    /// The stage the last request reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    /// Service one request.
    pub fn execute(&mut self, request: ExecutionRequest) -> ExecutionResult {
        match &request {
            ExecutionRequest::Scenario(request) => self.execute_scenario(request),
            ExecutionRequest::Transaction {
                template_id,
                transaction,
            } => self.execute_transaction(template_id, transaction),
        }
    }

    /// Run a recorded scenario or a bare instruction of a template.
    pub fn execute_scenario(&mut self, request: &ScenarioRequest) -> ExecutionResult {
        self.begin();
        let label = request.name().to_string();
        let outcome = self
            .loader
            .load(&request.template_id)
            .and_then(|template| {
                let (instruction, args) = Self::plan_scenario(&template, request)?;
                self.run(&template, Plan::Instruction {
                    name: instruction,
                    args,
                })
            });
        self.finish(&request.template_id, label, outcome)
    }

    /// Run a caller-built sequence of instructions against a template's
    /// program.
    pub fn execute_transaction(
        &mut self,
        template_id: &str,
        transaction: &TransactionRequest,
    ) -> ExecutionResult {
        self.begin();
        let outcome = self
            .loader
            .load(template_id)
            .and_then(|template| self.run(&template, Plan::Transaction(transaction)));
        self.finish(template_id, CUSTOM_TRANSACTION.to_string(), outcome)
    }

    /// Pick the instruction and arguments a scenario request runs.
    ///
    /// A named scenario supplies both, although arguments in the request take
    /// precedence. Failing that, an instruction in the program map runs
    /// under its own name, with the request's arguments or none.
    fn plan_scenario(
        template: &Template,
        request: &ScenarioRequest,
    ) -> Result<(String, Vec<Value>), RunnerError> {
        let name = request.name();
        if let Some(scenario) = template.find_scenario(name) {
            let args = request
                .args
                .clone()
                .or_else(|| scenario.args.clone())
                .unwrap_or_default();
            return Ok((scenario.instruction.clone(), args));
        }

        let instruction = request.instruction.as_deref().unwrap_or(name);
        if template.program_map.instruction(instruction).is_some() {
            return Ok((instruction.to_string(), request.args.clone().unwrap_or_default()));
        }

        Err(RunnerError::ScenarioNotFound {
            scenario: name.to_string(),
            template_id: template.id.clone(),
        })
    }

    fn finish(
        &mut self,
        template_id: &str,
        scenario: String,
        outcome: Result<Outcome, RunnerError>,
    ) -> ExecutionResult {
        match outcome {
            Ok(outcome) => {
                let diff = compute_state_diff(&outcome.before, &outcome.after);
                let result = ExecutionResult {
                    success: true,
                    scenario,
                    accounts_before: outcome.before,
                    accounts_after: attach_changes(outcome.after, &diff),
                    compute_units: outcome.compute_units,
                    ..Default::default()
                }
                .with_logs(outcome.logs);
                self.advance(Stage::Done);
                log::info!(
                    "{template_id}/{} succeeded ({} compute units)",
                    result.scenario,
                    result.compute_units
                );
                result
            }
            Err(err) => {
                log::warn!(
                    "{template_id}/{scenario} failed after reaching {:?}: {err}",
                    self.stage
                );
                let logs = err.logs().to_vec();
                ExecutionResult::failure(scenario, err.to_string()).with_logs(logs)
            }
        }
    }

    /// Forget everything the previous request resolved and start its clock.
    fn begin(&mut self) {
        self.session.reset();
        self.stage = Stage::Idle;
        self.deadline = Deadline::after(self.config.execution_timeout);
    }

    fn run(&mut self, template: &Template, plan: Plan) -> Result<Outcome, RunnerError> {
        if !self.config.is_supported(&template.id) {
            return Err(RunnerError::UnsupportedTemplate(template.id.clone()));
        }

        self.ensure_validator()?;
        let payer = self.ensure_payer()?;
        self.advance(Stage::ValidatorReady);
        self.deadline.check()?;

        let workspace = self.workspaces.create_scoped(&template.id)?;
        let artifacts = self
            .compiler
            .compile(&template.id, &template.code, workspace.path(), self.deadline)
            .into_artifacts()?;
        self.advance(Stage::Compiled);
        self.deadline.check()?;

        self.deploy(&artifacts, &payer, workspace.path())?;
        self.advance(Stage::Deployed);
        self.deadline.check()?;

        let interface = ProgramInterface::from_file(&artifacts.idl_path)?;
        let program_id = artifacts.program_id;
        let outcome = match plan {
            Plan::Instruction { name, args } => {
                self.invoke_instruction(template, &interface, &program_id, &payer, &name, &args)?
            }
            Plan::Transaction(transaction) => {
                self.invoke_transaction(template, &interface, &program_id, &payer, transaction)?
            }
        };
        self.advance(Stage::Captured);
        Ok(outcome)
    }

    fn ensure_validator(&mut self) -> Result<(), RunnerError> {
        if self.validator.ensure_running()? {
            // A new validator starts from an empty ledger.
            self.session.set_payer_funded(false);
            thread::sleep(self.config.settle_delay);
        }
        self.client.health()
    }

    fn ensure_payer(&mut self) -> Result<Arc<Keypair>, RunnerError> {
        let payer = self.session.payer_or_create();
        if !self.session.is_payer_funded() {
            let address = payer.pubkey();
            let signature = self
                .client
                .request_airdrop(&address, self.config.airdrop_lamports)?;
            rpc::wait_for_confirmation(
                self.client.as_ref(),
                &signature,
                self.config.confirm_timeout,
            )?;
            self.session.set_payer_funded(true);
            log::info!(
                "Funded fee payer {address} with {} lamports",
                self.config.airdrop_lamports
            );
        }
        Ok(payer)
    }

    fn deploy(
        &self,
        artifacts: &BuildArtifacts,
        payer: &Keypair,
        workspace: &Path,
    ) -> Result<(), RunnerError> {
        let payer_path = workspace.join("keys").join("payer.json");
        write_keypair(payer, &payer_path)?;

        let command = ProcessCommand::new(&self.config.solana_program)
            .arg("program")
            .arg("deploy")
            .arg(artifacts.program_path.display().to_string())
            .arg("--program-id")
            .arg(artifacts.program_keypair_path.display().to_string())
            .arg("--keypair")
            .arg(payer_path.display().to_string())
            .arg("--url")
            .arg(self.config.rpc_url())
            .current_dir(workspace);
        let output = self
            .runner
            .run(&command, self.deadline)
            .map_err(|err| match err.kind() {
                io::ErrorKind::TimedOut => self.deadline.exceeded(),
                _ => RunnerError::DeploymentFailed(format!(
                    "failed to run `{}`: {err}",
                    command.display()
                )),
            })?;
        if !output.success() {
            return Err(RunnerError::DeploymentFailed(output.error_text()));
        }
        log::info!("Deployed program {}", artifacts.program_id);
        Ok(())
    }

    fn capture(
        &self,
        program_id: &Pubkey,
        interface: &ProgramInterface,
        labels: &[AccountLabel],
    ) -> Result<Vec<AccountSnapshot>, RunnerError> {
        StateCapture::new(self.client.as_ref())
            .with_interface(program_id, interface)
            .capture_multiple_accounts(labels)
    }

    fn invoke_instruction(
        &mut self,
        template: &Template,
        interface: &ProgramInterface,
        program_id: &Pubkey,
        payer: &Arc<Keypair>,
        instruction: &str,
        args: &[Value],
    ) -> Result<Outcome, RunnerError> {
        let resolved = resolve_accounts(&mut self.session, template, instruction, program_id, payer)?;
        let labels = unique_labels(resolved.labels());
        self.advance(Stage::AccountsResolved);

        let before = self.capture(program_id, interface, &labels)?;

        for prerequisite in bootstrap::prerequisites(&template.id, instruction) {
            log::debug!(
                "Running prerequisite \"{}\" before \"{instruction}\"",
                prerequisite.instruction
            );
            let prerequisite_accounts = resolve_accounts(
                &mut self.session,
                template,
                prerequisite.instruction,
                program_id,
                payer,
            )?;
            send_instruction(
                self.client.as_ref(),
                interface,
                program_id,
                prerequisite.instruction,
                &prerequisite_accounts,
                &prerequisite.args()?,
            )?;
        }

        let invocation = send_instruction(
            self.client.as_ref(),
            interface,
            program_id,
            instruction,
            &resolved,
            args,
        )?;
        self.advance(Stage::Invoked);

        let after = self.capture(program_id, interface, &labels)?;
        Ok(Outcome {
            before,
            after,
            logs: invocation.logs,
            compute_units: invocation.compute_units,
        })
    }

    fn invoke_transaction(
        &mut self,
        template: &Template,
        interface: &ProgramInterface,
        program_id: &Pubkey,
        payer: &Arc<Keypair>,
        transaction: &TransactionRequest,
    ) -> Result<Outcome, RunnerError> {
        let resolved = transaction
            .instructions
            .iter()
            .map(|instruction| {
                resolve_transaction_accounts(
                    &mut self.session,
                    template,
                    instruction,
                    program_id,
                    payer,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let labels = unique_labels(resolved.iter().flat_map(|accounts| accounts.labels()));
        self.advance(Stage::AccountsResolved);

        let before = self.capture(program_id, interface, &labels)?;

        let mut logs = Vec::new();
        let mut compute_units = 0;
        for (instruction, accounts) in transaction.instructions.iter().zip(&resolved) {
            match send_instruction(
                self.client.as_ref(),
                interface,
                program_id,
                &instruction.instruction_name,
                accounts,
                &instruction.args,
            ) {
                Ok(invocation) => {
                    logs.extend(invocation.logs);
                    compute_units += invocation.compute_units;
                }
                Err(RunnerError::TransactionFailed {
                    reason,
                    logs: failed_logs,
                }) => {
                    logs.extend(failed_logs);
                    return Err(RunnerError::TransactionFailed { reason, logs });
                }
                Err(err) => return Err(err),
            }
        }
        self.advance(Stage::Invoked);

        let after = self.capture(program_id, interface, &labels)?;
        Ok(Outcome {
            before,
            after,
            logs,
            compute_units,
        })
    }

    /// Remove every cached build of a template.
    pub fn cleanup_cache(&self, template_id: &str) {
        self.compiler.cleanup(template_id);
    }

    /// Stop the validator. The engine starts a new one if it is used again.
    pub fn dispose(&mut self) {
        self.validator.stop();
        self.stage = Stage::Idle;
    }
}

impl Execute for ExecutionEngine {
    fn execute(&mut self, request: ExecutionRequest) -> ExecutionResult {
        ExecutionEngine::execute(self, request)
    }
}
