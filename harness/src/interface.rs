//! The program interface description (IDL) produced by an Anchor build.
//!
//! Both IDL layouts Anchor has shipped are accepted:
//!
//! * The legacy layout, with `isMut`/`isSigner` account flags, camelCase
//!   names, and account struct layouts inline under `accounts`.
//! * The 0.30+ layout, with `writable`/`signer` flags, snake_case names,
//!   explicit discriminators, and struct layouts under `types`.
//!
//! Names are normalized to snake_case on load, so lookups work with either
//! spelling.

use {
    crate::codec,
    playground_runner_error::error::RunnerError,
    serde::Deserialize,
    serde_json::{Map, Value},
    sha2::{Digest, Sha256},
    std::{fs, path::Path},
};

/// Length of an Anchor instruction or account discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// A serializable type, as named in the interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdlType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    I8,
    I16,
    I32,
    I64,
    I128,
    F32,
    F64,
    String,
    Pubkey,
    Bytes,
    Vec(Box<IdlType>),
    Option(Box<IdlType>),
    Array(Box<IdlType>, usize),
    /// A user-defined type, referenced by name.
    Defined(String),
}

/// A named, typed value: an instruction argument or a struct field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: IdlType,
}

/// An account an instruction expects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountDef {
    pub name: String,
    pub writable: bool,
    pub signer: bool,
    /// Optional accounts may be omitted, in which case the program id stands
    /// in for them.
    pub optional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    /// Accounts in the order the program expects them, with nested groups
    /// flattened.
    pub accounts: Vec<AccountDef>,
    pub args: Vec<Field>,
}

/// An account type the program owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountTypeDef {
    pub name: String,
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    /// Struct fields, when the layout is known.
    pub fields: Option<Vec<Field>>,
}

/// A parsed program interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    pub name: Option<String>,
    pub instructions: Vec<InstructionDef>,
    pub accounts: Vec<AccountTypeDef>,
}

/// Convert `camelCase` or `PascalCase` to `snake_case`. Already snake_case
/// input is returned unchanged.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

fn sighash(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// The Anchor discriminator of an instruction: the first eight bytes of
/// `sha256("global:<snake_case name>")`.
pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("global", &to_snake_case(name))
}

/// The Anchor discriminator of an account type: the first eight bytes of
/// `sha256("account:<TypeName>")`.
pub fn account_discriminator(type_name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("account", type_name)
}

#[derive(Deserialize)]
struct RawIdl {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    instructions: Vec<RawInstruction>,
    #[serde(default)]
    accounts: Vec<RawAccountType>,
    #[serde(default)]
    types: Vec<RawTypeDef>,
}

#[derive(Deserialize)]
struct RawMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawInstruction {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(default)]
    accounts: Vec<RawAccountItem>,
    #[serde(default)]
    args: Vec<RawField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAccountItem {
    Group {
        #[allow(dead_code)]
        name: String,
        accounts: Vec<RawAccountItem>,
    },
    Single(RawAccount),
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    #[serde(default, alias = "isMut")]
    writable: bool,
    #[serde(default, alias = "isSigner")]
    signer: bool,
    #[serde(default, alias = "isOptional")]
    optional: bool,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: Value,
}

#[derive(Deserialize)]
struct RawAccountType {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(default, rename = "type")]
    ty: Option<RawTypeBody>,
}

#[derive(Deserialize)]
struct RawTypeDef {
    name: String,
    #[serde(rename = "type")]
    ty: RawTypeBody,
}

#[derive(Deserialize)]
struct RawTypeBody {
    kind: String,
    #[serde(default)]
    fields: Option<Vec<Value>>,
}

fn invalid(message: impl std::fmt::Display) -> RunnerError {
    RunnerError::UnknownExecutionError(format!("Invalid IDL: {message}"))
}

fn parse_discriminator(
    explicit: Option<Vec<u8>>,
    fallback: impl FnOnce() -> [u8; DISCRIMINATOR_LEN],
) -> Result<[u8; DISCRIMINATOR_LEN], RunnerError> {
    match explicit {
        None => Ok(fallback()),
        Some(bytes) => bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| invalid(format!("discriminator of length {}", bytes.len()))),
    }
}

/// Parse a type expression from either IDL layout.
pub fn parse_type(value: &Value) -> Result<IdlType, RunnerError> {
    match value {
        Value::String(name) => Ok(match name.as_str() {
            "bool" => IdlType::Bool,
            "u8" => IdlType::U8,
            "u16" => IdlType::U16,
            "u32" => IdlType::U32,
            "u64" => IdlType::U64,
            "u128" => IdlType::U128,
            "i8" => IdlType::I8,
            "i16" => IdlType::I16,
            "i32" => IdlType::I32,
            "i64" => IdlType::I64,
            "i128" => IdlType::I128,
            "f32" => IdlType::F32,
            "f64" => IdlType::F64,
            "string" => IdlType::String,
            "publicKey" | "pubkey" => IdlType::Pubkey,
            "bytes" => IdlType::Bytes,
            other => IdlType::Defined(other.to_string()),
        }),
        Value::Object(map) => {
            if let Some(inner) = map.get("vec") {
                return Ok(IdlType::Vec(Box::new(parse_type(inner)?)));
            }
            if let Some(inner) = map.get("option") {
                return Ok(IdlType::Option(Box::new(parse_type(inner)?)));
            }
            if let Some(Value::Array(parts)) = map.get("array") {
                if let [inner, Value::Number(len)] = parts.as_slice() {
                    let len = len
                        .as_u64()
                        .ok_or_else(|| invalid(format!("array length {len}")))?;
                    return Ok(IdlType::Array(Box::new(parse_type(inner)?), len as usize));
                }
            }
            match map.get("defined") {
                Some(Value::String(name)) => Ok(IdlType::Defined(name.clone())),
                Some(Value::Object(defined)) => match defined.get("name") {
                    Some(Value::String(name)) => Ok(IdlType::Defined(name.clone())),
                    _ => Err(invalid(format!("type {value}"))),
                },
                _ => Err(invalid(format!("type {value}"))),
            }
        }
        _ => Err(invalid(format!("type {value}"))),
    }
}

fn parse_field(raw: RawField) -> Result<Field, RunnerError> {
    Ok(Field {
        name: to_snake_case(&raw.name),
        ty: parse_type(&raw.ty)?,
    })
}

fn parse_struct_fields(body: &RawTypeBody) -> Option<Vec<Field>> {
    if body.kind != "struct" {
        return None;
    }
    body.fields
        .as_ref()?
        .iter()
        .map(|field| {
            let raw: RawField = serde_json::from_value(field.clone()).ok()?;
            parse_field(raw).ok()
        })
        .collect()
}

fn flatten_accounts(items: Vec<RawAccountItem>, out: &mut Vec<AccountDef>) {
    for item in items {
        match item {
            RawAccountItem::Group { accounts, .. } => flatten_accounts(accounts, out),
            RawAccountItem::Single(account) => out.push(AccountDef {
                name: to_snake_case(&account.name),
                writable: account.writable,
                signer: account.signer,
                optional: account.optional,
            }),
        }
    }
}

impl ProgramInterface {
    pub fn from_json(json: &str) -> Result<Self, RunnerError> {
        let raw: RawIdl = serde_json::from_str(json).map_err(invalid)?;

        let instructions = raw
            .instructions
            .into_iter()
            .map(|ix| {
                let name = to_snake_case(&ix.name);
                let discriminator =
                    parse_discriminator(ix.discriminator, || instruction_discriminator(&name))?;
                let mut accounts = Vec::new();
                flatten_accounts(ix.accounts, &mut accounts);
                let args = ix
                    .args
                    .into_iter()
                    .map(parse_field)
                    .collect::<Result<_, _>>()?;
                Ok(InstructionDef {
                    name,
                    discriminator,
                    accounts,
                    args,
                })
            })
            .collect::<Result<Vec<_>, RunnerError>>()?;

        let accounts = raw
            .accounts
            .into_iter()
            .map(|account| {
                let discriminator = parse_discriminator(account.discriminator, || {
                    account_discriminator(&account.name)
                })?;
                // Legacy IDLs inline the layout, newer ones keep it in `types`.
                let fields = match &account.ty {
                    Some(body) => parse_struct_fields(body),
                    None => raw
                        .types
                        .iter()
                        .find(|def| def.name == account.name)
                        .and_then(|def| parse_struct_fields(&def.ty)),
                };
                Ok(AccountTypeDef {
                    name: account.name,
                    discriminator,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, RunnerError>>()?;

        Ok(Self {
            name: raw.metadata.and_then(|metadata| metadata.name).or(raw.name),
            instructions,
            accounts,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RunnerError> {
        let json = fs::read_to_string(path).map_err(|err| {
            RunnerError::UnknownExecutionError(format!(
                "Failed to read IDL {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// Look up an instruction by name, in either snake_case or camelCase.
    pub fn instruction(&self, name: &str) -> Result<&InstructionDef, RunnerError> {
        let name = to_snake_case(name);
        self.instructions
            .iter()
            .find(|ix| ix.name == name)
            .ok_or(RunnerError::InstructionNotFound(name))
    }

    /// Instruction data: the discriminator followed by the encoded arguments.
    pub fn encode_instruction_data(
        &self,
        instruction: &InstructionDef,
        args: &[Value],
    ) -> Result<Vec<u8>, RunnerError> {
        let mut data = instruction.discriminator.to_vec();
        data.extend(codec::encode_args(&instruction.name, &instruction.args, args)?);
        Ok(data)
    }

    /// Best-effort decode of account data owned by this program.
    ///
    /// Returns `None` unless the data starts with a known account
    /// discriminator whose layout is known. Fields are decoded in order until
    /// one cannot be, and the fields decoded up to that point are returned.
    pub fn decode_account(&self, data: &[u8]) -> Option<Map<String, Value>> {
        let prefix = data.get(..DISCRIMINATOR_LEN)?;
        let account = self
            .accounts
            .iter()
            .find(|account| account.discriminator == prefix)?;
        let fields = account.fields.as_ref()?;
        let decoded = codec::decode_fields(fields, &data[DISCRIMINATOR_LEN..]);
        (!decoded.is_empty()).then_some(decoded)
    }
}
