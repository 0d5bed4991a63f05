// `member` subcommands
//
// Each command builds a client from the resolved configuration, performs one
// logical operation and writes its result to the given output.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Subcommand};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

use super::CommandContext;
use crate::member::PrimaryMember;
use crate::utils::dates;
use crate::workspace::{load_defaults, member_file_name};

/// Plan code used by `member create` unless overridden
pub const DEFAULT_PLAN_CODE: &str = "DWA57Q83";

const FIRST_NAMES: [&str; 12] = [
    "Avery", "Blake", "Casey", "Dana", "Elliot", "Frankie", "Harper", "Jordan", "Morgan", "Quinn",
    "Riley", "Taylor",
];

const LAST_NAMES: [&str; 12] = [
    "Anderson", "Brooks", "Carter", "Dawson", "Ellis", "Foster", "Garcia", "Hughes", "Nguyen",
    "Patel", "Reyes", "Sullivan",
];

#[derive(Debug, Clone, Subcommand)]
pub enum MemberCommand {
    /// Create a primary member from defaults, a JSON file and flags
    Create(CreateArgs),

    /// Print the externalID stored in a local payload file
    GetId {
        /// Payload file path, or a file name in current/, create/ or response/
        json_filename: String,
    },

    /// Fetch a member and print it
    Inspect {
        #[arg(value_parser = parse_external_id)]
        external_id: String,

        /// Rewrite the member's file in current/
        #[arg(long)]
        refresh_current: bool,
    },

    /// Update changeable member fields
    Update(UpdateArgs),

    /// Replace the member's active policies with a new plan code
    AddPolicy {
        #[arg(value_parser = parse_external_id)]
        external_id: String,

        plancode: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Terminate all active policies
    Rm {
        #[arg(value_parser = parse_external_id)]
        external_id: String,

        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct CreateArgs {
    /// JSON file with default member fields
    #[arg(long)]
    pub defaults: Option<PathBuf>,

    /// JSON payload path, or a file name in create/
    #[arg(long)]
    pub from_json: Option<String>,

    #[arg(long, value_parser = parse_external_id)]
    pub external_id: Option<String>,

    #[arg(long)]
    pub first_name: Option<String>,

    #[arg(long)]
    pub last_name: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long, default_value = DEFAULT_PLAN_CODE)]
    pub plan_code: String,

    /// Validate and print the external id without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["json_string", "json_file"])))]
pub struct UpdateArgs {
    #[arg(value_parser = parse_external_id)]
    pub external_id: String,

    /// Fields to update as a JSON object
    #[arg(long, value_parser = parse_json_object)]
    pub json_string: Option<Map<String, Value>>,

    /// JSON file path, or a file name in update/
    #[arg(long)]
    pub json_file: Option<String>,

    #[arg(long)]
    pub dry_run: bool,
}

/// Accept any UUID spelling and normalise it to lower-case hyphenated form
pub fn parse_external_id(value: &str) -> Result<String, String> {
    Uuid::parse_str(value.trim())
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| format!("Not UUID Format: {}", e))
}

fn parse_json_object(value: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Dispatch a member subcommand
pub fn run(ctx: &CommandContext, command: MemberCommand, out: &mut dyn Write) -> Result<()> {
    match command {
        MemberCommand::Create(args) => create(ctx, args, out),
        MemberCommand::GetId { json_filename } => get_id(ctx, &json_filename, out),
        MemberCommand::Inspect {
            external_id,
            refresh_current,
        } => inspect(ctx, &external_id, refresh_current, out),
        MemberCommand::Update(args) => update(ctx, args, out),
        MemberCommand::AddPolicy {
            external_id,
            plancode,
            dry_run,
        } => add_policy(ctx, &external_id, &plancode, dry_run, out),
        MemberCommand::Rm {
            external_id,
            dry_run,
        } => remove_policies(ctx, &external_id, dry_run, out),
    }
}

/// Assemble a create payload; later sources win over earlier ones
///
/// Order: defaults, then the `--from-json` document, then flags. Missing
/// identity fields are generated.
pub fn build_create_payload(
    args: &CreateArgs,
    defaults: Map<String, Value>,
    from_json: Option<Map<String, Value>>,
) -> Map<String, Value> {
    let mut payload = defaults;
    if let Some(document) = from_json {
        payload.extend(document);
    }

    match &args.external_id {
        Some(external_id) => {
            payload.insert("externalID".to_string(), Value::from(external_id.as_str()));
        }
        None if !payload.contains_key("externalID") => {
            let external_id = Uuid::new_v4().to_string();
            tracing::debug!("Generated external id {}", external_id);
            payload.insert("externalID".to_string(), Value::from(external_id));
        }
        None => {}
    }

    let mut name = match payload.remove("name") {
        Some(Value::Object(name)) => name,
        _ => Map::new(),
    };
    let seed = Uuid::new_v4();
    let seed = seed.as_bytes();
    match &args.first_name {
        Some(first) => {
            name.insert("First".to_string(), Value::from(first.as_str()));
        }
        None if !name.contains_key("First") => {
            let first = FIRST_NAMES[seed[0] as usize % FIRST_NAMES.len()];
            name.insert("First".to_string(), Value::from(first));
        }
        None => {}
    }
    match &args.last_name {
        Some(last) => {
            name.insert("Last".to_string(), Value::from(last.as_str()));
        }
        None if !name.contains_key("Last") => {
            let last = LAST_NAMES[seed[1] as usize % LAST_NAMES.len()];
            name.insert("Last".to_string(), Value::from(last));
        }
        None => {}
    }

    match &args.email {
        Some(email) => {
            payload.insert("email".to_string(), Value::from(email.as_str()));
        }
        None if !payload.contains_key("email") => {
            let first = name.get("First").and_then(Value::as_str).unwrap_or_default();
            let last = name.get("Last").and_then(Value::as_str).unwrap_or_default();
            let initial = first.chars().next().map(|c| c.to_lowercase().to_string()).unwrap_or_default();
            let email = format!("{}{}@localhost.com", initial, last.to_lowercase());
            payload.insert("email".to_string(), Value::from(email));
        }
        None => {}
    }
    payload.insert("name".to_string(), Value::Object(name));

    payload
        .entry("benefitstart")
        .or_insert_with(|| Value::from(dates::today_midnight_iso()));
    payload
        .entry("plancode")
        .or_insert_with(|| Value::from(args.plan_code.as_str()));

    payload
}

fn payload_file_name(payload: &Map<String, Value>) -> String {
    let name = payload.get("name");
    let part = |key: &str| {
        name.and_then(|n| n.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    member_file_name(&part("First"), &part("Last"))
}

fn member_file(member: &PrimaryMember<'_>) -> String {
    member
        .name()
        .and_then(|name| name.file_stem())
        .map(|stem| format!("{}.json", stem))
        .unwrap_or_else(|| format!("{}.json", member.external_id()))
}

fn create(ctx: &CommandContext, args: CreateArgs, out: &mut dyn Write) -> Result<()> {
    tracing::debug!("Creating Primary Member Invoked");

    let defaults_path = args.defaults.clone().unwrap_or_else(|| ctx.defaults_file.clone());
    let defaults = if defaults_path.exists() {
        load_defaults(&defaults_path)?
    } else if args.defaults.is_some() {
        anyhow::bail!("Defaults file {} does not exist", defaults_path.display());
    } else {
        Map::new()
    };

    let from_json = match &args.from_json {
        Some(name) => {
            let found = ctx
                .workspace
                .find_json(name, &[ctx.workspace.create_dir()])?
                .with_context(|| format!("--from-json: file {} not found", name))?;
            match found.1 {
                Value::Object(map) => Some(map),
                _ => anyhow::bail!("--from-json: {} must hold a JSON object", found.0.display()),
            }
        }
        None => None,
    };

    let payload = build_create_payload(&args, defaults, from_json);
    tracing::debug!(
        "Created Member Payload:\n{}",
        serde_json::to_string_pretty(&payload)?
    );

    let payload = Value::Object(payload);
    crate::schema::validate_member(&payload)?;
    tracing::debug!("Validated Payload");

    let fields = payload.as_object().cloned().unwrap_or_default();
    let filename = payload_file_name(&fields);
    if ctx.is_test_mode() {
        ctx.workspace
            .write_json(&ctx.workspace.create_dir().join(&filename), &payload)?;
    }

    if args.dry_run {
        writeln!(out, "{}", fields.get("externalID").and_then(Value::as_str).unwrap_or_default())?;
        return Ok(());
    }

    let mut client = ctx.client()?;
    let member = client.create_primary_member(&payload)?;
    let member_data = member.to_value();
    if ctx.is_test_mode() {
        ctx.workspace
            .write_json(&ctx.workspace.response_dir().join(&filename), &member_data)?;
        ctx.workspace
            .write_json(&ctx.workspace.current_dir().join(&filename), &member_data)?;
    }

    writeln!(out, "{}", member.external_id())?;
    Ok(())
}

fn get_id(ctx: &CommandContext, json_filename: &str, out: &mut dyn Write) -> Result<()> {
    tracing::debug!("Getting id from {}", json_filename);
    let workspace = &ctx.workspace;
    let search = [
        workspace.current_dir(),
        workspace.create_dir(),
        workspace.response_dir(),
    ];

    let (_, document) = workspace
        .find_json(json_filename, &search)?
        .with_context(|| format!("File {} not found", json_filename))?;
    let external_id = document
        .get("externalID")
        .and_then(Value::as_str)
        .with_context(|| format!("{} has no externalID", json_filename))?;

    writeln!(out, "{}", external_id)?;
    Ok(())
}

fn inspect(
    ctx: &CommandContext,
    external_id: &str,
    refresh_current: bool,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::debug!("Inspecting Primary Member {}", external_id);
    let mut client = ctx.client()?;
    let member = client.get_primary_member(external_id)?;
    let member_data = member.to_value();

    if refresh_current {
        let path = ctx.workspace.current_dir().join(member_file(&member));
        ctx.workspace.write_json(&path, &member_data)?;
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&member_data)?)?;
    Ok(())
}

fn update(ctx: &CommandContext, args: UpdateArgs, out: &mut dyn Write) -> Result<()> {
    tracing::debug!("Update Primary Member Invoked");

    let (source_file, mut fields) = match (args.json_string, &args.json_file) {
        (Some(fields), None) => (None, fields),
        (None, Some(name)) => {
            let (path, document) = ctx
                .workspace
                .find_json(name, &[ctx.workspace.update_dir()])?
                .with_context(|| format!("--json-file: file {} not found", name))?;
            match document {
                Value::Object(map) => (Some(path), map),
                _ => anyhow::bail!("--json-file: {} must hold a JSON object", path.display()),
            }
        }
        (Some(_), Some(_)) => anyhow::bail!("Cannot use --json-string and --json-file together"),
        (None, None) => anyhow::bail!("--json-string or --json-file required"),
    };
    fields.remove("externalID");

    let mut client = ctx.client()?;
    let mut member = client.get_primary_member(&args.external_id)?;
    let response = member.update(fields, args.dry_run)?;
    let mut response = match response {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("response".to_string(), other);
            map
        }
    };
    response.insert("externalID".to_string(), Value::from(args.external_id.as_str()));
    let response = Value::Object(response);

    if ctx.is_test_mode() {
        let current_name = match &source_file {
            Some(path) => {
                ctx.workspace.write_json(path, &response)?;
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| member_file(&member))
            }
            None => member_file(&member),
        };
        ctx.workspace
            .write_json(&ctx.workspace.current_dir().join(current_name), &response)?;
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
    Ok(())
}

fn add_policy(
    ctx: &CommandContext,
    external_id: &str,
    plancode: &str,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::debug!("Create Policy Command Invoked");
    let mut client = ctx.client()?;
    let mut member = client.get_primary_member(external_id)?;
    let change = member.create_policy(plancode, None, dry_run)?;

    if ctx.is_test_mode() {
        let path = ctx.workspace.current_dir().join(member_file(&member));
        ctx.workspace.write_json(&path, &member.to_value())?;
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&change)?)?;
    Ok(())
}

fn remove_policies(
    ctx: &CommandContext,
    external_id: &str,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<()> {
    tracing::debug!("Remove Policy Command Invoked");
    let mut client = ctx.client()?;
    let mut member = client.get_primary_member(external_id)?;
    let terminated = member.deactivate_policies(dry_run)?;

    writeln!(out, "{}", serde_json::to_string_pretty(&terminated)?)?;
    Ok(())
}
