// Warden — CLI Command Handlers
//
// Each function handles one CLI subcommand through `AccessService`. Every
// command except `serve` runs on the blocking thread pool: the vault adapter
// uses a blocking HTTP client, which must not run on an async worker.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::enclave::{Cipher, KeyringProvider, MasterKeyProvider};
use crate::error::WardenError;
use crate::gateway::UdsServer;
use crate::service::{AccessService, AuditQuery, CreateRequestInput};
use crate::store::{
    Database, NewSecret, RequestFilter, RequestId, RequestStatus, SecretKind, SecretOrigin,
};
use crate::vault::VaultFallback;

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<(), WardenError> {
    let settings = Settings::from_args(&cli.settings)?;

    match cli.command {
        Commands::Serve { socket } => cmd_serve(settings, socket).await,
        command => tokio::task::spawn_blocking(move || run(command, &settings))
            .await
            .map_err(|e| WardenError::Internal(format!("Command task failed: {}", e)))?,
    }
}

fn run(command: Commands, settings: &Settings) -> Result<(), WardenError> {
    if let Commands::Init = command {
        return cmd_init(settings);
    }

    let (db, cipher) = open_db(settings)?;
    let vault = settings.vault_fallback();
    let service = AccessService::new(&db, &cipher, settings)
        .with_fallback(vault.as_ref().map(|v| v as &dyn VaultFallback));

    match command {
        Commands::Add {
            name,
            description,
            kind,
            value,
        } => cmd_add(&service, settings, name, description, kind, value),
        Commands::Show { name } => cmd_show(&service, &name),
        Commands::Get { name } => cmd_get(&service, settings, &name),
        Commands::List => cmd_list(&service),
        Commands::Request {
            secret,
            justification,
        } => cmd_request(&service, settings, secret, justification),
        Commands::Approve { request_id } => cmd_approve(&service, settings, &request_id),
        Commands::Reject { request_id } => cmd_reject(&service, settings, &request_id),
        Commands::Requests {
            status,
            requester,
            secret,
            limit,
        } => cmd_requests(&service, status, requester, secret, limit),
        Commands::Status { request_id } => cmd_status(&service, &request_id),
        Commands::Stats { requester } => cmd_stats(&service, settings, requester),
        Commands::Audit {
            limit,
            before,
            resource,
        } => cmd_audit(&service, limit, before, resource),
        Commands::Init | Commands::Serve { .. } => Err(WardenError::Internal(
            "command must not be dispatched here".to_string(),
        )),
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(settings: &Settings) -> Result<(), WardenError> {
    let provider = KeyringProvider::new();

    std::fs::create_dir_all(&settings.data_dir)?;

    // Generate or retrieve the master secret, then prove it derives a key.
    provider.get_or_create_master_secret()?;
    provider.open_cipher()?;

    let path = settings.db_path();
    Database::open(&path)?;

    println!("✓ Warden initialized successfully");
    println!("  Database: {}", path.display());
    println!("  Master key stored in platform keyring");
    println!();
    println!("Next: store a secret with `warden add <name> --kind <kind> --description <text>`");

    Ok(())
}

// ─── Secrets ─────────────────────────────────────────────────────────────────

fn cmd_add(
    service: &AccessService<'_>,
    settings: &Settings,
    name: String,
    description: String,
    kind: String,
    value: Option<String>,
) -> Result<(), WardenError> {
    let kind: SecretKind = kind.parse()?;
    let plaintext = match value {
        Some(v) => Zeroizing::new(v),
        None => read_value_from_stdin()?,
    };

    let created = service.create_secret(
        &settings.identity,
        NewSecret {
            name,
            description,
            kind,
            plaintext,
        },
    )?;

    println!("✓ Secret stored");
    println!("  ID:   {}", created.id);
    println!("  Name: {}", created.name);

    Ok(())
}

fn cmd_show(service: &AccessService<'_>, name: &str) -> Result<(), WardenError> {
    let meta = service.get_secret_metadata(name)?;

    println!("Secret details:\n");
    println!("  Name:        {}", meta.name);
    if let Some(id) = meta.id {
        println!("  ID:          {}", id);
    }
    println!("  Kind:        {}", meta.kind.as_str());
    println!("  Description: {}", meta.description);
    println!("  Value:       [REDACTED]");
    if let Some(created_at) = meta.created_at {
        println!("  Created:     {}", created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if meta.origin == SecretOrigin::Vault {
        println!("  Origin:      external vault");
    }

    Ok(())
}

fn cmd_get(service: &AccessService<'_>, settings: &Settings, name: &str) -> Result<(), WardenError> {
    let released = service.get_secret_value(name, &settings.identity)?;
    // The value alone on stdout, so it can be piped.
    println!("{}", released.value.as_str());
    Ok(())
}

fn cmd_list(service: &AccessService<'_>) -> Result<(), WardenError> {
    let secrets = service.list_secrets()?;

    if secrets.is_empty() {
        println!("No secrets stored yet.");
        println!("Add one with: warden add <name> --kind <kind> --description <text>");
        return Ok(());
    }

    println!("Stored secrets ({}):\n", secrets.len());
    for meta in &secrets {
        println!(
            "  {:24} │ {:12} │ {}",
            meta.name,
            meta.kind.as_str(),
            meta.description,
        );
    }

    Ok(())
}

// ─── Requests ────────────────────────────────────────────────────────────────

fn cmd_request(
    service: &AccessService<'_>,
    settings: &Settings,
    secret: String,
    justification: String,
) -> Result<(), WardenError> {
    let request = service.create_request(&CreateRequestInput {
        secret_name: secret,
        requester: settings.identity.clone(),
        justification,
    })?;

    println!("✓ Access request {} created ({})", request.id, request.status);
    println!("  Ask an admin to run: warden approve {}", request.id);

    Ok(())
}

fn cmd_approve(
    service: &AccessService<'_>,
    settings: &Settings,
    request_id: &str,
) -> Result<(), WardenError> {
    let id = parse_request_id(request_id)?;
    let request = service.approve_request(&id, &settings.identity)?;
    println!(
        "✓ Request {} approved: {} may read '{}'",
        request.id, request.requester, request.secret_name
    );
    Ok(())
}

fn cmd_reject(
    service: &AccessService<'_>,
    settings: &Settings,
    request_id: &str,
) -> Result<(), WardenError> {
    let id = parse_request_id(request_id)?;
    let request = service.reject_request(&id, &settings.identity)?;
    println!("✓ Request {} rejected", request.id);
    Ok(())
}

fn cmd_requests(
    service: &AccessService<'_>,
    status: Option<String>,
    requester: Option<String>,
    secret: Option<String>,
    limit: Option<usize>,
) -> Result<(), WardenError> {
    let status = status.map(|s| s.parse::<RequestStatus>()).transpose()?;
    let requests = service.list_requests(&RequestFilter {
        status,
        requester,
        secret_name: secret,
        limit,
    })?;

    if requests.is_empty() {
        println!("No matching access requests.");
        return Ok(());
    }

    for request in &requests {
        println!(
            "  {} │ {:8} │ {:16} │ {:24} │ {}",
            request.id,
            request.status,
            request.requester,
            request.secret_name,
            request.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

fn cmd_status(service: &AccessService<'_>, request_id: &str) -> Result<(), WardenError> {
    let id = parse_request_id(request_id)?;
    let request = service.get_request(&id)?;

    println!("Access request {}:\n", request.id);
    println!("  Secret:        {}", request.secret_name);
    println!("  Requester:     {}", request.requester);
    println!("  Justification: {}", request.justification);
    println!("  Status:        {}", request.status);
    println!("  Created:       {}", request.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let (Some(decider), Some(decided_at)) = (&request.decider, request.decided_at) {
        println!(
            "  Decided:       {} by {}",
            decided_at.format("%Y-%m-%d %H:%M:%S UTC"),
            decider
        );
    }

    Ok(())
}

fn cmd_stats(
    service: &AccessService<'_>,
    settings: &Settings,
    requester: Option<String>,
) -> Result<(), WardenError> {
    let requester = requester.unwrap_or_else(|| settings.identity.clone());
    let stats = service.requester_stats(&requester)?;

    println!("Access requests by {}:", requester);
    println!("  Total:    {}", stats.total);
    println!("  Pending:  {}", stats.pending);
    println!("  Approved: {}", stats.approved);
    println!("  Rejected: {}", stats.rejected);

    Ok(())
}

// ─── Audit ───────────────────────────────────────────────────────────────────

fn cmd_audit(
    service: &AccessService<'_>,
    limit: usize,
    before: Option<String>,
    resource: Option<String>,
) -> Result<(), WardenError> {
    let before = before.as_deref().map(parse_cursor).transpose()?;
    let entries = service.list_audit(&AuditQuery {
        limit: Some(limit),
        before,
        resource,
    })?;

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    println!("{:-<80}", "");
    for entry in &entries {
        println!("{}", entry);
    }
    println!("{:-<80}", "");

    if let Some(oldest) = entries.last() {
        if entries.len() == limit {
            println!("More: warden audit --before {}", oldest.timestamp.to_rfc3339());
        }
    }

    Ok(())
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(settings: Settings, socket: Option<PathBuf>) -> Result<(), WardenError> {
    let (_, cipher) = open_db(&settings)?;
    let socket_path = socket.unwrap_or_else(UdsServer::default_socket_path);

    println!("Starting Warden UDS server at {}...", socket_path.display());

    let server = UdsServer::new(Arc::new(settings), Arc::new(cipher), socket_path);
    server
        .run()
        .await
        .map_err(|e| WardenError::Other(format!("UDS server error: {}", e)))?;

    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Open the database and derive the cipher from the platform keyring.
fn open_db(settings: &Settings) -> Result<(Database, Cipher), WardenError> {
    let provider = KeyringProvider::new();

    if !provider.has_master_secret()? {
        return Err(WardenError::Other(
            "Warden is not initialized. Run `warden init` first.".to_string(),
        ));
    }

    let path = settings.db_path();
    if !path.exists() {
        return Err(WardenError::Other(format!(
            "Database not found at {}. Run `warden init` first.",
            path.display()
        )));
    }

    let cipher = provider.open_cipher()?;
    let db = Database::open(&path)?;

    Ok((db, cipher))
}

fn parse_request_id(raw: &str) -> Result<RequestId, WardenError> {
    Uuid::parse_str(raw).map_err(|e| WardenError::Other(format!("Invalid request UUID: {}", e)))
}

fn parse_cursor(raw: &str) -> Result<DateTime<Utc>, WardenError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WardenError::Other(format!("Invalid --before timestamp: {}", e)))
}

fn read_value_from_stdin() -> Result<Zeroizing<String>, WardenError> {
    eprint!("Secret value: ");
    let mut line = Zeroizing::new(String::new());
    std::io::stdin().lock().read_line(&mut line)?;

    let value = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if value.is_empty() {
        return Err(WardenError::Other("Secret value must not be empty".to_string()));
    }
    Ok(value)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
