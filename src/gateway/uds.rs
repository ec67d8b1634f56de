// Warden — Unix Domain Socket Server
//
// Listens on a Unix domain socket for newline-delimited JSON-RPC 2.0 requests.
// Each connection runs in its own tokio task; each request is handled on the
// blocking pool with its own database connection, so concurrent decisions
// race on SQLite's write lock exactly as separate processes would.
//
// The socket is owner-only. Identities in params are taken as asserted by
// the local client; roles come from the configured admin list.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use crate::config::Settings;
use crate::enclave::Cipher;
use crate::service::{AccessService, AuditQuery, CreateRequestInput};
use crate::store::{Database, NewSecret, RequestFilter, StoreError};
use crate::vault::VaultFallback;

use super::caller::CallerInfo;
use super::protocol::{
    error_code, CreateSecretParams, DecisionParams, JsonRpcRequest, JsonRpcResponse,
    RequestIdParams, RequesterParams, SecretNameParams, SecretValueParams, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unix Domain Socket server for Warden.
pub struct UdsServer {
    settings: Arc<Settings>,
    cipher: Arc<Cipher>,
    socket_path: PathBuf,
}

impl UdsServer {
    pub fn new(settings: Arc<Settings>, cipher: Arc<Cipher>, socket_path: PathBuf) -> Self {
        Self {
            settings,
            cipher,
            socket_path,
        }
    }

    /// Default socket path: `$XDG_RUNTIME_DIR/warden/warden.sock`
    /// Falls back to `/tmp/warden/warden.sock`.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("warden").join("warden.sock")
    }

    /// Start the UDS server. This runs until the process is terminated.
    pub async fn run(&self) -> Result<(), BoxError> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        tracing::info!(
            socket = %self.socket_path.display(),
            "Warden UDS server listening"
        );

        loop {
            let (stream, _addr) = listener.accept().await?;
            let settings = Arc::clone(&self.settings);
            let cipher = Arc::clone(&self.cipher);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, settings, cipher).await {
                    tracing::error!("Connection handler error: {}", e);
                }
            });
        }
    }
}

/// Handle a single client connection.
/// Reads newline-delimited JSON-RPC requests and writes responses.
async fn handle_connection(
    stream: tokio::net::UnixStream,
    settings: Arc<Settings>,
    cipher: Arc<Cipher>,
) -> Result<(), BoxError> {
    let caller = {
        #[cfg(target_os = "linux")]
        {
            let cred = stream.peer_cred()?;
            let pid = cred.pid().unwrap_or(0) as u32;
            CallerInfo::from_peer(pid, cred.uid()).ok()
        }
        #[cfg(not(target_os = "linux"))]
        {
            None::<CallerInfo>
        }
    };

    let origin = caller
        .as_ref()
        .map(|c| c.origin())
        .unwrap_or_else(|| "uds-client".to_string());

    if let Some(ref info) = caller {
        tracing::info!(%info, "Client connected");
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        let settings = Arc::clone(&settings);
        let cipher = Arc::clone(&cipher);
        let origin = origin.clone();

        // Storage and the vault client both block.
        let response = tokio::task::spawn_blocking(move || {
            process_request(&line, &settings, &cipher, &origin)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Request task failed: {}", e);
            JsonRpcResponse::error(Value::Null, INTERNAL_ERROR, "Internal error")
        });

        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and dispatch a single JSON-RPC request.
fn process_request(raw: &str, settings: &Settings, cipher: &Cipher, origin: &str) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => return JsonRpcResponse::parse_error(format!("Parse error: {}", e)),
    };

    if let Err(e) = request.validate() {
        return JsonRpcResponse::error(request.id, INVALID_REQUEST, e);
    }

    let db = match Database::open(&settings.db_path()) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open database");
            return JsonRpcResponse::error(request.id, INTERNAL_ERROR, "Storage unavailable");
        }
    };

    let vault = settings.vault_fallback();

    let service = AccessService::new(&db, cipher, settings)
        .with_fallback(vault.as_ref().map(|v| v as &dyn VaultFallback));

    tracing::debug!(method = %request.method, origin, "Dispatching request");

    match dispatch(&service, &request.method, request.params) {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(failure) => JsonRpcResponse::error(request.id, failure.code, failure.message),
    }
}

/// A failed method call, ready to become a JSON-RPC error object.
struct Failure {
    code: i32,
    message: String,
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        let code = error_code(e.kind());
        let message = if code == INTERNAL_ERROR {
            // Integrity and storage details stay in the server log.
            tracing::error!(error = %e, "Request failed");
            "Internal error".to_string()
        } else {
            e.to_string()
        };
        Self { code, message }
    }
}

fn dispatch(service: &AccessService<'_>, method: &str, params: Value) -> Result<Value, Failure> {
    match method {
        "create_secret" => {
            let p: CreateSecretParams = parse_params(params)?;
            let created = service.create_secret(
                &p.identity,
                NewSecret {
                    name: p.name,
                    description: p.description,
                    kind: p.kind,
                    plaintext: p.value,
                },
            )?;
            to_result(&created)
        }
        "get_secret" => {
            let p: SecretNameParams = parse_params(params)?;
            to_result(&service.get_secret_metadata(&p.name)?)
        }
        "get_secret_value" => {
            let p: SecretValueParams = parse_params(params)?;
            to_result(&service.get_secret_value(&p.name, &p.identity)?)
        }
        "list_secrets" => to_result(&service.list_secrets()?),
        "create_request" => {
            let p: CreateRequestInput = parse_params(params)?;
            to_result(&service.create_request(&p)?)
        }
        "get_request" => {
            let p: RequestIdParams = parse_params(params)?;
            to_result(&service.get_request(&p.id)?)
        }
        "approve_request" => {
            let p: DecisionParams = parse_params(params)?;
            to_result(&service.approve_request(&p.id, &p.decider)?)
        }
        "reject_request" => {
            let p: DecisionParams = parse_params(params)?;
            to_result(&service.reject_request(&p.id, &p.decider)?)
        }
        "list_requests" => {
            let p: RequestFilter = parse_params(params)?;
            to_result(&service.list_requests(&p)?)
        }
        "requester_stats" => {
            let p: RequesterParams = parse_params(params)?;
            to_result(&service.requester_stats(&p.requester)?)
        }
        "list_audit" => {
            let p: AuditQuery = parse_params(params)?;
            to_result(&service.list_audit(&p)?)
        }
        other => Err(Failure {
            code: METHOD_NOT_FOUND,
            message: format!("Unknown method: {}", other),
        }),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Absent params are read as an empty object.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, Failure> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| Failure {
        code: INVALID_PARAMS,
        message: format!("Invalid params: {}", e),
    })
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|e| Failure::from(StoreError::from(e)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::KEY_LEN;
    use crate::gateway::protocol::{
        INVALID_TRANSITION, NOT_FOUND, PARSE_ERROR, UNAUTHORIZED,
    };
    use tempfile::TempDir;

    fn setup() -> (TempDir, Settings, Cipher) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            grant_ttl: None,
            admins: vec!["root".to_string()],
            vault: None,
            identity: "root".to_string(),
        };
        Database::open(&settings.db_path()).unwrap();
        let cipher = Cipher::new(&[9u8; KEY_LEN]).unwrap();
        (dir, settings, cipher)
    }

    fn call(settings: &Settings, cipher: &Cipher, method: &str, params: Value) -> JsonRpcResponse {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        })
        .to_string();
        process_request(&raw, settings, cipher, "test")
    }

    fn error_code_of(resp: &JsonRpcResponse) -> Option<i32> {
        resp.error.as_ref().map(|e| e.code)
    }

    fn seed_secret(settings: &Settings, cipher: &Cipher) {
        let resp = call(
            settings,
            cipher,
            "create_secret",
            serde_json::json!({
                "identity": "root",
                "name": "db-prod",
                "description": "Primary Postgres",
                "kind": "database",
                "value": "p@ssw0rd",
            }),
        );
        assert!(resp.error.is_none(), "create failed: {:?}", resp.error);
    }

    #[test]
    fn test_approval_lifecycle_over_json_rpc() {
        let (_dir, settings, cipher) = setup();
        seed_secret(&settings, &cipher);

        let denied = call(
            &settings,
            &cipher,
            "get_secret_value",
            serde_json::json!({ "name": "db-prod", "identity": "alice" }),
        );
        assert_eq!(error_code_of(&denied), Some(UNAUTHORIZED));

        let created = call(
            &settings,
            &cipher,
            "create_request",
            serde_json::json!({
                "secret_name": "db-prod",
                "requester": "alice",
                "justification": "need for migration",
            }),
        );
        let request = created.result.unwrap();
        assert_eq!(request["status"], "pending");
        let id = request["id"].as_str().unwrap().to_string();

        let approved = call(
            &settings,
            &cipher,
            "approve_request",
            serde_json::json!({ "id": id, "decider": "root" }),
        );
        assert_eq!(approved.result.unwrap()["status"], "approved");

        let again = call(
            &settings,
            &cipher,
            "reject_request",
            serde_json::json!({ "id": id, "decider": "root" }),
        );
        assert_eq!(error_code_of(&again), Some(INVALID_TRANSITION));

        let released = call(
            &settings,
            &cipher,
            "get_secret_value",
            serde_json::json!({ "name": "db-prod", "identity": "alice" }),
        );
        assert_eq!(released.result.unwrap()["value"], "p@ssw0rd");
    }

    #[test]
    fn test_metadata_and_listing_never_carry_values() {
        let (_dir, settings, cipher) = setup();
        seed_secret(&settings, &cipher);

        let meta = call(&settings, &cipher, "get_secret", serde_json::json!({ "name": "db-prod" }));
        let meta = meta.result.unwrap();
        assert_eq!(meta["kind"], "database");
        assert!(!meta.to_string().contains("p@ssw0rd"));

        let list = call(&settings, &cipher, "list_secrets", Value::Null);
        let list = list.result.unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert!(!list.to_string().contains("p@ssw0rd"));
    }

    #[test]
    fn test_store_errors_map_to_codes() {
        let (_dir, settings, cipher) = setup();
        seed_secret(&settings, &cipher);

        let missing = call(&settings, &cipher, "get_secret", serde_json::json!({ "name": "nope" }));
        assert_eq!(error_code_of(&missing), Some(NOT_FOUND));

        let duplicate = call(
            &settings,
            &cipher,
            "create_secret",
            serde_json::json!({ "identity": "root", "name": "db-prod", "value": "x" }),
        );
        assert_eq!(
            error_code_of(&duplicate),
            Some(crate::gateway::protocol::DUPLICATE_NAME)
        );

        let unknown_request = call(
            &settings,
            &cipher,
            "get_request",
            serde_json::json!({ "id": uuid::Uuid::new_v4().to_string() }),
        );
        assert_eq!(error_code_of(&unknown_request), Some(NOT_FOUND));
    }

    #[test]
    fn test_bad_params_are_invalid_params() {
        let (_dir, settings, cipher) = setup();

        let missing_field = call(&settings, &cipher, "get_secret", serde_json::json!({}));
        assert_eq!(error_code_of(&missing_field), Some(INVALID_PARAMS));

        let bad_uuid = call(
            &settings,
            &cipher,
            "approve_request",
            serde_json::json!({ "id": "123", "decider": "root" }),
        );
        assert_eq!(error_code_of(&bad_uuid), Some(INVALID_PARAMS));
    }

    #[test]
    fn test_audit_and_stats_methods() {
        let (_dir, settings, cipher) = setup();
        seed_secret(&settings, &cipher);

        call(
            &settings,
            &cipher,
            "get_secret_value",
            serde_json::json!({ "name": "db-prod", "identity": "alice" }),
        );
        call(
            &settings,
            &cipher,
            "create_request",
            serde_json::json!({ "secret_name": "db-prod", "requester": "alice" }),
        );

        let audit = call(
            &settings,
            &cipher,
            "list_audit",
            serde_json::json!({ "resource": "db-prod" }),
        );
        let entries = audit.result.unwrap();
        let entries = entries.as_array().unwrap();
        assert_eq!(entries[0]["action"], "read_attempt");
        assert_eq!(entries[0]["outcome"], "denied");

        let stats = call(
            &settings,
            &cipher,
            "requester_stats",
            serde_json::json!({ "requester": "alice" }),
        );
        let stats = stats.result.unwrap();
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["pending"], 1);

        let queue = call(
            &settings,
            &cipher,
            "list_requests",
            serde_json::json!({ "status": "pending" }),
        );
        assert_eq!(queue.result.unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_method() {
        let (_dir, settings, cipher) = setup();
        let resp = call(&settings, &cipher, "delete_everything", Value::Null);
        assert_eq!(error_code_of(&resp), Some(METHOD_NOT_FOUND));
    }

    #[test]
    fn test_invalid_json() {
        let (_dir, settings, cipher) = setup();
        let resp = process_request("not json at all", &settings, &cipher, "test");
        assert_eq!(error_code_of(&resp), Some(PARSE_ERROR));
    }

    #[test]
    fn test_default_socket_path() {
        let path = UdsServer::default_socket_path();
        assert!(path.to_string_lossy().ends_with("warden/warden.sock"));
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        use tokio::net::UnixStream;

        let (dir, settings, cipher) = setup();
        let socket = dir.path().join("warden.sock");
        let server = UdsServer::new(Arc::new(settings), Arc::new(cipher), socket.clone());
        let task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = None;
        for _ in 0..200 {
            if let Ok(s) = UnixStream::connect(&socket).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let stream = stream.expect("server should start listening");

        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"list_secrets\",\"id\":7}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"], serde_json::json!([]));

        task.abort();
    }
}
