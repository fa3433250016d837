//! End-to-end scheme flows driven the way an HTTP server would drive them:
//! challenge, client-side credential computation, check, auth_info.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;

use portier::{
    AuthConfig, AuthModule, Challenge, CredentialStore, FileStore, HashAlg, MemoryStore,
    SchemeKind, SqliteStore, UserRecord,
};

/// Route the crate's tracing output through the test harness. Safe to call
/// from every test; only the first install wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Pull a quoted attribute value out of a `WWW-Authenticate` header.
fn field<'a>(header: &'a str, key: &str) -> &'a str {
    let marker = format!("{key}=\"");
    let start = header.find(&marker).unwrap() + marker.len();
    let end = start + header[start..].find('"').unwrap();
    &header[start..end]
}

fn challenge_header(challenge: &Challenge) -> String {
    match challenge {
        Challenge::Unauthorized { www_authenticate } => www_authenticate[0].clone(),
        Challenge::Continue => panic!("expected a terminal challenge"),
    }
}

/// What a conforming client sends back for a Digest challenge.
fn digest_response(header: &str, user: &str, passwd: &str, method: &str, uri: &str) -> String {
    let realm = field(header, "realm");
    let nonce = field(header, "nonce");
    let opaque = field(header, "opaque");
    let a1 = HashAlg::Md5.hex_digest_parts(&[
        user.as_bytes(),
        b":",
        realm.as_bytes(),
        b":",
        passwd.as_bytes(),
    ]);
    let a2 = HashAlg::Md5.hex_digest_parts(&[method.as_bytes(), b":", uri.as_bytes()]);
    let response = HashAlg::Md5.hex_digest_parts(&[
        a1.as_bytes(),
        b":",
        nonce.as_bytes(),
        b":00000001:f00dcafe:auth:",
        a2.as_bytes(),
    ]);
    format!(
        "Digest username=\"{user}\",realm=\"{realm}\",nonce=\"{nonce}\",\
         uri=\"{uri}\",qop=auth,nc=00000001,cnonce=\"f00dcafe\",\
         response=\"{response}\",opaque=\"{opaque}\",algorithm=MD5"
    )
}

#[tokio::test]
async fn digest_handshake_and_replay_rejection() -> Result<()> {
    init_tracing();
    let store: Arc<dyn CredentialStore> =
        Arc::new(MemoryStore::new().with_user("alice", "wonderland", "users", "/home/alice"));
    let config = AuthConfig {
        scheme: SchemeKind::Digest,
        realm: Some("gate".to_string()),
        algorithm: "MD5".to_string(),
        ..AuthConfig::default()
    };
    let module = AuthModule::create(config, store)?;

    let mut authenticator = module.authenticator();
    let header = challenge_header(&authenticator.challenge());
    assert!(header.starts_with("Digest realm=\"gate\""));
    assert!(header.ends_with("stale=false"));

    let credential = digest_response(&header, "alice", "wonderland", "GET", "/index.html");
    let user = authenticator.check("GET", "/index.html", &credential).await;
    assert_eq!(user.as_deref(), Some("alice"));

    let info = module.auth_info("alice").await;
    assert_eq!(info.group.as_deref(), Some("users"));
    assert_eq!(info.home.as_deref(), Some("/home/alice"));
    assert_eq!(info.authtype, "Digest");

    // A new connection carries a new nonce; replaying the old credential
    // must fail and the follow-up challenge tells the client why.
    let mut fresh = module.authenticator();
    assert_eq!(fresh.check("GET", "/index.html", &credential).await, None);
    let header = challenge_header(&fresh.challenge());
    assert!(header.ends_with("stale=true"));

    // Answering the fresh nonce succeeds.
    let retry = digest_response(&header, "alice", "wonderland", "GET", "/index.html");
    assert_eq!(
        fresh.check("GET", "/index.html", &retry).await.as_deref(),
        Some("alice")
    );
    Ok(())
}

#[tokio::test]
async fn digest_rejects_wrong_password_and_wrong_uri() -> Result<()> {
    init_tracing();
    let store: Arc<dyn CredentialStore> =
        Arc::new(MemoryStore::new().with_user("alice", "wonderland", "users", ""));
    let config = AuthConfig {
        scheme: SchemeKind::Digest,
        realm: Some("gate".to_string()),
        algorithm: "MD5".to_string(),
        ..AuthConfig::default()
    };
    let module = AuthModule::create(config, store)?;
    let mut authenticator = module.authenticator();
    let header = challenge_header(&authenticator.challenge());

    let wrong = digest_response(&header, "alice", "rabbit", "GET", "/index.html");
    assert_eq!(authenticator.check("GET", "/index.html", &wrong).await, None);

    let moved = digest_response(&header, "alice", "wonderland", "GET", "/index.html");
    assert_eq!(authenticator.check("GET", "/other.html", &moved).await, None);
    Ok(())
}

#[tokio::test]
async fn basic_flow_over_file_store() -> Result<()> {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "alice:wonderland:users:/home/alice")?;
    file.flush()?;

    let store: Arc<dyn CredentialStore> =
        Arc::new(FileStore::open(file.path()).await?);
    let config = AuthConfig {
        scheme: SchemeKind::Basic,
        realm: Some("gate".to_string()),
        algorithm: "MD5".to_string(),
        ..AuthConfig::default()
    };
    let module = AuthModule::create(config, store)?;

    let mut authenticator = module.authenticator();
    assert_eq!(
        challenge_header(&authenticator.challenge()),
        "Basic realm=\"gate\""
    );
    // base64("alice:wonderland")
    let user = authenticator
        .check("GET", "/", "Basic YWxpY2U6d29uZGVybGFuZA==")
        .await;
    assert_eq!(user.as_deref(), Some("alice"));

    let forged = authenticator.check("GET", "/", "Basic YWxpY2U6cmFiYml0").await;
    assert_eq!(forged, None);
    Ok(())
}

#[tokio::test]
async fn bearer_flow_over_sqlite_store() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let sqlite = SqliteStore::open(dir.path().join("auth.db")).await?;
    sqlite
        .add_user(&UserRecord {
            name: "alice".to_string(),
            group: "users".to_string(),
            home: String::new(),
        })
        .await?;
    sqlite.issue_token("alice", "opaque-session", 300).await?;

    let store: Arc<dyn CredentialStore> = Arc::new(sqlite);
    let config = AuthConfig {
        scheme: SchemeKind::Bearer,
        realm: Some("api".to_string()),
        algorithm: "MD5".to_string(),
        ..AuthConfig::default()
    };
    let module = AuthModule::create(config, store)?;

    let mut authenticator = module.authenticator();
    assert_eq!(
        challenge_header(&authenticator.challenge()),
        "Bearer realm=\"api\""
    );
    assert_eq!(
        authenticator
            .check("GET", "/", "Bearer opaque-session")
            .await
            .as_deref(),
        Some("alice")
    );
    assert_eq!(authenticator.check("GET", "/", "Bearer forged").await, None);
    Ok(())
}

#[tokio::test]
async fn basic_accepts_tagged_password_fields() -> Result<()> {
    init_tracing();
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    // SHA-256 A1 stored pre-hashed, base64, bound to the realm.
    let a1 = HashAlg::Sha256.digest_parts(&[b"alice:gate:wonderland"]);
    let field_value = format!("$5a$realm=gate${}", STANDARD.encode(a1));
    let store: Arc<dyn CredentialStore> =
        Arc::new(MemoryStore::new().with_user("alice", &field_value, "users", ""));

    let config = AuthConfig {
        scheme: SchemeKind::Basic,
        realm: Some("gate".to_string()),
        algorithm: "SHA-256".to_string(),
        ..AuthConfig::default()
    };
    let module = AuthModule::create(config, store)?;
    let mut authenticator = module.authenticator();
    assert_eq!(
        authenticator
            .check("GET", "/", "Basic YWxpY2U6d29uZGVybGFuZA==")
            .await
            .as_deref(),
        Some("alice")
    );
    Ok(())
}
