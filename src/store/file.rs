//! Flat-file credential store.
//!
//! One `user:passwd:group:home` record per line, the passwd field plain or
//! tagged. Every lookup rescans the file; that is slow but safe under
//! concurrent readers, and file stores are meant for small deployments.
//! Mutations serialize through a lock and rewrite the whole file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use super::{CredentialStore, UserRecord};
use crate::error::StoreError;
use crate::password::UNUSABLE_PASSWORD;

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, PartialEq, Eq)]
struct FileRecord {
    user: String,
    passwd: String,
    group: String,
    home: String,
}

fn parse_line(line: &str) -> Option<FileRecord> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (user, rest) = line.split_once(':')?;
    let mut rest = rest.splitn(3, ':');
    let passwd = rest.next().unwrap_or_default();
    let group = rest.next().unwrap_or_default();
    let home = rest.next().unwrap_or_default();
    Some(FileRecord {
        user: user.to_string(),
        passwd: passwd.to_string(),
        group: group.to_string(),
        home: home.to_string(),
    })
}

fn render_line(record: &FileRecord) -> String {
    format!(
        "{}:{}:{}:{}",
        record.user, record.passwd, record.group, record.home
    )
}

impl FileStore {
    /// Open an existing password file. A missing or unreadable file is
    /// fatal here so that a misconfigured module never starts half-open.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    async fn find(&self, user: &str) -> Result<Option<FileRecord>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(content
            .lines()
            .filter_map(parse_line)
            .find(|record| record.user == user))
    }

    /// Read-modify-write under the mutation lock.
    ///
    /// The new contents go to a sibling temp file first and are renamed over
    /// the original, so a crash mid-write never leaves a truncated password
    /// file behind.
    async fn rewrite<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<FileRecord>) -> Result<(), StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut records: Vec<FileRecord> = content.lines().filter_map(parse_line).collect();
        mutate(&mut records)?;
        let mut output = records
            .iter()
            .map(render_line)
            .collect::<Vec<_>>()
            .join("\n");
        output.push('\n');

        let staging = self.staging_path();
        if let Err(err) = tokio::fs::write(&staging, output).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    /// Sibling of the password file; same directory so the rename cannot
    /// cross a filesystem boundary.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn lookup_password(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self.find(user).await?.map(|record| record.passwd))
    }

    async fn lookup_group(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .find(user)
            .await?
            .map(|record| record.group)
            .filter(|group| !group.is_empty()))
    }

    async fn lookup_home(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .find(user)
            .await?
            .map(|record| record.home)
            .filter(|home| !home.is_empty()))
    }

    async fn add_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.rewrite(|records| {
            if records.iter().any(|existing| existing.user == record.name) {
                return Ok(());
            }
            if record.name.contains(':') {
                warn!("auth: rejecting user name with field separator");
                return Err(StoreError::Backend("user name contains ':'".to_string()));
            }
            records.push(FileRecord {
                user: record.name.clone(),
                passwd: UNUSABLE_PASSWORD.to_string(),
                group: record.group.clone(),
                home: record.home.clone(),
            });
            Ok(())
        })
        .await
    }

    async fn set_password(&self, user: &str, field: &str) -> Result<(), StoreError> {
        self.rewrite(|records| {
            match records.iter_mut().find(|record| record.user == user) {
                Some(found) => {
                    found.passwd = field.to_string();
                    Ok(())
                }
                None => Err(StoreError::NotFound),
            }
        })
        .await
    }

    async fn remove_user(&self, user: &str) -> Result<(), StoreError> {
        self.rewrite(|records| {
            let before = records.len();
            records.retain(|record| record.user != user);
            if records.len() == before {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn passwd_file(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn open_fails_on_missing_file() {
        assert!(FileStore::open("/nonexistent/passwd").await.is_err());
    }

    #[tokio::test]
    async fn lookup_parses_records() {
        let file = passwd_file(
            "# comment line\n\
             alice:wonderland:users:/home/alice\n\
             bob:builder:admins:\n",
        );
        let store = FileStore::open(file.path()).await.unwrap();
        assert_eq!(
            store.lookup_password("alice").await.unwrap().as_deref(),
            Some("wonderland")
        );
        assert_eq!(
            store.lookup_group("bob").await.unwrap().as_deref(),
            Some("admins")
        );
        assert_eq!(store.lookup_home("bob").await.unwrap(), None);
        assert_eq!(store.lookup_password("eve").await.unwrap(), None);
    }

    #[tokio::test]
    async fn check_supports_tagged_fields() {
        let digest = crate::hash::HashAlg::Sha256.digest_parts(&[b"alice:books:wonderland"]);
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let line = format!("alice:$5$realm=books${}:users:/home\n", STANDARD.encode(digest));
        let file = passwd_file(&line);
        let store = FileStore::open(file.path()).await.unwrap();
        assert!(store.check("alice", "wonderland").await.unwrap());
        assert!(!store.check("alice", "other").await.unwrap());
    }

    #[tokio::test]
    async fn management_mutations_round_trip() {
        let file = passwd_file("alice:wonderland:users:/home/alice\n");
        let store = FileStore::open(file.path()).await.unwrap();

        let record = UserRecord {
            name: "carol".to_string(),
            group: "users".to_string(),
            home: "/home/carol".to_string(),
        };
        store.add_user(&record).await.unwrap();
        store.add_user(&record).await.unwrap();
        assert!(!store.check("carol", "*").await.unwrap());

        store.set_password("carol", "paper").await.unwrap();
        assert!(store.check("carol", "paper").await.unwrap());

        store.remove_user("alice").await.unwrap();
        assert_eq!(store.lookup_password("alice").await.unwrap(), None);
        assert!(store.check("carol", "paper").await.unwrap());
    }

    #[tokio::test]
    async fn rewrite_replaces_file_atomically() {
        let file = passwd_file("alice:wonderland:users:/home/alice\n");
        let store = FileStore::open(file.path()).await.unwrap();

        store.set_password("alice", "looking-glass").await.unwrap();

        // The staging sibling must not outlive the rename.
        assert!(tokio::fs::metadata(store.staging_path()).await.is_err());
        let content = tokio::fs::read_to_string(file.path()).await.unwrap();
        assert_eq!(content, "alice:looking-glass:users:/home/alice\n");
    }

    #[tokio::test]
    async fn failed_mutation_leaves_file_untouched() {
        let original = "alice:wonderland:users:/home/alice\n";
        let file = passwd_file(original);
        let store = FileStore::open(file.path()).await.unwrap();

        assert!(store.set_password("ghost", "pw").await.is_err());
        assert!(store
            .add_user(&UserRecord {
                name: "evil:user".to_string(),
                group: String::new(),
                home: String::new(),
            })
            .await
            .is_err());

        let content = tokio::fs::read_to_string(file.path()).await.unwrap();
        assert_eq!(content, original);
    }

    #[tokio::test]
    async fn tokens_unsupported() {
        let file = passwd_file("alice:pw::\n");
        let store = FileStore::open(file.path()).await.unwrap();
        assert!(!store.supports_tokens());
        assert_eq!(store.check_token("anything", true).await.unwrap(), None);
        assert!(store.issue_token("alice", "token", 60).await.is_err());
    }
}
