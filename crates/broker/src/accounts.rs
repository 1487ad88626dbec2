//! Account lookup.
//!
//! Used both to enumerate the identities offered on screen and to resolve
//! the full account record at handoff time. The system source goes through
//! NSS, so accounts from LDAP, sssd or systemd-homed show up the same way
//! `initgroups` will see them. A passwd-format file can be configured
//! instead.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use nix::unistd::User;
use portico_protocol::Identity;
use tracing::debug;

use crate::config::AccountsConfig;

/// getpwent keeps its cursor in process-global state.
static PWENT_LOCK: Mutex<()> = Mutex::new(());

/// One account record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub gecos: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl Account {
    /// First GECOS field, or the account name when that is empty.
    pub fn label(&self) -> &str {
        let full_name = self.gecos.split(',').next().unwrap_or("").trim();
        if full_name.is_empty() {
            &self.name
        } else {
            full_name
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.label().to_string(), self.uid)
    }
}

impl From<User> for Account {
    fn from(user: User) -> Self {
        let shell = if user.shell.as_os_str().is_empty() {
            PathBuf::from("/bin/sh")
        } else {
            user.shell
        };
        Self {
            gecos: user.gecos.to_string_lossy().into_owned(),
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
            shell,
            name: user.name,
        }
    }
}

/// Source of account records
pub trait AccountLookup {
    /// Every account, in source order.
    fn accounts(&self) -> io::Result<Vec<Account>>;

    fn resolve(&self, name: &str) -> io::Result<Option<Account>>;

    /// Human-readable origin, for diagnostics.
    fn source(&self) -> String;

    /// Accounts eligible for login, in source order.
    fn identities(&self, config: &AccountsConfig) -> io::Result<Vec<Identity>> {
        Ok(self
            .accounts()?
            .into_iter()
            .filter(|a| a.uid >= config.min_uid)
            .filter(|a| !config.excluded.iter().any(|name| name == &a.name))
            .take(config.max_count)
            .map(|a| a.identity())
            .collect())
    }
}

/// The configured account source: a passwd file when one is set, the
/// system database otherwise.
pub fn open(config: &AccountsConfig) -> Box<dyn AccountLookup> {
    match &config.passwd_path {
        Some(path) => Box::new(PasswdFile::new(path)),
        None => Box::new(SystemAccounts),
    }
}

/// The system account database (`getpwent` / `getpwnam` through NSS)
pub struct SystemAccounts;

impl AccountLookup for SystemAccounts {
    fn accounts(&self) -> io::Result<Vec<Account>> {
        let _cursor = PWENT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut accounts = Vec::new();
        unsafe {
            libc::setpwent();
            loop {
                let entry = libc::getpwent();
                if entry.is_null() {
                    break;
                }
                accounts.push(Account::from(User::from(&*entry)));
            }
            libc::endpwent();
        }
        Ok(accounts)
    }

    fn resolve(&self, name: &str) -> io::Result<Option<Account>> {
        Ok(User::from_name(name)
            .map_err(io::Error::from)?
            .map(Account::from))
    }

    fn source(&self) -> String {
        "system account database".into()
    }
}

/// A passwd-format file read on every call
pub struct PasswdFile {
    path: PathBuf,
}

impl PasswdFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AccountLookup for PasswdFile {
    fn accounts(&self) -> io::Result<Vec<Account>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let parsed = parse_passwd_line(line);
                if parsed.is_none() && !is_blank_or_comment(line) {
                    debug!(
                        component = "accounts",
                        event = "accounts.line_skipped",
                        path = %self.path.display(),
                        line = idx + 1,
                        "Skipping malformed passwd line"
                    );
                }
                parsed
            })
            .collect())
    }

    fn resolve(&self, name: &str) -> io::Result<Option<Account>> {
        Ok(self.accounts()?.into_iter().find(|a| a.name == name))
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// `name:password:uid:gid:gecos:home:shell`
fn parse_passwd_line(line: &str) -> Option<Account> {
    if is_blank_or_comment(line) {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() != 7 || fields[0].is_empty() {
        return None;
    }
    Some(Account {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        gecos: fields[4].to_string(),
        home: PathBuf::from(fields[5]),
        shell: if fields[6].is_empty() {
            PathBuf::from("/bin/sh")
        } else {
            PathBuf::from(fields[6])
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
# local users
alice:x:1000:1000:Alice Liddell,,,:/home/alice:/bin/zsh
bob:x:1001:1001::/home/bob:
broken line without fields
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
carol:x:1002:100:Carol:/home/carol:/bin/bash
";

    fn directory(content: &str) -> (tempfile::TempDir, PasswdFile) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwd");
        std::fs::write(&path, content).unwrap();
        (dir, PasswdFile::new(path))
    }

    #[test]
    fn enumerates_eligible_identities_in_order() {
        let (_dir, accounts) = directory(PASSWD);
        let identities = accounts.identities(&AccountsConfig::default()).unwrap();

        assert_eq!(
            identities,
            vec![
                Identity::new("alice", "Alice Liddell", 1000),
                Identity::new("bob", "bob", 1001),
                Identity::new("carol", "Carol", 1002),
            ]
        );
    }

    #[test]
    fn honours_threshold_exclusions_and_limit() {
        let (_dir, accounts) = directory(PASSWD);
        let config = AccountsConfig {
            min_uid: 1001,
            max_count: 1,
            excluded: vec!["nobody".into(), "bob".into()],
            ..AccountsConfig::default()
        };

        let identities = accounts.identities(&config).unwrap();
        assert_eq!(identities, vec![Identity::new("carol", "Carol", 1002)]);
    }

    #[test]
    fn resolves_full_record() {
        let (_dir, accounts) = directory(PASSWD);
        let bob = accounts.resolve("bob").unwrap().expect("bob exists");

        assert_eq!(bob.uid, 1001);
        assert_eq!(bob.gid, 1001);
        assert_eq!(bob.home, PathBuf::from("/home/bob"));
        assert_eq!(bob.shell, PathBuf::from("/bin/sh"));
        assert!(accounts.resolve("mallory").unwrap().is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let accounts = PasswdFile::new("/nonexistent/portico/passwd");
        assert!(accounts.identities(&AccountsConfig::default()).is_err());
    }

    #[test]
    fn system_database_resolves_root() {
        let root = SystemAccounts.resolve("root").unwrap().expect("root exists");
        assert_eq!(root.uid, 0);
        assert_eq!(root.gid, 0);
        assert!(!root.shell.as_os_str().is_empty());
        assert!(SystemAccounts
            .resolve("portico-no-such-account")
            .unwrap()
            .is_none());
    }

    #[test]
    fn system_database_agrees_with_getpwnam() {
        let accounts = SystemAccounts.accounts().unwrap();
        let root = accounts
            .iter()
            .find(|a| a.uid == 0)
            .expect("uid 0 enumerated");
        assert_eq!(SystemAccounts.resolve(&root.name).unwrap().as_ref(), Some(root));
        assert_eq!(SystemAccounts.source(), "system account database");
    }

    #[test]
    fn open_picks_source_from_config() {
        let (dir, _) = directory(PASSWD);
        let mut config = AccountsConfig::default();
        assert!(config.passwd_path.is_none());
        assert_eq!(open(&config).source(), "system account database");

        config.passwd_path = Some(dir.path().join("passwd"));
        let accounts = open(&config);
        assert!(accounts.resolve("alice").unwrap().is_some());
        assert_eq!(accounts.identities(&config).unwrap().len(), 3);
    }
}
