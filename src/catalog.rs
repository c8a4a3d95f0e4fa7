//! Read-only key/user catalog, built once at boot.
//!
//! Two JSON5 files feed it: the database file (`keys`, `users`) and the
//! credentials file (`passwords`, bcrypt hashes keyed by user id). Users
//! without a credentials entry are card-only operators. The catalog is
//! immutable afterwards and shared by reference.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub id: String,
    pub uid: String,
    pub name: String,
}

impl fmt::Display for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, RFID={})", self.name, self.id, self.uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub uid: String,
    pub username: String,
    pub name: String,
    /// bcrypt hash; `None` for card-only operators.
    pub credential_hash: Option<String>,
    /// Key ids this user may take out.
    pub authorized_for: HashSet<String>,
}

impl UserRecord {
    pub fn is_authorized_for(&self, key_id: &str) -> bool {
        self.authorized_for.contains(key_id)
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, ID={}, RFID={})",
            self.name, self.username, self.id, self.uid
        )
    }
}

// On-disk shapes.

#[derive(Debug, Deserialize)]
struct DatabaseFile {
    keys: Vec<RawKey>,
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawKey {
    id: String,
    rf_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    rf_id: String,
    username: String,
    name: String,
    authorized_for: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordsFile {
    passwords: Vec<PasswordEntry>,
}

#[derive(Debug, Deserialize)]
struct PasswordEntry {
    id: String,
    password: String,
}

pub struct Catalog {
    keys_by_uid: HashMap<String, KeyRecord>,
    keys_by_id: HashMap<String, KeyRecord>,
    users_by_uid: HashMap<String, UserRecord>,
    users_by_username: HashMap<String, UserRecord>,
}

impl Catalog {
    pub fn load(database: &Path, passwords: &Path) -> Result<Catalog> {
        let passwords: PasswordsFile = parse_json5(passwords)?;
        let database: DatabaseFile = parse_json5(database)?;

        let user_ids: HashSet<&str> = database.users.iter().map(|u| u.id.as_str()).collect();
        let mut hashes: HashMap<String, String> = HashMap::new();
        for entry in passwords.passwords {
            if !user_ids.contains(entry.id.as_str()) {
                return Err(Error::Catalog(format!(
                    "credentials entry for unknown user id {}",
                    entry.id
                )));
            }
            hashes.insert(entry.id, entry.password);
        }

        let keys: Vec<KeyRecord> = database
            .keys
            .into_iter()
            .map(|k| KeyRecord {
                id: k.id,
                uid: k.rf_id,
                name: k.name,
            })
            .collect();
        let key_ids: HashSet<&str> = keys.iter().map(|k| k.id.as_str()).collect();

        let mut users: Vec<UserRecord> = Vec::new();
        for u in database.users {
            for key_id in &u.authorized_for {
                if !key_ids.contains(key_id.as_str()) {
                    warn!("user {} authorized for unknown key id {key_id}", u.username);
                }
            }
            let credential_hash = hashes.get(&u.id).cloned();
            users.push(UserRecord {
                credential_hash,
                id: u.id,
                uid: u.rf_id,
                username: u.username,
                name: u.name,
                authorized_for: u.authorized_for.into_iter().collect(),
            });
        }

        Ok(Catalog::from_records(keys, users))
    }

    pub fn from_records(keys: Vec<KeyRecord>, users: Vec<UserRecord>) -> Catalog {
        Catalog {
            keys_by_uid: keys.iter().map(|k| (k.uid.clone(), k.clone())).collect(),
            keys_by_id: keys.into_iter().map(|k| (k.id.clone(), k)).collect(),
            users_by_uid: users.iter().map(|u| (u.uid.clone(), u.clone())).collect(),
            users_by_username: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    pub fn key_by_uid(&self, uid: &str) -> Option<&KeyRecord> {
        self.keys_by_uid.get(uid)
    }

    pub fn key_by_id(&self, id: &str) -> Option<&KeyRecord> {
        self.keys_by_id.get(id)
    }

    pub fn user_by_uid(&self, uid: &str) -> Option<&UserRecord> {
        self.users_by_uid.get(uid)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users_by_username.get(username)
    }

    /// Returns the user only when the supplied password matches their stored
    /// bcrypt hash. Card-only users never match.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Option<&UserRecord> {
        let user = self.users_by_username.get(username)?;
        let hash = user.credential_hash.as_deref()?;
        match bcrypt::verify(password, hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(e) => {
                warn!("unusable credential hash for {username}: {e}");
                None
            }
        }
    }
}

fn parse_json5<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str(&text).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    fn sample_catalog() -> Catalog {
        let hash = bcrypt::hash("hunter2", 4).unwrap();
        let database = write_temp(
            "{
                keys: [
                    { id: 'k1', rf_id: 'aabbccdd', name: 'Server Room' },
                    { id: 'k2', rf_id: '11223344', name: 'Workshop' },
                ],
                users: [
                    {
                        id: 'u1', rf_id: 'deadbeef', username: 'ada',
                        name: 'Ada L.', authorized_for: ['k1'],
                    },
                    {
                        id: 'u2', rf_id: 'cafebabe', username: 'grace',
                        name: 'Grace H.', authorized_for: ['k1', 'k2'],
                    },
                ],
            }",
        );
        let passwords = write_temp(&format!(
            "{{ passwords: [ {{ id: 'u1', password: '{hash}' }} ] }}"
        ));
        Catalog::load(database.path(), passwords.path()).unwrap()
    }

    #[test]
    fn lookups_resolve_records() {
        let catalog = sample_catalog();
        assert_eq!(catalog.key_by_uid("aabbccdd").unwrap().name, "Server Room");
        assert_eq!(catalog.key_by_id("k2").unwrap().uid, "11223344");
        assert_eq!(catalog.user_by_uid("cafebabe").unwrap().username, "grace");
        assert_eq!(catalog.user_by_username("ada").unwrap().id, "u1");
        assert!(catalog.key_by_uid("ffffffff").is_none());
        assert!(catalog.user_by_uid("ffffffff").is_none());
    }

    #[test]
    fn password_verification() {
        let catalog = sample_catalog();
        assert!(catalog.verify_credentials("ada", "hunter2").is_some());
        assert!(catalog.verify_credentials("ada", "wrong").is_none());
        // grace has no credentials entry: card-only
        assert!(catalog.verify_credentials("grace", "anything").is_none());
        assert!(catalog.verify_credentials("nobody", "x").is_none());
    }

    #[test]
    fn authorization_set() {
        let catalog = sample_catalog();
        let ada = catalog.user_by_username("ada").unwrap();
        assert!(ada.is_authorized_for("k1"));
        assert!(!ada.is_authorized_for("k2"));
    }

    #[test]
    fn rejects_credentials_for_unknown_user() {
        let database = write_temp("{ keys: [], users: [] }");
        let passwords = write_temp("{ passwords: [ { id: 'ghost', password: 'x' } ] }");
        let err = Catalog::load(database.path(), passwords.path());
        assert!(matches!(err, Err(Error::Catalog(_))));
    }
}
