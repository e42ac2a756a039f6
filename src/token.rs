//! Persistence for the OAuth refresh token.
//!
//! The token lives in a single file under `TOKEN_FOLDER`; the folder is
//! created on startup if absent. Nothing else is ever written there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create the token folder if needed and address the `token` file in it.
    pub fn new(folder: &Path) -> io::Result<Self> {
        fs::create_dir_all(folder)?;
        Ok(TokenStore {
            path: folder.join("token"),
        })
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the persisted token, if any. Whitespace-only files count as absent.
    pub fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn save(&self, token: &str) -> io::Result<()> {
        fs::write(&self.path, token)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_folder(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tado-autoassist-test-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn creates_folder_and_round_trips_token() {
        let folder = scratch_folder("roundtrip");
        let store = TokenStore::new(&folder).expect("create store");
        assert!(!store.exists());
        assert_eq!(store.load(), None);

        store.save("refresh-abc123").expect("save token");
        assert!(store.exists());
        assert_eq!(store.load().as_deref(), Some("refresh-abc123"));

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn whitespace_only_file_counts_as_absent() {
        let folder = scratch_folder("blank");
        let store = TokenStore::new(&folder).expect("create store");
        store.save("  \n").expect("save token");
        assert_eq!(store.load(), None);

        let _ = fs::remove_dir_all(&folder);
    }
}
