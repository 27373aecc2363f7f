use std::{
    fs,
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use crate::{config::InstallMode, error::InstallerError};

const MARKER_EXT: &str = "flag";
const RECORD_EXT: &str = "value";

/// Records the mode the markers were written for.
const MODE_RECORD: &str = "mode";

/// Per-step completion markers: one empty `<key>.flag` file per finished
/// step. Only existence is consulted; contents and timestamps are ignored.
///
/// Next to the markers live a few `<name>.value` records: single values a
/// later run has to agree with (the install mode) or take over (the
/// registered subdomain).
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Opens the state directory, creating it (0775) on first use.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o775))?;
        }
        Ok(CheckpointStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, MARKER_EXT))
    }

    fn record(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, RECORD_EXT))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.marker(key).exists()
    }

    pub fn mark_complete(&self, key: &str) -> io::Result<()> {
        fs::File::create(self.marker(key)).map(drop)
    }

    /// Removes every marker and record so the next run starts from the first
    /// step. Returns how many step markers were removed.
    pub fn reset(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(ext) = path.extension() else {
                continue;
            };
            if ext == MARKER_EXT {
                fs::remove_file(&path)?;
                removed += 1;
            } else if ext == RECORD_EXT {
                fs::remove_file(&path)?;
            }
        }
        Ok(removed)
    }

    pub fn has_markers(&self) -> io::Result<bool> {
        for entry in fs::read_dir(&self.dir)? {
            if entry?.path().extension().is_some_and(|ext| ext == MARKER_EXT) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn save(&self, name: &str, value: &str) -> io::Result<()> {
        fs::write(self.record(name), value)
    }

    /// The trimmed record, or `None` when it was never saved or is blank.
    pub fn load(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.record(name)) {
            Ok(raw) => {
                let value = raw.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Binds this state directory to `mode`. Markers written by a run in the
    /// other mode would skip steps whose output differs per mode, so a switch
    /// is refused while any marker exists.
    pub fn claim_mode(&self, mode: InstallMode) -> Result<(), InstallerError> {
        if let Some(recorded) = self.load(MODE_RECORD)? {
            if recorded != mode.as_str() && self.has_markers()? {
                return Err(InstallerError::ModeChanged {
                    recorded,
                    requested: mode.as_str(),
                });
            }
        }
        self.save(MODE_RECORD, mode.as_str())?;
        Ok(())
    }
}

/// Marker key for a step name: lowercase alphanumerics, every other run of
/// characters collapsed to one `_`. `"Setting up caddy"` -> `setting_up_caddy`.
pub fn step_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_derived_from_names() {
        assert_eq!(step_key("Creating user"), "creating_user");
        assert_eq!(step_key("Setting up caddy"), "setting_up_caddy");
        assert_eq!(step_key("  Odd -- name!! "), "odd_name");
    }

    #[test]
    fn marker_existence_is_the_only_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("state")).unwrap();

        assert!(!store.exists("creating_user"));
        store.mark_complete("creating_user").unwrap();
        assert!(store.exists("creating_user"));

        let marker = store.dir().join("creating_user.flag");
        assert_eq!(fs::metadata(&marker).unwrap().len(), 0);

        // Marking twice is harmless.
        store.mark_complete("creating_user").unwrap();

        // A second handle on the same directory sees the same markers.
        let reopened = CheckpointStore::open(store.dir()).unwrap();
        assert!(reopened.exists("creating_user"));
    }

    #[test]
    fn reset_removes_markers_and_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        store.mark_complete("a").unwrap();
        store.mark_complete("b").unwrap();
        store.save("subdomain", "a1b2c3d4e5f6").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.reset().unwrap(), 2);
        assert!(!store.exists("a"));
        assert!(!store.has_markers().unwrap());
        assert_eq!(store.load("subdomain").unwrap(), None);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn records_are_trimmed_and_blank_means_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        assert_eq!(store.load("subdomain").unwrap(), None);
        store.save("subdomain", "a1b2c3d4e5f6\n").unwrap();
        assert_eq!(store.load("subdomain").unwrap().as_deref(), Some("a1b2c3d4e5f6"));
        store.save("subdomain", "  ").unwrap();
        assert_eq!(store.load("subdomain").unwrap(), None);
        // Records are not step markers.
        assert!(!store.has_markers().unwrap());
    }

    #[test]
    fn switching_mode_over_existing_markers_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        store.claim_mode(InstallMode::Containerized).unwrap();
        store.mark_complete("creating_directories").unwrap();
        // Same mode again is fine.
        store.claim_mode(InstallMode::Containerized).unwrap();

        let err = store.claim_mode(InstallMode::HostNative).unwrap_err();
        assert!(matches!(
            &err,
            InstallerError::ModeChanged { recorded, requested: "standalone" } if recorded == "docker"
        ));
        assert!(err.to_string().contains("--fresh"));
        assert_eq!(store.load("mode").unwrap().as_deref(), Some("docker"));

        store.reset().unwrap();
        store.claim_mode(InstallMode::HostNative).unwrap();
        assert_eq!(store.load("mode").unwrap().as_deref(), Some("standalone"));
    }

    #[test]
    fn mode_may_change_before_any_step_finished() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();

        store.claim_mode(InstallMode::Containerized).unwrap();
        store.claim_mode(InstallMode::HostNative).unwrap();
        assert_eq!(store.load("mode").unwrap().as_deref(), Some("standalone"));
    }
}
