//! Backend abstraction and the default file-based backend (§4.7).
//!
//! Grounded on `Database::{create, open, entries, entry, create_entry,
//! delete_entry, update_entry}` for directory discovery and the
//! lock-guarded read/modify/write cycle. Where the teacher's
//! `DatabaseLock` approximates locking with a sentinel file created via
//! `create_new`, [`FileLock`] uses `fs4::fs_std::FileExt` for true
//! cross-process shared/exclusive advisory locks (§5, EXPANDED ambient
//! stack note in `SPEC_FULL.md`).

use std::{
    fs::{self, File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;

use crate::{
    delta::{format_delta_line, parse_delta_log, replay},
    error::Error,
    exporter::export_package,
    importer::import_into,
    model::Package,
    name::validate_name,
};

/// The filesystem locations a [`Backend`] needs: the managed config
/// directory and the save (delta-log) directory.
#[derive(Clone, Debug)]
pub struct Paths {
    /// Default `/etc/config` (§6).
    pub confdir: PathBuf,
    /// Default `/tmp/.uci` (§6).
    pub savedir: PathBuf,
}

/// A held advisory lock on a file, released unconditionally on drop
/// (§5 "scoped resource acquisition").
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Opens `path` read-only and takes a shared lock, for the duration of
    /// an import.
    pub fn shared(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "opening for shared lock".to_string(),
            source,
        })?;
        file.lock_shared().map_err(|source| Error::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }

    /// Opens (creating if necessary) `path` read-write and takes an
    /// exclusive lock, for the duration of a commit.
    pub fn exclusive(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| Error::IoPath {
                path: path.to_path_buf(),
                context: "opening for exclusive lock".to_string(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| Error::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Where a package's config file lives, and whether it participates in the
/// managed save-file mechanism.
#[derive(Clone, Debug)]
pub struct Location {
    /// Absolute path to the canonical config file.
    pub path: PathBuf,
    /// `false` for absolute (`/…`) or explicit relative (`./…`) paths,
    /// which bypass the managed directory and therefore have no save file
    /// (§4.7).
    pub has_delta_log: bool,
}

/// Resolves a bare name, absolute path, or explicit relative path to a
/// [`Location`] (§4.7).
pub fn resolve_location(confdir: &Path, name: &str) -> Result<Location, Error> {
    if let Some(stripped) = name.strip_prefix('/') {
        return Ok(Location {
            path: PathBuf::from("/").join(stripped),
            has_delta_log: false,
        });
    }
    if name.starts_with("./") || name.starts_with("../") {
        return Ok(Location {
            path: PathBuf::from(name),
            has_delta_log: false,
        });
    }
    validate_name("package", name)?;
    Ok(Location {
        path: confdir.join(name),
        has_delta_log: true,
    })
}

/// A source (and sink) of packages: discovery, parsing, and committing.
///
/// Not an inheritance tree — just the three operations every storage
/// medium must support (§4.7).
pub trait Backend: std::fmt::Debug {
    /// Discovers the file for `name` and parses it into a new package.
    fn load(&self, paths: &Paths, name: &str, strict: bool) -> Result<Package, Error>;

    /// Appends pending deltas to the save log without touching the
    /// canonical file (§4.5 "Save (flush pending)").
    fn save(&self, paths: &Paths, package: &mut Package) -> Result<(), Error>;

    /// Flushes pending changes to stable storage.
    fn commit(&self, paths: &Paths, package: &mut Package, overwrite: bool) -> Result<(), Error>;

    /// Enumerates config names available under `paths.confdir`.
    fn list_configs(&self, paths: &Paths) -> Result<Vec<String>, Error>;
}

/// The default, filesystem-backed [`Backend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileBackend;

impl FileBackend {
    fn save_path(paths: &Paths, name: &str) -> PathBuf {
        paths.savedir.join(name)
    }

    /// Appends `package.pending_deltas` to its save file under an
    /// exclusive lock, then clears them (§4.5 "Save (flush pending)").
    fn flush_pending(paths: &Paths, package: &mut Package) -> Result<(), Error> {
        if !package.has_delta_log || package.pending_deltas.is_empty() {
            return Ok(());
        }
        let save_path = Self::save_path(paths, &package.name);
        if let Some(parent) = save_path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::IoPath {
                path: parent.to_path_buf(),
                context: "creating save directory".to_string(),
                source,
            })?;
        }
        let lock = FileLock::exclusive(&save_path)?;
        let mut rendered = String::new();
        for entry in &package.pending_deltas {
            rendered.push_str(&format_delta_line(&package.name, entry));
            rendered.push('\n');
        }
        append_locked(&lock, &rendered, &save_path)?;
        package.saved_deltas.append(&mut package.pending_deltas);
        Ok(())
    }
}

fn append_locked(lock: &FileLock, text: &str, path: &Path) -> Result<(), Error> {
    let mut file = &lock.file;
    file.write_all(text.as_bytes())
        .map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "appending to save file".to_string(),
            source,
        })
}

impl Backend for FileBackend {
    fn save(&self, paths: &Paths, package: &mut Package) -> Result<(), Error> {
        Self::flush_pending(paths, package)
    }

    fn load(&self, paths: &Paths, name: &str, strict: bool) -> Result<Package, Error> {
        let location = resolve_location(&paths.confdir, name)?;
        let text = if location.path.exists() {
            let _lock = FileLock::shared(&location.path)?;
            fs::read_to_string(&location.path).map_err(|source| Error::IoPath {
                path: location.path.clone(),
                context: "reading config file".to_string(),
                source,
            })?
        } else {
            String::new()
        };

        let mut package = Package::new(name);
        package.path = Some(location.path);
        package.has_delta_log = location.has_delta_log;
        import_into(&mut package, &text, strict)?;

        if package.has_delta_log {
            let save_path = Self::save_path(paths, name);
            if let Ok(save_text) = fs::read_to_string(&save_path) {
                let entries = parse_delta_log(&save_text);
                replay(&mut package, &entries);
                package.saved_deltas = entries;
            }
        }

        Ok(package)
    }

    fn commit(&self, paths: &Paths, package: &mut Package, overwrite: bool) -> Result<(), Error> {
        let path = package
            .path
            .clone()
            .ok_or_else(|| Error::NotFound {
                pointer: package.name.clone(),
            })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::IoPath {
                path: parent.to_path_buf(),
                context: "creating config directory".to_string(),
                source,
            })?;
        }
        let lock = FileLock::exclusive(&path)?;

        if package.has_delta_log && !overwrite {
            Self::flush_pending(paths, package)?;

            let canonical_text = fs::read_to_string(&path).unwrap_or_default();
            let mut fresh = Package::new(&package.name);
            fresh.path = Some(path.clone());
            fresh.has_delta_log = true;
            import_into(&mut fresh, &canonical_text, false)?;

            let save_path = Self::save_path(paths, &package.name);
            if let Ok(save_text) = fs::read_to_string(&save_path) {
                let entries = parse_delta_log(&save_text);
                replay(&mut fresh, &entries);
            }
            *package = fresh;
        }

        let rendered = export_package(package, false, false);
        let mut file = &lock.file;
        file.set_len(0).map_err(|source| Error::IoPath {
            path: path.clone(),
            context: "truncating config file".to_string(),
            source,
        })?;
        use std::io::Seek as _;
        file.seek(std::io::SeekFrom::Start(0))
            .map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "rewinding config file".to_string(),
                source,
            })?;
        file.write_all(rendered.as_bytes())
            .map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "writing config file".to_string(),
                source,
            })?;

        if package.has_delta_log {
            let save_path = Self::save_path(paths, &package.name);
            let _ = fs::write(&save_path, "");
            package.saved_deltas.clear();
        }
        package.pending_deltas.clear();

        Ok(())
    }

    fn list_configs(&self, paths: &Paths) -> Result<Vec<String>, Error> {
        let entries = match fs::read_dir(&paths.confdir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| validate_name("package", name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_bare_name_under_confdir() {
        let location = resolve_location(Path::new("/etc/config"), "network").unwrap();
        assert_eq!(location.path, PathBuf::from("/etc/config/network"));
        assert!(location.has_delta_log);
    }

    #[test]
    fn absolute_path_bypasses_confdir() {
        let location = resolve_location(Path::new("/etc/config"), "/tmp/custom").unwrap();
        assert_eq!(location.path, PathBuf::from("/tmp/custom"));
        assert!(!location.has_delta_log);
    }

    #[test]
    fn load_then_commit_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let confdir = dir.path().join("config");
        let savedir = dir.path().join("save");
        fs::create_dir_all(&confdir).unwrap();
        fs::write(
            confdir.join("network"),
            "config interface 'lan'\n\toption proto 'static'\n",
        )
        .unwrap();
        let paths = Paths { confdir, savedir };
        let backend = FileBackend;

        let mut package = backend.load(&paths, "network", true).unwrap();
        package
            .section_mut("lan")
            .unwrap()
            .option_mut("proto")
            .unwrap()
            .value = crate::model::Value::Scalar("dhcp".to_string());
        backend.commit(&paths, &mut package, true).unwrap();

        let reloaded = backend.load(&paths, "network", true).unwrap();
        assert_eq!(
            reloaded.section("lan").unwrap().option("proto").unwrap().value,
            crate::model::Value::Scalar("dhcp".to_string())
        );
    }

    #[test]
    fn concurrent_commits_both_land_via_save_file_replay() {
        // §8 S5: process A loads, sets `lan.ipaddr`, saves (but does not
        // commit yet). Process B independently loads the same package (so
        // it also picks up A's already-saved `ipaddr` from the shared save
        // file), sets `lan.gateway`, saves, and commits — landing both
        // edits in the canonical file and clearing the save file. Process
        // A's subsequent commit re-imports the now-updated canonical file
        // under lock and finds nothing left to replay, so both edits
        // survive in the final file either way.
        let dir = tempdir().unwrap();
        let confdir = dir.path().join("config");
        let savedir = dir.path().join("save");
        fs::create_dir_all(&confdir).unwrap();
        fs::write(
            confdir.join("network"),
            "config interface 'lan'\n\toption proto 'static'\n",
        )
        .unwrap();
        let paths = Paths { confdir, savedir };
        let backend = FileBackend;

        let mut process_a = backend.load(&paths, "network", true).unwrap();
        process_a
            .section_mut("lan")
            .unwrap()
            .alloc_option_scalar("ipaddr", "10.0.0.1")
            .unwrap();
        process_a.pending_deltas.push(crate::model::DeltaEntry {
            command: crate::model::DeltaCommand::Change,
            section: "lan".to_string(),
            option: Some("ipaddr".to_string()),
            value: Some("10.0.0.1".to_string()),
        });
        backend.save(&paths, &mut process_a).unwrap();

        let mut process_b = backend.load(&paths, "network", true).unwrap();
        process_b
            .section_mut("lan")
            .unwrap()
            .alloc_option_scalar("gateway", "10.0.0.254")
            .unwrap();
        process_b.pending_deltas.push(crate::model::DeltaEntry {
            command: crate::model::DeltaCommand::Change,
            section: "lan".to_string(),
            option: Some("gateway".to_string()),
            value: Some("10.0.0.254".to_string()),
        });
        backend.save(&paths, &mut process_b).unwrap();
        backend.commit(&paths, &mut process_b, false).unwrap();

        backend.commit(&paths, &mut process_a, false).unwrap();

        let canonical = fs::read_to_string(confdir_path(&paths)).unwrap();
        assert!(canonical.contains("ipaddr"));
        assert!(canonical.contains("gateway"));

        let reloaded = backend.load(&paths, "network", true).unwrap();
        let lan = reloaded.section("lan").unwrap();
        assert_eq!(lan.option("ipaddr").unwrap().value.as_scalar(), Some("10.0.0.1"));
        assert_eq!(lan.option("gateway").unwrap().value.as_scalar(), Some("10.0.0.254"));
    }

    fn confdir_path(paths: &Paths) -> PathBuf {
        paths.confdir.join("network")
    }

    #[test]
    fn list_configs_ignores_dotted_and_hidden_names() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("network"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::write(dir.path().join("bad.name"), "").unwrap();
        let paths = Paths {
            confdir: dir.path().to_path_buf(),
            savedir: dir.path().join("save"),
        };
        let names = FileBackend.list_configs(&paths).unwrap();
        assert_eq!(names, vec!["network".to_string()]);
    }
}
