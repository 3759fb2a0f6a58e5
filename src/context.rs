//! The unit of isolation: root packages, search paths, backends, flags
//! (§4.8).
//!
//! Grounded on the teacher's `Database`/`DbSchema` construction style:
//! explicit builder-style setters rather than implicit environment reads.

use std::path::{Path, PathBuf};

use crate::{
    backend::{Backend, FileBackend, Paths},
    delta::{record_scalar_change, render_delta_log, replay},
    error::Error,
    exporter::export_package,
    importer::import_into,
    model::{DeltaCommand, DeltaEntry, Package, Value},
    name::{validate_name, validate_text},
    resolver::{parse_pointer, resolve, Pointer, SectionRef},
};

/// Default managed config directory (§6).
pub const DEFAULT_CONFDIR: &str = "/etc/config";
/// Default save-file directory (§6).
pub const DEFAULT_SAVEDIR: &str = "/tmp/.uci";

/// Behavior switches carried on a [`Context`] (§4.8).
#[derive(Clone, Copy, Debug)]
pub struct Flags {
    /// Abort import on the first parse error rather than skipping the line.
    pub strict: bool,
    /// Print errors to stderr as they occur (CLI-facing; the library itself
    /// only ever returns `Result`, so this flag is advisory metadata the
    /// CLI layer reads back).
    pub perror: bool,
    /// Emit anonymous sections' generated names on export.
    pub export_name: bool,
    /// Keep the save-file mechanism active; `false` mimics `-P` (a
    /// throwaway savedir with no real commit).
    pub saved_history: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            strict: true,
            perror: true,
            export_name: false,
            saved_history: true,
        }
    }
}

/// What a resolved pointer named, reflecting how deep resolution got
/// (§4.4).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GetResult {
    /// The pointer named only a package.
    Package,
    /// The pointer resolved to a section.
    Section {
        /// The section's (possibly generated) name.
        name: String,
        /// The section's type.
        r#type: String,
    },
    /// The pointer resolved to an option's value.
    Option(Value),
}

/// The unit of isolation for all UCI state (§4.8).
///
/// All state is per-context; a process may hold several independently.
/// Not `Send`/`Sync`: the type intentionally does not implement threading
/// bounds, matching §5's "a single context is not thread-safe."
#[derive(Debug)]
pub struct Context {
    packages: Vec<Package>,
    /// Additional delta search paths (`-p`), consulted before `savedir`.
    pub search_paths: Vec<PathBuf>,
    backends: Vec<(String, Box<dyn Backend>)>,
    default_backend: String,
    /// Behavior flags.
    pub flags: Flags,
    confdir: PathBuf,
    savedir: PathBuf,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with the default `file` backend registered and
    /// default paths (§6).
    pub fn new() -> Self {
        Self {
            packages: Vec::new(),
            search_paths: Vec::new(),
            backends: vec![("file".to_string(), Box::new(FileBackend))],
            default_backend: "file".to_string(),
            flags: Flags::default(),
            confdir: PathBuf::from(DEFAULT_CONFDIR),
            savedir: PathBuf::from(DEFAULT_SAVEDIR),
        }
    }

    /// Overrides the config directory (`-c`).
    pub fn set_confdir(&mut self, path: impl Into<PathBuf>) {
        self.confdir = path.into();
    }

    /// Overrides the save directory (`-P` also implies this and disables
    /// real commits at the CLI layer; the context itself just stores the
    /// path).
    pub fn set_savedir(&mut self, path: impl Into<PathBuf>) {
        self.savedir = path.into();
    }

    /// The current config directory.
    pub fn confdir(&self) -> &Path {
        &self.confdir
    }

    /// The current save directory.
    pub fn savedir(&self) -> &Path {
        &self.savedir
    }

    /// Registers an additional backend under `name`.
    pub fn register_backend(&mut self, name: impl Into<String>, backend: Box<dyn Backend>) {
        self.backends.push((name.into(), backend));
    }

    /// Sets which registered backend new loads use by default.
    pub fn set_default_backend(&mut self, name: impl Into<String>) {
        self.default_backend = name.into();
    }

    fn backend(&self, name: &str) -> Result<&dyn Backend, Error> {
        self.backends
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_ref())
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    fn paths(&self) -> Paths {
        Paths {
            confdir: self.confdir.clone(),
            savedir: self.savedir.clone(),
        }
    }

    /// Returns an already-loaded package by name.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.name == name)
    }

    /// All currently loaded packages, in load order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Loads `name` via the default backend if not already resident
    /// (§4.4 step 3, "auto-load").
    pub fn ensure_loaded(&mut self, name: &str) -> Result<(), Error> {
        if self.package(name).is_some() {
            return Ok(());
        }
        let backend = self.backend(&self.default_backend)?;
        let paths = self.paths();
        let package = backend.load(&paths, name, self.flags.strict)?;
        self.packages.push(package);
        Ok(())
    }

    /// Adds an already-constructed package (e.g. read from stdin by
    /// `uci import`) to the root set, replacing any existing package of
    /// the same name.
    pub fn adopt_package(&mut self, package: Package) {
        self.packages.retain(|p| p.name != package.name);
        self.packages.push(package);
    }

    /// Discards a package from memory without touching disk.
    pub fn unload(&mut self, name: &str) {
        self.packages.retain(|p| p.name != name);
    }

    /// Enumerates config names available under the confdir, through the
    /// default backend.
    pub fn list_configs(&self) -> Result<Vec<String>, Error> {
        let backend = self.backend(&self.default_backend)?;
        backend.list_configs(&self.paths())
    }

    /// Resolves `pointer_str`, auto-loading its package if necessary
    /// (§4.4 full algorithm, steps 1-7).
    pub fn get(&mut self, pointer_str: &str) -> Result<GetResult, Error> {
        let pointer = parse_pointer(pointer_str)?;
        self.ensure_loaded(&pointer.package)?;
        let package = self.package(&pointer.package).expect("just ensured loaded");

        if pointer.section.is_none() {
            return Ok(GetResult::Package);
        }

        let resolved = resolve(package, &pointer);
        let section_index = resolved
            .section_index
            .ok_or_else(|| not_found(pointer_str))?;

        match &pointer.option {
            Some(option_name) => {
                let option = package.sections[section_index]
                    .option(option_name)
                    .ok_or_else(|| not_found(pointer_str))?;
                Ok(GetResult::Option(option.value.clone()))
            }
            None => {
                let section = &package.sections[section_index];
                Ok(GetResult::Section {
                    name: section.name.clone(),
                    r#type: section.r#type.clone(),
                })
            }
        }
    }

    /// Sets an option's scalar value, or a section's type, creating either
    /// if it does not exist yet (§4.4: "set on a missing section
    /// materializes it").
    pub fn set(&mut self, pointer_str: &str) -> Result<(), Error> {
        let pointer = parse_pointer(pointer_str)?;
        let value = pointer.value.clone().ok_or_else(|| Error::InvalidPointer {
            pointer: pointer_str.to_string(),
            reason: "set requires a value".to_string(),
        })?;
        let section_ref = pointer.section.clone().ok_or_else(|| Error::InvalidPointer {
            pointer: pointer_str.to_string(),
            reason: "set requires a section component".to_string(),
        })?;

        self.ensure_loaded(&pointer.package)?;
        let package = self
            .package_mut(&pointer.package)
            .expect("just ensured loaded");
        let resolved = resolve(package, &pointer);

        match &pointer.option {
            Some(option_name) => {
                let section_index = resolved.section_index.ok_or_else(|| not_found(pointer_str))?;
                let section_name = package.sections[section_index].name.clone();
                let previous = package.sections[section_index]
                    .option(option_name)
                    .and_then(|o| o.value.as_scalar())
                    .map(str::to_string);
                match package.sections[section_index].option_mut(option_name) {
                    Some(existing) => {
                        validate_text(option_name, &value)?;
                        existing.value = Value::Scalar(value.clone());
                    }
                    None => package.sections[section_index].alloc_option_scalar(option_name, &value)?,
                }
                record_scalar_change(
                    package,
                    &section_name,
                    option_name,
                    previous.as_deref(),
                    &value,
                );
            }
            None => match resolved.section_index {
                Some(section_index) => {
                    validate_name("type", &value)?;
                    package.sections[section_index].r#type = value.clone();
                    let section_name = package.sections[section_index].name.clone();
                    package.pending_deltas.push(DeltaEntry {
                        command: DeltaCommand::Change,
                        section: section_name,
                        option: None,
                        value: Some(value),
                    });
                }
                None => {
                    let name = match &section_ref {
                        SectionRef::Named(name) => name.clone(),
                        SectionRef::Indexed { .. } => {
                            return Err(Error::InvalidPointer {
                                pointer: pointer_str.to_string(),
                                reason: "cannot create a section via an indexed reference"
                                    .to_string(),
                            })
                        }
                    };
                    package.alloc_section(&value, Some(&name))?;
                    package.pending_deltas.push(DeltaEntry {
                        command: DeltaCommand::Add,
                        section: name,
                        option: None,
                        value: Some(value),
                    });
                }
            },
        }
        Ok(())
    }

    /// Appends a value to a list option, creating the list (or promoting
    /// an existing scalar to a single-item list) if necessary (§2, §4.5
    /// "`|` prefix: ListAdd").
    pub fn add_list(&mut self, pointer_str: &str) -> Result<(), Error> {
        let pointer = parse_pointer(pointer_str)?;
        let value = pointer.value.clone().ok_or_else(|| Error::InvalidPointer {
            pointer: pointer_str.to_string(),
            reason: "add_list requires a value".to_string(),
        })?;
        let option_name = pointer.option.clone().ok_or_else(|| Error::InvalidPointer {
            pointer: pointer_str.to_string(),
            reason: "add_list requires an option component".to_string(),
        })?;

        self.ensure_loaded(&pointer.package)?;
        let package = self
            .package_mut(&pointer.package)
            .expect("just ensured loaded");
        let resolved = resolve(package, &pointer);
        let section_index = resolved.section_index.ok_or_else(|| not_found(pointer_str))?;
        let section_name = package.sections[section_index].name.clone();

        package.sections[section_index].append_list_item(&option_name, &value)?;
        package.pending_deltas.push(DeltaEntry {
            command: DeltaCommand::ListAdd,
            section: section_name,
            option: Some(option_name),
            value: Some(value),
        });
        Ok(())
    }

    /// Removes a section or option.
    pub fn del(&mut self, pointer_str: &str) -> Result<(), Error> {
        let pointer = parse_pointer(pointer_str)?;
        self.ensure_loaded(&pointer.package)?;
        let package = self
            .package_mut(&pointer.package)
            .expect("just ensured loaded");
        let resolved = resolve(package, &pointer);
        let section_index = resolved.section_index.ok_or_else(|| not_found(pointer_str))?;
        let section_name = package.sections[section_index].name.clone();

        match &pointer.option {
            Some(option_name) => {
                package.sections[section_index]
                    .free_option(option_name)
                    .ok_or_else(|| not_found(pointer_str))?;
                package.pending_deltas.push(DeltaEntry {
                    command: DeltaCommand::Remove,
                    section: section_name,
                    option: Some(option_name.clone()),
                    value: None,
                });
            }
            None => {
                package.free_section(&section_name);
                package.pending_deltas.push(DeltaEntry {
                    command: DeltaCommand::Remove,
                    section: section_name,
                    option: None,
                    value: None,
                });
            }
        }
        Ok(())
    }

    /// Renames a section or option.
    pub fn rename(&mut self, pointer_str: &str, new_name: &str) -> Result<(), Error> {
        let pointer = parse_pointer(pointer_str)?;
        self.ensure_loaded(&pointer.package)?;
        let package = self
            .package_mut(&pointer.package)
            .expect("just ensured loaded");
        let resolved = resolve(package, &pointer);
        let section_index = resolved.section_index.ok_or_else(|| not_found(pointer_str))?;
        let section_name = package.sections[section_index].name.clone();

        match &pointer.option {
            Some(option_name) => {
                validate_name("option", new_name)?;
                if package.sections[section_index].option(new_name).is_some() {
                    return Err(Error::Duplicate {
                        kind: "option",
                        name: new_name.to_string(),
                    });
                }
                let option = package.sections[section_index]
                    .option_mut(option_name)
                    .ok_or_else(|| not_found(pointer_str))?;
                option.name = new_name.to_string();
                package.pending_deltas.push(DeltaEntry {
                    command: DeltaCommand::Rename,
                    section: section_name,
                    option: Some(option_name.clone()),
                    value: Some(new_name.to_string()),
                });
            }
            None => {
                validate_name("section", new_name)?;
                if package.section(new_name).is_some() {
                    return Err(Error::Duplicate {
                        kind: "section",
                        name: new_name.to_string(),
                    });
                }
                package.sections[section_index].name = new_name.to_string();
                package.sections[section_index].anonymous = false;
                package.pending_deltas.push(DeltaEntry {
                    command: DeltaCommand::Rename,
                    section: section_name,
                    option: None,
                    value: Some(new_name.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Adds a new anonymous section of `r#type` to `package`, returning its
    /// generated name.
    pub fn add(&mut self, package_name: &str, r#type: &str) -> Result<String, Error> {
        self.ensure_loaded(package_name)?;
        let package = self
            .package_mut(package_name)
            .expect("just ensured loaded");
        let index = package.alloc_section(r#type, None)?;
        package.fixup_section_at(index);
        let name = package.sections[index].name.clone();
        package.pending_deltas.push(DeltaEntry {
            command: DeltaCommand::Add,
            section: name.clone(),
            option: None,
            value: Some(r#type.to_string()),
        });
        Ok(name)
    }

    /// Returns every pending-or-saved-but-uncommitted delta for `package`,
    /// in on-disk replay order (saved first, then still-pending).
    pub fn changes(&self, package_name: &str) -> Vec<DeltaEntry> {
        match self.package(package_name) {
            Some(package) => package
                .saved_deltas
                .iter()
                .chain(package.pending_deltas.iter())
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Flushes `package`'s pending deltas to its save file (§4.5 "Save").
    pub fn save(&mut self, package_name: &str) -> Result<(), Error> {
        let paths = self.paths();
        let Context {
            packages,
            backends,
            default_backend,
            ..
        } = self;
        let backend = backends
            .iter()
            .find(|(n, _)| n == default_backend)
            .map(|(_, b)| b.as_ref())
            .ok_or_else(|| Error::UnknownBackend(default_backend.clone()))?;
        let package = packages
            .iter_mut()
            .find(|p| p.name == package_name)
            .ok_or_else(|| not_found(package_name))?;
        backend.save(&paths, package)
    }

    /// Commits `package` to its canonical config file (§4.5 "Commit").
    pub fn commit(&mut self, package_name: &str, overwrite: bool) -> Result<(), Error> {
        let paths = self.paths();
        let Context {
            packages,
            backends,
            default_backend,
            ..
        } = self;
        let backend = backends
            .iter()
            .find(|(n, _)| n == default_backend)
            .map(|(_, b)| b.as_ref())
            .ok_or_else(|| Error::UnknownBackend(default_backend.clone()))?;
        let package = packages
            .iter_mut()
            .find(|p| p.name == package_name)
            .ok_or_else(|| not_found(package_name))?;
        backend.commit(&paths, package, overwrite)
    }

    /// Reverts uncommitted changes under `pointer_str`, restoring the
    /// affected subtree from the canonical file (§4.5 "Revert").
    pub fn revert(&mut self, pointer_str: &str) -> Result<(), Error> {
        let pointer = parse_pointer(pointer_str)?;
        self.ensure_loaded(&pointer.package)?;
        let paths = self.paths();
        let package = self
            .package_mut(&pointer.package)
            .expect("just ensured loaded");

        let matches = pointer_matches(&pointer);
        package.pending_deltas.retain(|e| !matches(e));
        let remaining_saved: Vec<DeltaEntry> = package
            .saved_deltas
            .iter()
            .filter(|e| !matches(e))
            .cloned()
            .collect();
        package.saved_deltas = remaining_saved.clone();

        if package.has_delta_log {
            let save_path = paths.savedir.join(&package.name);
            let rendered = render_delta_log(&package.name, &remaining_saved);
            std::fs::write(&save_path, rendered).map_err(|source| Error::IoPath {
                path: save_path,
                context: "rewriting save file".to_string(),
                source,
            })?;
        }

        if let Some(path) = package.path.clone() {
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            let mut fresh = Package::new(&package.name);
            fresh.path = Some(path);
            fresh.has_delta_log = package.has_delta_log;
            import_into(&mut fresh, &text, self.flags.strict)?;
            replay(&mut fresh, &remaining_saved);
            self.adopt_package(fresh);
        }

        Ok(())
    }

    /// Serializes a loaded package to config-file text (§4.6 "Export").
    pub fn export(&self, package_name: &str) -> Result<String, Error> {
        let package = self
            .package(package_name)
            .ok_or_else(|| not_found(package_name))?;
        Ok(export_package(package, self.flags.export_name, true))
    }
}

fn not_found(pointer: &str) -> Error {
    Error::NotFound {
        pointer: pointer.to_string(),
    }
}

fn pointer_matches(pointer: &Pointer) -> impl Fn(&DeltaEntry) -> bool + '_ {
    move |entry: &DeltaEntry| {
        let section_matches = match &pointer.section {
            None => true,
            Some(SectionRef::Named(name)) => &entry.section == name,
            Some(SectionRef::Indexed { .. }) => false,
        };
        if !section_matches {
            return false;
        }
        match &pointer.option {
            None => true,
            Some(name) => entry.option.as_deref() == Some(name.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn context_with_fixture() -> (Context, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let confdir = dir.path().join("config");
        fs::create_dir_all(&confdir).unwrap();
        fs::write(
            confdir.join("network"),
            "config interface 'lan'\n\toption proto 'static'\n\tlist dns '1.1.1.1'\n",
        )
        .unwrap();
        let mut ctx = Context::new();
        ctx.set_confdir(&confdir);
        ctx.set_savedir(dir.path().join("save"));
        (ctx, dir)
    }

    #[test]
    fn get_resolves_scalar_option() {
        let (mut ctx, _dir) = context_with_fixture();
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("static".to_string())));
    }

    #[test]
    fn set_materializes_missing_section() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.set("network.wan=interface").unwrap();
        let value = ctx.get("network.wan").unwrap();
        assert_eq!(
            value,
            GetResult::Section {
                name: "wan".to_string(),
                r#type: "interface".to_string()
            }
        );
    }

    #[test]
    fn set_then_get_sees_new_scalar_value() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.set("network.lan.proto=dhcp").unwrap();
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("dhcp".to_string())));
    }

    #[test]
    fn set_rejects_control_bytes_in_existing_option_value() {
        let (mut ctx, _dir) = context_with_fixture();
        let err = ctx.set("network.lan.proto=bad\nvalue").unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("static".to_string())));
    }

    #[test]
    fn set_rejects_non_name_safe_type_on_existing_section() {
        let (mut ctx, _dir) = context_with_fixture();
        let err = ctx.set("network.lan=bad type").unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
        let value = ctx.get("network.lan").unwrap();
        assert_eq!(
            value,
            GetResult::Section {
                name: "lan".to_string(),
                r#type: "interface".to_string()
            }
        );
    }

    #[test]
    fn del_removes_option_and_records_delta() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.del("network.lan.proto").unwrap();
        assert!(ctx.get("network.lan.proto").is_err());
        let changes = ctx.changes("network");
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].command, DeltaCommand::Remove));
    }

    #[test]
    fn add_list_appends_and_records_delta() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.add_list("network.lan.dns=8.8.8.8").unwrap();
        let value = ctx.get("network.lan.dns").unwrap();
        assert_eq!(
            value,
            GetResult::Option(Value::List(vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]))
        );
        let changes = ctx.changes("network");
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].command, DeltaCommand::ListAdd));
    }

    #[test]
    fn revert_restores_canonical_value() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.set("network.lan.proto=dhcp").unwrap();
        ctx.revert("network.lan.proto").unwrap();
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("static".to_string())));
    }

    #[test]
    fn rename_option_rejects_collision_with_existing_sibling() {
        let (mut ctx, _dir) = context_with_fixture();
        let err = ctx.rename("network.lan.proto", "dns").unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "option", .. }));
        // The original option is untouched, and `dns` still resolves to the
        // one, original list option, not some half-renamed duplicate.
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("static".to_string())));
        let value = ctx.get("network.lan.dns").unwrap();
        assert_eq!(
            value,
            GetResult::Option(Value::List(vec!["1.1.1.1".to_string()]))
        );
    }

    #[test]
    fn rename_option_rejects_non_name_safe_new_name() {
        let (mut ctx, _dir) = context_with_fixture();
        let err = ctx.rename("network.lan.proto", "not.safe").unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn rename_section_rejects_collision_with_existing_sibling() {
        let (mut ctx, _dir) = context_with_fixture();
        ctx.set("network.wan=interface").unwrap();
        let err = ctx.rename("network.wan", "lan").unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "section", .. }));
    }

    #[test]
    fn rename_section_rejects_non_name_safe_new_name() {
        let (mut ctx, _dir) = context_with_fixture();
        let err = ctx.rename("network.lan", "not-safe").unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }
}
