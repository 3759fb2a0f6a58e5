//! The in-memory tree: packages, sections, options, and delta entries (§3).

use std::path::PathBuf;

use strum::{Display, EnumString};

use crate::{
    error::Error,
    name::{anon_section_name, section_hash, validate_name, validate_text},
};

/// The shape of an option's value: a single scalar, or an ordered list.
///
/// The tagged-variant representation called for in §9 ("Polymorphic option
/// value"): two creation paths, one read path that returns the variant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// A single scalar string.
    Scalar(String),
    /// An ordered sequence of strings.
    List(Vec<String>),
}

impl Value {
    /// Returns the scalar value, or `None` if this is a list.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::List(_) => None,
        }
    }

    /// Returns the list items, or `None` if this is a scalar.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::Scalar(_) => None,
            Value::List(items) => Some(items),
        }
    }
}

/// A named value attached to a [`Section`]; scalar or list (§3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Option_ {
    /// The option's name, unique among its section's siblings.
    pub name: String,
    /// The option's value.
    pub value: Value,
}

impl Option_ {
    /// Creates a new scalar option.
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Scalar(value.into()),
        }
    }

    /// Creates a new, empty list option.
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::List(Vec::new()),
        }
    }
}

/// A typed, ordered collection of options inside a package (§3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Section {
    /// The section's name: user-supplied, or generated by [`fixup_section`]
    /// for anonymous sections.
    pub name: String,
    /// The section's type (e.g. `interface`, `alias`).
    pub r#type: String,
    /// `true` iff `name` was generated rather than user-supplied.
    pub anonymous: bool,
    /// This section's options, in file/append order.
    pub options: Vec<Option_>,
}

impl Section {
    /// Looks up an option by name (linear scan; §4.3).
    pub fn option(&self, name: &str) -> Option<&Option_> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Looks up an option by name, mutably.
    pub fn option_mut(&mut self, name: &str) -> Option<&mut Option_> {
        self.options.iter_mut().find(|o| o.name == name)
    }

    /// Appends a scalar option. Returns [`Error::Duplicate`] if the name is
    /// already taken by an existing option (of either shape).
    pub fn alloc_option_scalar(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate_name("option", name)?;
        validate_text(name, value)?;
        if self.option(name).is_some() {
            return Err(Error::Duplicate {
                kind: "option",
                name: name.to_string(),
            });
        }
        self.options.push(Option_::scalar(name, value));
        Ok(())
    }

    /// Ensures a list option named `name` exists (creating it if absent;
    /// promoting an existing scalar to a single-item list if present —
    /// §4.6's `list` directive behavior) and appends `value` to it.
    pub fn append_list_item(&mut self, name: &str, value: &str) -> Result<(), Error> {
        validate_name("option", name)?;
        validate_text(name, value)?;
        if let Some(existing) = self.option_mut(name) {
            match &mut existing.value {
                Value::List(items) => items.push(value.to_string()),
                Value::Scalar(scalar) => {
                    let promoted = vec![scalar.clone(), value.to_string()];
                    existing.value = Value::List(promoted);
                }
            }
        } else {
            self.options.push(Option_ {
                name: name.to_string(),
                value: Value::List(vec![value.to_string()]),
            });
        }
        Ok(())
    }

    /// Removes the option named `name`, if present.
    pub fn free_option(&mut self, name: &str) -> Option<Option_> {
        let index = self.options.iter().position(|o| o.name == name)?;
        Some(self.options.remove(index))
    }

    /// Computes and (if the section is still anonymous) assigns this
    /// section's generated name (§4.1, §4.3).
    ///
    /// A no-op if the section already has a user-supplied name. `counter`
    /// is the package's `anon_counter`, already incremented by the caller.
    pub fn fixup_section(&mut self, counter: u32) {
        if !self.anonymous {
            return;
        }
        let hash = section_hash(
            &self.r#type,
            self.options
                .iter()
                .map(|o| (o.name.as_str(), o.value.as_scalar())),
        );
        self.name = anon_section_name(counter, hash);
    }
}

/// A single recorded mutation (§3, §4.5).
///
/// Intentionally coarse and line-based, to survive round-trips through the
/// save file.
#[derive(Clone, Debug, Eq, PartialEq, Display, EnumString)]
pub enum DeltaCommand {
    /// No prefix: change an option's value, or add a section/option if it
    /// does not exist yet.
    #[strum(serialize = "")]
    Change,
    /// `-` prefix: remove a section or option.
    #[strum(serialize = "-")]
    Remove,
    /// `@` prefix: rename a section or option.
    #[strum(serialize = "@")]
    Rename,
    /// `|` prefix: append a value to a list option.
    #[strum(serialize = "|")]
    ListAdd,
    /// `+` prefix: add a bare section (the delta's value is its type).
    #[strum(serialize = "+")]
    Add,
}

/// A single entry in a package's delta log (§3, §4.5).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeltaEntry {
    /// Which kind of mutation this entry records.
    pub command: DeltaCommand,
    /// The target section name (possibly an anonymous generated name).
    pub section: String,
    /// The target option name, if any.
    pub option: Option<String>,
    /// The new value, if any.
    pub value: Option<String>,
}

/// Which backend a [`Package`] was loaded through (§4.7, §9 "Backend set").
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum BackendKind {
    /// The default file-based backend.
    #[default]
    File,
}

/// A top-level configuration container: the unit of load/save/commit (§3).
#[derive(Clone, Debug)]
pub struct Package {
    /// The package's name; unique within its context's root set.
    pub name: String,
    /// The absolute filesystem path this package was loaded from, if any.
    pub path: Option<PathBuf>,
    /// This package's sections, in file/append order.
    pub sections: Vec<Section>,
    /// Mutations recorded since the last [`crate::delta::save`].
    pub pending_deltas: Vec<DeltaEntry>,
    /// Mutations flushed to the save file but not yet committed, loaded
    /// back in by [`crate::delta::replay`] when the caller asks to
    /// preserve them.
    pub saved_deltas: Vec<DeltaEntry>,
    /// `true` iff this package lives in the managed config dir and
    /// therefore uses the save-file mechanism.
    pub has_delta_log: bool,
    /// Which backend owns this package.
    pub backend: BackendKind,
    /// Monotonically increasing counter used to name anonymous sections.
    pub anon_counter: u32,
}

impl Package {
    /// Creates a new, empty in-memory package (§4.3 `alloc_package`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            sections: Vec::new(),
            pending_deltas: Vec::new(),
            saved_deltas: Vec::new(),
            has_delta_log: false,
            backend: BackendKind::default(),
            anon_counter: 0,
        }
    }

    /// Looks up a section by name (linear scan; §4.3 `lookup_child`).
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Looks up a section by name, mutably.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Appends a new section (named, or anonymous if `name` is `None`),
    /// returning its index.
    ///
    /// For anonymous sections the name is left empty until
    /// [`Section::fixup_section`] runs (§4.3).
    pub fn alloc_section(&mut self, r#type: &str, name: Option<&str>) -> Result<usize, Error> {
        validate_name("type", r#type)?;
        let (name, anonymous) = match name {
            Some(name) => {
                validate_name("section", name)?;
                if self.section(name).is_some() {
                    return Err(Error::Duplicate {
                        kind: "section",
                        name: name.to_string(),
                    });
                }
                (name.to_string(), false)
            }
            None => (String::new(), true),
        };
        self.sections.push(Section {
            name,
            r#type: r#type.to_string(),
            anonymous,
            options: Vec::new(),
        });
        Ok(self.sections.len() - 1)
    }

    /// Removes the section named `name`, if present.
    pub fn free_section(&mut self, name: &str) -> Option<Section> {
        let index = self.sections.iter().position(|s| s.name == name)?;
        Some(self.sections.remove(index))
    }

    /// Increments and returns the package's anonymous-section counter
    /// (§4.1: "incremented before formatting").
    pub fn next_anon_counter(&mut self) -> u32 {
        self.anon_counter = self.anon_counter.wrapping_add(1);
        self.anon_counter
    }

    /// Runs [`Section::fixup_section`] on the section at `index`, assigning
    /// it a generated name if it is still anonymous.
    pub fn fixup_section_at(&mut self, index: usize) {
        if self.sections[index].anonymous && self.sections[index].name.is_empty() {
            let counter = self.next_anon_counter();
            self.sections[index].fixup_section(counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn alloc_section_rejects_duplicate_named_sections() {
        let mut pkg = Package::new("net");
        pkg.alloc_section("interface", Some("lan")).unwrap();
        let err = pkg.alloc_section("interface", Some("lan")).unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "section", .. }));
    }

    #[test]
    fn list_promotion_preserves_order() {
        let mut section = Section {
            name: "s".into(),
            r#type: "s".into(),
            anonymous: false,
            options: Vec::new(),
        };
        section.alloc_option_scalar("foo", "a").unwrap();
        section.append_list_item("foo", "b").unwrap();
        let option = section.option("foo").unwrap();
        assert_eq!(
            option.value,
            Value::List(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn fixup_section_is_noop_for_named_sections() {
        let mut section = Section {
            name: "lan".into(),
            r#type: "interface".into(),
            anonymous: false,
            options: Vec::new(),
        };
        section.fixup_section(1);
        assert_eq!(section.name, "lan");
    }

    #[test]
    fn anonymous_fixup_assigns_stable_name() {
        let mut a = Section {
            name: String::new(),
            r#type: "interface".into(),
            anonymous: true,
            options: vec![Option_::scalar("proto", "static")],
        };
        let mut b = a.clone();
        a.fixup_section(1);
        b.fixup_section(1);
        assert_eq!(a.name, b.name);
        assert!(a.name.starts_with("cfg01"));
    }
}
