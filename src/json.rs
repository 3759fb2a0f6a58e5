//! JSON rendering of a loaded package tree (§6 EXPANDED).
//!
//! A second `show`/`export` output mode alongside the canonical UCI text
//! format, the way the teacher's `alpm-db-desc format` command offers a
//! JSON alternative to its own native serialization. Grounded on
//! `alpm_db::desc::schema`'s plain serde-derived view structs rather than
//! deriving `Serialize` on [`crate::model::Package`] itself, since the tree
//! carries runtime-only fields (delta logs, the anon counter, the backend
//! kind) that have no business in exported JSON.

use serde::Serialize;

use crate::model::{Package, Section, Value};

/// The JSON view of a [`Value`]: a bare string for a scalar, an array of
/// strings for a list.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ValueView {
    /// A scalar option's value.
    Scalar(String),
    /// A list option's items, in order.
    List(Vec<String>),
}

impl From<&Value> for ValueView {
    fn from(value: &Value) -> Self {
        match value {
            Value::Scalar(s) => ValueView::Scalar(s.clone()),
            Value::List(items) => ValueView::List(items.clone()),
        }
    }
}

/// The JSON view of an [`crate::model::Option_`].
#[derive(Clone, Debug, Serialize)]
pub struct OptionView {
    /// The option's name.
    pub name: String,
    /// The option's value.
    pub value: ValueView,
}

/// The JSON view of a [`Section`].
#[derive(Clone, Debug, Serialize)]
pub struct SectionView {
    /// The section's (possibly generated) name.
    pub name: String,
    /// The section's type.
    #[serde(rename = "type")]
    pub r#type: String,
    /// Whether `name` was generated rather than user-supplied.
    pub anonymous: bool,
    /// This section's options, in file/append order.
    pub options: Vec<OptionView>,
}

impl From<&Section> for SectionView {
    fn from(section: &Section) -> Self {
        Self {
            name: section.name.clone(),
            r#type: section.r#type.clone(),
            anonymous: section.anonymous,
            options: section
                .options
                .iter()
                .map(|o| OptionView {
                    name: o.name.clone(),
                    value: ValueView::from(&o.value),
                })
                .collect(),
        }
    }
}

/// The JSON view of a [`Package`].
#[derive(Clone, Debug, Serialize)]
pub struct PackageView {
    /// The package's name.
    pub name: String,
    /// This package's sections, in file/append order.
    pub sections: Vec<SectionView>,
}

impl From<&Package> for PackageView {
    fn from(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            sections: package.sections.iter().map(SectionView::from).collect(),
        }
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use crate::model::Option_;

    #[test]
    fn scalar_serializes_as_bare_string() {
        let mut pkg = Package::new("network");
        let idx = pkg.alloc_section("interface", Some("lan")).unwrap();
        pkg.sections[idx].options.push(Option_::scalar("proto", "static"));
        let view = PackageView::from(&pkg);
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(
            json,
            r#"{"name":"network","sections":[{"name":"lan","type":"interface","anonymous":false,"options":[{"name":"proto","value":"static"}]}]}"#
        );
    }

    #[test]
    fn list_serializes_as_array() {
        let mut pkg = Package::new("network");
        let idx = pkg.alloc_section("interface", Some("lan")).unwrap();
        pkg.sections[idx].append_list_item("dns", "1.1.1.1").unwrap();
        pkg.sections[idx].append_list_item("dns", "8.8.8.8").unwrap();
        let view = PackageView::from(&pkg);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains(r#""value":["1.1.1.1","8.8.8.8"]"#));
    }
}
