//! Config-file serialization (§4.6 "Export").
//!
//! Grounded on the teacher's `Display`/`fmt` impls for its desc-file value
//! types: hand-written `write!` calls rather than a templating layer, one
//! directive per line.

use std::fmt::Write as _;

use crate::model::{Package, Value};

/// Escapes a value for emission inside a single-quoted token.
///
/// A literal `'` cannot appear inside a single-quoted string, so it is
/// closed, a backslash-escaped quote is emitted, and the string is
/// reopened: `'\''`.
pub fn escape_value(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Serializes one package to UCI config-file text.
///
/// `export_name` controls whether anonymous sections' generated names are
/// emitted as `config '<type>' '<name>'` (useful for `uci export`, where
/// downstream tools may want stable references) or left bare as
/// `config '<type>'` (the default, matching the canonical file format).
pub fn export_package(package: &Package, export_name: bool, include_package_line: bool) -> String {
    let mut out = String::new();
    if include_package_line {
        let _ = writeln!(out, "package '{}'", escape_value(&package.name));
        out.push('\n');
    }
    for section in &package.sections {
        let _ = write!(out, "config '{}'", escape_value(&section.r#type));
        if export_name || !section.anonymous {
            let _ = write!(out, " '{}'", escape_value(&section.name));
        }
        out.push('\n');
        for option in &section.options {
            match &option.value {
                Value::Scalar(value) => {
                    let _ = writeln!(
                        out,
                        "\toption '{}' '{}'",
                        escape_value(&option.name),
                        escape_value(value)
                    );
                }
                Value::List(items) => {
                    for item in items {
                        let _ = writeln!(
                            out,
                            "\tlist '{}' '{}'",
                            escape_value(&option.name),
                            escape_value(item)
                        );
                    }
                }
            }
        }
        out.push('\n');
    }
    out
}
