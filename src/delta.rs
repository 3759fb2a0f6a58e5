//! Delta engine: per-package save-file format and replay (§4.5).
//!
//! Grounded on the teacher's `Database` (`db/database.rs`) for the
//! "acquire lock, read and check, mutate, release on every exit path"
//! shape of `save`/`commit`, generalized from its sentinel `DatabaseLock`
//! file to true advisory locks via `fs4`.

use crate::{
    error::Error,
    exporter::escape_value,
    model::{DeltaCommand, DeltaEntry, Package},
    resolver::{parse_pointer, resolve, SectionRef},
    tokenizer::tokenize,
};

/// Formats one delta entry as a save-file line (without trailing newline).
pub fn format_delta_line(package_name: &str, entry: &DeltaEntry) -> String {
    let prefix = match entry.command {
        DeltaCommand::Change => "",
        DeltaCommand::Remove => "-",
        DeltaCommand::Rename => "@",
        DeltaCommand::ListAdd => "|",
        DeltaCommand::Add => "+",
    };
    let mut line = format!("{prefix}{package_name}.{}", entry.section);
    if let Some(option) = &entry.option {
        line.push('.');
        line.push_str(option);
    }
    if let Some(value) = &entry.value {
        line.push('=');
        line.push_str(&escape_value(value));
    }
    line
}

/// Parses one save-file line into a [`DeltaEntry`]. Returns `None` for a
/// malformed line (§4.5: "Malformed lines are skipped").
pub fn parse_delta_line(line: &str) -> Option<DeltaEntry> {
    let (prefix, rest) = split_prefix(line);
    let tokenized = tokenize(rest).ok()?;
    let single = tokenized.into_iter().find(|l| !l.args.is_empty())?;
    if single.args.len() != 1 {
        return None;
    }
    let pointer = parse_pointer(&single.args[0]).ok()?;
    let section = match pointer.section? {
        SectionRef::Named(name) => name,
        SectionRef::Indexed { .. } => return None,
    };
    Some(DeltaEntry {
        command: prefix,
        section,
        option: pointer.option,
        value: pointer.value,
    })
}

fn split_prefix(line: &str) -> (DeltaCommand, &str) {
    match line.as_bytes().first() {
        Some(b'-') => (DeltaCommand::Remove, &line[1..]),
        Some(b'@') => (DeltaCommand::Rename, &line[1..]),
        Some(b'|') => (DeltaCommand::ListAdd, &line[1..]),
        Some(b'+') => (DeltaCommand::Add, &line[1..]),
        _ => (DeltaCommand::Change, line),
    }
}

/// Serializes `entries` into save-file text, one line per entry.
pub fn render_delta_log(package_name: &str, entries: &[DeltaEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format_delta_line(package_name, entry));
        out.push('\n');
    }
    out
}

/// Parses save-file text into [`DeltaEntry`] values, dropping malformed
/// lines (§4.5 "Replay at load").
pub fn parse_delta_log(text: &str) -> Vec<DeltaEntry> {
    text.lines().filter_map(parse_delta_line).collect()
}

/// Replays one delta entry against `package` using the mutating tree APIs,
/// the same way the original mutation that produced it would have (§4.5).
///
/// Replay never fails loudly: an entry that no longer applies (e.g. a
/// `Change` against a section removed by a later `Remove`) is silently
/// skipped, matching "best-effort preservation."
pub fn replay_entry(package: &mut Package, entry: &DeltaEntry) {
    match entry.command {
        DeltaCommand::Change => match &entry.option {
            Some(option_name) => {
                if let (Some(section), Some(value)) =
                    (package.section_mut(&entry.section), &entry.value)
                {
                    match section.option_mut(option_name) {
                        Some(existing) => existing.value = crate::model::Value::Scalar(value.clone()),
                        None => {
                            let _ = section.alloc_option_scalar(option_name, value);
                        }
                    }
                }
            }
            None => {
                if let (Some(section), Some(value)) =
                    (package.section_mut(&entry.section), &entry.value)
                {
                    section.r#type = value.clone();
                }
            }
        },
        DeltaCommand::Add => {
            if let Some(r#type) = &entry.value {
                let _ = package.alloc_section(r#type, Some(&entry.section));
            }
        }
        DeltaCommand::Remove => match &entry.option {
            Some(option_name) => {
                if let Some(section) = package.section_mut(&entry.section) {
                    section.free_option(option_name);
                }
            }
            None => {
                package.free_section(&entry.section);
            }
        },
        DeltaCommand::Rename => {
            if let Some(new_name) = &entry.value {
                match &entry.option {
                    Some(option_name) => {
                        if let Some(section) = package.section_mut(&entry.section) {
                            if let Some(option) = section.option_mut(option_name) {
                                option.name = new_name.clone();
                            }
                        }
                    }
                    None => {
                        if let Some(section) = package.section_mut(&entry.section) {
                            section.name = new_name.clone();
                            section.anonymous = false;
                        }
                    }
                }
            }
        }
        DeltaCommand::ListAdd => {
            if let (Some(option_name), Some(value)) = (&entry.option, &entry.value) {
                if let Some(section) = package.section_mut(&entry.section) {
                    let _ = section.append_list_item(option_name, value);
                }
            }
        }
    }
}

/// Replays an entire delta log, in order, against `package`.
pub fn replay(package: &mut Package, entries: &[DeltaEntry]) {
    for entry in entries {
        replay_entry(package, entry);
    }
}

/// Records a `Change` delta for a scalar set, unless `new_value` already
/// equals `previous` (Open Question resolution: suppress no-op changes so
/// `uci changes` stays quiet on idempotent `set`).
///
/// Takes the pre-mutation value explicitly rather than reading it off
/// `package`, since by the time a delta is recorded the tree has usually
/// already been updated to `new_value`.
pub fn record_scalar_change(
    package: &mut Package,
    section: &str,
    option: &str,
    previous: Option<&str>,
    new_value: &str,
) {
    if previous == Some(new_value) {
        return;
    }
    package.pending_deltas.push(DeltaEntry {
        command: DeltaCommand::Change,
        section: section.to_string(),
        option: Some(option.to_string()),
        value: Some(new_value.to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_change_line() {
        let entry = DeltaEntry {
            command: DeltaCommand::Change,
            section: "lan".into(),
            option: Some("proto".into()),
            value: Some("static".into()),
        };
        let line = format_delta_line("network", &entry);
        assert_eq!(line, "network.lan.proto=static");
        let parsed = parse_delta_line(&line).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn formats_remove_with_prefix() {
        let entry = DeltaEntry {
            command: DeltaCommand::Remove,
            section: "lan".into(),
            option: None,
            value: None,
        };
        assert_eq!(format_delta_line("network", &entry), "-network.lan");
    }

    #[test]
    fn malformed_line_is_skipped() {
        assert!(parse_delta_line("@#$not a pointer").is_none());
    }

    #[test]
    fn replay_reapplies_change_and_remove_in_order() {
        let mut pkg = Package::new("network");
        pkg.alloc_section("interface", Some("lan")).unwrap();
        let entries = vec![
            DeltaEntry {
                command: DeltaCommand::Change,
                section: "lan".into(),
                option: Some("proto".into()),
                value: Some("static".into()),
            },
            DeltaEntry {
                command: DeltaCommand::Remove,
                section: "lan".into(),
                option: Some("proto".into()),
                value: None,
            },
        ];
        replay(&mut pkg, &entries);
        assert!(pkg.section("lan").unwrap().option("proto").is_none());
    }

    #[test]
    fn replay_updates_existing_section_type_in_place() {
        // A `set("pkg.section=newtype")` against an already-existing section
        // records a `Change` delta with `option: None`; replaying it must
        // update that section's type rather than try to allocate a second
        // section under the same name.
        let mut pkg = Package::new("network");
        pkg.alloc_section("interface", Some("lan")).unwrap();
        let entry = DeltaEntry {
            command: DeltaCommand::Change,
            section: "lan".into(),
            option: None,
            value: Some("alias".into()),
        };
        replay_entry(&mut pkg, &entry);
        assert_eq!(pkg.sections.len(), 1);
        assert_eq!(pkg.section("lan").unwrap().r#type, "alias");
    }

    #[test]
    fn record_scalar_change_suppresses_noop() {
        let mut pkg = Package::new("network");
        let idx = pkg.alloc_section("interface", Some("lan")).unwrap();
        pkg.sections[idx]
            .alloc_option_scalar("proto", "static")
            .unwrap();
        record_scalar_change(&mut pkg, "lan", "proto", Some("static"), "static");
        assert!(pkg.pending_deltas.is_empty());
        record_scalar_change(&mut pkg, "lan", "proto", Some("static"), "dhcp");
        assert_eq!(pkg.pending_deltas.len(), 1);
    }

    #[test]
    fn render_and_reparse_log_round_trips() {
        let entries = vec![DeltaEntry {
            command: DeltaCommand::ListAdd,
            section: "lan".into(),
            option: Some("dns".into()),
            value: Some("1.1.1.1".into()),
        }];
        let rendered = render_delta_log("network", &entries);
        let parsed = parse_delta_log(&rendered);
        assert_eq!(parsed, entries);
    }
}
