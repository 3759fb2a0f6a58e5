//! Config-file parsing (§4.6 "Import grammar").
//!
//! Drives the [`crate::tokenizer`] output through the `package`/`config`/
//! `option`/`list` directive grammar. Grounded on the teacher's
//! `sections()`/`section()` top-level parsers: a `repeat_till`-shaped loop
//! over directives, with a `cut_err`-equivalent abort in strict mode and a
//! per-line recovery boundary in lenient mode.

use crate::{
    error::{Error, ParseDiagnostic},
    model::Package,
    tokenizer::{tokenize, LogicalLine, TokenStream},
};

/// The result of a (possibly lenient) import.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Packages produced by `package` directives (empty when merging into
    /// an existing package — see [`import_into`]).
    pub packages: Vec<Package>,
    /// Per-line parse failures recorded in lenient mode. Always empty when
    /// `strict` is `true`, since the first failure aborts the import.
    pub diagnostics: Vec<ParseDiagnostic>,
}

enum Target<'a> {
    /// Accumulating into a caller-supplied package; `package` directives
    /// are ignored (§4.6: "If a single-file merge is in progress... the
    /// keyword is ignored").
    Merge(&'a mut Package),
    /// Accumulating zero or more freestanding packages named by `package`
    /// directives.
    Multi {
        finished: Vec<Package>,
        current: Option<Package>,
    },
}

impl<'a> Target<'a> {
    fn current_mut(&mut self) -> Option<&mut Package> {
        match self {
            Target::Merge(pkg) => Some(pkg),
            Target::Multi { current, .. } => current.as_mut(),
        }
    }

    fn start_package(&mut self, name: &str) -> Result<(), Error> {
        match self {
            Target::Merge(_) => Ok(()),
            Target::Multi { finished, current } => {
                if let Some(prev) = current.take() {
                    if finished.iter().any(|p| p.name == name) || prev.name == name {
                        return Err(Error::Duplicate {
                            kind: "package",
                            name: name.to_string(),
                        });
                    }
                    finished.push(prev);
                }
                if finished.iter().any(|p| p.name == name) {
                    return Err(Error::Duplicate {
                        kind: "package",
                        name: name.to_string(),
                    });
                }
                *current = Some(Package::new(name));
                Ok(())
            }
        }
    }

    fn finish(mut self) -> Vec<Package> {
        match &mut self {
            Target::Merge(_) => Vec::new(),
            Target::Multi { finished, current } => {
                if let Some(pkg) = current.take() {
                    finished.push(pkg);
                }
                std::mem::take(finished)
            }
        }
    }

    /// Drops the section currently under construction, if any (§4.6 "the
    /// first section's parse fails... section `a` is discarded" — used
    /// only when a tokenizer-level failure leaves a section's content
    /// corrupted, never for an ordinary directive-level error).
    fn discard_current_section(&mut self) {
        if let Some(pkg) = self.current_mut() {
            pkg.sections.pop();
        }
    }
}

/// Parses `text` into an existing package, applying `package` directives as
/// no-ops (the "single-file merge" case, used to load one canonical config
/// file).
pub fn import_into(package: &mut Package, text: &str, strict: bool) -> Result<Vec<ParseDiagnostic>, Error> {
    let outcome = run_import(Target::Merge(package), text, strict, None)?;
    Ok(outcome.diagnostics)
}

/// Parses `text` into zero or more freestanding packages, one per `package`
/// directive (or one implicitly named `default_package`, if the first
/// `config` directive appears before any `package` line).
pub fn import_multi(
    text: &str,
    strict: bool,
    default_package: Option<&str>,
) -> Result<ImportOutcome, Error> {
    run_import(
        Target::Multi {
            finished: Vec::new(),
            current: default_package.map(Package::new),
        },
        text,
        strict,
        default_package,
    )
}

fn run_import(
    mut target: Target<'_>,
    text: &str,
    strict: bool,
    default_package: Option<&str>,
) -> Result<ImportOutcome, Error> {
    let diagnostics = if strict {
        let lines = tokenize(text)?;
        for line in &lines {
            if line.args.is_empty() {
                continue;
            }
            apply_directive(&mut target, line, default_package)?;
        }
        Vec::new()
    } else {
        run_import_lenient(&mut target, text, default_package)
    };

    if let Some(pkg) = target.current_mut() {
        finish_trailing_section(pkg);
    }

    Ok(ImportOutcome {
        packages: target.finish(),
        diagnostics,
    })
}

/// Drives a [`TokenStream`] directly (rather than tokenizing up front), so
/// a tokenizer-level failure can be attributed to, and recovered from,
/// exactly where it happened — one diagnostic per bad logical line, then
/// resume at the next physical line (§4.6 "Error recovery").
fn run_import_lenient(
    target: &mut Target<'_>,
    text: &str,
    default_package: Option<&str>,
) -> Vec<ParseDiagnostic> {
    let mut stream = TokenStream::new(text);
    let mut diagnostics = Vec::new();

    loop {
        match stream.next_line() {
            Ok(Some(line)) => {
                if line.args.is_empty() {
                    continue;
                }
                if let Err(err) = apply_directive(target, &line, default_package) {
                    diagnostics.push(ParseDiagnostic {
                        line: line.line,
                        byte: 0,
                        reason: err.to_string(),
                    });
                }
            }
            Ok(None) => break,
            Err(err) => {
                diagnostics.push(tokenizer_diagnostic(err));
                target.discard_current_section();
                if !stream.recover() {
                    break;
                }
            }
        }
    }

    diagnostics
}

fn tokenizer_diagnostic(err: Error) -> ParseDiagnostic {
    match err {
        Error::Parse { diagnostic } => diagnostic,
        Error::LineTooLong { line, limit } => ParseDiagnostic {
            line,
            byte: 0,
            reason: format!("line too long (exceeds {limit} bytes)"),
        },
        other => ParseDiagnostic {
            line: 0,
            byte: 0,
            reason: other.to_string(),
        },
    }
}

fn finish_trailing_section(package: &mut Package) {
    if !package.sections.is_empty() {
        let index = package.sections.len() - 1;
        package.fixup_section_at(index);
    }
}

fn apply_directive(target: &mut Target<'_>, line: &LogicalLine, default_package: Option<&str>) -> Result<(), Error> {
    let keyword = line.args[0].as_str();
    match keyword {
        "package" => {
            let name = line
                .args
                .get(1)
                .ok_or_else(|| directive_error(line, "package directive requires a name"))?;
            target.start_package(name)
        }
        "config" => {
            let r#type = line
                .args
                .get(1)
                .ok_or_else(|| directive_error(line, "config directive requires a type"))?;
            let name = line.args.get(2).map(|s| s.as_str());

            if target.current_mut().is_none() {
                if let Target::Multi { current, .. } = target {
                    match default_package {
                        Some(default_name) => *current = Some(Package::new(default_name)),
                        None => return Err(directive_error(line, "config directive before any package")),
                    }
                }
            }

            let package = target
                .current_mut()
                .ok_or_else(|| directive_error(line, "config directive before any package"))?;
            finish_trailing_section(package);
            package.alloc_section(r#type, name)?;
            Ok(())
        }
        "option" => {
            let name = line
                .args
                .get(1)
                .ok_or_else(|| directive_error(line, "option directive requires a name"))?;
            let value = line
                .args
                .get(2)
                .ok_or_else(|| directive_error(line, "option directive requires a value"))?;
            let package = target
                .current_mut()
                .ok_or_else(|| directive_error(line, "option directive before any package"))?;
            let section = last_section_mut(package).ok_or(Error::NoCurrentSection)?;
            section.alloc_option_scalar(name, value)
        }
        "list" => {
            let name = line
                .args
                .get(1)
                .ok_or_else(|| directive_error(line, "list directive requires a name"))?;
            let value = line
                .args
                .get(2)
                .ok_or_else(|| directive_error(line, "list directive requires a value"))?;
            let package = target
                .current_mut()
                .ok_or_else(|| directive_error(line, "list directive before any package"))?;
            let section = last_section_mut(package).ok_or(Error::NoCurrentSection)?;
            section.append_list_item(name, value)
        }
        other => Err(directive_error(line, &format!("unknown directive '{other}'"))),
    }
}

fn last_section_mut(package: &mut Package) -> Option<&mut crate::model::Section> {
    package.sections.last_mut()
}

fn directive_error(line: &LogicalLine, reason: &str) -> Error {
    Error::Parse {
        diagnostic: ParseDiagnostic {
            line: line.line,
            byte: 0,
            reason: reason.to_string(),
        },
    }
}
