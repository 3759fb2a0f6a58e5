//! Pointer parsing and resolution (§4.4).
//!
//! A pointer names a package, a section within it, or an option within a
//! section, in one of three forms: `pkg`, `pkg.section[.option]`, or the
//! extended form `pkg.@type[idx][.option]`. Resolution walks a [`Package`]'s
//! tree fresh on every call rather than caching references, the way the
//! teacher's `Database::entry`/`entry_by_name` re-scan the filesystem rather
//! than hold a cached handle.

use winnow::{
    ascii::digit1,
    combinator::{cut_err, opt, preceded, terminated},
    token::take_while,
    ModalResult, Parser,
};

use crate::{
    error::Error,
    model::{Option_, Package, Section},
    name::is_name_safe,
};

/// A parsed, but not yet resolved, pointer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pointer {
    /// The package name.
    pub package: String,
    /// The section component, if any.
    pub section: Option<SectionRef>,
    /// The option name, if any (only meaningful with `section.is_some()`).
    pub option: Option<String>,
    /// The value carried by an `=value` suffix, if the caller stripped one.
    pub value: Option<String>,
}

/// How a pointer names a section: directly, or via the extended
/// type-and-index form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SectionRef {
    /// A plain, name-safe section name.
    Named(String),
    /// `@type[idx]`: the `idx`-th section of `type` (or of any type if
    /// `type` is empty), 0-based, negative counts from the end.
    Indexed { r#type: String, index: i64 },
}

/// The outcome of resolving a [`Pointer`] against a [`Package`].
///
/// Fields are populated only as deep as resolution succeeded, which is
/// exactly what mutation flows like `set` need: a populated `section_index`
/// with `option` absent means "section exists, option does not yet."
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolved {
    /// Index of the resolved section within `package.sections`, if found.
    pub section_index: Option<usize>,
    /// The resolved section's name (its current name, post-`fixup_section`).
    pub section_name: Option<String>,
    /// Whether the option component was found within the resolved section.
    pub option_found: bool,
}

/// Splits `input` on an optional trailing `=value`, returning
/// `(pointer_text, value)`.
pub fn split_value(input: &str) -> (&str, Option<&str>) {
    match input.split_once('=') {
        Some((pointer, value)) => (pointer, Some(value)),
        None => (input, None),
    }
}

/// Parses a pointer string into its components (§4.4, steps 1-2 and 6).
pub fn parse_pointer(input: &str) -> Result<Pointer, Error> {
    let (head, value) = split_value(input);
    if head.matches('.').count() >= 3 {
        return Err(invalid_pointer(input, "too many components"));
    }
    let mut parts = head.splitn(3, '.');
    let package = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_pointer(input, "empty pointer"))?;
    if !is_name_safe(package) {
        return Err(invalid_pointer(input, "package name is not name-safe"));
    }

    let section_text = parts.next();
    let option_text = parts.next();

    let section = match section_text {
        None => None,
        Some(text) if is_name_safe(text) => Some(SectionRef::Named(text.to_string())),
        Some(text) => Some(parse_extended_section_ref(input, text)?),
    };

    Ok(Pointer {
        package: package.to_string(),
        section,
        option: option_text.map(|s| s.to_string()),
        value: value.map(|s| s.to_string()),
    })
}

fn invalid_pointer(pointer: &str, reason: &str) -> Error {
    Error::InvalidPointer {
        pointer: pointer.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses the extended `@type[idx]` section reference (§4.4 step 6).
fn parse_extended_section_ref(pointer: &str, text: &str) -> Result<SectionRef, Error> {
    extended_section_ref
        .parse(text)
        .map_err(|_| invalid_pointer(pointer, "malformed extended section reference"))
}

fn extended_section_ref(input: &mut &str) -> ModalResult<SectionRef> {
    let _ = '@'.parse_next(input)?;
    let r#type = take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    let index = cut_err(preceded('[', terminated(signed_index, ']'))).parse_next(input)?;
    Ok(SectionRef::Indexed {
        r#type: r#type.to_string(),
        index,
    })
}

fn signed_index(input: &mut &str) -> ModalResult<i64> {
    let sign = opt('-').parse_next(input)?;
    let digits = digit1.parse_next(input)?;
    let magnitude: i64 = digits.parse().map_err(|_| {
        winnow::error::ErrMode::Cut(winnow::error::ContextError::new())
    })?;
    Ok(if sign.is_some() { -magnitude } else { magnitude })
}

/// Resolves a parsed [`Pointer`] against `package` (§4.4 steps 3-7).
///
/// Step 3 (context lookup / auto-load) and step 4 (package-only reference)
/// are the caller's responsibility: this function always assumes the
/// package itself has already been found.
pub fn resolve(package: &Package, pointer: &Pointer) -> Resolved {
    let section_match = match &pointer.section {
        None => None,
        Some(SectionRef::Named(name)) => package
            .sections
            .iter()
            .position(|s| &s.name == name)
            .map(|index| (index, package.sections[index].name.clone())),
        Some(SectionRef::Indexed { r#type, index }) => {
            resolve_indexed(package, r#type, *index)
        }
    };

    let option_found = match (&section_match, &pointer.option) {
        (Some((index, _)), Some(option_name)) => {
            package.sections[*index].option(option_name).is_some()
        }
        _ => false,
    };

    Resolved {
        section_index: section_match.as_ref().map(|(i, _)| *i),
        section_name: section_match.map(|(_, name)| name),
        option_found,
    }
}

fn resolve_indexed(package: &Package, r#type: &str, index: i64) -> Option<(usize, String)> {
    let matches: Vec<usize> = package
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| r#type.is_empty() || s.r#type == r#type)
        .map(|(i, _)| i)
        .collect();

    let count = matches.len() as i64;
    let effective = if index < 0 { count + index } else { index };
    if effective < 0 || effective >= count {
        return None;
    }
    let position = matches[effective as usize];
    Some((position, package.sections[position].name.clone()))
}

/// Looks up the option named by a fully resolved pointer, if any.
pub fn resolved_option<'a>(package: &'a Package, resolved: &Resolved, pointer: &Pointer) -> Option<&'a Option_> {
    let index = resolved.section_index?;
    let name = pointer.option.as_deref()?;
    package.sections[index].option(name)
}

/// Looks up the section named by a fully resolved pointer, if any.
pub fn resolved_section<'a>(package: &'a Package, resolved: &Resolved) -> Option<&'a Section> {
    package.sections.get(resolved.section_index?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Option_;

    fn sample_package() -> Package {
        let mut pkg = Package::new("network");
        let i0 = pkg.alloc_section("interface", Some("lan")).unwrap();
        pkg.sections[i0].options.push(Option_::scalar("proto", "static"));
        let i1 = pkg.alloc_section("interface", None).unwrap();
        pkg.sections[i1].name = "cfg01abcd".to_string();
        pkg.alloc_section("route", None).unwrap();
        pkg
    }

    #[test]
    fn parses_plain_named_pointer() {
        let pointer = parse_pointer("network.lan.proto").unwrap();
        assert_eq!(pointer.package, "network");
        assert_eq!(pointer.section, Some(SectionRef::Named("lan".to_string())));
        assert_eq!(pointer.option.as_deref(), Some("proto"));
    }

    #[test]
    fn parses_extended_pointer_with_negative_index() {
        let pointer = parse_pointer("network.@interface[-1]").unwrap();
        assert_eq!(
            pointer.section,
            Some(SectionRef::Indexed {
                r#type: "interface".to_string(),
                index: -1
            })
        );
    }

    #[test]
    fn rejects_malformed_package_name() {
        let err = parse_pointer("bad-name.lan").unwrap_err();
        assert!(matches!(err, Error::InvalidPointer { .. }));
    }

    #[test]
    fn rejects_pointer_with_too_many_components() {
        let err = parse_pointer("network.lan.proto.extra").unwrap_err();
        assert!(matches!(err, Error::InvalidPointer { .. }));
    }

    #[test]
    fn resolves_named_section_and_option() {
        let pkg = sample_package();
        let pointer = parse_pointer("network.lan.proto").unwrap();
        let resolved = resolve(&pkg, &pointer);
        assert_eq!(resolved.section_name.as_deref(), Some("lan"));
        assert!(resolved.option_found);
    }

    #[test]
    fn resolves_negative_index_to_last_matching_type() {
        let pkg = sample_package();
        let pointer = parse_pointer("network.@interface[-1]").unwrap();
        let resolved = resolve(&pkg, &pointer);
        assert_eq!(resolved.section_name.as_deref(), Some("cfg01abcd"));
    }

    #[test]
    fn empty_type_matches_any_section() {
        let pkg = sample_package();
        let pointer = parse_pointer("network.@[2]").unwrap();
        let resolved = resolve(&pkg, &pointer);
        assert_eq!(resolved.section_name.as_deref(), Some("route"));
    }

    #[test]
    fn out_of_range_index_resolves_to_nothing() {
        let pkg = sample_package();
        let pointer = parse_pointer("network.@interface[5]").unwrap();
        let resolved = resolve(&pkg, &pointer);
        assert!(resolved.section_index.is_none());
    }
}
