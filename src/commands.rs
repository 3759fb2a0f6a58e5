//! Subcommand bodies for the `uci` executable (§6).
//!
//! Grounded on the teacher's `desc::commands` split: one plain function per
//! subcommand, each taking already-parsed [`crate::cli`] arguments and
//! returning `Result<(), Error>`, with all printing done here rather than in
//! `main`.

use std::io::{stdin, IsTerminal, Read as _};

use crate::{
    cli::{Cli, OutputFormat},
    delta::format_delta_line,
    error::Error,
    exporter::escape_value,
    importer::{import_into, import_multi},
    json::PackageView,
    model::{DeltaEntry, Package, Section, Value},
    resolver::{parse_pointer, resolve, split_value},
    Context, GetResult,
};

/// Builds a [`Context`] from the CLI's global flags (§6).
///
/// `-P` both overrides the save directory and disables real commits, which
/// is reflected here by clearing [`crate::Flags::saved_history`]: the
/// `commit` subcommand reads that flag back to decide whether to flush to
/// the save file only, or to also write the canonical config.
pub fn build_context(cli: &Cli) -> Context {
    let mut ctx = Context::new();
    if let Some(confdir) = &cli.confdir {
        ctx.set_confdir(confdir);
    }
    if let Some(savedir) = &cli.savedir {
        ctx.set_savedir(savedir);
        ctx.flags.saved_history = false;
    }
    ctx.search_paths = cli.search_path.clone();
    ctx.flags.strict = !cli.lenient;
    ctx.flags.export_name = cli.export_name && !cli.no_export_name;
    ctx.flags.perror = !cli.quiet;
    ctx
}

fn all_loaded_names(ctx: &mut Context) -> Result<Vec<String>, Error> {
    for name in ctx.list_configs()? {
        ctx.ensure_loaded(&name)?;
    }
    Ok(ctx.packages().iter().map(|p| p.name.clone()).collect())
}

fn print_diagnostics(ctx: &Context, diagnostics: &[crate::error::ParseDiagnostic]) {
    if !ctx.flags.perror {
        return;
    }
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}

fn read_input(file: Option<&std::path::Path>) -> Result<String, Error> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "reading import input".to_string(),
            source,
        }),
        None => {
            if stdin().is_terminal() {
                return Err(Error::NoInput);
            }
            let mut buf = String::new();
            stdin().read_to_string(&mut buf).map_err(|source| Error::Io {
                context: "reading import input from stdin".to_string(),
                source,
            })?;
            Ok(buf)
        }
    }
}

/// `uci show [pointer] [-o json|uci]` (§6; `-o` is an EXPANDED addition):
/// dumps the whole tree, one package, a section, or a single option, either
/// in `pkg.section.option='value'` pointer form or as JSON.
pub fn show(ctx: &mut Context, pointer: Option<String>, format: OutputFormat) -> Result<(), Error> {
    if format == OutputFormat::Json {
        return show_json(ctx, pointer);
    }
    match pointer {
        None => {
            for name in all_loaded_names(ctx)? {
                if let Some(package) = ctx.package(&name) {
                    print_package(package);
                }
            }
        }
        Some(pointer_str) => {
            let parsed = parse_pointer(&pointer_str)?;
            ctx.ensure_loaded(&parsed.package)?;
            let package = ctx.package(&parsed.package).expect("just ensured loaded");

            if parsed.section.is_none() {
                print_package(package);
                return Ok(());
            }

            let resolved = resolve(package, &parsed);
            let section_index = resolved.section_index.ok_or_else(|| Error::NotFound {
                pointer: pointer_str.clone(),
            })?;
            let section = &package.sections[section_index];

            match &parsed.option {
                None => print_section(&package.name, section),
                Some(option_name) => {
                    let option = section.option(option_name).ok_or_else(|| Error::NotFound {
                        pointer: pointer_str.clone(),
                    })?;
                    print_option(&package.name, &section.name, option_name, &option.value);
                }
            }
        }
    }
    Ok(())
}

fn show_json(ctx: &mut Context, pointer: Option<String>) -> Result<(), Error> {
    match pointer {
        None => {
            let mut views = Vec::new();
            for name in all_loaded_names(ctx)? {
                if let Some(package) = ctx.package(&name) {
                    views.push(PackageView::from(package));
                }
            }
            print_json(&views)
        }
        Some(pointer_str) => {
            let parsed = parse_pointer(&pointer_str)?;
            ctx.ensure_loaded(&parsed.package)?;
            let package = ctx.package(&parsed.package).expect("just ensured loaded");

            if parsed.section.is_none() {
                return print_json(&PackageView::from(package));
            }

            let resolved = resolve(package, &parsed);
            let section_index = resolved.section_index.ok_or_else(|| Error::NotFound {
                pointer: pointer_str.clone(),
            })?;
            let section = &package.sections[section_index];

            match &parsed.option {
                None => print_json(&crate::json::SectionView::from(section)),
                Some(option_name) => {
                    let option = section.option(option_name).ok_or_else(|| Error::NotFound {
                        pointer: pointer_str.clone(),
                    })?;
                    print_json(&crate::json::ValueView::from(&option.value))
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    let rendered = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        context: "rendering JSON output".to_string(),
        source,
    })?;
    println!("{rendered}");
    Ok(())
}

fn print_package(package: &Package) {
    for section in &package.sections {
        print_section(&package.name, section);
    }
}

fn print_section(package_name: &str, section: &Section) {
    println!("{package_name}.{}={}", section.name, section.r#type);
    for option in &section.options {
        print_option(package_name, &section.name, &option.name, &option.value);
    }
}

fn print_option(package_name: &str, section_name: &str, option_name: &str, value: &Value) {
    match value {
        Value::Scalar(s) => println!("{package_name}.{section_name}.{option_name}='{}'", escape_value(s)),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(|i| format!("'{}'", escape_value(i))).collect();
            println!("{package_name}.{section_name}.{option_name}={}", rendered.join(" "));
        }
    }
}

/// `uci export [package] [-o json|uci]` (§6; `-o` is an EXPANDED addition):
/// prints one or all packages, either in canonical config-file form or as
/// JSON.
pub fn export(ctx: &mut Context, package: Option<String>, format: OutputFormat) -> Result<(), Error> {
    let names = match package {
        Some(name) => vec![name],
        None => all_loaded_names(ctx)?,
    };
    for name in &names {
        ctx.ensure_loaded(name)?;
    }
    match format {
        OutputFormat::Uci => {
            for name in &names {
                print!("{}", ctx.export(name)?);
            }
        }
        OutputFormat::Json => {
            let views: Vec<PackageView> = names
                .iter()
                .filter_map(|name| ctx.package(name).map(PackageView::from))
                .collect();
            print_json(&views)?;
        }
    }
    Ok(())
}

/// `uci import [package]` (§6): reads config text from stdin or `-f` and
/// folds it into the context, either merging into an already-loaded
/// package (`-m`) or adopting each `package`-directive-named package
/// freestanding.
pub fn import(ctx: &mut Context, cli: &Cli, package: Option<String>) -> Result<(), Error> {
    let text = read_input(cli.file.as_deref())?;
    let strict = ctx.flags.strict;

    if cli.merge {
        let name = package.ok_or_else(|| Error::InvalidPointer {
            pointer: String::new(),
            reason: "-m requires a package name".to_string(),
        })?;
        ctx.ensure_loaded(&name)?;
        let mut pkg = ctx.package(&name).cloned().expect("just ensured loaded");
        let diagnostics = import_into(&mut pkg, &text, strict)?;
        ctx.adopt_package(pkg);
        print_diagnostics(ctx, &diagnostics);
    } else {
        let outcome = import_multi(&text, strict, package.as_deref())?;
        for pkg in outcome.packages {
            ctx.adopt_package(pkg);
        }
        print_diagnostics(ctx, &outcome.diagnostics);
    }
    Ok(())
}

/// `uci changes [package]` (§6): lists a package's saved-but-uncommitted
/// and still-pending deltas, one per line, in save-file notation.
pub fn changes(ctx: &mut Context, package: Option<String>) -> Result<(), Error> {
    match package {
        Some(name) => {
            ctx.ensure_loaded(&name)?;
            print_changes(&name, &ctx.changes(&name));
        }
        None => {
            for name in all_loaded_names(ctx)? {
                let deltas = ctx.changes(&name);
                if !deltas.is_empty() {
                    print_changes(&name, &deltas);
                }
            }
        }
    }
    Ok(())
}

fn print_changes(package_name: &str, deltas: &[DeltaEntry]) {
    for entry in deltas {
        println!("{}", format_delta_line(package_name, entry));
    }
}

/// `uci commit [package]` (§6): commits one or all loaded packages. Under
/// `-P`, real commits are disabled, so this only flushes to the save file
/// (mirroring the library's own `-P` semantics, §4.5).
pub fn commit(ctx: &mut Context, package: Option<String>) -> Result<(), Error> {
    let disable_real_commit = !ctx.flags.saved_history;
    let names = match package {
        Some(name) => vec![name],
        None => ctx.packages().iter().map(|p| p.name.clone()).collect(),
    };
    for name in names {
        ctx.ensure_loaded(&name)?;
        if disable_real_commit {
            ctx.save(&name)?;
        } else {
            ctx.commit(&name, false)?;
        }
    }
    Ok(())
}

/// `uci revert <pointer>` (§6).
pub fn revert(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    ctx.revert(pointer)
}

/// `uci get <pointer>` (§6): prints the resolved value, one line per list
/// item for list options.
pub fn get(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    match ctx.get(pointer)? {
        GetResult::Package => {}
        GetResult::Section { r#type, .. } => println!("{type}"),
        GetResult::Option(Value::Scalar(s)) => println!("{s}"),
        GetResult::Option(Value::List(items)) => {
            for item in items {
                println!("{item}");
            }
        }
    }
    Ok(())
}

/// Flushes `package`'s pending deltas to its save file right after a
/// mutation, since every CLI invocation is its own process: unlike the
/// library, where a caller may batch several mutations before one `save`,
/// a one-shot `uci set`/`del`/… has no later opportunity to do so (§4.5
/// "Save (flush pending)").
fn save_after_mutation(ctx: &mut Context, package: &str) -> Result<(), Error> {
    ctx.save(package)
}

/// `uci set <pointer>=value` (§6).
pub fn set(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    let parsed = parse_pointer(pointer)?;
    ctx.set(pointer)?;
    save_after_mutation(ctx, &parsed.package)
}

/// `uci del <pointer>` (§6).
pub fn del(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    let parsed = parse_pointer(pointer)?;
    ctx.del(pointer)?;
    save_after_mutation(ctx, &parsed.package)
}

/// `uci rename <pointer>=new_name` (§6).
pub fn rename(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    let (target, new_name) = split_value(pointer);
    let new_name = new_name.ok_or_else(|| Error::InvalidPointer {
        pointer: pointer.to_string(),
        reason: "rename requires a '=new_name' suffix".to_string(),
    })?;
    let parsed = parse_pointer(target)?;
    ctx.rename(target, new_name)?;
    save_after_mutation(ctx, &parsed.package)
}

/// `uci add_list <pointer>=value` (§2, §6 EXPANDED): appends to a list
/// option, the CLI-facing counterpart of [`Context::add_list`].
pub fn add_list(ctx: &mut Context, pointer: &str) -> Result<(), Error> {
    let parsed = parse_pointer(pointer)?;
    ctx.add_list(pointer)?;
    save_after_mutation(ctx, &parsed.package)
}

/// `uci add <package> <type>` (§6): creates a new anonymous section,
/// printing its generated name.
pub fn add(ctx: &mut Context, package: &str, r#type: &str) -> Result<(), Error> {
    let name = ctx.add(package, r#type)?;
    save_after_mutation(ctx, package)?;
    println!("{name}");
    Ok(())
}

/// `uci batch` (§6): runs pointer-style commands read one per line from
/// stdin, reusing [`crate::tokenizer`] for the same quoting/escaping rules
/// as config files.
pub fn batch(ctx: &mut Context) -> Result<(), Error> {
    let mut input = String::new();
    stdin().read_to_string(&mut input).map_err(|source| Error::Io {
        context: "reading batch input from stdin".to_string(),
        source,
    })?;

    for line in crate::tokenizer::tokenize(&input)? {
        if line.args.is_empty() {
            continue;
        }
        let keyword = line.args[0].as_str();
        let arg = line.args.get(1).map(String::as_str).unwrap_or_default();
        match keyword {
            "get" => get(ctx, arg)?,
            "set" => set(ctx, arg)?,
            "del" | "delete" => del(ctx, arg)?,
            "rename" => rename(ctx, arg)?,
            "add_list" | "list_add" => add_list(ctx, arg)?,
            "add" => {
                let r#type = line.args.get(2).map(String::as_str).unwrap_or_default();
                add(ctx, arg, r#type)?;
            }
            "revert" => revert(ctx, arg)?,
            "commit" => commit(ctx, Some(arg.to_string()))?,
            "show" => show(ctx, Some(arg.to_string()), OutputFormat::Uci)?,
            "export" => export(ctx, Some(arg.to_string()), OutputFormat::Uci)?,
            other => return Err(Error::UnknownCommand(other.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn cli_with_confdir(confdir: &std::path::Path, savedir: &std::path::Path) -> Cli {
        Cli {
            confdir: Some(confdir.to_path_buf()),
            search_path: Vec::new(),
            savedir: Some(savedir.to_path_buf()),
            merge: false,
            strict: false,
            lenient: false,
            export_name: false,
            no_export_name: false,
            quiet: false,
            file: None,
            command: crate::cli::Command::Batch,
        }
    }

    #[test]
    fn build_context_disables_real_commit_under_savedir_override() {
        let dir = tempdir().unwrap();
        let confdir = dir.path().join("config");
        fs::create_dir_all(&confdir).unwrap();
        let cli = cli_with_confdir(&confdir, &dir.path().join("save"));
        let ctx = build_context(&cli);
        assert!(!ctx.flags.saved_history);
        assert!(ctx.flags.strict);
    }

    #[test]
    fn get_and_set_roundtrip_through_the_command_layer() {
        let dir = tempdir().unwrap();
        let confdir = dir.path().join("config");
        fs::create_dir_all(&confdir).unwrap();
        fs::write(confdir.join("network"), "config interface 'lan'\n\toption proto 'static'\n").unwrap();
        let cli = cli_with_confdir(&confdir, &dir.path().join("save"));
        let mut ctx = build_context(&cli);

        set(&mut ctx, "network.lan.proto=dhcp").unwrap();
        let value = ctx.get("network.lan.proto").unwrap();
        assert_eq!(value, GetResult::Option(Value::Scalar("dhcp".to_string())));
    }
}
