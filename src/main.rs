use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use il_patcher::config::{apply_patches, discover, load_from_path, ApplicationError, PatchResult};
use il_patcher::{Body, JsonProvider, Module, Patcher, Target, TypeWalker};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(name = "il-patcher")]
#[command(about = "Symbolic patching of managed bytecode method bodies", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch scripts to a module image
    Apply {
        /// Module image to patch
        #[arg(short, long)]
        module: PathBuf,

        /// Patch script or directory of scripts (defaults to <module dir>/patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Write the patched module here instead of replacing the original
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not keep the original as <module>.bak when saving in place
        #[arg(long)]
        no_backup: bool,

        /// Dry run - show what would be changed without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changed method bodies
        #[arg(short, long)]
        diff: bool,

        /// Keep each body's recorded max-stack instead of recomputing it
        #[arg(long)]
        keep_old_max_stack: bool,
    },

    /// Search a module and print matching targets as JSON
    #[command(group(ArgGroup::new("query").required(true).args(["operand", "opcode", "signature"])))]
    Find {
        /// Module image to search
        #[arg(short, long)]
        module: PathBuf,

        /// Operand values every match must contain
        #[arg(long, num_args = 1..)]
        operand: Vec<String>,

        /// Opcodes every match must contain
        #[arg(long, num_args = 1..)]
        opcode: Vec<String>,

        /// Contiguous opcode sequence
        #[arg(long, num_args = 1..)]
        signature: Vec<String>,
    },

    /// Print the instruction listing of one method
    Dump {
        /// Module image to read
        #[arg(short, long)]
        module: PathBuf,

        /// Method path, e.g. Ns.Class/Nested::Method
        #[arg(short, long)]
        target: String,
    },

    /// List available patches and their version constraints
    List {
        /// Patch script or directory of scripts
        #[arg(short, long, default_value = "patches")]
        patches: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            module,
            patches,
            output,
            no_backup,
            dry_run,
            diff,
            keep_old_max_stack,
        } => cmd_apply(ApplyArgs {
            module,
            patches,
            output,
            backup: !no_backup,
            dry_run,
            show_diff: diff,
            keep_old_max_stack,
        }),

        Commands::Find {
            module,
            operand,
            opcode,
            signature,
        } => cmd_find(&module, &operand, &opcode, &signature),

        Commands::Dump { module, target } => cmd_dump(&module, &target),

        Commands::List { patches } => cmd_list(&patches),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Helper: patch scripts from an explicit path, or `<module dir>/patches`.
fn patch_files(module: &Path, patches: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    let root = match patches {
        Some(path) => path,
        None => module
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .join("patches"),
    };
    if !root.exists() {
        anyhow::bail!("No patch scripts found: {} does not exist", root.display());
    }
    let files = discover(&root)?;
    if files.is_empty() {
        anyhow::bail!("No .toml patch scripts found in {}", root.display());
    }
    Ok(files)
}

/// Helper: Show unified diff between original and modified listing
fn display_diff(method: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", method).dimmed());
    println!("{}", format!("+++ {} (patched)", method).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Diff every method body that differs between two states of one module.
fn display_module_diff(before: &Module, after: &Module) {
    let empty = Body::default();
    for walked in TypeWalker::new(after) {
        let Some(old_type) = before.type_at(&walked.path) else {
            continue;
        };
        for (method, old_method) in walked.def.methods.iter().zip(&old_type.methods) {
            let new_body = method.body.as_ref().unwrap_or(&empty);
            let old_body = old_method.body.as_ref().unwrap_or(&empty);
            if new_body.instructions() != old_body.instructions() {
                let label = format!("{}::{}", walked.def.full_name(), method.signature());
                display_diff(&label, &old_body.listing(), &new_body.listing());
            }
        }
    }
}

struct ApplyArgs {
    module: PathBuf,
    patches: Option<PathBuf>,
    output: Option<PathBuf>,
    backup: bool,
    dry_run: bool,
    show_diff: bool,
    keep_old_max_stack: bool,
}

fn cmd_apply(args: ApplyArgs) -> Result<()> {
    // 1. Load the module
    let mut patcher = Patcher::open(&args.module, JsonProvider, args.keep_old_max_stack)
        .with_context(|| format!("failed to open {}", args.module.display()))?;
    let before = patcher.module().clone();

    // 2. Determine patch files to load
    let patch_files = patch_files(&args.module, args.patches)?;

    println!("Module: {}", args.module.display());
    println!(
        "Version: {}",
        patcher.module().version.as_deref().unwrap_or("(none)")
    );
    if args.dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }
    println!();

    // 3. Apply each script in order, against the same session
    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());
        let config = load_from_path(&patch_file)?;

        for (patch_id, result) in apply_patches(&config, &mut patcher) {
            match result {
                Ok(PatchResult::Applied { method }) => {
                    let verb = if args.dry_run { "Would apply" } else { "Applied" };
                    println!("{} {}: {} to {}", "✓".green(), patch_id, verb, method);
                    total_applied += 1;
                }
                Ok(PatchResult::AlreadyApplied { method }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        patch_id,
                        method
                    );
                    total_already_applied += 1;
                }
                Ok(PatchResult::SkippedVersion { reason }) => {
                    println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                    total_skipped += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    total_failed += 1;
                    report_conflict(&e);
                }
            }
        }
        println!();
    }

    if args.show_diff {
        display_module_diff(&before, patcher.module());
        println!();
    }

    // 4. Save
    if total_applied > 0 && !args.dry_run {
        let report = match &args.output {
            Some(output) => patcher.save_to(output)?,
            None => patcher.save(args.backup)?,
        };
        println!(
            "Wrote {} ({} bytes, xxh3 {:016x})",
            report.path.display(),
            report.bytes_written,
            report.checksum
        );
        if let Some(backup) = &report.backup {
            println!("{}", format!("Backup: {}", backup.display()).dimmed());
        }
        println!();
    }

    // 5. Summary
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Helpful diagnostics for patches whose target no longer matches the module.
fn report_conflict(error: &ApplicationError) {
    match error {
        ApplicationError::Patch(e) if e.is_not_found() => {
            eprintln!("  {}", "CONFLICT: target does not resolve".red());
            eprintln!("  Possible causes:");
            eprintln!("    - Type or method was renamed or removed");
            eprintln!("    - Overload signature changed");
        }
        ApplicationError::LocateFailed { .. } => {
            eprintln!("  {}", "CONFLICT: locate pattern not found".red());
            eprintln!("  Action: check the method listing with `il-patcher dump`");
        }
        _ => {}
    }
}

fn cmd_find(
    module: &Path,
    operands: &[String],
    opcodes: &[String],
    signature: &[String],
) -> Result<()> {
    let patcher = Patcher::open(module, JsonProvider, false)
        .with_context(|| format!("failed to open {}", module.display()))?;

    let output = if !signature.is_empty() {
        let hits: Vec<_> = patcher
            .find_methods_by_signature(signature)
            .into_iter()
            .map(|hit| serde_json::json!({ "target": hit.target, "offset": hit.offset }))
            .collect();
        serde_json::to_string_pretty(&hits)?
    } else {
        let mut targets = Vec::new();
        if !operands.is_empty() {
            targets.extend(patcher.find_by_operand_values(operands));
        }
        if !opcodes.is_empty() {
            targets.extend(patcher.find_by_opcodes(opcodes));
        }
        serde_json::to_string_pretty(&targets)?
    };
    println!("{output}");
    Ok(())
}

fn cmd_dump(module: &Path, target: &str) -> Result<()> {
    let patcher = Patcher::open(module, JsonProvider, false)
        .with_context(|| format!("failed to open {}", module.display()))?;
    let target: Target = target.parse()?;
    let body = Body::new(patcher.instructions(&target)?);
    println!("{}", target.to_string().bold());
    print!("{}", body.listing());
    Ok(())
}

fn cmd_list(patches: &Path) -> Result<()> {
    if !patches.exists() {
        anyhow::bail!("{} does not exist", patches.display());
    }
    for file in discover(patches)? {
        let config = load_from_path(&file)?;
        let name = if config.meta.name.is_empty() {
            file.display().to_string()
        } else {
            config.meta.name.clone()
        };
        let range = config.meta.version_range.as_deref().unwrap_or("*");
        println!("{} {}", name.bold(), format!("({range})").cyan());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }
        for patch in &config.patches {
            println!(
                "  - {} [{}] {}",
                patch.id,
                patch.operation.kind(),
                patch.target
            );
        }
    }
    Ok(())
}
