use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use log::info;
use pkgscope::{
    config::Config,
    report::{space_line, Inspector},
    repository,
    utils::{format_epoch, format_size},
};
use std::time::Instant;

#[tokio::main]
async fn main() {
    env_logger::init();
    let matches = build_cli().get_matches();
    let start_time = Instant::now();

    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }

    if let Err(e) = run_command(matches).await {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }

    info!(
        "Query completed in {}ms",
        start_time.elapsed().as_millis()
    );
}

fn build_cli() -> Command {
    Command::new("pkgscope")
        .version(pkgscope::PKGSCOPE_VERSION)
        .about("pkgscope is a fast, read-only inspector for illumos SVR4 package and overlay state.")
        .arg(Arg::new("root")
            .short('R')
            .long("root")
            .value_name("ROOT")
            .help("Inspect an alternate root instead of /"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("CONFIG"))
        .arg(Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Emit reports as JSON"))
        .arg(Arg::new("no-color")
            .long("no-color")
            .action(ArgAction::SetTrue))
        .subcommand(Command::new("list")
            .about("List installed packages")
            .alias("l"))
        .subcommand(Command::new("info")
            .about("Show package metadata and dependency relations")
            .alias("i")
            .arg(Arg::new("package")
                .required(true)
                .help("Package name")))
        .subcommand(Command::new("overlays")
            .about("List overlays with install and completeness status"))
        .subcommand(Command::new("overlay")
            .about("Show one overlay in detail")
            .arg(Arg::new("name")
                .required(true)
                .help("Overlay name")))
        .subcommand(Command::new("missing-deps")
            .about("Report dependencies of installed packages that are not installed"))
        .subcommand(Command::new("check-overlays")
            .about("Report overlays whose install marker disagrees with their contents")
            .alias("verify"))
        .subcommand(Command::new("space")
            .about("Report disk space consumed per package or overlay")
            .arg(Arg::new("names")
                .num_args(0..)
                .help("Package (or, with --overlays, overlay) names"))
            .arg(Arg::new("all")
                .short('a')
                .long("all")
                .action(ArgAction::SetTrue)
                .help("Report every package (or overlay)"))
            .arg(Arg::new("overlays")
                .long("overlays")
                .action(ArgAction::SetTrue)
                .help("Treat names as overlays")))
        .subcommand(Command::new("owner")
            .about("Show the manifest record and owning packages for a path")
            .arg(Arg::new("path")
                .required(true)
                .help("Absolute path on the inspected system")))
        .subcommand(Command::new("avail")
            .about("Show versions of a package in locally cached repository catalogs")
            .arg(Arg::new("package")
                .required(true)
                .help("Package name")))
}

async fn run_command(matches: ArgMatches) -> pkgscope::ScopeResult<()> {
    let mut config = Config::load(matches.get_one::<String>("config").map(|s| s.as_str()))?;
    if let Some(root) = matches.get_one::<String>("root") {
        config = config.with_root(root);
    }
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("list", _)) => {
            let inspector = Inspector::load(config).await?;
            for name in inspector.packages().names() {
                let record = inspector.packages().get(name);
                let description = record.and_then(|r| r.description()).unwrap_or("");
                let version = record.and_then(|r| r.version()).unwrap_or("-");
                println!("{:<24} {:<12} {}", name.bold(), version, description);
            }
        }

        Some(("info", sub_matches)) => {
            let package = sub_matches.get_one::<String>("package").unwrap();
            let inspector = Inspector::load(config).await?;
            let Some(report) = inspector.dependency_report(package) else {
                println!("{}", format!("Package {} is not installed", package).yellow());
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("{}", package.bold());
            if let Some(record) = inspector.packages().get(package) {
                if let Some(description) = record.description() {
                    println!("  {}", description);
                }
                if let Some(version) = record.version() {
                    println!("  Version: {}", version);
                }
            }
            print_name_set("Depends on", &report.depends_on);
            print_name_set("Needed by (computed)", &report.actual_dependents);
            print_name_set("Declared dependents", &report.declared_dependents);
            print_name_set("Incompatible with", &report.incompatible_with);
            let overlays = inspector.overlays().containing_package(package);
            if !overlays.is_empty() {
                let names: Vec<&str> = overlays.iter().map(|o| o.name()).collect();
                println!("  {}: {}", "Member of overlays".cyan(), names.join(", "));
            }
        }

        Some(("overlays", _)) => {
            let inspector = Inspector::load(config).await?;
            if json {
                let mut statuses: Vec<_> = inspector
                    .overlays()
                    .iter()
                    .filter(|overlay| overlay.is_declared())
                    .map(|overlay| inspector.overlay_status(overlay))
                    .collect();
                statuses.sort_by(|a, b| a.name.cmp(&b.name));
                println!("{}", serde_json::to_string_pretty(&statuses)?);
                return Ok(());
            }
            for name in inspector.overlays().names() {
                let Some(overlay) = inspector.overlays().get(name) else {
                    continue;
                };
                if !overlay.is_declared() {
                    continue;
                }
                let status = inspector.overlay_status(overlay);
                let flag = match (status.installed, status.complete) {
                    (true, true) => "installed".green(),
                    (false, false) => "not installed".normal(),
                    (true, false) => "installed, INCOMPLETE".red().bold(),
                    (false, true) => "complete, not marked installed".yellow(),
                };
                println!(
                    "{:<20} {:<40} {}",
                    status.name.bold(),
                    status.description.as_deref().unwrap_or(""),
                    flag
                );
            }
        }

        Some(("overlay", sub_matches)) => {
            let name = sub_matches.get_one::<String>("name").unwrap();
            let inspector = Inspector::load(config).await?;
            let Some(overlay) = inspector.overlays().get(name) else {
                println!("{}", format!("No overlay named {}", name).yellow());
                return Ok(());
            };
            let status = inspector.overlay_status(overlay);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("{}", status.name.bold());
            if let Some(description) = &status.description {
                println!("  {}", description);
            }
            if let Some(version) = overlay.version() {
                println!("  Version: {}", version);
            }
            println!("  Installed: {}", status.installed);
            println!("  Complete: {}", status.complete);
            let requires: Vec<&str> = overlay.requires().iter().map(|o| o.name()).collect();
            if !requires.is_empty() {
                println!("  Requires: {}", requires.join(", "));
            }
            if !overlay.services().is_empty() {
                println!("  Services: {}", overlay.services().join(", "));
            }
            if !status.missing_overlays.is_empty() {
                println!(
                    "  {}: {}",
                    "Missing overlays".red(),
                    status.missing_overlays.join(", ")
                );
            }
            if !status.missing_packages.is_empty() {
                println!(
                    "  {}: {}",
                    "Missing packages".red(),
                    status.missing_packages.join(", ")
                );
            }
            println!("  Packages ({}):", overlay.members().len());
            for member in overlay.members() {
                println!("    {}", member);
            }
            let requiring = inspector.overlays().requiring(name);
            if !requiring.is_empty() {
                let names: Vec<&str> = requiring.iter().map(|o| o.name()).collect();
                println!("  Required by: {}", names.join(", "));
            }
        }

        Some(("missing-deps", _)) => {
            let inspector = Inspector::load(config).await?;
            let missing = inspector.missing_dependencies();
            if json {
                println!("{}", serde_json::to_string_pretty(&missing)?);
                return Ok(());
            }
            if missing.is_empty() {
                println!("{}", "All declared dependencies are installed.".green());
                return Ok(());
            }
            println!("{}", "Missing dependencies:".bold());
            println!("{}", "=".repeat(72));
            for (name, dependants) in &missing {
                let needed_by: Vec<&str> = dependants.iter().map(|s| s.as_str()).collect();
                println!("{:<24} needed by {}", name.red(), needed_by.join(", "));
            }
        }

        Some(("check-overlays", _)) => {
            let inspector = Inspector::load(config).await?;
            let inconsistent = inspector.inconsistent_overlays();
            if json {
                println!("{}", serde_json::to_string_pretty(&inconsistent)?);
                return Ok(());
            }
            for cycle in inspector.overlays().requires_cycles() {
                println!(
                    "{}: {}",
                    "Requirement cycle".yellow().bold(),
                    cycle.join(" -> ")
                );
            }
            if inconsistent.is_empty() {
                println!("{}", "All overlays are consistent.".green());
                return Ok(());
            }
            for status in &inconsistent {
                if status.installed {
                    println!(
                        "{} is marked installed but incomplete",
                        status.name.red().bold()
                    );
                    if !status.missing_overlays.is_empty() {
                        println!("  missing overlays: {}", status.missing_overlays.join(", "));
                    }
                    if !status.missing_packages.is_empty() {
                        println!("  missing packages: {}", status.missing_packages.join(", "));
                    }
                } else {
                    println!(
                        "{} is complete but not marked installed",
                        status.name.yellow()
                    );
                }
            }
        }

        Some(("space", sub_matches)) => {
            let all = sub_matches.get_flag("all");
            let overlays = sub_matches.get_flag("overlays");
            let names: Vec<String> = sub_matches
                .get_many::<String>("names")
                .map(|names| names.cloned().collect())
                .unwrap_or_default();
            if !all && names.is_empty() {
                return Err(pkgscope::ScopeError::InvalidArguments(
                    "space needs names or --all".to_string(),
                ));
            }
            let inspector = Inspector::load(config).await?;
            inspector.wait_for_contents().await?;

            let targets: Vec<String> = if all {
                let all_names = if overlays {
                    inspector.overlays().names()
                } else {
                    inspector.packages().names()
                };
                all_names.into_iter().map(str::to_string).collect()
            } else {
                names
            };

            let mut summaries = Vec::new();
            for name in &targets {
                let summary = if overlays {
                    inspector.overlay_usage(name)
                } else {
                    inspector.package_usage(name)
                };
                match summary {
                    Some(summary) => summaries.push(summary),
                    None => eprintln!("{}", format!("No file data for {}", name).yellow()),
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
                return Ok(());
            }
            for summary in &summaries {
                println!("{}", space_line(summary));
            }
        }

        Some(("owner", sub_matches)) => {
            let path = sub_matches.get_one::<String>("path").unwrap();
            let inspector = Inspector::load(config).await?;
            let index = inspector.wait_for_contents().await?;
            let Some(detail) = index.file_detail(path) else {
                println!(
                    "{}",
                    format!("{} is not in the contents manifest", path).yellow()
                );
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(detail.as_ref())?);
                return Ok(());
            }
            println!("{}", detail.path.bold());
            println!("  Type: {:?} ({})", detail.kind, detail.kind.code());
            if let Some(mode) = detail.mode {
                println!("  Mode: {:o}", mode);
            }
            if let (Some(owner), Some(group)) = (&detail.owner, &detail.group) {
                println!("  Owner: {}:{}", owner, group);
            }
            if let Some(size) = detail.size() {
                println!("  Size: {} ({})", size, format_size(size));
            }
            if let Some(modtime) = detail.modtime() {
                println!("  Modified: {}", format_epoch(modtime));
            }
            if let Some(target) = detail.target() {
                println!("  Target: {}", target);
            }
            println!("  Packages: {}", detail.packages.join(", "));
            if detail.is_shared() {
                println!("  {}", "Shared between packages".cyan());
            }
        }

        Some(("avail", sub_matches)) => {
            let package = sub_matches.get_one::<String>("package").unwrap();
            config.validate_root()?;
            let catalogs = repository::load_catalogs(&config);
            let available = repository::available_versions(&catalogs, package);
            if json {
                println!("{}", serde_json::to_string_pretty(&available)?);
                return Ok(());
            }
            if available.is_empty() {
                println!(
                    "{}",
                    format!("{} is not in any cached repository catalog", package).yellow()
                );
                return Ok(());
            }
            for version in &available {
                println!(
                    "{:<16} {:<12} {}",
                    version.repository,
                    version.version,
                    format_size(version.size)
                );
            }
        }

        _ => {
            build_cli().print_help().map_err(pkgscope::ScopeError::Io)?;
            println!();
        }
    }

    Ok(())
}

fn print_name_set(label: &str, names: &std::collections::BTreeSet<String>) {
    if names.is_empty() {
        return;
    }
    let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    println!("  {}: {}", label.cyan(), names.join(", "));
}
