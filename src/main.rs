mod cli;
mod config;
mod error;
mod github;
mod local;
mod orchestrator;
mod report;
mod resolver;
mod roster;

use anyhow::Context;
use clap::Parser;
use cli::{BatchArgs, Cli, Commands};
use config::Config;
use github::client::GitHubClient;
use orchestrator::{BatchSummary, BatchTarget, LatestCommitOptions, Orchestrator};
use resolver::RepoCache;
use roster::{check_columns, Roster, PROJECT_COLUMNS, ROSTER_COLUMNS};
use std::io;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Commands::Init { force } = &cli.command {
        return init_config(cli.config.as_deref(), *force);
    }

    // Load or create config
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_create_default().context("failed to load config")?,
    };
    let config = apply_cli_overrides(config, &cli);

    if !cli.command.needs_token() {
        return handle_local_command(&cli.command, &config);
    }

    // Every remote command needs a token before anything else happens
    let token = match config.github_token() {
        Ok(token) => token,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut client = GitHubClient::new(token)?;
    if let Some(url) = &config.github_api_url {
        client = client.with_base_url(url.clone());
    }
    let orchestrator = Orchestrator::new(config, &client);
    handle_remote_command(&cli.command, &orchestrator).await
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("classroom_repos={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    if config_path.exists() && !force {
        eprintln!("Config file already exists at: {}", config_path.display());
        eprintln!("Use --force to overwrite");
        std::process::exit(1);
    }

    Config::create_default_at(&config_path)?;
    println!("✓ Created config file at: {}", config_path.display());
    println!("\nTo authenticate with GitHub, either:");
    println!("  1. Set the {} environment variable", config::TOKEN_ENV_VAR);
    println!("  2. Add github_token to the config file:");
    println!("     github_token = \"ghp_YOUR_TOKEN_HERE\"");
    Ok(())
}

fn handle_local_command(command: &Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Config => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("Current configuration:\n");
            println!("{}", toml_str);
        }
        Commands::ClearCache => {
            let cache = RepoCache::new(&config.cache_file);
            if cache.clear()? {
                println!("✓ Cache cleared: {}", cache.path().display());
            } else {
                println!("Cache file does not exist");
            }
        }
        Commands::Roster { section } => {
            let roster = Roster::load(&config.roster_file)?.filter_section(section.as_deref());
            for student in &roster.entries {
                println!(
                    "{:<20} {:<30} {}",
                    student.login,
                    student.name,
                    student.section.as_deref().unwrap_or("")
                );
            }
            println!("\n{} students", roster.len());
        }
        Commands::Check => {
            let mut problems = Vec::new();
            if let Err(e) = config.github_token() {
                problems.push(e.to_string());
            }
            problems.extend(check_columns(&config.roster_file, "Roster file", &ROSTER_COLUMNS));
            problems.extend(check_columns(&config.project_file, "Project file", &PROJECT_COLUMNS));

            if problems.is_empty() {
                println!("ok");
            } else {
                for problem in &problems {
                    println!(" - {}", problem);
                }
                anyhow::bail!("{} problem(s) found", problems.len());
            }
        }
        Commands::Pull { batch } => {
            let report = orchestrator::pull_lab(config, &batch_target(batch))?;
            debug!(pulled = report.results.len(), failed = report.failures(), "pull finished");
        }
        other => anyhow::bail!("{:?} needs GitHub access", other),
    }
    Ok(())
}

async fn handle_remote_command(
    command: &Commands,
    orchestrator: &Orchestrator<'_>,
) -> anyhow::Result<()> {
    match command {
        Commands::Log { batch, since } => {
            let since = since.as_deref().map(report::parse_date).transpose()?;
            let summary = orchestrator.log_repos(&batch_target(batch), since).await?;
            print_summary(&summary);
        }
        Commands::Create { batch, create } => {
            let summary = orchestrator
                .create_repos(
                    &batch_target(batch),
                    create.public,
                    &create.users,
                    create.permission,
                )
                .await?;
            print_summary(&summary);
        }
        Commands::Delete { batch } => {
            let summary = orchestrator.delete_repos(&batch_target(batch)).await?;
            print_summary(&summary);
        }
        Commands::Clone { batch } => {
            let summary = orchestrator.clone_repos(&batch_target(batch)).await?;
            print_summary(&summary);
        }
        Commands::LatestCommit {
            project,
            assignment_prefix,
            no_cache,
            section,
            course,
            outfile,
            order,
            repo,
            hash,
            stats,
            url,
            message,
            message_length,
        } => {
            let options = LatestCommitOptions {
                project: project.clone(),
                assignment_prefix: assignment_prefix.clone(),
                use_cache: !no_cache,
                section: section.clone(),
                course: course.clone(),
                outfile: outfile.clone(),
                order: order.clone(),
                columns: cli::report_columns(*repo, *hash, *stats, *url, *message, *message_length),
            };
            let mut input = io::stdin().lock();
            let mut output = io::stdout();
            orchestrator
                .latest_commit(&options, &mut input, &mut output)
                .await?;
        }
        Commands::CreateFromTemplate {
            template,
            new_repo,
            create,
            course,
        } => {
            let created = orchestrator
                .create_from_template(
                    template,
                    new_repo,
                    create.public,
                    &create.users,
                    create.permission,
                    course.as_deref(),
                )
                .await?;
            println!(
                "{}: {} collaborator(s) added, {} failed",
                created.repo.html_url,
                created.added.len(),
                created.failed.len()
            );
        }
        Commands::RepoPermission {
            repo,
            user,
            permission,
            course,
        } => {
            orchestrator
                .repo_permission(repo, user, *permission, course.as_deref())
                .await?;
        }
        other => return handle_local_command(other, orchestrator.config()),
    }
    Ok(())
}

fn batch_target(batch: &BatchArgs) -> BatchTarget {
    BatchTarget {
        lab: batch.lab.clone(),
        course: batch.course.clone(),
        section: batch.section.clone(),
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "\nDone: {} succeeded, {} failed",
        summary.succeeded.len(),
        summary.failed.len()
    );
}

fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if cli.no_progress {
        config.show_progress = false;
    }
    config
}
