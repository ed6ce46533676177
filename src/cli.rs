use crate::github::Permission;
use crate::report::ReportColumns;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "classroom-repos")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Manage per-student GitHub repositories for a class roster",
    long_about = "classroom-repos creates, clones, pulls, deletes and inspects the \
                  repositories each student on a roster gets for a lab, and reports \
                  every student's most recent commit on a project."
)]
pub struct Cli {
    /// Path to config file (default: ~/.config/classroom-repos/config.toml)
    #[arg(short, long, value_name = "FILE", global = true, env = "CLASSROOM_REPOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hide the progress bar while searching an organization
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Lab, course and section shared by the batch commands
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Template repository name; student repos are named `<lab>_<login>`
    #[arg(long)]
    pub lab: String,

    /// Course key from the config file
    #[arg(long)]
    pub course: String,

    /// Only students in this section
    #[arg(long)]
    pub section: Option<String>,
}

/// Visibility and access for newly created repositories
#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Create public repositories (default: private)
    #[arg(long)]
    pub public: bool,

    /// Extra collaborators to add, comma separated
    #[arg(long, value_delimiter = ',')]
    pub users: Vec<String>,

    /// Permission granted to collaborators
    #[arg(long, value_enum, default_value_t = Permission::Push)]
    pub permission: Permission,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print each student's commits on a lab
    Log {
        #[command(flatten)]
        batch: BatchArgs,

        /// Only commits on or after this date (YYYY, YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },

    /// Create a repository from the lab template for every student
    Create {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        create: CreateArgs,
    },

    /// Delete every student's repository for a lab
    Delete {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Clone every student's repository for a lab
    Clone {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Pull every cloned repository of a lab
    Pull {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Show each student's most recent commit on a project
    LatestCommit {
        /// Project index, or part of a project or repo name
        project: String,

        /// Name prefix of student repos when it differs from the project repo
        #[arg(long)]
        assignment_prefix: Option<String>,

        /// Ignore the cached student repositories and search again
        #[arg(long)]
        no_cache: bool,

        /// Only students in this section
        #[arg(long)]
        section: Option<String>,

        /// Course key; defaults to default_organization
        #[arg(long)]
        course: Option<String>,

        /// Write the table to this CSV file instead of printing it
        #[arg(long, value_name = "FILE")]
        outfile: Option<PathBuf>,

        /// Column to sort by
        #[arg(long, default_value = "date")]
        order: String,

        /// Include the repository column
        #[arg(long)]
        repo: bool,

        /// Include the commit hash column
        #[arg(long)]
        hash: bool,

        /// Include additions and deletions
        #[arg(long)]
        stats: bool,

        /// Include the commit URL
        #[arg(long)]
        url: bool,

        /// Include the commit message
        #[arg(long)]
        message: bool,

        /// Include the commit message length
        #[arg(long)]
        message_length: bool,
    },

    /// Create one repository from a template
    CreateFromTemplate {
        template: String,
        new_repo: String,

        #[command(flatten)]
        create: CreateArgs,

        /// Course key; defaults to default_organization
        #[arg(long)]
        course: Option<String>,
    },

    /// Give a user access to one repository
    RepoPermission {
        repo: String,
        user: String,
        #[arg(value_enum)]
        permission: Permission,

        /// Course key; defaults to default_organization
        #[arg(long)]
        course: Option<String>,
    },

    /// Print the roster
    Roster {
        /// Only students in this section
        #[arg(long)]
        section: Option<String>,
    },

    /// Check the token and the roster and project files
    Check,

    /// Delete the cached student repositories
    ClearCache,

    /// Initialize configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Config,
}

impl Commands {
    /// Whether the command talks to GitHub and so needs a token
    pub fn needs_token(&self) -> bool {
        !matches!(
            self,
            Commands::Pull { .. }
                | Commands::Roster { .. }
                | Commands::Check
                | Commands::ClearCache
                | Commands::Init { .. }
                | Commands::Config
        )
    }
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Commands::Log { batch, .. }
            | Commands::Create { batch, .. }
            | Commands::Delete { batch }
            | Commands::Clone { batch }
            | Commands::Pull { batch } => {
                if batch.lab.trim().is_empty() {
                    return Err("--lab cannot be empty".to_string());
                }
            }
            Commands::LatestCommit { project, .. } => {
                if project.trim().is_empty() {
                    return Err("Project cannot be empty".to_string());
                }
            }
            Commands::CreateFromTemplate {
                template, new_repo, ..
            } => {
                if template == new_repo {
                    return Err("The new repository needs a different name than its template".to_string());
                }
            }
            _ => {}
        }

        if let Commands::Create { create, .. } | Commands::CreateFromTemplate { create, .. } =
            &self.command
        {
            if create.users.iter().any(|u| u.trim().is_empty()) {
                return Err("--users contains an empty login".to_string());
            }
        }

        Ok(())
    }
}

/// Optional report columns selected on the command line
pub fn report_columns(
    repo: bool,
    hash: bool,
    stats: bool,
    url: bool,
    message: bool,
    message_length: bool,
) -> ReportColumns {
    ReportColumns {
        repo,
        hash,
        stats,
        url,
        message,
        message_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_batch() {
        let cli = Cli::parse_from(vec![
            "classroom-repos",
            "clone",
            "--lab",
            "lab_web",
            "--course",
            "mwc",
            "--section",
            "A",
        ]);
        match cli.command {
            Commands::Clone { batch } => {
                assert_eq!(batch.lab, "lab_web");
                assert_eq!(batch.course, "mwc");
                assert_eq!(batch.section.as_deref(), Some("A"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_batch_requires_lab_and_course() {
        assert!(Cli::try_parse_from(vec!["classroom-repos", "pull", "--course", "mwc"]).is_err());
        assert!(Cli::try_parse_from(vec!["classroom-repos", "pull", "--lab", "lab_web"]).is_err());
    }

    #[test]
    fn test_cli_create_options() {
        let cli = Cli::parse_from(vec![
            "classroom-repos",
            "create",
            "--lab",
            "lab_web",
            "--course",
            "dp",
            "--users",
            "ta1,ta2",
            "--permission",
            "admin",
        ]);
        match cli.command {
            Commands::Create { create, .. } => {
                assert!(!create.public);
                assert_eq!(create.users, vec!["ta1".to_string(), "ta2".to_string()]);
                assert_eq!(create.permission, Permission::Admin);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_default_permission_is_push() {
        let cli = Cli::parse_from(vec!["classroom-repos", "create-from-template", "lab", "lab_copy"]);
        match cli.command {
            Commands::CreateFromTemplate { create, .. } => {
                assert_eq!(create.permission, Permission::Push);
                assert!(create.users.is_empty());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_latest_commit() {
        let cli = Cli::parse_from(vec![
            "classroom-repos",
            "latest-commit",
            "db",
            "--no-cache",
            "--order",
            "login",
            "--hash",
            "--message-length",
        ]);
        match cli.command {
            Commands::LatestCommit {
                project,
                no_cache,
                order,
                hash,
                message_length,
                repo,
                ..
            } => {
                assert_eq!(project, "db");
                assert!(no_cache);
                assert_eq!(order, "login");
                assert!(hash && message_length && !repo);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(vec!["classroom-repos", "check", "-vv", "--config", "c.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(!cli.command.needs_token());
    }

    #[test]
    fn test_cli_init_command() {
        let cli = Cli::parse_from(vec!["classroom-repos", "init"]);
        assert!(matches!(cli.command, Commands::Init { force: false }));
    }

    #[test]
    fn test_cli_bad_permission() {
        assert!(Cli::try_parse_from(vec![
            "classroom-repos",
            "repo-permission",
            "lab_web_alice",
            "ta",
            "maintain"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_validation() {
        let cli = Cli::parse_from(vec!["classroom-repos", "create-from-template", "lab", "lab"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(vec![
            "classroom-repos",
            "log",
            "--lab",
            " ",
            "--course",
            "mwc",
        ]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(vec!["classroom-repos", "roster"]);
        assert!(cli.validate().is_ok());
    }
}
