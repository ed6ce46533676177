use crate::config::Config;
use crate::error::{ClassroomError, Result};
use crate::github::{full_name, Organization, Permission, RepoHost, Repository};
use crate::local;
use crate::report::{
    select_latest, student_commit_count, LatestCommitTable, LogEntry, ReportColumns,
};
use crate::resolver::{RepoCache, StudentRepoResolver};
use crate::roster::{Projects, Roster};
use chrono::{DateTime, FixedOffset, Utc};
use console::style;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Which students and lab a batch command works on
#[derive(Debug, Clone)]
pub struct BatchTarget {
    /// Template repository name; student repos are `{lab}_{login}`
    pub lab: String,
    /// Course key from the config
    pub course: String,
    pub section: Option<String>,
}

impl BatchTarget {
    pub fn student_repo_name(&self, login: &str) -> String {
        format!("{}_{}", self.lab, login)
    }
}

/// Per-student results of a batch command
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ClassroomError)>,
}

impl BatchSummary {
    /// Note one student's outcome. Setup errors are returned instead so the
    /// batch stops.
    fn record<T>(&mut self, login: &str, result: Result<T>) -> Result<()> {
        match result {
            Ok(_) => self.succeeded.push(login.to_string()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(login, error = %e, "student skipped");
                println!("  - {}: {}", login, e);
                self.failed.push((login.to_string(), e));
            }
        }
        Ok(())
    }
}

/// A repository created from a template and the collaborators granted on it
#[derive(Debug)]
pub struct CreatedRepo {
    pub repo: Repository,
    pub added: Vec<String>,
    pub failed: Vec<(String, ClassroomError)>,
}

/// Settings for the latest-commit report
#[derive(Debug, Clone)]
pub struct LatestCommitOptions {
    /// Project index, or part of a project name or repo name
    pub project: String,
    pub assignment_prefix: Option<String>,
    pub use_cache: bool,
    pub section: Option<String>,
    pub course: Option<String>,
    pub outfile: Option<PathBuf>,
    pub order: String,
    pub columns: ReportColumns,
}

/// Orchestrator for coordinating roster-wide operations
pub struct Orchestrator<'a> {
    config: Config,
    host: &'a dyn RepoHost,
}

impl<'a> Orchestrator<'a> {
    /// Create a new orchestrator
    pub fn new(config: Config, host: &'a dyn RepoHost) -> Self {
        Self { config, host }
    }

    /// Get a reference to the config
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn report_offset(&self) -> Result<FixedOffset> {
        self.config.report_offset().ok_or_else(|| {
            ClassroomError::config(format!(
                "invalid report_utc_offset_hours {}",
                self.config.report_utc_offset_hours
            ))
        })
    }

    /// Look up the organization of a course. Failure aborts the command.
    async fn organization(&self, course: Option<&str>) -> Result<Organization> {
        let name = self.config.organization_for(course)?;
        self.host.find_organization(&name).await
    }

    fn students(&self, course: &str, section: Option<&str>) -> Result<Roster> {
        let roster = Roster::load(&self.config.roster_file)?
            .filter_course(course)
            .filter_section(section);
        if roster.is_empty() {
            warn!(course, section, "no students match");
        }
        Ok(roster)
    }

    /// Print the commit log of every student's copy of the lab
    pub async fn log_repos(
        &self,
        target: &BatchTarget,
        since: Option<DateTime<Utc>>,
    ) -> Result<BatchSummary> {
        let org = self.organization(Some(&target.course)).await?;
        let roster = self.students(&target.course, target.section.as_deref())?;
        let mut summary = BatchSummary::default();

        for student in &roster.entries {
            let repo = full_name(&org.login, &target.student_repo_name(&student.login));
            let result = self.repo_log(&repo, &student.name, since).await;
            summary.record(&student.login, result)?;
        }
        Ok(summary)
    }

    /// Print the student commits of one repo and return how many there are
    pub async fn repo_log(
        &self,
        repo_full_name: &str,
        label: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let offset = self.report_offset()?;
        let mut commits = self.host.list_commits(repo_full_name, since).await?;

        // Newest first, so the initial commit is the last element of the full
        // history. A `since` window may not reach back to it at all.
        let count = match since {
            Some(_) if self.config.exclude_initial_commit => {
                let history = self.host.list_commits(repo_full_name, None).await?;
                if let Some(root) = history.last() {
                    commits.retain(|c| c.sha != root.sha);
                }
                commits.len()
            }
            _ => student_commit_count(commits.len(), self.config.exclude_initial_commit),
        };

        println!("{}", style(format!("{} has {} commits.", label, count)).cyan());

        for listed in commits.iter().take(count) {
            let commit = self.host.get_commit(repo_full_name, &listed.sha).await?;
            println!("{}", LogEntry { commit }.render(&offset));
        }
        println!();

        Ok(count)
    }

    /// Create `{lab}_{login}` from the lab template for every student
    pub async fn create_repos(
        &self,
        target: &BatchTarget,
        public: bool,
        users: &[String],
        permission: Permission,
    ) -> Result<BatchSummary> {
        let org = self.organization(Some(&target.course)).await?;
        let roster = self.students(&target.course, target.section.as_deref())?;
        let template = full_name(&org.login, &target.lab);
        let mut summary = BatchSummary::default();

        for student in &roster.entries {
            let mut collaborators = vec![student.login.clone()];
            collaborators.extend(users.iter().filter(|u| **u != student.login).cloned());

            let result = self
                .create_with_collaborators(
                    &template,
                    &org.login,
                    &target.student_repo_name(&student.login),
                    !public,
                    &collaborators,
                    permission,
                )
                .await;
            summary.record(&student.login, result)?;
        }
        Ok(summary)
    }

    /// Create a repo from a template, then grant each collaborator access.
    ///
    /// A failed grant is reported and skipped; the repo is returned either way.
    pub async fn create_with_collaborators(
        &self,
        template_full_name: &str,
        owner: &str,
        name: &str,
        private: bool,
        users: &[String],
        permission: Permission,
    ) -> Result<CreatedRepo> {
        let repo = self
            .host
            .create_from_template(template_full_name, owner, name, private)
            .await?;
        println!("Successfully created new repository: {}", repo.full_name);
        info!(repo = %repo.full_name, template = template_full_name, "created repository");

        let mut created = CreatedRepo {
            repo,
            added: Vec::new(),
            failed: Vec::new(),
        };

        if !users.is_empty() {
            println!("Adding collaborators...");
        }
        for user in users {
            match self
                .host
                .add_collaborator(&created.repo.full_name, user, permission)
                .await
            {
                Ok(()) => {
                    println!("  - Added '{}' with '{}' permission.", user, permission);
                    created.added.push(user.clone());
                }
                Err(e) => {
                    debug!(user = %user, error = %e, "could not add collaborator");
                    println!("  - Failed to add user '{}': {}", user, e);
                    created.failed.push((user.clone(), e));
                }
            }
        }

        Ok(created)
    }

    /// Delete every student's copy of the lab
    pub async fn delete_repos(&self, target: &BatchTarget) -> Result<BatchSummary> {
        let org = self.organization(Some(&target.course)).await?;
        let roster = self.students(&target.course, target.section.as_deref())?;
        let mut summary = BatchSummary::default();

        for student in &roster.entries {
            let repo = full_name(&org.login, &target.student_repo_name(&student.login));
            let result = self.host.delete_repo(&repo).await;
            if result.is_ok() {
                println!("  - Successfully deleted repository: {}", repo);
            }
            summary.record(&student.login, result)?;
        }
        Ok(summary)
    }

    /// Clone every student's copy of the lab into the course directory
    pub async fn clone_repos(&self, target: &BatchTarget) -> Result<BatchSummary> {
        let org = self.organization(Some(&target.course)).await?;
        let roster = self.students(&target.course, target.section.as_deref())?;
        let course_dir = self.config.course_directory(&target.course)?;
        let mut summary = BatchSummary::default();

        for student in &roster.entries {
            let name = target.student_repo_name(&student.login);
            println!("Cloning '{}'", name);

            let result = match self.host.get_repo(&full_name(&org.login, &name)).await {
                Ok(repo) => {
                    let dir = local::clone_path(
                        &course_dir,
                        target.section.as_deref(),
                        &target.lab,
                        &repo.name,
                    );
                    local::clone_repo(&repo.clone_url, &dir).map(|cloned| {
                        if cloned.into_existing {
                            println!("  - Warning: directory '{}' already exists.", dir.display());
                        }
                        println!("  - Successfully cloned '{}'.", repo.full_name);
                    })
                }
                Err(e) => Err(e),
            };
            summary.record(&student.login, result)?;
        }
        Ok(summary)
    }

    /// Show each student's most recent commit on the project
    pub async fn latest_commit<R: BufRead, W: Write>(
        &self,
        options: &LatestCommitOptions,
        input: &mut R,
        output: &mut W,
    ) -> Result<LatestCommitTable> {
        if !options.columns.headers().contains(&options.order.as_str()) {
            return Err(ClassroomError::invalid_argument(format!(
                "cannot order by '{}'; available columns: {}",
                options.order,
                options.columns.headers().join(", ")
            )));
        }
        let offset = self.report_offset()?;

        let projects = Projects::load(&self.config.project_file)?;
        let project = projects.select(&options.project, input, output)?.clone();
        let organization = self.config.organization_for(options.course.as_deref())?;
        let base_repo = self
            .host
            .get_repo(&full_name(&organization, &project.repo))
            .await?;

        let roster = Roster::load(&self.config.roster_file)?;
        let roster = match &options.course {
            Some(course) => roster.filter_course(course),
            None => roster,
        }
        .filter_section(options.section.as_deref());

        let resolver = StudentRepoResolver::new(
            self.host,
            organization,
            RepoCache::new(&self.config.cache_file),
        )
        .with_progress(self.config.show_progress);
        let student_repos = resolver
            .resolve(
                &base_repo,
                &roster.logins(),
                options.assignment_prefix.as_deref(),
                options.use_cache,
            )
            .await?;

        let mut students = Vec::with_capacity(roster.len());
        for student in roster.entries {
            let mut heads = Vec::new();
            for repo in student_repos.get(&student.login).into_iter().flatten() {
                match self.host.get_commit(&repo.full_name, &repo.default_branch).await {
                    Ok(commit) => heads.push((repo.clone(), commit)),
                    Err(e) => {
                        debug!(repo = %repo.full_name, error = %e, "could not read branch head");
                        writeln!(output, "  - {}: {}", repo.full_name, e)?;
                    }
                }
            }
            students.push((student, select_latest(heads)));
        }

        let mut table = LatestCommitTable::build(&students, &options.columns);
        table.sort_by(&options.order)?;

        match &options.outfile {
            Some(path) => {
                table.write_csv(path, &offset)?;
                writeln!(output, "Saved {} rows to {}", table.rows.len(), path.display())?;
            }
            None => {
                writeln!(output)?;
                write!(output, "{}", table.render(&offset))?;
                if let Some(messages) = table.render_messages() {
                    write!(output, "{}", messages)?;
                }
            }
        }
        output.flush()?;

        Ok(table)
    }

    /// Create one repository from a template in the course organization
    pub async fn create_from_template(
        &self,
        template: &str,
        new_repo: &str,
        public: bool,
        users: &[String],
        permission: Permission,
        course: Option<&str>,
    ) -> Result<CreatedRepo> {
        let owner = self.config.organization_for(course)?;
        self.create_with_collaborators(
            &full_name(&owner, template),
            &owner,
            new_repo,
            !public,
            users,
            permission,
        )
        .await
    }

    /// Grant `user` a permission level on one repository
    pub async fn repo_permission(
        &self,
        repo: &str,
        user: &str,
        permission: Permission,
        course: Option<&str>,
    ) -> Result<()> {
        let owner = self.config.organization_for(course)?;
        let repo = full_name(&owner, repo);
        self.host.add_collaborator(&repo, user, permission).await?;
        println!("Gave '{}' {} access to {}", user, permission, repo);
        Ok(())
    }
}

/// Pull every clone of a lab. Needs no GitHub access.
pub fn pull_lab(config: &Config, target: &BatchTarget) -> Result<local::PullReport> {
    let course_dir = config.course_directory(&target.course)?;
    let base_dir = local::lab_path(&course_dir, target.section.as_deref(), &target.lab);

    println!("Searching for repositories in '{}'...", base_dir.display());
    let report = local::pull_all(&base_dir)?;

    for result in &report.results {
        println!("\n--- Pulling changes for '{}' ---", result.name);
        match &result.outcome {
            Ok(output) => {
                println!("{}", output.stdout.trim_end());
                if !output.stderr.trim().is_empty() {
                    println!("Git stderr:\n{}", output.stderr.trim_end());
                }
            }
            Err(e) => {
                debug!(repo = %result.name, error = %e, "pull failed");
                println!("Error during git pull for '{}': {}", result.name, e);
            }
        }
    }

    if report.no_repos_found() {
        println!("No Git repositories found in '{}'.", base_dir.display());
    }
    println!();

    Ok(report)
}
