use crate::error::{ClassroomError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that takes precedence over `github_token`
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Organization and clone location for one course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    /// GitHub organization holding the course repositories
    pub organization: String,
    /// Sub-directory of `clone_directory` used for this course
    pub directory: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GitHub personal access token
    pub github_token: Option<String>,

    /// API root for GitHub Enterprise; github.com when unset
    #[serde(default)]
    pub github_api_url: Option<String>,

    /// Organization used when a command is not given `--course`
    pub default_organization: Option<String>,

    /// Course key (as passed to `--course`) to organization and directory
    #[serde(default = "default_courses")]
    pub courses: BTreeMap<String, CourseConfig>,

    /// Roster table with columns login, name, section (and optionally course)
    #[serde(default = "default_roster_file")]
    pub roster_file: PathBuf,

    /// Project table with columns project_name, repo
    #[serde(default = "default_project_file")]
    pub project_file: PathBuf,

    /// JSON file memoizing student -> repo lookups
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Root directory for clones
    #[serde(default = "default_clone_directory")]
    pub clone_directory: PathBuf,

    /// UTC offset (hours) used when printing commit timestamps
    #[serde(default = "default_utc_offset")]
    pub report_utc_offset_hours: i32,

    /// Treat the oldest commit of a repo as template scaffolding
    #[serde(default = "default_true")]
    pub exclude_initial_commit: bool,

    /// Show a progress bar while enumerating organization repos
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Config {
    /// Load configuration from the default location (~/.config/classroom-repos/config.toml)
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassroomError::config(format!(
                "Config file not found at: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ClassroomError::config("Could not determine home directory"))?;
        Ok(home.join(".config").join("classroom-repos").join("config.toml"))
    }

    /// Create a default configuration file at the default location
    pub fn create_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::create_default_at(&config_path)
    }

    /// Create a default configuration file at `path`
    pub fn create_default_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config = Self::default();
        let toml_string = toml::to_string_pretty(&config)?;
        fs::write(path, toml_string)?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(token) = &self.github_token {
            if token.trim().is_empty() {
                return Err(ClassroomError::config(
                    "github_token is empty; remove it or set a real token",
                ));
            }
        }

        if self.report_offset().is_none() {
            return Err(ClassroomError::config(format!(
                "report_utc_offset_hours must be between -23 and 23, got {}",
                self.report_utc_offset_hours
            )));
        }

        for (key, course) in &self.courses {
            if course.organization.is_empty() {
                return Err(ClassroomError::config(format!(
                    "course '{}' has no organization",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create_default() -> Result<Self> {
        match Self::load() {
            Ok(config) => Ok(config),
            Err(ClassroomError::Config(msg)) if msg.starts_with("Config file not found") => {
                eprintln!("Config file not found. Creating default config...");
                Self::create_default()
            }
            Err(e) => Err(e),
        }
    }

    /// The access token, preferring the environment over the config file.
    ///
    /// Every remote operation goes through this first, so a missing token
    /// fails before any request is made.
    pub fn github_token(&self) -> Result<String> {
        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                return Ok(token);
            }
        }

        self.github_token.clone().ok_or_else(|| {
            ClassroomError::MissingConfig(format!(
                "a GitHub access token is required. Create one at \
                 https://github.com/settings/tokens and set {} or github_token",
                TOKEN_ENV_VAR
            ))
        })
    }

    /// Look up a course by its CLI key
    pub fn course(&self, key: &str) -> Result<&CourseConfig> {
        self.courses.get(key).ok_or_else(|| {
            let known: Vec<&str> = self.courses.keys().map(String::as_str).collect();
            ClassroomError::config(format!(
                "unknown course '{}' (configured: {})",
                key,
                known.join(", ")
            ))
        })
    }

    /// Organization for a command, from `--course` or the default
    pub fn organization_for(&self, course: Option<&str>) -> Result<String> {
        match course {
            Some(key) => Ok(self.course(key)?.organization.clone()),
            None => self.default_organization.clone().ok_or_else(|| {
                ClassroomError::MissingConfig(
                    "default_organization (or pass --course)".to_string(),
                )
            }),
        }
    }

    /// Clone root for a course: `{clone_directory}/{course.directory}`
    pub fn course_directory(&self, key: &str) -> Result<PathBuf> {
        Ok(self.clone_directory.join(&self.course(key)?.directory))
    }

    /// Timezone used for report timestamps
    pub fn report_offset(&self) -> Option<FixedOffset> {
        if self.report_utc_offset_hours.abs() > 23 {
            return None;
        }
        FixedOffset::east_opt(self.report_utc_offset_hours * 3600)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: None,
            default_organization: None,
            courses: default_courses(),
            roster_file: default_roster_file(),
            project_file: default_project_file(),
            cache_file: default_cache_file(),
            clone_directory: default_clone_directory(),
            report_utc_offset_hours: default_utc_offset(),
            exclude_initial_commit: default_true(),
            show_progress: default_true(),
        }
    }
}

// Serde default functions
fn default_courses() -> BTreeMap<String, CourseConfig> {
    let mut courses = BTreeMap::new();
    courses.insert(
        "mwc".to_string(),
        CourseConfig {
            organization: "the-isf-academy".to_string(),
            directory: "mwc".to_string(),
        },
    );
    courses.insert(
        "dp".to_string(),
        CourseConfig {
            organization: "isf-dp-cs".to_string(),
            directory: "dp".to_string(),
        },
    );
    courses
}

fn default_roster_file() -> PathBuf {
    PathBuf::from("roster.csv")
}

fn default_project_file() -> PathBuf {
    PathBuf::from("projects.csv")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("cached_student_project_repos.json")
}

fn default_clone_directory() -> PathBuf {
    PathBuf::from("classroom")
}

fn default_utc_offset() -> i32 {
    8 // Asia/Hong_Kong
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.report_utc_offset_hours, 8);
        assert!(config.exclude_initial_commit);
        assert_eq!(config.courses.len(), 2);
        assert_eq!(config.course("mwc").unwrap().organization, "the-isf-academy");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_offset() {
        let mut config = Config::default();
        config.report_utc_offset_hours = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_token() {
        let mut config = Config::default();
        config.github_token = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_course() {
        let config = Config::default();
        let err = config.course("art").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("dp, mwc"));
    }

    #[test]
    fn test_organization_for() {
        let mut config = Config::default();
        assert_eq!(config.organization_for(Some("dp")).unwrap(), "isf-dp-cs");
        assert!(config.organization_for(None).is_err());

        config.default_organization = Some("my-org".to_string());
        assert_eq!(config.organization_for(None).unwrap(), "my-org");
    }

    #[test]
    fn test_course_directory() {
        let mut config = Config::default();
        config.clone_directory = PathBuf::from("/srv/clones");
        assert_eq!(
            config.course_directory("mwc").unwrap(),
            PathBuf::from("/srv/clones/mwc")
        );
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            github_token = "ghp_test"
            default_organization = "my-org"
            exclude_initial_commit = false

            [courses.cs1]
            organization = "cs1-org"
            directory = "cs1"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert!(!config.exclude_initial_commit);
        assert_eq!(config.courses.len(), 1);
        assert_eq!(config.roster_file, PathBuf::from("roster.csv"));
        assert_eq!(config.report_utc_offset_hours, 8);
    }

    #[test]
    fn test_create_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        Config::create_default_at(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.courses, default_courses());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from(&temp_dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ClassroomError::Config(_))));
    }
}
