use crate::error::{ClassroomError, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;

/// Required columns of the roster file
pub const ROSTER_COLUMNS: [&str; 3] = ["login", "name", "section"];

/// Required columns of the project file
pub const PROJECT_COLUMNS: [&str; 2] = ["project_name", "repo"];

/// One student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// GitHub login
    pub login: String,
    /// Display name
    pub name: String,
    /// Class section, if any
    #[serde(default, deserialize_with = "empty_as_none")]
    pub section: Option<String>,
    /// Course key, for rosters shared between courses
    #[serde(default, deserialize_with = "empty_as_none")]
    pub course: Option<String>,
}

/// One assignment and its template repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub project_name: String,
    pub repo: String,
}

impl std::fmt::Display for ProjectEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.project_name, self.repo)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// The class roster
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    /// Read a roster CSV file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassroomError::not_found(format!(
                "roster file {} (columns: {})",
                path.display(),
                ROSTER_COLUMNS.join(", ")
            )));
        }
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let entries = reader
            .deserialize()
            .collect::<std::result::Result<Vec<RosterEntry>, _>>()?;
        Ok(Self { entries })
    }

    /// Keep only students in `section`; `None` keeps everyone
    pub fn filter_section(self, section: Option<&str>) -> Self {
        match section {
            Some(section) => Self {
                entries: self
                    .entries
                    .into_iter()
                    .filter(|e| e.section.as_deref() == Some(section))
                    .collect(),
            },
            None => self,
        }
    }

    /// Keep students of `course`. Rows without a course column apply to every course.
    pub fn filter_course(self, course: &str) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| e.course.as_deref().map_or(true, |c| c == course))
                .collect(),
        }
    }

    pub fn logins(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.login.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The assignment table
#[derive(Debug, Clone, Default)]
pub struct Projects {
    pub entries: Vec<ProjectEntry>,
}

impl Projects {
    /// Read a project CSV file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ClassroomError::not_found(format!(
                "project file {} (columns: {})",
                path.display(),
                PROJECT_COLUMNS.join(", ")
            )));
        }
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let entries = reader
            .deserialize()
            .collect::<std::result::Result<Vec<ProjectEntry>, _>>()?;
        Ok(Self { entries })
    }

    /// Find a project by index, by part of its name, or by part of its repo name.
    ///
    /// Name matches are tried before repo matches. When more than one project
    /// matches, the operator picks one through `input`/`output`.
    pub fn select<R: BufRead, W: Write>(
        &self,
        identifier: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<&ProjectEntry> {
        if !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit()) {
            let index: usize = identifier
                .parse()
                .map_err(|_| ClassroomError::invalid_argument(identifier.to_string()))?;
            return self.entries.get(index).ok_or_else(|| {
                ClassroomError::not_found(format!(
                    "project index {} (only {} projects)",
                    index,
                    self.entries.len()
                ))
            });
        }

        let by_name: Vec<&ProjectEntry> = self
            .entries
            .iter()
            .filter(|p| p.project_name.contains(identifier))
            .collect();
        let matches = if by_name.is_empty() {
            self.entries
                .iter()
                .filter(|p| p.repo.contains(identifier))
                .collect()
        } else {
            by_name
        };

        match matches.len() {
            0 => Err(ClassroomError::not_found(format!(
                "no project matching '{}'",
                identifier
            ))),
            1 => Ok(matches[0]),
            _ => {
                let options: Vec<String> = matches.iter().map(|p| p.to_string()).collect();
                let choice = choose_from_options(&options, None, input, output)?;
                Ok(matches[choice])
            }
        }
    }
}

/// Ask the operator to pick one of `options` and return its index.
/// Re-prompts until a valid index is entered.
pub fn choose_from_options<R: BufRead, W: Write>(
    options: &[String],
    prompt: Option<&str>,
    input: &mut R,
    output: &mut W,
) -> Result<usize> {
    writeln!(output, "{}", prompt.unwrap_or("Choose from the following:"))?;
    for (i, option) in options.iter().enumerate() {
        writeln!(output, " {}) {}", i, option)?;
    }

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(ClassroomError::other("no choice made (end of input)"));
        }

        match line.trim().parse::<usize>() {
            Ok(choice) if choice < options.len() => return Ok(choice),
            _ => writeln!(output, "Invalid choice. Please try again:")?,
        }
    }
}

/// Report problems with a CSV file's header: missing file or missing columns.
pub fn check_columns(path: &Path, label: &str, columns: &[&str]) -> Vec<String> {
    if !path.exists() {
        return vec![format!(
            "{} ({}) does not exist. It must have columns: {}.",
            label,
            path.display(),
            columns.join(", ")
        )];
    }

    let headers = match csv::Reader::from_path(path).and_then(|mut r| r.headers().cloned()) {
        Ok(headers) => headers,
        Err(e) => return vec![format!("error reading {}: {}", label, e)],
    };

    columns
        .iter()
        .filter(|col| !headers.iter().any(|h| h.trim() == **col))
        .map(|col| format!("{} must contain a column for {}", label, col))
        .collect()
}
