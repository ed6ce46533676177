use crate::error::{ClassroomError, Result};
use crate::github::{Commit, Repository};
use crate::roster::RosterEntry;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use regex::Regex;
use std::cmp::Ordering;
use std::path::Path;

/// Number of commits that count as student work.
///
/// The oldest commit is usually the template scaffold GitHub copies into
/// every student repo, so it is dropped when `exclude_initial` is set.
pub fn student_commit_count(total: usize, exclude_initial: bool) -> usize {
    if exclude_initial {
        total.saturating_sub(1)
    } else {
        total
    }
}

/// One line of a commit log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub commit: Commit,
}

impl LogEntry {
    /// Render as `[timestamp] N lines (A additions, D deletions)` plus the message
    pub fn render(&self, offset: &FixedOffset) -> String {
        let date = self.commit.author_date.with_timezone(offset);
        let stats = self.commit.stats.unwrap_or_default();
        format!(
            " [{}] {} lines ({} additions, {} deletions)\n  - {}",
            date.format("%Y-%m-%d %H:%M:%S %:z"),
            stats.total,
            stats.additions,
            stats.deletions,
            self.commit.message
        )
    }
}

/// Latest commit found for one student
#[derive(Debug, Clone, PartialEq)]
pub struct LatestCommit {
    pub repo: Repository,
    pub commit: Commit,
}

/// Pick the most recent commit among a student's repo heads.
///
/// On equal author dates the repo with the smallest full name wins.
pub fn select_latest(candidates: Vec<(Repository, Commit)>) -> Option<LatestCommit> {
    candidates
        .into_iter()
        .min_by(|(ra, ca), (rb, cb)| {
            cb.author_date
                .cmp(&ca.author_date)
                .then_with(|| ra.full_name.cmp(&rb.full_name))
        })
        .map(|(repo, commit)| LatestCommit { repo, commit })
}

/// Optional columns of the latest-commit table
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportColumns {
    pub repo: bool,
    pub hash: bool,
    pub stats: bool,
    pub url: bool,
    pub message: bool,
    pub message_length: bool,
}

impl ReportColumns {
    /// Header names in display order
    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec!["login", "name", "section", "date"];
        if self.repo {
            headers.push("repo");
        }
        if self.hash {
            headers.push("hash");
        }
        if self.stats {
            headers.extend(["additions", "deletions"]);
        }
        if self.url {
            headers.push("commit_url");
        }
        if self.message {
            headers.push("message");
        }
        if self.message_length {
            headers.push("message_length");
        }
        headers
    }
}

/// A cell value; numbers sort numerically
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(u64),
    Date(DateTime<Utc>),
    Empty,
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, |s| Cell::Text(s.to_string()))
    }

    fn render(&self, offset: &FixedOffset) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Date(d) => d.with_timezone(offset).format("%Y-%m-%d %H:%M:%S %:z").to_string(),
            Cell::Empty => String::new(),
        }
    }

    /// Empty cells sort after everything else
    fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Empty, Cell::Empty) => Ordering::Equal,
            (Cell::Empty, _) => Ordering::Greater,
            (_, Cell::Empty) => Ordering::Less,
            (Cell::Number(a), Cell::Number(b)) => a.cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (a, b) => a.render(&utc()).cmp(&b.render(&utc())),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// The roster with each student's latest commit
#[derive(Debug, Clone)]
pub struct LatestCommitTable {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl LatestCommitTable {
    /// Build one row per student, in roster order
    pub fn build(
        students: &[(RosterEntry, Option<LatestCommit>)],
        columns: &ReportColumns,
    ) -> Self {
        let headers = columns.headers();
        let rows = students
            .iter()
            .map(|(student, latest)| {
                let commit = latest.as_ref().map(|l| &l.commit);
                let stats = commit.and_then(|c| c.stats);
                headers
                    .iter()
                    .map(|header| match *header {
                        "login" => Cell::Text(student.login.clone()),
                        "name" => Cell::Text(student.name.clone()),
                        "section" => Cell::text(student.section.as_deref()),
                        "date" => commit.map_or(Cell::Empty, |c| Cell::Date(c.author_date)),
                        "repo" => Cell::text(latest.as_ref().map(|l| l.repo.full_name.as_str())),
                        "hash" => Cell::text(commit.map(|c| c.sha.as_str())),
                        "additions" => stats.map_or(Cell::Empty, |s| Cell::Number(s.additions)),
                        "deletions" => stats.map_or(Cell::Empty, |s| Cell::Number(s.deletions)),
                        "commit_url" => Cell::text(commit.map(|c| c.html_url.as_str())),
                        "message" => Cell::text(commit.map(|c| c.message.as_str())),
                        "message_length" => {
                            commit.map_or(Cell::Empty, |c| Cell::Number(c.message.chars().count() as u64))
                        }
                        _ => Cell::Empty,
                    })
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    /// Stable sort by a column; absent values go last
    pub fn sort_by(&mut self, column: &str) -> Result<()> {
        let index = self
            .headers
            .iter()
            .position(|h| *h == column)
            .ok_or_else(|| {
                ClassroomError::invalid_argument(format!(
                    "cannot order by '{}'; available columns: {}",
                    column,
                    self.headers.join(", ")
                ))
            })?;
        self.rows.sort_by(|a, b| a[index].compare(&b[index]));
        Ok(())
    }

    fn rendered_rows(&self, offset: &FixedOffset) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.render(offset)).collect())
            .collect()
    }

    /// Render as an aligned plain-text table. Messages are shown on their
    /// first line only; the full text is listed by [`Self::render_messages`].
    pub fn render(&self, offset: &FixedOffset) -> String {
        let rows: Vec<Vec<String>> = self
            .rendered_rows(offset)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.lines().next().unwrap_or("").to_string())
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let format_row = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut output = String::new();
        output.push_str(&format_row(self.headers.clone()));
        output.push('\n');
        for row in &rows {
            output.push_str(&format_row(row.iter().map(String::as_str).collect()));
            output.push('\n');
        }
        output
    }

    /// Full commit messages, one block per student
    pub fn render_messages(&self) -> Option<String> {
        let message = self.headers.iter().position(|h| *h == "message")?;
        let mut output = String::from("\nCommit Messages\n");
        for row in &self.rows {
            output.push_str(&"-".repeat(80));
            output.push('\n');
            output.push_str(&format!(
                "{} ({})\n\n",
                row[1].render(&utc()),
                row[0].render(&utc())
            ));
            output.push_str(&row[message].render(&utc()));
            output.push('\n');
        }
        Some(output)
    }

    /// Write as CSV
    pub fn write_csv(&self, path: &Path, offset: &FixedOffset) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in self.rendered_rows(offset) {
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD` into midnight UTC of that day,
/// missing parts defaulting to the first month or day.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let pattern = Regex::new(r"^(?P<year>\d{4})(?:-(?P<month>\d{1,2})(?:-(?P<day>\d{1,2}))?)?$")?;
    let invalid = || ClassroomError::invalid_argument(format!("invalid date '{}'", input));

    let captures = pattern.captures(input.trim()).ok_or_else(invalid)?;
    let number = |name: &str, default: u32| -> Result<u32> {
        captures
            .name(name)
            .map_or(Ok(default), |m| m.as_str().parse().map_err(|_| invalid()))
    };

    let year = number("year", 0)? as i32;
    let date = NaiveDate::from_ymd_opt(year, number("month", 1)?, number("day", 1)?)
        .ok_or_else(invalid)?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&midnight))
}
