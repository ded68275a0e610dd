//! Job management commands operating on the file store.
use std::io::Write;

use anyhow::{Context, bail};
use clap::ValueEnum;
use time::{Duration, OffsetDateTime, macros::format_description};
use tracing::info;

use crontab_core::FileJobStore;
use crontab_model::{Job, JobId, JobPatch, NewJob};

/// Columns `list` can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Column {
    #[value(name = "nr")]
    Number,
    #[value(name = "id")]
    Id,
    #[value(name = "exp")]
    Expression,
    #[value(name = "cmd")]
    Command,
    #[value(name = "typ")]
    Type,
    #[value(name = "act")]
    Active,
    #[value(name = "sta")]
    Status,
    #[value(name = "srt")]
    Started,
    #[value(name = "end")]
    Ended,
    #[value(name = "dur")]
    Duration,
    #[value(name = "com")]
    Comment,
    #[value(name = "cre")]
    Created,
    #[value(name = "upd")]
    Updated,
}

impl Column {
    pub const DEFAULT: [Column; 10] = [
        Column::Number,
        Column::Id,
        Column::Expression,
        Column::Command,
        Column::Type,
        Column::Active,
        Column::Status,
        Column::Started,
        Column::Ended,
        Column::Duration,
    ];

    fn header(self) -> &'static str {
        match self {
            Column::Number => "#",
            Column::Id => "Id",
            Column::Expression => "Expression",
            Column::Command => "Command",
            Column::Type => "Type",
            Column::Active => "Active",
            Column::Status => "Status",
            Column::Started => "Started at",
            Column::Ended => "Ended at",
            Column::Duration => "Duration",
            Column::Comment => "Comment",
            Column::Created => "Created at",
            Column::Updated => "Updated at",
        }
    }

    fn cell(self, position: usize, job: &Job) -> String {
        match self {
            Column::Number => (position + 1).to_string(),
            Column::Id => job.id.to_string(),
            Column::Expression => job.expression.as_str().to_string(),
            Column::Command => job.command.clone(),
            Column::Type => job.job_type.to_string(),
            Column::Active => String::from(if job.active { "yes" } else { "no" }),
            Column::Status => job.status.label().to_string(),
            Column::Started => stamp(job.started_at),
            Column::Ended => stamp(job.ended_at),
            Column::Duration => job.duration().map_or_else(|| UNKNOWN.to_string(), clock),
            Column::Comment => job.comment.clone().unwrap_or_default(),
            Column::Created => stamp(Some(job.created_at)),
            Column::Updated => stamp(job.updated_at),
        }
    }
}

const UNKNOWN: &str = "-";

/// Print `columns` of every job as an aligned table.
pub fn list(store: &FileJobStore, columns: &[Column], out: &mut impl Write) -> anyhow::Result<()> {
    let jobs = store.jobs()?;

    let header: Vec<String> = columns.iter().map(|c| c.header().to_string()).collect();
    let rows: Vec<Vec<String>> = jobs
        .iter()
        .enumerate()
        .map(|(n, job)| columns.iter().map(|c| c.cell(n, job)).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    write_row(out, &header, &widths)?;
    for row in &rows {
        write_row(out, row, &widths)?;
    }
    if jobs.is_empty() {
        writeln!(out, "no jobs")?;
    }
    Ok(())
}

fn write_row(out: &mut impl Write, cells: &[String], widths: &[usize]) -> std::io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{}", line.trim_end())
}

pub fn insert(store: &FileJobStore, new: NewJob, out: &mut impl Write) -> anyhow::Result<Job> {
    if new.command.trim().is_empty() {
        bail!("command must not be empty");
    }
    let job = store.insert_job(new)?;
    info!(job_id = %job.id, "job inserted");
    writeln!(out, "inserted {}", job.id)?;
    Ok(job)
}

pub fn update(
    store: &FileJobStore,
    id: &JobId,
    patch: JobPatch,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    if patch.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
        bail!("command must not be empty");
    }
    let updated = store
        .update_job(id, patch)
        .with_context(|| format!("updating job {id}"))?;
    if updated {
        info!(job_id = %id, "job updated");
        writeln!(out, "updated {id}")?;
    } else {
        writeln!(out, "{id} not updated: nothing changed")?;
    }
    Ok(updated)
}

pub fn delete(store: &FileJobStore, id: &JobId, out: &mut impl Write) -> anyhow::Result<()> {
    if !store.delete_job(id)? {
        bail!("job not found: {id}");
    }
    info!(job_id = %id, "job deleted");
    writeln!(out, "deleted {id}")?;
    Ok(())
}

pub fn export(store: &FileJobStore, out: &mut impl Write) -> anyhow::Result<()> {
    let jobs = store.jobs()?;
    serde_json::to_writer_pretty(&mut *out, &jobs)?;
    writeln!(out)?;
    Ok(())
}

fn stamp(at: Option<OffsetDateTime>) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.and_then(|at| at.format(format).ok())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// `HH:MM:SS`; hours are not wrapped at a day.
fn clock(elapsed: Duration) -> String {
    let secs = elapsed.whole_seconds();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crontab_model::{JobStatus, JobType};
    use time::{UtcOffset, macros::datetime};

    fn new_job(command: &str) -> NewJob {
        NewJob {
            expression: "@hourly".parse().unwrap(),
            command: command.to_string(),
            job_type: JobType::default(),
            active: true,
            comment: Some("nightly cleanup".into()),
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn insert_then_list() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let mut sink = Vec::new();
        let job = insert(&store, new_job("echo hi"), &mut sink).unwrap();
        assert_eq!(output(sink), format!("inserted {}\n", job.id));

        let mut table = Vec::new();
        list(&store, &Column::DEFAULT, &mut table).unwrap();
        let table = output(table);
        let mut lines = table.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("#  Id"));
        assert!(header.contains("Expression"));
        assert!(!header.contains("Comment"));

        let row = lines.next().unwrap();
        assert!(row.starts_with("1  "));
        assert!(row.contains(job.id.as_str()));
        assert!(row.contains("echo hi"));
        assert!(row.contains("pending"));
        assert!(row.ends_with('-'));
    }

    #[test]
    fn list_shows_only_selected_columns() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let job = insert(&store, new_job("echo hi"), &mut Vec::new()).unwrap();

        let mut table = Vec::new();
        list(&store, &[Column::Id, Column::Comment], &mut table).unwrap();
        let table = output(table);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Id"));
        assert!(lines[0].ends_with("Comment"));
        assert_eq!(lines[1], format!("{:<12}  nightly cleanup", job.id.as_str()));
        assert!(!table.contains("echo hi"));
    }

    #[test]
    fn timestamps_and_durations_are_readable() {
        let mut job = Job::new(
            new_job("true"),
            JobId::from("abc123def456"),
            datetime!(2024-05-01 09:00 UTC),
        );
        job.mark_started(datetime!(2024-05-01 10:00 UTC));
        job.mark_ended(datetime!(2024-05-02 11:02:03 UTC));

        assert_eq!(Column::Created.cell(0, &job), "2024-05-01 09:00:00");
        assert_eq!(Column::Ended.cell(0, &job), "2024-05-02 11:02:03");
        assert_eq!(Column::Duration.cell(0, &job), "25:02:03");
        assert_eq!(Column::Updated.cell(0, &job), "-");
        assert_eq!(Column::Number.cell(4, &job), "5");
    }

    #[test]
    fn empty_list_says_so() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let mut table = Vec::new();
        list(&store, &Column::DEFAULT, &mut table).unwrap();
        assert!(output(table).ends_with("no jobs\n"));
    }

    #[test]
    fn blank_command_is_refused() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        assert!(insert(&store, new_job("   "), &mut Vec::new()).is_err());
        assert!(store.jobs().unwrap().is_empty());
    }

    #[test]
    fn update_reports_no_change() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let job = insert(&store, new_job("echo hi"), &mut Vec::new()).unwrap();

        let mut sink = Vec::new();
        assert!(!update(&store, &job.id, JobPatch::default(), &mut sink).unwrap());
        assert!(output(sink).contains("not updated"));

        let patch = JobPatch {
            active: Some(false),
            ..Default::default()
        };
        assert!(update(&store, &job.id, patch, &mut Vec::new()).unwrap());
        let stored = store.job(&job.id).unwrap();
        assert!(!stored.active);
        assert!(stored.updated_at.is_some());
    }

    #[test]
    fn update_and_delete_of_unknown_id_fail() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let ghost = JobId::from("ghost");
        let patch = JobPatch {
            command: Some("true".into()),
            ..Default::default()
        };
        assert!(update(&store, &ghost, patch, &mut Vec::new()).is_err());
        assert!(delete(&store, &ghost, &mut Vec::new()).is_err());
    }

    #[test]
    fn delete_removes_job() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let job = insert(&store, new_job("echo hi"), &mut Vec::new()).unwrap();
        delete(&store, &job.id, &mut Vec::new()).unwrap();
        assert!(store.jobs().unwrap().is_empty());
    }

    #[test]
    fn export_is_json() {
        let store = FileJobStore::in_memory(UtcOffset::UTC);
        let job = insert(&store, new_job("echo hi"), &mut Vec::new()).unwrap();

        let mut sink = Vec::new();
        export(&store, &mut sink).unwrap();
        let exported: Vec<Job> = serde_json::from_slice(&sink).unwrap();

        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].id, job.id);
        assert_eq!(exported[0].status, JobStatus::Pending);
        assert_eq!(exported[0].comment.as_deref(), Some("nightly cleanup"));
    }
}
