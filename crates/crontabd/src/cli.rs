use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crontab_model::{JobId, JobType, Schedule, parse_active};

use crate::commands::Column;

#[derive(Parser, Debug)]
#[command(name = "crontabd", about = "Crontab-style job worker", version)]
pub struct Cli {
    /// Configuration file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "crontab.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scheduling loop for one job type until signalled.
    Worker {
        #[arg(short = 't', long = "type", default_value = "single")]
        job_type: JobType,
    },
    /// Print all jobs as a table.
    List {
        /// Columns to show; repeat the flag or separate with commas.
        #[arg(
            long,
            value_enum,
            value_delimiter = ',',
            default_values = ["nr", "id", "exp", "cmd", "typ", "act", "sta", "srt", "end", "dur"]
        )]
        columns: Vec<Column>,
    },
    /// Add a job.
    Insert {
        /// Five-field cron expression or macro such as `@hourly`.
        #[arg(short = 'x', long)]
        expression: Schedule,
        #[arg(short, long)]
        command: String,
        #[arg(short = 't', long = "type", default_value = "single")]
        job_type: JobType,
        /// yes/no, true/false, 1/0.
        #[arg(short, long, default_value = "yes", value_parser = parse_active, action = ArgAction::Set)]
        active: bool,
        #[arg(short = 'o', long)]
        comment: Option<String>,
    },
    /// Change fields of an existing job.
    Update {
        #[arg(short, long, value_parser = parse_id)]
        id: JobId,
        #[arg(short = 'x', long)]
        expression: Option<Schedule>,
        #[arg(short, long)]
        command: Option<String>,
        #[arg(short = 't', long = "type")]
        job_type: Option<JobType>,
        #[arg(short, long, value_parser = parse_active, action = ArgAction::Set)]
        active: Option<bool>,
        #[arg(short = 'o', long)]
        comment: Option<String>,
    },
    /// Remove a job.
    Delete {
        #[arg(short, long, value_parser = parse_id)]
        id: JobId,
    },
    /// Dump all jobs as JSON.
    Export,
}

fn parse_id(raw: &str) -> Result<JobId, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("id must not be empty".into());
    }
    Ok(JobId::from(raw))
}
