//! Job configuration loading and validation.
//!
//! The document is JSON. Every problem is reported with the job and field it
//! was found in, and all of them are fatal before any job starts.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Month, NaiveTime, Weekday};
use miette::Diagnostic;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use psd_scheduler::{
    DayRule, FinishEdge, JobCommand, JobSpec, MonthDay, MonthRule, MonthValues, Recurrence,
    RepeatSpec, RepeatUnit, Schedule, SchedulerError, StartEdge,
};

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").unwrap());

const WEEKDAYS: &str = "mon, tue, wed, thu, fri, sat, sun";
const MONTHS: &str = "jan, feb, mar, apr, may, jun, jul, aug, sep, oct, nov, dec";

/// Errors from loading the configuration document.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read configuration file {}", path.display())]
    #[diagnostic(code(psd::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not valid JSON", path.display())]
    #[diagnostic(code(psd::config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("job '{job}': field '{field}' {problem}")]
    #[diagnostic(code(psd::config::field))]
    Field {
        job: String,
        field: String,
        problem: String,
    },

    #[error("job name '{0}' is used more than once")]
    #[diagnostic(
        code(psd::config::duplicate_name),
        help("every job needs a unique name")
    )]
    DuplicateName(String),

    /// A schedule that validates but cannot be resolved, e.g. day 31 in a
    /// 30-day month.
    #[error("invalid schedule")]
    #[diagnostic(code(psd::config::schedule))]
    Schedule(#[from] SchedulerError),
}

/// A loaded configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Default for each job's `shell` flag.
    pub is_shell: bool,
    pub wait_repeated: bool,
    pub log_file: Option<PathBuf>,
    pub jobs: Vec<JobSpec>,
}

/// Read and validate the document at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let document = read_json(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_document(&document, base)
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate a parsed document; `{"file": ...}` job entries resolve against `base`.
pub fn parse_document(document: &Value, base: &Path) -> Result<Config, ConfigError> {
    let root = document.as_object().ok_or_else(|| ConfigError::Field {
        job: "-".to_string(),
        field: "<document>".to_string(),
        problem: "must be a JSON object".to_string(),
    })?;
    let top = Fields::new("-", "");

    let is_shell = top.opt_bool(root, "is_shell")?.unwrap_or(true);
    let wait_repeated = top.opt_bool(root, "wait_repeated")?.unwrap_or(false);
    let log_file = top.opt_str(root, "log_file")?.map(PathBuf::from);

    let entries = match root.get("jobs") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(_) => return Err(top.error("jobs", "must be an array")),
        None => return Err(top.error("jobs", "is missing")),
    };

    let mut names = HashSet::new();
    let mut jobs = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let job = load_entry(entry, index, base, is_shell)?;
        if !names.insert(job.name.clone()) {
            return Err(ConfigError::DuplicateName(job.name));
        }
        debug!(job = %job.name, command = %job.command.display(), "loaded job");
        jobs.push(job);
    }

    Ok(Config {
        is_shell,
        wait_repeated,
        log_file,
        jobs,
    })
}

/// A job entry is either an inline job object or `{"file": path}`.
fn load_entry(
    entry: &Value,
    index: usize,
    base: &Path,
    default_shell: bool,
) -> Result<JobSpec, ConfigError> {
    let label = format!("#{}", index + 1);
    let obj = entry
        .as_object()
        .ok_or_else(|| Fields::new(&label, "").error("jobs", "entries must be objects"))?;

    match obj.get("file") {
        Some(Value::String(file)) => {
            let path = base.join(file);
            let document = read_json(&path)?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
            let job = document
                .as_object()
                .ok_or_else(|| Fields::new(&label, "").error("file", "must contain a JSON object"))?;
            parse_job(job, &label, stem, default_shell)
        }
        Some(_) => Err(Fields::new(&label, "").error("file", "must be a string")),
        None => parse_job(obj, &label, None, default_shell),
    }
}

fn parse_job(
    obj: &Map<String, Value>,
    label: &str,
    fallback_name: Option<String>,
    default_shell: bool,
) -> Result<JobSpec, ConfigError> {
    let name = match (Fields::new(label, "").opt_str(obj, "name")?, fallback_name) {
        (Some(name), _) if !name.is_empty() => name.to_string(),
        (Some(_), _) => return Err(Fields::new(label, "").error("name", "must not be empty")),
        (None, Some(stem)) => stem,
        (None, None) => return Err(Fields::new(label, "").error("name", "is missing")),
    };
    let fields = Fields::new(&name, "");

    let shell = fields.opt_bool(obj, "shell")?.unwrap_or(default_shell);
    let command = parse_command(&fields, obj, shell)?;

    let schedule = fields.object(obj, "schedule")?;
    let schedule_fields = fields.nested("schedule");
    let start = parse_start(&schedule_fields, schedule_fields.object(schedule, "start")?)?;
    let finish = parse_finish(&schedule_fields, schedule_fields.object(schedule, "finish")?)?;

    let repeat = match obj.get("repeat") {
        Some(Value::Object(repeat)) => Some(parse_repeat(&fields.nested("repeat"), repeat)?),
        Some(_) => return Err(fields.error("repeat", "must be an object")),
        None => None,
    };

    Ok(JobSpec {
        name,
        command,
        schedule: Schedule::new(start, finish),
        repeat,
    })
}

fn parse_command(
    fields: &Fields<'_>,
    obj: &Map<String, Value>,
    shell: bool,
) -> Result<JobCommand, ConfigError> {
    let parts: Vec<String> = match obj.get("cmd") {
        Some(Value::String(line)) if shell => vec![line.clone()],
        Some(Value::String(line)) => line.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| fields.error("cmd", "must contain only strings"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(fields.error("cmd", "must be a string or an array of strings")),
        None => return Err(fields.error("cmd", "is missing")),
    };

    if parts.iter().all(|p| p.trim().is_empty()) {
        return Err(fields.error("cmd", "must not be empty"));
    }
    Ok(if shell {
        JobCommand::Shell(parts.join(" "))
    } else {
        JobCommand::Argv(parts)
    })
}

fn parse_start(fields: &Fields<'_>, edge: &Map<String, Value>) -> Result<StartEdge, ConfigError> {
    let fields = fields.nested("start");
    if edge.get("time").and_then(Value::as_str) == Some("now") && !edge.contains_key("month") {
        return Ok(StartEdge::Now);
    }
    let recurrence = parse_recurrence(&fields, edge)?;
    let when_finished = fields.opt_bool(edge, "when_finished")?.unwrap_or(false);
    Ok(StartEdge::At {
        recurrence,
        when_finished,
    })
}

fn parse_finish(fields: &Fields<'_>, edge: &Map<String, Value>) -> Result<FinishEdge, ConfigError> {
    let fields = fields.nested("finish");
    if edge.get("time").and_then(Value::as_str) == Some("never") && !edge.contains_key("month") {
        return Ok(FinishEdge::Never);
    }
    parse_recurrence(&fields, edge).map(FinishEdge::At)
}

fn parse_recurrence(
    fields: &Fields<'_>,
    edge: &Map<String, Value>,
) -> Result<Recurrence, ConfigError> {
    if let Some(month) = edge.get("month") {
        let month = month
            .as_object()
            .ok_or_else(|| fields.error("month", "must be an object"))?;
        let edge_time = edge.get("time").and_then(Value::as_str);
        return parse_month_rule(&fields.nested("month"), month, edge_time).map(Recurrence::Months);
    }

    let time = parse_time(fields, "time", fields.str(edge, "time")?)?;
    let day = match edge.get("day") {
        None => DayRule::default(),
        Some(Value::String(name)) => DayRule::Weekday(
            parse_weekday(name)
                .ok_or_else(|| fields.error("day", format!("must be a day of week ({WEEKDAYS}), found '{name}'")))?,
        ),
        Some(Value::Number(n)) => DayRule::Offset(
            n.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| fields.error("day", "must be a non-negative integer"))?,
        ),
        Some(_) => return Err(fields.error("day", "must be an integer or a day of week")),
    };
    Ok(Recurrence::Days { time, day })
}

fn parse_month_rule(
    fields: &Fields<'_>,
    rule: &Map<String, Value>,
    edge_time: Option<&str>,
) -> Result<MonthRule, ConfigError> {
    let values = match rule.get("value") {
        Some(Value::String(name)) => MonthValues::Named(
            parse_month(name)
                .ok_or_else(|| fields.error("value", format!("must be a month ({MONTHS}), found '{name}'")))?,
        ),
        Some(Value::Number(n)) => MonthValues::Interval(
            n.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n >= 1)
                .ok_or_else(|| fields.error("value", "must be a positive month interval"))?,
        ),
        Some(Value::Array(names)) => {
            let months = names
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(parse_month)
                        .ok_or_else(|| fields.error("value", format!("must list months ({MONTHS})")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let ascending = months
                .windows(2)
                .all(|w| w[0].number_from_month() < w[1].number_from_month());
            if months.is_empty() || !ascending {
                return Err(fields.error("value", "must list months in strictly ascending order"));
            }
            MonthValues::Cycle(months)
        }
        Some(_) => return Err(fields.error("value", "must be a month name, an interval or a list of months")),
        None => return Err(fields.error("value", "is missing")),
    };

    let day = match rule.get("day") {
        Some(Value::Number(n)) => MonthDay::Date(
            n.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|d| (1..=31).contains(d))
                .ok_or_else(|| fields.error("day", "must be a day of month between 1 and 31"))?,
        ),
        Some(Value::String(name)) => {
            let weekday = parse_weekday(name)
                .ok_or_else(|| fields.error("day", format!("must be a day of week ({WEEKDAYS}), found '{name}'")))?;
            let each = match rule.get("each") {
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| (1..=5).contains(n))
                    .ok_or_else(|| fields.error("each", "must be between 1 and 5"))?,
                None => return Err(fields.error("each", "is required with a day of week")),
            };
            MonthDay::Weekday { weekday, each }
        }
        Some(_) => return Err(fields.error("day", "must be a day of month or a day of week")),
        None => return Err(fields.error("day", "is missing")),
    };

    let time = match (rule.get("time"), edge_time) {
        (Some(Value::String(time)), _) => parse_time(fields, "time", time)?,
        (Some(_), _) => return Err(fields.error("time", "must be a string")),
        (None, Some(time)) => parse_time(fields, "time", time)?,
        (None, None) => return Err(fields.error("time", "is missing")),
    };

    Ok(MonthRule { values, day, time })
}

fn parse_repeat(fields: &Fields<'_>, repeat: &Map<String, Value>) -> Result<RepeatSpec, ConfigError> {
    let unit = match fields.str(repeat, "unit")? {
        "s" => RepeatUnit::Seconds,
        "m" => RepeatUnit::Minutes,
        "h" => RepeatUnit::Hours,
        other => {
            return Err(fields.error("unit", format!("must be one of s, m, h, found '{other}'")));
        }
    };
    let value = match repeat.get("val") {
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| fields.error("val", "must be a positive integer"))?,
        None => return Err(fields.error("val", "is missing")),
    };
    let wait_finished = fields
        .opt_bool(repeat, "wait_finished")?
        .ok_or_else(|| fields.error("wait_finished", "is missing"))?;
    Ok(RepeatSpec::new(unit, value, wait_finished))
}

fn parse_time(fields: &Fields<'_>, field: &str, text: &str) -> Result<NaiveTime, ConfigError> {
    if !TIME_RE.is_match(text) {
        return Err(fields.error(field, format!("has wrong pattern, expected HH:MM, found '{text}'")));
    }
    NaiveTime::parse_from_str(text, "%H:%M")
        .map_err(|_| fields.error(field, format!("is not a valid time of day: '{text}'")))
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    Some(match name {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    })
}

fn parse_month(name: &str) -> Option<Month> {
    Some(match name {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    })
}

/// Field access that reports errors against a job and a dotted field path.
struct Fields<'a> {
    job: &'a str,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn new(job: &'a str, prefix: &str) -> Self {
        Self {
            job,
            prefix: prefix.to_string(),
        }
    }

    fn nested(&self, field: &str) -> Fields<'a> {
        Fields {
            job: self.job,
            prefix: self.path(field),
        }
    }

    fn path(&self, field: &str) -> String {
        if self.prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.prefix, field)
        }
    }

    fn error(&self, field: &str, problem: impl Into<String>) -> ConfigError {
        ConfigError::Field {
            job: self.job.to_string(),
            field: self.path(field),
            problem: problem.into(),
        }
    }

    fn str<'v>(&self, obj: &'v Map<String, Value>, field: &str) -> Result<&'v str, ConfigError> {
        match obj.get(field) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(self.error(field, "must be a string")),
            None => Err(self.error(field, "is missing")),
        }
    }

    fn opt_str<'v>(
        &self,
        obj: &'v Map<String, Value>,
        field: &str,
    ) -> Result<Option<&'v str>, ConfigError> {
        match obj.get(field) {
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.error(field, "must be a string")),
            None => Ok(None),
        }
    }

    fn opt_bool(&self, obj: &Map<String, Value>, field: &str) -> Result<Option<bool>, ConfigError> {
        match obj.get(field) {
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.error(field, "must be a boolean")),
            None => Ok(None),
        }
    }

    fn object<'v>(
        &self,
        obj: &'v Map<String, Value>,
        field: &str,
    ) -> Result<&'v Map<String, Value>, ConfigError> {
        match obj.get(field) {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(self.error(field, "must be an object")),
            None => Err(self.error(field, "is missing")),
        }
    }
}
