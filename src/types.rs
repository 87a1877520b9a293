use crate::grid::{Region, SamplingGrid};
use crate::mesh::MeshError;
use crate::time_integrator::{HeightSteps, Schedule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Option file contents. Keys are camelCase in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub geometry_file: PathBuf,
    pub steps_v1: usize,
    pub steps_v2: usize,
    #[serde(default)]
    pub nr_of_threads: usize,
    pub region_o: String,
    pub region_v1: String,
    pub region_v2: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: f64,
    #[serde(default)]
    pub geometry_rotation: f64,
    pub mode: String,
    pub max_height: f64,
    pub height_incr: f64,
    pub output_path: PathBuf,
    pub date: DateConfig,
    #[serde(default)]
    pub day_range: DayRange,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DateConfig {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ShadowError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ShadowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn get_cpu_cores(&self) -> usize {
        if self.nr_of_threads == 0 {
            num_cpus::get()
        } else {
            self.nr_of_threads
        }
    }

    pub fn mode(&self) -> Result<Mode, ShadowError> {
        self.mode.parse()
    }

    pub fn region(&self) -> Result<Region, ShadowError> {
        Region::parse(&self.region_o, &self.region_v1, &self.region_v2)
    }

    pub fn grid(&self) -> Result<SamplingGrid, ShadowError> {
        SamplingGrid::new(self.region()?, self.steps_v1, self.steps_v2)
    }

    pub fn heights(&self) -> Result<HeightSteps, ShadowError> {
        HeightSteps::new(self.max_height, self.height_incr)
    }

    /// Resolves the mode and its date fields into a time schedule.
    pub fn schedule(&self) -> Result<Schedule, ShadowError> {
        Schedule::from_date(self.mode()?, &self.date)
    }
}

/// Time-integration strategy, selected by name in the option file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    GrowSeason,
    Monthly,
    SpecificMoment,
    Hourly,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::GrowSeason => "growseason",
            Mode::Monthly => "monthly",
            Mode::SpecificMoment => "specificmoment",
            Mode::Hourly => "hourly",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mode::GrowSeason => "average daily sun exposure over the growing season",
            Mode::Monthly => "average daily sun exposure for every month",
            Mode::SpecificMoment => "sun exposure at a specific moment",
            Mode::Hourly => "average sun exposure for every hour",
        }
    }
}

impl FromStr for Mode {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "growseason" => Ok(Mode::GrowSeason),
            "monthly" => Ok(Mode::Monthly),
            "specificmoment" => Ok(Mode::SpecificMoment),
            "hourly" => Ok(Mode::Hourly),
            other => Err(ShadowError::Config(format!(
                "{} is not a valid mode (expected growseason|monthly|specificmoment|hourly)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which days of a month the monthly and growing-season schedules sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayRange {
    /// Days 1..=30 of every month, regardless of its real length.
    #[default]
    Fixed,
    /// Days 1..=last day of the month, leap years included.
    Calendar,
}

impl DayRange {
    pub const FIXED_DAYS: u32 = 30;

    pub fn days(self, year: i32, month: u32) -> std::ops::RangeInclusive<u32> {
        match self {
            DayRange::Fixed => 1..=Self::FIXED_DAYS,
            DayRange::Calendar => 1..=days_in_month(year, month),
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    use chrono::NaiveDate;

    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(first), Some(next)) => next.signed_duration_since(first).num_days() as u32,
        _ => DayRange::FIXED_DAYS,
    }
}

/// Civil date and time in the configured timezone. Not checked against a
/// calendar: day 31 of a 30-day month is evaluated as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl GeoTime {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    /// Local clock time in fractional hours.
    pub fn decimal_hour(&self) -> f64 {
        self.hour as f64 + self.minute as f64 / 60.0
    }
}

impl fmt::Display for GeoTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse option file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Mesh unavailable: {0}")]
    Mesh(#[from] MeshError),
    #[error("Was not able to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to shape shadow map: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
