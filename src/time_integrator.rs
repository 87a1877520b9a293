use crate::raster_io::{artifact_name, ResultSink};
use crate::shadow_engine::ShadowEngine;
use crate::sun_position::SunCalculator;
use crate::types::{DateConfig, DayRange, GeoTime, Mode, ShadowError};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Converts a mean coverage fraction into equivalent sun-hours per day.
pub const HOURS_PER_DAY: f64 = 24.0;
/// May through September.
pub const GROWING_SEASON: RangeInclusive<u32> = 5..=9;
/// Minute step of the monthly and growing-season schedules.
pub const COARSE_STEP_MINUTES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Completed fraction in [0, 1].
    pub progress: f64,
    pub current_step: String,
    pub total_steps: usize,
    pub current_step_number: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub buckets: usize,
    pub written: usize,
    pub skipped: usize,
}

/// Heights `0, inc, 2·inc, …` strictly below `max_height`, computed from an
/// integer step index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSteps {
    max_height: f64,
    increment: f64,
}

impl HeightSteps {
    pub fn new(max_height: f64, increment: f64) -> Result<Self, ShadowError> {
        if !(increment > 0.0 && increment.is_finite()) {
            return Err(ShadowError::Config(format!(
                "heightIncr must be a positive number, got {}",
                increment
            )));
        }
        if !(max_height > 0.0 && max_height.is_finite()) {
            return Err(ShadowError::Config(format!(
                "maxHeight must be a positive number, got {}",
                max_height
            )));
        }
        Ok(Self {
            max_height,
            increment,
        })
    }

    pub fn iter(self) -> impl Iterator<Item = f64> {
        (0usize..)
            .map(move |k| k as f64 * self.increment)
            .take_while(move |h| *h < self.max_height)
    }

    pub fn step_count(&self) -> usize {
        self.iter().count()
    }
}

/// Time-sampling plan of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    SpecificMoment(GeoTime),
    Hourly { year: i32, month: u32, day: u32 },
    Monthly { year: i32 },
    GrowSeason { year: i32 },
}

impl Schedule {
    /// Picks the date fields `mode` needs; missing ones are a configuration
    /// error.
    pub fn from_date(mode: Mode, date: &DateConfig) -> Result<Self, ShadowError> {
        let require = |value: Option<u32>, field: &str| {
            value.ok_or_else(|| {
                ShadowError::Config(format!("date.{} is required for mode {}", field, mode))
            })
        };

        Ok(match mode {
            Mode::SpecificMoment => Schedule::SpecificMoment(GeoTime::new(
                date.year,
                require(date.month, "month")?,
                require(date.day, "day")?,
                require(date.hour, "hour")?,
                require(date.minute, "minute")?,
            )),
            Mode::Hourly => Schedule::Hourly {
                year: date.year,
                month: require(date.month, "month")?,
                day: require(date.day, "day")?,
            },
            Mode::Monthly => Schedule::Monthly { year: date.year },
            Mode::GrowSeason => Schedule::GrowSeason { year: date.year },
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            Schedule::SpecificMoment(_) => Mode::SpecificMoment,
            Schedule::Hourly { .. } => Mode::Hourly,
            Schedule::Monthly { .. } => Mode::Monthly,
            Schedule::GrowSeason { .. } => Mode::GrowSeason,
        }
    }

    /// Output units in the order they are computed and written.
    pub fn buckets(&self, heights: HeightSteps) -> Vec<Bucket> {
        let at_heights = |kind: BucketKind| {
            heights
                .iter()
                .enumerate()
                .map(move |(height_index, height)| Bucket {
                    kind,
                    height,
                    height_index,
                })
        };

        match *self {
            Schedule::SpecificMoment(time) => at_heights(BucketKind::Moment(time)).collect(),
            Schedule::Hourly { year, month, day } => (0..24)
                .flat_map(|hour| {
                    at_heights(BucketKind::Hour {
                        year,
                        month,
                        day,
                        hour,
                    })
                })
                .collect(),
            Schedule::Monthly { year } => (1..=12)
                .flat_map(|month| at_heights(BucketKind::Month { year, month }))
                .collect(),
            Schedule::GrowSeason { year } => at_heights(BucketKind::GrowSeason { year }).collect(),
        }
    }
}

/// How an accumulated sum becomes a reportable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// The single sample, unscaled.
    Instantaneous,
    /// `24 · sum / count`.
    SunHours,
}

impl Normalization {
    pub fn apply(self, sum: Array2<f64>, count: usize) -> Array2<f64> {
        match self {
            Normalization::Instantaneous => sum,
            Normalization::SunHours if count == 0 => sum,
            Normalization::SunHours => {
                let n = count as f64;
                sum.mapv_into(|s| HOURS_PER_DAY * s / n)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Moment(GeoTime),
    Hour {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    },
    Month {
        year: i32,
        month: u32,
    },
    GrowSeason {
        year: i32,
    },
}

impl BucketKind {
    pub fn mode(&self) -> Mode {
        match self {
            BucketKind::Moment(_) => Mode::SpecificMoment,
            BucketKind::Hour { .. } => Mode::Hourly,
            BucketKind::Month { .. } => Mode::Monthly,
            BucketKind::GrowSeason { .. } => Mode::GrowSeason,
        }
    }

    pub fn normalization(&self) -> Normalization {
        match self {
            BucketKind::Moment(_) => Normalization::Instantaneous,
            _ => Normalization::SunHours,
        }
    }

    /// Every moment that contributes to this bucket.
    pub fn samples(&self, day_range: DayRange) -> Vec<GeoTime> {
        match *self {
            BucketKind::Moment(time) => vec![time],
            BucketKind::Hour {
                year,
                month,
                day,
                hour,
            } => (0..60)
                .map(|minute| GeoTime::new(year, month, day, hour, minute))
                .collect(),
            BucketKind::Month { year, month } => month_samples(year, month, day_range),
            BucketKind::GrowSeason { year } => GROWING_SEASON
                .flat_map(|month| month_samples(year, month, day_range))
                .collect(),
        }
    }
}

fn month_samples(year: i32, month: u32, day_range: DayRange) -> Vec<GeoTime> {
    let mut samples = Vec::new();
    for day in day_range.days(year, month) {
        for hour in 0..24 {
            for minute in (0..60).step_by(COARSE_STEP_MINUTES) {
                samples.push(GeoTime::new(year, month, day, hour, minute));
            }
        }
    }
    samples
}

/// One output artifact: a time bucket evaluated at one height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub kind: BucketKind,
    pub height: f64,
    pub height_index: usize,
}

/// Running per-cell sum of shadow maps.
#[derive(Debug, Clone)]
pub struct Accumulator {
    sum: Array2<f64>,
    count: usize,
}

impl Accumulator {
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            sum: Array2::zeros(dim),
            count: 0,
        }
    }

    pub fn add(&mut self, map: &Array2<f64>) {
        self.sum += map;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self, normalization: Normalization) -> Array2<f64> {
        normalization.apply(self.sum, self.count)
    }
}

/// Drives the [`ShadowEngine`] over a [`Schedule`] and hands each finished
/// bucket to a [`ResultSink`]. Buckets are processed strictly in order.
pub struct TimeIntegrator<'a> {
    engine: ShadowEngine<'a>,
    sun: SunCalculator,
    heights: HeightSteps,
    day_range: DayRange,
    show_progress_bar: bool,
    observer: Option<Box<dyn Fn(&ProgressUpdate) + 'a>>,
}

impl<'a> TimeIntegrator<'a> {
    pub fn new(engine: ShadowEngine<'a>, sun: SunCalculator, heights: HeightSteps) -> Self {
        Self {
            engine,
            sun,
            heights,
            day_range: DayRange::default(),
            show_progress_bar: false,
            observer: None,
        }
    }

    pub fn with_day_range(mut self, day_range: DayRange) -> Self {
        self.day_range = day_range;
        self
    }

    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    pub fn with_progress_observer(mut self, observer: impl Fn(&ProgressUpdate) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn engine(&self) -> &ShadowEngine<'a> {
        &self.engine
    }

    fn emit_progress(&self, progress: f64, step: String, total_steps: usize, current_step: usize) {
        if let Some(observer) = &self.observer {
            observer(&ProgressUpdate {
                progress,
                current_step: step,
                total_steps,
                current_step_number: current_step,
            });
        }
    }

    /// Accumulates the shadow maps of every sample in `bucket` and normalises
    /// the sum.
    pub fn integrate(&self, bucket: &Bucket) -> Result<Array2<f64>, ShadowError> {
        let samples = bucket.kind.samples(self.day_range);
        let mut accumulator = Accumulator::new(self.engine.grid().dim());
        let mut below_horizon = 0;

        for time in &samples {
            let sun = self.sun.direction(time);
            if !sun.is_above_horizon() {
                below_horizon += 1;
            }
            let map = self.engine.calculate_shadow_map(&sun, bucket.height)?;
            accumulator.add(&map);
        }

        log::debug!(
            "{:?} at height {:.2}: {} samples, {} with the sun below the horizon",
            bucket.kind,
            bucket.height,
            accumulator.count(),
            below_horizon
        );
        Ok(accumulator.finish(bucket.kind.normalization()))
    }

    pub fn run(
        &self,
        schedule: &Schedule,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, ShadowError> {
        let mode = schedule.mode();
        let buckets = schedule.buckets(self.heights);
        let total = buckets.len();
        log::info!(
            "Computing {} ({} buckets, {} heights)",
            mode.description(),
            total,
            self.heights.step_count()
        );
        self.log_sun_context(schedule);

        sink.prepare(mode)?;

        let pb = if self.show_progress_bar {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style);
        }

        self.emit_progress(0.0, "Initializing shadow calculation...".to_string(), total, 0);

        let mut summary = RunSummary {
            buckets: total,
            ..RunSummary::default()
        };
        for (idx, bucket) in buckets.iter().enumerate() {
            let map = self.integrate(bucket)?;

            match sink.write(bucket, &map) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    log::error!("Could not write {}: {}", artifact_name(bucket), e);
                    summary.skipped += 1;
                }
            }

            pb.set_position(idx as u64 + 1);
            self.emit_progress(
                (idx + 1) as f64 / total as f64,
                format!("Calculated {}", artifact_name(bucket)),
                total,
                idx + 1,
            );
        }

        pb.finish_with_message("Shadow calculation complete");
        Ok(summary)
    }

    fn log_sun_context(&self, schedule: &Schedule) {
        match *schedule {
            Schedule::SpecificMoment(time) => {
                let sun = self.sun.direction(&time);
                log::info!(
                    "Sun at {}: azimuth {:.1}°, altitude {:.1}°, day length {:.2} h",
                    time,
                    sun.azimuth.to_degrees(),
                    sun.altitude.to_degrees(),
                    self.sun.day_length(&time)
                );
            }
            Schedule::Hourly { year, month, day } => {
                let time = GeoTime::new(year, month, day, 12, 0);
                log::info!(
                    "Day length on {:04}-{:02}-{:02}: {:.2} h",
                    year,
                    month,
                    day,
                    self.sun.day_length(&time)
                );
            }
            Schedule::Monthly { .. } | Schedule::GrowSeason { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Region, SamplingGrid};
    use crate::mesh::{Occluder, OccluderMesh};
    use glam::DVec3;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Capture {
        prepared: Vec<Mode>,
        written: Vec<(Bucket, Array2<f64>)>,
    }

    impl ResultSink for Capture {
        fn prepare(&mut self, mode: Mode) -> Result<(), ShadowError> {
            self.prepared.push(mode);
            Ok(())
        }

        fn write(&mut self, bucket: &Bucket, map: &Array2<f64>) -> Result<(), ShadowError> {
            self.written.push((*bucket, map.clone()));
            Ok(())
        }
    }

    fn grid() -> SamplingGrid {
        let region = Region::parse("0 0 0", "4 0 0", "0 2 0").unwrap();
        SamplingGrid::new(region, 4, 2).unwrap()
    }

    fn wall() -> OccluderMesh {
        // Vertical wall south of the grid, partly see-through
        let vertices = vec![
            DVec3::new(-1.0, -2.0, 0.0),
            DVec3::new(5.0, -2.0, 0.0),
            DVec3::new(5.0, -2.0, 3.0),
            DVec3::new(-1.0, -2.0, 3.0),
        ];
        let wall = Occluder::new("wall")
            .with_opacity(0.9)
            .with_faces(vec![[0, 1, 2], [0, 2, 3]]);
        OccluderMesh::new(vertices, vec![wall]).unwrap()
    }

    fn sun() -> SunCalculator {
        SunCalculator::new(52.0, 5.0, 1.0).with_rotation(270.0)
    }

    #[test]
    fn test_height_steps_use_integer_index() {
        let heights = HeightSteps::new(1.0, 0.1).unwrap();
        let values: Vec<f64> = heights.iter().collect();
        assert_eq!(values.len(), 10);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[7], 7.0 * 0.1);

        assert_eq!(HeightSteps::new(0.5, 1.0).unwrap().step_count(), 1);
        assert!(HeightSteps::new(1.0, 0.0).is_err());
        assert!(HeightSteps::new(1.0, -0.5).is_err());
        assert!(HeightSteps::new(0.0, 0.5).is_err());
    }

    #[test]
    fn test_schedule_requires_mode_fields() {
        let year_only = DateConfig {
            year: 2021,
            ..DateConfig::default()
        };
        assert!(Schedule::from_date(Mode::SpecificMoment, &year_only).is_err());
        assert!(Schedule::from_date(Mode::Hourly, &year_only).is_err());
        assert_eq!(
            Schedule::from_date(Mode::Monthly, &year_only).unwrap(),
            Schedule::Monthly { year: 2021 }
        );
        assert_eq!(
            Schedule::from_date(Mode::GrowSeason, &year_only).unwrap(),
            Schedule::GrowSeason { year: 2021 }
        );

        let full = DateConfig {
            year: 2021,
            month: Some(6),
            day: Some(21),
            hour: Some(13),
            minute: Some(5),
        };
        assert_eq!(
            Schedule::from_date(Mode::SpecificMoment, &full).unwrap(),
            Schedule::SpecificMoment(GeoTime::new(2021, 6, 21, 13, 5))
        );
        assert_eq!(
            Schedule::from_date(Mode::Hourly, &full).unwrap(),
            Schedule::Hourly {
                year: 2021,
                month: 6,
                day: 21
            }
        );
    }

    #[test]
    fn test_bucket_order() {
        let heights = HeightSteps::new(1.0, 0.5).unwrap();

        let hourly = Schedule::Hourly {
            year: 2021,
            month: 6,
            day: 21,
        }
        .buckets(heights);
        assert_eq!(hourly.len(), 48);
        assert_eq!(hourly[1].height, 0.5);
        assert!(matches!(hourly[2].kind, BucketKind::Hour { hour: 1, .. }));

        let monthly = Schedule::Monthly { year: 2021 }.buckets(heights);
        assert_eq!(monthly.len(), 24);
        assert!(matches!(monthly[0].kind, BucketKind::Month { month: 1, .. }));
        assert!(matches!(monthly[23].kind, BucketKind::Month { month: 12, .. }));
        assert_eq!(monthly[23].height_index, 1);

        let season = Schedule::GrowSeason { year: 2021 }.buckets(heights);
        assert_eq!(season.len(), 2);
    }

    #[test]
    fn test_sample_counts() {
        let hour = BucketKind::Hour {
            year: 2021,
            month: 6,
            day: 21,
            hour: 8,
        };
        assert_eq!(hour.samples(DayRange::Fixed).len(), 60);

        let feb = BucketKind::Month {
            year: 2021,
            month: 2,
        };
        assert_eq!(feb.samples(DayRange::Fixed).len(), 30 * 24 * 12);
        assert_eq!(feb.samples(DayRange::Calendar).len(), 28 * 24 * 12);

        let season = BucketKind::GrowSeason { year: 2021 }.samples(DayRange::Fixed);
        assert_eq!(season.len(), 5 * 30 * 24 * 12);
        assert_eq!(season.first().unwrap(), &GeoTime::new(2021, 5, 1, 0, 0));
        assert_eq!(season.last().unwrap(), &GeoTime::new(2021, 9, 30, 23, 55));

        let calendar = BucketKind::GrowSeason { year: 2021 }.samples(DayRange::Calendar);
        assert_eq!(calendar.len(), (31 + 30 + 31 + 31 + 30) * 24 * 12);
    }

    #[test]
    fn test_normalization_round_trip() {
        let mut acc = Accumulator::new((2, 3));
        let mut sum = Array2::<f64>::zeros((2, 3));
        let maps = [0.25, 1.0, 0.0, 0.7, 0.3];
        for (k, value) in maps.iter().enumerate() {
            let mut map = Array2::from_elem((2, 3), *value);
            map[[1, 2]] = k as f64 / 10.0;
            acc.add(&map);
            sum += &map;
        }
        let count = acc.count();
        let average = acc.finish(Normalization::SunHours);

        let recovered = average.mapv(|a| a * count as f64 / HOURS_PER_DAY);
        for (r, s) in recovered.iter().zip(sum.iter()) {
            assert!((r - s).abs() < 1e-12);
        }
        assert!((average[[0, 0]] - 24.0 * 2.25 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_unobstructed_hour_is_full_day_equivalent() {
        let mesh = OccluderMesh::empty();
        let engine = ShadowEngine::new(&mesh, grid(), 2).unwrap();
        let integrator = TimeIntegrator::new(engine, sun(), HeightSteps::new(1.0, 1.0).unwrap());

        let bucket = Bucket {
            kind: BucketKind::Hour {
                year: 2021,
                month: 3,
                day: 1,
                hour: 2,
            },
            height: 0.0,
            height_index: 0,
        };
        let map = integrator.integrate(&bucket).unwrap();
        assert!(map.iter().all(|&v| v == HOURS_PER_DAY));
    }

    #[test]
    fn test_specific_moment_matches_single_evaluation() {
        let mesh = wall();
        let engine = ShadowEngine::new(&mesh, grid(), 2).unwrap();
        let integrator = TimeIntegrator::new(engine, sun(), HeightSteps::new(1.0, 0.5).unwrap());
        let time = GeoTime::new(2021, 12, 21, 12, 40);
        let mut capture = Capture::default();

        let summary = integrator
            .run(&Schedule::SpecificMoment(time), &mut capture)
            .unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(capture.prepared, vec![Mode::SpecificMoment]);

        let direction = sun().direction(&time);
        for (bucket, map) in &capture.written {
            let direct = integrator
                .engine()
                .calculate_shadow_map(&direction, bucket.height)
                .unwrap();
            assert_eq!(map, &direct);
        }
        // The low winter sun is behind the wall at ground level
        assert!(capture.written[0].1.iter().any(|&v| v < 1.0));
    }

    #[test]
    fn test_monthly_runs_months_outer_heights_inner() {
        let mesh = OccluderMesh::empty();
        let engine = ShadowEngine::new(&mesh, grid(), 2).unwrap();
        let integrator = TimeIntegrator::new(engine, sun(), HeightSteps::new(1.0, 0.5).unwrap());
        let mut capture = Capture::default();

        let summary = integrator
            .run(&Schedule::Monthly { year: 2021 }, &mut capture)
            .unwrap();
        assert_eq!(summary.written, 24);
        assert_eq!(capture.prepared, vec![Mode::Monthly]);

        let order: Vec<(u32, usize)> = capture
            .written
            .iter()
            .map(|(bucket, _)| match bucket.kind {
                BucketKind::Month { month, .. } => (month, bucket.height_index),
                other => panic!("unexpected bucket {:?}", other),
            })
            .collect();
        let expected: Vec<(u32, usize)> = (1..=12).flat_map(|m| [(m, 0), (m, 1)]).collect();
        assert_eq!(order, expected);
        assert!(capture
            .written
            .iter()
            .all(|(_, map)| map.iter().all(|&v| v == HOURS_PER_DAY)));
    }

    #[test]
    fn test_growseason_pools_summer_months() {
        let mesh = wall();
        let heights = HeightSteps::new(0.5, 1.0).unwrap();

        let engine = ShadowEngine::new(&mesh, grid(), 2).unwrap();
        let integrator = TimeIntegrator::new(engine, sun(), heights);
        let mut monthly = Capture::default();
        integrator
            .run(&Schedule::Monthly { year: 2021 }, &mut monthly)
            .unwrap();
        let mut season = Capture::default();
        integrator
            .run(&Schedule::GrowSeason { year: 2021 }, &mut season)
            .unwrap();

        assert_eq!(season.written.len(), 1);
        let pooled = &season.written[0].1;

        // Every month contributes the same number of samples, so the pooled
        // value is the plain mean of May to September.
        let mut mean = Array2::<f64>::zeros(pooled.dim());
        for (bucket, map) in &monthly.written {
            if let BucketKind::Month { month, .. } = bucket.kind {
                if GROWING_SEASON.contains(&month) {
                    mean += map;
                }
            }
        }
        mean.mapv_inplace(|v| v / 5.0);
        for (a, b) in pooled.iter().zip(mean.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert!(pooled.iter().all(|&v| v > 0.0 && v <= HOURS_PER_DAY));
        assert!(pooled.iter().any(|&v| v < HOURS_PER_DAY));
    }

    #[test]
    fn test_progress_is_reported() {
        let mesh = OccluderMesh::empty();
        let engine = ShadowEngine::new(&mesh, grid(), 1).unwrap();
        let updates = RefCell::new(Vec::new());
        let integrator = TimeIntegrator::new(engine, sun(), HeightSteps::new(0.3, 0.1).unwrap())
            .with_progress_observer(|u: &ProgressUpdate| updates.borrow_mut().push(u.clone()));

        let time = GeoTime::new(2021, 6, 21, 9, 0);
        let mut capture = Capture::default();
        integrator
            .run(&Schedule::SpecificMoment(time), &mut capture)
            .unwrap();
        drop(integrator);

        let updates = updates.into_inner();
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0].progress, 0.0);
        assert_eq!(updates[3].progress, 1.0);
        assert!(updates.windows(2).all(|w| w[0].progress < w[1].progress));
        assert!(updates.iter().all(|u| u.total_steps == 3));
    }
}
