use crate::time_integrator::{Bucket, BucketKind};
use crate::types::{Mode, ShadowError};
use ndarray::Array2;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination of finished shadow maps.
pub trait ResultSink {
    /// Called once before the first bucket. An error here aborts the run.
    fn prepare(&mut self, mode: Mode) -> Result<(), ShadowError>;

    /// Stores one bucket. An error only skips this artifact.
    fn write(&mut self, bucket: &Bucket, map: &Array2<f64>) -> Result<(), ShadowError>;
}

/// Writes each shadow map as a plain-text matrix under
/// `<output>/<mode>/<artifact name>`.
pub struct RasterIO {
    output_path: PathBuf,
}

impl RasterIO {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn mode_dir(&self, mode: Mode) -> PathBuf {
        self.output_path.join(mode.name())
    }

    pub fn artifact_path(&self, bucket: &Bucket) -> PathBuf {
        self.mode_dir(bucket.kind.mode()).join(artifact_name(bucket))
    }

    /// One line per grid row, values `{:6.2}` separated by a space.
    pub fn format_matrix(map: &Array2<f64>) -> String {
        let mut text = String::new();
        for row in map.outer_iter() {
            let line: Vec<String> = row.iter().map(|v| format!("{:6.2}", v)).collect();
            text.push_str(&line.join(" "));
            text.push('\n');
        }
        text
    }

    pub fn write_matrix(path: &Path, map: &Array2<f64>) -> Result<(), ShadowError> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        file.write_all(Self::format_matrix(map).as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn check_for_directory(path: &Path) -> Result<(), ShadowError> {
        std::fs::create_dir_all(path).map_err(|source| ShadowError::OutputDirectory {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ResultSink for RasterIO {
    fn prepare(&mut self, mode: Mode) -> Result<(), ShadowError> {
        let dir = self.mode_dir(mode);
        Self::check_for_directory(&dir)?;
        log::info!("Writing results to {}", dir.display());
        Ok(())
    }

    fn write(&mut self, bucket: &Bucket, map: &Array2<f64>) -> Result<(), ShadowError> {
        let path = self.artifact_path(bucket);
        Self::write_matrix(&path, map)?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// File name of a bucket; derived only from the schedule and the height.
pub fn artifact_name(bucket: &Bucket) -> String {
    let height = height_token(bucket.height);
    match bucket.kind {
        BucketKind::Moment(t) => format!(
            "{:04}{:02}{:02}_{:02}{:02}_height_{}.txt",
            t.year, t.month, t.day, t.hour, t.minute, height
        ),
        BucketKind::Hour {
            year,
            month,
            day,
            hour,
        } => format!(
            "{:04}{:02}{:02}_h{:02}_height_{}.txt",
            year, month, day, hour, height
        ),
        BucketKind::Month { month, .. } => format!("month_{:02}_height_{}.txt", month, height),
        BucketKind::GrowSeason { .. } => format!("height_{}.txt", height),
    }
}

/// Height in centimetres, zero padded to three digits.
fn height_token(height: f64) -> String {
    format!("{:03}", (height * 100.0).round() as i64)
}
