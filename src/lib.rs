//! Sun-hour maps for a garden plot.
//!
//! A grid of sample points is ray-cast towards the sun against a triangle
//! mesh of partly transparent occluders, and the transmitted light is
//! integrated over one of several time schedules.

pub mod geometry;
pub mod grid;
pub mod mesh;
pub mod raster_io;
pub mod shadow_engine;
pub mod sun_position;
pub mod time_integrator;
pub mod types;
pub mod wavefront;

pub use grid::{Region, SamplingGrid};
pub use mesh::{MeshError, Occluder, OccluderMesh};
pub use raster_io::{RasterIO, ResultSink};
pub use shadow_engine::ShadowEngine;
pub use sun_position::{SunCalculator, SunDirection};
pub use time_integrator::{HeightSteps, ProgressUpdate, RunSummary, Schedule, TimeIntegrator};
pub use types::{Config, DayRange, GeoTime, Mode, ShadowError};

/// Runs the schedule described by `config` and writes its text matrices.
///
/// Everything that can be checked up front (mode, date fields, grid, heights)
/// is validated before the mesh is loaded or any directory is created.
pub fn run(config: &Config, show_progress: bool) -> Result<RunSummary, ShadowError> {
    let schedule = config.schedule()?;
    let heights = config.heights()?;
    let grid = config.grid()?;

    let mesh = wavefront::load_obj(&config.geometry_file)?;
    let sun = SunCalculator::new(config.latitude, config.longitude, config.timezone)
        .with_rotation(config.geometry_rotation);

    let engine = ShadowEngine::new(&mesh, grid, config.get_cpu_cores())?;
    let integrator = TimeIntegrator::new(engine, sun, heights)
        .with_day_range(config.day_range)
        .with_progress_bar(show_progress);

    let mut sink = RasterIO::new(&config.output_path);
    integrator.run(&schedule, &mut sink)
}
