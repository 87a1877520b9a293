use crate::geometry::Ray;
use crate::grid::SamplingGrid;
use crate::mesh::OccluderMesh;
use crate::sun_position::SunDirection;
use crate::types::ShadowError;
use glam::DVec3;
use ndarray::Array2;
use rayon::prelude::*;

/// Ray-casts every grid cell towards the sun against an [`OccluderMesh`].
pub struct ShadowEngine<'a> {
    mesh: &'a OccluderMesh,
    grid: SamplingGrid,
    pool: rayon::ThreadPool,
}

impl<'a> ShadowEngine<'a> {
    pub fn new(
        mesh: &'a OccluderMesh,
        grid: SamplingGrid,
        cpu_cores: usize,
    ) -> Result<Self, ShadowError> {
        log::info!("Setting up worker pool with {} threads", cpu_cores);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cpu_cores)
            .build()?;
        Ok(Self { mesh, grid, pool })
    }

    pub fn grid(&self) -> &SamplingGrid {
        &self.grid
    }

    /// Transmitted-light fraction of every cell at `height` above the grid.
    ///
    /// Rows (`stepsV1`) are distributed over the pool; each task owns the
    /// slice of the output buffer that holds its row.
    pub fn calculate_shadow_map(
        &self,
        sun: &SunDirection,
        height: f64,
    ) -> Result<Array2<f64>, ShadowError> {
        let (n_v1, n_v2) = self.grid.dim();
        let mut light = vec![1.0; n_v1 * n_v2];

        self.pool.install(|| {
            light
                .par_chunks_mut(n_v2)
                .enumerate()
                .for_each(|(i, row)| {
                    for (j, cell) in row.iter_mut().enumerate() {
                        let origin = self.grid.cell_center(i, j, height);
                        *cell = self.calculate_cell_light(origin, sun.vector);
                    }
                });
        });

        Ok(Array2::from_shape_vec((n_v1, n_v2), light)?)
    }

    /// Light reaching `origin` along `direction`. Overlapping occluders do not
    /// compound: the most opaque object hit decides the result.
    pub fn calculate_cell_light(&self, origin: DVec3, direction: DVec3) -> f64 {
        let ray = Ray::new(origin, direction);
        let mut light = 1.0_f64;

        for object in self.mesh.objects() {
            let transmitted = 1.0 - object.opacity();
            if transmitted >= light {
                continue;
            }
            if self.mesh.triangles(object).any(|tri| tri.is_hit_by(&ray)) {
                light = transmitted;
                if light <= 0.0 {
                    break;
                }
            }
        }

        light
    }
}
