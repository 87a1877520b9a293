use crate::types::ShadowError;
use glam::DVec3;

/// Parallelogram sampling domain. `edge1` and `edge2` are absolute corner
/// points; the spanning vectors are `edge - origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub origin: DVec3,
    pub edge1: DVec3,
    pub edge2: DVec3,
}

impl Region {
    pub fn new(origin: DVec3, edge1: DVec3, edge2: DVec3) -> Self {
        Self {
            origin,
            edge1,
            edge2,
        }
    }

    /// Parses three points given as whitespace separated `x y z` text.
    pub fn parse(origin: &str, edge1: &str, edge2: &str) -> Result<Self, ShadowError> {
        Ok(Self::new(
            parse_point("regionO", origin)?,
            parse_point("regionV1", edge1)?,
            parse_point("regionV2", edge2)?,
        ))
    }
}

fn parse_point(key: &str, text: &str) -> Result<DVec3, ShadowError> {
    let coords = text
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|e| {
                ShadowError::Config(format!("{}: '{}' is not a number ({})", key, token, e))
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    match coords.as_slice() {
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(ShadowError::Config(format!(
            "{}: expected three coordinates, got '{}'",
            key, text
        ))),
    }
}

/// Cell-centred sample points over a [`Region`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingGrid {
    region: Region,
    steps_v1: usize,
    steps_v2: usize,
}

impl SamplingGrid {
    pub fn new(region: Region, steps_v1: usize, steps_v2: usize) -> Result<Self, ShadowError> {
        if steps_v1 == 0 || steps_v2 == 0 {
            return Err(ShadowError::Config(format!(
                "grid resolution must be at least 1x1, got {}x{}",
                steps_v1, steps_v2
            )));
        }
        Ok(Self {
            region,
            steps_v1,
            steps_v2,
        })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// `(stepsV1, stepsV2)`, the shape of every shadow map.
    pub fn dim(&self) -> (usize, usize) {
        (self.steps_v1, self.steps_v2)
    }

    pub fn cell_count(&self) -> usize {
        self.steps_v1 * self.steps_v2
    }

    /// Centre of cell `(i, j)` lifted `height` along +z.
    pub fn cell_center(&self, i: usize, j: usize, height: f64) -> DVec3 {
        let r = &self.region;
        r.origin
            + (r.edge1 - r.origin) / self.steps_v1 as f64 * (i as f64 + 0.5)
            + (r.edge2 - r.origin) * (j as f64 + 0.5) / self.steps_v2 as f64
            + height * DVec3::Z
    }
}
