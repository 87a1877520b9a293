use glam::DVec3;

/// Determinant and distance threshold of the intersection test.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v1: DVec3,
    pub v2: DVec3,
    pub v3: DVec3,
}

impl Triangle {
    pub fn new(v1: DVec3, v2: DVec3, v3: DVec3) -> Self {
        Self { v1, v2, v3 }
    }

    /// Möller–Trumbore test. Returns the ray parameter `t` of the hit point.
    ///
    /// Near-parallel rays count as a miss, and only hits strictly in front of
    /// the origin (`t > EPSILON`) are reported. There is no upper bound on `t`.
    pub fn intersect(&self, ray: &Ray) -> Option<f64> {
        let edge1 = self.v2 - self.v1;
        let edge2 = self.v3 - self.v1;
        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v1;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if t > EPSILON {
            Some(t)
        } else {
            None
        }
    }

    pub fn is_hit_by(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }
}
