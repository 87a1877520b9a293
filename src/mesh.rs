use crate::geometry::Triangle;
use glam::DVec3;
use std::path::PathBuf;

/// Opacity of an object without a (known) material.
pub const DEFAULT_OPACITY: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Was unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a wavefront {expected} file")]
    Extension { path: PathBuf, expected: &'static str },
    #[error("Failed to read wavefront geometry {path}: {source}")]
    Load {
        path: PathBuf,
        source: tobj::LoadError,
    },
    #[error("Failed to load the material library of {path}: {source}")]
    Materials {
        path: PathBuf,
        source: tobj::LoadError,
    },
    #[error(
        "object {object} already uses material {existing}, cannot also use {requested}; \
         only one material per object is supported"
    )]
    MaterialConflict {
        object: String,
        existing: String,
        requested: String,
    },
    #[error("object {object} references vertex {index} but the mesh has {count} vertices")]
    VertexIndex {
        object: String,
        index: usize,
        count: usize,
    },
    #[error("object {object} has opacity {value}, expected a value in [0, 1]")]
    Opacity { object: String, value: f64 },
}

/// Outcome of assigning a material to an [`Occluder`].
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialAssignment {
    /// The object now carries this opacity.
    Assigned(f64),
    /// The object already has a different material; nothing was changed.
    Conflict { existing: String, requested: String },
}

/// A named group of triangles sharing one opacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Occluder {
    name: String,
    opacity: f64,
    material: Option<String>,
    /// Zero-based indices into the mesh vertex pool.
    faces: Vec<[usize; 3]>,
}

impl Occluder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opacity: DEFAULT_OPACITY,
            material: None,
            faces: Vec::new(),
        }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_faces(mut self, faces: Vec<[usize; 3]>) -> Self {
        self.faces = faces;
        self
    }

    pub fn push_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    pub fn assign_material(&mut self, material: &str, opacity: f64) -> MaterialAssignment {
        match &self.material {
            Some(existing) if existing != material => MaterialAssignment::Conflict {
                existing: existing.clone(),
                requested: material.to_string(),
            },
            _ => {
                self.material = Some(material.to_string());
                self.opacity = opacity;
                MaterialAssignment::Assigned(opacity)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }
}

/// Triangle soup with per-object opacity. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccluderMesh {
    vertices: Vec<DVec3>,
    objects: Vec<Occluder>,
}

impl OccluderMesh {
    pub fn new(vertices: Vec<DVec3>, objects: Vec<Occluder>) -> Result<Self, MeshError> {
        for object in &objects {
            if !(0.0..=1.0).contains(&object.opacity) {
                return Err(MeshError::Opacity {
                    object: object.name.clone(),
                    value: object.opacity,
                });
            }
            let out_of_range = object
                .faces
                .iter()
                .flat_map(|face| face.iter())
                .find(|&&index| index >= vertices.len());
            if let Some(&index) = out_of_range {
                return Err(MeshError::VertexIndex {
                    object: object.name.clone(),
                    index,
                    count: vertices.len(),
                });
            }
        }
        Ok(Self { vertices, objects })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn objects(&self) -> &[Occluder] {
        &self.objects
    }

    fn triangle(&self, face: &[usize; 3]) -> Triangle {
        Triangle::new(
            self.vertices[face[0]],
            self.vertices[face[1]],
            self.vertices[face[2]],
        )
    }

    pub fn triangles<'a>(&'a self, object: &'a Occluder) -> impl Iterator<Item = Triangle> + 'a {
        object.faces.iter().map(move |face| self.triangle(face))
    }

    pub fn triangle_count(&self) -> usize {
        self.objects.iter().map(|o| o.faces.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }
}
