//! Wavefront `.obj` / `.mtl` loading on top of `tobj`.
//!
//! Only what the shadow computation needs is kept: vertex positions, object
//! names, triangles and the dissolve (`d` / `Tr`) value of each material.

use crate::mesh::{MaterialAssignment, MeshError, Occluder, OccluderMesh, DEFAULT_OPACITY};
use glam::DVec3;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Loads an `.obj` file. `mtllib` references are resolved next to it and
/// must be `.mtl` files.
pub fn load_obj(path: &Path) -> Result<OccluderMesh, MeshError> {
    check_extension(path, "obj")?;
    let file = std::fs::File::open(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Started loading geometry from: {}", path.display());

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let rejected = RefCell::new(None);
    let mut reader = std::io::BufReader::new(file);
    let mesh = parse_obj(&mut reader, path, |name: &Path| {
        let library = base.join(name);
        if let Err(e) = check_extension(&library, "mtl") {
            *rejected.borrow_mut() = Some(e);
            return Err(tobj::LoadError::OpenFileFailed);
        }
        log::info!("Loading materials from: {}", library.display());
        tobj::load_mtl(&library)
    });
    if let Some(e) = rejected.into_inner() {
        return Err(e);
    }
    let mesh = mesh?;

    log::info!(
        "Done loading geometry: {} objects, {} triangles, {} vertices",
        mesh.objects().len(),
        mesh.triangle_count(),
        mesh.vertices().len()
    );
    if mesh.is_empty() {
        log::warn!("{} has no triangles, nothing casts a shadow", path.display());
    }
    Ok(mesh)
}

/// Parses `.obj` data read from `reader`. `path` only labels errors;
/// `mtllib` references are handed to `load_library`.
pub fn parse_obj<B, F>(
    reader: &mut B,
    path: &Path,
    load_library: F,
) -> Result<OccluderMesh, MeshError>
where
    B: BufRead,
    F: Fn(&Path) -> tobj::MTLLoadResult,
{
    let (models, materials) =
        tobj::load_obj_buf(reader, &load_options(), load_library).map_err(|source| {
            MeshError::Load {
                path: path.to_path_buf(),
                source,
            }
        })?;
    let materials = materials.map_err(|source| MeshError::Materials {
        path: path.to_path_buf(),
        source,
    })?;

    let mut vertices: Vec<DVec3> = Vec::new();
    let mut objects: Vec<Occluder> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    // A material switch inside one object arrives as several models sharing
    // that object's name.
    for model in &models {
        let mesh = &model.mesh;
        let offset = vertices.len();
        vertices.extend(mesh.positions.chunks_exact(3).map(|p| {
            DVec3::new(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]))
        }));

        let slot = *by_name.entry(model.name.clone()).or_insert_with(|| {
            objects.push(Occluder::new(model.name.clone()));
            objects.len() - 1
        });
        let object = &mut objects[slot];

        if let Some(material) = mesh.material_id.and_then(|id| materials.get(id)) {
            if let MaterialAssignment::Conflict {
                existing,
                requested,
            } = object.assign_material(&material.name, material_opacity(material))
            {
                return Err(MeshError::MaterialConflict {
                    object: object.name().to_string(),
                    existing,
                    requested,
                });
            }
        }

        for tri in mesh.indices.chunks_exact(3) {
            object.push_face([
                offset + tri[0] as usize,
                offset + tri[1] as usize,
                offset + tri[2] as usize,
            ]);
        }
    }

    for object in &objects {
        log::debug!(
            "{}: opacity {} material {:?} faces {}",
            object.name(),
            object.opacity(),
            object.material(),
            object.faces().len()
        );
    }

    OccluderMesh::new(vertices, objects)
}

/// `d`, or `1 - Tr` when only `Tr` is given; opaque when neither is.
pub fn material_opacity(material: &tobj::Material) -> f64 {
    if let Some(d) = material.dissolve {
        return f64::from(d);
    }
    material
        .unknown_param
        .get("Tr")
        .and_then(|tr| tr.trim().parse::<f64>().ok())
        .map(|tr| 1.0 - tr)
        .unwrap_or(DEFAULT_OPACITY)
}

fn check_extension(path: &Path, expected: &'static str) -> Result<(), MeshError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(expected) => Ok(()),
        _ => Err(MeshError::Extension {
            path: path.to_path_buf(),
            expected,
        }),
    }
}
