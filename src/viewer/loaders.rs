//! Bytes in, triangles out.

use std::io::{Cursor, Read};

use anyhow::{Context, anyhow, bail};
use base64::Engine;
use nalgebra::{Matrix4, Point3};

use super::MeshFormat;
use super::geometry::MeshGeometry;
use crate::error::ViewerError;

/// Parses a downloaded asset. Errors name the format.
pub fn parse(format: MeshFormat, bytes: &[u8]) -> Result<MeshGeometry, ViewerError> {
    let parsed = match format {
        MeshFormat::Stl => parse_stl(bytes),
        MeshFormat::Gltf => parse_gltf(bytes),
        MeshFormat::ThreeMf => parse_3mf(bytes),
    };
    let mut mesh = parsed.map_err(|e| ViewerError::Parse {
        format: format.label(),
        message: format!("{e:#}"),
    })?;

    mesh.retain_valid_triangles();
    if mesh.is_empty() {
        return Err(ViewerError::EmptyMesh {
            format: format.label(),
        });
    }
    log::debug!("{format}: {} triangles", mesh.triangle_count());
    Ok(mesh)
}

/// Binary or ASCII STL.
fn parse_stl(bytes: &[u8]) -> anyhow::Result<MeshGeometry> {
    if bytes.is_empty() {
        bail!("file is empty");
    }
    let mut cursor = Cursor::new(bytes);
    let indexed = stl_io::read_stl(&mut cursor).context("not a readable STL file")?;

    let positions = indexed
        .vertices
        .iter()
        .map(|v| [v[0], v[1], v[2]])
        .collect();
    let indices = indexed
        .faces
        .iter()
        .flat_map(|f| f.vertices)
        .map(|i| u32::try_from(i).context("vertex index overflow"))
        .collect::<anyhow::Result<Vec<u32>>>()?;

    Ok(MeshGeometry { positions, indices })
}

/// GLB, or glTF JSON with embedded (data URI) buffers. Node transforms of the
/// default scene are applied so the bounds match what a glTF viewer shows.
fn parse_gltf(bytes: &[u8]) -> anyhow::Result<MeshGeometry> {
    let gltf = gltf::Gltf::from_slice(bytes).context("not a glTF document")?;

    let buffers = gltf
        .buffers()
        .map(|buffer| -> anyhow::Result<Vec<u8>> {
            match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .clone()
                    .ok_or_else(|| anyhow!("GLB binary chunk missing")),
                gltf::buffer::Source::Uri(uri) => decode_data_uri(uri),
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut out = MeshGeometry::default();
    let scene = gltf.default_scene().or_else(|| gltf.scenes().next());
    match scene {
        Some(scene) => {
            for node in scene.nodes() {
                append_node(&node, Matrix4::identity(), &buffers, &mut out)?;
            }
        }
        None => {
            for mesh in gltf.meshes() {
                append_mesh(&mesh, &Matrix4::identity(), &buffers, &mut out)?;
            }
        }
    }
    Ok(out)
}

fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let payload = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .ok_or_else(|| anyhow!("external buffer {uri} is not supported; use GLB or embedded buffers"))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("bad base64 buffer")
}

fn append_node(
    node: &gltf::Node<'_>,
    parent: Matrix4<f32>,
    buffers: &[Vec<u8>],
    out: &mut MeshGeometry,
) -> anyhow::Result<()> {
    let world = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        append_mesh(&mesh, &world, buffers, out)?;
    }
    for child in node.children() {
        append_node(&child, world, buffers, out)?;
    }
    Ok(())
}

fn append_mesh(
    mesh: &gltf::Mesh<'_>,
    transform: &Matrix4<f32>,
    buffers: &[Vec<u8>],
    out: &mut MeshGeometry,
) -> anyhow::Result<()> {
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::debug!("skipping non-triangle primitive in mesh {:?}", mesh.name());
            continue;
        }
        let reader = primitive.reader(|b| buffers.get(b.index()).map(Vec::as_slice));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let positions: Vec<[f32; 3]> = positions
            .map(|p| {
                let p = transform.transform_point(&Point3::from(p));
                [p.x, p.y, p.z]
            })
            .collect();
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..u32::try_from(positions.len()).context("too many vertices")?).collect(),
        };
        let mut part = MeshGeometry { positions, indices };
        part.retain_valid_triangles();
        out.append(part)?;
    }
    Ok(())
}

/// 3MF is a zip with XML model parts under `3D/`. Every `<mesh>` in every
/// model part is merged.
fn parse_3mf(bytes: &[u8]) -> anyhow::Result<MeshGeometry> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("not a 3MF (zip) archive")?;

    let mut out = MeshGeometry::default();
    let mut parts = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_ascii_lowercase();
        if !name.ends_with(".model") {
            continue;
        }
        let mut xml = String::new();
        entry
            .read_to_string(&mut xml)
            .with_context(|| format!("reading {name}"))?;
        parse_3mf_model(&xml, &mut out).with_context(|| format!("in {name}"))?;
        parts += 1;
    }
    if parts == 0 {
        bail!("archive has no 3D model part");
    }
    Ok(out)
}

fn parse_3mf_model(xml: &str, out: &mut MeshGeometry) -> anyhow::Result<()> {
    let doc = roxmltree::Document::parse(xml).context("malformed model XML")?;

    for mesh in doc.descendants().filter(|n| n.has_tag_name("mesh")) {
        let mut part = MeshGeometry::default();
        for node in mesh.descendants() {
            if node.has_tag_name("vertex") {
                part.positions.push([
                    float_attr(&node, "x")?,
                    float_attr(&node, "y")?,
                    float_attr(&node, "z")?,
                ]);
            } else if node.has_tag_name("triangle") {
                for key in ["v1", "v2", "v3"] {
                    part.indices.push(index_attr(&node, key)?);
                }
            }
        }
        part.retain_valid_triangles();
        out.append(part)?;
    }
    Ok(())
}

fn float_attr(node: &roxmltree::Node<'_, '_>, key: &str) -> anyhow::Result<f32> {
    node.attribute(key)
        .ok_or_else(|| anyhow!("vertex missing {key}"))?
        .trim()
        .parse()
        .with_context(|| format!("bad vertex coordinate {key}"))
}

fn index_attr(node: &roxmltree::Node<'_, '_>, key: &str) -> anyhow::Result<u32> {
    node.attribute(key)
        .ok_or_else(|| anyhow!("triangle missing {key}"))?
        .trim()
        .parse()
        .with_context(|| format!("bad triangle index {key}"))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_stl() {
        let bytes = fixtures::binary_stl(&[
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        ]);
        let mesh = parse(MeshFormat::Stl, &bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        let aabb = mesh.bounds().unwrap();
        assert_eq!(aabb.max, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn ascii_stl() {
        let text = "solid t\n facet normal 0 0 1\n  outer loop\n   vertex 0 0 0\n   vertex 4 0 0\n   vertex 0 2 0\n  endloop\n endfacet\nendsolid t\n";
        let mesh = parse(MeshFormat::Stl, text.as_bytes()).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.bounds().unwrap().size().x, 4.0);
    }

    #[test]
    fn garbage_stl_names_the_format() {
        let err = parse(MeshFormat::Stl, b"").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse STL"), "{err}");
    }

    #[test]
    fn three_mf_archive() {
        let bytes = three_mf(CUBE_CORNER_3MF);
        let mesh = parse(MeshFormat::ThreeMf, &bytes).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        let size = mesh.bounds().unwrap().size();
        assert_eq!((size.x, size.y, size.z), (10.0, 20.0, 30.0));
    }

    #[test]
    fn three_mf_bad_indices_stay_inside_their_part() {
        let xml = r#"<model xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources>
    <object id="1"><mesh>
      <vertices>
        <vertex x="0" y="0" z="0"/><vertex x="1" y="0" z="0"/><vertex x="0" y="1" z="0"/>
      </vertices>
      <triangles>
        <triangle v1="0" v2="1" v3="2"/>
        <triangle v1="0" v2="1" v3="5"/>
      </triangles>
    </mesh></object>
    <object id="2"><mesh>
      <vertices>
        <vertex x="50" y="0" z="0"/><vertex x="51" y="0" z="0"/><vertex x="50" y="1" z="0"/>
      </vertices>
      <triangles>
        <triangle v1="0" v2="1" v3="2"/>
        <triangle v1="0" v2="1" v3="4294967295"/>
      </triangles>
    </mesh></object>
  </resources>
</model>"#;
        let mesh = parse(MeshFormat::ThreeMf, &three_mf(xml)).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn three_mf_rejects_non_zip() {
        let err = parse(MeshFormat::ThreeMf, b"solid nope").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse 3MF"), "{err}");
    }

    #[test]
    fn embedded_gltf_applies_node_translation() {
        let positions: Vec<u8> = [[0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
            .iter()
            .flat_map(|v| v.iter().flat_map(|c| c.to_le_bytes()))
            .collect();
        let data = base64::engine::general_purpose::STANDARD.encode(&positions);
        let doc = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0, "translation": [10.0, 0.0, 0.0]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "buffers": [{"byteLength": 36, "uri": format!("data:application/octet-stream;base64,{data}")}],
            "bufferViews": [{"buffer": 0, "byteLength": 36}],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            }]
        });
        let mesh = parse(MeshFormat::Gltf, doc.to_string().as_bytes()).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        let aabb = mesh.bounds().unwrap();
        assert_eq!(aabb.min.x, 10.0);
        assert_eq!(aabb.max.x, 11.0);
    }

    #[test]
    fn external_gltf_buffers_are_reported() {
        let doc = json!({
            "asset": {"version": "2.0"},
            "buffers": [{"byteLength": 4, "uri": "mesh.bin"}]
        });
        let err = parse(MeshFormat::Gltf, doc.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("mesh.bin"), "{err}");
    }
}
