use std::io::{BufRead, Read};
use std::path::Path;

use super::{
    properties::{color_channel, PlyDataType, PlyElement, PlyFormat, PlyPropertyDefinition},
    PlyError,
};
use crate::pointcloud::PointCloud;

const MAX_VERTICES: usize = 50_000_000;

struct PlyHeader {
    pub format: PlyFormat,
    pub elements: Vec<PlyElement>,
}

fn malformed(message: impl Into<String>) -> PlyError {
    PlyError::MalformedHeader(message.into())
}

fn parse_count(token: Option<&&str>, what: &str) -> Result<usize, PlyError> {
    token
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed(format!("invalid {what} count")))
}

fn parse_property(parts: &[&str]) -> Result<PlyPropertyDefinition, PlyError> {
    match parts {
        ["property", "list", count_type, item_type, name] => Ok(PlyPropertyDefinition::List {
            name: name.to_string(),
            count_type: PlyDataType::from_name(count_type)?,
            item_type: PlyDataType::from_name(item_type)?,
        }),
        ["property", data_type, name] => Ok(PlyPropertyDefinition::Scalar {
            name: name.to_string(),
            data_type: PlyDataType::from_name(data_type)?,
        }),
        _ => Err(malformed(format!("invalid property line `{}`", parts.join(" ")))),
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut format = None;
    let mut is_ply = false;
    let mut elements: Vec<PlyElement> = Vec::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(malformed("missing end_header"));
        }
        let trimmed = line.trim();

        if !is_ply {
            if trimmed != "ply" {
                return Err(malformed("missing ply magic"));
            }
            is_ply = true;
            continue;
        }

        if trimmed == "end_header" {
            break;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        match parts.first() {
            Some(&"format") => {
                let token = parts.get(1).ok_or_else(|| malformed("empty format"))?;
                format = Some(PlyFormat::from_header(token)?);
            }
            Some(&"element") => {
                let name = parts.get(1).ok_or_else(|| malformed("unnamed element"))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count: parse_count(parts.get(2), name)?,
                    properties: Vec::new(),
                });
            }
            Some(&"property") => {
                let property = parse_property(&parts)?;
                elements
                    .last_mut()
                    .ok_or_else(|| malformed("property declared outside of an element"))?
                    .properties
                    .push(property);
            }
            _ => {} // comment, obj_info, blank lines
        }
    }

    let format = format.ok_or_else(|| malformed("missing format"))?;
    Ok(PlyHeader { format, elements })
}

fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    expected: usize,
    got: usize,
) -> Result<(), PlyError> {
    reader.read_exact(buffer).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            PlyError::Truncated { expected, got }
        } else {
            PlyError::Io(e)
        }
    })
}

/// Read one record of `element` into `values`, one entry per property.
///
/// List properties are skipped and stored as `NaN`.
fn read_record<R: BufRead>(
    reader: &mut R,
    element: &PlyElement,
    format: PlyFormat,
    index: usize,
    values: &mut [f64],
) -> Result<(), PlyError> {
    match format {
        PlyFormat::Ascii => {
            let mut line = String::new();
            let tokens = loop {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PlyError::Truncated {
                        expected: element.count,
                        got: index,
                    });
                }
                let tokens = line.split_whitespace().collect::<Vec<_>>();
                if !tokens.is_empty() {
                    break tokens;
                }
            };

            let invalid = || PlyError::InvalidVertex { index };
            let mut it = tokens.into_iter();
            for (value, property) in values.iter_mut().zip(element.properties.iter()) {
                match property {
                    PlyPropertyDefinition::Scalar { data_type, .. } => {
                        *value = it
                            .next()
                            .and_then(|t| data_type.parse_ascii(t))
                            .ok_or_else(invalid)?;
                    }
                    PlyPropertyDefinition::List { count_type, .. } => {
                        let len = it
                            .next()
                            .and_then(|t| count_type.parse_ascii(t))
                            .ok_or_else(invalid)?;
                        for _ in 0..len.max(0.0) as usize {
                            it.next().ok_or_else(invalid)?;
                        }
                        *value = f64::NAN;
                    }
                }
            }
        }
        PlyFormat::BinaryLittleEndian => {
            let mut scratch = [0u8; 8];
            for (value, property) in values.iter_mut().zip(element.properties.iter()) {
                match property {
                    PlyPropertyDefinition::Scalar { data_type, .. } => {
                        let bytes = &mut scratch[..data_type.size()];
                        read_exact_or_truncated(reader, bytes, element.count, index)?;
                        *value = data_type
                            .read_le(bytes)
                            .ok_or(PlyError::InvalidVertex { index })?;
                    }
                    PlyPropertyDefinition::List {
                        count_type,
                        item_type,
                        ..
                    } => {
                        let bytes = &mut scratch[..count_type.size()];
                        read_exact_or_truncated(reader, bytes, element.count, index)?;
                        let len = count_type
                            .read_le(bytes)
                            .ok_or(PlyError::InvalidVertex { index })?;
                        // skip the items without trusting the count for an allocation
                        let num_bytes = (len.max(0.0) as u64).saturating_mul(item_type.size() as u64);
                        let skipped =
                            std::io::copy(&mut reader.by_ref().take(num_bytes), &mut std::io::sink())?;
                        if skipped < num_bytes {
                            return Err(PlyError::Truncated {
                                expected: element.count,
                                got: index,
                            });
                        }
                        *value = f64::NAN;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Read a PLY file in `ascii` or `binary_little_endian` format.
///
/// # Arguments
/// * `path` - Path to a `.ply` file.
///
/// # Returns
/// A [`PointCloud`] built from the `vertex` element: the `x y z` properties (required),
/// `red green blue` colors and `nx ny nz` normals when present. Other properties and
/// elements are ignored.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    read_ply_from_reader(&mut reader)
}

/// Read a PLY point cloud, header and body, from a buffered reader.
pub fn read_ply_from_reader<R: BufRead>(reader: &mut R) -> Result<PointCloud, PlyError> {
    let header = parse_header(reader)?;

    let vertex_pos = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| malformed("missing vertex element"))?;

    // elements declared before the vertices have to be consumed first
    for element in &header.elements[..vertex_pos] {
        let mut values = vec![0.0; element.properties.len()];
        for index in 0..element.count {
            read_record(reader, element, header.format, index, &mut values)?;
        }
    }

    let vertex = &header.elements[vertex_pos];
    if vertex.count > MAX_VERTICES {
        return Err(malformed(format!("too many vertices: {}", vertex.count)));
    }

    // Required properties
    let (ix, _) = vertex.scalar(&["x"]).ok_or(PlyError::MissingProperty("x"))?;
    let (iy, _) = vertex.scalar(&["y"]).ok_or(PlyError::MissingProperty("y"))?;
    let (iz, _) = vertex.scalar(&["z"]).ok_or(PlyError::MissingProperty("z"))?;

    // Optional properties
    let rgb = match (
        vertex.scalar(&["red", "diffuse_red"]),
        vertex.scalar(&["green", "diffuse_green"]),
        vertex.scalar(&["blue", "diffuse_blue"]),
    ) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };
    let normal = match (
        vertex.scalar(&["nx", "normal_x"]),
        vertex.scalar(&["ny", "normal_y"]),
        vertex.scalar(&["nz", "normal_z"]),
    ) {
        (Some((nx, _)), Some((ny, _)), Some((nz, _))) => Some([nx, ny, nz]),
        _ => None,
    };

    let mut points = Vec::with_capacity(vertex.count);
    let mut colors = rgb.map(|_| Vec::with_capacity(vertex.count));
    let mut normals = normal.map(|_| Vec::with_capacity(vertex.count));
    let mut values = vec![0.0; vertex.properties.len()];

    for index in 0..vertex.count {
        read_record(reader, vertex, header.format, index, &mut values)?;
        points.push([values[ix], values[iy], values[iz]]);

        if let (Some(rgb), Some(colors)) = (rgb, colors.as_mut()) {
            colors.push(rgb.map(|(i, data_type)| color_channel(values[i], data_type)));
        }
        if let (Some(normal), Some(normals)) = (normal, normals.as_mut()) {
            normals.push(normal.map(|i| values[i]));
        }
    }

    log::debug!(
        "read_ply: {} vertices ({:?}), colors: {}, normals: {}",
        points.len(),
        header.format,
        colors.is_some(),
        normals.is_some()
    );

    Ok(PointCloud::new(points, colors, normals))
}
