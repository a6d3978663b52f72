use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use super::PcdError;
use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Encoding of the data section of a PCD file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdDataFormat {
    /// One whitespace separated point per line.
    Ascii,
    /// Packed little endian point records.
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    offset: usize, // byte offset within a binary point
    column: usize, // token index within an ascii point
    size: usize,   // size of one element (bytes)
    kind: char,    // PCD type: 'F' = float, 'U' = unsigned int, 'I' = signed int
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize, // total bytes per point
    num_columns: usize, // total tokens per ascii point
    num_points: usize,
    data: PcdDataFormat,
}

impl PcdLayout {
    fn field(&self, names: &[&str]) -> Option<&PcdField> {
        names.iter().find_map(|name| self.fields.get(*name))
    }
}

/// A single point record, either raw bytes or ascii tokens.
enum PcdRecord<'a> {
    Binary(&'a [u8]),
    Ascii(&'a [&'a str]),
}

impl PcdRecord<'_> {
    fn scalar(&self, field: &PcdField) -> Option<f64> {
        match self {
            PcdRecord::Binary(buf) => {
                let bytes = buf.get(field.offset..field.offset + field.size)?;
                Some(match (field.kind, field.size) {
                    ('F', 4) => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('F', 8) => f64::from_le_bytes(bytes.try_into().ok()?),
                    ('U', 1) => bytes[0] as f64,
                    ('I', 1) => bytes[0] as i8 as f64,
                    ('U', 2) => u16::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('I', 2) => i16::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('U', 4) => u32::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('I', 4) => i32::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('U', 8) => u64::from_le_bytes(bytes.try_into().ok()?) as f64,
                    ('I', 8) => i64::from_le_bytes(bytes.try_into().ok()?) as f64,
                    _ => return None,
                })
            }
            PcdRecord::Ascii(tokens) => tokens.get(field.column)?.parse::<f64>().ok(),
        }
    }

    /// The `rgb` field packs the color as `0x00RRGGBB`, stored in the bits of a float or an
    /// integer.
    fn packed_rgb(&self, field: &PcdField) -> Option<u32> {
        match self {
            PcdRecord::Binary(buf) => {
                let bytes = buf.get(field.offset..field.offset + 4)?;
                Some(u32::from_le_bytes(bytes.try_into().ok()?))
            }
            PcdRecord::Ascii(tokens) => {
                let token = tokens.get(field.column)?;
                match field.kind {
                    'F' => token.parse::<f32>().ok().map(f32::to_bits),
                    'U' => token.parse::<u32>().ok(),
                    'I' => token.parse::<i32>().ok().map(|v| v as u32),
                    _ => None,
                }
            }
        }
    }
}

fn invalid_header(message: &str) -> PcdError {
    PcdError::MalformedHeader(message.to_string())
}

fn parse_list<T: std::str::FromStr>(
    keyword: &str,
    values: std::str::SplitWhitespace<'_>,
) -> Result<Vec<T>, PcdError> {
    values
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| PcdError::MalformedHeader(format!("invalid {keyword} entry `{v}`")))
        })
        .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = None;
    let mut height = None;
    let mut points = None;
    let mut line = String::new();

    let data = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(invalid_header("missing DATA line"));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut it = trimmed.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("ascii") => break PcdDataFormat::Ascii,
                Some("binary") => break PcdDataFormat::Binary,
                other => {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_list("SIZE", it)?,
            Some("COUNT") => counts = parse_list("COUNT", it)?,
            Some("TYPE") => {
                types = it
                    .map(|v| match v {
                        "F" | "U" | "I" => v.chars().next().ok_or_else(|| invalid_header("empty TYPE")),
                        _ => Err(PcdError::UnsupportedProperty(format!("TYPE {v}"))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("WIDTH") => width = parse_list::<usize>("WIDTH", it)?.first().copied(),
            Some("HEIGHT") => height = parse_list::<usize>("HEIGHT", it)?.first().copied(),
            Some("POINTS") => points = parse_list::<usize>("POINTS", it)?.first().copied(),
            _ => {}
        }
    };

    if field_names.is_empty() {
        return Err(invalid_header("missing FIELDS"));
    }
    if sizes.len() != field_names.len() || types.len() != field_names.len() {
        return Err(invalid_header("SIZE and TYPE must match FIELDS"));
    }
    if !counts.is_empty() && counts.len() != field_names.len() {
        return Err(invalid_header("COUNT must match FIELDS"));
    }

    let num_points = match (points, width, height) {
        (Some(points), _, _) => points,
        (None, Some(width), height) => width
            .checked_mul(height.unwrap_or(1))
            .ok_or_else(|| invalid_header("WIDTH * HEIGHT overflows"))?,
        (None, None, _) => return Err(invalid_header("missing POINTS")),
    };

    // Compute byte offsets and token columns for each field
    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (i, name) in field_names.iter().enumerate() {
        // a missing COUNT means one element per field
        let count = counts.get(i).copied().unwrap_or(1);
        let size = sizes[i];
        let kind = types[i];

        let valid_size = match kind {
            'F' => matches!(size, 4 | 8),
            _ => matches!(size, 1 | 2 | 4 | 8),
        };
        if !valid_size || count == 0 {
            return Err(PcdError::UnsupportedProperty(format!(
                "field `{name}` of type {kind}{size} x{count}"
            )));
        }

        match name.as_str() {
            "x" | "y" | "z" | "normal_x" | "normal_y" | "normal_z" | "nx" | "ny" | "nz" => {
                if !(kind == 'F' && count == 1) {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "field `{name}` must be a single float"
                    )));
                }
            }
            "rgb" | "rgba" => {
                if !(size == 4 && count == 1) {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "field `{name}` must be a single 4 bytes value"
                    )));
                }
            }
            _ => {}
        }

        let field = PcdField {
            offset,
            column,
            size,
            kind,
        };

        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or_else(|| invalid_header("point size overflows"))?;
        column += count;

        if offset > MAX_POINT_STEP {
            return Err(invalid_header("point record too large"));
        }

        if fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader(format!("duplicated field `{name}`")));
        }
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_columns: column,
        num_points,
        data,
    })
}

/// Read a PCD file.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] containing:
/// - 3D points (always)
/// - RGB colors (if an `rgb` or `rgba` field is present)
/// - Normals (if `normal_x/normal_y/normal_z` or `nx/ny/nz` are present)
///
/// # Supported formats
/// - `DATA ascii`
/// - `DATA binary`
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let path = path.as_ref();
    let Some(file_ext) = path.extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if !file_ext.eq_ignore_ascii_case("pcd") {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    read_pcd_from_reader(&mut reader)
}

/// Read a PCD point cloud, header and data, from a buffered reader.
pub fn read_pcd_from_reader<R: BufRead>(reader: &mut R) -> Result<PointCloud, PcdError> {
    let layout = parse_pcd_layout(reader)?;

    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader(format!(
            "too many points: {}",
            layout.num_points
        )));
    }

    // Required fields
    let fx = layout.field(&["x"]).ok_or(PcdError::MissingField("x"))?;
    let fy = layout.field(&["y"]).ok_or(PcdError::MissingField("y"))?;
    let fz = layout.field(&["z"]).ok_or(PcdError::MissingField("z"))?;

    // Optional fields
    let frgb = layout.field(&["rgb", "rgba"]);
    let fnormal = match (
        layout.field(&["normal_x", "nx"]),
        layout.field(&["normal_y", "ny"]),
        layout.field(&["normal_z", "nz"]),
    ) {
        (Some(nx), Some(ny), Some(nz)) => Some([nx, ny, nz]),
        _ => None,
    };

    let mut points = Vec::with_capacity(layout.num_points);
    let mut colors = frgb.map(|_| Vec::with_capacity(layout.num_points));
    let mut normals = fnormal.map(|_| Vec::with_capacity(layout.num_points));

    let mut push_point = |index: usize, record: &PcdRecord<'_>| -> Result<(), PcdError> {
        let invalid = || PcdError::InvalidPoint { index };
        points.push([
            record.scalar(fx).ok_or_else(invalid)?,
            record.scalar(fy).ok_or_else(invalid)?,
            record.scalar(fz).ok_or_else(invalid)?,
        ]);

        if let (Some(field), Some(colors)) = (frgb, colors.as_mut()) {
            let rgb = record.packed_rgb(field).ok_or_else(invalid)?;
            colors.push([
                ((rgb >> 16) & 0xFF) as u8,
                ((rgb >> 8) & 0xFF) as u8,
                (rgb & 0xFF) as u8,
            ]);
        }

        if let (Some([nx, ny, nz]), Some(normals)) = (fnormal, normals.as_mut()) {
            normals.push([
                record.scalar(nx).ok_or_else(invalid)?,
                record.scalar(ny).ok_or_else(invalid)?,
                record.scalar(nz).ok_or_else(invalid)?,
            ]);
        }
        Ok(())
    };

    match layout.data {
        PcdDataFormat::Binary => {
            if layout.point_step == 0 {
                return Err(invalid_header("empty point record"));
            }
            let mut buffer = vec![0u8; layout.point_step];
            for index in 0..layout.num_points {
                match reader.read_exact(&mut buffer) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return Err(PcdError::Truncated {
                            expected: layout.num_points,
                            got: index,
                        })
                    }
                    Err(e) => return Err(e.into()),
                }
                push_point(index, &PcdRecord::Binary(&buffer))?;
            }
        }
        PcdDataFormat::Ascii => {
            let mut line = String::new();
            let mut index = 0;
            while index < layout.num_points {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    return Err(PcdError::Truncated {
                        expected: layout.num_points,
                        got: index,
                    });
                }
                let tokens = line.split_whitespace().collect::<Vec<_>>();
                if tokens.is_empty() {
                    continue;
                }
                if tokens.len() < layout.num_columns {
                    return Err(PcdError::InvalidPoint { index });
                }
                push_point(index, &PcdRecord::Ascii(&tokens))?;
                index += 1;
            }
        }
    }

    log::debug!(
        "read_pcd: {} points ({:?}), colors: {}, normals: {}",
        points.len(),
        layout.data,
        colors.is_some(),
        normals.is_some()
    );

    Ok(PointCloud::new(points, colors, normals))
}
