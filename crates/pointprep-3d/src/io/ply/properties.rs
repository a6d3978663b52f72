use super::PlyError;

/// Encoding of the body of a PLY file.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PlyFormat {
    /// One whitespace separated record per line.
    Ascii,
    /// Packed little endian records.
    BinaryLittleEndian,
}

impl PlyFormat {
    /// Parse the first token of a `format` header line.
    pub fn from_header(token: &str) -> Result<Self, PlyError> {
        match token {
            "ascii" => Ok(PlyFormat::Ascii),
            "binary_little_endian" => Ok(PlyFormat::BinaryLittleEndian),
            _ => Err(PlyError::UnsupportedProperty(format!("format {token}"))),
        }
    }
}

/// Scalar types of the PLY properties.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// `float` / `float32`
    Float32,
    /// `double` / `float64`
    Float64,
    /// `char` / `int8`
    Int8,
    /// `uchar` / `uint8`
    UInt8,
    /// `short` / `int16`
    Int16,
    /// `ushort` / `uint16`
    UInt16,
    /// `int` / `int32`
    Int32,
    /// `uint` / `uint32`
    UInt32,
}

impl PlyDataType {
    /// Parse a PLY type name.
    pub fn from_name(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(PlyDataType::Float32),
            "double" | "float64" => Ok(PlyDataType::Float64),
            "char" | "int8" => Ok(PlyDataType::Int8),
            "uchar" | "uint8" => Ok(PlyDataType::UInt8),
            "short" | "int16" => Ok(PlyDataType::Int16),
            "ushort" | "uint16" => Ok(PlyDataType::UInt16),
            "int" | "int32" => Ok(PlyDataType::Int32),
            "uint" | "uint32" => Ok(PlyDataType::UInt32),
            _ => Err(PlyError::UnsupportedProperty(format!("type {type_str}"))),
        }
    }

    /// Size in bytes of a binary value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    /// Whether the type is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, PlyDataType::Float32 | PlyDataType::Float64)
    }

    /// Decode a little endian value from the start of `buffer`.
    pub fn read_le(&self, buffer: &[u8]) -> Option<f64> {
        let bytes = buffer.get(..self.size())?;
        Some(match self {
            PlyDataType::Float32 => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
            PlyDataType::Float64 => f64::from_le_bytes(bytes.try_into().ok()?),
            PlyDataType::Int8 => bytes[0] as i8 as f64,
            PlyDataType::UInt8 => bytes[0] as f64,
            PlyDataType::Int16 => i16::from_le_bytes(bytes.try_into().ok()?) as f64,
            PlyDataType::UInt16 => u16::from_le_bytes(bytes.try_into().ok()?) as f64,
            PlyDataType::Int32 => i32::from_le_bytes(bytes.try_into().ok()?) as f64,
            PlyDataType::UInt32 => u32::from_le_bytes(bytes.try_into().ok()?) as f64,
        })
    }

    /// Parse an ascii value.
    pub fn parse_ascii(&self, token: &str) -> Option<f64> {
        if self.is_float() {
            token.parse::<f64>().ok()
        } else {
            token.parse::<i64>().ok().map(|v| v as f64)
        }
    }
}

/// A property declared in a PLY element.
#[derive(Debug, PartialEq, Clone)]
pub enum PlyPropertyDefinition {
    /// A single scalar value.
    Scalar {
        /// Property name.
        name: String,
        /// Value type.
        data_type: PlyDataType,
    },
    /// A length prefixed list of values.
    List {
        /// Property name.
        name: String,
        /// Type of the length prefix.
        count_type: PlyDataType,
        /// Type of the items.
        item_type: PlyDataType,
    },
}

impl PlyPropertyDefinition {
    /// Property name.
    pub fn name(&self) -> &str {
        match self {
            PlyPropertyDefinition::Scalar { name, .. } | PlyPropertyDefinition::List { name, .. } => {
                name
            }
        }
    }
}

/// An element declared in the PLY header.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyElement {
    /// Element name, e.g. `vertex` or `face`.
    pub name: String,
    /// Number of records.
    pub count: usize,
    /// Properties of a record, in declaration order.
    pub properties: Vec<PlyPropertyDefinition>,
}

impl PlyElement {
    /// Size in bytes of a binary record, `None` when a list property makes it variable.
    pub fn fixed_size(&self) -> Option<usize> {
        self.properties
            .iter()
            .map(|p| match p {
                PlyPropertyDefinition::Scalar { data_type, .. } => Some(data_type.size()),
                PlyPropertyDefinition::List { .. } => None,
            })
            .sum()
    }

    /// Position and type of a scalar property.
    pub fn scalar(&self, names: &[&str]) -> Option<(usize, PlyDataType)> {
        names.iter().find_map(|name| {
            self.properties
                .iter()
                .enumerate()
                .find_map(|(i, p)| match p {
                    PlyPropertyDefinition::Scalar {
                        name: n,
                        data_type,
                    } if n.as_str() == *name => Some((i, *data_type)),
                    _ => None,
                })
        })
    }
}

/// Convert a color channel to 8 bits. Float channels are expected in `[0, 1]`.
pub fn color_channel(value: f64, data_type: PlyDataType) -> u8 {
    let value = if data_type.is_float() {
        value * 255.0
    } else {
        value
    };
    value.round().clamp(0.0, 255.0) as u8
}
