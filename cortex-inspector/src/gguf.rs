//! Minimal GGUF header reader: magic/version validation plus extraction of
//! the handful of metadata keys the inspector surfaces (spec.md §4.9's
//! `metadata` fields). Tensor data itself is never read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const GGUF_MAGIC: u32 = 0x4655_4747; // "GGUF" little-endian

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GgufMetadata {
    pub architecture: Option<String>,
    pub context_length: Option<u64>,
    pub embedding_length: Option<u64>,
    pub block_count: Option<u64>,
    pub heads_q: Option<u64>,
    pub heads_kv: Option<u64>,
    pub vocab_size: Option<u64>,
    pub file_type: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GgufValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Result of reading a single GGUF file's header.
pub struct GgufHeader {
    pub validation: GgufValidation,
    pub metadata: GgufMetadata,
}

#[derive(Debug, Clone, Copy)]
enum GgufType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    Bool,
    String,
    Array,
    U64,
    I64,
    F64,
}

impl GgufType {
    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => GgufType::U8,
            1 => GgufType::I8,
            2 => GgufType::U16,
            3 => GgufType::I16,
            4 => GgufType::U32,
            5 => GgufType::I32,
            6 => GgufType::F32,
            7 => GgufType::Bool,
            8 => GgufType::String,
            9 => GgufType::Array,
            10 => GgufType::U64,
            11 => GgufType::I64,
            12 => GgufType::F64,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
enum GgufValue {
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Array,
}

struct Reader<R: Read> {
    inner: R,
}

impl<R: Read> Reader<R> {
    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, String> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }

    fn read_u32(&mut self) -> Result<u32, String> {
        let buf = self.read_exact_bytes(4)?;
        Ok(u32::from_le_bytes(buf.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, String> {
        let buf = self.read_exact_bytes(8)?;
        Ok(u64::from_le_bytes(buf.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32, String> {
        Ok(self.read_u32()? as i32)
    }

    fn read_i64(&mut self) -> Result<i64, String> {
        Ok(self.read_u64()? as i64)
    }

    fn read_f32(&mut self) -> Result<f32, String> {
        let buf = self.read_exact_bytes(4)?;
        Ok(f32::from_le_bytes(buf.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64, String> {
        let buf = self.read_exact_bytes(8)?;
        Ok(f64::from_le_bytes(buf.try_into().unwrap()))
    }

    fn read_bool(&mut self) -> Result<bool, String> {
        Ok(self.read_exact_bytes(1)?[0] != 0)
    }

    fn read_string(&mut self) -> Result<String, String> {
        let len = self.read_u64()? as usize;
        let bytes = self.read_exact_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads one scalar value of `ty`, or fully skips an array value,
    /// returning `GgufValue::Array` as a marker since arrays are never
    /// among the metadata fields the inspector cares about.
    fn read_value(&mut self, ty: GgufType) -> Result<GgufValue, String> {
        Ok(match ty {
            GgufType::U8 => GgufValue::UInt(self.read_exact_bytes(1)?[0] as u64),
            GgufType::I8 => GgufValue::Int(self.read_exact_bytes(1)?[0] as i8 as i64),
            GgufType::U16 => {
                let buf = self.read_exact_bytes(2)?;
                GgufValue::UInt(u16::from_le_bytes(buf.try_into().unwrap()) as u64)
            }
            GgufType::I16 => {
                let buf = self.read_exact_bytes(2)?;
                GgufValue::Int(i16::from_le_bytes(buf.try_into().unwrap()) as i64)
            }
            GgufType::U32 => GgufValue::UInt(self.read_u32()? as u64),
            GgufType::I32 => GgufValue::Int(self.read_i32()? as i64),
            GgufType::F32 => GgufValue::Float(self.read_f32()? as f64),
            GgufType::Bool => GgufValue::Bool(self.read_bool()?),
            GgufType::String => GgufValue::String(self.read_string()?),
            GgufType::U64 => GgufValue::UInt(self.read_u64()?),
            GgufType::I64 => GgufValue::Int(self.read_i64()?),
            GgufType::F64 => GgufValue::Float(self.read_f64()?),
            GgufType::Array => {
                let elem_type_raw = self.read_u32()?;
                let elem_type = GgufType::from_u32(elem_type_raw)
                    .ok_or_else(|| format!("unknown array element type {elem_type_raw}"))?;
                let len = self.read_u64()?;
                for _ in 0..len {
                    self.read_value(elem_type)?;
                }
                GgufValue::Array
            }
        })
    }
}

impl GgufValue {
    fn as_u64(&self) -> Option<u64> {
        match self {
            GgufValue::UInt(v) => Some(*v),
            GgufValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    fn as_string(&self) -> Option<String> {
        match self {
            GgufValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Reads the GGUF header (magic, version, tensor/metadata counts, and the
/// metadata key-value table) without touching tensor payload bytes.
pub fn read_header(path: &Path) -> GgufHeader {
    match read_header_inner(path) {
        Ok((metadata, warnings)) => GgufHeader {
            validation: GgufValidation { valid: warnings.is_empty(), errors: warnings },
            metadata,
        },
        Err(err) => GgufHeader {
            validation: GgufValidation { valid: false, errors: vec![err] },
            metadata: GgufMetadata::default(),
        },
    }
}

fn read_header_inner(path: &Path) -> Result<(GgufMetadata, Vec<String>), String> {
    let file = File::open(path).map_err(|e| format!("opening {}: {e}", path.display()))?;
    let mut reader = Reader { inner: BufReader::new(file) };

    let magic = reader.read_u32().map_err(|e| format!("reading magic: {e}"))?;
    if magic != GGUF_MAGIC {
        return Err(format!("bad magic bytes 0x{magic:08x}, expected GGUF"));
    }

    let version = reader.read_u32().map_err(|e| format!("reading version: {e}"))?;
    if version < 2 || version > 3 {
        return Err(format!("unsupported GGUF version {version}"));
    }

    let _tensor_count = reader.read_u64().map_err(|e| format!("reading tensor_count: {e}"))?;
    let metadata_kv_count = reader.read_u64().map_err(|e| format!("reading metadata_kv_count: {e}"))?;

    let mut raw: HashMap<String, GgufValue> = HashMap::new();
    let mut warnings = Vec::new();

    for _ in 0..metadata_kv_count {
        let key = match reader.read_string() {
            Ok(k) => k,
            Err(e) => {
                warnings.push(format!("truncated metadata table: {e}"));
                break;
            }
        };
        let type_raw = match reader.read_u32() {
            Ok(t) => t,
            Err(e) => {
                warnings.push(format!("truncated metadata table: {e}"));
                break;
            }
        };
        let ty = match GgufType::from_u32(type_raw) {
            Some(t) => t,
            None => {
                warnings.push(format!("unknown metadata value type {type_raw} for key {key}"));
                break;
            }
        };
        match reader.read_value(ty) {
            Ok(value) => {
                raw.insert(key, value);
            }
            Err(e) => {
                warnings.push(format!("truncated metadata value for key {key}: {e}"));
                break;
            }
        }
    }

    let architecture = raw.get("general.architecture").and_then(GgufValue::as_string);
    let arch_prefix = architecture.clone().unwrap_or_default();
    let lookup_u64 = |suffix: &str| -> Option<u64> {
        raw.get(&format!("{arch_prefix}.{suffix}")).and_then(GgufValue::as_u64)
    };

    let metadata = GgufMetadata {
        architecture,
        context_length: lookup_u64("context_length"),
        embedding_length: lookup_u64("embedding_length"),
        block_count: lookup_u64("block_count"),
        heads_q: lookup_u64("attention.head_count"),
        heads_kv: lookup_u64("attention.head_count_kv"),
        vocab_size: lookup_u64("vocab_size"),
        file_type: raw.get("general.file_type").and_then(GgufValue::as_u64),
    };

    Ok((metadata, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_string(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    fn minimal_gguf_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&GGUF_MAGIC.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes()); // version
        buf.extend_from_slice(&0u64.to_le_bytes()); // tensor_count
        buf.extend_from_slice(&2u64.to_le_bytes()); // metadata_kv_count

        write_string(&mut buf, "general.architecture");
        buf.extend_from_slice(&8u32.to_le_bytes()); // STRING
        write_string(&mut buf, "llama");

        write_string(&mut buf, "llama.context_length");
        buf.extend_from_slice(&4u32.to_le_bytes()); // U32
        buf.extend_from_slice(&4096u32.to_le_bytes());

        buf
    }

    #[test]
    fn parses_a_minimal_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        std::fs::File::create(&path).unwrap().write_all(&minimal_gguf_bytes()).unwrap();

        let header = read_header(&path);
        assert!(header.validation.valid);
        assert_eq!(header.metadata.architecture.as_deref(), Some("llama"));
        assert_eq!(header.metadata.context_length, Some(4096));
    }

    #[test]
    fn rejects_bad_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-gguf.gguf");
        std::fs::File::create(&path).unwrap().write_all(b"not a gguf file at all").unwrap();

        let header = read_header(&path);
        assert!(!header.validation.valid);
        assert!(header.validation.errors[0].contains("magic"));
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.gguf");
        let mut bytes = minimal_gguf_bytes();
        bytes.truncate(bytes.len() - 20);
        std::fs::File::create(&path).unwrap().write_all(&bytes).unwrap();

        let header = read_header(&path);
        assert!(!header.validation.valid);
    }
}
