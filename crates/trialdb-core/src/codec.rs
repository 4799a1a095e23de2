//! Blob encoding for sample matrices.
//!
//! The store never interprets matrix bytes itself; it is handed a
//! [`MatrixCodec`] at construction and maps an absent matrix to SQL `NULL`
//! before the codec is involved.
//!
//! [`BinaryMatrixCodec`] layout (all integers little-endian):
//!
//! ```text
//! 0   magic     "TMX1"
//! 4   dtype     1 = f64
//! 5   reserved  3 zero bytes
//! 8   rows      u32
//! 12  cols      u32 (always 8)
//! 16  values    rows * cols f64, row-major
//! ```

use zerocopy::byteorder::little_endian::{F64, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{TrialError, TrialResult};
use crate::sample::{SampleMatrix, SampleRow, METRIC_COUNT};

pub trait MatrixCodec: Send + Sync {
    fn encode(&self, matrix: &SampleMatrix) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> TrialResult<SampleMatrix>;

    fn encode_optional(&self, matrix: Option<&SampleMatrix>) -> Option<Vec<u8>> {
        matrix.map(|m| self.encode(m))
    }

    fn decode_optional(&self, bytes: Option<&[u8]>) -> TrialResult<Option<SampleMatrix>> {
        bytes.map(|b| self.decode(b)).transpose()
    }
}

const MAGIC: [u8; 4] = *b"TMX1";
const DTYPE_F64_LE: u8 = 1;
const HEADER_LEN: usize = std::mem::size_of::<BlobHeader>();

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct BlobHeader {
    magic: [u8; 4],
    dtype: u8,
    reserved: [u8; 3],
    rows: U32,
    cols: U32,
}

/// Self-describing little-endian f64 matrix encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryMatrixCodec;

impl MatrixCodec for BinaryMatrixCodec {
    fn encode(&self, matrix: &SampleMatrix) -> Vec<u8> {
        let header = BlobHeader {
            magic: MAGIC,
            dtype: DTYPE_F64_LE,
            reserved: [0; 3],
            rows: U32::new(matrix.row_count() as u32),
            cols: U32::new(METRIC_COUNT as u32),
        };

        let mut out = Vec::with_capacity(HEADER_LEN + matrix.row_count() * METRIC_COUNT * 8);
        out.extend_from_slice(header.as_bytes());
        for row in matrix.rows() {
            for value in row {
                out.extend_from_slice(F64::new(*value).as_bytes());
            }
        }
        out
    }

    fn decode(&self, bytes: &[u8]) -> TrialResult<SampleMatrix> {
        let (header, body) = BlobHeader::ref_from_prefix(bytes)
            .map_err(|_| codec_err(format!("blob too short: {} bytes", bytes.len())))?;

        if header.magic != MAGIC {
            return Err(codec_err("bad magic".into()));
        }
        if header.dtype != DTYPE_F64_LE {
            return Err(codec_err(format!("unsupported element type {}", header.dtype)));
        }
        if header.reserved != [0; 3] {
            return Err(codec_err("reserved header bytes are not zero".into()));
        }
        let cols = header.cols.get() as usize;
        if cols != METRIC_COUNT {
            return Err(codec_err(format!(
                "expected {METRIC_COUNT} columns, found {cols}"
            )));
        }
        let rows = header.rows.get() as usize;
        let expected = rows
            .checked_mul(cols * std::mem::size_of::<f64>())
            .ok_or_else(|| codec_err(format!("row count overflows: {rows}")))?;
        if body.len() != expected {
            return Err(codec_err(format!(
                "body is {} bytes, header promises {expected}",
                body.len()
            )));
        }

        let mut decoded: Vec<SampleRow> = Vec::with_capacity(rows);
        for chunk in body.chunks_exact(METRIC_COUNT * std::mem::size_of::<f64>()) {
            let mut row = [0.0; METRIC_COUNT];
            for (dst, src) in row.iter_mut().zip(chunk.chunks_exact(8)) {
                *dst = F64::read_from_bytes(src)
                    .map_err(|_| codec_err("short f64 value".into()))?
                    .get();
            }
            decoded.push(row);
        }

        SampleMatrix::from_rows(decoded).ok_or_else(|| codec_err("zero-row matrix".into()))
    }
}

fn codec_err(reason: String) -> TrialError {
    TrialError::Codec(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::FAILED_ROW;

    fn sample() -> SampleMatrix {
        SampleMatrix::from_rows(vec![
            [100.0, 5.0, 2.0, 3.0, 10.0, 1500.0, 120.0, 30.0],
            FAILED_ROW,
        ])
        .unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let codec = BinaryMatrixCodec;
        let m = sample();
        let bytes = codec.encode(&m);
        assert_eq!(bytes.len(), HEADER_LEN + 2 * METRIC_COUNT * 8);
        assert_eq!(codec.decode(&bytes).unwrap(), m);
    }

    #[test]
    fn test_absent_roundtrip() {
        let codec = BinaryMatrixCodec;
        assert!(codec.encode_optional(None).is_none());
        assert!(codec.decode_optional(None).unwrap().is_none());
    }

    #[test]
    fn test_header_layout() {
        let bytes = BinaryMatrixCodec.encode(&sample());
        assert_eq!(&bytes[0..4], b"TMX1");
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &8u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &100.0f64.to_le_bytes());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = BinaryMatrixCodec.encode(&sample());
        bytes[0] = b'X';
        assert!(matches!(
            BinaryMatrixCodec.decode(&bytes),
            Err(TrialError::Codec(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_body() {
        let bytes = BinaryMatrixCodec.encode(&sample());
        assert!(BinaryMatrixCodec.decode(&bytes[..bytes.len() - 3]).is_err());
        assert!(BinaryMatrixCodec.decode(&bytes[..10]).is_err());
    }

    #[test]
    fn test_rejects_wrong_column_count() {
        let mut bytes = BinaryMatrixCodec.encode(&sample());
        bytes[12..16].copy_from_slice(&4u32.to_le_bytes());
        assert!(BinaryMatrixCodec.decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_zero_rows() {
        let mut bytes = BinaryMatrixCodec.encode(&sample());
        bytes.truncate(HEADER_LEN);
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(BinaryMatrixCodec.decode(&bytes).is_err());
    }
}
