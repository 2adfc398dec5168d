// THEORY:
// `.flo` is the de-facto interchange format for optical flow ground truth and
// estimates. It is deliberately trivial:
//
//   bytes  contents
//   0-3    tag: "PIEH" in ASCII, which read as a little-endian f32 is 202021.25
//          (a sanity check that floats are represented correctly)
//   4-7    width as a little-endian i32
//   8-11   height as a little-endian i32
//   12-    width * height * 2 little-endian f32 values, u and v interleaved in
//          row order: u[0,0], v[0,0], u[0,1], v[0,1], ...
//
// The codec works on any `Read`/`Write`; the path helpers add the extension
// check the format's tooling has always enforced.

use crate::error::{Error, Result};
use ndarray::{Array3, ArrayView3};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// The header tag as a float.
pub const TAG_FLOAT: f32 = 202021.25;
/// The header tag as text.
pub const TAG_STRING: &str = "PIEH";
/// Extension of flow files, including the dot.
pub const FLO_EXTENSION: &str = ".flo";

const HEADER_LEN: usize = 12;

/// Decodes one flow field from a `.flo` byte stream.
pub fn decode_flow<R: Read>(mut reader: R) -> Result<Array3<f32>> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_full(&mut reader, &mut header)?;
    if got < HEADER_LEN {
        return Err(Error::Truncated { expected: HEADER_LEN, actual: got });
    }

    let tag = f32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if tag != TAG_FLOAT {
        return Err(Error::InvalidTag(tag));
    }
    let width = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let height = i32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if width < 0 || height < 0 {
        return Err(Error::shape(format!("negative .flo dimensions {width} x {height}")));
    }
    let (width, height) = (width as usize, height as usize);

    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(2 * size_of::<f32>()))
        .ok_or_else(|| Error::shape(format!(".flo dimensions {width} x {height} are too large")))?;
    // The header is untrusted: grow the buffer only as bytes actually arrive.
    let mut data = Vec::new();
    reader.take(expected as u64).read_to_end(&mut data)?;
    if data.len() < expected {
        return Err(Error::Truncated { expected: HEADER_LEN + expected, actual: HEADER_LEN + data.len() });
    }

    let values: Vec<f32> = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Array3::from_shape_vec((height, width, 2), values).map_err(|e| Error::shape(e.to_string()))
}

/// Encodes one (H, W, 2) flow field as `.flo` bytes.
pub fn encode_flow<W: Write>(mut writer: W, flow: ArrayView3<'_, f32>) -> Result<()> {
    let (height, width, components) = flow.dim();
    if components != 2 {
        return Err(Error::shape(format!("flow must have shape (H, W, 2), got {:?}", flow.shape())));
    }
    let width_i32 = i32::try_from(width).map_err(|_| Error::shape(format!("width {width} does not fit in .flo")))?;
    let height_i32 = i32::try_from(height).map_err(|_| Error::shape(format!("height {height} does not fit in .flo")))?;

    writer.write_all(&TAG_FLOAT.to_le_bytes())?;
    writer.write_all(&width_i32.to_le_bytes())?;
    writer.write_all(&height_i32.to_le_bytes())?;
    // Logical iteration order is row-major regardless of the memory layout.
    for value in flow.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a `.flo` file.
pub fn read_flow<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
    let path = path.as_ref();
    check_extension(path)?;
    let flow = decode_flow(BufReader::new(File::open(path)?))?;
    debug!(path = %path.display(), height = flow.dim().0, width = flow.dim().1, "read flow");
    Ok(flow)
}

/// Writes a `.flo` file.
pub fn write_flow<P: AsRef<Path>>(path: P, flow: ArrayView3<'_, f32>) -> Result<()> {
    let path = path.as_ref();
    check_extension(path)?;
    encode_flow(BufWriter::new(File::create(path)?), flow)?;
    debug!(path = %path.display(), "wrote flow");
    Ok(())
}

fn check_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("flo") => Ok(()),
        _ => Err(Error::InvalidExtension { path: path.to_path_buf(), expected: FLO_EXTENSION }),
    }
}

/// Like `read_exact`, but reports how much was read instead of failing on EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_flow() -> Array3<f32> {
        Array3::from_shape_fn((3, 4, 2), |(y, x, c)| if c == 0 { x as f32 * 0.5 } else { -(y as f32) })
    }

    #[test]
    fn tag_spells_pieh() {
        assert_eq!(&TAG_FLOAT.to_le_bytes(), TAG_STRING.as_bytes());
    }

    #[test]
    fn header_layout() {
        let mut bytes = Vec::new();
        encode_flow(&mut bytes, sample_flow().view()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 3 * 4 * 2 * 4);
        assert_eq!(&bytes[0..4], b"PIEH");
        assert_eq!(i32::from_le_bytes(bytes[4..8].try_into().unwrap()), 4);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), 3);
        // u[0,1], v[0,1] follow u[0,0], v[0,0]
        assert_eq!(f32::from_le_bytes(bytes[20..24].try_into().unwrap()), 0.5);
    }

    #[test]
    fn decode_reads_back_encoded_field() {
        let flow = sample_flow();
        let mut bytes = Vec::new();
        encode_flow(&mut bytes, flow.view()).unwrap();
        let decoded = decode_flow(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, flow);
    }

    #[test]
    fn transposed_views_are_written_in_logical_order() {
        let flow = sample_flow();
        let transposed = flow.view().permuted_axes([1, 0, 2]);
        let mut bytes = Vec::new();
        encode_flow(&mut bytes, transposed).unwrap();
        let decoded = decode_flow(Cursor::new(bytes)).unwrap();
        assert_eq!(decoded, transposed);
    }

    #[test]
    fn bad_tag_is_rejected() {
        let mut bytes = Vec::new();
        encode_flow(&mut bytes, sample_flow().view()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_flow(Cursor::new(bytes)), Err(Error::InvalidTag(_))));
    }

    #[test]
    fn truncated_data_is_rejected() {
        let mut bytes = Vec::new();
        encode_flow(&mut bytes, sample_flow().view()).unwrap();
        bytes.truncate(bytes.len() - 3);
        match decode_flow(Cursor::new(bytes)) {
            Err(Error::Truncated { expected, actual }) => assert_eq!(expected - actual, 3),
            other => panic!("expected Truncated, got {:?}", other),
        }

        assert!(matches!(decode_flow(Cursor::new(vec![0u8; 5])), Err(Error::Truncated { .. })));
    }

    fn header(width: i32, height: i32) -> Vec<u8> {
        let mut bytes = TAG_FLOAT.to_le_bytes().to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        assert!(matches!(decode_flow(Cursor::new(header(i32::MAX, i32::MAX))), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn huge_header_without_data_is_truncated() {
        match decode_flow(Cursor::new(header(40000, 40000))) {
            Err(Error::Truncated { expected, actual }) => {
                assert_eq!(expected, HEADER_LEN + 40000 * 40000 * 8);
                assert_eq!(actual, HEADER_LEN);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn wrong_component_count_is_rejected() {
        let flow = Array3::<f32>::zeros((2, 2, 3));
        assert!(matches!(encode_flow(Vec::new(), flow.view()), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn files_need_flo_extension() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("frame_0001.bin");
        assert!(matches!(write_flow(&bad, sample_flow().view()), Err(Error::InvalidExtension { .. })));
        assert!(matches!(read_flow(&bad), Err(Error::InvalidExtension { .. })));

        let good = dir.path().join("frame_0001.flo");
        write_flow(&good, sample_flow().view()).unwrap();
        assert_eq!(read_flow(&good).unwrap(), sample_flow());
    }
}
