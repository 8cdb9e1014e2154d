//! Byte-granular delta codec for point arrays.
//!
//! A decoded array is a run of fixed-size points: 3 little-endian f64 pose
//! components followed by 3 color bytes. In the compressed stream the first
//! point is stored verbatim. Every later point starts with a 3-byte
//! little-endian descriptor; bit `i` set means pose byte `i` follows in the
//! stream, bit `i` clear means it is copied from the previous decoded point.
//! The 3 color bytes always follow.

pub const POSE_SIZE: usize = 3 * 8;
pub const COLOR_SIZE: usize = 3;
pub const POINT_SIZE: usize = POSE_SIZE + COLOR_SIZE;
pub const DESCRIPTOR_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The compressed stream ended before the declared decoded length was produced.
    Truncated { offset: usize, needed: usize },
    /// Compressed bytes were left over once the decoded length was reached.
    TrailingBytes { consumed: usize, len: usize },
    /// The decoded length is not a whole number of points.
    Misaligned { decoded_len: u64 },
    ArrayTooLarge { len: u64, max: u64 },
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Truncated { offset, needed } => write!(
                f,
                "corrupt stream: truncated at byte {offset} ({needed} more needed)"
            ),
            CodecError::TrailingBytes { consumed, len } => write!(
                f,
                "corrupt stream: consumed {consumed} of {len} compressed bytes"
            ),
            CodecError::Misaligned { decoded_len } => write!(
                f,
                "corrupt stream: decoded length {decoded_len} is not a multiple of {POINT_SIZE}"
            ),
            CodecError::ArrayTooLarge { len, max } => {
                write!(f, "corrupt stream: array of {len} bytes exceeds {max}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.bytes.get(self.pos).ok_or(CodecError::Truncated {
            offset: self.pos,
            needed: 1,
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn read_exact(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: end - self.bytes.len(),
            });
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_descriptor(&mut self) -> Result<u32, CodecError> {
        let b = self.read_exact(DESCRIPTOR_SIZE)?;
        Ok(u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16)
    }
}

/// Decodes `compressed` into exactly `decoded_len` bytes.
///
/// Fails unless the whole input is consumed and exactly `decoded_len` bytes
/// are produced.
pub fn decompress(compressed: &[u8], decoded_len: u64) -> Result<Vec<u8>, CodecError> {
    let decoded_len_usize = usize::try_from(decoded_len).map_err(|_| CodecError::ArrayTooLarge {
        len: decoded_len,
        max: usize::MAX as u64,
    })?;
    if decoded_len_usize % POINT_SIZE != 0 {
        return Err(CodecError::Misaligned { decoded_len });
    }

    let points = decoded_len_usize / POINT_SIZE;
    let mut out = Vec::with_capacity(decoded_len_usize.min(max_decoded_len(compressed.len())));
    let mut r = Reader::new(compressed);

    if points > 0 {
        out.extend_from_slice(r.read_exact(POINT_SIZE)?);
    }

    for _ in 1..points {
        let descriptor = r.read_descriptor()?;
        let prev = out.len() - POINT_SIZE;
        for i in 0..POSE_SIZE {
            let byte = if descriptor & (1 << i) != 0 {
                r.read_u8()?
            } else {
                out[prev + i]
            };
            out.push(byte);
        }
        out.extend_from_slice(r.read_exact(COLOR_SIZE)?);
    }

    if r.pos != compressed.len() {
        return Err(CodecError::TrailingBytes {
            consumed: r.pos,
            len: compressed.len(),
        });
    }
    debug_assert_eq!(out.len(), decoded_len_usize);
    Ok(out)
}

/// Most decoded bytes `compressed_len` stream bytes can describe: the first
/// point is verbatim and every later one costs at least a descriptor and
/// its colors.
fn max_decoded_len(compressed_len: usize) -> usize {
    match compressed_len.checked_sub(POINT_SIZE) {
        Some(rest) => POINT_SIZE * (1 + rest / (DESCRIPTOR_SIZE + COLOR_SIZE)),
        None => 0,
    }
}

/// Produces the stream [`decompress`] reads back into `decoded`.
pub fn compress(decoded: &[u8]) -> Result<Vec<u8>, CodecError> {
    if decoded.len() % POINT_SIZE != 0 {
        return Err(CodecError::Misaligned {
            decoded_len: decoded.len() as u64,
        });
    }

    let mut out = Vec::with_capacity(decoded.len());
    let mut points = decoded.chunks_exact(POINT_SIZE);
    let Some(first) = points.next() else {
        return Ok(out);
    };
    out.extend_from_slice(first);

    let mut prev = first;
    for point in points {
        let descriptor_at = out.len();
        out.extend_from_slice(&[0; DESCRIPTOR_SIZE]);

        let mut descriptor = 0u32;
        for i in 0..POSE_SIZE {
            if point[i] != prev[i] {
                descriptor |= 1 << i;
                out.push(point[i]);
            }
        }
        out[descriptor_at..descriptor_at + DESCRIPTOR_SIZE]
            .copy_from_slice(&descriptor.to_le_bytes()[..DESCRIPTOR_SIZE]);
        out.extend_from_slice(&point[POSE_SIZE..]);
        prev = point;
    }
    Ok(out)
}

/// Packs one point as it appears in a decoded array.
pub fn encode_point(pose: [f64; 3], color: [u8; 3]) -> [u8; POINT_SIZE] {
    let mut out = [0u8; POINT_SIZE];
    for (i, v) in pose.iter().enumerate() {
        out[i * 8..(i + 1) * 8].copy_from_slice(&v.to_le_bytes());
    }
    out[POSE_SIZE..].copy_from_slice(&color);
    out
}
