use crate::codec::{CodecError, decompress};
use crate::protocol::{ARRAY_HEADER_SIZE, ArrayHeader};

/// A response array after decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedArray {
    pub header: ArrayHeader,
    pub bytes: Vec<u8>,
}

/// An array whose header is known and whose payload is still arriving.
#[derive(Debug)]
struct WireArray {
    header: ArrayHeader,
    compressed_len: usize,
    buf: Vec<u8>,
}

impl WireArray {
    fn new(header: ArrayHeader, max_array_bytes: u64) -> Result<Self, CodecError> {
        for len in [header.compressed_len, header.decoded_len] {
            if len > max_array_bytes {
                return Err(CodecError::ArrayTooLarge {
                    len,
                    max: max_array_bytes,
                });
            }
        }
        let compressed_len =
            usize::try_from(header.compressed_len).map_err(|_| CodecError::ArrayTooLarge {
                len: header.compressed_len,
                max: usize::MAX as u64,
            })?;
        Ok(Self {
            header,
            compressed_len,
            buf: Vec::new(),
        })
    }

    fn needed(&self) -> usize {
        self.compressed_len - self.buf.len()
    }

    fn is_full(&self) -> bool {
        self.buf.len() == self.compressed_len
    }

    fn finish(self) -> Result<DecodedArray, CodecError> {
        decode(self.header, &self.buf)
    }
}

fn decode(header: ArrayHeader, compressed: &[u8]) -> Result<DecodedArray, CodecError> {
    Ok(DecodedArray {
        header,
        bytes: decompress(compressed, header.decoded_len)?,
    })
}

/// Turns an ordered sequence of network messages back into whole arrays.
///
/// Arrays and their headers may straddle message boundaries; at most one
/// partial header or one partial array is carried between calls.
#[derive(Debug)]
pub struct Reassembler {
    header_buf: Vec<u8>,
    current: Option<WireArray>,
    max_array_bytes: u64,
}

impl Reassembler {
    pub fn new(max_array_bytes: u64) -> Self {
        Self {
            header_buf: Vec::with_capacity(ARRAY_HEADER_SIZE),
            current: None,
            max_array_bytes,
        }
    }

    /// Whether bytes of an unfinished header or array are buffered.
    pub fn has_partial(&self) -> bool {
        !self.header_buf.is_empty() || self.current.is_some()
    }

    /// Consumes one message, returning every array it completes, in order.
    ///
    /// An incomplete trailing header is kept for the next call. Any error is
    /// fatal for the stream; the reassembler should be discarded.
    pub fn feed(&mut self, msg: &[u8]) -> Result<Vec<DecodedArray>, CodecError> {
        let mut out = Vec::new();
        let mut rest = msg;

        loop {
            match self.current.as_mut() {
                Some(array) => {
                    let take = array.needed().min(rest.len());
                    array.buf.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    if !array.is_full() {
                        break;
                    }
                }
                None => {
                    let Some(header) = self.next_header(&mut rest) else {
                        break;
                    };
                    let array = WireArray::new(header, self.max_array_bytes)?;
                    if rest.len() >= array.compressed_len {
                        // Whole payload present: decode in place, no copy.
                        let (payload, tail) = rest.split_at(array.compressed_len);
                        out.push(decode(header, payload)?);
                        rest = tail;
                    } else {
                        self.current = Some(array);
                    }
                    continue;
                }
            }

            if let Some(array) = self.current.take() {
                out.push(array.finish()?);
            }
        }

        Ok(out)
    }

    fn next_header(&mut self, rest: &mut &[u8]) -> Option<ArrayHeader> {
        let bytes: &[u8] = *rest;
        if self.header_buf.is_empty() {
            if let Some(header) = ArrayHeader::decode(bytes) {
                *rest = &bytes[ARRAY_HEADER_SIZE..];
                return Some(header);
            }
        }

        let take = (ARRAY_HEADER_SIZE - self.header_buf.len()).min(bytes.len());
        self.header_buf.extend_from_slice(&bytes[..take]);
        *rest = &bytes[take..];

        let header = ArrayHeader::decode(&self.header_buf)?;
        self.header_buf.clear();
        Some(header)
    }
}
