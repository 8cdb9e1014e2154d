//! Hierarchical cell addresses.
//!
//! An address is a time selection plus a root-to-leaf list of digits. Each
//! digit packs one bit per active dimension: bit 0 longitude, bit 1 latitude
//! (from depth `LATITUDE_ACTIVATION`), bit 2 altitude (from depth
//! `ALTITUDE_ACTIVATION`).
//!
//! Text form: `/{mode}/{t0},{t1}/{digits}/{span}` (digits may be empty).
//!
//! Binary form (little-endian, `ADDRESS_BUFFER_SIZE` bytes):
//!   00 : i64      t0
//!   08 : i64      t1
//!   16 : u8       digit count
//!   17 : u8       mode
//!   18 : u8       span
//!   19 : [u8; 40] digits, zero padded

use std::fmt;
use std::str::FromStr;

use crate::math::{
    ALT_MIN, ALT_RANGE, EARTH_RADIUS, LAT_MIN, LAT_RANGE, LON_MIN, LON_RANGE, SphericalPose, Vec3,
    spherical_to_cartesian,
};
use crate::time::{TimeMode, TimeRange, TimeSelection};

/// Deepest an address can go.
pub const MAX_DIGITS: usize = 40;
/// Largest digit value once all three dimensions are active.
pub const MAX_SCALE_VALUE: u8 = 7;
/// Depth from which latitude is subdivided.
pub const LATITUDE_ACTIVATION: usize = 1;
/// Depth from which altitude is subdivided.
pub const ALTITUDE_ACTIVATION: usize = 10;

pub const TIME_SIZE: usize = 2 * 8;
pub const DESC_SIZE: usize = 3;
pub const ADDRESS_BUFFER_SIZE: usize = TIME_SIZE + DESC_SIZE + MAX_DIGITS;

const TIME_OFFSET: usize = 0;
const SIZE_OFFSET: usize = TIME_OFFSET + TIME_SIZE;
const MODE_OFFSET: usize = SIZE_OFFSET + 1;
const SPAN_OFFSET: usize = MODE_OFFSET + 1;
const DIGITS_OFFSET: usize = SPAN_OFFSET + 1;

/// Exclusive upper bound of the digit at `position`.
pub const fn max_digit_value(position: usize) -> u8 {
    if position < LATITUDE_ACTIVATION {
        1 + (MAX_SCALE_VALUE >> 2)
    } else if position < ALTITUDE_ACTIVATION {
        1 + (MAX_SCALE_VALUE >> 1)
    } else {
        1 + MAX_SCALE_VALUE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    InvalidFormat { input: String, reason: &'static str },
    DigitOutOfRange { position: usize, digit: u8 },
    DepthExceeded,
    InvalidMode(u8),
    BufferTooShort { len: usize },
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::InvalidFormat { input, reason } => {
                write!(f, "invalid address {input:?}: {reason}")
            }
            AddressError::DigitOutOfRange { position, digit } => write!(
                f,
                "digit {digit} out of range at position {position} (max {})",
                max_digit_value(*position)
            ),
            AddressError::DepthExceeded => {
                write!(f, "address deeper than {MAX_DIGITS} digits")
            }
            AddressError::InvalidMode(mode) => write!(f, "invalid address mode: {mode}"),
            AddressError::BufferTooShort { len } => write!(
                f,
                "address buffer too short: {len} < {ADDRESS_BUFFER_SIZE} bytes"
            ),
        }
    }
}

impl std::error::Error for AddressError {}

/// A node of the space-time subdivision tree.
///
/// Value type: copies are independent, and equality, ordering and hashing
/// all follow the canonical byte form (unused digit slots are always zero).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    mode: TimeMode,
    time: TimeRange,
    size: u8,
    digits: [u8; MAX_DIGITS],
    span: u8,
}

impl Address {
    /// Empty (root) address for a time selection.
    pub fn root(selection: TimeSelection, span: u8) -> Self {
        Self {
            mode: selection.mode,
            time: selection.range,
            size: 0,
            digits: [0; MAX_DIGITS],
            span,
        }
    }

    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let invalid = |reason: &'static str| AddressError::InvalidFormat {
            input: text.to_string(),
            reason,
        };

        let parts: Vec<&str> = text.split('/').collect();
        if parts.len() != 5 {
            return Err(invalid("expected /mode/t0,t1/digits/span"));
        }
        if !parts[0].is_empty() {
            return Err(invalid("must start with '/'"));
        }
        if parts[1].is_empty() || parts[2].is_empty() || parts[4].is_empty() {
            return Err(invalid("missing mode, time or span"));
        }

        let mode: u8 = parts[1].parse().map_err(|_| invalid("mode is not a number"))?;
        let mode = TimeMode::try_from(mode).map_err(|_| invalid("unknown mode"))?;
        if !mode.is_set() {
            return Err(invalid("mode 0 is reserved"));
        }

        let (t0, t1) = parts[2]
            .split_once(',')
            .ok_or_else(|| invalid("time must be t0,t1"))?;
        let t0: i64 = t0.parse().map_err(|_| invalid("t0 is not an integer"))?;
        let t1: i64 = t1.parse().map_err(|_| invalid("t1 is not an integer"))?;

        let span: u8 = parts[4].parse().map_err(|_| invalid("span is not a number"))?;

        let mut address = Self::root(TimeSelection::new(mode, TimeRange::new(t0, t1)), span);
        for ch in parts[3].chars() {
            let digit = ch.to_digit(10).ok_or_else(|| invalid("digits must be decimal"))?;
            address.push(digit as u8).map_err(|e| match e {
                AddressError::DepthExceeded => invalid("too many digits"),
                _ => invalid("digit out of range for its position"),
            })?;
        }

        Ok(address)
    }

    /// Number of digits, i.e. the depth of this cell.
    pub fn size(&self) -> usize {
        usize::from(self.size)
    }

    pub fn is_root(&self) -> bool {
        self.size == 0
    }

    pub fn digits(&self) -> &[u8] {
        &self.digits[..self.size()]
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn time(&self) -> TimeRange {
        self.time
    }

    pub fn selection(&self) -> TimeSelection {
        TimeSelection::new(self.mode, self.time)
    }

    pub fn span(&self) -> u8 {
        self.span
    }

    pub fn set_span(&mut self, span: u8) {
        self.span = span;
    }

    /// Descends one level.
    pub fn push(&mut self, digit: u8) -> Result<(), AddressError> {
        let position = self.size();
        if position >= MAX_DIGITS {
            return Err(AddressError::DepthExceeded);
        }
        if digit >= max_digit_value(position) {
            return Err(AddressError::DigitOutOfRange { position, digit });
        }
        self.digits[position] = digit;
        self.size += 1;
        Ok(())
    }

    /// Backtracks one level, returning the removed digit.
    pub fn pop(&mut self) -> Option<u8> {
        if self.size == 0 {
            return None;
        }
        self.size -= 1;
        let position = self.size();
        let digit = self.digits[position];
        self.digits[position] = 0;
        Some(digit)
    }

    /// The address one level up, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let mut parent = *self;
        parent.pop().map(|_| parent)
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_BUFFER_SIZE] {
        let mut out = [0u8; ADDRESS_BUFFER_SIZE];
        out[TIME_OFFSET..TIME_OFFSET + 8].copy_from_slice(&self.time.t0.to_le_bytes());
        out[TIME_OFFSET + 8..SIZE_OFFSET].copy_from_slice(&self.time.t1.to_le_bytes());
        out[SIZE_OFFSET] = self.size;
        out[MODE_OFFSET] = self.mode.as_u8();
        out[SPAN_OFFSET] = self.span;
        out[DIGITS_OFFSET..].copy_from_slice(&self.digits);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() < ADDRESS_BUFFER_SIZE {
            return Err(AddressError::BufferTooShort { len: bytes.len() });
        }

        let mode = bytes[MODE_OFFSET];
        let mode = TimeMode::try_from(mode).map_err(|_| AddressError::InvalidMode(mode))?;
        if !mode.is_set() {
            return Err(AddressError::InvalidMode(0));
        }

        let size = usize::from(bytes[SIZE_OFFSET]);
        if size > MAX_DIGITS {
            return Err(AddressError::DepthExceeded);
        }

        let time = TimeRange::new(read_i64_le(bytes, TIME_OFFSET), read_i64_le(bytes, TIME_OFFSET + 8));
        let mut address = Self::root(TimeSelection::new(mode, time), bytes[SPAN_OFFSET]);
        for &digit in &bytes[DIGITS_OFFSET..DIGITS_OFFSET + size] {
            address.push(digit)?;
        }
        Ok(address)
    }

    /// Minimum corner of the cell.
    ///
    /// Each digit contributes one mantissa bit to up to three binary
    /// fractions, which are then stretched over their physical ranges. The
    /// radius includes the Earth radius.
    pub fn edge_pose(&self) -> SphericalPose {
        let mut frac = [0.0f64; 3];
        let mut bit = [1.0f64; 3];

        for (i, &digit) in self.digits().iter().enumerate() {
            bit[0] *= 0.5;
            frac[0] += f64::from(digit & 0x01) * bit[0];

            if i < LATITUDE_ACTIVATION {
                continue;
            }
            bit[1] *= 0.5;
            frac[1] += f64::from((digit >> 1) & 0x01) * bit[1];

            if i < ALTITUDE_ACTIVATION {
                continue;
            }
            bit[2] *= 0.5;
            frac[2] += f64::from((digit >> 2) & 0x01) * bit[2];
        }

        SphericalPose::new(
            LON_MIN + frac[0] * LON_RANGE,
            LAT_MIN + frac[1] * LAT_RANGE,
            EARTH_RADIUS + ALT_MIN + frac[2] * ALT_RANGE,
        )
    }

    /// Edge pose shifted by half the cell's extent in each dimension.
    ///
    /// A dimension split `n` times has extent `range / 2^n`; latitude and
    /// altitude start splitting later than longitude.
    pub fn center_pose(&self) -> SphericalPose {
        let size = self.size();
        let half = |range: f64, splits: usize| range / 2f64.powi(splits as i32 + 1);
        let edge = self.edge_pose();
        SphericalPose::new(
            edge.lon + half(LON_RANGE, size),
            edge.lat + half(LAT_RANGE, size.saturating_sub(LATITUDE_ACTIVATION)),
            edge.radius + half(ALT_RANGE, size.saturating_sub(ALTITUDE_ACTIVATION)),
        )
    }

    pub fn center_cartesian(&self) -> Vec3 {
        spherical_to_cartesian(self.center_pose())
    }
}

fn read_i64_le(bytes: &[u8], offset: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(b)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{},{}/", self.mode.as_u8(), self.time.t0, self.time.t1)?;
        for digit in self.digits() {
            write!(f, "{digit}")?;
        }
        write!(f, "/{}", self.span)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn parses_root_address() {
        let a = Address::parse("/1/950486422,950486422//0").expect("parse");
        assert_eq!(a.mode(), TimeMode::Before);
        assert_eq!(a.time(), TimeRange::new(950486422, 950486422));
        assert!(a.digits().is_empty());
        assert_eq!(a.span(), 0);
    }

    #[test]
    fn digit_bounds_follow_dimension_activation() {
        assert_eq!(max_digit_value(0), 2);
        assert_eq!(max_digit_value(1), 4);
        assert_eq!(max_digit_value(9), 4);
        assert_eq!(max_digit_value(10), 8);
        assert_eq!(max_digit_value(39), 8);
    }

    #[test]
    fn text_form_round_trips() {
        for text in [
            "/1/950486422,950486422//0",
            "/3/-1,95048640/1/7",
            "/5/-3773779200,12/1320123012345670/255",
        ] {
            let a: Address = text.parse().expect("parse");
            assert_eq!(a.to_string(), text);
            assert_eq!(Address::parse(&a.to_string()), Ok(a));
        }
    }

    #[test]
    fn byte_form_round_trips() {
        let mut a = Address::root(
            TimeSelection::new(TimeMode::And, TimeRange::new(-42, i64::MAX)),
            9,
        );
        for (position, digit) in [1u8, 3, 2, 0, 1, 3, 3, 2, 1, 0, 7, 6, 5].into_iter().enumerate() {
            assert!(digit < max_digit_value(position));
            a.push(digit).expect("push");
        }
        let bytes = a.to_bytes();
        assert_eq!(Address::from_bytes(&bytes), Ok(a));
    }

    #[test]
    fn byte_layout_matches_wire_offsets() {
        let a = Address::parse("/2/1,-1/013/4").expect("parse");
        let bytes = a.to_bytes();
        assert_eq!(bytes.len(), 59);
        assert_eq!(&bytes[0..8], &1i64.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-1i64).to_le_bytes());
        assert_eq!(bytes[16], 3);
        assert_eq!(bytes[17], 2);
        assert_eq!(bytes[18], 4);
        assert_eq!(&bytes[19..22], &[0, 1, 3]);
        assert!(bytes[22..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_malformed_text() {
        for text in [
            "",
            "1/2,3//0",
            "/1/2,3/0",
            "/1/2,3//0/extra",
            "//2,3//0",
            "/1///0",
            "/1/2,3//",
            "/0/2,3//0",
            "/6/2,3//0",
            "/x/2,3//0",
            "/1/23//0",
            "/1/2,y//0",
            "/1/2,3/2/0",
            "/1/2,3/0a/0",
            "/1/2,3//256",
        ] {
            let err = Address::parse(text).expect_err(text);
            assert!(
                matches!(err, AddressError::InvalidFormat { .. }),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn rejects_too_many_digits() {
        let forty = format!("1{}{}", "3".repeat(9), "7".repeat(30));
        let deepest = Address::parse(&format!("/1/0,0/{forty}/0")).expect("parse");
        assert_eq!(deepest.size(), MAX_DIGITS);
        assert!(Address::parse(&format!("/1/0,0/{forty}7/0")).is_err());
    }

    #[test]
    fn push_and_pop_keep_the_value_canonical() {
        let root = Address::root(TimeSelection::default(), 0);
        let mut a = root;
        a.push(1).expect("push");
        a.push(3).expect("push");
        assert_eq!(a.pop(), Some(3));
        assert_eq!(a.pop(), Some(1));
        assert_eq!(a.pop(), None);
        assert_eq!(a, root);
    }

    #[test]
    fn push_rejects_out_of_range_digits() {
        let mut a = Address::root(TimeSelection::default(), 0);
        assert_eq!(
            a.push(2),
            Err(AddressError::DigitOutOfRange {
                position: 0,
                digit: 2
            })
        );
        a.push(1).expect("push");
        assert!(a.push(4).is_err());
        for _ in 1..MAX_DIGITS {
            a.push(0).expect("push");
        }
        assert_eq!(a.push(0), Err(AddressError::DepthExceeded));
    }

    #[test]
    fn parent_drops_last_digit() {
        let a = Address::parse("/1/0,0/132/0").expect("parse");
        assert_eq!(a.parent().map(|p| p.to_string()), Some("/1/0,0/13/0".to_string()));
        assert_eq!(Address::parse("/1/0,0//0").expect("parse").parent(), None);
    }

    #[test]
    fn from_bytes_validates_header_fields() {
        let a = Address::parse("/1/0,0/1/0").expect("parse");
        let mut bytes = a.to_bytes();
        assert_eq!(
            Address::from_bytes(&bytes[..58]),
            Err(AddressError::BufferTooShort { len: 58 })
        );

        bytes[17] = 9;
        assert_eq!(Address::from_bytes(&bytes), Err(AddressError::InvalidMode(9)));

        let mut bytes = a.to_bytes();
        bytes[16] = 41;
        assert_eq!(Address::from_bytes(&bytes), Err(AddressError::DepthExceeded));

        let mut bytes = a.to_bytes();
        bytes[19] = 2;
        assert!(matches!(
            Address::from_bytes(&bytes),
            Err(AddressError::DigitOutOfRange { position: 0, .. })
        ));
    }

    #[test]
    fn root_edge_is_minimum_corner() {
        let root = Address::root(TimeSelection::default(), 0);
        let edge = root.edge_pose();
        assert_close(edge.lon, LON_MIN, 1e-12);
        assert_close(edge.lat, LAT_MIN, 1e-12);
        assert_close(edge.radius, EARTH_RADIUS + ALT_MIN, 1e-6);
    }

    #[test]
    fn root_center_is_on_the_equator_prime_meridian() {
        let root = Address::root(TimeSelection::default(), 0);
        let c = root.center_pose();
        assert_close(c.lon, 0.0, 1e-12);
        assert_close(c.lat, 0.0, 1e-12);
        assert_close(c.radius, EARTH_RADIUS, 1e-6);

        let p = root.center_cartesian();
        assert_close(p.z, EARTH_RADIUS, 1e-6);
    }

    #[test]
    fn digits_set_mantissa_bits_per_dimension() {
        // Depth 0 only splits longitude: digit 1 selects the eastern half.
        let east = Address::parse("/1/0,0/1/0").expect("parse");
        assert_close(east.edge_pose().lon, 0.0, 1e-12);
        assert_close(east.edge_pose().lat, LAT_MIN, 1e-12);

        // Depth 1 digit 2 sets the first latitude bit: northern half.
        let north = Address::parse("/1/0,0/02/0").expect("parse");
        assert_close(north.edge_pose().lon, LON_MIN, 1e-12);
        assert_close(north.edge_pose().lat, 0.0, 1e-12);

        // Altitude bit only counts from depth 10.
        let high = Address::parse("/1/0,0/00000000004/0").expect("parse");
        assert_close(high.edge_pose().radius, EARTH_RADIUS, 1e-6);
    }

    /// Upper corner of the cell: the edge of the next cell along each axis.
    fn far_corner(address: &Address) -> SphericalPose {
        let size = address.size();
        let splits = [
            size,
            size.saturating_sub(LATITUDE_ACTIVATION),
            size.saturating_sub(ALTITUDE_ACTIVATION),
        ];
        let edge = address.edge_pose();
        SphericalPose::new(
            edge.lon + LON_RANGE / 2f64.powi(splits[0] as i32),
            edge.lat + LAT_RANGE / 2f64.powi(splits[1] as i32),
            edge.radius + ALT_RANGE / 2f64.powi(splits[2] as i32),
        )
    }

    #[test]
    fn center_is_the_midpoint_of_the_cell_extent() {
        for text in ["/1/0,0/1/0", "/1/0,0/0321/0", "/1/0,0/103213210347/0"] {
            let a = Address::parse(text).expect("parse");
            let edge = a.edge_pose();
            let far = far_corner(&a);
            let c = a.center_pose();
            assert_close(c.lon, (edge.lon + far.lon) / 2.0, 1e-12);
            assert_close(c.lat, (edge.lat + far.lat) / 2.0, 1e-12);
            assert_close(c.radius, (edge.radius + far.radius) / 2.0, 1e-6);
        }

        // Depth 1 has not split latitude yet.
        let west = Address::parse("/1/0,0/0/0").expect("parse");
        assert_close(west.center_pose().lat, 0.0, 1e-12);
        assert_close(west.center_pose().radius, EARTH_RADIUS, 1e-6);

        // Depth 12: two altitude splits, eleven latitude splits.
        let deep = Address::parse("/1/0,0/103213210347/0").expect("parse");
        let offset = deep.center_pose();
        let edge = deep.edge_pose();
        assert_close(offset.radius - edge.radius, ALT_RANGE / 8.0, 1e-6);
        assert_close(offset.lat - edge.lat, LAT_RANGE / 4096.0, 1e-12);
    }
}
