use foundation::{Address, EARTH_RADIUS, SphericalPose, spherical_to_cartesian};

use crate::codec::{CodecError, COLOR_SIZE, POINT_SIZE, POSE_SIZE};

/// Decoded points of one queried address, ready for a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub address: Address,
    /// Cartesian positions in meters (`y` is the polar axis).
    pub positions: Vec<[f64; 3]>,
    pub colors: Vec<[u8; 3]>,
}

impl Cell {
    /// Builds a cell from a decoded array.
    ///
    /// Each point carries `(lon, lat, alt)` with the altitude relative to the
    /// sphere surface; the Earth radius is added back before conversion.
    pub fn decode(address: Address, bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() % POINT_SIZE != 0 {
            return Err(CodecError::Misaligned {
                decoded_len: bytes.len() as u64,
            });
        }

        let count = bytes.len() / POINT_SIZE;
        let mut positions = Vec::with_capacity(count);
        let mut colors = Vec::with_capacity(count);

        for point in bytes.chunks_exact(POINT_SIZE) {
            let lon = read_f64_le(point, 0);
            let lat = read_f64_le(point, 8);
            let alt = read_f64_le(point, 16);
            let p = spherical_to_cartesian(SphericalPose::new(lon, lat, alt + EARTH_RADIUS));
            positions.push(p.as_array());

            let mut color = [0u8; COLOR_SIZE];
            color.copy_from_slice(&point[POSE_SIZE..]);
            colors.push(color);
        }

        Ok(Self {
            address,
            positions,
            colors,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn read_f64_le(bytes: &[u8], offset: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_point;
    use foundation::TimeSelection;
    use std::f64::consts::FRAC_PI_2;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let d = (a - b).abs();
        assert!(d <= eps, "expected {a} ~= {b} (diff {d})");
    }

    #[test]
    fn restores_earth_radius_and_converts_to_cartesian() {
        let address = Address::root(TimeSelection::default(), 0);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_point([0.0, 0.0, 0.0], [1, 2, 3]));
        bytes.extend_from_slice(&encode_point([0.0, FRAC_PI_2, 100.0], [4, 5, 6]));

        let cell = Cell::decode(address, &bytes).expect("decode");
        assert_eq!(cell.len(), 2);
        assert_close(cell.positions[0][2], EARTH_RADIUS, 1e-6);
        assert_close(cell.positions[1][1], EARTH_RADIUS + 100.0, 1e-6);
        assert_close(cell.positions[1][0], 0.0, 1e-6);
        assert_eq!(cell.colors, vec![[1, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn empty_array_is_an_empty_cell() {
        let address = Address::root(TimeSelection::default(), 0);
        let cell = Cell::decode(address, &[]).expect("decode");
        assert!(cell.is_empty());
    }

    #[test]
    fn leftover_bytes_are_rejected() {
        let address = Address::root(TimeSelection::default(), 0);
        assert!(Cell::decode(address, &[0; 30]).is_err());
    }
}
