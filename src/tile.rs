use std::f64::consts::PI;
use std::fmt;

/// A slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// The tile containing the given point (in degrees) at `zoom`.
    pub fn from_lat_lon(lat: f64, lon: f64, zoom: u8) -> Self {
        let (x, y) = lat_lon_to_tile(lat, lon, zoom);
        Self::new(x, y, zoom)
    }

    /// Latitude and longitude (in degrees) of the tile's north-west corner.
    pub fn north_west(&self) -> (f64, f64) {
        tile_to_lat_lon(self.x, self.y, self.z)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`.
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1_u64 << zoom
}

/// Inverse Web-Mercator projection of a tile corner onto (latitude, longitude) in degrees.
pub fn tile_to_lat_lon(x: u32, y: u32, zoom: u8) -> (f64, f64) {
    let n = tiles_per_axis(zoom) as f64;

    let lon = x as f64 / n * 360_f64 - 180_f64;
    let lat = (PI * (1_f64 - 2_f64 * y as f64 / n)).sinh().atan().to_degrees();

    (lat, lon)
}

/// Forward Web-Mercator projection of a point (in degrees) onto tile indices.
///
/// Both axes are truncated toward zero, so points west of -180° or north of
/// the projection limit end up on index `0`.
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = lat.to_radians();

    let x = (lon + 180_f64) / 360_f64 * n;
    let y = (1_f64 - lat_rad.tan().asinh() / PI) / 2_f64 * n;

    (x as u32, y as u32)
}
