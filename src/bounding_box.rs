use std::fmt;

use crate::error::{Error, Result};
use crate::tile::{lat_lon_to_tile, tiles_per_axis, Tile};

const MAX_LATITUDE: f64 = 90_f64;

/// A geographic point in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// A bounding box given by its upper-left (north-west) and bottom-right
/// (south-east) corners, in degrees.
///
/// # Example
/// ```rust
/// # use raster_map_downloader::{BoundingBox, LatLon};
/// let aachen_germany =
///     BoundingBox::new(LatLon::new(50.811, 6.031), LatLon::new(50.7492, 6.1649)).unwrap();
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    upper_left: LatLon,
    bottom_right: LatLon,
}

impl BoundingBox {
    /// Creates a bounding box, rejecting corners that are not finite, have a
    /// latitude past the poles or are not in upper-left/bottom-right relation.
    pub fn new(upper_left: LatLon, bottom_right: LatLon) -> Result<Self> {
        let invalid = |reason| Error::InvalidBoundingBox {
            upper_left,
            bottom_right,
            reason,
        };

        let finite = [upper_left.lat, upper_left.lon, bottom_right.lat, bottom_right.lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(invalid("coordinates must be finite"));
        }
        if [upper_left.lat, bottom_right.lat].iter().any(|lat| lat.abs() > MAX_LATITUDE) {
            return Err(invalid("latitudes must be between -90° and 90°"));
        }
        if upper_left.lat <= bottom_right.lat || upper_left.lon >= bottom_right.lon {
            return Err(invalid("upper-left corner must be north-west of bottom-right corner"));
        }

        Ok(Self {
            upper_left,
            bottom_right,
        })
    }

    /// The range of tiles covering the bounding box at `zoom`.
    pub fn tile_range(&self, zoom: u8) -> TileRange {
        let (x1, y1) = lat_lon_to_tile(self.upper_left.lat, self.upper_left.lon, zoom);
        let (x2, y2) = lat_lon_to_tile(self.bottom_right.lat, self.bottom_right.lon, zoom);

        // a corner on the antimeridian or beyond the projection limit maps one past the edge
        let last = (tiles_per_axis(zoom) - 1) as u32;

        TileRange {
            zoom,
            min_x: x1.min(x2).min(last),
            max_x: x1.max(x2).min(last),
            min_y: y1.min(y2).min(last),
            max_y: y1.max(y2).min(last),
        }
    }

    /// Tile ranges for every zoom level in `min_zoom..=max_zoom`.
    pub fn tile_ranges(&self, min_zoom: u8, max_zoom: u8) -> Vec<TileRange> {
        (min_zoom..=max_zoom).map(|zoom| self.tile_range(zoom)).collect()
    }
}

/// An inclusive rectangle of tile indices at a single zoom level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Exact number of tiles enumerated by [`TileRange::tiles`].
    pub fn count(&self) -> u64 {
        (u64::from(self.max_x - self.min_x) + 1) * (u64::from(self.max_y - self.min_y) + 1)
    }

    /// Iterates over all tiles in the range, `x` outer and `y` inner.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + fmt::Debug {
        let TileRange {
            zoom,
            min_x,
            max_x,
            min_y,
            max_y,
        } = *self;

        (min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| Tile::new(x, y, zoom)))
    }

    /// The `index`-th tile yielded by [`TileRange::tiles`].
    ///
    /// Returns `None` if `index` is past the end of the range.
    pub fn tile_at(&self, index: u64) -> Option<Tile> {
        if index >= self.count() {
            return None;
        }

        let height = u64::from(self.max_y - self.min_y) + 1;
        let x = self.min_x + (index / height) as u32;
        let y = self.min_y + (index % height) as u32;

        Some(Tile::new(x, y, self.zoom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(ul: (f64, f64), br: (f64, f64)) -> Result<BoundingBox> {
        BoundingBox::new(LatLon::new(ul.0, ul.1), LatLon::new(br.0, br.1))
    }

    #[test]
    fn rejects_swapped_corners() {
        assert!(matches!(
            bbox((0.0, 10.0), (10.0, 20.0)),
            Err(Error::InvalidBoundingBox { .. })
        ));
        assert!(matches!(
            bbox((10.0, 20.0), (0.0, 10.0)),
            Err(Error::InvalidBoundingBox { .. })
        ));
        assert!(bbox((10.0, 10.0), (10.0, 20.0)).is_err());
        assert!(bbox((f64::NAN, 10.0), (0.0, 20.0)).is_err());
    }

    #[test]
    fn rejects_latitudes_past_the_poles() {
        assert!(matches!(
            bbox((100.0, 10.0), (50.0, 20.0)),
            Err(Error::InvalidBoundingBox { .. })
        ));
        assert!(matches!(
            bbox((-50.0, 10.0), (-90.5, 20.0)),
            Err(Error::InvalidBoundingBox { .. })
        ));

        // the poles themselves are fine and clamp to the projection edge
        let range = bbox((90.0, -180.0), (-90.0, 180.0)).unwrap().tile_range(2);
        assert_eq!((range.min_y, range.max_y), (0, 3));
    }

    #[test]
    fn zoom_zero_is_a_single_tile() {
        let range = bbox((10.0, 10.0), (0.0, 20.0)).unwrap().tile_range(0);
        assert_eq!(range.count(), 1);
        assert_eq!(range.tiles().collect::<Vec<_>>(), vec![Tile::new(0, 0, 0)]);
    }

    #[test]
    fn ranges_are_ordered_at_every_zoom() {
        let boxes = [
            bbox((50.811, 6.031), (50.7492, 6.1649)).unwrap(),
            bbox((85.0, -180.0), (-85.0, 180.0)).unwrap(),
            bbox((-10.0, -70.0), (-60.0, -20.0)).unwrap(),
            bbox((0.0001, 0.0), (0.0, 0.0001)).unwrap(),
        ];

        for bbox in &boxes {
            for range in bbox.tile_ranges(0, 18) {
                assert!(range.min_x <= range.max_x, "{:?}", range);
                assert!(range.min_y <= range.max_y, "{:?}", range);
                assert!(u64::from(range.max_x) < tiles_per_axis(range.zoom));
                assert!(u64::from(range.max_y) < tiles_per_axis(range.zoom));
                if range.count() <= 100_000 {
                    assert_eq!(range.count(), range.tiles().count() as u64);
                }
            }
        }
    }

    #[test]
    fn enumerates_x_outer_y_inner() {
        let range = TileRange {
            zoom: 5,
            min_x: 3,
            max_x: 4,
            min_y: 7,
            max_y: 9,
        };
        let coords: Vec<_> = range.tiles().map(|t| (t.x, t.y)).collect();
        assert_eq!(coords, vec![(3, 7), (3, 8), (3, 9), (4, 7), (4, 8), (4, 9)]);
    }

    #[test]
    fn tile_at_matches_enumeration() {
        let range = TileRange {
            zoom: 9,
            min_x: 100,
            max_x: 106,
            min_y: 40,
            max_y: 42,
        };
        for (index, tile) in range.tiles().enumerate() {
            assert_eq!(range.tile_at(index as u64), Some(tile));
        }
        assert_eq!(range.tile_at(range.count()), None);
    }

    #[test]
    fn tile_at_does_not_need_the_whole_grid() {
        let world = bbox((90.0, -180.0), (-90.0, 180.0)).unwrap().tile_range(18);
        assert_eq!(world.count(), 1 << 36);
        assert_eq!(
            world.tile_at(world.count() - 1),
            Some(Tile::new((1 << 18) - 1, (1 << 18) - 1, 18))
        );
        assert_eq!(world.tile_at(1 << 18), Some(Tile::new(1, 0, 18)));
    }

    #[test]
    fn antimeridian_corner_is_clamped() {
        let range = bbox((10.0, 170.0), (0.0, 180.0)).unwrap().tile_range(3);
        assert_eq!(range.max_x, 7);
    }
}
