use thiserror::Error;

use crate::track::GeoPoint;
use crate::utils;

/* Automatic map camera framing for a trip preview.

   The preview map has a fixed aspect ratio and can be rotated, so instead of
   fitting the north-up bounding box of a track we look for the rotation that
   makes the track's bounding box closest to the viewport's aspect ratio.
   Rotation is done in Web Mercator space, which is locally conformal, and the
   result is projected back to lat/lng afterwards.
*/

// Anything shorter than this (~100 meters) is framed like a single point.
pub const MIN_DISTANCE_KM: f64 = 0.1;
pub const DEFAULT_CENTER: GeoPoint = GeoPoint {
    latitude: 50.0,
    longitude: -95.0,
};
// whole globe
pub const DEFAULT_ALTITUDE: f64 = 15_000_000.0;
pub const SINGLE_POINT_ALTITUDE: f64 = 1000.0;
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 40_075_017.0;
pub const MAX_SEARCH_ANGLE: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FramingError {
    #[error("invalid track data: {0}")]
    InvalidTrackData(String),
    #[error("failed to persist framing for trip {trip_id}: {reason}")]
    PersistenceWriteFailure { trip_id: String, reason: String },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn empty() -> Self {
        BoundingBox {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
        }
    }

    pub fn of_points(points: impl IntoIterator<Item = GeoPoint>) -> Self {
        points.into_iter().fold(Self::empty(), |mut bbox, point| {
            bbox.extend(&point);
            bbox
        })
    }

    pub fn extend(&mut self, point: &GeoPoint) {
        self.min_lat = self.min_lat.min(point.latitude);
        self.max_lat = self.max_lat.max(point.latitude);
        self.min_lon = self.min_lon.min(point.longitude);
        self.max_lon = self.max_lon.max(point.longitude);
    }

    // `false` for a box that has not seen any point yet.
    pub fn is_valid(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.max_lat + self.min_lat) / 2.0,
            (self.max_lon + self.min_lon) / 2.0,
        )
    }

    /// Long side over short side, so always `>= 1`. Infinite for a box
    /// collapsed along one axis and NaN for a box collapsed to a point.
    pub fn aspect_ratio(&self) -> f64 {
        let (width, height) = (self.width(), self.height());
        if width > height {
            width / height
        } else {
            height / width
        }
    }

    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint::new(self.min_lat, self.min_lon),
            GeoPoint::new(self.max_lat, self.min_lon),
            GeoPoint::new(self.max_lat, self.max_lon),
            GeoPoint::new(self.min_lat, self.max_lon),
        ]
    }
}

/// Size of the map widget the framing is computed for, in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width_px: u32,
    pub height_px: u32,
    pub is_landscape: bool,
}

impl Viewport {
    pub fn new(width_px: u32, height_px: u32, is_landscape: bool) -> Self {
        Viewport {
            width_px,
            height_px,
            is_landscape,
        }
    }

    // A zero sized widget is treated as one pixel so the math stays finite.
    fn width(&self) -> f64 {
        self.width_px.max(1) as f64
    }

    fn height(&self) -> f64 {
        self.height_px.max(1) as f64
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() / self.height()
    }
}

/// The persisted part of a framing. Altitude is not part of it because it
/// depends on the viewport the framing is displayed in.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Framing {
    pub rotation_angle: f64,
    pub width: f64,
    pub height: f64,
    pub center: GeoPoint,
}

impl Framing {
    pub fn is_usable(&self) -> bool {
        self.rotation_angle.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.center.is_finite()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FramingSource {
    // nothing to show
    Default,
    SinglePoint,
    Cached,
    Computed,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FramingResult {
    pub rotation_angle: f64,
    pub width: f64,
    pub height: f64,
    pub center: GeoPoint,
    pub altitude: f64,
    pub source: FramingSource,
}

impl FramingResult {
    pub fn default_view() -> Self {
        FramingResult {
            rotation_angle: 0.0,
            width: 0.0,
            height: 0.0,
            center: DEFAULT_CENTER,
            altitude: DEFAULT_ALTITUDE,
            source: FramingSource::Default,
        }
    }

    pub fn single_point(point: GeoPoint) -> Self {
        FramingResult {
            rotation_angle: 0.0,
            width: 0.0,
            height: 0.0,
            center: point,
            altitude: SINGLE_POINT_ALTITUDE,
            source: FramingSource::SinglePoint,
        }
    }

    // Centered on the first usable point, or the default view if there is none.
    pub fn fallback_for(track: &[GeoPoint]) -> Self {
        match track.iter().find(|point| point.is_finite()) {
            Some(point) => Self::single_point(*point),
            None => Self::default_view(),
        }
    }

    fn of_framing(framing: Framing, viewport: &Viewport, source: FramingSource) -> Self {
        FramingResult {
            rotation_angle: framing.rotation_angle,
            width: framing.width,
            height: framing.height,
            center: framing.center,
            altitude: compute_altitude(
                framing.width,
                framing.height,
                viewport.width(),
                viewport.height(),
                viewport.is_landscape,
            ),
            source,
        }
    }

    pub fn framing(&self) -> Framing {
        Framing {
            rotation_angle: self.rotation_angle,
            width: self.width,
            height: self.height,
            center: self.center,
        }
    }
}

/// Rotates `point` by `angle` degrees (counterclockwise) around `center`.
/// The rotation happens in Web Mercator space since lat/lng is not conformal.
pub fn rotate_point(point: &GeoPoint, angle: f64, center: &GeoPoint) -> GeoPoint {
    let (center_x, center_y) = utils::lng_lat_to_web_mercator(center.longitude, center.latitude);
    let (x, y) = utils::lng_lat_to_web_mercator(point.longitude, point.latitude);

    let rad = angle.to_radians();
    let (sin, cos) = rad.sin_cos();
    let translated_x = x - center_x;
    let translated_y = y - center_y;
    let rotated_x = translated_x * cos - translated_y * sin;
    let rotated_y = translated_x * sin + translated_y * cos;

    let (longitude, latitude) =
        utils::web_mercator_to_lng_lat(rotated_x + center_x, rotated_y + center_y);
    GeoPoint {
        latitude,
        longitude,
    }
}

// The numbers are tuned by hand so the track fills the visible part of the
// preview map without being clipped. Degrees are converted to meters with a
// constant factor for both axes, which ignores the longitude shrinking with
// latitude. Stored altitudes depend on this, so keep it as is.
pub fn compute_altitude(
    width: f64,
    height: f64,
    viewport_width_px: f64,
    viewport_height_px: f64,
    is_landscape: bool,
) -> f64 {
    let meters_per_degree = EARTH_CIRCUMFERENCE_METERS / 360.0;
    let width_in_meters = width * meters_per_degree;
    let height_in_meters = height * meters_per_degree;

    let (width_scale, height_scale, min_altitude) = if is_landscape {
        (200.0, 110.0, 800.0)
    } else {
        (400.0, 70.0, 500.0)
    };
    let altitude_for_width = width_in_meters / (viewport_width_px / width_scale);
    let altitude_for_height = height_in_meters / (viewport_height_px / height_scale);

    altitude_for_width
        .max(altitude_for_height)
        .max(min_altitude)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RotationSearch {
    pub angle: u32,
    // bounding box of the rotated track
    pub bounding_box: BoundingBox,
    pub aspect_ratio_diff: f64,
}

/// Tries every integer angle in `0..=MAX_SEARCH_ANGLE` and returns the one
/// whose rotated bounding box has the aspect ratio closest to
/// `target_aspect_ratio`. On ties the smallest angle wins. Returns `None`
/// when no angle gives a comparable aspect ratio, e.g. all points are equal.
pub fn find_best_rotation(
    points: &[GeoPoint],
    centroid: &GeoPoint,
    target_aspect_ratio: f64,
) -> Option<RotationSearch> {
    let mut best: Option<RotationSearch> = None;
    let mut smallest_diff = f64::INFINITY;
    for angle in 0..=MAX_SEARCH_ANGLE {
        let bounding_box = BoundingBox::of_points(
            points
                .iter()
                .map(|point| rotate_point(point, angle as f64, centroid)),
        );
        let aspect_ratio_diff = (bounding_box.aspect_ratio() - target_aspect_ratio).abs();
        // NaN never compares smaller, so degenerate boxes are skipped
        if aspect_ratio_diff < smallest_diff {
            smallest_diff = aspect_ratio_diff;
            best = Some(RotationSearch {
                angle,
                bounding_box,
                aspect_ratio_diff,
            });
        }
    }
    best
}

fn validate(track: &[GeoPoint], distance_km: f64) -> Result<(), FramingError> {
    if !distance_km.is_finite() {
        return Err(FramingError::InvalidTrackData(format!(
            "distance is not finite: {}",
            distance_km
        )));
    }
    // poles are excluded because the Mercator transform diverges there
    match track.iter().position(|point| {
        !point.is_finite() || point.latitude.abs() >= 90.0 || point.longitude.abs() > 180.0
    }) {
        None => Ok(()),
        Some(i) => Err(FramingError::InvalidTrackData(format!(
            "point #{} is invalid: {:?}",
            i, track[i]
        ))),
    }
}

/// Computes how the preview map camera should look at `track`.
///
/// `cached` is the framing stored for this trip, if any. When it is complete
/// the search is skipped and only the altitude is recomputed for `viewport`.
/// Invalid points are reported as `FramingError::InvalidTrackData`, callers
/// are expected to fall back to `FramingResult::fallback_for`.
pub fn compute_framing(
    track: &[GeoPoint],
    distance_km: f64,
    viewport: &Viewport,
    cached: Option<&Framing>,
) -> Result<FramingResult, FramingError> {
    let first = match track.first() {
        None => return Ok(FramingResult::default_view()),
        Some(first) => *first,
    };
    validate(track, distance_km)?;

    if distance_km <= MIN_DISTANCE_KM || track.len() <= 1 {
        debug!(
            "[framing] single point: distance_km={}, points={}",
            distance_km,
            track.len()
        );
        return Ok(FramingResult::single_point(first));
    }

    if let Some(cached) = cached.filter(|framing| framing.is_usable()) {
        return Ok(FramingResult::of_framing(
            *cached,
            viewport,
            FramingSource::Cached,
        ));
    }

    // NOTE: this is the center of the bounding box, not the real centroid.
    let centroid = BoundingBox::of_points(track.iter().copied()).center();
    let search = match find_best_rotation(track, &centroid, viewport.aspect_ratio()) {
        None => {
            warn!(
                "[framing] no usable rotation for {} points, using single point",
                track.len()
            );
            return Ok(FramingResult::single_point(first));
        }
        Some(search) => search,
    };

    let bounding_box = search.bounding_box;
    let angle = search.angle as f64;
    let rotation_angle = if bounding_box.height() > bounding_box.width() {
        angle
    } else {
        angle - 90.0
    };

    // back to map space to find where the camera should look at
    let map_bounding_box = BoundingBox::of_points(
        bounding_box
            .corners()
            .iter()
            .map(|corner| rotate_point(corner, -angle, &centroid)),
    );

    let framing = Framing {
        rotation_angle,
        width: bounding_box.width(),
        height: bounding_box.height(),
        center: map_bounding_box.center(),
    };
    debug!(
        "[framing] best angle={}, diff={}, framing={:?}",
        search.angle, search.aspect_ratio_diff, framing
    );
    Ok(FramingResult::of_framing(
        framing,
        viewport,
        FramingSource::Computed,
    ))
}
