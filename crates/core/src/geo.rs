use crate::types::GeoPoint;

/// Mean Earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const MAX_RADIUS_KM: f64 = 100.0;
pub const DEFAULT_NEARBY_LIMIT: u32 = 20;
pub const MAX_NEARBY_LIMIT: u32 = 100;

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Axis-aligned box that contains every point within a radius of a centre.
///
/// Used as a cheap SQL prefilter; callers still rank candidates with
/// [`haversine_km`]. When the box would wrap the antimeridian or reach a
/// pole the longitude range is widened to the whole globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let dlat = angular.to_degrees();
        let min_lat = (center.latitude - dlat).max(-90.0);
        let max_lat = (center.latitude + dlat).min(90.0);

        let cos_lat = center.latitude.to_radians().cos();
        let (min_lng, max_lng) = if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat <= f64::EPSILON
        {
            (-180.0, 180.0)
        } else {
            // widest longitude of the circle, reached north of the centre's latitude
            let ratio = angular.sin() / cos_lat;
            if ratio >= 1.0 {
                (-180.0, 180.0)
            } else {
                let dlng = ratio.asin().to_degrees();
                let min = center.longitude - dlng;
                let max = center.longitude + dlng;
                if min < -180.0 || max > 180.0 {
                    (-180.0, 180.0)
                } else {
                    (min, max)
                }
            }
        };

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lng..=self.max_lng).contains(&point.longitude)
    }
}

/// Something with a stable id and a position.
pub trait Located {
    fn id(&self) -> i64;
    fn location(&self) -> GeoPoint;
}

/// Search parameters after defaults and caps are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub limit: u32,
}

impl NearbyQuery {
    pub fn new(center: GeoPoint, radius_km: Option<f64>, limit: Option<u32>) -> Self {
        let radius_km = radius_km
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(DEFAULT_RADIUS_KM)
            .min(MAX_RADIUS_KM);
        let limit = limit
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_NEARBY_LIMIT)
            .min(MAX_NEARBY_LIMIT);
        Self {
            center,
            radius_km,
            limit,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(self.center, self.radius_km)
    }
}

/// Keeps candidates inside the radius, nearest first (ties broken by id).
pub fn rank_nearby<T: Located>(query: &NearbyQuery, candidates: Vec<T>) -> Vec<(T, f64)> {
    let mut ranked: Vec<(T, f64)> = candidates
        .into_iter()
        .map(|candidate| {
            let distance = haversine_km(query.center, candidate.location());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= query.radius_km)
        .collect();

    ranked.sort_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.id().cmp(&b.id())));
    ranked.truncate(query.limit as usize);
    ranked
}
