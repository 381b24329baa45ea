use serde::{Deserialize, Serialize};

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Haversine distance in kilometers between two points.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    /// Parses the `"lat,lng"` form used by query strings.
    pub fn parse(raw: &str) -> Option<Self> {
        let (lat, lng) = raw.split_once(',')?;
        let point = GeoPoint::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
        point.is_valid().then_some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(-1.2921, 36.8219);
        assert!(p.distance_km(&p).abs() < 0.001);
    }

    #[test]
    fn nairobi_to_mombasa() {
        let nairobi = GeoPoint::new(-1.2921, 36.8219);
        let mombasa = GeoPoint::new(-4.0435, 39.6682);
        // roughly 440 km as the crow flies
        assert!((nairobi.distance_km(&mombasa) - 440.0).abs() < 15.0);
    }

    #[test]
    fn parses_query_form() {
        assert_eq!(GeoPoint::parse("-1.29, 36.82"), Some(GeoPoint::new(-1.29, 36.82)));
        assert_eq!(GeoPoint::parse("91,0"), None);
        assert_eq!(GeoPoint::parse("nairobi"), None);
        assert_eq!(GeoPoint::parse("1.0"), None);
    }
}
