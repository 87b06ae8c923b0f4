//! Small numeric helpers shared by handlers and the in-memory repository.

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two WGS84 points in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Rounds to two decimal places (money and distances).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bangkok_to_nonthaburi_is_roughly_fifteen_km() {
        // Siam Paragon to Nonthaburi pier.
        let d = haversine_km(13.7462, 100.5347, 13.8591, 100.5217);
        assert!((12.0..16.0).contains(&d), "got {d}");
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(0.0), 0.0);
    }
}
