//! Great-circle distance used by the property radius filter.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two WGS84 points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        assert!(haversine_km(19.0414, -98.2063, 19.0414, -98.2063).abs() < 1e-9);
    }

    #[test]
    fn puebla_to_mexico_city() {
        // Zocalo de Puebla -> Zocalo CDMX, roughly 100 km apart
        let d = haversine_km(19.0414, -98.2063, 19.4326, -99.1332);
        assert!((95.0..120.0).contains(&d), "got {}", d);
    }

    #[test]
    fn symmetric() {
        let a = haversine_km(19.0, -98.0, 20.0, -97.0);
        let b = haversine_km(20.0, -97.0, 19.0, -98.0);
        assert!((a - b).abs() < 1e-9);
    }
}
