//! Small geodesy helpers: great-circle distance and NMEA coordinate notation.

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two lat/lon points in degrees.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Parse NMEA `ddmm.mmmmm` / `dddmm.mmmmm` plus hemisphere into signed degrees.
pub fn dmm_to_degrees(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = value.trim().parse().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let unsigned = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(unsigned),
        "S" | "W" => Some(-unsigned),
        _ => None,
    }
}

/// Format signed degrees as NMEA `(d)ddmm.mmmmm` plus hemisphere.
pub fn degrees_to_dmm(degrees: f64, is_latitude: bool) -> (String, char) {
    let hemisphere = match (is_latitude, degrees < 0.0) {
        (true, false) => 'N',
        (true, true) => 'S',
        (false, false) => 'E',
        (false, true) => 'W',
    };
    let abs = degrees.abs();
    let mut whole = abs.trunc();
    let mut minutes = (abs - whole) * 60.0;
    // Rounding to 5 places can carry into the next degree.
    if (minutes * 100_000.0).round() >= 6_000_000.0 {
        whole += 1.0;
        minutes = 0.0;
    }
    let text = if is_latitude {
        format!("{:02}{:08.5}", whole as u32, minutes)
    } else {
        format!("{:03}{:08.5}", whole as u32, minutes)
    };
    (text, hemisphere)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(haversine(37.23, -115.81, 37.23, -115.81).abs() < 1e-9);
    }

    #[test]
    fn london_to_paris() {
        let d = haversine(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 343.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn parses_dmm() {
        let lat = dmm_to_degrees("4807.03800", "S").unwrap();
        assert!((lat + 48.117_3).abs() < 1e-6);
        let lon = dmm_to_degrees("01131.00000", "E").unwrap();
        assert!((lon - 11.516_666_7).abs() < 1e-6);
        assert!(dmm_to_degrees("", "N").is_none());
        assert!(dmm_to_degrees("4807.0", "X").is_none());
    }

    #[test]
    fn formats_dmm() {
        assert_eq!(
            degrees_to_dmm(-48.1173, true),
            ("4807.03800".to_string(), 'S')
        );
        assert_eq!(
            degrees_to_dmm(11.516_666_666_7, false),
            ("01131.00000".to_string(), 'E')
        );
        assert_eq!(degrees_to_dmm(0.0, false), ("00000.00000".to_string(), 'E'));
    }
}
