use crate::config::constant::EARTH_RADIUS_MILES;
use crate::domain::types::LatLng;

/// Great-circle distance in miles.
pub fn haversine_miles(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

/// Running distance along `path`; `result[i]` is the miles from `path[0]` to `path[i]`.
pub fn cumulative_miles(path: &[LatLng]) -> Vec<f64> {
    let mut cum = Vec::with_capacity(path.len());
    let mut total = 0.0;
    for (i, point) in path.iter().enumerate() {
        if i > 0 {
            total += haversine_miles(path[i - 1], *point);
        }
        cum.push(total);
    }
    cum
}

/// The point `target_miles` along `path`, interpolating inside the segment
/// that contains it. Clamped to the path's ends. `None` for an empty path.
pub fn point_at_miles(path: &[LatLng], cum: &[f64], target_miles: f64) -> Option<LatLng> {
    let first = *path.first()?;
    let last = *path.last()?;
    let total = cum.last().copied().unwrap_or(0.0);
    if target_miles <= 0.0 {
        return Some(first);
    }
    if target_miles >= total {
        return Some(last);
    }

    let idx = cum
        .iter()
        .position(|&c| c >= target_miles)
        .unwrap_or(cum.len() - 1)
        .max(1);
    let prev = idx - 1;
    let seg = cum[idx] - cum[prev];
    let t = if seg > 0.0 {
        (target_miles - cum[prev]) / seg
    } else {
        0.0
    };
    Some(path[prev].lerp(&path[idx], t))
}
