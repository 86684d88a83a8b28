//! Compact Position Reporting.
//!
//! A CPR coordinate is a 17-bit fraction of a latitude or longitude zone.
//! The zone itself is not transmitted: a global fix recovers it from an
//! even/odd frame pair, a local fix from a reference within half a zone.

use std::f64::consts::PI;

use crate::types::Millis;

/// Latitude zones per hemisphere quadrant (NZ).
const LAT_ZONES: f64 = 15.0;

/// 2^17.
const SCALE: f64 = 131_072.0;

/// Even and odd frames further apart than this are not paired.
pub const MAX_PAIR_AGE_MS: Millis = 10_000;

/// Longitude zone count (NL) at `lat`: 59 at the equator, 1 past 87 degrees.
pub fn nl(lat: f64) -> i32 {
    let lat = lat.abs();
    if lat >= 87.0 {
        return 1;
    }
    let a = 1.0 - (PI / (2.0 * LAT_ZONES)).cos();
    let b = lat.to_radians().cos().powi(2);
    let zones = (2.0 * PI / (1.0 - a / b).acos()).floor() as i32;
    zones.max(1)
}

fn fraction(raw: u32) -> f64 {
    f64::from(raw) / SCALE
}

/// Euclidean remainder on floats.
fn wrap(x: f64, m: f64) -> f64 {
    x - m * (x / m).floor()
}

/// Zone of width `size` nearest `reference`, offset by `frac` into it.
fn nearest(reference: f64, size: f64, frac: f64) -> f64 {
    let zone = (reference / size).floor() + (wrap(reference, size) / size - frac + 0.5).floor();
    size * (zone + frac)
}

fn east_west(lon: f64) -> f64 {
    if lon >= 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// Airborne fix from an even/odd pair, in the frame of whichever is newer.
///
/// `None` when the frames are more than [`MAX_PAIR_AGE_MS`] apart or fall in
/// different NL bands.
pub fn global_decode(
    lat_even: u32,
    lon_even: u32,
    lat_odd: u32,
    lon_odd: u32,
    t_even: Millis,
    t_odd: Millis,
) -> Option<(f64, f64)> {
    if (t_even - t_odd).abs() > MAX_PAIR_AGE_MS {
        return None;
    }

    let (ye, xe) = (fraction(lat_even), fraction(lon_even));
    let (yo, xo) = (fraction(lat_odd), fraction(lon_odd));

    let j = (59.0 * ye - 60.0 * yo + 0.5).floor();
    let southern = |lat: f64| if lat >= 270.0 { lat - 360.0 } else { lat };
    let rlat_even = southern(360.0 / 60.0 * (wrap(j, 60.0) + ye));
    let rlat_odd = southern(360.0 / 59.0 * (wrap(j, 59.0) + yo));

    let zones = nl(rlat_even);
    if zones != nl(rlat_odd) {
        return None;
    }

    let m = (xe * f64::from(zones - 1) - xo * f64::from(zones) + 0.5).floor();
    let (lat, x, n) = if t_even >= t_odd {
        (rlat_even, xe, zones)
    } else {
        (rlat_odd, xo, (zones - 1).max(1))
    };
    let n = f64::from(n);
    let lon = 360.0 / n * (wrap(m, n) + x);

    Some((round6(lat), round6(east_west(lon))))
}

/// Single-frame fix relative to a reference position.
///
/// Surface frames cover a quarter of the airborne span.
pub fn local_decode(
    cpr_lat: u32,
    cpr_lon: u32,
    cpr_odd: bool,
    surface: bool,
    ref_lat: f64,
    ref_lon: f64,
) -> (f64, f64) {
    let span = if surface { 90.0 } else { 360.0 };
    let odd = i32::from(cpr_odd);

    let dlat = span / (4.0 * LAT_ZONES - f64::from(odd));
    let lat = nearest(ref_lat, dlat, fraction(cpr_lat));

    let dlon = span / f64::from((nl(lat) - odd).max(1));
    let lon = nearest(ref_lon, dlon, fraction(cpr_lon));

    let lat = if lat > 90.0 { lat - 360.0 } else { lat };
    (round6(lat), round6(east_west(lon)))
}
