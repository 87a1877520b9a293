use crate::types::GeoTime;
use glam::DVec3;
use std::f64::consts::{PI, TAU};

const DEGS: f64 = 180.0 / PI;
const RADS: f64 = PI / 180.0;

/// Apparent diameter of the solar disc, degrees.
const SUN_DIAMETER: f64 = 0.53;
/// Atmospheric refraction at the horizon, degrees.
const AIR_REFRACTION: f64 = 34.0 / 60.0;

/// Sun position relative to the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunDirection {
    /// Unit vector pointing from the ground towards the sun.
    pub vector: DVec3,
    /// Radians in [0, 2π), rotation offset already applied.
    pub azimuth: f64,
    /// Radians above the horizon.
    pub altitude: f64,
}

impl SunDirection {
    pub fn from_angles(azimuth: f64, altitude: f64) -> Self {
        let vector = DVec3::new(
            altitude.cos() * azimuth.cos(),
            -altitude.cos() * azimuth.sin(),
            altitude.sin(),
        );
        Self {
            vector,
            azimuth,
            altitude,
        }
    }

    pub fn is_above_horizon(&self) -> bool {
        self.altitude > 0.0
    }
}

/// Intermediate quantities of the low-precision solar ephemeris for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarEphemeris {
    /// Days since 2000-01-00 0h UT.
    pub day_number: f64,
    /// Radians.
    pub mean_longitude: f64,
    /// Radians.
    pub mean_anomaly: f64,
    /// Radians.
    pub ecliptic_longitude: f64,
    /// Radians.
    pub obliquity: f64,
    /// Degrees.
    pub right_ascension: f64,
    /// Radians.
    pub declination: f64,
}

/// Meeus-style sun tracker for a fixed site.
///
/// Every call is a pure function of the site and the supplied [`GeoTime`];
/// nothing is retained between calls, so one calculator can be shared
/// across threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunCalculator {
    latitude: f64,
    longitude: f64,
    timezone: f64,
    rotation_deg: f64,
}

impl SunCalculator {
    pub fn new(latitude: f64, longitude: f64, timezone: f64) -> Self {
        Self {
            latitude,
            longitude,
            timezone,
            rotation_deg: 0.0,
        }
    }

    /// Rotation (degrees, around the vertical axis) added to every azimuth so
    /// the sun's north lines up with the mesh axes.
    pub fn with_rotation(mut self, rotation_deg: f64) -> Self {
        self.rotation_deg = rotation_deg;
        self
    }

    pub fn direction(&self, time: &GeoTime) -> SunDirection {
        let (azimuth, altitude) = self.get_position(time);
        SunDirection::from_angles(azimuth, altitude)
    }

    /// Azimuth and altitude in radians.
    pub fn get_position(&self, time: &GeoTime) -> (f64, f64) {
        let ut = self.universal_time(time);
        let eph = Self::ephemeris(day_number(time.year, time.month, time.day, ut));

        // Sidereal time at the Greenwich meridian, hours
        let gmst0 = eph.mean_longitude * DEGS / 15.0 + 12.0;
        let sidereal = gmst0 + ut + self.longitude / 15.0;
        let hour_angle = range(RADS * (15.0 * sidereal - eph.right_ascension));

        let x = hour_angle.cos() * eph.declination.cos();
        let y = hour_angle.sin() * eph.declination.cos();
        let z = eph.declination.sin();

        let lat = self.latitude * RADS;
        let x_hor = x * lat.sin() - z * lat.cos();
        let y_hor = y;
        let z_hor = x * lat.cos() + z * lat.sin();

        let azimuth = range(y_hor.atan2(x_hor) + PI + RADS * self.rotation_deg);
        let altitude = z_hor.clamp(-1.0, 1.0).asin();

        (azimuth, altitude)
    }

    /// Hours between sunrise and sunset on the date of `time`, including the
    /// solar disc and horizon refraction.
    pub fn day_length(&self, time: &GeoTime) -> f64 {
        let ut = 12.0 - self.timezone;
        let eph = Self::ephemeris(day_number(time.year, time.month, time.day, ut));

        let mut offset = RADS * (0.5 * SUN_DIAMETER + AIR_REFRACTION);
        if self.latitude < 0.0 {
            offset = -offset;
        }
        let fo = ((eph.declination + offset).tan() * (self.latitude * RADS).tan()).clamp(-1.0, 1.0);
        let half_arc = fo.asin() + PI / 2.0;

        DEGS * half_arc / 7.5
    }

    fn universal_time(&self, time: &GeoTime) -> f64 {
        time.decimal_hour() - self.timezone
    }

    pub fn ephemeris(d: f64) -> SolarEphemeris {
        let w = 282.9404 + 4.70935e-5 * d;
        let m = 356.047 + 0.9856002585 * d;
        let mean_longitude = range(w * RADS + m * RADS);
        let mean_anomaly = range(m * RADS);

        let ecc = 0.016709 - 1.151e-9 * d;
        let obliquity = 23.4393 * RADS - 3.563e-7 * RADS * d;

        // Eccentric anomaly, degrees
        let mut e = m + DEGS * ecc * mean_anomaly.sin() * (1.0 + ecc * mean_anomaly.cos());
        e = DEGS * range(e * RADS);

        let x = (e * RADS).cos() - ecc;
        let y = (e * RADS).sin() * (1.0 - ecc * ecc).sqrt();
        let r = (x * x + y * y).sqrt();
        let v = y.atan2(x) * DEGS;

        let mut lon_sun = v + w;
        if lon_sun > 360.0 {
            lon_sun -= 360.0;
        }

        let x = r * (lon_sun * RADS).cos();
        let y = r * (lon_sun * RADS).sin();
        let y_equat = y * obliquity.cos();
        let z_equat = y * obliquity.sin();

        let right_ascension = y_equat.atan2(x) * DEGS;
        let declination = z_equat.atan2((x * x + y_equat * y_equat).sqrt());

        let ecliptic_longitude = range(
            mean_longitude
                + 1.915 * RADS * mean_anomaly.sin()
                + 0.02 * RADS * (2.0 * mean_anomaly).sin(),
        );

        SolarEphemeris {
            day_number: d,
            mean_longitude,
            mean_anomaly,
            ecliptic_longitude,
            obliquity,
            right_ascension,
            declination,
        }
    }
}

/// Day number relative to 2000-01-00 0h UT. Integer arithmetic truncates like
/// the classic formula; months are not checked for length.
pub fn day_number(year: i32, month: u32, day: u32, ut: f64) -> f64 {
    let (y, m, d) = (year as i64, month as i64, day as i64);
    let days = -7 * (y + (m + 9) / 12) / 4 + 275 * m / 9 + d + 367 * y;
    days as f64 - 730530.0 + ut / 24.0
}

/// Maps an angle onto [0, 2π).
fn range(x: f64) -> f64 {
    let b = x / TAU;
    let a = TAU * (b - b.trunc());
    if a < 0.0 {
        TAU + a
    } else {
        a
    }
}
