use crate::{
    tokens::{read_to_string, Tokens},
    Error, Result,
};
use std::path::Path;

/// The earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// A latitude and longitude in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The great circle distance to `other` in kilometers.
    pub fn distance_km(&self, other: &Self) -> f64 {
        let lat_a = self.latitude.to_radians();
        let lat_b = other.latitude.to_radians();
        let half_dlat = (lat_a - lat_b) / 2.0;
        let half_dlon = (self.longitude - other.longitude).to_radians() / 2.0;
        let h = half_dlat.sin().powi(2) + lat_a.cos() * lat_b.cos() * half_dlon.sin().powi(2);
        2.0 * h.sqrt().asin() * EARTH_RADIUS_KM
    }
}

/// Gps coordinates indexed by image ordinal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsTable {
    pub coordinates: Vec<GpsCoordinate>,
}

impl GpsTable {
    /// Parses a count followed by `latitude longitude` pairs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Tokens::new("gps table", text);
        let count: usize = tokens.next("coordinate count")?;
        let coordinates = (0..count)
            .map(|_| {
                Ok(GpsCoordinate::new(
                    tokens.next("latitude")?,
                    tokens.next("longitude")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        tokens.finish()?;
        Ok(Self { coordinates })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Looks up the coordinate of image `index`, naming the table `what` in errors.
    pub fn get(&self, what: &'static str, index: usize) -> Result<GpsCoordinate> {
        self.coordinates
            .get(index)
            .copied()
            .ok_or(Error::MissingGps {
                what,
                index,
                len: self.len(),
            })
    }
}
