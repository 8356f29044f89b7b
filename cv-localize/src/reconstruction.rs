use crate::{
    tokens::{read_to_string, Tokens},
    Error, Result,
};
use log::*;
use nalgebra::Point3;
use std::path::Path;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A triangulated point and the database images that observe it.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub position: Point3<f64>,
    pub color: [u8; 3],
    /// Indices into [`Reconstruction::cameras`], without duplicates.
    pub views: Vec<usize>,
}

/// A database image.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// The stable id used to look up per-image side tables such as gps coordinates.
    pub id: usize,
    /// Indices into [`Reconstruction::points`] of every point this image observes.
    pub points: Vec<usize>,
}

/// The structure side of a structure from motion reconstruction.
///
/// Only the parts needed for localization are kept: where each point is and which database
/// images see it.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub cameras: Vec<Camera>,
    pub points: Vec<Point>,
}

impl Reconstruction {
    /// Builds a reconstruction from points with their view lists.
    ///
    /// Camera `i` gets id `i` and the point list is derived from the views. Repeated views
    /// of a point are collapsed.
    pub fn from_views(num_cameras: usize, mut points: Vec<Point>) -> Result<Self> {
        let mut cameras: Vec<Camera> = (0..num_cameras)
            .map(|id| Camera { id, points: vec![] })
            .collect();
        for (ix, point) in points.iter_mut().enumerate() {
            let mut seen = Vec::with_capacity(point.views.len());
            for &camera in &point.views {
                if camera >= num_cameras {
                    return Err(Error::inconsistent(
                        "reconstruction",
                        format!(
                            "point {} is observed by camera {} but there are only {} cameras",
                            ix, camera, num_cameras
                        ),
                    ));
                }
                if !seen.contains(&camera) {
                    seen.push(camera);
                    cameras[camera].points.push(ix);
                }
            }
            point.views = seen;
        }
        Ok(Self { cameras, points })
    }

    /// Parses a Bundler v0.3 `.out` file.
    ///
    /// Camera intrinsics and poses are read and discarded. Lines starting with `#` are
    /// comments.
    pub fn from_bundler(text: &str) -> Result<Self> {
        let body: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .flat_map(|line| [line, "\n"])
            .collect();
        let mut tokens = Tokens::new("bundler file", &body);
        let num_cameras: usize = tokens.next("camera count")?;
        let num_points: usize = tokens.next("point count")?;
        for _ in 0..num_cameras {
            // focal length, two distortion terms, rotation and translation
            for _ in 0..15 {
                tokens.next::<f64>("camera parameter")?;
            }
        }
        let mut points = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            let position = Point3::new(
                tokens.next("point x")?,
                tokens.next("point y")?,
                tokens.next("point z")?,
            );
            let color = [
                tokens.next("red")?,
                tokens.next("green")?,
                tokens.next("blue")?,
            ];
            let num_views: usize = tokens.next("view count")?;
            let mut views = Vec::with_capacity(num_views);
            for _ in 0..num_views {
                views.push(tokens.next("view camera")?);
                tokens.next::<i64>("view key")?;
                tokens.next::<f64>("view x")?;
                tokens.next::<f64>("view y")?;
            }
            points.push(Point {
                position,
                color,
                views,
            });
        }
        tokens.finish()?;
        Self::from_views(num_cameras, points)
    }

    pub fn load_bundler(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reconstruction = Self::from_bundler(&read_to_string(path)?)?;
        info!(
            "loaded {} cameras and {} points from {}",
            reconstruction.cameras.len(),
            reconstruction.points.len(),
            path.display()
        );
        Ok(reconstruction)
    }

    #[cfg(feature = "serde-serialize")]
    pub fn from_bincode(reader: impl std::io::Read) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }

    #[cfg(feature = "serde-serialize")]
    pub fn to_bincode(&self, writer: impl std::io::Write) -> Result<()> {
        Ok(bincode::serialize_into(writer, self)?)
    }

    /// Loads a reconstruction, choosing the format from the extension.
    ///
    /// `.out` files are read as Bundler files and anything else as a bincode cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.extension().map_or(false, |ext| ext == "out") {
            return Self::load_bundler(path);
        }
        #[cfg(feature = "serde-serialize")]
        {
            let file = std::fs::File::open(path).map_err(Error::io(path))?;
            let reconstruction = Self::from_bincode(std::io::BufReader::new(file))?;
            info!(
                "loaded cached reconstruction with {} cameras and {} points",
                reconstruction.cameras.len(),
                reconstruction.points.len()
            );
            Ok(reconstruction)
        }
        #[cfg(not(feature = "serde-serialize"))]
        {
            Err(Error::Setting {
                name: "reconstruction",
                message: format!(
                    "{} is not a bundler file and caches need the serde-serialize feature",
                    path.display()
                ),
            })
        }
    }
}
