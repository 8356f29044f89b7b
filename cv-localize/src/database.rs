use crate::{AssignmentStore, Error, Reconstruction, Result};
use log::*;

/// Everything a query is matched against: the reconstruction and the visual word index of its
/// descriptors.
#[derive(Debug, Clone)]
pub struct Database {
    pub reconstruction: Reconstruction,
    pub assignments: AssignmentStore,
}

impl Database {
    /// Assembles a database, checking that the assignments refer to reconstruction points.
    pub fn new(reconstruction: Reconstruction, assignments: AssignmentStore) -> Result<Self> {
        let points = reconstruction.points.len();
        if assignments.num_points > points {
            return Err(Error::inconsistent(
                "database",
                format!(
                    "the assignments refer to {} points but the reconstruction has {}",
                    assignments.num_points, points
                ),
            ));
        }
        if assignments.num_points < points {
            warn!(
                "only {} of the {} reconstruction points have descriptors",
                assignments.num_points, points
            );
        }
        let unobserved = reconstruction
            .points
            .iter()
            .filter(|point| point.views.is_empty())
            .count();
        if unobserved != 0 {
            debug!("{} points are not observed by any camera", unobserved);
        }
        Ok(Self {
            reconstruction,
            assignments,
        })
    }
}
