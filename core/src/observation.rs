//! Landmark observations
//!
//! A [`LandmarkObservation`] is used in two senses. Raw observations are the sensor detections expressed in the
//! vehicle frame; their identifier is a placeholder. Transformed observations are the same detections expressed
//! in the map frame as seen from the pose of one particle; association overwrites their identifier with the index
//! of the matched candidate landmark.

use crate::Pose;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Identifier carried by an observation that has not been associated yet.
pub const UNASSOCIATED: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkObservation {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}

impl LandmarkObservation {
    pub fn new(id: i32, x: f64, y: f64) -> Self {
        LandmarkObservation { id, x, y }
    }

    /// A raw sensor detection in the vehicle frame.
    pub fn detection(x: f64, y: f64) -> Self {
        LandmarkObservation::new(UNASSOCIATED, x, y)
    }

    /// Squared Euclidean distance to another observation.
    pub fn distance_squared(&self, other: &LandmarkObservation) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Transforms a vehicle-frame observation into the map frame as seen from `pose`.
    ///
    /// $$
    /// x' = p_x + o_x \cos\theta - o_y \sin\theta, \quad y' = p_y + o_y \cos\theta + o_x \sin\theta
    /// $$
    pub fn to_map_frame(&self, pose: &Pose) -> LandmarkObservation {
        let point = pose.to_isometry() * Point2::new(self.x, self.y);
        LandmarkObservation::new(self.id, point.x, point.y)
    }
}

/// Transforms a full observation set into the map frame of a single particle.
pub fn transform_observations(
    observations: &[LandmarkObservation],
    pose: &Pose,
) -> Vec<LandmarkObservation> {
    observations
        .iter()
        .map(|observation| observation.to_map_frame(pose))
        .collect()
}
