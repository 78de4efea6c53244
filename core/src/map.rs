//! Landmark map
//!
//! The map is a read-only list of identifiable point features in the map frame. It is loaded once at startup
//! and shared by every particle during the weight update.

use crate::observation::LandmarkObservation;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// A single map landmark: identifier and map-frame position in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapLandmark {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}

impl MapLandmark {
    pub fn new(id: i32, x: f64, y: f64) -> Self {
        MapLandmark { id, x, y }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkMap {
    landmarks: Vec<MapLandmark>,
}

impl From<Vec<MapLandmark>> for LandmarkMap {
    fn from(landmarks: Vec<MapLandmark>) -> Self {
        LandmarkMap { landmarks }
    }
}

impl LandmarkMap {
    pub fn new(landmarks: Vec<MapLandmark>) -> Self {
        LandmarkMap { landmarks }
    }

    pub fn landmarks(&self) -> &[MapLandmark] {
        &self.landmarks
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Landmarks strictly closer than `sensor_range` to the position `(x, y)`, in map order.
    ///
    /// The returned observations carry the map landmark identifier and its map-frame position and serve as the
    /// association candidates of a single particle.
    pub fn in_range(&self, x: f64, y: f64, sensor_range: f64) -> Vec<LandmarkObservation> {
        self.landmarks
            .iter()
            .filter(|landmark| (landmark.x - x).hypot(landmark.y - y) < sensor_range)
            .map(|landmark| LandmarkObservation::new(landmark.id, landmark.x, landmark.y))
            .collect()
    }

    /// Reads a map from a CSV file with an `id,x,y` header.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to read.
    ///
    /// # Returns
    /// * `Ok(LandmarkMap)` if successful.
    /// * `Err` if the file cannot be read or parsed.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: MapLandmark = result?;
            landmarks.push(landmark);
        }
        Ok(LandmarkMap { landmarks })
    }

    /// Writes the map to a CSV file with an `id,x,y` header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for landmark in &self.landmarks {
            writer.serialize(landmark)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn square_map() -> LandmarkMap {
        LandmarkMap::new(vec![
            MapLandmark::new(1, 10.0, 0.0),
            MapLandmark::new(2, 0.0, 10.0),
            MapLandmark::new(3, -20.0, 0.0),
            MapLandmark::new(4, 0.0, -30.0),
        ])
    }

    #[test]
    fn test_in_range_filters_by_distance() {
        let map = square_map();
        let candidates = map.in_range(0.0, 0.0, 25.0);
        let ids: Vec<i32> = candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(candidates[2].x, -20.0);
    }

    #[test]
    fn test_in_range_is_strict() {
        let map = square_map();
        // Landmarks 1 and 2 sit exactly on the boundary
        let candidates = map.in_range(0.0, 0.0, 10.0);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.csv");
        let map = square_map();
        map.to_csv(&path).unwrap();
        let loaded = LandmarkMap::from_csv(&path).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn test_from_csv_missing_file() {
        assert!(LandmarkMap::from_csv("/nonexistent/map.csv").is_err());
    }
}
