//! Nearest-neighbor data association
//!
//! Each transformed observation is matched to the closest candidate landmark by squared Euclidean distance. The
//! scan is a full linear pass over the candidate list, so the cost is O(M·K) for M observations and K candidates;
//! no spatial index is needed at the scale of a landmark map visible to a single vehicle sensor. Ties resolve to
//! the first candidate encountered.

use crate::error::{FilterError, Result};
use crate::observation::LandmarkObservation;

/// Index of the candidate closest to `observation`, or `None` when there are no candidates.
pub fn nearest_candidate(
    candidates: &[LandmarkObservation],
    observation: &LandmarkObservation,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let error = candidate.distance_squared(observation);
        match best {
            Some((_, smallest)) if error >= smallest => {}
            _ => best = Some((index, error)),
        }
    }
    best.map(|(index, _)| index)
}

/// Associates every observation with its nearest candidate.
///
/// On return the `id` of each observation is the index of its match within `candidates`, so every identifier is a
/// valid index into the candidate slice. The candidate and observation lists may have any lengths.
///
/// # Errors
/// Returns [`FilterError::EmptyCandidates`] when there are observations but no candidates; the observations are
/// left untouched in that case.
pub fn associate(
    candidates: &[LandmarkObservation],
    observations: &mut [LandmarkObservation],
) -> Result<()> {
    if candidates.is_empty() && !observations.is_empty() {
        return Err(FilterError::EmptyCandidates {
            observations: observations.len(),
        });
    }
    for observation in observations.iter_mut() {
        if let Some(index) = nearest_candidate(candidates, observation) {
            observation.id = index as i32;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::UNASSOCIATED;

    fn obs(x: f64, y: f64) -> LandmarkObservation {
        LandmarkObservation::detection(x, y)
    }

    #[test]
    fn test_permuted_exact_candidates_match_at_zero_distance() {
        let points = vec![obs(1.0, 2.0), obs(-5.0, 3.0), obs(7.5, -1.0), obs(0.0, 0.0)];
        let candidates: Vec<LandmarkObservation> = [2, 0, 3, 1]
            .iter()
            .enumerate()
            .map(|(id, &i)| LandmarkObservation::new(id as i32 + 100, points[i].x, points[i].y))
            .collect();
        let mut observations = points.clone();
        associate(&candidates, &mut observations).unwrap();
        for observation in &observations {
            let matched = &candidates[observation.id as usize];
            assert_eq!(matched.distance_squared(observation), 0.0);
        }
        assert_eq!(observations[0].id, 1);
        assert_eq!(observations[2].id, 0);
    }

    #[test]
    fn test_more_candidates_than_observations() {
        // The true nearest neighbor sits beyond the observation count
        let candidates = vec![obs(100.0, 100.0), obs(50.0, 50.0), obs(1.0, 1.0)];
        let mut observations = vec![obs(0.9, 1.1)];
        associate(&candidates, &mut observations).unwrap();
        assert_eq!(observations[0].id, 2);
    }

    #[test]
    fn test_fewer_candidates_than_observations() {
        let candidates = vec![obs(0.0, 0.0)];
        let mut observations = vec![obs(1.0, 0.0), obs(-3.0, 0.0), obs(0.0, 9.0)];
        associate(&candidates, &mut observations).unwrap();
        assert!(observations.iter().all(|o| o.id == 0));
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let candidates = vec![obs(1.0, 0.0), obs(-1.0, 0.0), obs(0.0, 1.0)];
        assert_eq!(nearest_candidate(&candidates, &obs(0.0, 0.0)), Some(0));
    }

    #[test]
    fn test_empty_candidates() {
        let mut observations = vec![obs(1.0, 0.0)];
        let err = associate(&[], &mut observations).unwrap_err();
        assert_eq!(err, FilterError::EmptyCandidates { observations: 1 });
        assert_eq!(observations[0].id, UNASSOCIATED);
        assert_eq!(nearest_candidate(&[], &observations[0]), None);
    }

    #[test]
    fn test_empty_observations() {
        let mut observations: Vec<LandmarkObservation> = Vec::new();
        assert!(associate(&[], &mut observations).is_ok());
        assert!(associate(&[obs(0.0, 0.0)], &mut observations).is_ok());
    }
}
