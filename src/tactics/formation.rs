//! Formation classification from unit positions

use std::f32::consts::TAU;

use crate::core::types::Position;
use crate::tactics::situation::Formation;

/// Max pairwise spread for a phalanx
const PHALANX_SPREAD: f32 = 3.0;
/// Spread beyond which a group is skirmishing
const SKIRMISH_SPREAD: f32 = 6.0;

/// Classify the shape of a group
///
/// Checked in order: phalanx, skirmish, defensive line, encircle. Returns
/// `None` for an empty group.
pub fn classify_formation(
    positions: &[Position],
    opposing_centroid: Option<(f32, f32)>,
    line_tolerance: f32,
) -> Option<Formation> {
    if positions.is_empty() {
        return None;
    }

    let spread = max_pairwise_distance(positions);
    if spread <= PHALANX_SPREAD {
        return Some(Formation::Phalanx);
    }
    if spread > SKIRMISH_SPREAD {
        return Some(Formation::Skirmish);
    }
    if is_near_collinear(positions, line_tolerance) {
        return Some(Formation::DefensiveLine);
    }
    if let Some(center) = opposing_centroid {
        if surrounds(positions, center) {
            return Some(Formation::Encircle);
        }
    }
    Some(Formation::Irregular)
}

pub fn centroid(positions: &[Position]) -> Option<(f32, f32)> {
    if positions.is_empty() {
        return None;
    }
    let n = positions.len() as f32;
    let (sx, sy) = positions
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f32, sy + p.y as f32));
    Some((sx / n, sy / n))
}

fn max_pairwise_distance(positions: &[Position]) -> f32 {
    let mut max = 0.0f32;
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            max = max.max(a.euclidean(b));
        }
    }
    max
}

/// Every point within `tolerance` of the line through the two farthest points
fn is_near_collinear(positions: &[Position], tolerance: f32) -> bool {
    if positions.len() < 3 {
        return false;
    }

    let mut ends = (positions[0], positions[1]);
    let mut best = -1.0f32;
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            let d = a.euclidean(b);
            if d > best {
                best = d;
                ends = (*a, *b);
            }
        }
    }

    let (a, b) = ends;
    let (dx, dy) = ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return false;
    }
    positions.iter().all(|p| {
        let cross = dx * (p.y - a.y) as f32 - dy * (p.x - a.x) as f32;
        (cross / len).abs() <= tolerance
    })
}

/// No angular gap of half a turn or more around `center`
fn surrounds(positions: &[Position], center: (f32, f32)) -> bool {
    let mut angles: Vec<f32> = positions
        .iter()
        .map(|p| (p.x as f32 - center.0, p.y as f32 - center.1))
        .filter(|(dx, dy)| dx.abs() > f32::EPSILON || dy.abs() > f32::EPSILON)
        .map(|(dx, dy)| dy.atan2(dx).rem_euclid(TAU))
        .collect();
    if angles.len() < 3 {
        return false;
    }
    angles.sort_by(|a, b| a.total_cmp(b));

    let half = TAU / 2.0;
    let wrap = angles[0] + TAU - angles[angles.len() - 1];
    wrap < half && angles.windows(2).all(|w| w[1] - w[0] < half)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(i32, i32)]) -> Vec<Position> {
        coords.iter().map(|&(x, y)| Position::new(x, y)).collect()
    }

    #[test]
    fn test_empty_group_has_no_formation() {
        assert_eq!(classify_formation(&[], None, 1.0), None);
    }

    #[test]
    fn test_tight_block_is_phalanx() {
        let group = pts(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(classify_formation(&group, None, 1.0), Some(Formation::Phalanx));
    }

    #[test]
    fn test_wide_spread_is_skirmish() {
        let group = pts(&[(0, 0), (8, 0), (3, 5)]);
        assert_eq!(classify_formation(&group, None, 1.0), Some(Formation::Skirmish));
    }

    #[test]
    fn test_straight_row_is_defensive_line() {
        let group = pts(&[(0, 0), (2, 0), (4, 0), (5, 1)]);
        assert_eq!(
            classify_formation(&group, None, 1.0),
            Some(Formation::DefensiveLine)
        );
    }

    #[test]
    fn test_ring_around_enemy_is_encircle() {
        let group = pts(&[(0, 2), (4, 0), (4, 4), (2, 5)]);
        let enemy = centroid(&pts(&[(2, 2)]));
        assert_eq!(classify_formation(&group, enemy, 0.5), Some(Formation::Encircle));
    }

    #[test]
    fn test_one_sided_group_is_irregular() {
        let group = pts(&[(0, 0), (4, 0), (2, 3), (1, 4)]);
        let enemy = centroid(&pts(&[(8, 2)]));
        assert_eq!(classify_formation(&group, enemy, 0.5), Some(Formation::Irregular));
    }
}
