//! Per-cluster geometry derived from member coordinates.

use crate::models::{Cluster, Coord, SeniorRecord};

pub fn centroid(members: &[SeniorRecord]) -> Option<Coord> {
    if members.is_empty() {
        return None;
    }
    let count = members.len() as f64;
    let (lat, lng) = members
        .iter()
        .fold((0.0, 0.0), |(lat, lng), s| (lat + s.coords.lat, lng + s.coords.lng));
    Some(Coord::new(lat / count, lng / count))
}

/// Largest member distance to `center`; 0 for an empty slice.
pub fn radius(members: &[SeniorRecord], center: &Coord) -> f64 {
    members
        .iter()
        .map(|s| s.coords.distance(center))
        .fold(0.0, f64::max)
}

/// Bounding-box area of the members, never below `min_area`.
pub fn bounding_area(members: &[SeniorRecord], min_area: f64) -> f64 {
    if members.len() < 2 {
        return min_area;
    }
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lng, mut max_lng) = (f64::INFINITY, f64::NEG_INFINITY);
    for senior in members {
        min_lat = min_lat.min(senior.coords.lat);
        max_lat = max_lat.max(senior.coords.lat);
        min_lng = min_lng.min(senior.coords.lng);
        max_lng = max_lng.max(senior.coords.lng);
    }
    ((max_lat - min_lat) * (max_lng - min_lng)).max(min_area)
}

pub fn density(members: &[SeniorRecord], min_area: f64) -> f64 {
    members.len() as f64 / bounding_area(members, min_area)
}

/// Recomputes centroid, radius and density in place. Empty clusters keep
/// their centroid and get zeroed metrics.
pub fn refresh(cluster: &mut Cluster, min_area: f64) {
    if let Some(center) = centroid(&cluster.members) {
        cluster.centroid = center;
        cluster.radius = radius(&cluster.members, &center);
        cluster.density = density(&cluster.members, min_area);
    } else {
        cluster.radius = 0.0;
        cluster.density = 0.0;
    }
}

/// Median cluster radius; the mean of the middle pair for an even count.
pub fn median_radius(clusters: &[Cluster]) -> Option<f64> {
    if clusters.is_empty() {
        return None;
    }
    let mut radii: Vec<f64> = clusters.iter().map(|c| c.radius).collect();
    radii.sort_by(|a, b| a.total_cmp(b));
    let mid = radii.len() / 2;
    if radii.len() % 2 == 0 {
        Some((radii[mid - 1] + radii[mid]) / 2.0)
    } else {
        Some(radii[mid])
    }
}
