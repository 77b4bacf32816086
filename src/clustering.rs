//! Balanced geographic clustering of seniors.
//!
//! # Algorithm
//!
//! 1. `k = ceil(n / cluster_size)` centroids seeded with k-means++.
//! 2. A fixed number of soft-capacity passes: each senior goes to the nearest
//!    centroid unless it is full, in which case a comparably close centroid
//!    with room is preferred before the nearest one overflows by one.
//! 3. Empty clusters are dropped, the rest renumbered from 1 and measured.
//! 4. Clusters much wider than the median are bisected on their farthest pair.

use rand::Rng;
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::metrics;
use crate::models::{Cluster, Coord, Diagnostics, SeniorRecord};

pub fn cluster_seniors<R: Rng>(
    seniors: &[SeniorRecord],
    config: &PlannerConfig,
    rng: &mut R,
    diagnostics: &mut Diagnostics,
) -> Vec<Cluster> {
    if seniors.is_empty() {
        return Vec::new();
    }

    let k = seniors.len().div_ceil(config.cluster_size);
    let coords: Vec<Coord> = seniors.iter().map(|s| s.coords).collect();
    let mut centers = seed_centroids(&coords, k, rng);
    let mut labels = vec![0usize; seniors.len()];

    for _round in 0..config.balancing_rounds {
        labels = balance_pass(&coords, &centers, config);
        recenter(&coords, &labels, &mut centers);
    }

    let mut groups: Vec<Vec<SeniorRecord>> = vec![Vec::new(); k];
    for (senior, &label) in seniors.iter().zip(labels.iter()) {
        groups[label].push(senior.clone());
    }

    let clusters = finalize(groups, config.min_cluster_area);
    info!(
        seniors = seniors.len(),
        requested = k,
        clusters = clusters.len(),
        "balanced clustering complete"
    );

    let before = clusters.len();
    let clusters = split_outliers(clusters, config);
    diagnostics.outlier_splits += clusters.len() - before;
    clusters
}

/// k-means++ seeding: uniform first pick, then proportional to the squared
/// distance from the nearest chosen centroid.
pub fn seed_centroids<R: Rng>(coords: &[Coord], k: usize, rng: &mut R) -> Vec<Coord> {
    let mut centers: Vec<Coord> = Vec::with_capacity(k);
    if coords.is_empty() || k == 0 {
        return centers;
    }
    centers.push(coords[rng.gen_range(0..coords.len())]);

    while centers.len() < k {
        let weights: Vec<f64> = coords
            .iter()
            .map(|c| {
                centers
                    .iter()
                    .map(|ctr| c.distance_sq(ctr))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let pick = if total > 0.0 && total.is_finite() {
            weighted_pick(&weights, rng.gen_range(0.0..total))
        } else {
            // every point sits on a chosen centroid
            rng.gen_range(0..coords.len())
        };
        centers.push(coords[pick]);
    }

    centers
}

/// Index whose cumulative weight band holds `target`. Rounding can leave
/// `target` past the last band; that falls back to the last positive weight,
/// never to a point already chosen as a centroid.
fn weighted_pick(weights: &[f64], mut target: f64) -> usize {
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            if target < w {
                return i;
            }
            last_positive = i;
        }
        target -= w;
    }
    last_positive
}

/// Centroid indices ordered by ascending distance; ties keep index order.
fn preference_order(point: &Coord, centers: &[Coord]) -> Vec<(usize, f64)> {
    let mut order: Vec<(usize, f64)> = centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, point.distance(c)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    order
}

fn balance_pass(coords: &[Coord], centers: &[Coord], config: &PlannerConfig) -> Vec<usize> {
    let target = config.cluster_size;
    let mut counts = vec![0usize; centers.len()];
    let mut labels = Vec::with_capacity(coords.len());

    for point in coords {
        let order = preference_order(point, centers);
        let (nearest, nearest_dist) = order[0];

        let chosen = if counts[nearest] < target {
            nearest
        } else if let Some(&(alt, _)) = order[1..].iter().find(|(idx, dist)| {
            counts[*idx] < target && *dist <= nearest_dist * config.comparability_factor
        }) {
            alt
        } else if counts[nearest] < config.soft_max() {
            nearest
        } else if let Some(&(open, _)) = order.iter().find(|(idx, _)| counts[*idx] < target) {
            open
        } else {
            nearest
        };

        counts[chosen] += 1;
        labels.push(chosen);
    }

    labels
}

fn recenter(coords: &[Coord], labels: &[usize], centers: &mut [Coord]) {
    let mut sums = vec![(0.0, 0.0); centers.len()];
    let mut counts = vec![0usize; centers.len()];
    for (point, &label) in coords.iter().zip(labels.iter()) {
        sums[label].0 += point.lat;
        sums[label].1 += point.lng;
        counts[label] += 1;
    }
    for (j, center) in centers.iter_mut().enumerate() {
        if counts[j] > 0 {
            let n = counts[j] as f64;
            *center = Coord::new(sums[j].0 / n, sums[j].1 / n);
        }
    }
}

/// Drops empty groups, numbers the rest from 1, tags members and measures.
pub fn finalize(groups: Vec<Vec<SeniorRecord>>, min_area: f64) -> Vec<Cluster> {
    groups
        .into_iter()
        .filter(|members| !members.is_empty())
        .enumerate()
        .map(|(index, mut members)| {
            let id = index as i32 + 1;
            for senior in members.iter_mut() {
                senior.cluster_id = Some(id);
            }
            let mut cluster = Cluster {
                id,
                centroid: Coord::new(0.0, 0.0),
                radius: 0.0,
                density: 0.0,
                members,
            };
            metrics::refresh(&mut cluster, min_area);
            cluster
        })
        .collect()
}

/// Bisects clusters whose radius exceeds `split_radius_factor` times the
/// median radius and that hold more than `split_min_members` seniors.
pub fn split_outliers(clusters: Vec<Cluster>, config: &PlannerConfig) -> Vec<Cluster> {
    let Some(median) = metrics::median_radius(&clusters) else {
        return clusters;
    };
    let threshold = median * config.split_radius_factor;

    let mut groups: Vec<Vec<SeniorRecord>> = Vec::with_capacity(clusters.len() + 1);
    let mut splits = 0usize;
    for cluster in clusters {
        if cluster.radius > threshold && cluster.len() > config.split_min_members {
            let id = cluster.id;
            match bisect(cluster.members) {
                Ok((first, second)) => {
                    debug!(
                        cluster = id,
                        first = first.len(),
                        second = second.len(),
                        "split wide cluster"
                    );
                    groups.push(first);
                    groups.push(second);
                    splits += 1;
                }
                Err(members) => groups.push(members),
            }
        } else {
            groups.push(cluster.members);
        }
    }

    if splits > 0 {
        info!(splits, median_radius = median, "split outlier clusters");
    }
    finalize(groups, config.min_cluster_area)
}

/// Splits members around their two mutually farthest points. Equal distances
/// go to the first seed. Gives the members back when a side would be empty.
pub fn bisect(
    members: Vec<SeniorRecord>,
) -> Result<(Vec<SeniorRecord>, Vec<SeniorRecord>), Vec<SeniorRecord>> {
    if members.len() < 2 {
        return Err(members);
    }

    let (mut seed_a, mut seed_b, mut widest) = (0usize, 1usize, f64::NEG_INFINITY);
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            let dist = members[i].coords.distance(&members[j].coords);
            if dist > widest {
                widest = dist;
                seed_a = i;
                seed_b = j;
            }
        }
    }

    let a = members[seed_a].coords;
    let b = members[seed_b].coords;
    let (first, second): (Vec<SeniorRecord>, Vec<SeniorRecord>) = members
        .iter()
        .cloned()
        .partition(|s| s.coords.distance(&a) <= s.coords.distance(&b));

    if first.is_empty() || second.is_empty() {
        return Err(members);
    }
    Ok((first, second))
}
