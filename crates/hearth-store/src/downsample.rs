//! Largest-Triangle-Three-Buckets downsampling.
//!
//! Reduces an ordered sample sequence to exactly `threshold` points while
//! preserving the visual shape of the series: the first and last points are
//! kept unconditionally, and each intermediate bucket contributes the point
//! forming the largest triangle with the previously emitted point and the
//! average of the next bucket.
//!
//! Applied only to range queries with a point cap, never to aggregation
//! queries. Null values participate as 0 in the area arithmetic; they are
//! not skipped, so the selected points keep their original null values.

use crate::types::Sample;

/// Downsamples `data` to exactly `threshold` points.
///
/// Returns the input unchanged when `data.len() <= threshold` or
/// `threshold < 3`. Otherwise the output always starts with `data[0]`,
/// ends with the last input point, and has length exactly `threshold`.
///
/// Ties on triangle area keep the first candidate found (strict `>`
/// comparison); this is part of the stable output contract.
#[must_use]
pub fn lttb(data: &[Sample], threshold: usize) -> Vec<Sample> {
    if data.len() <= threshold || threshold < 3 {
        return data.to_vec();
    }

    let mut sampled = Vec::with_capacity(threshold);
    sampled.push(data[0]);

    // Real-valued bucket width over the interior points.
    let bucket_size = (data.len() - 2) as f64 / (threshold - 2) as f64;

    for i in 0..threshold - 2 {
        // Average of the *next* bucket, used as the triangle's third vertex.
        let avg_range_start = ((i as f64 + 1.0) * bucket_size) as usize + 1;
        let avg_range_end = (((i as f64 + 2.0) * bucket_size) as usize + 1).min(data.len());

        let (avg_x, avg_y) = if avg_range_end > avg_range_start {
            let len = (avg_range_end - avg_range_start) as f64;
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            for point in &data[avg_range_start..avg_range_end] {
                sum_x += point.timestamp;
                sum_y += point.value.unwrap_or(0.0);
            }
            (sum_x / len, sum_y / len)
        } else {
            // Empty averaging range at the tail: fall back to the last point.
            let last = data[data.len() - 1];
            (last.timestamp, last.value.unwrap_or(0.0))
        };

        // Current bucket range.
        let range_offs = (i as f64 * bucket_size) as usize + 1;
        let range_to = ((i as f64 + 1.0) * bucket_size) as usize + 1;

        // Point A is the previously emitted point.
        let point_a = sampled[sampled.len() - 1];
        let a_x = point_a.timestamp;
        let a_y = point_a.value.unwrap_or(0.0);

        let mut max_area = -1.0_f64;
        let mut max_idx = range_offs;

        for j in range_offs..range_to.min(data.len()) {
            let y = data[j].value.unwrap_or(0.0);

            // Shoelace formula for the A / candidate / next-average triangle.
            let area = ((a_x - avg_x) * (y - a_y) - (a_x - data[j].timestamp) * (avg_y - a_y))
                .abs()
                * 0.5;

            if area > max_area {
                max_area = area;
                max_idx = j;
            }
        }

        sampled.push(data[max_idx]);
    }

    sampled.push(data[data.len() - 1]);
    sampled
}
