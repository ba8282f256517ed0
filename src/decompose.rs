//! Partition strategies — splitting one bitmap into N layers.
//!
//! Both strategies assign every source pixel to exactly one output layer
//! and copy it there unchanged (or RGB-inverted), alpha included. Layers
//! start as flat buffers filled with the configured backdrop, so the
//! pieces later recombine into the source under the backdrop's blend mode.

use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::canvas::{self, Background};
use crate::progress::ProgressReporter;

/// Pixels between progress updates during the per-pixel copy loops.
pub const PROGRESS_STRIDE: u64 = 10_000;

// ============================================================================
// BLOCK STRATEGY
// ============================================================================

/// Split `source` into `num_pieces` layers on a square grid.
///
/// The grid is anchored at the origin; cells on the right and bottom edges
/// shrink to `min(block_size, remaining)`. Each cell draws one uniform
/// owner from `rng` and every pixel in the cell lands on that owner's
/// layer.
pub fn decompose_blocks(
    source: &RgbaImage,
    num_pieces: u32,
    block_size: u32,
    background: Background,
    invert: bool,
    rng: &mut impl Rng,
    progress: &mut ProgressReporter<'_>,
) -> Vec<RgbaImage> {
    let (width, height) = source.dimensions();
    let mut layers = new_layers(num_pieces, width, height, background);

    let total_pixels = width as u64 * height as u64;
    let mut processed: u64 = 0;

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let owner = rng.gen_range(0..num_pieces) as usize;
            let cell_w = block_size.min(width - x);
            let cell_h = block_size.min(height - y);

            let layer = &mut layers[owner];
            for cy in y..y + cell_h {
                for cx in x..x + cell_w {
                    layer.put_pixel(cx, cy, transfer_pixel(*source.get_pixel(cx, cy), invert));
                }
            }
            processed += cell_w as u64 * cell_h as u64;

            if processed % PROGRESS_STRIDE == 0 {
                let pct = processed as f64 / total_pixels as f64 * 100.0;
                progress.report(pct, &format!("Processing blocks... {}%", pct.round()));
            }
            x += block_size;
        }
        y += block_size;
    }

    layers
}

// ============================================================================
// VORONOI STRATEGY
// ============================================================================

/// A Voronoi site: a continuous position inside the bitmap plus the layer
/// that owns its cell.
#[derive(Clone, Copy, Debug)]
pub struct Seed {
    pub x: f64,
    pub y: f64,
    pub owner: u32,
}

/// Draw `count` seeds uniformly over the bitmap, each with a uniform owner.
/// Draw order per seed is x, then y, then owner.
pub fn scatter_seeds(
    count: u32,
    num_pieces: u32,
    width: u32,
    height: u32,
    rng: &mut impl Rng,
) -> Vec<Seed> {
    (0..count)
        .map(|_| {
            let x = rng.r#gen::<f64>() * width as f64;
            let y = rng.r#gen::<f64>() * height as f64;
            let owner = rng.gen_range(0..num_pieces);
            Seed { x, y, owner }
        })
        .collect()
}

/// Index of the seed nearest to `(px, py)` by squared euclidean distance.
/// Ties go to the lowest seed index.
pub fn nearest_seed(seeds: &[Seed], px: u32, py: u32) -> usize {
    let (fx, fy) = (px as f64, py as f64);
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, seed) in seeds.iter().enumerate() {
        let dx = seed.x - fx;
        let dy = seed.y - fy;
        let dist = dx * dx + dy * dy;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Uniform bucket index over the seed set.
///
/// Cuts the nearest-seed query from O(seeds) to a small ring search while
/// returning exactly the same index as [`nearest_seed`], including the
/// lowest-index tie rule.
pub struct SeedGrid<'a> {
    seeds: &'a [Seed],
    cell: f64,
    cols: u32,
    rows: u32,
    // seed indices per bucket, ascending within each bucket
    buckets: Vec<Vec<u32>>,
}

impl<'a> SeedGrid<'a> {
    pub fn new(seeds: &'a [Seed], width: u32, height: u32) -> Self {
        debug_assert!(!seeds.is_empty());
        // Aim for roughly one seed per bucket
        let area = (width as f64 * height as f64).max(1.0);
        let cell = (area / seeds.len() as f64).sqrt().max(1.0);
        let cols = ((width as f64 / cell).ceil() as u32).max(1);
        let rows = ((height as f64 / cell).ceil() as u32).max(1);

        let mut buckets = vec![Vec::new(); (cols * rows) as usize];
        for (i, seed) in seeds.iter().enumerate() {
            let bx = ((seed.x / cell) as u32).min(cols - 1);
            let by = ((seed.y / cell) as u32).min(rows - 1);
            buckets[(by * cols + bx) as usize].push(i as u32);
        }
        Self { seeds, cell, cols, rows, buckets }
    }

    /// Nearest seed index for a pixel, matching [`nearest_seed`] exactly.
    pub fn nearest(&self, px: u32, py: u32) -> usize {
        let (fx, fy) = (px as f64, py as f64);
        let bx = ((fx / self.cell) as i64).clamp(0, self.cols as i64 - 1);
        let by = ((fy / self.cell) as i64).clamp(0, self.rows as i64 - 1);

        let mut best = usize::MAX;
        let mut best_dist = f64::INFINITY;

        let max_ring = self.cols.max(self.rows) as i64;
        for ring in 0..=max_ring {
            // A bucket on this ring cannot hold anything closer than
            // (ring - 1) cells away; once the current best beats that,
            // wider rings cannot improve it or tie it with a lower index
            // (lower indices would have been seen in an earlier ring or
            // the same bucket scan, which visits ascending indices).
            if best != usize::MAX {
                let ring_floor = (ring - 1).max(0) as f64 * self.cell;
                if ring_floor * ring_floor > best_dist {
                    break;
                }
            }
            self.scan_ring(bx, by, ring, fx, fy, &mut best, &mut best_dist);
        }
        best
    }

    fn scan_ring(
        &self,
        bx: i64,
        by: i64,
        ring: i64,
        fx: f64,
        fy: f64,
        best: &mut usize,
        best_dist: &mut f64,
    ) {
        let lo_x = bx - ring;
        let hi_x = bx + ring;
        let lo_y = by - ring;
        let hi_y = by + ring;
        for gy in lo_y..=hi_y {
            if gy < 0 || gy >= self.rows as i64 {
                continue;
            }
            for gx in lo_x..=hi_x {
                // Only the ring's perimeter; the interior was already scanned
                if ring > 0 && gx != lo_x && gx != hi_x && gy != lo_y && gy != hi_y {
                    continue;
                }
                if gx < 0 || gx >= self.cols as i64 {
                    continue;
                }
                let bucket = &self.buckets[(gy as u32 * self.cols + gx as u32) as usize];
                for &i in bucket {
                    let seed = self.seeds[i as usize];
                    let dx = seed.x - fx;
                    let dy = seed.y - fy;
                    let dist = dx * dx + dy * dy;
                    if dist < *best_dist || (dist == *best_dist && (i as usize) < *best) {
                        *best_dist = dist;
                        *best = i as usize;
                    }
                }
            }
        }
    }
}

/// Split `source` into `num_pieces` layers along a Voronoi diagram.
///
/// `num_seeds` sites are scattered uniformly, each claiming a layer; every
/// pixel lands on the layer owned by its nearest site.
pub fn decompose_voronoi(
    source: &RgbaImage,
    num_pieces: u32,
    num_seeds: u32,
    background: Background,
    invert: bool,
    rng: &mut impl Rng,
    progress: &mut ProgressReporter<'_>,
) -> Vec<RgbaImage> {
    let (width, height) = source.dimensions();
    let mut layers = new_layers(num_pieces, width, height, background);

    let seeds = scatter_seeds(num_seeds, num_pieces, width, height, rng);
    if seeds.is_empty() {
        return layers;
    }
    let grid = SeedGrid::new(&seeds, width, height);

    let total_pixels = width as u64 * height as u64;
    let mut processed: u64 = 0;

    for y in 0..height {
        for x in 0..width {
            let owner = seeds[grid.nearest(x, y)].owner as usize;
            layers[owner].put_pixel(x, y, transfer_pixel(*source.get_pixel(x, y), invert));

            processed += 1;
            if processed % PROGRESS_STRIDE == 0 {
                let pct = processed as f64 / total_pixels as f64 * 100.0;
                progress.report(pct, &format!("Processing Voronoi... {}%", pct.round()));
            }
        }
    }

    layers
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

fn new_layers(num_pieces: u32, width: u32, height: u32, background: Background) -> Vec<RgbaImage> {
    (0..num_pieces)
        .map(|_| canvas::new_filled(width, height, background))
        .collect()
}

#[inline]
fn transfer_pixel(px: Rgba<u8>, invert: bool) -> Rgba<u8> {
    if invert { canvas::invert_pixel(px) } else { px }
}
