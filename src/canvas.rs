//! The `canvas` module precomputes per-version drawing artifacts: the base
//! module grid with every function pattern in place, the function-module
//! bitmap, the eight mask overlays and the zig-zag order in which codeword
//! bits are written. It also scores masked grids for mask selection.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use hashbrown::HashMap;

use crate::ec;
use crate::types::{EcLevel, Version};

/// Reads bit `index` of a packed grid (bit `index & 31` of word `index >> 5`).
#[inline]
pub(crate) fn grid_bit(words: &[u32], index: usize) -> bool {
    words[index >> 5] >> (index & 31) & 1 != 0
}

/// Writes bit `index` of a packed grid.
#[inline]
pub(crate) fn set_grid_bit(words: &mut [u32], index: usize, value: bool) {
    if value {
        words[index >> 5] |= 1 << (index & 31);
    } else {
        words[index >> 5] &= !(1 << (index & 31));
    }
}

#[inline]
fn format_bit(bits: u32, i: i32) -> bool {
    bits >> i & 1 != 0
}

/// Per-version drawing artifacts, built once and shared read-only.
///
/// The base grid already contains the finder, separator, timing and
/// alignment patterns, and for version 7 and up the two version information
/// blocks. The format information region is reserved (marked as function
/// modules) but left light; the encoder overwrites it per mask. The grid,
/// the function bitmap and the mask overlays all use the same packed-word
/// layout, so applying a mask is a whole-word XOR.
pub struct Template {
    version: Version,
    size: i32,
    grid: Vec<u32>,
    function: Vec<u32>,
    masks: [Vec<u32>; 8],
    data_output: Vec<u32>,
}

impl Template {
    fn new(version: Version) -> Self {
        let size = version.width();
        let words = (size * size + 31) as usize / 32;
        let mut template = Self {
            version,
            size,
            grid: vec![0; words],
            function: vec![0; words],
            masks: Default::default(),
            data_output: Vec::new(),
        };
        template.draw_function_patterns();
        template.build_masks();
        template.build_data_output();
        template
    }

    /// The version this template belongs to.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Modules per side.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// The base grid with all function patterns drawn.
    pub fn grid(&self) -> &[u32] {
        &self.grid
    }

    /// Bitmap of function modules: positions not paintable by data bits and
    /// exempt from masking.
    pub fn function(&self) -> &[u32] {
        &self.function
    }

    /// The XOR overlay for the given mask index.
    ///
    /// # Panics
    ///
    /// Panics if `mask` is not in [0, 7].
    pub fn mask_overlay(&self, mask: u8) -> &[u32] {
        &self.masks[usize::from(mask)]
    }

    /// Linearized module indexes (`y * size + x`) in codeword bit order.
    pub fn data_output(&self) -> &[u32] {
        &self.data_output
    }

    fn is_function(&self, x: i32, y: i32) -> bool {
        grid_bit(&self.function, (y * self.size + x) as usize)
    }

    fn set_function_module(&mut self, x: i32, y: i32, dark: bool) {
        let index = (y * self.size + x) as usize;
        set_grid_bit(&mut self.grid, index, dark);
        set_grid_bit(&mut self.function, index, true);
    }

    fn draw_function_patterns(&mut self) {
        let size = self.size;

        // Timing patterns on row 6 and column 6, dark at even coordinates.
        for i in 0..size {
            self.set_function_module(6, i, i % 2 == 0);
            self.set_function_module(i, 6, i % 2 == 0);
        }

        // Finder patterns with their separator rings, clipped at the edges.
        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(size - 4, 3);
        self.draw_finder_pattern(3, size - 4);

        // Alignment patterns, skipping the three finder corners.
        let positions = alignment_positions(self.version);
        let count = positions.len();
        for i in 0..count {
            for j in 0..count {
                let corner = (i == 0 && j == 0)
                    || (i == 0 && j == count - 1)
                    || (i == count - 1 && j == 0);
                if !corner {
                    self.draw_alignment_pattern(positions[i], positions[j]);
                }
            }
        }

        self.reserve_format_regions();
        self.draw_version_info();
    }

    fn draw_finder_pattern(&mut self, x: i32, y: i32) {
        for dy in -4..=4 {
            for dx in -4..=4 {
                let xx = x + dx;
                let yy = y + dy;
                if (0..self.size).contains(&xx) && (0..self.size).contains(&yy) {
                    let dist = dx.abs().max(dy.abs());
                    self.set_function_module(xx, yy, dist != 2 && dist != 4);
                }
            }
        }
    }

    fn draw_alignment_pattern(&mut self, x: i32, y: i32) {
        for dy in -2..=2 {
            for dx in -2..=2 {
                self.set_function_module(x + dx, y + dy, dx.abs().max(dy.abs()) != 1);
            }
        }
    }

    /// Marks the format information positions as light function modules.
    /// The encoder draws the real bits once the mask is known.
    fn reserve_format_regions(&mut self) {
        let size = self.size;
        // Copy adjacent to the top-left finder.
        for i in 0..6 {
            self.set_function_module(8, i, false);
        }
        self.set_function_module(8, 7, false);
        self.set_function_module(8, 8, false);
        self.set_function_module(7, 8, false);
        for i in 0..6 {
            self.set_function_module(i, 8, false);
        }
        // Split copy under the top-right and left of the bottom-left finder,
        // including the always-dark module at (8, size - 8).
        for i in 0..8 {
            self.set_function_module(size - 1 - i, 8, false);
        }
        for i in 0..8 {
            self.set_function_module(8, size - 8 + i, false);
        }
    }

    /// Draws the two 3×6 version information blocks (version 7 and up).
    fn draw_version_info(&mut self) {
        let version = i32::from(self.version.value());
        if version < 7 {
            return;
        }

        // 6-bit version with a 12-bit BCH remainder, generator 0x1F25.
        let bits: u32 = {
            let data = version as u32;
            let mut rem = data;
            for _ in 0..12 {
                rem = (rem << 1) ^ ((rem >> 11) * 0x1F25);
            }
            data << 12 | rem
        };
        debug_assert_eq!(bits >> 18, 0);

        for i in 0..18 {
            let bit = format_bit(bits, i);
            let a = self.size - 11 + i % 3;
            let b = i / 3;
            self.set_function_module(a, b, bit);
            self.set_function_module(b, a, bit);
        }
    }

    fn build_masks(&mut self) {
        let size = self.size;
        for (m, overlay) in self.masks.iter_mut().enumerate() {
            *overlay = vec![0; self.grid.len()];
            for y in 0..size {
                for x in 0..size {
                    let index = (y * size + x) as usize;
                    if !grid_bit(&self.function, index) && mask_condition(m as u8, x, y) {
                        set_grid_bit(overlay, index, true);
                    }
                }
            }
        }
    }

    /// Walks column pairs right to left, alternating the vertical direction,
    /// collecting non-function module indexes. Stops at a whole number of
    /// codewords; the `raw mod 8` leftover modules stay light.
    fn build_data_output(&mut self) {
        let size = self.size;
        let bit_count = ec::num_raw_data_modules(self.version) / 8 * 8;
        self.data_output.reserve_exact(bit_count);
        let mut right = size - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            let upward = (right + 1) & 2 == 0;
            for vert in 0..size {
                let y = if upward { size - 1 - vert } else { vert };
                for j in 0..2 {
                    let x = right - j;
                    if !self.is_function(x, y) && self.data_output.len() < bit_count {
                        self.data_output.push((y * size + x) as u32);
                    }
                }
            }
            right -= 2;
        }
        debug_assert_eq!(self.data_output.len(), bit_count);
    }
}

/// Returns the shared template for the given version, building it on first
/// use. Same single-flight regime as [`ec::rs_generator`].
pub fn template(version: Version) -> Arc<Template> {
    static CACHE: OnceLock<Mutex<HashMap<u8, Arc<Template>>>> = OnceLock::new();
    let mut cache = CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    cache
        .entry(version.value())
        .or_insert_with(|| Arc::new(Template::new(version)))
        .clone()
}

/// The centre coordinates of the alignment patterns for a version, in
/// ascending order. Empty for version 1.
///
/// Version 32 uses step 26 by decree of the standard; the generic divisor
/// formula would give 28.
pub fn alignment_positions(version: Version) -> Vec<i32> {
    let v = i32::from(version.value());
    if v == 1 {
        return Vec::new();
    }
    let size = version.width();
    let count = v / 7 + 2;
    let step = if v == 32 { 26 } else { (4 * v + 2 * count + 1) / (2 * count - 2) * 2 };
    let mut result: Vec<i32> = (0..count - 1).map(|i| size - 7 - i * step).collect();
    result.push(6);
    result.reverse();
    result
}

fn mask_condition(mask: u8, x: i32, y: i32) -> bool {
    match mask {
        0 => (x + y) % 2 == 0,
        1 => y % 2 == 0,
        2 => x % 3 == 0,
        3 => (x + y) % 3 == 0,
        4 => (x / 3 + y / 2) % 2 == 0,
        5 => x * y % 2 + x * y % 3 == 0,
        6 => (x * y % 2 + x * y % 3) % 2 == 0,
        7 => ((x + y) % 2 + x * y % 3) % 2 == 0,
        _ => unreachable!(),
    }
}

/// Draws the 15-bit format information (both copies and the always-dark
/// module) for the given level and mask into a grid whose format region was
/// reserved by the template. Overwrites any previous format bits, so mask
/// trials can redraw freely.
pub(crate) fn draw_format_bits(grid: &mut [u32], size: i32, ec_level: EcLevel, mask: u8) {
    debug_assert!(mask < 8);
    let bits: u32 = {
        let data = ec_level.format_bits() << 3 | u32::from(mask);
        let mut rem = data;
        for _ in 0..10 {
            rem = (rem << 1) ^ ((rem >> 9) * 0x537);
        }
        (data << 10 | rem) ^ 0x5412
    };
    debug_assert_eq!(bits >> 15, 0);

    // First copy, around the top-left finder.
    for i in 0..6 {
        set_grid_bit(grid, (i * size + 8) as usize, format_bit(bits, i));
    }
    set_grid_bit(grid, (7 * size + 8) as usize, format_bit(bits, 6));
    set_grid_bit(grid, (8 * size + 8) as usize, format_bit(bits, 7));
    set_grid_bit(grid, (8 * size + 7) as usize, format_bit(bits, 8));
    for i in 9..15 {
        set_grid_bit(grid, (8 * size + 14 - i) as usize, format_bit(bits, i));
    }

    // Second copy, split between the top-right and bottom-left finders.
    for i in 0..8 {
        set_grid_bit(grid, (8 * size + size - 1 - i) as usize, format_bit(bits, i));
    }
    for i in 8..15 {
        set_grid_bit(grid, ((size - 15 + i) * size + 8) as usize, format_bit(bits, i));
    }
    set_grid_bit(grid, ((size - 8) * size + 8) as usize, true);
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

/// Run-length history of one row or column, used to spot the 1:1:3:1:1
/// finder-like ratio with a wide light border on either side.
struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: i32) -> Self {
        Self { qr_size: size, run_history: [0; 7] }
    }

    // Pushes the given run length to the front and drops the last value.
    fn add_history(&mut self, mut current_run_length: i32) {
        if self.run_history[0] == 0 {
            current_run_length += self.qr_size; // the quiet zone counts as light
        }
        let rh = &mut self.run_history;
        for i in (0..rh.len() - 1).rev() {
            rh[i + 1] = rh[i];
        }
        rh[0] = current_run_length;
    }

    // Only valid immediately after a light run is added; returns 0, 1 or 2.
    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        debug_assert!(n <= self.qr_size * 3);
        let core = n > 0 && rh[2] == n && rh[3] == n * 3 && rh[4] == n && rh[5] == n;
        i32::from(core && rh[0] >= n * 4 && rh[6] >= n)
            + i32::from(core && rh[6] >= n * 4 && rh[0] >= n)
    }

    // Must be called at the end of a line of modules.
    fn terminate_and_count(mut self, current_run_color: bool, mut current_run_length: i32) -> i32 {
        if current_run_color {
            self.add_history(current_run_length);
            current_run_length = 0;
        }
        current_run_length += self.qr_size;
        self.add_history(current_run_length);
        self.count_patterns()
    }
}

#[inline]
fn module_at(grid: &[u32], size: i32, x: i32, y: i32) -> bool {
    grid_bit(grid, (y * size + x) as usize)
}

/// The standard penalty score of a fully drawn grid (mask applied, format
/// bits in place): N1 runs, N2 blocks, N3 finder-like patterns, N4 balance.
pub(crate) fn penalty_score(grid: &[u32], size: i32) -> i32 {
    let mut result = 0;

    // Adjacent modules in a row with the same color, and finder-like patterns.
    for y in 0..size {
        let mut run_color = false;
        let mut run_x = 0;
        let mut history = FinderPenalty::new(size);
        for x in 0..size {
            if module_at(grid, size, x, y) == run_color {
                run_x += 1;
                if run_x == 5 {
                    result += PENALTY_N1;
                } else if run_x > 5 {
                    result += 1;
                }
            } else {
                history.add_history(run_x);
                if !run_color {
                    result += history.count_patterns() * PENALTY_N3;
                }
                run_color = module_at(grid, size, x, y);
                run_x = 1;
            }
        }
        result += history.terminate_and_count(run_color, run_x) * PENALTY_N3;
    }

    // Same for columns.
    for x in 0..size {
        let mut run_color = false;
        let mut run_y = 0;
        let mut history = FinderPenalty::new(size);
        for y in 0..size {
            if module_at(grid, size, x, y) == run_color {
                run_y += 1;
                if run_y == 5 {
                    result += PENALTY_N1;
                } else if run_y > 5 {
                    result += 1;
                }
            } else {
                history.add_history(run_y);
                if !run_color {
                    result += history.count_patterns() * PENALTY_N3;
                }
                run_color = module_at(grid, size, x, y);
                run_y = 1;
            }
        }
        result += history.terminate_and_count(run_color, run_y) * PENALTY_N3;
    }

    // 2×2 blocks of a single color, overlapping windows.
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let color = module_at(grid, size, x, y);
            if color == module_at(grid, size, x + 1, y)
                && color == module_at(grid, size, x, y + 1)
                && color == module_at(grid, size, x + 1, y + 1)
            {
                result += PENALTY_N2;
            }
        }
    }

    // Balance of dark and light modules, in 5% steps off the 50% ideal.
    let dark: i32 = grid.iter().map(|w| w.count_ones() as i32).sum();
    let total = size * size;
    let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
    debug_assert!((0..=9).contains(&k));
    result += k * PENALTY_N4;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec;
    use crate::types::Version;

    #[test]
    fn test_alignment_positions_known_versions() {
        assert!(alignment_positions(Version::new(1)).is_empty());
        assert_eq!(alignment_positions(Version::new(2)), vec![6, 18]);
        assert_eq!(alignment_positions(Version::new(7)), vec![6, 22, 38]);
        assert_eq!(alignment_positions(Version::new(32)), vec![6, 34, 60, 86, 112, 138]);
        assert_eq!(
            alignment_positions(Version::new(40)),
            vec![6, 30, 58, 86, 114, 142, 170]
        );
    }

    #[test]
    fn test_alignment_positions_shape() {
        for v in 2..=40 {
            let version = Version::new(v);
            let positions = alignment_positions(version);
            assert_eq!(positions.len(), usize::from(v / 7 + 2));
            assert_eq!(positions[0], 6);
            assert_eq!(*positions.last().unwrap(), version.width() - 7);
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_data_output_covers_whole_codewords() {
        for v in 1..=40 {
            let version = Version::new(v);
            let template = template(version);
            let size = template.size();
            let raw = ec::num_raw_data_modules(version);

            let indexes = template.data_output();
            assert_eq!(indexes.len(), raw / 8 * 8);
            assert!(indexes.iter().all(|&i| (i as i32) < size * size));

            let mut seen = vec![false; (size * size) as usize];
            for &i in indexes {
                assert!(!seen[i as usize], "v{}: index {} visited twice", v, i);
                seen[i as usize] = true;
            }

            // Every data module is non-function, and the non-function count
            // is exactly the raw module count.
            let non_function = (0..size * size)
                .filter(|&i| !grid_bit(template.function(), i as usize))
                .count();
            assert_eq!(non_function, raw);
            for &i in indexes {
                assert!(!grid_bit(template.function(), i as usize));
            }
        }
    }

    #[test]
    fn test_template_base_grid() {
        let template = template(Version::new(1));
        let size = template.size();
        let at = |x: i32, y: i32| grid_bit(template.grid(), (y * size + x) as usize);

        // Top-left finder corner and centre are dark, separator is light.
        assert!(at(0, 0));
        assert!(at(3, 3));
        assert!(!at(7, 7));
        // Timing pattern alternates starting dark.
        assert!(at(6, 8));
        assert!(!at(7, 6));
        assert!(at(8, 6));
        // Format region is reserved but light in the base grid.
        assert!(!at(8, 0));
        assert!(grid_bit(template.function(), 8));
    }

    #[test]
    fn test_version_info_blocks_present_from_v7() {
        let v6 = template(Version::new(6));
        let size6 = v6.size();
        assert!(!grid_bit(v6.function(), (size6 - 11) as usize));

        let v7 = template(Version::new(7));
        let size7 = v7.size();
        for i in 0..18 {
            let a = size7 - 11 + i % 3;
            let b = i / 3;
            assert!(grid_bit(v7.function(), (b * size7 + a) as usize));
            assert!(grid_bit(v7.function(), (a * size7 + b) as usize));
        }
    }

    #[test]
    fn test_mask_overlays_only_touch_data_modules() {
        for v in [1u8, 7, 32] {
            let template = template(Version::new(v));
            let size = template.size();
            for m in 0..8 {
                let overlay = template.mask_overlay(m);
                for i in 0..(size * size) as usize {
                    if grid_bit(template.function(), i) {
                        assert!(!grid_bit(overlay, i));
                    }
                }
            }
        }
    }

    #[test]
    fn test_mask_zero_checkerboard() {
        let template = template(Version::new(2));
        let size = template.size();
        let overlay = template.mask_overlay(0);
        for y in 0..size {
            for x in 0..size {
                let index = (y * size + x) as usize;
                if !grid_bit(template.function(), index) {
                    assert_eq!(grid_bit(overlay, index), (x + y) % 2 == 0);
                }
            }
        }
    }

    #[test]
    fn test_template_is_shared() {
        let a = template(Version::new(21));
        let b = template(Version::new(21));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_format_bits_known_codeword() {
        // Published format information for level M with mask 5 is
        // 0b100000011001110 (0x40CE).
        let mut grid = vec![0u32; (21 * 21 + 31) / 32];
        draw_format_bits(&mut grid, 21, crate::types::EcLevel::M, 5);
        let bit = |x: i32, y: i32| grid_bit(&grid, (y * 21 + x) as usize);
        // bits 0..6 run up column 8; bit 0 is the lowest bit of the codeword.
        let mut codeword = 0u32;
        for i in 0..6 {
            codeword |= u32::from(bit(8, i)) << i;
        }
        codeword |= u32::from(bit(8, 7)) << 6;
        codeword |= u32::from(bit(8, 8)) << 7;
        codeword |= u32::from(bit(7, 8)) << 8;
        for i in 9..15 {
            codeword |= u32::from(bit(14 - i, 8)) << i;
        }
        assert_eq!(codeword, 0b100_0000_1100_1110);
        // Always-dark module.
        assert!(bit(8, 21 - 8));
    }

    #[test]
    fn test_penalty_uniform_grid() {
        // An all-light 21×21 grid: N1 = (3 + 16) per line over 42 lines,
        // N2 = 3 per 20×20 window, no finder-like patterns, and N4 at the
        // maximum 9 steps of 10.
        let grid = vec![0u32; (21 * 21 + 31) / 32];
        let n1 = 42 * (3 + 16);
        let n2 = 3 * 20 * 20;
        let n4 = 9 * 10;
        assert_eq!(penalty_score(&grid, 21), n1 + n2 + n4);
    }
}
