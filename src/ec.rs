//! The `ec` module computes error correction codewords and interleaves the
//! data and ECC blocks into the final codeword sequence.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use hashbrown::HashMap;

use crate::types::{EcLevel, Version};

/// The product of two field elements in GF(2⁸) modulo the QR primitive
/// polynomial 0x11D.
pub fn multiply(x: u8, y: u8) -> u8 {
    let mut z: u8 = 0;
    for i in (0..8).rev() {
        z = (z << 1) ^ ((z >> 7) * 0x1D);
        z ^= ((y >> i) & 1) * x;
    }
    z
}

/// A Reed–Solomon generator polynomial of a fixed degree, with a 256-row
/// product table so the remainder loop is a lookup and a XOR per cell.
///
/// Immutable after construction; shared across encodings through
/// [`rs_generator`].
pub struct ReedSolomonGenerator {
    degree: usize,
    // table[v * degree + j] = multiply(v, coefficients[j])
    table: Vec<u8>,
}

impl ReedSolomonGenerator {
    /// Builds the generator polynomial `(x - r⁰)(x - r¹)…(x - r^{d-1})` for
    /// `r = 2`, then the per-byte product table.
    ///
    /// # Panics
    ///
    /// Panics unless the degree is in [1, 255].
    fn new(degree: usize) -> Self {
        assert!((1..=255).contains(&degree), "degree out of range");

        // Coefficients from second-highest term down; the leading x^d term
        // is implicit.
        let mut coefficients = vec![0u8; degree - 1];
        coefficients.push(1);
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                coefficients[j] = multiply(coefficients[j], root);
                if j + 1 < degree {
                    coefficients[j] ^= coefficients[j + 1];
                }
            }
            root = multiply(root, 0x02);
        }

        let mut table = Vec::with_capacity(256 * degree);
        for value in 0..=255u8 {
            for &c in &coefficients {
                table.push(multiply(value, c));
            }
        }
        Self { degree, table }
    }

    /// The number of ECC bytes this generator produces.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The polynomial remainder of `data` divided by the generator: the ECC
    /// bytes for one block.
    pub fn remainder(&self, data: &[u8]) -> Vec<u8> {
        let degree = self.degree;
        let mut rem = vec![0u8; degree];
        for &b in data {
            let lead = usize::from(b ^ rem[0]);
            let row = &self.table[lead * degree..(lead + 1) * degree];
            for j in 0..degree - 1 {
                rem[j] = rem[j + 1] ^ row[j];
            }
            rem[degree - 1] = row[degree - 1];
        }
        rem
    }
}

/// Returns the shared generator for the given degree, building it on first
/// use. Construction happens under the cache lock, so each degree is built
/// at most once at a time; the result is a pure function of the degree, so a
/// poisoned lock is safe to recover.
pub fn rs_generator(degree: usize) -> Arc<ReedSolomonGenerator> {
    static CACHE: OnceLock<Mutex<HashMap<usize, Arc<ReedSolomonGenerator>>>> = OnceLock::new();
    let mut cache = CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    cache
        .entry(degree)
        .or_insert_with(|| Arc::new(ReedSolomonGenerator::new(degree)))
        .clone()
}

/// The number of modules available for codeword bits in the given version:
/// the symbol area minus every function pattern.
pub fn num_raw_data_modules(version: Version) -> usize {
    let v = usize::from(version.value());
    let mut result = (16 * v + 128) * v + 64;
    if v >= 2 {
        let num_align = v / 7 + 2;
        result -= (25 * num_align - 10) * num_align - 55;
        if v >= 7 {
            result -= 36;
        }
    }
    debug_assert!((208..=29648).contains(&result));
    result
}

/// The number of 8-bit data codewords that fit in the given version at the
/// given error correction level.
pub fn num_data_codewords(version: Version, ec_level: EcLevel) -> usize {
    num_raw_data_modules(version) / 8
        - version.fetch(ec_level, &EC_BYTES_PER_BLOCK) * version.fetch(ec_level, &EC_BLOCK_COUNT)
}

/// Splits `data` into error correction blocks, computes each block's ECC and
/// interleaves everything into the sequence drawn into the symbol.
///
/// Blocks are interleaved codeword by codeword; short blocks skip the data
/// position that only long blocks have.
///
/// # Panics
///
/// Panics if `data` is not exactly `num_data_codewords(version, ec_level)`
/// bytes; the caller validates the length.
pub fn construct_codewords(data: &[u8], version: Version, ec_level: EcLevel) -> Vec<u8> {
    assert_eq!(data.len(), num_data_codewords(version, ec_level), "wrong data length");

    let num_blocks = version.fetch(ec_level, &EC_BLOCK_COUNT);
    let block_ec_len = version.fetch(ec_level, &EC_BYTES_PER_BLOCK);
    let raw_codewords = num_raw_data_modules(version) / 8;
    let num_short_blocks = num_blocks - raw_codewords % num_blocks;
    let short_block_len = raw_codewords / num_blocks;

    let generator = rs_generator(block_ec_len);
    let mut blocks = Vec::with_capacity(num_blocks);
    let mut k = 0;
    for i in 0..num_blocks {
        let data_len = short_block_len - block_ec_len + usize::from(i >= num_short_blocks);
        let mut block = data[k..k + data_len].to_vec();
        k += data_len;
        let ecc = generator.remainder(&block);
        if i < num_short_blocks {
            // Placeholder so every block is short_block_len + 1 long; the
            // merge below skips it for short blocks.
            block.push(0);
        }
        block.extend_from_slice(&ecc);
        blocks.push(block);
    }

    let mut result = Vec::with_capacity(raw_codewords);
    for i in 0..=short_block_len {
        for (j, block) in blocks.iter().enumerate() {
            if i != short_block_len - block_ec_len || j >= num_short_blocks {
                result.push(block[i]);
            }
        }
    }
    result
}

/// Number of ECC bytes per block, per version (1 to 40), in the error
/// correction level order [L, M, Q, H].
///
/// Copied from ISO/IEC 18004:2006 §6.5.1, Table 9.
static EC_BYTES_PER_BLOCK: [[usize; 4]; 40] = [
    [7, 10, 13, 17],
    [10, 16, 22, 28],
    [15, 26, 18, 22],
    [20, 18, 26, 16],
    [26, 24, 18, 22],
    [18, 16, 24, 28],
    [20, 18, 18, 26],
    [24, 22, 22, 26],
    [30, 22, 20, 24],
    [18, 26, 24, 28],
    [20, 30, 28, 24],
    [24, 22, 26, 28],
    [26, 22, 24, 22],
    [30, 24, 20, 24],
    [22, 24, 30, 24],
    [24, 28, 24, 30],
    [28, 28, 28, 28],
    [30, 26, 28, 28],
    [28, 26, 26, 26],
    [28, 26, 30, 28],
    [28, 26, 28, 30],
    [28, 28, 30, 24],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [26, 28, 30, 30],
    [28, 28, 28, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
    [30, 28, 30, 30],
];

/// Number of error correction blocks, per version (1 to 40), in the error
/// correction level order [L, M, Q, H].
///
/// Copied from ISO/IEC 18004:2006 §6.5.1, Table 9.
static EC_BLOCK_COUNT: [[usize; 4]; 40] = [
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 2, 2],
    [1, 2, 2, 4],
    [1, 2, 4, 4],
    [2, 4, 4, 4],
    [2, 4, 6, 5],
    [2, 4, 6, 6],
    [2, 5, 8, 8],
    [4, 5, 8, 8],
    [4, 5, 8, 11],
    [4, 8, 10, 11],
    [4, 9, 12, 16],
    [4, 9, 16, 16],
    [6, 10, 12, 18],
    [6, 10, 17, 16],
    [6, 11, 16, 19],
    [6, 13, 18, 21],
    [7, 14, 21, 25],
    [8, 16, 20, 25],
    [8, 17, 23, 25],
    [9, 17, 23, 34],
    [9, 18, 25, 30],
    [10, 20, 27, 32],
    [12, 21, 29, 35],
    [12, 23, 34, 37],
    [12, 25, 34, 40],
    [13, 26, 35, 42],
    [14, 28, 38, 45],
    [15, 29, 40, 48],
    [16, 31, 43, 51],
    [17, 33, 45, 54],
    [18, 35, 48, 57],
    [19, 37, 51, 60],
    [19, 38, 53, 63],
    [20, 40, 56, 66],
    [21, 43, 59, 70],
    [22, 45, 62, 74],
    [24, 47, 65, 77],
    [25, 49, 68, 81],
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EcLevel, Version};

    /// Schoolbook carry-less multiply followed by reduction by 0x11D.
    fn naive_multiply(x: u8, y: u8) -> u8 {
        let mut product: u32 = 0;
        for i in 0..8 {
            if y >> i & 1 != 0 {
                product ^= u32::from(x) << i;
            }
        }
        for i in (8..16).rev() {
            if product >> i & 1 != 0 {
                product ^= 0x11D << (i - 8);
            }
        }
        product as u8
    }

    #[test]
    fn test_multiply_matches_naive_and_commutes() {
        for x in 0..=255u8 {
            for y in 0..=255u8 {
                let product = multiply(x, y);
                assert_eq!(product, naive_multiply(x, y), "{} * {}", x, y);
                assert_eq!(product, multiply(y, x));
            }
        }
    }

    /// Deterministic byte stream for remainder tests.
    fn pseudo_random_bytes(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                (seed >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_remainder_of_codeword_is_zero() {
        for &degree in &[1usize, 7, 10, 30, 68, 255] {
            let generator = rs_generator(degree);
            let data = pseudo_random_bytes(64, degree as u32);
            let ecc = generator.remainder(&data);
            assert_eq!(ecc.len(), degree);

            let mut codeword = data;
            codeword.extend_from_slice(&ecc);
            assert!(generator.remainder(&codeword).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_degree_ten_block() {
        // Version 1-M uses 16 data codewords and 10 ECC codewords.
        let generator = rs_generator(10);
        let data = pseudo_random_bytes(16, 1);
        let mut codeword = data.clone();
        codeword.extend_from_slice(&generator.remainder(&data));
        assert_eq!(codeword.len(), 26);
        assert!(generator.remainder(&codeword).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_generator_is_shared() {
        let a = rs_generator(13);
        let b = rs_generator(13);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_num_raw_data_modules_bounds() {
        assert_eq!(num_raw_data_modules(Version::new(1)), 208);
        assert_eq!(num_raw_data_modules(Version::new(40)), 29648);
        for v in 1..=40 {
            let raw = num_raw_data_modules(Version::new(v));
            assert!((208..=29648).contains(&raw));
        }
    }

    #[test]
    fn test_num_data_codewords_published_values() {
        assert_eq!(num_data_codewords(Version::new(1), EcLevel::L), 19);
        assert_eq!(num_data_codewords(Version::new(1), EcLevel::M), 16);
        assert_eq!(num_data_codewords(Version::new(1), EcLevel::Q), 13);
        assert_eq!(num_data_codewords(Version::new(1), EcLevel::H), 9);
        assert_eq!(num_data_codewords(Version::new(7), EcLevel::L), 156);
        assert_eq!(num_data_codewords(Version::new(40), EcLevel::L), 2956);
        assert_eq!(num_data_codewords(Version::new(40), EcLevel::H), 1276);
        for v in 1..=40 {
            for ec_level in [EcLevel::L, EcLevel::M, EcLevel::Q, EcLevel::H] {
                assert!(num_data_codewords(Version::new(v), ec_level) >= 1);
            }
        }
    }

    #[test]
    fn test_single_block_interleave_is_identity() {
        // Version 1 has one block at every level: data then ECC, unshuffled.
        let data = pseudo_random_bytes(19, 7);
        let interleaved = construct_codewords(&data, Version::new(1), EcLevel::L);
        assert_eq!(interleaved.len(), 26);
        assert_eq!(&interleaved[..19], &data[..]);
        let ecc = rs_generator(7).remainder(&data);
        assert_eq!(&interleaved[19..], &ecc[..]);
    }

    #[test]
    fn test_multi_block_interleave_order() {
        // Version 5-H: 134 raw codewords, 4 blocks of 22 ECC bytes each,
        // two short blocks of 11 data bytes then two of 12.
        let data = pseudo_random_bytes(46, 11);
        let interleaved = construct_codewords(&data, Version::new(5), EcLevel::H);
        assert_eq!(interleaved.len(), 134);

        // First pass of the merge emits each block's first data byte.
        assert_eq!(interleaved[0], data[0]);
        assert_eq!(interleaved[1], data[11]);
        assert_eq!(interleaved[2], data[22]);
        assert_eq!(interleaved[3], data[34]);
        // The 12th column exists only in the two long blocks.
        assert_eq!(interleaved[44], data[33]);
        assert_eq!(interleaved[45], data[45]);
    }
}
