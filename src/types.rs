use core::fmt::{Display, Error, Formatter};
use core::ops::Not;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum QrError {
    /// The data is too long to encode into a QR code within the allowed
    /// version range. Carries `(used bits, capacity bits)` when both were
    /// computable at the point of failure.
    DataTooLong(Option<(usize, usize)>),

    /// The provided version range is invalid.
    InvalidVersion,

    /// A character not belonging to the mode's character set is found.
    InvalidCharacter,

    /// The provided ECI designator is invalid. A valid designator should be
    /// between 0 and 999999.
    InvalidEciDesignator,

    /// An argument is out of its documented range, e.g. a mask index above 7,
    /// a zero render scale, or a data codeword slice of the wrong length.
    InvalidArgument,

    /// Producing an image from the symbol failed: the styled SVG could not
    /// be parsed back, or the PNG could not be encoded or written.
    RenderFailed,
}

impl Display for QrError {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        match *self {
            QrError::DataTooLong(Some((used, capacity))) => {
                write!(fmt, "data too long: {} bits used, {} bits capacity", used, capacity)
            }
            QrError::DataTooLong(None) => fmt.write_str("data too long"),
            QrError::InvalidVersion => fmt.write_str("invalid version"),
            QrError::InvalidCharacter => fmt.write_str("invalid character"),
            QrError::InvalidEciDesignator => fmt.write_str("invalid ECI designator"),
            QrError::InvalidArgument => fmt.write_str("invalid argument"),
            QrError::RenderFailed => fmt.write_str("render failed"),
        }
    }
}

impl ::std::error::Error for QrError {}

/// `QrResult` is a convenient alias for a QR code generation result.
pub type QrResult<T> = Result<T, QrError>;

/// The color of a module.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Color {
    /// The module is light colored.
    Light,
    /// The module is dark colored.
    Dark,
}

impl Color {
    /// Selects a value according to color of the module. Equivalent to
    /// `if self != Color::Light { dark } else { light }`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use qrgrid::types::Color;
    /// assert_eq!(Color::Light.select(1, 0), 0);
    /// assert_eq!(Color::Dark.select("black", "white"), "black");
    /// ```
    pub fn select<T>(self, dark: T, light: T) -> T {
        match self {
            Color::Light => light,
            Color::Dark => dark,
        }
    }
}

impl Not for Color {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Color::Light => Color::Dark,
            Color::Dark => Color::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EcLevel {
    /// Low error correction. Allows up to 7% of wrong blocks.
    L = 0,

    /// Medium error correction (default). Allows up to 15% of wrong blocks.
    M = 1,

    /// "Quartile" error correction. Allows up to 25% of wrong blocks.
    Q = 2,

    /// High error correction. Allows up to 30% of wrong blocks.
    H = 3,
}

impl EcLevel {
    /// The 2-bit level code stored in the format information. Note that this
    /// is *not* the protection ordering: L=1, M=0, Q=3, H=2.
    pub fn format_bits(self) -> u32 {
        match self {
            EcLevel::L => 1,
            EcLevel::M => 0,
            EcLevel::Q => 3,
            EcLevel::H => 2,
        }
    }
}

/// A QR code version between 1 and 40 inclusive. The symbol is a square of
/// `4 * version + 17` modules per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u8);

impl Version {
    /// The smallest version, a 21×21 symbol.
    pub const MIN: Version = Version(1);

    /// The largest version, a 177×177 symbol.
    pub const MAX: Version = Version(40);

    /// Creates a version object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [1, 40].
    pub const fn new(version: u8) -> Self {
        assert!(1 <= version && version <= 40, "version out of range");
        Version(version)
    }

    /// The version number, in the range [1, 40].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Get the number of modules on each side of the QR code, i.e. the width.
    pub fn width(self) -> i32 {
        i32::from(self.0) * 4 + 17
    }

    /// Obtains an entry from a hard-coded per-version table.
    ///
    /// The outer array represents the content for versions 1 to 40; the inner
    /// array the content per error correction level, in the order [L, M, Q, H].
    pub fn fetch<T: Copy>(self, ec_level: EcLevel, table: &[[T; 4]; 40]) -> T {
        table[usize::from(self.0 - 1)][ec_level as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Numeric,
    Alphanumeric,
    Byte,
    Kanji,
    /// Extended Channel Interpretation: a designator assigning a character
    /// set to the following byte segments. Carries no characters itself.
    Eci,
}

impl Mode {
    /// The 4-bit mode indicator preceding each segment in the bit stream.
    pub fn indicator(self) -> u32 {
        match self {
            Mode::Numeric => 0b0001,
            Mode::Alphanumeric => 0b0010,
            Mode::Byte => 0b0100,
            Mode::Kanji => 0b1000,
            Mode::Eci => 0b0111,
        }
    }

    /// Computes the number of bits needed to encode the character count.
    ///
    ///     use qrgrid::types::{Version, Mode};
    ///
    ///     assert_eq!(Mode::Numeric.length_bits_count(Version::new(1)), 10);
    ///
    /// The width depends on which of the three version ranges (1–9, 10–26,
    /// 27–40) the version falls in. ECI segments have no count field.
    pub fn length_bits_count(self, version: Version) -> usize {
        match version.value() {
            1..=9 => match self {
                Mode::Numeric => 10,
                Mode::Alphanumeric => 9,
                Mode::Byte | Mode::Kanji => 8,
                Mode::Eci => 0,
            },
            10..=26 => match self {
                Mode::Numeric => 12,
                Mode::Alphanumeric => 11,
                Mode::Byte => 16,
                Mode::Kanji => 10,
                Mode::Eci => 0,
            },
            _ => match self {
                Mode::Numeric => 14,
                Mode::Alphanumeric => 13,
                Mode::Byte => 16,
                Mode::Kanji => 12,
                Mode::Eci => 0,
            },
        }
    }

    /// Computes the number of payload bits used by data of a given raw length.
    ///
    ///     use qrgrid::types::Mode;
    ///
    ///     assert_eq!(Mode::Numeric.data_bits_count(7), 24);
    ///
    /// Note that in Kanji mode, the `raw_data_len` is the number of kanji,
    /// i.e. half the total size in bytes.
    pub fn data_bits_count(self, raw_data_len: usize) -> usize {
        match self {
            Mode::Numeric => (raw_data_len * 10 + 2) / 3,
            Mode::Alphanumeric => (raw_data_len * 11 + 1) / 2,
            Mode::Byte => raw_data_len * 8,
            Mode::Kanji => raw_data_len * 13,
            Mode::Eci => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_width() {
        assert_eq!(Version::MIN.width(), 21);
        assert_eq!(Version::new(7).width(), 45);
        assert_eq!(Version::MAX.width(), 177);
    }

    #[test]
    fn test_format_bits_are_not_the_ordering() {
        assert!(EcLevel::L < EcLevel::H);
        assert_eq!(EcLevel::L.format_bits(), 1);
        assert_eq!(EcLevel::M.format_bits(), 0);
        assert_eq!(EcLevel::Q.format_bits(), 3);
        assert_eq!(EcLevel::H.format_bits(), 2);
    }

    #[test]
    fn test_length_bits_count_ranges() {
        assert_eq!(Mode::Byte.length_bits_count(Version::new(9)), 8);
        assert_eq!(Mode::Byte.length_bits_count(Version::new(10)), 16);
        assert_eq!(Mode::Kanji.length_bits_count(Version::new(26)), 10);
        assert_eq!(Mode::Kanji.length_bits_count(Version::new(27)), 12);
        assert_eq!(Mode::Eci.length_bits_count(Version::new(40)), 0);
    }

    #[test]
    fn test_data_too_long_message() {
        let err = QrError::DataTooLong(Some((1856, 1552)));
        assert_eq!(err.to_string(), "data too long: 1856 bits used, 1552 bits capacity");
        assert_eq!(QrError::DataTooLong(None).to_string(), "data too long");
    }
}
