//! QR code encoder
//!
//! This crate encodes text or binary data into QR Code Model 2 symbols,
//! supporting all 40 versions and all four error correction levels.
//!
//! ```no_run
//! use qrgrid::{QrCode, QrStyle};
//!
//! // Encode some data into modules.
//! let code = QrCode::new("Hello, world!").unwrap();
//!
//! // Define style
//! let style = QrStyle::default();
//!
//! // Render the modules into an image and save it.
//! code.save_png("hello.png", &style).unwrap();
//! ```
//!
//! The encoding result is an immutable grid of dark and light modules,
//! queryable with [`QrCode::get_module`]; everything else (SVG, pixmaps,
//! PNG) is a view over that grid.

use core::cmp::min;

pub mod bits;
pub mod canvas;
pub mod coding;
pub mod ec;
mod render;
pub mod types;

use crate::bits::BitBuffer;
pub use crate::coding::Segment;
pub use crate::types::{Color, EcLevel, QrError, QrResult, Version};

#[derive(Debug, Copy, Clone)]
pub enum QrShape {
    Square,
    Round,
}

#[derive(Debug)]
pub struct QrStyle {
    pub color: String,
    pub background_color: String,
    pub shape: QrShape,
    /// output image width. The image is square, so the height matches.
    pub width: u32,
    /// Size of the quiet zone around the QR code, measured in terms of a single module size.
    pub quiet_zone: f64,
}

impl QrStyle {
    pub fn new(
        color: impl Into<String>,
        background_color: impl Into<String>,
        shape: QrShape,
        width: u32,
        quiet_zone: f64,
    ) -> Self {
        Self {
            color: color.into(),
            background_color: background_color.into(),
            shape,
            width,
            quiet_zone,
        }
    }
}

impl Default for QrStyle {
    fn default() -> Self {
        Self {
            color: String::from("#000000"),
            background_color: String::from("#ffffff"),
            shape: QrShape::Square,
            width: 720,
            quiet_zone: 2.0,
        }
    }
}

/// An encoded QR code symbol: an immutable square grid of modules.
#[derive(Clone, PartialEq, Eq)]
pub struct QrCode {
    modules: Vec<u32>,
    version: Version,
    ec_level: EcLevel,
    mask: u8,
    size: i32,
}

impl QrCode {
    /// Constructs a new QR code which automatically encodes the given text.
    ///
    /// This method uses the "medium" error correction level and
    /// automatically chooses the smallest QR code.
    ///
    ///     use qrgrid::QrCode;
    ///
    ///     let code = QrCode::new("Some data").unwrap();
    ///
    /// # Errors
    ///
    /// Returns error if the QR code cannot be constructed, e.g. when the
    /// data is too long.
    pub fn new(text: &str) -> QrResult<Self> {
        Self::encode_text(text, EcLevel::M)
    }

    /// Encodes a text string with the default segmenter at the given error
    /// correction level, automatically choosing the smallest version.
    ///
    /// The resulting level may be stronger than requested when the boost
    /// fits the chosen version.
    ///
    /// # Errors
    ///
    /// Returns error if the QR code cannot be constructed, e.g. when the
    /// data is too long.
    pub fn encode_text(text: &str, ec_level: EcLevel) -> QrResult<Self> {
        let segments = Segment::make_segments(text);
        Self::encode_segments(&segments, ec_level)
    }

    /// Encodes binary data as a single byte-mode segment at the given error
    /// correction level, automatically choosing the smallest version.
    ///
    /// # Errors
    ///
    /// Returns error if the QR code cannot be constructed, e.g. when the
    /// data is too long.
    pub fn encode_binary(data: &[u8], ec_level: EcLevel) -> QrResult<Self> {
        let segments = [Segment::bytes(data)];
        Self::encode_segments(&segments, ec_level)
    }

    /// Encodes a custom segment sequence at the given error correction
    /// level, over the full version range, with automatic mask selection
    /// and level boosting.
    ///
    /// # Errors
    ///
    /// Returns error if the QR code cannot be constructed, e.g. when the
    /// data is too long.
    pub fn encode_segments(segments: &[Segment], ec_level: EcLevel) -> QrResult<Self> {
        Self::encode_segments_with(segments, ec_level, Version::MIN, Version::MAX, None, true)
    }

    /// Encodes a custom segment sequence with full control over the version
    /// range, the mask and level boosting.
    ///
    /// The smallest version within `[min_version, max_version]` whose
    /// capacity holds the segments is chosen. `mask` forces a specific mask
    /// index; `None` selects the mask with the lowest penalty score. With
    /// `boost_ecl`, the error correction level is raised as far as the
    /// chosen version allows without growing the symbol.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::InvalidVersion)` on an empty version range,
    /// `Err(QrError::InvalidArgument)` on a mask index above 7, and
    /// `Err(QrError::DataTooLong)` when the segments do not fit
    /// `max_version` (carrying the used bits and the capacity when the
    /// segment lengths were representable).
    pub fn encode_segments_with(
        segments: &[Segment],
        ec_level: EcLevel,
        min_version: Version,
        max_version: Version,
        mask: Option<u8>,
        boost_ecl: bool,
    ) -> QrResult<Self> {
        if min_version > max_version {
            return Err(QrError::InvalidVersion);
        }

        // Find the smallest version whose capacity holds the data.
        let mut version = min_version;
        let used_bits = loop {
            let capacity = ec::num_data_codewords(version, ec_level) * 8;
            let used = coding::total_encoded_len(segments, version);
            match used {
                Some(n) if n <= capacity => break n,
                _ if version >= max_version => {
                    return Err(QrError::DataTooLong(used.map(|n| (n, capacity))));
                }
                _ => version = Version::new(version.value() + 1),
            }
        };

        // Raise the level as far as the capacity of this version allows.
        // The walk ascends, so the strongest fitting level wins.
        let mut ec_level = ec_level;
        if boost_ecl {
            for stronger in [EcLevel::M, EcLevel::Q, EcLevel::H] {
                if stronger > ec_level
                    && used_bits <= ec::num_data_codewords(version, stronger) * 8
                {
                    ec_level = stronger;
                }
            }
        }
        let capacity = ec::num_data_codewords(version, ec_level) * 8;

        // Concatenate the segments into the data bit stream.
        let mut bits = BitBuffer::with_capacity(capacity);
        for segment in segments {
            bits.append_bits(segment.mode().indicator(), 4);
            bits.append_bits(
                segment.num_chars() as u32,
                segment.mode().length_bits_count(version),
            );
            bits.append_words(segment.data().words(), segment.data().len());
        }
        debug_assert_eq!(bits.len(), used_bits);

        // Terminator, zero padding to the byte boundary, then filler bytes.
        bits.append_bits(0, min(4, capacity - bits.len()));
        bits.append_bits(0, (8 - bits.len() % 8) % 8);
        for &filler in [0xEC, 0x11].iter().cycle() {
            if bits.len() >= capacity {
                break;
            }
            bits.append_bits(filler, 8);
        }

        Self::with_codewords(version, ec_level, &bits.to_bytes(), mask)
    }

    /// Builds a QR code from ready-made data codewords: segment headers,
    /// payload and padding included, error correction excluded.
    ///
    /// Use this only to manipulate the raw codeword stream directly; the
    /// `encode_*` functions cover everything else.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::InvalidArgument)` if `data_codewords` is not
    /// exactly `ec::num_data_codewords(version, ec_level)` bytes long, or if
    /// the mask index is above 7.
    pub fn with_codewords(
        version: Version,
        ec_level: EcLevel,
        data_codewords: &[u8],
        mask: Option<u8>,
    ) -> QrResult<Self> {
        if data_codewords.len() != ec::num_data_codewords(version, ec_level) {
            return Err(QrError::InvalidArgument);
        }
        if mask.map_or(false, |m| m > 7) {
            return Err(QrError::InvalidArgument);
        }

        let template = canvas::template(version);
        let size = template.size();
        let codewords = ec::construct_codewords(data_codewords, version, ec_level);
        debug_assert_eq!(template.data_output().len(), codewords.len() * 8);

        // Clone the base grid and lay the codeword bits along the zig-zag
        // index table. The base data area is light, so only set bits are
        // written.
        let mut modules = template.grid().to_vec();
        for (i, &index) in template.data_output().iter().enumerate() {
            if codewords[i >> 3] >> (7 - (i & 7)) & 1 != 0 {
                canvas::set_grid_bit(&mut modules, index as usize, true);
            }
        }

        let mask = match mask {
            Some(m) => {
                apply_mask(&mut modules, template.mask_overlay(m));
                canvas::draw_format_bits(&mut modules, size, ec_level, m);
                m
            }
            None => {
                let mut best = 0;
                let mut min_penalty = i32::MAX;
                for m in 0..8 {
                    apply_mask(&mut modules, template.mask_overlay(m));
                    canvas::draw_format_bits(&mut modules, size, ec_level, m);
                    let penalty = canvas::penalty_score(&modules, size);
                    if penalty < min_penalty {
                        best = m;
                        min_penalty = penalty;
                    }
                    // XOR with the same overlay undoes the mask; the stale
                    // format bits are function modules and get redrawn.
                    apply_mask(&mut modules, template.mask_overlay(m));
                }
                apply_mask(&mut modules, template.mask_overlay(best));
                canvas::draw_format_bits(&mut modules, size, ec_level, best);
                best
            }
        };

        Ok(Self { modules, version, ec_level, mask, size })
    }

    /// Gets the version of this QR code.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Gets the error correction level of this QR code.
    pub fn error_correction_level(&self) -> EcLevel {
        self.ec_level
    }

    /// Gets the mask index applied to this QR code, in the range [0, 7].
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Gets the number of modules per side of this QR code.
    ///
    /// The size here does not contain the quiet zone paddings.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Returns whether the module at the given coordinates is dark.
    ///
    /// The top left corner is (0, 0). Out-of-bounds coordinates are light.
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        (0..self.size).contains(&x)
            && (0..self.size).contains(&y)
            && canvas::grid_bit(&self.modules, (y * self.size + x) as usize)
    }

    /// Converts the QR code to a vector of colors, row by row.
    pub fn to_colors(&self) -> Vec<Color> {
        (0..self.size * self.size)
            .map(|i| {
                if canvas::grid_bit(&self.modules, i as usize) {
                    Color::Dark
                } else {
                    Color::Light
                }
            })
            .collect()
    }

    /// Converts the QR code into a human-readable string.
    pub fn to_str(&self, dark: char, light: char) -> String {
        let mut s = String::new();
        for y in 0..self.size {
            for x in 0..self.size {
                s.push(if self.get_module(x, y) { dark } else { light });
            }
            s.push('\n');
        }
        s
    }
}

fn apply_mask(modules: &mut [u32], overlay: &[u32]) {
    for (word, mask_word) in modules.iter_mut().zip(overlay) {
        *word ^= mask_word;
    }
}

impl QrCode {
    /// Return `viewbox_width`, `viewbox_height`, `image_width`, `image_height`
    pub fn image_sizes(&self, style: &QrStyle) -> (f64, f64, u32, u32) {
        let quiet = style.quiet_zone;
        let vb_side = f64::from(self.size) + quiet * 2.0;
        (vb_side, vb_side, style.width, style.width)
    }

    /// Converts the QR code to a plain SVG document: a light background rect
    /// and a single path with one unit square per dark module, offset by
    /// `border` quiet-zone modules.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::InvalidArgument)` if `border` is negative or
    /// the bordered size overflows.
    pub fn to_svg_string(&self, border: i32) -> QrResult<String> {
        render::to_svg_string(self, border)
    }

    /// Converts the QR code to a styled SVG string with the quiet zone and
    /// module shape from `style`, tracing the outline of each dark region.
    pub fn to_svg(&self, style: &QrStyle) -> String {
        let path_string = render::outline_path(self, style.shape);
        let color = &style.color;
        let background_color = &style.background_color;
        let quiet = style.quiet_zone;
        let (vb_width, vb_height, image_width, image_height) = self.image_sizes(style);
        let path = format!(
            r#"<path fill="{color}" transform="translate({quiet},{quiet})" fill-rule="evenodd" d="{path_string}"/>"#,
        );
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{image_width}" height="{image_height}" viewBox="0 0 {vb_width} {vb_height}">
            <rect x="0" y="0" width="{vb_width}" height="{vb_height}" fill="{background_color}"/>
            {path}
            </svg>"#,
        )
    }

    /// Converts the QR code to a styled SVG string without a quiet zone.
    pub fn to_simple_svg(&self) -> String {
        let style = QrStyle {
            quiet_zone: 0.0,
            width: self.size as u32,
            ..Default::default()
        };
        self.to_svg(&style)
    }

    /// Saves the QR code to a SVG file.
    pub fn save_svg<P: AsRef<std::path::Path>>(
        &self,
        path: P,
        style: &QrStyle,
    ) -> std::io::Result<()> {
        let svg_string = self.to_svg(style);
        std::fs::write(path, svg_string)
    }
}

impl QrCode {
    /// Renders the QR code directly into a pixmap: `scale` pixels per module
    /// and a quiet zone of `border` modules, with 0xRRGGBB colors for dark
    /// and light modules.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::InvalidArgument)` if `scale` is zero or the
    /// pixel dimensions overflow.
    pub fn to_pixmap_raw(
        &self,
        scale: u32,
        border: u32,
        dark: u32,
        light: u32,
    ) -> QrResult<resvg::tiny_skia::Pixmap> {
        render::rasterize(self, scale, border, dark, light)
    }

    /// Converts the QR code to a tiny-skia pixmap with the given style.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::InvalidArgument)` if the style's width cannot
    /// back a pixmap, and `Err(QrError::RenderFailed)` if the styled SVG
    /// does not parse back.
    pub fn to_pixmap(&self, style: &QrStyle) -> QrResult<resvg::tiny_skia::Pixmap> {
        let (_, _, width, height) = self.image_sizes(style);
        let svg = self.to_svg(style);
        let usvg_options = resvg::usvg::Options::default();
        let tree = resvg::usvg::TreeParsing::from_str(&svg, &usvg_options)
            .map_err(|_| QrError::RenderFailed)?;
        let mut pixmap =
            resvg::tiny_skia::Pixmap::new(width, height).ok_or(QrError::InvalidArgument)?;
        resvg::Tree::from_usvg(&tree)
            .render(resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());
        Ok(pixmap)
    }

    /// Saves the QR code to a PNG file.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::RenderFailed)` if the pixmap cannot be rendered
    /// or the file cannot be written.
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P, style: &QrStyle) -> QrResult<()> {
        let pixmap = self.to_pixmap(style)?;
        pixmap.save_png(path).map_err(|_| QrError::RenderFailed)
    }

    /// Encodes the QR code into PNG data.
    ///
    /// # Errors
    ///
    /// Returns `Err(QrError::RenderFailed)` if the pixmap cannot be rendered
    /// or encoded.
    pub fn to_png(&self, style: &QrStyle) -> QrResult<Vec<u8>> {
        let pixmap = self.to_pixmap(style)?;
        pixmap.encode_png().map_err(|_| QrError::RenderFailed)
    }
}
