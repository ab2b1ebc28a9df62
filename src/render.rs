//! Render a QR code into SVG strings or a pixmap.

use crate::types::{QrError, QrResult};
use crate::{QrCode, QrShape};

/// Builds the plain SVG document: an XML header, a light background rect and
/// one `<path>` with a unit square per dark module, offset by the border.
/// Lines end with `\n`.
pub(crate) fn to_svg_string(code: &QrCode, border: i32) -> QrResult<String> {
    if border < 0 {
        return Err(QrError::InvalidArgument);
    }
    let dimension = border
        .checked_mul(2)
        .and_then(|b| b.checked_add(code.size()))
        .ok_or(QrError::InvalidArgument)?;

    let mut result = String::new();
    result.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    result.push_str(
        "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n",
    );
    result.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
        dimension
    ));
    result.push_str("<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n");
    result.push_str("<path d=\"");
    let mut first = true;
    for y in 0..code.size() {
        for x in 0..code.size() {
            if code.get_module(x, y) {
                if !first {
                    result.push(' ');
                }
                first = false;
                result.push_str(&format!("M{},{}h1v1h-1z", x + border, y + border));
            }
        }
    }
    result.push_str("\" fill=\"#000000\"/>\n");
    result.push_str("</svg>\n");
    Ok(result)
}

/// Renders the module grid into a pixmap, `scale` pixels per module with a
/// `border`-module quiet zone, using 0xRRGGBB colors.
pub(crate) fn rasterize(
    code: &QrCode,
    scale: u32,
    border: u32,
    dark: u32,
    light: u32,
) -> QrResult<resvg::tiny_skia::Pixmap> {
    if scale == 0 {
        return Err(QrError::InvalidArgument);
    }
    let side = border
        .checked_mul(2)
        .and_then(|b| b.checked_add(code.size() as u32))
        .and_then(|m| m.checked_mul(scale))
        .ok_or(QrError::InvalidArgument)?;
    let mut pixmap =
        resvg::tiny_skia::Pixmap::new(side, side).ok_or(QrError::InvalidArgument)?;

    let dark = rgb24(dark);
    let light = rgb24(light);
    let pixels = pixmap.pixels_mut();
    for py in 0..side {
        let my = (py / scale) as i32 - border as i32;
        for px in 0..side {
            let mx = (px / scale) as i32 - border as i32;
            pixels[py as usize * side as usize + px as usize] =
                if code.get_module(mx, my) { dark } else { light };
        }
    }
    Ok(pixmap)
}

fn rgb24(color: u32) -> resvg::tiny_skia::PremultipliedColorU8 {
    resvg::tiny_skia::ColorU8::from_rgba((color >> 16) as u8, (color >> 8) as u8, color as u8, 255)
        .premultiply()
}

/// Traces the boundaries of the dark regions and emits one closed subpath
/// per contour, squared or rounded.
pub(crate) fn outline_path(code: &QrCode, shape: QrShape) -> String {
    let loops = trace_outlines(code.size(), |x, y| code.get_module(x, y));
    match shape {
        QrShape::Square => square_path(&loops),
        QrShape::Round => round_path(&loops),
    }
}

/// A boundary walk heading on the module lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    East,
    South,
    West,
    North,
}

impl Heading {
    fn step(self, x: i32, y: i32) -> (i32, i32) {
        match self {
            Heading::East => (x + 1, y),
            Heading::South => (x, y + 1),
            Heading::West => (x - 1, y),
            Heading::North => (x, y - 1),
        }
    }

    /// Half a module along this heading, for the rounded-corner geometry.
    fn half_step(self) -> (f64, f64) {
        match self {
            Heading::East => (0.5, 0.0),
            Heading::South => (0.0, 0.5),
            Heading::West => (-0.5, 0.0),
            Heading::North => (0.0, -0.5),
        }
    }
}

/// A lattice point where a boundary walk changes heading.
#[derive(Debug, Clone, Copy)]
struct Corner {
    x: i32,
    y: i32,
    entering: Heading,
    leaving: Heading,
}

/// Walks the boundary of every dark region once.
///
/// A loop is seeded at each dark module with a light module above whose top
/// edge has not been walked yet, heading east. The walk keeps the dark
/// region on its right hand, so outer contours and hole contours come out
/// in opposite orientations and fill correctly under the even-odd rule.
/// Every contour contains at least one east-walked top edge (the top row of
/// a region, or the bottom rim of a hole), so the seed scan finds them all.
/// Returns each loop as its corner sequence, seed corner first.
fn trace_outlines(size: i32, dark: impl Fn(i32, i32) -> bool) -> Vec<Vec<Corner>> {
    let mut walked_top = vec![false; (size * size) as usize];
    let mut loops = Vec::new();
    for y in 0..size {
        for x in 0..size {
            if dark(x, y) && !dark(x, y - 1) && !walked_top[(y * size + x) as usize] {
                loops.push(walk_loop(size, &dark, &mut walked_top, x, y));
            }
        }
    }
    loops
}

fn walk_loop(
    size: i32,
    dark: &impl Fn(i32, i32) -> bool,
    walked_top: &mut [bool],
    start_x: i32,
    start_y: i32,
) -> Vec<Corner> {
    let mut corners = Vec::new();
    let (mut x, mut y) = (start_x, start_y);
    let mut heading = Heading::East;
    loop {
        if heading == Heading::East {
            // An east step runs along the top edge of the dark cell below it.
            walked_top[(y * size + x) as usize] = true;
        }
        (x, y) = heading.step(x, y);
        let next = next_heading(dark, x, y, heading);
        if next != heading {
            corners.push(Corner { x, y, entering: heading, leaving: next });
        }
        heading = next;
        if (x, y) == (start_x, start_y) && heading == Heading::East {
            break;
        }
    }
    // The turn into the seed edge is recorded last; lead with it instead.
    corners.rotate_right(1);
    corners
}

/// Picks the next heading at a lattice point: turn right when the cell
/// ahead-right is light, go straight while the cell ahead-left is light,
/// turn left when both are dark. Turning right first keeps diagonally
/// touching regions on separate contours.
fn next_heading(dark: &impl Fn(i32, i32) -> bool, x: i32, y: i32, heading: Heading) -> Heading {
    let (ahead_right, ahead_left, right, left) = match heading {
        Heading::East => (dark(x, y), dark(x, y - 1), Heading::South, Heading::North),
        Heading::South => (dark(x - 1, y), dark(x, y), Heading::West, Heading::East),
        Heading::West => (dark(x - 1, y - 1), dark(x - 1, y), Heading::North, Heading::South),
        Heading::North => (dark(x, y - 1), dark(x - 1, y - 1), Heading::East, Heading::West),
    };
    if !ahead_right {
        right
    } else if !ahead_left {
        heading
    } else {
        left
    }
}

/// Emits every loop as a rectilinear subpath through its corner points.
fn square_path(loops: &[Vec<Corner>]) -> String {
    let mut s = String::new();
    for corners in loops {
        let start = corners[0];
        s.push_str(&format!("M{} {}", start.x, start.y));
        let mut prev = start;
        for corner in &corners[1..] {
            if corner.x == prev.x {
                s.push_str(&format!("v{}", corner.y - prev.y));
            } else {
                s.push_str(&format!("h{}", corner.x - prev.x));
            }
            prev = *corner;
        }
        s.push('Z');
    }
    s
}

/// Emits every loop with each corner replaced by a quadratic curve: the walk
/// stops half a module short of the corner point, curves through it, and
/// resumes half a module past it.
fn round_path(loops: &[Vec<Corner>]) -> String {
    let mut s = String::new();
    for corners in loops {
        let start = corners[0];
        let (dx, dy) = start.entering.half_step();
        s.push_str(&format!("M{} {}", f64::from(start.x) - dx, f64::from(start.y) - dy));
        for (i, corner) in corners.iter().enumerate() {
            let (ix, iy) = corner.entering.half_step();
            let (ox, oy) = corner.leaving.half_step();
            s.push_str(&format!("q{} {} {} {}", ix, iy, ix + ox, iy + oy));

            // Straight leg to the next corner, shortened by the half module
            // consumed at each end.
            let next = corners[(i + 1) % corners.len()];
            let run_x = next.x - corner.x;
            let run_y = next.y - corner.y;
            if run_x.abs() > 1 {
                s.push_str(&format!("h{}", run_x - run_x.signum()));
            } else if run_y.abs() > 1 {
                s.push_str(&format!("v{}", run_y - run_y.signum()));
            }
        }
        s.push('Z');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EcLevel;

    #[test]
    fn test_svg_string_shape() {
        let code = QrCode::new("svg").unwrap();
        let svg = code.to_svg_string(4).unwrap();
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(svg.ends_with("</svg>\n"));
        assert!(svg.contains("viewBox=\"0 0 29 29\""));
        // The first dark module of the top-left finder, offset by the border.
        assert!(svg.contains("M4,4h1v1h-1z"));
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn test_svg_string_rejects_negative_border() {
        let code = QrCode::new("svg").unwrap();
        assert!(matches!(code.to_svg_string(-1), Err(QrError::InvalidArgument)));
        assert!(matches!(code.to_svg_string(i32::MAX), Err(QrError::InvalidArgument)));
    }

    #[test]
    fn test_rasterize_dimensions_and_colors() {
        let code = QrCode::encode_text("raster", EcLevel::M).unwrap();
        let pixmap = code.to_pixmap_raw(3, 2, 0x000000, 0xFFFFFF).unwrap();
        assert_eq!(pixmap.width(), (21 + 4) * 3);
        assert_eq!(pixmap.height(), (21 + 4) * 3);

        // The border is light; the finder corner at module (0, 0) is dark.
        let at = |x: u32, y: u32| pixmap.pixel(x, y).unwrap();
        assert_eq!(at(0, 0).red(), 255);
        let corner = at(2 * 3, 2 * 3);
        assert_eq!((corner.red(), corner.green(), corner.blue()), (0, 0, 0));
    }

    #[test]
    fn test_rasterize_rejects_bad_dimensions() {
        let code = QrCode::new("raster").unwrap();
        assert!(matches!(
            code.to_pixmap_raw(0, 1, 0, 0xFFFFFF),
            Err(QrError::InvalidArgument)
        ));
        assert!(matches!(
            code.to_pixmap_raw(u32::MAX, 1, 0, 0xFFFFFF),
            Err(QrError::InvalidArgument)
        ));
    }

    fn darkness(cells: &[(i32, i32)]) -> impl Fn(i32, i32) -> bool + '_ {
        move |x, y| cells.contains(&(x, y))
    }

    #[test]
    fn test_square_path_single_module() {
        let loops = trace_outlines(4, darkness(&[(0, 0)]));
        assert_eq!(square_path(&loops), "M0 0h1v1h-1Z");
    }

    #[test]
    fn test_square_path_merges_a_run() {
        let loops = trace_outlines(4, darkness(&[(0, 0), (1, 0)]));
        assert_eq!(square_path(&loops), "M0 0h2v1h-2Z");
    }

    #[test]
    fn test_square_path_ring_has_hole_contour() {
        let ring: Vec<(i32, i32)> = (0..3)
            .flat_map(|y| (0..3).map(move |x| (x, y)))
            .filter(|&(x, y)| !(x == 1 && y == 1))
            .collect();
        let loops = trace_outlines(4, darkness(&ring));
        // The hole is walked in the opposite orientation and punched out by
        // the even-odd fill rule.
        assert_eq!(square_path(&loops), "M0 0h3v3h-3ZM1 2h1v-1h-1Z");
    }

    #[test]
    fn test_separate_regions_trace_separately() {
        let loops = trace_outlines(8, darkness(&[(0, 0), (5, 5)]));
        assert_eq!(loops.len(), 2);
        assert_eq!(square_path(&loops), "M0 0h1v1h-1ZM5 5h1v1h-1Z");
    }

    #[test]
    fn test_diagonal_cells_do_not_merge() {
        let loops = trace_outlines(4, darkness(&[(0, 0), (1, 1)]));
        assert_eq!(loops.len(), 2);
    }

    #[test]
    fn test_round_path_single_module() {
        let loops = trace_outlines(4, darkness(&[(2, 2)]));
        assert_eq!(
            round_path(&loops),
            "M2 2.5q0 -0.5 0.5 -0.5q0.5 0 0.5 0.5q0 0.5 -0.5 0.5q-0.5 0 -0.5 -0.5Z"
        );
    }

    #[test]
    fn test_round_path_shortens_straight_legs() {
        let loops = trace_outlines(4, darkness(&[(0, 0), (1, 0), (2, 0)]));
        // A 3×1 run: each straight side is 3 modules, minus two half-module
        // curve ends.
        assert_eq!(
            round_path(&loops),
            "M0 0.5q0 -0.5 0.5 -0.5h2q0.5 0 0.5 0.5q0 0.5 -0.5 0.5h-2q-0.5 0 -0.5 -0.5Z"
        );
    }

    #[test]
    fn test_outline_path_on_symbol() {
        let code = QrCode::new("outline").unwrap();
        let square = outline_path(&code, QrShape::Square);
        assert!(square.starts_with('M') && square.ends_with('Z'));
        assert_eq!(square.matches('M').count(), square.matches('Z').count());
        let round = outline_path(&code, QrShape::Round);
        assert!(round.contains('q'));
    }
}
