//! Viewport computation for a single page
//!
//! Maps a page's intrinsic size and rotation, the user's rotation and
//! zoom, and the device pixel ratio to the frame a renderer draws into.
//! Viewports are cheap and are recomputed on every change, never cached.

use std::fmt;

/// Clockwise rotation in degrees, always stored normalized to `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rotation(u16);

impl Rotation {
    pub const ZERO: Self = Self(0);

    /// Normalize any angle (including negative ones) into `[0, 360)`.
    #[must_use]
    pub fn new(degrees: i32) -> Self {
        Self(degrees.rem_euclid(360) as u16)
    }

    #[must_use]
    pub const fn degrees(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn rotated_by(self, degrees: i32) -> Self {
        Self::new(i32::from(self.0) + degrees)
    }

    /// Whole clockwise quarter turns; off-axis angles round down.
    #[must_use]
    pub const fn quarter_turns(self) -> u16 {
        self.0 / 90
    }

    /// True for 90° and 270°, where width and height swap.
    #[must_use]
    pub const fn is_sideways(self) -> bool {
        self.quarter_turns() % 2 == 1
    }

    /// Combine a page's own rotation with the rotation the user asked for.
    #[must_use]
    pub fn effective(intrinsic: Rotation, requested: Rotation) -> Rotation {
        if requested == Self::ZERO {
            intrinsic
        } else {
            intrinsic.rotated_by(i32::from(requested.0))
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Width/height pair in CSS pixels (or PDF points for intrinsic sizes)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// What the viewport calculation needs to know about a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    /// Unrotated size at scale 1.0
    pub size: Size,
    /// Rotation the document itself applies to the page
    pub rotation: Rotation,
}

/// Rendering frame for one page at a given scale and rotation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// Effective rendering scale (user scale times device pixel ratio)
    pub scale: f64,
    /// Effective rotation (intrinsic combined with requested)
    pub rotation: Rotation,
    /// Affine transform `[a, b, c, d, e, f]` from PDF user space
    /// (y up) to viewport space (y down)
    pub transform: [f64; 6],
}

impl Default for Viewport {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Viewport {
    /// Zero-sized frame used while no page is available
    pub const EMPTY: Self = Self {
        width: 0.0,
        height: 0.0,
        scale: 1.0,
        rotation: Rotation::ZERO,
        transform: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    /// A zero viewport means "not ready"
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    fn for_page(page: Size, rotation: Rotation, scale: f64) -> Self {
        // Rotation matrix per quarter turn, including the y-axis flip
        let (a, b, c, d) = match rotation.quarter_turns() {
            1 => (0.0, 1.0, 1.0, 0.0),
            2 => (-1.0, 0.0, 0.0, 1.0),
            3 => (0.0, -1.0, -1.0, 0.0),
            _ => (1.0, 0.0, 0.0, -1.0),
        };

        let center_x = page.width / 2.0;
        let center_y = page.height / 2.0;

        let (offset_x, offset_y, width, height) = if rotation.is_sideways() {
            (
                center_y * scale,
                center_x * scale,
                page.height * scale,
                page.width * scale,
            )
        } else {
            (
                center_x * scale,
                center_y * scale,
                page.width * scale,
                page.height * scale,
            )
        };

        let transform = [
            a * scale,
            b * scale,
            c * scale,
            d * scale,
            offset_x - a * scale * center_x - c * scale * center_y,
            offset_y - b * scale * center_x - d * scale * center_y,
        ];

        Self {
            width,
            height,
            scale,
            rotation,
            transform,
        }
    }
}

/// Viewport for the current page under the user's rotation and zoom.
///
/// Returns [`Viewport::EMPTY`] when no page is loaded.
#[must_use]
pub fn compute(
    page: Option<PageGeometry>,
    requested: Rotation,
    scale: f64,
    device_pixel_ratio: f64,
) -> Viewport {
    let Some(page) = page else {
        return Viewport::EMPTY;
    };

    let rotation = Rotation::effective(page.rotation, requested);
    Viewport::for_page(page.size, rotation, scale * device_pixel_ratio)
}

/// Baseline viewport at scale 1.0 and intrinsic rotation, used by the
/// fit operations independently of the user's zoom and rotation.
#[must_use]
pub fn compute_default(page: Option<PageGeometry>) -> Viewport {
    match page {
        Some(page) => Viewport::for_page(page.size, page.rotation, 1.0),
        None => Viewport::EMPTY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter() -> PageGeometry {
        PageGeometry {
            size: Size::new(600.0, 800.0),
            rotation: Rotation::ZERO,
        }
    }

    #[test]
    fn rotation_normalizes_into_range() {
        assert_eq!(Rotation::new(0).degrees(), 0);
        assert_eq!(Rotation::new(360).degrees(), 0);
        assert_eq!(Rotation::new(450).degrees(), 90);
        assert_eq!(Rotation::new(-90).degrees(), 270);
        assert_eq!(Rotation::new(-720).degrees(), 0);
        assert_eq!(Rotation::new(i32::MIN).degrees(), (i32::MIN).rem_euclid(360) as u16);
    }

    #[test]
    fn effective_rotation_keeps_intrinsic_when_unrotated() {
        let intrinsic = Rotation::new(90);
        assert_eq!(Rotation::effective(intrinsic, Rotation::ZERO), intrinsic);
        assert_eq!(Rotation::effective(intrinsic, Rotation::new(180)), Rotation::new(270));
        assert_eq!(Rotation::effective(intrinsic, Rotation::new(270)), Rotation::ZERO);
    }

    #[test]
    fn missing_page_yields_empty_viewport() {
        let viewport = compute(None, Rotation::new(90), 2.0, 2.0);
        assert!(viewport.is_empty());
        assert_eq!(viewport.width, 0.0);
        assert_eq!(viewport.height, 0.0);
        assert!(compute_default(None).is_empty());
    }

    #[test]
    fn scale_includes_device_pixel_ratio() {
        let viewport = compute(Some(letter()), Rotation::ZERO, 1.5, 2.0);
        assert_eq!(viewport.scale, 3.0);
        assert_eq!(viewport.width, 1800.0);
        assert_eq!(viewport.height, 2400.0);
    }

    #[test]
    fn sideways_rotation_swaps_dimensions() {
        let viewport = compute(Some(letter()), Rotation::new(90), 1.0, 1.0);
        assert_eq!(viewport.rotation, Rotation::new(90));
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.transform, [0.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn upright_transform_flips_y_axis() {
        let viewport = compute(Some(letter()), Rotation::ZERO, 2.0, 1.0);
        assert_eq!(viewport.transform, [2.0, 0.0, 0.0, -2.0, 0.0, 1600.0]);

        let upside_down = compute(Some(letter()), Rotation::new(180), 1.0, 1.0);
        assert_eq!(upside_down.transform, [-1.0, 0.0, 0.0, 1.0, 600.0, 0.0]);

        let counter = compute(Some(letter()), Rotation::new(270), 1.0, 1.0);
        assert_eq!(counter.transform, [0.0, -1.0, -1.0, 0.0, 800.0, 600.0]);
    }

    #[test]
    fn default_viewport_ignores_user_state() {
        let page = PageGeometry {
            rotation: Rotation::new(90),
            ..letter()
        };
        let baseline = compute_default(Some(page));
        assert_eq!(baseline.scale, 1.0);
        assert_eq!(baseline.rotation, Rotation::new(90));
        assert_eq!(baseline.width, 800.0);
        assert_eq!(baseline.height, 600.0);
    }
}
