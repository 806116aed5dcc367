//! Viewport mapping for zoomed and tiled rendering
//!
//! The whole effective page is conceptually scaled to a *full* size and the
//! requested output rectangle is cut out of it. Rendering every tile of a
//! large full size this way reproduces the full page exactly.

use crate::error::{BridgeError, BridgeResult};
use crate::geometry::{Size, Transform};

/// Requested output rectangle and full logical size.
///
/// Zero width/height means "effective page size"; zero full width/height
/// means "same as the output size".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub full_width: f64,
    pub full_height: f64,
}

impl Viewport {
    /// Whole page at 1:1
    #[must_use]
    pub fn whole_page() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_origin(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_full_size(mut self, full_width: f64, full_height: f64) -> Self {
        self.full_width = full_width;
        self.full_height = full_height;
        self
    }
}

/// Resolved output geometry for one render
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportMapping {
    pub x: i32,
    pub y: i32,
    pub out_width: u32,
    pub out_height: u32,
    pub full_width: f64,
    pub full_height: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Effective page space to bottom-left-origin output space
    pub transform: Transform,
}

impl ViewportMapping {
    /// Effective page space to top-left-origin pixel space.
    ///
    /// `px = sx*u - x`, `py = full_height - y - sy*v`
    #[must_use]
    pub fn device_transform(&self) -> Transform {
        let flip = Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, f64::from(self.out_height));
        self.transform.then(&flip)
    }
}

/// Resolves `viewport` against a page of `effective` size.
///
/// Fails for pages with a zero dimension, where no scale can be derived.
pub fn map(effective: Size, viewport: &Viewport) -> BridgeResult<ViewportMapping> {
    if effective.is_empty() || !effective.width.is_finite() || !effective.height.is_finite() {
        return Err(BridgeError::invalid(format!(
            "Page has no area ({} x {})",
            effective.width, effective.height
        )));
    }

    let out_width = if viewport.width > 0 {
        viewport.width
    } else {
        effective.width as u32
    };
    let out_height = if viewport.height > 0 {
        viewport.height
    } else {
        effective.height as u32
    };

    let full_width = if viewport.full_width > 0.0 {
        viewport.full_width
    } else {
        f64::from(out_width)
    };
    let full_height = if viewport.full_height > 0.0 {
        viewport.full_height
    } else {
        f64::from(out_height)
    };

    Ok(mapping(
        effective,
        viewport.x,
        viewport.y,
        out_width,
        out_height,
        full_width,
        full_height,
    ))
}

/// Builds the mapping from already resolved sizes.
#[must_use]
pub(crate) fn mapping(
    effective: Size,
    x: i32,
    y: i32,
    out_width: u32,
    out_height: u32,
    full_width: f64,
    full_height: f64,
) -> ViewportMapping {
    let scale_x = full_width / effective.width;
    let scale_y = full_height / effective.height;

    let translate = Transform::translate(
        -f64::from(x),
        f64::from(y) + f64::from(out_height) - full_height,
    );
    let transform = Transform::scale(scale_x, scale_y).then(&translate);

    ViewportMapping {
        x,
        y,
        out_width,
        out_height,
        full_width,
        full_height,
        scale_x,
        scale_y,
        transform,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn empty_viewport_renders_page_at_one_to_one() {
        let m = map(Size::new(612.0, 792.0), &Viewport::whole_page()).unwrap();
        assert_eq!((m.out_width, m.out_height), (612, 792));
        assert_eq!((m.full_width, m.full_height), (612.0, 792.0));
        assert_eq!((m.scale_x, m.scale_y), (1.0, 1.0));
    }

    #[test]
    fn fractional_page_sizes_truncate() {
        let m = map(Size::new(595.3, 841.9), &Viewport::whole_page()).unwrap();
        assert_eq!((m.out_width, m.out_height), (595, 841));
        assert!((m.scale_x - 595.0 / 595.3).abs() < EPS);
    }

    #[test]
    fn full_size_defaults_to_output_size() {
        let m = map(Size::new(100.0, 50.0), &Viewport::default().with_size(200, 100)).unwrap();
        assert_eq!((m.full_width, m.full_height), (200.0, 100.0));
        assert_eq!((m.scale_x, m.scale_y), (2.0, 2.0));
    }

    #[test]
    fn top_left_quadrant_of_double_size_page() {
        let effective = Size::new(100.0, 80.0);
        let viewport = Viewport::default()
            .with_size(100, 80)
            .with_full_size(200.0, 160.0);
        let m = map(effective, &viewport).unwrap();
        let device = m.device_transform();

        // top-left page corner lands at the pixel origin
        let (px, py) = device.apply(0.0, 80.0);
        assert!(px.abs() < EPS && py.abs() < EPS);

        // page centre lands on the bottom-right corner of the tile
        let (px, py) = device.apply(50.0, 40.0);
        assert!((px - 100.0).abs() < EPS && (py - 80.0).abs() < EPS);
    }

    #[test]
    fn device_transform_matches_closed_form() {
        let effective = Size::new(300.0, 400.0);
        let viewport = Viewport::default()
            .with_origin(35, 60)
            .with_size(128, 96)
            .with_full_size(900.0, 1200.0);
        let m = map(effective, &viewport).unwrap();

        let expected = Transform::new(3.0, 0.0, 0.0, -3.0, -35.0, 1200.0 - 60.0);
        assert!(m.device_transform().approx_eq(&expected, EPS));
    }

    #[test]
    fn bottom_left_transform_follows_translate_then_scale_order() {
        let m = map(
            Size::new(100.0, 100.0),
            &Viewport::default()
                .with_origin(10, 20)
                .with_size(50, 50)
                .with_full_size(200.0, 200.0),
        )
        .unwrap();
        // translate (-10, 20 + 50 - 200) applied after scaling by 2
        let (x, y) = m.transform.apply(1.0, 1.0);
        assert!((x - (2.0 - 10.0)).abs() < EPS);
        assert!((y - (2.0 - 130.0)).abs() < EPS);
    }

    #[test]
    fn zero_area_page_is_rejected() {
        let err = map(Size::new(0.0, 792.0), &Viewport::whole_page()).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}
