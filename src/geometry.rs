//! Page geometry: rotation handling and affine transforms
//!
//! Page user space has its origin at the bottom-left corner of the media
//! box with y growing upwards. Output pixel space has its origin at the
//! top-left corner with y growing downwards.

/// Width and height in PDF points (or pixels, for output sizes)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Axis-aligned rectangle in page user space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle anchored at the origin
    #[must_use]
    pub const fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0.min(self.x1)
            && x < self.x0.max(self.x1)
            && y >= self.y0.min(self.y1)
            && y < self.y0.max(self.y1)
    }
}

/// Page rotation, clockwise
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    None,
    Degrees90,
    Degrees180,
    Degrees270,
}

impl Rotation {
    /// Normalises a `/Rotate` value. Anything that is not a multiple of 90
    /// is treated as no rotation.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Self {
        if degrees % 90 != 0 {
            return Self::None;
        }
        match degrees.rem_euclid(360) {
            90 => Self::Degrees90,
            180 => Self::Degrees180,
            270 => Self::Degrees270,
            _ => Self::None,
        }
    }

    #[must_use]
    pub const fn degrees(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Degrees90 => 90,
            Self::Degrees180 => 180,
            Self::Degrees270 => 270,
        }
    }

    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Degrees90 | Self::Degrees270)
    }
}

/// Affine transform in row-vector form:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    #[must_use]
    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    #[must_use]
    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Applies `self` first, then `next`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Returns `None` for a degenerate (non-invertible) transform.
    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        [
            self.a - other.a,
            self.b - other.b,
            self.c - other.c,
            self.d - other.d,
            self.e - other.e,
            self.f - other.f,
        ]
        .iter()
        .all(|delta| delta.abs() <= epsilon)
    }
}

/// Intrinsic geometry of a page as reported by the native library
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub media_box: Rect,
    pub rotation: Rotation,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(media_box: Rect, rotation: Rotation) -> Self {
        Self {
            media_box,
            rotation,
        }
    }
}

/// Media-box size with width and height swapped for 90/270 rotations.
#[must_use]
pub fn effective_size(page: &PageGeometry) -> Size {
    let size = page.media_box.size();
    if page.rotation.swaps_axes() {
        Size::new(size.height, size.width)
    } else {
        size
    }
}

/// Maps unrotated page user space onto an upright rectangle of the
/// effective size anchored at the origin. No scaling, no flip.
#[must_use]
pub fn rotation_transform(page: &PageGeometry) -> Transform {
    let media = page.media_box;
    let origin = Transform::translate(-media.x0.min(media.x1), -media.y0.min(media.y1));
    let w = media.width();
    let h = media.height();

    let rotate = match page.rotation {
        Rotation::None => Transform::IDENTITY,
        // (u, v) -> (v, w - u)
        Rotation::Degrees90 => Transform::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
        // (u, v) -> (w - u, h - v)
        Rotation::Degrees180 => Transform::new(-1.0, 0.0, 0.0, -1.0, w, h),
        // (u, v) -> (h - v, u)
        Rotation::Degrees270 => Transform::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
    };

    origin.then(&rotate)
}
