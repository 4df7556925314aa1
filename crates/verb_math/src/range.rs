use std::ops::{Add, Div, Mul, Sub};

use crate::Vec3;

/// Values that can bound a [`Range`]: scalars and component-wise vectors.
pub trait RangeValue:
    Copy
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Mul<f32, Output = Self>
{
    /// Component-wise minimum.
    fn min_of(self, other: Self) -> Self;
    /// Component-wise maximum.
    fn max_of(self, other: Self) -> Self;
    /// True when every component of `self` is strictly less than `other`.
    fn all_less(self, other: Self) -> bool;
    /// Broadcast a scalar into every component.
    fn splat_value(v: f32) -> Self;
}

impl RangeValue for f32 {
    fn min_of(self, other: Self) -> Self {
        self.min(other)
    }

    fn max_of(self, other: Self) -> Self {
        self.max(other)
    }

    fn all_less(self, other: Self) -> bool {
        self < other
    }

    fn splat_value(v: f32) -> Self {
        v
    }
}

impl RangeValue for Vec3 {
    fn min_of(self, other: Self) -> Self {
        self.min(other)
    }

    fn max_of(self, other: Self) -> Self {
        self.max(other)
    }

    fn all_less(self, other: Self) -> bool {
        self.cmplt(other).all()
    }

    fn splat_value(v: f32) -> Self {
        Vec3::splat(v)
    }
}

/// A closed range `[min, max]` over scalars or vectors.
///
/// Construction and padding always maintain `min <= max` component-wise,
/// whatever order the bounds are given in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    min: T,
    max: T,
}

impl<T: RangeValue> Range<T> {
    /// Create a range from two bounds in any order.
    pub fn new(a: T, b: T) -> Self {
        Self {
            min: a.min_of(b),
            max: a.max_of(b),
        }
    }

    #[inline]
    pub fn min(&self) -> T {
        self.min
    }

    #[inline]
    pub fn max(&self) -> T {
        self.max
    }

    /// Grow the range by `v` on both sides.
    ///
    /// A negative pad that would cross the bounds over is re-ordered rather
    /// than producing an inverted range.
    pub fn pad(&mut self, v: T) -> &mut Self {
        let a = self.min - v;
        let b = self.max + v;
        self.min = a.min_of(b);
        self.max = a.max_of(b);
        self
    }

    /// Returns a copy of the range grown by `v` on both sides.
    pub fn padded(&self, v: T) -> Self {
        let mut ret = *self;
        ret.pad(v);
        ret
    }

    /// Returns a copy grown by the scalar `v` in every component.
    pub fn padded_by(&self, v: f32) -> Self {
        self.padded(T::splat_value(v))
    }

    /// True when `x` lies strictly inside the range.
    pub fn inside(&self, x: T) -> bool {
        self.min.all_less(x) && x.all_less(self.max)
    }

    pub fn centre(&self) -> T {
        (self.min + self.max) * 0.5
    }

    pub fn dimensions(&self) -> T {
        self.max - self.min
    }

    /// Linearly maps `x` from `input` into `output`.
    pub fn map(x: T, input: &Range<T>, output: &Range<T>) -> T {
        ((x - input.min) * output.dimensions()) / input.dimensions() + output.min
    }

    /// Range covering both `a` and `b`.
    pub fn surrounding(a: &Range<T>, b: &Range<T>) -> Self {
        Self {
            min: a.min.min_of(b.min),
            max: a.max.max_of(b.max),
        }
    }
}

impl<T: RangeValue> Add<T> for Range<T> {
    type Output = Range<T>;

    fn add(self, v: T) -> Range<T> {
        Range {
            min: self.min + v,
            max: self.max + v,
        }
    }
}

impl<T: RangeValue> Sub<T> for Range<T> {
    type Output = Range<T>;

    fn sub(self, v: T) -> Range<T> {
        Range {
            min: self.min - v,
            max: self.max - v,
        }
    }
}

/// Bounding range of a set of points, `None` when there are no points.
pub fn min_max<I>(points: I) -> Option<Range<Vec3>>
where
    I: IntoIterator<Item = Vec3>,
{
    let mut points = points.into_iter();
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    Some(Range::new(min, max))
}
