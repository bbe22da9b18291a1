/// A closed parametric range `[min, max]`.
///
/// Serves as the accepted `t` range of a ray and as the entry/exit span of
/// volume queries. `min > max` means empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub const EMPTY: Interval = Interval {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    pub const UNIVERSE: Interval = Interval {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };

    #[inline]
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Length of the range; negative when empty.
    #[inline]
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Inclusive at both ends.
    #[inline]
    pub fn contains(&self, x: f32) -> bool {
        (self.min..=self.max).contains(&x)
    }

    /// Smallest range covering both.
    pub fn surrounding(a: &Interval, b: &Interval) -> Interval {
        Interval::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// Grow both ends until the range is at least `width` long.
    pub fn pad_to(&self, width: f32) -> Interval {
        let missing = width - self.size();
        if missing <= 0.0 {
            return *self;
        }
        Interval::new(self.min - 0.5 * missing, self.max + 0.5 * missing)
    }
}
