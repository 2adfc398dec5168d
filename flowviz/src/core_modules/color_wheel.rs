// THEORY:
// The `ColorWheel` is the lowest layer of the flow-coloring stack. It is a
// "dumb" lookup table: an ordered ring of RGB triples that walks once around the
// hue circle, red -> yellow -> green -> cyan -> blue -> magenta -> red. The
// colorizer above it turns a motion angle into a fractional position on this
// ring and interpolates between the two nearest entries.
//
// Key architectural principles:
// 1.  **Fixed Layout**: The ring is built from six segments whose lengths are
//     chosen to give roughly perceptually even hue steps (15, 6, 4, 11, 13, 6).
//     Within a segment exactly one channel ramps, using integer division
//     (`255 * i / len`). Changing a length or the rounding changes every
//     rendered pixel, so the standard layout is a versioned constant.
// 2.  **Capacity Invariant**: Entries live in a table of fixed capacity (60).
//     The standard layout only fills 55 of them; the interpolation always uses
//     the filled length. A layout that overflows the table is a programming
//     error: the standard table is checked at compile time, custom layouts are
//     rejected at construction.
// 3.  **Build Once**: The table is pure data. `standard()` builds it lazily the
//     first time it is needed and hands out the same immutable value for the
//     rest of the process. Concurrent first calls are harmless because every
//     build yields identical bytes.

pub mod color_wheel {
    use crate::error::{Error, Result};
    use std::sync::OnceLock;

    pub type Rgb = [u8; 3];

    /// Number of entries the wheel table can hold.
    pub const WHEEL_CAPACITY: usize = 60;

    /// How a single channel evolves across the steps of a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Ramp {
        /// Constant 0.
        Zero,
        /// Constant 255.
        Full,
        /// `255 * i / len`
        Up,
        /// `255 - 255 * i / len`
        Down,
    }

    impl Ramp {
        #[inline]
        fn value(self, step: usize, len: usize) -> u8 {
            match self {
                Ramp::Zero => 0,
                Ramp::Full => 255,
                Ramp::Up => (255 * step / len) as u8,
                Ramp::Down => (255 - 255 * step / len) as u8,
            }
        }
    }

    /// A contiguous run of wheel entries in which one channel ramps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Segment {
        /// Number of entries in this segment.
        pub len: usize,
        /// Ramp for the red, green and blue channels.
        pub channels: [Ramp; 3],
    }

    impl Segment {
        pub const fn new(len: usize, red: Ramp, green: Ramp, blue: Ramp) -> Self {
            Self { len, channels: [red, green, blue] }
        }
    }

    /// Red to yellow.
    pub const RY: Segment = Segment::new(15, Ramp::Full, Ramp::Up, Ramp::Zero);
    /// Yellow to green.
    pub const YG: Segment = Segment::new(6, Ramp::Down, Ramp::Full, Ramp::Zero);
    /// Green to cyan.
    pub const GC: Segment = Segment::new(4, Ramp::Zero, Ramp::Full, Ramp::Up);
    /// Cyan to blue.
    pub const CB: Segment = Segment::new(11, Ramp::Zero, Ramp::Down, Ramp::Full);
    /// Blue to magenta.
    pub const BM: Segment = Segment::new(13, Ramp::Up, Ramp::Zero, Ramp::Full);
    /// Magenta back to red.
    pub const MR: Segment = Segment::new(6, Ramp::Full, Ramp::Zero, Ramp::Down);

    /// The standard segment layout, in visiting order.
    pub const STANDARD_SEGMENTS: [Segment; 6] = [RY, YG, GC, CB, BM, MR];

    const fn total_len(segments: &[Segment]) -> usize {
        let mut total = 0usize;
        let mut i = 0usize;
        while i < segments.len() {
            total += segments[i].len;
            i += 1;
        }
        total
    }

    const _: () = assert!(total_len(&STANDARD_SEGMENTS) <= WHEEL_CAPACITY);

    static STANDARD_WHEEL: OnceLock<ColorWheel> = OnceLock::new();

    /// A ring of RGB colors spanning one full hue rotation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ColorWheel {
        colors: Vec<Rgb>,
    }

    impl ColorWheel {
        /// Builds the standard wheel. Always yields the same table.
        pub fn build() -> Self {
            Self { colors: fill(&STANDARD_SEGMENTS) }
        }

        /// The process-wide standard wheel, built on first use.
        pub fn standard() -> &'static ColorWheel {
            STANDARD_WHEEL.get_or_init(Self::build)
        }

        /// Builds a wheel from a custom segment layout.
        pub fn from_segments(segments: &[Segment]) -> Result<Self> {
            let total = total_len(segments);
            if total > WHEEL_CAPACITY {
                return Err(Error::WheelCapacity { total, capacity: WHEEL_CAPACITY });
            }
            let wheel = Self { colors: fill(segments) };
            if wheel.is_empty() {
                return Err(Error::config("color wheel needs at least one entry"));
            }
            Ok(wheel)
        }

        /// Number of filled entries (55 for the standard wheel).
        pub fn len(&self) -> usize {
            self.colors.len()
        }

        pub fn is_empty(&self) -> bool {
            self.colors.is_empty()
        }

        /// The color at index `k`.
        ///
        /// Panics if `k >= self.len()`.
        #[inline]
        pub fn get(&self, k: usize) -> Rgb {
            self.colors[k]
        }

        pub fn colors(&self) -> &[Rgb] {
            &self.colors
        }
    }

    impl Default for ColorWheel {
        fn default() -> Self {
            Self::build()
        }
    }

    fn fill(segments: &[Segment]) -> Vec<Rgb> {
        let mut colors = Vec::with_capacity(WHEEL_CAPACITY);
        for segment in segments {
            for step in 0..segment.len {
                let [r, g, b] = segment.channels;
                colors.push([
                    r.value(step, segment.len),
                    g.value(step, segment.len),
                    b.value(step, segment.len),
                ]);
            }
        }
        colors
    }
}
