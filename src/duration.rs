//! Exact rational note durations and the decomposition engine.
//!
//! A [`Duration`] is the length of a notated element as a fraction of a
//! whole note, held as a reduced rational — a quarter note is 1/4, a
//! triplet eighth is 1/12. All arithmetic is exact; floating point is never
//! used for accumulation. On top of the value a duration carries *display*
//! metadata (dot count and tuplet divisor) that records how the value is
//! conventionally written. Metadata never takes part in equality or
//! ordering: 1/4 + 1/8 and a dotted quarter are the same length.
//!
//! [`Duration::decompose`] turns any positive duration into a sequence of
//! directly notatable pieces with the same exact total, the form the
//! MusicXML writer renders as a tied run.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::BuildError;

/// The most dots a duration can display.
pub const MAX_DOT_COUNT: u32 = 5;

/// Symbol ladder exponents: 1024th = 2^-10 up to maxima = 2^3.
const MIN_EXPONENT: i32 = -10;
const MAX_EXPONENT: i32 = 3;

// ─── Duration ────────────────────────────────────────────────────────

/// An exact rational fraction of a whole note.
///
/// Immutable; all operations return new values. Equality, ordering and
/// hashing consider only the numeric value, never the display metadata.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Duration {
    numerator: u64,
    denominator: u64,
    dot_count: u32,
    tuplet_divisor: u64,
}

impl Duration {
    /// Creates a duration of `numerator`/`denominator` whole notes, reduced
    /// to lowest terms. Both arguments must be at least 1.
    pub fn new(numerator: u64, denominator: u64) -> Result<Duration, BuildError> {
        Duration::with_appearance(numerator, denominator, 0, 1)
    }

    /// As [`Duration::new`], but also records how the value is displayed:
    /// `dot_count` dots (at most [`MAX_DOT_COUNT`]) and division by
    /// `tuplet_divisor` (at least 1). The metadata does not change the
    /// numeric value; to lengthen a duration by a dot use
    /// [`Duration::add_dot`].
    pub fn with_appearance(
        numerator: u64,
        denominator: u64,
        dot_count: u32,
        tuplet_divisor: u64,
    ) -> Result<Duration, BuildError> {
        if numerator == 0 || denominator == 0 {
            return Err(BuildError::InvalidDuration);
        }
        if dot_count > MAX_DOT_COUNT {
            return Err(BuildError::TooManyDots {
                count: dot_count,
                max: MAX_DOT_COUNT,
            });
        }
        if tuplet_divisor == 0 {
            return Err(BuildError::InvalidTupletDivisor);
        }
        Ok(Duration::reduced(numerator, denominator, dot_count, tuplet_divisor))
    }

    /// Internal constructor for values already known to be positive.
    pub(crate) const fn raw(numerator: u64, denominator: u64, dot_count: u32, tuplet_divisor: u64) -> Duration {
        Duration {
            numerator,
            denominator,
            dot_count,
            tuplet_divisor,
        }
    }

    fn reduced(numerator: u64, denominator: u64, dot_count: u32, tuplet_divisor: u64) -> Duration {
        let g = gcd(numerator, denominator);
        Duration {
            numerator: numerator / g,
            denominator: denominator / g,
            dot_count,
            tuplet_divisor,
        }
    }

    /// The numerator of the reduced fraction.
    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    /// The denominator of the reduced fraction.
    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// The number of dots this duration displays with. Purely notational;
    /// two equal values may report different dot counts depending on how
    /// they were constructed.
    pub fn dot_count(&self) -> u32 {
        self.dot_count
    }

    /// The tuplet divisor this duration displays with (1 for none).
    pub fn tuplet_divisor(&self) -> u64 {
        self.tuplet_divisor
    }

    /// The value as a float, for analysis only. Triplets and friends do not
    /// round-trip through floating point; exact arithmetic must use the
    /// rational operations on this type.
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    // ─── Arithmetic ──────────────────────────────────────────────────

    /// The exact sum of this and `other`. Display metadata is not carried
    /// through addition.
    pub fn add(&self, other: &Duration) -> Duration {
        Duration::reduced(
            self.numerator * other.denominator + other.numerator * self.denominator,
            self.denominator * other.denominator,
            0,
            1,
        )
    }

    /// The exact difference of this and `other`. Display metadata is not
    /// carried through subtraction.
    ///
    /// # Panics
    ///
    /// Panics if `other` is not shorter than this; durations are always
    /// positive.
    pub fn subtract(&self, other: &Duration) -> Duration {
        let left = self.numerator * other.denominator;
        let right = other.numerator * self.denominator;
        assert!(
            left > right,
            "cannot subtract {other} from {self}: result would not be positive"
        );
        Duration::reduced(left - right, self.denominator * other.denominator, 0, 1)
    }

    /// This duration multiplied by `multiplier`. Dots are retained, and
    /// factors shared with the tuplet divisor cancel out of it, so a
    /// triplet times three displays as a plain duration again.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is zero.
    pub fn multiply(&self, multiplier: u64) -> Duration {
        assert!(multiplier >= 1, "multiplier must be at least 1");
        let cancelled = gcd(self.tuplet_divisor, multiplier);
        Duration::reduced(
            self.numerator * multiplier,
            self.denominator,
            self.dot_count,
            self.tuplet_divisor / cancelled,
        )
    }

    /// This duration divided by `divisor`. Dots are retained and the odd
    /// part of `divisor` multiplies the tuplet divisor: a quarter divided
    /// by three is a triplet, divided by two it is a plain eighth.
    ///
    /// # Panics
    ///
    /// Panics if `divisor` is zero.
    pub fn divide(&self, divisor: u64) -> Duration {
        assert!(divisor >= 1, "divisor must be at least 1");
        Duration::reduced(
            self.numerator,
            self.denominator * divisor,
            self.dot_count,
            self.tuplet_divisor * odd_part(divisor),
        )
    }

    /// This duration lengthened by one dot and displaying one more dot.
    ///
    /// Adding the (n+1)th dot extends the value by `self / (2^(n+2) - 2)`:
    /// the dots form a geometric series over the undotted base.
    ///
    /// # Panics
    ///
    /// Panics if this duration already has [`MAX_DOT_COUNT`] dots.
    pub fn add_dot(&self) -> Duration {
        assert!(
            self.dot_count < MAX_DOT_COUNT,
            "cannot add a dot to a duration with {} dots",
            self.dot_count
        );
        let divisor = (1u64 << (self.dot_count + 2)) - 2;
        let extended = self.add(&Duration::reduced(
            self.numerator,
            self.denominator * divisor,
            0,
            1,
        ));
        Duration {
            numerator: extended.numerator,
            denominator: extended.denominator,
            dot_count: self.dot_count + 1,
            tuplet_divisor: self.tuplet_divisor,
        }
    }

    /// This duration shortened by one dot. Returns the value unchanged if
    /// there are no dots to remove.
    pub fn remove_dot(&self) -> Duration {
        if self.dot_count == 0 {
            return *self;
        }
        let d = self.dot_count;
        // value with d dots = base * (2^(d+1) - 1) / 2^d
        let with_fewer = Duration::reduced(
            self.numerator * 2 * ((1u64 << d) - 1),
            self.denominator * ((1u64 << (d + 1)) - 1),
            0,
            1,
        );
        Duration {
            numerator: with_fewer.numerator,
            denominator: with_fewer.denominator,
            dot_count: d - 1,
            tuplet_divisor: self.tuplet_divisor,
        }
    }

    /// The undotted base of this duration: the value divided by the
    /// lengthening of all displayed dots.
    pub fn remove_dots(&self) -> Duration {
        if self.dot_count == 0 {
            return *self;
        }
        let d = self.dot_count;
        let base = Duration::reduced(
            self.numerator << d,
            self.denominator * ((1u64 << (d + 1)) - 1),
            0,
            1,
        );
        Duration {
            numerator: base.numerator,
            denominator: base.denominator,
            dot_count: 0,
            tuplet_divisor: self.tuplet_divisor,
        }
    }

    /// True if this is longer than `other`.
    pub fn is_longer_than(&self, other: &Duration) -> bool {
        self > other
    }

    /// True if this is shorter than `other`.
    pub fn is_shorter_than(&self, other: &Duration) -> bool {
        self < other
    }

    /// The exact sum of the given durations. Fails on empty input.
    pub fn sum<I>(durations: I) -> Result<Duration, BuildError>
    where
        I: IntoIterator<Item = Duration>,
    {
        let mut iter = durations.into_iter();
        let first = iter.next().ok_or(BuildError::EmptySum)?;
        Ok(iter.fold(first, |total, d| total.add(&d)))
    }

    // ─── Expressibility ──────────────────────────────────────────────

    /// True if this duration, *as displayed* (its dot count and tuplet
    /// divisor), is directly notatable: undoing the dots and the tuplet
    /// division must leave a plain power-of-two value on the symbol ladder.
    ///
    /// Note that this consults the stored metadata. `3/8` built by adding a
    /// dot to a quarter has an expression; the same value built as
    /// `Duration::new(3, 8)` does not, although [`Duration::decompose`]
    /// will find the dotted form for it.
    pub fn has_expression(&self) -> bool {
        self.appearance().is_some()
    }

    /// Classifies this duration into its notatable token — base symbol, dot
    /// count and optional tuplet ratio — according to its stored display
    /// metadata. Returns `None` when the metadata does not describe a
    /// symbol on the ladder.
    pub fn appearance(&self) -> Option<DurationAppearance> {
        let d = self.dot_count;
        // Undo dots: value * 2^d / (2^(d+1) - 1), then undo the tuplet
        // division to recover the written base length.
        let base_num = self
            .numerator
            .checked_mul(1u64 << d)?
            .checked_mul(self.tuplet_divisor)?;
        let base_den = self.denominator * ((1u64 << (d + 1)) - 1);

        let tuplet_ratio = TupletRatio::for_divisor(self.tuplet_divisor);
        let (base_num, base_den) = match &tuplet_ratio {
            // The written symbol is scaled by normal/actual: a triplet
            // eighth (1/12) is written as an eighth, three in the time of
            // two.
            Some(ratio) => (base_num, base_den * u64::from(ratio.normal)),
            None => (base_num, base_den),
        };

        let g = gcd(base_num, base_den);
        let exponent = pow2_exponent(base_num / g, base_den / g)?;
        let symbol = DurationSymbol::from_exponent(exponent)?;

        Some(DurationAppearance {
            symbol,
            dot_count: d,
            tuplet_ratio,
        })
    }

    /// Splits this duration into a sequence of expressible durations whose
    /// exact sum equals this value. A duration that already has an
    /// expression decomposes into itself alone; otherwise the result is the
    /// tied run the value must be written as.
    ///
    /// Greedy: each step takes the largest notatable piece that fits in the
    /// remainder, preferring fewer dots and plain pieces over tuplet pieces
    /// when lengths tie. Terminates for every positive value.
    ///
    /// A remainder finer than the 1024th-note floor of the symbol ladder
    /// cannot be written with any symbol and is emitted unchanged as the
    /// final piece. Such a piece has no [`appearance`](Duration::appearance),
    /// so callers must check [`has_expression`](Duration::has_expression)
    /// before rendering each piece.
    pub fn decompose(&self) -> Vec<Duration> {
        if self.has_expression() {
            return vec![*self];
        }

        let mut pieces = Vec::new();
        let mut remaining = Duration::reduced(self.numerator, self.denominator, 0, 1);

        loop {
            match largest_expressible_within(&remaining) {
                Some(piece) if piece == remaining => {
                    pieces.push(piece);
                    break;
                }
                Some(piece) => {
                    remaining = remaining.subtract(&piece);
                    pieces.push(piece);
                }
                None => {
                    // Below the ladder floor; keep the sum invariant.
                    pieces.push(remaining);
                    break;
                }
            }
        }

        pieces
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Duration) -> bool {
        self.numerator == other.numerator && self.denominator == other.denominator
    }
}

impl Eq for Duration {}

impl Hash for Duration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numerator.hash(state);
        self.denominator.hash(state);
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Duration) -> Ordering {
        let left = u128::from(self.numerator) * u128::from(other.denominator);
        let right = u128::from(other.numerator) * u128::from(self.denominator);
        left.cmp(&right)
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Duration) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{})", self.numerator, self.denominator)?;
        for _ in 0..self.dot_count {
            write!(f, ".")?;
        }
        Ok(())
    }
}

// ─── Common durations ────────────────────────────────────────────────

/// Constants for the common note lengths.
pub mod durations {
    use super::Duration;

    pub const MAXIMA: Duration = Duration::raw(8, 1, 0, 1);
    pub const LONG: Duration = Duration::raw(4, 1, 0, 1);
    pub const BREVE: Duration = Duration::raw(2, 1, 0, 1);
    pub const WHOLE: Duration = Duration::raw(1, 1, 0, 1);
    pub const HALF: Duration = Duration::raw(1, 2, 0, 1);
    pub const QUARTER: Duration = Duration::raw(1, 4, 0, 1);
    pub const EIGHTH: Duration = Duration::raw(1, 8, 0, 1);
    pub const SIXTEENTH: Duration = Duration::raw(1, 16, 0, 1);
    pub const THIRTY_SECOND: Duration = Duration::raw(1, 32, 0, 1);
    pub const SIXTY_FOURTH: Duration = Duration::raw(1, 64, 0, 1);

    pub const HALF_TRIPLET: Duration = Duration::raw(1, 3, 0, 3);
    pub const QUARTER_TRIPLET: Duration = Duration::raw(1, 6, 0, 3);
    pub const EIGHTH_TRIPLET: Duration = Duration::raw(1, 12, 0, 3);
    pub const SIXTEENTH_TRIPLET: Duration = Duration::raw(1, 24, 0, 3);
}

// ─── Notatable tokens ────────────────────────────────────────────────

/// The fixed ladder of written note symbols, 1024th up to maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DurationSymbol {
    N1024th,
    N512th,
    N256th,
    N128th,
    N64th,
    N32nd,
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    Whole,
    Breve,
    Long,
    Maxima,
}

impl DurationSymbol {
    /// The symbol whose plain value is 2^`exponent` whole notes.
    pub fn from_exponent(exponent: i32) -> Option<DurationSymbol> {
        use DurationSymbol::*;
        match exponent {
            -10 => Some(N1024th),
            -9 => Some(N512th),
            -8 => Some(N256th),
            -7 => Some(N128th),
            -6 => Some(N64th),
            -5 => Some(N32nd),
            -4 => Some(Sixteenth),
            -3 => Some(Eighth),
            -2 => Some(Quarter),
            -1 => Some(Half),
            0 => Some(Whole),
            1 => Some(Breve),
            2 => Some(Long),
            3 => Some(Maxima),
            _ => None,
        }
    }

    /// The power of two this symbol stands for.
    pub fn exponent(&self) -> i32 {
        use DurationSymbol::*;
        match self {
            N1024th => -10,
            N512th => -9,
            N256th => -8,
            N128th => -7,
            N64th => -6,
            N32nd => -5,
            Sixteenth => -4,
            Eighth => -3,
            Quarter => -2,
            Half => -1,
            Whole => 0,
            Breve => 1,
            Long => 2,
            Maxima => 3,
        }
    }

    /// The plain duration this symbol stands for, without dots or tuplet.
    pub fn duration(&self) -> Duration {
        let exponent = self.exponent();
        if exponent >= 0 {
            Duration::raw(1u64 << exponent, 1, 0, 1)
        } else {
            Duration::raw(1, 1u64 << (-exponent), 0, 1)
        }
    }

    /// The MusicXML note type name for this symbol.
    pub fn name(&self) -> &'static str {
        use DurationSymbol::*;
        match self {
            N1024th => "1024th",
            N512th => "512th",
            N256th => "256th",
            N128th => "128th",
            N64th => "64th",
            N32nd => "32nd",
            Sixteenth => "16th",
            Eighth => "eighth",
            Quarter => "quarter",
            Half => "half",
            Whole => "whole",
            Breve => "breve",
            Long => "long",
            Maxima => "maxima",
        }
    }

    /// The symbol for a MusicXML note type name.
    pub fn from_name(name: &str) -> Option<DurationSymbol> {
        use DurationSymbol::*;
        match name {
            "1024th" => Some(N1024th),
            "512th" => Some(N512th),
            "256th" => Some(N256th),
            "128th" => Some(N128th),
            "64th" => Some(N64th),
            "32nd" => Some(N32nd),
            "16th" => Some(Sixteenth),
            "eighth" => Some(Eighth),
            "quarter" => Some(Quarter),
            "half" => Some(Half),
            "whole" => Some(Whole),
            "breve" => Some(Breve),
            "long" => Some(Long),
            "maxima" => Some(Maxima),
            _ => None,
        }
    }
}

/// A tuplet ratio as actual notes against normal notes, e.g. 3:2 for a
/// triplet or 5:4 for a quintuplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TupletRatio {
    pub actual: u32,
    pub normal: u32,
}

impl TupletRatio {
    /// The conventional ratio for a tuplet divisor: the normal count is the
    /// greatest power of two below the divisor. Divisor 1 is no tuplet.
    pub fn for_divisor(divisor: u64) -> Option<TupletRatio> {
        if divisor <= 1 {
            return None;
        }
        let mut normal = 1u64;
        while normal * 2 < divisor {
            normal *= 2;
        }
        Some(TupletRatio {
            actual: divisor as u32,
            normal: normal as u32,
        })
    }
}

/// How an expressible duration is written: a base symbol, a run of dots,
/// and an optional tuplet ratio. Produced by [`Duration::appearance`];
/// never stored in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationAppearance {
    pub symbol: DurationSymbol,
    pub dot_count: u32,
    pub tuplet_ratio: Option<TupletRatio>,
}

// ─── Decomposition internals ─────────────────────────────────────────

/// The longest expressible duration not exceeding `remaining`, with its
/// display metadata filled in. Candidates are every ladder symbol with up
/// to MAX_DOT_COUNT dots, plain and divided by the odd factor of the
/// remainder's denominator (dyadic remainders never need tuplet pieces).
/// Length ties prefer fewer dots, then a plain piece over a tuplet piece.
fn largest_expressible_within(remaining: &Duration) -> Option<Duration> {
    let tuplet = odd_part(remaining.denominator());

    let mut best: Option<(Duration, u32, bool)> = None;
    let mut offer = |candidate: Duration, dots: u32, is_tuplet: bool| {
        if candidate > *remaining {
            return;
        }
        let better = match &best {
            None => true,
            Some((current, current_dots, current_tuplet)) => {
                candidate > *current
                    || (candidate == *current
                        && (dots < *current_dots
                            || (dots == *current_dots && *current_tuplet && !is_tuplet)))
            }
        };
        if better {
            best = Some((candidate, dots, is_tuplet));
        }
    };

    for exponent in MIN_EXPONENT..=MAX_EXPONENT {
        for dots in 0..=MAX_DOT_COUNT {
            // Keep piece denominators on the 1024th-note grid so the greedy
            // remainder always reaches exactly zero.
            if (dots as i32) - exponent > -MIN_EXPONENT {
                continue;
            }
            let (num, den) = dotted_value(exponent, dots);
            offer(Duration::raw(num, den, dots, 1), dots, false);

            if tuplet > 1 {
                if let Some(ratio) = TupletRatio::for_divisor(tuplet) {
                    let num = num * u64::from(ratio.normal);
                    let den = den * tuplet;
                    let g = gcd(num, den);
                    offer(Duration::raw(num / g, den / g, dots, tuplet), dots, true);
                }
            }
        }
    }

    best.map(|(piece, _, _)| piece)
}

/// The value of a ladder symbol at 2^`exponent` with `dots` dots, as an
/// unreduced positive fraction.
fn dotted_value(exponent: i32, dots: u32) -> (u64, u64) {
    let odd = (1u64 << (dots + 1)) - 1;
    let shift = exponent - dots as i32;
    if shift >= 0 {
        (odd << shift, 1)
    } else {
        (odd, 1u64 << (-shift))
    }
}

/// The exponent e for which n/d == 2^e, if there is one.
fn pow2_exponent(n: u64, d: u64) -> Option<i32> {
    if n == 1 && d.is_power_of_two() {
        Some(-(d.trailing_zeros() as i32))
    } else if d == 1 && n.is_power_of_two() {
        Some(n.trailing_zeros() as i32)
    } else {
        None
    }
}

fn odd_part(mut n: u64) -> u64 {
    while n % 2 == 0 {
        n /= 2;
    }
    n
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
