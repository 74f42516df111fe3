//! Geometric predicates used for matching fracture elements against matrix elements.
use crate::Real;
use nalgebra::Point3;
use numeric_literals::replace_float_literals;

/// Tolerance used when no tolerance is configured.
pub const DEFAULT_TOLERANCE: f64 = 1e-2;

/// Fuzzy equality of two points with an absolute tolerance, applied independently per coordinate.
///
/// Returns `true` if and only if `|a_i - b_i| <= tol` for every coordinate `i`.
pub fn points_are_equal<T: Real>(a: &Point3<T>, b: &Point3<T>, tol: T) -> bool {
    (0..3).all(|i| (a[i] - b[i]).abs() <= tol)
}

/// Counts the nodes of `nodes` that coincide with at least one node of `candidate_nodes`.
pub fn count_coincident_nodes<T: Real>(nodes: &[Point3<T>], candidate_nodes: &[Point3<T>], tol: T) -> usize {
    nodes
        .iter()
        .filter(|node| {
            candidate_nodes
                .iter()
                .any(|candidate| points_are_equal(node, candidate, tol))
        })
        .count()
}

/// Returns `true` if every node of `nodes` coincides with some node of `candidate_nodes`.
pub fn shares_all_nodes<T: Real>(nodes: &[Point3<T>], candidate_nodes: &[Point3<T>], tol: T) -> bool {
    count_coincident_nodes(nodes, candidate_nodes, tol) == nodes.len()
}

/// Axis-aligned bounding box of a set of points.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox<T: Real> {
    min: Point3<T>,
    max: Point3<T>,
}

impl<T: Real> BoundingBox<T> {
    pub fn new(min: Point3<T>, max: Point3<T>) -> Self {
        Self { min, max }
    }

    /// Returns the smallest box containing all the points, or `None` if there are no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<T>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Self::new(first, first), |bounds, p| Self {
            min: bounds.min.inf(p),
            max: bounds.max.sup(p),
        }))
    }

    pub fn min(&self) -> &Point3<T> {
        &self.min
    }

    pub fn max(&self) -> &Point3<T> {
        &self.max
    }

    /// Grows the box by `margin` in every direction.
    pub fn inflated(&self, margin: T) -> Self {
        Self {
            min: self.min.map(|x| x - margin),
            max: self.max.map(|x| x + margin),
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Conversion to the `f64` corners used by the spatial index.
    ///
    /// The box is grown by one percent of `margin` on top of `margin` itself, so that rounding
    /// during the conversion cannot exclude a candidate that the exact predicate would accept.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub(crate) fn to_f64_corners(&self, margin: T) -> ([f64; 3], [f64; 3]) {
        let inflated = self.inflated(margin * 1.01);
        let convert = |p: &Point3<T>| -> [f64; 3] {
            [0, 1, 2].map(|i| p[i].to_subset().expect("Real types must be representable as f64"))
        };
        (convert(&inflated.min), convert(&inflated.max))
    }
}
