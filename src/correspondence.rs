//! Correspondence between fracture elements and the matrix elements they coincide with.
//!
//! The correspondence map is built once from the mesh geometry, persisted as a plain text file
//! with one line per fracture element,
//!
//! ```text
//! <fracture_id> <matrix_id_1> <matrix_id_2> ... <matrix_id_k>
//! ```
//!
//! and read back by every worker at the beginning of every step.
use crate::error::{CorrespondenceError, MapFileError};
use crate::geometry::{shares_all_nodes, BoundingBox, DEFAULT_TOLERANCE};
use crate::mesh::ElementRole;
use crate::{Communicator, ElementId, ElementMesh, MeshElement, Real};
use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Ordered mapping from fracture element ids to the matrix element ids sharing all their nodes.
///
/// Rows are kept in insertion order, which for a built map is the enumeration order of the
/// fracture elements. If a fracture id occurs in more than one row, lookups resolve to the
/// first row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrespondenceMap {
    rows: Vec<(ElementId, Vec<ElementId>)>,
    positions: FxHashMap<ElementId, usize>,
}

impl CorrespondenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row.
    pub fn push(&mut self, fracture: ElementId, mapped: Vec<ElementId>) {
        let position = self.rows.len();
        if self.positions.contains_key(&fracture) {
            warn!(
                "fracture element {} occurs more than once in the correspondence map, lookups use its first row",
                fracture
            );
        } else {
            self.positions.insert(fracture, position);
        }
        self.rows.push((fracture, mapped));
    }

    /// Matrix elements mapped to the given fracture element.
    pub fn get(&self, fracture: ElementId) -> Option<&[ElementId]> {
        self.positions
            .get(&fracture)
            .map(|&position| self.rows[position].1.as_slice())
    }

    pub fn contains(&self, fracture: ElementId) -> bool {
        self.positions.contains_key(&fracture)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.positions.clear();
    }

    pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = (ElementId, &[ElementId])> {
        self.rows
            .iter()
            .map(|(fracture, mapped)| (*fracture, mapped.as_slice()))
    }

    /// Checks that every fracture element is mapped to at least one matrix element.
    ///
    /// A map produced by [`CorrespondenceBuilder`] always passes. A map read from a file passes
    /// unless the file contains a line with a fracture id and no matrix ids.
    pub fn validate(&self) -> Result<(), CorrespondenceError> {
        match self.rows.iter().find(|(_, mapped)| mapped.is_empty()) {
            Some(&(element, _)) => Err(CorrespondenceError::UnmatchedFractureElement { element }),
            None => Ok(()),
        }
    }

    /// Compares two maps ignoring the row order and the order of the mapped ids.
    pub fn is_equivalent_to(&self, other: &Self) -> bool {
        let as_sets = |map: &Self| -> FxHashMap<ElementId, FxHashSet<ElementId>> {
            map.positions
                .keys()
                .map(|&fracture| (fracture, map.get(fracture).unwrap_or(&[]).iter().copied().collect()))
                .collect()
        };
        as_sets(self) == as_sets(other)
    }

    /// Writes the map in its text format, one line per row.
    pub fn write_to(&self, mut writer: impl Write) -> io::Result<()> {
        for (fracture, mapped) in &self.rows {
            writeln!(writer, "{}", iter::once(fracture).chain(mapped).format(" "))?;
        }
        writer.flush()
    }

    /// Writes the map to the given path, replacing any existing file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), CorrespondenceError> {
        let path = path.as_ref();
        let write = || -> io::Result<()> {
            let file = File::create(path)?;
            self.write_to(BufWriter::new(file))
        };
        write().map_err(|source| CorrespondenceError::MapFileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("wrote {} correspondence map rows to {}", self.len(), path.display());
        Ok(())
    }

    /// Parses the text format.
    ///
    /// Each non-blank line must consist of whitespace separated non-negative integers. The first
    /// integer is the fracture id and the remaining ones (possibly none) the mapped matrix ids.
    pub fn parse(text: &str) -> Result<Self, MapFileError> {
        let mut map = Self::new();
        for (line_index, line) in text.lines().enumerate() {
            map.parse_line(line_index + 1, line)?;
        }
        Ok(map)
    }

    /// Reads the text format from a buffered reader.
    ///
    /// `path` is only used for error reporting.
    pub fn read_from(reader: impl BufRead, path: &Path) -> Result<Self, MapFileError> {
        let mut map = Self::new();
        for (line_index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| MapFileError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
            map.parse_line(line_index + 1, &line)?;
        }
        Ok(map)
    }

    /// Loads a map from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapFileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MapFileError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(BufReader::new(file), path)
    }

    fn parse_line(&mut self, line_number: usize, line: &str) -> Result<(), MapFileError> {
        let mut ids = line.split_whitespace().map(|token| {
            token
                .parse::<ElementId>()
                .map_err(|_| MapFileError::MalformedLine {
                    line_number,
                    line: line.to_string(),
                    token: token.to_string(),
                })
        });

        if let Some(fracture) = ids.next() {
            let fracture = fracture?;
            let mapped = ids.collect::<Result<Vec<_>, _>>()?;
            self.push(fracture, mapped);
        }
        Ok(())
    }
}

/// Strategy used to find the matrix elements coinciding with a fracture element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MatchingStrategy {
    /// Tests every matrix element against every fracture element.
    BruteForce,
    /// Tests only matrix elements whose bounding box comes within the tolerance of the fracture
    /// element's bounding box, found through an R-tree.
    #[default]
    Indexed,
}

/// Builds a [`CorrespondenceMap`] by matching fracture elements against matrix elements.
///
/// A matrix element is mapped to a fracture element if every node of the fracture element
/// coincides with some node of the matrix element, where coincidence is tested with
/// [`points_are_equal`](crate::geometry::points_are_equal) at the builder's tolerance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CorrespondenceBuilder<T> {
    tolerance: T,
    strategy: MatchingStrategy,
}

impl<T: Real> Default for CorrespondenceBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> CorrespondenceBuilder<T> {
    pub fn new() -> Self {
        Self {
            tolerance: T::from_f64(DEFAULT_TOLERANCE).expect("Default tolerance must fit in T"),
            strategy: MatchingStrategy::default(),
        }
    }

    pub fn with_tolerance(self, tolerance: T) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_strategy(self, strategy: MatchingStrategy) -> Self {
        Self { strategy, ..self }
    }

    pub fn tolerance(&self) -> T {
        self.tolerance
    }

    pub fn strategy(&self) -> MatchingStrategy {
        self.strategy
    }

    /// Builds the correspondence map for the locally enumerated elements of `mesh`.
    ///
    /// Resolution of the enumerated elements is checked collectively: if any worker fails to
    /// resolve one of its elements, every worker returns
    /// [`CorrespondenceError::IncompleteElement`].
    pub fn build<M, C>(&self, mesh: &M, comm: &C) -> Result<CorrespondenceMap, CorrespondenceError>
    where
        M: ElementMesh<T>,
        C: Communicator,
    {
        let mut resolved = Vec::with_capacity(mesh.num_local_elements());
        let mut first_unresolved = None;
        for id in mesh.local_element_ids() {
            match mesh.query_element(id) {
                Some(element) => resolved.push(element),
                None => {
                    first_unresolved.get_or_insert(id);
                }
            }
        }
        if !comm.all(first_unresolved.is_none()) {
            return Err(CorrespondenceError::IncompleteElement {
                element: first_unresolved,
            });
        }

        let mesh_dimension = mesh.mesh_dimension();
        let (matrix, fracture): (Vec<_>, Vec<_>) = resolved
            .into_iter()
            .filter(|element| ElementRole::classify(element.dimension, mesh_dimension) != ElementRole::Other)
            .partition(|element| ElementRole::classify(element.dimension, mesh_dimension) == ElementRole::Matrix);

        let mapped_sets = match self.strategy {
            MatchingStrategy::BruteForce => self.match_brute_force(&fracture, &matrix),
            MatchingStrategy::Indexed => self.match_indexed(&fracture, &matrix),
        };

        let mut map = CorrespondenceMap::new();
        for (element, mapped) in fracture.iter().zip(mapped_sets) {
            if mapped.is_empty() {
                return Err(CorrespondenceError::UnmatchedFractureElement { element: element.id });
            }
            map.push(element.id, mapped);
        }

        info!(
            "mapped {} fracture elements onto {} matrix elements (tolerance {}, {:?})",
            fracture.len(),
            matrix.len(),
            self.tolerance,
            self.strategy
        );
        Ok(map)
    }

    /// Builds the correspondence map and writes it to `path`.
    ///
    /// Only the worker of rank zero writes the file. Every worker returns after the file has been
    /// written, and if a cache is given, its entry for `path` is invalidated.
    pub fn build_and_write<M, C>(
        &self,
        mesh: &M,
        comm: &C,
        path: impl AsRef<Path>,
        cache: Option<&MapCache>,
    ) -> Result<CorrespondenceMap, CorrespondenceError>
    where
        M: ElementMesh<T>,
        C: Communicator,
    {
        let path = path.as_ref();
        let map = self.build(mesh, comm)?;

        let write_result = if comm.rank() == 0 {
            map.write_to_file(path)
        } else {
            Ok(())
        };
        let written = comm.all(write_result.is_ok());
        if let Some(cache) = cache {
            cache.invalidate(path);
        }

        match write_result {
            Err(err) => Err(err),
            Ok(()) if !written => Err(CorrespondenceError::MapFileWrite {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "the map file could not be written by rank 0"),
            }),
            Ok(()) => Ok(map),
        }
    }

    fn match_brute_force(&self, fracture: &[MeshElement<T>], matrix: &[MeshElement<T>]) -> Vec<Vec<ElementId>> {
        fracture
            .par_iter()
            .map(|f| {
                matrix
                    .iter()
                    .filter(|m| shares_all_nodes(&f.nodes, &m.nodes, self.tolerance))
                    .map(|m| m.id)
                    .collect()
            })
            .collect()
    }

    fn match_indexed(&self, fracture: &[MeshElement<T>], matrix: &[MeshElement<T>]) -> Vec<Vec<ElementId>> {
        let index = MatrixIndex::new(matrix);
        fracture
            .par_iter()
            .map(|f| {
                index
                    .candidates(f, self.tolerance)
                    .into_iter()
                    .map(|position| &matrix[position])
                    .filter(|m| shares_all_nodes(&f.nodes, &m.nodes, self.tolerance))
                    .inspect(|m| {
                        debug_assert!(
                            bounds_overlap(f, m, self.tolerance + self.tolerance),
                            "matrix element {} matched outside the search box of fracture element {}",
                            m.id,
                            f.id
                        )
                    })
                    .map(|m| m.id)
                    .collect()
            })
            .collect()
    }
}

/// Whether the bounding box of `a`, grown by `margin`, intersects the bounding box of `b`.
///
/// Elements without nodes overlap everything.
fn bounds_overlap<T: Real>(a: &MeshElement<T>, b: &MeshElement<T>, margin: T) -> bool {
    match (BoundingBox::from_points(&a.nodes), BoundingBox::from_points(&b.nodes)) {
        (Some(a), Some(b)) => a.inflated(margin).intersects(&b),
        _ => true,
    }
}

/// R-tree over the bounding boxes of matrix elements.
struct MatrixIndex {
    tree: RTree<GeomWithData<Rectangle<[f64; 3]>, usize>>,
    num_elements: usize,
}

impl MatrixIndex {
    fn new<T: Real>(matrix: &[MeshElement<T>]) -> Self {
        // Elements without nodes only match fracture elements without nodes, which bypass the tree
        let geometries = matrix
            .iter()
            .enumerate()
            .filter_map(|(position, element)| {
                let (min, max) = BoundingBox::from_points(&element.nodes)?.to_f64_corners(T::zero());
                Some(GeomWithData::new(Rectangle::from_corners(min, max), position))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
            num_elements: matrix.len(),
        }
    }

    /// Positions of candidate matrix elements, in ascending order.
    fn candidates<T: Real>(&self, element: &MeshElement<T>, tolerance: T) -> Vec<usize> {
        let bounds = match BoundingBox::from_points(&element.nodes) {
            Some(bounds) => bounds,
            // Every matrix element trivially contains all nodes of an element without nodes
            None => return (0..self.num_elements).collect(),
        };
        let (min, max) = bounds.to_f64_corners(tolerance);
        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_corners(min, max))
            .map(|geometry| geometry.data)
            .collect();
        positions.sort_unstable();
        positions
    }
}

#[derive(Debug)]
struct CachedMap {
    modified: SystemTime,
    len: u64,
    map: Arc<CorrespondenceMap>,
}

/// Per-process cache of parsed correspondence maps.
///
/// Entries are keyed by path and validated against the modification time and length of the
/// file on every lookup. Writers of map files must call [`MapCache::invalidate`], since a
/// rewrite within the timestamp resolution of the file system with an unchanged length can not
/// be detected otherwise.
#[derive(Debug, Default)]
pub struct MapCache {
    entries: Mutex<FxHashMap<PathBuf, CachedMap>>,
}

impl MapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the map stored at `path`, parsing the file only if it is not cached or changed.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<CorrespondenceMap>, MapFileError> {
        let path = path.as_ref();
        let unreadable = |source| MapFileError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let metadata = std::fs::metadata(path).map_err(unreadable)?;
        let modified = metadata.modified().map_err(unreadable)?;
        let len = metadata.len();
        let key = Self::key(path);

        if let Some(entry) = self.entries.lock().get(&key) {
            if entry.modified == modified && entry.len == len {
                return Ok(Arc::clone(&entry.map));
            }
        }

        let map = Arc::new(CorrespondenceMap::load(path)?);
        debug!("cached correspondence map {} ({} rows)", path.display(), map.len());
        self.entries.lock().insert(
            key,
            CachedMap {
                modified,
                len,
                map: Arc::clone(&map),
            },
        );
        Ok(map)
    }

    pub fn invalidate(&self, path: impl AsRef<Path>) {
        self.entries.lock().remove(&Self::key(path.as_ref()));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn key(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Builds the correspondence map of a serial mesh with the given tolerance, using the default
/// matching strategy.
pub fn build_correspondence_map<T, M>(mesh: &M, tolerance: T) -> Result<CorrespondenceMap, CorrespondenceError>
where
    T: Real,
    M: ElementMesh<T>,
{
    CorrespondenceBuilder::new()
        .with_tolerance(tolerance)
        .build(mesh, &crate::comm::SerialCommunicator)
}
