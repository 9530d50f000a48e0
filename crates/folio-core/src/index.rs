//! Exact-search vector index.
//!
//! [`VectorIndex`] stores fixed-dimension embeddings in a flat row-major
//! buffer alongside a parallel table of [`EmbeddingRecord`]s. Search is a
//! brute-force scan by squared Euclidean distance.
//!
//! # Invariants
//!
//! - `vectors.len() == records.len() * dimension` at all times.
//! - `records[i].vector_id == i`. Deleting a document rebuilds both
//!   sequences and renumbers the survivors from 0.
//! - Mutations hold the write lock across mutate-and-persist, so a reader
//!   sees either the state before a call or the state after it.
//!
//! # Persistence
//!
//! An index opened with [`VectorIndex::open`] saves a full snapshot through
//! its [`IndexPersistence`] after every mutation. When the save fails the
//! in-memory state is rolled back and the call returns
//! [`IndexError::PersistenceFailure`] (or whatever the backend reported).

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embedding::{distance_to_similarity, squared_l2};
use crate::error::{IndexError, IndexResult};
use crate::models::{DocumentId, EmbeddingRecord, IndexStats, SearchCandidate, VectorId, VectorRange};

/// Full contents of an index, as handed to and from persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub dimension: usize,
    /// Row-major, `records.len() * dimension` values.
    pub vectors: Vec<f32>,
    /// Position equals `vector_id`.
    pub records: Vec<EmbeddingRecord>,
}

impl IndexSnapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check that a loaded snapshot is usable as an index of `dimension`.
    pub fn validate(&self, dimension: usize) -> IndexResult<()> {
        if self.dimension != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: self.dimension,
            });
        }
        if self.vectors.len() != self.records.len() * self.dimension {
            return Err(IndexError::CorruptSnapshot(format!(
                "{} vector values for {} records of dimension {}",
                self.vectors.len(),
                self.records.len(),
                self.dimension
            )));
        }
        if let Some((pos, rec)) = self
            .records
            .iter()
            .enumerate()
            .find(|(pos, rec)| rec.vector_id != *pos as VectorId)
        {
            return Err(IndexError::CorruptSnapshot(format!(
                "record at position {} has vector_id {}",
                pos, rec.vector_id
            )));
        }
        Ok(())
    }
}

/// Durable storage for index snapshots.
///
/// `save` must replace the previous snapshot atomically: after a failed
/// save the previously saved snapshot is still the one `load` returns.
pub trait IndexPersistence: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> IndexResult<Option<IndexSnapshot>>;

    fn save(&self, snapshot: &IndexSnapshot) -> IndexResult<()>;
}

/// Exact nearest-neighbour index over fixed-dimension embeddings.
pub struct VectorIndex {
    dimension: usize,
    state: RwLock<IndexSnapshot>,
    persistence: Option<Box<dyn IndexPersistence>>,
}

impl VectorIndex {
    /// Create an empty, memory-only index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(IndexSnapshot::empty(dimension)),
            persistence: None,
        }
    }

    /// Open a persistent index, loading the saved snapshot if there is one.
    ///
    /// When nothing has been saved yet an empty snapshot is written
    /// immediately. A saved snapshot of another dimension is an error.
    pub fn open(dimension: usize, persistence: Box<dyn IndexPersistence>) -> IndexResult<Self> {
        let snapshot = match persistence.load()? {
            Some(snapshot) => {
                snapshot.validate(dimension)?;
                tracing::info!(
                    vectors = snapshot.len(),
                    dimension,
                    "loaded vector index"
                );
                snapshot
            }
            None => {
                let snapshot = IndexSnapshot::empty(dimension);
                persistence.save(&snapshot)?;
                tracing::info!(dimension, "created empty vector index");
                snapshot
            }
        };

        Ok(Self {
            dimension,
            state: RwLock::new(snapshot),
            persistence: Some(persistence),
        })
    }

    /// Drop every vector and record.
    pub fn reset(&self) -> IndexResult<()> {
        let mut state = self.write();
        let next = IndexSnapshot::empty(self.dimension);
        self.persist(&next)?;
        *state = next;
        tracing::info!(dimension = self.dimension, "vector index reset");
        Ok(())
    }

    /// Append `vectors` for `document_id`, one per entry of `chunk_indices`.
    ///
    /// Returns the inclusive range of assigned ids, or `None` for an empty
    /// batch. Nothing is appended when any check fails.
    pub fn add(
        &self,
        vectors: &[Vec<f32>],
        document_id: DocumentId,
        chunk_indices: &[u32],
    ) -> IndexResult<Option<VectorRange>> {
        if vectors.len() != chunk_indices.len() {
            return Err(IndexError::ArityMismatch {
                vectors: vectors.len(),
                chunk_indices: chunk_indices.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(None);
        }

        let mut state = self.write();
        let prev_len = state.records.len();
        let start = prev_len as VectorId;

        state.vectors.reserve(vectors.len() * self.dimension);
        state.records.reserve(vectors.len());
        for (offset, (vector, &chunk_index)) in vectors.iter().zip(chunk_indices).enumerate() {
            state.vectors.extend_from_slice(vector);
            state.records.push(EmbeddingRecord {
                vector_id: start + offset as VectorId,
                document_id,
                chunk_index,
            });
        }

        if let Err(e) = self.persist(&state) {
            state.vectors.truncate(prev_len * self.dimension);
            state.records.truncate(prev_len);
            return Err(e);
        }

        let range = VectorRange {
            start,
            end: start + vectors.len() as VectorId - 1,
        };
        tracing::debug!(
            document_id,
            start = range.start,
            end = range.end,
            total = state.records.len(),
            "added vectors"
        );
        Ok(Some(range))
    }

    /// Return up to `k` nearest vectors, closest first.
    ///
    /// An empty index yields an empty vector regardless of the query.
    /// Equal distances keep ascending `vector_id` order.
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<SearchCandidate>> {
        let state = self.read();
        if state.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, distance)| {
                let record = state.records[pos];
                SearchCandidate {
                    vector_id: record.vector_id,
                    document_id: record.document_id,
                    chunk_index: record.chunk_index,
                    distance,
                    similarity: distance_to_similarity(distance),
                }
            })
            .collect())
    }

    /// Remove every vector of `document_id` and renumber the rest.
    ///
    /// Returns `false` without touching anything when the document has no
    /// vectors.
    pub fn delete_document(&self, document_id: DocumentId) -> IndexResult<bool> {
        let mut state = self.write();
        let removed = state
            .records
            .iter()
            .filter(|r| r.document_id == document_id)
            .count();
        if removed == 0 {
            return Ok(false);
        }

        let mut next = IndexSnapshot::empty(self.dimension);
        next.vectors.reserve(state.vectors.len() - removed * self.dimension);
        next.records.reserve(state.records.len() - removed);
        for (row, record) in state
            .vectors
            .chunks_exact(self.dimension)
            .zip(state.records.iter())
        {
            if record.document_id == document_id {
                continue;
            }
            next.vectors.extend_from_slice(row);
            next.records.push(EmbeddingRecord {
                vector_id: next.records.len() as VectorId,
                ..*record
            });
        }

        self.persist(&next)?;
        *state = next;
        tracing::info!(
            document_id,
            removed,
            remaining = state.records.len(),
            "rebuilt vector index after delete"
        );
        Ok(true)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.read().records.len(),
            dimension: self.dimension,
        }
    }

    /// Copy of the record table, ordered by `vector_id`.
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.read().records.clone()
    }

    /// Reconstruct the stored vector for `vector_id`.
    pub fn vector(&self, vector_id: VectorId) -> Option<Vec<f32>> {
        let state = self.read();
        let pos = usize::try_from(vector_id).ok()?;
        if pos >= state.records.len() {
            return None;
        }
        let start = pos * self.dimension;
        Some(state.vectors[start..start + self.dimension].to_vec())
    }

    pub fn count_for_document(&self, document_id: DocumentId) -> usize {
        self.read()
            .records
            .iter()
            .filter(|r| r.document_id == document_id)
            .count()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    fn persist(&self, snapshot: &IndexSnapshot) -> IndexResult<()> {
        match &self.persistence {
            Some(p) => p.save(snapshot),
            None => Ok(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemoryPersistence {
        saved: Mutex<Option<IndexSnapshot>>,
        fail: AtomicBool,
        saves: AtomicUsize,
    }

    impl IndexPersistence for Arc<MemoryPersistence> {
        fn load(&self) -> IndexResult<Option<IndexSnapshot>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save(&self, snapshot: &IndexSnapshot) -> IndexResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(IndexError::PersistenceFailure("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }
    }

    fn unit(dim: usize, axis: usize, scale: f32) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = scale;
        v
    }

    fn assert_contiguous(index: &VectorIndex) {
        for (pos, r) in index.records().iter().enumerate() {
            assert_eq!(r.vector_id, pos as VectorId);
        }
    }

    #[test]
    fn test_add_returns_contiguous_ranges() {
        let index = VectorIndex::new(3);
        let r1 = index
            .add(&[unit(3, 0, 1.0), unit(3, 1, 1.0)], 1, &[0, 1])
            .unwrap()
            .unwrap();
        let r2 = index.add(&[unit(3, 2, 1.0)], 2, &[0]).unwrap().unwrap();
        assert_eq!(r1, VectorRange { start: 0, end: 1 });
        assert_eq!(r2, VectorRange { start: 2, end: 2 });
        assert_eq!(index.stats().total_vectors, 3);
        assert_contiguous(&index);
    }

    #[test]
    fn test_add_empty_batch_is_noop() {
        let index = VectorIndex::new(3);
        assert_eq!(index.add(&[], 1, &[]).unwrap(), None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_exact_match_is_top_hit() {
        let index = VectorIndex::new(4);
        let vectors: Vec<Vec<f32>> = (0..4).map(|i| unit(4, i, 1.0)).collect();
        index.add(&vectors, 7, &[0, 1, 2, 3]).unwrap();

        let hits = index.search(&unit(4, 2, 1.0), 3).unwrap();
        assert_eq!(hits[0].vector_id, 2);
        assert_eq!(hits[0].chunk_index, 2);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[0].similarity, 1.0);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let index = VectorIndex::new(3);
        index.add(&[unit(3, 0, 1.0)], 1, &[0]).unwrap();
        let err = index
            .add(&[unit(3, 1, 1.0), vec![1.0, 2.0]], 2, &[0, 1])
            .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_arity_mismatch() {
        let index = VectorIndex::new(2);
        let err = index.add(&[vec![0.0, 1.0]], 1, &[0, 1]).unwrap_err();
        assert_eq!(
            err,
            IndexError::ArityMismatch {
                vectors: 1,
                chunk_indices: 2
            }
        );
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_empty_index_returns_nothing() {
        let index = VectorIndex::new(3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert!(index.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_wrong_query_dimension() {
        let index = VectorIndex::new(3);
        index.add(&[unit(3, 0, 1.0)], 1, &[0]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_search_is_bounded_and_ordered() {
        let index = VectorIndex::new(2);
        let vectors: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32, 0.0]).collect();
        index.add(&vectors, 1, &[0, 1, 2, 3, 4, 5]).unwrap();

        let hits = index.search(&[2.2, 0.0], 4).unwrap();
        assert_eq!(hits.len(), 4);
        let ids: Vec<VectorId> = hits.iter().map(|h| h.vector_id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        assert_eq!(index.search(&[0.0, 0.0], 100).unwrap().len(), 6);
    }

    #[test]
    fn test_distance_ties_keep_id_order() {
        let index = VectorIndex::new(2);
        index
            .add(&[vec![1.0, 0.0], vec![-1.0, 0.0], vec![0.0, 1.0]], 1, &[0, 1, 2])
            .unwrap();
        let ids: Vec<VectorId> = index
            .search(&[0.0, 0.0], 3)
            .unwrap()
            .iter()
            .map(|h| h.vector_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_document_rebuilds_and_renumbers() {
        let index = VectorIndex::new(3);
        index.add(&[unit(3, 0, 1.0), unit(3, 0, 2.0)], 1, &[0, 1]).unwrap();
        index.add(&[unit(3, 1, 1.0), unit(3, 1, 2.0), unit(3, 1, 3.0)], 2, &[0, 1, 2]).unwrap();
        index.add(&[unit(3, 2, 1.0)], 3, &[0]).unwrap();

        let before = index.stats().total_vectors;
        assert!(index.delete_document(2).unwrap());
        assert_eq!(index.stats().total_vectors, before - 3);
        assert_contiguous(&index);
        assert_eq!(index.count_for_document(2), 0);

        let hits = index.search(&unit(3, 1, 2.0), 10).unwrap();
        assert!(hits.iter().all(|h| h.document_id != 2));

        // Document 3's vector moved from id 5 to id 2.
        assert_eq!(index.vector(2), Some(unit(3, 2, 1.0)));
        assert_eq!(index.records()[2].document_id, 3);
        assert_eq!(index.vector(3), None);
    }

    #[test]
    fn test_delete_twice_returns_false() {
        let index = VectorIndex::new(2);
        index.add(&[vec![1.0, 1.0]], 1, &[0]).unwrap();
        index.add(&[vec![2.0, 2.0]], 2, &[0]).unwrap();

        assert!(index.delete_document(1).unwrap());
        let records = index.records();
        assert!(!index.delete_document(1).unwrap());
        assert_eq!(index.records(), records);
        assert!(!index.delete_document(99).unwrap());
    }

    #[test]
    fn test_reset_clears_everything() {
        let index = VectorIndex::new(2);
        index.add(&[vec![1.0, 1.0]], 1, &[0]).unwrap();
        index.reset().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.stats(), IndexStats { total_vectors: 0, dimension: 2 });
    }

    #[test]
    fn test_open_creates_then_reloads() {
        let backend = Arc::new(MemoryPersistence::default());

        let index = VectorIndex::open(2, Box::new(backend.clone())).unwrap();
        assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
        index.add(&[vec![0.5, 0.5], vec![1.0, 0.0]], 4, &[0, 1]).unwrap();
        drop(index);

        let reopened = VectorIndex::open(2, Box::new(backend.clone())).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.vector(1), Some(vec![1.0, 0.0]));
        assert_eq!(reopened.records()[0].document_id, 4);
    }

    #[test]
    fn test_open_rejects_other_dimension() {
        let backend = Arc::new(MemoryPersistence::default());
        VectorIndex::open(2, Box::new(backend.clone())).unwrap();
        assert!(matches!(
            VectorIndex::open(3, Box::new(backend.clone())),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_validate_detects_corrupt_snapshot() {
        let mut snap = IndexSnapshot::empty(2);
        snap.records.push(EmbeddingRecord {
            vector_id: 0,
            document_id: 1,
            chunk_index: 0,
        });
        assert!(matches!(snap.validate(2), Err(IndexError::CorruptSnapshot(_))));

        snap.vectors = vec![1.0, 2.0];
        snap.records[0].vector_id = 5;
        assert!(matches!(snap.validate(2), Err(IndexError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_failed_save_rolls_back_add() {
        let backend = Arc::new(MemoryPersistence::default());
        let index = VectorIndex::open(2, Box::new(backend.clone())).unwrap();
        index.add(&[vec![1.0, 0.0]], 1, &[0]).unwrap();

        backend.fail.store(true, Ordering::SeqCst);
        let err = index.add(&[vec![0.0, 1.0]], 2, &[0]).unwrap_err();
        assert!(matches!(err, IndexError::PersistenceFailure(_)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector(0), Some(vec![1.0, 0.0]));
        assert_eq!(backend.saved.lock().unwrap().as_ref().unwrap().len(), 1);

        backend.fail.store(false, Ordering::SeqCst);
        let range = index.add(&[vec![0.0, 1.0]], 2, &[0]).unwrap().unwrap();
        assert_eq!(range.start, 1);
    }

    #[test]
    fn test_failed_save_rolls_back_delete() {
        let backend = Arc::new(MemoryPersistence::default());
        let index = VectorIndex::open(2, Box::new(backend.clone())).unwrap();
        index.add(&[vec![1.0, 0.0]], 1, &[0]).unwrap();
        index.add(&[vec![0.0, 1.0]], 2, &[0]).unwrap();

        backend.fail.store(true, Ordering::SeqCst);
        assert!(index.delete_document(1).is_err());
        assert_eq!(index.len(), 2);
        assert_eq!(index.count_for_document(1), 1);
        assert!(index.reset().is_err());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_add() {
        let index = VectorIndex::new(4);
        let batch: Vec<Vec<f32>> = (0..8).map(|i| unit(4, i % 4, 1.0 + i as f32)).collect();
        let chunk_ids: Vec<u32> = (0..8).collect();

        std::thread::scope(|s| {
            s.spawn(|| {
                for doc in 0..50 {
                    index.add(&batch, doc, &chunk_ids).unwrap();
                }
            });
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let hits = index.search(&unit(4, 0, 1.0), 1_000).unwrap();
                        assert_eq!(hits.len() % 8, 0);
                        assert_eq!(index.stats().total_vectors % 8, 0);
                    }
                });
            }
        });

        assert_eq!(index.len(), 400);
        assert_contiguous(&index);
    }
}
