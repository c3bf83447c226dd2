//! The foreign allocator.
//!
//! Every [`ForeignValue`] draws its storage through an allocator that keeps
//! a running byte count against an optional budget. The process-wide
//! allocator returned by [`ForeignAllocator::global`] has no budget.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::class::ElementType;
use crate::error::{MxError, MxResult};
use crate::layout::{element_count, normalize_shape};
use crate::storage::{MxArray, Payload, SparseData};
use crate::value::ForeignValue;

static GLOBAL: Lazy<ForeignAllocator> = Lazy::new(ForeignAllocator::new);
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
const HEADER: usize = std::mem::size_of::<MxArray>();

struct AllocatorState {
    limit: Option<usize>,
    in_use: AtomicUsize,
    live: AtomicUsize,
}

/// Cheaply clonable handle to an allocator.
#[derive(Clone)]
pub struct ForeignAllocator {
    state: Arc<AllocatorState>,
}

impl ForeignAllocator {
    /// Unbounded allocator.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Allocator that refuses to hold more than `bytes` at once.
    pub fn with_limit(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(limit: Option<usize>) -> Self {
        ForeignAllocator {
            state: Arc::new(AllocatorState {
                limit,
                in_use: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide allocator used by the `ForeignValue::create*`
    /// shorthands and by the marshaller's default entry points.
    pub fn global() -> &'static ForeignAllocator {
        &GLOBAL
    }

    pub fn limit(&self) -> Option<usize> {
        self.state.limit
    }

    /// Bytes currently held by live host-owned values.
    pub fn bytes_in_use(&self) -> usize {
        self.state.in_use.load(Ordering::Acquire)
    }

    /// Number of host-owned values not yet released, transferred or dropped.
    pub fn live_values(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }

    pub(crate) fn reserve(&self, bytes: usize) -> MxResult<()> {
        let mut current = self.state.in_use.load(Ordering::Acquire);
        loop {
            let next = current.checked_add(bytes);
            let fits = match (next, self.state.limit) {
                (Some(n), Some(limit)) => n <= limit,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !fits {
                return Err(MxError::Allocation {
                    requested: bytes,
                    in_use: current,
                    limit: self.state.limit,
                });
            }
            match self.state.in_use.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn give_back(&self, bytes: usize) {
        let _ = self
            .state
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub(crate) fn value_opened(&self) {
        self.state.live.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn value_closed(&self) {
        let _ = self
            .state
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
    }

    pub(crate) fn next_id() -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Wrap an existing block in a host-owned handle, charging its size.
    pub fn adopt(&self, array: MxArray) -> MxResult<ForeignValue> {
        let bytes = array.byte_size();
        self.reserve(bytes)?;
        Ok(ForeignValue::from_block(self.clone(), array, bytes))
    }

    fn refused(&self, requested: usize) -> MxError {
        MxError::Allocation {
            requested,
            in_use: self.bytes_in_use(),
            limit: self.limit(),
        }
    }

    /// Bytes a block of `shape` will hold at `per_element` bytes each,
    /// header included.
    fn planned(&self, shape: &[usize], per_element: usize) -> MxResult<usize> {
        element_count(&normalize_shape(shape))
            .and_then(|n| n.checked_mul(per_element))
            .and_then(|n| n.checked_add(HEADER))
            .ok_or_else(|| self.refused(usize::MAX))
    }

    /// Charge `planned` bytes before `build` touches any memory, then
    /// settle the charge to the block's actual size.
    fn allocate(
        &self,
        planned: usize,
        build: impl FnOnce() -> MxResult<MxArray>,
    ) -> MxResult<ForeignValue> {
        self.reserve(planned)?;
        let array = match build() {
            Ok(array) => array,
            Err(err) => {
                self.give_back(planned);
                return Err(match err {
                    MxError::Allocation { requested, .. } => self.refused(requested),
                    other => other,
                });
            }
        };
        let bytes = array.byte_size();
        if bytes > planned {
            if let Err(err) = self.reserve(bytes - planned) {
                self.give_back(planned);
                return Err(err);
            }
        } else {
            self.give_back(planned - bytes);
        }
        Ok(ForeignValue::from_block(self.clone(), array, bytes))
    }

    /// Zero-filled array of `ty` with the given shape.
    pub fn create(&self, ty: ElementType, shape: &[usize]) -> MxResult<ForeignValue> {
        let planned = self.planned(shape, ty.size_bytes())?;
        self.allocate(planned, || MxArray::zeros(ty, shape))
    }

    /// Zero-filled complex array of a numeric class.
    pub fn create_complex(&self, ty: ElementType, shape: &[usize]) -> MxResult<ForeignValue> {
        let planned = self.planned(shape, ty.size_bytes().saturating_mul(2))?;
        self.allocate(planned, || MxArray::complex_zeros(ty, shape))
    }

    pub fn create_cell(&self, shape: &[usize]) -> MxResult<ForeignValue> {
        let planned = self.planned(shape, HEADER)?;
        self.allocate(planned, || MxArray::cell(shape))
    }

    /// 1x1 struct with the given fields, all set to `[]`.
    pub fn create_struct(&self, fields: &[&str]) -> MxResult<ForeignValue> {
        self.create_struct_array(&[1, 1], fields)
    }

    pub fn create_struct_array(&self, shape: &[usize], fields: &[&str]) -> MxResult<ForeignValue> {
        let names: usize = fields.iter().map(|f| f.len()).sum();
        let planned = self
            .planned(shape, HEADER.saturating_mul(fields.len()))?
            .saturating_add(names);
        self.allocate(planned, || MxArray::structure(shape, fields))
    }

    pub fn create_string(&self, text: &str) -> MxResult<ForeignValue> {
        let planned = HEADER.saturating_add(text.len().saturating_mul(2));
        self.allocate(planned, || Ok(MxArray::char_row(text)))
    }

    /// All-zero sparse double matrix.
    pub fn create_sparse(&self, nrows: usize, ncols: usize) -> MxResult<ForeignValue> {
        let planned = ncols
            .checked_add(1)
            .and_then(|n| n.checked_mul(std::mem::size_of::<usize>()))
            .and_then(|n| n.checked_add(HEADER))
            .ok_or_else(|| self.refused(usize::MAX))?;
        self.allocate(planned, || {
            MxArray::from_parts(
                vec![nrows, ncols],
                Payload::Sparse(SparseData::empty(nrows, ncols)),
            )
        })
    }
}

impl Default for ForeignAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ForeignAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignAllocator")
            .field("limit", &self.limit())
            .field("in_use", &self.bytes_in_use())
            .field("live", &self.live_values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced() {
        let alloc = ForeignAllocator::with_limit(1024);
        let small = alloc.create(ElementType::Float64, &[4, 4]).unwrap();
        assert!(alloc.bytes_in_use() >= 128);
        let err = alloc.create(ElementType::Float64, &[100, 100]).unwrap_err();
        match err {
            MxError::Allocation { limit, .. } => assert_eq!(limit, Some(1024)),
            other => panic!("unexpected error {other:?}"),
        }
        drop(small);
        assert_eq!(alloc.bytes_in_use(), 0);
    }

    #[test]
    fn oversized_requests_are_refused_before_building() {
        let alloc = ForeignAllocator::with_limit(1024);
        let err = alloc.create(ElementType::Float64, &[1 << 27, 1]).unwrap_err();
        assert!(matches!(
            err,
            MxError::Allocation { requested, limit: Some(1024), .. } if requested > 1 << 30
        ));
        let err = alloc.create_cell(&[usize::MAX, 2]).unwrap_err();
        assert!(matches!(err, MxError::Allocation { .. }));
        assert_eq!(alloc.bytes_in_use(), 0);
        assert_eq!(alloc.live_values(), 0);

        assert!(alloc.create_struct(&["ok", "1bad"]).is_err());
        assert_eq!(alloc.bytes_in_use(), 0);

        let fits = alloc.create(ElementType::UInt8, &[10, 10]).unwrap();
        assert!(alloc.bytes_in_use() >= 100);
        drop(fits);
        assert_eq!(alloc.bytes_in_use(), 0);
    }

    #[test]
    fn live_counter_tracks_handles() {
        let alloc = ForeignAllocator::new();
        let a = alloc.create_cell(&[1, 3]).unwrap();
        let b = alloc.create_string("abc").unwrap();
        assert_eq!(alloc.live_values(), 2);
        drop(a);
        assert_eq!(alloc.live_values(), 1);
        drop(b);
        assert_eq!(alloc.live_values(), 0);
    }
}
