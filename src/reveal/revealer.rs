//! Incremental, double-buffered mesh reveal.
//!
//! The revealer extracts geometry for the candidate cells of a field on its
//! own worker thread and exposes it to the render path a few cells at a
//! time. Extraction runs in large batches so the expensive upload into a
//! mesh sink happens rarely, while the reveal count advances by exactly the
//! primitives of the requested cells.
//!
//! Two sinks alternate roles. The worker only ever writes the inactive one
//! and publishes it by flipping the front index after the upload, so a
//! frame never sees a half written buffer.

use std::ops::{Deref, Range};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::error::Error;
use crate::core::types::{Result, UVec3};
use crate::worker::TaskQueue;

use super::candidates::CandidateIndex;
use super::config::RevealerConfig;
use super::extractor::{IsosurfaceExtractor, MeshVertex, VERTICES_PER_PRIMITIVE};
use super::field::ScalarField;

/// Destination for revealed geometry, typically a GPU vertex buffer.
pub trait MeshSink: Send + 'static {
    /// Replace the whole vertex content
    fn upload(&mut self, vertices: &[MeshVertex]);

    /// Limit drawing to this range of primitives
    fn set_active_primitives(&mut self, range: Range<usize>);
}

/// CPU-side sink that keeps what it was given.
#[derive(Clone, Debug, Default)]
pub struct VertexBuffer {
    vertices: Vec<MeshVertex>,
    active: Range<usize>,
    uploads: usize,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    /// Vertices of the active primitive range
    pub fn active_vertices(&self) -> &[MeshVertex] {
        let start = (self.active.start * VERTICES_PER_PRIMITIVE).min(self.vertices.len());
        let end = (self.active.end * VERTICES_PER_PRIMITIVE).min(self.vertices.len());
        &self.vertices[start..end]
    }

    pub fn active(&self) -> Range<usize> {
        self.active.clone()
    }

    pub fn primitive_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_PRIMITIVE
    }

    /// Number of uploads received so far
    pub fn upload_count(&self) -> usize {
        self.uploads
    }
}

impl MeshSink for VertexBuffer {
    fn upload(&mut self, vertices: &[MeshVertex]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        self.uploads += 1;
    }

    fn set_active_primitives(&mut self, range: Range<usize>) {
        self.active = range;
    }
}

struct MeshBuffer<S> {
    sink: S,
    /// Primitives uploaded into `sink`
    primitives: usize,
}

/// State shared between the owner and the worker thread.
struct Shared<S> {
    busy: AtomicBool,
    front: AtomicUsize,
    buffers: [Mutex<MeshBuffer<S>>; 2],
    reveal_count: AtomicUsize,
    revealed_cells: AtomicUsize,
    extracted_cells: AtomicUsize,
    extracted_primitives: AtomicUsize,
}

impl<S> Shared<S> {
    fn buffer(&self, index: usize) -> MutexGuard<'_, MeshBuffer<S>> {
        self.buffers[index].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker-owned extraction state. Only the worker thread touches it.
struct Extraction {
    field: Arc<dyn ScalarField>,
    extractor: Box<dyn IsosurfaceExtractor>,
    candidates: Arc<CandidateIndex>,
    iso_level: i32,
    batch_cells: usize,
    vertices: Vec<MeshVertex>,
    /// Primitives per extracted candidate; its length is the write cursor
    primitive_counts: Vec<u32>,
}

impl Extraction {
    fn write_cursor(&self) -> usize {
        self.primitive_counts.len()
    }

    fn primitives(&self) -> usize {
        self.vertices.len() / VERTICES_PER_PRIMITIVE
    }

    fn extract_batch(&mut self, end: usize) {
        let start = Instant::now();
        let first = self.write_cursor();
        let before = self.primitives();

        for ordinal in first..end {
            let vertices = match self.candidates.bounds(ordinal) {
                Some(bounds) => self.extractor.polygonize(self.field.as_ref(), self.iso_level, bounds),
                None => Vec::new(),
            };
            let whole = vertices.len() / VERTICES_PER_PRIMITIVE;
            if vertices.len() % VERTICES_PER_PRIMITIVE != 0 {
                log::warn!(
                    "Extractor returned {} vertices for cell #{}, dropping partial primitive",
                    vertices.len(),
                    ordinal
                );
            }
            self.vertices
                .extend_from_slice(&vertices[..whole * VERTICES_PER_PRIMITIVE]);
            self.primitive_counts.push(whole as u32);
        }

        log::debug!(
            "Extracted cells {}..{}: {} primitives ({:.1}ms)",
            first,
            end,
            self.primitives() - before,
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Handle one request for `cells` more revealed cells.
    fn reveal<S: MeshSink>(&mut self, cells: usize, shared: &Shared<S>) {
        let total = self.candidates.len();
        let revealed = shared.revealed_cells.load(Ordering::SeqCst);
        let target = revealed.saturating_add(cells).min(total);

        while self.write_cursor() < target {
            let end = self
                .write_cursor()
                .saturating_add(self.batch_cells.max(1))
                .min(total);
            self.extract_batch(end);
        }
        shared
            .extracted_cells
            .store(self.write_cursor(), Ordering::SeqCst);
        shared
            .extracted_primitives
            .store(self.primitives(), Ordering::SeqCst);

        let added: usize = self.primitive_counts[revealed..target]
            .iter()
            .map(|c| *c as usize)
            .sum();

        // Upload into the inactive buffer only if it is behind, then publish it
        let back = 1 - shared.front.load(Ordering::SeqCst);
        let swapped = {
            let mut buffer = shared.buffer(back);
            if self.primitives() > buffer.primitives {
                buffer.sink.upload(&self.vertices);
                buffer.primitives = self.primitives();
                true
            } else {
                false
            }
        };
        if swapped {
            shared.front.store(back, Ordering::SeqCst);
        }

        shared.revealed_cells.store(target, Ordering::SeqCst);
        shared.reveal_count.fetch_add(added, Ordering::SeqCst);
    }
}

/// The front buffer, locked for the duration of a draw.
pub struct MeshView<'a, S> {
    guard: MutexGuard<'a, MeshBuffer<S>>,
    active: usize,
}

impl<S> MeshView<'_, S> {
    /// Primitives exposed for drawing
    pub fn primitive_count(&self) -> usize {
        self.active
    }

    pub fn sink(&self) -> &S {
        &self.guard.sink
    }
}

impl<S> Deref for MeshView<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.guard.sink
    }
}

/// Reveals the isosurface of a field a few candidate cells at a time.
///
/// Requests do not queue: a second [`request`](Self::request) while one is
/// still running fails with [`Error::RevealerBusy`]. Callers check
/// [`is_busy`](Self::is_busy) first.
pub struct MeshRevealer<S: MeshSink> {
    shared: Arc<Shared<S>>,
    candidates: Arc<CandidateIndex>,
    iso_level: i32,
    worker: TaskQueue<usize>,
}

impl<S: MeshSink> MeshRevealer<S> {
    /// Build the candidate index and start the worker thread.
    pub fn new(
        field: Arc<dyn ScalarField>,
        extractor: impl IsosurfaceExtractor + 'static,
        buffers: [S; 2],
        config: &RevealerConfig,
    ) -> Result<Self> {
        let candidates = Arc::new(CandidateIndex::build(field.as_ref()));
        let [first, second] = buffers;
        let shared = Arc::new(Shared {
            busy: AtomicBool::new(false),
            front: AtomicUsize::new(0),
            buffers: [
                Mutex::new(MeshBuffer { sink: first, primitives: 0 }),
                Mutex::new(MeshBuffer { sink: second, primitives: 0 }),
            ],
            reveal_count: AtomicUsize::new(0),
            revealed_cells: AtomicUsize::new(0),
            extracted_cells: AtomicUsize::new(0),
            extracted_primitives: AtomicUsize::new(0),
        });

        let mut extraction = Extraction {
            field,
            extractor: Box::new(extractor),
            candidates: candidates.clone(),
            iso_level: config.iso_level,
            batch_cells: config.batch_cells,
            vertices: Vec::new(),
            primitive_counts: Vec::with_capacity(candidates.len()),
        };
        let worker_shared = shared.clone();
        let worker = TaskQueue::new(config.worker_name.clone(), move |cells: &mut usize| {
            extraction.reveal(*cells, &worker_shared);
            Ok(())
        })?;

        Ok(Self {
            shared,
            candidates,
            iso_level: config.iso_level,
            worker,
        })
    }

    /// Reveal the primitives of the next `cells` candidate cells.
    pub fn request(&self, cells: usize) -> Result<()> {
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Rejected reveal request of {} cells: revealer busy", cells);
            return Err(Error::RevealerBusy);
        }

        let shared = self.shared.clone();
        let queued = self.worker.enqueue(cells, move |_, _| {
            shared.busy.store(false, Ordering::SeqCst);
        });
        if queued.is_err() {
            self.shared.busy.store(false, Ordering::SeqCst);
        }
        queued
    }

    /// True from `request` until its completion
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Poll until the running request finished or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Lock the front buffer and limit it to the revealed primitives.
    pub fn current_mesh(&self) -> MeshView<'_, S> {
        let front = self.shared.front.load(Ordering::SeqCst);
        let mut guard = self.shared.buffer(front);
        let active = self.reveal_count().min(guard.primitives);
        guard.sink.set_active_primitives(0..active);
        MeshView { guard, active }
    }

    /// Lowest sample of the `ordinal`-th candidate cell
    pub fn cell_for_ordinal(&self, ordinal: usize) -> Option<UVec3> {
        self.candidates.cell(ordinal)
    }

    /// Primitives currently exposed to the render path
    pub fn reveal_count(&self) -> usize {
        self.shared.reveal_count.load(Ordering::SeqCst)
    }

    pub fn revealed_cells(&self) -> usize {
        self.shared.revealed_cells.load(Ordering::SeqCst)
    }

    /// Candidate cells polygonized so far (the write cursor)
    pub fn extracted_cells(&self) -> usize {
        self.shared.extracted_cells.load(Ordering::SeqCst)
    }

    pub fn extracted_primitives(&self) -> usize {
        self.shared.extracted_primitives.load(Ordering::SeqCst)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Every candidate cell has been revealed
    pub fn is_complete(&self) -> bool {
        self.revealed_cells() >= self.candidates.len()
    }

    pub fn iso_level(&self) -> i32 {
        self.iso_level
    }

    /// Index of the buffer the render path reads
    pub fn front_index(&self) -> usize {
        self.shared.front.load(Ordering::SeqCst)
    }
}
