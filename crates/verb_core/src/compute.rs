//! Explicit compute context for the data-parallel kernels.
//!
//! The context owns a dedicated rayon thread pool (the "device"). Kernels
//! are dispatched onto it one at a time and the host blocks until each
//! dispatch completes. Buffers the kernels work on are [`DeviceBuffer`]s:
//! labelled arenas created with an explicit copy-in ([`ComputeContext::upload`])
//! and read back with an explicit copy-out ([`DeviceBuffer::download`]).

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytemuck::Pod;
use thiserror::Error;

/// Failures of the compute device.
///
/// All of these are fatal for the run that hit them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),

    #[error("out of memory allocating {bytes} bytes for buffer '{label}'")]
    OutOfMemory { label: String, bytes: usize },

    #[error("kernel '{kernel}' could not be built: {reason}")]
    KernelBuild { kernel: String, reason: String },

    #[error("dispatch of kernel '{kernel}' failed: {reason}")]
    DispatchFailed { kernel: String, reason: String },
}

/// Result type for compute operations.
pub type ComputeResult<T> = Result<T, ComputeError>;

/// Execution context wrapping a dedicated worker pool.
pub struct ComputeContext {
    pool: rayon::ThreadPool,
}

impl ComputeContext {
    /// Create a context using one worker per available core.
    pub fn new() -> ComputeResult<Self> {
        Self::with_threads(0)
    }

    /// Create a context with a fixed number of workers (0 = one per core).
    pub fn with_threads(threads: usize) -> ComputeResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("verb-compute-{i}"))
            .build()
            .map_err(|e| ComputeError::DeviceUnavailable(e.to_string()))?;

        log::debug!("Compute context ready with {} workers", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `kernel` on the device and wait for it to finish.
    ///
    /// Parallel iterators used inside `f` run on this context's pool. A
    /// panic anywhere in the kernel is reported as
    /// [`ComputeError::DispatchFailed`].
    pub fn dispatch<R, F>(&self, kernel: &str, f: F) -> ComputeResult<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool
            .install(|| catch_unwind(AssertUnwindSafe(f)))
            .map_err(|payload| ComputeError::DispatchFailed {
                kernel: kernel.to_string(),
                reason: panic_message(payload.as_ref()),
            })
    }

    /// Copy `data` into a new device buffer.
    pub fn upload<T: Pod>(&self, label: &str, data: &[T]) -> ComputeResult<DeviceBuffer<T>> {
        let mut buffer = DeviceBuffer::allocate(label, data.len())?;
        buffer.data.extend_from_slice(data);
        Ok(buffer)
    }

    /// New device buffer of `len` zeroed elements.
    pub fn zeroed<T: Pod>(&self, label: &str, len: usize) -> ComputeResult<DeviceBuffer<T>> {
        let mut buffer = DeviceBuffer::allocate(label, len)?;
        buffer.data.resize(len, T::zeroed());
        Ok(buffer)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

/// A labelled buffer owned by the compute side of a run.
#[derive(Debug, Clone)]
pub struct DeviceBuffer<T: Pod> {
    label: String,
    data: Vec<T>,
}

impl<T: Pod> DeviceBuffer<T> {
    fn allocate(label: &str, len: usize) -> ComputeResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ComputeError::OutOfMemory {
                label: label.to_string(),
                bytes: len.saturating_mul(std::mem::size_of::<T>()),
            })?;
        Ok(Self {
            label: label.to_string(),
            data,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the buffer contents in bytes.
    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Raw bytes of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Overwrite the contents from host memory. Lengths must match.
    pub fn write(&mut self, data: &[T]) -> ComputeResult<()> {
        if data.len() != self.data.len() {
            return Err(ComputeError::DispatchFailed {
                kernel: format!("write '{}'", self.label),
                reason: format!("expected {} elements, got {}", self.data.len(), data.len()),
            });
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// Copy the contents back to host memory.
    pub fn download(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Hand the storage back to the host without copying.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_upload_download() {
        let ctx = ComputeContext::with_threads(2).unwrap();
        let buffer = ctx.upload("values", &[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(buffer.label(), "values");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.size_in_bytes(), 12);
        assert_eq!(buffer.download(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zeroed_and_write() {
        let ctx = ComputeContext::with_threads(2).unwrap();
        let mut buffer = ctx.zeroed::<u32>("ids", 4).unwrap();
        assert_eq!(buffer.as_slice(), &[0, 0, 0, 0]);

        buffer.write(&[4, 3, 2, 1]).unwrap();
        assert_eq!(buffer.as_slice(), &[4, 3, 2, 1]);
        assert!(buffer.write(&[1]).is_err());
    }

    #[test]
    fn test_out_of_memory() {
        let ctx = ComputeContext::with_threads(1).unwrap();
        let err = ctx.zeroed::<u64>("huge", usize::MAX / 2).unwrap_err();
        match err {
            ComputeError::OutOfMemory { label, bytes } => {
                assert_eq!(label, "huge");
                assert_eq!(bytes, usize::MAX);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_runs_on_pool() {
        let ctx = ComputeContext::with_threads(3).unwrap();
        assert_eq!(ctx.threads(), 3);

        let mut buffer = ctx.upload("squares", &(0..100u32).collect::<Vec<_>>()).unwrap();
        ctx.dispatch("square", || {
            assert_eq!(rayon::current_num_threads(), 3);
            buffer.as_mut_slice().par_iter_mut().for_each(|x| *x *= *x);
        })
        .unwrap();
        assert_eq!(buffer.as_slice()[9], 81);
    }

    #[test]
    fn test_dispatch_panic_is_reported() {
        let ctx = ComputeContext::with_threads(1).unwrap();
        let err = ctx
            .dispatch("broken", || -> u32 { panic!("bad lane") })
            .unwrap_err();
        assert_eq!(
            err,
            ComputeError::DispatchFailed {
                kernel: "broken".to_string(),
                reason: "bad lane".to_string(),
            }
        );
    }
}
