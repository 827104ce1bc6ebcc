use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::sleep;

use crate::error::CaptureError;

#[derive(Debug, Default)]
struct CaptureState {
    attached: bool,
    lines: Vec<String>,
    generation: u64,
    closed: bool,
}

/// Capture buffer fed by the process output pumps.
///
/// Lines are only kept while a [`CaptureGuard`] is alive, and at most one
/// guard exists at a time. Dropping the guard detaches and clears the buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<CaptureState>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a new process generation; pumps of older processes are ignored
    /// from here on.
    pub fn reopen(&self) -> u64 {
        let mut state = self.state();
        state.generation += 1;
        state.closed = false;
        state.generation
    }

    pub fn push(&self, generation: u64, line: &str) {
        let mut state = self.state();
        if state.attached && state.generation == generation {
            state.lines.push(line.to_string());
        }
    }

    /// Marks the stdout stream of `generation` as finished.
    pub fn mark_closed(&self, generation: u64) {
        let mut state = self.state();
        if state.generation == generation {
            state.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn is_captured(&self) -> bool {
        self.state().attached
    }

    pub fn attach(&self) -> Result<CaptureGuard, CaptureError> {
        let mut state = self.state();
        if state.attached {
            return Err(CaptureError::AlreadyAttached);
        }
        state.attached = true;
        state.lines.clear();
        Ok(CaptureGuard {
            buffer: self.clone(),
        })
    }
}

/// Exclusive, scoped subscription to the server output.
#[derive(Debug)]
pub struct CaptureGuard {
    buffer: OutputBuffer,
}

impl CaptureGuard {
    pub fn len(&self) -> usize {
        self.buffer.state().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lines(&self) -> Vec<String> {
        self.buffer.state().lines.clone()
    }

    pub fn lines_from(&self, start: usize) -> Vec<String> {
        let state = self.buffer.state();
        state.lines.get(start..).map(<[String]>::to_vec).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    /// Samples the length, waits `interval`, and compares, until two samples
    /// agree or `rounds` samples have been taken.
    pub async fn wait_quiescent(
        &self,
        interval: Duration,
        rounds: u32,
    ) -> Result<usize, CaptureError> {
        for _ in 0..rounds {
            let before = self.len();
            sleep(interval).await;
            let after = self.len();
            if after == before {
                return Ok(after);
            }
        }
        Err(CaptureError::Timeout { rounds })
    }

    /// Like [`wait_quiescent`](Self::wait_quiescent), but an empty buffer is
    /// not considered settled until `rounds` quiet samples have passed.
    pub async fn wait_for_output(
        &self,
        interval: Duration,
        rounds: u32,
    ) -> Result<usize, CaptureError> {
        for _ in 0..rounds.max(1) {
            let len = self.wait_quiescent(interval, rounds).await?;
            if len > 0 {
                return Ok(len);
            }
        }
        Ok(0)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let mut state = self.buffer.state();
        state.attached = false;
        state.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_guard_at_a_time() {
        let buffer = OutputBuffer::new();
        let guard = buffer.attach().unwrap();
        assert!(buffer.is_captured());
        assert_eq!(buffer.attach().unwrap_err(), CaptureError::AlreadyAttached);

        drop(guard);
        assert!(!buffer.is_captured());
        assert!(buffer.attach().is_ok());
    }

    #[test]
    fn lines_kept_only_while_attached() {
        let buffer = OutputBuffer::new();
        let generation = buffer.reopen();
        buffer.push(generation, "before");

        let guard = buffer.attach().unwrap();
        buffer.push(generation, "one");
        buffer.push(generation, "two");
        buffer.push(generation + 7, "stale");
        assert_eq!(guard.lines(), vec!["one", "two"]);
        assert_eq!(guard.lines_from(1), vec!["two"]);
        assert!(guard.lines_from(5).is_empty());
        drop(guard);

        let guard = buffer.attach().unwrap();
        assert!(guard.is_empty());
    }

    #[test]
    fn detach_happens_on_error_paths() {
        fn fails(buffer: &OutputBuffer) -> Result<(), CaptureError> {
            let _guard = buffer.attach()?;
            Err(CaptureError::Timeout { rounds: 1 })
        }
        let buffer = OutputBuffer::new();
        assert!(fails(&buffer).is_err());
        assert!(!buffer.is_captured());
    }

    #[test]
    fn closed_flag_follows_generation() {
        let buffer = OutputBuffer::new();
        let first = buffer.reopen();
        let second = buffer.reopen();
        buffer.mark_closed(first);
        assert!(!buffer.is_closed());
        buffer.mark_closed(second);
        assert!(buffer.is_closed());
        buffer.reopen();
        assert!(!buffer.is_closed());
    }

    #[tokio::test]
    async fn quiescence_settles_and_times_out() {
        let buffer = OutputBuffer::new();
        let generation = buffer.reopen();
        let guard = buffer.attach().unwrap();
        buffer.push(generation, "a");
        let len = guard
            .wait_quiescent(Duration::from_millis(5), 3)
            .await
            .unwrap();
        assert_eq!(len, 1);

        let feeder = buffer.clone();
        let pump = tokio::spawn(async move {
            for i in 0..200 {
                feeder.push(generation, &format!("line {i}"));
                sleep(Duration::from_millis(1)).await;
            }
        });
        let err = guard
            .wait_quiescent(Duration::from_millis(20), 2)
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::Timeout { rounds: 2 });
        pump.abort();
    }
}
