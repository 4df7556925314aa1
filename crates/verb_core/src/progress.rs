//! Cancellation and progress reporting for long-running simulations.
//!
//! Runs take a shared `&AtomicBool` "keep going" flag and a step callback.
//! Both are consulted between steps (ray-tracing depths, waveguide time
//! steps), never inside a dispatch.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    /// Stopped early by the flag or the callback after `steps_done` steps.
    Cancelled { steps_done: usize },
}

/// Result value of a run plus how it ended.
///
/// A cancelled run still carries whatever was computed before it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub completion: Completion,
}

impl<T> Outcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            completion: Completion::Complete,
        }
    }

    pub fn cancelled(value: T, steps_done: usize) -> Self {
        Self {
            value,
            completion: Completion::Cancelled { steps_done },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            completion: self.completion,
        }
    }
}

/// Tracks step indices and cancellation for one run.
///
/// Indices handed to the callback start at 0 and increase by one per step.
pub struct Progress<'a, F> {
    keep_going: &'a AtomicBool,
    callback: F,
    steps: usize,
}

impl<'a, F> Progress<'a, F>
where
    F: FnMut(usize) -> ControlFlow<()>,
{
    pub fn new(keep_going: &'a AtomicBool, callback: F) -> Self {
        Self {
            keep_going,
            callback,
            steps: 0,
        }
    }

    /// True when the external flag still allows the run to continue.
    pub fn should_continue(&self) -> bool {
        self.keep_going.load(Ordering::Relaxed)
    }

    /// Report one finished step. Returns `false` when the run must stop.
    pub fn step(&mut self) -> bool {
        let index = self.steps;
        self.steps += 1;
        (self.callback)(index).is_continue() && self.should_continue()
    }

    pub fn steps_done(&self) -> usize {
        self.steps
    }

    /// Wrap `value` as complete or cancelled depending on `finished`.
    pub fn finish<T>(&self, value: T, finished: bool) -> Outcome<T> {
        if finished {
            Outcome::complete(value)
        } else {
            log::warn!("Run cancelled after {} steps", self.steps);
            Outcome::cancelled(value, self.steps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_start_at_zero_without_gaps() {
        let flag = AtomicBool::new(true);
        let mut seen = Vec::new();
        let mut progress = Progress::new(&flag, |i| {
            seen.push(i);
            ControlFlow::Continue(())
        });
        for _ in 0..5 {
            assert!(progress.step());
        }
        assert_eq!(progress.steps_done(), 5);
        drop(progress);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_callback_break_stops() {
        let flag = AtomicBool::new(true);
        let mut progress = Progress::new(&flag, |i| {
            if i == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(progress.step());
        assert!(!progress.step());

        let outcome = progress.finish(7, false);
        assert_eq!(outcome.completion, Completion::Cancelled { steps_done: 2 });
        assert_eq!(outcome.value, 7);
    }

    #[test]
    fn test_flag_stops() {
        let flag = AtomicBool::new(true);
        let mut progress = Progress::new(&flag, |_| ControlFlow::Continue(()));
        assert!(progress.should_continue());
        flag.store(false, Ordering::Relaxed);
        assert!(!progress.step());
    }

    #[test]
    fn test_outcome_map() {
        let outcome = Outcome::complete(vec![1, 2, 3]).map(|v| v.len());
        assert!(outcome.is_complete());
        assert_eq!(outcome.value, 3);
    }
}
