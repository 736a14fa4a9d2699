//! Progress signal for long running initialization.
//!
//! A [`ProgressReporter`] holds a single value in `0..=100` and broadcasts
//! every change to its observers. Repeating the current value is not
//! delivered again. Delivering 100 is terminal: all observers are detached
//! right after they received it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::error::Error;
use crate::core::types::Result;

/// Receives progress values in `0..=100`.
pub trait ProgressObserver: Send {
    fn on_progress(&mut self, value: u8);
}

impl<F> ProgressObserver for F
where
    F: FnMut(u8) + Send,
{
    fn on_progress(&mut self, value: u8) {
        self(value)
    }
}

#[derive(Default)]
struct ProgressState {
    last: u8,
    observers: Vec<Box<dyn ProgressObserver>>,
}

/// Cloneable single-value progress broadcaster.
///
/// Clones share state, so a clone can be moved to a worker thread while the
/// original keeps its subscriptions. Observers run on the thread calling
/// [`ProgressReporter::set_progress`] and must not call back into the same
/// reporter.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    inner: Arc<Mutex<ProgressState>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an observer. It stays attached until 100 is delivered.
    pub fn subscribe(&self, observer: impl ProgressObserver + 'static) {
        self.state().observers.push(Box::new(observer));
    }

    /// Forward every value reported here into `target`.
    pub fn forward_to(&self, target: ProgressReporter) {
        self.subscribe(move |value: u8| {
            // value is already range checked
            let _ = target.set_progress(value as i32);
        });
    }

    /// Change the progress. Values equal to the last one are dropped.
    pub fn set_progress(&self, progress: i32) -> Result<()> {
        if !(0..=100).contains(&progress) {
            return Err(Error::ProgressOutOfRange(progress));
        }
        let value = progress as u8;

        let mut state = self.state();
        if state.last == value {
            return Ok(());
        }
        state.last = value;
        for observer in state.observers.iter_mut() {
            observer.on_progress(value);
        }
        if value == 100 {
            let detached = state.observers.len();
            state.observers.clear();
            log::debug!("Progress complete, detached {} observer(s)", detached);
        }
        Ok(())
    }

    /// Last reported value
    pub fn value(&self) -> u8 {
        self.state().last
    }

    /// True once 100 has been reported
    pub fn is_complete(&self) -> bool {
        self.value() == 100
    }

    /// Number of attached observers
    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ProgressReporter")
            .field("last", &state.last)
            .field("observers", &state.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(reporter: &ProgressReporter) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.subscribe(move |v: u8| sink.lock().unwrap().push(v));
        seen
    }

    #[test]
    fn test_repeated_values_delivered_once() {
        let reporter = ProgressReporter::new();
        let seen = recorder(&reporter);

        reporter.set_progress(10).unwrap();
        reporter.set_progress(10).unwrap();
        reporter.set_progress(40).unwrap();
        reporter.set_progress(40).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![10, 40]);
        assert_eq!(reporter.value(), 40);
    }

    #[test]
    fn test_initial_zero_is_not_delivered() {
        let reporter = ProgressReporter::new();
        let seen = recorder(&reporter);
        reporter.set_progress(0).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_observers_detach_after_completion() {
        let reporter = ProgressReporter::new();
        let seen = recorder(&reporter);

        reporter.set_progress(50).unwrap();
        reporter.set_progress(100).unwrap();
        assert_eq!(reporter.observer_count(), 0);
        assert!(reporter.is_complete());

        reporter.set_progress(20).unwrap();
        reporter.set_progress(100).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let reporter = ProgressReporter::new();
        assert!(matches!(reporter.set_progress(101), Err(Error::ProgressOutOfRange(101))));
        assert!(matches!(reporter.set_progress(-1), Err(Error::ProgressOutOfRange(-1))));
        assert_eq!(reporter.value(), 0);
    }

    #[test]
    fn test_forward_to() {
        let source = ProgressReporter::new();
        let target = ProgressReporter::new();
        let seen = recorder(&target);
        source.forward_to(target.clone());

        source.set_progress(30).unwrap();
        source.set_progress(100).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![30, 100]);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let reporter = ProgressReporter::new();
        let seen = recorder(&reporter);
        let clone = reporter.clone();

        std::thread::spawn(move || clone.set_progress(75).unwrap())
            .join()
            .unwrap();

        assert_eq!(reporter.value(), 75);
        assert_eq!(*seen.lock().unwrap(), vec![75]);
    }
}
