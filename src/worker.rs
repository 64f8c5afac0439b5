use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::error;

use crate::JobError;

/// A transformation shared by every worker of a pool.
///
/// Returning `None` means the job produced nothing worth forwarding.
pub type Function<I, O> = Arc<dyn Fn(I) -> Option<O> + Send + Sync + 'static>;

/// Runs a transformation with panics turned into [`JobError`]s.
pub struct Worker<I, O> {
    f: Function<I, O>,
}

impl<I, O> Clone for Worker<I, O> {
    fn clone(&self) -> Self {
        Worker { f: self.f.clone() }
    }
}

impl<I, O> Worker<I, O>
where
    I: Clone + Debug,
{
    /// Wraps a shared transformation.
    pub fn new(f: Function<I, O>) -> Self {
        Worker { f }
    }

    /// Invokes the transformation on `input`.
    ///
    /// A panic inside the transformation, or inside the copy of `input` kept
    /// for reporting, does not unwind past this call. It is logged and
    /// returned as an error.
    pub fn run(&self, input: I) -> Result<Option<O>, JobError<I>> {
        let param = match panic::catch_unwind(AssertUnwindSafe(|| input.clone())) {
            Ok(param) => param,
            Err(payload) => {
                let err = JobError::CloneFailed {
                    detail: panic_detail(payload.as_ref()),
                };
                error!("Job panicked, dropping result: {}", err);
                return Err(err);
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.f)(input))) {
            Ok(out) => Ok(out),
            Err(payload) => {
                let err = JobError::Panicked {
                    input: param,
                    detail: panic_detail(payload.as_ref()),
                };
                error!("Job panicked, dropping result: {}", err);
                Err(err)
            }
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Metadata, Record};
    use std::sync::{Mutex, Once};

    static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

    struct Capture;

    impl log::Log for Capture {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            RECORDS
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;

    fn capture_logs() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            log::set_logger(&CAPTURE).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
    }

    /// Error records mentioning `needle`. Tests share the logger, so each
    /// one looks for values no other test uses.
    fn errors_mentioning(needle: &str) -> usize {
        RECORDS
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, msg)| *level == Level::Error && msg.contains(needle))
            .count()
    }

    #[derive(Debug)]
    struct Brittle(i64);

    impl Clone for Brittle {
        fn clone(&self) -> Self {
            if self.0 < 0 {
                panic_control::disable_hook_in_current_thread();
                panic!("cannot copy {}", self.0);
            }
            Brittle(self.0)
        }
    }

    fn worker<F>(f: F) -> Worker<i64, i64>
    where
        F: Fn(i64) -> Option<i64> + Send + Sync + 'static,
    {
        Worker::new(Arc::new(f))
    }

    #[test]
    fn returns_output_on_normal_completion() {
        let w = worker(|x| Some(x * 2));
        assert_eq!(w.run(21).unwrap(), Some(42));
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let w = worker(|_| None);
        assert_eq!(w.run(1).unwrap(), None);
    }

    #[test]
    fn panic_becomes_error_with_input() {
        let w = worker(|x| {
            panic_control::disable_hook_in_current_thread();
            if x < 0 {
                panic!("negative input {}", x);
            }
            Some(x)
        });

        let err = w.run(-7).unwrap_err();
        assert_eq!(err.input(), Some(&-7));
        assert_eq!(err.detail(), "negative input -7");
        assert!(err.to_string().contains("-7"));

        // The same worker keeps working after a fault.
        assert_eq!(w.run(3).unwrap(), Some(3));
    }

    #[test]
    fn static_str_payload_is_recovered() {
        let w = worker(|_| {
            panic_control::disable_hook_in_current_thread();
            panic!("boom")
        });
        assert_eq!(w.run(0).unwrap_err().detail(), "boom");
    }

    #[test]
    fn non_string_payload_gets_placeholder() {
        let w = worker(|_| {
            panic_control::disable_hook_in_current_thread();
            std::panic::panic_any(17u8)
        });
        assert_eq!(w.run(0).unwrap_err().detail(), "non-string panic payload");
    }

    #[test]
    fn each_fault_is_logged_once_with_its_input() {
        capture_logs();
        let w = worker(|x| {
            panic_control::disable_hook_in_current_thread();
            if x < 0 {
                panic!("negative input");
            }
            Some(x)
        });

        assert!(w.run(-4242).is_err());
        assert!(w.run(-4343).is_err());
        assert_eq!(w.run(4444).unwrap(), Some(4444));

        assert_eq!(errors_mentioning("-4242"), 1);
        assert_eq!(errors_mentioning("-4343"), 1);
        assert_eq!(errors_mentioning("4444"), 0);
    }

    #[test]
    fn panicking_clone_is_contained() {
        capture_logs();
        let w: Worker<Brittle, i64> = Worker::new(Arc::new(|b: Brittle| Some(b.0)));

        let err = w.run(Brittle(-9191)).unwrap_err();
        assert!(matches!(err, JobError::CloneFailed { .. }));
        assert!(err.input().is_none());
        assert_eq!(err.detail(), "cannot copy -9191");
        assert_eq!(errors_mentioning("cannot copy -9191"), 1);

        assert_eq!(w.run(Brittle(5)).unwrap(), Some(5));
    }
}
