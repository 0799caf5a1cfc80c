use std::sync::Mutex;

/// Test-reporting collaborator. Receives every failure the harness detects.
pub trait Reporter: Send + Sync {
    /// Mark the current test failed. The harness continues as if the
    /// failed operation produced nothing.
    fn error(&self, message: &str);

    /// Stop the current test immediately.
    fn fatal(&self, message: &str) -> !;
}

/// Default reporter: any failure panics the test thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl Reporter for PanicReporter {
    fn error(&self, message: &str) {
        panic!("{message}");
    }

    fn fatal(&self, message: &str) -> ! {
        panic!("fatal: {message}");
    }
}

/// Records `error` calls for later inspection; `fatal` still panics.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors reported so far, oldest first.
    pub fn errors(&self) -> Vec<String> {
        match self.errors.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

impl Reporter for CollectingReporter {
    fn error(&self, message: &str) {
        let mut guard = match self.errors.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(message.to_string());
    }

    fn fatal(&self, message: &str) -> ! {
        panic!("fatal: {message}");
    }
}
