//! Reporter trait for dependency injection
//!
//! Pull and push report progress through this trait so the core is not
//! coupled to a particular terminal or service front-end.

use ll_schema::Reference;

/// Receives progress and status events from long-running operations.
pub trait Reporter: Send + Sync {
    /// A new phase started (e.g. "Pulling", "Uploading").
    fn section(&self, title: &str);

    /// Transfer progress for `reference`; `percent` is advisory.
    fn progress(&self, reference: &Reference, percent: u32, status: &str);

    /// The operation on `reference` finished successfully.
    fn done(&self, reference: &Reference, detail: &str);

    /// The operation on `reference` failed.
    fn failed(&self, reference: &Reference, reason: &str);

    /// Informational message.
    fn info(&self, msg: &str);

    /// Warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn progress(&self, reference: &Reference, percent: u32, status: &str) {
        (**self).progress(reference, percent, status);
    }
    fn done(&self, reference: &Reference, detail: &str) {
        (**self).done(reference, detail);
    }
    fn failed(&self, reference: &Reference, reason: &str) {
        (**self).failed(reference, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g. isolated hops, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn progress(&self, _: &Reference, _: u32, _: &str) {}
    fn done(&self, _: &Reference, _: &str) {}
    fn failed(&self, _: &Reference, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
