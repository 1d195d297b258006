//! Per-attempt execution context handed to every body

use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Description of the spec currently executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDescription {
    pub full_text: String,
    pub container_texts: Vec<String>,
    pub text: String,
    pub file: String,
    pub line: u32,
    /// Whether the spec has failed so far
    pub failed: bool,
}

struct ContextInner {
    full_text: String,
    container_texts: Vec<String>,
    text: String,
    file: String,
    line: u32,
    attempt: AtomicU32,
    parallel_node: u32,
    failed: AtomicBool,
    output: Mutex<Vec<u8>>,
}

/// Handle given to setup, subject and teardown bodies
///
/// Cloning is cheap; all clones share the captured output buffer.
#[derive(Clone)]
pub struct SpecContext {
    inner: Arc<ContextInner>,
}

impl SpecContext {
    pub(crate) fn new(spec: &crate::spec::Spec, attempt: u32, parallel_node: u32) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                full_text: spec.description(),
                container_texts: spec.container_texts().to_vec(),
                text: spec.text().to_string(),
                file: spec.location().file.clone(),
                line: spec.location().line,
                attempt: AtomicU32::new(attempt),
                parallel_node,
                failed: AtomicBool::new(false),
                output: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Context for suite-level nodes, which belong to no spec
    pub(crate) fn for_suite(text: &str, parallel_node: u32) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                full_text: text.to_string(),
                container_texts: Vec::new(),
                text: text.to_string(),
                file: String::new(),
                line: 0,
                attempt: AtomicU32::new(1),
                parallel_node,
                failed: AtomicBool::new(false),
                output: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn description(&self) -> SpecDescription {
        SpecDescription {
            full_text: self.inner.full_text.clone(),
            container_texts: self.inner.container_texts.clone(),
            text: self.inner.text.clone(),
            file: self.inner.file.clone(),
            line: self.inner.line,
            failed: self.has_failed(),
        }
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    /// Start another subject attempt within the same setup
    pub(crate) fn begin_retry(&self, attempt: u32) {
        self.inner.attempt.store(attempt, Ordering::SeqCst);
        self.inner.failed.store(false, Ordering::SeqCst);
    }

    pub fn parallel_node(&self) -> u32 {
        self.inner.parallel_node
    }

    pub fn has_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_failed(&self) {
        self.inner.failed.store(true, Ordering::SeqCst);
    }

    /// Writer into the captured output
    pub fn writer(&self) -> SpecWriter {
        SpecWriter {
            inner: self.inner.clone(),
        }
    }

    /// Append one line to the captured output
    pub fn log(&self, line: impl AsRef<str>) {
        let mut output = self.inner.output.lock();
        output.extend_from_slice(line.as_ref().as_bytes());
        output.push(b'\n');
    }

    pub fn captured_output(&self) -> String {
        String::from_utf8_lossy(&self.inner.output.lock()).into_owned()
    }
}

/// `std::io::Write` adapter over a context's captured output
pub struct SpecWriter {
    inner: Arc<ContextInner>,
}

impl Write for SpecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.output.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_shared_between_clones() {
        let ctx = SpecContext::for_suite("BeforeSuite", 2);
        let clone = ctx.clone();
        clone.log("first");
        write!(ctx.writer(), "second").unwrap();
        assert_eq!(ctx.captured_output(), "first\nsecond");
        assert_eq!(ctx.parallel_node(), 2);
    }

    #[test]
    fn test_retry_resets_failed_flag() {
        let ctx = SpecContext::for_suite("suite", 1);
        assert!(!ctx.description().failed);
        ctx.mark_failed();
        assert!(ctx.has_failed());
        ctx.begin_retry(2);
        assert_eq!(ctx.attempt(), 2);
        assert!(!ctx.has_failed());
    }
}
