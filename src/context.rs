use serde_json::{Map, Value};
use std::rc::Rc;

use crate::reactive::DependencySet;

/// Bindings pushed for the duration of one loop-body evaluation.
pub type Frame = Map<String, Value>;

/// A compiled expression or token getter.
pub type EvalFn = Rc<dyn Fn(&mut EvalContext) -> Value>;

/// State threaded through every render closure of one evaluation pass.
///
/// Holds the iteration frame stack and the read dependencies collected so far.
/// Frames follow strict stack discipline: [`EvalContext::with_frame`] is the only
/// way to push one, and it always pops before returning.
#[derive(Debug, Default)]
pub struct EvalContext {
    frames: Vec<Frame>,
    dependencies: DependencySet,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of iteration frames currently active.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Active frames, outermost first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Push `frame`, run `body`, pop the frame.
    pub fn with_frame<R>(&mut self, frame: Frame, body: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.frames.len();
        self.frames.push(frame);
        let out = body(self);
        debug_assert_eq!(
            self.frames.len(),
            depth + 1,
            "iteration frame stack unbalanced inside loop body"
        );
        self.frames.truncate(depth);
        out
    }

    pub fn record(&mut self, segments: &[&str]) {
        self.dependencies.record(segments);
    }

    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    pub fn take_dependencies(&mut self) -> DependencySet {
        std::mem::take(&mut self.dependencies)
    }
}
