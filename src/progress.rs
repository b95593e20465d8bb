//! In-place terminal progress rendering.
//!
//! The renderer overwrites its previous message with backspace sequences so
//! only the most recent message stays visible, regardless of length
//! differences between successive updates. Below 100% the message carries a
//! percentage prefix padded to three characters; at 100% the prefix is
//! dropped.

use crate::plugins::Plugin;
use crate::ui::LogSink;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

const BACKSPACE: &str = "\u{8}";
const ERASE: &str = "\u{8} \u{8}";

#[derive(Debug, Default)]
pub struct ProgressRenderer {
    chars: usize,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sink: &mut dyn LogSink, ratio: f64, message: &str) {
        let text = if ratio < 1.0 {
            let percentage = (ratio.clamp(0.0, 1.0) * 100.0).floor() as u32;
            format!("{percentage:03}% {message}")
        } else {
            message.to_string()
        };

        let width = text.chars().count();
        // Blank out the tail of a longer previous message, then back up over
        // the remaining shared width before rewriting.
        while self.chars > width {
            sink.write(ERASE);
            self.chars -= 1;
        }
        for _ in 0..self.chars {
            sink.write(BACKSPACE);
        }
        self.chars = width;
        sink.write(&text);
    }
}

/// Plugin adapter that feeds compiler progress callbacks into the renderer.
pub struct ProgressPlugin {
    renderer: RefCell<ProgressRenderer>,
    sink: Rc<RefCell<dyn LogSink>>,
}

impl ProgressPlugin {
    pub fn new(sink: Rc<RefCell<dyn LogSink>>) -> Self {
        Self {
            renderer: RefCell::new(ProgressRenderer::new()),
            sink,
        }
    }
}

impl Plugin for ProgressPlugin {
    fn name(&self) -> &str {
        "progress"
    }

    fn on_progress(&self, ratio: f64, message: &str) {
        self.renderer
            .borrow_mut()
            .update(&mut *self.sink.borrow_mut(), ratio, message);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
