//! Terminal surface adapter
//!
//! A surface is one rendering and keystroke-capture target bound to one
//! session. It is purely an I/O adapter; the multiplexer owns all state.

use parking_lot::Mutex;

/// Connection status badge shown on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Connected,
    Disconnected,
    Reconnecting,
    /// Retry bound exhausted; only explicit operator action continues
    ConnectionLost,
}

/// Callbacks the multiplexer invokes on an attached surface.
pub trait TerminalSurface: Send + Sync {
    /// Shell output bytes, in stream order
    fn on_data(&self, bytes: &[u8]);

    /// Connection status changed
    fn on_status(&self, status: SurfaceStatus);

    /// Classified session error; rendered inline in the terminal
    fn on_error(&self, kind: &str, message: &str);
}

/// Surface that renders into an in-memory buffer. Used by tests and by
/// headless tooling that records session output.
pub struct BufferSurface {
    output: Mutex<Vec<u8>>,
    status: Mutex<SurfaceStatus>,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            status: Mutex::new(SurfaceStatus::Disconnected),
        }
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn output_utf8(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    pub fn status(&self) -> SurfaceStatus {
        *self.status.lock()
    }
}

impl Default for BufferSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSurface for BufferSurface {
    fn on_data(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
    }

    fn on_status(&self, status: SurfaceStatus) {
        *self.status.lock() = status;
    }

    fn on_error(&self, kind: &str, message: &str) {
        let line = format!("\r\n[{kind}] {message}\r\n");
        self.output.lock().extend_from_slice(line.as_bytes());
        *self.status.lock() = SurfaceStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_inline_and_flip_the_badge() {
        let surface = BufferSurface::new();
        surface.on_status(SurfaceStatus::Connected);
        surface.on_data(b"$ ");
        surface.on_error("authentication_failed", "server rejected key pair");

        let text = surface.output_utf8();
        assert!(text.contains("$ "));
        assert!(text.contains("[authentication_failed] server rejected key pair"));
        assert_eq!(surface.status(), SurfaceStatus::Disconnected);
    }
}
