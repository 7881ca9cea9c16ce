//! Capability negotiation and the output channel back to a task's
//! originating source.
//!
//! The original C dispatcher threads a `tcb_t` function-pointer table
//! through every callback; here that collapses to a `Capabilities` bitmask
//! (kept as a bitmask because it has stable wire meaning, per the §9 design
//! note) plus a plain channel sender for output, since every source already
//! lives behind an `mpsc` channel in this async design.

use bitflags::bitflags;
use tokio::sync::mpsc;

bitflags! {
    /// Negotiated capabilities for a source, reported via `Capabilities(...)`
    /// (peer) or implied by the transport (HTTP always behaves as non-interactive).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Treat bare text as native-syntax commands rather than requiring JSON.
        const INTERACTIVE = 0b0000_0001;
        /// Tag error output with `errd:` rather than folding it into `data:`.
        const ERRD = 0b0000_0010;
        /// Supports password-style (no-echo) input prompts.
        const PWINPUT = 0b0000_0100;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::empty()
    }
}

/// One piece of output routed back to a task's originating source.
#[derive(Debug, Clone)]
pub enum SourceOutput {
    /// Ordinary action output, one line.
    Data(String),
    /// Error-tagged output (only emitted distinctly if the source negotiated `ERRD`).
    ErrorData(String),
    /// An echoed input prompt.
    InputPrompt { prompt: String },
    /// A no-echo (password-style) input prompt; the prompt is base64-encoded
    /// by the caller before this is constructed.
    InputPromptNoEcho { prompt_b64: String },
    /// A pass-through invocation delivered to the registering script.
    PassThrough { action: String, p_tag: String, args: Vec<String> },
    /// Final response for one command: the synthesized status line and
    /// success flag. Plain- and JSON-mode shaping both derive from this.
    Complete { status_line: String, success: bool },
}

/// A handle the dispatcher uses to deliver [`SourceOutput`] back to whatever
/// created a task (a peer session, an HTTP session, or the launcher).
#[derive(Debug, Clone)]
pub struct SourceHandle {
    sender: mpsc::UnboundedSender<SourceOutput>,
    pub capabilities: Capabilities,
}

impl SourceHandle {
    pub fn new(sender: mpsc::UnboundedSender<SourceOutput>, capabilities: Capabilities) -> Self {
        SourceHandle { sender, capabilities }
    }

    /// Delivers one piece of output; a closed receiver (source already gone)
    /// is not an error here, since the dispatcher cannot un-send work.
    pub fn send(&self, output: SourceOutput) {
        let _ = self.sender.send(output);
    }
}
