//! Reading pairing state out of the upload tool's text output.
//!
//! The tool offers no structured status, so these substrings are the whole
//! contract. Nothing outside this module looks at raw tool output.

use crate::remote::CommandOutput;

/// Output that means the tool wants a fresh one-time code.
pub const CODE_PROMPT_SIGNATURES: [&str; 2] = ["Enter one-time code", "Code has the wrong length"];

/// Output that means a submitted code was rejected.
pub const INVALID_CODE_SIGNATURE: &str = "Invalid code";

/// What a tool run tells us about the pairing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSignal {
    /// The document reached the device
    Uploaded,
    /// The tool is not paired and asked for a code
    NeedsCode,
    /// The code was rejected
    InvalidCode,
    /// Anything else
    Failed,
}

fn prompts_for_code(output: &CommandOutput) -> bool {
    CODE_PROMPT_SIGNATURES
        .iter()
        .any(|sig| output.output.contains(sig))
}

fn rejects_code(output: &CommandOutput) -> bool {
    output.output.contains(INVALID_CODE_SIGNATURE)
}

/// Classify an upload attempted without a code.
///
/// A code prompt wins over the exit status.
pub fn classify_attempt(upload: &CommandOutput) -> ToolSignal {
    if prompts_for_code(upload) {
        ToolSignal::NeedsCode
    } else if upload.success() {
        ToolSignal::Uploaded
    } else {
        ToolSignal::Failed
    }
}

/// Classify a registration followed by a retried upload.
pub fn classify_submission(register: &CommandOutput, upload: &CommandOutput) -> ToolSignal {
    if upload.success() {
        ToolSignal::Uploaded
    } else if rejects_code(register) || rejects_code(upload) {
        ToolSignal::InvalidCode
    } else {
        ToolSignal::Failed
    }
}
