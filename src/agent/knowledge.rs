//! Knowledge document loading and system prompt assembly.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Document text used when no knowledge file can be read.
pub const MISSING_DOCUMENT: &str = "Error: Unable to load knowledge document.";

/// Places a relative knowledge path is looked up, in order.
///
/// Relative paths are tried against the working directory, then the
/// executable's directory and its parent.
pub fn candidate_paths(path: &Path) -> Vec<PathBuf> {
    if path.is_absolute() {
        return vec![path.to_path_buf()];
    }

    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(path));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(path));
        if let Some(parent) = exe_dir.parent() {
            candidates.push(parent.join(path));
        }
    }
    candidates.dedup();
    candidates
}

/// Read the first candidate that exists and decodes as text.
///
/// Falls back to [`MISSING_DOCUMENT`] so the assistant can still answer,
/// telling users it lacks its reference material.
pub fn load_document(candidates: &[PathBuf]) -> String {
    for candidate in candidates {
        if !candidate.exists() {
            continue;
        }
        match std::fs::read_to_string(candidate) {
            Ok(text) => {
                info!(
                    path = %candidate.display(),
                    chars = text.chars().count(),
                    "Knowledge document loaded"
                );
                return text;
            }
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "Failed to read knowledge document");
            }
        }
    }

    warn!(candidates = ?candidates, "Unable to load knowledge document from any candidate path");
    MISSING_DOCUMENT.to_string()
}

/// Build the system prompt for a brand from its knowledge document.
pub fn system_prompt(brand: &str, document: &str) -> String {
    format!(
        "You are a professional and friendly customer service agent for {brand}.\n\
         \n\
         Here is the information about {brand} extracted from our documentation:\n\
         \n\
         {document}\n\
         \n\
         Answer customer questions clearly, concisely and helpfully based solely on the \
         information above. If you don't know the answer, say so politely and suggest \
         contacting customer service directly."
    )
}
