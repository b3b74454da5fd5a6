//! Prompt contract for the code-generation model.
//!
//! The system prompt pins the model to a JSON-only response shape so the
//! extractor in `extract.rs` has something deterministic to look for. Keep
//! the shape description here in sync with `validate_generated_project`.

use crate::agent::models::FileRecord;

/// Substituted for an empty or missing prompt before the project record is
/// written, so the stored prompt always reflects what was actually sent to
/// the model.
pub const DEFAULT_PROMPT: &str =
    "Build a simple single-page web app that displays a welcome message";

/// System prompt for generating a new project from scratch.
pub const GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert software engineer. Given a request, generate a complete, working, multi-file software project.

Respond ONLY with a valid JSON object in exactly this shape, with no surrounding prose and no markdown fences:

{
  "name": "short-project-name",
  "description": "One sentence describing what the project does",
  "files": [
    {
      "path": "relative/path/to/file",
      "content": "full file content",
      "language": "optional language identifier"
    }
  ]
}

Rules:
- Every file the project needs must appear in "files" with its complete content.
- Paths are relative to the project root. Never use absolute paths or "..".
- The project must be runnable as-is: include entry points, manifests, and configuration.
- If the project serves HTTP, it must listen on port 3000.
- Do not include explanations, comments about your choices, or partial files."#;

/// Build the user-facing portion of a generation request. The caller has
/// already applied [`DEFAULT_PROMPT`] if the request was empty.
pub fn generation_prompt(request: &str) -> String {
    format!("Generate a project for the following request:\n\n{}", request)
}

/// Build a prompt asking the model to modify an existing project. The
/// current files are embedded so the model can produce a coherent revision
/// in the same JSON shape.
pub fn modification_prompt(request: &str, files: &[FileRecord]) -> String {
    let mut out = String::from("Modify the following existing project.\n\nCurrent files:\n");
    for file in files {
        out.push_str(&format!("\n--- {} ---\n{}\n", file.path, file.content));
    }
    out.push_str(&format!(
        "\nRequested change:\n{}\n\nRespond with the complete updated project in the usual JSON shape, including every file (changed or not).",
        request
    ));
    out
}

/// Derive an initial project name from the prompt: the first 100 characters,
/// on a char boundary.
pub fn name_from_prompt(prompt: &str) -> String {
    prompt.chars().take(100).collect()
}
