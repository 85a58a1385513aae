//! Persona prompt rendering.

/// Placeholder replaced with the client's transcript.
pub const TRANSCRIPT_PLACEHOLDER: &str = "{transcript}";

/// Embed `transcript` in the persona `template`.
///
/// Templates without a placeholder get the transcript appended on its own
/// line so the model still sees what was said. Double quotes in the
/// transcript are replaced to keep the quoted span in the template intact.
pub fn render(template: &str, transcript: &str) -> String {
    let transcript = transcript.trim().replace('"', "'");
    if template.contains(TRANSCRIPT_PLACEHOLDER) {
        template.replace(TRANSCRIPT_PLACEHOLDER, &transcript)
    } else {
        format!("{}\n{transcript}", template.trim_end())
    }
}
