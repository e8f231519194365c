//! Cleanup of raw generator output.

/// Turns a raw generator response into display text.
///
/// Removes every literal occurrence of `prompt` (the endpoint echoes it),
/// turns escaped `\n` / `\r\n` sequences into real line breaks, and trims the
/// result. The prompt match is exact: an echo with different casing or
/// whitespace is left in place.
#[must_use]
pub fn clean_generated_text(raw: &str, prompt: &str) -> String {
    let without_prompt = if prompt.is_empty() {
        raw.to_owned()
    } else {
        raw.replace(prompt, "")
    };
    without_prompt
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .trim()
        .to_owned()
}
