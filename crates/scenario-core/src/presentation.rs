//! Presentation sink port.

/// Receives ready-to-show text. Calls must not block.
pub trait PresentationSink: Send + Sync {
    /// Displays the scenario text.
    fn show_text(&self, text: &str);

    /// Displays a status line in place of the scenario.
    fn show_status(&self, status: &str);

    /// Removes anything previously displayed.
    fn clear(&self);
}
