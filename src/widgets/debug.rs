use ratatui::{
    buffer::Buffer,
    layout::Rect,
    widgets::{Paragraph, Widget},
};

/// One-line counters shown with `--debug`.
#[derive(Debug, Default)]
pub struct DebugState {
    pub enabled: bool,
    pub num_events: usize,
    pub num_frames: usize,
    pub num_key_events: usize,
    /// Render passes (one per state-changing interaction).
    pub num_passes: usize,
    pub last_key_event_name: String,
    pub last_action: String,
    /// Wall time of the last pass in microseconds.
    pub last_pass_micros: u128,
}

impl DebugState {
    pub fn on_key(&mut self, event: &crossterm::event::KeyEvent) {
        self.num_key_events += 1;
        self.last_key_event_name = format!("{:?}", event.code);
    }

    pub fn on_pass(&mut self, action: &str, micros: u128) {
        self.num_passes += 1;
        self.last_action = action.to_string();
        self.last_pass_micros = micros;
    }
}

impl Widget for &DebugState {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(format!(
            "events={} keys={} last_key={} passes={} last_action={} pass_us={} frames={}",
            self.num_events,
            self.num_key_events,
            self.last_key_event_name,
            self.num_passes,
            self.last_action,
            self.last_pass_micros,
            self.num_frames,
        ))
        .render(area, buf);
    }
}
