use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for a task status
pub fn status_color(status: &str) -> Color {
  match status {
    "completed" => Color::Green,
    "in_progress" | "in-progress" => Color::Yellow,
    "overdue" => Color::Red,
    _ => Color::White,
  }
}

/// Text gauge such as `[######----]  60%`
pub fn progress_bar(progress: f64, width: usize) -> String {
  let progress = progress.clamp(0.0, 100.0);
  let filled = ((progress / 100.0) * width as f64).round() as usize;
  format!(
    "[{}{}] {:>3}%",
    "#".repeat(filled),
    "-".repeat(width - filled),
    progress.round() as u32
  )
}
