use crate::api::{ProgressEntry, Task};
use crate::ui::renderfns::{progress_bar, status_color};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};

pub fn draw_task_detail(
  frame: &mut Frame,
  area: Rect,
  task: &Task,
  entries: &[ProgressEntry],
  loading: bool,
) {
  let title = if loading {
    format!(" {} (loading...) ", task.id)
  } else {
    format!(" {} ", task.id)
  };

  let block = Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let inner = block.inner(area);
  frame.render_widget(block, area);

  // Layout for task details
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(5), // Header (title, status, dates)
      Constraint::Length(3), // Description
      Constraint::Length(1), // Separator
      Constraint::Min(1),    // Progress history
    ])
    .split(inner);

  let header = vec![
    Line::from(vec![
      Span::styled("Title: ", Style::default().fg(Color::DarkGray)),
      Span::raw(task.label()),
    ]),
    Line::from(vec![
      Span::styled("Status: ", Style::default().fg(Color::DarkGray)),
      Span::styled(&task.status, Style::default().fg(status_color(&task.status))),
      Span::raw("  "),
      Span::styled("Assignee: ", Style::default().fg(Color::DarkGray)),
      Span::raw(
        task
          .employee_name
          .as_deref()
          .unwrap_or(task.employee_id.as_str()),
      ),
    ]),
    Line::from(vec![
      Span::styled("Due: ", Style::default().fg(Color::DarkGray)),
      Span::raw(task.due_date.as_deref().unwrap_or("-")),
      Span::raw("  "),
      Span::styled("Updated: ", Style::default().fg(Color::DarkGray)),
      Span::raw(task.updated().unwrap_or("-")),
    ]),
    Line::from(vec![
      Span::styled("Progress: ", Style::default().fg(Color::DarkGray)),
      Span::styled(progress_bar(task.progress, 20), Style::default().fg(Color::Cyan)),
      Span::styled("  +/- progress  s:status  n:note", Style::default().fg(Color::DarkGray)),
    ]),
  ];
  frame.render_widget(Paragraph::new(header), chunks[0]);

  let desc = if task.description.is_empty() {
    "No description"
  } else {
    task.description.as_str()
  };
  frame.render_widget(Paragraph::new(desc).wrap(Wrap { trim: true }), chunks[1]);

  let sep = Paragraph::new("─".repeat(chunks[2].width as usize))
    .style(Style::default().fg(Color::DarkGray));
  frame.render_widget(sep, chunks[2]);

  if entries.is_empty() {
    let text = if loading {
      "Loading progress history..."
    } else {
      "No progress entries."
    };
    let paragraph = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, chunks[3]);
    return;
  }

  let items: Vec<ListItem> = entries
    .iter()
    .map(|entry| {
      ListItem::new(Line::from(vec![
        Span::styled(
          format!("{:<22}", entry.recorded().unwrap_or("-")),
          Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
          format!("{:<12}", entry.status.as_deref().unwrap_or("")),
          Style::default().fg(status_color(entry.status.as_deref().unwrap_or(""))),
        ),
        Span::styled(format!("{:>4}%  ", entry.progress.round() as i64), Style::default().fg(Color::Cyan)),
        Span::raw(entry.notes.as_deref().unwrap_or("")),
      ]))
    })
    .collect();

  frame.render_widget(List::new(items), chunks[3]);
}
