use crate::api::Task;
use crate::ui::renderfns::{progress_bar, status_color, truncate};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_task_list(
  frame: &mut Frame,
  area: Rect,
  tasks: &[&Task],
  selected: usize,
  filter: &str,
  status: Option<&str>,
  loading: bool,
) {
  let status = status.map(|s| format!(" [{}]", s)).unwrap_or_default();
  let title = if loading {
    " Tasks (loading...) ".to_string()
  } else if filter.is_empty() {
    format!(" Tasks{} ({}) ", status, tasks.len())
  } else {
    format!(" Tasks{} /{} ({}) ", status, filter, tasks.len())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if tasks.is_empty() && !loading {
    let paragraph = Paragraph::new("No tasks found.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = tasks
    .iter()
    .map(|task| {
      let line = Line::from(vec![
        Span::styled(format!("{:<8}", truncate(&task.id, 8)), Style::default().fg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(
          format!("{:<12}", truncate(&task.status, 12)),
          Style::default().fg(status_color(&task.status)),
        ),
        Span::raw(" "),
        Span::raw(progress_bar(task.progress, 10)),
        Span::raw(" "),
        Span::styled(
          format!("{:<11}", task.due_date.as_deref().unwrap_or("-")),
          Style::default().fg(Color::DarkGray),
        ),
        Span::raw(truncate(task.label(), 50)),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}
