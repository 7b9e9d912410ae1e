use crate::api::Employee;
use crate::ui::renderfns::truncate;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_employee_list(
  frame: &mut Frame,
  area: Rect,
  employees: &[&Employee],
  selected: usize,
  loading: bool,
) {
  let title = if loading {
    " Employees (loading...) ".to_string()
  } else {
    format!(" Employees ({}) ", employees.len())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if employees.is_empty() && !loading {
    let paragraph = Paragraph::new("No employees found.")
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = employees
    .iter()
    .map(|employee| {
      let line = Line::from(vec![
        Span::styled(
          format!("{:<8}", truncate(&employee.id, 8)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(" "),
        Span::styled(
          format!("{:<11}", truncate(&employee.role, 11)),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw(" "),
        Span::raw(format!("{:<24}", truncate(&employee.name, 24))),
        Span::styled(employee.email.as_str(), Style::default().fg(Color::DarkGray)),
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
