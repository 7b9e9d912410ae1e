use crate::kpi::KpiSummary;
use crate::ui::renderfns::progress_bar;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

pub fn draw_dashboard(frame: &mut Frame, area: Rect, summary: Option<&KpiSummary>, loading: bool) {
  let title = if loading {
    " Dashboard (loading...) "
  } else {
    " Dashboard "
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let Some(summary) = summary else {
    let content = if loading { "" } else { "No data loaded." };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  };

  let tasks = &summary.tasks;
  let perf = &summary.performance;

  let lines = vec![
    section("Tasks"),
    metric("Total", tasks.total.to_string(), Color::White),
    metric("Completed", tasks.completed.to_string(), Color::Green),
    metric("In progress", tasks.in_progress.to_string(), Color::Yellow),
    metric("Pending", tasks.pending.to_string(), Color::White),
    metric("Overdue", tasks.overdue.to_string(), Color::Red),
    metric("Completion", format!("{}%", tasks.completion_rate), Color::Cyan),
    Line::raw(""),
    section("Team"),
    metric("Employees", summary.employees.to_string(), Color::White),
    Line::raw(""),
    section("Performance"),
    metric(
      "Avg progress",
      progress_bar(perf.average_progress as f64, 20),
      Color::Cyan,
    ),
    metric(
      "On time",
      progress_bar(perf.on_time_delivery as f64, 20),
      Color::Green,
    ),
    metric(
      "Productivity",
      progress_bar(perf.productivity as f64, 20),
      Color::Yellow,
    ),
  ];

  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn section(name: &str) -> Line<'static> {
  Line::from(Span::styled(
    format!(" {}", name),
    Style::default().fg(Color::Blue).bold(),
  ))
}

fn metric(label: &str, value: String, color: Color) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("   {:<14}", label), Style::default().fg(Color::DarkGray)),
    Span::styled(value, Style::default().fg(color)),
  ])
}
