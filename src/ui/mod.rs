mod components;
mod renderfns;
mod views;

use crate::app::{App, Mode, StatusKind, ViewState};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Breadcrumb
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let user = app.user_email();
  renderfns::draw_header(frame, chunks[0], app.title(), user.as_deref(), app.role());

  // Draw current view
  if let Some(view) = app.current_view() {
    match view {
      ViewState::TaskList {
        tasks,
        selected,
        loading,
      } => {
        let visible = app.visible_tasks(tasks);
        views::tasks::draw_task_list(
          frame,
          chunks[1],
          &visible,
          *selected,
          app.search_filter(),
          app.status_filter(),
          *loading,
        );
      }
      ViewState::EmployeeList {
        employees,
        selected,
        loading,
      } => {
        let visible = app.visible_employees(employees);
        views::employees::draw_employee_list(frame, chunks[1], &visible, *selected, *loading);
      }
      ViewState::Dashboard { summary, loading } => {
        views::dashboard::draw_dashboard(frame, chunks[1], summary.as_ref(), *loading);
      }
      ViewState::TaskDetail {
        task,
        entries,
        loading,
      } => {
        views::task_detail::draw_task_detail(frame, chunks[1], task, entries, *loading);
      }
    }
  }

  if *app.mode() == Mode::Command {
    components::draw_command_overlay(
      frame,
      chunks[1],
      app.command_input(),
      &app.autocomplete_suggestions(),
      app.selected_suggestion(),
    );
  }

  renderfns::draw_footer(frame, chunks[2], &app.view_breadcrumb(), app.is_busy());
  draw_status_bar(frame, chunks[3], app);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match (app.mode(), app.status()) {
    (Mode::Search, _) => {
      let search = format!("/{}", app.search_filter());
      (search, Style::default().fg(Color::Cyan))
    }
    (Mode::Command, _) => {
      let cmd = format!(":{}", app.command_input());
      (cmd, Style::default().fg(Color::Yellow))
    }
    (Mode::Note, _) => {
      let note = format!("note: {}", app.note_input());
      (note, Style::default().fg(Color::Cyan))
    }
    (Mode::Confirm, _) => {
      let prompt = app.pending_delete().map(|p| p.prompt()).unwrap_or_default();
      (format!(" {}", prompt), Style::default().fg(Color::Yellow))
    }
    (Mode::Normal, Some(status)) => {
      let color = match status.kind {
        StatusKind::Success => Color::Green,
        StatusKind::Error => Color::Red,
      };
      (format!(" {}", status.text), Style::default().fg(color))
    }
    (Mode::Normal, None) => {
      let hint =
        " :command  /filter  f:status  j/k:nav  Enter:open  d:delete  r:refresh  q:back  Ctrl-C:quit";
      (hint.to_string(), Style::default().fg(Color::DarkGray))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
