//! Full-screen session runtime
//!
//! Owns the terminal, the key map and the event loop. Work items requested
//! by the [`SessionDriver`] run on spawned tasks and report back over a
//! channel, so the screen keeps redrawing and reacting to keys while a
//! request is outstanding. Quitting leaves any in-flight task detached; its
//! result is dropped.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use tokio::sync::mpsc::unbounded_channel;

use super::driver::{
    Action, Effect, Outcome, Phase, SessionDriver, SessionSummary, StatusLevel, recv_progress,
};
use crate::infrastructure::open_in_browser;

const TICK: Duration = Duration::from_millis(250);
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];
const HELP: &str = "q quit  ↑/↓ scroll  PgUp/PgDn page  End follow  f toggle follow  o open in browser";

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Maps a key press to a session action
#[must_use]
pub fn action_for_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::ScrollUp(1)),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::ScrollDown(1)),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown | KeyCode::Char(' ') => Some(Action::PageDown),
        KeyCode::Home | KeyCode::Char('g') => Some(Action::JumpToTop),
        KeyCode::End | KeyCode::Char('G') => Some(Action::JumpToBottom),
        KeyCode::Char('f') => Some(Action::ToggleFollow),
        KeyCode::Char('o') => Some(Action::OpenInBrowser),
        _ => None,
    }
}

/// Runs the session in the alternate screen until the user quits
///
/// The terminal is restored on every exit path, including panics.
///
/// # Errors
///
/// Returns an error if the terminal cannot be set up or read from.
pub async fn run_tui(mut driver: SessionDriver) -> Result<SessionSummary> {
    install_panic_hook();
    let mut terminal = setup_terminal().context("Failed to initialize terminal")?;

    let result = event_loop(&mut terminal, &mut driver).await;
    let restored = restore_terminal(&mut terminal).context("Failed to restore terminal");

    result?;
    restored?;
    Ok(driver.summary())
}

async fn event_loop(terminal: &mut Term, driver: &mut SessionDriver) -> Result<()> {
    let (outcome_tx, mut outcomes) = unbounded_channel::<Outcome>();
    let mut progress = driver.progress_channel();
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(TICK);
    let mut tick: usize = 0;

    loop {
        if driver.is_quit() {
            return Ok(());
        }
        if let Some(work) = driver.next_work() {
            let tx = outcome_tx.clone();
            tokio::spawn(async move {
                // The receiver is gone once the session has ended.
                let _ = tx.send(work.run().await);
            });
        }

        terminal.draw(|frame| render(frame, driver, tick))?;

        tokio::select! {
            Some(outcome) = outcomes.recv() => driver.on_outcome(outcome),
            Some(stage) = recv_progress(&mut progress) => {
                driver.on_outcome(Outcome::Progress(stage));
            }
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(action) = action_for_key(key) {
                        if let Some(effect) = driver.on_action(action) {
                            perform_effect(driver, &effect);
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => return Ok(()),
            },
            _ = ticker.tick() => tick = tick.wrapping_add(1),
        }
    }
}

fn perform_effect(driver: &mut SessionDriver, effect: &Effect) {
    let result = match effect {
        Effect::OpenBrowser(url) => open_in_browser(url).map_err(|e| e.to_string()),
    };
    driver.on_effect_result(effect, result);
}

fn render(frame: &mut Frame, driver: &mut SessionDriver, tick: usize) {
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    frame.render_widget(header(driver, tick), header_area);

    let inner_height = usize::from(body_area.height.saturating_sub(2));
    driver.view_mut().set_viewport(inner_height);
    let view = driver.view();
    let lines: Vec<Line> = view
        .visible_lines()
        .iter()
        .map(|line| Line::raw(line.as_str()))
        .collect();
    let title = if view.is_following() {
        " Console (following) ".to_string()
    } else {
        format!(" Console (line {}/{}) ", view.offset() + 1, view.line_count())
    };
    let body = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(body, body_area);

    frame.render_widget(footer(driver), footer_area);
}

fn header(driver: &SessionDriver, tick: usize) -> Paragraph<'static> {
    let (label, color) = match driver.phase() {
        Phase::AwaitingBuildUrl => ("STARTING", Color::Yellow),
        Phase::Streaming => ("RUNNING", Color::Cyan),
        Phase::Done => ("FINISHED", Color::Green),
        Phase::Failed => ("FAILED", Color::Red),
        Phase::Quit => ("QUIT", Color::DarkGray),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {label} "),
            Style::default()
                .fg(Color::Black)
                .bg(color)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} ", driver.title())),
    ];
    if driver.is_busy() {
        spans.push(Span::raw(SPINNER[tick % SPINNER.len()]));
    }
    match (driver.build(), driver.stage()) {
        (Some(build), _) => spans.push(Span::styled(
            format!("  {}", build.url()),
            Style::default().fg(Color::DarkGray),
        )),
        (None, Some(stage)) => spans.push(Span::raw(format!("  {stage}"))),
        (None, None) => {}
    }

    Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(" jcli "))
}

fn footer(driver: &SessionDriver) -> Paragraph<'static> {
    match driver.status() {
        Some(status) => {
            let color = match status.level {
                StatusLevel::Info => Color::Green,
                StatusLevel::Warning => Color::Yellow,
                StatusLevel::Error => Color::Red,
            };
            Paragraph::new(Line::from(Span::styled(
                status.message.clone(),
                Style::default().fg(color),
            )))
        }
        None => Paragraph::new(Line::from(Span::styled(
            HELP,
            Style::default().fg(Color::DarkGray),
        ))),
    }
}

fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = disable_raw_mode() {
            eprintln!("Failed to disable raw mode during panic: {e}");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen) {
            eprintln!("Failed to leave alternate screen during panic: {e}");
        }
        original_hook(panic_info);
    }));
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(action_for_key(key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(action_for_key(key(KeyCode::Esc)), Some(Action::Quit));
        assert_eq!(
            action_for_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
        assert_eq!(action_for_key(key(KeyCode::Char('c'))), None);
    }

    #[test]
    fn test_scroll_keys() {
        assert_eq!(action_for_key(key(KeyCode::Up)), Some(Action::ScrollUp(1)));
        assert_eq!(action_for_key(key(KeyCode::Char('j'))), Some(Action::ScrollDown(1)));
        assert_eq!(action_for_key(key(KeyCode::PageUp)), Some(Action::PageUp));
        assert_eq!(action_for_key(key(KeyCode::End)), Some(Action::JumpToBottom));
        assert_eq!(action_for_key(key(KeyCode::Char('G'))), Some(Action::JumpToBottom));
    }

    #[test]
    fn test_follow_and_browser_keys() {
        assert_eq!(action_for_key(key(KeyCode::Char('f'))), Some(Action::ToggleFollow));
        assert_eq!(action_for_key(key(KeyCode::Char('o'))), Some(Action::OpenInBrowser));
        assert_eq!(action_for_key(key(KeyCode::Char('x'))), None);
    }
}
