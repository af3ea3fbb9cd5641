use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::SyncError;

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Verify,
    Expand,
    Dump,
    Repair,
}

impl Phase {
    const ALL: [Phase; 6] = [
        Phase::Resolve,
        Phase::Fetch,
        Phase::Verify,
        Phase::Expand,
        Phase::Dump,
        Phase::Repair,
    ];

    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Verify => "Verify",
            Phase::Expand => "Expand",
            Phase::Dump => "Dump",
            Phase::Repair => "Repair",
        }
    }

    fn index(self) -> usize {
        Phase::ALL
            .iter()
            .position(|phase| *phase == self)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    latency_ms: Option<u128>,
    retries: u32,
    requests: u64,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    started: Instant,
    show_logs: bool,
}

pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<AppState>>,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some(elapsed) = event.elapsed {
                state.latency_ms = Some(elapsed.as_millis());
            } else if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else if message.starts_with("retry") {
                state.retries = state.retries.saturating_add(1);
                state.status = message.clone();
            } else if message == "ncbi.request" {
                state.requests = state.requests.saturating_add(1);
            } else {
                state.status = message.clone();
            }

            let stamp = chrono::Local::now().format("%H:%M:%S");
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(&mut state.logs, format!("[{stamp}] {message}"), LOGS_MAX);
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(AppState {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                latency_ms: None,
                retries: 0,
                requests: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                started: Instant::now(),
                show_logs: false,
            })),
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. `q` or Esc
    /// leaves the view; the worker cannot be cancelled and is abandoned.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, SyncError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        let outcome = loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self.kind, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                handle.join().ok();
                break result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        break Err(miette::Report::msg("aborted"));
                    }
                }
            }

            tick = tick.wrapping_add(1);
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        outcome
    }

    /// Prints a plain summary once the alternate screen is gone.
    pub fn finish(&self, lines: &[String]) -> miette::Result<()> {
        use std::io::Write;
        let mut stdout = io::stdout();
        for line in lines {
            writeln!(stdout, "{line}").into_diagnostic()?;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('l') | KeyCode::F(4) => {
                if let Ok(mut state) = self.state.lock() {
                    state.show_logs = !state.show_logs;
                }
                false
            }
            _ => false,
        }
    }
}

fn draw_ui(frame: &mut ratatui::Frame, kind: ProgressSinkKind, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(kind, tick), chunks[0]);
    if state.show_logs {
        frame.render_widget(draw_logs_view(state), chunks[1]);
    } else {
        frame.render_widget(draw_status_panel(state), chunks[1]);
    }
    let footer = Paragraph::new(Line::from(Span::styled(
        "q/Esc quit   l/F4 toggle logs",
        Style::default().fg(Color::DarkGray),
    )))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn draw_header(kind: ProgressSinkKind, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match kind {
        ProgressSinkKind::Sync => "Sync",
        ProgressSinkKind::Status => "Status",
    };
    Paragraph::new(Line::from(vec![
        Span::styled(
            "NCBI16S-SYNC",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]))
    .alignment(Alignment::Left)
    .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let latency = state
        .latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(phase_track(state.phase)),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(vec![
            Span::styled("Requests: ", Style::default().fg(Color::Gray)),
            Span::raw(state.requests.to_string()),
            Span::styled("   Last download: ", Style::default().fg(Color::Gray)),
            Span::raw(latency),
            Span::styled("   Retries: ", Style::default().fg(Color::Gray)),
            Span::raw(state.retries.to_string()),
        ]),
        Line::from(vec![
            Span::styled("Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev().take(4) {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn phase_track(current: Phase) -> Vec<Span<'static>> {
    let mut spans = vec![Span::styled("Phase: ", Style::default().fg(Color::Gray))];
    for phase in Phase::ALL {
        let style = if phase == current {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if phase.index() < current.index() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(phase.label(), style));
        spans.push(Span::raw(" > "));
    }
    spans.pop();
    spans
}

fn draw_logs_view(state: &AppState) -> Paragraph<'static> {
    let visible = 12usize;
    let start = state.logs.len().saturating_sub(visible);
    let mut lines = vec![Line::from(Span::styled(
        "LOGS",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    for line in state.logs.iter().skip(start) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = Phase::ALL
        .into_iter()
        .find(|phase| phase.label() == name)?;
    Some((phase, payload.trim()))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_messages_are_recognised() {
        assert_eq!(
            parse_phase("phase=Verify; comparing md5"),
            Some((Phase::Verify, "comparing md5"))
        );
        assert_eq!(parse_phase("phase=Bogus; x"), None);
        assert_eq!(parse_phase("ncbi.request"), None);
    }

    #[test]
    fn download_latency_comes_from_elapsed() {
        let tui = Tui::new(ProgressSinkKind::Sync);
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent {
            message: "ncbi.response".to_string(),
            elapsed: Some(Duration::from_millis(1500)),
        });
        let state = tui.state.lock().unwrap();
        assert_eq!(state.latency_ms, Some(1500));
        assert_eq!(state.status, "starting");
    }

    #[test]
    fn progress_updates_state() {
        let tui = Tui::new(ProgressSinkKind::Sync);
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent {
            message: "phase=Fetch; downloading".to_string(),
            elapsed: None,
        });
        sink.event(ProgressEvent {
            message: "retry after corrupted download in /x".to_string(),
            elapsed: None,
        });
        let state = tui.state.lock().unwrap();
        assert_eq!(state.phase, Phase::Fetch);
        assert_eq!(state.retries, 1);
        assert_eq!(state.events.len(), 2);
    }
}
