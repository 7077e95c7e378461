//! Full-screen interactive session.
//!
//! A scrollable transcript viewport sits above a single-line input box. The
//! generate call runs on a spawned task and posts its outcome back on a
//! channel; the loop below is the only place the session is mutated.

use super::{label, seed_summary, spinner_frame, timestamp, GREETING};
use crate::conversation::{Conversation, Message, Role};
use crate::error::{ChatError, SessionError};
use crate::llm::ChatBackend;
use crate::session::{PendingRequest, Session};
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

const TICK: Duration = Duration::from_millis(120);

/// Something the loop has to react to.
#[derive(Debug)]
pub enum AppEvent {
    Terminal(Event),
    Reply(Result<String, ChatError>),
    Tick,
}

/// State of the full-screen view.
pub struct App {
    session: Session,
    input: Input,
    /// First transcript row shown in the viewport.
    scroll: u16,
    /// Keep the viewport pinned to the newest message.
    follow: bool,
    /// Transcript viewport height, from the last draw.
    viewport: u16,
    tick: usize,
    model: String,
    endpoint: String,
    seed_note: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(seed: Option<&str>, model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            session: Session::new(seed),
            input: Input::default(),
            scroll: 0,
            follow: true,
            viewport: 0,
            tick: 0,
            model: model.into(),
            endpoint: endpoint.into(),
            seed_note: seed.map(seed_summary),
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Apply one event. Returns the messages to send when a turn starts.
    pub fn handle(&mut self, event: AppEvent) -> Option<Vec<Message>> {
        match event {
            AppEvent::Terminal(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                return self.handle_key(key);
            }
            AppEvent::Terminal(_) => {}
            AppEvent::Reply(outcome) => {
                if let Err(e) = self.session.resolve(outcome) {
                    warn!("Dropping reply: {}", e);
                }
                self.follow = true;
            }
            AppEvent::Tick => {
                self.tick = self.tick.wrapping_add(1);
            }
        }
        None
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Vec<Message>> {
        let half_page = (self.viewport / 2).max(1);
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => return self.submit(),
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(half_page),
            KeyCode::PageDown => self.scroll_down(half_page),
            KeyCode::Home if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.follow = false;
                self.scroll = 0;
            }
            KeyCode::End if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.follow = true;
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
            }
        }
        None
    }

    /// Start a turn with the current input. The text is kept while a
    /// previous request is still pending.
    fn submit(&mut self) -> Option<Vec<Message>> {
        match self.session.submit(self.input.value()) {
            Ok(Some(outgoing)) => {
                self.input.reset();
                self.follow = true;
                Some(outgoing)
            }
            Ok(None) => {
                self.input.reset();
                None
            }
            Err(SessionError::Busy) => {
                debug!("Ignoring submit while a request is pending");
                None
            }
            Err(e) => {
                warn!("Submit failed: {}", e);
                None
            }
        }
    }

    fn scroll_up(&mut self, rows: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(rows);
    }

    fn scroll_down(&mut self, rows: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_add(rows);
    }
}

/// Render the visible conversation, plus a thinking line while pending.
pub fn render_transcript(
    conversation: &Conversation,
    pending: Option<&PendingRequest>,
    tick: usize,
) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for message in conversation.messages() {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.extend(message_lines(message));
    }

    if let Some(pending) = pending {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.push(Line::from(vec![
            Span::styled(timestamp(pending.issued_at()), timestamp_style()),
            Span::raw(" "),
            Span::styled(label(Role::Assistant), speaker_style(Role::Assistant)),
            Span::raw(" "),
            Span::styled(
                format!("thinking {}", spinner_frame(tick)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    Text::from(lines)
}

fn message_lines(message: &Message) -> Vec<Line<'static>> {
    let mut content = message.content().trim_end_matches('\n').lines();
    let first = content.next().unwrap_or_default().to_string();

    let mut lines = vec![Line::from(vec![
        Span::styled(timestamp(message.sent_at()), timestamp_style()),
        Span::raw(" "),
        Span::styled(label(message.role()), speaker_style(message.role())),
        Span::raw(" "),
        Span::styled(first, content_style(message.role())),
    ])];
    lines.extend(
        content.map(|line| Line::styled(line.to_string(), content_style(message.role()))),
    );
    lines
}

fn timestamp_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn speaker_style(role: Role) -> Style {
    let color = match role {
        Role::User => Color::White,
        Role::Assistant => Color::Cyan,
        Role::System => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn content_style(role: Role) -> Style {
    match role {
        Role::System => Style::default().fg(Color::Red),
        _ => Style::default(),
    }
}

/// Run the full-screen session until the user quits.
pub async fn run(backend: Arc<dyn ChatBackend>, seed: Option<&str>, endpoint: &str) -> Result<()> {
    install_panic_hook();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(seed, backend.model(), endpoint);
    let result = run_event_loop(&mut terminal, &mut app, backend).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    backend: Arc<dyn ChatBackend>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut events = EventStream::new();
    let mut ticks = tokio::time::interval(TICK);

    loop {
        terminal.draw(|frame| draw_ui(frame, app))?;

        let event = tokio::select! {
            Some(outcome) = rx.recv() => AppEvent::Reply(outcome),
            event = events.next() => match event {
                Some(Ok(event)) => AppEvent::Terminal(event),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = ticks.tick() => AppEvent::Tick,
        };

        if let Some(outgoing) = app.handle(event) {
            let backend = Arc::clone(&backend);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = backend.generate(&outgoing).await;
                // The receiver is gone once the user has quit.
                let _ = tx.send(outcome);
            });
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// Draw the transcript, input box and status bar.
fn draw_ui(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_transcript(frame, app, chunks[0]);
    draw_input(frame, app, chunks[1]);
    draw_status(frame, app, chunks[2]);
}

fn draw_transcript(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .title(" askpipe ")
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);

    let text = if app.session.conversation().is_empty() && !app.session.is_pending() {
        Text::from(Line::styled(GREETING, Style::default().fg(Color::DarkGray)))
    } else {
        render_transcript(app.session.conversation(), app.session.pending(), app.tick)
    };

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false });
    let total = u16::try_from(paragraph.line_count(inner.width)).unwrap_or(u16::MAX);
    let max_scroll = total.saturating_sub(inner.height);

    app.viewport = inner.height;
    if app.follow || app.scroll >= max_scroll {
        app.scroll = max_scroll;
        app.follow = true;
    }

    frame.render_widget(paragraph.block(block).scroll((app.scroll, 0)), area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let pending = app.session.is_pending();
    let (title, border) = if pending {
        (" waiting for reply ", Color::DarkGray)
    } else {
        (" message ", Color::Cyan)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    // Scroll the input if cursor is beyond visible area
    let input_width = inner_area.width as usize;
    let cursor_pos = app.input.visual_cursor();
    let scroll = if input_width > 0 && cursor_pos >= input_width {
        cursor_pos - input_width + 1
    } else {
        0
    };

    let visible_value: String = app
        .input
        .value()
        .chars()
        .skip(scroll)
        .take(input_width)
        .collect();
    frame.render_widget(
        Paragraph::new(Span::styled(visible_value, Style::default().fg(Color::White))),
        inner_area,
    );

    let cursor_x = inner_area.x + (cursor_pos - scroll) as u16;
    frame.set_cursor_position((cursor_x, inner_area.y));
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(format!(" {} ", app.model), Style::default().fg(Color::Cyan)),
        Span::styled(format!("@ {}", app.endpoint), Style::default().fg(Color::DarkGray)),
    ];
    if let Some(note) = &app.seed_note {
        let note = if app.session.has_preamble() {
            format!("  │ {} (sent with your first message)", note)
        } else {
            format!("  │ {}", note)
        };
        spans.push(Span::styled(note, Style::default().fg(Color::DarkGray)));
    }
    spans.push(Span::styled(
        "  │ Enter send · ↑↓ PgUp/PgDn Ctrl+Home/End scroll · Esc quit",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Restore the terminal before the default panic output is printed.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Terminal(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            assert!(app.handle(key(KeyCode::Char(c))).is_none());
        }
    }

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 16)).unwrap();
        terminal.draw(|frame| draw_ui(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn plain(text: &Text) -> Vec<String> {
        text.lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn test_enter_submits_with_hidden_seed() {
        let mut app = App::new(Some("S"), "qwen2.5-coder", "http://localhost:11434/api/generate");
        type_text(&mut app, "hi");

        let outgoing = app.handle(key(KeyCode::Enter)).unwrap();
        assert_eq!(outgoing.len(), 2);
        assert!(outgoing[0].content().contains('S'));
        assert_eq!(outgoing[1].content(), "hi");
        assert_eq!(app.session.conversation().len(), 1);
        assert!(app.input.value().is_empty());
    }

    #[test]
    fn test_enter_ignored_while_pending() {
        let mut app = App::new(None, "m", "e");
        type_text(&mut app, "first");
        assert!(app.handle(key(KeyCode::Enter)).is_some());

        type_text(&mut app, "second");
        assert!(app.handle(key(KeyCode::Enter)).is_none());
        assert_eq!(app.input.value(), "second");
        assert_eq!(app.session.conversation().len(), 1);

        app.handle(AppEvent::Reply(Ok("answer".to_string())));
        assert!(!app.session.is_pending());
        let outgoing = app.handle(key(KeyCode::Enter)).unwrap();
        assert_eq!(outgoing.last().unwrap().content(), "second");
    }

    #[test]
    fn test_blank_enter_sends_nothing() {
        let mut app = App::new(None, "m", "e");
        type_text(&mut app, "   ");
        assert!(app.handle(key(KeyCode::Enter)).is_none());
        assert!(!app.session.is_pending());
        assert!(app.input.value().is_empty());
    }

    #[test]
    fn test_quit_keys() {
        let mut app = App::new(None, "m", "e");
        app.handle(key(KeyCode::Esc));
        assert!(app.should_quit());

        let mut app = App::new(None, "m", "e");
        app.handle(AppEvent::Terminal(Event::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        ))));
        assert!(app.should_quit());
    }

    #[test]
    fn test_error_reply_is_shown_inline() {
        let mut app = App::new(None, "m", "e");
        type_text(&mut app, "hi");
        app.handle(key(KeyCode::Enter));
        app.handle(AppEvent::Reply(Err(ChatError::Stream("reset by peer".into()))));

        let last = app.session.conversation().last().unwrap();
        assert_eq!(last.role(), Role::System);
        assert!(screen(&mut app).contains("reset by peer"));
    }

    #[test]
    fn test_render_transcript() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));
        conversation.push(Message::assistant("line one\nline two\n"));

        let lines = plain(&render_transcript(&conversation, None, 0));
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("<you> hi"));
        assert!(lines[1].is_empty());
        assert!(lines[2].ends_with("<bot> line one"));
        assert_eq!(lines[3], "line two");
    }

    #[test]
    fn test_screen_shows_thinking_while_pending() {
        let mut app = App::new(Some("a\nb\n"), "qwen2.5-coder", "http://localhost:11434/api/generate");
        assert!(screen(&mut app).contains(GREETING));

        type_text(&mut app, "summarize");
        app.handle(key(KeyCode::Enter));
        let shown = screen(&mut app);
        assert!(shown.contains("<you> summarize"));
        assert!(shown.contains("thinking"));
        assert!(shown.contains("waiting for reply"));
        assert!(!shown.contains("Content to analyze"));

        app.handle(AppEvent::Reply(Ok("two lines".to_string())));
        let shown = screen(&mut app);
        assert!(shown.contains("<bot> two lines"));
        assert!(!shown.contains("thinking"));
    }

    #[test]
    fn test_ctrl_home_and_end_jump() {
        let mut app = App::new(None, "m", "e");
        for i in 0..10 {
            type_text(&mut app, &format!("question {}", i));
            app.handle(key(KeyCode::Enter));
            app.handle(AppEvent::Reply(Ok(format!("answer {}", i))));
        }
        let ctrl = |code| AppEvent::Terminal(Event::Key(KeyEvent::new(code, KeyModifiers::CONTROL)));

        app.handle(ctrl(KeyCode::Home));
        let shown = screen(&mut app);
        assert!(shown.contains("question 0"));
        assert!(!shown.contains("answer 9"));

        app.handle(ctrl(KeyCode::End));
        let shown = screen(&mut app);
        assert!(shown.contains("answer 9"));
        assert!(shown.contains("Ctrl+Home/End"));
    }

    #[test]
    fn test_follow_keeps_newest_message_visible() {
        let mut app = App::new(None, "m", "e");
        for i in 0..10 {
            type_text(&mut app, &format!("question {}", i));
            app.handle(key(KeyCode::Enter));
            app.handle(AppEvent::Reply(Ok(format!("answer {}", i))));
        }
        let shown = screen(&mut app);
        assert!(shown.contains("answer 9"));
        assert!(!shown.contains("question 0"));

        app.handle(key(KeyCode::PageUp));
        app.handle(key(KeyCode::PageUp));
        app.handle(key(KeyCode::PageUp));
        app.handle(key(KeyCode::PageUp));
        let shown = screen(&mut app);
        assert!(!shown.contains("answer 9"));
    }
}
