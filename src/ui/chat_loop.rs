//! Full-screen chat loop.
//!
//! One turn is in flight at a time: the prompt is handed to the backend on
//! a spawned task, input stays disabled until the complete reply (or the
//! error) comes back over the channel, and the transcript is re-rendered.

use std::error::Error;
use std::io;
use std::time::Duration;

use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;

use crate::backend::{BackendConfig, BackendKind, ResponseGenerator};
use crate::core::config::Config;
use crate::core::message::{Message, Role};
use crate::core::session::SessionContext;
use crate::utils::logging::LoggingState;

enum TurnOutcome {
    Reply(String),
    Failed(String),
}

struct ChatApp {
    session: SessionContext,
    config: Config,
    logging: LoggingState,
    input: String,
    scroll_offset: u16,
    auto_scroll: bool,
    awaiting_reply: bool,
}

impl ChatApp {
    fn new(session: SessionContext, config: Config, logging: LoggingState) -> Self {
        Self {
            session,
            config,
            logging,
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            awaiting_reply: false,
        }
    }

    fn build_display_lines(&self) -> Vec<Line> {
        let mut lines = Vec::new();

        for msg in self.session.history() {
            match msg.role {
                Role::User => {
                    lines.push(Line::from(vec![
                        Span::styled(
                            "You: ",
                            Style::default()
                                .fg(Color::Cyan)
                                .add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(&msg.content, Style::default().fg(Color::Cyan)),
                    ]));
                    lines.push(Line::from(""));
                }
                Role::Assistant => {
                    if msg.content.is_empty() {
                        continue;
                    }
                    for content_line in msg.content.lines() {
                        if content_line.trim().is_empty() {
                            lines.push(Line::from(""));
                        } else {
                            lines.push(Line::from(Span::styled(
                                content_line,
                                Style::default().fg(Color::White),
                            )));
                        }
                    }
                    lines.push(Line::from(""));
                }
                Role::AppInfo => {
                    lines.push(Line::from(Span::styled(
                        &msg.content,
                        Style::default().fg(Color::DarkGray),
                    )));
                    lines.push(Line::from(""));
                }
                Role::AppWarning => {
                    lines.push(Line::from(Span::styled(
                        &msg.content,
                        Style::default().fg(Color::Yellow),
                    )));
                    lines.push(Line::from(""));
                }
                Role::AppError => {
                    for content_line in msg.content.lines() {
                        lines.push(Line::from(Span::styled(
                            content_line,
                            Style::default().fg(Color::Red),
                        )));
                    }
                    lines.push(Line::from(""));
                }
            }
        }

        if self.awaiting_reply {
            lines.push(Line::from(Span::styled(
                "…",
                Style::default().fg(Color::DarkGray),
            )));
        }

        lines
    }

    fn max_scroll_offset(&self, available_height: u16) -> u16 {
        let total_lines = self.build_display_lines().len() as u16;
        total_lines.saturating_sub(available_height)
    }

    fn scroll_up(&mut self, amount: u16, available_height: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
        self.auto_scroll = self.scroll_offset >= self.max_scroll_offset(available_height);
    }

    fn scroll_down(&mut self, amount: u16, available_height: u16) {
        let max_scroll = self.max_scroll_offset(available_height);
        self.scroll_offset = self.scroll_offset.saturating_add(amount).min(max_scroll);
        self.auto_scroll = self.scroll_offset >= max_scroll;
    }

    fn submit(&mut self, tx: &mpsc::UnboundedSender<TurnOutcome>) {
        if self.awaiting_reply || self.input.trim().is_empty() {
            return;
        }
        let prompt = std::mem::take(&mut self.input).trim().to_string();
        let _ = self.logging.log_message(&format!("You: {prompt}"));

        let turn = self.session.begin_turn(&prompt);
        self.awaiting_reply = true;
        self.auto_scroll = true;

        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = match turn.generator.generate(&turn.prompt, &turn.history).await {
                Ok(reply) => TurnOutcome::Reply(reply),
                Err(e) => TurnOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(outcome);
        });
    }

    /// Swap the live backend mid-session: `/backend <name>` rebuilds the
    /// adapter from persisted config and the environment; a bare
    /// `/backend` reports the current one. Switching kinds clears the
    /// conversation, exactly like relaunching with `-b`.
    async fn switch_backend_command(&mut self, name: &str) {
        if name.is_empty() {
            self.session.push_notice(Message::app_info(format!(
                "Current backend: {}",
                self.session.kind().display_name()
            )));
            return;
        }

        let resolved = self.config.resolve_backend(Some(name), None, None, None);
        match resolved {
            Ok((kind, backend_config)) => {
                let switched_kind = kind != self.session.kind();
                match self.session.switch_backend(kind, &backend_config).await {
                    Ok(()) => {
                        let notice = if switched_kind {
                            format!(
                                "Switched to the {} backend; history cleared",
                                kind.display_name()
                            )
                        } else {
                            format!("Reconnected the {} backend", kind.display_name())
                        };
                        self.session.push_notice(Message::app_info(notice));
                    }
                    Err(e) => self.session.push_notice(Message::app_error(e.to_string())),
                }
            }
            Err(e) => self.session.push_notice(Message::app_error(e.to_string())),
        }
        self.auto_scroll = true;
    }

    fn finish_turn(&mut self, outcome: TurnOutcome, available_height: u16) {
        self.awaiting_reply = false;
        match outcome {
            TurnOutcome::Reply(reply) => {
                let _ = self.logging.log_message(&reply);
                self.session.complete_turn(reply);
            }
            TurnOutcome::Failed(error) => {
                self.session.push_notice(Message::app_error(error));
            }
        }
        if self.auto_scroll {
            self.scroll_offset = self.max_scroll_offset(available_height);
        }
    }
}

fn ui(f: &mut Frame, app: &ChatApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let lines = app.build_display_lines();

    let available_height = chunks[0].height.saturating_sub(1);
    let total_lines = lines.len() as u16;
    let max_offset = total_lines.saturating_sub(available_height);
    let scroll_offset = app.scroll_offset.min(max_offset);

    let title = format!("Chat - Chameleon ({})", app.session.kind().display_name());
    let messages_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(messages_paragraph, chunks[0]);

    let input_style = if app.awaiting_reply {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let input_title = if app.awaiting_reply {
        "Waiting for reply… (Ctrl+C to quit)".to_string()
    } else if app.logging.is_active() {
        format!(
            "Type your message ({}; Enter to send, Ctrl+C to quit)",
            app.logging.status_string()
        )
    } else {
        "Type your message (Press Enter to send, Ctrl+C to quit)".to_string()
    };

    let input = Paragraph::new(app.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title))
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[1]);

    if !app.awaiting_reply {
        f.set_cursor_position((chunks[1].x + app.input.len() as u16 + 1, chunks[1].y + 1));
    }
}

fn available_height(terminal: &Terminal<CrosstermBackend<io::Stdout>>) -> u16 {
    // Input area takes 3 rows, the transcript title takes 1.
    terminal
        .size()
        .map(|size| size.height)
        .unwrap_or_default()
        .saturating_sub(4)
}

async fn chat_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: ChatApp,
) -> Result<(), Box<dyn Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<TurnOutcome>();

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Enter => {
                        let entered = app.input.trim().to_string();
                        if entered == "/backend" || entered.starts_with("/backend ") {
                            if !app.awaiting_reply {
                                app.input.clear();
                                let name = entered["/backend".len()..].trim().to_string();
                                // Construction blocks the loop; an Ollama
                                // pull can take a while and that is the
                                // documented cost of switching.
                                app.switch_backend_command(&name).await;
                            }
                        } else {
                            app.submit(&tx);
                        }
                    }
                    KeyCode::Char(c) => {
                        if !app.awaiting_reply {
                            app.input.push(c);
                        }
                    }
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Up => {
                        let height = available_height(terminal);
                        app.scroll_up(1, height);
                    }
                    KeyCode::Down => {
                        let height = available_height(terminal);
                        app.scroll_down(1, height);
                    }
                    _ => {}
                },
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        let height = available_height(terminal);
                        app.scroll_up(3, height);
                    }
                    MouseEventKind::ScrollDown => {
                        let height = available_height(terminal);
                        app.scroll_down(3, height);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        while let Ok(outcome) = rx.try_recv() {
            let height = available_height(terminal);
            app.finish_turn(outcome, height);
        }
    }
}

/// Construct the session, then run the interactive loop until Ctrl+C.
///
/// The session (and with it the backend adapter) is built before the
/// terminal enters raw mode, so configuration errors print normally.
pub async fn run_chat(
    kind: BackendKind,
    backend_config: BackendConfig,
    log_file: Option<String>,
    config: Config,
) -> Result<(), Box<dyn Error>> {
    let session = SessionContext::new(kind, &backend_config).await?;
    let logging = LoggingState::new(log_file)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = chat_loop(&mut terminal, ChatApp::new(session, config, logging)).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
