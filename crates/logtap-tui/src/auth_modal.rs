//! Authentication modal: centred box with a spinner, shown on the alternate
//! screen until credential acquisition finishes.

use async_trait::async_trait;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::future::BoxFuture;
use logtap_feeds::auth::{AuthError, AuthIndicator};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, Clear, Paragraph, Widget, Wrap},
    Terminal,
};
use std::io;
use std::time::Duration;

const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// The modal's content for one frame.
pub struct AuthPopup<'a> {
    message: &'a str,
    tick: usize,
}

impl<'a> AuthPopup<'a> {
    pub fn new(message: &'a str, tick: usize) -> Self {
        Self { message, tick }
    }
}

impl Widget for AuthPopup<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = self
            .message
            .lines()
            .map(|l| l.chars().count() as u16)
            .max()
            .unwrap_or(0)
            .saturating_add(8)
            .max(30);
        let height = self.message.lines().count() as u16 + 4;
        let popup = centered_rect(width, height, area);
        Clear.render(popup, buf);

        let block = Block::bordered()
            .title(" logtap ")
            .border_style(Style::default().add_modifier(Modifier::BOLD));
        let inner = block.inner(popup);
        block.render(popup, buf);

        let spinner = SPINNER[self.tick % SPINNER.len()];
        let mut lines: Vec<Line> = self.message.lines().map(Line::from).collect();
        lines.push(Line::from(""));
        lines.push(Line::from(spinner.to_string()));
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(inner, buf);
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

/// [`AuthIndicator`] that takes over the terminal while it waits.
#[derive(Debug, Default)]
pub struct AuthModal;

impl AuthModal {
    pub fn new() -> Self {
        Self
    }

    /// Redraw on every frame tick until `acquisition` resolves.
    async fn spin<B: Backend>(
        terminal: &mut Terminal<B>,
        message: &str,
        mut acquisition: BoxFuture<'_, Result<(), AuthError>>,
    ) -> Result<(), AuthError> {
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        let mut tick = 0usize;
        loop {
            tokio::select! {
                outcome = &mut acquisition => return outcome,
                _ = ticker.tick() => {
                    if let Err(e) = terminal.draw(|frame| frame.render_widget(AuthPopup::new(message, tick), frame.area())) {
                        tracing::warn!(error = ?e, "auth modal draw failed");
                    }
                    tick = tick.wrapping_add(1);
                }
            }
        }
    }
}

#[async_trait]
impl AuthIndicator for AuthModal {
    async fn block_on(
        &mut self,
        message: &str,
        acquisition: BoxFuture<'_, Result<(), AuthError>>,
    ) -> Result<(), AuthError> {
        let indicator_err = |e: io::Error| AuthError::Indicator(e.to_string());
        enable_raw_mode().map_err(indicator_err)?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(indicator_err(e));
        }
        let mut terminal = match Terminal::new(CrosstermBackend::new(io::stdout())) {
            Ok(t) => t,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                return Err(indicator_err(e));
            }
        };
        tracing::debug!("auth modal shown");

        let outcome = Self::spin(&mut terminal, message, acquisition).await;

        // Always restore terminal, even if acquisition failed
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = terminal.show_cursor();
        tracing::debug!(ok = outcome.is_ok(), "auth modal closed");
        outcome
    }
}
