use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
    Frame,
};

use reactnow::{
    clock::Clock,
    game::{Phase, Snapshot},
};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

const LIGHT_ON: &str = "●";
const LIGHT_OFF: &str = "○";

pub fn draw<K: Clock + 'static>(app: &App<K>, f: &mut Frame) {
    f.render_widget(app, f.area());
}

fn light_row(snapshot: &Snapshot) -> Line<'static> {
    let on = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
    let off = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::DIM);

    let mut spans = Vec::with_capacity(snapshot.lights.len() * 2);
    for (idx, lit) in snapshot.lights.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(if *lit {
            Span::styled(LIGHT_ON, on)
        } else {
            Span::styled(LIGHT_OFF, off)
        });
    }
    Line::from(spans)
}

fn body_lines(snapshot: &Snapshot) -> Vec<Line<'static>> {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);

    match snapshot.phase {
        Phase::Ready => vec![Line::from(Span::styled("Press (s) to start", bold_style))],
        Phase::Signaling => vec![light_row(snapshot)],
        Phase::Waiting => vec![
            light_row(snapshot),
            Line::default(),
            Line::from(Span::styled("Get Ready...", bold_style)),
        ],
        Phase::TapNow => vec![
            Line::from(Span::styled("Tap Now!", red_bold_style)),
            Line::default(),
            Line::from("🏁"),
        ],
        Phase::Result => {
            // whole milliseconds, truncated
            let millis = snapshot.reaction_millis.unwrap_or_default().max(0.0) as u64;
            vec![
                Line::from(Span::styled("Your reaction time:", bold_style)),
                Line::default(),
                Line::from(Span::styled(format!("{millis} ms"), red_bold_style)),
            ]
        }
    }
}

fn legend(phase: Phase) -> &'static str {
    match phase {
        Phase::Ready => "(s)tart / (esc)ape",
        Phase::Signaling | Phase::Waiting | Phase::TapNow => "(space) tap / (r)eset / (esc)ape",
        Phase::Result => "(s) play again / (r)eset / (esc)ape",
    }
}

impl<K: Clock + 'static> Widget for &App<K> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let snapshot = self.game.snapshot();
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Length(1), // tagline
                Constraint::Min(1),    // game
                Constraint::Length(1), // legend
            ])
            .split(area);

        Paragraph::new(Span::styled(
            "ReactNow",
            Style::default().add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

        Paragraph::new(Span::styled(
            "Lights Out and Away We Go!",
            italic_style.fg(Color::Gray),
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        let body = body_lines(&snapshot);
        let top_padding = (chunks[2].height as usize).saturating_sub(body.len()) / 2;
        let mut lines = vec![Line::default(); top_padding];
        lines.extend(body);

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[2], buf);

        Paragraph::new(Span::styled(legend(snapshot.phase), italic_style))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }
}
