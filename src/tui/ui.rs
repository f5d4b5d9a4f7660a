//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::bus::Control;
use super::app::{DebuggerApp, CELLS_PER_ROW};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &mut DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(55),
        ])
        .split(frame.area());

    // Left side: code, registers, bus and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(4),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_bus(frame, left_chunks[2], app);
    draw_status(frame, left_chunks[3], app);

    // Right side: memory, step log and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_log(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:03}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw register state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = app.machine.cpu();
    let zero_style = if cpu.regs.flags.zero {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Gray)
    };

    let content = vec![
        Line::from(vec![
            Span::raw("ACC: "),
            Span::styled(format!("{:>3}", cpu.regs.acc), Style::default().fg(Color::White)),
            Span::raw(format!("  ({:08b})", cpu.regs.acc)),
            Span::raw("   Z: "),
            Span::styled(format!("{}", u8::from(cpu.regs.flags.zero)), zero_style),
        ]),
        Line::from(vec![
            Span::raw("PC:  "),
            Span::styled(format!("{:>3}", cpu.regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("   IR: "),
            Span::styled(format!("{:>3}", cpu.regs.ir), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", cpu.state),
                if cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
        Line::from(vec![
            Span::raw("Mode: "),
            Span::styled(
                if app.machine.is_running() { "run" } else { "step" },
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(format!("   Interval: {} ms", app.machine.interval().as_millis())),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the bus lines: live state and the last transfer seen.
fn draw_bus(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let live = app.machine.bus().state();
    let live_style = match live.control {
        Some(Control::Write) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Some(Control::Read) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        Some(Control::Fetch) => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        Some(Control::Out) => Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        None => Style::default().fg(Color::DarkGray),
    };
    let last = app
        .last_transfer
        .borrow()
        .map_or_else(|| "-".to_string(), |s| s.to_string());

    let content = vec![
        Line::from(vec![Span::raw("Live: "), Span::styled(live.to_string(), live_style)]),
        Line::from(vec![
            Span::raw("Last: "),
            Span::styled(last, Style::default().fg(Color::Gray)),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Bus ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view as a grid of cells.
fn draw_memory(frame: &mut Frame, area: Rect, app: &mut DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    app.scroll_to_selection(visible_rows);

    let mem = app.machine.memory().borrow();
    let total_rows = mem.size().div_ceil(CELLS_PER_ROW);
    let start = app.mem_scroll.min(total_rows.saturating_sub(1));
    let end = (start + visible_rows).min(total_rows);
    let pc = app.machine.cpu().regs.pc;
    let bus_addr = app.machine.bus().state().address;

    let items: Vec<ListItem> = (start..end)
        .map(|row| {
            let base = row * CELLS_PER_ROW;
            let mut spans = vec![Span::styled(
                format!("{:03}: ", base),
                Style::default().fg(Color::DarkGray),
            )];

            for addr in base..(base + CELLS_PER_ROW).min(mem.size()) {
                let value = mem.read(addr as i64);
                let mut style = if value != 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                if Some(addr) == bus_addr {
                    style = style.bg(Color::Blue);
                }
                if addr == pc {
                    style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
                }
                if addr == app.selected_addr {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                spans.push(Span::styled(format!("{:3}", value), style));
                spans.push(Span::raw(" "));
            }

            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(format!(" Memory [{}] = {} ", app.selected_addr, mem.read(app.selected_addr as i64)))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw the recent step log.
fn draw_log(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let log = app.log.borrow();
    let items: Vec<ListItem> = log
        .iter()
        .skip(log.len().saturating_sub(visible))
        .map(|entry| ListItem::new(entry.as_str()))
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Steps ")
            .borders(Borders::ALL));

    frame.render_widget(list, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  x: Reset  l: Reload"),
        Line::from("←↑↓→: Select cell  +/-: Edit cell  [/]: Speed  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
