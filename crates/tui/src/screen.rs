use std::time::Instant;

use dbconsole_core::api::ConnectorApi;
use dbconsole_core::bootstrap::{ActiveView, ApplicationContext, CloudField};
use dbconsole_core::cloud_monitor::{Badge, MonitoringSnapshot};
use dbconsole_core::cloud_wizard::{CloudConnectionForm, CloudStatus, ProviderInfo};
use dbconsole_core::connection_manager::ConnectionState;
use dbconsole_core::controls::ControlId;
use dbconsole_core::forms::{DbType, FormFields, CONNECTION_FIELDS, FIELD_DB_TYPE, FIELD_PASSWORD};
use dbconsole_core::log_store::{LogEntry, LogLevel};
use dbconsole_core::notifications::{Severity, Toast};
use dbconsole_core::profiles::ConnectionProfile;
use dbconsole_core::query_runner::QueryView;
use dbconsole_core::schema_explorer::{TreeLine, TreeNodeKind};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Frame;

use crate::input::{
    cloud_field_label, cloud_field_value, CloudRow, UiState, CLOUD_ROWS, DRIVER_FIELDS,
};

const LOG_TAIL: usize = 200;
const TOAST_WIDTH: u16 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ControlState {
    pub(crate) id: ControlId,
    pub(crate) enabled: bool,
    pub(crate) busy: bool,
}

/// Everything one frame needs, copied out of the context so neither key
/// handling nor drawing holds a component lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) view: ActiveView,
    pub(crate) session: ConnectionState,
    pub(crate) fields: FormFields,
    pub(crate) db_types: Vec<(DbType, String)>,
    pub(crate) saved: Vec<ConnectionProfile>,
    pub(crate) query_text: String,
    pub(crate) query_view: QueryView,
    pub(crate) page_label: String,
    pub(crate) tree: Vec<TreeLine>,
    pub(crate) cloud_form: CloudConnectionForm,
    pub(crate) cloud_status: CloudStatus,
    pub(crate) providers: Vec<ProviderInfo>,
    pub(crate) endpoint_placeholder: Option<&'static str>,
    pub(crate) monitoring: Option<MonitoringSnapshot>,
    pub(crate) logs: Vec<LogEntry>,
    pub(crate) toasts: Vec<Toast>,
    pub(crate) controls: Vec<ControlState>,
}

impl Snapshot {
    pub(crate) fn capture<A: ConnectorApi + 'static>(
        context: &ApplicationContext<A>,
        ui: &UiState,
        now: Instant,
    ) -> Self {
        let session = context.connections.session();
        let fields = context.connection_fields();
        let db_type = DbType::parse(fields.get(FIELD_DB_TYPE));

        let mut logs: Vec<LogEntry> = context
            .logs
            .query(ui.log_filter)
            .into_values()
            .flatten()
            .collect();
        logs.sort_by_key(|entry| entry.timestamp);
        let skip = logs.len().saturating_sub(LOG_TAIL);
        logs.drain(..skip);

        Self {
            view: context.views.active(),
            session: session.state(),
            saved: context.connections.saved_connections(db_type.as_ref()),
            db_types: context.drivers.db_type_choices(),
            fields,
            query_text: context.query_text(),
            query_view: context.queries.view(),
            page_label: context.queries.page_state().label(),
            tree: context.schema.visible_lines(),
            cloud_form: context.cloud.form(),
            cloud_status: context.cloud.status(),
            providers: context.cloud.providers(),
            endpoint_placeholder: context.cloud.endpoint_placeholder(),
            monitoring: context.monitor.latest(),
            logs,
            toasts: context.toasts.visible(now),
            controls: ControlId::ALL
                .into_iter()
                .map(|id| ControlState {
                    id,
                    enabled: context.controls.is_enabled(id, &session),
                    busy: context.controls.is_busy(id),
                })
                .collect(),
        }
    }

    fn control(&self, id: ControlId) -> Option<ControlState> {
        self.controls.iter().copied().find(|control| control.id == id)
    }
}

fn view_controls(view: ActiveView) -> &'static [ControlId] {
    match view {
        ActiveView::Connection => &[
            ControlId::Connect,
            ControlId::Disconnect,
            ControlId::SaveConnection,
            ControlId::UploadDriver,
        ],
        ActiveView::Tables => &[ControlId::Disconnect],
        ActiveView::Query => &[
            ControlId::ExecuteQuery,
            ControlId::PreviousPage,
            ControlId::NextPage,
            ControlId::Export,
        ],
        ActiveView::Cloud => &[ControlId::TestCloud, ControlId::ConnectCloud],
        ActiveView::Monitor => &[],
        ActiveView::Logs => &[ControlId::Export],
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => Color::Green,
        Severity::Info => Color::Cyan,
        Severity::Warning => Color::Yellow,
        Severity::Danger => Color::Red,
    }
}

fn badge_color(badge: Badge) -> Color {
    match badge {
        Badge::Success => Color::Green,
        Badge::Warning => Color::Yellow,
        Badge::Danger => Color::Red,
        Badge::Secondary => Color::Gray,
        Badge::Primary => Color::Blue,
    }
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Debug => Color::DarkGray,
        LogLevel::Info => Color::Reset,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Error => Color::Red,
    }
}

fn marker(selected: bool) -> &'static str {
    if selected {
        ">"
    } else {
        " "
    }
}

pub(crate) fn render(frame: &mut Frame<'_>, screen: &Snapshot, ui: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let selected = ActiveView::ALL
        .iter()
        .position(|view| *view == screen.view)
        .unwrap_or(0);
    let tabs = Tabs::new(ActiveView::ALL.iter().map(|view| view.title()))
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("dbconsole | {}", screen.session.label())),
        );
    frame.render_widget(tabs, chunks[0]);

    if screen.view == ActiveView::Query {
        render_query(frame, chunks[1], screen);
    } else {
        let body = match screen.view {
            ActiveView::Connection => connection_lines(screen, ui),
            ActiveView::Tables => tree_lines(screen, ui),
            ActiveView::Cloud => cloud_lines(screen, ui),
            ActiveView::Monitor => monitor_lines(screen),
            ActiveView::Logs | ActiveView::Query => log_lines(screen, ui),
        };
        let widget = Paragraph::new(body)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(screen.view.title()),
            )
            .alignment(Alignment::Left);
        frame.render_widget(widget, chunks[1]);
    }

    render_footer(frame, chunks[2], screen, ui);
    render_toasts(frame, screen);

    if ui.show_help {
        render_help_popup(frame);
    }
    if ui.driver_draft.is_some() {
        render_driver_popup(frame, ui);
    }
}

fn connection_lines(screen: &Snapshot, ui: &UiState) -> Vec<Line<'static>> {
    let saved = screen
        .saved
        .get(ui.saved_index)
        .map_or_else(|| "(none)".to_string(), ConnectionProfile::display_label);
    let mut lines = vec![
        Line::from(format!(
            "{} Saved connection: < {saved} >  ({} available)",
            marker(ui.connection_row == 0),
            screen.saved.len()
        )),
        Line::from(""),
    ];

    for (index, field) in CONNECTION_FIELDS.iter().enumerate() {
        let raw = screen.fields.get(field);
        let value = if *field == FIELD_PASSWORD {
            "*".repeat(raw.chars().count())
        } else if *field == FIELD_DB_TYPE {
            let label = screen
                .db_types
                .iter()
                .find(|(db_type, _)| db_type.as_str() == raw)
                .map_or("choose with arrows", |(_, label)| label.as_str());
            format!("< {label} >")
        } else {
            raw.to_string()
        };
        lines.push(Line::from(format!(
            "{} {field}: {value}",
            marker(ui.connection_row == index + 1)
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(
        "Enter: connect / load saved | Del: delete saved | Ctrl+S: save | Ctrl+U: add driver",
    ));
    lines
}

fn tree_lines(screen: &Snapshot, ui: &UiState) -> Vec<Line<'static>> {
    if screen.tree.is_empty() {
        return vec![Line::from("Connect to a database to browse its tables.")];
    }

    screen
        .tree
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let toggle = match line.path {
                Some(_) if line.expanded => "v ",
                Some(_) => "> ",
                None => "  ",
            };
            let style = match line.kind {
                TreeNodeKind::Database | TreeNodeKind::Schema => {
                    Style::default().add_modifier(Modifier::BOLD)
                }
                TreeNodeKind::Group => Style::default().fg(Color::Cyan),
                TreeNodeKind::Placeholder => Style::default().fg(Color::DarkGray),
                _ => Style::default(),
            };
            Line::from(vec![
                Span::raw(format!(
                    "{}{}{toggle}",
                    marker(index == ui.tree_cursor),
                    "  ".repeat(line.depth)
                )),
                Span::styled(line.label.clone(), style),
            ])
        })
        .collect()
}

fn render_query(frame: &mut Frame<'_>, area: Rect, screen: &Snapshot) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let editor = Paragraph::new(screen.query_text.as_str())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("SQL (Enter to run)"));
    frame.render_widget(editor, parts[0]);

    let results_block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Results | {}", screen.page_label));
    match &screen.query_view {
        QueryView::Empty => {
            frame.render_widget(
                Paragraph::new("No results yet").block(results_block),
                parts[1],
            );
        }
        QueryView::Error(message) => {
            frame.render_widget(
                Paragraph::new(message.as_str())
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: false })
                    .block(results_block),
                parts[1],
            );
        }
        QueryView::Grid(grid) if grid.is_empty() => {
            frame.render_widget(
                Paragraph::new("Query executed successfully. No rows returned.")
                    .block(results_block),
                parts[1],
            );
        }
        QueryView::Grid(grid) => {
            let header = Row::new(grid.columns.iter().map(|column| {
                Cell::from(column.clone()).style(Style::default().add_modifier(Modifier::BOLD))
            }));
            let rows = grid.render_rows().into_iter().map(|row| {
                Row::new(row.into_iter().map(|cell| {
                    let style = if cell.is_null {
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC)
                    } else {
                        Style::default()
                    };
                    Cell::from(cell.text).style(style)
                }))
            });
            let widths = vec![Constraint::Fill(1); grid.columns.len().max(1)];
            let table = Table::new(rows, widths)
                .header(header)
                .block(results_block);
            frame.render_widget(table, parts[1]);
        }
    }
}

fn cloud_lines(screen: &Snapshot, ui: &UiState) -> Vec<Line<'static>> {
    let form = &screen.cloud_form;
    let status = match &screen.cloud_status {
        CloudStatus::Disconnected => "Disconnected".to_string(),
        CloudStatus::Connected {
            provider, endpoint, ..
        } => format!("Connected to {provider} ({endpoint})"),
    };
    let mut lines = vec![Line::from(format!("Status: {status}")), Line::from("")];

    for (index, row) in CLOUD_ROWS.iter().enumerate() {
        let (label, value) = match *row {
            CloudRow::Provider => (
                "Provider".to_string(),
                form.provider.map_or_else(
                    || "< choose >".to_string(),
                    |provider| {
                        let name = screen
                            .providers
                            .iter()
                            .find(|info| info.provider == provider)
                            .map_or_else(|| provider.key().to_string(), |info| info.name.clone());
                        format!("< {name} >")
                    },
                ),
            ),
            CloudRow::Service => (
                "Service".to_string(),
                form.service
                    .map_or("< choose >".to_string(), |service| {
                        format!("< {} >", service.slug())
                    }),
            ),
            CloudRow::Auth => (
                "Authentication".to_string(),
                form.auth_method
                    .map_or("< choose >".to_string(), |method| {
                        format!("< {} >", method.label())
                    }),
            ),
            CloudRow::Text(field) => {
                let raw = cloud_field_value(form, field);
                let value = match field {
                    CloudField::Password => {
                        "*".repeat(raw.chars().count())
                    }
                    CloudField::Endpoint if raw.is_empty() => {
                        screen
                            .endpoint_placeholder
                            .map(|placeholder| format!("({placeholder})"))
                            .unwrap_or_default()
                    }
                    _ => raw.to_string(),
                };
                (cloud_field_label(field).to_string(), value)
            }
            CloudRow::Ssl => (
                "SSL".to_string(),
                if form.ssl.enabled { "[x]" } else { "[ ]" }.to_string(),
            ),
            CloudRow::CertificateType => (
                "Certificate type".to_string(),
                format!("< {} >", ui.certificate_type.as_str()),
            ),
            CloudRow::CertificatePath => {
                let pending = form
                    .ssl
                    .certificate
                    .as_ref()
                    .map(|(_, path)| format!("  (selected: {})", path.display()))
                    .unwrap_or_default();
                (
                    "Certificate file".to_string(),
                    format!("{}{pending}", ui.certificate_path),
                )
            }
        };
        lines.push(Line::from(format!(
            "{} {label}: {value}",
            marker(ui.cloud_row == index)
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(
        "Enter: connect | Ctrl+T: test | Ctrl+L: SSL | Ctrl+D: disconnect",
    ));
    lines
}

fn monitor_lines(screen: &Snapshot) -> Vec<Line<'static>> {
    let Some(snapshot) = &screen.monitoring else {
        return vec![Line::from("Press Enter or Ctrl+R to load monitoring data.")];
    };

    let mut lines = vec![
        Line::from(format!(
            "Updated {}",
            snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        Line::from(format!(
            "Active connections: {}   Average health score: {}",
            snapshot.overview.total_active_connections, snapshot.overview.average_health_score
        )),
        Line::from(""),
    ];
    for (provider, metrics) in &snapshot.metrics {
        lines.push(Line::from(format!(
            "{provider}: {} connections, health score {:.1}",
            metrics.active_connections, metrics.health_score
        )));
    }
    lines.push(Line::from(""));
    for health in &snapshot.health {
        lines.push(Line::from(vec![
            Span::raw(format!("{}: ", health.provider)),
            Span::styled(
                health.raw.clone(),
                Style::default().fg(badge_color(health.badge())),
            ),
        ]));
    }
    lines
}

fn log_lines(screen: &Snapshot, ui: &UiState) -> Vec<Line<'static>> {
    let filter = ui.log_filter.map_or("all", |category| category.as_str());
    let mut lines = vec![
        Line::from(format!(
            "Category: < {filter} >   Ctrl+X: clear | Ctrl+E: export"
        )),
        Line::from(""),
    ];
    lines.extend(screen.logs.iter().rev().map(|entry| {
        Line::from(vec![
            Span::styled(
                format!(
                    "{} {:<5} {:<10} ",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.level.as_str(),
                    entry.category.as_str()
                ),
                Style::default().fg(level_color(entry.level)),
            ),
            Span::raw(entry.message.clone()),
        ])
    }));
    lines
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, screen: &Snapshot, ui: &UiState) {
    let mut buttons = Vec::new();
    for id in view_controls(screen.view) {
        let Some(control) = screen.control(*id) else {
            continue;
        };
        let (text, style) = if control.busy {
            (id.busy_label(), Style::default().fg(Color::Yellow))
        } else if control.enabled {
            (id.label(), Style::default().add_modifier(Modifier::BOLD))
        } else {
            (id.label(), Style::default().fg(Color::DarkGray))
        };
        buttons.push(Span::styled(format!("[{text}]"), style));
        buttons.push(Span::raw(" "));
    }

    let footer = Paragraph::new(vec![
        Line::from(buttons),
        Line::from(format!("Status: {}", ui.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Tab: next view | F1: help"));
    frame.render_widget(footer, area);
}

fn render_toasts(frame: &mut Frame<'_>, screen: &Snapshot) {
    let area = frame.area();
    let width = TOAST_WIDTH.min(area.width);
    let mut y = area.y + 1;
    for toast in &screen.toasts {
        if y + 3 > area.bottom() {
            break;
        }
        let rect = Rect::new(area.right().saturating_sub(width + 1), y, width, 3);
        let color = severity_color(toast.severity);
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(toast.message.as_str())
                .style(Style::default().fg(color))
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(color))
                        .title(format!(
                            "{} {}",
                            toast.severity.icon(),
                            toast.severity.label()
                        )),
                ),
            rect,
        );
        y += 3;
    }
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("Ctrl+Q: quit"),
        Line::from("F1: toggle help"),
        Line::from("Tab: next view"),
        Line::from("Up/Down: move focus, Left/Right: change choice"),
        Line::from("Enter: connect, run query or toggle tree node (by view)"),
        Line::from("Ctrl+D: disconnect   Ctrl+S: save connection"),
        Line::from("Ctrl+R: refresh      Ctrl+U: add custom driver"),
        Line::from("PageUp/PageDown: previous/next result page"),
        Line::from("Ctrl+E / Ctrl+J: export spreadsheet / JSON"),
        Line::from("Ctrl+T: test cloud connection   Ctrl+L: toggle SSL"),
        Line::from("Ctrl+X: clear logs   Ctrl+W: dismiss notification"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn render_driver_popup(frame: &mut Frame<'_>, ui: &UiState) {
    let Some(draft) = &ui.driver_draft else {
        return;
    };
    let area = centered_rect(60, 40, frame.area());
    frame.render_widget(Clear, area);
    let mut lines: Vec<Line<'_>> = DRIVER_FIELDS
        .iter()
        .zip(draft.values.iter())
        .enumerate()
        .map(|(index, (label, value))| {
            Line::from(format!("{} {label}: {value}", marker(index == draft.row)))
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from("Enter: upload | Esc: cancel"));
    let popup = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Add database driver"),
    );
    frame.render_widget(popup, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}
