mod input;
mod screen;

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dbconsole_core::api::ConnectorApi;
use dbconsole_core::bootstrap::{ApplicationContext, DispatchOutcome, UiEvent};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::input::{map_key_event, UiState};
use crate::screen::Snapshot;

const TICK_RATE: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Events that only touch in-memory state. They run to completion on the UI
/// thread so consecutive keystrokes apply in order.
fn runs_inline(event: &UiEvent) -> bool {
    matches!(
        event,
        UiEvent::FieldEdited { .. }
            | UiEvent::QueryEdited(_)
            | UiEvent::CloudFieldEdited { .. }
            | UiEvent::DbTypeChanged(_)
            | UiEvent::CloudProviderSelected(_)
            | UiEvent::CloudServiceSelected(_)
            | UiEvent::CloudAuthSelected(_)
            | UiEvent::CloudSslToggled(_)
            | UiEvent::CloudCertificateChosen { .. }
            | UiEvent::SwitchView(_)
            | UiEvent::DismissToast(_)
            | UiEvent::ClearLogs(_)
    )
}

fn describe(outcome: &DispatchOutcome) -> Option<String> {
    match outcome {
        DispatchOutcome::Completed => None,
        DispatchOutcome::ControlBusy(control) => Some(format!("{} is busy", control.label())),
        DispatchOutcome::Failed(message) => Some(message.clone()),
    }
}

struct TuiApp<A: ConnectorApi + 'static> {
    context: Arc<ApplicationContext<A>>,
    runtime: Handle,
    ui: UiState,
    outcomes: mpsc::UnboundedSender<DispatchOutcome>,
    finished: mpsc::UnboundedReceiver<DispatchOutcome>,
}

impl<A: ConnectorApi + 'static> TuiApp<A> {
    fn new(context: Arc<ApplicationContext<A>>, runtime: Handle) -> Self {
        let (outcomes, finished) = mpsc::unbounded_channel();
        Self {
            context,
            runtime,
            ui: UiState::default(),
            outcomes,
            finished,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.context, &self.ui, Instant::now())
    }

    /// Network-bound events run on the runtime so the draw loop never waits
    /// on the backend; their outcome comes back on the next tick.
    fn dispatch(&mut self, event: UiEvent) {
        debug!(?event, "dispatching ui event");
        if runs_inline(&event) {
            let outcome = self.runtime.block_on(self.context.dispatch(event));
            self.record(&outcome);
            return;
        }

        let context = self.context.clone();
        let outcomes = self.outcomes.clone();
        self.runtime.spawn(async move {
            let outcome = context.dispatch(event).await;
            let _ = outcomes.send(outcome);
        });
    }

    fn record(&mut self, outcome: &DispatchOutcome) {
        if let Some(status) = describe(outcome) {
            self.ui.status_line = status;
        }
    }

    fn on_tick(&mut self) {
        self.context.toasts.prune_expired(Instant::now());
        while let Ok(outcome) = self.finished.try_recv() {
            self.record(&outcome);
        }
    }
}

/// Runs the terminal UI until the user quits. Must be called from a thread
/// that is not driving `runtime`.
pub fn run<A: ConnectorApi + 'static>(
    context: Arc<ApplicationContext<A>>,
    runtime: Handle,
) -> Result<(), TuiError> {
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, TuiApp::new(context, runtime));
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<A: ConnectorApi + 'static>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: TuiApp<A>,
) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        let snapshot = app.snapshot();
        terminal.draw(|frame| screen::render(frame, &snapshot, &app.ui))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key) {
                        if let Some(ui_event) = app.ui.on_msg(message, &snapshot) {
                            app.dispatch(ui_event);
                        }
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.on_tick();
            last_tick = Instant::now();
        }

        if app.ui.should_quit {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use dbconsole_core::bootstrap::{ActiveView, DispatchOutcome, UiEvent};
    use dbconsole_core::controls::ControlId;

    use super::{describe, runs_inline};

    #[test]
    fn only_local_edits_run_on_the_ui_thread() {
        assert!(runs_inline(&UiEvent::QueryEdited("SELECT 1".to_string())));
        assert!(runs_inline(&UiEvent::SwitchView(ActiveView::Query)));
        assert!(!runs_inline(&UiEvent::Connect));
        assert!(!runs_inline(&UiEvent::ExecuteQuery));
        assert!(!runs_inline(&UiEvent::ExportLogs(None)));
    }

    #[test]
    fn outcomes_become_status_text() {
        assert_eq!(describe(&DispatchOutcome::Completed), None);
        assert_eq!(
            describe(&DispatchOutcome::ControlBusy(ControlId::ExecuteQuery)),
            Some("Execute is busy".to_string())
        );
        assert_eq!(
            describe(&DispatchOutcome::Failed("not connected".to_string())),
            Some("not connected".to_string())
        );
    }
}
