use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use dbconsole_core::bootstrap::{ActiveView, CloudField, UiEvent};
use dbconsole_core::cloud_wizard::{
    AuthMethod, CertificateType, CloudConnectionForm, CloudProvider, CloudService,
};
use dbconsole_core::drivers::DriverForm;
use dbconsole_core::forms::{CONNECTION_FIELDS, FIELD_DB_TYPE};
use dbconsole_core::log_store::LogCategory;

use crate::screen::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportKind {
    Spreadsheet,
    Json,
}

impl ExportKind {
    pub(crate) fn format(self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Msg {
    Quit,
    ToggleHelp,
    Escape,
    NextView,
    FocusPrevious,
    FocusNext,
    Left,
    Right,
    Submit,
    Input(char),
    Backspace,
    Delete,
    Disconnect,
    Save,
    Refresh,
    Export(ExportKind),
    TestCloud,
    ToggleSsl,
    ClearLogs,
    DismissToast,
    OpenDriverForm,
    PreviousPage,
    NextPage,
}

pub(crate) fn map_key_event(key: KeyEvent) -> Option<Msg> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('q' | 'c') => Some(Msg::Quit),
            KeyCode::Char('d') => Some(Msg::Disconnect),
            KeyCode::Char('s') => Some(Msg::Save),
            KeyCode::Char('r') => Some(Msg::Refresh),
            KeyCode::Char('e') => Some(Msg::Export(ExportKind::Spreadsheet)),
            KeyCode::Char('j') => Some(Msg::Export(ExportKind::Json)),
            KeyCode::Char('t') => Some(Msg::TestCloud),
            KeyCode::Char('l') => Some(Msg::ToggleSsl),
            KeyCode::Char('x') => Some(Msg::ClearLogs),
            KeyCode::Char('w') => Some(Msg::DismissToast),
            KeyCode::Char('u') => Some(Msg::OpenDriverForm),
            _ => None,
        };
    }

    match key.code {
        KeyCode::F(1) => Some(Msg::ToggleHelp),
        KeyCode::Esc => Some(Msg::Escape),
        KeyCode::Tab => Some(Msg::NextView),
        KeyCode::Up => Some(Msg::FocusPrevious),
        KeyCode::Down => Some(Msg::FocusNext),
        KeyCode::Left => Some(Msg::Left),
        KeyCode::Right => Some(Msg::Right),
        KeyCode::Enter => Some(Msg::Submit),
        KeyCode::Backspace => Some(Msg::Backspace),
        KeyCode::Delete => Some(Msg::Delete),
        KeyCode::PageUp => Some(Msg::PreviousPage),
        KeyCode::PageDown => Some(Msg::NextPage),
        KeyCode::Char(c) => Some(Msg::Input(c)),
        _ => None,
    }
}

/// Row 0 of the connection view is the saved-connection picker; the rest
/// follow the form fields.
pub(crate) const CONNECTION_ROWS: usize = CONNECTION_FIELDS.len() + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloudRow {
    Provider,
    Service,
    Auth,
    Text(CloudField),
    Ssl,
    CertificateType,
    CertificatePath,
}

pub(crate) const CLOUD_ROWS: [CloudRow; 14] = [
    CloudRow::Provider,
    CloudRow::Service,
    CloudRow::Auth,
    CloudRow::Text(CloudField::Name),
    CloudRow::Text(CloudField::Endpoint),
    CloudRow::Text(CloudField::Port),
    CloudRow::Text(CloudField::Database),
    CloudRow::Text(CloudField::Username),
    CloudRow::Text(CloudField::Password),
    CloudRow::Text(CloudField::ServiceAccountPath),
    CloudRow::Text(CloudField::CloudSqlInstance),
    CloudRow::Ssl,
    CloudRow::CertificateType,
    CloudRow::CertificatePath,
];

const CERTIFICATE_TYPES: [CertificateType; 3] =
    [CertificateType::Ca, CertificateType::Client, CertificateType::Key];

pub(crate) fn cloud_field_label(field: CloudField) -> &'static str {
    match field {
        CloudField::Name => "Name",
        CloudField::Endpoint => "Endpoint",
        CloudField::Port => "Port",
        CloudField::Database => "Database",
        CloudField::Username => "Username",
        CloudField::Password => "Password",
        CloudField::ServiceAccountPath => "Service account key",
        CloudField::CloudSqlInstance => "Cloud SQL instance",
    }
}

pub(crate) fn cloud_field_value(form: &CloudConnectionForm, field: CloudField) -> &str {
    match field {
        CloudField::Name => &form.name,
        CloudField::Endpoint => &form.endpoint,
        CloudField::Port => &form.port,
        CloudField::Database => &form.database,
        CloudField::Username => &form.username,
        CloudField::Password => &form.password,
        CloudField::ServiceAccountPath => &form.service_account_path,
        CloudField::CloudSqlInstance => &form.cloud_sql_instance,
    }
}

pub(crate) const DRIVER_FIELDS: [&str; 5] = [
    "Name",
    "Class name",
    "URL template",
    "Default port",
    "Driver file",
];

/// Upload form for a custom driver, shown as a popup over any view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DriverDraft {
    pub(crate) values: [String; 5],
    pub(crate) row: usize,
}

impl DriverDraft {
    fn to_form(&self) -> DriverForm {
        let [name, class_name, url_template, default_port, file] = self.values.clone();
        let file = file.trim();
        DriverForm {
            name,
            class_name,
            url_template,
            default_port,
            file: (!file.is_empty()).then(|| PathBuf::from(file)),
        }
    }
}

/// Local UI state: focus, cursors and popups. Everything that belongs to a
/// component lives in the application context instead.
#[derive(Debug)]
pub(crate) struct UiState {
    pub(crate) show_help: bool,
    pub(crate) should_quit: bool,
    pub(crate) status_line: String,
    pub(crate) connection_row: usize,
    pub(crate) saved_index: usize,
    pub(crate) tree_cursor: usize,
    pub(crate) cloud_row: usize,
    pub(crate) certificate_type: CertificateType,
    pub(crate) certificate_path: String,
    pub(crate) log_filter: Option<LogCategory>,
    pub(crate) driver_draft: Option<DriverDraft>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            show_help: false,
            should_quit: false,
            status_line: "F1 for help".to_string(),
            connection_row: 1,
            saved_index: 0,
            tree_cursor: 0,
            cloud_row: 0,
            certificate_type: CertificateType::Ca,
            certificate_path: String::new(),
            log_filter: None,
            driver_draft: None,
        }
    }
}

impl UiState {
    /// Applies a key message and returns the event to dispatch, if any.
    pub(crate) fn on_msg(&mut self, msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
        if msg == Msg::Quit {
            self.should_quit = true;
            return None;
        }
        if self.driver_draft.is_some() {
            return self.on_driver_msg(msg);
        }

        match msg {
            Msg::ToggleHelp => {
                self.show_help = !self.show_help;
                None
            }
            Msg::Escape => {
                self.show_help = false;
                None
            }
            Msg::NextView => Some(UiEvent::SwitchView(screen.view.next())),
            Msg::DismissToast => Some(UiEvent::DismissToast(None)),
            Msg::OpenDriverForm => {
                self.driver_draft = Some(DriverDraft::default());
                None
            }
            _ => match screen.view {
                ActiveView::Connection => self.on_connection_msg(msg, screen),
                ActiveView::Tables => self.on_tables_msg(msg, screen),
                ActiveView::Query => on_query_msg(msg, screen),
                ActiveView::Cloud => self.on_cloud_msg(msg, screen),
                ActiveView::Monitor => {
                    matches!(msg, Msg::Submit | Msg::Refresh).then_some(UiEvent::RefreshMonitoring)
                }
                ActiveView::Logs => self.on_logs_msg(msg),
            },
        }
    }

    fn on_connection_msg(&mut self, msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
        match msg {
            Msg::FocusPrevious | Msg::FocusNext => {
                self.connection_row =
                    step(self.connection_row, msg == Msg::FocusNext, CONNECTION_ROWS);
                None
            }
            Msg::Disconnect => Some(UiEvent::Disconnect),
            Msg::Save => Some(UiEvent::SaveConnection),
            Msg::Refresh => Some(UiEvent::RefreshSavedConnections),
            _ if self.connection_row == 0 => self.on_saved_msg(msg, screen),
            _ => {
                let field = CONNECTION_FIELDS.get(self.connection_row - 1)?;
                if *field == FIELD_DB_TYPE {
                    return match msg {
                        Msg::Left | Msg::Right => {
                            let current = screen
                                .db_types
                                .iter()
                                .position(|(db_type, _)| db_type.as_str() == screen.fields.get(field));
                            let next = cycle(current, screen.db_types.len(), msg == Msg::Right)?;
                            screen
                                .db_types
                                .get(next)
                                .map(|(db_type, _)| UiEvent::DbTypeChanged(db_type.as_str().to_string()))
                        }
                        Msg::Submit => Some(UiEvent::Connect),
                        _ => None,
                    };
                }
                match msg {
                    Msg::Submit => Some(UiEvent::Connect),
                    _ => edited(screen.fields.get(field), msg).map(|value| UiEvent::FieldEdited {
                        field: (*field).to_string(),
                        value,
                    }),
                }
            }
        }
    }

    fn on_saved_msg(&mut self, msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
        match msg {
            Msg::Left | Msg::Right => {
                let current = (self.saved_index < screen.saved.len()).then_some(self.saved_index);
                self.saved_index = cycle(current, screen.saved.len(), msg == Msg::Right)?;
                None
            }
            Msg::Submit => screen
                .saved
                .get(self.saved_index)
                .map(|profile| UiEvent::SavedConnectionSelected(profile.id.clone())),
            Msg::Delete => screen
                .saved
                .get(self.saved_index)
                .map(|profile| UiEvent::DeleteSavedConnection(profile.id.clone())),
            _ => None,
        }
    }

    fn on_tables_msg(&mut self, msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
        let last = screen.tree.len().saturating_sub(1);
        self.tree_cursor = self.tree_cursor.min(last);
        match msg {
            Msg::FocusPrevious => {
                self.tree_cursor = self.tree_cursor.saturating_sub(1);
                None
            }
            Msg::FocusNext => {
                self.tree_cursor = (self.tree_cursor + 1).min(last);
                None
            }
            Msg::Submit | Msg::Left | Msg::Right => {
                let line = screen.tree.get(self.tree_cursor)?;
                let wanted = match msg {
                    Msg::Left => line.expanded,
                    Msg::Right => !line.expanded,
                    _ => true,
                };
                if !wanted {
                    return None;
                }
                line.path.clone().map(UiEvent::ToggleSchemaNode)
            }
            _ => None,
        }
    }

    fn on_cloud_msg(&mut self, msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
        let form = &screen.cloud_form;
        match msg {
            Msg::FocusPrevious | Msg::FocusNext => {
                self.cloud_row = step(self.cloud_row, msg == Msg::FocusNext, CLOUD_ROWS.len());
                return None;
            }
            Msg::TestCloud => return Some(UiEvent::TestCloudConnection),
            Msg::Disconnect => return Some(UiEvent::DisconnectCloud),
            Msg::ToggleSsl => return Some(UiEvent::CloudSslToggled(!form.ssl.enabled)),
            _ => {}
        }

        let row = *CLOUD_ROWS.get(self.cloud_row)?;
        let forward = msg == Msg::Right;
        match (row, msg) {
            (CloudRow::Provider, Msg::Left | Msg::Right) => {
                let choices = provider_choices(screen);
                let current = form
                    .provider
                    .and_then(|selected| choices.iter().position(|p| *p == selected));
                let next = cycle(current, choices.len(), forward)?;
                Some(UiEvent::CloudProviderSelected(choices.get(next).copied()))
            }
            (CloudRow::Service, Msg::Left | Msg::Right) => {
                let choices = service_choices(screen);
                let current = form
                    .service
                    .and_then(|selected| choices.iter().position(|s| *s == selected));
                let next = cycle(current, choices.len(), forward)?;
                Some(UiEvent::CloudServiceSelected(choices.get(next).copied()))
            }
            (CloudRow::Auth, Msg::Left | Msg::Right) => {
                let choices = auth_choices(screen);
                let current = form
                    .auth_method
                    .and_then(|selected| choices.iter().position(|m| *m == selected));
                let next = cycle(current, choices.len(), forward)?;
                Some(UiEvent::CloudAuthSelected(choices.get(next).copied()))
            }
            (CloudRow::Ssl, Msg::Left | Msg::Right | Msg::Submit) => {
                Some(UiEvent::CloudSslToggled(!form.ssl.enabled))
            }
            (CloudRow::CertificateType, Msg::Left | Msg::Right) => {
                let current = CERTIFICATE_TYPES
                    .iter()
                    .position(|kind| *kind == self.certificate_type);
                if let Some(next) = cycle(current, CERTIFICATE_TYPES.len(), forward) {
                    self.certificate_type = CERTIFICATE_TYPES[next];
                }
                None
            }
            (CloudRow::CertificatePath, Msg::Submit) => {
                let path = self.certificate_path.trim();
                (!path.is_empty()).then(|| UiEvent::CloudCertificateChosen {
                    certificate_type: self.certificate_type,
                    path: PathBuf::from(path),
                })
            }
            (CloudRow::CertificatePath, _) => {
                if let Some(value) = edited(&self.certificate_path, msg) {
                    self.certificate_path = value;
                }
                None
            }
            (CloudRow::Text(field), Msg::Input(_) | Msg::Backspace) => {
                edited(cloud_field_value(form, field), msg)
                    .map(|value| UiEvent::CloudFieldEdited { field, value })
            }
            (_, Msg::Submit) => Some(UiEvent::ConnectCloud),
            _ => None,
        }
    }

    fn on_logs_msg(&mut self, msg: Msg) -> Option<UiEvent> {
        match msg {
            Msg::Left | Msg::Right => {
                // slot 0 stands for "all categories"
                let current = self
                    .log_filter
                    .and_then(|category| LogCategory::ALL.iter().position(|c| *c == category))
                    .map_or(0, |index| index + 1);
                let next = step(current, msg == Msg::Right, LogCategory::ALL.len() + 1);
                self.log_filter = next
                    .checked_sub(1)
                    .and_then(|index| LogCategory::ALL.get(index).copied());
                None
            }
            Msg::ClearLogs => Some(UiEvent::ClearLogs(self.log_filter)),
            Msg::Export(_) => Some(UiEvent::ExportLogs(self.log_filter)),
            _ => None,
        }
    }

    fn on_driver_msg(&mut self, msg: Msg) -> Option<UiEvent> {
        let draft = self.driver_draft.as_mut()?;
        match msg {
            Msg::Escape => {
                self.driver_draft = None;
                None
            }
            Msg::FocusPrevious | Msg::FocusNext => {
                draft.row = step(draft.row, msg == Msg::FocusNext, DRIVER_FIELDS.len());
                None
            }
            Msg::Submit => {
                let form = draft.to_form();
                self.driver_draft = None;
                Some(UiEvent::UploadDriver(form))
            }
            _ => {
                let value = draft.values.get_mut(draft.row)?;
                if let Some(next) = edited(value, msg) {
                    *value = next;
                }
                None
            }
        }
    }
}

fn on_query_msg(msg: Msg, screen: &Snapshot) -> Option<UiEvent> {
    match msg {
        Msg::Submit => Some(UiEvent::ExecuteQuery),
        Msg::PreviousPage => Some(UiEvent::PreviousPage),
        Msg::NextPage => Some(UiEvent::NextPage),
        Msg::Export(kind) => Some(UiEvent::ExportResults(kind.format().to_string())),
        _ => edited(&screen.query_text, msg).map(UiEvent::QueryEdited),
    }
}

fn provider_choices(screen: &Snapshot) -> Vec<CloudProvider> {
    if screen.providers.is_empty() {
        return CloudProvider::ALL.to_vec();
    }
    screen.providers.iter().map(|info| info.provider).collect()
}

fn service_choices(screen: &Snapshot) -> Vec<CloudService> {
    screen
        .cloud_form
        .provider
        .and_then(|provider| screen.providers.iter().find(|info| info.provider == provider))
        .map(|info| info.services.clone())
        .unwrap_or_default()
}

fn auth_choices(screen: &Snapshot) -> Vec<AuthMethod> {
    screen
        .cloud_form
        .provider
        .and_then(|provider| screen.providers.iter().find(|info| info.provider == provider))
        .map_or_else(|| AuthMethod::ALL.to_vec(), |info| info.auth_methods.clone())
}

fn edited(current: &str, msg: Msg) -> Option<String> {
    let mut value = current.to_string();
    match msg {
        Msg::Input(c) => value.push(c),
        Msg::Backspace => {
            value.pop()?;
        }
        _ => return None,
    }
    Some(value)
}

fn step(index: usize, forward: bool, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (index + 1) % len
    } else {
        (index + len - 1) % len
    }
}

fn cycle(current: Option<usize>, len: usize, forward: bool) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match current {
        None if forward => 0,
        None => len - 1,
        Some(index) => step(index, forward, len),
    })
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use dbconsole_core::bootstrap::{ActiveView, CloudField, UiEvent};
    use dbconsole_core::cloud_wizard::{AuthMethod, CloudProvider, CloudService, ProviderInfo};
    use dbconsole_core::forms::{DbType, FormFields, FIELD_DB_TYPE, FIELD_HOST};
    use dbconsole_core::log_store::LogCategory;
    use dbconsole_core::profiles::ConnectionProfile;
    use dbconsole_core::schema_explorer::{NodePath, TreeLine, TreeNodeKind};

    use super::{map_key_event, ExportKind, Msg, UiState};
    use crate::screen::Snapshot;

    fn key(code: KeyCode) -> Option<Msg> {
        map_key_event(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Option<Msg> {
        map_key_event(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn screen(view: ActiveView) -> Snapshot {
        Snapshot {
            view,
            ..Snapshot::default()
        }
    }

    #[test]
    fn keymap_separates_typing_from_commands() {
        assert_eq!(ctrl('q'), Some(Msg::Quit));
        assert_eq!(ctrl('d'), Some(Msg::Disconnect));
        assert_eq!(ctrl('e'), Some(Msg::Export(ExportKind::Spreadsheet)));
        assert_eq!(ctrl('j'), Some(Msg::Export(ExportKind::Json)));
        assert_eq!(key(KeyCode::Char('q')), Some(Msg::Input('q')));
        assert_eq!(key(KeyCode::Tab), Some(Msg::NextView));
        assert_eq!(key(KeyCode::PageDown), Some(Msg::NextPage));
        assert_eq!(key(KeyCode::F(1)), Some(Msg::ToggleHelp));
        assert_eq!(ctrl('z'), None);
    }

    #[test]
    fn tab_requests_the_next_view() {
        let mut ui = UiState::default();
        assert_eq!(
            ui.on_msg(Msg::NextView, &screen(ActiveView::Logs)),
            Some(UiEvent::SwitchView(ActiveView::Connection))
        );
    }

    #[test]
    fn typing_edits_the_focused_connection_field() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Connection);
        snapshot.fields = FormFields::new().with(FIELD_HOST, "db.local");

        ui.on_msg(Msg::FocusNext, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Input('x'), &snapshot),
            Some(UiEvent::FieldEdited {
                field: FIELD_HOST.to_string(),
                value: "db.localx".to_string(),
            })
        );
        assert_eq!(
            ui.on_msg(Msg::Backspace, &snapshot),
            Some(UiEvent::FieldEdited {
                field: FIELD_HOST.to_string(),
                value: "db.loca".to_string(),
            })
        );
        assert_eq!(ui.on_msg(Msg::Submit, &snapshot), Some(UiEvent::Connect));
    }

    #[test]
    fn arrows_cycle_database_types_on_the_type_row() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Connection);
        snapshot.db_types = DbType::builtin()
            .into_iter()
            .map(|db_type| {
                let label = db_type.label().to_string();
                (db_type, label)
            })
            .collect();
        snapshot.fields = FormFields::new().with(FIELD_DB_TYPE, "mysql");

        assert_eq!(
            ui.on_msg(Msg::Right, &snapshot),
            Some(UiEvent::DbTypeChanged("sqlserver".to_string()))
        );
        assert_eq!(
            ui.on_msg(Msg::Input('a'), &snapshot),
            None,
            "the type row is not free text"
        );
    }

    #[test]
    fn saved_picker_loads_and_deletes_the_selected_profile() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Connection);
        snapshot.saved = vec![
            ConnectionProfile::new("a", "Alpha", DbType::Postgresql, "alpha", 5432),
            ConnectionProfile::new("b", "Beta", DbType::Postgresql, "beta", 5432),
        ];

        ui.on_msg(Msg::FocusPrevious, &snapshot);
        ui.on_msg(Msg::Right, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Submit, &snapshot),
            Some(UiEvent::SavedConnectionSelected("b".to_string()))
        );
        ui.on_msg(Msg::Right, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Delete, &snapshot),
            Some(UiEvent::DeleteSavedConnection("a".to_string()))
        );
    }

    #[test]
    fn enter_toggles_the_tree_node_under_the_cursor() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Tables);
        let path = NodePath::database("app");
        snapshot.tree = vec![
            TreeLine {
                depth: 0,
                kind: TreeNodeKind::Database,
                label: "postgres".to_string(),
                path: Some(NodePath::database("postgres")),
                expanded: false,
            },
            TreeLine {
                depth: 0,
                kind: TreeNodeKind::Database,
                label: "app".to_string(),
                path: Some(path.clone()),
                expanded: true,
            },
        ];

        ui.on_msg(Msg::FocusNext, &snapshot);
        ui.on_msg(Msg::FocusNext, &snapshot);
        assert_eq!(ui.tree_cursor, 1);
        assert_eq!(ui.on_msg(Msg::Right, &snapshot), None);
        assert_eq!(
            ui.on_msg(Msg::Left, &snapshot),
            Some(UiEvent::ToggleSchemaNode(path))
        );
    }

    #[test]
    fn query_view_edits_text_and_exports() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Query);
        snapshot.query_text = "SELECT ".to_string();

        assert_eq!(
            ui.on_msg(Msg::Input('1'), &snapshot),
            Some(UiEvent::QueryEdited("SELECT 1".to_string()))
        );
        assert_eq!(ui.on_msg(Msg::Submit, &snapshot), Some(UiEvent::ExecuteQuery));
        assert_eq!(
            ui.on_msg(Msg::Export(ExportKind::Json), &snapshot),
            Some(UiEvent::ExportResults("json".to_string()))
        );
        assert_eq!(ui.on_msg(Msg::PreviousPage, &snapshot), Some(UiEvent::PreviousPage));
    }

    #[test]
    fn cloud_choices_follow_the_provider_catalog() {
        let mut ui = UiState::default();
        let mut snapshot = screen(ActiveView::Cloud);
        snapshot.providers = vec![ProviderInfo {
            provider: CloudProvider::Gcp,
            name: "Google Cloud".to_string(),
            services: vec![CloudService::CloudSql],
            auth_methods: vec![AuthMethod::ServiceAccount, AuthMethod::UsernamePassword],
        }];

        assert_eq!(
            ui.on_msg(Msg::Right, &snapshot),
            Some(UiEvent::CloudProviderSelected(Some(CloudProvider::Gcp)))
        );

        snapshot.cloud_form.provider = Some(CloudProvider::Gcp);
        snapshot.cloud_form.auth_method = Some(AuthMethod::ServiceAccount);
        ui.on_msg(Msg::FocusNext, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Right, &snapshot),
            Some(UiEvent::CloudServiceSelected(Some(CloudService::CloudSql)))
        );
        ui.on_msg(Msg::FocusNext, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Right, &snapshot),
            Some(UiEvent::CloudAuthSelected(Some(AuthMethod::UsernamePassword)))
        );

        ui.on_msg(Msg::FocusNext, &snapshot);
        assert_eq!(
            ui.on_msg(Msg::Input('p'), &snapshot),
            Some(UiEvent::CloudFieldEdited {
                field: CloudField::Name,
                value: "p".to_string(),
            })
        );
        assert_eq!(ui.on_msg(Msg::TestCloud, &snapshot), Some(UiEvent::TestCloudConnection));
        assert_eq!(ui.on_msg(Msg::Submit, &snapshot), Some(UiEvent::ConnectCloud));
    }

    #[test]
    fn certificate_path_is_typed_locally_then_chosen() {
        let mut ui = UiState::default();
        let snapshot = screen(ActiveView::Cloud);
        ui.cloud_row = super::CLOUD_ROWS.len() - 1;

        for c in "ca.pem".chars() {
            assert_eq!(ui.on_msg(Msg::Input(c), &snapshot), None);
        }
        assert_eq!(
            ui.on_msg(Msg::Submit, &snapshot),
            Some(UiEvent::CloudCertificateChosen {
                certificate_type: dbconsole_core::cloud_wizard::CertificateType::Ca,
                path: "ca.pem".into(),
            })
        );
    }

    #[test]
    fn log_filter_cycles_through_all_then_each_category() {
        let mut ui = UiState::default();
        let snapshot = screen(ActiveView::Logs);

        ui.on_msg(Msg::Right, &snapshot);
        assert_eq!(ui.log_filter, Some(LogCategory::Access));
        assert_eq!(
            ui.on_msg(Msg::ClearLogs, &snapshot),
            Some(UiEvent::ClearLogs(Some(LogCategory::Access)))
        );
        ui.on_msg(Msg::Left, &snapshot);
        assert_eq!(ui.log_filter, None);
        ui.on_msg(Msg::Left, &snapshot);
        assert_eq!(ui.log_filter, Some(LogCategory::Monitoring));
    }

    #[test]
    fn driver_popup_collects_fields_and_submits_once() {
        let mut ui = UiState::default();
        let snapshot = screen(ActiveView::Query);

        ui.on_msg(Msg::OpenDriverForm, &snapshot);
        for c in "H2".chars() {
            assert_eq!(ui.on_msg(Msg::Input(c), &snapshot), None, "popup captures typing");
        }
        ui.on_msg(Msg::FocusPrevious, &snapshot);
        for c in "/tmp/h2.jar".chars() {
            ui.on_msg(Msg::Input(c), &snapshot);
        }

        let Some(UiEvent::UploadDriver(form)) = ui.on_msg(Msg::Submit, &snapshot) else {
            panic!("expected a driver upload");
        };
        assert_eq!(form.name, "H2");
        assert_eq!(form.file.as_deref(), Some(std::path::Path::new("/tmp/h2.jar")));
        assert!(ui.driver_draft.is_none());
    }
}
