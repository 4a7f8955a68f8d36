use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::connection_manager::SessionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlId {
    Connect,
    Disconnect,
    SaveConnection,
    ExecuteQuery,
    PreviousPage,
    NextPage,
    Export,
    TestCloud,
    ConnectCloud,
    UploadDriver,
}

impl ControlId {
    pub const ALL: [Self; 10] = [
        Self::Connect,
        Self::Disconnect,
        Self::SaveConnection,
        Self::ExecuteQuery,
        Self::PreviousPage,
        Self::NextPage,
        Self::Export,
        Self::TestCloud,
        Self::ConnectCloud,
        Self::UploadDriver,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::Disconnect => "Disconnect",
            Self::SaveConnection => "Save",
            Self::ExecuteQuery => "Execute",
            Self::PreviousPage => "Previous",
            Self::NextPage => "Next",
            Self::Export => "Export",
            Self::TestCloud => "Test",
            Self::ConnectCloud => "Connect Cloud",
            Self::UploadDriver => "Upload Driver",
        }
    }

    /// Text shown while the control's action runs.
    #[must_use]
    pub fn busy_label(self) -> &'static str {
        match self {
            Self::Connect | Self::ConnectCloud => "Connecting...",
            Self::Disconnect => "Disconnecting...",
            Self::SaveConnection => "Saving...",
            Self::ExecuteQuery => "Executing...",
            Self::PreviousPage | Self::NextPage => "Loading...",
            Self::Export => "Exporting...",
            Self::TestCloud => "Testing...",
            Self::UploadDriver => "Uploading...",
        }
    }
}

/// Tracks which controls have an action in flight.
#[derive(Debug, Default)]
pub struct Controls {
    busy: Mutex<BTreeSet<ControlId>>,
}

impl Controls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` busy until the returned guard drops. `None` if it already is.
    #[must_use]
    pub fn try_acquire(&self, id: ControlId) -> Option<ControlGuard<'_>> {
        if self.busy.lock().insert(id) {
            Some(ControlGuard { controls: self, id })
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_busy(&self, id: ControlId) -> bool {
        self.busy.lock().contains(&id)
    }

    /// Whether the control accepts input given the session state.
    #[must_use]
    pub fn is_enabled(&self, id: ControlId, session: &SessionView) -> bool {
        if self.is_busy(id) {
            return false;
        }
        match id {
            ControlId::Connect => !session.is_connected() && !session.is_busy(),
            ControlId::Disconnect
            | ControlId::ExecuteQuery
            | ControlId::PreviousPage
            | ControlId::NextPage => session.is_connected(),
            ControlId::SaveConnection
            | ControlId::Export
            | ControlId::TestCloud
            | ControlId::ConnectCloud
            | ControlId::UploadDriver => true,
        }
    }
}

#[derive(Debug)]
pub struct ControlGuard<'a> {
    controls: &'a Controls,
    id: ControlId,
}

impl ControlGuard<'_> {
    #[must_use]
    pub fn id(&self) -> ControlId {
        self.id
    }
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        self.controls.busy.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlId, Controls};
    use crate::connection_manager::SessionView;

    #[test]
    fn guard_releases_on_drop() {
        let controls = Controls::new();

        let guard = controls
            .try_acquire(ControlId::ExecuteQuery)
            .expect("control should be free");
        assert_eq!(guard.id(), ControlId::ExecuteQuery);
        assert!(controls.is_busy(ControlId::ExecuteQuery));
        assert!(controls.try_acquire(ControlId::ExecuteQuery).is_none());
        assert!(controls.try_acquire(ControlId::Export).is_some());

        drop(guard);
        assert!(!controls.is_busy(ControlId::ExecuteQuery));
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn failing_action(controls: &Controls) -> Result<(), &'static str> {
            let _guard = controls.try_acquire(ControlId::Connect).ok_or("busy")?;
            Err("backend down")
        }

        let controls = Controls::new();
        assert_eq!(failing_action(&controls), Err("backend down"));
        assert!(!controls.is_busy(ControlId::Connect));
    }

    #[test]
    fn disconnected_session_enables_connect_only() {
        let controls = Controls::new();
        let session = SessionView::default();

        assert!(controls.is_enabled(ControlId::Connect, &session));
        assert!(!controls.is_enabled(ControlId::Disconnect, &session));
        assert!(!controls.is_enabled(ControlId::ExecuteQuery, &session));
        assert!(controls.is_enabled(ControlId::SaveConnection, &session));
    }
}
