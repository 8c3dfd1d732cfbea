use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    identity::ExampleIdentity,
    meta::{extract_meta, ExampleMeta},
    SessionError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub line: u32,
    pub ch: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub left: f64,
    pub top: f64,
}

/// Edited source plus the editor position it was left at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditSession {
    pub source: String,
    #[serde(default)]
    pub cursor: Cursor,
    #[serde(default)]
    pub scroll: ScrollOffset,
}

/// Key/value store that outlives a page load.
pub trait SessionStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    /// # Errors
    ///
    /// Returns an error when the store refuses the write.
    fn set_item(&mut self, key: &str, value: String) -> Result<(), SessionError>;
    fn remove_item(&mut self, key: &str);
}

/// Fetches pristine example text.
pub trait SourceFetcher {
    /// # Errors
    ///
    /// Returns an error when the text cannot be retrieved.
    fn fetch_text(&self, path: &str) -> Result<String, SessionError>;
}

/// The code editor widget.
pub trait CodeEditor {
    fn set_text(&mut self, text: &str);
    fn text(&self) -> String;
    fn cursor(&self) -> Cursor;
    fn set_cursor(&mut self, cursor: Cursor);
    fn scroll(&self) -> ScrollOffset;
    fn scroll_to(&mut self, scroll: ScrollOffset);
    fn focus(&mut self);
}

/// The page hosting the editor and the running example.
pub trait ExampleHost {
    fn set_title(&mut self, title: &str);
    fn show_meta(&mut self, meta: &ExampleMeta);
    fn evaluate(&mut self, source: &str);
    fn show_load_error(&mut self, message: &str);
    /// Restart the page; the next load re-enters [`SessionController::load`].
    fn reload(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    RenderedStored,
    RenderedPristine,
    LoadFailed,
}

/// Drives one viewer page: render stored edits or the pristine example,
/// persist edits on commit, discard them on reset.
#[derive(Debug)]
pub struct SessionController<S, F, E, H> {
    identity: ExampleIdentity,
    storage: S,
    fetcher: F,
    editor: E,
    host: H,
    state: SessionState,
}

impl<S, F, E, H> SessionController<S, F, E, H>
where
    S: SessionStorage,
    F: SourceFetcher,
    E: CodeEditor,
    H: ExampleHost,
{
    pub fn new(identity: ExampleIdentity, storage: S, fetcher: F, editor: E, host: H) -> Self {
        Self {
            identity,
            storage,
            fetcher,
            editor,
            host,
            state: SessionState::Idle,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &ExampleIdentity {
        &self.identity
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn into_parts(self) -> (S, F, E, H) {
        (self.storage, self.fetcher, self.editor, self.host)
    }

    /// Render the example. Stored edits win over the pristine source; a
    /// stored value that does not parse is ignored.
    pub fn load(&mut self) -> SessionState {
        let key = self.identity.storage_key();
        self.host.set_title(&self.identity.document_title());

        if let Some(session) = self.stored_session(&key) {
            debug!(%key, "restoring stored edits");
            self.show_and_run(&session.source, Some((session.cursor, session.scroll)));
            self.state = SessionState::RenderedStored;
            return self.state;
        }

        let path = self.identity.source_path();
        match self.fetcher.fetch_text(&path) {
            Ok(text) => {
                self.show_and_run(&text, None);
                self.state = SessionState::RenderedPristine;
            }
            Err(err) => {
                warn!(%err, %path, "failed to load example");
                self.host.set_title("Error");
                self.host.show_load_error(&format!(
                    "Unable to load {}/{}",
                    self.identity.dir, self.identity.file
                ));
                self.state = SessionState::LoadFailed;
            }
        }
        self.state
    }

    /// The editor and the evaluator both see the source without its meta
    /// block. Cursor goes before scroll so the saved scroll offset sticks.
    fn show_and_run(&mut self, text: &str, position: Option<(Cursor, ScrollOffset)>) {
        let parsed = extract_meta(text);
        self.host.show_meta(&parsed.meta);
        self.editor.set_text(&parsed.source);
        if let Some((cursor, scroll)) = position {
            self.editor.set_cursor(cursor);
            self.editor.scroll_to(scroll);
            self.editor.focus();
        }
        self.host.evaluate(&parsed.source);
    }

    /// Persist the editor contents and position, then reload.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be encoded or stored; the
    /// page is not reloaded in that case.
    pub fn commit(&mut self) -> Result<(), SessionError> {
        let session = EditSession {
            source: self.editor.text(),
            cursor: self.editor.cursor(),
            scroll: self.editor.scroll(),
        };
        let encoded = serde_json::to_string(&session)?;
        self.storage
            .set_item(&self.identity.storage_key(), encoded)?;
        self.host.reload();
        Ok(())
    }

    /// Forget stored edits and reload.
    pub fn reset(&mut self) {
        self.storage.remove_item(&self.identity.storage_key());
        self.host.reload();
    }

    fn stored_session(&self, key: &str) -> Option<EditSession> {
        let raw = self.storage.get_item(key)?;
        match serde_json::from_str::<EditSession>(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(%err, %key, "ignoring unreadable stored edits");
                None
            }
        }
    }
}

/// Storage that lives as long as the value does.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: String) -> Result<(), SessionError> {
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&mut self, key: &str) {
        self.items.remove(key);
    }
}
