use std::future::Future;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use uuid::Uuid;

use crate::{
    api::Api,
    errors::ClientError,
    types::{CreateDialogueReq, Dialogue, SyncStatus},
};

/// Where the editor loads and saves dialogues.
pub trait DialogueStore: Sync {
    fn list_dialogues(
        &self,
        token: &str,
        chatbot_id: &str,
    ) -> impl Future<Output = Result<Vec<Dialogue>, ClientError>> + Send;

    fn create_dialogue(
        &self,
        token: &str,
        payload: &CreateDialogueReq,
    ) -> impl Future<Output = Result<Dialogue, ClientError>> + Send;
}

impl DialogueStore for Api {
    async fn list_dialogues(
        &self,
        token: &str,
        chatbot_id: &str,
    ) -> Result<Vec<Dialogue>, ClientError> {
        Api::list_dialogues(self, token, chatbot_id).await
    }

    async fn create_dialogue(
        &self,
        token: &str,
        payload: &CreateDialogueReq,
    ) -> Result<Dialogue, ClientError> {
        Api::create_dialogue(self, token, payload).await
    }
}

/// Identity of an editor row. Pending tokens never reach the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowId {
    Persisted(String),
    Pending(Uuid),
}

impl RowId {
    pub fn is_pending(&self) -> bool {
        matches!(self, RowId::Pending(_))
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowId::Persisted(id) => write!(f, "{}", id),
            RowId::Pending(token) => write!(f, "new:{}", &token.simple().to_string()[..8]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueRow {
    pub id: RowId,
    pub name: String,
    pub questions: Vec<String>,
    pub answer: String,
    pub sync_status: Option<SyncStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Local changes to a persisted row. These are not sent anywhere.
    pub edited: bool,
}

impl DialogueRow {
    fn pending() -> Self {
        Self {
            id: RowId::Pending(Uuid::new_v4()),
            name: String::new(),
            questions: Vec::new(),
            answer: String::new(),
            sync_status: None,
            created_at: None,
            updated_at: None,
            edited: false,
        }
    }

    /// Only rows with a question and a non-blank answer are saved.
    pub fn is_valid(&self) -> bool {
        !self.questions.is_empty() && !self.answer.trim().is_empty()
    }
}

impl From<Dialogue> for DialogueRow {
    fn from(value: Dialogue) -> Self {
        Self {
            id: RowId::Persisted(value.id),
            name: value.name,
            questions: value.questions,
            answer: value.answer,
            sync_status: Some(value.sync_status),
            created_at: value.created_at,
            updated_at: value.updated_at,
            edited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Success(String),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub created: usize,
    pub failed: usize,
    /// Rows left out for missing questions or a blank answer.
    pub skipped_invalid: usize,
    /// Edited persisted rows. Updating saved dialogues is not supported.
    pub unsent_edits: usize,
}

/// Working list of dialogues for one bot.
#[derive(Debug)]
pub struct DialogueEditor {
    bot_id: String,
    rows: Vec<DialogueRow>,
    status: Option<Status>,
}

impl DialogueEditor {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            rows: Vec::new(),
            status: None,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn rows(&self) -> &[DialogueRow] {
        &self.rows
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub async fn load<S: DialogueStore>(&mut self, store: &S, token: &str) -> Result<(), ClientError> {
        match store.list_dialogues(token, &self.bot_id).await {
            Ok(list) => {
                self.rows = list.into_iter().map(DialogueRow::from).collect();
                self.status = None;
                Ok(())
            }
            Err(err) => {
                tracing::error!("Error fetching dialogues: {}", err);
                self.status = Some(Status::Error("Failed to load dialogues".to_string()));
                Err(err)
            }
        }
    }

    pub fn add_row(&mut self) -> RowId {
        let row = DialogueRow::pending();
        let id = row.id.clone();
        self.rows.push(row);
        id
    }

    /// Appends a question. Blank input is ignored.
    pub fn add_question(&mut self, id: &RowId, question: &str) -> bool {
        let question = question.trim();
        if question.is_empty() {
            return false;
        }
        self.edit(id, |row| row.questions.push(question.to_string()))
    }

    pub fn remove_question(&mut self, id: &RowId, index: usize) -> bool {
        let in_range = self
            .row(id)
            .map_or(false, |row| index < row.questions.len());
        in_range
            && self.edit(id, |row| {
                row.questions.remove(index);
            })
    }

    pub fn set_answer(&mut self, id: &RowId, answer: &str) -> bool {
        self.edit(id, |row| row.answer = answer.to_string())
    }

    /// Drops a row from the working list. Nothing is deleted on the server.
    pub fn delete_row(&mut self, id: &RowId) -> bool {
        let len = self.rows.len();
        self.rows.retain(|row| &row.id != id);
        self.rows.len() != len
    }

    pub fn row(&self, id: &RowId) -> Option<&DialogueRow> {
        self.rows.iter().find(|row| &row.id == id)
    }

    fn edit<F: FnOnce(&mut DialogueRow)>(&mut self, id: &RowId, f: F) -> bool {
        match self.rows.iter_mut().find(|row| &row.id == id) {
            Some(row) => {
                f(row);
                if !row.id.is_pending() {
                    row.edited = true;
                }
                true
            }
            None => false,
        }
    }

    /// Creates every valid pending row, then reloads the list from the server.
    /// Any failed create leaves the working list untouched.
    pub async fn save<S: DialogueStore>(&mut self, store: &S, token: &str) -> SaveReport {
        let valid: Vec<&DialogueRow> = self.rows.iter().filter(|row| row.is_valid()).collect();
        let mut report = SaveReport {
            skipped_invalid: self.rows.len() - valid.len(),
            unsent_edits: valid
                .iter()
                .filter(|row| !row.id.is_pending() && row.edited)
                .count(),
            ..Default::default()
        };

        if valid.is_empty() {
            self.status = Some(Status::Error("No valid dialogues to save".to_string()));
            return report;
        }

        let requests: Vec<CreateDialogueReq> = valid
            .iter()
            .filter_map(|row| match &row.id {
                RowId::Pending(token) => Some(CreateDialogueReq {
                    chatbot_id: self.bot_id.clone(),
                    name: format!("Dialogue {}", &token.simple().to_string()[..8]),
                    questions: row.questions.clone(),
                    answer: row.answer.clone(),
                }),
                RowId::Persisted(_) => None,
            })
            .collect();

        tracing::info!(
            "Saving {} new dialogues for bot {}, skipping {} invalid",
            requests.len(),
            self.bot_id,
            report.skipped_invalid
        );

        let results = join_all(requests.iter().map(|req| store.create_dialogue(token, req))).await;
        for result in &results {
            match result {
                Ok(_) => report.created += 1,
                Err(err) => {
                    tracing::error!("Error saving dialogue: {}", err);
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            self.status = Some(Status::Error("Some dialogues failed to save".to_string()));
            return report;
        }

        self.rows.retain(|row| !row.id.is_pending());
        match store.list_dialogues(token, &self.bot_id).await {
            Ok(list) => self.rows = list.into_iter().map(DialogueRow::from).collect(),
            Err(err) => tracing::warn!("Saved dialogues but failed to reload them: {}", err),
        }

        let mut message = format!("Successfully saved {} new dialogues", report.created);
        if report.unsent_edits > 0 {
            message.push_str(&format!(
                "; {} edited saved dialogues were not sent, updating saved dialogues is not supported",
                report.unsent_edits
            ));
        }
        self.status = Some(Status::Success(message));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        dialogues: Mutex<Vec<Dialogue>>,
        created: Mutex<Vec<CreateDialogueReq>>,
        // Creates with this answer fail.
        reject_answer: Option<String>,
        fail_list: bool,
    }

    fn dialogue(id: &str, question: &str, answer: &str) -> Dialogue {
        Dialogue {
            id: id.to_string(),
            name: format!("Dialogue {}", id),
            questions: vec![question.to_string()],
            answer: answer.to_string(),
            sync_status: SyncStatus::Synced,
            created_at: None,
            updated_at: None,
        }
    }

    impl DialogueStore for FakeStore {
        async fn list_dialogues(&self, _: &str, _: &str) -> Result<Vec<Dialogue>, ClientError> {
            if self.fail_list {
                return Err(ClientError::Validation("list unavailable".to_string()));
            }
            Ok(self.dialogues.lock().unwrap().clone())
        }

        async fn create_dialogue(
            &self,
            _: &str,
            payload: &CreateDialogueReq,
        ) -> Result<Dialogue, ClientError> {
            self.created.lock().unwrap().push(payload.clone());
            if self.reject_answer.as_deref() == Some(payload.answer.as_str()) {
                return Err(ClientError::Validation("rejected".to_string()));
            }
            let mut dialogues = self.dialogues.lock().unwrap();
            let created = Dialogue {
                id: format!("srv-{}", dialogues.len() + 1),
                name: payload.name.clone(),
                questions: payload.questions.clone(),
                answer: payload.answer.clone(),
                sync_status: SyncStatus::Pending,
                created_at: None,
                updated_at: None,
            };
            dialogues.push(created.clone());
            Ok(created)
        }
    }

    fn new_row(editor: &mut DialogueEditor, questions: &[&str], answer: &str) -> RowId {
        let id = editor.add_row();
        for q in questions {
            editor.add_question(&id, q);
        }
        editor.set_answer(&id, answer);
        id
    }

    #[tokio::test]
    async fn test_invalid_rows_are_never_sent() {
        let store = FakeStore::default();
        let mut editor = DialogueEditor::new("b1");
        new_row(&mut editor, &[], "An answer without questions");
        new_row(&mut editor, &["Question without answer?"], "   ");
        new_row(&mut editor, &["Opening hours?"], "9 to 5");

        let report = editor.save(&store, "token").await;

        let created = store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].answer, "9 to 5");
        assert_eq!(created[0].chatbot_id, "b1");
        assert!(created[0].name.starts_with("Dialogue "));
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped_invalid, 2);
    }

    #[tokio::test]
    async fn test_nothing_valid_to_save() {
        let store = FakeStore::default();
        let mut editor = DialogueEditor::new("b1");
        new_row(&mut editor, &[], "");

        let report = editor.save(&store, "token").await;

        assert_eq!(report.created, 0);
        assert!(store.created.lock().unwrap().is_empty());
        assert_eq!(
            editor.status(),
            Some(&Status::Error("No valid dialogues to save".to_string()))
        );
        assert_eq!(editor.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_successful_save_replaces_pending_rows() {
        let store = FakeStore::default();
        store
            .dialogues
            .lock()
            .unwrap()
            .push(dialogue("d1", "Where are you?", "Berlin"));
        let mut editor = DialogueEditor::new("b1");
        editor.load(&store, "token").await.unwrap();
        new_row(&mut editor, &["Opening hours?", "When are you open?"], "9 to 5");
        new_row(&mut editor, &["Half done"], "");

        let report = editor.save(&store, "token").await;

        assert_eq!(report.created, 1);
        assert!(editor.rows().iter().all(|row| !row.id.is_pending()));
        assert_eq!(editor.rows().len(), 2);
        assert_eq!(editor.rows()[1].questions.len(), 2);
        assert_eq!(
            editor.status(),
            Some(&Status::Success("Successfully saved 1 new dialogues".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_create_keeps_all_rows() {
        let store = FakeStore {
            reject_answer: Some("boom".to_string()),
            ..Default::default()
        };
        let mut editor = DialogueEditor::new("b1");
        new_row(&mut editor, &["Fine?"], "yes");
        new_row(&mut editor, &["Broken?"], "boom");

        let report = editor.save(&store, "token").await;

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(editor.rows().len(), 2);
        assert!(editor.rows().iter().all(|row| row.id.is_pending()));
        assert_eq!(
            editor.status(),
            Some(&Status::Error("Some dialogues failed to save".to_string()))
        );
    }

    #[tokio::test]
    async fn test_edits_to_saved_rows_are_reported_not_sent() {
        let store = FakeStore::default();
        store
            .dialogues
            .lock()
            .unwrap()
            .push(dialogue("d1", "Where are you?", "Berlin"));
        let mut editor = DialogueEditor::new("b1");
        editor.load(&store, "token").await.unwrap();
        let id = RowId::Persisted("d1".to_string());
        assert!(editor.set_answer(&id, "Hamburg"));

        let report = editor.save(&store, "token").await;

        assert_eq!(report.unsent_edits, 1);
        assert!(store.created.lock().unwrap().is_empty());
        // Reloaded from the server, the local edit is gone.
        assert_eq!(editor.rows()[0].answer, "Berlin");
        match editor.status() {
            Some(Status::Success(msg)) => assert!(msg.contains("not supported")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_persisted_rows() {
        let store = FakeStore {
            fail_list: true,
            ..Default::default()
        };
        let mut editor = DialogueEditor::new("b1");
        editor.rows.push(dialogue("d1", "Where are you?", "Berlin").into());
        new_row(&mut editor, &["Opening hours?"], "9 to 5");

        editor.save(&store, "token").await;

        assert_eq!(editor.rows().len(), 1);
        assert_eq!(editor.rows()[0].id, RowId::Persisted("d1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_load_returns_error_and_status() {
        let store = FakeStore {
            fail_list: true,
            ..Default::default()
        };
        let mut editor = DialogueEditor::new("b1");

        let err = editor.load(&store, "token").await.unwrap_err();

        assert_eq!(err.user_message(), "list unavailable");
        assert_eq!(
            editor.status(),
            Some(&Status::Error("Failed to load dialogues".to_string()))
        );
    }

    #[test]
    fn test_question_editing() {
        let mut editor = DialogueEditor::new("b1");
        let id = editor.add_row();
        assert!(!editor.add_question(&id, "   "));
        assert!(editor.add_question(&id, " Same? "));
        assert!(editor.add_question(&id, "Same?"));
        assert_eq!(editor.row(&id).unwrap().questions, vec!["Same?", "Same?"]);

        assert!(!editor.remove_question(&id, 5));
        assert!(editor.remove_question(&id, 0));
        assert_eq!(editor.row(&id).unwrap().questions.len(), 1);
        assert!(!editor.row(&id).unwrap().edited);

        assert!(editor.delete_row(&id));
        assert!(!editor.delete_row(&id));
        assert!(!editor.set_answer(&id, "gone"));
    }

    #[test]
    fn test_pending_id_display() {
        let id = RowId::Pending(Uuid::nil());
        assert_eq!(id.to_string(), "new:00000000");
        assert_eq!(RowId::Persisted("d1".to_string()).to_string(), "d1");
    }
}
